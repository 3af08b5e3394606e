//! Object headers: procedures, functions, views and triggers.

use crate::dialect::DatabaseType;
use crate::model::{
    CallStatement, NameRole, NameToken, Parameter, ParameterDirection, ReturnTable, RoutineKind,
    RoutineScript, Statement, Token, TokenKind, TriggerEvent, TriggerScript, TriggerTiming,
    ViewScript,
};

use super::expr::{self, ExprContext};
use super::lexer::LexemeKind;
use super::{PResult, Parser, word_in};

/// MySQL routine characteristics between the header and the body.
const MYSQL_CHARACTERISTICS: &[&str] = &[
    "DETERMINISTIC", "NOT", "NO", "SQL", "READS", "MODIFIES", "CONTAINS", "DATA", "LANGUAGE",
    "SECURITY", "DEFINER", "INVOKER",
];

/// Oracle function options before `IS`/`AS`.
const ORACLE_OPTIONS: &[&str] = &["DETERMINISTIC", "PIPELINED", "PARALLEL_ENABLE", "RESULT_CACHE", "AUTHID", "CURRENT_USER", "DEFINER"];

impl<'a> Parser<'a> {
    /// `CREATE [OR ALTER | OR REPLACE] [modifiers] <object>`.
    fn create_header(&mut self, object: &[&str]) -> PResult<()> {
        if !self.eat_word("CREATE") {
            self.expect_word("ALTER")?;
        }
        // `OR REPLACE`, `DEFINER = user`, `ALGORITHM = MERGE`, `EDITIONABLE`, `TEMP` …
        let start = self.pos;
        while !self.at_any_word(object) {
            if self.pos - start > 12 || self.at_end() || self.at_punct("(") || self.at_punct(";") {
                self.pos = start;
                return Err(self.error_here(format!("expected {}", object[0])));
            }
            self.pos += 1;
        }
        self.pos += 1;
        Ok(())
    }

    fn skip_if_not_exists(&mut self) {
        self.eat_words(&["IF", "NOT", "EXISTS"]);
    }

    // ---- procedures and functions -------------------------------------

    pub(super) fn parse_routine(&mut self, kind: RoutineKind) -> PResult<RoutineScript> {
        if self.dialect == DatabaseType::Sqlite {
            return Err(self.error_here("routines are not supported"));
        }
        match kind {
            RoutineKind::Procedure => self.create_header(&["PROCEDURE", "PROC"])?,
            RoutineKind::Function => self.create_header(&["FUNCTION"])?,
        }
        self.skip_if_not_exists();
        let name = self.name(NameRole::Routine)?;
        let mut routine = RoutineScript {
            name,
            kind,
            parameters: Vec::new(),
            return_type: None,
            return_table: None,
            statements: Vec::new(),
        };
        match self.dialect {
            DatabaseType::SqlServer => self.tsql_routine(&mut routine)?,
            DatabaseType::MySql => self.mysql_routine(&mut routine)?,
            DatabaseType::Postgres => self.pg_routine(&mut routine)?,
            _ => self.oracle_routine(&mut routine)?,
        }
        Ok(routine)
    }

    fn parameters(&mut self) -> PResult<Vec<Parameter>> {
        let inner = self.skip_group()?;
        let lexemes = self.lx[inner].to_vec();
        let mut parameters = Vec::new();
        for part in expr::split_top_level(&lexemes, ",") {
            if part.is_empty() {
                continue;
            }
            parameters.push(self.parameter(part)?);
        }
        Ok(parameters)
    }

    /// One parameter in any dialect's spelling.
    fn parameter(&self, part: &[super::Lexeme]) -> PResult<Parameter> {
        let mut i = 0;
        let mut direction = ParameterDirection::In;
        let mode = |l: &super::Lexeme| word_in(l, &["IN", "OUT", "INOUT", "VARIADIC"]);
        // MySQL / PostgreSQL put the mode first
        if part.first().is_some_and(mode) && part.len() > 2 {
            direction = direction_of(part[0].text, part.get(1).is_some_and(|l| l.is_word("OUT")));
            i += if part[0].is_word("IN") && part[1].is_word("OUT") { 2 } else { 1 };
        }
        let error = |at: usize, message: &str| {
            let l = part.get(at).or(part.last());
            match l {
                Some(l) => super::lexer::error_item(self.source, l.start, l.stop, message),
                None => super::lexer::error_item(self.source, 0, 0, message),
            }
        };
        let Some(first) = part.get(i) else {
            return Err(error(i, "expected a parameter"));
        };
        // PostgreSQL allows unnamed parameters
        let unnamed = self.dialect == DatabaseType::Postgres && expr::data_type(part, i).is_some_and(|(_, n)| n == part.len());
        let name = if unnamed {
            Token::new(format!("${}", i + 1), TokenKind::Variable)
        } else {
            i += 1;
            Token::with_span(first.text, TokenKind::Variable, first.start, first.stop)
        };
        self.eat_parameter_words(part, &mut i);
        // Oracle puts the mode after the name
        if part.get(i).is_some_and(mode) {
            direction = direction_of(part[i].text, part.get(i + 1).is_some_and(|l| l.is_word("OUT")));
            i += if part[i].is_word("IN") && part.get(i + 1).is_some_and(|l| l.is_word("OUT")) { 2 } else { 1 };
            if part.get(i).is_some_and(|l| l.is_word("NOCOPY")) {
                i += 1;
            }
        }
        let Some((data_type, next)) = expr::data_type(part, i) else {
            return Err(error(i, "expected a data type"));
        };
        i = next;
        let mut default = None;
        while i < part.len() {
            let l = &part[i];
            if l.is_op("=") || l.is_op(":=") || l.is_word("DEFAULT") {
                let end = part[i + 1..]
                    .iter()
                    .position(|x| word_in(x, &["OUT", "OUTPUT", "READONLY"]))
                    .map_or(part.len(), |p| i + 1 + p);
                default = Some(self.builder().build(&part[i + 1..end], ExprContext::General));
                i = end;
            } else if word_in(l, &["OUT", "OUTPUT"]) {
                direction = ParameterDirection::Out;
                i += 1;
            } else if word_in(l, &["READONLY", "VARYING"]) {
                i += 1;
            } else {
                return Err(error(i, "unexpected parameter option"));
            }
        }
        Ok(Parameter {
            name,
            direction,
            data_type,
            default,
        })
    }

    fn eat_parameter_words(&self, part: &[super::Lexeme], i: &mut usize) {
        if part.get(*i).is_some_and(|l| l.is_word("AS")) && self.dialect == DatabaseType::SqlServer {
            *i += 1;
        }
    }

    fn tsql_routine(&mut self, routine: &mut RoutineScript) -> PResult<()> {
        if self.at_punct("(") {
            routine.parameters = self.parameters()?;
        } else {
            let range = self.collect(&|l| l.is_word("AS") || l.is_word("WITH") || l.is_word("RETURNS"));
            let lexemes = self.lx[range].to_vec();
            for part in expr::split_top_level(&lexemes, ",") {
                if !part.is_empty() {
                    routine.parameters.push(self.parameter(part)?);
                }
            }
        }
        if routine.kind == RoutineKind::Function {
            self.expect_word("RETURNS")?;
            if self.peek().is_some_and(|l| l.kind == LexemeKind::Variable) {
                let name = self.simple_name(TokenKind::Variable)?;
                self.expect_word("TABLE")?;
                routine.return_table = Some(self.return_table(Some(name))?);
            } else if self.eat_word("TABLE") {
                routine.return_table = Some(ReturnTable {
                    name: None,
                    columns: Vec::new(),
                });
            } else {
                routine.return_type = Some(self.data_type()?);
            }
        }
        if self.eat_word("WITH") {
            while !self.at_word("AS") && !self.at_end() {
                self.pos += 1;
            }
        }
        self.expect_word("AS")?;
        if routine.return_table.as_ref().is_some_and(|t| t.name.is_none()) {
            // inline table-valued function
            self.expect_word("RETURN")?;
            let parenthesised = self.eat_punct("(");
            let select = self.select()?;
            if parenthesised {
                self.expect_punct(")")?;
            }
            routine.statements = vec![Statement::Select(select)];
            while self.eat_punct(";") {}
            return self.expect_end();
        }
        routine.statements = self.body_statements()?;
        Ok(())
    }

    fn return_table(&mut self, name: Option<Token>) -> PResult<ReturnTable> {
        let inner = self.skip_group()?;
        let lexemes = self.lx[inner].to_vec();
        let mut columns = Vec::new();
        for part in expr::split_top_level(&lexemes, ",") {
            if part.is_empty() || word_in(&part[0], &["PRIMARY", "UNIQUE", "CONSTRAINT", "CHECK", "INDEX"]) {
                continue;
            }
            columns.push(self.column_definition(part)?);
        }
        Ok(ReturnTable { name, columns })
    }

    fn mysql_routine(&mut self, routine: &mut RoutineScript) -> PResult<()> {
        routine.parameters = self.parameters()?;
        if routine.kind == RoutineKind::Function {
            self.expect_word("RETURNS")?;
            routine.return_type = Some(self.data_type()?);
            // `RETURNS VARCHAR(20) CHARSET utf8mb4`
            if self.eat_word("CHARSET") || self.eat_words(&["CHARACTER", "SET"]) {
                self.pos += 1;
            }
        }
        loop {
            if self.eat_word("COMMENT") {
                self.pos += 1;
            } else if self.at_any_word(MYSQL_CHARACTERISTICS) {
                self.pos += 1;
            } else {
                break;
            }
        }
        routine.statements = self.body_statements()?;
        Ok(())
    }

    fn oracle_routine(&mut self, routine: &mut RoutineScript) -> PResult<()> {
        if self.at_punct("(") {
            routine.parameters = self.parameters()?;
        }
        if routine.kind == RoutineKind::Function {
            self.expect_word("RETURN")?;
            routine.return_type = Some(self.data_type()?);
        }
        while self.at_any_word(ORACLE_OPTIONS) {
            self.pos += 1;
        }
        if !self.eat_word("IS") {
            self.expect_word("AS")?;
        }
        let declarations = self.declaration_section()?;
        let block = self.plsql_block(None, declarations)?;
        while self.eat_punct(";") {}
        self.eat_op("/");
        self.expect_end()?;
        routine.statements = unwrap_block(block);
        Ok(())
    }

    fn pg_routine(&mut self, routine: &mut RoutineScript) -> PResult<()> {
        routine.parameters = self.parameters()?;
        if self.eat_word("RETURNS") {
            if self.eat_word("TABLE") {
                routine.return_table = Some(self.return_table(None)?);
            } else {
                self.eat_word("SETOF");
                routine.return_type = Some(self.data_type()?);
            }
        }
        routine.statements = self.pg_body()?;
        Ok(())
    }

    /// `AS $$ … $$` with `LANGUAGE` and other options around it.
    fn pg_body(&mut self) -> PResult<Vec<Statement>> {
        let mut body = None;
        let mut language = String::from("plpgsql");
        while let Some(l) = self.advance() {
            if l.is_punct(";") {
                break;
            }
            if l.is_word("LANGUAGE") {
                if let Some(lang) = self.advance() {
                    language = crate::dialect::unquote(lang.text).to_lowercase();
                }
            } else if l.kind == LexemeKind::DollarBody {
                body = Some(l);
            }
        }
        self.expect_end()?;
        let Some(body) = body else {
            return Err(self.error_here("expected a dollar-quoted body"));
        };
        let open = body.text[1..].find('$').map_or(1, |p| p + 2);
        let range = body.start + open..body.end() - open;
        let mut inner = Parser::from_range(self.source, range, self.dialect).map_err(|e| {
            e.items().first().cloned().unwrap_or_else(|| self.error_here("invalid body"))
        })?;
        if language == "sql" {
            return inner.statements_until(&[]);
        }
        let label = if inner.at_op("<<") {
            inner.pos += 1;
            let label = inner.simple_name(TokenKind::Label)?;
            if !inner.eat_op(">>") {
                return Err(inner.error_here("expected '>>'"));
            }
            Some(label)
        } else {
            None
        };
        let declarations = if inner.eat_word("DECLARE") {
            inner.declaration_section()?
        } else {
            Vec::new()
        };
        let block = inner.plsql_block(label, declarations)?;
        while inner.eat_punct(";") {}
        inner.expect_end()?;
        Ok(unwrap_block(block))
    }

    fn expect_end(&self) -> PResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error_here("unexpected input after definition"))
        }
    }

    /// T-SQL and MySQL bodies: one statement or a `BEGIN … END` block.
    fn body_statements(&mut self) -> PResult<Vec<Statement>> {
        let statements = self.statements_until(&[])?;
        if statements.len() == 1 && matches!(statements[0], Statement::Block(ref b) if b.label.is_none()) {
            if let Some(block) = statements.into_iter().next() {
                return Ok(unwrap_block(block));
            }
            return Ok(Vec::new());
        }
        Ok(statements)
    }

    // ---- views --------------------------------------------------------

    pub(super) fn parse_view(&mut self) -> PResult<ViewScript> {
        self.create_header(&["VIEW"])?;
        self.skip_if_not_exists();
        let name = self.name(NameRole::View)?;
        let columns = if self.at_punct("(") {
            let inner = self.skip_group()?;
            self.expr_list(inner, ExprContext::General)
        } else {
            Vec::new()
        };
        if self.eat_word("WITH") {
            while !self.at_word("AS") && !self.at_end() {
                self.pos += 1;
            }
        }
        self.expect_word("AS")?;
        if self.dialect == DatabaseType::Oracle && !(self.at_word("SELECT") || self.at_punct("(")) {
            return Err(self.error_here("view body must be a select"));
        }
        let parenthesised = self.at_punct("(") && self.peek_at(1).is_some_and(|l| l.is_word("SELECT"));
        if parenthesised {
            self.pos += 1;
        }
        let select = self.select()?;
        if parenthesised {
            self.expect_punct(")")?;
        }
        // `WITH CHECK OPTION`, `WITH READ ONLY`
        if self.eat_word("WITH") {
            while self.at_any_word(&["CASCADED", "LOCAL", "CHECK", "OPTION", "READ", "ONLY", "CONSTRAINT"]) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|l| l.is_name()) && !self.at_punct(";") {
                self.pos += 1;
            }
        }
        while self.eat_punct(";") {}
        self.eat_op("/");
        self.expect_end()?;
        Ok(ViewScript {
            name,
            columns,
            select,
        })
    }

    // ---- triggers -----------------------------------------------------

    pub(super) fn parse_trigger(&mut self) -> PResult<TriggerScript> {
        let function_body = if self.dialect == DatabaseType::Postgres && self.trigger_function_first() {
            Some(self.pg_trigger_function()?)
        } else {
            None
        };
        self.create_header(&["TRIGGER"])?;
        self.skip_if_not_exists();
        let name = self.name(NameRole::Trigger)?;
        let mut trigger = match self.dialect {
            DatabaseType::SqlServer => self.tsql_trigger(name)?,
            _ => self.standard_trigger(name)?,
        };
        if self.dialect == DatabaseType::Postgres {
            let call = self.pg_execute_function()?;
            trigger.statements = match function_body {
                Some(statements) => statements,
                None => vec![call],
            };
        }
        Ok(trigger)
    }

    fn trigger_function_first(&self) -> bool {
        (0..4).any(|i| self.peek_at(i).is_some_and(|l| l.is_word("FUNCTION")))
    }

    /// The `CREATE FUNCTION … RETURNS trigger` preceding a PostgreSQL trigger.
    fn pg_trigger_function(&mut self) -> PResult<Vec<Statement>> {
        self.create_header(&["FUNCTION"])?;
        self.name(NameRole::Routine)?;
        self.parameters()?;
        self.expect_word("RETURNS")?;
        self.data_type()?;
        let start = self.pos;
        // the body runs to the `;` after the options, not to the end of input
        let mut end = start;
        while let Some(l) = self.lx.get(end) {
            if l.is_punct(";") {
                break;
            }
            end += 1;
        }
        let mut header = Parser {
            dialect: self.dialect,
            source: self.source,
            lx: self.lx[start..end].to_vec(),
            pos: 0,
        };
        let statements = header.pg_body()?;
        self.pos = end;
        while self.eat_punct(";") {}
        Ok(statements)
    }

    fn pg_execute_function(&mut self) -> PResult<Statement> {
        self.expect_word("EXECUTE")?;
        if !self.eat_word("FUNCTION") {
            self.expect_word("PROCEDURE")?;
        }
        let name = self.name(NameRole::Routine)?;
        let args = if self.at_punct("(") {
            let inner = self.skip_group()?;
            self.expr_list(inner, ExprContext::General)
        } else {
            Vec::new()
        };
        while self.eat_punct(";") {}
        self.expect_end()?;
        Ok(Statement::Call(CallStatement {
            result: None,
            name,
            args,
        }))
    }

    fn timing(&mut self) -> PResult<TriggerTiming> {
        if self.eat_word("BEFORE") {
            Ok(TriggerTiming::Before)
        } else if self.eat_word("AFTER") || self.eat_word("FOR") {
            Ok(TriggerTiming::After)
        } else if self.eat_words(&["INSTEAD", "OF"]) {
            Ok(TriggerTiming::InsteadOf)
        } else {
            Err(self.error_here("expected BEFORE, AFTER or INSTEAD OF"))
        }
    }

    fn event(&mut self) -> PResult<TriggerEvent> {
        let event = if self.eat_word("INSERT") {
            TriggerEvent::Insert
        } else if self.eat_word("UPDATE") {
            TriggerEvent::Update
        } else if self.eat_word("DELETE") {
            TriggerEvent::Delete
        } else {
            return Err(self.error_here("expected INSERT, UPDATE or DELETE"));
        };
        // `UPDATE OF col1, col2`
        if event == TriggerEvent::Update && self.eat_word("OF") {
            loop {
                self.simple_name(TokenKind::ColumnName)?;
                if !(self.at_punct(",") && self.peek_at(1).is_some_and(|l| !word_in(l, &["INSERT", "UPDATE", "DELETE"]))) {
                    break;
                }
                self.pos += 1;
            }
        }
        Ok(event)
    }

    fn tsql_trigger(&mut self, name: NameToken) -> PResult<TriggerScript> {
        self.expect_word("ON")?;
        let table = self.name(NameRole::Table)?;
        if self.eat_word("WITH") {
            while !self.at_any_word(&["FOR", "AFTER", "INSTEAD"]) && !self.at_end() {
                self.pos += 1;
            }
        }
        let timing = self.timing()?;
        let mut events = vec![self.event()?];
        while self.eat_punct(",") {
            events.push(self.event()?);
        }
        self.eat_words(&["NOT", "FOR", "REPLICATION"]);
        self.expect_word("AS")?;
        let statements = self.body_statements()?;
        Ok(TriggerScript {
            name,
            table,
            timing,
            events,
            for_each_row: false,
            condition: None,
            statements,
        })
    }

    /// MySQL, PostgreSQL, Oracle and SQLite trigger headers and bodies.
    fn standard_trigger(&mut self, name: NameToken) -> PResult<TriggerScript> {
        let timing = if self.dialect == DatabaseType::Sqlite
            && self.at_any_word(&["INSERT", "UPDATE", "DELETE"])
        {
            TriggerTiming::Before
        } else {
            self.timing()?
        };
        let mut events = vec![self.event()?];
        while self.eat_word("OR") || self.eat_punct(",") {
            events.push(self.event()?);
        }
        self.expect_word("ON")?;
        let table = self.name(NameRole::Table)?;
        if self.eat_word("REFERENCING") {
            // `REFERENCING OLD AS o NEW AS n`
            while self
                .peek()
                .is_some_and(|l| l.is_name() && !word_in(l, &["FOR", "WHEN", "BEGIN", "DECLARE", "EXECUTE"]))
            {
                self.pos += 1;
            }
        }
        let mut for_each_row = false;
        if self.eat_word("FOR") {
            self.eat_word("EACH");
            for_each_row = self.eat_word("ROW");
            self.eat_word("STATEMENT");
        }
        if self.at_any_word(&["FOLLOWS", "PRECEDES"]) {
            self.pos += 2;
        }
        let condition = if self.eat_word("WHEN") {
            Some(self.require_expr(&|l| word_in(l, &["BEGIN", "DECLARE", "EXECUTE", "FOR"]), "a condition")?)
        } else {
            None
        };
        let statements = match self.dialect {
            DatabaseType::Postgres => Vec::new(),
            DatabaseType::Oracle => {
                let declarations = if self.eat_word("DECLARE") {
                    self.declaration_section()?
                } else {
                    Vec::new()
                };
                let block = self.plsql_block(None, declarations)?;
                while self.eat_punct(";") {}
                self.eat_op("/");
                self.expect_end()?;
                unwrap_block(block)
            }
            _ => self.body_statements()?,
        };
        Ok(TriggerScript {
            name,
            table,
            timing,
            events,
            for_each_row,
            condition,
            statements,
        })
    }
}

fn direction_of(mode: &str, followed_by_out: bool) -> ParameterDirection {
    match mode.to_uppercase().as_str() {
        "OUT" => ParameterDirection::Out,
        "INOUT" => ParameterDirection::InOut,
        "IN" if followed_by_out => ParameterDirection::InOut,
        _ => ParameterDirection::In,
    }
}

/// Contents of an unlabelled block, or the statement itself.
fn unwrap_block(statement: Statement) -> Vec<Statement> {
    match statement {
        Statement::Block(block) if block.label.is_none() => block.statements,
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::dialect::DatabaseType;
    use crate::model::{ObjectKind, ParameterDirection, Script, Statement, TriggerEvent, TriggerTiming};
    use crate::parser::parse;

    #[test]
    fn test_tsql_procedure() {
        let script = parse(
            "CREATE PROCEDURE dbo.usp_GetOrders @CustomerId INT, @Total MONEY = 0 OUTPUT AS
             BEGIN
               SET NOCOUNT ON
               SELECT @Total = SUM(Amount) FROM dbo.Orders WHERE CustomerId = @CustomerId
             END",
            DatabaseType::SqlServer,
            ObjectKind::Procedure,
        )
        .unwrap();
        let Script::Routine(routine) = script else { unreachable!() };
        assert_eq!(routine.name.qualified_name(), "dbo.usp_GetOrders");
        assert_eq!(routine.parameters.len(), 2);
        assert_eq!(routine.parameters[1].direction, ParameterDirection::Out);
        assert_eq!(routine.parameters[1].default.as_ref().unwrap().symbol, "0");
        assert_eq!(routine.statements.len(), 2);
    }

    #[test]
    fn test_tsql_inline_table_function() {
        let script = parse(
            "CREATE FUNCTION dbo.fn_Active() RETURNS TABLE AS RETURN (SELECT Id FROM dbo.Users WHERE Active = 1)",
            DatabaseType::SqlServer,
            ObjectKind::Function,
        )
        .unwrap();
        let Script::Routine(routine) = script else { unreachable!() };
        assert!(routine.return_table.is_some());
        assert!(matches!(routine.statements[0], Statement::Select(_)));
    }

    #[test]
    fn test_mysql_function() {
        let script = parse(
            "CREATE DEFINER=`root`@`localhost` FUNCTION add_days(d DATE, n INT) RETURNS DATE DETERMINISTIC
             BEGIN
               RETURN DATE_ADD(d, INTERVAL n DAY);
             END",
            DatabaseType::MySql,
            ObjectKind::Function,
        )
        .unwrap();
        let Script::Routine(routine) = script else { unreachable!() };
        assert_eq!(routine.return_type.as_ref().unwrap().symbol, "DATE");
        assert_eq!(routine.parameters[1].name.symbol, "n");
        assert!(matches!(routine.statements[0], Statement::Return(_)));
    }

    #[test]
    fn test_pg_function_with_dollar_body() {
        let script = parse(
            "CREATE OR REPLACE FUNCTION public.order_count(p_customer INTEGER, OUT total BIGINT)
             AS $$
             DECLARE
               n BIGINT;
             BEGIN
               SELECT COUNT(*) INTO n FROM orders WHERE customer_id = p_customer;
               total := n;
             END;
             $$ LANGUAGE plpgsql;",
            DatabaseType::Postgres,
            ObjectKind::Function,
        )
        .unwrap();
        let Script::Routine(routine) = script else { unreachable!() };
        assert_eq!(routine.parameters[1].direction, ParameterDirection::Out);
        assert_eq!(routine.statements.len(), 3);
        let Statement::Select(select) = &routine.statements[1] else { unreachable!() };
        assert_eq!(select.into[0].symbol, "n");
    }

    #[test]
    fn test_oracle_procedure() {
        let script = parse(
            "CREATE OR REPLACE PROCEDURE hr.raise_salary(p_id IN NUMBER, p_pct IN OUT NUMBER) IS
               v_sal employees.salary%TYPE;
             BEGIN
               SELECT salary INTO v_sal FROM employees WHERE id = p_id;
               UPDATE employees SET salary = v_sal * (1 + p_pct / 100) WHERE id = p_id;
             EXCEPTION
               WHEN NO_DATA_FOUND THEN NULL;
             END raise_salary;",
            DatabaseType::Oracle,
            ObjectKind::Procedure,
        )
        .unwrap();
        let Script::Routine(routine) = script else { unreachable!() };
        assert_eq!(routine.parameters[1].direction, ParameterDirection::InOut);
        assert_eq!(routine.statements.len(), 4);
        assert!(matches!(routine.statements[3], Statement::Exception(_)));
    }

    #[test]
    fn test_oracle_view_with_cte_is_rejected() {
        let err = parse(
            "CREATE VIEW v AS WITH x AS (SELECT 1 a FROM dual) SELECT a FROM x",
            DatabaseType::Oracle,
            ObjectKind::View,
        )
        .unwrap_err();
        assert_eq!(err.items()[0].text, "WITH");
    }

    #[test]
    fn test_mysql_trigger() {
        let script = parse(
            "CREATE TRIGGER trg_audit AFTER UPDATE ON accounts FOR EACH ROW
             INSERT INTO audit (id, old_balance) VALUES (OLD.id, OLD.balance)",
            DatabaseType::MySql,
            ObjectKind::Trigger,
        )
        .unwrap();
        let Script::Trigger(trigger) = script else { unreachable!() };
        assert_eq!(trigger.timing, TriggerTiming::After);
        assert_eq!(trigger.events, vec![TriggerEvent::Update]);
        assert!(trigger.for_each_row);
        assert_eq!(trigger.statements.len(), 1);
    }

    #[test]
    fn test_pg_trigger_with_function() {
        let script = parse(
            "CREATE FUNCTION trg_touch() RETURNS trigger AS $$
             BEGIN
               NEW.updated_at := now();
               RETURN NEW;
             END;
             $$ LANGUAGE plpgsql;
             CREATE TRIGGER touch BEFORE INSERT OR UPDATE ON items FOR EACH ROW EXECUTE FUNCTION trg_touch();",
            DatabaseType::Postgres,
            ObjectKind::Trigger,
        )
        .unwrap();
        let Script::Trigger(trigger) = script else { unreachable!() };
        assert_eq!(trigger.events, vec![TriggerEvent::Insert, TriggerEvent::Update]);
        assert_eq!(trigger.statements.len(), 2);
        assert!(matches!(trigger.statements[0], Statement::Set(_)));
    }
}
