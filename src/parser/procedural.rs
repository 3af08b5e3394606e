//! Control flow, declarations and the other procedural statements.

use crate::dialect::DatabaseType;
use crate::model::{
    BlockStatement, CallStatement, CaseItem, CaseStatement, CursorStatement,
    DeclareCursorStatement, DeclareHandlerStatement, DeclareVariableStatement, ExceptionHandler,
    ExceptionStatement, ExecuteDynamicStatement, FetchCursorStatement, ForHeader, GotoStatement,
    IfItem, IfItemKind, IfStatement, LabelStatement, LoopExitKind, LoopExitStatement, LoopKind,
    LoopStatement, NameRole, PrepareStatement, PrintStatement, RaiseStatement, ReturnStatement,
    SelectStatement, SetStatement, Statement, Token, TokenKind, TransactionKind,
    TransactionStatement, TryCatchStatement, WhileStatement,
};

use super::expr::{self, ExprContext};
use super::lexer::{Lexeme, LexemeKind};
use super::{PResult, Parser, word_in};

const LOOP_WORDS: &[&str] = &["LOOP", "WHILE", "REPEAT", "FOR", "BEGIN", "DECLARE"];

impl<'a> Parser<'a> {
    fn is_plsql(&self) -> bool {
        matches!(self.dialect, DatabaseType::Postgres | DatabaseType::Oracle)
    }

    fn lexeme_token(l: &Lexeme, kind: TokenKind) -> Token {
        Token::with_span(l.text, kind, l.start, l.stop)
    }

    fn nothing(&self) -> bool {
        self.at_end() || self.at_punct(";")
    }

    pub(super) fn procedural_statement(&mut self) -> PResult<Vec<Statement>> {
        let Some(first) = self.peek().copied() else {
            return Err(self.error_here("expected a statement"));
        };

        if first.is_op("<<") && self.is_plsql() {
            return self.plsql_label();
        }
        if first.is_name() {
            if let Some(statement) = self.assignment()? {
                return Ok(vec![statement]);
            }
            if first.kind == LexemeKind::Word && self.peek_at(1).is_some_and(|l| l.is_punct(":")) {
                return self.colon_label(first);
            }
        }
        if first.kind != LexemeKind::Word {
            return Err(self.error_here("expected a statement"));
        }

        let statement = match first.text.to_uppercase().as_str() {
            "IF" => self.if_statement()?,
            "CASE" => self.case_statement()?,
            "WHILE" => self.while_statement(None)?,
            "LOOP" => self.loop_statement(None)?,
            "REPEAT" => self.repeat_statement(None)?,
            "FOR" if self.is_plsql() => self.for_statement(None)?,
            "BEGIN" => return self.begin(None),
            "DECLARE" => return self.declare(),
            "SET" => return self.set(),
            "OPEN" => self.open_cursor()?,
            "FETCH" => self.fetch_cursor()?,
            "CLOSE" => {
                self.pos += 1;
                Statement::CloseCursor(CursorStatement {
                    name: self.name(NameRole::Cursor)?,
                })
            }
            "DEALLOCATE" => self.deallocate()?,
            "RETURN" => self.return_statement()?,
            "PRINT" => {
                self.pos += 1;
                Statement::Print(PrintStatement {
                    content: self.require_expr(&|_| false, "a value")?,
                })
            }
            "EXEC" | "EXECUTE" => self.execute()?,
            "CALL" => {
                self.pos += 1;
                self.call(None)?
            }
            "PREPARE" => self.prepare()?,
            "GOTO" => {
                self.pos += 1;
                Statement::Goto(GotoStatement {
                    label: self.simple_name(TokenKind::Label)?,
                })
            }
            "BREAK" | "LEAVE" | "EXIT" => self.loop_exit(LoopExitKind::Break)?,
            "CONTINUE" | "ITERATE" => self.loop_exit(LoopExitKind::Continue)?,
            "RAISERROR" => self.raiserror()?,
            "THROW" => self.throw()?,
            "SIGNAL" | "RESIGNAL" => self.signal()?,
            "RAISE" if self.is_plsql() => self.raise()?,
            "PERFORM" if self.dialect == DatabaseType::Postgres => {
                self.pos += 1;
                Statement::Select(self.select_rest(SelectStatement::new(Vec::new()))?)
            }
            "GET" if self.at_words(&["GET", "DIAGNOSTICS"]) => self.get_diagnostics()?,
            "NULL" if self.is_plsql() => {
                self.pos += 1;
                Statement::Other(crate::model::OtherStatement {
                    content: Self::lexeme_token(&first, TokenKind::Keyword),
                    dialect: Some(self.dialect),
                })
            }
            "SAVE" | "USE" | "WAITFOR" | "PRAGMA" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                self.dialect_other()?
            }
            _ if self.is_plsql() => self.plsql_call(first)?,
            _ => return Err(self.error_here("unknown statement")),
        };
        Ok(vec![statement])
    }

    // ---- assignments and labels ---------------------------------------

    /// `v := expr` (PL/SQL, PL/pgSQL) or `v = expr` (PL/pgSQL).
    fn assignment(&mut self) -> PResult<Option<Statement>> {
        if !self.is_plsql() {
            return Ok(None);
        }
        let end = expr::name_end(&self.lx, self.pos);
        let assigns = self.lx.get(end).is_some_and(|l| {
            l.is_op(":=") || (self.dialect == DatabaseType::Postgres && l.is_op("="))
        });
        if !assigns {
            return Ok(None);
        }
        let name = self.expr(self.pos..end, ExprContext::General);
        self.pos = end + 1;
        let value = self.require_expr(&|_| false, "a value")?;
        Ok(Some(Statement::Set(SetStatement { name, value })))
    }

    /// `lbl:` before a loop or block (MySQL) or as a goto target (T-SQL).
    fn colon_label(&mut self, first: Lexeme) -> PResult<Vec<Statement>> {
        let label = Self::lexeme_token(&first, TokenKind::Label);
        self.pos += 2;
        if self.dialect == DatabaseType::MySql && self.at_any_word(LOOP_WORDS) {
            return self.labelled(label);
        }
        Ok(vec![Statement::Label(LabelStatement { name: label })])
    }

    /// `<<lbl>>` before a loop or block, or alone as a goto target.
    fn plsql_label(&mut self) -> PResult<Vec<Statement>> {
        self.pos += 1;
        let label = self.simple_name(TokenKind::Label)?;
        if !self.eat_op(">>") {
            return Err(self.error_here("expected '>>'"));
        }
        if self.at_any_word(LOOP_WORDS) {
            return self.labelled(label);
        }
        Ok(vec![Statement::Label(LabelStatement { name: label })])
    }

    fn labelled(&mut self, label: Token) -> PResult<Vec<Statement>> {
        let label = Some(label);
        let statement = match self.peek().map(|l| l.text.to_uppercase()).as_deref() {
            Some("LOOP") => self.loop_statement(label)?,
            Some("WHILE") => self.while_statement(label)?,
            Some("REPEAT") => self.repeat_statement(label)?,
            Some("FOR") => self.for_statement(label)?,
            _ => return self.begin(label),
        };
        Ok(vec![statement])
    }

    /// Optional label after `END`, `END LOOP` …
    fn end_label(&mut self) {
        if self.dialect == DatabaseType::SqlServer {
            return;
        }
        let labelled = self.peek().is_some_and(|l| l.kind == LexemeKind::Word || l.kind == LexemeKind::QuotedIdent)
            && self.peek_at(1).is_none_or(|l| l.is_punct(";"));
        if labelled {
            self.pos += 1;
        }
    }

    // ---- conditionals -------------------------------------------------

    fn if_statement(&mut self) -> PResult<Statement> {
        self.expect_word("IF")?;
        if self.dialect == DatabaseType::SqlServer {
            return self.tsql_if();
        }
        let mut items = Vec::new();
        let mut kind = IfItemKind::If;
        loop {
            let condition = self.require_expr(&|l| l.is_word("THEN"), "a condition")?;
            self.expect_word("THEN")?;
            let statements = self.statements_until(&["ELSIF", "ELSEIF", "ELSE", "END"])?;
            items.push(IfItem {
                kind,
                condition: Some(condition),
                statements,
            });
            if self.eat_word("ELSIF") || self.eat_word("ELSEIF") {
                kind = IfItemKind::ElseIf;
                continue;
            }
            break;
        }
        if self.eat_word("ELSE") {
            let statements = self.statements_until(&["END"])?;
            items.push(IfItem {
                kind: IfItemKind::Else,
                condition: None,
                statements,
            });
        }
        self.expect_word("END")?;
        self.expect_word("IF")?;
        Ok(Statement::If(IfStatement { items }))
    }

    fn tsql_if(&mut self) -> PResult<Statement> {
        let condition = self.require_expr(&|_| false, "a condition")?;
        let statements = self.tsql_branch()?;
        let mut items = vec![IfItem {
            kind: IfItemKind::If,
            condition: Some(condition),
            statements,
        }];
        let save = self.pos;
        self.eat_punct(";");
        if self.eat_word("ELSE") {
            if self.eat_word("IF") {
                let Statement::If(nested) = self.tsql_if()? else {
                    return Err(self.error_here("expected IF"));
                };
                for (i, mut item) in nested.items.into_iter().enumerate() {
                    if i == 0 {
                        item.kind = IfItemKind::ElseIf;
                    }
                    items.push(item);
                }
            } else {
                items.push(IfItem {
                    kind: IfItemKind::Else,
                    condition: None,
                    statements: self.tsql_branch()?,
                });
            }
        } else {
            self.pos = save;
        }
        Ok(Statement::If(IfStatement { items }))
    }

    /// A single T-SQL statement, or the contents of a `BEGIN … END` block.
    fn tsql_branch(&mut self) -> PResult<Vec<Statement>> {
        let plain_block = self.at_word("BEGIN")
            && !self
                .peek_at(1)
                .is_some_and(|l| word_in(l, &["TRY", "TRAN", "TRANSACTION", "DISTRIBUTED", "CATCH"]));
        if plain_block {
            self.pos += 1;
            let statements = self.statements_until(&["END"])?;
            self.expect_word("END")?;
            return Ok(statements);
        }
        while self.eat_punct(";") {}
        self.statement()
    }

    fn case_statement(&mut self) -> PResult<Statement> {
        self.expect_word("CASE")?;
        let variable = if self.at_word("WHEN") {
            None
        } else {
            Some(self.require_expr(&|l| l.is_word("WHEN"), "a value")?)
        };
        let mut items = Vec::new();
        while self.eat_word("WHEN") {
            let condition = self.require_expr(&|l| l.is_word("THEN"), "a condition")?;
            self.expect_word("THEN")?;
            items.push(CaseItem {
                condition: Some(condition),
                statements: self.statements_until(&["WHEN", "ELSE", "END"])?,
            });
        }
        if self.eat_word("ELSE") {
            items.push(CaseItem {
                condition: None,
                statements: self.statements_until(&["END"])?,
            });
        }
        if items.is_empty() {
            return Err(self.error_here("expected WHEN"));
        }
        self.expect_word("END")?;
        self.expect_word("CASE")?;
        Ok(Statement::Case(CaseStatement { variable, items }))
    }

    // ---- loops --------------------------------------------------------

    fn while_statement(&mut self, label: Option<Token>) -> PResult<Statement> {
        self.expect_word("WHILE")?;
        let statement = match self.dialect {
            DatabaseType::SqlServer => {
                let condition = self.require_expr(&|_| false, "a condition")?;
                let statements = self.tsql_branch()?;
                WhileStatement {
                    label,
                    condition,
                    statements,
                }
            }
            DatabaseType::MySql => {
                let condition = self.require_expr(&|l| l.is_word("DO"), "a condition")?;
                self.expect_word("DO")?;
                let statements = self.statements_until(&["END"])?;
                self.expect_word("END")?;
                self.expect_word("WHILE")?;
                self.end_label();
                WhileStatement {
                    label,
                    condition,
                    statements,
                }
            }
            _ => {
                let condition = self.require_expr(&|l| l.is_word("LOOP"), "a condition")?;
                let statements = self.loop_body()?;
                WhileStatement {
                    label,
                    condition,
                    statements,
                }
            }
        };
        Ok(Statement::While(statement))
    }

    /// `LOOP statements END LOOP [label]`.
    fn loop_body(&mut self) -> PResult<Vec<Statement>> {
        self.expect_word("LOOP")?;
        let statements = self.statements_until(&["END"])?;
        self.expect_word("END")?;
        self.expect_word("LOOP")?;
        self.end_label();
        Ok(statements)
    }

    fn loop_statement(&mut self, label: Option<Token>) -> PResult<Statement> {
        let statements = self.loop_body()?;
        Ok(Statement::Loop(LoopStatement {
            kind: LoopKind::Loop,
            label,
            header: None,
            condition: None,
            statements,
        }))
    }

    fn repeat_statement(&mut self, label: Option<Token>) -> PResult<Statement> {
        self.expect_word("REPEAT")?;
        let statements = self.statements_until(&["UNTIL"])?;
        self.expect_word("UNTIL")?;
        let condition = self.require_expr(&|l| l.is_word("END"), "a condition")?;
        self.expect_word("END")?;
        self.expect_word("REPEAT")?;
        self.end_label();
        Ok(Statement::Loop(LoopStatement {
            kind: LoopKind::Repeat,
            label,
            header: None,
            condition: Some(condition),
            statements,
        }))
    }

    /// `FOR v IN [REVERSE] lower..upper LOOP` or `FOR r IN cursor|query LOOP`.
    fn for_statement(&mut self, label: Option<Token>) -> PResult<Statement> {
        self.expect_word("FOR")?;
        let variable = self.simple_name(TokenKind::Variable)?;
        self.expect_word("IN")?;
        let reverse = self.eat_word("REVERSE");
        let range = self.collect(&|l| l.is_word("LOOP"));
        if range.is_empty() {
            return Err(self.error_here("expected a loop range"));
        }
        let lexemes = &self.lx[range.clone()];
        let dots = lexemes.iter().position(|l| l.is_op(".."));
        let header = match dots {
            Some(at) => ForHeader {
                variable,
                reverse,
                lower: Some(self.expr(range.start..range.start + at, ExprContext::General)),
                upper: Some(self.expr(range.start + at + 1..range.end, ExprContext::General)),
                source: None,
            },
            None => ForHeader {
                variable,
                reverse,
                lower: None,
                upper: None,
                source: Some(self.expr(range, ExprContext::General)),
            },
        };
        let statements = self.loop_body()?;
        Ok(Statement::Loop(LoopStatement {
            kind: LoopKind::For,
            label,
            header: Some(header),
            condition: None,
            statements,
        }))
    }

    fn loop_exit(&mut self, kind: LoopExitKind) -> PResult<Statement> {
        self.pos += 1;
        let mut exit = LoopExitStatement {
            kind,
            label: None,
            condition: None,
        };
        if self.dialect == DatabaseType::SqlServer {
            return Ok(Statement::LoopExit(exit));
        }
        if self.peek().is_some_and(|l| l.is_name() && !l.is_word("WHEN")) {
            exit.label = Some(self.simple_name(TokenKind::Label)?);
        }
        if self.eat_word("WHEN") {
            exit.condition = Some(self.require_expr(&|_| false, "a condition")?);
        }
        Ok(Statement::LoopExit(exit))
    }

    // ---- blocks -------------------------------------------------------

    fn begin(&mut self, label: Option<Token>) -> PResult<Vec<Statement>> {
        if self.dialect == DatabaseType::SqlServer {
            return self.tsql_begin().map(|s| vec![s]);
        }
        if self.is_plsql() {
            let mut declarations = Vec::new();
            if self.eat_word("DECLARE") {
                declarations = self.declaration_section()?;
            }
            return self.plsql_block(label, declarations).map(|s| vec![s]);
        }
        self.expect_word("BEGIN")?;
        self.eat_words(&["NOT", "ATOMIC"]);
        let statements = self.statements_until(&["END"])?;
        self.expect_word("END")?;
        self.end_label();
        Ok(vec![Statement::Block(BlockStatement { label, statements })])
    }

    fn tsql_begin(&mut self) -> PResult<Statement> {
        self.expect_word("BEGIN")?;
        if self.eat_word("DISTRIBUTED") || self.at_word("TRAN") || self.at_word("TRANSACTION") {
            self.skip_transaction_words();
            return Ok(Statement::Transaction(TransactionStatement {
                kind: TransactionKind::Begin,
            }));
        }
        if self.eat_word("TRY") {
            let try_statements = self.statements_until(&["END"])?;
            self.expect_word("END")?;
            self.expect_word("TRY")?;
            while self.eat_punct(";") {}
            self.expect_word("BEGIN")?;
            self.expect_word("CATCH")?;
            let catch_statements = self.statements_until(&["END"])?;
            self.expect_word("END")?;
            self.expect_word("CATCH")?;
            return Ok(Statement::TryCatch(TryCatchStatement {
                try_statements,
                catch_statements,
            }));
        }
        let statements = self.statements_until(&["END"])?;
        self.expect_word("END")?;
        Ok(Statement::Block(BlockStatement {
            label: None,
            statements,
        }))
    }

    /// `BEGIN statements [EXCEPTION handlers] END [label]`; declarations come first.
    pub(super) fn plsql_block(&mut self, label: Option<Token>, declarations: Vec<Statement>) -> PResult<Statement> {
        self.expect_word("BEGIN")?;
        let mut statements = declarations;
        statements.extend(self.statements_until(&["EXCEPTION", "END"])?);
        if self.eat_word("EXCEPTION") {
            statements.push(self.exception_section()?);
        }
        self.expect_word("END")?;
        self.end_label();
        Ok(Statement::Block(BlockStatement { label, statements }))
    }

    fn exception_section(&mut self) -> PResult<Statement> {
        let mut handlers = Vec::new();
        while self.eat_word("WHEN") {
            let condition = self.require_expr(&|l| l.is_word("THEN"), "an exception name")?;
            self.expect_word("THEN")?;
            let statements = self.statements_until(&["WHEN", "END"])?;
            handlers.push(ExceptionHandler { condition, statements });
        }
        if handlers.is_empty() {
            return Err(self.error_here("expected WHEN"));
        }
        Ok(Statement::Exception(ExceptionStatement { handlers }))
    }

    // ---- declarations -------------------------------------------------

    fn declare(&mut self) -> PResult<Vec<Statement>> {
        match self.dialect {
            DatabaseType::SqlServer => {
                self.pos += 1;
                self.tsql_declare()
            }
            DatabaseType::MySql => {
                self.pos += 1;
                self.mysql_declare()
            }
            _ => self.begin(None),
        }
    }

    fn tsql_declare(&mut self) -> PResult<Vec<Statement>> {
        let start = self.pos - 1;
        if self.peek().is_some_and(|l| l.kind != LexemeKind::Variable)
            && self.peek_at(1).is_some_and(|l| l.is_word("CURSOR") || l.is_word("INSENSITIVE") || l.is_word("SCROLL"))
        {
            let name = self.name(NameRole::Cursor)?;
            while !self.at_word("FOR") {
                if self.advance().is_none() {
                    return Err(self.error_here("expected FOR"));
                }
            }
            self.pos += 1;
            let query = self.select()?;
            return Ok(vec![Statement::DeclareCursor(DeclareCursorStatement {
                name,
                query: Box::new(query),
            })]);
        }
        let mut statements = Vec::new();
        loop {
            let name = self.simple_name(TokenKind::Variable)?;
            self.eat_word("AS");
            if self.at_word("TABLE") || self.at_word("CURSOR") {
                self.pos = start;
                return self.dialect_other().map(|s| vec![s]);
            }
            let data_type = self.data_type()?;
            let default = if self.eat_op("=") {
                Some(self.require_expr(&|l| l.is_punct(","), "a value")?)
            } else {
                None
            };
            statements.push(Statement::Declare(DeclareVariableStatement {
                name,
                data_type,
                default,
            }));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(statements)
    }

    fn mysql_declare(&mut self) -> PResult<Vec<Statement>> {
        if self.at_any_word(&["CONTINUE", "EXIT", "UNDO"]) && self.peek_at(1).is_some_and(|l| l.is_word("HANDLER")) {
            return self.mysql_handler().map(|s| vec![s]);
        }
        if self.peek_at(1).is_some_and(|l| l.is_word("CURSOR")) {
            let name = self.name(NameRole::Cursor)?;
            self.expect_word("CURSOR")?;
            self.expect_word("FOR")?;
            let query = self.select()?;
            return Ok(vec![Statement::DeclareCursor(DeclareCursorStatement {
                name,
                query: Box::new(query),
            })]);
        }
        if self.peek_at(1).is_some_and(|l| l.is_word("CONDITION")) {
            self.pos -= 1;
            return self.dialect_other().map(|s| vec![s]);
        }
        let mut names = vec![self.simple_name(TokenKind::Variable)?];
        while self.eat_punct(",") {
            names.push(self.simple_name(TokenKind::Variable)?);
        }
        let data_type = self.data_type()?;
        let default = if self.eat_word("DEFAULT") {
            Some(self.require_expr(&|_| false, "a value")?)
        } else {
            None
        };
        Ok(names
            .into_iter()
            .map(|name| {
                Statement::Declare(DeclareVariableStatement {
                    name,
                    data_type: data_type.clone(),
                    default: default.clone(),
                })
            })
            .collect())
    }

    fn mysql_handler(&mut self) -> PResult<Statement> {
        let action = self.simple_name(TokenKind::Keyword)?;
        self.expect_word("HANDLER")?;
        self.expect_word("FOR")?;
        let mut conditions = Vec::new();
        loop {
            let Some(first) = self.peek().copied() else {
                return Err(self.error_here("expected a handler condition"));
            };
            if self.at_words(&["NOT", "FOUND"]) {
                let last = self.lx[self.pos + 1];
                conditions.push(Token::with_span("NOT FOUND", TokenKind::Keyword, first.start, last.stop));
                self.pos += 2;
            } else if first.is_word("SQLSTATE") {
                self.pos += 1;
                self.eat_word("VALUE");
                let Some(state) = self.advance() else {
                    return Err(self.error_here("expected a SQLSTATE value"));
                };
                conditions.push(Token::with_span(
                    format!("SQLSTATE {}", state.text),
                    TokenKind::Keyword,
                    first.start,
                    state.stop,
                ));
            } else {
                self.pos += 1;
                let kind = if first.kind == LexemeKind::Number {
                    TokenKind::NumberLiteral
                } else {
                    TokenKind::Keyword
                };
                conditions.push(Self::lexeme_token(&first, kind));
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        let statements = if self.at_word("BEGIN") {
            self.pos += 1;
            let statements = self.statements_until(&["END"])?;
            self.expect_word("END")?;
            statements
        } else {
            self.statement()?
        };
        Ok(Statement::DeclareHandler(DeclareHandlerStatement {
            action,
            conditions,
            statements,
        }))
    }

    /// Declarations of a PL/SQL or PL/pgSQL block, up to `BEGIN`.
    pub(super) fn declaration_section(&mut self) -> PResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while self.eat_punct(";") {}
            if self.at_end() || self.at_word("BEGIN") {
                break;
            }
            self.eat_word("DECLARE");
            if self.at_word("BEGIN") {
                break;
            }
            statements.extend(self.plsql_declaration()?);
            if !self.eat_punct(";") && !self.at_word("BEGIN") {
                return Err(self.error_here("expected ';'"));
            }
        }
        Ok(statements)
    }

    fn plsql_declaration(&mut self) -> PResult<Vec<Statement>> {
        if self.at_any_word(&["PRAGMA", "TYPE", "SUBTYPE", "PROCEDURE", "FUNCTION"])
            || self.peek_at(1).is_some_and(|l| l.is_word("ALIAS"))
        {
            return self.dialect_other().map(|s| vec![s]);
        }
        // Oracle `CURSOR c [(params)] IS select`
        if self.eat_word("CURSOR") {
            let name = self.name(NameRole::Cursor)?;
            if self.at_punct("(") {
                self.skip_group()?;
            }
            self.expect_word("IS")?;
            let query = self.select()?;
            return Ok(vec![Statement::DeclareCursor(DeclareCursorStatement {
                name,
                query: Box::new(query),
            })]);
        }
        // PL/pgSQL `c [NO SCROLL] CURSOR [(params)] FOR select`
        let is_cursor = (1..4)
            .map_while(|i| self.peek_at(i).filter(|l| !l.is_punct(";")))
            .any(|l| l.is_word("CURSOR"));
        if is_cursor {
            let name = self.name(NameRole::Cursor)?;
            while self.advance().is_some_and(|l| !l.is_word("CURSOR")) {}
            if self.at_punct("(") {
                self.skip_group()?;
            }
            if !self.eat_word("FOR") {
                self.expect_word("IS")?;
            }
            let query = self.select()?;
            return Ok(vec![Statement::DeclareCursor(DeclareCursorStatement {
                name,
                query: Box::new(query),
            })]);
        }
        let name = self.simple_name(TokenKind::Variable)?;
        self.eat_word("CONSTANT");
        let data_type = self.data_type()?;
        self.eat_words(&["NOT", "NULL"]);
        let default = if self.eat_op(":=") || self.eat_op("=") || self.eat_word("DEFAULT") {
            Some(self.require_expr(&|_| false, "a value")?)
        } else {
            None
        };
        Ok(vec![Statement::Declare(DeclareVariableStatement {
            name,
            data_type,
            default,
        })])
    }

    // ---- assignment ---------------------------------------------------

    fn set(&mut self) -> PResult<Vec<Statement>> {
        let start = self.pos;
        self.expect_word("SET")?;
        let variable = self.peek().is_some_and(|l| {
            l.kind == LexemeKind::Variable && !l.text.starts_with("@@")
                || self.dialect == DatabaseType::MySql && l.kind == LexemeKind::Word
        });
        let assigns = self
            .peek_at(1)
            .is_some_and(|l| matches!(l.text, "=" | ":=" | "+=" | "-=" | "*=" | "/=") && l.kind == LexemeKind::Operator);
        if !variable || !assigns || self.at_any_word(&["NAMES", "CHARACTER", "SESSION", "GLOBAL", "TRANSACTION"]) {
            self.pos = start;
            return self.dialect_other().map(|s| vec![s]);
        }
        let mut statements = Vec::new();
        loop {
            let name = self.simple_name(TokenKind::Variable)?;
            let Some(op) = self.advance() else {
                return Err(self.error_here("expected '='"));
            };
            let value = self.require_expr(&|l| l.is_punct(","), "a value")?;
            let value = match op.text {
                "=" | ":=" => value,
                compound => super::compound_value(&name, &compound[..1], value),
            };
            statements.push(Statement::Set(SetStatement { name, value }));
            if self.dialect != DatabaseType::MySql || !self.eat_punct(",") {
                break;
            }
        }
        Ok(statements)
    }

    // ---- cursors ------------------------------------------------------

    fn open_cursor(&mut self) -> PResult<Statement> {
        self.expect_word("OPEN")?;
        if self.peek_at(1).is_some_and(|l| l.is_word("FOR") || l.is_punct("(") || l.is_word("SCROLL") || l.is_word("NO")) {
            self.pos -= 1;
            return self.dialect_other();
        }
        Ok(Statement::OpenCursor(CursorStatement {
            name: self.name(NameRole::Cursor)?,
        }))
    }

    fn fetch_cursor(&mut self) -> PResult<Statement> {
        self.expect_word("FETCH")?;
        while self.at_any_word(&["NEXT", "PRIOR", "FIRST", "LAST"]) {
            self.pos += 1;
        }
        if !self.eat_word("FROM") {
            self.eat_word("IN");
        }
        let name = self.name(NameRole::Cursor)?;
        self.eat_words(&["BULK", "COLLECT"]);
        let into = if self.eat_word("INTO") {
            let range = self.collect(&|l| l.is_word("LIMIT"));
            self.expr_list(range, ExprContext::General)
        } else {
            Vec::new()
        };
        if self.eat_word("LIMIT") {
            self.collect(&|_| false);
        }
        Ok(Statement::FetchCursor(FetchCursorStatement { name, into }))
    }

    fn deallocate(&mut self) -> PResult<Statement> {
        self.expect_word("DEALLOCATE")?;
        if self.eat_word("PREPARE") {
            return Ok(Statement::Prepare(PrepareStatement {
                name: self.simple_name(TokenKind::General)?,
                source: None,
            }));
        }
        Ok(Statement::DeallocateCursor(CursorStatement {
            name: self.name(NameRole::Cursor)?,
        }))
    }

    // ---- routine exits and errors -------------------------------------

    fn return_statement(&mut self) -> PResult<Statement> {
        self.expect_word("RETURN")?;
        if self.dialect == DatabaseType::Postgres && self.at_any_word(&["NEXT", "QUERY"]) {
            self.pos -= 1;
            return self.dialect_other();
        }
        let value = if self.nothing() || self.at_any_word(super::BLOCK_END) || self.is_statement_start(self.pos) {
            None
        } else {
            Some(self.require_expr(&|_| false, "a value")?)
        };
        Ok(Statement::Return(ReturnStatement { value }))
    }

    fn raiserror(&mut self) -> PResult<Statement> {
        self.expect_word("RAISERROR")?;
        let inner = self.skip_group()?;
        let args = self.expr_list(inner, ExprContext::General);
        if self.eat_word("WITH") {
            while self.peek().is_some_and(|l| l.kind == LexemeKind::Word && !self.is_statement_start(self.pos) || l.is_punct(",")) {
                self.pos += 1;
            }
        }
        let first = args.into_iter().next();
        let (code, message) = match first {
            Some(t) if t.kind == TokenKind::NumberLiteral => (Some(t), None),
            other => (None, other),
        };
        Ok(Statement::Raise(RaiseStatement {
            code,
            message,
            exception: None,
        }))
    }

    fn throw(&mut self) -> PResult<Statement> {
        self.expect_word("THROW")?;
        let mut raise = RaiseStatement {
            code: None,
            message: None,
            exception: None,
        };
        if self.nothing() || self.is_statement_start(self.pos) || self.at_any_word(super::BLOCK_END) {
            return Ok(Statement::Raise(raise));
        }
        let range = self.collect(&|_| false);
        let mut args = self.expr_list(range, ExprContext::General).into_iter();
        raise.code = args.next();
        raise.message = args.next();
        Ok(Statement::Raise(raise))
    }

    /// MySQL `SIGNAL SQLSTATE 'xxxxx' SET MESSAGE_TEXT = …`; `RESIGNAL` re-raises.
    fn signal(&mut self) -> PResult<Statement> {
        let resignal = self.peek().is_some_and(|l| l.is_word("RESIGNAL"));
        self.pos += 1;
        let mut raise = RaiseStatement {
            code: None,
            message: None,
            exception: None,
        };
        if self.eat_word("SQLSTATE") {
            self.eat_word("VALUE");
            if let Some(state) = self.advance() {
                raise.code = Some(Self::lexeme_token(&state, TokenKind::StringLiteral));
            }
        } else if !self.nothing() && !self.at_word("SET") {
            raise.exception = Some(self.simple_name(TokenKind::General)?);
        }
        if self.eat_word("SET") {
            loop {
                let item = self.simple_name(TokenKind::General)?;
                if !self.eat_op("=") {
                    return Err(self.error_here("expected '='"));
                }
                let value = self.require_expr(&|l| l.is_punct(","), "a value")?;
                if item.symbol.eq_ignore_ascii_case("MESSAGE_TEXT") {
                    raise.message = Some(value);
                }
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        if resignal && raise.message.is_none() {
            raise.code = None;
        }
        Ok(Statement::Raise(raise))
    }

    /// PL/pgSQL and PL/SQL `RAISE`.
    fn raise(&mut self) -> PResult<Statement> {
        self.expect_word("RAISE")?;
        let mut raise = RaiseStatement {
            code: None,
            message: None,
            exception: None,
        };
        if self.nothing() {
            return Ok(Statement::Raise(raise));
        }
        let level = self
            .peek()
            .filter(|l| word_in(l, &["DEBUG", "LOG", "INFO", "NOTICE", "WARNING", "EXCEPTION"]))
            .map(|l| l.text.to_uppercase());
        if let Some(level) = level {
            self.pos += 1;
            let range = self.collect(&|l| l.is_word("USING"));
            let lexemes = self.lx[range.clone()].to_vec();
            let parts = expr::split_top_level(&lexemes, ",");
            let message = match parts.split_first() {
                Some((format, args)) if format.len() == 1 && format[0].kind == LexemeKind::String => {
                    let args: Vec<Token> = args
                        .iter()
                        .map(|a| self.builder().build(a, ExprContext::General))
                        .collect();
                    format_to_concat(&format[0], args)
                }
                _ => self.expr(range, ExprContext::General),
            };
            if self.eat_word("USING") {
                self.raise_options(&mut raise)?;
            }
            if level == "EXCEPTION" {
                raise.message = Some(message);
                return Ok(Statement::Raise(raise));
            }
            return Ok(Statement::Print(PrintStatement { content: message }));
        }
        if self.at_word("USING") {
            self.pos += 1;
            self.raise_options(&mut raise)?;
            return Ok(Statement::Raise(raise));
        }
        raise.exception = Some(self.require_expr(&|l| l.is_word("USING"), "an exception name")?);
        if self.eat_word("USING") {
            self.raise_options(&mut raise)?;
        }
        Ok(Statement::Raise(raise))
    }

    fn raise_options(&mut self, raise: &mut RaiseStatement) -> PResult<()> {
        loop {
            let option = self.simple_name(TokenKind::General)?;
            if !self.eat_op("=") && !self.eat_op(":=") {
                return Err(self.error_here("expected '='"));
            }
            let value = self.require_expr(&|l| l.is_punct(","), "a value")?;
            match option.symbol.to_uppercase().as_str() {
                "MESSAGE" => raise.message = Some(value),
                "ERRCODE" => raise.code = Some(value),
                _ => {}
            }
            if !self.eat_punct(",") {
                return Ok(());
            }
        }
    }

    fn get_diagnostics(&mut self) -> PResult<Statement> {
        let start = self.pos;
        self.pos += 2;
        let row_count = self.peek().is_some_and(|l| l.is_name())
            && self.peek_at(1).is_some_and(|l| l.is_op("=") || l.is_op(":="))
            && self.peek_at(2).is_some_and(|l| l.is_word("ROW_COUNT"))
            && self.peek_at(3).is_none_or(|l| l.is_punct(";"));
        if !row_count {
            self.pos = start;
            return self.dialect_other();
        }
        let name = self.simple_name(TokenKind::Variable)?;
        self.pos += 1;
        let value = self.simple_name(TokenKind::Variable)?;
        Ok(Statement::Set(SetStatement { name, value }))
    }

    // ---- calls and dynamic SQL ----------------------------------------

    /// Procedure name and arguments; `CALL` is already consumed.
    fn call(&mut self, result: Option<Token>) -> PResult<Statement> {
        let name = self.name(NameRole::Routine)?;
        let args = if self.at_punct("(") {
            let inner = self.skip_group()?;
            self.expr_list(inner, ExprContext::General)
        } else if self.dialect == DatabaseType::SqlServer && !self.nothing() && !self.is_statement_start(self.pos) {
            self.exec_args()?
        } else {
            Vec::new()
        };
        Ok(Statement::Call(CallStatement { result, name, args }))
    }

    /// T-SQL `EXEC proc a, @p = b, @o OUTPUT` arguments.
    fn exec_args(&mut self) -> PResult<Vec<Token>> {
        let range = self.collect(&|_| false);
        let lexemes = self.lx[range].to_vec();
        Ok(expr::split_top_level(&lexemes, ",")
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(|part| {
                let trimmed = match part.split_last() {
                    Some((last, rest)) if !rest.is_empty() && (last.is_word("OUTPUT") || last.is_word("OUT")) => rest,
                    _ => part,
                };
                self.builder().build(trimmed, ExprContext::General)
            })
            .collect())
    }

    fn execute(&mut self) -> PResult<Statement> {
        self.pos += 1;
        match self.dialect {
            DatabaseType::SqlServer => self.tsql_execute(),
            DatabaseType::MySql => {
                let content = self.simple_name(TokenKind::General)?;
                let using = self.using_list()?;
                Ok(Statement::ExecuteDynamic(ExecuteDynamicStatement {
                    content,
                    into: Vec::new(),
                    using,
                    prepared: true,
                }))
            }
            _ => {
                self.eat_word("IMMEDIATE");
                let content = self.require_expr(&|l| word_in(l, &["INTO", "USING"]), "a statement")?;
                let into = if self.eat_word("INTO") {
                    self.eat_word("STRICT");
                    let range = self.collect(&|l| l.is_word("USING"));
                    self.expr_list(range, ExprContext::General)
                } else {
                    Vec::new()
                };
                let using = self.using_list()?;
                Ok(Statement::ExecuteDynamic(ExecuteDynamicStatement {
                    content,
                    into,
                    using,
                    prepared: false,
                }))
            }
        }
    }

    fn using_list(&mut self) -> PResult<Vec<Token>> {
        if !self.eat_word("USING") {
            return Ok(Vec::new());
        }
        let range = self.collect(&|_| false);
        let lexemes: Vec<Lexeme> = self.lx[range]
            .iter()
            .filter(|l| !word_in(l, &["IN", "OUT"]))
            .copied()
            .collect();
        Ok(self.builder().build_list(&lexemes, ExprContext::General))
    }

    fn tsql_execute(&mut self) -> PResult<Statement> {
        if self.at_punct("(") {
            let inner = self.skip_group()?;
            return Ok(Statement::ExecuteDynamic(ExecuteDynamicStatement {
                content: self.expr(inner, ExprContext::General),
                into: Vec::new(),
                using: Vec::new(),
                prepared: false,
            }));
        }
        let result = if self.peek().is_some_and(|l| l.kind == LexemeKind::Variable)
            && self.peek_at(1).is_some_and(|l| l.is_op("="))
        {
            let token = self.simple_name(TokenKind::Variable)?;
            self.pos += 1;
            Some(token)
        } else {
            None
        };
        let end = expr::name_end(&self.lx, self.pos);
        let dynamic = self.lx[self.pos..end.min(self.lx.len())]
            .last()
            .is_some_and(|l| l.text.eq_ignore_ascii_case("sp_executesql"));
        if dynamic && result.is_none() {
            self.name(NameRole::Routine)?;
            let mut args = self.exec_args()?.into_iter();
            let Some(content) = args.next() else {
                return Err(self.error_here("expected a statement"));
            };
            // the parameter definition string is not needed by other dialects
            let using = args.skip(1).collect();
            return Ok(Statement::ExecuteDynamic(ExecuteDynamicStatement {
                content,
                into: Vec::new(),
                using,
                prepared: false,
            }));
        }
        self.call(result)
    }

    fn prepare(&mut self) -> PResult<Statement> {
        self.expect_word("PREPARE")?;
        let name = self.simple_name(TokenKind::General)?;
        self.expect_word("FROM")?;
        let source = self.require_expr(&|_| false, "a statement")?;
        Ok(Statement::Prepare(PrepareStatement {
            name,
            source: Some(source),
        }))
    }

    /// Oracle `proc(args);`, `DBMS_OUTPUT.PUT_LINE(x);` and `RAISE_APPLICATION_ERROR(code, msg);`.
    fn plsql_call(&mut self, first: Lexeme) -> PResult<Statement> {
        let end = expr::name_end(&self.lx, self.pos);
        let callable = self
            .lx
            .get(end)
            .is_none_or(|l| l.is_punct("(") || l.is_punct(";"));
        if !callable || expr::is_keyword(first.text) {
            return Err(self.error_here("unknown statement"));
        }
        let name = self.lx[self.pos..end].iter().map(|l| l.text).collect::<String>();
        let Statement::Call(call) = self.call(None)? else {
            return Err(self.error_here("expected a call"));
        };
        if name.eq_ignore_ascii_case("DBMS_OUTPUT.PUT_LINE") && call.args.len() == 1 {
            return Ok(Statement::Print(PrintStatement {
                content: call.args.into_iter().next().unwrap_or_else(|| Token::new("''", TokenKind::StringLiteral)),
            }));
        }
        if name.eq_ignore_ascii_case("RAISE_APPLICATION_ERROR") && call.args.len() >= 2 {
            let mut args = call.args.into_iter();
            return Ok(Statement::Raise(RaiseStatement {
                code: args.next(),
                message: args.next(),
                exception: None,
            }));
        }
        Ok(Statement::Call(call))
    }
}

/// PL/pgSQL `'a % b %', x, y` as `'a ' || x || ' b ' || y`.
fn format_to_concat(format: &Lexeme, args: Vec<Token>) -> Token {
    let inner = &format.text[1..format.text.len().saturating_sub(1).max(1)];
    let mut pieces: Vec<String> = vec![String::new()];
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            if chars.peek() == Some(&'%') {
                chars.next();
                if let Some(last) = pieces.last_mut() {
                    last.push('%');
                }
            } else {
                pieces.push(String::new());
            }
        } else if let Some(last) = pieces.last_mut() {
            last.push(c);
        }
    }
    if pieces.len() == 1 {
        return Token::with_span(format.text, TokenKind::StringLiteral, format.start, format.stop);
    }
    let mut parts = Vec::new();
    let mut args = args.into_iter();
    for (i, piece) in pieces.iter().enumerate() {
        if i > 0 {
            parts.push(args.next().unwrap_or_else(|| Token::new("''", TokenKind::StringLiteral)));
        }
        if !piece.is_empty() {
            parts.push(Token::new(format!("'{}'", piece), TokenKind::StringLiteral));
        }
    }
    let mut concat = Token::new("", TokenKind::Expression);
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            concat.add_child(Token::new("||", TokenKind::Operator));
        }
        concat.add_child(part);
    }
    concat
}

/// SQLite `SELECT RAISE(ABORT, 'message')` inside a trigger.
pub(super) fn sqlite_raise(select: &SelectStatement) -> Option<Statement> {
    if select.from.is_some() || select.columns.len() != 1 {
        return None;
    }
    let call = &select.columns[0];
    if call.kind != TokenKind::FunctionCall {
        return None;
    }
    let children = call.children();
    if !children
        .first()
        .is_some_and(|n| n.kind == TokenKind::FunctionName && n.symbol.eq_ignore_ascii_case("RAISE"))
    {
        return None;
    }
    let inner = children.get(2..children.len().saturating_sub(1))?;
    let comma = inner.iter().position(|t| t.is_punct(","))?;
    let message = inner.get(comma + 1..)?;
    let message = match message {
        [single] => single.clone(),
        many => {
            let mut expr = Token::new("", TokenKind::Expression);
            for t in many {
                expr.add_child(t.clone());
            }
            expr
        }
    };
    Some(Statement::Raise(RaiseStatement {
        code: None,
        message: Some(message),
        exception: None,
    }))
}

#[cfg(test)]
mod tests {
    use crate::dialect::DatabaseType;
    use crate::model::{IfItemKind, LoopKind, ObjectKind, Script, Statement, TokenKind};
    use crate::parser::parse;

    fn body(text: &str, dialect: DatabaseType) -> Vec<Statement> {
        match parse(text, dialect, ObjectKind::Common).unwrap() {
            Script::Common(script) => script.statements,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_tsql_if_else_chain_is_flattened() {
        let statements = body(
            "IF @a = 1 SET @b = 1 ELSE IF @a = 2 BEGIN SET @b = 2 PRINT 'two' END ELSE SET @b = 3",
            DatabaseType::SqlServer,
        );
        assert_eq!(statements.len(), 1);
        let Statement::If(stmt) = &statements[0] else { unreachable!() };
        let kinds: Vec<IfItemKind> = stmt.items.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IfItemKind::If, IfItemKind::ElseIf, IfItemKind::Else]);
        assert_eq!(stmt.items[1].statements.len(), 2);
    }

    #[test]
    fn test_tsql_try_catch_and_cursor() {
        let statements = body(
            "BEGIN TRY DECLARE c CURSOR LOCAL FOR SELECT id FROM t OPEN c FETCH NEXT FROM c INTO @id CLOSE c DEALLOCATE c END TRY BEGIN CATCH THROW; END CATCH",
            DatabaseType::SqlServer,
        );
        let Statement::TryCatch(tc) = &statements[0] else { unreachable!() };
        assert_eq!(tc.try_statements.len(), 5);
        assert!(matches!(tc.try_statements[2], Statement::FetchCursor(_)));
        assert!(matches!(&tc.catch_statements[0], Statement::Raise(r) if r.message.is_none()));
    }

    #[test]
    fn test_tsql_exec_forms() {
        let statements = body(
            "EXEC @rc = dbo.usp_Load @Id, @Out OUTPUT EXEC (@sql) EXEC sp_executesql @sql, N'@p INT', @p = 1",
            DatabaseType::SqlServer,
        );
        let Statement::Call(call) = &statements[0] else { unreachable!() };
        assert_eq!(call.result.as_ref().unwrap().symbol, "@rc");
        assert_eq!(call.args[1].symbol, "@Out");
        assert!(matches!(statements[1], Statement::ExecuteDynamic(_)));
        let Statement::ExecuteDynamic(dynamic) = &statements[2] else { unreachable!() };
        assert_eq!(dynamic.content.symbol, "@sql");
        assert_eq!(dynamic.using.len(), 1);
    }

    #[test]
    fn test_mysql_loops_and_handler() {
        let statements = body(
            "DECLARE done INT DEFAULT 0;
             DECLARE cur CURSOR FOR SELECT id FROM t;
             DECLARE CONTINUE HANDLER FOR NOT FOUND SET done = 1;
             read_loop: LOOP
               FETCH cur INTO v_id;
               IF done = 1 THEN LEAVE read_loop; END IF;
             END LOOP read_loop;
             REPEAT SET i = i + 1; UNTIL i > 10 END REPEAT;",
            DatabaseType::MySql,
        );
        assert_eq!(statements.len(), 5);
        let Statement::DeclareHandler(handler) = &statements[2] else { unreachable!() };
        assert!(handler.is_not_found());
        let Statement::Loop(lp) = &statements[3] else { unreachable!() };
        assert_eq!(lp.label.as_ref().unwrap().symbol, "read_loop");
        assert_eq!(lp.statements.len(), 2);
        let Statement::Loop(repeat) = &statements[4] else { unreachable!() };
        assert_eq!(repeat.kind, LoopKind::Repeat);
    }

    #[test]
    fn test_plpgsql_block_with_exception() {
        let statements = body(
            "DECLARE n INTEGER := 0; BEGIN
               FOR r IN SELECT id FROM items LOOP n := n + 1; END LOOP;
               RAISE NOTICE 'count %', n;
               GET DIAGNOSTICS n = ROW_COUNT;
             EXCEPTION WHEN others THEN RAISE; END;",
            DatabaseType::Postgres,
        );
        let Statement::Block(block) = &statements[0] else { unreachable!() };
        assert!(matches!(block.statements[0], Statement::Declare(_)));
        let Statement::Loop(lp) = &block.statements[1] else { unreachable!() };
        assert!(lp.header.as_ref().unwrap().source.is_some());
        let Statement::Print(print) = &block.statements[2] else { unreachable!() };
        assert_eq!(print.content.render(), "'count ' || n");
        assert!(matches!(&block.statements[3], Statement::Set(s) if s.value.symbol == "ROW_COUNT"));
        let Statement::Exception(ex) = &block.statements[4] else { unreachable!() };
        assert!(ex.handlers[0].is_others());
    }

    #[test]
    fn test_oracle_calls_and_ranges() {
        let statements = body(
            "BEGIN
               FOR i IN REVERSE 1..10 LOOP DBMS_OUTPUT.PUT_LINE(i); END LOOP;
               log_event('x', SYSDATE);
               RAISE_APPLICATION_ERROR(-20001, 'bad');
             END;",
            DatabaseType::Oracle,
        );
        let Statement::Block(block) = &statements[0] else { unreachable!() };
        let Statement::Loop(lp) = &block.statements[0] else { unreachable!() };
        let header = lp.header.as_ref().unwrap();
        assert!(header.reverse);
        assert_eq!(header.upper.as_ref().unwrap().symbol, "10");
        assert!(matches!(lp.statements[0], Statement::Print(_)));
        let Statement::Call(call) = &block.statements[1] else { unreachable!() };
        assert_eq!(call.name.name(), "log_event");
        assert_eq!(call.args[1].kind, TokenKind::FunctionCall);
        assert!(matches!(&block.statements[2], Statement::Raise(r) if r.message.as_ref().unwrap().symbol == "'bad'"));
    }
}
