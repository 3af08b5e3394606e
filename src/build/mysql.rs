//! MySQL stored program output.
//!
//! MySQL has no exception sections, so error handling arrives here already
//! lowered to `DECLARE … HANDLER`. A `RETURN` from a procedure or trigger body
//! leaves a labelled outer block instead.

use std::ops::Range;

use tracing::warn;

use super::{
    and_conditions, is_plain_sql, is_sqlstate, is_temporary_name, join_tokens, parameter_list, restructure,
    split_declarations, strip_temporary, string_literal, ScriptBuildResult, ScriptBuilder, ScriptWriter, Scope,
    EXIT_LABEL,
};
use crate::dialect::{DatabaseType, split_qualified, unquote};
use crate::error::{TranslateError, TranslateResult};
use crate::model::*;

/// `LIMIT` that stands for "no limit" when only an offset is given.
const ALL_ROWS: &str = "18446744073709551615";

/// Label substituted for [`EXIT_LABEL`].
const BODY_LABEL: &str = "proc_body";

/// User variable holding dynamic SQL text.
const DYNAMIC_SQL: &str = "@dynamic_sql";

/// User variable holding a computed error message.
const ERROR_MESSAGE: &str = "@error_message";

pub struct MySqlBuilder;

fn has_return(statements: &[Statement]) -> bool {
    restructure::contains(statements, &|s| matches!(s, Statement::Return(_)))
}

fn has_exit(statements: &[Statement]) -> bool {
    restructure::contains(statements, &|s| matches!(s, Statement::LoopExit(e) if e.label.is_none()))
}

fn same_table(symbol: &str, table: &NameToken) -> bool {
    split_qualified(symbol)
        .last()
        .is_some_and(|last| unquote(last).eq_ignore_ascii_case(table.bare_name()))
}

/// Whether a `FROM` clause already names the statement's target.
fn names_target(from: &Token, table: &NameToken) -> bool {
    let alias = table.alias().map(|a| a.symbol.as_str());
    from.any(&|t| match t.kind {
        TokenKind::TableName => same_table(&t.symbol, table),
        TokenKind::TableAlias => {
            same_table(&t.symbol, table) || alias.is_some_and(|a| a.eq_ignore_ascii_case(&t.symbol))
        }
        _ => false,
    })
}

fn label_prefix(label: &Option<String>) -> String {
    label.as_ref().map(|l| format!("{}: ", l)).unwrap_or_default()
}

fn label_suffix(label: &Option<String>) -> String {
    label.as_ref().map(|l| format!(" {}", l)).unwrap_or_default()
}

impl MySqlBuilder {
    fn parameter(&self, parameter: &Parameter, routine: RoutineKind) -> String {
        if let Some(default) = &parameter.default {
            warn!(parameter = %parameter.name, default = %default, "parameter default dropped");
        }
        let mode = match (routine, parameter.direction) {
            (RoutineKind::Function, _) => "",
            (_, ParameterDirection::In) => "IN ",
            (_, ParameterDirection::Out) => "OUT ",
            (_, ParameterDirection::InOut) => "INOUT ",
        };
        format!("{}{} {}", mode, parameter.name.render(), parameter.data_type.render())
    }

    /// `[label:] BEGIN … END;` of a stored program, labelled when the body returns early.
    fn program_body(
        &self,
        statements: &[Statement],
        out: &mut ScriptWriter,
        scope: &Scope,
    ) -> TranslateResult<(Range<usize>, bool)> {
        let labelled = scope.kind != ObjectKind::Function && has_return(statements);
        if labelled {
            out.line(format!("{}: BEGIN", EXIT_LABEL));
        } else {
            out.line("BEGIN");
        }
        let start = out.offset();
        out.indented(|out| self.body(statements, out, scope))?;
        let stop = out.offset();
        if labelled {
            out.line(format!("END {};", EXIT_LABEL));
        } else {
            out.line("END;");
        }
        Ok((start..stop, labelled))
    }

    /// Label for a loop, generated when the body exits without naming one.
    fn loop_name(&self, label: &Option<Token>, statements: &[Statement], scope: &Scope) -> Option<String> {
        match label {
            Some(label) => Some(label.render()),
            None if has_exit(statements) => Some(scope.generated_label()),
            None => None,
        }
    }

    fn qualified_target(&self, name: &Token, table: &NameToken) -> String {
        let text = name.render();
        if text.contains('.') {
            return text;
        }
        let qualifier = table
            .alias()
            .map(|a| a.symbol.clone())
            .unwrap_or_else(|| table.qualified_name());
        format!("{}.{}", qualifier, text)
    }
}

impl ScriptBuilder for MySqlBuilder {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::MySql
    }

    fn generate_routine_scripts(&self, routine: &RoutineScript) -> TranslateResult<ScriptBuildResult> {
        let mut statements = routine.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let parameters = routine
            .parameters
            .iter()
            .map(|p| self.parameter(p, routine.kind))
            .collect();
        let mut out = ScriptWriter::new();
        let scope = match routine.kind {
            RoutineKind::Procedure => {
                out.line(format!(
                    "CREATE PROCEDURE {}{}",
                    routine.name.qualified_name(),
                    parameter_list(parameters, true)
                ));
                Scope::new(ObjectKind::Procedure)
            }
            RoutineKind::Function => {
                out.line(format!(
                    "CREATE FUNCTION {}{}",
                    routine.name.qualified_name(),
                    parameter_list(parameters, true)
                ));
                let return_type = routine
                    .return_type
                    .as_ref()
                    .ok_or_else(|| TranslateError::unsupported("function without a return type", self.dialect()))?;
                out.line(format!("RETURNS {}", return_type.render()));
                Scope::new(ObjectKind::Function)
            }
        };
        let (body, labelled) = self.program_body(&statements, &mut out, &scope)?;
        let result = ScriptBuildResult::from_writer(out, body);
        Ok(if labelled {
            result.with_replacement(EXIT_LABEL, BODY_LABEL)
        } else {
            result
        })
    }

    fn generate_trigger_scripts(&self, trigger: &TriggerScript) -> TranslateResult<ScriptBuildResult> {
        let timing = match trigger.timing {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => {
                return Err(TranslateError::unsupported("INSTEAD OF trigger", self.dialect()));
            }
        };
        if !trigger.for_each_row {
            warn!(trigger = %trigger.name, "statement level trigger created as row level trigger");
        }
        let mut statements = trigger.statements.clone();
        if matches!(statements.last(), Some(Statement::Return(_))) {
            statements.pop();
        }
        if let Some(condition) = &trigger.condition {
            statements = vec![Statement::If(IfStatement {
                items: vec![IfItem {
                    kind: IfItemKind::If,
                    condition: Some(condition.clone()),
                    statements,
                }],
            })];
        }
        restructure::prepare(&mut statements, self.dialect());
        let scope = Scope::new(ObjectKind::Trigger);
        let mut out = ScriptWriter::new();
        let mut first_body: Option<Range<usize>> = None;
        let mut labelled = false;
        for (i, event) in trigger.events.iter().enumerate() {
            if i > 0 {
                out.line("");
            }
            let name = if trigger.events.len() > 1 {
                format!("{}_{}", trigger.name.qualified_name(), event.keyword().to_lowercase())
            } else {
                trigger.name.qualified_name()
            };
            out.line(format!("CREATE TRIGGER {}", name));
            out.line(format!("{} {} ON {}", timing, event.keyword(), trigger.table.qualified_name()));
            out.line("FOR EACH ROW");
            let (body, body_labelled) = self.program_body(&statements, &mut out, &scope)?;
            labelled |= body_labelled;
            first_body.get_or_insert(body);
        }
        let result = ScriptBuildResult::from_writer(out, first_body.unwrap_or(0..0));
        Ok(if labelled {
            result.with_replacement(EXIT_LABEL, BODY_LABEL)
        } else {
            result
        })
    }

    fn generate_common_scripts(&self, script: &CommonScript) -> TranslateResult<ScriptBuildResult> {
        if !script.statements.iter().all(is_plain_sql) {
            return Err(TranslateError::unsupported("procedural statements outside a stored program", self.dialect()));
        }
        let scope = Scope::new(ObjectKind::Common);
        let mut out = ScriptWriter::new();
        self.statements(&script.statements, &mut out, &scope)?;
        let stop = out.offset();
        Ok(ScriptBuildResult::from_writer(out, 0..stop))
    }

    // ---- queries ----

    fn limit_clause(&self, select: &SelectStatement) -> TranslateResult<Option<String>> {
        if select.limit_percent {
            return Err(TranslateError::unsupported("row limit in percent", self.dialect()));
        }
        Ok(match (&select.limit, &select.offset) {
            (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit.render(), offset.render())),
            (Some(limit), None) => Some(format!("LIMIT {}", limit.render())),
            (None, Some(offset)) => Some(format!("LIMIT {} OFFSET {}", ALL_ROWS, offset.render())),
            (None, None) => None,
        })
    }

    fn update_text(&self, update: &UpdateStatement) -> TranslateResult<String> {
        if update.is_composite() {
            return self.composite_update(update);
        }
        let tables = match (&update.joins, &update.from) {
            (Some(joins), _) => format!("{} {}", update.table.render(), joins.render()),
            (None, Some(from)) if names_target(from, &update.table) => from.render(),
            (None, Some(from)) => format!("{}, {}", update.table.render(), from.render()),
            (None, None) => update.table.render(),
        };
        let mut sql = format!("UPDATE {} SET {}", tables, self.set_items(&update.items)?);
        if let Some(w) = &update.where_clause {
            sql.push_str(&format!(" WHERE {}", w.render()));
        }
        Ok(sql)
    }

    fn composite_update(&self, update: &UpdateStatement) -> TranslateResult<String> {
        let Some(expanded) = restructure::expand_composite(update) else {
            let mut sql = format!("UPDATE {} SET {}", update.table.render(), self.scalar_set_items(&update.items)?);
            if let Some(w) = &update.where_clause {
                sql.push_str(&format!(" WHERE {}", w.render()));
            }
            return Ok(sql);
        };
        let assignments: Vec<String> = expanded
            .assignments
            .iter()
            .map(|(name, value)| format!("{} = {}", self.qualified_target(name, &update.table), value))
            .collect();
        let mut tables = update.table.render();
        if let Some(from) = &expanded.from {
            tables.push_str(&format!(", {}", from.render()));
        }
        let mut sql = format!("UPDATE {} SET {}", tables, assignments.join(", "));
        if let Some(condition) = and_conditions(&expanded.conditions) {
            sql.push_str(&format!(" WHERE {}", condition));
        }
        Ok(sql)
    }

    fn delete_text(&self, delete: &DeleteStatement) -> TranslateResult<String> {
        let mut sql = match &delete.from {
            Some(from) => {
                let target = delete
                    .table
                    .alias()
                    .map(Token::render)
                    .unwrap_or_else(|| delete.table.qualified_name());
                if names_target(from, &delete.table) {
                    format!("DELETE {} FROM {}", target, from.render())
                } else {
                    format!("DELETE {} FROM {}, {}", target, delete.table.render(), from.render())
                }
            }
            None => format!("DELETE FROM {}", delete.table.render()),
        };
        if let Some(w) = &delete.where_clause {
            sql.push_str(&format!(" WHERE {}", w.render()));
        }
        Ok(sql)
    }

    // ---- control flow ----

    fn else_if_keyword(&self) -> &'static str {
        "ELSEIF"
    }

    fn case_statement(&self, statement: &CaseStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        match &statement.variable {
            Some(v) => out.line(format!("CASE {}", v.render())),
            None => out.line("CASE"),
        }
        out.indented(|out| {
            for item in &statement.items {
                match &item.condition {
                    Some(c) => out.line(format!("WHEN {} THEN", c.render())),
                    None => out.line("ELSE"),
                }
                out.indented(|out| self.body(&item.statements, out, scope))?;
            }
            if !statement.items.iter().any(|i| i.condition.is_none()) {
                // MySQL raises "Case not found" when no branch matches.
                out.line("ELSE");
                out.indented(|out| {
                    out.line("BEGIN");
                    out.line("END;");
                    Ok(())
                })?;
            }
            Ok(())
        })?;
        out.line("END CASE;");
        Ok(())
    }

    fn while_statement(&self, statement: &WhileStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        let label = self.loop_name(&statement.label, &statement.statements, scope);
        let inner = scope.enter_loop(label.clone().unwrap_or_default());
        out.line(format!("{}WHILE {} DO", label_prefix(&label), statement.condition.render()));
        out.indented(|out| self.statements(&statement.statements, out, &inner))?;
        out.line(format!("END WHILE{};", label_suffix(&label)));
        Ok(())
    }

    fn loop_statement(&self, statement: &LoopStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        match (statement.kind, &statement.header) {
            (LoopKind::For, Some(header)) => {
                let (Some(lower), Some(upper)) = (&header.lower, &header.upper) else {
                    return Err(TranslateError::unsupported("FOR loop over a query", self.dialect()));
                };
                let label = self.loop_name(&statement.label, &statement.statements, scope);
                let inner = scope.enter_loop(label.clone().unwrap_or_default());
                let variable = header.variable.render();
                let (from, to, step, compare) = if header.reverse {
                    (upper, lower, "-", ">=")
                } else {
                    (lower, upper, "+", "<=")
                };
                out.line(format!("SET {} = {};", variable, from.render()));
                out.line(format!("{}WHILE {} {} {} DO", label_prefix(&label), variable, compare, to.render()));
                out.indented(|out| {
                    self.statements(&statement.statements, out, &inner)?;
                    out.line(format!("SET {0} = {0} {1} 1;", variable, step));
                    Ok(())
                })?;
                out.line(format!("END WHILE{};", label_suffix(&label)));
            }
            (LoopKind::Repeat, _) => {
                let label = self.loop_name(&statement.label, &statement.statements, scope);
                let inner = scope.enter_loop(label.clone().unwrap_or_default());
                out.line(format!("{}REPEAT", label_prefix(&label)));
                out.indented(|out| self.statements(&statement.statements, out, &inner))?;
                let condition = statement
                    .condition
                    .as_ref()
                    .map(Token::render)
                    .unwrap_or_else(|| "FALSE".to_string());
                out.line(format!("UNTIL {}", condition));
                out.line(format!("END REPEAT{};", label_suffix(&label)));
            }
            _ => {
                let label = statement
                    .label
                    .as_ref()
                    .map(Token::render)
                    .unwrap_or_else(|| scope.generated_label());
                let inner = scope.enter_loop(label.clone());
                out.line(format!("{}: LOOP", label));
                out.indented(|out| self.statements(&statement.statements, out, &inner))?;
                out.line(format!("END LOOP {};", label));
            }
        }
        Ok(())
    }

    fn loop_exit(&self, statement: &LoopExitStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        let label = match &statement.label {
            Some(label) => label.render(),
            None => scope
                .innermost_loop()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .ok_or_else(|| TranslateError::unsupported("loop exit outside a loop", self.dialect()))?,
        };
        let keyword = match statement.kind {
            LoopExitKind::Break => "LEAVE",
            LoopExitKind::Continue => "ITERATE",
        };
        match &statement.condition {
            Some(c) => {
                out.line(format!("IF {} THEN", c.render()));
                out.indented(|out| {
                    out.line(format!("{} {};", keyword, label));
                    Ok(())
                })?;
                out.line("END IF;");
            }
            None => out.line(format!("{} {};", keyword, label)),
        }
        Ok(())
    }

    // ---- variables and cursors ----

    fn declare(&self, statement: &DeclareVariableStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        if statement.is_exception() {
            out.line(format!("DECLARE {} CONDITION FOR SQLSTATE '45000';", statement.name.render()));
            return Ok(());
        }
        let default = statement
            .default
            .as_ref()
            .map(|d| format!(" DEFAULT {}", d.render()))
            .unwrap_or_default();
        out.line(format!("DECLARE {} {}{};", statement.name.render(), statement.data_type.render(), default));
        Ok(())
    }

    fn set(&self, statement: &SetStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("SET {} = {};", statement.name.render(), statement.value.render()));
        Ok(())
    }

    fn declare_cursor(&self, statement: &DeclareCursorStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!(
            "DECLARE {} CURSOR FOR {};",
            statement.name.qualified_name(),
            self.select_text(&statement.query)?
        ));
        Ok(())
    }

    fn declare_handler(
        &self,
        statement: &DeclareHandlerStatement,
        out: &mut ScriptWriter,
        scope: &Scope,
    ) -> TranslateResult<()> {
        let header = format!(
            "DECLARE {} HANDLER FOR {}",
            statement.action.render().to_uppercase(),
            join_tokens(&statement.conditions, ", ")
        );
        if let [single] = statement.statements.as_slice() {
            let mut inline = ScriptWriter::new();
            self.statement(single, &mut inline, scope)?;
            let text = inline.finish();
            if !text.contains('\n') && !text.is_empty() {
                out.line(format!("{} {}", header, text));
                return Ok(());
            }
        }
        out.line(header);
        out.line("BEGIN");
        out.indented(|out| self.statements(&statement.statements, out, scope))?;
        out.line("END;");
        Ok(())
    }

    // ---- errors ----

    fn raise(&self, statement: &RaiseStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let code = statement.code.as_ref().map(Token::render);
        let state = code
            .as_deref()
            .filter(|c| is_sqlstate(c))
            .unwrap_or("'45000'")
            .to_string();
        let errno = code
            .as_deref()
            .and_then(|c| c.trim().parse::<i64>().ok())
            .filter(|n| *n > 0 && *n < 65536);
        let mut items = Vec::new();
        match (&statement.message, &statement.exception) {
            (Some(message), _) if message.is_leaf() => items.push(format!("MESSAGE_TEXT = {}", message.render())),
            (Some(message), _) => {
                out.line(format!("SET {} = {};", ERROR_MESSAGE, message.render()));
                items.push(format!("MESSAGE_TEXT = {}", ERROR_MESSAGE));
            }
            (None, Some(name)) => items.push(format!("MESSAGE_TEXT = {}", string_literal(&name.render()))),
            (None, None) if code.is_none() => {
                out.line("RESIGNAL;");
                return Ok(());
            }
            (None, None) => {}
        }
        if let Some(errno) = errno {
            items.push(format!("MYSQL_ERRNO = {}", errno));
        }
        if items.is_empty() {
            out.line(format!("SIGNAL SQLSTATE {};", state));
        } else {
            out.line(format!("SIGNAL SQLSTATE {} SET {};", state, items.join(", ")));
        }
        Ok(())
    }

    fn return_statement(&self, statement: &ReturnStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        match (scope.kind, &statement.value) {
            (ObjectKind::Function, Some(value)) => out.line(format!("RETURN {};", value.render())),
            (ObjectKind::Function, None) => {
                return Err(TranslateError::unsupported("RETURN without a value in a function", self.dialect()));
            }
            (ObjectKind::Procedure | ObjectKind::Trigger, value) => {
                if let Some(value) = value {
                    warn!(value = %value, "return value dropped");
                }
                out.line(format!("LEAVE {};", EXIT_LABEL));
            }
            _ => return Err(TranslateError::unsupported("RETURN outside a stored program", self.dialect())),
        }
        Ok(())
    }

    fn print(&self, statement: &PrintStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("SELECT {};", statement.content.render()));
        Ok(())
    }

    fn prepare(&self, statement: &PrepareStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        match &statement.source {
            Some(source) => out.line(format!("PREPARE {} FROM {};", statement.name.render(), source.render())),
            None => out.line(format!("DEALLOCATE PREPARE {};", statement.name.render())),
        }
        Ok(())
    }

    fn execute_dynamic(&self, statement: &ExecuteDynamicStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        if !statement.into.is_empty() {
            return Err(TranslateError::unsupported("dynamic SQL with INTO", self.dialect()));
        }
        let using = if statement.using.is_empty() {
            String::new()
        } else {
            format!(" USING {}", join_tokens(&statement.using, ", "))
        };
        if statement.prepared {
            out.line(format!("EXECUTE {}{};", statement.content.render(), using));
            return Ok(());
        }
        out.line(format!("SET {} = {};", DYNAMIC_SQL, statement.content.render()));
        out.line(format!("PREPARE dynamic_stmt FROM {};", DYNAMIC_SQL));
        out.line(format!("EXECUTE dynamic_stmt{};", using));
        out.line("DEALLOCATE PREPARE dynamic_stmt;");
        Ok(())
    }

    fn transaction(&self, statement: &TransactionStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        match statement.kind {
            TransactionKind::Begin => out.line("START TRANSACTION;"),
            TransactionKind::Commit => out.line("COMMIT;"),
            TransactionKind::Rollback => out.line("ROLLBACK;"),
        }
        Ok(())
    }

    // ---- definitions ----

    fn drop_text(&self, statement: &DropStatement) -> String {
        let name = statement.name.qualified_name();
        let if_exists = if statement.if_exists { " IF EXISTS" } else { "" };
        match statement.object_type.to_uppercase().as_str() {
            "TABLE" if is_temporary_name(&name) => {
                format!("DROP TEMPORARY TABLE{} {}", if_exists, strip_temporary(&name))
            }
            "PROC" => format!("DROP PROCEDURE{} {}", if_exists, name),
            other => format!("DROP {}{} {}", other, if_exists, name),
        }
    }

    fn block(&self, statement: &BlockStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        let label = statement.label.as_ref().map(Token::render);
        let (declarations, body) = split_declarations(&statement.statements);
        out.line(format!("{}BEGIN", label_prefix(&label)));
        out.indented(|out| {
            self.statements(declarations, out, scope)?;
            self.statements(body, out, scope)
        })?;
        out.line(format!("END{};", label_suffix(&label)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::build::tests::build;
    use crate::dialect::DatabaseType;
    use crate::error::TranslateError;
    use crate::model::ObjectKind;

    #[test]
    fn test_procedure_return_leaves_body() {
        let text = build(
            "CREATE PROCEDURE p(x IN NUMBER) IS
             BEGIN
               IF x > 0 THEN
                 RETURN;
               END IF;
               DELETE FROM t WHERE id = x;
             END;",
            DatabaseType::Oracle,
            DatabaseType::MySql,
            ObjectKind::Procedure,
        )
        .unwrap();
        assert_eq!(
            text,
            "CREATE PROCEDURE p(IN x NUMBER)\nproc_body: BEGIN\n    IF x > 0 THEN\n        LEAVE proc_body;\n    END IF;\n\
             \x20   DELETE FROM t WHERE id = x;\nEND proc_body;"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let text = build("SELECT a FROM t OFFSET 5", DatabaseType::Postgres, DatabaseType::MySql, ObjectKind::Common)
            .unwrap();
        assert_eq!(text, "SELECT a FROM t LIMIT 18446744073709551615 OFFSET 5;");
    }

    #[test]
    fn test_trigger_per_event() {
        let text = build(
            "CREATE FUNCTION trg_touch() RETURNS trigger AS $$
             BEGIN
               NEW.updated_at := now();
               RETURN NEW;
             END;
             $$ LANGUAGE plpgsql;
             CREATE TRIGGER touch BEFORE INSERT OR UPDATE ON items FOR EACH ROW EXECUTE FUNCTION trg_touch();",
            DatabaseType::Postgres,
            DatabaseType::MySql,
            ObjectKind::Trigger,
        )
        .unwrap();
        assert!(text.starts_with("CREATE TRIGGER touch_insert\nBEFORE INSERT ON items\nFOR EACH ROW\nBEGIN\n"));
        assert!(text.contains("\n\nCREATE TRIGGER touch_update\nBEFORE UPDATE ON items\n"));
        assert!(!text.contains("LEAVE"));
    }

    #[test]
    fn test_procedural_script_is_unsupported() {
        let err = build(
            "BEGIN FOR i IN 1..3 LOOP NULL; END LOOP; END;",
            DatabaseType::Oracle,
            DatabaseType::MySql,
            ObjectKind::Common,
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_try_catch_becomes_exit_handler() {
        let text = build(
            "CREATE PROCEDURE dbo.p AS
             BEGIN
               BEGIN TRY
                 DELETE FROM t
               END TRY
               BEGIN CATCH
                 ROLLBACK
               END CATCH
             END",
            DatabaseType::SqlServer,
            DatabaseType::MySql,
            ObjectKind::Procedure,
        )
        .unwrap();
        assert!(text.contains("    BEGIN\n        DECLARE EXIT HANDLER FOR SQLEXCEPTION ROLLBACK;\n        DELETE FROM t;\n    END;"));
    }

    #[test]
    fn test_composite_update_is_a_multi_table_update() {
        let text = build(
            "UPDATE emp e SET (salary, bonus) = (SELECT s.salary, s.bonus FROM stage s WHERE s.id = e.id) WHERE e.dept = 10;",
            DatabaseType::Oracle,
            DatabaseType::MySql,
            ObjectKind::Common,
        )
        .unwrap();
        assert_eq!(
            text,
            "UPDATE emp e, stage s SET e.salary = s.salary, e.bonus = s.bonus WHERE s.id = e.id AND e.dept = 10;"
        );
    }
}
