//! T-SQL output.

use std::ops::Range;

use tracing::warn;

use super::{
    and_conditions, is_sqlstate, is_temporary_name, join_tokens, parameter_list, restructure, string_literal,
    table_elements, ScriptBuildResult, ScriptBuilder, ScriptWriter, Scope,
};
use crate::dialect::DatabaseType;
use crate::error::{TranslateError, TranslateResult};
use crate::model::*;

/// Lowest user defined error number `THROW` accepts.
const MIN_USER_ERROR: i64 = 50000;

pub struct SqlServerBuilder;

impl SqlServerBuilder {
    fn parameter(&self, parameter: &Parameter) -> String {
        let mut text = format!("{} {}", parameter.name.render(), parameter.data_type.render());
        if let Some(default) = &parameter.default {
            text.push_str(&format!(" = {}", default.render()));
        }
        if parameter.direction != ParameterDirection::In {
            text.push_str(" OUTPUT");
        }
        text
    }

    /// `BEGIN … END` around `statements`.
    fn begin_end(&self, statements: &[Statement], out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        out.line("BEGIN");
        out.indented(|out| self.body(statements, out, scope))?;
        out.line("END");
        Ok(())
    }

    fn routine_body(
        &self,
        statements: &[Statement],
        out: &mut ScriptWriter,
        scope: &Scope,
    ) -> TranslateResult<Range<usize>> {
        out.line("BEGIN");
        let start = out.offset();
        out.indented(|out| self.body(statements, out, scope))?;
        let stop = out.offset();
        out.line("END");
        Ok(start..stop)
    }
}

impl ScriptBuilder for SqlServerBuilder {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn empty_body(&self, offset: usize) -> Option<String> {
        Some(format!("DECLARE @noop_{} BIT;", offset))
    }

    fn create_view(&self) -> &'static str {
        "CREATE OR ALTER VIEW"
    }

    fn generate_routine_scripts(&self, routine: &RoutineScript) -> TranslateResult<ScriptBuildResult> {
        let mut statements = routine.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let parameters: Vec<String> = routine.parameters.iter().map(|p| self.parameter(p)).collect();
        let mut out = ScriptWriter::new();
        let body = match routine.kind {
            RoutineKind::Procedure => {
                let scope = Scope::new(ObjectKind::Procedure);
                if parameters.is_empty() {
                    out.line(format!("CREATE OR ALTER PROCEDURE {}", routine.name.qualified_name()));
                } else {
                    out.line(format!(
                        "CREATE OR ALTER PROCEDURE {} {}",
                        routine.name.qualified_name(),
                        parameters.join(", ")
                    ));
                }
                out.line("AS");
                self.routine_body(&statements, &mut out, &scope)?
            }
            RoutineKind::Function => {
                let scope = Scope::new(ObjectKind::Function);
                if routine.parameters.iter().any(|p| p.direction != ParameterDirection::In) {
                    return Err(TranslateError::unsupported("function output parameter", self.dialect()));
                }
                out.line(format!(
                    "CREATE OR ALTER FUNCTION {}{}",
                    routine.name.qualified_name(),
                    parameter_list(parameters, true)
                ));
                let return_type = routine
                    .return_type
                    .as_ref()
                    .ok_or_else(|| TranslateError::unsupported("function without a return type", self.dialect()))?;
                out.line(format!("RETURNS {}", return_type.render()));
                out.line("AS");
                self.routine_body(&statements, &mut out, &scope)?
            }
        };
        Ok(ScriptBuildResult::from_writer(out, body))
    }

    fn generate_trigger_scripts(&self, trigger: &TriggerScript) -> TranslateResult<ScriptBuildResult> {
        let mut statements = trigger.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let scope = Scope::new(ObjectKind::Trigger);
        let timing = match trigger.timing {
            TriggerTiming::InsteadOf => "INSTEAD OF",
            TriggerTiming::After => "AFTER",
            TriggerTiming::Before => {
                warn!(trigger = %trigger.name, "BEFORE trigger created as AFTER trigger");
                "AFTER"
            }
        };
        let events: Vec<&str> = trigger.events.iter().map(TriggerEvent::keyword).collect();
        let mut out = ScriptWriter::new();
        out.line(format!(
            "CREATE OR ALTER TRIGGER {} ON {}",
            trigger.name.qualified_name(),
            trigger.table.qualified_name()
        ));
        out.line(format!("{} {}", timing, events.join(", ")));
        out.line("AS");
        if let Some(condition) = &trigger.condition {
            let guarded = vec![Statement::If(IfStatement {
                items: vec![IfItem {
                    kind: IfItemKind::If,
                    condition: Some(condition.clone()),
                    statements,
                }],
            })];
            let body = self.routine_body(&guarded, &mut out, &scope)?;
            return Ok(ScriptBuildResult::from_writer(out, body));
        }
        let body = self.routine_body(&statements, &mut out, &scope)?;
        Ok(ScriptBuildResult::from_writer(out, body))
    }

    // ---- queries ----

    fn top_clause(&self, select: &SelectStatement) -> TranslateResult<Option<String>> {
        if select.offset.is_some() {
            return Ok(None);
        }
        Ok(select.limit.as_ref().map(|limit| {
            let percent = if select.limit_percent { " PERCENT" } else { "" };
            format!("TOP ({}){}", limit.render(), percent)
        }))
    }

    fn limit_clause(&self, select: &SelectStatement) -> TranslateResult<Option<String>> {
        let Some(offset) = &select.offset else {
            return Ok(None);
        };
        if select.limit_percent {
            return Err(TranslateError::unsupported("row limit in percent with an offset", self.dialect()));
        }
        let mut clause = String::new();
        if select.order_by.is_none() {
            clause.push_str("ORDER BY (SELECT NULL) ");
        }
        clause.push_str(&format!("OFFSET {} ROWS", offset.render()));
        if let Some(limit) = &select.limit {
            clause.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit.render()));
        }
        Ok(Some(clause))
    }

    fn assigns_in_select_list(&self) -> bool {
        true
    }

    fn select_statement(&self, select: &SelectStatement, out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        out.line(format!("{};", self.select_text(select)?));
        Ok(())
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
            .map(|(name, value)| format!("{} = {}", name.render(), value))
            .collect();
        let target = update
            .table
            .alias()
            .map(Token::render)
            .unwrap_or_else(|| update.table.qualified_name());
        let mut sql = format!("UPDATE {} SET {}", target, assignments.join(", "));
        let mut from = vec![update.table.render()];
        from.extend(expanded.from.as_ref().map(Token::render));
        sql.push_str(&format!(" FROM {}", from.join(", ")));
        if let Some(condition) = and_conditions(&expanded.conditions) {
            sql.push_str(&format!(" WHERE {}", condition));
        }
        Ok(sql)
    }

    fn update_text(&self, update: &UpdateStatement) -> TranslateResult<String> {
        if update.is_composite() {
            return self.composite_update(update);
        }
        let mut sql = format!("UPDATE {} SET {}", update.table.render(), self.set_items(&update.items)?);
        match (&update.joins, &update.from) {
            (Some(joins), _) => sql.push_str(&format!(" FROM {} {}", update.table.render(), joins.render())),
            (None, Some(from)) => sql.push_str(&format!(" FROM {}", from.render())),
            (None, None) => {}
        }
        if let Some(w) = &update.where_clause {
            sql.push_str(&format!(" WHERE {}", w.render()));
        }
        Ok(sql)
    }

    fn delete_text(&self, delete: &DeleteStatement) -> TranslateResult<String> {
        let mut sql = format!("DELETE FROM {}", delete.table.render());
        if let Some(from) = &delete.from {
            let target = delete
                .table
                .alias()
                .map(Token::render)
                .unwrap_or_else(|| delete.table.qualified_name());
            sql = format!("DELETE {} FROM {}", target, from.render());
        }
        if let Some(w) = &delete.where_clause {
            sql.push_str(&format!(" WHERE {}", w.render()));
        }
        Ok(sql)
    }

    // ---- control flow ----

    fn if_statement(&self, statement: &IfStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        for item in &statement.items {
            match (item.kind, &item.condition) {
                (IfItemKind::If, Some(c)) => out.line(format!("IF {}", c.render())),
                (IfItemKind::ElseIf, Some(c)) => out.line(format!("ELSE IF {}", c.render())),
                _ => out.line("ELSE"),
            }
            self.begin_end(&item.statements, out, scope)?;
        }
        Ok(())
    }

    fn case_statement(&self, statement: &CaseStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        let items = statement
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let condition = match (&statement.variable, &item.condition) {
                    (Some(variable), Some(value)) => {
                        Some(restructure::expression(format!("{} = {}", variable.render(), value.render())))
                    }
                    (None, Some(condition)) => Some(condition.clone()),
                    (_, None) => None,
                };
                let kind = match (i, &condition) {
                    (_, None) => IfItemKind::Else,
                    (0, Some(_)) => IfItemKind::If,
                    _ => IfItemKind::ElseIf,
                };
                IfItem {
                    kind,
                    condition,
                    statements: item.statements.clone(),
                }
            })
            .collect();
        self.if_statement(&IfStatement { items }, out, scope)
    }

    fn loop_label(&self, label: &Token, out: &mut ScriptWriter) {
        out.line(format!("{}:", label.render()));
    }

    fn while_statement(&self, statement: &WhileStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(label) = &statement.label {
            warn!(label = %label, "loop label dropped");
        }
        let inner = scope.enter_loop(statement.label.as_ref().map(Token::render).unwrap_or_default());
        out.line(format!("WHILE {}", statement.condition.render()));
        self.begin_end(&statement.statements, out, &inner)
    }

    fn loop_statement(&self, statement: &LoopStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(label) = &statement.label {
            warn!(label = %label, "loop label dropped");
        }
        let inner = scope.enter_loop(statement.label.as_ref().map(Token::render).unwrap_or_default());
        match (statement.kind, &statement.header) {
            (LoopKind::For, Some(header)) => {
                let (Some(lower), Some(upper)) = (&header.lower, &header.upper) else {
                    return Err(TranslateError::unsupported("FOR loop over a query", self.dialect()));
                };
                let variable = header.variable.render();
                let (from, to, step, compare) = if header.reverse {
                    (upper, lower, "-", ">=")
                } else {
                    (lower, upper, "+", "<=")
                };
                out.line(format!("DECLARE {} INT = {};", variable, from.render()));
                out.line(format!("WHILE {} {} {}", variable, compare, to.render()));
                out.line("BEGIN");
                out.indented(|out| {
                    self.statements(&statement.statements, out, &inner)?;
                    out.line(format!("SET {0} = {0} {1} 1;", variable, step));
                    Ok(())
                })?;
                out.line("END");
            }
            (LoopKind::Repeat, _) => {
                out.line("WHILE 1 = 1");
                out.line("BEGIN");
                out.indented(|out| {
                    self.statements(&statement.statements, out, &inner)?;
                    if let Some(c) = &statement.condition {
                        out.line(format!("IF {} BREAK;", c.render()));
                    }
                    Ok(())
                })?;
                out.line("END");
            }
            _ => {
                out.line("WHILE 1 = 1");
                self.begin_end(&statement.statements, out, &inner)?;
            }
        }
        Ok(())
    }

    fn loop_exit(&self, statement: &LoopExitStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(label) = &statement.label {
            if scope.innermost_loop().is_none_or(|inner| !inner.eq_ignore_ascii_case(&label.render())) {
                return Err(TranslateError::unsupported("exit from an outer loop", self.dialect()));
            }
        }
        let keyword = match statement.kind {
            LoopExitKind::Break => "BREAK",
            LoopExitKind::Continue => "CONTINUE",
        };
        match &statement.condition {
            Some(c) => out.line(format!("IF {} {};", c.render(), keyword)),
            None => out.line(format!("{};", keyword)),
        }
        Ok(())
    }

    // ---- variables and cursors ----

    fn declare(&self, statement: &DeclareVariableStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        if statement.is_exception() {
            warn!(name = %statement.name, "exception declaration dropped");
            return Ok(());
        }
        let default = statement
            .default
            .as_ref()
            .map(|d| format!(" = {}", d.render()))
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

    fn fetch(&self, statement: &FetchCursorStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let into = if statement.into.is_empty() {
            String::new()
        } else {
            format!(" INTO {}", join_tokens(&statement.into, ", "))
        };
        out.line(format!("FETCH NEXT FROM {}{};", statement.name.qualified_name(), into));
        Ok(())
    }

    fn deallocate(&self, statement: &CursorStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("DEALLOCATE {};", statement.name.qualified_name()));
        Ok(())
    }

    fn goto(&self, statement: &GotoStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("GOTO {};", statement.label.render()));
        Ok(())
    }

    fn label(&self, statement: &LabelStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("{}:", statement.name.render()));
        Ok(())
    }

    // ---- errors ----

    fn try_catch(&self, statement: &TryCatchStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        out.line("BEGIN TRY");
        out.indented(|out| self.body(&statement.try_statements, out, scope))?;
        out.line("END TRY");
        out.line("BEGIN CATCH");
        out.indented(|out| self.body(&statement.catch_statements, out, scope))?;
        out.line("END CATCH");
        Ok(())
    }

    fn exception(&self, _statement: &ExceptionStatement, _out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        Err(TranslateError::unsupported("EXCEPTION section outside a block", self.dialect()))
    }

    fn raise(&self, statement: &RaiseStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let number = statement
            .code
            .as_ref()
            .filter(|c| !is_sqlstate(&c.render()))
            .and_then(|c| c.render().trim().parse::<i64>().ok())
            .map(|n| n.max(MIN_USER_ERROR));
        let line = match (&statement.message, &statement.exception, number) {
            (Some(message), _, Some(number)) => format!("THROW {}, {}, 1;", number, message.render()),
            (Some(message), _, None) => format!("RAISERROR({}, 16, 1);", message.render()),
            (None, Some(name), _) => format!("RAISERROR({}, 16, 1);", string_literal(&name.render())),
            (None, None, Some(number)) => format!("THROW {}, 'Error', 1;", number),
            (None, None, None) => "THROW;".to_string(),
        };
        out.line(line);
        Ok(())
    }

    fn print(&self, statement: &PrintStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("PRINT {};", statement.content.render()));
        Ok(())
    }

    fn call(&self, statement: &CallStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let result = statement
            .result
            .as_ref()
            .map(|r| format!("{} = ", r.render()))
            .unwrap_or_default();
        let args = join_tokens(&statement.args, ", ");
        if args.is_empty() {
            out.line(format!("EXEC {}{};", result, statement.name.qualified_name()));
        } else {
            out.line(format!("EXEC {}{} {};", result, statement.name.qualified_name(), args));
        }
        Ok(())
    }

    fn execute_dynamic(&self, statement: &ExecuteDynamicStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        if !statement.into.is_empty() {
            return Err(TranslateError::unsupported("dynamic SQL with INTO", self.dialect()));
        }
        if !statement.using.is_empty() {
            return Err(TranslateError::unsupported("dynamic SQL with bound arguments", self.dialect()));
        }
        out.line(format!("EXEC({});", statement.content.render()));
        Ok(())
    }

    fn transaction(&self, statement: &TransactionStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        match statement.kind {
            TransactionKind::Begin => out.line("BEGIN TRANSACTION;"),
            TransactionKind::Commit => out.line("COMMIT TRANSACTION;"),
            TransactionKind::Rollback => out.line("ROLLBACK TRANSACTION;"),
        }
        Ok(())
    }

    fn return_statement(&self, statement: &ReturnStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        match (&statement.value, scope.kind) {
            (Some(value), ObjectKind::Trigger) => {
                warn!(value = %value, "trigger return value dropped");
                out.line("RETURN;");
            }
            (Some(value), _) => out.line(format!("RETURN {};", value.render())),
            (None, _) => out.line("RETURN;"),
        }
        Ok(())
    }

    // ---- definitions ----

    fn drop_text(&self, statement: &DropStatement) -> String {
        let object_type = match statement.object_type.to_uppercase().as_str() {
            "PROCEDURE" => "PROC".to_string(),
            other => other.to_string(),
        };
        let if_exists = if statement.if_exists { " IF EXISTS" } else { "" };
        format!("DROP {}{} {}", object_type, if_exists, statement.name.qualified_name())
    }

    fn create_table_text(&self, statement: &CreateTableStatement) -> String {
        let name = statement.table.qualified_name();
        let name = if statement.temporary && !is_temporary_name(&name) {
            format!("#{}", name)
        } else {
            name
        };
        format!("CREATE TABLE {} ({})", name, table_elements(statement))
    }

    fn block(&self, statement: &BlockStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(label) = &statement.label {
            self.loop_label(label, out);
        }
        self.begin_end(&statement.statements, out, scope)
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
    fn test_offset_needs_order_by() {
        let text = build("SELECT id FROM t LIMIT 10, 5;", DatabaseType::MySql, DatabaseType::SqlServer, ObjectKind::Common)
            .unwrap();
        assert_eq!(text, "SELECT id FROM t ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY;");

        let text = build("SELECT id FROM t ORDER BY id LIMIT 3;", DatabaseType::MySql, DatabaseType::SqlServer, ObjectKind::Common)
            .unwrap();
        assert_eq!(text, "SELECT TOP (3) id FROM t ORDER BY id;");
    }

    #[test]
    fn test_procedure_with_loops() {
        let text = build(
            "CREATE PROCEDURE count_up(IN n INT)
             BEGIN
               DECLARE i INT DEFAULT 0;
               WHILE i < n DO
                 SET i = i + 1;
               END WHILE;
               REPEAT SET i = i - 1; UNTIL i = 0 END REPEAT;
             END",
            DatabaseType::MySql,
            DatabaseType::SqlServer,
            ObjectKind::Procedure,
        )
        .unwrap();
        assert!(text.starts_with("CREATE OR ALTER PROCEDURE count_up n INT\nAS\nBEGIN\n    DECLARE i INT = 0;\n"));
        assert!(text.contains("    WHILE i < n\n    BEGIN\n        SET i = i + 1;\n    END\n"));
        assert!(text.contains("    WHILE 1 = 1\n    BEGIN\n        SET i = i - 1;\n        IF i = 0 BREAK;\n    END\n"));
        assert!(text.ends_with("END"));
    }

    #[test]
    fn test_exception_section_becomes_try_catch() {
        let text = build(
            "CREATE PROCEDURE p IS
             BEGIN
               DELETE FROM t WHERE id = 1;
             EXCEPTION
               WHEN OTHERS THEN RAISE;
             END;",
            DatabaseType::Oracle,
            DatabaseType::SqlServer,
            ObjectKind::Procedure,
        )
        .unwrap();
        assert!(text.contains("BEGIN TRY\n        DELETE FROM t WHERE id = 1;\n    END TRY\n    BEGIN CATCH\n"));
        assert!(text.contains("THROW;"));
    }

    #[test]
    fn test_query_loop_is_unsupported() {
        let err = build(
            "BEGIN FOR r IN (SELECT id FROM t) LOOP NULL; END LOOP; END;",
            DatabaseType::Oracle,
            DatabaseType::SqlServer,
            ObjectKind::Common,
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_empty_handler_still_has_a_statement() {
        let text = build(
            "CREATE PROCEDURE p IS
             BEGIN
               DELETE FROM t WHERE id = 1;
             EXCEPTION
               WHEN NO_DATA_FOUND THEN NULL;
               WHEN OTHERS THEN RAISE;
             END;",
            DatabaseType::Oracle,
            DatabaseType::SqlServer,
            ObjectKind::Procedure,
        )
        .unwrap();
        assert!(text.contains("IF ERROR_PROCEDURE() = 'NO_DATA_FOUND'"), "{}", text);
        assert!(!text.contains("BEGIN\n        END"), "{}", text);
        let branch = text.split("IF ERROR_PROCEDURE() = 'NO_DATA_FOUND'").nth(1).unwrap();
        let first = branch.lines().nth(2).unwrap().trim();
        assert!(first.starts_with("DECLARE @noop_") && first.ends_with(" BIT;"), "{}", text);
        assert!(text.contains("THROW;"));
    }

    #[test]
    fn test_composite_update_joins_the_subquery() {
        let text = build(
            "UPDATE emp e SET (salary, bonus) = (SELECT s.salary, s.bonus FROM stage s WHERE s.id = e.id) WHERE e.dept = 10;",
            DatabaseType::Oracle,
            DatabaseType::SqlServer,
            ObjectKind::Common,
        )
        .unwrap();
        assert_eq!(
            text,
            "UPDATE e SET salary = s.salary, bonus = s.bonus FROM emp e, stage s WHERE s.id = e.id AND e.dept = 10;"
        );
    }
}
