//! SQLite output. Triggers are the only procedural objects SQLite has.

use std::ops::Range;

use tracing::{debug, warn};

use super::{
    correlated_delete, is_temporary_name, string_literal, strip_temporary, ScriptBuildResult, ScriptBuilder,
    ScriptWriter, Scope,
};
use crate::dialect::DatabaseType;
use crate::error::{TranslateError, TranslateResult};
use crate::model::*;

pub struct SqliteBuilder;

impl SqliteBuilder {
    fn trigger_body(&self, statements: &[Statement], out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<Range<usize>> {
        out.line("BEGIN");
        let start = out.offset();
        out.indented(|out| self.statements(statements, out, scope))?;
        let stop = out.offset();
        out.line("END;");
        Ok(start..stop)
    }

    fn abort(&self, statement: &RaiseStatement) -> String {
        let message = match (&statement.message, &statement.exception, &statement.code) {
            (Some(message), _, _) => {
                if message.kind != TokenKind::StringLiteral {
                    warn!(message = %message, "RAISE message must be a literal");
                }
                message.render()
            }
            (None, Some(name), _) => string_literal(&name.render()),
            (None, None, Some(code)) => string_literal(&format!("Error {}", code.render())),
            (None, None, None) => string_literal("Error"),
        };
        format!("RAISE(ABORT, {})", message)
    }
}

fn unsupported_name(statement: &Statement) -> &'static str {
    match statement {
        Statement::If(_) | Statement::Case(_) => "conditional statement",
        Statement::While(_) | Statement::Loop(_) | Statement::LoopExit(_) => "loop",
        Statement::Declare(_) | Statement::Set(_) => "variable",
        Statement::DeclareCursor(_)
        | Statement::OpenCursor(_)
        | Statement::FetchCursor(_)
        | Statement::CloseCursor(_)
        | Statement::DeallocateCursor(_) => "cursor",
        Statement::DeclareHandler(_) | Statement::TryCatch(_) | Statement::Exception(_) => "error handler",
        Statement::Call(_) => "procedure call",
        Statement::Prepare(_) | Statement::ExecuteDynamic(_) => "dynamic SQL",
        _ => "procedural statement",
    }
}

impl ScriptBuilder for SqliteBuilder {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn create_view(&self) -> &'static str {
        "CREATE VIEW"
    }

    fn generate_routine_scripts(&self, _routine: &RoutineScript) -> TranslateResult<ScriptBuildResult> {
        Err(TranslateError::unsupported("stored routine", self.dialect()))
    }

    fn generate_trigger_scripts(&self, trigger: &TriggerScript) -> TranslateResult<ScriptBuildResult> {
        let timing = match trigger.timing {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        };
        let mut statements = trigger.statements.clone();
        if matches!(statements.last(), Some(Statement::Return(_))) {
            statements.pop();
        }
        let scope = Scope::new(ObjectKind::Trigger);
        let mut out = ScriptWriter::new();
        let mut first_body = None;
        for (i, event) in trigger.events.iter().enumerate() {
            if i > 0 {
                out.line("");
            }
            let name = if trigger.events.len() > 1 {
                format!("{}_{}", trigger.name.name(), event.keyword().to_lowercase())
            } else {
                trigger.name.name().to_string()
            };
            out.line(format!("CREATE TRIGGER {}", name));
            out.line(format!("{} {} ON {}", timing, event.keyword(), trigger.table.name()));
            out.line("FOR EACH ROW");
            if let Some(condition) = &trigger.condition {
                out.line(format!("WHEN {}", condition.render()));
            }
            let body = self.trigger_body(&statements, &mut out, &scope)?;
            first_body.get_or_insert(body);
        }
        Ok(ScriptBuildResult::from_writer(out, first_body.unwrap_or(0..0)))
    }

    fn statement(&self, statement: &Statement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        match statement {
            Statement::Select(s) => self.select_statement(s, out, scope),
            Statement::Insert(s) => {
                out.line(format!("{};", self.insert_text(s)?));
                Ok(())
            }
            Statement::Update(s) => {
                out.line(format!("{};", self.update_text(s)?));
                Ok(())
            }
            Statement::Delete(s) => {
                out.line(format!("{};", self.delete_text(s)?));
                Ok(())
            }
            Statement::If(s) => self.if_statement(s, out, scope),
            Statement::Raise(s) => self.raise(s, out),
            Statement::Return(_) if scope.kind == ObjectKind::Trigger => {
                Err(TranslateError::unsupported("RETURN inside a trigger body", self.dialect()))
            }
            Statement::Transaction(s) => self.transaction(s, out),
            Statement::Truncate(s) => self.truncate(s, out, scope),
            Statement::Drop(s) => self.drop(s, out, scope),
            Statement::CreateTable(s) => self.create_table(s, out, scope),
            Statement::Other(s) => self.other(s, out),
            other => Err(TranslateError::unsupported(unsupported_name(other), self.dialect())),
        }
    }

    /// `IF c THEN RAISE …` is the one conditional a trigger body can express.
    fn if_statement(&self, statement: &IfStatement, out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        let [item] = statement.items.as_slice() else {
            return Err(TranslateError::unsupported("conditional statement", self.dialect()));
        };
        let Some(condition) = &item.condition else {
            return Err(TranslateError::unsupported("conditional statement", self.dialect()));
        };
        for inner in &item.statements {
            let Statement::Raise(raise) = inner else {
                return Err(TranslateError::unsupported("conditional statement", self.dialect()));
            };
            out.line(format!("SELECT {} WHERE {};", self.abort(raise), condition.render()));
        }
        Ok(())
    }

    fn raise(&self, statement: &RaiseStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("SELECT {};", self.abort(statement)));
        Ok(())
    }

    fn limit_clause(&self, select: &SelectStatement) -> TranslateResult<Option<String>> {
        if select.limit_percent {
            return Err(TranslateError::unsupported("row limit in percent", self.dialect()));
        }
        Ok(match (&select.limit, &select.offset) {
            (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit.render(), offset.render())),
            (Some(limit), None) => Some(format!("LIMIT {}", limit.render())),
            (None, Some(offset)) => Some(format!("LIMIT -1 OFFSET {}", offset.render())),
            (None, None) => None,
        })
    }

    fn create_table_as(&self, name: &str, query: &str, _scope: &Scope) -> String {
        if is_temporary_name(name) {
            format!("CREATE TEMP TABLE {} AS {}", strip_temporary(name), query)
        } else {
            format!("CREATE TABLE {} AS {}", name, query)
        }
    }

    fn delete_text(&self, delete: &DeleteStatement) -> TranslateResult<String> {
        correlated_delete(delete)
    }

    fn transaction(&self, statement: &TransactionStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        match statement.kind {
            TransactionKind::Begin => out.line("BEGIN TRANSACTION;"),
            TransactionKind::Commit => out.line("COMMIT;"),
            TransactionKind::Rollback => out.line("ROLLBACK;"),
        }
        Ok(())
    }

    fn truncate(&self, statement: &TruncateStatement, out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        debug!(table = %statement.table, "TRUNCATE written as DELETE");
        out.line(format!("DELETE FROM {};", statement.table.qualified_name()));
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
    fn test_routines_are_unsupported() {
        let err = build(
            "CREATE PROCEDURE p() BEGIN SELECT 1; END",
            DatabaseType::MySql,
            DatabaseType::Sqlite,
            ObjectKind::Procedure,
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_trigger_with_guarded_raise() {
        let text = build(
            "CREATE TRIGGER trg_check BEFORE INSERT ON accounts FOR EACH ROW
             BEGIN
               IF NEW.balance < 0 THEN
                 SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = 'negative balance';
               END IF;
             END",
            DatabaseType::MySql,
            DatabaseType::Sqlite,
            ObjectKind::Trigger,
        )
        .unwrap();
        assert_eq!(
            text,
            "CREATE TRIGGER trg_check\nBEFORE INSERT ON accounts\nFOR EACH ROW\nBEGIN\n\
             \x20   SELECT RAISE(ABORT, 'negative balance') WHERE NEW.balance < 0;\nEND;"
        );
    }

    #[test]
    fn test_truncate_and_joined_delete() {
        let text = build(
            "TRUNCATE TABLE stage; DELETE FROM orders USING stage WHERE stage.id = orders.id;",
            DatabaseType::Postgres,
            DatabaseType::Sqlite,
            ObjectKind::Common,
        )
        .unwrap();
        assert_eq!(
            text,
            "DELETE FROM stage;\nDELETE FROM orders WHERE EXISTS (SELECT 1 FROM stage WHERE stage.id = orders.id);"
        );
    }

    #[test]
    fn test_composite_update_uses_update_from() {
        let text = build(
            "UPDATE emp SET (salary, bonus) = (SELECT s.salary, s.bonus FROM stage s WHERE s.id = emp.id);",
            DatabaseType::Oracle,
            DatabaseType::Sqlite,
            ObjectKind::Common,
        )
        .unwrap();
        assert_eq!(text, "UPDATE emp SET salary = s.salary, bonus = s.bonus FROM stage s WHERE s.id = emp.id;");
    }
}
