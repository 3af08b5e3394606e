//! PL/pgSQL output.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::{
    is_plain_sql, is_temporary_name, parameter_list, restructure, split_declarations, strip_temporary, ScriptBuildResult,
    ScriptBuilder, ScriptWriter, Scope, TRIGGER_ROW,
};
use crate::dialect::{DatabaseType, split_qualified, unquote};
use crate::error::{TranslateError, TranslateResult};
use crate::model::*;

pub struct PostgresBuilder;

static ROW_COUNT_NONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bROW_COUNT\s*(=\s*0|<\s*1)\b").unwrap());
static ROW_COUNT_SOME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bROW_COUNT\s*(<>\s*0|!=\s*0|>\s*0|>=\s*1)\b").unwrap());
static ROW_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bROW_COUNT\b").unwrap());

impl PostgresBuilder {
    fn parameter(&self, parameter: &Parameter) -> String {
        let mode = match parameter.direction {
            ParameterDirection::In => "",
            ParameterDirection::Out => "OUT ",
            ParameterDirection::InOut => "INOUT ",
        };
        let default = parameter
            .default
            .as_ref()
            .map(|d| format!(" DEFAULT {}", d.render()))
            .unwrap_or_default();
        format!("{}{} {}{}", mode, parameter.name.render(), parameter.data_type.render(), default)
    }

    /// `DECLARE … BEGIN … END;` of a routine body, returning the span between `BEGIN` and `END`.
    fn plpgsql_block(
        &self,
        statements: &[Statement],
        tail: Option<String>,
        out: &mut ScriptWriter,
        scope: &Scope,
    ) -> TranslateResult<Range<usize>> {
        let (declarations, body) = split_declarations(statements);
        if !declarations.is_empty() {
            out.line("DECLARE");
            out.indented(|out| self.statements(declarations, out, scope))?;
        }
        out.line("BEGIN");
        let start = out.offset();
        out.indented(|out| {
            let (section, body) = split_exception_section(body);
            self.statements(body, out, scope)?;
            if let Some(tail) = &tail {
                out.line(tail);
            }
            if let Some(section) = section {
                self.statement(section, out, scope)?;
            }
            Ok(())
        })?;
        let stop = out.offset();
        out.line("END;");
        Ok(start..stop)
    }
}

/// A trailing `EXCEPTION` section split from the statements before it.
fn split_exception_section(statements: &[Statement]) -> (Option<&Statement>, &[Statement]) {
    match statements.split_last() {
        Some((last @ Statement::Exception(_), rest)) => (Some(last), rest),
        _ => (None, statements),
    }
}

fn ends_with_return(statements: &[Statement]) -> bool {
    let (_, body) = split_exception_section(statements);
    matches!(body.last(), Some(Statement::Return(_)))
}

/// Whether the trigger body reads the `NEW` or `OLD` row.
fn references_row(trigger: &TriggerScript) -> bool {
    let rows = |token: &Token| {
        split_qualified(&token.symbol)
            .first()
            .is_some_and(|first| first.eq_ignore_ascii_case("NEW") || first.eq_ignore_ascii_case("OLD"))
            && token.symbol.contains('.')
    };
    trigger
        .statements
        .iter()
        .flat_map(Statement::tokens)
        .chain(trigger.condition.iter())
        .any(|t| t.any(&rows))
}

/// `REFERENCING` clause for `inserted`/`deleted` queried as tables.
fn transition_tables(trigger: &TriggerScript) -> Option<String> {
    let reads = |name: &str| {
        trigger.statements.iter().flat_map(Statement::tokens).any(|t| {
            t.any(&|t: &Token| t.kind == TokenKind::TableName && unquote(&t.symbol).eq_ignore_ascii_case(name))
        })
    };
    let has = |event: TriggerEvent| trigger.events.contains(&event);
    let mut tables = Vec::new();
    if (has(TriggerEvent::Insert) || has(TriggerEvent::Update)) && reads("inserted") {
        tables.push("NEW TABLE AS inserted");
    }
    if (has(TriggerEvent::Update) || has(TriggerEvent::Delete)) && reads("deleted") {
        tables.push("OLD TABLE AS deleted");
    }
    (!tables.is_empty()).then(|| format!("REFERENCING {}", tables.join(" ")))
}

/// The row a trigger function hands back to the executor.
fn trigger_row(trigger: &TriggerScript) -> &'static str {
    match trigger.timing {
        TriggerTiming::After => "NULL",
        _ if trigger.events == [TriggerEvent::Delete] => "OLD",
        _ => "NEW",
    }
}

impl ScriptBuilder for PostgresBuilder {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    fn generate_routine_scripts(&self, routine: &RoutineScript) -> TranslateResult<ScriptBuildResult> {
        let mut statements = routine.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let scope = match routine.kind {
            RoutineKind::Procedure => Scope::new(ObjectKind::Procedure),
            RoutineKind::Function => Scope::new(ObjectKind::Function),
        };
        let parameters = routine.parameters.iter().map(|p| self.parameter(p)).collect();
        let mut out = ScriptWriter::new();
        match routine.kind {
            RoutineKind::Procedure => out.line(format!(
                "CREATE OR REPLACE PROCEDURE {}{}",
                routine.name.qualified_name(),
                parameter_list(parameters, true)
            )),
            RoutineKind::Function => {
                out.line(format!(
                    "CREATE OR REPLACE FUNCTION {}{}",
                    routine.name.qualified_name(),
                    parameter_list(parameters, true)
                ));
                if let Some(return_type) = &routine.return_type {
                    out.line(format!("RETURNS {}", return_type.render()));
                }
            }
        }
        out.line("LANGUAGE plpgsql");
        out.line("AS $$");
        let body = self.plpgsql_block(&statements, None, &mut out, &scope)?;
        out.line("$$;");
        Ok(ScriptBuildResult::from_writer(out, body))
    }

    fn generate_trigger_scripts(&self, trigger: &TriggerScript) -> TranslateResult<ScriptBuildResult> {
        let referencing = transition_tables(trigger);
        if referencing.is_some() && trigger.timing != TriggerTiming::After {
            return Err(TranslateError::unsupported(
                "transition tables outside an AFTER trigger",
                self.dialect(),
            ));
        }
        let mut statements = trigger.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let scope = Scope::new(ObjectKind::Trigger);
        let function = match &trigger.name.schema {
            Some(schema) => format!("{}.{}_fn", schema, trigger.name.name()),
            None => format!("{}_fn", trigger.name.name()),
        };
        let mut out = ScriptWriter::new();
        out.line(format!("CREATE OR REPLACE FUNCTION {}()", function));
        out.line("RETURNS trigger");
        out.line("LANGUAGE plpgsql");
        out.line("AS $$");
        let tail = (!ends_with_return(&statements)).then(|| format!("RETURN {};", TRIGGER_ROW));
        let body = self.plpgsql_block(&statements, tail, &mut out, &scope)?;
        out.line("$$;");
        out.line("");

        let timing = match trigger.timing {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        };
        let events: Vec<&str> = trigger.events.iter().map(TriggerEvent::keyword).collect();
        out.line(format!("CREATE TRIGGER {}", trigger.name.name()));
        out.line(format!("{} {} ON {}", timing, events.join(" OR "), trigger.table.qualified_name()));
        if let Some(referencing) = referencing {
            out.line(referencing);
            out.line("FOR EACH STATEMENT");
        } else if trigger.for_each_row || references_row(trigger) {
            out.line("FOR EACH ROW");
        } else {
            out.line("FOR EACH STATEMENT");
        }
        if let Some(condition) = &trigger.condition {
            out.line(format!("WHEN ({})", condition.render()));
        }
        out.line(format!("EXECUTE FUNCTION {}();", function));
        Ok(ScriptBuildResult::from_writer(out, body).with_replacement(TRIGGER_ROW, trigger_row(trigger)))
    }

    fn generate_common_scripts(&self, script: &CommonScript) -> TranslateResult<ScriptBuildResult> {
        if script.statements.iter().all(is_plain_sql) {
            let scope = Scope::new(ObjectKind::Common);
            let mut out = ScriptWriter::new();
            self.statements(&script.statements, &mut out, &scope)?;
            let stop = out.offset();
            return Ok(ScriptBuildResult::from_writer(out, 0..stop));
        }
        let mut statements = script.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let scope = Scope::new(ObjectKind::Procedure);
        let mut out = ScriptWriter::new();
        out.line("DO $$");
        let body = self.plpgsql_block(&statements, None, &mut out, &scope)?;
        out.line("$$;");
        Ok(ScriptBuildResult::from_writer(out, body))
    }

    fn set_target(&self, name: &Token) -> String {
        split_qualified(&name.render())
            .last()
            .map(|s| s.to_string())
            .unwrap_or_else(|| name.render())
    }

    fn for_source(&self, source: &Token) -> String {
        let text = source.render();
        let trimmed = text.trim();
        if source.kind == TokenKind::Subquery && trimmed.starts_with('(') && trimmed.ends_with(')') {
            trimmed[1..trimmed.len() - 1].trim().to_string()
        } else {
            text
        }
    }

    fn create_table_as(&self, name: &str, query: &str, _scope: &Scope) -> String {
        if is_temporary_name(name) {
            format!("CREATE TEMP TABLE {} AS {}", strip_temporary(name), query)
        } else {
            format!("CREATE TABLE {} AS {}", name, query)
        }
    }

    /// Row counts compared with zero read `FOUND`; PL/pgSQL has no
    /// `ROW_COUNT` expression outside `GET DIAGNOSTICS`.
    fn condition(&self, condition: &Token) -> String {
        let text = condition.render();
        let text = ROW_COUNT_NONE.replace_all(&text, "NOT FOUND");
        let text = ROW_COUNT_SOME.replace_all(&text, "FOUND");
        if ROW_COUNT.is_match(&text) {
            warn!(condition = %text, "ROW_COUNT needs GET DIAGNOSTICS, condition kept");
        }
        text.into_owned()
    }

    fn set(&self, statement: &SetStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        if statement.value.render().eq_ignore_ascii_case("ROW_COUNT") {
            out.line(format!("GET DIAGNOSTICS {} = ROW_COUNT;", statement.name.render()));
        } else {
            out.line(format!("{} := {};", statement.name.render(), statement.value.render()));
        }
        Ok(())
    }

    fn return_statement(&self, statement: &ReturnStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        match (scope.kind, &statement.value) {
            (ObjectKind::Trigger, None) => out.line(format!("RETURN {};", TRIGGER_ROW)),
            (ObjectKind::Procedure, Some(value)) => {
                warn!(value = %value, "procedure return value dropped");
                out.line("RETURN;");
            }
            (_, Some(value)) => out.line(format!("RETURN {};", value.render())),
            (_, None) => out.line("RETURN;"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::build::tests::build;
    use crate::dialect::DatabaseType;
    use crate::model::ObjectKind;

    #[test]
    fn test_function_body_layout() {
        let text = build(
            "CREATE FUNCTION add_days(d DATE, n INT) RETURNS DATE
             BEGIN
               DECLARE r DATE;
               SET r = d;
               RETURN r;
             END",
            DatabaseType::MySql,
            DatabaseType::Postgres,
            ObjectKind::Function,
        )
        .unwrap();
        assert_eq!(
            text,
            "CREATE OR REPLACE FUNCTION add_days(d DATE, n INT)\nRETURNS DATE\nLANGUAGE plpgsql\nAS $$\n\
             DECLARE\n    r DATE;\nBEGIN\n    r := d;\n    RETURN r;\nEND;\n$$;"
        );
    }

    #[test]
    fn test_trigger_function_returns_row() {
        let text = build(
            "CREATE TRIGGER trg_audit AFTER UPDATE ON accounts FOR EACH ROW
             INSERT INTO audit (id, old_balance) VALUES (OLD.id, OLD.balance)",
            DatabaseType::MySql,
            DatabaseType::Postgres,
            ObjectKind::Trigger,
        )
        .unwrap();
        assert!(text.starts_with("CREATE OR REPLACE FUNCTION trg_audit_fn()\nRETURNS trigger"));
        assert!(text.contains("    RETURN NULL;\nEND;"));
        assert!(text.contains("AFTER UPDATE ON accounts\nFOR EACH ROW\nEXECUTE FUNCTION trg_audit_fn();"));
    }

    #[test]
    fn test_procedure_header_and_bare_return() {
        let text = build(
            "CREATE PROCEDURE p(x IN NUMBER) IS
             BEGIN
               IF x > 0 THEN
                 RETURN;
               END IF;
             END;",
            DatabaseType::Oracle,
            DatabaseType::Postgres,
            ObjectKind::Procedure,
        )
        .unwrap();
        assert!(text.starts_with("CREATE OR REPLACE PROCEDURE p(x NUMBER)\nLANGUAGE plpgsql\nAS $$\nBEGIN\n"));
        assert!(text.contains("    IF x > 0 THEN\n        RETURN;\n    END IF;"));
    }

    #[test]
    fn test_row_tables_need_an_after_trigger() {
        let text = build(
            "CREATE TRIGGER trg_log ON orders AFTER UPDATE AS
             INSERT INTO order_log (id, was, now) SELECT d.id, d.total, i.total FROM deleted d JOIN inserted i ON i.id = d.id",
            DatabaseType::SqlServer,
            DatabaseType::Postgres,
            ObjectKind::Trigger,
        )
        .unwrap();
        assert!(text.contains(
            "AFTER UPDATE ON orders\nREFERENCING NEW TABLE AS inserted OLD TABLE AS deleted\nFOR EACH STATEMENT"
        ));

        let err = build(
            "CREATE TRIGGER trg_v ON v_orders INSTEAD OF INSERT AS INSERT INTO orders (id) SELECT id FROM inserted",
            DatabaseType::SqlServer,
            DatabaseType::Postgres,
            ObjectKind::Trigger,
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::TranslateError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn test_composite_update_leaves_target_out_of_from() {
        let text = build(
            "UPDATE emp SET (salary, bonus) = (SELECT s.salary, s.bonus FROM emp JOIN stage s ON s.id = emp.id) WHERE emp.dept = 10;",
            DatabaseType::Oracle,
            DatabaseType::Postgres,
            ObjectKind::Common,
        )
        .unwrap();
        assert_eq!(
            text,
            "UPDATE emp SET salary = s.salary, bonus = s.bonus FROM stage s WHERE s.id = emp.id AND emp.dept = 10;"
        );
    }
}
