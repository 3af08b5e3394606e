//! PL/SQL output.

use std::ops::Range;

use tracing::warn;

use super::{
    correlated_delete, into_table, is_plain_sql, is_temporary_name, join_tokens, restructure, split_declarations,
    strip_temporary, string_literal, table_elements, where_suffix, ScriptBuildResult, ScriptBuilder, ScriptWriter,
    Scope,
};
use crate::dialect::{DatabaseType, split_qualified};
use crate::error::{TranslateError, TranslateResult};
use crate::model::*;

/// Error numbers `RAISE_APPLICATION_ERROR` accepts.
const USER_ERRORS: std::ops::RangeInclusive<i64> = -20999..=-20000;

pub struct OracleBuilder;

/// `VARCHAR2(50)` as `VARCHAR2`; parameter and return types take no size.
fn without_size(data_type: &Token) -> String {
    let text = data_type.render();
    match text.find('(') {
        Some(at) => {
            let close = text.rfind(')').map(|c| c + 1).unwrap_or(text.len());
            format!("{}{}", text[..at].trim_end(), &text[close..])
        }
        None => text,
    }
}

/// Whether a trigger body reads the `:NEW` or `:OLD` row.
fn references_row(trigger: &TriggerScript) -> bool {
    let rows = |token: &Token| {
        token.symbol.contains('.')
            && split_qualified(&token.symbol).first().is_some_and(|first| {
                let first = first.trim_start_matches(':');
                first.eq_ignore_ascii_case("NEW") || first.eq_ignore_ascii_case("OLD")
            })
    };
    trigger
        .statements
        .iter()
        .flat_map(Statement::tokens)
        .chain(trigger.condition.iter())
        .any(|t| t.any(&rows))
}

/// A trigger `WHEN` clause names the rows without the colon.
fn when_condition(condition: &Token) -> String {
    condition
        .render()
        .replace(":NEW.", "NEW.")
        .replace(":OLD.", "OLD.")
        .replace(":new.", "new.")
        .replace(":old.", "old.")
}

impl OracleBuilder {
    fn parameter(&self, parameter: &Parameter) -> String {
        let mode = match parameter.direction {
            ParameterDirection::In => "IN",
            ParameterDirection::Out => "OUT",
            ParameterDirection::InOut => "IN OUT",
        };
        let default = parameter
            .default
            .as_ref()
            .map(|d| format!(" DEFAULT {}", d.render()))
            .unwrap_or_default();
        format!("{} {} {}{}", parameter.name.render(), mode, without_size(&parameter.data_type), default)
    }

    /// Declarations, then `BEGIN … END;`, returning the span of the body.
    fn plsql_block(
        &self,
        statements: &[Statement],
        declare_keyword: bool,
        out: &mut ScriptWriter,
        scope: &Scope,
    ) -> TranslateResult<Range<usize>> {
        let (declarations, body) = split_declarations(statements);
        if !declarations.is_empty() {
            if declare_keyword {
                out.line("DECLARE");
            }
            out.indented(|out| self.statements(declarations, out, scope))?;
        }
        out.line("BEGIN");
        let start = out.offset();
        out.indented(|out| self.body(body, out, scope))?;
        let stop = out.offset();
        out.line("END;");
        Ok(start..stop)
    }

    /// DDL inside PL/SQL runs as dynamic SQL.
    fn ddl(&self, text: String, scope: &Scope) -> String {
        if scope.kind == ObjectKind::Common {
            format!("{};", text)
        } else {
            format!("EXECUTE IMMEDIATE {};", string_literal(&text))
        }
    }
}

impl ScriptBuilder for OracleBuilder {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Oracle
    }

    fn generate_routine_scripts(&self, routine: &RoutineScript) -> TranslateResult<ScriptBuildResult> {
        let mut statements = routine.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let parameters: Vec<String> = routine.parameters.iter().map(|p| self.parameter(p)).collect();
        let parameters = if parameters.is_empty() {
            String::new()
        } else {
            format!("({})", parameters.join(", "))
        };
        let mut out = ScriptWriter::new();
        let scope = match routine.kind {
            RoutineKind::Procedure => {
                out.line(format!("CREATE OR REPLACE PROCEDURE {}{}", routine.name.qualified_name(), parameters));
                Scope::new(ObjectKind::Procedure)
            }
            RoutineKind::Function => {
                out.line(format!("CREATE OR REPLACE FUNCTION {}{}", routine.name.qualified_name(), parameters));
                let return_type = routine
                    .return_type
                    .as_ref()
                    .ok_or_else(|| TranslateError::unsupported("function without a return type", self.dialect()))?;
                out.line(format!("RETURN {}", without_size(return_type)));
                Scope::new(ObjectKind::Function)
            }
        };
        out.line("AS");
        let body = self.plsql_block(&statements, false, &mut out, &scope)?;
        Ok(ScriptBuildResult::from_writer(out, body))
    }

    fn generate_trigger_scripts(&self, trigger: &TriggerScript) -> TranslateResult<ScriptBuildResult> {
        let mut statements = trigger.statements.clone();
        if matches!(statements.last(), Some(Statement::Return(r)) if r.value.is_some()) {
            statements.pop();
        }
        restructure::prepare(&mut statements, self.dialect());
        let scope = Scope::new(ObjectKind::Trigger);
        let timing = match trigger.timing {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        };
        let events: Vec<&str> = trigger.events.iter().map(TriggerEvent::keyword).collect();
        let mut out = ScriptWriter::new();
        out.line(format!("CREATE OR REPLACE TRIGGER {}", trigger.name.qualified_name()));
        out.line(format!("{} {} ON {}", timing, events.join(" OR "), trigger.table.qualified_name()));
        if trigger.for_each_row || references_row(trigger) {
            out.line("FOR EACH ROW");
            if let Some(condition) = &trigger.condition {
                out.line(format!("WHEN ({})", when_condition(condition)));
            }
        } else if let Some(condition) = &trigger.condition {
            statements = vec![Statement::If(IfStatement {
                items: vec![IfItem {
                    kind: IfItemKind::If,
                    condition: Some(condition.clone()),
                    statements,
                }],
            })];
            restructure::hoist_declarations(&mut statements);
        }
        let body = self.plsql_block(&statements, true, &mut out, &scope)?;
        Ok(ScriptBuildResult::from_writer(out, body))
    }

    fn generate_common_scripts(&self, script: &CommonScript) -> TranslateResult<ScriptBuildResult> {
        let scope = Scope::new(ObjectKind::Common);
        let mut out = ScriptWriter::new();
        let plain = script.statements.iter().all(is_plain_sql);
        let single_block = matches!(script.statements.as_slice(), [Statement::Block(_)]);
        if plain || single_block {
            let mut statements = script.statements.clone();
            restructure::prepare(&mut statements, self.dialect());
            self.statements(&statements, &mut out, &scope)?;
            let stop = out.offset();
            return Ok(ScriptBuildResult::from_writer(out, 0..stop));
        }
        let mut statements = script.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let scope = Scope::new(ObjectKind::Procedure);
        let body = self.plsql_block(&statements, true, &mut out, &scope)?;
        Ok(ScriptBuildResult::from_writer(out, body))
    }

    fn empty_body(&self, _offset: usize) -> Option<String> {
        Some("NULL;".to_string())
    }

    // ---- queries ----

    fn dual_table(&self) -> Option<&'static str> {
        Some("DUAL")
    }

    fn limit_clause(&self, select: &SelectStatement) -> TranslateResult<Option<String>> {
        let mut parts = Vec::new();
        if let Some(offset) = &select.offset {
            parts.push(format!("OFFSET {} ROWS", offset.render()));
        }
        if let Some(limit) = &select.limit {
            let percent = if select.limit_percent { " PERCENT" } else { "" };
            parts.push(format!("FETCH FIRST {}{} ROWS ONLY", limit.render(), percent));
        }
        Ok((!parts.is_empty()).then(|| parts.join(" ")))
    }

    fn create_table_as(&self, name: &str, query: &str, scope: &Scope) -> String {
        let text = if is_temporary_name(name) {
            format!(
                "CREATE GLOBAL TEMPORARY TABLE {} ON COMMIT PRESERVE ROWS AS {}",
                strip_temporary(name),
                query
            )
        } else {
            format!("CREATE TABLE {} AS {}", name, query)
        };
        let statement = self.ddl(text, scope);
        statement.trim_end_matches(';').to_string()
    }

    fn select_statement(&self, select: &SelectStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(table) = into_table(select) {
            let mut query = select.clone();
            query.into.clear();
            let text = self.create_table_as(&table.render(), &self.select_text(&query)?, scope);
            out.line(format!("{};", text));
            return Ok(());
        }
        if scope.in_routine() && select.into.is_empty() && select.union.is_none() {
            warn!("query result discarded inside a routine");
        }
        out.line(format!("{};", self.select_text(select)?));
        Ok(())
    }

    fn insert_text(&self, insert: &InsertStatement) -> TranslateResult<String> {
        if insert.select.is_some() || insert.values.len() < 2 {
            let mut sql = format!("INSERT INTO {}", insert.table.qualified_name());
            if !insert.columns.is_empty() {
                sql.push_str(&format!(" ({})", join_tokens(&insert.columns, ", ")));
            }
            match &insert.select {
                Some(select) => sql.push_str(&format!(" {}", self.select_text(select)?)),
                None => {
                    let values = insert.values.first().map(|row| join_tokens(&row.values, ", ")).unwrap_or_default();
                    sql.push_str(&format!(" VALUES ({})", values));
                }
            }
            return Ok(sql);
        }
        let columns = if insert.columns.is_empty() {
            String::new()
        } else {
            format!(" ({})", join_tokens(&insert.columns, ", "))
        };
        let mut sql = String::from("INSERT ALL");
        for row in &insert.values {
            sql.push_str(&format!(
                " INTO {}{} VALUES ({})",
                insert.table.qualified_name(),
                columns,
                join_tokens(&row.values, ", ")
            ));
        }
        sql.push_str(" SELECT 1 FROM DUAL");
        Ok(sql)
    }

    fn update_text(&self, update: &UpdateStatement) -> TranslateResult<String> {
        if update.is_composite() {
            return self.composite_update(update);
        }
        if update.joins.is_some() {
            return Err(TranslateError::unsupported("UPDATE with JOIN", self.dialect()));
        }
        let mut target = update.table.render();
        let mut from = None;
        let mut conditions = Vec::new();
        if let Some(clause) = &update.from {
            let split = restructure::exclude_target(clause, &update.table)?;
            if let Some(t) = split.target {
                target = t;
            }
            from = split.from;
            conditions = split.conditions;
        }
        if let Some(w) = &update.where_clause {
            conditions.push(w.render());
        }
        let filter = where_suffix(&conditions);
        let Some(from) = from else {
            return Ok(format!("UPDATE {} SET {}{}", target, self.set_items(&update.items)?, filter));
        };
        let mut assignments = Vec::new();
        for item in &update.items {
            let (Some(name), Some(value)) = (item.names.first(), &item.value) else {
                return Err(TranslateError::unsupported("multi-column assignment", self.dialect()));
            };
            assignments.push(format!(
                "{} = (SELECT {} FROM {}{})",
                name.render(),
                value.render(),
                from,
                filter
            ));
        }
        Ok(format!(
            "UPDATE {} SET {} WHERE EXISTS (SELECT 1 FROM {}{})",
            target,
            assignments.join(", "),
            from,
            filter
        ))
    }

    fn composite_update(&self, update: &UpdateStatement) -> TranslateResult<String> {
        let mut assignments = Vec::new();
        for item in &update.items {
            match (&item.value, &item.subquery) {
                (Some(value), _) => {
                    if let Some(name) = item.names.first() {
                        assignments.push(format!("{} = {}", name.render(), value.render()));
                    }
                }
                (None, Some(subquery)) => assignments.push(format!(
                    "({}) = ({})",
                    join_tokens(&item.names, ", "),
                    self.select_text(subquery)?
                )),
                (None, None) => {}
            }
        }
        let mut sql = format!("UPDATE {} SET {}", update.table.render(), assignments.join(", "));
        if let Some(w) = &update.where_clause {
            sql.push_str(&format!(" WHERE {}", w.render()));
        }
        Ok(sql)
    }

    fn delete_text(&self, delete: &DeleteStatement) -> TranslateResult<String> {
        correlated_delete(delete)
    }

    // ---- control flow ----

    fn for_source(&self, source: &Token) -> String {
        let text = source.render();
        if text.trim_start().to_uppercase().starts_with("SELECT") {
            format!("({})", text)
        } else {
            text
        }
    }

    // ---- variables and cursors ----

    fn declare(&self, statement: &DeclareVariableStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        if statement.is_exception() {
            out.line(format!("{} EXCEPTION;", statement.name.render()));
            return Ok(());
        }
        let default = statement
            .default
            .as_ref()
            .map(|d| format!(" := {}", d.render()))
            .unwrap_or_default();
        out.line(format!("{} {}{};", statement.name.render(), statement.data_type.render(), default));
        Ok(())
    }

    fn declare_cursor(&self, statement: &DeclareCursorStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!(
            "CURSOR {} IS {};",
            statement.name.qualified_name(),
            self.select_text(&statement.query)?
        ));
        Ok(())
    }

    fn goto(&self, statement: &GotoStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("GOTO {};", statement.label.render()));
        Ok(())
    }

    fn label(&self, statement: &LabelStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("<<{}>>", statement.name.render()));
        Ok(())
    }

    // ---- errors ----

    fn raise(&self, statement: &RaiseStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let number = statement
            .code
            .as_ref()
            .and_then(|c| c.render().trim().parse::<i64>().ok());
        let code = number.filter(|n| USER_ERRORS.contains(n)).unwrap_or(*USER_ERRORS.end());
        let line = match (&statement.message, &statement.exception, number) {
            (Some(message), _, _) => format!("RAISE_APPLICATION_ERROR({}, {});", code, message.render()),
            (None, Some(name), _) => match restructure::known_exception(&name.render()) {
                Some(known) => format!("RAISE {};", known.name(self.dialect())),
                None => format!("RAISE {};", name.render()),
            },
            (None, None, Some(n)) => format!("RAISE_APPLICATION_ERROR({}, 'Error {}');", code, n),
            (None, None, None) => "RAISE;".to_string(),
        };
        out.line(line);
        Ok(())
    }

    fn return_statement(&self, statement: &ReturnStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        match (&statement.value, scope.kind) {
            (Some(value), ObjectKind::Function) => out.line(format!("RETURN {};", value.render())),
            (Some(value), _) => {
                warn!(value = %value, "return value dropped");
                out.line("RETURN;");
            }
            (None, _) => out.line("RETURN;"),
        }
        Ok(())
    }

    fn print(&self, statement: &PrintStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("DBMS_OUTPUT.PUT_LINE({});", statement.content.render()));
        Ok(())
    }

    fn call(&self, statement: &CallStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let call = format!("{}({})", statement.name.qualified_name(), join_tokens(&statement.args, ", "));
        match &statement.result {
            Some(result) => out.line(format!("{} := {};", result.render(), call)),
            None => out.line(format!("{};", call)),
        }
        Ok(())
    }

    fn execute_dynamic(&self, statement: &ExecuteDynamicStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let mut sql = format!("EXECUTE IMMEDIATE {}", statement.content.render());
        if !statement.into.is_empty() {
            sql.push_str(&format!(" INTO {}", join_tokens(&statement.into, ", ")));
        }
        if !statement.using.is_empty() {
            sql.push_str(&format!(" USING {}", join_tokens(&statement.using, ", ")));
        }
        out.line(format!("{};", sql));
        Ok(())
    }

    // ---- definitions ----

    fn truncate(&self, statement: &TruncateStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        out.line(self.ddl(format!("TRUNCATE TABLE {}", statement.table.qualified_name()), scope));
        Ok(())
    }

    fn drop_text(&self, statement: &DropStatement) -> String {
        let object_type = match statement.object_type.to_uppercase().as_str() {
            "PROC" => "PROCEDURE".to_string(),
            other => other.to_string(),
        };
        format!("DROP {} {}", object_type, strip_temporary(&statement.name.qualified_name()))
    }

    fn drop(&self, statement: &DropStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        let text = self.drop_text(statement);
        if !statement.if_exists {
            out.line(self.ddl(text, scope));
            return Ok(());
        }
        out.line("BEGIN");
        out.indented(|out| {
            out.line(format!("EXECUTE IMMEDIATE {};", string_literal(&text)));
            Ok(())
        })?;
        out.line("EXCEPTION");
        out.indented(|out| {
            out.line("WHEN OTHERS THEN NULL;");
            Ok(())
        })?;
        out.line("END;");
        Ok(())
    }

    fn create_table_text(&self, statement: &CreateTableStatement) -> String {
        let name = statement.table.qualified_name();
        if statement.temporary || is_temporary_name(&name) {
            format!(
                "CREATE GLOBAL TEMPORARY TABLE {} ({}) ON COMMIT PRESERVE ROWS",
                strip_temporary(&name),
                table_elements(statement)
            )
        } else {
            format!("CREATE TABLE {} ({})", name, table_elements(statement))
        }
    }

    fn create_table(&self, statement: &CreateTableStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        out.line(self.ddl(self.create_table_text(statement), scope));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::build::tests::build;

    #[test]
    fn test_size_is_stripped_from_parameter_types() {
        assert_eq!(without_size(&Token::new("VARCHAR2(50)", TokenKind::DataType)), "VARCHAR2");
        assert_eq!(without_size(&Token::new("NUMBER(10, 2)", TokenKind::DataType)), "NUMBER");
        assert_eq!(without_size(&Token::new("DATE", TokenKind::DataType)), "DATE");
    }

    #[test]
    fn test_procedure_layout() {
        let text = build(
            "CREATE PROCEDURE p(IN n INT, OUT total VARCHAR(20))
             BEGIN
               DECLARE i INT DEFAULT 0;
               WHILE i < n DO
                 SET i = i + 1;
               END WHILE;
             END",
            DatabaseType::MySql,
            DatabaseType::Oracle,
            ObjectKind::Procedure,
        )
        .unwrap();
        assert_eq!(
            text,
            "CREATE OR REPLACE PROCEDURE p(n IN INT, total OUT VARCHAR)\nAS\n    i INT := 0;\nBEGIN\n\
             \x20   WHILE i < n LOOP\n        i := i + 1;\n    END LOOP;\nEND;"
        );
    }

    #[test]
    fn test_multi_row_insert_and_limit() {
        let text = build(
            "INSERT INTO log (id, msg) VALUES (1, 'a'), (2, 'b'); SELECT id FROM log LIMIT 5 OFFSET 10;",
            DatabaseType::Postgres,
            DatabaseType::Oracle,
            ObjectKind::Common,
        )
        .unwrap();
        assert_eq!(
            text,
            "INSERT ALL INTO log (id, msg) VALUES (1, 'a') INTO log (id, msg) VALUES (2, 'b') SELECT 1 FROM DUAL;\n\
             SELECT id FROM log OFFSET 10 ROWS FETCH FIRST 5 ROWS ONLY;"
        );
    }

    #[test]
    fn test_drop_if_exists_is_guarded() {
        let text = build("DROP TABLE IF EXISTS stage;", DatabaseType::Postgres, DatabaseType::Oracle, ObjectKind::Common)
            .unwrap();
        assert_eq!(
            text,
            "BEGIN\n    EXECUTE IMMEDIATE 'DROP TABLE stage';\nEXCEPTION\n    WHEN OTHERS THEN NULL;\nEND;"
        );
    }

    #[test]
    fn test_update_from_becomes_correlated() {
        let text = build(
            "UPDATE o SET o.total = s.total FROM orders o INNER JOIN stage s ON s.id = o.id",
            DatabaseType::SqlServer,
            DatabaseType::Oracle,
            ObjectKind::Common,
        )
        .unwrap();
        assert_eq!(
            text,
            "UPDATE orders o SET o.total = (SELECT s.total FROM stage s WHERE s.id = o.id) \
             WHERE EXISTS (SELECT 1 FROM stage s WHERE s.id = o.id);"
        );
    }
}
