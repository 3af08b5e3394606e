//! Script builders: render a translated [`Script`] as text of one target dialect.
//!
//! Every target implements [`ScriptBuilder`]. The default methods render the
//! block structured procedural syntax PL/pgSQL and PL/SQL share; the other
//! builders override what their dialect spells differently. Before a body is
//! rendered, [`restructure::prepare`] rewrites error handling, cursor loops and
//! declarations that have no direct counterpart in the target.

use std::ops::Range;

use serde::Serialize;
use tracing::{debug, warn};

use crate::dialect::{DatabaseType, split_qualified, unquote};
use crate::error::{TranslateError, TranslateResult};
use crate::model::*;

mod mysql;
mod oracle;
mod postgres;
pub mod restructure;
mod sqlite;
mod sqlserver;

pub use mysql::MySqlBuilder;
pub use oracle::OracleBuilder;
pub use postgres::PostgresBuilder;
pub use sqlite::SqliteBuilder;
pub use sqlserver::SqlServerBuilder;

/// Placeholder for the label a MySQL procedure body is left through.
pub const EXIT_LABEL: &str = "{{exit_label}}";

/// Placeholder for the row a PostgreSQL trigger function returns.
pub const TRIGGER_ROW: &str = "{{trigger_row}}";

/// Generated text of one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptBuildResult {
    pub text: String,
    /// Byte offsets of the body inside `text`.
    pub body_start_index: usize,
    pub body_stop_index: usize,
    /// Literal `(placeholder, value)` pairs still to be substituted.
    pub replacements: Vec<(String, String)>,
}

impl ScriptBuildResult {
    pub fn new(text: String, body: Range<usize>) -> Self {
        Self {
            text,
            body_start_index: body.start,
            body_stop_index: body.end,
            replacements: Vec::new(),
        }
    }

    fn from_writer(out: ScriptWriter, body: Range<usize>) -> Self {
        let text = out.finish();
        let body = trim_range(&text, body);
        Self::new(text, body)
    }

    pub fn with_replacement(mut self, placeholder: impl Into<String>, value: impl Into<String>) -> Self {
        self.replacements.push((placeholder.into(), value.into()));
        self
    }

    pub fn body(&self) -> &str {
        self.text
            .get(self.body_start_index..self.body_stop_index)
            .unwrap_or_default()
    }

    /// Substitute every placeholder, keeping the body offsets on the same text.
    pub fn apply_replacements(&mut self) {
        for (from, to) in std::mem::take(&mut self.replacements) {
            if from.is_empty() {
                continue;
            }
            let delta = to.len() as isize - from.len() as isize;
            let (mut start, mut stop) = (self.body_start_index, self.body_stop_index);
            let mut text = String::with_capacity(self.text.len());
            let mut last = 0;
            for (at, _) in self.text.match_indices(from.as_str()) {
                text.push_str(&self.text[last..at]);
                text.push_str(&to);
                last = at + from.len();
                if at < self.body_start_index {
                    start = start.saturating_add_signed(delta);
                }
                if at < self.body_stop_index {
                    stop = stop.saturating_add_signed(delta);
                }
            }
            text.push_str(&self.text[last..]);
            self.text = text;
            self.body_start_index = start;
            self.body_stop_index = stop.min(self.text.len());
        }
    }
}

/// `range` narrowed to exclude surrounding whitespace.
fn trim_range(text: &str, range: Range<usize>) -> Range<usize> {
    let end = range.end.min(text.len());
    let start = range.start.min(end);
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    if lead == slice.len() {
        return start..start;
    }
    start + lead..end - trail
}

/// Indented line writer.
#[derive(Debug, Default)]
pub struct ScriptWriter {
    text: String,
    depth: usize,
}

impl ScriptWriter {
    const INDENT: &'static str = "    ";

    pub fn new() -> Self {
        Self::default()
    }

    /// Write each line of `text` at the current depth.
    pub fn line(&mut self, text: impl AsRef<str>) {
        self.line_at(self.depth, text.as_ref());
    }

    /// Write one level left of the current depth (`EXCEPTION` inside a block).
    pub fn outdented(&mut self, text: impl AsRef<str>) {
        self.line_at(self.depth.saturating_sub(1), text.as_ref());
    }

    fn line_at(&mut self, depth: usize, text: &str) {
        for line in text.lines() {
            if !line.trim().is_empty() {
                for _ in 0..depth {
                    self.text.push_str(Self::INDENT);
                }
                self.text.push_str(line);
            }
            self.text.push('\n');
        }
    }

    /// Run `f` one level deeper.
    pub fn indented<F>(&mut self, f: F) -> TranslateResult<()>
    where
        F: FnOnce(&mut Self) -> TranslateResult<()>,
    {
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub fn offset(&self) -> usize {
        self.text.len()
    }

    pub fn finish(mut self) -> String {
        let len = self.text.trim_end().len();
        self.text.truncate(len);
        self.text
    }
}

/// What surrounds the statement being rendered.
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ObjectKind,
    /// Labels of the enclosing loops, innermost last.
    loops: Vec<String>,
}

impl Scope {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            loops: Vec::new(),
        }
    }

    pub fn in_routine(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Procedure | ObjectKind::Function | ObjectKind::Trigger
        )
    }

    pub fn enter_loop(&self, label: impl Into<String>) -> Scope {
        let mut scope = self.clone();
        scope.loops.push(label.into());
        scope
    }

    pub fn innermost_loop(&self) -> Option<&str> {
        self.loops.last().map(String::as_str)
    }

    /// Label for a loop written without one.
    pub fn generated_label(&self) -> String {
        format!("loop_{}", self.loops.len() + 1)
    }
}

pub(crate) fn join_tokens(tokens: &[Token], separator: &str) -> String {
    tokens
        .iter()
        .map(Token::render)
        .collect::<Vec<_>>()
        .join(separator)
}

fn column_list(columns: &[Token]) -> String {
    if columns.is_empty() {
        String::new()
    } else {
        format!(" ({})", join_tokens(columns, ", "))
    }
}

/// A select column without its alias.
pub(crate) fn column_value(column: &Token) -> String {
    let children = column.children();
    match children.last() {
        Some(last) if last.kind == TokenKind::ColumnAlias => {
            let mut end = children.len() - 1;
            if end > 0 && children[end - 1].is_keyword("AS") {
                end -= 1;
            }
            render_sequence(&children[..end])
        }
        _ => column.render(),
    }
}

/// The leading run of declarations and the statements after it.
pub(crate) fn split_declarations(statements: &[Statement]) -> (&[Statement], &[Statement]) {
    let count = statements.iter().take_while(|s| s.is_declaration()).count();
    statements.split_at(count)
}

/// SQL Server `#temp` table names.
pub(crate) fn is_temporary_name(name: &str) -> bool {
    split_qualified(name)
        .last()
        .is_some_and(|part| unquote(part).starts_with('#'))
}

pub(crate) fn strip_temporary(name: &str) -> String {
    name.replace('#', "")
}

/// The table a `SELECT … INTO` writes, when it is not a variable list.
pub(crate) fn into_table(select: &SelectStatement) -> Option<&Token> {
    select
        .into
        .first()
        .filter(|t| t.kind == TokenKind::TableName)
}

/// Quote `text` as a string literal.
pub(crate) fn string_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn has_or(condition: &str) -> bool {
    condition
        .split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("OR"))
}

/// Conditions joined with `AND`, parenthesising those that contain `OR`.
pub(crate) fn and_conditions(conditions: &[String]) -> Option<String> {
    if conditions.len() < 2 {
        return conditions.first().cloned();
    }
    let parts: Vec<String> = conditions
        .iter()
        .map(|c| if has_or(c) { format!("({})", c) } else { c.clone() })
        .collect();
    Some(parts.join(" AND "))
}

fn where_suffix(conditions: &[String]) -> String {
    and_conditions(conditions)
        .map(|c| format!(" WHERE {}", c))
        .unwrap_or_default()
}

/// `DELETE … WHERE EXISTS (SELECT 1 FROM …)` for dialects without a joined delete.
pub(crate) fn correlated_delete(delete: &DeleteStatement) -> TranslateResult<String> {
    let mut target = delete.table.render();
    let mut from = None;
    let mut conditions = Vec::new();
    if let Some(clause) = &delete.from {
        let split = restructure::exclude_target(clause, &delete.table)?;
        if let Some(t) = split.target {
            target = t;
        }
        from = split.from;
        conditions = split.conditions;
    }
    if let Some(w) = &delete.where_clause {
        conditions.push(w.render());
    }
    let mut sql = format!("DELETE FROM {}", target);
    match from {
        Some(from) => sql.push_str(&format!(
            " WHERE EXISTS (SELECT 1 FROM {}{})",
            from,
            where_suffix(&conditions)
        )),
        None => sql.push_str(&where_suffix(&conditions)),
    }
    Ok(sql)
}

/// Renders scripts for one target dialect.
pub trait ScriptBuilder: Send + Sync {
    fn dialect(&self) -> DatabaseType;

    fn generate_routine_scripts(&self, routine: &RoutineScript) -> TranslateResult<ScriptBuildResult>;

    fn generate_trigger_scripts(&self, trigger: &TriggerScript) -> TranslateResult<ScriptBuildResult>;

    fn create_view(&self) -> &'static str {
        "CREATE OR REPLACE VIEW"
    }

    fn generate_view_scripts(&self, view: &ViewScript) -> TranslateResult<ScriptBuildResult> {
        let mut out = ScriptWriter::new();
        out.line(format!(
            "{} {}{} AS",
            self.create_view(),
            view.name.qualified_name(),
            column_list(&view.columns)
        ));
        let start = out.offset();
        out.line(format!("{};", self.select_text(&view.select)?));
        let stop = out.offset();
        Ok(ScriptBuildResult::from_writer(out, start..stop))
    }

    fn generate_common_scripts(&self, script: &CommonScript) -> TranslateResult<ScriptBuildResult> {
        let mut statements = script.statements.clone();
        restructure::prepare(&mut statements, self.dialect());
        let scope = Scope::new(ObjectKind::Common);
        let mut out = ScriptWriter::new();
        self.statements(&statements, &mut out, &scope)?;
        let stop = out.offset();
        Ok(ScriptBuildResult::from_writer(out, 0..stop))
    }

    fn generate(&self, script: &Script) -> TranslateResult<ScriptBuildResult> {
        match script {
            Script::Common(s) => self.generate_common_scripts(s),
            Script::Routine(s) => {
                if s.return_table.is_some() {
                    return Err(TranslateError::unsupported("table-valued function", self.dialect()));
                }
                self.generate_routine_scripts(s)
            }
            Script::View(s) => self.generate_view_scripts(s),
            Script::Trigger(s) => self.generate_trigger_scripts(s),
        }
    }

    fn statements(&self, statements: &[Statement], out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        statements
            .iter()
            .try_for_each(|statement| self.statement(statement, out, scope))
    }

    /// Statements of a compound body; some dialects reject an empty one.
    fn body(&self, statements: &[Statement], out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        let start = out.offset();
        self.statements(statements, out, scope)?;
        if out.offset() == start {
            if let Some(filler) = self.empty_body(start) {
                out.line(filler);
            }
        }
        Ok(())
    }

    /// Placeholder for a body that rendered nothing, `offset` being where it starts.
    fn empty_body(&self, _offset: usize) -> Option<String> {
        None
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
            Statement::Case(s) => self.case_statement(s, out, scope),
            Statement::While(s) => self.while_statement(s, out, scope),
            Statement::Loop(s) => self.loop_statement(s, out, scope),
            Statement::LoopExit(s) => self.loop_exit(s, out, scope),
            Statement::Declare(s) => self.declare(s, out),
            Statement::Set(s) => self.set(s, out),
            Statement::DeclareCursor(s) => self.declare_cursor(s, out),
            Statement::OpenCursor(s) => {
                out.line(format!("OPEN {};", s.name.qualified_name()));
                Ok(())
            }
            Statement::FetchCursor(s) => self.fetch(s, out),
            Statement::CloseCursor(s) => {
                out.line(format!("CLOSE {};", s.name.qualified_name()));
                Ok(())
            }
            Statement::DeallocateCursor(s) => self.deallocate(s, out),
            Statement::DeclareHandler(s) => self.declare_handler(s, out, scope),
            Statement::Goto(s) => self.goto(s, out),
            Statement::Label(s) => self.label(s, out),
            Statement::TryCatch(s) => self.try_catch(s, out, scope),
            Statement::Exception(s) => self.exception(s, out, scope),
            Statement::Raise(s) => self.raise(s, out),
            Statement::Return(s) => self.return_statement(s, out, scope),
            Statement::Print(s) => self.print(s, out),
            Statement::Call(s) => self.call(s, out),
            Statement::Prepare(s) => self.prepare(s, out),
            Statement::ExecuteDynamic(s) => self.execute_dynamic(s, out),
            Statement::Transaction(s) => self.transaction(s, out),
            Statement::Truncate(s) => self.truncate(s, out, scope),
            Statement::Drop(s) => self.drop(s, out, scope),
            Statement::CreateTable(s) => self.create_table(s, out, scope),
            Statement::Block(s) => self.block(s, out, scope),
            Statement::Other(s) => self.other(s, out),
        }
    }

    // ---- queries ----

    /// `TOP` style limit written after `SELECT`.
    fn top_clause(&self, _select: &SelectStatement) -> TranslateResult<Option<String>> {
        Ok(None)
    }

    /// Limit and offset written after `ORDER BY`.
    fn limit_clause(&self, select: &SelectStatement) -> TranslateResult<Option<String>> {
        if select.limit_percent {
            return Err(TranslateError::unsupported("row limit in percent", self.dialect()));
        }
        let mut parts = Vec::new();
        if let Some(limit) = &select.limit {
            parts.push(format!("LIMIT {}", limit.render()));
        }
        if let Some(offset) = &select.offset {
            parts.push(format!("OFFSET {}", offset.render()));
        }
        Ok((!parts.is_empty()).then(|| parts.join(" ")))
    }

    /// Table a query without `FROM` must name.
    fn dual_table(&self) -> Option<&'static str> {
        None
    }

    /// Whether `SELECT … INTO variables` is written as `SELECT @v = expr`.
    fn assigns_in_select_list(&self) -> bool {
        false
    }

    fn select_text(&self, select: &SelectStatement) -> TranslateResult<String> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(with) = &select.with {
            parts.push(with.render());
        }
        parts.push("SELECT".to_string());
        if select.distinct {
            parts.push("DISTINCT".to_string());
        }
        if let Some(top) = self.top_clause(select)? {
            parts.push(top);
        }
        let into_variables = !select.into.is_empty() && into_table(select).is_none();
        if into_variables && self.assigns_in_select_list() {
            if select.into.len() != select.columns.len() {
                return Err(TranslateError::unsupported(
                    "SELECT INTO with a different number of variables and columns",
                    self.dialect(),
                ));
            }
            let assignments: Vec<String> = select
                .into
                .iter()
                .zip(&select.columns)
                .map(|(variable, column)| format!("{} = {}", variable.render(), column_value(column)))
                .collect();
            parts.push(assignments.join(", "));
        } else {
            parts.push(join_tokens(&select.columns, ", "));
            if !select.into.is_empty() {
                parts.push(format!("INTO {}", join_tokens(&select.into, ", ")));
            }
        }
        match &select.from {
            Some(from) if self.dialect() != DatabaseType::Oracle && from.render().eq_ignore_ascii_case("DUAL") => {}
            Some(from) => parts.push(format!("FROM {}", from.render())),
            None => {
                if let Some(dual) = self.dual_table() {
                    parts.push(format!("FROM {}", dual));
                }
            }
        }
        if let Some(w) = &select.where_clause {
            parts.push(format!("WHERE {}", w.render()));
        }
        if let Some(g) = &select.group_by {
            parts.push(format!("GROUP BY {}", g.render()));
        }
        if let Some(h) = &select.having {
            parts.push(format!("HAVING {}", h.render()));
        }
        if let Some(o) = &select.order_by {
            parts.push(format!("ORDER BY {}", o.render()));
        }
        if let Some(limit) = self.limit_clause(select)? {
            parts.push(limit);
        }
        if let Some(tail) = &select.tail {
            parts.push(tail.render());
        }
        if let Some(union) = &select.union {
            parts.push(union.operator.render());
            parts.push(self.select_text(&union.select)?);
        }
        Ok(parts.join(" "))
    }

    fn create_table_as(&self, name: &str, query: &str, _scope: &Scope) -> String {
        if is_temporary_name(name) {
            format!("CREATE TEMPORARY TABLE {} AS {}", strip_temporary(name), query)
        } else {
            format!("CREATE TABLE {} AS {}", name, query)
        }
    }

    fn select_statement(&self, select: &SelectStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(table) = into_table(select) {
            let mut query = select.clone();
            query.into.clear();
            let text = self.create_table_as(&table.render(), &self.select_text(&query)?, scope);
            out.line(format!("{};", text));
            return Ok(());
        }
        out.line(format!("{};", self.select_text(select)?));
        Ok(())
    }

    fn insert_text(&self, insert: &InsertStatement) -> TranslateResult<String> {
        let mut sql = format!("INSERT INTO {}{}", insert.table.qualified_name(), column_list(&insert.columns));
        match &insert.select {
            Some(select) => {
                sql.push(' ');
                sql.push_str(&self.select_text(select)?);
            }
            None => {
                let rows: Vec<String> = insert
                    .values
                    .iter()
                    .map(|row| format!("({})", join_tokens(&row.values, ", ")))
                    .collect();
                sql.push_str(" VALUES ");
                sql.push_str(&rows.join(", "));
            }
        }
        Ok(sql)
    }

    /// Column name on the left of a `SET` assignment.
    fn set_target(&self, name: &Token) -> String {
        name.render()
    }

    fn set_items(&self, items: &[SetItem]) -> TranslateResult<String> {
        let mut assignments = Vec::new();
        for item in items {
            match (&item.value, item.names.first()) {
                (Some(value), Some(name)) => {
                    assignments.push(format!("{} = {}", self.set_target(name), value.render()))
                }
                _ => {
                    return Err(TranslateError::unsupported("multi-column assignment", self.dialect()));
                }
            }
        }
        Ok(assignments.join(", "))
    }

    /// One `col = (SELECT expr …)` per column of each composite item.
    fn scalar_set_items(&self, items: &[SetItem]) -> TranslateResult<String> {
        let mut assignments = Vec::new();
        for item in items {
            match (&item.value, &item.subquery) {
                (Some(value), _) => {
                    if let Some(name) = item.names.first() {
                        assignments.push(format!("{} = {}", self.set_target(name), value.render()));
                    }
                }
                (None, Some(subquery)) => {
                    for (name, column) in item.names.iter().zip(&subquery.columns) {
                        let mut query = (**subquery).clone();
                        query.columns = vec![column.clone()];
                        assignments.push(format!("{} = ({})", self.set_target(name), self.select_text(&query)?));
                    }
                }
                (None, None) => {}
            }
        }
        Ok(assignments.join(", "))
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
        let mut sql = format!("UPDATE {} SET {}", target, self.set_items(&update.items)?);
        if let Some(from) = from {
            sql.push_str(&format!(" FROM {}", from));
        }
        sql.push_str(&where_suffix(&conditions));
        Ok(sql)
    }

    /// `UPDATE t SET (a, b) = (SELECT …)` as a join against the subquery's tables.
    fn composite_update(&self, update: &UpdateStatement) -> TranslateResult<String> {
        let Some(expanded) = restructure::expand_composite(update) else {
            return Ok(format!(
                "UPDATE {} SET {}{}",
                update.table.render(),
                self.scalar_set_items(&update.items)?,
                update
                    .where_clause
                    .as_ref()
                    .map(|w| format!(" WHERE {}", w.render()))
                    .unwrap_or_default()
            ));
        };
        let mut from = None;
        let mut conditions = Vec::new();
        if let Some(clause) = &expanded.from {
            let split = restructure::exclude_target(clause, &update.table)?;
            from = split.from;
            conditions.extend(split.conditions);
        }
        conditions.extend(expanded.conditions.iter().cloned());
        let assignments: Vec<String> = expanded
            .assignments
            .iter()
            .map(|(name, value)| format!("{} = {}", self.set_target(name), value))
            .collect();
        let mut sql = format!("UPDATE {} SET {}", update.table.render(), assignments.join(", "));
        if let Some(from) = from {
            sql.push_str(&format!(" FROM {}", from));
        }
        sql.push_str(&where_suffix(&conditions));
        Ok(sql)
    }

    fn delete_text(&self, delete: &DeleteStatement) -> TranslateResult<String> {
        let mut sql = format!("DELETE FROM {}", delete.table.render());
        let mut conditions = Vec::new();
        if let Some(clause) = &delete.from {
            let split = restructure::exclude_target(clause, &delete.table)?;
            if let Some(target) = split.target {
                sql = format!("DELETE FROM {}", target);
            }
            if let Some(from) = split.from {
                sql.push_str(&format!(" USING {}", from));
            }
            conditions = split.conditions;
        }
        if let Some(w) = &delete.where_clause {
            conditions.push(w.render());
        }
        sql.push_str(&where_suffix(&conditions));
        Ok(sql)
    }

    // ---- control flow ----

    fn else_if_keyword(&self) -> &'static str {
        "ELSIF"
    }

    /// A branch or loop condition as the target writes it.
    fn condition(&self, condition: &Token) -> String {
        condition.render()
    }

    fn if_statement(&self, statement: &IfStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        for item in &statement.items {
            match (item.kind, &item.condition) {
                (IfItemKind::If, Some(c)) => out.line(format!("IF {} THEN", self.condition(c))),
                (IfItemKind::ElseIf, Some(c)) => {
                    out.line(format!("{} {} THEN", self.else_if_keyword(), self.condition(c)))
                }
                _ => out.line("ELSE"),
            }
            out.indented(|out| self.body(&item.statements, out, scope))?;
        }
        out.line("END IF;");
        Ok(())
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
            Ok(())
        })?;
        out.line("END CASE;");
        Ok(())
    }

    fn loop_label(&self, label: &Token, out: &mut ScriptWriter) {
        out.line(format!("<<{}>>", label.render()));
    }

    fn while_statement(&self, statement: &WhileStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(label) = &statement.label {
            self.loop_label(label, out);
        }
        let label = statement.label.as_ref().map(Token::render);
        let inner = scope.enter_loop(label.clone().unwrap_or_default());
        out.line(format!("WHILE {} LOOP", self.condition(&statement.condition)));
        out.indented(|out| self.body(&statement.statements, out, &inner))?;
        out.line(end_loop(label.as_deref()));
        Ok(())
    }

    /// Source of a `FOR … IN` loop over a query or cursor.
    fn for_source(&self, source: &Token) -> String {
        source.render()
    }

    fn loop_statement(&self, statement: &LoopStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(label) = &statement.label {
            self.loop_label(label, out);
        }
        let label = statement.label.as_ref().map(Token::render);
        let inner = scope.enter_loop(label.clone().unwrap_or_default());
        match (statement.kind, &statement.header) {
            (LoopKind::For, Some(header)) => {
                let range = match (&header.source, &header.lower, &header.upper) {
                    (Some(source), _, _) => self.for_source(source),
                    (None, Some(lower), Some(upper)) => {
                        format!("{}..{}", lower.render(), upper.render())
                    }
                    _ => return Err(TranslateError::unsupported("FOR loop without a range", self.dialect())),
                };
                let reverse = if header.reverse { "REVERSE " } else { "" };
                out.line(format!("FOR {} IN {}{} LOOP", header.variable.render(), reverse, range));
                out.indented(|out| self.body(&statement.statements, out, &inner))?;
            }
            (LoopKind::Repeat, _) => {
                out.line("LOOP");
                out.indented(|out| {
                    self.statements(&statement.statements, out, &inner)?;
                    if let Some(c) = &statement.condition {
                        out.line(format!("EXIT WHEN {};", c.render()));
                    }
                    Ok(())
                })?;
            }
            _ => {
                out.line("LOOP");
                out.indented(|out| self.body(&statement.statements, out, &inner))?;
            }
        }
        out.line(end_loop(label.as_deref()));
        Ok(())
    }

    fn loop_exit(&self, statement: &LoopExitStatement, out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        let mut sql = match statement.kind {
            LoopExitKind::Break => "EXIT".to_string(),
            LoopExitKind::Continue => "CONTINUE".to_string(),
        };
        if let Some(label) = &statement.label {
            sql.push(' ');
            sql.push_str(&label.render());
        }
        if let Some(c) = &statement.condition {
            sql.push_str(&format!(" WHEN {}", c.render()));
        }
        out.line(format!("{};", sql));
        Ok(())
    }

    // ---- variables and cursors ----

    fn declare(&self, statement: &DeclareVariableStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        if statement.is_exception() {
            debug!(name = %statement.name, dialect = %self.dialect(), "exception declaration dropped");
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

    fn set(&self, statement: &SetStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("{} := {};", statement.name.render(), statement.value.render()));
        Ok(())
    }

    fn declare_cursor(&self, statement: &DeclareCursorStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!(
            "{} CURSOR FOR {};",
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
        out.line(format!("FETCH {}{};", statement.name.qualified_name(), into));
        Ok(())
    }

    fn deallocate(&self, statement: &CursorStatement, _out: &mut ScriptWriter) -> TranslateResult<()> {
        debug!(cursor = %statement.name, dialect = %self.dialect(), "cursor deallocation dropped");
        Ok(())
    }

    fn declare_handler(
        &self,
        _statement: &DeclareHandlerStatement,
        _out: &mut ScriptWriter,
        _scope: &Scope,
    ) -> TranslateResult<()> {
        Err(TranslateError::unsupported("DECLARE HANDLER", self.dialect()))
    }

    fn goto(&self, _statement: &GotoStatement, _out: &mut ScriptWriter) -> TranslateResult<()> {
        Err(TranslateError::unsupported("GOTO", self.dialect()))
    }

    fn label(&self, statement: &LabelStatement, _out: &mut ScriptWriter) -> TranslateResult<()> {
        debug!(label = %statement.name, dialect = %self.dialect(), "label dropped");
        Ok(())
    }

    // ---- errors ----

    fn try_catch(&self, _statement: &TryCatchStatement, _out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        Err(TranslateError::unsupported("TRY/CATCH", self.dialect()))
    }

    fn exception(&self, statement: &ExceptionStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        out.outdented("EXCEPTION");
        for handler in &statement.handlers {
            let condition = restructure::exception_condition(&handler.condition, self.dialect());
            out.line(format!("WHEN {} THEN", condition));
            out.indented(|out| self.body(&handler.statements, out, scope))?;
        }
        Ok(())
    }

    fn raise(&self, statement: &RaiseStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let errcode = statement
            .code
            .as_ref()
            .map(Token::render)
            .filter(|c| is_sqlstate(c))
            .map(|c| format!(" USING ERRCODE = {}", c))
            .unwrap_or_default();
        let line = match (&statement.message, &statement.exception, &statement.code) {
            (Some(message), _, _) => format!("RAISE EXCEPTION '%', {}{};", message.render(), errcode),
            (None, Some(name), _) => match restructure::known_exception(&name.render()) {
                Some(known) => format!("RAISE {};", known.name(self.dialect())),
                None => format!("RAISE EXCEPTION {};", string_literal(&name.render())),
            },
            (None, None, Some(code)) if errcode.is_empty() => {
                format!("RAISE EXCEPTION 'Error %', {};", code.render())
            }
            (None, None, Some(_)) => format!("RAISE EXCEPTION{};", errcode),
            (None, None, None) => "RAISE;".to_string(),
        };
        out.line(line);
        Ok(())
    }

    fn return_statement(&self, statement: &ReturnStatement, out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        match &statement.value {
            Some(v) => out.line(format!("RETURN {};", v.render())),
            None => out.line("RETURN;"),
        }
        Ok(())
    }

    fn print(&self, statement: &PrintStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        out.line(format!("RAISE NOTICE '%', {};", statement.content.render()));
        Ok(())
    }

    fn call(&self, statement: &CallStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        if let Some(result) = &statement.result {
            warn!(routine = %statement.name, result = %result, dialect = %self.dialect(), "procedure return code dropped");
        }
        out.line(format!(
            "CALL {}({});",
            statement.name.qualified_name(),
            join_tokens(&statement.args, ", ")
        ));
        Ok(())
    }

    fn prepare(&self, statement: &PrepareStatement, _out: &mut ScriptWriter) -> TranslateResult<()> {
        if statement.source.is_none() {
            debug!(name = %statement.name, "prepared statement deallocation dropped");
            return Ok(());
        }
        Err(TranslateError::unsupported("PREPARE", self.dialect()))
    }

    fn execute_dynamic(&self, statement: &ExecuteDynamicStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let mut sql = format!("EXECUTE {}", statement.content.render());
        if !statement.into.is_empty() {
            sql.push_str(&format!(" INTO {}", join_tokens(&statement.into, ", ")));
        }
        if !statement.using.is_empty() {
            sql.push_str(&format!(" USING {}", join_tokens(&statement.using, ", ")));
        }
        out.line(format!("{};", sql));
        Ok(())
    }

    fn transaction(&self, statement: &TransactionStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        match statement.kind {
            TransactionKind::Begin => debug!(dialect = %self.dialect(), "implicit transaction start"),
            TransactionKind::Commit => out.line("COMMIT;"),
            TransactionKind::Rollback => out.line("ROLLBACK;"),
        }
        Ok(())
    }

    // ---- definitions ----

    fn truncate(&self, statement: &TruncateStatement, out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        out.line(format!("TRUNCATE TABLE {};", statement.table.qualified_name()));
        Ok(())
    }

    fn drop_text(&self, statement: &DropStatement) -> String {
        let object_type = match statement.object_type.to_uppercase().as_str() {
            "PROC" => "PROCEDURE".to_string(),
            other => other.to_string(),
        };
        let if_exists = if statement.if_exists { " IF EXISTS" } else { "" };
        format!("DROP {}{} {}", object_type, if_exists, statement.name.qualified_name())
    }

    fn drop(&self, statement: &DropStatement, out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        out.line(format!("{};", self.drop_text(statement)));
        Ok(())
    }

    fn create_table_text(&self, statement: &CreateTableStatement) -> String {
        let name = statement.table.qualified_name();
        let prefix = if statement.temporary || is_temporary_name(&name) {
            "CREATE TEMPORARY TABLE"
        } else {
            "CREATE TABLE"
        };
        format!("{} {} ({})", prefix, strip_temporary(&name), table_elements(statement))
    }

    fn create_table(&self, statement: &CreateTableStatement, out: &mut ScriptWriter, _scope: &Scope) -> TranslateResult<()> {
        out.line(format!("{};", self.create_table_text(statement)));
        Ok(())
    }

    fn block(&self, statement: &BlockStatement, out: &mut ScriptWriter, scope: &Scope) -> TranslateResult<()> {
        if let Some(label) = &statement.label {
            self.loop_label(label, out);
        }
        let (declarations, body) = split_declarations(&statement.statements);
        if !declarations.is_empty() {
            out.line("DECLARE");
            out.indented(|out| self.statements(declarations, out, scope))?;
        }
        out.line("BEGIN");
        out.indented(|out| self.body(body, out, scope))?;
        match &statement.label {
            Some(label) => out.line(format!("END {};", label.render())),
            None => out.line("END;"),
        }
        Ok(())
    }

    fn other(&self, statement: &OtherStatement, out: &mut ScriptWriter) -> TranslateResult<()> {
        let text = statement.content.render();
        match statement.dialect {
            Some(source) if source != self.dialect() && is_session_statement(&statement.content) => {
                debug!(statement = %text, source = %source, target = %self.dialect(), "session statement dropped");
            }
            Some(source) if source != self.dialect() => {
                warn!(statement = %text, source = %source, target = %self.dialect(), "statement kept as written");
                out.line(format!("{};", text));
            }
            _ => out.line(format!("{};", text)),
        }
        Ok(())
    }
}

fn end_loop(label: Option<&str>) -> String {
    match label {
        Some(label) => format!("END LOOP {};", label),
        None => "END LOOP;".to_string(),
    }
}

/// `'xxxxx'` five character SQLSTATE literals.
pub(crate) fn is_sqlstate(code: &str) -> bool {
    let inner = code.trim().trim_matches('\'');
    code.trim().starts_with('\'') && inner.len() == 5 && inner.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Statements that only configure the source session.
fn is_session_statement(content: &Token) -> bool {
    let first = content
        .children()
        .first()
        .unwrap_or(content)
        .symbol
        .to_uppercase();
    let first = first.split_whitespace().next().unwrap_or_default().to_string();
    matches!(
        first.as_str(),
        "SET" | "USE" | "PRAGMA" | "NULL" | "GO"
    )
}

/// Statements a dialect without procedural blocks can still run.
pub(crate) fn is_plain_sql(statement: &Statement) -> bool {
    matches!(
        statement,
        Statement::Select(_)
            | Statement::Insert(_)
            | Statement::Update(_)
            | Statement::Delete(_)
            | Statement::Truncate(_)
            | Statement::Drop(_)
            | Statement::CreateTable(_)
            | Statement::Transaction(_)
            | Statement::Other(_)
    )
}

/// Column definitions and table constraints of a `CREATE TABLE`.
pub(crate) fn table_elements(statement: &CreateTableStatement) -> String {
    let mut elements: Vec<String> = statement
        .columns
        .iter()
        .map(|c| {
            let mut text = format!("{} {}", c.name.render(), c.data_type.render());
            if let Some(options) = &c.options {
                text.push(' ');
                text.push_str(&options.render());
            }
            text
        })
        .collect();
    elements.extend(statement.constraints.iter().map(Token::render));
    elements.join(", ")
}

/// Parameter list in parentheses, or nothing when there are no parameters.
pub(crate) fn parameter_list(parameters: Vec<String>, always: bool) -> String {
    if parameters.is_empty() && !always {
        String::new()
    } else {
        format!("({})", parameters.join(", "))
    }
}

/// The builder for `dialect`.
pub fn for_dialect(dialect: DatabaseType) -> &'static dyn ScriptBuilder {
    match dialect {
        DatabaseType::SqlServer => &SqlServerBuilder,
        DatabaseType::MySql => &MySqlBuilder,
        DatabaseType::Postgres => &PostgresBuilder,
        DatabaseType::Oracle => &OracleBuilder,
        DatabaseType::Sqlite => &SqliteBuilder,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::analyser;

    /// Analyse `text` in `source` and render it for `target` without token translation.
    pub(crate) fn build(text: &str, source: DatabaseType, target: DatabaseType, kind: ObjectKind) -> TranslateResult<String> {
        let script = analyser::analyse_script(source, kind, text)?;
        let mut result = for_dialect(target).generate(&script)?;
        result.apply_replacements();
        Ok(result.text)
    }

    #[test]
    fn test_writer_indents_lines() {
        let mut out = ScriptWriter::new();
        out.line("BEGIN");
        out.indented(|out| {
            out.line("a;\nb;");
            out.outdented("EXCEPTION");
            Ok(())
        })
        .unwrap();
        out.line("END;");
        assert_eq!(out.finish(), "BEGIN\n    a;\n    b;\nEXCEPTION\nEND;");
    }

    #[test]
    fn test_apply_replacements_moves_body_offsets() {
        let text = "HEAD {{exit_label}}: BEGIN\nLEAVE {{exit_label}};\nEND".to_string();
        let start = text.find("LEAVE").unwrap();
        let stop = start + "LEAVE {{exit_label}};".len();
        let mut result = ScriptBuildResult::new(text, start..stop).with_replacement(EXIT_LABEL, "sp");
        result.apply_replacements();
        assert_eq!(result.text, "HEAD sp: BEGIN\nLEAVE sp;\nEND");
        assert_eq!(result.body(), "LEAVE sp;");
        assert!(result.replacements.is_empty());
    }

    #[test]
    fn test_column_value_strips_alias() {
        let mut column = Token::new("SUM(x) AS total", TokenKind::Expression);
        column.add_child(Token::new("SUM(x)", TokenKind::FunctionCall));
        column.add_child(Token::new("AS", TokenKind::Keyword));
        column.add_child(Token::new("total", TokenKind::ColumnAlias));
        assert_eq!(column_value(&column), "SUM(x)");
        assert_eq!(column_value(&Token::new("a", TokenKind::ColumnName)), "a");
    }

    #[test]
    fn test_and_conditions_parenthesises_or() {
        let conditions = vec!["a = 1 OR b = 2".to_string(), "c = 3".to_string()];
        assert_eq!(and_conditions(&conditions).unwrap(), "(a = 1 OR b = 2) AND c = 3");
        assert_eq!(and_conditions(&[]), None);
    }

    #[test]
    fn test_view_body_offsets() {
        let script = analyser::analyse_script(
            DatabaseType::MySql,
            ObjectKind::View,
            "CREATE VIEW v_orders AS SELECT id, total FROM orders LIMIT 10",
        )
        .unwrap();
        let result = for_dialect(DatabaseType::Postgres).generate(&script).unwrap();
        assert_eq!(result.body(), "SELECT id, total FROM orders LIMIT 10;");
        assert!(result.text.starts_with("CREATE OR REPLACE VIEW v_orders AS"));
    }

    #[test]
    fn test_table_valued_function_is_unsupported() {
        let err = build(
            "CREATE FUNCTION dbo.fn_items(@id INT) RETURNS TABLE AS RETURN (SELECT * FROM items WHERE id = @id)",
            DatabaseType::SqlServer,
            DatabaseType::MySql,
            ObjectKind::Function,
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
    }
}
