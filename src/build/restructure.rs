//! Body rewrites applied before rendering.
//!
//! Each dialect has its own way to handle errors, detect the end of a cursor
//! and place declarations. These passes move a body from the source's shape
//! to the target's while it is still a tree.

use std::collections::{HashMap, HashSet};
use std::mem;

use tracing::{debug, warn};

use crate::dialect::{DatabaseType, split_qualified, unquote};
use crate::error::{TranslateError, TranslateResult};
use crate::model::*;

/// Variable the MySQL cursor loops test.
pub const FINISHED: &str = "FINISHED";

/// One predefined exception under the name each dialect gives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownException {
    pub oracle: &'static str,
    pub postgres: &'static str,
    pub mysql: &'static str,
    pub sqlserver: Option<u32>,
}

const EXCEPTIONS: &[KnownException] = &[
    KnownException { oracle: "OTHERS", postgres: "OTHERS", mysql: "SQLEXCEPTION", sqlserver: None },
    KnownException { oracle: "NO_DATA_FOUND", postgres: "NO_DATA_FOUND", mysql: "NOT FOUND", sqlserver: None },
    KnownException { oracle: "TOO_MANY_ROWS", postgres: "TOO_MANY_ROWS", mysql: "1172", sqlserver: None },
    KnownException { oracle: "DUP_VAL_ON_INDEX", postgres: "UNIQUE_VIOLATION", mysql: "1062", sqlserver: Some(2627) },
    KnownException { oracle: "ZERO_DIVIDE", postgres: "DIVISION_BY_ZERO", mysql: "1365", sqlserver: Some(8134) },
];

impl KnownException {
    pub fn name(&self, dialect: DatabaseType) -> String {
        match dialect {
            DatabaseType::Oracle => self.oracle.to_string(),
            DatabaseType::Postgres => self.postgres.to_string(),
            DatabaseType::MySql => self.mysql.to_string(),
            _ => self
                .sqlserver
                .map(|n| n.to_string())
                .unwrap_or_else(|| self.oracle.to_string()),
        }
    }

    fn is_others(&self) -> bool {
        self.oracle == "OTHERS"
    }
}

pub fn known_exception(name: &str) -> Option<&'static KnownException> {
    let name = name.trim();
    EXCEPTIONS.iter().find(|e| {
        [e.oracle, e.postgres, e.mysql]
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
            || e.sqlserver.is_some_and(|n| n.to_string() == name)
            || (e.is_others() && name.eq_ignore_ascii_case("SQLWARNING"))
    })
}

/// `WHEN`/handler condition text for `target`, one name or several joined by `OR`.
pub fn exception_condition(condition: &Token, target: DatabaseType) -> String {
    let separator = if target == DatabaseType::MySql { ", " } else { " OR " };
    condition_parts(&condition.render())
        .iter()
        .map(|part| match known_exception(part) {
            Some(known) => known.name(target),
            None if target == DatabaseType::Oracle && part.to_uppercase().starts_with("SQLSTATE") => {
                warn!(condition = %part, "SQLSTATE handler widened to OTHERS");
                "OTHERS".to_string()
            }
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn condition_parts(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        if word.eq_ignore_ascii_case("OR") {
            parts.push(current.join(" "));
            current.clear();
        } else {
            current.push(word);
        }
    }
    parts.push(current.join(" "));
    parts.retain(|p| !p.is_empty());
    parts
}

pub(crate) fn expression(text: impl Into<String>) -> Token {
    Token::new(text, TokenKind::Expression)
}

fn variable(name: &str) -> Token {
    Token::new(name, TokenKind::Variable)
}

/// Apply `f` to every statement list, innermost first.
fn for_each_list(statements: &mut Vec<Statement>, f: &mut dyn FnMut(&mut Vec<Statement>)) {
    for statement in statements.iter_mut() {
        for list in statement.children_mut() {
            for_each_list(list, f);
        }
    }
    f(statements);
}

fn prepend(statements: &mut Vec<Statement>, mut front: Vec<Statement>) {
    front.append(statements);
    *statements = front;
}

fn visit(statements: &[Statement], f: &mut dyn FnMut(&Statement)) {
    for statement in statements {
        f(statement);
        for list in statement.children() {
            visit(list, f);
        }
    }
}

/// Rewrite a body for `target`, in place.
pub fn prepare(statements: &mut Vec<Statement>, target: DatabaseType) {
    if target != DatabaseType::MySql {
        inline_prepared(statements);
    }
    match target {
        DatabaseType::SqlServer => {
            lower_handlers(statements, target);
            exceptions_to_try_catch(statements);
        }
        DatabaseType::MySql => {
            try_catch_to_handlers(statements);
            exceptions_to_handlers(statements);
        }
        DatabaseType::Postgres | DatabaseType::Oracle => {
            lower_handlers(statements, target);
            try_catch_to_exceptions(statements);
        }
        DatabaseType::Sqlite => {}
    }
    rewrite_fetch_status(statements, target);
    declare_loop_variables(statements, target);
    if matches!(target, DatabaseType::MySql | DatabaseType::Postgres | DatabaseType::Oracle) {
        hoist_declarations(statements);
    }
}

// ---- dynamic SQL ----

/// Replace `EXECUTE stmt` of a prepared statement by its SQL text.
fn inline_prepared(statements: &mut Vec<Statement>) {
    let mut sources: HashMap<String, Token> = HashMap::new();
    visit(statements, &mut |statement| {
        if let Statement::Prepare(PrepareStatement { name, source: Some(source) }) = statement {
            sources.insert(name.render().to_lowercase(), source.clone());
        }
    });
    if sources.is_empty() && !contains(statements, &|s| matches!(s, Statement::Prepare(_))) {
        return;
    }
    for_each_list(statements, &mut |list| {
        list.retain(|s| !matches!(s, Statement::Prepare(_)));
        for statement in list.iter_mut() {
            if let Statement::ExecuteDynamic(execute) = statement {
                if !execute.prepared {
                    continue;
                }
                match sources.get(&execute.content.render().to_lowercase()) {
                    Some(source) => {
                        execute.content = source.clone();
                        execute.prepared = false;
                    }
                    None => warn!(name = %execute.content, "prepared statement not found"),
                }
            }
        }
    });
}

pub(crate) fn contains(statements: &[Statement], pred: &dyn Fn(&Statement) -> bool) -> bool {
    let mut found = false;
    visit(statements, &mut |s| found |= pred(s));
    found
}

// ---- error handling ----

fn not_found_condition(target: DatabaseType, cursor: &str) -> String {
    match target {
        DatabaseType::SqlServer => "@@FETCH_STATUS <> 0".to_string(),
        DatabaseType::MySql => format!("{} = 1", FINISHED),
        DatabaseType::Oracle => format!("{}%NOTFOUND", cursor),
        _ => "NOT FOUND".to_string(),
    }
}

fn found_condition(target: DatabaseType, cursor: &str) -> String {
    match target {
        DatabaseType::SqlServer => "@@FETCH_STATUS = 0".to_string(),
        DatabaseType::MySql => format!("{} = 0", FINISHED),
        DatabaseType::Oracle => format!("{}%FOUND", cursor),
        _ => "FOUND".to_string(),
    }
}

/// Insert `IF <not found> THEN handler` after every fetch.
fn inline_not_found(statements: &mut Vec<Statement>, handler: &[Statement], target: DatabaseType) {
    let mut i = 0;
    while i < statements.len() {
        for list in statements[i].children_mut() {
            inline_not_found(list, handler, target);
        }
        if let Statement::FetchCursor(fetch) = &statements[i] {
            let condition = not_found_condition(target, fetch.name.name());
            let check = Statement::If(IfStatement {
                items: vec![IfItem {
                    kind: IfItemKind::If,
                    condition: Some(expression(condition)),
                    statements: handler.to_vec(),
                }],
            });
            statements.insert(i + 1, check);
            i += 1;
        }
        i += 1;
    }
}

/// MySQL `DECLARE … HANDLER` for dialects without handlers.
///
/// A `NOT FOUND` handler runs after each fetch; the others become an exception
/// section of the block that declared them.
fn lower_handlers(statements: &mut Vec<Statement>, target: DatabaseType) {
    for_each_list(statements, &mut |list| {
        let (handlers, rest): (Vec<Statement>, Vec<Statement>) =
            mem::take(list).into_iter().partition(|s| matches!(s, Statement::DeclareHandler(_)));
        *list = rest;
        let mut section = Vec::new();
        for handler in handlers {
            let Statement::DeclareHandler(handler) = handler else {
                continue;
            };
            if handler.is_not_found() {
                inline_not_found(list, &handler.statements, target);
                continue;
            }
            if handler.action.symbol.eq_ignore_ascii_case("CONTINUE") {
                warn!(conditions = ?handler.conditions.iter().map(Token::render).collect::<Vec<_>>(), "continue handler translated as exit handler");
            }
            let condition = handler
                .conditions
                .iter()
                .map(|c| mysql_condition_name(c, target))
                .collect::<Vec<_>>()
                .join(" OR ");
            section.push(ExceptionHandler {
                condition: expression(condition),
                statements: handler.statements,
            });
        }
        if section.is_empty() {
            return;
        }
        match list.last_mut() {
            Some(Statement::Exception(existing)) => existing.handlers.extend(section),
            _ => list.push(Statement::Exception(ExceptionStatement { handlers: section })),
        }
    });
}

fn mysql_condition_name(condition: &Token, target: DatabaseType) -> String {
    let text = condition.render();
    match known_exception(&text) {
        Some(known) => known.name(target),
        None if text.to_uppercase().starts_with("SQLSTATE") && target == DatabaseType::Postgres => text,
        None if text.chars().all(|c| c.is_ascii_digit()) && target == DatabaseType::SqlServer => text,
        None if text.chars().all(|c| c.is_ascii_digit() || c == '\'') || text.to_uppercase().starts_with("SQLSTATE") => {
            warn!(condition = %text, target = %target, "handler condition widened to OTHERS");
            "OTHERS".to_string()
        }
        None => text,
    }
}

/// `IF` chain of a `CATCH` block dispatching on the handled condition.
fn catch_statements(handlers: Vec<ExceptionHandler>) -> Vec<Statement> {
    let (others, named): (Vec<ExceptionHandler>, Vec<ExceptionHandler>) =
        handlers.into_iter().partition(ExceptionHandler::is_others);
    let fallback = others.into_iter().flat_map(|h| h.statements).collect::<Vec<_>>();
    if named.is_empty() {
        return fallback;
    }
    let mut items: Vec<IfItem> = named
        .into_iter()
        .enumerate()
        .map(|(i, handler)| IfItem {
            kind: if i == 0 { IfItemKind::If } else { IfItemKind::ElseIf },
            condition: Some(expression(sqlserver_condition(&handler.condition))),
            statements: handler.statements,
        })
        .collect();
    if !fallback.is_empty() {
        items.push(IfItem {
            kind: IfItemKind::Else,
            condition: None,
            statements: fallback,
        });
    }
    vec![Statement::If(IfStatement { items })]
}

fn sqlserver_condition(condition: &Token) -> String {
    condition_parts(&condition.render())
        .iter()
        .map(|part| {
            let number = match known_exception(part) {
                Some(known) => known.sqlserver.map(|n| n.to_string()),
                None => part
                    .trim_start_matches('-')
                    .chars()
                    .all(|c| c.is_ascii_digit())
                    .then(|| part.clone()),
            };
            match number {
                Some(n) => format!("@@ERROR = {}", n),
                None => format!("ERROR_PROCEDURE() = '{}'", part.replace('\'', "''")),
            }
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// A list ending in an exception section becomes `TRY … CATCH`.
fn exceptions_to_try_catch(statements: &mut Vec<Statement>) {
    for_each_list(statements, &mut |list| {
        if !matches!(list.last(), Some(Statement::Exception(_))) {
            return;
        }
        let Some(Statement::Exception(section)) = list.pop() else {
            return;
        };
        let try_statements = mem::take(list);
        list.push(Statement::TryCatch(TryCatchStatement {
            try_statements,
            catch_statements: catch_statements(section.handlers),
        }));
    });
}

/// `TRY … CATCH` becomes a block with a `WHEN OTHERS` section.
fn try_catch_to_exceptions(statements: &mut Vec<Statement>) {
    for_each_list(statements, &mut |list| {
        for statement in list.iter_mut() {
            if let Statement::TryCatch(tc) = statement {
                let mut body = mem::take(&mut tc.try_statements);
                body.push(Statement::Exception(ExceptionStatement {
                    handlers: vec![ExceptionHandler {
                        condition: Token::new("OTHERS", TokenKind::Keyword),
                        statements: mem::take(&mut tc.catch_statements),
                    }],
                }));
                *statement = Statement::Block(BlockStatement {
                    label: None,
                    statements: body,
                });
            }
        }
    });
}

fn exit_handler(conditions: Vec<Token>, statements: Vec<Statement>) -> Statement {
    Statement::DeclareHandler(DeclareHandlerStatement {
        action: Token::new("EXIT", TokenKind::Keyword),
        conditions,
        statements,
    })
}

/// `TRY … CATCH` becomes a block with an exit handler.
fn try_catch_to_handlers(statements: &mut Vec<Statement>) {
    for_each_list(statements, &mut |list| {
        for statement in list.iter_mut() {
            if let Statement::TryCatch(tc) = statement {
                let handler = exit_handler(
                    vec![Token::new("SQLEXCEPTION", TokenKind::Keyword)],
                    mem::take(&mut tc.catch_statements),
                );
                let mut body = vec![handler];
                body.append(&mut tc.try_statements);
                *statement = Statement::Block(BlockStatement {
                    label: None,
                    statements: body,
                });
            }
        }
    });
}

/// An exception section becomes exit handlers at the start of its block.
fn exceptions_to_handlers(statements: &mut Vec<Statement>) {
    for_each_list(statements, &mut |list| {
        if !matches!(list.last(), Some(Statement::Exception(_))) {
            return;
        }
        let Some(Statement::Exception(section)) = list.pop() else {
            return;
        };
        let handlers: Vec<Statement> = section
            .handlers
            .into_iter()
            .map(|h| {
                let condition = exception_condition(&h.condition, DatabaseType::MySql);
                exit_handler(vec![expression(condition)], h.statements)
            })
            .collect();
        prepend(list, handlers);
    });
}

// ---- cursor loops ----

/// Whether a condition tests the last fetch, and for success or failure.
pub fn fetch_status(condition: &Token) -> Option<bool> {
    let text: String = condition
        .render()
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let text = text.trim_start_matches('(').trim_end_matches(')');
    match text {
        "@@FETCH_STATUS=0" => Some(true),
        "@@FETCH_STATUS<>0" | "@@FETCH_STATUS!=0" | "@@FETCH_STATUS=-1" => Some(false),
        "FOUND" => Some(true),
        "NOTFOUND" => Some(false),
        _ if text.ends_with("%NOTFOUND") => Some(false),
        _ if text.ends_with("%FOUND") => Some(true),
        _ => None,
    }
}

fn rewrite_condition(condition: &mut Token, target: DatabaseType, cursor: &Option<String>, finished: &mut bool) {
    let Some(found) = fetch_status(condition) else {
        return;
    };
    let cursor = cursor.clone().unwrap_or_else(|| "SQL".to_string());
    let text = if found {
        found_condition(target, &cursor)
    } else {
        not_found_condition(target, &cursor)
    };
    *finished |= target == DatabaseType::MySql;
    *condition = expression(text);
}

fn rewrite_conditions(
    statements: &mut [Statement],
    target: DatabaseType,
    cursor: &mut Option<String>,
    finished: &mut bool,
) {
    for statement in statements.iter_mut() {
        match statement {
            Statement::FetchCursor(fetch) => *cursor = Some(fetch.name.name().to_string()),
            Statement::While(w) => {
                if cursor.is_none() {
                    *cursor = last_fetched(&w.statements);
                }
                rewrite_condition(&mut w.condition, target, cursor, finished);
            }
            Statement::LoopExit(exit) => {
                if let Some(condition) = exit.condition.as_mut() {
                    rewrite_condition(condition, target, cursor, finished);
                }
            }
            Statement::Loop(l) => {
                if let Some(condition) = l.condition.as_mut() {
                    rewrite_condition(condition, target, cursor, finished);
                }
            }
            Statement::If(i) => {
                for item in i.items.iter_mut() {
                    if let Some(condition) = item.condition.as_mut() {
                        rewrite_condition(condition, target, cursor, finished);
                    }
                }
            }
            _ => {}
        }
        for list in statement.children_mut() {
            rewrite_conditions(list, target, cursor, finished);
        }
    }
}

fn last_fetched(statements: &[Statement]) -> Option<String> {
    let mut name = None;
    visit(statements, &mut |s| {
        if let Statement::FetchCursor(fetch) = s {
            name = Some(fetch.name.name().to_string());
        }
    });
    name
}

/// SQL Server style cursor loops for MySQL.
///
/// The trailing fetch moves to the loop front and drops the pre-loop fetch of
/// the same cursor; the rest of the body runs while `FINISHED = 0`.
fn mysql_cursor_loops(statements: &mut Vec<Statement>) -> bool {
    let mut used = false;
    let mut i = 0;
    while i < statements.len() {
        for list in statements[i].children_mut() {
            used |= mysql_cursor_loops(list);
        }
        let cursor = match &mut statements[i] {
            Statement::While(w)
                if fetch_status(&w.condition) == Some(true)
                    && matches!(w.statements.last(), Some(Statement::FetchCursor(_))) =>
            {
                let Some(Statement::FetchCursor(fetch)) = w.statements.pop() else {
                    i += 1;
                    continue;
                };
                let rest = mem::take(&mut w.statements);
                let cursor = fetch.name.name().to_string();
                w.condition = expression(format!("{} = 0", FINISHED));
                w.statements = vec![
                    Statement::FetchCursor(fetch),
                    Statement::If(IfStatement {
                        items: vec![IfItem {
                            kind: IfItemKind::If,
                            condition: Some(expression(format!("{} = 0", FINISHED))),
                            statements: rest,
                        }],
                    }),
                ];
                cursor
            }
            _ => {
                i += 1;
                continue;
            }
        };
        let before = statements[..i].iter().rposition(
            |s| matches!(s, Statement::FetchCursor(f) if f.name.name().eq_ignore_ascii_case(&cursor)),
        );
        if let Some(at) = before {
            statements.remove(at);
            i -= 1;
        }
        statements.insert(
            i,
            Statement::Set(SetStatement {
                name: variable(FINISHED),
                value: Token::new("0", TokenKind::NumberLiteral),
            }),
        );
        used = true;
        i += 2;
    }
    used
}

/// Fetch status tests in the target's terms; MySQL gets a `FINISHED` flag.
fn rewrite_fetch_status(statements: &mut Vec<Statement>, target: DatabaseType) {
    let mut finished = target == DatabaseType::MySql && mysql_cursor_loops(statements);
    let mut cursor = None;
    rewrite_conditions(statements, target, &mut cursor, &mut finished);
    if !finished {
        return;
    }
    let declared = contains(statements, &|s| {
        matches!(s, Statement::Declare(d) if d.name.render().eq_ignore_ascii_case(FINISHED))
    });
    if declared {
        return;
    }
    debug!("cursor loop flag declared");
    let flag = Statement::Declare(DeclareVariableStatement {
        name: variable(FINISHED),
        data_type: Token::new("INT", TokenKind::DataType),
        default: Some(Token::new("0", TokenKind::NumberLiteral)),
    });
    let handler = Statement::DeclareHandler(DeclareHandlerStatement {
        action: Token::new("CONTINUE", TokenKind::Keyword),
        conditions: vec![expression("NOT FOUND")],
        statements: vec![Statement::Set(SetStatement {
            name: variable(FINISHED),
            value: Token::new("1", TokenKind::NumberLiteral),
        })],
    });
    prepend(statements, vec![flag, handler]);
}

// ---- declarations ----

/// Declare variables of loops the target does not declare implicitly.
fn declare_loop_variables(statements: &mut Vec<Statement>, target: DatabaseType) {
    if !matches!(target, DatabaseType::MySql | DatabaseType::Postgres) {
        return;
    }
    let mut declared = HashSet::new();
    let mut wanted: Vec<(String, &'static str)> = Vec::new();
    visit(statements, &mut |s| match s {
        Statement::Declare(d) => {
            declared.insert(d.name.render().to_lowercase());
        }
        Statement::Loop(LoopStatement { kind: LoopKind::For, header: Some(header), .. }) => {
            let name = header.variable.render();
            match (target, &header.source) {
                (DatabaseType::MySql, None) => wanted.push((name, "INT")),
                (DatabaseType::Postgres, Some(_)) => wanted.push((name, "RECORD")),
                _ => {}
            }
        }
        _ => {}
    });
    let mut declarations = Vec::new();
    for (name, data_type) in wanted {
        if declared.insert(name.to_lowercase()) {
            declarations.push(Statement::Declare(DeclareVariableStatement {
                name: variable(&name),
                data_type: Token::new(data_type, TokenKind::DataType),
                default: None,
            }));
        }
    }
    prepend(statements, declarations);
}

fn declaration_rank(statement: &Statement) -> u8 {
    match statement {
        Statement::Declare(d) if d.is_exception() => 1,
        Statement::Declare(_) => 0,
        Statement::DeclareCursor(_) => 2,
        Statement::DeclareHandler(_) => 3,
        _ => 4,
    }
}

/// A declaration moved away from its position keeps its initial value there.
fn split_declaration(
    mut declaration: DeclareVariableStatement,
    declarations: &mut Vec<Statement>,
    body: &mut Vec<Statement>,
) {
    if let Some(value) = declaration.default.take() {
        body.push(Statement::Set(SetStatement {
            name: declaration.name.clone(),
            value,
        }));
    }
    declarations.push(Statement::Declare(declaration));
}

fn extract_nested(statement: &mut Statement, declarations: &mut Vec<Statement>) {
    if matches!(statement, Statement::Block(_) | Statement::DeclareHandler(_)) {
        return;
    }
    for list in statement.children_mut() {
        let mut kept = Vec::new();
        for s in mem::take(list) {
            match s {
                Statement::Declare(d) => split_declaration(d, declarations, &mut kept),
                s if s.is_declaration() => declarations.push(s),
                mut s => {
                    extract_nested(&mut s, declarations);
                    kept.push(s);
                }
            }
        }
        *list = kept;
    }
}

fn hoist_blocks(statements: &mut [Statement]) {
    for statement in statements.iter_mut() {
        match statement {
            Statement::Block(block) => hoist_declarations(&mut block.statements),
            other => {
                for list in other.children_mut() {
                    hoist_blocks(list);
                }
            }
        }
    }
}

/// Move declarations to the front of their block, ordered variables,
/// conditions, cursors, handlers.
pub fn hoist_declarations(statements: &mut Vec<Statement>) {
    hoist_blocks(statements);
    let leading = statements.iter().take_while(|s| s.is_declaration()).count();
    let mut declarations = Vec::new();
    let mut body = Vec::new();
    for (i, statement) in mem::take(statements).into_iter().enumerate() {
        if i < leading {
            declarations.push(statement);
            continue;
        }
        match statement {
            Statement::Declare(d) => split_declaration(d, &mut declarations, &mut body),
            s if s.is_declaration() => declarations.push(s),
            mut s => {
                extract_nested(&mut s, &mut declarations);
                body.push(s);
            }
        }
    }
    declarations.sort_by_key(declaration_rank);
    declarations.append(&mut body);
    *statements = declarations;
}

// ---- updates ----

/// Target and remaining tables of an `UPDATE`/`DELETE` `FROM` list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FromSplit {
    /// `table alias` when the statement named the target by its alias.
    pub target: Option<String>,
    pub from: Option<String>,
    /// Join conditions moved to `WHERE`.
    pub conditions: Vec<String>,
}

fn same_name(a: &str, b: &str) -> bool {
    let last = |s: &str| {
        split_qualified(s)
            .last()
            .map(|p| unquote(p).to_string())
            .unwrap_or_default()
    };
    let (a, b) = (last(a), last(b));
    !a.is_empty() && a.eq_ignore_ascii_case(&b)
}

fn split_items(tokens: &[Token]) -> Vec<&[Token]> {
    tokens.split(|t| t.is_punct(",")).filter(|p| !p.is_empty()).collect()
}

/// Drop the statement's own table from a `FROM` list.
///
/// Tables match on their unquoted last name part, ignoring case. When the
/// target heads a chain of inner joins, the joined tables stay and their `ON`
/// conditions move to `WHERE`.
pub fn exclude_target(from: &Token, table: &NameToken) -> TranslateResult<FromSplit> {
    let tokens: Vec<Token> = if from.is_leaf() {
        vec![from.clone()]
    } else {
        from.children().to_vec()
    };
    let target_alias = table.alias().map(|a| a.symbol.clone());
    let mut split = FromSplit::default();
    let mut kept: Vec<String> = Vec::new();
    for item in split_items(&tokens) {
        let name = item.iter().find(|t| t.kind == TokenKind::TableName);
        let alias = item
            .iter()
            .take_while(|t| !t.is_keyword("JOIN") && !t.is_keyword("INNER"))
            .find(|t| t.kind == TokenKind::TableAlias);
        let by_alias = alias.is_some_and(|a| same_name(&a.symbol, table.name()));
        let by_name = name.is_some_and(|n| same_name(&n.symbol, table.name()))
            && match (alias, &target_alias) {
                (Some(a), Some(t)) => a.symbol.eq_ignore_ascii_case(t),
                _ => true,
            };
        if !by_alias && !by_name {
            kept.push(render_sequence(item));
            continue;
        }
        let join_at = item
            .iter()
            .position(|t| t.is_keyword("JOIN") || t.is_keyword("INNER"))
            .unwrap_or(item.len());
        if by_alias {
            split.target = Some(render_sequence(&item[..join_at]));
        }
        if join_at == item.len() {
            continue;
        }
        let (tables, conditions) = inner_joins(&item[join_at..])?;
        kept.extend(tables);
        split.conditions.extend(conditions);
    }
    split.from = (!kept.is_empty()).then(|| kept.join(", "));
    Ok(split)
}

/// `JOIN t ON c JOIN u ON d` as tables `t`, `u` and conditions `c`, `d`.
fn inner_joins(tokens: &[Token]) -> TranslateResult<(Vec<String>, Vec<String>)> {
    let mut tables = Vec::new();
    let mut conditions = Vec::new();
    let mut table: Vec<Token> = Vec::new();
    let mut condition: Vec<Token> = Vec::new();
    let mut in_condition = false;
    for token in tokens {
        if token.is_keyword("INNER") {
            continue;
        }
        if token.is_keyword("LEFT") || token.is_keyword("RIGHT") || token.is_keyword("FULL") || token.is_keyword("CROSS") {
            return Err(TranslateError::unsupported(
                "outer join on the target of an UPDATE or DELETE",
                DatabaseType::Postgres,
            ));
        }
        if token.is_keyword("JOIN") {
            if !table.is_empty() {
                tables.push(render_sequence(&table));
            }
            if !condition.is_empty() {
                conditions.push(render_sequence(&condition));
            }
            table.clear();
            condition.clear();
            in_condition = false;
            continue;
        }
        if token.is_keyword("ON") && !in_condition {
            in_condition = true;
            continue;
        }
        if in_condition {
            condition.push(token.clone());
        } else {
            table.push(token.clone());
        }
    }
    if !table.is_empty() {
        tables.push(render_sequence(&table));
    }
    if !condition.is_empty() {
        conditions.push(render_sequence(&condition));
    }
    Ok((tables, conditions))
}

/// A composite `SET (a, b) = (SELECT x, y FROM … WHERE …)` spread over columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeUpdate {
    /// Column and value text, plain items included.
    pub assignments: Vec<(Token, String)>,
    pub from: Option<Token>,
    /// Subquery `WHERE` followed by the update's own.
    pub conditions: Vec<String>,
}

/// `None` when the subquery cannot be joined (grouping, limits, unions or
/// several composite items).
pub fn expand_composite(update: &UpdateStatement) -> Option<CompositeUpdate> {
    let mut composite = update.items.iter().filter(|i| i.is_composite());
    let item = composite.next()?;
    if composite.next().is_some() {
        return None;
    }
    let subquery = item.subquery.as_deref()?;
    let joinable = subquery.group_by.is_none()
        && subquery.having.is_none()
        && subquery.limit.is_none()
        && subquery.union.is_none()
        && subquery.with.is_none()
        && !subquery.distinct
        && subquery.columns.len() == item.names.len();
    if !joinable {
        return None;
    }
    let mut assignments = Vec::new();
    for set in &update.items {
        match (&set.value, &set.subquery) {
            (Some(value), _) => assignments.push((set.names.first()?.clone(), value.render())),
            (None, Some(_)) => assignments.extend(
                item.names
                    .iter()
                    .cloned()
                    .zip(subquery.columns.iter().map(crate::build::column_value)),
            ),
            (None, None) => {}
        }
    }
    let mut conditions = Vec::new();
    if let Some(w) = &subquery.where_clause {
        conditions.push(w.render());
    }
    if let Some(w) = &update.where_clause {
        conditions.push(w.render());
    }
    Some(CompositeUpdate {
        assignments,
        from: subquery.from.clone(),
        conditions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::analyser;

    fn body(text: &str, dialect: DatabaseType, kind: ObjectKind) -> Vec<Statement> {
        analyser::analyse_script(dialect, kind, text)
            .unwrap()
            .statements()
            .to_vec()
    }

    fn table_list(tokens: Vec<Token>) -> Token {
        let mut from = Token::new("", TokenKind::Expression);
        for t in tokens {
            from.add_child(t);
        }
        from
    }

    #[test]
    fn test_fetch_status_conditions() {
        assert_eq!(fetch_status(&expression("@@FETCH_STATUS = 0")), Some(true));
        assert_eq!(fetch_status(&expression("@@fetch_status <> 0")), Some(false));
        assert_eq!(fetch_status(&expression("c_orders%NOTFOUND")), Some(false));
        assert_eq!(fetch_status(&expression("NOT FOUND")), Some(false));
        assert_eq!(fetch_status(&expression("done = 1")), None);
    }

    #[test]
    fn test_exception_condition_names() {
        let condition = expression("DUP_VAL_ON_INDEX OR ZERO_DIVIDE");
        assert_eq!(exception_condition(&condition, DatabaseType::Postgres), "UNIQUE_VIOLATION OR DIVISION_BY_ZERO");
        assert_eq!(exception_condition(&condition, DatabaseType::MySql), "1062, 1365");
        assert_eq!(exception_condition(&expression("OTHERS"), DatabaseType::MySql), "SQLEXCEPTION");
        assert_eq!(exception_condition(&expression("my_error"), DatabaseType::Oracle), "my_error");
    }

    #[test]
    fn test_mysql_cursor_loop_fix_up() {
        let mut statements = body(
            "CREATE PROCEDURE p AS
             BEGIN
                DECLARE @id INT
                DECLARE c CURSOR FOR SELECT id FROM t
                OPEN c
                FETCH NEXT FROM c INTO @id
                WHILE @@FETCH_STATUS = 0
                BEGIN
                    PRINT @id
                    FETCH NEXT FROM c INTO @id
                END
                CLOSE c
             END",
            DatabaseType::SqlServer,
            ObjectKind::Procedure,
        );
        prepare(&mut statements, DatabaseType::MySql);

        let ranks: Vec<u8> = statements.iter().take(4).map(declaration_rank).collect();
        assert_eq!(ranks, vec![0, 0, 2, 3]);
        assert!(matches!(&statements[4], Statement::OpenCursor(_)));
        assert!(matches!(&statements[5], Statement::Set(s) if s.name.symbol == FINISHED));
        let Statement::While(w) = &statements[6] else {
            panic!("expected the cursor loop, got {:?}", statements[6]);
        };
        assert_eq!(w.condition.render(), "FINISHED = 0");
        assert!(matches!(&w.statements[0], Statement::FetchCursor(_)));
        assert!(matches!(&w.statements[1], Statement::If(_)));
        assert!(matches!(&statements[7], Statement::CloseCursor(_)));
    }

    #[test]
    fn test_try_catch_for_postgres() {
        let mut statements = body(
            "CREATE PROCEDURE p AS
             BEGIN TRY
                DELETE FROM t
             END TRY
             BEGIN CATCH
                PRINT 'failed'
             END CATCH",
            DatabaseType::SqlServer,
            ObjectKind::Procedure,
        );
        prepare(&mut statements, DatabaseType::Postgres);
        let Statement::Block(block) = &statements[0] else {
            panic!("expected a block");
        };
        let Some(Statement::Exception(section)) = block.statements.last() else {
            panic!("expected an exception section");
        };
        assert!(section.handlers[0].is_others());
    }

    #[test]
    fn test_exception_section_for_sql_server() {
        let mut statements = vec![
            Statement::Truncate(TruncateStatement { table: NameToken::table("t") }),
            Statement::Exception(ExceptionStatement {
                handlers: vec![
                    ExceptionHandler {
                        condition: expression("DUP_VAL_ON_INDEX"),
                        statements: vec![Statement::Return(ReturnStatement { value: None })],
                    },
                    ExceptionHandler {
                        condition: expression("OTHERS"),
                        statements: vec![Statement::Raise(RaiseStatement { code: None, message: None, exception: None })],
                    },
                ],
            }),
        ];
        prepare(&mut statements, DatabaseType::SqlServer);
        let Statement::TryCatch(tc) = &statements[0] else {
            panic!("expected TRY/CATCH");
        };
        let Statement::If(chain) = &tc.catch_statements[0] else {
            panic!("expected an IF chain");
        };
        assert_eq!(chain.items[0].condition.as_ref().unwrap().render(), "@@ERROR = 2627");
        assert_eq!(chain.items[1].kind, IfItemKind::Else);
    }

    #[test]
    fn test_hoisting_keeps_initial_values_in_place() {
        let mut statements = vec![
            Statement::Set(SetStatement { name: variable("a"), value: expression("1") }),
            Statement::Declare(DeclareVariableStatement {
                name: variable("b"),
                data_type: Token::new("INT", TokenKind::DataType),
                default: Some(expression("a + 1")),
            }),
        ];
        hoist_declarations(&mut statements);
        assert!(matches!(&statements[0], Statement::Declare(d) if d.default.is_none()));
        assert!(matches!(&statements[1], Statement::Set(s) if s.name.symbol == "a"));
        assert!(matches!(&statements[2], Statement::Set(s) if s.value.render() == "a + 1"));
    }

    #[test]
    fn test_not_found_handler_inlined_after_fetch() {
        let mut statements = body(
            "CREATE PROCEDURE p()
             BEGIN
                DECLARE v INT;
                DECLARE done INT DEFAULT 0;
                DECLARE c CURSOR FOR SELECT id FROM t;
                DECLARE CONTINUE HANDLER FOR NOT FOUND SET done = 1;
                OPEN c;
                FETCH c INTO v;
                CLOSE c;
             END",
            DatabaseType::MySql,
            ObjectKind::Procedure,
        );
        prepare(&mut statements, DatabaseType::Oracle);
        assert!(!contains(&statements, &|s| matches!(s, Statement::DeclareHandler(_))));
        let fetch_at = statements
            .iter()
            .position(|s| matches!(s, Statement::FetchCursor(_)))
            .unwrap();
        let Statement::If(check) = &statements[fetch_at + 1] else {
            panic!("expected the not found check");
        };
        assert_eq!(check.items[0].condition.as_ref().unwrap().render(), "c%NOTFOUND");
    }

    #[test]
    fn test_exclude_target_with_inner_join() {
        let from = table_list(vec![
            Token::new("Orders", TokenKind::TableName),
            Token::new("o", TokenKind::TableAlias),
            Token::new("JOIN", TokenKind::Keyword),
            Token::new("Customers", TokenKind::TableName),
            Token::new("c", TokenKind::TableAlias),
            Token::new("ON", TokenKind::Keyword),
            Token::new("c.Id", TokenKind::ColumnName),
            Token::new("=", TokenKind::Operator),
            Token::new("o.CustomerId", TokenKind::ColumnName),
        ]);
        let split = exclude_target(&from, &NameToken::table("o")).unwrap();
        assert_eq!(split.target.as_deref(), Some("Orders o"));
        assert_eq!(split.from.as_deref(), Some("Customers c"));
        assert_eq!(split.conditions, vec!["c.Id = o.CustomerId".to_string()]);

        let from = table_list(vec![
            Token::new("\"ORDERS\"", TokenKind::TableName),
            Token::new(",", TokenKind::Punctuation),
            Token::new("items", TokenKind::TableName),
        ]);
        let split = exclude_target(&from, &NameToken::table("orders")).unwrap();
        assert_eq!(split.target, None);
        assert_eq!(split.from.as_deref(), Some("items"));
    }
}
