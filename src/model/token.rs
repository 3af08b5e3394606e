//! Tokens: the leaves and expression trees of the AST.

use std::fmt;

use serde::Serialize;

use crate::dialect::{split_qualified, unquote};

/// Semantic role of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    General,
    Keyword,
    Operator,
    Punctuation,
    TableName,
    TableAlias,
    ColumnName,
    ColumnAlias,
    DataType,
    ConstraintName,
    FunctionName,
    FunctionCall,
    StringLiteral,
    NumberLiteral,
    Variable,
    Subquery,
    Expression,
    RoutineName,
    TriggerName,
    ViewName,
    CursorName,
    Label,
}

/// A unit of syntax. Leaves render their symbol, composite tokens render their children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub symbol: String,
    pub kind: TokenKind,
    pub start: Option<usize>,
    pub stop: Option<usize>,
    children: Vec<Token>,
}

impl Token {
    /// A token built from a bare symbol; offsets stay unset.
    pub fn new(symbol: impl Into<String>, kind: TokenKind) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
            start: None,
            stop: None,
            children: Vec::new(),
        }
    }

    /// A token covering `start..=stop` of the source text.
    pub fn with_span(symbol: impl Into<String>, kind: TokenKind, start: usize, stop: usize) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
            start: Some(start),
            stop: Some(stop),
            children: Vec::new(),
        }
    }

    pub fn children(&self) -> &[Token] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Token] {
        &mut self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Register a child. A token equal to this one, or spanning exactly the same
    /// source range, is ignored and `false` is returned.
    pub fn add_child(&mut self, child: Token) -> bool {
        if child == *self || self.same_span(&child) {
            return false;
        }
        self.children.push(child);
        true
    }

    /// Both spans are known and identical.
    pub fn same_span(&self, other: &Token) -> bool {
        self.start.is_some()
            && self.stop.is_some()
            && self.start == other.start
            && self.stop == other.stop
    }

    /// Turn this token into a leaf with new text.
    pub fn replace(&mut self, symbol: impl Into<String>) {
        self.symbol = symbol.into();
        self.children.clear();
    }

    /// Visit every token of this tree, children first.
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Token)) {
        for child in &mut self.children {
            child.visit_mut(f);
        }
        f(self);
    }

    /// Visit every token of this tree in document order, parents first.
    pub fn for_each(&self, f: &mut dyn FnMut(&Token)) {
        f(self);
        for child in &self.children {
            child.for_each(f);
        }
    }

    /// Flat list of this tree in document order.
    pub fn collect(&self) -> Vec<&Token> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.collect());
        }
        out
    }

    /// Whether any token of this tree satisfies `pred`.
    pub fn any(&self, pred: &dyn Fn(&Token) -> bool) -> bool {
        pred(self) || self.children.iter().any(|c| c.any(pred))
    }

    /// Render as SQL text.
    pub fn render(&self) -> String {
        if self.children.is_empty() {
            self.symbol.clone()
        } else {
            render_sequence(&self.children)
        }
    }

    /// Last part of a dotted symbol without quotes (`[dbo].[Orders]` → `Orders`).
    pub fn bare_name(&self) -> &str {
        let parts = split_qualified(&self.symbol);
        unquote(parts.last().copied().unwrap_or(""))
    }

    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.symbol == text
    }

    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.symbol.eq_ignore_ascii_case(word)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Join tokens with SQL spacing: no blank after `(` or `.`, none before `(` of a call,
/// none before `,` `)` `.` `;`.
pub fn render_sequence(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for token in tokens {
        let text = token.render();
        if text.is_empty() {
            continue;
        }
        if prev.is_some_and(|p| needs_space(p, token)) {
            out.push(' ');
        }
        out.push_str(&text);
        prev = Some(token);
    }
    out
}

fn needs_space(prev: &Token, next: &Token) -> bool {
    let p = prev.symbol.as_str();
    let n = next.symbol.as_str();
    if prev.kind == TokenKind::Punctuation && (p == "(" || p == ".") {
        return false;
    }
    if prev.kind == TokenKind::Operator && p == "::" {
        return false;
    }
    if next.kind == TokenKind::Punctuation && matches!(n, "," | ")" | "." | ";") {
        return false;
    }
    if next.kind == TokenKind::Operator && n == "::" {
        return false;
    }
    if next.kind == TokenKind::Punctuation
        && n == "("
        && matches!(prev.kind, TokenKind::FunctionName | TokenKind::DataType)
    {
        return false;
    }
    true
}

/// The semantic role of a [`NameToken`], fixed when the name is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NameRole {
    Table,
    View,
    Column,
    Routine,
    Trigger,
    Cursor,
    Constraint,
    Other,
}

impl NameRole {
    fn token_kind(self) -> TokenKind {
        match self {
            NameRole::Table => TokenKind::TableName,
            NameRole::View => TokenKind::ViewName,
            NameRole::Column => TokenKind::ColumnName,
            NameRole::Routine => TokenKind::RoutineName,
            NameRole::Trigger => TokenKind::TriggerName,
            NameRole::Cursor => TokenKind::CursorName,
            NameRole::Constraint => TokenKind::ConstraintName,
            NameRole::Other => TokenKind::General,
        }
    }

    fn alias_kind(self) -> TokenKind {
        match self {
            NameRole::Table | NameRole::View => TokenKind::TableAlias,
            NameRole::Column => TokenKind::ColumnAlias,
            _ => TokenKind::General,
        }
    }
}

/// An object name with optional qualifiers and alias.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameToken {
    pub token: Token,
    pub server: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    role: NameRole,
    alias: Option<Token>,
}

impl NameToken {
    /// Build from a possibly qualified name (`server.database.schema.name`).
    pub fn new(qualified: &str, role: NameRole) -> Self {
        let mut parts: Vec<String> = split_qualified(qualified)
            .into_iter()
            .map(|p| p.trim().to_string())
            .collect();
        let name = parts.pop().unwrap_or_default();
        let schema = parts.pop().filter(|s| !s.is_empty());
        let database = parts.pop().filter(|s| !s.is_empty());
        let server = parts.pop().filter(|s| !s.is_empty());
        Self {
            token: Token::new(name, role.token_kind()),
            server,
            database,
            schema,
            role,
            alias: None,
        }
    }

    pub fn table(qualified: &str) -> Self {
        Self::new(qualified, NameRole::Table)
    }

    pub fn view(qualified: &str) -> Self {
        Self::new(qualified, NameRole::View)
    }

    pub fn column(qualified: &str) -> Self {
        Self::new(qualified, NameRole::Column)
    }

    pub fn routine(qualified: &str) -> Self {
        Self::new(qualified, NameRole::Routine)
    }

    pub fn trigger(qualified: &str) -> Self {
        Self::new(qualified, NameRole::Trigger)
    }

    pub fn cursor(name: &str) -> Self {
        Self::new(name, NameRole::Cursor)
    }

    /// Record the source span of the whole qualified name.
    pub fn with_span(mut self, start: usize, stop: usize) -> Self {
        self.token.start = Some(start);
        self.token.stop = Some(stop);
        self
    }

    pub fn role(&self) -> NameRole {
        self.role
    }

    /// The unqualified name as written.
    pub fn name(&self) -> &str {
        &self.token.symbol
    }

    /// The unqualified name without quotes.
    pub fn bare_name(&self) -> &str {
        unquote(&self.token.symbol)
    }

    /// Attach an alias; its kind follows this name's role.
    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = Some(Token::new(alias, self.role.alias_kind()));
    }

    pub fn alias(&self) -> Option<&Token> {
        self.alias.as_ref()
    }

    pub fn alias_mut(&mut self) -> Option<&mut Token> {
        self.alias.as_mut()
    }

    /// `server.database.schema.name` with the parts that are present.
    pub fn qualified_name(&self) -> String {
        [&self.server, &self.database, &self.schema]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .chain(std::iter::once(self.token.symbol.as_str()))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Qualified name followed by the alias, if any.
    pub fn render(&self) -> String {
        match &self.alias {
            Some(alias) if self.role == NameRole::Column => {
                format!("{} AS {}", self.qualified_name(), alias.symbol)
            }
            Some(alias) => format!("{} {}", self.qualified_name(), alias.symbol),
            None => self.qualified_name(),
        }
    }
}

impl fmt::Display for NameToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_child_ignores_same_span() {
        let mut parent = Token::with_span("a + b", TokenKind::Expression, 0, 4);
        let duplicate = Token::with_span("a + b", TokenKind::Expression, 0, 4);
        assert!(!parent.add_child(duplicate));
        assert!(parent.children().is_empty());

        assert!(parent.add_child(Token::with_span("a", TokenKind::ColumnName, 0, 0)));
        assert_eq!(parent.children().len(), 1);
    }

    #[test]
    fn test_add_child_ignores_itself() {
        let mut token = Token::new("x", TokenKind::General);
        let copy = token.clone();
        assert!(!token.add_child(copy));
        assert!(token.is_leaf());
    }

    #[test]
    fn test_tokens_without_span_are_accepted() {
        let mut parent = Token::new("f(x)", TokenKind::FunctionCall);
        assert!(parent.add_child(Token::new("f", TokenKind::FunctionName)));
        assert!(parent.add_child(Token::new("(", TokenKind::Punctuation)));
        assert!(parent.add_child(Token::new("x", TokenKind::ColumnName)));
        assert!(parent.add_child(Token::new(")", TokenKind::Punctuation)));
        assert_eq!(parent.render(), "f(x)");
    }

    #[test]
    fn test_render_sequence_spacing() {
        let tokens = vec![
            Token::new("a", TokenKind::ColumnName),
            Token::new(",", TokenKind::Punctuation),
            Token::new("b", TokenKind::ColumnName),
            Token::new("+", TokenKind::Operator),
            Token::new("1", TokenKind::NumberLiteral),
        ];
        assert_eq!(render_sequence(&tokens), "a, b + 1");
    }

    #[test]
    fn test_alias_kind_follows_role() {
        let mut table = NameToken::table("dbo.Orders");
        table.set_alias("o");
        assert_eq!(table.alias().unwrap().kind, TokenKind::TableAlias);
        assert_eq!(table.schema.as_deref(), Some("dbo"));
        assert_eq!(table.render(), "dbo.Orders o");

        let mut column = NameToken::column("Total");
        column.set_alias("Amount");
        assert_eq!(column.alias().unwrap().kind, TokenKind::ColumnAlias);
        assert_eq!(column.render(), "Total AS Amount");
    }

    #[test]
    fn test_qualified_name_parts() {
        let name = NameToken::routine("srv.db.[sales].[usp_Get]");
        assert_eq!(name.server.as_deref(), Some("srv"));
        assert_eq!(name.database.as_deref(), Some("db"));
        assert_eq!(name.schema.as_deref(), Some("[sales]"));
        assert_eq!(name.bare_name(), "usp_Get");
        assert_eq!(name.qualified_name(), "srv.db.[sales].[usp_Get]");
    }

    #[test]
    fn test_visit_mut_is_post_order() {
        let mut call = Token::new("", TokenKind::FunctionCall);
        call.add_child(Token::new("UPPER", TokenKind::FunctionName));
        call.add_child(Token::new("(", TokenKind::Punctuation));
        call.add_child(Token::new("x", TokenKind::ColumnName));
        call.add_child(Token::new(")", TokenKind::Punctuation));

        let mut order = Vec::new();
        call.visit_mut(&mut |t| order.push(t.kind));
        assert_eq!(order.last(), Some(&TokenKind::FunctionCall));
        assert_eq!(order[0], TokenKind::FunctionName);
    }
}
