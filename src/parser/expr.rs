//! Expression token trees.
//!
//! Expressions are not parsed into an operator tree. They are kept as a
//! sequence of classified tokens where function calls, parenthesised groups
//! and subqueries nest.

use crate::model::{NameRole, NameToken, Token, TokenKind};

use super::lexer::{Lexeme, LexemeKind};

/// Where an expression appears; drives alias and table classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprContext {
    General,
    /// One item of a select list: a trailing bare name is a column alias.
    SelectColumn,
    /// A `FROM` list: names are tables, followed by optional aliases.
    TableList,
}

const KEYWORDS: &[&str] = &[
    "ALL", "AND", "ANY", "APPLY", "AS", "ASC", "BETWEEN", "BOTH", "BY", "CASE", "CHECK", "COLLATE",
    "CONSTRAINT", "CROSS", "CURRENT", "DEFAULT", "DELETE", "DESC", "DISTINCT", "ELSE", "END",
    "ESCAPE", "EXCEPT", "EXISTS", "FALSE", "FETCH", "FIRST", "FOLLOWING", "FOR", "FOREIGN", "FROM",
    "FULL", "GROUP", "HAVING", "ILIKE", "IN", "INNER", "INSERT", "INTERSECT", "INTERVAL", "INTO",
    "IS", "JOIN", "KEY", "LAST", "LATERAL", "LEADING", "LEFT", "LIKE", "LIMIT", "MINUS", "NATURAL",
    "NEXT", "NOT", "NULL", "NULLS", "OF", "OFFSET", "ON", "ONLY", "OR", "ORDER", "OUTER", "OVER",
    "PARTITION", "PERCENT", "PRECEDING", "PRIMARY", "RANGE", "REFERENCES", "RETURNING", "RIGHT",
    "ROW", "ROWS", "SELECT", "SET", "SOME", "THEN", "TIES", "TOP", "TRAILING", "TRUE", "UNBOUNDED",
    "UNION", "UNIQUE", "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

/// Keywords that may be followed by `(` without being a call.
const NON_CALL: &[&str] = &[
    "ALL", "AND", "ANY", "AS", "CASE", "CHECK", "ELSE", "END", "EXISTS", "FROM", "IN", "INTERVAL",
    "INTO", "IS", "JOIN", "KEY", "NOT", "ON", "OR", "OVER", "REFERENCES", "SELECT", "SET", "SOME",
    "THEN", "UNION", "USING", "VALUES", "WHEN", "WHERE", "WITH", "BY", "HAVING", "UNIQUE", "PRIMARY",
    "FOREIGN", "TABLE", "RETURNS", "RETURN", "LATERAL",
];

/// Functions written without parentheses.
const NO_PAREN_FUNCTIONS: &[&str] = &[
    "CURRENT_TIMESTAMP", "CURRENT_DATE", "CURRENT_TIME", "SYSDATE", "SYSTIMESTAMP",
    "LOCALTIMESTAMP", "CURRENT_USER", "SESSION_USER",
];

/// Keywords closing a `FROM` list.
const CLAUSE_END: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "UNION", "EXCEPT", "INTERSECT", "MINUS", "ON", "SET",
    "LIMIT", "OFFSET", "FETCH", "RETURNING", "INTO", "WINDOW", "USING", "FOR",
];

const TYPE_CONTINUATIONS: &[&str] = &["PRECISION", "VARYING", "UNSIGNED", "SIGNED", "RAW"];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn is_one_of(word: &str, list: &[&str]) -> bool {
    list.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Index of the `)` closing the `(` at `open`, or `lexemes.len()` when unbalanced.
pub fn matching_paren(lexemes: &[Lexeme], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, l) in lexemes.iter().enumerate().skip(open) {
        if l.is_punct("(") {
            depth += 1;
        } else if l.is_punct(")") {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return i;
            }
        }
    }
    lexemes.len()
}

/// Split at `separator` punctuation outside parentheses.
pub fn split_top_level<'l, 'a>(lexemes: &'l [Lexeme<'a>], separator: &str) -> Vec<&'l [Lexeme<'a>]> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut begin = 0;
    for (i, l) in lexemes.iter().enumerate() {
        if l.is_punct("(") {
            depth += 1;
        } else if l.is_punct(")") {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && l.is_punct(separator) {
            parts.push(&lexemes[begin..i]);
            begin = i + 1;
        }
    }
    if begin < lexemes.len() || !parts.is_empty() {
        parts.push(&lexemes[begin..]);
    }
    parts
}

/// End (exclusive) of a dotted name starting at `i`.
pub fn name_end(lexemes: &[Lexeme], i: usize) -> usize {
    let mut j = i + 1;
    while j + 1 < lexemes.len()
        && (lexemes[j].is_punct(".") || lexemes[j].is_op(".."))
        && (lexemes[j + 1].is_name() || lexemes[j + 1].is_op("*"))
    {
        j += 2;
    }
    j
}

fn joined(lexemes: &[Lexeme]) -> String {
    lexemes.iter().map(|l| l.text).collect()
}

/// A qualified object name starting at `i`, and the index after it.
pub fn name_token(lexemes: &[Lexeme], i: usize, role: NameRole) -> Option<(NameToken, usize)> {
    let first = lexemes.get(i)?;
    if !first.is_name() {
        return None;
    }
    let end = name_end(lexemes, i);
    let text = joined(&lexemes[i..end]);
    let name = NameToken::new(&text, role).with_span(first.start, lexemes[end - 1].stop);
    Some((name, end))
}

/// A data type starting at `i` (`NUMBER(10, 2)`, `DOUBLE PRECISION`,
/// `TIMESTAMP WITH TIME ZONE`, `t.col%TYPE`), and the index after it.
pub fn data_type(lexemes: &[Lexeme], i: usize) -> Option<(Token, usize)> {
    let first = lexemes.get(i)?;
    if !matches!(first.kind, LexemeKind::Word | LexemeKind::QuotedIdent) {
        return None;
    }
    let mut j = name_end(lexemes, i);
    while lexemes
        .get(j)
        .is_some_and(|l| l.kind == LexemeKind::Word && is_one_of(l.text, TYPE_CONTINUATIONS))
    {
        j += 1;
    }
    if lexemes.get(j).is_some_and(|l| l.is_punct("(")) {
        let close = matching_paren(lexemes, j);
        j = (close + 1).min(lexemes.len());
    }
    if lexemes.get(j).is_some_and(|l| l.is_word("WITH") || l.is_word("WITHOUT"))
        && lexemes.get(j + 1).is_some_and(|l| l.is_word("TIME"))
        && lexemes.get(j + 2).is_some_and(|l| l.is_word("ZONE"))
    {
        j += 3;
    }
    let mut text = String::new();
    let mut spaced = false;
    for l in &lexemes[i..j] {
        let is_word = l.kind == LexemeKind::Word;
        if is_word && spaced {
            text.push(' ');
        }
        text.push_str(l.text);
        spaced = is_word || l.is_punct(")");
    }
    let token = Token::with_span(text, TokenKind::DataType, first.start, lexemes[j - 1].stop);
    Some((token, j))
}

fn leaf(l: &Lexeme, kind: TokenKind) -> Token {
    Token::with_span(l.text, kind, l.start, l.stop)
}

#[derive(Default)]
struct State {
    table_mode: bool,
    alias_allowed: bool,
    from_list: bool,
    interval: u8,
    cast: bool,
}

/// Builds classified token trees out of lexeme slices.
pub struct ExprBuilder<'s> {
    source: &'s str,
}

impl<'s> ExprBuilder<'s> {
    pub fn new(source: &'s str) -> Self {
        Self { source }
    }

    fn text(&self, start: usize, stop: usize) -> &'s str {
        &self.source[start..=stop]
    }

    /// One token for the whole slice. A single element is returned as is.
    pub fn build(&self, lexemes: &[Lexeme], context: ExprContext) -> Token {
        let state = State {
            table_mode: context == ExprContext::TableList,
            from_list: context == ExprContext::TableList,
            ..State::default()
        };
        let tokens = self.sequence(lexemes, context, state);
        self.wrap(lexemes, tokens, TokenKind::Expression)
    }

    /// Comma separated expressions.
    pub fn build_list(&self, lexemes: &[Lexeme], context: ExprContext) -> Vec<Token> {
        split_top_level(lexemes, ",")
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(|part| self.build(part, context))
            .collect()
    }

    fn wrap(&self, lexemes: &[Lexeme], mut tokens: Vec<Token>, kind: TokenKind) -> Token {
        if tokens.len() == 1 {
            if let Some(single) = tokens.pop() {
                return single;
            }
        }
        let (Some(first), Some(last)) = (lexemes.first(), lexemes.last()) else {
            return Token::new("", kind);
        };
        let mut expr = Token::with_span(self.text(first.start, last.stop), kind, first.start, last.stop);
        for token in tokens {
            expr.add_child(token);
        }
        expr
    }

    fn sequence(&self, lx: &[Lexeme], context: ExprContext, mut state: State) -> Vec<Token> {
        let mut out: Vec<Token> = Vec::new();
        let mut i = 0;
        while i < lx.len() {
            let l = &lx[i];
            if l.is_punct("(") {
                let (group, next) = self.group(lx, i);
                if group.kind == TokenKind::Subquery && state.table_mode {
                    state.table_mode = false;
                    state.alias_allowed = true;
                } else {
                    state.alias_allowed = false;
                }
                out.push(group);
                i = next;
                continue;
            }

            let followed_by_paren = |end: usize| lx.get(end).is_some_and(|n| n.is_punct("("));

            if l.kind == LexemeKind::Word && is_keyword(l.text) {
                let upper = l.text.to_uppercase();
                if followed_by_paren(i + 1) && !is_one_of(&upper, NON_CALL) {
                    let (call, next) = self.call(lx, i, i + 1);
                    out.push(call);
                    i = next;
                    continue;
                }
                if upper == "WITH"
                    && followed_by_paren(i + 1)
                    && out.last().is_some_and(|t| matches!(t.kind, TokenKind::TableName | TokenKind::TableAlias))
                {
                    let close = matching_paren(lx, i + 1).min(lx.len() - 1);
                    out.push(Token::with_span(
                        self.text(l.start, lx[close].stop),
                        TokenKind::Keyword,
                        l.start,
                        lx[close].stop,
                    ));
                    i = close + 1;
                    continue;
                }
                out.push(leaf(l, TokenKind::Keyword));
                i += 1;
                if upper == "AS" {
                    if state.cast {
                        if let Some((ty, next)) = data_type(lx, i) {
                            out.push(ty);
                            i = next;
                        }
                    } else if let Some(n) = lx.get(i).filter(|n| n.is_name()) {
                        if state.alias_allowed {
                            out.push(leaf(n, TokenKind::TableAlias));
                            state.alias_allowed = false;
                            i += 1;
                        } else if context == ExprContext::SelectColumn && i + 1 == lx.len() {
                            out.push(leaf(n, TokenKind::ColumnAlias));
                            i += 1;
                        }
                    }
                    continue;
                }
                match upper.as_str() {
                    "FROM" => {
                        state.from_list = true;
                        state.table_mode = true;
                    }
                    "JOIN" | "APPLY" | "UPDATE" => state.table_mode = true,
                    "INTO" if !state.from_list => state.table_mode = true,
                    "INTERVAL" => state.interval = 2,
                    _ => {}
                }
                if is_one_of(&upper, CLAUSE_END) {
                    state.from_list = false;
                    state.table_mode = upper == "INTO";
                }
                state.alias_allowed = false;
                continue;
            }

            match l.kind {
                LexemeKind::Word | LexemeKind::QuotedIdent | LexemeKind::Variable => {
                    let end = name_end(lx, i);
                    if l.kind != LexemeKind::Variable && followed_by_paren(end) {
                        let (call, next) = self.call(lx, i, end);
                        out.push(call);
                        state.alias_allowed = state.table_mode;
                        state.table_mode = false;
                        i = next;
                        continue;
                    }
                    let text = joined(&lx[i..end]);
                    let span = (l.start, lx[end - 1].stop);
                    let kind = self.classify_name(lx, i, end, &text, context, &mut state, &out);
                    out.push(Token::with_span(text, kind, span.0, span.1));
                    i = end;
                }
                LexemeKind::String | LexemeKind::DollarBody => {
                    out.push(leaf(l, TokenKind::StringLiteral));
                    state.interval = state.interval.saturating_sub(1);
                    i += 1;
                }
                LexemeKind::Number => {
                    out.push(leaf(l, TokenKind::NumberLiteral));
                    state.interval = state.interval.saturating_sub(1);
                    i += 1;
                }
                LexemeKind::Operator if l.text == "::" => {
                    out.push(leaf(l, TokenKind::Operator));
                    i += 1;
                    if let Some((ty, next)) = data_type(lx, i) {
                        out.push(ty);
                        i = next;
                    }
                }
                LexemeKind::Operator => {
                    out.push(leaf(l, TokenKind::Operator));
                    i += 1;
                }
                _ => {
                    if l.is_punct(",") && state.from_list {
                        state.table_mode = true;
                    }
                    state.alias_allowed = false;
                    out.push(leaf(l, TokenKind::Punctuation));
                    i += 1;
                }
            }
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_name(
        &self,
        lx: &[Lexeme],
        i: usize,
        end: usize,
        text: &str,
        context: ExprContext,
        state: &mut State,
        out: &[Token],
    ) -> TokenKind {
        let l = &lx[i];
        if state.interval == 1 && l.kind == LexemeKind::Word {
            state.interval = 0;
            return TokenKind::Keyword;
        }
        if state.table_mode {
            state.table_mode = false;
            state.alias_allowed = true;
            return TokenKind::TableName;
        }
        if state.alias_allowed && end == i + 1 && l.kind != LexemeKind::Variable {
            state.alias_allowed = false;
            return TokenKind::TableAlias;
        }
        state.alias_allowed = false;
        if l.kind == LexemeKind::Variable && end == i + 1 {
            return TokenKind::Variable;
        }
        if text.contains('%') {
            let upper = text.to_uppercase();
            if upper.ends_with("%TYPE") || upper.ends_with("%ROWTYPE") {
                return TokenKind::DataType;
            }
            return TokenKind::Variable;
        }
        if end == i + 1 && l.kind == LexemeKind::Word && is_one_of(l.text, NO_PAREN_FUNCTIONS) {
            return TokenKind::FunctionCall;
        }
        let trailing = end == lx.len() && end == i + 1;
        if context == ExprContext::SelectColumn && trailing {
            let after_value = out.last().is_some_and(|p| match p.kind {
                TokenKind::Operator | TokenKind::Punctuation => false,
                TokenKind::Keyword => p.symbol.eq_ignore_ascii_case("END"),
                _ => true,
            });
            if after_value {
                return TokenKind::ColumnAlias;
            }
        }
        TokenKind::ColumnName
    }

    /// A parenthesised group or subquery starting at `open`.
    fn group(&self, lx: &[Lexeme], open: usize) -> (Token, usize) {
        let close = matching_paren(lx, open);
        let inner = &lx[open + 1..close.min(lx.len())];
        let is_query = inner
            .first()
            .is_some_and(|f| f.is_word("SELECT") || f.is_word("WITH"));
        let kind = if is_query { TokenKind::Subquery } else { TokenKind::Expression };
        let last = close.min(lx.len() - 1);
        let (start, stop) = (lx[open].start, lx[last].stop);
        let mut group = Token::with_span(self.text(start, stop), kind, start, stop);
        group.add_child(leaf(&lx[open], TokenKind::Punctuation));
        for token in self.sequence(inner, ExprContext::General, State::default()) {
            group.add_child(token);
        }
        if close < lx.len() {
            group.add_child(leaf(&lx[close], TokenKind::Punctuation));
        }
        (group, close + 1)
    }

    /// A call whose name spans `name_start..open` and whose `(` is at `open`.
    fn call(&self, lx: &[Lexeme], name_start: usize, open: usize) -> (Token, usize) {
        let close = matching_paren(lx, open);
        let last = close.min(lx.len() - 1);
        let name = joined(&lx[name_start..open]);
        let (start, stop) = (lx[name_start].start, lx[last].stop);
        let mut call = Token::with_span(self.text(start, stop), TokenKind::FunctionCall, start, stop);
        let cast = is_one_of(&name, &["CAST", "TRY_CAST", "SAFE_CAST"]);
        call.add_child(Token::with_span(
            name,
            TokenKind::FunctionName,
            lx[name_start].start,
            lx[open - 1].stop,
        ));
        call.add_child(leaf(&lx[open], TokenKind::Punctuation));
        let state = State {
            cast,
            ..State::default()
        };
        for token in self.sequence(&lx[open + 1..close.min(lx.len())], ExprContext::General, state) {
            call.add_child(token);
        }
        if close < lx.len() {
            call.add_child(leaf(&lx[close], TokenKind::Punctuation));
        }
        (call, close + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DatabaseType;
    use crate::parser::lexer::{significant, tokenize};

    fn build(text: &str, dialect: DatabaseType, context: ExprContext) -> Token {
        let lexemes = significant(&tokenize(text, dialect).unwrap());
        ExprBuilder::new(text).build(&lexemes, context)
    }

    fn kinds_of(token: &Token, kind: TokenKind) -> Vec<String> {
        token
            .collect()
            .into_iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.symbol.clone())
            .collect()
    }

    #[test]
    fn test_function_call_nesting() {
        let token = build("ISNULL(UPPER(c.Name), 'x')", DatabaseType::SqlServer, ExprContext::General);
        assert_eq!(token.kind, TokenKind::FunctionCall);
        assert_eq!(kinds_of(&token, TokenKind::FunctionName), vec!["ISNULL", "UPPER"]);
        assert_eq!(kinds_of(&token, TokenKind::ColumnName), vec!["c.Name"]);
        assert_eq!(token.render(), "ISNULL(UPPER(c.Name), 'x')");
    }

    #[test]
    fn test_tables_and_aliases() {
        let token = build(
            "dbo.Orders o WITH (NOLOCK) JOIN Customers AS c ON c.Id = o.CustomerId",
            DatabaseType::SqlServer,
            ExprContext::TableList,
        );
        assert_eq!(kinds_of(&token, TokenKind::TableName), vec!["dbo.Orders", "Customers"]);
        assert_eq!(kinds_of(&token, TokenKind::TableAlias), vec!["o", "c"]);
        assert_eq!(kinds_of(&token, TokenKind::Keyword)[0], "WITH (NOLOCK)");
    }

    #[test]
    fn test_column_alias() {
        let token = build("o.Total * 2 Amount", DatabaseType::SqlServer, ExprContext::SelectColumn);
        assert_eq!(kinds_of(&token, TokenKind::ColumnAlias), vec!["Amount"]);

        let token = build("COUNT(*) AS cnt", DatabaseType::MySql, ExprContext::SelectColumn);
        assert_eq!(kinds_of(&token, TokenKind::ColumnAlias), vec!["cnt"]);
    }

    #[test]
    fn test_cast_and_double_colon_types() {
        let token = build("CAST(x AS NVARCHAR(50)) || y::numeric(10, 2)", DatabaseType::Postgres, ExprContext::General);
        assert_eq!(kinds_of(&token, TokenKind::DataType), vec!["NVARCHAR(50)", "numeric(10,2)"]);
    }

    #[test]
    fn test_subquery_and_variables() {
        let token = build(
            "EXISTS (SELECT 1 FROM t WHERE t.id = @id) AND SQL%ROWCOUNT > 0",
            DatabaseType::SqlServer,
            ExprContext::General,
        );
        assert_eq!(kinds_of(&token, TokenKind::Subquery).len(), 1);
        assert_eq!(kinds_of(&token, TokenKind::TableName), vec!["t"]);
        assert_eq!(kinds_of(&token, TokenKind::Variable), vec!["@id", "SQL%ROWCOUNT"]);
    }

    #[test]
    fn test_no_paren_function_and_interval() {
        let token = build("CURRENT_TIMESTAMP + INTERVAL 1 DAY", DatabaseType::MySql, ExprContext::General);
        assert_eq!(kinds_of(&token, TokenKind::FunctionCall), vec!["CURRENT_TIMESTAMP"]);
        assert!(kinds_of(&token, TokenKind::ColumnName).is_empty());
    }

    #[test]
    fn test_data_type_spans() {
        let text = "DOUBLE PRECISION, TIMESTAMP(3) WITH TIME ZONE";
        let lexemes = significant(&tokenize(text, DatabaseType::Postgres).unwrap());
        let (first, next) = data_type(&lexemes, 0).unwrap();
        assert_eq!(first.symbol, "DOUBLE PRECISION");
        let (second, _) = data_type(&lexemes, next + 1).unwrap();
        assert_eq!(second.symbol, "TIMESTAMP(3) WITH TIME ZONE");
    }
}
