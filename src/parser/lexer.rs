//! Lexer for routine text using nom.
//!
//! Produces every lexeme of the input, trivia included, with inclusive byte
//! offsets and 1-based line/column positions.

use std::ops::Range;

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while, take_while1},
    character::complete::{anychar, char, digit1, multispace1, not_line_ending, one_of, satisfy},
    combinator::{opt, recognize},
    multi::many0,
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::dialect::DatabaseType;
use crate::model::{SqlSyntaxError, SqlSyntaxErrorItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexemeKind {
    Word,
    QuotedIdent,
    String,
    Number,
    Variable,
    Operator,
    Punctuation,
    DollarBody,
    Comment,
    Whitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub kind: LexemeKind,
    pub text: &'a str,
    /// Inclusive byte offsets into the source.
    pub start: usize,
    pub stop: usize,
    pub line: usize,
    pub column: usize,
}

impl<'a> Lexeme<'a> {
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, LexemeKind::Comment | LexemeKind::Whitespace)
    }

    /// An unquoted word equal to `word`, ignoring case.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == LexemeKind::Word && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == LexemeKind::Punctuation && self.text == punct
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == LexemeKind::Operator && self.text == op
    }

    /// A word, quoted identifier or variable usable as a name.
    pub fn is_name(&self) -> bool {
        matches!(
            self.kind,
            LexemeKind::Word | LexemeKind::QuotedIdent | LexemeKind::Variable
        )
    }

    /// Offset one past the last byte.
    pub fn end(&self) -> usize {
        self.stop + 1
    }
}

/// Lex the whole input.
pub fn tokenize(input: &str, dialect: DatabaseType) -> Result<Vec<Lexeme<'_>>, SqlSyntaxError> {
    tokenize_range(input, 0..input.len(), dialect)
}

/// Lex `range` of `source`; offsets and positions refer to `source`.
pub fn tokenize_range(
    source: &str,
    range: Range<usize>,
    dialect: DatabaseType,
) -> Result<Vec<Lexeme<'_>>, SqlSyntaxError> {
    let (mut line, mut column) = line_col(source, range.start);
    let mut pos = range.start;
    let mut lexemes = Vec::new();

    while pos < range.end {
        let rest = &source[pos..range.end];
        let (remaining, kind) = match next_lexeme(rest, dialect) {
            Ok(found) => found,
            Err(_) => return Err(SqlSyntaxError::new(lex_error(source, pos, range.end, dialect))),
        };
        let len = rest.len() - remaining.len();
        let text = &rest[..len];
        lexemes.push(Lexeme {
            kind,
            text,
            start: pos,
            stop: pos + len - 1,
            line,
            column,
        });
        for c in text.chars() {
            if c == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        pos += len;
    }
    Ok(lexemes)
}

/// Drop whitespace and comments.
pub fn significant<'a>(lexemes: &[Lexeme<'a>]) -> Vec<Lexeme<'a>> {
    lexemes.iter().filter(|l| !l.is_trivia()).copied().collect()
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}

/// Build a syntax error item for an inclusive span of `source`.
pub fn error_item(source: &str, start: usize, stop: usize, message: impl Into<String>) -> SqlSyntaxErrorItem {
    let (line, column) = line_col(source, start);
    let begin = start.min(source.len());
    let end = (stop + 1).min(source.len()).max(begin);
    let mut text: String = source[begin..end].chars().take(40).collect();
    if text.is_empty() {
        text = "<EOF>".to_string();
    }
    SqlSyntaxErrorItem {
        line,
        column,
        start_index: start,
        stop_index: stop,
        text,
        message: message.into(),
    }
}

fn lex_error(source: &str, pos: usize, end: usize, dialect: DatabaseType) -> SqlSyntaxErrorItem {
    let rest = &source[pos..end];
    let mut chars = rest.chars();
    let (first, second) = (chars.next(), chars.next());
    let message = if rest.starts_with("/*") {
        "unterminated block comment"
    } else if first == Some('\'')
        || (matches!(first, Some('N' | 'n' | 'E' | 'e')) && second == Some('\''))
    {
        "unterminated string literal"
    } else if rest.starts_with('$') {
        "unterminated dollar-quoted body"
    } else if rest.starts_with('"') && dialect == DatabaseType::MySql {
        "unterminated string literal"
    } else if rest.starts_with('[') || rest.starts_with('"') || rest.starts_with('`') {
        "unterminated quoted identifier"
    } else {
        "unexpected character"
    };
    error_item(source, pos, end.saturating_sub(1).max(pos), message)
}

fn next_lexeme(input: &str, dialect: DatabaseType) -> IResult<&str, LexemeKind> {
    if let Ok((rest, _)) = multispace1::<&str, nom::error::Error<&str>>(input) {
        return Ok((rest, LexemeKind::Whitespace));
    }
    if let Ok((rest, _)) = alt((line_comment, block_comment))(input) {
        return Ok((rest, LexemeKind::Comment));
    }
    if input.starts_with("/*") {
        return block_comment(input).map(|(rest, _)| (rest, LexemeKind::Comment));
    }
    if let Ok((rest, _)) = string_literal(input, dialect) {
        return Ok((rest, LexemeKind::String));
    }
    if input.starts_with('\'') {
        return string_literal(input, dialect).map(|(rest, _)| (rest, LexemeKind::String));
    }
    if let Some(found) = quoted(input, dialect) {
        return found;
    }
    if input.starts_with('$') {
        if let Ok((rest, _)) = dollar_body(input) {
            return Ok((rest, LexemeKind::DollarBody));
        }
        if let Ok((rest, _)) = positional_param(input) {
            return Ok((rest, LexemeKind::Variable));
        }
        return dollar_body(input).map(|(rest, _)| (rest, LexemeKind::DollarBody));
    }
    if let Ok((rest, _)) = variable(input) {
        return Ok((rest, LexemeKind::Variable));
    }
    if let Ok((rest, _)) = number(input) {
        return Ok((rest, LexemeKind::Number));
    }
    if let Ok((rest, _)) = word(input) {
        return Ok((rest, LexemeKind::Word));
    }
    if let Ok((rest, _)) = operator(input) {
        return Ok((rest, LexemeKind::Operator));
    }
    let (rest, _) = punctuation(input, dialect)?;
    Ok((rest, LexemeKind::Punctuation))
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("--"), not_line_ending))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), take_until("*/"), tag("*/"))))(input)
}

fn string_literal(input: &str, dialect: DatabaseType) -> IResult<&str, &str> {
    if dialect == DatabaseType::MySql {
        return alt((
            recognize(tuple((
                char('\''),
                many0(alt((tag("''"), recognize(pair(char('\\'), anychar)), is_not("'\\")))),
                char('\''),
            ))),
            recognize(tuple((
                char('"'),
                many0(alt((tag("\"\""), recognize(pair(char('\\'), anychar)), is_not("\"\\")))),
                char('"'),
            ))),
        ))(input);
    }
    recognize(tuple((
        opt(one_of("NnEe")),
        char('\''),
        many0(alt((tag("''"), is_not("'")))),
        char('\''),
    )))(input)
}

fn quoted(input: &str, dialect: DatabaseType) -> Option<IResult<&str, LexemeKind>> {
    let first = input.chars().next()?;
    let parsed = match (first, dialect) {
        ('[', DatabaseType::SqlServer | DatabaseType::Sqlite) => {
            recognize(tuple((char('['), many0(alt((tag("]]"), is_not("]")))), char(']'))))(input)
        }
        ('`', DatabaseType::MySql | DatabaseType::Sqlite) => {
            recognize(tuple((char('`'), many0(alt((tag("``"), is_not("`")))), char('`'))))(input)
        }
        ('"', d) if d != DatabaseType::MySql => {
            recognize(tuple((char('"'), many0(alt((tag("\"\""), is_not("\"")))), char('"'))))(input)
        }
        _ => return None,
    };
    Some(parsed.map(|(rest, _)| (rest, LexemeKind::QuotedIdent)))
}

fn dollar_body(input: &str) -> IResult<&str, &str> {
    let (rest, open) = recognize(tuple((
        char('$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
        char('$'),
    )))(input)?;
    let (rest, _) = take_until(open)(rest)?;
    let (rest, _) = tag(open)(rest)?;
    Ok((rest, &input[..input.len() - rest.len()]))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '#'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '#' || c == '$'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_ident_start), take_while(is_ident_char)))(input)
}

const ATTRIBUTES: [&str; 7] = ["TYPE", "ROWTYPE", "FOUND", "NOTFOUND", "ROWCOUNT", "ISOPEN", "BULK_ROWCOUNT"];

/// A bare word; `name%TYPE`-style attributes stay part of the word.
fn word(input: &str) -> IResult<&str, &str> {
    let (rest, _) = identifier(input)?;
    if let Ok((after, attr)) = preceded(char::<&str, nom::error::Error<&str>>('%'), take_while1(is_ident_char))(rest) {
        if ATTRIBUTES.iter().any(|a| a.eq_ignore_ascii_case(attr)) {
            return Ok((after, &input[..input.len() - after.len()]));
        }
    }
    Ok((rest, &input[..input.len() - rest.len()]))
}

fn variable(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(pair(tag("@@"), identifier)),
        recognize(pair(char('@'), identifier)),
        recognize(tuple((tag("@`"), is_not("`"), char('`')))),
        recognize(tuple((tag("@'"), is_not("'"), char('\'')))),
        recognize(pair(char(':'), identifier)),
    ))(input)
}

fn positional_param(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('$'), digit1))(input)
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

fn operator(input: &str) -> IResult<&str, &str> {
    alt((
        alt((
            tag(":="),
            tag("::"),
            tag("<>"),
            tag("!="),
            tag(">="),
            tag("<="),
            tag("||"),
            tag("=>"),
            tag(".."),
            tag("<<"),
            tag(">>"),
        )),
        alt((tag("+="), tag("-="), tag("*="), tag("/="))),
        recognize(one_of("=<>+-*/%&|^~!")),
    ))(input)
}

fn punctuation(input: &str, dialect: DatabaseType) -> IResult<&str, &str> {
    match dialect {
        DatabaseType::SqlServer | DatabaseType::Sqlite => recognize(one_of("(),;.:"))(input),
        _ => recognize(one_of("(),;.:[]"))(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str, dialect: DatabaseType) -> Vec<(LexemeKind, &str)> {
        significant(&tokenize(text, dialect).unwrap())
            .into_iter()
            .map(|l| (l.kind, l.text))
            .collect()
    }

    #[test]
    fn test_tsql_lexemes() {
        let lexed = kinds("SELECT @a = [Order Id] FROM dbo.t -- trailing", DatabaseType::SqlServer);
        assert_eq!(
            lexed,
            vec![
                (LexemeKind::Word, "SELECT"),
                (LexemeKind::Variable, "@a"),
                (LexemeKind::Operator, "="),
                (LexemeKind::QuotedIdent, "[Order Id]"),
                (LexemeKind::Word, "FROM"),
                (LexemeKind::Word, "dbo"),
                (LexemeKind::Punctuation, "."),
                (LexemeKind::Word, "t"),
            ]
        );
    }

    #[test]
    fn test_strings_and_numbers() {
        let lexed = kinds("N'it''s' 1.5 'a' || 2", DatabaseType::SqlServer);
        assert_eq!(lexed[0], (LexemeKind::String, "N'it''s'"));
        assert_eq!(lexed[1], (LexemeKind::Number, "1.5"));
        assert_eq!(lexed[3], (LexemeKind::Operator, "||"));
    }

    #[test]
    fn test_oracle_attributes_and_ranges() {
        let lexed = kinds("v_id t.id%TYPE; FOR i IN 1..10", DatabaseType::Oracle);
        assert!(lexed.contains(&(LexemeKind::Word, "id%TYPE")));
        assert!(lexed.contains(&(LexemeKind::Number, "1")));
        assert!(lexed.contains(&(LexemeKind::Operator, "..")));
    }

    #[test]
    fn test_dollar_body() {
        let lexed = kinds("AS $body$ BEGIN NULL; END $body$ LANGUAGE plpgsql", DatabaseType::Postgres);
        assert_eq!(lexed[1], (LexemeKind::DollarBody, "$body$ BEGIN NULL; END $body$"));
    }

    #[test]
    fn test_positions() {
        let lexemes = tokenize("SELECT\n  x", DatabaseType::MySql).unwrap();
        let x = lexemes.last().unwrap();
        assert_eq!((x.line, x.column, x.start, x.stop), (2, 3, 9, 9));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("SELECT 'abc", DatabaseType::Postgres).unwrap_err();
        let item = &err.items()[0];
        assert_eq!(item.message, "unterminated string literal");
        assert_eq!((item.line, item.column, item.start_index), (1, 8, 7));
    }

    #[test]
    fn test_unterminated_comment() {
        let err = tokenize("SELECT 1 /* open", DatabaseType::Oracle).unwrap_err();
        assert_eq!(err.items()[0].message, "unterminated block comment");
    }
}
