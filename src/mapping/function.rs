//! Built-in function equivalence and argument templates.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::dialect::DatabaseType;
use crate::error::TranslateResult;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-z_][a-z0-9_]*\b").unwrap());

fn default_parens() -> bool {
    true
}

/// How one dialect spells a function.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FunctionSpecification {
    pub name: String,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(default = "default_parens")]
    pub parens: bool,
    /// Emitted for other dialects but never recognised in source text.
    #[serde(default)]
    pub output_only: bool,
}

/// Rewriters for functions a template cannot express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecificTranslator {
    DateAdd,
    DateExtract,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Spellings {
    One(FunctionSpecification),
    Many(Vec<FunctionSpecification>),
}

impl Spellings {
    fn as_slice(&self) -> &[FunctionSpecification] {
        match self {
            Spellings::One(spec) => std::slice::from_ref(spec),
            Spellings::Many(specs) => specs,
        }
    }
}

/// Equivalent spellings of one function across dialects.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionRow {
    #[serde(default)]
    pub translator: Option<SpecificTranslator>,
    /// Date unit implied by the function name, as for `YEAR(d)`.
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(flatten)]
    spellings: HashMap<DatabaseType, Spellings>,
}

impl FunctionRow {
    pub fn spellings(&self, dialect: DatabaseType) -> &[FunctionSpecification] {
        self.spellings.get(&dialect).map(Spellings::as_slice).unwrap_or(&[])
    }

    /// The spelling emitted for `dialect`.
    pub fn spelling(&self, dialect: DatabaseType) -> Option<&FunctionSpecification> {
        self.spellings(dialect).first()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionMapping {
    #[serde(default, rename = "function")]
    rows: Vec<FunctionRow>,
}

impl FunctionMapping {
    pub fn from_toml(document: &str) -> TranslateResult<Self> {
        Ok(toml::from_str(document)?)
    }

    pub fn rows(&self) -> &[FunctionRow] {
        &self.rows
    }

    /// The row and source spelling for a function called `name` in `dialect`.
    pub fn find(&self, dialect: DatabaseType, name: &str) -> Option<(&FunctionRow, &FunctionSpecification)> {
        let name = name.trim();
        self.rows.iter().find_map(|row| {
            row.spellings(dialect)
                .iter()
                .find(|s| !s.output_only && !s.name.is_empty() && s.name.eq_ignore_ascii_case(name))
                .map(|spec| (row, spec))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece<'a> {
    Placeholder(&'a str),
    Literal(&'a str),
}

fn pieces(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for m in PLACEHOLDER.find_iter(template) {
        pieces.extend(template[last..m.start()].split_whitespace().map(Piece::Literal));
        pieces.push(Piece::Placeholder(m.as_str()));
        last = m.end();
    }
    pieces.extend(template[last..].split_whitespace().map(Piece::Literal));
    pieces
}

/// Byte offsets of `text` that sit outside quotes and parentheses.
fn top_level_offsets(text: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => {
                if depth == 0 {
                    offsets.push(i);
                }
                depth += 1;
                continue;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                continue;
            }
            _ => {}
        }
        if depth == 0 {
            offsets.push(i);
        }
    }
    offsets
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// First top-level occurrence of `literal`, matched on word boundaries when it is a word.
fn find_literal(text: &str, literal: &str) -> Option<usize> {
    let wordy_start = literal.chars().next().is_some_and(is_word_char);
    let wordy_end = literal.chars().last().is_some_and(is_word_char);
    top_level_offsets(text).into_iter().find(|&i| {
        let Some(candidate) = text.get(i..i + literal.len()) else {
            return false;
        };
        if !candidate.eq_ignore_ascii_case(literal) {
            return false;
        }
        let before_ok = !wordy_start || !text[..i].chars().last().is_some_and(is_word_char);
        let after_ok = !wordy_end || !text[i + literal.len()..].chars().next().is_some_and(is_word_char);
        before_ok && after_ok
    })
}

fn split_words(text: &str) -> Vec<&str> {
    let offsets = top_level_offsets(text);
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        let splits = c.is_whitespace() && offsets.binary_search(&i).is_ok();
        match (splits, start) {
            (true, Some(s)) => {
                words.push(&text[s..i]);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push(&text[s..]);
    }
    words
}

fn assign<'a>(names: &[&'a str], text: &str, bindings: &mut HashMap<String, String>) -> Option<()> {
    let text = text.trim();
    if names.is_empty() {
        return text.is_empty().then_some(());
    }
    if text.is_empty() || find_literal(text, ",").is_some() {
        return None;
    }
    let words = split_words(text);
    if words.len() < names.len() {
        return None;
    }
    let tail = words.len() - (names.len() - 1);
    bindings.insert(names[0].to_string(), words[..tail].join(" "));
    for (name, word) in names[1..].iter().zip(&words[tail..]) {
        bindings.insert((*name).to_string(), (*word).to_string());
    }
    Some(())
}

impl FunctionSpecification {
    /// Bind the placeholders of this spelling's template to the text of a
    /// call's arguments. `None` when the arguments do not fit the template.
    pub fn bind(&self, arguments: &str) -> Option<HashMap<String, String>> {
        let mut bindings = HashMap::new();
        let Some(template) = self.args.as_deref() else {
            return arguments.trim().is_empty().then_some(bindings);
        };
        let mut rest = arguments;
        let mut pending: Vec<&str> = Vec::new();
        for piece in pieces(template) {
            match piece {
                Piece::Placeholder(name) => pending.push(name),
                Piece::Literal(literal) => {
                    let at = find_literal(rest, literal)?;
                    assign(&pending, &rest[..at], &mut bindings)?;
                    pending.clear();
                    rest = &rest[at + literal.len()..];
                }
            }
        }
        assign(&pending, rest, &mut bindings)?;
        Some(bindings)
    }

    /// Placeholder names of the template, in order.
    pub fn placeholders(&self) -> Vec<&str> {
        self.args
            .as_deref()
            .map(|t| PLACEHOLDER.find_iter(t).map(|m| m.as_str()).collect())
            .unwrap_or_default()
    }

    /// Text of a call to this spelling. Unbound placeholders stay as written.
    pub fn render(&self, bindings: &HashMap<String, String>) -> String {
        let args = self.args.as_deref().map(|template| {
            PLACEHOLDER
                .replace_all(template, |caps: &regex::Captures<'_>| {
                    bindings.get(&caps[0]).cloned().unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned()
        });
        match (self.parens, args) {
            (true, args) => format!("{}({})", self.name, args.unwrap_or_default()),
            (false, Some(args)) if self.name.is_empty() => args,
            (false, Some(args)) => format!("{} {}", self.name, args),
            (false, None) => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapping() -> FunctionMapping {
        FunctionMapping::from_toml(include_str!("../../config/functions.toml")).unwrap()
    }

    fn spec(name: &str, args: &str) -> FunctionSpecification {
        FunctionSpecification {
            name: name.to_string(),
            args: Some(args.to_string()),
            parens: true,
            output_only: false,
        }
    }

    #[test]
    fn test_find_skips_output_only() {
        let m = mapping();
        let (row, spec) = m.find(DatabaseType::SqlServer, "getdate").unwrap();
        assert_eq!(spec.name, "GETDATE");
        assert_eq!(row.spelling(DatabaseType::Oracle).unwrap().name, "SYSDATE");
        assert!(m.find(DatabaseType::Postgres, "COALESCE").is_none());
        assert!(m.find(DatabaseType::SqlServer, "MY_UDF").is_none());
    }

    #[test]
    fn test_bind_interval_template() {
        let s = spec("DATE_ADD", "date, INTERVAL amount unit");
        let b = s.bind("o.OrderDate, INTERVAL @n * 2 DAY").unwrap();
        assert_eq!(b["date"], "o.OrderDate");
        assert_eq!(b["amount"], "@n * 2");
        assert_eq!(b["unit"], "DAY");
    }

    #[test]
    fn test_bind_keyword_literal() {
        let s = spec("POSITION", "substr IN str");
        let b = s.bind("'x' IN SUBSTRING(name, 1, 3)").unwrap();
        assert_eq!(b["substr"], "'x'");
        assert_eq!(b["str"], "SUBSTRING(name, 1, 3)");
    }

    #[test]
    fn test_bind_rejects_argument_count_mismatch() {
        let s = spec("ISNULL", "value, fallback");
        assert!(s.bind("a, b, c").is_none());
        assert!(s.bind("a").is_none());
        assert!(s.bind("COALESCE(a, b), 0").is_some());
    }

    #[test]
    fn test_render_without_parentheses() {
        let m = mapping();
        let (row, source) = m.find(DatabaseType::SqlServer, "IIF").unwrap();
        let bindings = source.bind("x > 1, 'a', 'b'").unwrap();
        let target = row.spelling(DatabaseType::Postgres).unwrap();
        assert_eq!(target.render(&bindings), "CASE WHEN x > 1 THEN 'a' ELSE 'b' END");
        let target = row.spelling(DatabaseType::MySql).unwrap();
        assert_eq!(target.render(&bindings), "IF(x > 1, 'a', 'b')");
    }

    #[test]
    fn test_render_argument_order() {
        let m = mapping();
        let (row, source) = m.find(DatabaseType::SqlServer, "CHARINDEX").unwrap();
        let bindings = source.bind("',', list").unwrap();
        assert_eq!(row.spelling(DatabaseType::Oracle).unwrap().render(&bindings), "INSTR(list, ',')");
        assert_eq!(row.spelling(DatabaseType::Postgres).unwrap().render(&bindings), "POSITION(',' IN list)");
    }
}
