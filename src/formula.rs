//! Function call text split into name and arguments.

use serde::Serialize;

/// A function call expression: `name(body)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionFormula {
    pub expression: String,
    pub name: String,
    pub body: String,
}

impl FunctionFormula {
    /// Parse `expression`; without parentheses the whole text is the name.
    pub fn new(expression: &str) -> Self {
        let expression = expression.trim();
        let Some(open) = expression.find('(') else {
            return Self {
                expression: expression.to_string(),
                name: expression.to_string(),
                body: String::new(),
            };
        };
        let close = matching_close(expression, open).unwrap_or(expression.len());
        Self {
            expression: expression.to_string(),
            name: expression[..open].trim().to_string(),
            body: expression[open + 1..close].to_string(),
        }
    }

    pub fn has_parens(&self) -> bool {
        self.expression.contains('(')
    }

    /// Split the body into trimmed arguments.
    ///
    /// A single-character delimiter separates at every occurrence outside
    /// parentheses and string literals. A longer delimiter (` AS `, ` FROM `)
    /// splits once, at its last such occurrence, ignoring case.
    pub fn args(&self, delimiter: &str) -> Vec<String> {
        if self.body.trim().is_empty() {
            return Vec::new();
        }
        let mut chars = delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => split_on_char(&self.body, c),
            _ => split_at_last(&self.body, delimiter),
        }
    }
}

fn split_on_char(body: &str, delimiter: char) -> Vec<String> {
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut quotes = 0usize;
    let mut current = String::new();
    for c in body.chars() {
        match c {
            '\'' => quotes += 1,
            '(' if quotes % 2 == 0 => depth += 1,
            ')' if quotes % 2 == 0 => depth -= 1,
            _ => {}
        }
        if c == delimiter && depth == 0 && quotes % 2 == 0 {
            args.push(current.trim().to_string());
            current.clear();
        } else {
            current.push(c);
        }
    }
    args.push(current.trim().to_string());
    args
}

fn split_at_last(body: &str, delimiter: &str) -> Vec<String> {
    let mut depth = 0i32;
    let mut quotes = 0usize;
    let mut found = None;
    for (i, c) in body.char_indices() {
        match c {
            '\'' => quotes += 1,
            '(' if quotes % 2 == 0 => depth += 1,
            ')' if quotes % 2 == 0 => depth -= 1,
            _ => {}
        }
        let outside = depth == 0 && quotes % 2 == 0 && c != '\'';
        if outside
            && body
                .get(i..i + delimiter.len())
                .is_some_and(|s| s.eq_ignore_ascii_case(delimiter))
        {
            found = Some(i);
        }
    }
    match found {
        Some(at) => vec![
            body[..at].trim().to_string(),
            body[at + delimiter.len()..].trim().to_string(),
        ],
        None => vec![body.trim().to_string()],
    }
}

fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, c) in text[open..].char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every `(` has a later matching `)`; parentheses inside string literals are ignored.
pub fn is_parenthesis_balanced(text: &str) -> bool {
    let mut depth = 0i64;
    let mut in_string = false;
    for c in text.chars() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args_respect_quotes_and_nesting() {
        let formula = FunctionFormula::new("DATEADD(day, 1, '2024-01-01 10:00')");
        assert_eq!(formula.name, "DATEADD");
        assert_eq!(formula.args(","), vec!["day", "1", "'2024-01-01 10:00'"]);

        let formula = FunctionFormula::new("COALESCE(f(a, b), 'x,y', (1 + 2))");
        assert_eq!(formula.args(","), vec!["f(a, b)", "'x,y'", "(1 + 2)"]);
    }

    #[test]
    fn test_multi_char_delimiter_splits_at_last() {
        let formula = FunctionFormula::new("CAST(CAST(a AS INT) as VARCHAR(10))");
        assert_eq!(formula.args(" AS "), vec!["CAST(a AS INT)", "VARCHAR(10)"]);

        let formula = FunctionFormula::new("EXTRACT(YEAR FROM d)");
        assert_eq!(formula.args(" FROM "), vec!["YEAR", "d"]);
    }

    #[test]
    fn test_no_parentheses() {
        let formula = FunctionFormula::new("CURRENT_TIMESTAMP");
        assert_eq!(formula.name, "CURRENT_TIMESTAMP");
        assert!(formula.args(",").is_empty());
        assert!(!formula.has_parens());
    }

    #[test]
    fn test_parenthesis_balance() {
        assert!(is_parenthesis_balanced("(a(b)c)"));
        assert!(!is_parenthesis_balanced("(a(b)c"));
        assert!(!is_parenthesis_balanced(")("));
        assert!(is_parenthesis_balanced("f(')')"));
    }
}
