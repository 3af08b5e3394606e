//! Text clean-up applied before a definition reaches the source analyser.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::dialect::DatabaseType;

static TOP_100_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bTOP\s*(?:\(\s*100\s*\)|100)\s+PERCENT\b\s*").unwrap());

static TRAILING_GO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:\s*\n\s*GO\s*;?)+\s*$").unwrap());

/// Prepare `text` for the `source` analyser.
///
/// `schema` is the owner the object was read from. Quoted qualifiers naming
/// it are removed unless it is also the target owner.
pub fn sanitize<'t>(
    text: &'t str,
    source: DatabaseType,
    target: DatabaseType,
    schema: Option<&str>,
    target_owner: Option<&str>,
) -> Cow<'t, str> {
    let mut text = Cow::Borrowed(text);
    if source == DatabaseType::SqlServer && target != DatabaseType::SqlServer {
        text = replace(text, &TOP_100_PERCENT, "");
    }
    if let Some(schema) = schema.map(str::trim).filter(|s| !s.is_empty()) {
        let same = target_owner.is_some_and(|owner| owner.trim().eq_ignore_ascii_case(schema));
        if !same {
            text = strip_owner(text, schema);
        }
    }
    replace(text, &TRAILING_GO, "")
}

fn replace<'t>(text: Cow<'t, str>, pattern: &Regex, with: &str) -> Cow<'t, str> {
    if !pattern.is_match(&text) {
        return text;
    }
    debug!(pattern = pattern.as_str(), "sanitised definition");
    Cow::Owned(pattern.replace_all(&text, with).into_owned())
}

/// Remove `[schema].`, `"schema".` and `` `schema`. `` qualifiers.
fn strip_owner<'t>(text: Cow<'t, str>, schema: &str) -> Cow<'t, str> {
    let name = regex::escape(schema);
    let pattern = format!(r#"(?i)(?:\[{0}\]|"{0}"|`{0}`)\s*\.\s*"#, name);
    match Regex::new(&pattern) {
        Ok(owner) => replace(text, &owner, ""),
        Err(_) => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_top_100_percent_removed_when_leaving_sql_server() {
        let text = "CREATE VIEW v AS SELECT TOP 100 PERCENT id FROM t ORDER BY id";
        assert_eq!(
            sanitize(text, DatabaseType::SqlServer, DatabaseType::MySql, None, None),
            "CREATE VIEW v AS SELECT id FROM t ORDER BY id"
        );
        assert_eq!(
            sanitize("SELECT TOP (100) PERCENT id FROM t", DatabaseType::SqlServer, DatabaseType::Oracle, None, None),
            "SELECT id FROM t"
        );
        assert_eq!(
            sanitize(text, DatabaseType::SqlServer, DatabaseType::SqlServer, None, None),
            text
        );
    }

    #[test]
    fn test_other_percentages_are_kept() {
        let text = "SELECT TOP 10 PERCENT id FROM t";
        assert_eq!(sanitize(text, DatabaseType::SqlServer, DatabaseType::Oracle, None, None), text);
    }

    #[test]
    fn test_owner_qualifier_stripped() {
        let text = "SELECT a FROM [dbo].[Orders] JOIN \"DBO\".Lines ON 1 = 1";
        assert_eq!(
            sanitize(text, DatabaseType::SqlServer, DatabaseType::Postgres, Some("dbo"), Some("sales")),
            "SELECT a FROM [Orders] JOIN Lines ON 1 = 1"
        );
        assert_eq!(
            sanitize(text, DatabaseType::SqlServer, DatabaseType::Postgres, Some("dbo"), Some("DBO")),
            text
        );
    }

    #[test]
    fn test_trailing_go_dropped() {
        let text = "CREATE PROCEDURE p AS SELECT 1\nGO\n  go  \n";
        assert_eq!(
            sanitize(text, DatabaseType::SqlServer, DatabaseType::MySql, None, None),
            "CREATE PROCEDURE p AS SELECT 1"
        );
        let kept = "SELECT going FROM t";
        assert!(matches!(
            sanitize(kept, DatabaseType::SqlServer, DatabaseType::MySql, None, None),
            Cow::Borrowed(_)
        ));
    }
}
