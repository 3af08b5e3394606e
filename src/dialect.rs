//! Supported SQL dialects and their lexical conventions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

/// Supported database products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    SqlServer,
    MySql,
    Postgres,
    Oracle,
    Sqlite,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 5] = [
        DatabaseType::SqlServer,
        DatabaseType::MySql,
        DatabaseType::Postgres,
        DatabaseType::Oracle,
        DatabaseType::Sqlite,
    ];

    /// Key used by mapping documents.
    pub fn key(&self) -> &'static str {
        match self {
            DatabaseType::SqlServer => "sqlserver",
            DatabaseType::MySql => "mysql",
            DatabaseType::Postgres => "postgres",
            DatabaseType::Oracle => "oracle",
            DatabaseType::Sqlite => "sqlite",
        }
    }

    /// Opening and closing identifier quote characters.
    pub fn quote_chars(&self) -> (char, char) {
        match self {
            DatabaseType::SqlServer => ('[', ']'),
            DatabaseType::MySql => ('`', '`'),
            _ => ('"', '"'),
        }
    }

    /// Quote an identifier (single part, no dots).
    pub fn quote(&self, name: &str) -> String {
        let (open, close) = self.quote_chars();
        let escaped = name.replace(close, &format!("{}{}", close, close));
        format!("{}{}{}", open, escaped, close)
    }

    /// Prefix of local variables and parameters.
    pub fn variable_prefix(&self) -> &'static str {
        match self {
            DatabaseType::SqlServer => "@",
            _ => "",
        }
    }

    /// Schema used when an object is not qualified.
    pub fn default_schema(&self) -> Option<&'static str> {
        match self {
            DatabaseType::SqlServer => Some("dbo"),
            DatabaseType::Postgres => Some("public"),
            _ => None,
        }
    }

    /// Whether object names may carry a schema qualifier.
    pub fn supports_schema(&self) -> bool {
        matches!(
            self,
            DatabaseType::SqlServer | DatabaseType::Postgres | DatabaseType::Oracle
        )
    }

    /// Whether stored procedures and functions exist.
    pub fn supports_routines(&self) -> bool {
        !matches!(self, DatabaseType::Sqlite)
    }
}

impl Default for DatabaseType {
    fn default() -> Self {
        Self::SqlServer
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for DatabaseType {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlserver" | "mssql" | "tsql" => Ok(DatabaseType::SqlServer),
            "mysql" => Ok(DatabaseType::MySql),
            "postgres" | "postgresql" | "pg" => Ok(DatabaseType::Postgres),
            "oracle" => Ok(DatabaseType::Oracle),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            other => Err(TranslateError::unsupported(
                format!("database type '{}'", other),
                DatabaseType::default(),
            )),
        }
    }
}

/// Strip one layer of identifier quotes of any dialect.
pub fn unquote(name: &str) -> &str {
    let bytes = name.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'[' && last == b']')
            || (first == b'"' && last == b'"')
            || (first == b'`' && last == b'`')
        {
            return &name[1..name.len() - 1];
        }
    }
    name
}

/// Whether a name part is wrapped in identifier quotes.
pub fn is_quoted(name: &str) -> bool {
    unquote(name).len() != name.len()
}

/// Split a qualified name on dots that are outside identifier quotes.
pub fn split_qualified(name: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut begin = 0;
    for (i, c) in name.char_indices() {
        match quote {
            Some(close) if c == close => quote = None,
            Some(_) => {}
            None => match c {
                '[' => quote = Some(']'),
                '"' => quote = Some('"'),
                '`' => quote = Some('`'),
                '.' => {
                    parts.push(&name[begin..i]);
                    begin = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(&name[begin..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("MSSQL".parse::<DatabaseType>().unwrap(), DatabaseType::SqlServer);
        assert_eq!("postgresql".parse::<DatabaseType>().unwrap(), DatabaseType::Postgres);
        assert_eq!("sqlite3".parse::<DatabaseType>().unwrap(), DatabaseType::Sqlite);
        assert!("db2".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(DatabaseType::SqlServer.quote("order"), "[order]");
        assert_eq!(DatabaseType::MySql.quote("order"), "`order`");
        assert_eq!(DatabaseType::Oracle.quote("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_split_qualified_respects_quotes() {
        assert_eq!(split_qualified("[dbo].[a.b]"), vec!["[dbo]", "[a.b]"]);
        assert_eq!(split_qualified("s.t.c"), vec!["s", "t", "c"]);
        assert_eq!(unquote("`x`"), "x");
        assert_eq!(unquote("x"), "x");
    }
}
