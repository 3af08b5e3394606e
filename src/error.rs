//! Error types for sqlport.

use std::fmt;

use thiserror::Error;

use crate::dialect::DatabaseType;
use crate::model::SqlSyntaxError;

/// Where a per-object failure happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ErrorContext {
    pub source_server: String,
    pub source_database: String,
    pub target_server: String,
    pub target_database: String,
    pub object_name: String,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source {}/{}, target {}/{}, object '{}'",
            self.source_server,
            self.source_database,
            self.target_server,
            self.target_database,
            self.object_name
        )
    }
}

/// The main error type for sqlport operations.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The grammar could not derive a tree for the requested object kind.
    #[error("Syntax error: {0}")]
    SyntaxParse(SqlSyntaxError),

    /// No analyser or generator exists for the requested construct.
    #[error("Unsupported construct: {construct} is not supported by {dialect}")]
    UnsupportedConstruct {
        construct: String,
        dialect: DatabaseType,
    },

    /// A required mapping entry is absent.
    #[error("Mapping lookup failed: no {table} entry for '{key}' in {dialect}")]
    MappingLookup {
        table: &'static str,
        key: String,
        dialect: DatabaseType,
    },

    /// Any failure while translating a single object, with its context.
    #[error("Translation failed ({context}): {source}")]
    Pipeline {
        context: ErrorContext,
        #[source]
        source: Box<TranslateError>,
    },

    /// A mapping document could not be read.
    #[error("Invalid mapping document: {0}")]
    Mapping(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslateError {
    /// Create an unsupported construct error.
    pub fn unsupported(construct: impl Into<String>, dialect: DatabaseType) -> Self {
        Self::UnsupportedConstruct {
            construct: construct.into(),
            dialect,
        }
    }

    /// Create a mapping lookup error.
    pub fn lookup(table: &'static str, key: impl Into<String>, dialect: DatabaseType) -> Self {
        Self::MappingLookup {
            table,
            key: key.into(),
            dialect,
        }
    }

    /// Wrap this error with object context. Already wrapped errors are kept as is.
    pub fn with_context(self, context: ErrorContext) -> Self {
        match self {
            err @ Self::Pipeline { .. } => err,
            err => Self::Pipeline {
                context,
                source: Box::new(err),
            },
        }
    }

    /// The syntax error behind this error, if any.
    pub fn syntax_error(&self) -> Option<&SqlSyntaxError> {
        match self {
            Self::SyntaxParse(err) => Some(err),
            Self::Pipeline { source, .. } => source.syntax_error(),
            _ => None,
        }
    }

    /// The object context attached by the pipeline, if any.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Pipeline { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Errors that make the rest of a batch pointless no matter the policy.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Pipeline { .. } => false,
            Self::UnsupportedConstruct { .. } | Self::Mapping(_) | Self::Io(_) => true,
            Self::SyntaxParse(_) | Self::MappingLookup { .. } => false,
        }
    }
}

/// Result type alias for sqlport operations.
pub type TranslateResult<T> = Result<T, TranslateError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SqlSyntaxErrorItem;

    #[test]
    fn test_error_display() {
        let err = TranslateError::unsupported("procedure", DatabaseType::Sqlite);
        assert_eq!(
            err.to_string(),
            "Unsupported construct: procedure is not supported by sqlite"
        );
    }

    #[test]
    fn test_context_wraps_once() {
        let context = ErrorContext {
            object_name: "usp_orders".to_string(),
            ..Default::default()
        };
        let err = TranslateError::lookup("date unit", "fortnight", DatabaseType::MySql)
            .with_context(context.clone())
            .with_context(ErrorContext::default());

        assert_eq!(err.context(), Some(&context));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_syntax_error_is_found_through_context() {
        let mut syntax = SqlSyntaxError::default();
        syntax.push(SqlSyntaxErrorItem {
            line: 1,
            column: 5,
            start_index: 4,
            stop_index: 6,
            text: "END".to_string(),
            message: "unexpected END".to_string(),
        });
        let err = TranslateError::SyntaxParse(syntax).with_context(ErrorContext::default());

        let found = err.syntax_error().unwrap();
        assert_eq!(found.items().len(), 1);
        assert_eq!(found.items()[0].text, "END");
    }
}
