//! Analysis outcome and syntax error reports.

use std::fmt;

use serde::Serialize;

use super::script::Script;
use crate::error::{TranslateError, TranslateResult};

/// One position-tagged syntax problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlSyntaxErrorItem {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    /// Inclusive offsets into the analysed text.
    pub start_index: usize,
    pub stop_index: usize,
    pub text: String,
    pub message: String,
}

impl fmt::Display for SqlSyntaxErrorItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{} {}", self.line, self.column, self.message)
    }
}

/// Syntax problems in order of occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqlSyntaxError {
    items: Vec<SqlSyntaxErrorItem>,
}

impl SqlSyntaxError {
    pub fn new(item: SqlSyntaxErrorItem) -> Self {
        Self { items: vec![item] }
    }

    pub fn push(&mut self, item: SqlSyntaxErrorItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[SqlSyntaxErrorItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl fmt::Display for SqlSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.items.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", lines.join("; "))
    }
}

/// Either an analysed script or the syntax errors that prevented it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyseResult {
    pub script: Option<Script>,
    pub error: Option<SqlSyntaxError>,
}

impl AnalyseResult {
    pub fn from_script(script: Script) -> Self {
        Self {
            script: Some(script),
            error: None,
        }
    }

    pub fn from_error(error: SqlSyntaxError) -> Self {
        Self {
            script: None,
            error: Some(error),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// The script, or the syntax error as a [`TranslateError`].
    pub fn into_script(self) -> TranslateResult<Script> {
        match (self.script, self.error) {
            (_, Some(error)) if !error.is_empty() => Err(TranslateError::SyntaxParse(error)),
            (Some(script), _) => Ok(script),
            (None, _) => Err(TranslateError::SyntaxParse(SqlSyntaxError::default())),
        }
    }
}
