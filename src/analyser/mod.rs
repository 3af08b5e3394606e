//! Rule analysers: one per source dialect, turning definition text into a [`Script`].

use tracing::debug;

use crate::dialect::DatabaseType;
use crate::error::{TranslateError, TranslateResult};
use crate::model::{AnalyseResult, ObjectKind, Script, SqlSyntaxError};
use crate::parser;

/// Converts definition text of one dialect into the syntax tree.
pub trait RuleAnalyser: Send + Sync {
    fn dialect(&self) -> DatabaseType;

    /// Pure syntax check; no tree is kept.
    fn validate(&self, text: &str) -> Option<SqlSyntaxError> {
        let kind = parser::detect_kind(text, self.dialect());
        parser::parse(text, self.dialect(), kind).err()
    }

    /// Analyse `text` as an object of `kind`.
    fn analyse(&self, kind: ObjectKind, text: &str) -> TranslateResult<AnalyseResult> {
        debug!(dialect = %self.dialect(), %kind, "analysing definition");
        match kind {
            ObjectKind::Common => self.analyse_common(text),
            ObjectKind::View => self.analyse_view(text),
            ObjectKind::Procedure => self.analyse_procedure(text),
            ObjectKind::Function => self.analyse_function(text),
            ObjectKind::Trigger => self.analyse_trigger(text),
        }
    }

    fn analyse_common(&self, text: &str) -> TranslateResult<AnalyseResult> {
        Ok(run(text, self.dialect(), ObjectKind::Common))
    }

    fn analyse_view(&self, text: &str) -> TranslateResult<AnalyseResult> {
        Ok(run(text, self.dialect(), ObjectKind::View))
    }

    fn analyse_procedure(&self, text: &str) -> TranslateResult<AnalyseResult> {
        Ok(run(text, self.dialect(), ObjectKind::Procedure))
    }

    fn analyse_function(&self, text: &str) -> TranslateResult<AnalyseResult> {
        Ok(run(text, self.dialect(), ObjectKind::Function))
    }

    fn analyse_trigger(&self, text: &str) -> TranslateResult<AnalyseResult> {
        Ok(run(text, self.dialect(), ObjectKind::Trigger))
    }
}

fn run(text: &str, dialect: DatabaseType, kind: ObjectKind) -> AnalyseResult {
    match parser::parse(text, dialect, kind) {
        Ok(script) => AnalyseResult::from_script(script),
        Err(error) => {
            debug!(%dialect, %kind, %error, "syntax error");
            AnalyseResult::from_error(error)
        }
    }
}

pub struct SqlServerAnalyser;

impl RuleAnalyser for SqlServerAnalyser {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }
}

pub struct MySqlAnalyser;

impl RuleAnalyser for MySqlAnalyser {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::MySql
    }
}

pub struct PostgresAnalyser;

impl RuleAnalyser for PostgresAnalyser {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Postgres
    }
}

pub struct OracleAnalyser;

impl RuleAnalyser for OracleAnalyser {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Oracle
    }
}

/// SQLite has no procedure or function rule.
pub struct SqliteAnalyser;

impl RuleAnalyser for SqliteAnalyser {
    fn dialect(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn analyse_procedure(&self, _text: &str) -> TranslateResult<AnalyseResult> {
        Err(TranslateError::unsupported("procedure", DatabaseType::Sqlite))
    }

    fn analyse_function(&self, _text: &str) -> TranslateResult<AnalyseResult> {
        Err(TranslateError::unsupported("function", DatabaseType::Sqlite))
    }
}

/// The analyser of a source dialect.
pub fn for_dialect(dialect: DatabaseType) -> &'static dyn RuleAnalyser {
    match dialect {
        DatabaseType::SqlServer => &SqlServerAnalyser,
        DatabaseType::MySql => &MySqlAnalyser,
        DatabaseType::Postgres => &PostgresAnalyser,
        DatabaseType::Oracle => &OracleAnalyser,
        DatabaseType::Sqlite => &SqliteAnalyser,
    }
}

/// Whether an analyser exists for `kind` in `dialect`.
pub fn supports(dialect: DatabaseType, kind: ObjectKind) -> bool {
    dialect.supports_routines() || !matches!(kind, ObjectKind::Procedure | ObjectKind::Function)
}

/// Analyse and unwrap the script.
pub fn analyse_script(dialect: DatabaseType, kind: ObjectKind, text: &str) -> TranslateResult<Script> {
    for_dialect(dialect).analyse(kind, text)?.into_script()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_position() {
        let err = for_dialect(DatabaseType::MySql)
            .validate("CREATE PROCEDURE p()\nBEGIN\n  SELECT FROM;\nEND")
            .unwrap();
        let item = &err.items()[0];
        assert_eq!(item.line, 3);
        assert!(item.column > 1);
    }

    #[test]
    fn test_validate_accepts_valid_text() {
        let analyser = for_dialect(DatabaseType::SqlServer);
        assert!(analyser.validate("CREATE VIEW v AS SELECT a FROM t").is_none());
    }

    #[test]
    fn test_sqlite_rejects_routines() {
        let err = for_dialect(DatabaseType::Sqlite)
            .analyse(ObjectKind::Procedure, "CREATE PROCEDURE p AS SELECT 1")
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
        assert!(!supports(DatabaseType::Sqlite, ObjectKind::Function));
        assert!(supports(DatabaseType::Sqlite, ObjectKind::Trigger));
    }

    #[test]
    fn test_analyse_result_carries_error() {
        let result = for_dialect(DatabaseType::Postgres)
            .analyse(ObjectKind::View, "CREATE VIEW v AS")
            .unwrap();
        assert!(result.has_error());
        assert!(result.script.is_none());
    }

    #[test]
    fn test_analyse_common() {
        let result = for_dialect(DatabaseType::Oracle)
            .analyse(ObjectKind::Common, "UPDATE t SET a = 1 WHERE b = 2;")
            .unwrap();
        assert!(!result.has_error());
        assert_eq!(result.script.unwrap().statements().len(), 1);
    }
}
