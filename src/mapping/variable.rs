//! System and trigger row variables.

use std::collections::HashMap;

use serde::Deserialize;

use crate::dialect::DatabaseType;
use crate::error::TranslateResult;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VariableMapping {
    #[serde(default, rename = "variable")]
    rows: Vec<HashMap<DatabaseType, String>>,
}

/// Trigger row variables share the layout of system variables.
pub type TriggerVariableMapping = VariableMapping;

impl VariableMapping {
    pub fn from_toml(document: &str) -> TranslateResult<Self> {
        Ok(toml::from_str(document)?)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn row(&self, dialect: DatabaseType, name: &str) -> Option<&HashMap<DatabaseType, String>> {
        let name = name.trim();
        self.rows
            .iter()
            .find(|row| row.get(&dialect).is_some_and(|v| v.eq_ignore_ascii_case(name)))
    }

    pub fn contains(&self, dialect: DatabaseType, name: &str) -> bool {
        self.row(dialect, name).is_some()
    }

    /// The `target` spelling of a `source` variable; `None` when either side
    /// has no entry.
    pub fn translate(&self, name: &str, source: DatabaseType, target: DatabaseType) -> Option<&str> {
        self.row(source, name)?.get(&target).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_system_variables() {
        let m = VariableMapping::from_toml(include_str!("../../config/variables.toml")).unwrap();
        assert_eq!(
            m.translate("@@rowcount", DatabaseType::SqlServer, DatabaseType::Oracle),
            Some("SQL%ROWCOUNT")
        );
        assert_eq!(
            m.translate("ROW_COUNT()", DatabaseType::MySql, DatabaseType::SqlServer),
            Some("@@ROWCOUNT")
        );
        assert_eq!(m.translate("@@IDENTITY", DatabaseType::SqlServer, DatabaseType::Oracle), None);
        assert!(!m.contains(DatabaseType::SqlServer, "@total"));
    }

    #[test]
    fn test_trigger_rows() {
        let m = TriggerVariableMapping::from_toml(include_str!("../../config/trigger_variables.toml")).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.translate("inserted", DatabaseType::SqlServer, DatabaseType::Oracle), Some(":NEW"));
        assert_eq!(m.translate(":OLD", DatabaseType::Oracle, DatabaseType::Postgres), Some("OLD"));
    }
}
