//! Date part names per dialect.

use std::collections::HashMap;

use serde::Deserialize;

use crate::dialect::DatabaseType;
use crate::error::{TranslateError, TranslateResult};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DateUnit {
    pub name: String,
    /// Usable in interval arithmetic.
    #[serde(default)]
    pub formal: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    /// SQLite `strftime` format extracting this part.
    #[serde(default)]
    pub strftime: Option<String>,
    #[serde(flatten)]
    pub spellings: HashMap<DatabaseType, Vec<String>>,
}

impl DateUnit {
    pub fn spellings(&self, dialect: DatabaseType) -> &[String] {
        self.spellings.get(&dialect).map(Vec::as_slice).unwrap_or(&[])
    }

    /// How `dialect` writes this unit. Unless the unit is case sensitive, a
    /// spelling matching `written` ignoring case keeps the text as written.
    pub fn spelling(&self, dialect: DatabaseType, written: &str) -> Option<String> {
        let spellings = self.spellings(dialect);
        let written = written.trim().trim_matches('\'');
        if !self.case_sensitive && spellings.iter().any(|s| s.eq_ignore_ascii_case(written)) {
            return Some(written.to_string());
        }
        spellings.first().cloned()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateUnitMapping {
    #[serde(default, rename = "unit")]
    units: Vec<DateUnit>,
}

impl DateUnitMapping {
    pub fn from_toml(document: &str) -> TranslateResult<Self> {
        Ok(toml::from_str(document)?)
    }

    pub fn units(&self) -> &[DateUnit] {
        &self.units
    }

    /// The unit `written` in `dialect`; quotes around the name are ignored.
    pub fn find(&self, dialect: DatabaseType, written: &str) -> Option<&DateUnit> {
        let written = written.trim().trim_matches('\'');
        self.units
            .iter()
            .find(|u| u.spellings(dialect).iter().any(|s| s.eq_ignore_ascii_case(written)))
    }

    pub fn by_name(&self, name: &str) -> Option<&DateUnit> {
        self.units.iter().find(|u| u.name.eq_ignore_ascii_case(name))
    }

    /// Rewrite a unit from `source` to `target` spelling.
    pub fn translate(&self, written: &str, source: DatabaseType, target: DatabaseType) -> TranslateResult<String> {
        let unit = self
            .find(source, written)
            .ok_or_else(|| TranslateError::lookup("date unit", written.trim(), source))?;
        unit.spelling(target, written)
            .ok_or_else(|| TranslateError::lookup("date unit", unit.name.clone(), target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapping() -> DateUnitMapping {
        DateUnitMapping::from_toml(include_str!("../../config/date_units.toml")).unwrap()
    }

    #[test]
    fn test_abbreviations_resolve() {
        let m = mapping();
        assert_eq!(m.find(DatabaseType::SqlServer, "dd").unwrap().name, "day");
        assert_eq!(m.find(DatabaseType::SqlServer, "MI").unwrap().name, "minute");
        assert_eq!(m.find(DatabaseType::Postgres, "'year'").unwrap().name, "year");
    }

    #[test]
    fn test_spelling_keeps_source_case() {
        let m = mapping();
        assert_eq!(m.translate("day", DatabaseType::SqlServer, DatabaseType::MySql).unwrap(), "day");
        assert_eq!(m.translate("dd", DatabaseType::SqlServer, DatabaseType::MySql).unwrap(), "DAY");
        assert_eq!(m.translate("m", DatabaseType::SqlServer, DatabaseType::Oracle).unwrap(), "MONTH");
    }

    #[test]
    fn test_missing_unit_is_an_error() {
        let m = mapping();
        let err = m.translate("fortnight", DatabaseType::SqlServer, DatabaseType::MySql).unwrap_err();
        assert!(matches!(err, TranslateError::MappingLookup { table: "date unit", .. }));
        let err = m.translate("ms", DatabaseType::SqlServer, DatabaseType::MySql).unwrap_err();
        assert!(matches!(err, TranslateError::MappingLookup { dialect: DatabaseType::MySql, .. }));
    }
}
