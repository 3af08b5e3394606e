//! Data type equivalence between dialects.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::dialect::DatabaseType;
use crate::error::{TranslateError, TranslateResult};

/// One type of one dialect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataTypeSpecification {
    pub name: String,
    /// Dialect-neutral name shared by equivalent types.
    pub standard: String,
    /// `length` or `precision,scale` when the type takes arguments.
    #[serde(default)]
    pub args: Option<String>,
    /// Accepted range of the first argument.
    #[serde(default)]
    pub range: Option<(u64, u64)>,
    /// Type used when the argument exceeds the range.
    #[serde(default)]
    pub overflow: Option<String>,
    #[serde(default)]
    pub default: bool,
}

/// Source type expression replaced as a whole for one dialect pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpecialDataType {
    pub source: DatabaseType,
    pub target: DatabaseType,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataTypeMapping {
    #[serde(default)]
    generic: HashMap<DatabaseType, String>,
    #[serde(default)]
    types: HashMap<DatabaseType, Vec<DataTypeSpecification>>,
    #[serde(default)]
    special: Vec<SpecialDataType>,
}

/// A type expression split into its parts: `TIMESTAMP(3) WITH TIME ZONE`
/// has base `TIMESTAMP WITH TIME ZONE` and args `["3"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TypeExpression {
    base: String,
    args: Vec<String>,
}

impl TypeExpression {
    fn parse(text: &str) -> Self {
        let (base, args) = match (text.find('('), text.rfind(')')) {
            (Some(open), Some(close)) if close > open => {
                let base = format!("{} {}", &text[..open], &text[close + 1..]);
                let args = text[open + 1..close]
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
                (base, args)
            }
            _ => (text.to_string(), Vec::new()),
        };
        Self {
            base: base.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase(),
            args,
        }
    }

    /// Upper case text without blanks, used to match special entries and named types.
    fn compact(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase()
    }
}

impl DataTypeMapping {
    pub fn from_toml(document: &str) -> TranslateResult<Self> {
        Ok(toml::from_str(document)?)
    }

    pub fn specifications(&self, dialect: DatabaseType) -> &[DataTypeSpecification] {
        self.types.get(&dialect).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fallback type for names no table knows.
    pub fn generic(&self, dialect: DatabaseType) -> &str {
        self.generic.get(&dialect).map(String::as_str).unwrap_or("VARCHAR(255)")
    }

    /// The source entry describing `text`.
    pub fn find(&self, dialect: DatabaseType, text: &str) -> Option<&DataTypeSpecification> {
        let specs = self.specifications(dialect);
        let compact = TypeExpression::compact(text);
        if let Some(spec) = specs.iter().find(|s| s.name.contains('(') && TypeExpression::compact(&s.name) == compact) {
            return Some(spec);
        }
        let expression = TypeExpression::parse(text);
        let by_name = |name: &str| {
            specs
                .iter()
                .find(|s| !s.name.contains('(') && s.name.eq_ignore_ascii_case(name))
        };
        by_name(&expression.base).or_else(|| {
            let first_word = expression.base.split(' ').next()?;
            by_name(first_word)
        })
    }

    fn target(&self, dialect: DatabaseType, standard: &str) -> Option<&DataTypeSpecification> {
        let mut matching = self
            .specifications(dialect)
            .iter()
            .filter(|s| s.standard.eq_ignore_ascii_case(standard))
            .peekable();
        let first = *matching.peek()?;
        Some(matching.find(|s| s.default).unwrap_or(first))
    }

    /// Translate a type expression from `source` to `target`.
    pub fn translate(&self, text: &str, source: DatabaseType, target: DatabaseType) -> TranslateResult<String> {
        let trimmed = text.trim();
        let upper = trimmed.to_uppercase();
        if source == target || upper.ends_with("%TYPE") || upper.ends_with("%ROWTYPE") {
            return Ok(trimmed.to_string());
        }
        let compact = TypeExpression::compact(trimmed);
        if let Some(special) = self
            .special
            .iter()
            .find(|s| s.source == source && s.target == target && TypeExpression::compact(&s.from) == compact)
        {
            return Ok(special.to.clone());
        }
        let Some(spec) = self.find(source, trimmed) else {
            debug!(%source, %target, data_type = trimmed, "unknown data type, using generic type");
            return Ok(self.generic(target).to_string());
        };
        let Some(target_spec) = self.target(target, &spec.standard) else {
            return Err(TranslateError::lookup("data type", spec.standard.clone(), target));
        };

        let expression = TypeExpression::parse(trimmed);
        if spec.name.contains('(') || target_spec.args.is_none() || expression.args.is_empty() {
            return Ok(target_spec.name.clone());
        }
        let first = &expression.args[0];
        let value = if first.eq_ignore_ascii_case("MAX") {
            None
        } else {
            first.parse::<u64>().ok()
        };
        let (min, max) = target_spec.range.unwrap_or((0, u64::MAX));
        match value {
            Some(v) if v >= min && v <= max => {
                Ok(format!("{}({})", target_spec.name, expression.args.join(",")))
            }
            _ if target_spec.overflow.is_some() => Ok(target_spec.overflow.clone().unwrap_or_default()),
            Some(v) => {
                let clamped = if v > max { max } else { min };
                warn!(
                    %target,
                    data_type = trimmed,
                    from = v,
                    to = clamped,
                    "type argument outside the target range, clamped"
                );
                let mut args = expression.args.clone();
                args[0] = clamped.to_string();
                Ok(format!("{}({})", target_spec.name, args.join(",")))
            }
            None => {
                warn!(%target, data_type = trimmed, "MAX argument without overflow type, using maximum");
                Ok(format!("{}({})", target_spec.name, max))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapping() -> DataTypeMapping {
        DataTypeMapping::from_toml(include_str!("../../config/data_types.toml")).unwrap()
    }

    #[test]
    fn test_translate_with_arguments() {
        let m = mapping();
        assert_eq!(m.translate("NVARCHAR(50)", DatabaseType::SqlServer, DatabaseType::Postgres).unwrap(), "VARCHAR(50)");
        assert_eq!(m.translate("decimal(18, 2)", DatabaseType::SqlServer, DatabaseType::Oracle).unwrap(), "NUMBER(18,2)");
        assert_eq!(m.translate("INT", DatabaseType::SqlServer, DatabaseType::MySql).unwrap(), "INT");
        assert_eq!(m.translate("VARCHAR2(100)", DatabaseType::Oracle, DatabaseType::SqlServer).unwrap(), "VARCHAR(100)");
    }

    #[test]
    fn test_overflow_and_max() {
        let m = mapping();
        assert_eq!(m.translate("VARCHAR(MAX)", DatabaseType::SqlServer, DatabaseType::Postgres).unwrap(), "TEXT");
        assert_eq!(m.translate("VARCHAR(5000)", DatabaseType::SqlServer, DatabaseType::Oracle).unwrap(), "CLOB");
        assert_eq!(m.translate("VARCHAR(65535)", DatabaseType::MySql, DatabaseType::SqlServer).unwrap(), "VARCHAR(MAX)");
    }

    #[test]
    fn test_clamp_without_overflow() {
        let m = mapping();
        assert_eq!(m.translate("NUMERIC(50,4)", DatabaseType::Postgres, DatabaseType::SqlServer).unwrap(), "DECIMAL(38,4)");
    }

    #[test]
    fn test_special_and_named_types() {
        let m = mapping();
        assert_eq!(m.translate("NUMBER(1)", DatabaseType::Oracle, DatabaseType::SqlServer).unwrap(), "BIT");
        assert_eq!(m.translate("BIT", DatabaseType::SqlServer, DatabaseType::MySql).unwrap(), "TINYINT(1)");
        assert_eq!(m.translate("NUMBER(10)", DatabaseType::Oracle, DatabaseType::Postgres).unwrap(), "INTEGER");
        assert_eq!(
            m.translate("TIMESTAMP(3) WITH TIME ZONE", DatabaseType::Postgres, DatabaseType::SqlServer).unwrap(),
            "DATETIMEOFFSET"
        );
    }

    #[test]
    fn test_unknown_type_falls_back_to_generic() {
        let m = mapping();
        assert_eq!(m.translate("GEOGRAPHY", DatabaseType::SqlServer, DatabaseType::MySql).unwrap(), "VARCHAR(255)");
        assert_eq!(m.translate("v_row%ROWTYPE", DatabaseType::Oracle, DatabaseType::Postgres).unwrap(), "v_row%ROWTYPE");
    }
}
