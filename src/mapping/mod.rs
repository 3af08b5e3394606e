//! Mapping tables: the vocabulary shared by every translation.
//!
//! A [`TranslationContext`] bundles the data type, date unit, function and
//! variable tables. The bundled tables are parsed once per process by
//! [`TranslationContext::builtin`]; [`TranslationContext::from_documents`]
//! builds a context from replacement TOML documents. A context is never
//! mutated after construction and is shared by reference across threads.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;
use tracing::debug;

use crate::dialect::{split_qualified, unquote};
use crate::error::TranslateResult;

pub mod data_type;
pub mod date_unit;
pub mod function;
pub mod variable;

pub use data_type::{DataTypeMapping, DataTypeSpecification, SpecialDataType};
pub use date_unit::{DateUnit, DateUnitMapping};
pub use function::{FunctionMapping, FunctionRow, FunctionSpecification, SpecificTranslator};
pub use variable::{TriggerVariableMapping, VariableMapping};

/// Source text of each mapping table, as TOML.
#[derive(Debug, Clone)]
pub struct MappingDocuments {
    pub data_types: Cow<'static, str>,
    pub date_units: Cow<'static, str>,
    pub functions: Cow<'static, str>,
    pub variables: Cow<'static, str>,
    pub trigger_variables: Cow<'static, str>,
}

impl Default for MappingDocuments {
    fn default() -> Self {
        Self {
            data_types: Cow::Borrowed(include_str!("../../config/data_types.toml")),
            date_units: Cow::Borrowed(include_str!("../../config/date_units.toml")),
            functions: Cow::Borrowed(include_str!("../../config/functions.toml")),
            variables: Cow::Borrowed(include_str!("../../config/variables.toml")),
            trigger_variables: Cow::Borrowed(include_str!("../../config/trigger_variables.toml")),
        }
    }
}

/// Every mapping table used by one translation.
#[derive(Debug, Clone)]
pub struct TranslationContext {
    pub data_types: DataTypeMapping,
    pub date_units: DateUnitMapping,
    pub functions: FunctionMapping,
    pub variables: VariableMapping,
    pub trigger_variables: TriggerVariableMapping,
}

static BUILTIN: Lazy<TranslationContext> = Lazy::new(|| {
    TranslationContext::from_documents(&MappingDocuments::default())
        .expect("bundled mapping documents are valid TOML")
});

impl TranslationContext {
    /// The context built from the bundled tables, initialised on first use.
    pub fn builtin() -> &'static TranslationContext {
        &BUILTIN
    }

    pub fn from_documents(documents: &MappingDocuments) -> TranslateResult<Self> {
        let context = Self {
            data_types: DataTypeMapping::from_toml(&documents.data_types)?,
            date_units: DateUnitMapping::from_toml(&documents.date_units)?,
            functions: FunctionMapping::from_toml(&documents.functions)?,
            variables: VariableMapping::from_toml(&documents.variables)?,
            trigger_variables: TriggerVariableMapping::from_toml(&documents.trigger_variables)?,
        };
        debug!(
            functions = context.functions.rows().len(),
            date_units = context.date_units.units().len(),
            variables = context.variables.len(),
            "mapping tables loaded"
        );
        Ok(context)
    }
}

/// Caller supplied renames of tables and columns.
///
/// Keys match ignoring case and identifier quotes, either qualified
/// (`dbo.Orders`) or bare (`Orders`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct NameMapping {
    #[serde(default)]
    pub tables: HashMap<String, String>,
    #[serde(default)]
    pub columns: HashMap<String, String>,
}

fn normalize(name: &str) -> String {
    split_qualified(name.trim())
        .into_iter()
        .map(|part| unquote(part).to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}

fn lookup<'a>(map: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    if map.is_empty() {
        return None;
    }
    let wanted = normalize(name);
    let bare = wanted.rsplit('.').next().unwrap_or(&wanted).to_string();
    map.iter()
        .find(|(k, _)| normalize(k) == wanted)
        .or_else(|| map.iter().find(|(k, _)| normalize(k) == bare))
        .map(|(_, v)| v.as_str())
}

impl NameMapping {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&str> {
        lookup(&self.tables, name)
    }

    pub fn column(&self, name: &str) -> Option<&str> {
        lookup(&self.columns, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DatabaseType;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_is_shared() {
        let a = TranslationContext::builtin();
        let b = TranslationContext::builtin();
        assert!(std::ptr::eq(a, b));
        assert!(a.functions.find(DatabaseType::SqlServer, "DATEADD").is_some());
    }

    #[test]
    fn test_replacement_documents() {
        let documents = MappingDocuments {
            variables: Cow::Owned("[[variable]]\nsqlserver = \"@@ROWCOUNT\"\nmysql = \"FOUND_ROWS()\"\n".to_string()),
            ..Default::default()
        };
        let context = TranslationContext::from_documents(&documents).unwrap();
        assert_eq!(
            context.variables.translate("@@ROWCOUNT", DatabaseType::SqlServer, DatabaseType::MySql),
            Some("FOUND_ROWS()")
        );

        let broken = MappingDocuments {
            functions: Cow::Borrowed("[[function]\n"),
            ..Default::default()
        };
        assert!(TranslationContext::from_documents(&broken).is_err());
    }

    #[test]
    fn test_name_mapping_lookup() {
        let mut names = NameMapping::default();
        names.tables.insert("dbo.Orders".to_string(), "orders".to_string());
        names.tables.insert("Customer".to_string(), "customers".to_string());
        names.columns.insert("OrderID".to_string(), "order_id".to_string());

        assert_eq!(names.table("[dbo].[ORDERS]"), Some("orders"));
        assert_eq!(names.table("sales.customer"), Some("customers"));
        assert_eq!(names.column("o.orderid"), Some("order_id"));
        assert_eq!(names.table("Orders"), None);
    }
}
