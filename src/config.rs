//! `sqlport.toml` configuration.
//!
//! ```toml
//! [translate]
//! owner = "sales"
//! continue_on_error = true
//! source = { server = "mssql01", database = "Shop" }
//! target = { server = "pg01", database = "shop" }
//!
//! [names.tables]
//! "dbo.Orders" = "orders"
//!
//! [names.columns]
//! OrderDate = "ordered_at"
//!
//! [mappings]
//! functions = "mappings/functions.toml"
//! ```
//!
//! The file is looked up in the working directory first, then in
//! `<config dir>/sqlport/config.toml`. Mapping paths are relative to the file.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::TranslateResult;
use crate::mapping::{MappingDocuments, NameMapping, TranslationContext};
use crate::pipeline::{ErrorPolicy, ServerLabel, TranslateOptions};

pub const CONFIG_FILE: &str = "sqlport.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub translate: TranslateSection,
    #[serde(default)]
    pub names: NameMapping,
    #[serde(default)]
    pub mappings: MappingPaths,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslateSection {
    pub owner: Option<String>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub source: ServerLabel,
    #[serde(default)]
    pub target: ServerLabel,
    /// Worker threads for batches; `0` uses every core.
    pub threads: Option<usize>,
}

/// Replacement mapping documents. Unset tables use the bundled ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingPaths {
    pub data_types: Option<PathBuf>,
    pub date_units: Option<PathBuf>,
    pub functions: Option<PathBuf>,
    pub variables: Option<PathBuf>,
    pub trigger_variables: Option<PathBuf>,
}

impl MappingPaths {
    pub fn is_empty(&self) -> bool {
        self.data_types.is_none()
            && self.date_units.is_none()
            && self.functions.is_none()
            && self.variables.is_none()
            && self.trigger_variables.is_none()
    }
}

impl Config {
    pub fn from_toml(text: &str) -> TranslateResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> TranslateResult<Self> {
        let text = fs::read_to_string(path)?;
        debug!(path = %path.display(), "configuration loaded");
        Self::from_toml(&text)
    }

    /// `sqlport.toml` in the working directory, else the user configuration file.
    pub fn discover() -> TranslateResult<Option<(PathBuf, Self)>> {
        let local = PathBuf::from(CONFIG_FILE);
        let candidates = std::iter::once(local).chain(Self::user_path());
        for path in candidates {
            if path.is_file() {
                let config = Self::load(&path)?;
                return Ok(Some((path, config)));
            }
        }
        Ok(None)
    }

    pub fn user_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlport").join("config.toml"))
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        if self.translate.continue_on_error {
            ErrorPolicy::SkipAndReport
        } else {
            ErrorPolicy::FailFast
        }
    }

    pub fn options(&self) -> TranslateOptions {
        TranslateOptions {
            target_owner: self.translate.owner.clone(),
            name_mapping: self.names.clone(),
            error_policy: self.error_policy(),
            source_label: self.translate.source.clone(),
            target_label: self.translate.target.clone(),
        }
    }

    /// Bundled documents with the configured ones swapped in. `base` is the
    /// directory relative paths start from.
    pub fn mapping_documents(&self, base: &Path) -> TranslateResult<MappingDocuments> {
        let read = |path: &Option<PathBuf>, bundled: Cow<'static, str>| -> TranslateResult<Cow<'static, str>> {
            match path {
                Some(path) => {
                    let path = base.join(path);
                    debug!(path = %path.display(), "reading mapping document");
                    Ok(Cow::Owned(fs::read_to_string(path)?))
                }
                None => Ok(bundled),
            }
        };
        let bundled = MappingDocuments::default();
        Ok(MappingDocuments {
            data_types: read(&self.mappings.data_types, bundled.data_types)?,
            date_units: read(&self.mappings.date_units, bundled.date_units)?,
            functions: read(&self.mappings.functions, bundled.functions)?,
            variables: read(&self.mappings.variables, bundled.variables)?,
            trigger_variables: read(&self.mappings.trigger_variables, bundled.trigger_variables)?,
        })
    }

    /// A context for the configured documents, `None` when the bundled tables apply.
    pub fn translation_context(&self, base: &Path) -> TranslateResult<Option<TranslationContext>> {
        if self.mappings.is_empty() {
            return Ok(None);
        }
        let documents = self.mapping_documents(base)?;
        TranslationContext::from_documents(&documents).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranslateError;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[translate]
owner = "sales"
continue_on_error = true
source = { server = "mssql01", database = "Shop" }

[names.tables]
"dbo.Orders" = "orders"

[mappings]
functions = "config/functions.toml"
"#;

    #[test]
    fn test_options_from_file() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let options = config.options();

        assert_eq!(options.target_owner.as_deref(), Some("sales"));
        assert_eq!(options.error_policy, ErrorPolicy::SkipAndReport);
        assert_eq!(options.source_label.server, "mssql01");
        assert_eq!(options.target_label, ServerLabel::default());
        assert_eq!(options.name_mapping.table("[dbo].[Orders]"), Some("orders"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.error_policy(), ErrorPolicy::FailFast);
        assert!(config.mappings.is_empty());
        assert!(config.translation_context(Path::new(".")).unwrap().is_none());
    }

    #[test]
    fn test_mapping_paths_resolve_against_base() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let base = Path::new(env!("CARGO_MANIFEST_DIR"));
        let documents = config.mapping_documents(base).unwrap();
        assert!(matches!(documents.functions, Cow::Owned(_)));
        assert!(matches!(documents.data_types, Cow::Borrowed(_)));
        assert!(config.translation_context(base).unwrap().is_some());
    }

    #[test]
    fn test_invalid_file_is_a_mapping_error() {
        let err = Config::from_toml("[translate\nowner = 1").unwrap_err();
        assert!(matches!(err, TranslateError::Mapping(_)));
    }
}
