//! # sqlport: SQL routine translation between dialects
//!
//! sqlport converts procedures, functions, views and triggers written for one
//! database product into equivalent definitions for another.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use sqlport::prelude::*;
//!
//! let sql = sqlport::translate(
//!     "SELECT DATEADD(day, 1, OrderDate) FROM Orders",
//!     DatabaseType::SqlServer,
//!     DatabaseType::MySql,
//!     ObjectKind::Common,
//! )?;
//! // => "SELECT DATE_ADD(OrderDate,INTERVAL 1 day) FROM Orders;"
//! ```
//!
//! ## Stages
//!
//! | Stage      | Module        | Function                                   |
//! |------------|---------------|--------------------------------------------|
//! | Analyse    | [`analyser`]  | text → [`model::Script`] per source dialect |
//! | Translate  | [`translate`] | rewrite tokens through [`mapping`] tables  |
//! | Build      | [`build`]     | script → text per target dialect           |
//! | Orchestrate| [`pipeline`]  | sanitise, fall back, batch, feedback       |

pub mod analyser;
pub mod build;
pub mod config;
pub mod dialect;
pub mod error;
pub mod formula;
pub mod mapping;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod translate;

pub mod prelude {
    pub use crate::analyser::{RuleAnalyser, for_dialect};
    pub use crate::build::{ScriptBuildResult, ScriptBuilder};
    pub use crate::dialect::DatabaseType;
    pub use crate::error::*;
    pub use crate::formula::{FunctionFormula, is_parenthesis_balanced};
    pub use crate::mapping::{NameMapping, TranslationContext};
    pub use crate::model::{AnalyseResult, ObjectKind, Script, SqlSyntaxError, SqlSyntaxErrorItem};
    pub use crate::pipeline::{
        BatchFailure, BatchResult, CollectingFeedback, ErrorPolicy, Fallback, FeedbackInfo, FeedbackObserver,
        InfoType, ScriptObject, ScriptTranslator, ServerLabel, TracingFeedback, TranslateOptions,
        TranslatedScript,
    };
}

/// Translate one definition with the bundled mapping tables and default options.
///
/// # Example
///
/// ```
/// use sqlport::dialect::DatabaseType;
/// use sqlport::model::ObjectKind;
///
/// let same = sqlport::translate("SELECT 1", DatabaseType::Oracle, DatabaseType::Oracle, ObjectKind::Common).unwrap();
/// assert_eq!(same, "SELECT 1");
/// ```
pub fn translate(
    definition: &str,
    source: dialect::DatabaseType,
    target: dialect::DatabaseType,
    kind: model::ObjectKind,
) -> error::TranslateResult<String> {
    let translator = pipeline::ScriptTranslator::new(
        mapping::TranslationContext::builtin(),
        source,
        target,
        pipeline::TranslateOptions::default(),
    );
    let object = pipeline::ScriptObject::new("", kind, definition);
    translator.translate(&object).map(|t| t.definition)
}
