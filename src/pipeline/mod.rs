//! Script translation pipeline.
//!
//! [`ScriptTranslator`] drives one object through
//! sanitise → analyse → token translation → build → replacements, falls back
//! to an alternate strategy when the source grammar rejects a definition, and
//! attaches server, database and object context to every failure.
//!
//! Batches run the same steps per object under an [`ErrorPolicy`] and report
//! progress through a [`FeedbackObserver`].

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyser;
use crate::build::{self, ScriptBuildResult};
use crate::dialect::DatabaseType;
use crate::error::{ErrorContext, TranslateError, TranslateResult};
use crate::mapping::{NameMapping, TranslationContext};
use crate::model::{ObjectKind, Token, TokenKind};
use crate::translate::TokenTranslator;

pub mod fallback;
pub mod feedback;
pub mod sanitize;

pub use fallback::{Fallback, FallbackStrategy};
pub use feedback::{CollectingFeedback, FeedbackInfo, FeedbackObserver, InfoType, TracingFeedback};

/// What a batch does when one object fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop at the first failure and return it.
    #[default]
    FailFast,
    /// Record the failure, notify the feedback observer and continue.
    SkipAndReport,
}

/// Server and database names used in error context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLabel {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub database: String,
}

#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    /// Schema that replaces source qualifiers in the output.
    pub target_owner: Option<String>,
    pub name_mapping: NameMapping,
    pub error_policy: ErrorPolicy,
    pub source_label: ServerLabel,
    pub target_label: ServerLabel,
}

/// A definition to translate, as read from the source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptObject {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub kind: ObjectKind,
    pub definition: String,
}

impl ScriptObject {
    pub fn new(name: impl Into<String>, kind: ObjectKind, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            kind,
            definition: definition.into(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// `schema.name`, or the bare name.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) if !schema.is_empty() => format!("{}.{}", schema, self.name),
            _ => self.name.clone(),
        }
    }
}

/// Target text of one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedScript {
    pub name: String,
    pub kind: ObjectKind,
    pub definition: String,
    /// Byte offsets of the body inside `definition`.
    pub body_start_index: usize,
    pub body_stop_index: usize,
    /// Set when a fallback strategy produced the text.
    pub fallback: Option<Fallback>,
}

impl TranslatedScript {
    fn unchanged(object: &ScriptObject) -> Self {
        Self {
            name: object.name.clone(),
            kind: object.kind,
            definition: object.definition.clone(),
            body_start_index: 0,
            body_stop_index: object.definition.len(),
            fallback: None,
        }
    }

    fn built(object: &ScriptObject, result: ScriptBuildResult) -> Self {
        Self {
            name: object.name.clone(),
            kind: object.kind,
            definition: result.text,
            body_start_index: result.body_start_index,
            body_stop_index: result.body_stop_index,
            fallback: None,
        }
    }

    pub fn body(&self) -> &str {
        self.definition
            .get(self.body_start_index..self.body_stop_index)
            .unwrap_or_default()
    }
}

/// An object a batch skipped.
#[derive(Debug)]
pub struct BatchFailure {
    pub name: String,
    pub kind: ObjectKind,
    pub error: TranslateError,
}

/// Outcome of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub translated: Vec<TranslatedScript>,
    pub failures: Vec<BatchFailure>,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Translates objects from one dialect to another.
///
/// The translator holds no per-object state; one instance may serve any
/// number of objects and threads.
pub struct ScriptTranslator<'a> {
    context: &'a TranslationContext,
    source: DatabaseType,
    target: DatabaseType,
    options: TranslateOptions,
    feedback: Arc<dyn FeedbackObserver>,
}

impl<'a> ScriptTranslator<'a> {
    pub fn new(
        context: &'a TranslationContext,
        source: DatabaseType,
        target: DatabaseType,
        options: TranslateOptions,
    ) -> Self {
        Self {
            context,
            source,
            target,
            options,
            feedback: Arc::new(TracingFeedback),
        }
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackObserver>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn source(&self) -> DatabaseType {
        self.source
    }

    pub fn target(&self) -> DatabaseType {
        self.target
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    pub fn owner(&self) -> Option<&str> {
        self.options.target_owner.as_deref()
    }

    /// Translate one object. Identical dialects return the definition untouched.
    pub fn translate(&self, object: &ScriptObject) -> TranslateResult<TranslatedScript> {
        if self.source == self.target {
            debug!(object = %object.name, dialect = %self.source, "same dialect, definition kept");
            return Ok(TranslatedScript::unchanged(object));
        }
        self.translate_object(object)
            .map_err(|err| err.with_context(self.error_context(object)))
    }

    fn translate_object(&self, object: &ScriptObject) -> TranslateResult<TranslatedScript> {
        let text = sanitize::sanitize(
            &object.definition,
            self.source,
            self.target,
            object.schema.as_deref(),
            self.owner(),
        );
        let err = match self.convert(object.kind, &text) {
            Ok(result) => return Ok(TranslatedScript::built(object, result)),
            Err(err) => err,
        };
        if err.syntax_error().is_none() {
            return Err(err);
        }
        let Some(strategy) = fallback::for_object(self.source, object.kind) else {
            return Err(err);
        };
        info!(object = %object.name, fallback = ?strategy.kind(), "source grammar rejected definition");
        strategy.translate(self, object, &text).map_err(|fallback_err| {
            warn!(object = %object.name, error = %fallback_err, "fallback failed");
            err
        })
    }

    /// Analyse, translate and build `text` without fallbacks or context.
    pub(crate) fn convert(&self, kind: ObjectKind, text: &str) -> TranslateResult<ScriptBuildResult> {
        let mut script = analyser::analyse_script(self.source, kind, text)?;
        self.token_translator().translate(&mut script)?;
        let mut result = build::for_dialect(self.target).generate(&script)?;
        result.apply_replacements();
        Ok(result)
    }

    /// An object name as the target writes it.
    pub(crate) fn translate_name(&self, name: &str) -> TranslateResult<String> {
        let mut token = Token::new(name, TokenKind::TableName);
        self.token_translator().translate_token(&mut token)?;
        Ok(token.render())
    }

    fn token_translator(&self) -> TokenTranslator<'_> {
        TokenTranslator::new(self.context, self.source, self.target)
            .with_owner(self.owner())
            .with_names(&self.options.name_mapping)
    }

    fn error_context(&self, object: &ScriptObject) -> ErrorContext {
        ErrorContext {
            source_server: self.options.source_label.server.clone(),
            source_database: self.options.source_label.database.clone(),
            target_server: self.options.target_label.server.clone(),
            target_database: self.options.target_label.database.clone(),
            object_name: object.qualified_name(),
        }
    }

    /// Translate `objects` one after another under the configured policy.
    pub fn translate_batch(&self, objects: &[ScriptObject]) -> TranslateResult<BatchResult> {
        self.check_supported(objects)?;
        let mut result = BatchResult::default();
        for object in objects {
            let outcome = self.translate_notifying(object);
            self.record(&mut result, object, outcome)?;
        }
        Ok(result)
    }

    /// Translate `objects` on up to `threads` scoped threads (`0` picks the
    /// available parallelism). Results keep the input order.
    pub fn translate_batch_parallel(&self, objects: &[ScriptObject], threads: usize) -> TranslateResult<BatchResult> {
        self.check_supported(objects)?;
        let threads = match threads {
            0 => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        };
        let chunk = objects.len().div_ceil(threads.max(1)).max(1);
        let outcomes: Vec<TranslateResult<TranslatedScript>> = thread::scope(|scope| {
            let handles: Vec<_> = objects
                .chunks(chunk)
                .map(|part| scope.spawn(move || part.iter().map(|o| self.translate_notifying(o)).collect::<Vec<_>>()))
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });
        let mut result = BatchResult::default();
        for (object, outcome) in objects.iter().zip(outcomes) {
            self.record(&mut result, object, outcome)?;
        }
        Ok(result)
    }

    fn translate_notifying(&self, object: &ScriptObject) -> TranslateResult<TranslatedScript> {
        let owner = object.schema.as_deref();
        self.feedback.notify(&FeedbackInfo::info(
            format!("Translating {} {}", object.kind, object.qualified_name()),
            owner,
        ));
        let outcome = self.translate(object);
        if outcome.is_ok() {
            self.feedback.notify(&FeedbackInfo::info(
                format!("Translated {} {}", object.kind, object.qualified_name()),
                owner,
            ));
        }
        outcome
    }

    fn record(
        &self,
        result: &mut BatchResult,
        object: &ScriptObject,
        outcome: TranslateResult<TranslatedScript>,
    ) -> TranslateResult<()> {
        match outcome {
            Ok(translated) => result.translated.push(translated),
            Err(err) => match self.options.error_policy {
                ErrorPolicy::FailFast => return Err(err),
                ErrorPolicy::SkipAndReport => {
                    self.feedback.notify(&FeedbackInfo::error(
                        format!("{} {} skipped: {}", object.kind, object.qualified_name(), err),
                        object.schema.as_deref(),
                    ));
                    result.failures.push(BatchFailure {
                        name: object.qualified_name(),
                        kind: object.kind,
                        error: err,
                    });
                }
            },
        }
        Ok(())
    }

    /// Object kinds either side cannot handle end the batch before it starts.
    /// Nothing is checked when both sides are the same dialect.
    fn check_supported(&self, objects: &[ScriptObject]) -> TranslateResult<()> {
        if self.source == self.target {
            return Ok(());
        }
        for object in objects {
            let routine = matches!(object.kind, ObjectKind::Procedure | ObjectKind::Function);
            let unsupported = if !analyser::supports(self.source, object.kind) {
                Some(self.source)
            } else if routine && !self.target.supports_routines() {
                Some(self.target)
            } else {
                None
            };
            if let Some(dialect) = unsupported {
                let err = TranslateError::unsupported(object.kind.as_str(), dialect);
                self.feedback.notify(&FeedbackInfo::error(err.to_string(), object.schema.as_deref()));
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn translator(source: DatabaseType, target: DatabaseType) -> ScriptTranslator<'static> {
        ScriptTranslator::new(TranslationContext::builtin(), source, target, TranslateOptions::default())
    }

    #[test]
    fn test_identity_keeps_definition() {
        let text = "CREATE PROCEDURE p AS\nSELECT TOP 100 PERCENT * FROM [dbo].[t]\nGO";
        let object = ScriptObject::new("p", ObjectKind::Procedure, text);
        let translated = translator(DatabaseType::SqlServer, DatabaseType::SqlServer)
            .translate(&object)
            .unwrap();
        assert_eq!(translated.definition, text);
        assert_eq!(translated.body(), text);
        assert_eq!(translated.fallback, None);
    }

    #[test]
    fn test_top_100_percent_is_sanitised() {
        let object = ScriptObject::new(
            "v_sorted",
            ObjectKind::View,
            "CREATE VIEW v_sorted AS SELECT TOP 100 PERCENT id FROM items ORDER BY id",
        );
        let translated = translator(DatabaseType::SqlServer, DatabaseType::MySql)
            .translate(&object)
            .unwrap();
        assert!(!translated.definition.contains("PERCENT"));
        assert!(!translated.definition.contains("TOP"));
        assert!(translated.definition.contains("ORDER BY id"));
        assert_eq!(translated.fallback, None);
    }

    #[test]
    fn test_failure_carries_context() {
        let options = TranslateOptions {
            source_label: ServerLabel {
                server: "db1".to_string(),
                database: "shop".to_string(),
            },
            ..Default::default()
        };
        let translator =
            ScriptTranslator::new(TranslationContext::builtin(), DatabaseType::MySql, DatabaseType::Postgres, options);
        let object = ScriptObject::new("broken", ObjectKind::Procedure, "CREATE PROCEDURE broken() BEGIN SELECT FROM; END")
            .with_schema("shop");
        let err = translator.translate(&object).unwrap_err();

        let context = err.context().unwrap();
        assert_eq!(context.object_name, "shop.broken");
        assert_eq!(context.source_server, "db1");
        assert!(err.syntax_error().is_some());
    }

    #[test]
    fn test_oracle_view_falls_back_to_procedure() {
        let object = ScriptObject::new(
            "v",
            ObjectKind::View,
            "CREATE VIEW v AS WITH x AS (SELECT 1 a FROM dual) SELECT a FROM x",
        );
        let translated = translator(DatabaseType::Oracle, DatabaseType::MySql)
            .translate(&object)
            .unwrap();
        assert_eq!(translated.fallback, Some(Fallback::ViewAsProcedure));
        assert!(translated.definition.starts_with("CREATE OR REPLACE VIEW v AS\nWITH"));
        assert!(translated.definition.contains("SELECT a FROM x"));
        assert!(translated.body().starts_with("WITH"));
    }

    #[test]
    fn test_unsupported_kind_stops_batch_before_start() {
        let feedback = Arc::new(CollectingFeedback::new());
        let options = TranslateOptions {
            error_policy: ErrorPolicy::SkipAndReport,
            ..Default::default()
        };
        let translator =
            ScriptTranslator::new(TranslationContext::builtin(), DatabaseType::MySql, DatabaseType::Sqlite, options)
                .with_feedback(feedback.clone());
        let objects = vec![
            ScriptObject::new("a", ObjectKind::Common, "SELECT 1"),
            ScriptObject::new("p", ObjectKind::Procedure, "CREATE PROCEDURE p() BEGIN SELECT 1; END"),
        ];
        let err = translator.translate_batch(&objects).unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(feedback.errors().len(), 1);
        assert!(feedback.items().iter().all(|i| i.info_type == InfoType::Error));
    }
}
