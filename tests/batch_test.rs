use std::sync::Arc;

use pretty_assertions::assert_eq;

use sqlport::prelude::*;

fn objects() -> Vec<ScriptObject> {
    vec![
        ScriptObject::new("first", ObjectKind::Common, "SELECT a FROM t"),
        ScriptObject::new(
            "broken",
            ObjectKind::Procedure,
            "CREATE PROCEDURE broken()\nBEGIN\n  SELECT FROM;\nEND",
        )
        .with_schema("shop"),
        ScriptObject::new("last", ObjectKind::Common, "UPDATE t SET a = 1 WHERE b = 2"),
    ]
}

fn translator(policy: ErrorPolicy, feedback: Arc<CollectingFeedback>) -> ScriptTranslator<'static> {
    let options = TranslateOptions {
        error_policy: policy,
        ..Default::default()
    };
    ScriptTranslator::new(TranslationContext::builtin(), DatabaseType::MySql, DatabaseType::Postgres, options)
        .with_feedback(feedback)
}

#[test]
fn test_skip_and_report_continues_after_failure() {
    let feedback = Arc::new(CollectingFeedback::new());
    let result = translator(ErrorPolicy::SkipAndReport, feedback.clone())
        .translate_batch(&objects())
        .expect("Batch must not abort");

    let names: Vec<&str> = result.translated.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["first", "last"]);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].name, "shop.broken");
    assert!(result.failures[0].error.syntax_error().is_some());

    let errors = feedback.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("shop.broken"));
    assert_eq!(errors[0].owner.as_deref(), Some("shop"));
    assert!(feedback.items().iter().any(|i| i.info_type == InfoType::Info));
}

#[test]
fn test_fail_fast_stops_at_first_failure() {
    let feedback = Arc::new(CollectingFeedback::new());
    let err = translator(ErrorPolicy::FailFast, feedback.clone())
        .translate_batch(&objects())
        .unwrap_err();

    assert_eq!(err.context().map(|c| c.object_name.as_str()), Some("shop.broken"));
    assert!(feedback.errors().is_empty());
    assert!(!feedback.items().iter().any(|i| i.message.contains("last")));
}

#[test]
fn test_parallel_batch_keeps_input_order() {
    let mut objects = objects();
    for i in 0..6 {
        objects.push(ScriptObject::new(format!("extra_{}", i), ObjectKind::Common, "SELECT a FROM t"));
    }
    let feedback = Arc::new(CollectingFeedback::new());
    let result = translator(ErrorPolicy::SkipAndReport, feedback.clone())
        .translate_batch_parallel(&objects, 3)
        .expect("Batch must not abort");

    let names: Vec<&str> = result.translated.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["first", "last", "extra_0", "extra_1", "extra_2", "extra_3", "extra_4", "extra_5"]
    );
    assert_eq!(result.failures.len(), 1);
    assert_eq!(feedback.errors().len(), 1);
}

#[test]
fn test_sequential_and_parallel_agree() {
    let feedback = Arc::new(CollectingFeedback::new());
    let translator = translator(ErrorPolicy::SkipAndReport, feedback);
    let sequential = translator.translate_batch(&objects()).expect("Batch must not abort");
    let parallel = translator
        .translate_batch_parallel(&objects(), 0)
        .expect("Batch must not abort");
    assert_eq!(sequential.translated, parallel.translated);
}

#[test]
fn test_same_dialect_batch_returns_definitions() {
    let objects = vec![ScriptObject::new(
        "nightly",
        ObjectKind::Procedure,
        "CREATE PROCEDURE nightly AS SELECT 1",
    )];
    let feedback = Arc::new(CollectingFeedback::new());
    let translator = ScriptTranslator::new(
        TranslationContext::builtin(),
        DatabaseType::Sqlite,
        DatabaseType::Sqlite,
        TranslateOptions::default(),
    )
    .with_feedback(feedback.clone());

    for result in [
        translator.translate_batch(&objects),
        translator.translate_batch_parallel(&objects, 2),
    ] {
        let result = result.expect("Identity batch must not fail");
        assert!(result.is_complete());
        assert_eq!(result.translated.len(), 1);
        assert_eq!(result.translated[0].definition, objects[0].definition);
    }
    assert!(feedback.errors().is_empty());
}
