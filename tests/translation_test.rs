use pretty_assertions::assert_eq;

use sqlport::dialect::DatabaseType;
use sqlport::formula::{FunctionFormula, is_parenthesis_balanced};
use sqlport::mapping::TranslationContext;
use sqlport::model::{ObjectKind, Token, TokenKind};
use sqlport::translate::{DateAddTranslator, SpecificFunctionTranslator};

fn date_add(target: DatabaseType, call: &str) -> String {
    let translator = DateAddTranslator {
        context: TranslationContext::builtin(),
        source: DatabaseType::SqlServer,
        target,
    };
    translator
        .translate(&FunctionFormula::new(call))
        .expect("Failed to translate DATEADD")
}

#[test]
fn test_same_dialect_is_identity() {
    let text = "this is not SQL at all ;; (";
    for dialect in DatabaseType::ALL {
        let same = sqlport::translate(text, dialect, dialect, ObjectKind::Procedure).expect("Identity must not fail");
        assert_eq!(same, text);
    }
}

#[test]
fn test_argument_splitting() {
    let formula = FunctionFormula::new("DATEADD(day, 1, '2024-01-01 10:00')");
    assert_eq!(formula.args(","), vec!["day", "1", "'2024-01-01 10:00'"]);
}

#[test]
fn test_parenthesis_balance() {
    assert!(is_parenthesis_balanced("(a(b)c)"));
    assert!(!is_parenthesis_balanced("(a(b)c"));
}

#[test]
fn test_token_self_reference_guard() {
    let mut parent = Token::with_span("a + b", TokenKind::Expression, 10, 14);
    let same_span = Token::with_span("a + b", TokenKind::Expression, 10, 14);
    assert!(!parent.add_child(same_span));
    assert!(parent.children().is_empty());
}

#[test]
fn test_date_add_to_mysql() {
    assert_eq!(
        date_add(DatabaseType::MySql, "DATEADD(day, 1, '2024-01-31')"),
        "DATE_ADD('2024-01-31',INTERVAL 1 day)"
    );
    assert_eq!(
        date_add(DatabaseType::MySql, "DATEADD(hour, 2, '2024-01-31 10:30:00')"),
        "DATE_ADD('2024-01-31 10:30:00',INTERVAL 2 hour)"
    );
}

#[test]
fn test_date_add_to_postgres() {
    assert_eq!(
        date_add(DatabaseType::Postgres, "DATEADD(day, 1, '2024-01-31')"),
        "'2024-01-31'::DATE+ INTERVAL '1 day'"
    );
    assert_eq!(
        date_add(DatabaseType::Postgres, "DATEADD(hour, 2, '2024-01-31 10:30:00')"),
        "'2024-01-31 10:30:00'::TIMESTAMP+ INTERVAL '2 hour'"
    );
}

#[test]
fn test_date_add_inside_a_statement() {
    let sql = sqlport::translate(
        "SELECT DATEADD(day, 1, '2024-01-31') FROM orders",
        DatabaseType::SqlServer,
        DatabaseType::MySql,
        ObjectKind::Common,
    )
    .expect("Failed to translate statement");
    assert!(sql.contains("DATE_ADD('2024-01-31',INTERVAL 1 day)"), "{}", sql);
    assert!(sql.contains("FROM orders"));
}

#[test]
fn test_top_100_percent_removed_before_analysis() {
    let sql = sqlport::translate(
        "CREATE VIEW v_sorted AS SELECT TOP 100 PERCENT id, name FROM items ORDER BY name",
        DatabaseType::SqlServer,
        DatabaseType::Postgres,
        ObjectKind::View,
    )
    .expect("Failed to translate view");
    assert!(!sql.contains("PERCENT"), "{}", sql);
    assert!(sql.contains("ORDER BY name"));
}

#[test]
fn test_parameters_named_after_columns_stay_distinct() {
    let sql = sqlport::translate(
        "CREATE PROCEDURE p @id INT, @name VARCHAR(10) AS BEGIN UPDATE t SET name = @name WHERE id = @id; END",
        DatabaseType::SqlServer,
        DatabaseType::Postgres,
        ObjectKind::Procedure,
    )
    .expect("Failed to translate procedure");
    assert!(sql.contains("SET name = p_name WHERE id = p_id"), "{}", sql);
    assert!(!sql.contains("id = id"), "{}", sql);
    let header = sql.lines().next().unwrap_or_default();
    assert!(header.contains("p_id") && header.contains("p_name"), "{}", sql);
}

#[test]
fn test_trigger_row_tables_become_transition_tables() {
    let sql = sqlport::translate(
        "CREATE TRIGGER trg ON dbo.t AFTER INSERT AS BEGIN INSERT INTO log(id) SELECT id FROM inserted; END",
        DatabaseType::SqlServer,
        DatabaseType::Postgres,
        ObjectKind::Trigger,
    )
    .expect("Failed to translate trigger");
    assert!(sql.contains("FROM inserted"), "{}", sql);
    assert!(!sql.contains("FROM NEW"), "{}", sql);
    assert!(sql.contains("AFTER INSERT ON t\nREFERENCING NEW TABLE AS inserted\nFOR EACH STATEMENT"), "{}", sql);
}

#[test]
fn test_row_count_reads_diagnostics_in_postgres() {
    let sql = sqlport::translate(
        "CREATE PROCEDURE touch AS BEGIN \
         DECLARE @n INT; \
         UPDATE t SET a = 1; \
         SET @n = @@ROWCOUNT; \
         IF @@ROWCOUNT = 0 BEGIN PRINT 'none' END \
         END",
        DatabaseType::SqlServer,
        DatabaseType::Postgres,
        ObjectKind::Procedure,
    )
    .expect("Failed to translate procedure");
    assert!(sql.contains("GET DIAGNOSTICS n = ROW_COUNT;"), "{}", sql);
    assert!(sql.contains("IF NOT FOUND THEN"), "{}", sql);
}
