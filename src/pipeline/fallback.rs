//! Alternate translation paths for definitions the source grammar rejects.
//!
//! Strategies are looked up by `(source dialect, object kind)` through
//! [`for_object`]. A strategy either produces a complete [`TranslatedScript`]
//! or fails, in which case the pipeline reports the original syntax error.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, warn};

use super::{ScriptObject, ScriptTranslator, TranslatedScript};
use crate::build;
use crate::dialect::DatabaseType;
use crate::error::{TranslateError, TranslateResult};
use crate::model::ObjectKind;

/// Which fallback produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// The view body was translated as the body of a procedure.
    ViewAsProcedure,
    /// The view was rewritten with regular expressions only.
    RegexView,
}

pub trait FallbackStrategy: Send + Sync {
    fn kind(&self) -> Fallback;

    /// Translate `text`, the sanitised definition of `object`.
    fn translate(
        &self,
        translator: &ScriptTranslator<'_>,
        object: &ScriptObject,
        text: &str,
    ) -> TranslateResult<TranslatedScript>;
}

/// The fallback registered for `source` and `kind`, if any.
pub fn for_object(source: DatabaseType, kind: ObjectKind) -> Option<&'static dyn FallbackStrategy> {
    match (source, kind) {
        (DatabaseType::Oracle, ObjectKind::View) => Some(&ViewAsProcedure),
        (DatabaseType::SqlServer, ObjectKind::View) => Some(&RegexView),
        _ => None,
    }
}

/// Name of the procedure a view body is wrapped in.
const WRAPPER: &str = "sqlport_view_body";

static ORACLE_VIEW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?(?:(?:NO)?FORCE\s+)?(?:(?:NON)?EDITIONABLE\s+)?VIEW\s+((?:"[^"]+"|[\w$#]+)(?:\s*\.\s*(?:"[^"]+"|[\w$#]+))?)\s*(\([^)]*\))?\s*AS\s+(.*)$"#,
    )
    .unwrap()
});

static SQLSERVER_VIEW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^\s*(?:CREATE|ALTER|CREATE\s+OR\s+ALTER)\s+VIEW\s+((?:\[[^\]]+\]|[\w@#$]+)(?:\s*\.\s*(?:\[[^\]]+\]|[\w@#$]+)){0,2})\s*(\([^)]*\))?\s*(?:WITH\s+\w+(?:\s*,\s*\w+)*\s+)?AS\s+(.*)$",
    )
    .unwrap()
});

static VIEW_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\s+WITH\s+(?:READ\s+ONLY|CHECK\s+OPTION)(?:\s+CONSTRAINT\s+\S+)?\s*$").unwrap());

/// A view definition split into its parts.
struct ViewParts<'t> {
    name: &'t str,
    columns: Option<&'t str>,
    body: String,
}

fn split_view<'t>(pattern: &Regex, text: &'t str) -> Option<ViewParts<'t>> {
    let captures = pattern.captures(text)?;
    let body = captures.get(3)?.as_str();
    let body = body.trim_end().trim_end_matches('/').trim_end().trim_end_matches(';').trim_end();
    let body = VIEW_OPTION.replace(body, "").into_owned();
    Some(ViewParts {
        name: captures.get(1)?.as_str(),
        columns: captures.get(2).map(|c| c.as_str()),
        body,
    })
}

/// `CREATE VIEW` text around an already translated body.
fn assemble(
    translator: &ScriptTranslator<'_>,
    object: &ScriptObject,
    parts: &ViewParts<'_>,
    body: &str,
    fallback: Fallback,
) -> TranslateResult<TranslatedScript> {
    let name = translator.translate_name(parts.name)?;
    let columns = parts.columns.map(|c| format!(" {}", c.trim())).unwrap_or_default();
    let header = format!("{} {}{} AS\n", build::for_dialect(translator.target()).create_view(), name, columns);
    let body = body.trim().trim_end_matches(';').trim_end();
    let definition = format!("{}{};", header, body);
    Ok(TranslatedScript {
        name: object.name.clone(),
        kind: object.kind,
        body_start_index: header.len(),
        body_stop_index: header.len() + body.len(),
        definition,
        fallback: Some(fallback),
    })
}

/// Oracle views the view rule rejects: translate the query as a procedure body.
pub struct ViewAsProcedure;

impl FallbackStrategy for ViewAsProcedure {
    fn kind(&self) -> Fallback {
        Fallback::ViewAsProcedure
    }

    fn translate(
        &self,
        translator: &ScriptTranslator<'_>,
        object: &ScriptObject,
        text: &str,
    ) -> TranslateResult<TranslatedScript> {
        let parts = split_view(&ORACLE_VIEW, text)
            .ok_or_else(|| TranslateError::unsupported("view header", translator.source()))?;
        let wrapped = format!("CREATE PROCEDURE {} AS\nBEGIN\n{};\nEND;", WRAPPER, parts.body);
        debug!(view = parts.name, "translating view body as a procedure");
        let result = translator.convert(ObjectKind::Procedure, &wrapped)?;
        assemble(translator, object, &parts, result.body(), self.kind())
    }
}

static NOLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\bWITH\s*\(\s*(?:NOLOCK|READUNCOMMITTED)\s*\)").unwrap());
static NATIONAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[^\w'])[Nn]'").unwrap());
static DEFAULT_OWNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(?:\[dbo\]|\bdbo)\s*\.\s*").unwrap());
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());
static ISNULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bISNULL\s*\(").unwrap());
static GETDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bGETDATE\s*\(\s*\)").unwrap());
static LEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bLEN\s*\(").unwrap());
static LEADING_TOP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^(\s*SELECT\s+(?:DISTINCT\s+)?)TOP\s*(?:\(\s*(\d+)\s*\)|(\d+))\s+").unwrap());
static TOP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bTOP\s*\(?\s*\d+").unwrap());

/// SQL Server views the view rule rejects: rewrite the common T-SQL idioms textually.
pub struct RegexView;

impl RegexView {
    fn rewrite(&self, body: &str, target: DatabaseType, owner: Option<&str>) -> String {
        let body = NOLOCK.replace_all(body, "");
        let owner = match owner {
            Some(owner) if target.supports_schema() => format!("{}.", owner),
            _ => String::new(),
        };
        let body = DEFAULT_OWNER.replace_all(&body, owner.as_str());
        let body = NATIONAL.replace_all(&body, "$1'");
        let body = BRACKETED.replace_all(&body, |c: &Captures<'_>| target.quote(&c[1]));
        let body = ISNULL.replace_all(&body, "COALESCE(");
        let now = match target {
            DatabaseType::Oracle => "SYSDATE",
            _ => "CURRENT_TIMESTAMP",
        };
        let body = GETDATE.replace_all(&body, now);
        let length = match target {
            DatabaseType::SqlServer => "LEN(",
            _ => "LENGTH(",
        };
        let body = LEN.replace_all(&body, length);

        let Some(top) = LEADING_TOP.captures(&body) else {
            if TOP.is_match(&body) {
                warn!(%target, "nested TOP left as written");
            }
            return body.to_string();
        };
        let rows = top.get(2).or_else(|| top.get(3)).map(|m| m.as_str().to_string()).unwrap_or_default();
        let rest = &body[top.get(0).map_or(0, |m| m.end())..];
        let limit = match target {
            DatabaseType::Oracle => format!("FETCH FIRST {} ROWS ONLY", rows),
            _ => format!("LIMIT {}", rows),
        };
        format!("{}{}\n{}", &top[1], rest.trim_end(), limit)
    }
}

impl FallbackStrategy for RegexView {
    fn kind(&self) -> Fallback {
        Fallback::RegexView
    }

    fn translate(
        &self,
        translator: &ScriptTranslator<'_>,
        object: &ScriptObject,
        text: &str,
    ) -> TranslateResult<TranslatedScript> {
        let parts = split_view(&SQLSERVER_VIEW, text)
            .ok_or_else(|| TranslateError::unsupported("view header", translator.source()))?;
        warn!(view = parts.name, target = %translator.target(), "view rewritten without analysis");
        let body = self.rewrite(&parts.body, translator.target(), translator.owner());
        assemble(translator, object, &parts, &body, self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::TranslationContext;
    use crate::pipeline::TranslateOptions;
    use pretty_assertions::assert_eq;

    fn translator(source: DatabaseType, target: DatabaseType) -> ScriptTranslator<'static> {
        ScriptTranslator::new(TranslationContext::builtin(), source, target, TranslateOptions::default())
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(
            for_object(DatabaseType::Oracle, ObjectKind::View).map(|s| s.kind()),
            Some(Fallback::ViewAsProcedure)
        );
        assert_eq!(
            for_object(DatabaseType::SqlServer, ObjectKind::View).map(|s| s.kind()),
            Some(Fallback::RegexView)
        );
        assert!(for_object(DatabaseType::Oracle, ObjectKind::Procedure).is_none());
        assert!(for_object(DatabaseType::MySql, ObjectKind::View).is_none());
    }

    #[test]
    fn test_split_oracle_view() {
        let parts = split_view(
            &ORACLE_VIEW,
            "CREATE OR REPLACE FORCE VIEW hr.emp_v (id, name) AS\nSELECT id, name FROM emp\nWITH READ ONLY;\n/",
        )
        .unwrap();
        assert_eq!(parts.name, "hr.emp_v");
        assert_eq!(parts.columns, Some("(id, name)"));
        assert_eq!(parts.body, "SELECT id, name FROM emp");
    }

    #[test]
    fn test_regex_view_rewrites() {
        let text = "CREATE VIEW [dbo].[v_orders] AS
SELECT TOP 10 [o].[Id], ISNULL(o.Note, N'none') AS note, GETDATE() AS at, LEN(o.Code) AS n
FROM [dbo].[Orders] o WITH (NOLOCK)
ORDER BY o.Id";
        let object = ScriptObject::new("v_orders", ObjectKind::View, text);
        let translated = RegexView
            .translate(&translator(DatabaseType::SqlServer, DatabaseType::MySql), &object, text)
            .unwrap();
        assert_eq!(
            translated.definition,
            "CREATE OR REPLACE VIEW `v_orders` AS
SELECT `o`.`Id`, COALESCE(o.Note, 'none') AS note, CURRENT_TIMESTAMP AS at, LENGTH(o.Code) AS n
FROM `Orders` o
ORDER BY o.Id
LIMIT 10;"
        );
        assert_eq!(translated.fallback, Some(Fallback::RegexView));
        let body = &translated.definition[translated.body_start_index..translated.body_stop_index];
        assert!(body.starts_with("SELECT `o`.`Id`"));
        assert!(body.ends_with("LIMIT 10"));
    }

    #[test]
    fn test_regex_view_keeps_n_literal() {
        let body = RegexView.rewrite("SELECT 'N' AS flag, N'x' FROM dbo.t", DatabaseType::Postgres, Some("sales"));
        assert_eq!(body, "SELECT 'N' AS flag, 'x' FROM sales.t");
    }

    #[test]
    fn test_regex_view_top_for_oracle() {
        let text = "CREATE VIEW v AS SELECT TOP (5) id FROM t";
        let object = ScriptObject::new("v", ObjectKind::View, text);
        let translated = RegexView
            .translate(&translator(DatabaseType::SqlServer, DatabaseType::Oracle), &object, text)
            .unwrap();
        assert_eq!(
            translated.definition,
            "CREATE OR REPLACE VIEW v AS\nSELECT id FROM t\nFETCH FIRST 5 ROWS ONLY;"
        );
    }

    #[test]
    fn test_view_as_procedure_keeps_query() {
        let text = "CREATE OR REPLACE VIEW emp_v AS SELECT id, name FROM emp";
        let object = ScriptObject::new("emp_v", ObjectKind::View, text);
        let translated = ViewAsProcedure
            .translate(&translator(DatabaseType::Oracle, DatabaseType::MySql), &object, text)
            .unwrap();
        assert!(translated.definition.starts_with("CREATE OR REPLACE VIEW emp_v AS\nSELECT"));
        assert!(translated.definition.contains("FROM emp"));
        assert!(!translated.definition.contains(WRAPPER));
        assert!(translated.definition.ends_with(';'));
        assert_eq!(translated.fallback, Some(Fallback::ViewAsProcedure));
    }

    #[test]
    fn test_unrecognised_header_fails() {
        let text = "SELECT 1";
        let object = ScriptObject::new("v", ObjectKind::View, text);
        let err = ViewAsProcedure
            .translate(&translator(DatabaseType::Oracle, DatabaseType::Postgres), &object, text)
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedConstruct { .. }));
    }
}
