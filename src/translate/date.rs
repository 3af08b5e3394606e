//! Date arithmetic and date part extraction.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use super::SpecificFunctionTranslator;
use crate::dialect::DatabaseType;
use crate::error::{TranslateError, TranslateResult};
use crate::formula::FunctionFormula;
use crate::mapping::{DateUnit, TranslationContext};

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y%m%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// A date argument: a quoted literal or any other expression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DateValue {
    Date(NaiveDate, String),
    DateTime(NaiveDateTime, String),
    /// A literal chrono cannot read.
    Literal(String),
    Expression(String),
}

impl DateValue {
    pub(crate) fn parse(text: &str) -> Self {
        let text = text.trim();
        let content = match text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
            Some(content) => content.trim(),
            None => return DateValue::Expression(text.to_string()),
        };
        if content.contains(' ') || content.contains('T') {
            if let Some(dt) = DATE_TIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(content, f).ok())
            {
                return DateValue::DateTime(dt, text.to_string());
            }
        }
        if let Some(d) = DATE_FORMATS.iter().find_map(|f| NaiveDate::parse_from_str(content, f).ok()) {
            return DateValue::Date(d, text.to_string());
        }
        DateValue::Literal(text.to_string())
    }

    fn text(&self) -> &str {
        match self {
            DateValue::Date(_, t) | DateValue::DateTime(_, t) | DateValue::Literal(t) | DateValue::Expression(t) => t,
        }
    }

    fn has_time(&self) -> bool {
        match self {
            DateValue::DateTime(..) | DateValue::Expression(_) => true,
            DateValue::Literal(t) => t.contains(' '),
            DateValue::Date(..) => false,
        }
    }

    fn is_literal(&self) -> bool {
        !matches!(self, DateValue::Expression(_))
    }

    /// Oracle typed literal with a normalised value.
    fn oracle(&self) -> String {
        match self {
            DateValue::Date(d, _) => format!("DATE '{}'", d.format("%Y-%m-%d")),
            DateValue::DateTime(dt, _) => format!("TIMESTAMP '{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            DateValue::Literal(t) => {
                warn!(literal = %t, "unrecognised date literal kept as written");
                format!("TO_DATE({})", t)
            }
            DateValue::Expression(t) => t.clone(),
        }
    }
}

/// A numeric amount written as a literal, signs included (`- 1` → `-1`).
fn literal_amount(text: &str) -> Option<i64> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    compact.trim_matches('\'').parse().ok()
}

fn scale(amount: &str, factor: i64) -> String {
    match literal_amount(amount) {
        Some(n) => match n.checked_mul(factor) {
            Some(scaled) => scaled.to_string(),
            None => format!("({}) * {}", n, factor),
        },
        None => format!("({}) * {}", amount, factor),
    }
}

fn negate(amount: &str) -> String {
    match literal_amount(amount) {
        Some(n) => match n.checked_neg() {
            Some(negated) => negated.to_string(),
            None => format!("-({})", n),
        },
        None => format!("-({})", amount),
    }
}

/// Rewrites `DATEADD`, `DATE_ADD`/`DATE_SUB`/`ADDDATE`/`SUBDATE` and `ADD_MONTHS`.
pub struct DateAddTranslator<'a> {
    pub context: &'a TranslationContext,
    pub source: DatabaseType,
    pub target: DatabaseType,
}

struct DateAdd<'u> {
    unit: &'u DateUnit,
    written_unit: String,
    amount: String,
    date: DateValue,
}

impl<'a> DateAddTranslator<'a> {
    fn parse(&self, formula: &FunctionFormula) -> TranslateResult<DateAdd<'a>> {
        let name = formula.name.to_uppercase();
        let bindings = self
            .context
            .functions
            .find(self.source, &formula.name)
            .and_then(|(_, spec)| spec.bind(&formula.body));
        let (date, amount, unit) = match bindings {
            Some(mut b) => {
                let unit = match b.remove("unit") {
                    Some(unit) => unit,
                    None if name == "ADD_MONTHS" => "month".to_string(),
                    None => "day".to_string(),
                };
                (b.remove("date").unwrap_or_default(), b.remove("amount").unwrap_or_default(), unit)
            }
            None => {
                // ADDDATE(date, days)
                let args = formula.args(",");
                match args.as_slice() {
                    [date, amount] => (date.clone(), amount.clone(), "day".to_string()),
                    _ => {
                        return Err(TranslateError::lookup("function", formula.expression.clone(), self.source));
                    }
                }
            }
        };
        let amount = if name == "DATE_SUB" || name == "SUBDATE" {
            negate(&amount)
        } else {
            match literal_amount(&amount) {
                Some(n) => n.to_string(),
                None => amount.split_whitespace().collect::<Vec<_>>().join(" "),
            }
        };
        let unit_def = self
            .context
            .date_units
            .find(self.source, &unit)
            .ok_or_else(|| TranslateError::lookup("date unit", unit.clone(), self.source))?;
        Ok(DateAdd {
            unit: unit_def,
            written_unit: unit,
            amount,
            date: DateValue::parse(&date),
        })
    }

    /// Units some targets cannot add directly are expressed in smaller ones.
    fn normalise(&self, add: DateAdd<'a>) -> TranslateResult<DateAdd<'a>> {
        let units = &self.context.date_units;
        let convert = match (add.unit.name.as_str(), self.target) {
            ("quarter", DatabaseType::Postgres | DatabaseType::Oracle | DatabaseType::Sqlite) => Some(("month", 3)),
            ("week", DatabaseType::Oracle | DatabaseType::Sqlite) => Some(("day", 7)),
            _ => None,
        };
        let Some((name, factor)) = convert else {
            return Ok(add);
        };
        let unit = units
            .by_name(name)
            .ok_or_else(|| TranslateError::lookup("date unit", name, self.target))?;
        Ok(DateAdd {
            unit,
            written_unit: name.to_string(),
            amount: scale(&add.amount, factor),
            date: add.date,
        })
    }
}

impl SpecificFunctionTranslator for DateAddTranslator<'_> {
    fn translate(&self, formula: &FunctionFormula) -> TranslateResult<String> {
        let add = self.normalise(self.parse(formula)?)?;
        // Oracle and SQLite only accept their canonical interval spelling.
        let spelled = match self.target {
            DatabaseType::Oracle | DatabaseType::Sqlite => add.unit.spellings(self.target).first().cloned(),
            _ => add.unit.spelling(self.target, &add.written_unit),
        };
        let unit = spelled.ok_or_else(|| TranslateError::lookup("date unit", add.unit.name.clone(), self.target))?;
        let amount = add.amount.as_str();
        let date = add.date.text();
        let amount_is_literal = literal_amount(amount).is_some();

        let text = match self.target {
            DatabaseType::SqlServer => format!("DATEADD({}, {}, {})", unit, amount, date),
            DatabaseType::MySql => format!("DATE_ADD({},INTERVAL {} {})", date, amount, unit),
            DatabaseType::Postgres => {
                let cast = match &add.date {
                    DateValue::Date(..) => "::DATE",
                    DateValue::DateTime(..) | DateValue::Literal(_) => "::TIMESTAMP",
                    DateValue::Expression(_) => "",
                };
                if amount_is_literal {
                    format!("{}{}+ INTERVAL '{} {}'", date, cast, amount, unit)
                } else {
                    format!("{}{}+ {} * INTERVAL '1 {}'", date, cast, amount, unit)
                }
            }
            DatabaseType::Oracle => {
                let unit = unit.to_uppercase();
                let date = add.date.oracle();
                if amount_is_literal {
                    format!("{} + INTERVAL '{}' {}", date, amount, unit)
                } else if matches!(add.unit.name.as_str(), "year" | "month") {
                    format!("{} + NUMTOYMINTERVAL({}, '{}')", date, amount, unit)
                } else {
                    format!("{} + NUMTODSINTERVAL({}, '{}')", date, amount, unit)
                }
            }
            DatabaseType::Sqlite => {
                let function = if add.date.is_literal() && !add.date.has_time() {
                    "DATE"
                } else {
                    "DATETIME"
                };
                match literal_amount(amount) {
                    Some(n) if n < 0 => format!("{}({}, '{} {}')", function, date, n, unit),
                    Some(n) => format!("{}({}, '+{} {}')", function, date, n, unit),
                    None => format!("{}({}, '+' || ({}) || ' {}')", function, date, amount, unit),
                }
            }
        };
        Ok(text)
    }
}

/// Rewrites `DATEPART`, `EXTRACT`, `DATE_PART` and `YEAR`/`MONTH`/`DAY`.
pub struct DateExtractTranslator<'a> {
    pub context: &'a TranslationContext,
    pub source: DatabaseType,
    pub target: DatabaseType,
}

impl SpecificFunctionTranslator for DateExtractTranslator<'_> {
    fn translate(&self, formula: &FunctionFormula) -> TranslateResult<String> {
        let (row, spec) = self
            .context
            .functions
            .find(self.source, &formula.name)
            .ok_or_else(|| TranslateError::lookup("function", formula.name.clone(), self.source))?;
        let mut bindings = spec
            .bind(&formula.body)
            .ok_or_else(|| TranslateError::lookup("function", formula.expression.clone(), self.source))?;
        let written = match (&row.unit, bindings.get("unit")) {
            (Some(unit), _) => unit.clone(),
            (None, Some(unit)) => unit.clone(),
            (None, None) => return Err(TranslateError::lookup("date unit", formula.expression.clone(), self.source)),
        };
        let unit = match &row.unit {
            Some(name) => self.context.date_units.by_name(name),
            None => self.context.date_units.find(self.source, &written),
        }
        .ok_or_else(|| TranslateError::lookup("date unit", written.clone(), self.source))?;
        let date = bindings.get("date").cloned().unwrap_or_default();

        if self.target == DatabaseType::Sqlite {
            let format = unit
                .strftime
                .as_deref()
                .ok_or_else(|| TranslateError::lookup("date unit", unit.name.clone(), self.target))?;
            let extract = format!("CAST(STRFTIME('{}', {}) AS INTEGER)", format, date);
            return Ok(if unit.name == "quarter" {
                format!("({} + 2) / 3", extract)
            } else {
                extract
            });
        }

        let target_spec = row
            .spelling(self.target)
            .ok_or_else(|| TranslateError::lookup("function", formula.name.clone(), self.target))?;
        let spelled = unit
            .spelling(self.target, written.trim_matches('\''))
            .ok_or_else(|| TranslateError::lookup("date unit", unit.name.clone(), self.target))?;
        bindings.insert("unit".to_string(), spelled);
        Ok(target_spec.render(&bindings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn add(source: DatabaseType, target: DatabaseType, call: &str) -> String {
        let translator = DateAddTranslator {
            context: TranslationContext::builtin(),
            source,
            target,
        };
        translator.translate(&FunctionFormula::new(call)).unwrap()
    }

    fn extract(source: DatabaseType, target: DatabaseType, call: &str) -> String {
        let translator = DateExtractTranslator {
            context: TranslationContext::builtin(),
            source,
            target,
        };
        translator.translate(&FunctionFormula::new(call)).unwrap()
    }

    #[test]
    fn test_date_value_parse() {
        assert!(matches!(DateValue::parse("'2024-01-31'"), DateValue::Date(..)));
        assert!(matches!(DateValue::parse("'2024-01-31 10:30:00'"), DateValue::DateTime(..)));
        assert!(matches!(DateValue::parse("o.OrderDate"), DateValue::Expression(_)));
        assert!(matches!(DateValue::parse("'soon'"), DateValue::Literal(_)));
    }

    #[test]
    fn test_mysql_to_sqlserver() {
        assert_eq!(
            add(DatabaseType::MySql, DatabaseType::SqlServer, "DATE_ADD(d, INTERVAL 2 HOUR)"),
            "DATEADD(HOUR, 2, d)"
        );
        assert_eq!(
            add(DatabaseType::MySql, DatabaseType::SqlServer, "DATE_SUB(d, INTERVAL 3 DAY)"),
            "DATEADD(DAY, -3, d)"
        );
        assert_eq!(
            add(DatabaseType::MySql, DatabaseType::SqlServer, "ADDDATE(d, 5)"),
            "DATEADD(day, 5, d)"
        );
    }

    #[test]
    fn test_oracle_targets() {
        assert_eq!(
            add(DatabaseType::SqlServer, DatabaseType::Oracle, "DATEADD(dd, 1, '2024/01/31')"),
            "DATE '2024-01-31' + INTERVAL '1' DAY"
        );
        assert_eq!(
            add(DatabaseType::SqlServer, DatabaseType::Oracle, "DATEADD(week, 2, hired)"),
            "hired + INTERVAL '14' DAY"
        );
        assert_eq!(
            add(DatabaseType::SqlServer, DatabaseType::Oracle, "DATEADD(month, @n, hired)"),
            "hired + NUMTOYMINTERVAL(@n, 'MONTH')"
        );
        assert_eq!(
            add(DatabaseType::Oracle, DatabaseType::SqlServer, "ADD_MONTHS(hired, 6)"),
            "DATEADD(month, 6, hired)"
        );
    }

    #[test]
    fn test_sqlite_targets() {
        assert_eq!(
            add(DatabaseType::SqlServer, DatabaseType::Sqlite, "DATEADD(week, 1, '2024-01-01')"),
            "DATE('2024-01-01', '+7 days')"
        );
        assert_eq!(
            add(DatabaseType::SqlServer, DatabaseType::Sqlite, "DATEADD(hour, -2, created)"),
            "DATETIME(created, '-2 hours')"
        );
    }

    #[test]
    fn test_missing_target_unit() {
        let translator = DateAddTranslator {
            context: TranslationContext::builtin(),
            source: DatabaseType::SqlServer,
            target: DatabaseType::MySql,
        };
        let err = translator
            .translate(&FunctionFormula::new("DATEADD(ms, 10, d)"))
            .unwrap_err();
        assert!(matches!(err, TranslateError::MappingLookup { table: "date unit", .. }));
    }

    #[test]
    fn test_extract() {
        assert_eq!(
            extract(DatabaseType::SqlServer, DatabaseType::Postgres, "DATEPART(dd, created)"),
            "EXTRACT(day FROM created)"
        );
        assert_eq!(
            extract(DatabaseType::SqlServer, DatabaseType::Sqlite, "YEAR(created)"),
            "CAST(STRFTIME('%Y', created) AS INTEGER)"
        );
        assert_eq!(
            extract(DatabaseType::Postgres, DatabaseType::SqlServer, "EXTRACT(month FROM created)"),
            "DATEPART(month, created)"
        );
        assert_eq!(
            extract(DatabaseType::MySql, DatabaseType::Oracle, "MONTH(created)"),
            "EXTRACT(MONTH FROM created)"
        );
    }

    #[test]
    fn test_extreme_amounts_keep_arithmetic_in_sql() {
        assert_eq!(
            add(DatabaseType::SqlServer, DatabaseType::Oracle, "DATEADD(week, 9223372036854775807, d)"),
            "d + NUMTODSINTERVAL((9223372036854775807) * 7, 'DAY')"
        );
        assert_eq!(
            add(DatabaseType::MySql, DatabaseType::SqlServer, "DATE_SUB(d, INTERVAL -9223372036854775808 DAY)"),
            "DATEADD(DAY, -(-9223372036854775808), d)"
        );
    }
}
