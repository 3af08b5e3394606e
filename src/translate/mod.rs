//! Token translation: rewrite an analysed script's vocabulary for another dialect.
//!
//! [`TokenTranslator`] visits every token of a [`Script`] children first and
//! mutates it in place. Per token, by kind:
//!
//! | Kind                     | Rewrite                                              |
//! |--------------------------|------------------------------------------------------|
//! | table / function names   | owner substitution, caller renames, re-quoting       |
//! | column names             | trigger rows, variable prefix, renames, re-quoting   |
//! | data types               | [`DataTypeMapping`](crate::mapping::DataTypeMapping) |
//! | function calls           | templates or a [`SpecificFunctionTranslator`]        |
//! | variables                | system variables, trigger rows, `@` prefix           |
//! | expressions              | string concatenation operators                       |
//! | literals and hints       | `N'…'`, MySQL `"…"`, `WITH (NOLOCK)`                  |

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::dialect::{DatabaseType, is_quoted, split_qualified, unquote};
use crate::error::{TranslateError, TranslateResult};
use crate::formula::FunctionFormula;
use crate::mapping::{NameMapping, SpecificTranslator, TranslationContext};
use crate::model::{NameRole, NameToken, Script, Token, TokenKind, TokenVisitor, render_sequence};

pub mod date;

pub use date::{DateAddTranslator, DateExtractTranslator};

/// Rewrites one function call a template cannot express.
pub trait SpecificFunctionTranslator {
    fn translate(&self, formula: &FunctionFormula) -> TranslateResult<String>;
}

/// Rewrites the tokens of scripts from `source` to `target`.
pub struct TokenTranslator<'a> {
    context: &'a TranslationContext,
    source: DatabaseType,
    target: DatabaseType,
    owner: Option<&'a str>,
    names: Option<&'a NameMapping>,
    declared: HashSet<String>,
    renamed: HashMap<String, String>,
    in_trigger: bool,
    transition_tables: bool,
    error: Option<TranslateError>,
}

impl<'a> TokenTranslator<'a> {
    pub fn new(context: &'a TranslationContext, source: DatabaseType, target: DatabaseType) -> Self {
        Self {
            context,
            source,
            target,
            owner: None,
            names: None,
            declared: HashSet::new(),
            renamed: HashMap::new(),
            in_trigger: false,
            transition_tables: false,
            error: None,
        }
    }

    /// Schema that replaces the source qualifiers.
    pub fn with_owner(mut self, owner: Option<&'a str>) -> Self {
        self.owner = owner.filter(|o| !o.trim().is_empty());
        self
    }

    pub fn with_names(mut self, names: &'a NameMapping) -> Self {
        self.names = (!names.is_empty()).then_some(names);
        self
    }

    /// Translate every token of `script` in place. Stops at the first failure.
    pub fn translate(&mut self, script: &mut Script) -> TranslateResult<()> {
        if self.source == self.target {
            return Ok(());
        }
        self.in_trigger = matches!(script, Script::Trigger(_));
        self.transition_tables = self.in_trigger && self.target == DatabaseType::Postgres && self.reads_row_tables(script);
        self.declared = declared_variables(script);
        self.renamed = if self.target != DatabaseType::SqlServer {
            colliding_variables(script)
        } else {
            HashMap::new()
        };
        self.error = None;
        script.visit_tokens_mut(self);
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Translate a single token tree outside of a script.
    pub fn translate_token(&self, token: &mut Token) -> TranslateResult<()> {
        let mut first = None;
        token.visit_mut(&mut |t: &mut Token| {
            if first.is_none() {
                if let Err(err) = self.rewrite(t) {
                    first = Some(err);
                }
            }
        });
        first.map_or(Ok(()), Err)
    }

    fn rewrite(&self, token: &mut Token) -> TranslateResult<()> {
        match token.kind {
            TokenKind::TableName => {
                let mut symbol = self.trigger_row(&token.symbol);
                symbol = self.qualify(&symbol);
                if let Some(mapped) = self.names.and_then(|n| n.table(&symbol)) {
                    symbol = replace_last_part(&symbol, mapped);
                }
                token.symbol = self.requote(&symbol);
            }
            TokenKind::ColumnName => {
                if let Some(variable) = self.system_variable(&token.symbol) {
                    token.replace(variable);
                    return Ok(());
                }
                let mut symbol = self.trigger_row(&token.symbol);
                if self.is_declared(&symbol) {
                    token.symbol = format!("@{}", symbol);
                    return Ok(());
                }
                if let Some(mapped) = self.names.and_then(|n| n.column(&symbol)) {
                    symbol = replace_last_part(&symbol, mapped);
                }
                token.symbol = self.requote(&symbol);
            }
            TokenKind::FunctionName => {
                token.symbol = self.requote(&self.qualify(&token.symbol));
            }
            TokenKind::TableAlias
            | TokenKind::ColumnAlias
            | TokenKind::ConstraintName
            | TokenKind::CursorName
            | TokenKind::ViewName
            | TokenKind::RoutineName
            | TokenKind::TriggerName => {
                token.symbol = self.requote(&token.symbol);
            }
            TokenKind::DataType => {
                if !token.symbol.eq_ignore_ascii_case("EXCEPTION") {
                    let translated = self.context.data_types.translate(&token.symbol, self.source, self.target)?;
                    token.replace(translated);
                }
            }
            TokenKind::FunctionCall => self.rewrite_call(token)?,
            TokenKind::Variable => {
                let symbol = self.trigger_row(&token.symbol);
                let symbol = match self.system_variable(&symbol) {
                    Some(variable) => variable,
                    None => self.variable_name(&symbol),
                };
                token.symbol = symbol;
            }
            TokenKind::StringLiteral => token.symbol = self.string_literal(&token.symbol),
            TokenKind::Keyword => {
                if self.target != DatabaseType::SqlServer && compact_upper(&token.symbol).contains("(NOLOCK)") {
                    token.replace("");
                }
            }
            _ => {}
        }
        if !token.is_leaf() {
            self.rewrite_concatenation(token);
        }
        Ok(())
    }

    fn rewrite_call(&self, token: &mut Token) -> TranslateResult<()> {
        let formula = FunctionFormula::new(&token.render());
        if let Some(text) = self.function(&formula)? {
            token.replace(text);
        } else if let Some(variable) = self.system_variable(&formula.expression) {
            token.replace(variable);
        }
        Ok(())
    }

    /// Translated text of a built-in call, `None` when the call stays as written.
    pub fn function(&self, formula: &FunctionFormula) -> TranslateResult<Option<String>> {
        let functions = &self.context.functions;
        let Some((row, source_spec)) = functions.find(self.source, &formula.name) else {
            return Ok(None);
        };
        if let Some(kind) = row.translator {
            return self.specific(kind).translate(formula).map(Some);
        }
        let Some(target_spec) = row.spelling(self.target) else {
            return Err(TranslateError::lookup("function", formula.name.clone(), self.target));
        };
        if target_spec == source_spec {
            return Ok(None);
        }
        let Some(mut bindings) = source_spec.bind(&formula.body) else {
            if target_spec.args == source_spec.args && target_spec.parens == source_spec.parens {
                let renamed = if target_spec.parens {
                    format!("{}({})", target_spec.name, formula.body.trim())
                } else {
                    target_spec.name.clone()
                };
                return Ok(Some(renamed));
            }
            warn!(
                source = %self.source,
                target = %self.target,
                call = %formula.expression,
                "arguments do not fit the function template, call kept"
            );
            return Ok(None);
        };
        self.translate_bindings(&mut bindings)?;
        Ok(Some(target_spec.render(&bindings)))
    }

    fn translate_bindings(&self, bindings: &mut HashMap<String, String>) -> TranslateResult<()> {
        if let Some(data_type) = bindings.get_mut("type") {
            *data_type = self.context.data_types.translate(data_type, self.source, self.target)?;
        }
        if let Some(unit) = bindings.get_mut("unit") {
            *unit = self.context.date_units.translate(unit, self.source, self.target)?;
        }
        Ok(())
    }

    fn specific(&self, kind: SpecificTranslator) -> Box<dyn SpecificFunctionTranslator + 'a> {
        let (context, source, target) = (self.context, self.source, self.target);
        match kind {
            SpecificTranslator::DateAdd => Box::new(DateAddTranslator { context, source, target }),
            SpecificTranslator::DateExtract => Box::new(DateExtractTranslator { context, source, target }),
        }
    }

    fn system_variable(&self, text: &str) -> Option<String> {
        if !self.context.variables.contains(self.source, text) {
            return None;
        }
        match self.context.variables.translate(text, self.source, self.target) {
            Some(target) => Some(target.to_string()),
            None => {
                debug!(variable = text, target = %self.target, "no system variable equivalent, kept");
                None
            }
        }
    }

    /// Replace a leading `INSERTED`/`NEW`/`:NEW` part inside trigger bodies.
    /// Row tables queried in `FROM` stay as PostgreSQL transition tables.
    fn trigger_row(&self, symbol: &str) -> String {
        if !self.in_trigger || self.transition_tables {
            return symbol.to_string();
        }
        let parts = split_qualified(symbol);
        let Some(first) = parts.first() else {
            return symbol.to_string();
        };
        match self
            .context
            .trigger_variables
            .translate(unquote(first), self.source, self.target)
        {
            Some(row) => std::iter::once(row)
                .chain(parts[1..].iter().copied())
                .collect::<Vec<_>>()
                .join("."),
            None => symbol.to_string(),
        }
    }

    /// Whether the trigger body selects from the rows as tables (`FROM inserted`).
    fn reads_row_tables(&self, script: &Script) -> bool {
        script.tokens().into_iter().any(|t| {
            t.kind == TokenKind::TableName
                && split_qualified(&t.symbol).len() == 1
                && self
                    .context
                    .trigger_variables
                    .contains(self.source, unquote(&t.symbol))
        })
    }

    fn is_declared(&self, symbol: &str) -> bool {
        self.target == DatabaseType::SqlServer
            && self.source != DatabaseType::SqlServer
            && !symbol.contains('.')
            && self.declared.contains(&symbol.to_lowercase())
    }

    /// Local variable spelling: `@x` for SQL Server, bare elsewhere.
    fn variable_name(&self, name: &str) -> String {
        if let Some(renamed) = name
            .strip_prefix('@')
            .and_then(|bare| self.renamed.get(&bare.to_lowercase()))
        {
            return renamed.clone();
        }
        let plain = is_plain_identifier(name);
        match self.target {
            DatabaseType::SqlServer if plain => format!("@{}", name),
            DatabaseType::SqlServer => name.to_string(),
            _ if name.starts_with('@') && !name.starts_with("@@") && is_plain_identifier(&name[1..]) => {
                name[1..].to_string()
            }
            _ => name.to_string(),
        }
    }

    /// Apply the owner rule to the schema part of a qualified name.
    fn qualify(&self, symbol: &str) -> String {
        let parts = split_qualified(symbol);
        if parts.len() < 2 {
            return symbol.to_string();
        }
        let name = parts[parts.len() - 1];
        let schema = parts[parts.len() - 2];
        let mut out: Vec<String> = Vec::new();
        if self.target.supports_schema() {
            out.extend(parts[..parts.len() - 2].iter().map(|p| p.to_string()));
        }
        if let Some(schema) = self.schema_for(schema) {
            out.push(schema);
        }
        out.push(name.to_string());
        out.join(".")
    }

    fn schema_for(&self, schema: &str) -> Option<String> {
        if !self.target.supports_schema() || schema.is_empty() {
            return None;
        }
        let bare = unquote(schema);
        match self.owner {
            Some(owner) if !owner.eq_ignore_ascii_case(bare) => Some(owner.to_string()),
            Some(_) => Some(schema.to_string()),
            None if self
                .source
                .default_schema()
                .is_some_and(|d| d.eq_ignore_ascii_case(bare)) =>
            {
                None
            }
            None => Some(schema.to_string()),
        }
    }

    fn requote(&self, symbol: &str) -> String {
        if !split_qualified(symbol).iter().any(|p| is_quoted(p)) {
            return symbol.to_string();
        }
        split_qualified(symbol)
            .into_iter()
            .map(|part| match is_quoted(part) {
                true => self.target.quote(unquote(part)),
                false => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn string_literal(&self, literal: &str) -> String {
        let mut text = literal.to_string();
        if self.source == DatabaseType::MySql {
            text = mysql_string(&text);
        }
        let national = text.starts_with("N'") || text.starts_with("n'");
        if national && !matches!(self.target, DatabaseType::SqlServer | DatabaseType::Oracle) {
            text.remove(0);
        }
        text
    }

    /// `+` between strings becomes `||` and back; MySQL gets `CONCAT(…)`.
    fn rewrite_concatenation(&self, token: &mut Token) {
        let runs = concat_runs(token.children(), self.source);
        if runs.is_empty() {
            return;
        }
        match self.target {
            DatabaseType::MySql => {
                let children = token.children();
                let mut parts: Vec<Token> = Vec::new();
                let mut i = 0;
                for (start, end) in &runs {
                    parts.extend(children[i..*start].iter().cloned());
                    let args: Vec<String> = children[*start..=*end].iter().step_by(2).map(Token::render).collect();
                    parts.push(Token::new(format!("CONCAT({})", args.join(", ")), TokenKind::FunctionCall));
                    i = end + 1;
                }
                parts.extend(children[i..].iter().cloned());
                let text = render_sequence(&parts);
                token.replace(text);
            }
            target => {
                let operator = if target == DatabaseType::SqlServer { "+" } else { "||" };
                for (start, end) in runs {
                    for child in &mut token.children_mut()[start..=end] {
                        if child.kind == TokenKind::Operator && matches!(child.symbol.as_str(), "+" | "||") {
                            child.symbol = operator.to_string();
                        }
                    }
                }
            }
        }
    }
}

impl TokenVisitor for TokenTranslator<'_> {
    fn visit_token(&mut self, token: &mut Token) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.translate_token(token) {
            self.error = Some(err);
        }
    }

    fn visit_name(&mut self, name: &mut NameToken) {
        if self.error.is_some() {
            return;
        }
        self.rewrite_name(name);
        if let Some(alias) = name.alias_mut() {
            alias.symbol = self.requote(&alias.symbol);
        }
    }
}

impl TokenTranslator<'_> {
    fn rewrite_name(&self, name: &mut NameToken) {
        let role = name.role();
        if matches!(role, NameRole::Table | NameRole::View | NameRole::Routine | NameRole::Trigger) {
            name.server = None;
            if !self.target.supports_schema() {
                name.database = None;
            }
            name.schema = name.schema.take().and_then(|s| self.schema_for(&s));
        }
        if role == NameRole::Table {
            let row = self.trigger_row(&name.token.symbol);
            name.token.symbol = row;
        }
        let mapped = match role {
            NameRole::Table | NameRole::View => self.names.and_then(|n| n.table(&name.qualified_name())),
            NameRole::Column => self.names.and_then(|n| n.column(&name.qualified_name())),
            _ => None,
        };
        if let Some(mapped) = mapped {
            name.token.symbol = mapped.to_string();
        }
        name.token.symbol = self.requote(&name.token.symbol);
        name.schema = name.schema.take().map(|s| self.requote(&s));
        name.database = name.database.take().map(|s| self.requote(&s));
    }
}

/// Names declared as variables or parameters, lower case without `@`.
fn declared_variables(script: &Script) -> HashSet<String> {
    script
        .tokens()
        .into_iter()
        .filter(|t| t.kind == TokenKind::Variable)
        .map(|t| t.symbol.trim_start_matches('@').to_lowercase())
        .filter(|s| is_plain_identifier(s))
        .collect()
}

/// `@` variables whose bare name is also a column of the script, mapped to a
/// `p_` (parameter) or `v_` (local) spelling that collides with nothing.
fn colliding_variables(script: &Script) -> HashMap<String, String> {
    let tokens = script.tokens();
    let columns: HashSet<String> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::ColumnName)
        .filter_map(|t| split_qualified(&t.symbol).last().map(|p| unquote(p).to_lowercase()))
        .collect();
    let parameters: HashSet<String> = match script {
        Script::Routine(routine) => routine
            .parameters
            .iter()
            .map(|p| p.name.symbol.trim_start_matches('@').to_lowercase())
            .collect(),
        _ => HashSet::new(),
    };
    let variables: HashSet<String> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Variable)
        .filter_map(|t| t.symbol.strip_prefix('@'))
        .filter(|bare| !bare.starts_with('@') && is_plain_identifier(bare))
        .map(str::to_lowercase)
        .collect();

    let mut renamed = HashMap::new();
    for bare in variables.iter().filter(|v| columns.contains(*v)) {
        let prefix = if parameters.contains(bare) { "p_" } else { "v_" };
        let mut candidate = format!("{}{}", prefix, bare);
        while columns.contains(&candidate) || variables.contains(&candidate) {
            candidate.insert_str(0, prefix);
        }
        debug!(variable = %bare, renamed = %candidate, "variable shares a column name, renamed");
        renamed.insert(bare.clone(), candidate);
    }
    renamed
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '#')
}

fn replace_last_part(symbol: &str, name: &str) -> String {
    let mut parts = split_qualified(symbol);
    parts.pop();
    parts.push(name);
    parts.join(".")
}

fn compact_upper(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase()
}

/// MySQL string literal in standard form: single quotes, doubled inner quotes.
fn mysql_string(literal: &str) -> String {
    let (quote, inner) = match literal.chars().next() {
        Some(q @ ('\'' | '"')) if literal.len() >= 2 && literal.ends_with(q) => (q, &literal[1..literal.len() - 1]),
        _ => return literal.to_string(),
    };
    let mut out = String::from("'");
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\'') => out.push_str("''"),
                Some('"') => out.push('"'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            c if c == quote && chars.peek() == Some(&quote) => {
                chars.next();
                out.push_str(if quote == '\'' { "''" } else { "\"" });
            }
            '\'' => out.push_str("''"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn is_operand(token: &Token) -> bool {
    !matches!(token.kind, TokenKind::Operator | TokenKind::Keyword | TokenKind::Punctuation)
}

/// Inclusive child ranges `operand (op operand)+` that concatenate strings.
fn concat_runs(children: &[Token], source: DatabaseType) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < children.len() {
        if !is_operand(&children[i]) {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i;
        let mut pipes = false;
        let mut plus = false;
        while end + 2 < children.len()
            && children[end + 1].kind == TokenKind::Operator
            && matches!(children[end + 1].symbol.as_str(), "+" | "||")
            && is_operand(&children[end + 2])
        {
            match children[end + 1].symbol.as_str() {
                "||" => pipes = true,
                _ => plus = true,
            }
            end += 2;
        }
        let has_string = children[start..=end]
            .iter()
            .step_by(2)
            .any(|t| t.kind == TokenKind::StringLiteral);
        let is_concat = end > start
            && match (pipes, plus) {
                (true, false) => source != DatabaseType::MySql,
                (false, true) => has_string,
                _ => false,
            };
        if is_concat {
            runs.push((start, end));
        }
        i = end + 1;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommonScript, ObjectKind, SetStatement, Statement};
    use pretty_assertions::assert_eq;

    fn translator(source: DatabaseType, target: DatabaseType) -> TokenTranslator<'static> {
        TokenTranslator::new(TranslationContext::builtin(), source, target)
    }

    fn call(name: &str, args: &[Token]) -> Token {
        let mut token = Token::new(format!("{}(…)", name), TokenKind::FunctionCall);
        token.add_child(Token::new(name, TokenKind::FunctionName));
        token.add_child(Token::new("(", TokenKind::Punctuation));
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                token.add_child(Token::new(",", TokenKind::Punctuation));
            }
            token.add_child(arg.clone());
        }
        token.add_child(Token::new(")", TokenKind::Punctuation));
        token
    }

    fn column(name: &str) -> Token {
        Token::new(name, TokenKind::ColumnName)
    }

    #[test]
    fn test_nested_calls_translate_inside_out() {
        let t = translator(DatabaseType::SqlServer, DatabaseType::Postgres);
        let getdate = call("GETDATE", &[]);
        let mut token = call("ISNULL", &[column("ShippedDate"), getdate]);
        t.translate_token(&mut token).unwrap();
        assert_eq!(token.render(), "COALESCE(ShippedDate, CURRENT_TIMESTAMP)");
    }

    #[test]
    fn test_function_without_target_is_an_error() {
        let t = translator(DatabaseType::SqlServer, DatabaseType::Oracle);
        let mut token = call("SCOPE_IDENTITY", &[]);
        let err = t.translate_token(&mut token).unwrap_err();
        assert!(matches!(err, TranslateError::MappingLookup { table: "function", .. }));
    }

    #[test]
    fn test_user_functions_are_kept() {
        let t = translator(DatabaseType::SqlServer, DatabaseType::MySql);
        let mut token = call("dbo.fn_total", &[Token::new("@id", TokenKind::Variable)]);
        t.translate_token(&mut token).unwrap();
        assert_eq!(token.render(), "fn_total(id)");
    }

    #[test]
    fn test_convert_uses_type_mapping() {
        let t = translator(DatabaseType::SqlServer, DatabaseType::Postgres);
        let nvarchar = call("NVARCHAR", &[Token::new("20", TokenKind::NumberLiteral)]);
        let mut token = call("CONVERT", &[nvarchar, column("Total")]);
        t.translate_token(&mut token).unwrap();
        assert_eq!(token.render(), "CAST(Total AS VARCHAR(20))");
    }

    #[test]
    fn test_variables_and_quotes() {
        let t = translator(DatabaseType::SqlServer, DatabaseType::Oracle);
        let mut rowcount = Token::new("@@ROWCOUNT", TokenKind::Variable);
        t.translate_token(&mut rowcount).unwrap();
        assert_eq!(rowcount.symbol, "SQL%ROWCOUNT");

        let mut local = Token::new("@Total", TokenKind::Variable);
        t.translate_token(&mut local).unwrap();
        assert_eq!(local.symbol, "Total");

        let mut quoted = Token::new("[o].[Order Date]", TokenKind::ColumnName);
        t.translate_token(&mut quoted).unwrap();
        assert_eq!(quoted.symbol, "\"o\".\"Order Date\"");
    }

    #[test]
    fn test_owner_rules() {
        let t = translator(DatabaseType::SqlServer, DatabaseType::Postgres);
        let mut table = Token::new("dbo.Orders", TokenKind::TableName);
        t.translate_token(&mut table).unwrap();
        assert_eq!(table.symbol, "Orders");

        let t = translator(DatabaseType::SqlServer, DatabaseType::Postgres).with_owner(Some("sales"));
        let mut table = Token::new("[dbo].[Orders]", TokenKind::TableName);
        t.translate_token(&mut table).unwrap();
        assert_eq!(table.symbol, "sales.\"Orders\"");

        let t = translator(DatabaseType::Postgres, DatabaseType::MySql);
        let mut table = Token::new("hr.employees", TokenKind::TableName);
        t.translate_token(&mut table).unwrap();
        assert_eq!(table.symbol, "employees");
    }

    #[test]
    fn test_concatenation() {
        let expression = |op: &str| {
            let mut e = Token::new("", TokenKind::Expression);
            e.add_child(Token::new("'Hello '", TokenKind::StringLiteral));
            e.add_child(Token::new(op, TokenKind::Operator));
            e.add_child(column("name"));
            e
        };

        let mut token = expression("+");
        translator(DatabaseType::SqlServer, DatabaseType::Postgres)
            .translate_token(&mut token)
            .unwrap();
        assert_eq!(token.render(), "'Hello ' || name");

        let mut token = expression("||");
        translator(DatabaseType::Oracle, DatabaseType::MySql)
            .translate_token(&mut token)
            .unwrap();
        assert_eq!(token.render(), "CONCAT('Hello ', name)");

        let mut token = expression("||");
        translator(DatabaseType::Postgres, DatabaseType::SqlServer)
            .translate_token(&mut token)
            .unwrap();
        assert_eq!(token.render(), "'Hello ' + name");
    }

    #[test]
    fn test_literals_and_hints() {
        let t = translator(DatabaseType::SqlServer, DatabaseType::MySql);
        let mut national = Token::new("N'abc'", TokenKind::StringLiteral);
        t.translate_token(&mut national).unwrap();
        assert_eq!(national.symbol, "'abc'");

        let mut hint = Token::new("WITH (NOLOCK)", TokenKind::Keyword);
        t.translate_token(&mut hint).unwrap();
        assert_eq!(hint.render(), "");

        let t = translator(DatabaseType::MySql, DatabaseType::Postgres);
        let mut quoted = Token::new("\"it's\"", TokenKind::StringLiteral);
        t.translate_token(&mut quoted).unwrap();
        assert_eq!(quoted.symbol, "'it''s'");
    }

    #[test]
    fn test_declared_variables_get_prefix() {
        let mut script = Script::Common(CommonScript {
            schema: None,
            name: None,
            statements: vec![
                Statement::Set(SetStatement {
                    name: Token::new("v_total", TokenKind::Variable),
                    value: Token::new("0", TokenKind::NumberLiteral),
                }),
                Statement::Set(SetStatement {
                    name: Token::new("v_count", TokenKind::Variable),
                    value: column("v_total"),
                }),
            ],
        });
        translator(DatabaseType::Oracle, DatabaseType::SqlServer)
            .translate(&mut script)
            .unwrap();
        let symbols: Vec<&str> = script.tokens().iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["@v_total", "0", "@v_count", "@v_total"]);
    }

    #[test]
    fn test_variables_sharing_a_column_name_are_renamed() {
        let text = "CREATE PROCEDURE p @id INT, @name VARCHAR(10) AS BEGIN \
                    DECLARE @total INT; \
                    UPDATE t SET name = @name WHERE id = @id; \
                    SELECT @total = total FROM t WHERE id = @id; END";
        let mut script = crate::parser::parse(text, DatabaseType::SqlServer, ObjectKind::Procedure).unwrap();
        translator(DatabaseType::SqlServer, DatabaseType::Postgres)
            .translate(&mut script)
            .unwrap();
        let variables: HashSet<&str> = script
            .tokens()
            .into_iter()
            .filter(|t| t.kind == TokenKind::Variable)
            .map(|t| t.symbol.as_str())
            .collect();
        assert_eq!(variables, HashSet::from(["p_id", "p_name", "v_total"]));
    }

    #[test]
    fn test_renamed_variable_avoids_existing_names() {
        let text = "CREATE PROCEDURE p @id INT AS BEGIN \
                    DECLARE @p_id INT; \
                    SET @p_id = 1; \
                    UPDATE t SET a = @p_id WHERE id = @id; END";
        let mut script = crate::parser::parse(text, DatabaseType::SqlServer, ObjectKind::Procedure).unwrap();
        translator(DatabaseType::SqlServer, DatabaseType::MySql)
            .translate(&mut script)
            .unwrap();
        let variables: HashSet<&str> = script
            .tokens()
            .into_iter()
            .filter(|t| t.kind == TokenKind::Variable)
            .map(|t| t.symbol.as_str())
            .collect();
        assert_eq!(variables, HashSet::from(["p_p_id", "p_id"]));
    }
}
