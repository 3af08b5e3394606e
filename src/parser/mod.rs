//! Statement-level grammar for routine definitions.
//!
//! The lexer (nom) turns text into lexemes; [`Parser`] walks them with
//! recursive descent per dialect and builds the [`crate::model`] tree.
//! Expressions are handed to [`expr::ExprBuilder`] as lexeme slices.

pub mod expr;
pub mod lexer;
mod procedural;
mod routine;

use std::ops::Range;

use crate::dialect::DatabaseType;
use crate::model::{
    ColumnDefinition, CreateTableStatement, DeleteStatement, DropStatement, InsertStatement,
    NameRole, NameToken, ObjectKind, OtherStatement, Script, SelectStatement, SetItem,
    SqlSyntaxError, SqlSyntaxErrorItem, Statement, Token, TokenKind, TransactionKind,
    TransactionStatement, TruncateStatement, UnionClause, UpdateStatement, ValuesRow,
};

pub use expr::{ExprBuilder, ExprContext};
pub use lexer::{Lexeme, LexemeKind};

type PResult<T> = Result<T, SqlSyntaxErrorItem>;

/// Words that begin a T-SQL statement; statements need no terminator there.
const TSQL_STATEMENTS: &[&str] = &[
    "ALTER", "BEGIN", "BREAK", "CLOSE", "COMMIT", "CONTINUE", "CREATE", "DEALLOCATE", "DECLARE",
    "DELETE", "DROP", "ELSE", "END", "EXEC", "EXECUTE", "FETCH", "GOTO", "IF", "INSERT", "MERGE",
    "OPEN", "PRINT", "RAISERROR", "RETURN", "ROLLBACK", "SAVE", "SELECT", "SET", "THROW",
    "TRUNCATE", "UPDATE", "USE", "WAITFOR", "WHILE", "WITH",
];

/// Words closing a statement list of a block.
const BLOCK_END: &[&str] = &["END", "ELSE", "ELSIF", "ELSEIF", "WHEN", "EXCEPTION", "UNTIL"];

/// Clause words that end a select list or clause.
const SELECT_CLAUSES: &[&str] = &[
    "FROM", "INTO", "WHERE", "GROUP", "HAVING", "ORDER", "UNION", "EXCEPT", "INTERSECT", "MINUS",
    "LIMIT", "OFFSET", "FETCH", "FOR", "LOCK", "WINDOW",
];

fn word_in(l: &Lexeme, words: &[&str]) -> bool {
    l.kind == LexemeKind::Word && words.iter().any(|w| l.text.eq_ignore_ascii_case(w))
}

/// Parse a definition of `kind` written in `dialect`.
pub fn parse(source: &str, dialect: DatabaseType, kind: ObjectKind) -> Result<Script, SqlSyntaxError> {
    let mut parser = Parser::new(source, dialect)?;
    let parsed = match kind {
        ObjectKind::Common => parser.parse_common().map(Script::Common),
        ObjectKind::View => parser.parse_view().map(Script::View),
        ObjectKind::Procedure => parser.parse_routine(crate::model::RoutineKind::Procedure).map(Script::Routine),
        ObjectKind::Function => parser.parse_routine(crate::model::RoutineKind::Function).map(Script::Routine),
        ObjectKind::Trigger => parser.parse_trigger().map(Script::Trigger),
    };
    parsed.map_err(SqlSyntaxError::new)
}

/// Object kind a definition declares in its header, `Common` when there is none.
pub fn detect_kind(source: &str, dialect: DatabaseType) -> ObjectKind {
    let Ok(lexemes) = lexer::tokenize(source, dialect) else {
        return ObjectKind::Common;
    };
    let lexemes = lexer::significant(&lexemes);
    if !lexemes
        .first()
        .is_some_and(|l| l.is_word("CREATE") || l.is_word("ALTER"))
    {
        return ObjectKind::Common;
    }
    for l in lexemes.iter().take(12) {
        if l.is_word("PROCEDURE") || l.is_word("PROC") {
            return ObjectKind::Procedure;
        }
        if l.is_word("FUNCTION") {
            // PostgreSQL trigger definitions start with their trigger function.
            if lexemes.iter().any(|x| x.is_word("TRIGGER")) && lexemes.iter().any(|x| x.is_word("EXECUTE")) {
                return ObjectKind::Trigger;
            }
            return ObjectKind::Function;
        }
        if l.is_word("VIEW") {
            return ObjectKind::View;
        }
        if l.is_word("TRIGGER") {
            return ObjectKind::Trigger;
        }
        if l.is_word("TABLE") {
            return ObjectKind::Common;
        }
    }
    ObjectKind::Common
}

/// Recursive-descent parser over significant lexemes.
pub struct Parser<'a> {
    dialect: DatabaseType,
    source: &'a str,
    lx: Vec<Lexeme<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, dialect: DatabaseType) -> Result<Self, SqlSyntaxError> {
        Self::from_range(source, 0..source.len(), dialect)
    }

    /// A parser over part of `source`, e.g. the inside of a `$$` body.
    pub fn from_range(source: &'a str, range: Range<usize>, dialect: DatabaseType) -> Result<Self, SqlSyntaxError> {
        let lexemes = lexer::tokenize_range(source, range, dialect)?;
        Ok(Self {
            dialect,
            source,
            lx: lexer::significant(&lexemes),
            pos: 0,
        })
    }

    pub fn dialect(&self) -> DatabaseType {
        self.dialect
    }

    // ---- cursor -------------------------------------------------------

    fn peek(&self) -> Option<&Lexeme<'a>> {
        self.lx.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Lexeme<'a>> {
        self.lx.get(self.pos + offset)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.lx.len()
    }

    fn advance(&mut self) -> Option<Lexeme<'a>> {
        let l = self.lx.get(self.pos).copied();
        if l.is_some() {
            self.pos += 1;
        }
        l
    }

    fn at_word(&self, word: &str) -> bool {
        self.peek().is_some_and(|l| l.is_word(word))
    }

    fn at_words(&self, words: &[&str]) -> bool {
        words
            .iter()
            .enumerate()
            .all(|(i, w)| self.peek_at(i).is_some_and(|l| l.is_word(w)))
    }

    fn at_any_word(&self, words: &[&str]) -> bool {
        self.peek().is_some_and(|l| word_in(l, words))
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if self.at_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_words(&mut self, words: &[&str]) -> bool {
        if self.at_words(words) {
            self.pos += words.len();
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, word: &str) -> PResult<Lexeme<'a>> {
        match self.peek() {
            Some(l) if l.is_word(word) => {
                let l = *l;
                self.pos += 1;
                Ok(l)
            }
            _ => Err(self.error_here(format!("expected {}", word))),
        }
    }

    fn at_punct(&self, punct: &str) -> bool {
        self.peek().is_some_and(|l| l.is_punct(punct))
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: &str) -> PResult<Lexeme<'a>> {
        match self.peek() {
            Some(l) if l.is_punct(punct) => {
                let l = *l;
                self.pos += 1;
                Ok(l)
            }
            _ => Err(self.error_here(format!("expected '{}'", punct))),
        }
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek().is_some_and(|l| l.is_op(op))
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Error positioned at the current lexeme, or at the end of input.
    fn error_here(&self, message: impl Into<String>) -> SqlSyntaxErrorItem {
        match self.peek() {
            Some(l) => {
                let message = format!("{} near '{}'", message.into(), l.text);
                lexer::error_item(self.source, l.start, l.stop, message)
            }
            None => {
                let end = self.lx.last().map_or(0, |l| l.end());
                lexer::error_item(self.source, end, end, format!("{} at end of input", message.into()))
            }
        }
    }

    // ---- expressions --------------------------------------------------

    fn builder(&self) -> ExprBuilder<'a> {
        ExprBuilder::new(self.source)
    }

    fn expr(&self, range: Range<usize>, context: ExprContext) -> Token {
        self.builder().build(&self.lx[range], context)
    }

    fn expr_list(&self, range: Range<usize>, context: ExprContext) -> Vec<Token> {
        self.builder().build_list(&self.lx[range], context)
    }

    fn is_statement_start(&self, idx: usize) -> bool {
        if self.dialect != DatabaseType::SqlServer {
            return false;
        }
        let Some(l) = self.lx.get(idx) else {
            return false;
        };
        if !word_in(l, TSQL_STATEMENTS) {
            return false;
        }
        let next = self.lx.get(idx + 1);
        if l.is_word("UPDATE") {
            return !next.is_some_and(|n| n.is_punct("("));
        }
        if l.is_word("WITH") {
            return next.is_some_and(|n| n.kind == LexemeKind::Word || n.kind == LexemeKind::QuotedIdent);
        }
        true
    }

    /// Consume an expression up to a top-level `;`, unbalanced `)`, block end,
    /// T-SQL statement start, or a lexeme matching `stop`.
    fn collect(&mut self, stop: &dyn Fn(&Lexeme) -> bool) -> Range<usize> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut case_depth = 0usize;
        while let Some(l) = self.lx.get(self.pos) {
            if depth == 0 && case_depth == 0 {
                if l.is_punct(";") || l.is_punct(")") || stop(l) {
                    break;
                }
                if self.pos > start && (word_in(l, BLOCK_END) || self.is_statement_start(self.pos)) {
                    break;
                }
            }
            if l.is_punct("(") {
                depth += 1;
            } else if l.is_punct(")") {
                depth -= 1;
            } else if l.is_word("CASE") {
                case_depth += 1;
            } else if l.is_word("END") && case_depth > 0 {
                case_depth -= 1;
            }
            self.pos += 1;
        }
        start..self.pos
    }

    /// Consume everything up to the next top-level `;`.
    fn collect_raw(&mut self) -> Range<usize> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(l) = self.lx.get(self.pos) {
            if depth == 0 && l.is_punct(";") {
                break;
            }
            if l.is_punct("(") {
                depth += 1;
            } else if l.is_punct(")") {
                depth = depth.saturating_sub(1);
            }
            self.pos += 1;
        }
        start..self.pos
    }

    fn require_expr(&mut self, stop: &dyn Fn(&Lexeme) -> bool, what: &str) -> PResult<Token> {
        let range = self.collect(stop);
        if range.is_empty() {
            return Err(self.error_here(format!("expected {}", what)));
        }
        Ok(self.expr(range, ExprContext::General))
    }

    fn name(&mut self, role: NameRole) -> PResult<NameToken> {
        if self.peek().is_some_and(|l| l.kind == LexemeKind::Word && expr::is_keyword(l.text)) {
            return Err(self.error_here("expected a name"));
        }
        match expr::name_token(&self.lx, self.pos, role) {
            Some((name, next)) => {
                self.pos = next;
                Ok(name)
            }
            None => Err(self.error_here("expected a name")),
        }
    }

    /// A single-part name as a token of `kind`.
    fn simple_name(&mut self, kind: TokenKind) -> PResult<Token> {
        match self.peek() {
            Some(l) if l.is_name() => {
                let token = Token::with_span(l.text, kind, l.start, l.stop);
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.error_here("expected a name")),
        }
    }

    fn data_type(&mut self) -> PResult<Token> {
        match expr::data_type(&self.lx, self.pos) {
            Some((token, next)) => {
                self.pos = next;
                Ok(token)
            }
            None => Err(self.error_here("expected a data type")),
        }
    }

    /// Optional alias after a table name; `stop` words are never aliases.
    fn table_alias(&mut self, name: &mut NameToken, stop: &[&str]) {
        let has_as = self.at_word("AS");
        let candidate = self.peek_at(usize::from(has_as));
        if let Some(l) = candidate {
            let usable = matches!(l.kind, LexemeKind::Word | LexemeKind::QuotedIdent)
                && !expr::is_keyword(l.text)
                && !word_in(l, stop)
                && !self.is_statement_start(self.pos + usize::from(has_as));
            if usable {
                name.set_alias(l.text);
                self.pos += 1 + usize::from(has_as);
            }
        }
    }

    /// Statement kept as an expression. T-SQL needs no terminator, so there it
    /// ends at the next statement keyword (except `MERGE`, which requires `;`).
    fn other(&mut self, dialect: Option<DatabaseType>) -> PResult<Statement> {
        let range = if self.dialect == DatabaseType::SqlServer && !self.at_word("MERGE") {
            let start = self.pos;
            self.pos += 1;
            self.collect(&|_| false);
            start..self.pos
        } else {
            self.collect_raw()
        };
        if range.is_empty() {
            return Err(self.error_here("expected a statement"));
        }
        Ok(Statement::Other(OtherStatement {
            content: self.expr(range, ExprContext::General),
            dialect,
        }))
    }

    /// Statement meaningful only in the source dialect.
    fn dialect_other(&mut self) -> PResult<Statement> {
        self.other(Some(self.dialect))
    }

    // ---- statement lists ----------------------------------------------

    /// Statements up to the end of input or a word in `terminators`.
    fn statements_until(&mut self, terminators: &[&str]) -> PResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            while self.eat_punct(";") {}
            if self.at_end() || self.at_any_word(terminators) {
                break;
            }
            let before = self.pos;
            statements.extend(self.statement()?);
            if self.pos == before {
                return Err(self.error_here("unexpected input"));
            }
            self.eat_punct(";");
        }
        Ok(statements)
    }

    /// Parse a plain statement script.
    pub fn parse_common(&mut self) -> PResult<crate::model::CommonScript> {
        let statements = self.statements_until(&[])?;
        Ok(crate::model::CommonScript {
            schema: None,
            name: None,
            statements,
        })
    }

    /// One statement; declarations may expand to several.
    fn statement(&mut self) -> PResult<Vec<Statement>> {
        let Some(first) = self.peek().copied() else {
            return Err(self.error_here("expected a statement"));
        };
        if first.kind == LexemeKind::Word {
            let upper = first.text.to_uppercase();
            let single = match upper.as_str() {
                "SELECT" => Some(self.select_statement()?),
                "WITH" if !self.peek_at(1).is_some_and(|l| l.is_punct("(")) => Some(self.select_statement()?),
                "INSERT" => Some(self.insert()?),
                "UPDATE" => Some(self.update()?),
                "DELETE" => Some(self.delete()?),
                "TRUNCATE" => Some(self.truncate()?),
                "DROP" => Some(self.drop_statement()?),
                "CREATE" => Some(self.create()?),
                "COMMIT" => {
                    self.pos += 1;
                    self.skip_transaction_words();
                    Some(Statement::Transaction(TransactionStatement {
                        kind: TransactionKind::Commit,
                    }))
                }
                "ROLLBACK" if !self.rollback_to_savepoint() => {
                    self.pos += 1;
                    self.skip_transaction_words();
                    Some(Statement::Transaction(TransactionStatement {
                        kind: TransactionKind::Rollback,
                    }))
                }
                "START" if self.at_words(&["START", "TRANSACTION"]) => {
                    self.pos += 2;
                    Some(Statement::Transaction(TransactionStatement {
                        kind: TransactionKind::Begin,
                    }))
                }
                "MERGE" | "ALTER" | "GRANT" | "REVOKE" | "LOCK" | "ANALYZE" | "VACUUM" => {
                    Some(self.other(None)?)
                }
                _ => None,
            };
            if let Some(statement) = single {
                return Ok(vec![statement]);
            }
        }
        self.procedural_statement()
    }

    fn skip_transaction_words(&mut self) {
        while self.at_any_word(&["TRAN", "TRANSACTION", "WORK"]) {
            self.pos += 1;
        }
        if self.dialect == DatabaseType::SqlServer
            && self.peek().is_some_and(|l| l.is_name() && !self.is_statement_start(self.pos))
        {
            self.pos += 1;
        }
    }

    fn rollback_to_savepoint(&self) -> bool {
        (1..4)
            .map_while(|i| self.peek_at(i).filter(|l| !l.is_punct(";")))
            .any(|l| l.is_word("TO"))
    }

    // ---- DML ----------------------------------------------------------

    fn select_statement(&mut self) -> PResult<Statement> {
        let select = self.select()?;
        if self.dialect == DatabaseType::Sqlite {
            if let Some(raise) = procedural::sqlite_raise(&select) {
                return Ok(raise);
            }
        }
        Ok(Statement::Select(select))
    }

    pub(crate) fn select(&mut self) -> PResult<SelectStatement> {
        let mut select = SelectStatement::new(Vec::new());
        if self.at_word("WITH") {
            let start = self.pos;
            self.pos += 1;
            self.eat_word("RECURSIVE");
            loop {
                self.simple_name(TokenKind::TableName)?;
                if self.at_punct("(") {
                    self.skip_group()?;
                }
                self.expect_word("AS")?;
                self.eat_words(&["NOT", "MATERIALIZED"]);
                self.eat_word("MATERIALIZED");
                self.skip_group()?;
                if !self.eat_punct(",") {
                    break;
                }
            }
            select.with = Some(self.expr(start..self.pos, ExprContext::General));
        }
        self.expect_word("SELECT")?;
        self.select_rest(select)
    }

    /// Everything after the `SELECT` keyword (or PL/pgSQL `PERFORM`).
    fn select_rest(&mut self, mut select: SelectStatement) -> PResult<SelectStatement> {
        if self.eat_word("DISTINCT") {
            select.distinct = true;
        } else {
            self.eat_word("ALL");
        }
        if self.dialect == DatabaseType::SqlServer && self.eat_word("TOP") {
            let range = if self.eat_punct("(") {
                let range = self.collect(&|_| false);
                self.expect_punct(")")?;
                range
            } else {
                let start = self.pos;
                self.advance();
                start..self.pos
            };
            select.limit = Some(self.expr(range, ExprContext::General));
            select.limit_percent = self.eat_word("PERCENT");
            self.eat_words(&["WITH", "TIES"]);
        }

        let clause_stop = |l: &Lexeme| word_in(l, SELECT_CLAUSES);
        let columns = self.collect(&clause_stop);
        for part in expr::split_top_level(&self.lx[columns.clone()], ",") {
            if part.is_empty() {
                continue;
            }
            // T-SQL `SELECT @v = expr`
            let assignment = self.dialect == DatabaseType::SqlServer
                && part.len() > 2
                && part[0].kind == LexemeKind::Variable
                && part[1].is_op("=");
            if assignment {
                select
                    .into
                    .push(Token::with_span(part[0].text, TokenKind::Variable, part[0].start, part[0].stop));
                select.columns.push(self.builder().build(&part[2..], ExprContext::General));
            } else {
                select.columns.push(self.builder().build(part, ExprContext::SelectColumn));
            }
        }
        if select.columns.is_empty() {
            return Err(self.error_here("expected a select list"));
        }

        if self.eat_word("INTO") {
            let range = self.collect(&clause_stop);
            let context = if self.dialect == DatabaseType::SqlServer {
                ExprContext::TableList
            } else {
                ExprContext::General
            };
            select.into = self.expr_list(range, context);
        }
        if self.eat_word("FROM") {
            let range = self.collect(&clause_stop);
            select.from = Some(self.expr(range, ExprContext::TableList));
        }
        if self.eat_word("WHERE") {
            select.where_clause = Some(self.require_expr(&clause_stop, "a condition")?);
        }
        if self.eat_words(&["GROUP", "BY"]) {
            select.group_by = Some(self.require_expr(&clause_stop, "a grouping")?);
        }
        if self.eat_word("HAVING") {
            select.having = Some(self.require_expr(&clause_stop, "a condition")?);
        }
        if self.eat_words(&["ORDER", "BY"]) {
            select.order_by = Some(self.require_expr(&clause_stop, "an ordering")?);
        }
        self.limit_clauses(&mut select)?;

        if self.at_word("FOR") && self.dialect == DatabaseType::SqlServer {
            if self
                .peek_at(1)
                .is_some_and(|l| word_in(l, &["XML", "JSON", "BROWSE"]))
            {
                return Err(self.error_here("unsupported FOR clause in select"));
            }
        }
        if self.at_word("FOR") || self.at_word("LOCK") {
            let range = self.collect(&|l| word_in(l, &["UNION", "EXCEPT", "INTERSECT", "MINUS"]));
            select.tail = Some(self.expr(range, ExprContext::General));
        }

        if self.at_any_word(&["UNION", "EXCEPT", "INTERSECT", "MINUS"]) {
            let start = self.pos;
            self.pos += 1;
            self.eat_word("ALL");
            self.eat_word("DISTINCT");
            let operator = Token::with_span(
                self.lx[start..self.pos]
                    .iter()
                    .map(|l| l.text.to_uppercase())
                    .collect::<Vec<_>>()
                    .join(" "),
                TokenKind::Keyword,
                self.lx[start].start,
                self.lx[self.pos - 1].stop,
            );
            let parenthesised = self.eat_punct("(");
            let next = self.select()?;
            if parenthesised {
                self.expect_punct(")")?;
            }
            select.union = Some(Box::new(UnionClause {
                operator,
                select: next,
            }));
        }
        Ok(select)
    }

    fn limit_clauses(&mut self, select: &mut SelectStatement) -> PResult<()> {
        let clause_stop = |l: &Lexeme| word_in(l, SELECT_CLAUSES);
        if self.eat_word("LIMIT") {
            let range = self.collect(&clause_stop);
            let parts = expr::split_top_level(&self.lx[range.clone()], ",");
            if parts.len() == 2 {
                // MySQL `LIMIT offset, count`
                select.offset = Some(self.builder().build(parts[0], ExprContext::General));
                select.limit = Some(self.builder().build(parts[1], ExprContext::General));
            } else {
                select.limit = Some(self.expr(range, ExprContext::General));
            }
        }
        if self.eat_word("OFFSET") {
            let range = self.collect(&|l| clause_stop(l) || word_in(l, &["ROW", "ROWS"]));
            select.offset = Some(self.expr(range, ExprContext::General));
            self.eat_word("ROWS");
            self.eat_word("ROW");
        }
        if self.at_word("FETCH") && self.peek_at(1).is_some_and(|l| word_in(l, &["FIRST", "NEXT"])) {
            self.pos += 2;
            let range = self.collect(&|l| word_in(l, &["ROW", "ROWS", "PERCENT"]));
            let percent = self.eat_word("PERCENT");
            self.eat_word("ROWS");
            self.eat_word("ROW");
            self.eat_word("ONLY");
            self.eat_words(&["WITH", "TIES"]);
            select.limit = Some(self.expr(range, ExprContext::General));
            select.limit_percent = percent;
        }
        Ok(())
    }

    /// Skip a balanced parenthesised group.
    fn skip_group(&mut self) -> PResult<Range<usize>> {
        if !self.at_punct("(") {
            return Err(self.error_here("expected '('"));
        }
        let close = expr::matching_paren(&self.lx, self.pos);
        if close >= self.lx.len() {
            return Err(self.error_here("unbalanced parenthesis"));
        }
        let inner = self.pos + 1..close;
        self.pos = close + 1;
        Ok(inner)
    }

    fn insert(&mut self) -> PResult<Statement> {
        let start = self.pos;
        self.expect_word("INSERT")?;
        self.eat_word("IGNORE");
        self.eat_word("INTO");
        let table = self.name(NameRole::Table)?;
        let mut columns = Vec::new();
        if self.at_punct("(") && !self.peek_at(1).is_some_and(|l| l.is_word("SELECT")) {
            let inner = self.skip_group()?;
            columns = self.expr_list(inner, ExprContext::General);
        }
        let mut insert = InsertStatement {
            table,
            columns,
            values: Vec::new(),
            select: None,
        };
        if self.eat_word("VALUES") || self.eat_word("VALUE") {
            loop {
                let inner = self.skip_group()?;
                insert.values.push(ValuesRow {
                    values: self.expr_list(inner, ExprContext::General),
                });
                if !self.eat_punct(",") {
                    break;
                }
            }
        } else if self.at_word("SELECT") || self.at_word("WITH") {
            insert.select = Some(Box::new(self.select()?));
        } else if self.at_punct("(") {
            let inner = self.skip_group()?;
            let mut nested = Parser {
                dialect: self.dialect,
                source: self.source,
                lx: self.lx[inner].to_vec(),
                pos: 0,
            };
            insert.select = Some(Box::new(nested.select()?));
        } else {
            self.pos = start;
            return self.other(Some(self.dialect));
        }
        if !self.at_statement_end() {
            // `ON DUPLICATE KEY UPDATE`, `RETURNING` …
            self.pos = start;
            return self.other(Some(self.dialect));
        }
        Ok(Statement::Insert(insert))
    }

    fn at_statement_end(&self) -> bool {
        self.at_end()
            || self.at_punct(";")
            || self.peek().is_some_and(|l| word_in(l, BLOCK_END))
            || self.is_statement_start(self.pos)
    }

    fn update(&mut self) -> PResult<Statement> {
        self.expect_word("UPDATE")?;
        let mut table = self.name(NameRole::Table)?;
        self.table_alias(&mut table, &["SET"]);
        let joins = if self.at_word("SET") {
            None
        } else {
            let range = self.collect(&|l| l.is_word("SET"));
            Some(self.expr(range, ExprContext::TableList))
        };
        self.expect_word("SET")?;
        let mut items = Vec::new();
        loop {
            items.push(self.set_item()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        let stop = |l: &Lexeme| word_in(l, &["FROM", "WHERE", "RETURNING", "OUTPUT"]);
        let from = if self.eat_word("FROM") {
            let range = self.collect(&stop);
            Some(self.expr(range, ExprContext::TableList))
        } else {
            None
        };
        let where_clause = if self.eat_word("WHERE") {
            Some(self.require_expr(&stop, "a condition")?)
        } else {
            None
        };
        Ok(Statement::Update(UpdateStatement {
            table,
            joins,
            items,
            from,
            where_clause,
        }))
    }

    fn set_item(&mut self) -> PResult<SetItem> {
        let stop = |l: &Lexeme| l.is_punct(",") || word_in(l, &["FROM", "WHERE", "RETURNING", "OUTPUT"]);
        if self.at_punct("(") {
            let names = self.skip_group()?;
            let names = self.expr_list(names, ExprContext::General);
            if !self.eat_op("=") {
                return Err(self.error_here("expected '='"));
            }
            self.expect_punct("(")?;
            let subquery = self.select()?;
            self.expect_punct(")")?;
            return Ok(SetItem {
                names,
                value: None,
                subquery: Some(Box::new(subquery)),
            });
        }
        let start = self.pos;
        let end = expr::name_end(&self.lx, start);
        if !self.peek().is_some_and(|l| l.is_name()) {
            return Err(self.error_here("expected a column"));
        }
        let name = self.expr(start..end, ExprContext::General);
        self.pos = end;
        let compound = self
            .peek()
            .filter(|l| matches!(l.text, "+=" | "-=" | "*=" | "/="))
            .map(|l| l.text[..1].to_string());
        if compound.is_none() && !self.eat_op("=") {
            return Err(self.error_here("expected '='"));
        }
        if compound.is_some() {
            self.pos += 1;
        }
        let value = self.require_expr(&stop, "a value")?;
        let value = match compound {
            Some(op) => compound_value(&name, &op, value),
            None => value,
        };
        Ok(SetItem {
            names: vec![name],
            value: Some(value),
            subquery: None,
        })
    }

    fn delete(&mut self) -> PResult<Statement> {
        self.expect_word("DELETE")?;
        self.eat_word("FROM");
        let mut table = self.name(NameRole::Table)?;
        self.table_alias(&mut table, &["FROM", "USING", "WHERE"]);
        let stop = |l: &Lexeme| word_in(l, &["WHERE", "RETURNING", "OUTPUT"]);
        let from = if self.eat_word("FROM") || self.eat_word("USING") {
            let range = self.collect(&stop);
            Some(self.expr(range, ExprContext::TableList))
        } else {
            None
        };
        let where_clause = if self.eat_word("WHERE") {
            Some(self.require_expr(&stop, "a condition")?)
        } else {
            None
        };
        Ok(Statement::Delete(DeleteStatement {
            table,
            from,
            where_clause,
        }))
    }

    fn truncate(&mut self) -> PResult<Statement> {
        self.expect_word("TRUNCATE")?;
        self.eat_word("TABLE");
        let table = self.name(NameRole::Table)?;
        Ok(Statement::Truncate(TruncateStatement { table }))
    }

    fn drop_statement(&mut self) -> PResult<Statement> {
        let start = self.pos;
        self.expect_word("DROP")?;
        self.eat_word("TEMPORARY");
        let Some(kind) = self.peek().copied() else {
            return Err(self.error_here("expected an object type"));
        };
        let role = match kind.text.to_uppercase().as_str() {
            "TABLE" => NameRole::Table,
            "VIEW" => NameRole::View,
            "PROCEDURE" | "PROC" | "FUNCTION" => NameRole::Routine,
            "TRIGGER" => NameRole::Trigger,
            _ => {
                self.pos = start;
                return self.other(None);
            }
        };
        self.pos += 1;
        let if_exists = self.eat_words(&["IF", "EXISTS"]);
        let name = self.name(role)?;
        if !self.at_statement_end() {
            self.pos = start;
            return self.other(None);
        }
        Ok(Statement::Drop(DropStatement {
            object_type: kind.text.to_uppercase(),
            name,
            if_exists,
        }))
    }

    fn create(&mut self) -> PResult<Statement> {
        let start = self.pos;
        self.expect_word("CREATE")?;
        let global = self.eat_word("GLOBAL") || self.eat_word("LOCAL");
        let temporary = self.eat_word("TEMPORARY") || self.eat_word("TEMP") || global;
        if !self.eat_word("TABLE") {
            self.pos = start;
            return self.other(None);
        }
        self.eat_words(&["IF", "NOT", "EXISTS"]);
        let table = self.name(NameRole::Table)?;
        if !self.at_punct("(") {
            self.pos = start;
            return self.other(None);
        }
        let inner = self.skip_group()?;
        let mut statement = CreateTableStatement {
            temporary: temporary || table.bare_name().starts_with('#'),
            table,
            columns: Vec::new(),
            constraints: Vec::new(),
        };
        let lexemes = self.lx[inner].to_vec();
        for part in expr::split_top_level(&lexemes, ",") {
            if part.is_empty() {
                continue;
            }
            if word_in(&part[0], &["CONSTRAINT", "PRIMARY", "FOREIGN", "UNIQUE", "CHECK", "INDEX", "KEY"]) {
                statement.constraints.push(self.builder().build(part, ExprContext::General));
                continue;
            }
            statement.columns.push(self.column_definition(part)?);
        }
        // table options (`ON COMMIT …`, `ENGINE = …`) are dropped
        self.collect_raw();
        Ok(Statement::CreateTable(statement))
    }

    pub(crate) fn column_definition(&self, part: &[Lexeme]) -> PResult<ColumnDefinition> {
        let first = &part[0];
        if !first.is_name() {
            return Err(lexer::error_item(self.source, first.start, first.stop, "expected a column name"));
        }
        let name = Token::with_span(first.text, TokenKind::ColumnName, first.start, first.stop);
        let Some((data_type, next)) = expr::data_type(part, 1) else {
            let at = part.get(1).unwrap_or(first);
            return Err(lexer::error_item(self.source, at.start, at.stop, "expected a data type"));
        };
        let options = if next < part.len() {
            Some(self.builder().build(&part[next..], ExprContext::General))
        } else {
            None
        };
        Ok(ColumnDefinition {
            name,
            data_type,
            options,
        })
    }
}

/// `name op= value` as `name op value`.
fn compound_value(name: &Token, op: &str, value: Token) -> Token {
    let mut expr = Token::new("", TokenKind::Expression);
    expr.add_child(name.clone());
    expr.add_child(Token::new(op, TokenKind::Operator));
    expr.add_child(value);
    expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Script, Statement};

    fn common(text: &str, dialect: DatabaseType) -> Vec<Statement> {
        match parse(text, dialect, ObjectKind::Common).unwrap() {
            Script::Common(script) => script.statements,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_tsql_statements_without_semicolons() {
        let statements = common(
            "SET NOCOUNT ON SELECT @total = SUM(Amount) FROM dbo.Orders WHERE CustomerId = @id UPDATE Orders SET Flag = 1",
            DatabaseType::SqlServer,
        );
        assert_eq!(statements.len(), 3);
        match &statements[1] {
            Statement::Select(select) => {
                assert_eq!(select.into[0].symbol, "@total");
                assert_eq!(select.columns[0].render(), "SUM(Amount)");
                assert!(select.where_clause.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_select_top_and_limit() {
        let statements = common("SELECT TOP 10 a FROM t ORDER BY a", DatabaseType::SqlServer);
        let Statement::Select(select) = &statements[0] else { unreachable!() };
        assert_eq!(select.limit.as_ref().unwrap().symbol, "10");

        let statements = common("SELECT a FROM t LIMIT 5, 10;", DatabaseType::MySql);
        let Statement::Select(select) = &statements[0] else { unreachable!() };
        assert_eq!(select.offset.as_ref().unwrap().symbol, "5");
        assert_eq!(select.limit.as_ref().unwrap().symbol, "10");
    }

    #[test]
    fn test_for_xml_is_rejected() {
        let err = parse("SELECT a FROM t FOR XML PATH('')", DatabaseType::SqlServer, ObjectKind::Common).unwrap_err();
        assert!(err.items()[0].message.contains("FOR clause"));
    }

    #[test]
    fn test_composite_update() {
        let statements = common(
            "UPDATE emp e SET (salary, bonus) = (SELECT s.salary, s.bonus FROM stage s WHERE s.id = e.id);",
            DatabaseType::Oracle,
        );
        let Statement::Update(update) = &statements[0] else { unreachable!() };
        assert!(update.is_composite());
        assert_eq!(update.table.alias().unwrap().symbol, "e");
        assert_eq!(update.items[0].names.len(), 2);
    }

    #[test]
    fn test_insert_values_and_select() {
        let statements = common(
            "INSERT INTO log (id, msg) VALUES (1, 'a'), (2, 'b'); INSERT INTO archive SELECT * FROM log;",
            DatabaseType::Postgres,
        );
        let Statement::Insert(first) = &statements[0] else { unreachable!() };
        assert_eq!(first.values.len(), 2);
        let Statement::Insert(second) = &statements[1] else { unreachable!() };
        assert!(second.select.is_some());
    }

    #[test]
    fn test_create_temp_table() {
        let statements = common("CREATE TABLE #work (id INT NOT NULL, name NVARCHAR(50))", DatabaseType::SqlServer);
        let Statement::CreateTable(create) = &statements[0] else { unreachable!() };
        assert!(create.temporary);
        assert_eq!(create.columns[1].data_type.symbol, "NVARCHAR(50)");
        assert_eq!(create.columns[0].options.as_ref().unwrap().render(), "NOT NULL");
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse("SELECT a FROM t;\nUPDATE SET x = 1;", DatabaseType::MySql, ObjectKind::Common).unwrap_err();
        let item = &err.items()[0];
        assert_eq!(item.line, 2);
        assert_eq!(item.column, 8);
        assert_eq!(item.text, "SET");
        assert!(item.message.starts_with("expected a name"));
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind("CREATE OR ALTER PROCEDURE p AS SELECT 1", DatabaseType::SqlServer), ObjectKind::Procedure);
        assert_eq!(detect_kind("create view v as select 1", DatabaseType::MySql), ObjectKind::View);
        assert_eq!(detect_kind("SELECT 1", DatabaseType::Oracle), ObjectKind::Common);
    }
}
