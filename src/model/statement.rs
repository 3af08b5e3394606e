//! Statements of a routine body.

use serde::Serialize;

use super::token::{NameToken, Token};
use crate::dialect::DatabaseType;

/// Receives every token owned by a statement or script, in document order.
pub trait TokenVisitor {
    fn visit_token(&mut self, token: &mut Token);

    fn visit_name(&mut self, name: &mut NameToken) {
        self.visit_token(&mut name.token);
        if let Some(alias) = name.alias_mut() {
            self.visit_token(alias);
        }
    }
}

impl<F> TokenVisitor for F
where
    F: FnMut(&mut Token),
{
    fn visit_token(&mut self, token: &mut Token) {
        self(token)
    }
}

/// A part of the tree that owns tokens.
pub trait AstNode {
    fn accept(&mut self, visitor: &mut dyn TokenVisitor);

    fn gather<'a>(&'a self, out: &mut Vec<&'a Token>);
}

impl AstNode for Token {
    fn accept(&mut self, visitor: &mut dyn TokenVisitor) {
        visitor.visit_token(self);
    }

    fn gather<'a>(&'a self, out: &mut Vec<&'a Token>) {
        out.extend(self.collect());
    }
}

impl AstNode for NameToken {
    fn accept(&mut self, visitor: &mut dyn TokenVisitor) {
        visitor.visit_name(self);
    }

    fn gather<'a>(&'a self, out: &mut Vec<&'a Token>) {
        out.push(&self.token);
        if let Some(alias) = self.alias() {
            out.push(alias);
        }
    }
}

impl<T: AstNode> AstNode for Option<T> {
    fn accept(&mut self, visitor: &mut dyn TokenVisitor) {
        if let Some(node) = self {
            node.accept(visitor);
        }
    }

    fn gather<'a>(&'a self, out: &mut Vec<&'a Token>) {
        if let Some(node) = self {
            node.gather(out);
        }
    }
}

impl<T: AstNode> AstNode for Vec<T> {
    fn accept(&mut self, visitor: &mut dyn TokenVisitor) {
        for node in self {
            node.accept(visitor);
        }
    }

    fn gather<'a>(&'a self, out: &mut Vec<&'a Token>) {
        for node in self {
            node.gather(out);
        }
    }
}

impl<T: AstNode> AstNode for Box<T> {
    fn accept(&mut self, visitor: &mut dyn TokenVisitor) {
        (**self).accept(visitor);
    }

    fn gather<'a>(&'a self, out: &mut Vec<&'a Token>) {
        (**self).gather(out);
    }
}

/// Implements [`AstNode`] by destructuring every field, so a field added to the
/// struct without being listed fails to compile.
macro_rules! ast_node {
    ($ty:ident { $($field:ident),* $(,)? } $(skip { $($skip:ident),* $(,)? })?) => {
        impl AstNode for $ty {
            #[allow(unused_variables)]
            fn accept(&mut self, visitor: &mut dyn TokenVisitor) {
                let $ty { $($field,)* $($($skip: _,)*)? } = self;
                $( $field.accept(visitor); )*
            }

            #[allow(unused_variables)]
            fn gather<'a>(&'a self, out: &mut Vec<&'a Token>) {
                let $ty { $($field,)* $($($skip: _,)*)? } = self;
                $( $field.gather(out); )*
            }
        }
    };
}

pub(crate) use ast_node;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectStatement {
    pub with: Option<Token>,
    pub distinct: bool,
    /// Row limit from `TOP`, `LIMIT`, `FETCH FIRST` or `ROWNUM`.
    pub limit: Option<Token>,
    pub limit_percent: bool,
    pub columns: Vec<Token>,
    /// Variables (or a table) receiving the result.
    pub into: Vec<Token>,
    pub from: Option<Token>,
    pub where_clause: Option<Token>,
    pub group_by: Option<Token>,
    pub having: Option<Token>,
    pub order_by: Option<Token>,
    pub offset: Option<Token>,
    pub union: Option<Box<UnionClause>>,
    /// Trailing clauses kept verbatim (`FOR UPDATE`, `LOCK IN SHARE MODE`).
    pub tail: Option<Token>,
}

ast_node!(SelectStatement {
    with, limit, into, columns, from, where_clause, group_by, having, order_by, offset, union, tail
} skip { distinct, limit_percent });

impl SelectStatement {
    pub fn new(columns: Vec<Token>) -> Self {
        Self {
            with: None,
            distinct: false,
            limit: None,
            limit_percent: false,
            columns,
            into: Vec::new(),
            from: None,
            where_clause: None,
            group_by: None,
            having: None,
            order_by: None,
            offset: None,
            union: None,
            tail: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnionClause {
    pub operator: Token,
    pub select: SelectStatement,
}

ast_node!(UnionClause { operator, select });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertStatement {
    pub table: NameToken,
    pub columns: Vec<Token>,
    pub values: Vec<ValuesRow>,
    pub select: Option<Box<SelectStatement>>,
}

ast_node!(InsertStatement { table, columns, values, select });

/// One parenthesised row of a `VALUES` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuesRow {
    pub values: Vec<Token>,
}

ast_node!(ValuesRow { values });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateStatement {
    pub table: NameToken,
    /// Joined tables of a multi-table update (`UPDATE a JOIN b ON … SET`).
    pub joins: Option<Token>,
    pub items: Vec<SetItem>,
    pub from: Option<Token>,
    pub where_clause: Option<Token>,
}

ast_node!(UpdateStatement { table, joins, items, from, where_clause });

impl UpdateStatement {
    /// Whether any item assigns several columns from one subquery.
    pub fn is_composite(&self) -> bool {
        self.items.iter().any(SetItem::is_composite)
    }
}

/// `col = value` or `(c1, c2) = (SELECT …)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetItem {
    pub names: Vec<Token>,
    pub value: Option<Token>,
    pub subquery: Option<Box<SelectStatement>>,
}

ast_node!(SetItem { names, value, subquery });

impl SetItem {
    pub fn is_composite(&self) -> bool {
        self.subquery.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteStatement {
    pub table: NameToken,
    pub from: Option<Token>,
    pub where_clause: Option<Token>,
}

ast_node!(DeleteStatement { table, from, where_clause });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IfItemKind {
    If,
    ElseIf,
    Else,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfItem {
    pub kind: IfItemKind,
    pub condition: Option<Token>,
    pub statements: Vec<Statement>,
}

ast_node!(IfItem { condition, statements } skip { kind });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IfStatement {
    pub items: Vec<IfItem>,
}

ast_node!(IfStatement { items });

/// `WHEN` branch of a `CASE` statement; no condition means `ELSE`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseItem {
    pub condition: Option<Token>,
    pub statements: Vec<Statement>,
}

ast_node!(CaseItem { condition, statements });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseStatement {
    pub variable: Option<Token>,
    pub items: Vec<CaseItem>,
}

ast_node!(CaseStatement { variable, items });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhileStatement {
    pub label: Option<Token>,
    pub condition: Token,
    pub statements: Vec<Statement>,
}

ast_node!(WhileStatement { label, condition, statements });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopKind {
    /// Unconditional loop left with an exit statement.
    Loop,
    /// `REPEAT … UNTIL condition`.
    Repeat,
    /// `FOR variable IN …`.
    For,
}

/// Header of a `FOR` loop: a numeric range or a cursor/query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForHeader {
    pub variable: Token,
    pub reverse: bool,
    pub lower: Option<Token>,
    pub upper: Option<Token>,
    pub source: Option<Token>,
}

ast_node!(ForHeader { variable, lower, upper, source } skip { reverse });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopStatement {
    pub kind: LoopKind,
    pub label: Option<Token>,
    pub header: Option<ForHeader>,
    pub condition: Option<Token>,
    pub statements: Vec<Statement>,
}

ast_node!(LoopStatement { label, header, statements, condition } skip { kind });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopExitKind {
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopExitStatement {
    pub kind: LoopExitKind,
    pub label: Option<Token>,
    pub condition: Option<Token>,
}

ast_node!(LoopExitStatement { label, condition } skip { kind });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclareVariableStatement {
    pub name: Token,
    pub data_type: Token,
    pub default: Option<Token>,
}

ast_node!(DeclareVariableStatement { name, data_type, default });

impl DeclareVariableStatement {
    /// Oracle `name EXCEPTION;` declarations.
    pub fn is_exception(&self) -> bool {
        self.data_type.symbol.eq_ignore_ascii_case("EXCEPTION")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetStatement {
    pub name: Token,
    pub value: Token,
}

ast_node!(SetStatement { name, value });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclareCursorStatement {
    pub name: NameToken,
    pub query: Box<SelectStatement>,
}

ast_node!(DeclareCursorStatement { name, query });

/// `OPEN`, `CLOSE` and `DEALLOCATE` of a cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorStatement {
    pub name: NameToken,
}

ast_node!(CursorStatement { name });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchCursorStatement {
    pub name: NameToken,
    pub into: Vec<Token>,
}

ast_node!(FetchCursorStatement { name, into });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclareHandlerStatement {
    /// `CONTINUE` or `EXIT`.
    pub action: Token,
    pub conditions: Vec<Token>,
    pub statements: Vec<Statement>,
}

ast_node!(DeclareHandlerStatement { action, conditions, statements });

impl DeclareHandlerStatement {
    pub fn is_not_found(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.render().eq_ignore_ascii_case("NOT FOUND"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GotoStatement {
    pub label: Token,
}

ast_node!(GotoStatement { label });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelStatement {
    pub name: Token,
}

ast_node!(LabelStatement { name });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TryCatchStatement {
    pub try_statements: Vec<Statement>,
    pub catch_statements: Vec<Statement>,
}

ast_node!(TryCatchStatement { try_statements, catch_statements });

/// `WHEN condition THEN statements` of an exception section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionHandler {
    pub condition: Token,
    pub statements: Vec<Statement>,
}

ast_node!(ExceptionHandler { condition, statements });

impl ExceptionHandler {
    pub fn is_others(&self) -> bool {
        self.condition.symbol.eq_ignore_ascii_case("OTHERS")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionStatement {
    pub handlers: Vec<ExceptionHandler>,
}

ast_node!(ExceptionStatement { handlers });

/// Raise an error. All parts empty means re-raise the current error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaiseStatement {
    pub code: Option<Token>,
    pub message: Option<Token>,
    /// Named exception (`RAISE no_data;`).
    pub exception: Option<Token>,
}

ast_node!(RaiseStatement { code, message, exception });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnStatement {
    pub value: Option<Token>,
}

ast_node!(ReturnStatement { value });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrintStatement {
    pub content: Token,
}

ast_node!(PrintStatement { content });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallStatement {
    /// Variable receiving the return code (`EXEC @rc = proc`).
    pub result: Option<Token>,
    pub name: NameToken,
    pub args: Vec<Token>,
}

ast_node!(CallStatement { result, name, args });

/// `PREPARE name FROM source`; no source means `DEALLOCATE PREPARE name`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepareStatement {
    pub name: Token,
    pub source: Option<Token>,
}

ast_node!(PrepareStatement { name, source });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteDynamicStatement {
    /// SQL text expression, or the prepared statement name when `prepared`.
    pub content: Token,
    pub into: Vec<Token>,
    pub using: Vec<Token>,
    pub prepared: bool,
}

ast_node!(ExecuteDynamicStatement { content, into, using } skip { prepared });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionKind {
    Begin,
    Commit,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionStatement {
    pub kind: TransactionKind,
}

ast_node!(TransactionStatement {} skip { kind });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TruncateStatement {
    pub table: NameToken,
}

ast_node!(TruncateStatement { table });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DropStatement {
    /// `TABLE`, `VIEW`, `PROCEDURE` …
    pub object_type: String,
    pub name: NameToken,
    pub if_exists: bool,
}

ast_node!(DropStatement { name } skip { object_type, if_exists });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: Token,
    pub data_type: Token,
    /// Constraints and defaults after the type, kept as an expression.
    pub options: Option<Token>,
}

ast_node!(ColumnDefinition { name, data_type, options });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateTableStatement {
    pub table: NameToken,
    pub temporary: bool,
    pub columns: Vec<ColumnDefinition>,
    pub constraints: Vec<Token>,
}

ast_node!(CreateTableStatement { table, columns, constraints } skip { temporary });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockStatement {
    pub label: Option<Token>,
    pub statements: Vec<Statement>,
}

ast_node!(BlockStatement { label, statements });

/// A recognised statement kept as a classified expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OtherStatement {
    pub content: Token,
    /// Set when the statement only means something in one dialect (`SET NOCOUNT ON`).
    pub dialect: Option<DatabaseType>,
}

ast_node!(OtherStatement { content } skip { dialect });

/// Every statement kind of a routine body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    If(IfStatement),
    Case(CaseStatement),
    While(WhileStatement),
    Loop(LoopStatement),
    LoopExit(LoopExitStatement),
    Declare(DeclareVariableStatement),
    Set(SetStatement),
    DeclareCursor(DeclareCursorStatement),
    OpenCursor(CursorStatement),
    FetchCursor(FetchCursorStatement),
    CloseCursor(CursorStatement),
    DeallocateCursor(CursorStatement),
    DeclareHandler(DeclareHandlerStatement),
    Goto(GotoStatement),
    Label(LabelStatement),
    TryCatch(TryCatchStatement),
    Exception(ExceptionStatement),
    Raise(RaiseStatement),
    Return(ReturnStatement),
    Print(PrintStatement),
    Call(CallStatement),
    Prepare(PrepareStatement),
    ExecuteDynamic(ExecuteDynamicStatement),
    Transaction(TransactionStatement),
    Truncate(TruncateStatement),
    Drop(DropStatement),
    CreateTable(CreateTableStatement),
    Block(BlockStatement),
    Other(OtherStatement),
}

impl AstNode for Statement {
    fn accept(&mut self, visitor: &mut dyn TokenVisitor) {
        match self {
            Statement::Select(s) => s.accept(visitor),
            Statement::Insert(s) => s.accept(visitor),
            Statement::Update(s) => s.accept(visitor),
            Statement::Delete(s) => s.accept(visitor),
            Statement::If(s) => s.accept(visitor),
            Statement::Case(s) => s.accept(visitor),
            Statement::While(s) => s.accept(visitor),
            Statement::Loop(s) => s.accept(visitor),
            Statement::LoopExit(s) => s.accept(visitor),
            Statement::Declare(s) => s.accept(visitor),
            Statement::Set(s) => s.accept(visitor),
            Statement::DeclareCursor(s) => s.accept(visitor),
            Statement::OpenCursor(s)
            | Statement::CloseCursor(s)
            | Statement::DeallocateCursor(s) => s.accept(visitor),
            Statement::FetchCursor(s) => s.accept(visitor),
            Statement::DeclareHandler(s) => s.accept(visitor),
            Statement::Goto(s) => s.accept(visitor),
            Statement::Label(s) => s.accept(visitor),
            Statement::TryCatch(s) => s.accept(visitor),
            Statement::Exception(s) => s.accept(visitor),
            Statement::Raise(s) => s.accept(visitor),
            Statement::Return(s) => s.accept(visitor),
            Statement::Print(s) => s.accept(visitor),
            Statement::Call(s) => s.accept(visitor),
            Statement::Prepare(s) => s.accept(visitor),
            Statement::ExecuteDynamic(s) => s.accept(visitor),
            Statement::Transaction(s) => s.accept(visitor),
            Statement::Truncate(s) => s.accept(visitor),
            Statement::Drop(s) => s.accept(visitor),
            Statement::CreateTable(s) => s.accept(visitor),
            Statement::Block(s) => s.accept(visitor),
            Statement::Other(s) => s.accept(visitor),
        }
    }

    fn gather<'a>(&'a self, out: &mut Vec<&'a Token>) {
        match self {
            Statement::Select(s) => s.gather(out),
            Statement::Insert(s) => s.gather(out),
            Statement::Update(s) => s.gather(out),
            Statement::Delete(s) => s.gather(out),
            Statement::If(s) => s.gather(out),
            Statement::Case(s) => s.gather(out),
            Statement::While(s) => s.gather(out),
            Statement::Loop(s) => s.gather(out),
            Statement::LoopExit(s) => s.gather(out),
            Statement::Declare(s) => s.gather(out),
            Statement::Set(s) => s.gather(out),
            Statement::DeclareCursor(s) => s.gather(out),
            Statement::OpenCursor(s)
            | Statement::CloseCursor(s)
            | Statement::DeallocateCursor(s) => s.gather(out),
            Statement::FetchCursor(s) => s.gather(out),
            Statement::DeclareHandler(s) => s.gather(out),
            Statement::Goto(s) => s.gather(out),
            Statement::Label(s) => s.gather(out),
            Statement::TryCatch(s) => s.gather(out),
            Statement::Exception(s) => s.gather(out),
            Statement::Raise(s) => s.gather(out),
            Statement::Return(s) => s.gather(out),
            Statement::Print(s) => s.gather(out),
            Statement::Call(s) => s.gather(out),
            Statement::Prepare(s) => s.gather(out),
            Statement::ExecuteDynamic(s) => s.gather(out),
            Statement::Transaction(s) => s.gather(out),
            Statement::Truncate(s) => s.gather(out),
            Statement::Drop(s) => s.gather(out),
            Statement::CreateTable(s) => s.gather(out),
            Statement::Block(s) => s.gather(out),
            Statement::Other(s) => s.gather(out),
        }
    }
}

impl Statement {
    /// Hand every owned token, including those of nested statements, to `visitor`.
    pub fn visit_tokens_mut(&mut self, visitor: &mut dyn TokenVisitor) {
        self.accept(visitor);
    }

    /// Flat document-order list of owned tokens.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut out = Vec::new();
        self.gather(&mut out);
        out
    }

    /// Nested statement lists in document order.
    pub fn children(&self) -> Vec<&Vec<Statement>> {
        match self {
            Statement::If(s) => s.items.iter().map(|i| &i.statements).collect(),
            Statement::Case(s) => s.items.iter().map(|i| &i.statements).collect(),
            Statement::While(s) => vec![&s.statements],
            Statement::Loop(s) => vec![&s.statements],
            Statement::DeclareHandler(s) => vec![&s.statements],
            Statement::TryCatch(s) => vec![&s.try_statements, &s.catch_statements],
            Statement::Exception(s) => s.handlers.iter().map(|h| &h.statements).collect(),
            Statement::Block(s) => vec![&s.statements],
            _ => Vec::new(),
        }
    }

    /// Nested statement lists, for passes that restructure bodies.
    pub fn children_mut(&mut self) -> Vec<&mut Vec<Statement>> {
        match self {
            Statement::If(s) => s.items.iter_mut().map(|i| &mut i.statements).collect(),
            Statement::Case(s) => s.items.iter_mut().map(|i| &mut i.statements).collect(),
            Statement::While(s) => vec![&mut s.statements],
            Statement::Loop(s) => vec![&mut s.statements],
            Statement::DeclareHandler(s) => vec![&mut s.statements],
            Statement::TryCatch(s) => vec![&mut s.try_statements, &mut s.catch_statements],
            Statement::Exception(s) => s.handlers.iter_mut().map(|h| &mut h.statements).collect(),
            Statement::Block(s) => vec![&mut s.statements],
            _ => Vec::new(),
        }
    }

    /// Variable, cursor, exception and handler declarations.
    pub fn is_declaration(&self) -> bool {
        matches!(
            self,
            Statement::Declare(_) | Statement::DeclareCursor(_) | Statement::DeclareHandler(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenKind;

    fn column(name: &str) -> Token {
        Token::new(name, TokenKind::ColumnName)
    }

    #[test]
    fn test_tokens_in_document_order() {
        let mut select = SelectStatement::new(vec![column("a"), column("b")]);
        select.from = Some(Token::new("t", TokenKind::TableName));
        let stmt = Statement::If(IfStatement {
            items: vec![IfItem {
                kind: IfItemKind::If,
                condition: Some(column("x")),
                statements: vec![Statement::Select(select)],
            }],
        });

        let symbols: Vec<&str> = stmt.tokens().iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["x", "a", "b", "t"]);
    }

    #[test]
    fn test_visit_reaches_names_and_aliases() {
        let mut table = NameToken::table("Orders");
        table.set_alias("o");
        let mut stmt = Statement::Delete(DeleteStatement {
            table,
            from: None,
            where_clause: Some(column("Id")),
        });

        let mut seen = Vec::new();
        stmt.visit_tokens_mut(&mut |t: &mut Token| {
            seen.push(t.symbol.clone());
            t.symbol = t.symbol.to_uppercase();
        });
        assert_eq!(seen, vec!["Orders", "o", "Id"]);

        match stmt {
            Statement::Delete(d) => {
                assert_eq!(d.table.name(), "ORDERS");
                assert_eq!(d.table.alias().unwrap().symbol, "O");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_composite_set_item() {
        let update = UpdateStatement {
            table: NameToken::table("t"),
            joins: None,
            items: vec![SetItem {
                names: vec![column("a"), column("b")],
                value: None,
                subquery: Some(Box::new(SelectStatement::new(vec![column("x"), column("y")]))),
            }],
            from: None,
            where_clause: None,
        };
        assert!(update.is_composite());
    }
}
