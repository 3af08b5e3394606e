//! Top-level translatable units.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::statement::{
    ast_node, AstNode, ColumnDefinition, SelectStatement, Statement, TokenVisitor,
};
use super::token::{NameToken, Token};
use crate::dialect::DatabaseType;
use crate::error::TranslateError;

/// The kind of schema object a definition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// A plain statement script.
    Common,
    View,
    Procedure,
    Function,
    Trigger,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Common => "common",
            ObjectKind::View => "view",
            ObjectKind::Procedure => "procedure",
            ObjectKind::Function => "function",
            ObjectKind::Trigger => "trigger",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "common" | "script" => Ok(ObjectKind::Common),
            "view" => Ok(ObjectKind::View),
            "procedure" | "proc" => Ok(ObjectKind::Procedure),
            "function" | "func" => Ok(ObjectKind::Function),
            "trigger" => Ok(ObjectKind::Trigger),
            other => Err(TranslateError::unsupported(
                format!("object kind '{}'", other),
                DatabaseType::default(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoutineKind {
    Procedure,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterDirection {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: Token,
    pub direction: ParameterDirection,
    pub data_type: Token,
    pub default: Option<Token>,
}

ast_node!(Parameter { name, data_type, default } skip { direction });

/// Shape of the table returned by a table-valued function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnTable {
    pub name: Option<Token>,
    pub columns: Vec<ColumnDefinition>,
}

ast_node!(ReturnTable { name, columns });

/// A statement script without object header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonScript {
    pub schema: Option<String>,
    pub name: Option<NameToken>,
    pub statements: Vec<Statement>,
}

ast_node!(CommonScript { name, statements } skip { schema });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineScript {
    pub name: NameToken,
    pub kind: RoutineKind,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<Token>,
    pub return_table: Option<ReturnTable>,
    pub statements: Vec<Statement>,
}

ast_node!(RoutineScript { name, parameters, return_type, return_table, statements } skip { kind });

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewScript {
    pub name: NameToken,
    pub columns: Vec<Token>,
    pub select: SelectStatement,
}

ast_node!(ViewScript { name, columns, select });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl TriggerEvent {
    pub fn keyword(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerScript {
    pub name: NameToken,
    pub table: NameToken,
    pub timing: TriggerTiming,
    pub events: Vec<TriggerEvent>,
    pub for_each_row: bool,
    pub condition: Option<Token>,
    pub statements: Vec<Statement>,
}

ast_node!(TriggerScript { name, table, condition, statements } skip { timing, events, for_each_row });

/// An analysed object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Script {
    Common(CommonScript),
    Routine(RoutineScript),
    View(ViewScript),
    Trigger(TriggerScript),
}

impl AstNode for Script {
    fn accept(&mut self, visitor: &mut dyn TokenVisitor) {
        match self {
            Script::Common(s) => s.accept(visitor),
            Script::Routine(s) => s.accept(visitor),
            Script::View(s) => s.accept(visitor),
            Script::Trigger(s) => s.accept(visitor),
        }
    }

    fn gather<'a>(&'a self, out: &mut Vec<&'a Token>) {
        match self {
            Script::Common(s) => s.gather(out),
            Script::Routine(s) => s.gather(out),
            Script::View(s) => s.gather(out),
            Script::Trigger(s) => s.gather(out),
        }
    }
}

impl Script {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Script::Common(_) => ObjectKind::Common,
            Script::Routine(r) if r.kind == RoutineKind::Function => ObjectKind::Function,
            Script::Routine(_) => ObjectKind::Procedure,
            Script::View(_) => ObjectKind::View,
            Script::Trigger(_) => ObjectKind::Trigger,
        }
    }

    pub fn name(&self) -> Option<&NameToken> {
        match self {
            Script::Common(s) => s.name.as_ref(),
            Script::Routine(s) => Some(&s.name),
            Script::View(s) => Some(&s.name),
            Script::Trigger(s) => Some(&s.name),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        match self {
            Script::Common(s) => s.schema.as_deref(),
            _ => self.name().and_then(|n| n.schema.as_deref()),
        }
    }

    /// Body statements; a view has none.
    pub fn statements(&self) -> &[Statement] {
        match self {
            Script::Common(s) => &s.statements,
            Script::Routine(s) => &s.statements,
            Script::View(_) => &[],
            Script::Trigger(s) => &s.statements,
        }
    }

    /// Flat document-order list of every token of the script.
    pub fn tokens(&self) -> Vec<&Token> {
        let mut out = Vec::new();
        self.gather(&mut out);
        out
    }

    pub fn visit_tokens_mut(&mut self, visitor: &mut dyn TokenVisitor) {
        self.accept(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SetStatement, TokenKind};

    #[test]
    fn test_routine_tokens_include_parameters() {
        let script = Script::Routine(RoutineScript {
            name: NameToken::routine("dbo.usp_touch"),
            kind: RoutineKind::Procedure,
            parameters: vec![Parameter {
                name: Token::new("@id", TokenKind::Variable),
                direction: ParameterDirection::In,
                data_type: Token::new("INT", TokenKind::DataType),
                default: None,
            }],
            return_type: None,
            return_table: None,
            statements: vec![Statement::Set(SetStatement {
                name: Token::new("@id", TokenKind::Variable),
                value: Token::new("1", TokenKind::NumberLiteral),
            })],
        });

        let kinds: Vec<TokenKind> = script.tokens().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::RoutineName,
                TokenKind::Variable,
                TokenKind::DataType,
                TokenKind::Variable,
                TokenKind::NumberLiteral,
            ]
        );
        assert_eq!(script.kind(), ObjectKind::Procedure);
        assert_eq!(script.schema(), Some("dbo"));
    }

    #[test]
    fn test_object_kind_from_str() {
        assert_eq!("PROC".parse::<ObjectKind>().unwrap(), ObjectKind::Procedure);
        assert!("package".parse::<ObjectKind>().is_err());
    }
}
