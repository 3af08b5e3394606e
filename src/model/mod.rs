//! Dialect-neutral syntax tree: tokens, statements and scripts.

pub mod result;
pub mod script;
pub mod statement;
pub mod token;

pub use result::*;
pub use script::*;
pub use statement::*;
pub use token::*;
