pub mod ast;
pub mod error;
pub mod eval;
pub mod lex;
pub mod parse;
pub mod prelude;
pub mod runtime;
pub mod scope;
