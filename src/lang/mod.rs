pub mod ast;
pub mod command;
pub mod error;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parse;
pub mod runtime;
pub mod variables;
