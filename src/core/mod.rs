//! Core module tree: front end (token, lexer, ast, parser, compiler),
//! runtime (value, env, builtins, vm) and the session layer around it.

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod debugger;
pub mod diagnostics;
pub mod engine;
pub mod env;
pub mod error;
pub mod events;
pub mod input;
pub mod lexer;
pub mod parser;
pub mod sketch;
pub mod stack;
pub mod token;
pub mod value;
pub mod vm;

pub use diagnostics::{Diagnostic, ErrorKind, Location, Severity};
pub use token::TokenKind;
