//! SUSA: lexer, recovering parser, async tree-walking interpreter and a
//! statement-level debugger, driven through [`core::engine::Engine`].
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;

pub use crate::config::EngineConfig;
pub use crate::core::engine::{Engine, ExecuteOptions, ExecutionResult};
