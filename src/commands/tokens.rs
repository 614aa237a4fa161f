use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::compiler::token_dump;
use crate::core::diagnostics::print_diagnostic;

pub fn main(input: PathBuf, trivia: bool) -> Result<bool> {
    let source = std::fs::read_to_string(&input).with_context(|| format!("Read {}", input.display()))?;
    let (tokens, diagnostics) = token_dump(&source, trivia);
    for token in &tokens {
        println!("{}", token);
    }
    let filename = input.display().to_string();
    for diag in &diagnostics {
        print_diagnostic(&filename, &source, diag);
    }
    Ok(diagnostics.is_empty())
}
