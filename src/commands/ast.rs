use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::core::compiler::analyze;
use crate::core::diagnostics::print_diagnostic;

/// Pretty JSON of the program; diagnostics instead when it does not parse.
pub fn main(input: PathBuf) -> Result<bool> {
    let source = std::fs::read_to_string(&input).with_context(|| format!("Read {}", input.display()))?;
    let analysis = analyze(&source);
    let filename = input.display().to_string();
    for diag in &analysis.diagnostics {
        print_diagnostic(&filename, &source, diag);
    }
    match &analysis.program {
        Some(program) => {
            println!("{}", serde_json::to_string_pretty(program).context("Serialize AST")?);
            Ok(true)
        }
        None => Ok(false),
    }
}
