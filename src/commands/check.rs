use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::core::compiler::validate;
use crate::core::diagnostics::{print_diagnostic, Severity};

/// Validate only. Returns true when there are no errors (warnings allowed).
pub fn main(input: PathBuf) -> Result<bool> {
    let source = std::fs::read_to_string(&input).with_context(|| format!("Read {}", input.display()))?;
    let filename = input.display().to_string();
    let validation = validate(&source);
    for diag in &validation.diagnostics {
        print_diagnostic(&filename, &source, diag);
    }
    let errors = validation.diagnostics.iter().filter(|d| d.severity == Severity::Error).count();
    let warnings = validation.diagnostics.len() - errors;
    if validation.valid {
        println!("{} {} ({} warning(s))", "✓".bright_green(), filename, warnings);
    } else {
        eprintln!("{} {}: {} error(s), {} warning(s)", "✗".bright_red(), filename, errors, warnings);
    }
    Ok(validation.valid)
}
