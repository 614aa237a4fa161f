// src/core/compiler.rs
//! SUSA front-end pipeline: lexing and parsing with every diagnostic
//! collected, lexical ones first. Used by `validate`, the engine and the CLI.

use serde::Serialize;

use crate::core::{
    ast::Program,
    diagnostics::Diagnostic,
    lexer::{Lexer, LexerOptions},
    parser::parse,
    token::Token,
};

/// Everything the front end knows about one source text.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub tokens: Vec<Token>,
    /// Present only when no error diagnostic was recorded.
    pub program: Option<Program>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex and parse `source`. Lexical diagnostics come first, then syntax
/// errors, then warnings, each group in source order.
pub fn analyze(source: &str) -> Analysis {
    let mut lexer = Lexer::with_options(source, LexerOptions::default());
    let tokens = lexer.tokenize();
    let mut diagnostics = lexer.into_diagnostics();

    let output = parse(tokens.clone());
    diagnostics.extend(output.errors);
    diagnostics.extend(output.warnings);

    let program = if diagnostics.iter().any(Diagnostic::is_error) { None } else { output.program };
    Analysis { tokens, program, diagnostics }
}

/// Parse-only validation. Deterministic: identical input yields identical
/// diagnostics in identical order.
pub fn validate(source: &str) -> Validation {
    let analysis = analyze(source);
    Validation { valid: !analysis.has_errors(), diagnostics: analysis.diagnostics }
}

/// Token dump for tooling; `trivia` keeps whitespace and comment tokens.
pub fn token_dump(source: &str, trivia: bool) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::with_options(source, LexerOptions { keep_trivia: trivia, ..LexerOptions::default() });
    let tokens = lexer.tokenize();
    (tokens, lexer.into_diagnostics())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::ErrorKind;

    #[test]
    fn empty_source_is_valid() {
        let v = validate("");
        assert!(v.valid);
        assert!(v.diagnostics.is_empty());
    }

    #[test]
    fn lexical_errors_block_the_program() {
        let a = analyze("PRINT \"abc");
        assert!(a.program.is_none());
        assert_eq!(a.errors().count(), 1);
        assert_eq!(a.diagnostics[0].kind, ErrorKind::Lexical);
    }

    #[test]
    fn warnings_alone_keep_the_program() {
        let a = analyze("FUNC f()\n  RETURN 1\n  PRINT 2\nEND\n");
        assert!(a.program.is_some());
        assert!(!a.has_errors());
        assert_eq!(a.diagnostics.len(), 1);
    }
}
