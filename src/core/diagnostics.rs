// src/core/diagnostics.rs
//! Structured diagnostics shared by the lexer, parser and runtime, plus the
//! pretty, colored, file+line printer used by the CLI.

use std::fmt;

use colored::Colorize;
use serde::Serialize;

/// Source position of a token, node or error. Lines and columns are 1-based,
/// columns count chars; `start`/`end` are byte offsets into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    pub start: usize,
    pub end: usize,
}

impl Location {
    pub fn new(line: usize, column: usize, start: usize, end: usize) -> Self {
        Self { line, column, start, end }
    }

    /// Position with no byte span (runtime-synthesized locations).
    pub fn at(line: usize, column: usize) -> Self {
        Self { line, column, start: 0, end: 0 }
    }

    /// Span from the start of `self` to the end of `other`.
    pub fn to(self, other: Location) -> Self {
        Self { end: other.end.max(self.end), ..self }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Error taxonomy surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Runtime,
    Timeout,
    Input,
    Session,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Lexical => "LexicalError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Runtime => "RuntimeError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Input => "InputError",
            ErrorKind::Session => "SessionError",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Error diagnostic; suggestions are filled in from the message.
    pub fn error(kind: ErrorKind, message: impl Into<String>, location: Location) -> Self {
        let message = message.into();
        let suggestions = suggestions_for(&message);
        Self { kind, severity: Severity::Error, message, location, suggestions }
    }

    pub fn warning(kind: ErrorKind, message: impl Into<String>, location: Location) -> Self {
        let message = message.into();
        let suggestions = suggestions_for(&message);
        Self { kind, severity: Severity::Warning, message, location, suggestions }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} at {}", self.kind, self.message, self.location)
    }
}

const SUGGESTIONS: &[(&str, &str)] = &[
    ("Expected END", "add END: close the block opened here with END"),
    ("Expected ':'", "add ':' (or THEN/DO) after the header"),
    ("Expected ')'", "add a closing ')'"),
    ("Expected ']'", "add a closing ']'"),
    ("Unterminated string", "close the string with the same quote it opened with"),
    ("Unrecognized character", "remove the character or put it inside a string"),
    ("Invalid assignment target", "only plain variable names can be assigned"),
    ("Expected variable name", "names start with a letter or '_'"),
    ("Expected function name", "names start with a letter or '_'"),
    ("Expected parameter name", "names start with a letter or '_'"),
    ("Expected expression", "provide a value, variable or call here"),
    ("outside of a loop", "move BREAK/CONTINUE inside a WHILE, FOR or LOOP body"),
    ("outside of a function", "move RETURN inside a FUNC body"),
    ("Undefined variable", "declare it first with LET"),
    ("Division by zero", "check the divisor before dividing"),
    ("iteration limit", "add a BREAK or make the condition become false"),
];

/// Suggested fixes chosen by matching the diagnostic message.
pub fn suggestions_for(message: &str) -> Vec<String> {
    SUGGESTIONS
        .iter()
        .filter(|(pattern, _)| message.contains(pattern))
        .map(|(_, fix)| fix.to_string())
        .collect()
}

/// Print one diagnostic with a source excerpt and caret underline.
pub fn print_diagnostic(filename: &str, source: &str, diag: &Diagnostic) {
    let label = match diag.severity {
        Severity::Error => format!("{}:", diag.severity).bright_red().bold(),
        Severity::Warning => format!("{}:", diag.severity).yellow().bold(),
    };
    eprintln!("{} {} {}", label, format!("[{}]", diag.kind).dimmed(), diag.message.bright_white());

    let (ln, col) = (diag.location.line, diag.location.column);
    let line_text = nth_line(source, ln).unwrap_or_default();

    // line number gutter
    let ln_str = format!("{:>4}", ln);
    eprintln!("{} {}", "-->".bright_blue(), format!("{}:{}:{}", filename, ln, col).bright_white());
    eprintln!(" {} {}", " ".repeat(ln_str.len()).dimmed(), "|".dimmed());
    eprintln!("{} {} {}", ln_str.dimmed(), "|".dimmed(), line_text);

    let remaining = line_text.chars().count().saturating_sub(col.saturating_sub(1)).max(1);
    let width = diag.location.len().clamp(1, remaining);
    let underline = " ".repeat(col.saturating_sub(1)) + &"^".repeat(width);
    eprintln!(" {} {} {}", " ".repeat(ln_str.len()).dimmed(), "|".dimmed(), underline.bright_red());
    for fix in &diag.suggestions {
        eprintln!(" {} {} {}", " ".repeat(ln_str.len()), "=".bright_blue(), format!("help: {}", fix).bright_cyan());
    }
    eprintln!();
}

fn nth_line(src: &str, n: usize) -> Option<String> {
    src.lines().nth(n.saturating_sub(1)).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_end_suggests_adding_end() {
        let d = Diagnostic::error(ErrorKind::Syntax, "Expected END to close block", Location::at(3, 1));
        assert_eq!(d.suggestions, vec!["add END: close the block opened here with END".to_string()]);
    }

    #[test]
    fn unknown_message_has_no_suggestions() {
        assert!(suggestions_for("something odd").is_empty());
    }

    #[test]
    fn display_includes_kind_and_position() {
        let d = Diagnostic::error(ErrorKind::Lexical, "Unterminated string", Location::at(1, 7));
        assert_eq!(d.to_string(), "LexicalError: Unterminated string at 1:7");
    }
}
