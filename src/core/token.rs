// src/core/token.rs
use std::fmt;

use serde::Serialize;

use crate::core::diagnostics::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Keyword {
    Let,
    Func,
    Class,
    Extends,
    If,
    Else,
    Elif,
    Then,
    Do,
    While,
    For,
    To,
    Step,
    Loop,
    Times,
    Start,
    End,
    Return,
    Print,
    Break,
    Continue,
    And,
    Or,
    Not,
    True,
    False,
    Null,
}

/// Accepted spellings, matched case-insensitively. The first entry for each
/// keyword is its canonical spelling.
const KEYWORDS: &[(&str, Keyword)] = &[
    ("let", Keyword::Let),
    ("var", Keyword::Let),
    ("set", Keyword::Let),
    ("func", Keyword::Func),
    ("function", Keyword::Func),
    ("def", Keyword::Func),
    ("fn", Keyword::Func),
    ("class", Keyword::Class),
    ("extends", Keyword::Extends),
    ("inherits", Keyword::Extends),
    ("if", Keyword::If),
    ("else", Keyword::Else),
    ("otherwise", Keyword::Else),
    ("elif", Keyword::Elif),
    ("elseif", Keyword::Elif),
    ("then", Keyword::Then),
    ("do", Keyword::Do),
    ("while", Keyword::While),
    ("for", Keyword::For),
    ("to", Keyword::To),
    ("step", Keyword::Step),
    ("loop", Keyword::Loop),
    ("repeat", Keyword::Loop),
    ("times", Keyword::Times),
    ("start", Keyword::Start),
    ("begin", Keyword::Start),
    ("end", Keyword::End),
    ("endif", Keyword::End),
    ("endwhile", Keyword::End),
    ("endfor", Keyword::End),
    ("endloop", Keyword::End),
    ("endfunc", Keyword::End),
    ("endclass", Keyword::End),
    ("done", Keyword::End),
    ("return", Keyword::Return),
    ("print", Keyword::Print),
    ("say", Keyword::Print),
    ("display", Keyword::Print),
    ("show", Keyword::Print),
    ("break", Keyword::Break),
    ("continue", Keyword::Continue),
    ("and", Keyword::And),
    ("or", Keyword::Or),
    ("not", Keyword::Not),
    ("true", Keyword::True),
    ("false", Keyword::False),
    ("null", Keyword::Null),
    ("none", Keyword::Null),
    ("nil", Keyword::Null),
];

impl Keyword {
    pub fn lookup(word: &str) -> Option<Keyword> {
        KEYWORDS
            .iter()
            .find(|(spelling, _)| spelling.eq_ignore_ascii_case(word))
            .map(|(_, kw)| *kw)
    }

    pub fn canonical(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, kw)| *kw == self)
            .map(|(spelling, _)| *spelling)
            .unwrap_or("?")
    }

    /// Keywords that begin a statement; used for parser resynchronization.
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            Keyword::Let
                | Keyword::Func
                | Keyword::Class
                | Keyword::If
                | Keyword::While
                | Keyword::For
                | Keyword::Loop
                | Keyword::Start
                | Keyword::Return
                | Keyword::Print
                | Keyword::Break
                | Keyword::Continue
                | Keyword::End
                | Keyword::Else
                | Keyword::Elif
        )
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical().to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Percent,      // %
    Assign,       // =
    EqualEqual,   // ==
    NotEqual,     // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    AndAnd,       // &&
    OrOr,         // ||
    Bang,         // !
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Percent => "%",
            Operator::Assign => "=",
            Operator::EqualEqual => "==",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::AndAnd => "&&",
            Operator::OrOr => "||",
            Operator::Bang => "!",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Punct {
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Comma,        // ,
    Colon,        // :
    Dot,          // .
    Semicolon,    // ;
}

impl Punct {
    pub fn symbol(self) -> char {
        match self {
            Punct::OpenParen => '(',
            Punct::CloseParen => ')',
            Punct::OpenBracket => '[',
            Punct::CloseBracket => ']',
            Punct::OpenBrace => '{',
            Punct::CloseBrace => '}',
            Punct::Comma => ',',
            Punct::Colon => ':',
            Punct::Dot => '.',
            Punct::Semicolon => ';',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier(String),
    Number(f64),
    Str(String),
    /// Body of an interpolated string literal, escapes resolved, braces kept.
    Interpolated(String),
    Operator(Operator),
    Punct(Punct),
    Newline,
    Comment(String),
    Whitespace,
    /// Placeholder left where a lexical error was reported.
    Invalid,
    Eof,
}

impl TokenKind {
    pub fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment(_))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(kw) => write!(f, "{}", kw),
            TokenKind::Identifier(_) => write!(f, "identifier"),
            TokenKind::Number(_) => write!(f, "number"),
            TokenKind::Str(_) => write!(f, "string"),
            TokenKind::Interpolated(_) => write!(f, "interpolated string"),
            TokenKind::Operator(op) => write!(f, "'{}'", op.symbol()),
            TokenKind::Punct(p) => write!(f, "'{}'", p.symbol()),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Comment(_) => write!(f, "comment"),
            TokenKind::Whitespace => write!(f, "whitespace"),
            TokenKind::Invalid => write!(f, "invalid token"),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn location(&self) -> Location {
        Location::new(self.line, self.column, self.start, self.end)
    }

    pub fn is_keyword(&self, kw: Keyword) -> bool {
        self.kind == TokenKind::Keyword(kw)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Identifier(name) => write!(f, "Identifier('{}') @{}:{}", name, self.line, self.column),
            TokenKind::Number(v) => write!(f, "Number({}) @{}:{}", v, self.line, self.column),
            TokenKind::Str(s) => write!(f, "String({:?}) @{}:{}", s, self.line, self.column),
            TokenKind::Interpolated(s) => write!(f, "Interpolated({:?}) @{}:{}", s, self.line, self.column),
            TokenKind::Comment(c) => write!(f, "Comment({:?}) @{}:{}", c, self.line, self.column),
            TokenKind::Keyword(kw) => write!(f, "Keyword({}) @{}:{}", kw, self.line, self.column),
            other => write!(f, "{} @{}:{}", other, self.line, self.column),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive_with_aliases() {
        assert_eq!(Keyword::lookup("PRINT"), Some(Keyword::Print));
        assert_eq!(Keyword::lookup("Say"), Some(Keyword::Print));
        assert_eq!(Keyword::lookup("function"), Some(Keyword::Func));
        assert_eq!(Keyword::lookup("EndWhile"), Some(Keyword::End));
        assert_eq!(Keyword::lookup("printer"), None);
    }

    #[test]
    fn canonical_spelling_is_first_alias() {
        assert_eq!(Keyword::Let.to_string(), "LET");
        assert_eq!(Keyword::End.to_string(), "END");
    }
}
