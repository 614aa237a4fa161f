// src/core/lexer.rs
//! SUSA lexer: comment blanking, then a single char-cursor scan producing
//! tokens and lexical diagnostics. Errors never stop the scan.

use std::collections::VecDeque;

use unicode_ident::{is_xid_continue, is_xid_start};

use crate::core::diagnostics::{Diagnostic, ErrorKind, Location};
use crate::core::token::{Keyword, Operator, Punct, Token, TokenKind};

/// Lexer options.
#[derive(Debug, Clone)]
pub struct LexerOptions {
    pub line_comment: char,
    /// Keep whitespace and comment tokens in the output (tooling dumps).
    pub keep_trivia: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self { line_comment: '#', keep_trivia: false }
    }
}

/// A comment removed by [`blank_comments`].
#[derive(Debug, Clone, PartialEq)]
pub struct CommentSpan {
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub start: usize,
    pub end: usize,
}

/// Replace every line comment with spaces, byte for byte, so the columns and
/// offsets of everything else stay put. Quote state is tracked per line: a
/// marker inside a string literal, or one preceded by `\`, is not a comment.
pub fn blank_comments(source: &str, marker: char) -> (String, Vec<CommentSpan>) {
    let mut out = String::with_capacity(source.len());
    let mut comments = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev: Option<char> = None;
    let mut open: Option<(usize, usize, usize)> = None;
    let (mut line, mut col) = (1usize, 0usize);

    for (i, ch) in source.char_indices() {
        if ch == '\n' {
            if let Some((l, c, start)) = open.take() {
                comments.push(CommentSpan { text: source[start..i].to_string(), line: l, column: c, start, end: i });
            }
            quote = None;
            escaped = false;
            prev = None;
            out.push('\n');
            line += 1;
            col = 0;
            continue;
        }
        col += 1;
        if open.is_some() {
            out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
            continue;
        }
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => {
                if ch == marker && prev != Some('\\') {
                    open = Some((line, col, i));
                    out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
                    continue;
                }
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                }
            }
        }
        out.push(ch);
        prev = Some(ch);
    }
    if let Some((l, c, start)) = open {
        comments.push(CommentSpan { text: source[start..].to_string(), line: l, column: c, start, end: source.len() });
    }
    (out, comments)
}

/// Main lexer struct (owns the comment-blanked text).
pub struct Lexer {
    text: String,
    chars: Vec<(usize, char)>,
    pos: usize,
    line: usize,
    col: usize,
    options: LexerOptions,
    comments: VecDeque<CommentSpan>,
    diagnostics: Vec<Diagnostic>,
    consumed_eof: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self::with_options(input, LexerOptions::default())
    }

    pub fn with_options(input: &str, options: LexerOptions) -> Self {
        let (text, comments) = blank_comments(input, options.line_comment);
        let chars = text.char_indices().collect();
        Self {
            text,
            chars,
            pos: 0,
            line: 1,
            col: 1,
            options,
            comments: comments.into(),
            diagnostics: Vec::new(),
            consumed_eof: false,
        }
    }

    /// Tokenizes the entire input. The stream always ends with `Eof`; trivia
    /// is filtered unless `keep_trivia` is set.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            if token.kind.is_trivia() && !self.options.keep_trivia {
                continue;
            }
            tokens.push(token);
        }
        tokens
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    #[inline]
    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    #[inline]
    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|(_, c)| *c)
    }

    #[inline]
    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|(i, _)| *i).unwrap_or(self.text.len())
    }

    #[inline]
    fn advance_char(&mut self) {
        if let Some(ch) = self.current() {
            self.pos += 1;
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn make(&self, kind: TokenKind, line: usize, column: usize, start: usize) -> Token {
        let end = self.offset();
        Token { kind, lexeme: self.text[start..end].to_string(), line, column, start, end }
    }

    fn error(&mut self, message: String, line: usize, column: usize, start: usize) {
        let end = self.offset().max(start + 1).min(self.text.len().max(start));
        self.diagnostics.push(Diagnostic::error(
            ErrorKind::Lexical,
            message,
            Location::new(line, column, start, end),
        ));
    }

    pub fn next_token(&mut self) -> Option<Token> {
        if self.consumed_eof {
            return None;
        }
        let (line, column, start) = (self.line, self.col, self.offset());
        let ch = match self.current() {
            Some(ch) => ch,
            None => {
                self.consumed_eof = true;
                return Some(Token { kind: TokenKind::Eof, lexeme: String::new(), line, column, start, end: start });
            }
        };

        if self.comments.front().map(|c| c.start == start).unwrap_or(false) {
            return Some(self.lex_comment());
        }

        let kind = if ch == '\n' {
            self.advance_char();
            TokenKind::Newline
        } else if is_blank(ch) {
            self.lex_whitespace();
            TokenKind::Whitespace
        } else if matches!(ch, 'f' | 'F' | '$') && matches!(self.peek_char(), Some('"') | Some('\'')) {
            self.advance_char(); // prefix
            self.lex_string(true)
        } else if ch == '"' || ch == '\'' {
            self.lex_string(false)
        } else if ch.is_ascii_digit() {
            self.lex_number()
        } else if is_identifier_start(ch) {
            self.lex_identifier()
        } else if let Some(op) = self.match_multi_char_operator(ch) {
            self.advance_char();
            self.advance_char();
            TokenKind::Operator(op)
        } else if let Some(kind) = self.match_single_char_token(ch) {
            self.advance_char();
            kind
        } else {
            self.advance_char();
            self.error(format!("Unrecognized character '{}'", ch), line, column, start);
            TokenKind::Invalid
        };
        Some(self.make(kind, line, column, start))
    }

    fn lex_comment(&mut self) -> Token {
        let span = match self.comments.pop_front() {
            Some(span) => span,
            None => return self.make(TokenKind::Whitespace, self.line, self.col, self.offset()),
        };
        while self.current().is_some() && self.offset() < span.end {
            self.advance_char();
        }
        Token {
            kind: TokenKind::Comment(span.text.clone()),
            lexeme: span.text,
            line: span.line,
            column: span.column,
            start: span.start,
            end: span.end,
        }
    }

    fn lex_whitespace(&mut self) {
        while let Some(ch) = self.current() {
            let at_comment = self.comments.front().map(|c| c.start == self.offset()).unwrap_or(false);
            if !is_blank(ch) || at_comment {
                break;
            }
            self.advance_char();
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let (line, column, start) = (self.line, self.col, self.offset());
        while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance_char();
        }
        if self.current() == Some('.') && self.peek_char().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance_char();
            while self.current().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance_char();
            }
        }
        let text = &self.text[start..self.offset()];
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => {
                let msg = format!("Invalid number literal '{}'", text);
                self.error(msg, line, column, start);
                TokenKind::Invalid
            }
        }
    }

    /// Scans a quoted literal; the cursor sits on the opening quote. An
    /// unterminated literal stops before the newline so the line break still
    /// produces its own token.
    fn lex_string(&mut self, interpolated: bool) -> TokenKind {
        let (line, column, start) = (self.line, self.col, self.offset());
        let quote = self.current().unwrap_or('"');
        self.advance_char();
        let mut content = String::new();
        let mut escape = false;
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            if escape {
                content.push(match ch {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                escape = false;
                self.advance_char();
                continue;
            }
            match ch {
                '\\' => escape = true,
                c if c == quote => {
                    self.advance_char();
                    return if interpolated { TokenKind::Interpolated(content) } else { TokenKind::Str(content) };
                }
                c => content.push(c),
            }
            self.advance_char();
        }
        // Report at the opening quote (or prefix) position.
        let (l, c) = if interpolated { (line, column.saturating_sub(1).max(1)) } else { (line, column) };
        let s = if interpolated { start.saturating_sub(1) } else { start };
        self.error("Unterminated string".to_string(), l, c, s);
        TokenKind::Invalid
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let start = self.offset();
        while self.current().map(is_identifier_part).unwrap_or(false) {
            self.advance_char();
        }
        let ident = &self.text[start..self.offset()];
        match Keyword::lookup(ident) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier(ident.to_string()),
        }
    }

    fn match_multi_char_operator(&self, ch: char) -> Option<Operator> {
        match (ch, self.peek_char()) {
            ('=', Some('=')) => Some(Operator::EqualEqual),
            ('!', Some('=')) => Some(Operator::NotEqual),
            ('<', Some('=')) => Some(Operator::LessEqual),
            ('>', Some('=')) => Some(Operator::GreaterEqual),
            ('&', Some('&')) => Some(Operator::AndAnd),
            ('|', Some('|')) => Some(Operator::OrOr),
            _ => None,
        }
    }

    fn match_single_char_token(&self, ch: char) -> Option<TokenKind> {
        let op = |o| Some(TokenKind::Operator(o));
        let p = |p| Some(TokenKind::Punct(p));
        match ch {
            '+' => op(Operator::Plus),
            '-' => op(Operator::Minus),
            '*' => op(Operator::Star),
            '/' => op(Operator::Slash),
            '%' => op(Operator::Percent),
            '=' => op(Operator::Assign),
            '<' => op(Operator::Less),
            '>' => op(Operator::Greater),
            '!' => op(Operator::Bang),
            '(' => p(Punct::OpenParen),
            ')' => p(Punct::CloseParen),
            '[' => p(Punct::OpenBracket),
            ']' => p(Punct::CloseBracket),
            '{' => p(Punct::OpenBrace),
            '}' => p(Punct::CloseBrace),
            ',' => p(Punct::Comma),
            ':' => p(Punct::Colon),
            '.' => p(Punct::Dot),
            ';' => p(Punct::Semicolon),
            _ => None,
        }
    }
}

/// Convenience: tokens (trivia filtered) plus lexical diagnostics.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();
    (tokens, lexer.into_diagnostics())
}

fn is_identifier_start(ch: char) -> bool {
    ch == '_' || is_xid_start(ch)
}

fn is_identifier_part(ch: char) -> bool {
    ch == '_' || is_xid_continue(ch)
}

fn is_blank(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\u{FEFF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blanking_preserves_length_and_columns() {
        let src = "let a = 1 # note\nprint a";
        let (blanked, comments) = blank_comments(src, '#');
        assert_eq!(blanked.len(), src.len());
        assert_eq!(blanked, "let a = 1       \nprint a");
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "# note");
        assert_eq!((comments[0].line, comments[0].column), (1, 11));
    }

    #[test]
    fn marker_inside_string_is_kept() {
        let (blanked, comments) = blank_comments("print \"a # b\" # c", '#');
        assert_eq!(blanked, "print \"a # b\"    ");
        assert_eq!(comments.len(), 1);
    }

    #[test]
    fn escaped_marker_is_not_a_comment() {
        let (blanked, comments) = blank_comments("a \\# b", '#');
        assert_eq!(blanked, "a \\# b");
        assert!(comments.is_empty());
    }
}
