// src/core/sketch.rs
//! Degraded, heuristic per-line view of a source that failed to parse. Lets
//! a debug session still pause and step line by line. Never a substitute
//! for a grammar-checked [`Program`](crate::core::ast::Program).

use serde::Serialize;

use crate::core::lexer::blank_comments;
use crate::core::token::Keyword;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SketchKind {
    Let,
    Print,
    Func,
    Class,
    Branch,
    Loop,
    Block,
    Return,
    End,
    Expression,
}

impl SketchKind {
    /// Lines worth trying to evaluate on their own.
    pub fn is_standalone(self) -> bool {
        matches!(self, SketchKind::Let | SketchKind::Print | SketchKind::Expression)
    }

    fn opens_block(self) -> bool {
        matches!(self, SketchKind::Func | SketchKind::Class | SketchKind::Branch | SketchKind::Loop | SketchKind::Block)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SketchLine {
    pub line: usize,
    pub text: String,
    pub kind: SketchKind,
    /// Guessed nesting depth from block keywords.
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSketch {
    pub lines: Vec<SketchLine>,
}

impl LineSketch {
    pub fn build(source: &str) -> Self {
        let (blanked, _) = blank_comments(source, '#');
        let mut lines = Vec::new();
        let mut depth = 0usize;
        for (idx, raw) in blanked.lines().enumerate() {
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }
            let first = text.split(|c: char| !(c.is_alphanumeric() || c == '_')).next().unwrap_or("");
            let keyword = Keyword::lookup(first);
            let kind = classify(keyword);

            let is_else = matches!(keyword, Some(Keyword::Else) | Some(Keyword::Elif));
            if kind == SketchKind::End || is_else {
                depth = depth.saturating_sub(1);
            }
            lines.push(SketchLine { line: idx + 1, text: text.to_string(), kind, depth });
            if (kind.opens_block() && !is_inline_body(text)) || is_else {
                depth += 1;
            }
        }
        LineSketch { lines }
    }

    pub fn lines(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines.iter().map(|l| l.line)
    }
}

fn classify(keyword: Option<Keyword>) -> SketchKind {
    match keyword {
        Some(Keyword::Let) => SketchKind::Let,
        Some(Keyword::Print) => SketchKind::Print,
        Some(Keyword::Func) => SketchKind::Func,
        Some(Keyword::Class) => SketchKind::Class,
        Some(Keyword::If) | Some(Keyword::Else) | Some(Keyword::Elif) => SketchKind::Branch,
        Some(Keyword::While) | Some(Keyword::For) | Some(Keyword::Loop) => SketchKind::Loop,
        Some(Keyword::Start) => SketchKind::Block,
        Some(Keyword::Return) | Some(Keyword::Break) | Some(Keyword::Continue) => SketchKind::Return,
        Some(Keyword::End) => SketchKind::End,
        _ => SketchKind::Expression,
    }
}

/// `LOOP ... TIMES: PRINT i` style headers carry their body on the same line.
fn is_inline_body(text: &str) -> bool {
    let mut quote: Option<char> = None;
    for (i, ch) in text.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == ':' => return !text[i + 1..].trim().is_empty(),
            None => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_follows_block_keywords() {
        let sketch = LineSketch::build("let x = 1\nwhile x < 3:\n  x = x + 1\n  print x (\nend\n");
        let depths: Vec<(usize, usize)> = sketch.lines.iter().map(|l| (l.line, l.depth)).collect();
        assert_eq!(depths, vec![(1, 0), (2, 0), (3, 1), (4, 1), (5, 0)]);
        assert_eq!(sketch.lines[1].kind, SketchKind::Loop);
        assert_eq!(sketch.lines[3].kind, SketchKind::Print);
    }

    #[test]
    fn inline_headers_do_not_nest() {
        let sketch = LineSketch::build("loop 3 times: print 1\nprint 2\n");
        assert!(sketch.lines.iter().all(|l| l.depth == 0));
    }

    #[test]
    fn comment_only_lines_are_skipped() {
        let sketch = LineSketch::build("# header\nprint 1 # trailing\n");
        assert_eq!(sketch.lines.len(), 1);
        assert_eq!(sketch.lines[0].text, "print 1");
    }
}
