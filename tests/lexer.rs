//! tests/lexer.rs
use susa::core::compiler::token_dump;
use susa::core::diagnostics::ErrorKind;
use susa::core::lexer::tokenize;
use susa::core::token::{Keyword, TokenKind};

fn dump(src: &str) -> String {
    let (tokens, _) = token_dump(src, false);
    tokens.iter().map(|t| t.to_string()).collect::<Vec<_>>().join("\n")
}

#[test]
fn token_stream_snapshot() {
    insta::assert_snapshot!(dump("let x = 2\nPRINT f\"v={x}\""), @r###"
    Keyword(LET) @1:1
    Identifier('x') @1:5
    '=' @1:7
    Number(2) @1:9
    newline @1:10
    Keyword(PRINT) @2:1
    Interpolated("v={x}") @2:7
    end of file @2:15
    "###);
}

#[test]
fn keyword_aliases_are_case_insensitive() {
    let (tokens, diags) = tokenize("Var a\nSAY a\nendwhile");
    assert!(diags.is_empty());
    let kws: Vec<_> = tokens
        .iter()
        .filter_map(|t| match t.kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        })
        .collect();
    assert_eq!(kws, vec![Keyword::Let, Keyword::Print, Keyword::End]);
}

#[test]
fn unterminated_string_reports_opening_quote() {
    let (tokens, diags) = tokenize("PRINT \"abc");
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, ErrorKind::Lexical);
    assert!(diags[0].message.contains("Unterminated string"));
    assert_eq!((diags[0].location.line, diags[0].location.column), (1, 7));
    assert!(tokens.iter().any(|t| t.kind == TokenKind::Invalid));
    assert_eq!(tokens.last().map(|t| &t.kind), Some(&TokenKind::Eof));
}

#[test]
fn every_bad_character_is_reported() {
    let (_, diags) = tokenize("let a = 1 @ 2\nlet b = ~");
    let positions: Vec<_> = diags.iter().map(|d| (d.location.line, d.location.column)).collect();
    assert_eq!(positions, vec![(1, 11), (2, 9)]);
    assert!(diags.iter().all(|d| d.message.starts_with("Unrecognized character")));
}

#[test]
fn trivia_is_kept_on_request() {
    let (with, _) = token_dump("let a = 1 # note", true);
    assert!(with.iter().any(|t| matches!(&t.kind, TokenKind::Comment(c) if c == "# note")));
    assert!(with.iter().any(|t| t.kind == TokenKind::Whitespace));

    let (without, _) = token_dump("let a = 1 # note", false);
    assert!(without.iter().all(|t| !t.kind.is_trivia()));
}

#[test]
fn columns_count_characters_not_bytes() {
    let (tokens, _) = tokenize("let é = \"ü\" + x");
    let x = tokens.iter().find(|t| t.kind == TokenKind::Identifier("x".into())).unwrap();
    assert_eq!(x.column, 15);
}
