//! Turns Oca source text into a token stream.
//!
//! The token grammar is a small PEG built with `pom`. Like any PEG it is order sensitive: longer
//! operators (`==`, `..`) are tried before the punctuation they start with, and scientific and
//! real literals are tried before plain integers.
//!
//! Indentation is significant in Oca, so newlines are not skipped like other whitespace. Every
//! newline becomes an `Indent` token whose text is the newline plus the leading whitespace of the
//! following line. Blank lines and comment-only lines are collapsed afterwards so the parser only
//! ever sees the indent of the next line that holds code.

use std::fmt;

use anyhow::{bail, Result};
use pom::parser::{empty, end, is_a, none_of, one_of, seq, sym, Parser};

use crate::lang::error::{Diagnostic, ErrorKind, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Newline followed by the next line's indentation
    Indent,
    Name,
    Keyword,
    String,
    Integer,
    BinNum,
    HexNum,
    Real,
    ScientNum,
    Boolean,
    Operator,
    Punct,
    FilePath,
    /// End of stream sentinel. Never consumed by the parser
    Last,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Indent => "indent",
            TokenKind::Name => "name",
            TokenKind::Keyword => "keyword",
            TokenKind::String => "string",
            TokenKind::Integer => "integer",
            TokenKind::BinNum => "binnum",
            TokenKind::HexNum => "hexnum",
            TokenKind::Real => "real",
            TokenKind::ScientNum => "scientnum",
            TokenKind::Boolean => "boolean",
            TokenKind::Operator => "operator",
            TokenKind::Punct => "punct",
            TokenKind::FilePath => "filepath",
            TokenKind::Last => "last",
        };

        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset into the source
    pub pos: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: &str, pos: usize) -> Self {
        Self {
            kind,
            text: text.to_string(),
            pos,
        }
    }

    /// Indentation depth of an `Indent` token
    pub fn depth(&self) -> usize {
        self.text.len().saturating_sub(1)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}: {:?} @{})", self.kind.to_string(), self.text, self.pos)
    }
}

const KEYWORDS: &[&str] = &[
    "if", "then", "else", "do", "with", "public", "return", "break", "inject",
];

const WORD_OPERATORS: &[&str] = &["and", "or", "xor", "lsh", "rsh"];

type Lexeme<'a> = (TokenKind, &'a [u8]);

fn space<'a>() -> Parser<'a, u8, ()> {
    let comment = sym(b'#') * none_of(b"\n").repeat(0..);
    (one_of(b" \t\r").discard() | comment.discard())
        .repeat(0..)
        .discard()
}

fn indent<'a>() -> Parser<'a, u8, Lexeme<'a>> {
    (sym(b'\n') + one_of(b" \t").repeat(0..))
        .collect()
        .map(|s| (TokenKind::Indent, s))
}

fn file_path<'a>() -> Parser<'a, u8, Lexeme<'a>> {
    let path_char = is_a(|c: u8| c.is_ascii_alphanumeric() || b"_-./".contains(&c));
    (sym(b'@') + path_char.repeat(1..))
        .collect()
        .map(|s| (TokenKind::FilePath, s))
}

fn string<'a>() -> Parser<'a, u8, Lexeme<'a>> {
    // Escapes are kept verbatim here and resolved by the parser
    let escape_sequence = sym(b'\\') * none_of(b"\n");
    let body = (none_of(b"\\\"").discard() | escape_sequence.discard()).repeat(0..);

    (sym(b'"') + body + sym(b'"'))
        .collect()
        .map(|s| (TokenKind::String, s))
}

fn number<'a>() -> Parser<'a, u8, Lexeme<'a>> {
    let digits = || one_of(b"0123456789").repeat(1..);

    let bin = (seq(b"0b") + one_of(b"01").repeat(1..))
        .collect()
        .map(|s| (TokenKind::BinNum, s));
    let hex = (seq(b"0x") + is_a(|c: u8| c.is_ascii_hexdigit()).repeat(1..))
        .collect()
        .map(|s| (TokenKind::HexNum, s));
    let scient = (digits()
        + (sym(b'.') + digits()).opt()
        + one_of(b"eE")
        + one_of(b"+-").opt()
        + digits())
    .collect()
    .map(|s| (TokenKind::ScientNum, s));
    let real = (digits() + sym(b'.') + digits())
        .collect()
        .map(|s| (TokenKind::Real, s));
    let integer = digits().collect().map(|s| (TokenKind::Integer, s));

    bin | hex | scient | real | integer
}

fn word<'a>() -> Parser<'a, u8, Lexeme<'a>> {
    let head = is_a(|c: u8| c.is_ascii_alphabetic() || c == b'_');
    let tail = is_a(|c: u8| c.is_ascii_alphanumeric() || c == b'_').repeat(0..);

    (head + tail).collect().map(|s| {
        let kind = match s {
            b"true" | b"false" => TokenKind::Boolean,
            w if WORD_OPERATORS.iter().any(|op| op.as_bytes() == w) => TokenKind::Operator,
            w if KEYWORDS.iter().any(|kw| kw.as_bytes() == w) => TokenKind::Keyword,
            _ => TokenKind::Name,
        };

        (kind, s)
    })
}

fn operator<'a>() -> Parser<'a, u8, Lexeme<'a>> {
    let op = seq(b"==")
        | seq(b"!=")
        | seq(b">=")
        | seq(b"<=")
        | seq(b"..")
        | one_of(b"+-*/%^<>").collect();

    op.map(|s| (TokenKind::Operator, s))
}

fn punct<'a>() -> Parser<'a, u8, Lexeme<'a>> {
    one_of(b"()=,.:").collect().map(|s| (TokenKind::Punct, s))
}

fn tokens<'a>() -> Parser<'a, u8, Vec<(usize, Lexeme<'a>)>> {
    let lexeme = indent() | file_path() | string() | number() | word() | operator() | punct();
    let token = space() * (empty().pos() + lexeme);

    token.repeat(0..) - space() - end()
}

fn error_position(err: &pom::Error, fallback: usize) -> usize {
    match err {
        pom::Error::Mismatch { position, .. }
        | pom::Error::Conversion { position, .. }
        | pom::Error::Expect { position, .. }
        | pom::Error::Custom { position, .. } => *position,
        pom::Error::Incomplete => fallback,
    }
}

/// Lex `source` into tokens
///
/// The result always starts with an `Indent` describing the first line and always ends with a
/// `Last` sentinel.
pub fn lex(source: &str) -> Result<Vec<Token>> {
    let raw = match tokens().parse(source.as_bytes()) {
        Ok(r) => r,
        Err(e) => {
            let pos = error_position(&e, source.len());
            bail!(Diagnostic::new(ErrorKind::UnknownSymbol, Span::new(pos, 1)));
        }
    };

    let lead = source
        .bytes()
        .take_while(|c| *c == b' ' || *c == b'\t')
        .count();
    let mut out = vec![Token {
        kind: TokenKind::Indent,
        text: format!("\n{}", &source[..lead]),
        pos: 0,
    }];

    for (pos, (kind, bytes)) in raw {
        let token = Token {
            kind,
            text: String::from_utf8_lossy(bytes).into_owned(),
            pos,
        };

        // Only the indent right before code matters
        match out.last_mut() {
            Some(prev) if prev.kind == TokenKind::Indent && kind == TokenKind::Indent => {
                *prev = token
            }
            _ => out.push(token),
        }
    }

    out.push(Token::new(TokenKind::Last, "", source.len()));

    Ok(out)
}

#[cfg(test)]
fn kinds(source: &str) -> Vec<(TokenKind, String)> {
    lex(source)
        .expect("Failed to lex")
        .into_iter()
        .map(|t| (t.kind, t.text))
        .collect()
}

#[test]
fn test_simple_statement() {
    use TokenKind::*;

    assert_eq!(
        kinds("x = 1 + foo"),
        vec![
            (Indent, "\n".to_string()),
            (Name, "x".to_string()),
            (Punct, "=".to_string()),
            (Integer, "1".to_string()),
            (Operator, "+".to_string()),
            (Name, "foo".to_string()),
            (Last, "".to_string()),
        ]
    );
}

#[test]
fn test_words() {
    use TokenKind::*;

    let toks = kinds("if a and true then b else public c");
    let expected = vec![
        Indent, Keyword, Name, Operator, Boolean, Keyword, Name, Keyword, Keyword, Name, Last,
    ];
    assert_eq!(toks.iter().map(|t| t.0).collect::<Vec<_>>(), expected);
}

#[test]
fn test_numbers() {
    use TokenKind::*;

    let data = vec![
        ("0b101", BinNum),
        ("0x1F", HexNum),
        ("1.5e3", ScientNum),
        ("2E-2", ScientNum),
        ("3.25", Real),
        ("42", Integer),
    ];

    for (input, expected) in data {
        let toks = kinds(input);
        assert_eq!(toks[1], (expected, input.to_string()));
        assert_eq!(toks.len(), 3);
    }

    // `..` is an operator, not part of a real literal
    let toks = kinds("1..5");
    assert_eq!(toks[1], (Integer, "1".to_string()));
    assert_eq!(toks[2], (Operator, "..".to_string()));
    assert_eq!(toks[3], (Integer, "5".to_string()));
}

#[test]
fn test_operators_and_punct() {
    use TokenKind::*;

    let toks = kinds("a == b != c <= d . e : (f, g) = -1 @lib/util");
    let got: Vec<(TokenKind, &str)> = toks.iter().map(|(k, t)| (*k, t.as_str())).collect();
    assert_eq!(
        got,
        vec![
            (Indent, "\n"),
            (Name, "a"),
            (Operator, "=="),
            (Name, "b"),
            (Operator, "!="),
            (Name, "c"),
            (Operator, "<="),
            (Name, "d"),
            (Punct, "."),
            (Name, "e"),
            (Punct, ":"),
            (Punct, "("),
            (Name, "f"),
            (Punct, ","),
            (Name, "g"),
            (Punct, ")"),
            (Punct, "="),
            (Operator, "-"),
            (Integer, "1"),
            (FilePath, "@lib/util"),
            (Last, ""),
        ]
    );
}

#[test]
fn test_strings() {
    let toks = kinds(r#"print "a \"quoted\" # not a comment""#);
    assert_eq!(toks[2].0, TokenKind::String);
    assert_eq!(toks[2].1, r#""a \"quoted\" # not a comment""#);
}

#[test]
fn test_indents() {
    let toks = lex("f = do\n  a\n\n   # comment\n  b\nc\n").expect("Failed to lex");
    let indents: Vec<(usize, usize)> = toks
        .iter()
        .filter(|t| t.kind == TokenKind::Indent)
        .map(|t| (t.depth(), t.pos))
        .collect();

    // Blank and comment-only lines collapse into the indent before `b`
    assert_eq!(indents, vec![(0, 0), (2, 6), (2, 24), (0, 28), (0, 30)]);
}

#[test]
fn test_first_line_indent() {
    let toks = lex("  x").expect("Failed to lex");
    assert_eq!(toks[0].kind, TokenKind::Indent);
    assert_eq!(toks[0].depth(), 2);

    // Leading blank lines don't count
    let toks = lex("  \nx").expect("Failed to lex");
    assert_eq!(toks[0].depth(), 0);
    assert_eq!(toks[1].kind, TokenKind::Name);
}

#[test]
fn test_unknown_symbol() {
    let err = lex("x = 1\ny = $").unwrap_err();
    let diag = err.downcast_ref::<Diagnostic>().expect("Not a diagnostic");
    assert_eq!(diag.kind, ErrorKind::UnknownSymbol);
    assert_eq!(diag.span, Span::new(10, 1));
}
