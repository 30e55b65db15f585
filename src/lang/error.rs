//! Language errors and their rendering.
//!
//! Every error Oca can detect is fatal to the run that triggered it. Instead of exiting on the
//! spot, the parser and evaluator return a `Diagnostic` wrapped in an `anyhow::Error`. The
//! diagnostic starts out knowing only the byte span it points at; the innermost file run it
//! passes through resolves that span against its source text (see `Diagnostic::locate`). The
//! driver then prints it and exits non-zero.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Lexing
    UnknownSymbol,
    IndentedFile,

    // Parsing
    NotAnExpression,
    UnexpectedIndent,
    NoNewline,
    NoParameter,
    NothingToSet,
    NoClosingBrace,
    NoIndent,
    NoName,
    NoAccessKey,
    NoConditional,
    NoThen,
    NoRightValue,
    NothingToInject,
    InvalidNumber,

    // Evaluating
    NewTupleKey,
    CannotSplit,
    UndefinedOperator,
    IfBool,
    UndefinedInTuple,
    NoArgument,
    Undefined,
    InjectUnsupported,
    /// Failure reported by a native function
    Runtime(String),
}

impl ErrorKind {
    pub fn title(&self) -> &str {
        match self {
            ErrorKind::UnknownSymbol => "UNKNOWN SYMBOL",
            ErrorKind::IndentedFile => "INDENTED FILE",
            ErrorKind::NotAnExpression => "NOT AN EXPRESSION",
            ErrorKind::UnexpectedIndent => "UNEXPECTED INDENT",
            ErrorKind::NoNewline => "NO NEWLINE",
            ErrorKind::NoParameter => "NO PARAMETER",
            ErrorKind::NothingToSet => "NOTHING TO SET",
            ErrorKind::NoClosingBrace => "NO CLOSING BRACE",
            ErrorKind::NoIndent => "NO INDENT",
            ErrorKind::NoName => "NO NAME",
            ErrorKind::NoAccessKey => "NO ACCESS KEY",
            ErrorKind::NoConditional => "NO CONDITIONAL",
            ErrorKind::NoThen => "NO THEN",
            ErrorKind::NoRightValue => "NO RIGHT VALUE",
            ErrorKind::NothingToInject => "NOTHING TO INJECT",
            ErrorKind::InvalidNumber => "INVALID NUMBER",
            ErrorKind::NewTupleKey => "NEW TUPLE KEY",
            ErrorKind::CannotSplit => "CANNOT SPLIT",
            ErrorKind::UndefinedOperator => "UNDEFINED OPERATOR",
            ErrorKind::IfBool => "IF BOOL",
            ErrorKind::UndefinedInTuple => "UNDEFINED IN TUPLE",
            ErrorKind::NoArgument => "NO ARGUMENT",
            ErrorKind::Undefined => "UNDEFINED",
            ErrorKind::InjectUnsupported => "INJECT UNSUPPORTED",
            ErrorKind::Runtime(_) => "RUNTIME ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ErrorKind::UnknownSymbol => "This symbol is not supported by the Oca language.",
            ErrorKind::IndentedFile => "The first line of the file must not be indented.",
            ErrorKind::NotAnExpression => "This is not a valid start of an expression.",
            ErrorKind::UnexpectedIndent => "This indent is not supposed to be here.",
            ErrorKind::NoNewline => "There must be a newline here.",
            ErrorKind::NoParameter => "There must be a parameter name after this.",
            ErrorKind::NothingToSet => "Expected some value to be set.",
            ErrorKind::NoClosingBrace => "Expected a closing brace for tuple.",
            ErrorKind::NoIndent => "There must be an indented block of code here.",
            ErrorKind::NoName => "Expected another variable.",
            ErrorKind::NoAccessKey => "Expected an accessor key.",
            ErrorKind::NoConditional => "'if' must have a conditional expression.",
            ErrorKind::NoThen => "'if' must have the 'then' keyword.",
            ErrorKind::NoRightValue => "Missing right value for operator.",
            ErrorKind::NothingToInject => "'inject' must be followed by a file path.",
            ErrorKind::InvalidNumber => "This number does not fit in a 64 bit integer.",
            ErrorKind::NewTupleKey => "You cannot add a new key to a tuple.",
            ErrorKind::CannotSplit => {
                "This value cannot be split into the variables on the left."
            }
            ErrorKind::UndefinedOperator => "The operator doesn't exist for the type.",
            ErrorKind::IfBool => "The conditional for 'if' must evaluate to a boolean value.",
            ErrorKind::UndefinedInTuple => "Undefined name in tuple.",
            ErrorKind::NoArgument => "This block requires an argument to be called.",
            ErrorKind::Undefined => "This name is not defined.",
            ErrorKind::InjectUnsupported => "'inject' is reserved and cannot be evaluated yet.",
            ErrorKind::Runtime(msg) => msg,
        }
    }
}

/// Byte range in a source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub pos: usize,
    pub width: usize,
}

impl Span {
    pub fn new(pos: usize, width: usize) -> Self {
        Self { pos, width }
    }
}

/// A `Span` resolved against the source of the file it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub path: String,
    /// 1-based
    pub line: usize,
    /// 0-based byte offset into `text`
    pub column: usize,
    pub previous: Option<String>,
    pub text: String,
}

impl Location {
    /// Scan `source` from the start to find the line holding `pos`
    pub fn resolve(path: &str, source: &str, pos: usize) -> Self {
        let mut line_start = 0;
        let mut previous = None;
        let mut lines = source.split('\n').enumerate().peekable();

        while let Some((i, line)) = lines.next() {
            let line_end = line_start + line.len();
            if pos <= line_end || lines.peek().is_none() {
                let text = line.trim_end_matches('\r');
                return Self {
                    path: path.to_string(),
                    line: i + 1,
                    column: pos.saturating_sub(line_start).min(text.len()),
                    previous,
                    text: text.to_string(),
                };
            }

            previous = Some(line.trim_end_matches('\r').to_string());
            line_start = line_end + 1;
        }

        // `split` always yields at least one item
        unreachable!()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub span: Span,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            location: None,
        }
    }

    /// Resolve the span against `source` unless an inner file already did
    pub fn locate(&mut self, path: &str, source: &str) {
        if self.location.is_none() {
            self.location = Some(Location::resolve(path, source, self.span.pos));
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = match &self.location {
            Some(loc) => loc,
            None => {
                return write!(
                    f,
                    "-- {} -- at byte {}\n{}",
                    self.kind.title(),
                    self.span.pos,
                    self.kind.message()
                )
            }
        };

        writeln!(f, "-- {} -------------------- {}", self.kind.title(), loc.path)?;
        if let Some(prev) = &loc.previous {
            writeln!(f, "{}| {}", loc.line - 1, prev)?;
        }

        let gutter = format!("{}| ", loc.line);
        writeln!(f, "{}{}", gutter, loc.text)?;

        let lead: String = loc
            .text
            .get(..loc.column)
            .unwrap_or_default()
            .chars()
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        let width = self
            .span
            .width
            .min(loc.text.len() - loc.column)
            .max(1);
        writeln!(
            f,
            "{}{}{}",
            " ".repeat(gutter.len()),
            lead,
            "^".repeat(width)
        )?;

        write!(f, "{}", self.kind.message())
    }
}

impl std::error::Error for Diagnostic {}

/// Locate `err` in `source` if it carries a diagnostic that is not located yet
pub fn locate(mut err: anyhow::Error, path: &str, source: &str) -> anyhow::Error {
    if let Some(diag) = err.downcast_mut::<Diagnostic>() {
        diag.locate(path, source);
    }

    err
}

#[test]
fn test_resolve_location() {
    let source = "x = 1\ny = x +\n  z";

    let loc = Location::resolve("a.oca", source, 0);
    assert_eq!(loc.line, 1);
    assert_eq!(loc.column, 0);
    assert_eq!(loc.previous, None);
    assert_eq!(loc.text, "x = 1");

    let loc = Location::resolve("a.oca", source, 10);
    assert_eq!(loc.line, 2);
    assert_eq!(loc.column, 4);
    assert_eq!(loc.previous.as_deref(), Some("x = 1"));
    assert_eq!(loc.text, "y = x +");

    // Past the end of the source sticks to the last line
    let loc = Location::resolve("a.oca", source, source.len());
    assert_eq!(loc.line, 3);
    assert_eq!(loc.column, 3);
}

#[test]
fn test_render() {
    let mut diag = Diagnostic::new(ErrorKind::Undefined, Span::new(14, 1));
    diag.locate("main.oca", "x = 1\ny = x + z\n");
    diag.locate("other.oca", "ignored");

    let expected = "-- UNDEFINED -------------------- main.oca\n\
                    1| x = 1\n\
                    2| y = x + z\n\
                    \x20\x20\x20\x20\x20\x20\x20\x20\x20\x20\x20^\n\
                    This name is not defined.";
    assert_eq!(diag.to_string(), expected);
}

#[test]
fn test_locate_once() {
    let err: anyhow::Error = Diagnostic::new(ErrorKind::Undefined, Span::new(6, 1)).into();
    let err = locate(err, "inner.oca", "x = 1\nnope");
    let err = locate(err, "outer.oca", "y = @inner");

    let diag = err.downcast_ref::<Diagnostic>().expect("Not a diagnostic");
    let loc = diag.location.as_ref().expect("Not located");
    assert_eq!(loc.path, "inner.oca");
    assert_eq!(loc.line, 2);

    // Other errors pass through untouched
    let err = locate(anyhow::anyhow!("boom"), "a.oca", "");
    assert_eq!(err.to_string(), "boom");
}
