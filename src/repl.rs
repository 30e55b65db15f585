use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Completer, Helper, Highlighter, Hinter, Result};

/// Line editor helper for the Oca prompt
///
/// Oca blocks are delimited by indentation, so a body can't be typed on one line. A line ending in
/// `\` asks `Validator` for another line instead of submitting, and the continuation keeps its
/// leading whitespace. The whole entry reaches `fixup_input` as one string, e.g.
///
/// ```text
/// (oca) f = do with n\
///   print n\
///   n * 2
/// ```
#[derive(Completer, Helper, Highlighter, Hinter)]
pub struct ReplHelper {}

impl ReplHelper {
    pub fn new() -> Self {
        ReplHelper {}
    }
}

impl Validator for ReplHelper {
    fn validate(&self, ctx: &mut ValidationContext) -> Result<ValidationResult> {
        if ctx.input().ends_with('\\') {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

/// Turn a continued entry into Oca source
///
/// Each `\` + newline left by `ReplHelper` becomes a plain newline. The indentation after it is
/// kept, since the lexer reads it as block structure. A `\` anywhere else is left alone.
pub fn fixup_input(input: &str) -> String {
    input.replace("\\\n", "\n")
}

#[test]
fn test_fixup_input() {
    assert_eq!(fixup_input("f = do with n\\\n  n"), "f = do with n\n  n");
    assert_eq!(fixup_input("a \\ \nb"), "a \\ \nb");
    assert_eq!(fixup_input("print 1"), "print 1");
    assert_eq!(
        fixup_input("f = do with n\\\n  print n\\\n  n * 2"),
        "f = do with n\n  print n\n  n * 2"
    );
    assert_eq!(
        fixup_input("if x then\\\n  1\\\nelse\\\n  2"),
        "if x then\n  1\nelse\n  2"
    );
}
