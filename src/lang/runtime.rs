use std::io::Write;
use std::path::Path;

use anyhow::Result;
use log::info;

use crate::lang::eval::{Eval, Value};

/// Name reported in diagnostics for interactive input
const STDIN_PATH: &str = "<stdin>";

pub struct Runtime<'a> {
    eval: Eval<'a>,
    interactive: bool,
}

impl<'a> Runtime<'a> {
    /// Create a new `Runtime` instance
    ///
    /// `sink` is where output should be written. eg. result of `print` calls
    ///
    /// `interactive` sets whether or not the value of each input should be printed (useful when
    /// human is at a REPL)
    pub fn new(sink: &'a mut dyn Write, interactive: bool) -> Self {
        Self {
            eval: Eval::new(sink),
            interactive,
        }
    }

    /// Run the program in `path` in the global scope
    pub fn run_file(&mut self, path: &Path) -> Result<Value> {
        let global = self.eval.global().clone();
        self.eval.run_file(path, &global)
    }

    /// Evaluate one chunk of input in the global scope
    ///
    /// Names defined by earlier inputs stay visible to later ones.
    pub fn eval(&mut self, input: &str) -> Result<Value> {
        info!("eval: {}", input);

        // A `return` at top level only ends the input it appeared in
        self.eval.clear_returning();

        let global = self.eval.global().clone();
        let value = self.eval.run_source(STDIN_PATH, input, &global)?;

        if self.interactive && !value.is_nil() {
            writeln!(self.eval.sink(), "{:?}", value)?;
        }

        Ok(value)
    }
}

#[cfg(test)]
use crate::lang::error::{Diagnostic, ErrorKind};

#[cfg(test)]
fn run(inputs: &[&str], interactive: bool) -> String {
    let mut output = Vec::new();
    {
        let mut rt = Runtime::new(&mut output, interactive);
        for input in inputs {
            rt.eval(input).expect("Eval failed");
        }
    }

    String::from_utf8(output).expect("Output not utf-8")
}

#[cfg(test)]
fn error_kind(input: &str) -> ErrorKind {
    let mut output = Vec::new();
    let mut rt = Runtime::new(&mut output, false);
    let err = rt.eval(input).expect_err("Eval succeeded when should have failed");

    match err.downcast_ref::<Diagnostic>() {
        Some(diag) => diag.kind.clone(),
        None => panic!("Not a diagnostic: {:#}", err),
    }
}

#[test]
fn test_state_persists() {
    let output = run(&["x = 1 + 2 * 3", "print x", "f = do with n\n  n", "print f 5"], false);
    assert_eq!(output, "7\n5\n");
}

#[test]
fn test_interactive() {
    assert_eq!(run(&["2 + 3"], true), "5\n");
    assert_eq!(run(&["2 + 3"], false), "");

    // `print` already wrote its output and yields nil
    assert_eq!(run(&["print 4"], true), "4\n");
    assert_eq!(run(&["\"hi\""], true), "\"hi\"\n");
    assert_eq!(run(&["x = 2", "x"], true), "2\n2\n");
}

#[test]
fn test_top_level_return() {
    let mut output = Vec::new();
    {
        let mut rt = Runtime::new(&mut output, false);
        rt.eval("return 1\nprint 2").expect("Eval failed");
        rt.eval("print 3").expect("Eval failed");
    }

    assert_eq!(String::from_utf8(output).unwrap(), "3\n");
}

#[test]
fn test_precedence_scenarios() {
    let output = run(
        &[
            "print 1 + 2 * 3",
            "print 2 * 3 + 1",
            "print 8 - 4 - 2",
            "print 2 ^ 2 * 3",
            "print 1 + 1 == 2",
        ],
        false,
    );
    assert_eq!(output, "7\n7\n2\n12\ntrue\n");
}

#[test]
fn test_false_branch_side_effect() {
    let output = run(&["x = if 1 < 2 then 10 else print \"side effect\"", "print x"], false);
    assert_eq!(output, "10\n");
}

#[test]
fn test_destructuring_scenarios() {
    assert_eq!(run(&["a, b = (\"l\", \"r\")", "print b + a"], false), "rl\n");
    assert_eq!(error_kind("t = (1)\na, b = t"), ErrorKind::CannotSplit);
}

#[test]
fn test_access_scenarios() {
    assert_eq!(error_kind("t = (hidden: 1)\nprint t.hidden"), ErrorKind::UndefinedInTuple);
    assert_eq!(error_kind("t = (1)\nprint t.missing"), ErrorKind::UndefinedInTuple);
    assert_eq!(
        run(&["public answer = 42", "f = do super.answer", "print f"], false),
        "42\n"
    );
}

#[test]
fn test_indented_file() {
    assert_eq!(error_kind(" x = 1"), ErrorKind::IndentedFile);
}

#[test]
fn test_failure_stops_evaluation() {
    let mut output = Vec::new();
    {
        let mut rt = Runtime::new(&mut output, false);
        assert!(rt.eval("print 1\nprint nope\nprint 2").is_err());

        // The runtime is still usable afterwards
        rt.eval("print 3").expect("Eval failed");
    }

    assert_eq!(String::from_utf8(output).unwrap(), "1\n3\n");
}

#[test]
fn test_run_file() {
    let path = std::env::temp_dir().join(format!("oca-runtime-{}.oca", std::process::id()));
    std::fs::write(&path, "greeting = \"hello\"\nprint greeting\n").expect("Failed to write");

    let mut output = Vec::new();
    {
        let mut rt = Runtime::new(&mut output, false);
        rt.run_file(&path).expect("Run failed");

        let err = rt
            .run_file(&path.with_extension("missing"))
            .expect_err("Missing file ran");
        assert!(err.downcast_ref::<Diagnostic>().is_none());
    }

    assert_eq!(String::from_utf8(output).unwrap(), "hello\n");
    let _ = std::fs::remove_file(&path);
}
