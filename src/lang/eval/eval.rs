use std::cell::Cell;
use std::fs;
use std::io::Write;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Error, Result};
use log::{debug, info};

use super::value::{Block, Tuple, Value};
use crate::lang::ast::{Ast, Kind, NodeId, Origin};
use crate::lang::error::{locate, Diagnostic, ErrorKind, Span};
use crate::lang::lex::lex;
use crate::lang::parse::Parser;
use crate::lang::prelude::{Prelude, GLOBALS, OPERATOR_METHODS};
use crate::lang::scope::Scope;

/// Records the span of the node being evaluated and puts the previous one back when dropped
struct Tracker {
    current: Rc<Cell<Option<Span>>>,
    saved: Option<Span>,
}

impl Tracker {
    fn new(current: &Rc<Cell<Option<Span>>>, span: Span) -> Self {
        let saved = current.replace(Some(span));

        Self {
            current: current.clone(),
            saved,
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.current.set(self.saved);
    }
}

/// Makes `path` the current file, with `root` as its top level scope, until dropped
struct Inclusion<'e, 'a> {
    eval: &'e mut Eval<'a>,
    saved_path: Option<PathBuf>,
    saved_root: Scope,
}

impl<'e, 'a> Inclusion<'e, 'a> {
    fn enter(eval: &'e mut Eval<'a>, path: &Path, root: &Scope) -> Self {
        let saved_path = eval.path.replace(path.to_path_buf());
        let saved_root = mem::replace(&mut eval.file_root, root.clone());

        Self {
            eval,
            saved_path,
            saved_root,
        }
    }
}

impl<'e, 'a> Deref for Inclusion<'e, 'a> {
    type Target = Eval<'a>;

    fn deref(&self) -> &Eval<'a> {
        &*self.eval
    }
}

impl<'e, 'a> DerefMut for Inclusion<'e, 'a> {
    fn deref_mut(&mut self) -> &mut Eval<'a> {
        &mut *self.eval
    }
}

impl<'e, 'a> Drop for Inclusion<'e, 'a> {
    fn drop(&mut self) {
        self.eval.path = self.saved_path.take();
        self.eval.file_root = mem::take(&mut self.saved_root);
    }
}

pub struct Eval<'a> {
    sink: &'a mut dyn Write,
    prelude: Prelude,
    /// Root scope of the main program, also holding the global functions
    global: Scope,
    /// Top level scope of the file currently being evaluated
    file_root: Scope,
    current: Rc<Cell<Option<Span>>>,
    /// Set by `return` until the enclosing block invocation finishes
    returning: bool,
    /// File currently being evaluated
    path: Option<PathBuf>,
}

impl<'a> Eval<'a> {
    /// Create a new `Eval` instance
    ///
    /// `sink` is where output should be written. eg. result of `print` calls
    pub fn new(sink: &'a mut dyn Write) -> Self {
        let global = Scope::root();
        for func in &*GLOBALS {
            global.define(&func.to_string(), Value::Func(*func), false);
        }

        Self {
            sink,
            prelude: Prelude::new(),
            file_root: global.clone(),
            global,
            current: Rc::new(Cell::new(None)),
            returning: false,
            path: None,
        }
    }

    pub fn sink(&mut self) -> &mut dyn Write {
        &mut *self.sink
    }

    pub fn global(&self) -> &Scope {
        &self.global
    }

    pub fn members(&self, value: &Value) -> Scope {
        self.prelude.members(value)
    }

    pub fn clear_returning(&mut self) {
        self.returning = false;
    }

    fn fail(&self, kind: ErrorKind, ast: &Ast, id: NodeId) -> Error {
        Diagnostic::new(kind, ast.span(id)).into()
    }

    /// Error anchored at the node currently being evaluated
    pub fn fail_here(&self, kind: ErrorKind) -> Error {
        let span = self.current.get().unwrap_or_else(|| Span::new(0, 1));
        Diagnostic::new(kind, span).into()
    }

    pub fn eval(&mut self, ast: &Rc<Ast>, id: NodeId, scope: &Scope) -> Result<Value> {
        let _tracker = Tracker::new(&self.current, ast.span(id));

        self.dispatch(ast, id, scope).map_err(|e| {
            // Native failures become diagnostics at the innermost node
            let e = if e.is::<Diagnostic>() {
                e
            } else {
                self.fail_here(ErrorKind::Runtime(format!("{:#}", e)))
            };

            match ast.origin() {
                Some(origin) => locate(e, &origin.path, &origin.source),
                None => e,
            }
        })
    }

    fn dispatch(&mut self, ast: &Rc<Ast>, id: NodeId, scope: &Scope) -> Result<Value> {
        let node = ast.node(id);

        match node.kind {
            Kind::Set => self.eval_set(ast, id, scope),
            Kind::Call => self.eval_call(ast, id, scope),
            Kind::Oper => self.eval_oper(ast, id, scope),
            Kind::If => self.eval_if(ast, id, scope),
            Kind::Access => self.eval_access(ast, id, scope),
            Kind::File => self.eval_file(ast, id),
            Kind::Tup => self.eval_tuple(ast, id, scope),
            Kind::Return => {
                let val = self.eval_opt(ast, node.right, scope)?;
                self.returning = true;

                Ok(val)
            }
            Kind::Break => Ok(Value::Nil),
            Kind::Inject => Err(self.fail(ErrorKind::InjectUnsupported, ast, id)),
            Kind::Block | Kind::Main | Kind::Else => {
                Ok(Value::Block(Rc::new(Block::new(ast.clone(), id, scope.clone()))))
            }
            Kind::Str => Ok(Value::String(node.text.clone())),
            Kind::Int => Ok(Value::Integer(node.text.parse()?)),
            Kind::Real => Ok(Value::Real(node.text.parse()?)),
            Kind::Bool => Ok(Value::Bool(node.text == "true")),
            Kind::Calls | Kind::Branches | Kind::Next | Kind::PartOper | Kind::Name => {
                bail!("Cannot evaluate a '{}' node -- parser bug", node.kind)
            }
        }
    }

    fn eval_opt(&mut self, ast: &Rc<Ast>, id: Option<NodeId>, scope: &Scope) -> Result<Value> {
        match id {
            Some(id) => self.eval(ast, id, scope),
            None => Ok(Value::Nil),
        }
    }

    fn child(id: Option<NodeId>) -> Result<NodeId> {
        match id {
            Some(id) => Ok(id),
            None => bail!("Malformed syntax tree -- parser bug"),
        }
    }

    /// Evaluate statements in order
    ///
    /// Stops early on `break` (yielding the last value so far) and when a `return` was evaluated.
    pub fn run_statements<I>(&mut self, ast: &Rc<Ast>, stmts: I, scope: &Scope) -> Result<Value>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut result = Value::Nil;
        for stmt in stmts {
            if ast.node(stmt).kind == Kind::Break {
                break;
            }

            result = self.eval(ast, stmt, scope)?;
            if self.returning {
                break;
            }
        }

        Ok(result)
    }

    fn eval_set(&mut self, ast: &Rc<Ast>, id: NodeId, scope: &Scope) -> Result<Value> {
        let node = ast.node(id);
        let value = self.eval(ast, Self::child(node.right)?, scope)?;
        let public = node.text == "pub";

        let mut targets = Vec::new();
        let mut it = Self::child(node.left)?;
        while ast.node(it).kind == Kind::Calls {
            targets.push(Self::child(ast.node(it).left)?);
            it = Self::child(ast.node(it).right)?;
        }
        targets.push(it);

        if targets.len() == 1 {
            self.assign(ast, it, value.clone(), scope, public)?;
            return Ok(value);
        }

        // Destructure positional members
        if let Value::Tuple(t) = &value {
            if t.count < targets.len() {
                return Err(self.fail(ErrorKind::CannotSplit, ast, id));
            }
        }

        let members = self.members(&value);
        for (i, target) in targets.iter().enumerate() {
            let part = members.get(&i.to_string(), false);
            if part.is_nil() {
                return Err(self.fail(ErrorKind::CannotSplit, ast, id));
            }

            self.assign(ast, *target, part, scope, public)?;
        }

        Ok(value)
    }

    fn assign(
        &mut self,
        ast: &Rc<Ast>,
        target: NodeId,
        value: Value,
        scope: &Scope,
        public: bool,
    ) -> Result<()> {
        let node = ast.node(target);
        if node.kind != Kind::Access {
            scope.set(&node.text, value, true);
            if public {
                scope.export(&node.text);
            }

            return Ok(());
        }

        // Dotted targets may only update members that already exist
        let owner_id = Self::child(node.left)?;
        let key_id = Self::child(node.right)?;
        let name = &ast.node(key_id).text;

        if self.is_super(ast, owner_id, scope) {
            if scope.holder(name).is_none() {
                return Err(self.fail(ErrorKind::NewTupleKey, ast, key_id));
            }
            scope.set(name, value, false);

            return Ok(());
        }

        match self.eval(ast, owner_id, scope)? {
            Value::Tuple(t) if t.scope.lookup_public(name).is_some() => {
                t.scope.set(name, value, true);
                Ok(())
            }
            _ => Err(self.fail(ErrorKind::NewTupleKey, ast, key_id)),
        }
    }

    /// Look `name` up from `scope`, then in the current file and finally among the globals
    ///
    /// Private top level entries of a file stay visible to everything inside that file.
    fn resolve(&self, name: &str, scope: &Scope) -> Option<Value> {
        scope
            .lookup(name, true)
            .or_else(|| self.file_root.lookup(name, false))
            .or_else(|| self.global.lookup(name, false))
    }

    /// `super` names the current scope unless the program defined it
    fn is_super(&self, ast: &Ast, id: NodeId, scope: &Scope) -> bool {
        let node = ast.node(id);
        node.kind == Kind::Call && node.text == "super" && self.resolve("super", scope).is_none()
    }

    fn eval_call(&mut self, ast: &Rc<Ast>, id: NodeId, scope: &Scope) -> Result<Value> {
        let node = ast.node(id);

        let target = if self.is_super(ast, id, scope) {
            Value::Tuple(Tuple::new(scope.clone(), 0))
        } else {
            match self.resolve(&node.text, scope) {
                Some(v) => v,
                None => return Err(self.fail(ErrorKind::Undefined, ast, id)),
            }
        };

        let arg = self.eval_opt(ast, node.right, scope)?;
        let block = self.eval_opt(ast, node.left, scope)?;

        if let Some(func) = target.callable() {
            let receiver = Value::Tuple(Tuple::new(scope.clone(), 0));
            return func.call(self, receiver, arg, block);
        }

        Ok(target)
    }

    fn eval_oper(&mut self, ast: &Rc<Ast>, id: NodeId, scope: &Scope) -> Result<Value> {
        let node = ast.node(id);
        let left = self.eval(ast, Self::child(node.left)?, scope)?;
        let right = self.eval(ast, Self::child(node.right)?, scope)?;

        let method = match OPERATOR_METHODS.get(node.text.as_str()) {
            Some(m) => *m,
            None => return Err(self.fail(ErrorKind::UndefinedOperator, ast, id)),
        };
        let func = match self.members(&left).lookup(method, false) {
            Some(f) => f,
            None => return Err(self.fail(ErrorKind::UndefinedOperator, ast, id)),
        };

        match func.callable() {
            Some(func) => func.call(self, left, right, Value::Nil),
            None => Ok(func),
        }
    }

    fn eval_if(&mut self, ast: &Rc<Ast>, id: NodeId, scope: &Scope) -> Result<Value> {
        let node = ast.node(id);
        let cond_id = Self::child(node.left)?;
        let truth = match self.eval(ast, cond_id, scope)? {
            Value::Bool(b) => b,
            _ => return Err(self.fail(ErrorKind::IfBool, ast, cond_id)),
        };

        let branches = ast.node(Self::child(node.right)?);
        let branch = if truth { branches.left } else { branches.right };

        match branch {
            Some(b) => self.run_statements(ast, ast.statements(b), scope),
            None => Ok(Value::Nil),
        }
    }

    fn eval_access(&mut self, ast: &Rc<Ast>, id: NodeId, scope: &Scope) -> Result<Value> {
        let node = ast.node(id);
        let owner_id = Self::child(node.left)?;
        let key_id = Self::child(node.right)?;
        let key = ast.node(key_id);

        let by_super = self.is_super(ast, owner_id, scope);
        let owner = self.eval(ast, owner_id, scope)?;
        let members = self.members(&owner);
        let member = if by_super {
            members.lookup(&key.text, true)
        } else {
            members.lookup_public(&key.text)
        };
        let member = match member {
            Some(m) => m,
            None => return Err(self.fail(ErrorKind::UndefinedInTuple, ast, key_id)),
        };

        let arg = self.eval_opt(ast, key.right, scope)?;
        let block = self.eval_opt(ast, key.left, scope)?;

        if let Some(func) = member.callable() {
            return func.call(self, owner, arg, block);
        }

        Ok(member)
    }

    fn eval_file(&mut self, ast: &Rc<Ast>, id: NodeId) -> Result<Value> {
        let node = ast.node(id);
        let dir = self
            .path
            .as_ref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let path = dir.join(format!("{}.oca", node.text));

        self.run_file(&path, &Scope::root())
    }

    fn eval_tuple(&mut self, ast: &Rc<Ast>, id: NodeId, scope: &Scope) -> Result<Value> {
        let node = ast.node(id);

        // Parentheses around a single unnamed value just group it
        if node.right.is_none() && node.text.is_empty() {
            return self.eval(ast, Self::child(node.left)?, scope);
        }

        let members = Scope::child(scope);
        let mut count = 0;
        let mut member = Some(id);
        while let Some(m) = member {
            let tup = ast.node(m);
            let (name, public) = if tup.text.is_empty() {
                count += 1;
                ((count - 1).to_string(), true)
            } else if let Some(name) = tup.text.strip_prefix("pub ") {
                (name.to_string(), true)
            } else {
                (tup.text.clone(), false)
            };

            let value = self.eval(ast, Self::child(tup.left)?, &members)?;
            members.define(&name, value, public);
            member = tup.right;
        }

        Ok(Value::Tuple(Tuple::new(members, count)))
    }

    /// Lex, parse and evaluate `source` in `scope`
    ///
    /// Diagnostics passing through are located in `source` unless an inner file already did.
    pub fn run_source(&mut self, path: &str, source: &str, scope: &Scope) -> Result<Value> {
        let result = self.parse_and_run(path, source, scope);
        result.map_err(|e| locate(e, path, source))
    }

    fn parse_and_run(&mut self, path: &str, source: &str, scope: &Scope) -> Result<Value> {
        let tokens = lex(source)?;
        debug!("{}: {} tokens", path, tokens.len());

        let origin = Origin {
            path: path.to_string(),
            source: source.to_string(),
        };
        let program = Parser::with_origin(tokens, origin).parse()?;

        self.run_statements(&program.ast, program.roots.iter().copied(), scope)
    }

    /// Evaluate the file at `path` with `path` as the current file
    pub fn run_file(&mut self, path: &Path, scope: &Scope) -> Result<Value> {
        info!("running {}", path.display());
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;

        let mut file = Inclusion::enter(self, path, scope);
        let result = file.run_source(&path.display().to_string(), &source, scope);
        file.clear_returning();

        result
    }
}

#[cfg(test)]
fn run(input: &str) -> Result<String> {
    let mut output = Vec::new();
    {
        let mut eval = Eval::new(&mut output);
        let global = eval.global().clone();
        eval.run_source("test.oca", input, &global)?;
    }

    Ok(String::from_utf8(output).expect("Output not utf-8"))
}

#[cfg(test)]
fn run_err(input: &str) -> ErrorKind {
    let err = run(input).expect_err("Eval succeeded when should have failed");
    match err.downcast_ref::<Diagnostic>() {
        Some(diag) => diag.kind.clone(),
        None => panic!("Not a diagnostic: {:#}", err),
    }
}

#[test]
fn test_expression() {
    let tests = vec![
        ("print 5 + 5", "10\n"),
        ("print 100 - 3", "97\n"),
        ("print 100 * 3", "300\n"),
        ("print 99 / 3", "33\n"),
        ("print 100 % 3", "1\n"),
        ("print 2 ^ 3 ^ 2", "64\n"),
        ("print 1 + 2 * 3", "7\n"),
        ("print (1 + 2) * 3", "9\n"),
        ("print 10 - 2 - 3", "5\n"),
        ("print 1 == 1", "true\n"),
        ("print true == false", "false\n"),
        ("print true != false", "true\n"),
        ("print 1 < 3 == true", "true\n"),
        ("print 3 >= 3", "true\n"),
        ("print 7 and 1", "1\n"),
        ("print 1 lsh 3", "8\n"),
        ("print true xor false", "true\n"),
        ("print 1.5 * 2", "3.0\n"),
        ("print 1.5e3", "1500.0\n"),
        ("print 0x10 + 0b11", "19\n"),
        (r#"print "a" + 1"#, "a1\n"),
        ("print 1 .. 4", "(1, 2, 3)\n"),
        ("x = -3\nprint x", "-3\n"),
    ];

    for (input, expected) in tests {
        assert_eq!(run(input).expect("Eval failed"), expected, "input: {}", input);
    }
}

#[test]
fn test_set() {
    assert_eq!(run("x = 1 + 2 * 3\nprint x").unwrap(), "7\n");
    assert_eq!(run("x = y = 2\nprint x + y").unwrap(), "4\n");
    assert_eq!(run("x = 1\nx = x + 1\nprint x").unwrap(), "2\n");
}

#[test]
fn test_blocks() {
    let tests = vec![
        ("f = do with n\n  n\nprint f 5", "5\n"),
        ("f = do with a, b a * b\nprint f (3, 4)", "12\n"),
        ("f = do 42\nprint f", "42\n"),
        ("f = do with n\n  return n * 2\n  print 0\nprint f 4", "8\n"),
        ("apply = do with x yield x\nprint apply 3 do with n n + 1", "4\n"),
        ("3.times do with i print i", "0\n1\n2\n"),
        // Closures keep their defining scope alive
        ("mk = do with n\n  do with m n + m\nadd2 = mk 2\nprint add2 5", "7\n"),
    ];

    for (input, expected) in tests {
        assert_eq!(run(input).expect("Eval failed"), expected, "input: {}", input);
    }
}

#[test]
fn test_if() {
    let tests = vec![
        ("x = 3\nif x == 3 then print \"yep\"", "yep\n"),
        ("x = 3\nif x != 3 then print \"nope\" else print \"yep\"", "yep\n"),
        (
            "x = 3\nif x != 3 then\n  print \"nope\"\nelse\n  print \"yep\"\n  x = 4\nprint x",
            "yep\n4\n",
        ),
        ("print (if true then 1 else 2)", "1\n"),
        ("print (if false then 1)", "nil\n"),
        ("f = do with n\n  if n > 0 then\n    return 1\n  0\nprint f 5\nprint f (-5)", "1\n0\n"),
    ];

    for (input, expected) in tests {
        assert_eq!(run(input).expect("Eval failed"), expected, "input: {}", input);
    }
}

#[test]
fn test_false_branch_not_evaluated() {
    assert_eq!(
        run("x = if true then 1 else print \"boom\"\nprint x").unwrap(),
        "1\n"
    );
    assert_eq!(
        run("x = if false then print \"boom\" else 2\nprint x").unwrap(),
        "2\n"
    );
}

#[test]
fn test_break() {
    let input = "f = do\n  print 1\n  break\n  print 2\nf";
    assert_eq!(run(input).unwrap(), "1\n");
}

#[test]
fn test_break_in_branch() {
    let input = "x = if true then\n  1\n  break\n  print 9\nprint x";
    assert_eq!(run(input).unwrap(), "1\n");

    let input = "x = if false then\n  0\nelse\n  2\n  break\n  print 9\nprint x";
    assert_eq!(run(input).unwrap(), "2\n");
}

#[test]
fn test_values_outlive_call() {
    let tests = vec![
        // Tuple built inside a call keeps the call's bindings
        ("mk = do with n\n  (public get: do n)\nt = mk 5\nprint t.get", "5\n"),
        (
            "counter = do with start\n  (public n: start, public bump: do self.n + 1)\n\
             c = counter 4\nprint c.bump",
            "5\n",
        ),
        // Block returned from a block returned from a call
        ("mk = do with a\n  do with b\n    do a + b\nf = mk 1\ng = f 2\nprint g", "3\n"),
        // Several instances do not share state
        (
            "mk = do with n\n  (public get: do n)\na = mk 1\nb = mk 2\nprint a.get\nprint b.get",
            "1\n2\n",
        ),
    ];

    for (input, expected) in tests {
        assert_eq!(run(input).expect("Eval failed"), expected, "input: {}", input);
    }
}

#[test]
fn test_tuples() {
    let tests = vec![
        ("t = (1, 2)\nprint t.0 + t.1", "3\n"),
        ("t = (a: 1, public b: 2)\nprint t.b", "2\n"),
        ("t = (a: 1, public b: a + 1)\nprint t.b", "2\n"),
        ("t = (1, public b: 2)\nt.b = 5\nprint t", "(1, public b: 5)\n"),
        ("t = (1, 2)\nt.0 = 5\nprint t.0", "5\n"),
        ("print (4)", "4\n"),
        ("print type (1, 2)", "tuple\n"),
        ("print \"abc\".size", "3\n"),
    ];

    for (input, expected) in tests {
        assert_eq!(run(input).expect("Eval failed"), expected, "input: {}", input);
    }
}

#[test]
fn test_destructuring() {
    assert_eq!(run("a, b = (1, 2)\nprint a\nprint b").unwrap(), "1\n2\n");
    assert_eq!(run("a, b = 1 .. 3\nprint a + b").unwrap(), "3\n");
    assert_eq!(run_err("a, b = (1)"), ErrorKind::CannotSplit);
    assert_eq!(run_err("a, b = (x: 1, y: 2)"), ErrorKind::CannotSplit);
}

#[test]
fn test_visibility() {
    // Private members are not reachable through dot access
    assert_eq!(run_err("t = (a: 1, b: 2)\nprint t.a"), ErrorKind::UndefinedInTuple);

    // `super` walks the chain and sees public ancestor entries
    let input = "public x = 5\nf = do super.x\nprint f";
    assert_eq!(run(input).unwrap(), "5\n");
    let input = "x = 5\nf = do super.x\nprint f";
    assert_eq!(run_err(input), ErrorKind::UndefinedInTuple);

    // Parameters are visible to nested blocks
    let input = "f = do with n\n  g = do n\n  g\nprint f 3";
    assert_eq!(run(input).unwrap(), "3\n");
}

#[test]
fn test_operator_overload() {
    let input = "v = (x: 1, public __add: do with o self.x + o)\nprint v + 2";
    assert_eq!(
        run_err(input),
        ErrorKind::UndefinedInTuple,
        "private x is not visible through self"
    );

    let input = "v = (public x: 1, public __add: do with o self.x + o)\nprint v + 2";
    assert_eq!(run(input).unwrap(), "3\n");
}

#[test]
fn test_errors() {
    let tests = vec![
        ("x = y", ErrorKind::Undefined),
        ("x = 1\nx.foo = 2", ErrorKind::NewTupleKey),
        ("t = (public a: 1)\nt.b = 2", ErrorKind::NewTupleKey),
        ("if 1 then 2", ErrorKind::IfBool),
        ("x = true + 1", ErrorKind::UndefinedOperator),
        ("t = (1, 2)\nprint t + 1", ErrorKind::UndefinedOperator),
        ("f = do with n n\nf", ErrorKind::NoArgument),
        ("f = do with a, b a\nf 1", ErrorKind::CannotSplit),
        ("inject @lib", ErrorKind::InjectUnsupported),
    ];

    for (input, expected) in tests {
        assert_eq!(run_err(input), expected, "input: {}", input);
    }
}

#[test]
fn test_runtime_error_span() {
    let err = run("x = 1\ny = x / 0").expect_err("Divide by zero succeeded");
    let diag = err.downcast_ref::<Diagnostic>().expect("Not a diagnostic");
    assert_eq!(diag.kind, ErrorKind::Runtime("Divide by zero".to_string()));

    let loc = diag.location.as_ref().expect("Not located");
    assert_eq!(loc.path, "test.oca");
    assert_eq!(loc.line, 2);
    assert_eq!(loc.column, 6);
}

#[test]
fn test_file_include() {
    let dir = std::env::temp_dir().join(format!("oca-include-{}", std::process::id()));
    fs::create_dir_all(dir.join("lib")).expect("Failed to create temp dir");
    fs::write(
        dir.join("lib/point.oca"),
        "origin = (public x: 0, public y: 0)\n(public origin: origin, public name: \"point\")\n",
    )
    .expect("Failed to write include");
    fs::write(dir.join("lib/broken.oca"), "x = 1\nprint nope\n").expect("Failed to write include");
    fs::write(
        dir.join("main.oca"),
        "p = @lib/point\nprint p.name\nprint p.origin.x\n",
    )
    .expect("Failed to write main");
    fs::write(dir.join("bad.oca"), "b = @lib/broken\n").expect("Failed to write main");

    let mut output = Vec::new();
    {
        let mut eval = Eval::new(&mut output);
        let global = eval.global().clone();
        eval.run_file(&dir.join("main.oca"), &global)
            .expect("Include failed");
        assert!(eval.path.is_none());

        // Errors in the included file are reported against that file
        let err = eval
            .run_file(&dir.join("bad.oca"), &global)
            .expect_err("Broken include succeeded");
        let diag = err.downcast_ref::<Diagnostic>().expect("Not a diagnostic");
        assert_eq!(diag.kind, ErrorKind::Undefined);
        let loc = diag.location.as_ref().expect("Not located");
        assert!(loc.path.ends_with("broken.oca"));
        assert_eq!(loc.line, 2);
        assert!(eval.path.is_none());

        // Missing files are runtime errors at the FILE node
        let err = eval
            .run_source("missing.oca", "x = @nowhere", &global)
            .expect_err("Missing include succeeded");
        let diag = err.downcast_ref::<Diagnostic>().expect("Not a diagnostic");
        assert!(matches!(diag.kind, ErrorKind::Runtime(_)));
    }

    assert_eq!(
        String::from_utf8(output).expect("Output not utf-8"),
        "point\n0\n"
    );
    let _ = fs::remove_dir_all(&dir);
}
