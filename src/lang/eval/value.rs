use std::fmt;
use std::rc::Rc;

use anyhow::{bail, Result};

use super::eval::Eval;
use crate::lang::ast::{Ast, Kind, NodeId};
use crate::lang::error::ErrorKind;
use crate::lang::prelude::Native;
use crate::lang::scope::Scope;

/// Tuples nested deeper than this print as `(...)`
const DISPLAY_DEPTH: usize = 8;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Tuple(Tuple),
    Block(Rc<Block>),
    Func(Native),
}

impl Value {
    pub fn type_str(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::String(_) => "string",
            Value::Tuple(_) => "tuple",
            Value::Block(_) => "block",
            Value::Func(_) => "function",
        }
    }

    pub fn short_display(&self) -> String {
        match self {
            Value::Tuple(t) => format!("tuple({})", t.scope.len()),
            v => format!("{}", v),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Value::Integer(i) => Ok(*i),
            v => bail!("Expected integer, got '{}'", v.short_display()),
        }
    }

    pub fn as_real(&self) -> Result<f64> {
        match self {
            Value::Integer(i) => Ok(*i as f64),
            Value::Real(r) => Ok(*r),
            v => bail!("Expected number, got '{}'", v.short_display()),
        }
    }

    pub fn as_boolean(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            v => bail!("Expected boolean, got '{}'", v.short_display()),
        }
    }

    pub fn as_string(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s),
            v => bail!("Expected string, got '{}'", v.short_display()),
        }
    }

    /// The capability to be invoked, held by exactly `Func` and `Block`
    pub fn callable(&self) -> Option<&dyn Callable> {
        match self {
            Value::Func(func) => Some(func),
            Value::Block(block) => Some(block.as_ref()),
            _ => None,
        }
    }

    /// Value equality. Numbers compare across integer and real, containers by identity
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Integer(l), Value::Integer(r)) => l == r,
            (Value::Real(l), Value::Real(r)) => l == r,
            (Value::Integer(l), Value::Real(r)) | (Value::Real(r), Value::Integer(l)) => {
                (*l as f64) == *r
            }
            (Value::String(l), Value::String(r)) => l == r,
            (Value::Tuple(l), Value::Tuple(r)) => l.scope.ptr_eq(&r.scope),
            (Value::Block(l), Value::Block(r)) => Rc::ptr_eq(l, r),
            (Value::Func(l), Value::Func(r)) => l == r,
            _ => false,
        }
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{:?}", r),
            Value::String(s) => write!(f, "{}", s),
            Value::Tuple(t) => t.fmt_depth(f, depth),
            Value::Block(b) => write!(f, "{}", b),
            Value::Func(func) => write!(f, "{}()", func),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_depth(f, 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            v => write!(f, "{}", v),
        }
    }
}

/// Mixed named/positional record
///
/// Members live in the tuple's own scope. Unnamed members are public and named by position.
#[derive(Clone)]
pub struct Tuple {
    pub scope: Scope,
    /// Number of positional members
    pub count: usize,
}

impl Tuple {
    pub fn new(scope: Scope, count: usize) -> Self {
        Self { scope, count }
    }

    /// Positional tuple of `values`
    pub fn from_values(values: Vec<Value>) -> Self {
        let scope = Scope::root();
        let count = values.len();
        for (i, value) in values.into_iter().enumerate() {
            scope.define(&i.to_string(), value, true);
        }

        Self { scope, count }
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth >= DISPLAY_DEPTH {
            return write!(f, "(...)");
        }

        write!(f, "(")?;
        for (i, (name, value, public)) in self.scope.entries().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }

            let positional = name.bytes().all(|b| b.is_ascii_digit());
            if !positional {
                if *public {
                    write!(f, "public ")?;
                }
                write!(f, "{}: ", name)?;
            }
            value.fmt_depth(f, depth + 1)?;
        }
        write!(f, ")")
    }
}

/// A closure: statement list, parameter names and the scope it was created in
pub struct Block {
    pub ast: Rc<Ast>,
    /// BLOCK, MAIN or ELSE node heading the statement list
    pub body: NodeId,
    pub params: Vec<String>,
    pub scope: Scope,
}

impl Block {
    pub fn new(ast: Rc<Ast>, body: NodeId, scope: Scope) -> Self {
        let node = ast.node(body);
        let params = match node.kind {
            Kind::Block => node.text.split_whitespace().map(String::from).collect(),
            _ => Vec::new(),
        };

        Self {
            ast,
            body,
            params,
            scope,
        }
    }

    /// Bind the parameters in a fresh call scope
    fn bind(&self, eval: &Eval, argument: Value) -> Result<Scope> {
        let scope = Scope::child(&self.scope);

        match self.params.as_slice() {
            [] => (),
            _ if argument.is_nil() => return Err(eval.fail_here(ErrorKind::NoArgument)),
            [param] => scope.define(param, argument, true),
            params => {
                let members = eval.members(&argument);
                for (i, param) in params.iter().enumerate() {
                    let part = members.get(&i.to_string(), false);
                    if part.is_nil() {
                        return Err(eval.fail_here(ErrorKind::CannotSplit));
                    }
                    scope.define(param, part, true);
                }
            }
        }

        Ok(scope)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "block")
        } else {
            write!(f, "block({})", self.params.join(", "))
        }
    }
}

/// Something that can be invoked with the `(receiver, argument, block)` convention
pub trait Callable {
    fn call(&self, eval: &mut Eval, receiver: Value, argument: Value, block: Value)
        -> Result<Value>;
}

impl Callable for Block {
    fn call(
        &self,
        eval: &mut Eval,
        receiver: Value,
        argument: Value,
        block: Value,
    ) -> Result<Value> {
        let scope = self.bind(eval, argument)?;
        scope.define("self", receiver, true);
        if !block.is_nil() {
            scope.define("yield", block, true);
        }

        let result = eval.run_statements(&self.ast, self.ast.statements(self.body), &scope);

        // `return` only unwinds up to the block it appears in
        eval.clear_returning();

        result
    }
}

#[test]
fn test_display() {
    let tests = vec![
        (Value::Nil, "nil"),
        (Value::Bool(true), "true"),
        (Value::Integer(-3), "-3"),
        (Value::Real(1.0), "1.0"),
        (Value::Real(0.25), "0.25"),
        (Value::String("hi".to_string()), "hi"),
        (Value::Func(Native::Print), "print()"),
    ];

    for (value, expected) in tests {
        assert_eq!(value.to_string(), expected);
    }

    let inner = Tuple::from_values(vec![Value::Integer(1), Value::Integer(2)]);
    inner.scope.define("name", Value::String("x".to_string()), false);
    inner.scope.define("shown", Value::Bool(false), true);
    let outer = Tuple::from_values(vec![Value::Tuple(inner), Value::Nil]);
    assert_eq!(
        Value::Tuple(outer).to_string(),
        "((1, 2, name: x, public shown: false), nil)"
    );
}

#[test]
fn test_display_cycle() {
    let tuple = Tuple::from_values(vec![Value::Integer(1)]);
    tuple.scope.define("me", Value::Tuple(tuple.clone()), true);

    let shown = Value::Tuple(tuple).to_string();
    assert!(shown.starts_with("(1, public me: (1, public me: "));
    assert!(shown.contains("(...)"));
}

#[test]
fn test_equals() {
    assert!(Value::Integer(2).equals(&Value::Real(2.0)));
    assert!(!Value::Integer(2).equals(&Value::String("2".to_string())));
    assert!(Value::Nil.equals(&Value::Nil));

    let t = Tuple::from_values(vec![Value::Integer(1)]);
    let same = Value::Tuple(t.clone());
    assert!(Value::Tuple(t).equals(&same));
    assert!(!same.equals(&Value::Tuple(Tuple::from_values(vec![Value::Integer(1)]))));
}

#[test]
fn test_conversions() {
    assert_eq!(Value::Integer(4).as_integer().unwrap(), 4);
    assert_eq!(Value::Integer(4).as_real().unwrap(), 4.0);
    assert!(Value::Real(4.0).as_integer().is_err());
    assert!(Value::Nil.as_boolean().is_err());
    assert_eq!(Value::String("s".to_string()).as_string().unwrap(), "s");
    assert!(Value::Bool(true).callable().is_none());
    assert!(Value::Func(Native::Type).callable().is_some());
}
