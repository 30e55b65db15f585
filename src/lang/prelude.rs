//! Native functions and the member tables of the primitive types.
//!
//! Operators are plain method calls: `a + b` looks up `__add` among `a`'s members and invokes it
//! with `a` as the receiver and `b` as the argument. Every primitive kind shares one prototype
//! scope holding its methods, so the evaluator carries no arithmetic of its own. Tuples can define
//! the same names to overload operators.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;

use anyhow::{anyhow, bail, Result};
use lazy_static::lazy_static;

use crate::lang::eval::{Callable, Eval, Tuple, Value};
use crate::lang::scope::Scope;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Native {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    Gr,
    Ls,
    Geq,
    Leq,
    Range,
    And,
    Or,
    Xor,
    Lsh,
    Rsh,
    Times,
    Size,
    Print,
    Type,
}

impl fmt::Display for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Native::Add => "__add",
            Native::Sub => "__sub",
            Native::Mul => "__mul",
            Native::Div => "__div",
            Native::Mod => "__mod",
            Native::Pow => "__pow",
            Native::Eq => "__eq",
            Native::Neq => "__neq",
            Native::Gr => "__gr",
            Native::Ls => "__ls",
            Native::Geq => "__geq",
            Native::Leq => "__leq",
            Native::Range => "__ran",
            Native::And => "__and",
            Native::Or => "__or",
            Native::Xor => "__xor",
            Native::Lsh => "__lsh",
            Native::Rsh => "__rsh",
            Native::Times => "times",
            Native::Size => "size",
            Native::Print => "print",
            Native::Type => "type",
        };

        write!(f, "{}", name)
    }
}

lazy_static! {
    /// Operator symbol to the member name implementing it
    pub static ref OPERATOR_METHODS: HashMap<&'static str, &'static str> = vec![
        ("+", "__add"),
        ("-", "__sub"),
        ("*", "__mul"),
        ("/", "__div"),
        ("%", "__mod"),
        ("^", "__pow"),
        ("==", "__eq"),
        ("!=", "__neq"),
        (">", "__gr"),
        ("<", "__ls"),
        (">=", "__geq"),
        ("<=", "__leq"),
        ("..", "__ran"),
        ("and", "__and"),
        ("or", "__or"),
        ("xor", "__xor"),
        ("lsh", "__lsh"),
        ("rsh", "__rsh"),
    ]
    .into_iter()
    .collect();

    /// Functions visible from every file
    pub static ref GLOBALS: Vec<Native> = vec![Native::Print, Native::Type];

    static ref NIL_METHODS: Vec<Native> = vec![Native::Eq, Native::Neq];

    static ref BOOL_METHODS: Vec<Native> = vec![
        Native::Eq,
        Native::Neq,
        Native::And,
        Native::Or,
        Native::Xor,
    ];

    static ref INTEGER_METHODS: Vec<Native> = vec![
        Native::Add,
        Native::Sub,
        Native::Mul,
        Native::Div,
        Native::Mod,
        Native::Pow,
        Native::Eq,
        Native::Neq,
        Native::Gr,
        Native::Ls,
        Native::Geq,
        Native::Leq,
        Native::Range,
        Native::And,
        Native::Or,
        Native::Xor,
        Native::Lsh,
        Native::Rsh,
        Native::Times,
    ];

    static ref REAL_METHODS: Vec<Native> = vec![
        Native::Add,
        Native::Sub,
        Native::Mul,
        Native::Div,
        Native::Mod,
        Native::Pow,
        Native::Eq,
        Native::Neq,
        Native::Gr,
        Native::Ls,
        Native::Geq,
        Native::Leq,
    ];

    static ref STRING_METHODS: Vec<Native> = vec![
        Native::Add,
        Native::Mul,
        Native::Eq,
        Native::Neq,
        Native::Gr,
        Native::Ls,
        Native::Geq,
        Native::Leq,
        Native::Size,
    ];
}

fn prototype(methods: &[Native]) -> Scope {
    let scope = Scope::root();
    for method in methods {
        scope.define(&method.to_string(), Value::Func(*method), true);
    }

    scope
}

/// Member tables shared by all values of a primitive kind
pub struct Prelude {
    nil: Scope,
    boolean: Scope,
    integer: Scope,
    real: Scope,
    string: Scope,
    callable: Scope,
}

impl Prelude {
    pub fn new() -> Self {
        Self {
            nil: prototype(&NIL_METHODS),
            boolean: prototype(&BOOL_METHODS),
            integer: prototype(&INTEGER_METHODS),
            real: prototype(&REAL_METHODS),
            string: prototype(&STRING_METHODS),
            callable: Scope::root(),
        }
    }

    /// The scope holding `value`'s members
    pub fn members(&self, value: &Value) -> Scope {
        match value {
            Value::Nil => self.nil.clone(),
            Value::Bool(_) => self.boolean.clone(),
            Value::Integer(_) => self.integer.clone(),
            Value::Real(_) => self.real.clone(),
            Value::String(_) => self.string.clone(),
            Value::Tuple(t) => t.scope.clone(),
            Value::Block(_) | Value::Func(_) => self.callable.clone(),
        }
    }
}

fn shift_amount(r: i64) -> Result<u32> {
    u32::try_from(r).map_err(|_| anyhow!("Invalid shift amount: {}", r))
}

fn integer_method(op: Native, l: i64, right: &Value) -> Result<Value> {
    // Mixed arithmetic promotes to real
    if let Value::Real(_) = right {
        return real_method(op, l as f64, right);
    }

    let r = right.as_integer()?;
    let val = match op {
        Native::Add => Value::Integer(
            l.checked_add(r)
                .ok_or_else(|| anyhow!("{} + {} overflows", l, r))?,
        ),
        Native::Sub => Value::Integer(
            l.checked_sub(r)
                .ok_or_else(|| anyhow!("{} - {} overflows", l, r))?,
        ),
        Native::Mul => Value::Integer(
            l.checked_mul(r)
                .ok_or_else(|| anyhow!("{} * {} overflows", l, r))?,
        ),
        Native::Div => {
            if r == 0 {
                bail!("Divide by zero");
            }

            Value::Integer(
                l.checked_div(r)
                    .ok_or_else(|| anyhow!("{} / {} overflows", l, r))?,
            )
        }
        Native::Mod => {
            if r == 0 {
                bail!("Divide by zero");
            }

            Value::Integer(
                l.checked_rem(r)
                    .ok_or_else(|| anyhow!("{} % {} overflows", l, r))?,
            )
        }
        Native::Pow => {
            let exp = u32::try_from(r).map_err(|_| anyhow!("Invalid exponent: {}", r))?;
            Value::Integer(
                l.checked_pow(exp)
                    .ok_or_else(|| anyhow!("{} ^ {} overflows", l, r))?,
            )
        }
        Native::Gr => Value::Bool(l > r),
        Native::Ls => Value::Bool(l < r),
        Native::Geq => Value::Bool(l >= r),
        Native::Leq => Value::Bool(l <= r),
        Native::Range => Value::Tuple(Tuple::from_values((l..r).map(Value::Integer).collect())),
        Native::And => Value::Integer(l & r),
        Native::Or => Value::Integer(l | r),
        Native::Xor => Value::Integer(l ^ r),
        Native::Lsh => Value::Integer(
            l.checked_shl(shift_amount(r)?)
                .ok_or_else(|| anyhow!("{} lsh {} overflows", l, r))?,
        ),
        Native::Rsh => Value::Integer(
            l.checked_shr(shift_amount(r)?)
                .ok_or_else(|| anyhow!("{} rsh {} overflows", l, r))?,
        ),
        op => bail!("'{}' is not an integer method", op),
    };

    Ok(val)
}

fn real_method(op: Native, l: f64, right: &Value) -> Result<Value> {
    let r = right.as_real()?;
    let val = match op {
        Native::Add => Value::Real(l + r),
        Native::Sub => Value::Real(l - r),
        Native::Mul => Value::Real(l * r),
        Native::Div => Value::Real(l / r),
        Native::Mod => Value::Real(l % r),
        Native::Pow => Value::Real(l.powf(r)),
        Native::Gr => Value::Bool(l > r),
        Native::Ls => Value::Bool(l < r),
        Native::Geq => Value::Bool(l >= r),
        Native::Leq => Value::Bool(l <= r),
        op => bail!("'{}' is not a real method", op),
    };

    Ok(val)
}

fn string_method(op: Native, l: &str, right: &Value) -> Result<Value> {
    let val = match op {
        Native::Add => Value::String(format!("{}{}", l, right)),
        Native::Mul => {
            let times = usize::try_from(right.as_integer()?)
                .map_err(|_| anyhow!("Cannot repeat a string {} times", right))?;
            Value::String(l.repeat(times))
        }
        Native::Gr => Value::Bool(l > right.as_string()?),
        Native::Ls => Value::Bool(l < right.as_string()?),
        Native::Geq => Value::Bool(l >= right.as_string()?),
        Native::Leq => Value::Bool(l <= right.as_string()?),
        op => bail!("'{}' is not a string method", op),
    };

    Ok(val)
}

fn bool_method(op: Native, l: bool, right: &Value) -> Result<Value> {
    let r = right.as_boolean()?;
    let val = match op {
        Native::And => l && r,
        Native::Or => l || r,
        Native::Xor => l ^ r,
        op => bail!("'{}' is not a boolean method", op),
    };

    Ok(Value::Bool(val))
}

impl Callable for Native {
    fn call(
        &self,
        eval: &mut Eval,
        receiver: Value,
        argument: Value,
        block: Value,
    ) -> Result<Value> {
        match self {
            Native::Print => {
                writeln!(eval.sink(), "{}", argument)?;
                Ok(Value::Nil)
            }
            Native::Type => Ok(Value::String(argument.type_str().to_string())),
            Native::Eq => Ok(Value::Bool(receiver.equals(&argument))),
            Native::Neq => Ok(Value::Bool(!receiver.equals(&argument))),
            Native::Size => Ok(Value::Integer(
                receiver.as_string()?.chars().count() as i64,
            )),
            Native::Times => {
                let n = receiver.as_integer()?;
                let body = match block.callable() {
                    Some(body) => body,
                    None => bail!("'times' expects a block, got '{}'", block.short_display()),
                };

                for i in 0..n {
                    body.call(eval, receiver.clone(), Value::Integer(i), Value::Nil)?;
                }

                Ok(receiver)
            }
            op => match &receiver {
                Value::Integer(l) => integer_method(*op, *l, &argument),
                Value::Real(l) => real_method(*op, *l, &argument),
                Value::String(l) => string_method(*op, l, &argument),
                Value::Bool(l) => bool_method(*op, *l, &argument),
                v => bail!("'{}' is not a method of {}", op, v.type_str()),
            },
        }
    }
}

#[cfg(test)]
fn apply(op: Native, left: Value, right: Value) -> Result<Value> {
    let mut output = Vec::new();
    let mut eval = Eval::new(&mut output);
    op.call(&mut eval, left, right, Value::Nil)
}

#[test]
fn test_integer_methods() {
    use Value::*;

    let tests = vec![
        (Native::Add, 5, 5, Integer(10)),
        (Native::Sub, 100, 3, Integer(97)),
        (Native::Mul, 100, 3, Integer(300)),
        (Native::Div, 100, 3, Integer(33)),
        (Native::Mod, 100, 3, Integer(1)),
        (Native::Pow, 2, 10, Integer(1024)),
        (Native::Gr, 3, 3, Bool(false)),
        (Native::Geq, 3, 3, Bool(true)),
        (Native::Ls, 1, 3, Bool(true)),
        (Native::Leq, 4, 3, Bool(false)),
        (Native::And, 7, 1, Integer(1)),
        (Native::Or, 1, 2, Integer(3)),
        (Native::Xor, 3, 1, Integer(2)),
        (Native::Lsh, 1, 3, Integer(8)),
        (Native::Rsh, 8, 2, Integer(2)),
        (Native::Eq, 1, 1, Bool(true)),
        (Native::Neq, 1, 1, Bool(false)),
    ];

    for (op, l, r, expected) in tests {
        let got = apply(op, Integer(l), Integer(r)).expect("Native failed");
        assert_eq!(got, expected, "{} {} {}", l, op, r);
    }
}

#[test]
fn test_integer_errors() {
    use Value::*;

    let tests = vec![
        (Native::Add, i64::MAX, 1),
        (Native::Sub, i64::MIN, 1),
        (Native::Mul, i64::MAX, 2),
        (Native::Div, 1, 0),
        (Native::Mod, 1, 0),
        (Native::Div, i64::MIN, -1),
        (Native::Pow, 2, -1),
        (Native::Lsh, 1, 64),
    ];

    for (op, l, r) in tests {
        assert!(apply(op, Integer(l), Integer(r)).is_err(), "{} {} {}", l, op, r);
    }

    let err = apply(Native::Div, Integer(1), Integer(0)).unwrap_err();
    assert_eq!(err.to_string(), "Divide by zero");
    let err = apply(Native::Add, Integer(i64::MAX), Integer(1)).unwrap_err();
    assert_eq!(err.to_string(), format!("{} + 1 overflows", i64::MAX));
}

#[test]
fn test_mixed_numbers() {
    use Value::*;

    assert_eq!(apply(Native::Add, Integer(1), Real(0.5)).unwrap(), Real(1.5));
    assert_eq!(apply(Native::Mul, Real(1.5), Integer(2)).unwrap(), Real(3.0));
    assert_eq!(apply(Native::Ls, Real(1.5), Integer(2)).unwrap(), Bool(true));
    assert_eq!(apply(Native::Eq, Integer(2), Real(2.0)).unwrap(), Bool(true));
    assert!(apply(Native::Add, Real(1.0), String("x".to_string())).is_err());
}

#[test]
fn test_range() {
    let range = apply(Native::Range, Value::Integer(1), Value::Integer(4)).unwrap();
    assert_eq!(range.to_string(), "(1, 2, 3)");
    match range {
        Value::Tuple(t) => assert_eq!(t.count, 3),
        _ => panic!("Range is not a tuple"),
    }

    let empty = apply(Native::Range, Value::Integer(4), Value::Integer(1)).unwrap();
    assert_eq!(empty.to_string(), "()");
}

#[test]
fn test_string_methods() {
    use Value::*;

    let s = |v: &str| String(v.to_string());
    assert_eq!(apply(Native::Add, s("a"), s("b")).unwrap(), s("ab"));
    assert_eq!(apply(Native::Add, s("n = "), Integer(3)).unwrap(), s("n = 3"));
    assert_eq!(apply(Native::Mul, s("ab"), Integer(3)).unwrap(), s("ababab"));
    assert_eq!(apply(Native::Ls, s("abc"), s("abd")).unwrap(), Bool(true));
    assert_eq!(apply(Native::Eq, s("x"), s("x")).unwrap(), Bool(true));
    assert_eq!(apply(Native::Size, s("héllo"), Nil).unwrap(), Integer(5));
    assert!(apply(Native::Mul, s("ab"), Integer(-1)).is_err());
    assert!(apply(Native::Sub, s("ab"), s("b")).is_err());
}

#[test]
fn test_bool_methods() {
    use Value::*;

    assert_eq!(apply(Native::And, Bool(true), Bool(false)).unwrap(), Bool(false));
    assert_eq!(apply(Native::Or, Bool(true), Bool(false)).unwrap(), Bool(true));
    assert_eq!(apply(Native::Xor, Bool(true), Bool(true)).unwrap(), Bool(false));
    assert!(apply(Native::And, Bool(true), Integer(1)).is_err());
}

#[test]
fn test_print_and_type() {
    let mut output = Vec::new();
    {
        let mut eval = Eval::new(&mut output);
        let ret = Native::Print
            .call(&mut eval, Value::Nil, Value::Integer(42), Value::Nil)
            .expect("print failed");
        assert!(ret.is_nil());

        let ty = Native::Type
            .call(&mut eval, Value::Nil, Value::Real(1.0), Value::Nil)
            .expect("type failed");
        assert_eq!(ty, Value::String("real".to_string()));
    }
    assert_eq!(String::from_utf8(output).expect("Output not utf-8"), "42\n");
}

#[test]
fn test_prototypes() {
    let prelude = Prelude::new();

    let ints = prelude.members(&Value::Integer(1));
    assert!(ints.lookup_public("__add").is_some());
    assert!(ints.lookup_public("times").is_some());
    assert!(ints.lookup_public("size").is_none());

    let nil = prelude.members(&Value::Nil);
    assert!(nil.lookup_public("__eq").is_some());
    assert!(nil.lookup_public("__add").is_none());

    // Every operator maps to a method some primitive implements
    let all: Vec<String> = [&*INTEGER_METHODS, &*BOOL_METHODS]
        .iter()
        .flat_map(|m| m.iter().map(|n| n.to_string()))
        .collect();
    for method in OPERATOR_METHODS.values() {
        assert!(all.iter().any(|m| m == method), "{} unimplemented", method);
    }
}
