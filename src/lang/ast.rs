use std::fmt;
use std::rc::Rc;

use crate::lang::error::Span;
use crate::lang::lex::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// left: target (CALL, ACCESS or CALLS chain), right: value
    Set,
    /// text: name, left: trailing block, right: argument
    Call,
    /// Destructuring targets. left: target, right: next target or CALLS
    Calls,
    /// left: owner, right: key (CALL or INT)
    Access,
    /// left: condition, right: BRANCHES
    If,
    /// left: MAIN, right: ELSE
    Branches,
    /// Statement list of the true branch
    Main,
    /// Statement list of the false branch
    Else,
    /// Link in a statement list. left: statement, right: next NEXT
    Next,
    /// Operator waiting for precedence resolution. Never survives parsing
    PartOper,
    /// text: operator, left/right: operands
    Oper,
    /// right: optional value
    Return,
    Break,
    /// text: path without extension
    File,
    /// right: FILE
    Inject,
    Str,
    Int,
    Real,
    Bool,
    /// text: space separated parameters, left/right: statement list like NEXT
    Block,
    /// text: member name ("pub " prefixed when public), left: value, right: next TUP
    Tup,
    Name,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Set => "set",
            Kind::Call => "call",
            Kind::Calls => "calls",
            Kind::Access => "access",
            Kind::If => "if",
            Kind::Branches => "branches",
            Kind::Main => "main",
            Kind::Else => "else",
            Kind::Next => "next",
            Kind::PartOper => "part oper",
            Kind::Oper => "oper",
            Kind::Return => "return",
            Kind::Break => "break",
            Kind::File => "file",
            Kind::Inject => "inject",
            Kind::Str => "str",
            Kind::Int => "int",
            Kind::Real => "real",
            Kind::Bool => "bool",
            Kind::Block => "block",
            Kind::Tup => "tup",
            Kind::Name => "name",
        };

        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: Kind,
    pub text: String,
    /// Index of the token this node starts at
    pub index: usize,
    pub left: Option<NodeId>,
    pub right: Option<NodeId>,
}

impl Expression {
    pub fn new(kind: Kind, text: &str, index: usize) -> Self {
        Self {
            kind,
            text: text.to_string(),
            index,
            left: None,
            right: None,
        }
    }
}

/// File a tree was parsed from
#[derive(Debug, Default, Clone)]
pub struct Origin {
    pub path: String,
    pub source: String,
}

/// Node storage for one parsed file
///
/// Children are referenced by `NodeId` and every node has at most one parent. The tokens are kept
/// around so a node can always be traced back to the source text.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Expression>,
    tokens: Vec<Token>,
    origin: Option<Origin>,
}

impl Ast {
    pub fn new(nodes: Vec<Expression>, tokens: Vec<Token>, origin: Option<Origin>) -> Self {
        Self {
            nodes,
            tokens,
            origin,
        }
    }

    pub fn node(&self, id: NodeId) -> &Expression {
        &self.nodes[id.0]
    }

    /// Where the tree came from, when parsed from a named file
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Source span of the token `id` starts at
    pub fn span(&self, id: NodeId) -> Span {
        match self.tokens.get(self.node(id).index) {
            Some(tok) => Span::new(tok.pos, tok.text.len()),
            None => Span::new(0, 1),
        }
    }

    /// Walk a statement list (BLOCK, MAIN, ELSE or NEXT head)
    pub fn statements(&self, head: NodeId) -> Statements<'_> {
        Statements {
            ast: self,
            next: Some(head),
        }
    }

    pub fn write_tree(
        &self,
        f: &mut dyn fmt::Write,
        id: NodeId,
        depth: usize,
        side: char,
    ) -> fmt::Result {
        let node = self.node(id);
        writeln!(f, "{}{}<{}>{}", "  ".repeat(depth), side, node.kind, node.text)?;

        if let Some(left) = node.left {
            self.write_tree(f, left, depth + 1, 'L')?;
        }
        if let Some(right) = node.right {
            self.write_tree(f, right, depth + 1, 'R')?;
        }

        Ok(())
    }

    /// Print `id` back as Oca source
    ///
    /// Literal text is reproduced as parsed. Single statement bodies stay on the line they belong
    /// to, longer ones are indented two spaces per level.
    pub fn write_source(&self, f: &mut dyn fmt::Write, id: NodeId) -> fmt::Result {
        self.write_node(f, id, 0)
    }

    fn write_node(&self, f: &mut dyn fmt::Write, id: NodeId, level: usize) -> fmt::Result {
        let node = self.node(id);

        match node.kind {
            Kind::Int | Kind::Real | Kind::Bool | Kind::Name => write!(f, "{}", node.text),
            Kind::Str => write!(f, "\"{}\"", escape(&node.text)),
            Kind::File => write!(f, "@{}", node.text),
            Kind::Call => {
                write!(f, "{}", node.text)?;
                if let Some(arg) = node.right {
                    write!(f, " ")?;
                    self.write_node(f, arg, level)?;
                }
                if let Some(block) = node.left {
                    write!(f, " ")?;
                    self.write_node(f, block, level)?;
                }
                Ok(())
            }
            Kind::Calls => {
                self.write_child(f, node.left, level)?;
                write!(f, ", ")?;
                self.write_child(f, node.right, level)
            }
            Kind::Access => {
                self.write_child(f, node.left, level)?;
                write!(f, ".")?;
                self.write_child(f, node.right, level)
            }
            Kind::Set => {
                if node.text == "pub" {
                    write!(f, "public ")?;
                }
                self.write_child(f, node.left, level)?;
                write!(f, " = ")?;
                self.write_child(f, node.right, level)
            }
            Kind::Oper => {
                self.write_child(f, node.left, level)?;
                write!(f, " {} ", node.text)?;
                self.write_child(f, node.right, level)
            }
            Kind::Tup => {
                write!(f, "(")?;
                let mut member = Some(id);
                while let Some(m) = member {
                    let tup = self.node(m);
                    if m != id {
                        write!(f, ", ")?;
                    }
                    match tup.text.strip_prefix("pub ") {
                        Some(name) => write!(f, "public {}: ", name)?,
                        None if !tup.text.is_empty() => write!(f, "{}: ", tup.text)?,
                        None => (),
                    }
                    self.write_child(f, tup.left, level)?;
                    member = tup.right;
                }
                write!(f, ")")
            }
            Kind::Return => {
                write!(f, "return")?;
                if let Some(value) = node.right {
                    write!(f, " ")?;
                    self.write_node(f, value, level)?;
                }
                Ok(())
            }
            Kind::Break => write!(f, "break"),
            Kind::Inject => {
                write!(f, "inject ")?;
                self.write_child(f, node.right, level)
            }
            Kind::Block => {
                write!(f, "do")?;
                if !node.text.is_empty() {
                    write!(f, " with {}", node.text.replace(' ', ", "))?;
                }
                self.write_body(f, id, level).map(|_| ())
            }
            Kind::If => {
                write!(f, "if ")?;
                self.write_child(f, node.left, level)?;
                write!(f, " then")?;

                let branches = match node.right {
                    Some(b) => self.node(b),
                    None => return Ok(()),
                };
                if let Some(main) = branches.left {
                    let multiline = self.write_body(f, main, level)?;
                    if let Some(els) = branches.right {
                        if multiline {
                            write!(f, "\n{}else", "  ".repeat(level))?;
                        } else {
                            write!(f, " else")?;
                        }
                        self.write_body(f, els, level)?;
                    }
                }
                Ok(())
            }
            Kind::Main | Kind::Else | Kind::Next => self.write_body(f, id, level).map(|_| ()),
            Kind::Branches | Kind::PartOper => Ok(()),
        }
    }

    fn write_child(
        &self,
        f: &mut dyn fmt::Write,
        child: Option<NodeId>,
        level: usize,
    ) -> fmt::Result {
        match child {
            Some(c) => self.write_node(f, c, level),
            None => Ok(()),
        }
    }

    /// Write the statement list at `head`, returning whether it went onto separate lines
    fn write_body(
        &self,
        f: &mut dyn fmt::Write,
        head: NodeId,
        level: usize,
    ) -> Result<bool, fmt::Error> {
        let stmts: Vec<NodeId> = self.statements(head).collect();
        if let [stmt] = stmts.as_slice() {
            write!(f, " ")?;
            self.write_node(f, *stmt, level)?;
            return Ok(false);
        }

        for stmt in stmts {
            write!(f, "\n{}", "  ".repeat(level + 1))?;
            self.write_node(f, stmt, level + 1)?;
        }

        Ok(true)
    }
}

/// Inverse of the escapes string literals resolve while parsing
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }

    out
}

pub struct Statements<'a> {
    ast: &'a Ast,
    next: Option<NodeId>,
}

impl<'a> Iterator for Statements<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let link = self.ast.node(self.next?);
        let stmt = link.left?;
        self.next = link.right;

        Some(stmt)
    }
}

/// A parsed file: its node storage and top level statements in source order
#[derive(Debug)]
pub struct Program {
    pub ast: Rc<Ast>,
    pub roots: Vec<NodeId>,
}

impl Program {
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            // Writing into a `String` cannot fail
            let _ = self.ast.write_source(&mut out, *root);
            out.push('\n');
        }

        out
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for root in &self.roots {
            self.ast.write_tree(&mut out, *root, 0, ' ')?;
        }

        write!(f, "{}", out)
    }
}
