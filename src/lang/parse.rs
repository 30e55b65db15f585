//! This module implements Oca's indentation sensitive grammar.
//!
//! The parser is a recursive descent parser with one token of lookahead. Every rule is a method
//! returning `Ok(true)` when it matched, `Ok(false)` when it did not (having restored the token
//! index it started at), or an error when it found a construct that is required but missing.
//!
//! Successfully parsed subexpressions are pushed onto `cache`. Rules that combine subexpressions
//! pop their operands off the cache and push the combined node back, so after a complete
//! statement the cache holds exactly one more node than before it.
//!
//! Developer notes:
//!
//! * Indentation arrives as `Indent` tokens. `indent` is the depth of the current baseline and
//!   `check_indent` consumes an indent only when it is the same/deeper/shallower than the
//!   baseline. Statement sequences reset the baseline to their own level before every check, so a
//!   dedent closes every nested sequence down to the level it matches.
//!
//! * Operators are not parsed with a precedence ladder. Instead a chain like `a + b * c - d` is
//!   first pushed as a flat run of operands and `PART_OPER` markers, then the outermost `oper`
//!   call folds the run into `OPER` nodes, highest tier first, scanning left to right. That gives
//!   conventional precedence between tiers and left associativity within one tier.

use std::rc::Rc;

use anyhow::{anyhow, Error, Result};
use log::debug;

use crate::lang::ast::{Ast, Expression, Kind, NodeId, Origin, Program};
use crate::lang::error::{Diagnostic, ErrorKind, Span};
use crate::lang::lex::{Token, TokenKind};

#[derive(Clone, Copy, PartialEq)]
enum Indent {
    Same,
    More,
    Less,
}

#[derive(Clone, Copy, PartialEq)]
enum CallMode {
    /// A call that may be followed by accessors, assignment or operators
    Full,
    /// The key of a dot access. Takes no further accessors
    Key,
    /// Second or later target of a destructuring assignment
    Target,
}

/// Binding tier of an operator. Higher binds tighter
fn priority(op: &str) -> u8 {
    match op {
        "==" | "!=" | "<" | ">" | "<=" | ">=" => 0,
        "*" | "/" | "%" => 2,
        "^" => 3,
        _ => 1,
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }

    out
}

pub struct Parser {
    tokens: Vec<Token>,
    nodes: Vec<Expression>,
    cache: Vec<NodeId>,
    index: usize,
    indent: usize,
    /// Cache height at the start of the current statement. Only the call that starts a statement
    /// may begin a `,` separated target list
    head: Option<usize>,
    /// Operator runs never reach below this cache height
    run_floor: usize,
    origin: Option<Origin>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        let end = tokens.last().map(|t| t.pos + t.text.len()).unwrap_or(0);
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Last) {
            tokens.push(Token::new(TokenKind::Last, "", end));
        }

        Self {
            tokens,
            nodes: Vec::new(),
            cache: Vec::new(),
            index: 0,
            indent: 0,
            head: None,
            run_floor: 0,
            origin: None,
        }
    }

    /// Parser whose tree remembers the file it came from
    pub fn with_origin(tokens: Vec<Token>, origin: Origin) -> Self {
        let mut parser = Self::new(tokens);
        parser.origin = Some(origin);
        parser
    }

    pub fn parse(mut self) -> Result<Program> {
        if let Some(first) = self.tokens.first() {
            if first.kind == TokenKind::Indent && first.depth() > 0 {
                return Err(self.fail(ErrorKind::IndentedFile));
            }
        }

        while self.check_indent(Indent::Same) {}

        let mut roots = Vec::new();
        while self.index < self.tokens.len() - 1 {
            if self.statement()? {
                roots.push(self.uncache()?);
            } else {
                return Err(self.fail(ErrorKind::NotAnExpression));
            }

            if self.current().kind == TokenKind::Last {
                break;
            }

            self.indent = 0;
            if self.check_indent(Indent::More) {
                return Err(self.fail(ErrorKind::UnexpectedIndent));
            }
            if !self.check_indent(Indent::Same) && !self.check_indent(Indent::Less) {
                return Err(self.fail(ErrorKind::NoNewline));
            }
        }

        debug!(
            "parsed {} top level statements ({} nodes)",
            roots.len(),
            self.nodes.len()
        );

        Ok(Program {
            ast: Rc::new(Ast::new(self.nodes, self.tokens, self.origin)),
            roots,
        })
    }

    fn current(&self) -> &Token {
        // The sentinel is never consumed past
        if self.index < self.tokens.len() - 1 {
            &self.tokens[self.index]
        } else {
            &self.tokens[self.tokens.len() - 1]
        }
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.index.saturating_sub(1).min(self.tokens.len() - 1)]
    }

    fn fail(&self, kind: ErrorKind) -> Error {
        let span = match kind {
            ErrorKind::IndentedFile => Span::new(0, 1),
            ErrorKind::NotAnExpression
            | ErrorKind::NoNewline
            | ErrorKind::NoIndent
            | ErrorKind::InvalidNumber => {
                let tok = self.current();
                Span::new(tok.pos, tok.text.len())
            }
            ErrorKind::UnexpectedIndent => {
                // Highlight the indentation, not the newline in front of it
                let tok = self.previous();
                Span::new(tok.pos + 1, tok.text.len().saturating_sub(1))
            }
            _ => {
                let tok = self.previous();
                Span::new(tok.pos, tok.text.len())
            }
        };

        Diagnostic::new(kind, span).into()
    }

    fn check_indent(&mut self, ind: Indent) -> bool {
        let tok = self.current();
        if tok.kind != TokenKind::Indent {
            return false;
        }

        let size = tok.depth();
        let matches = match ind {
            Indent::Same => size == self.indent,
            Indent::More => size > self.indent,
            Indent::Less => size < self.indent,
        };
        if !matches {
            return false;
        }

        self.indent = size;
        self.index += 1;
        true
    }

    fn add(&mut self, expr: Expression) -> NodeId {
        self.nodes.push(expr);
        NodeId(self.nodes.len() - 1)
    }

    fn push(&mut self, expr: Expression) -> NodeId {
        let id = self.add(expr);
        self.cache.push(id);
        id
    }

    fn uncache(&mut self) -> Result<NodeId> {
        self.cache
            .pop()
            .ok_or_else(|| anyhow!("Parser cache underflow at token {} (parser bug)", self.index))
    }

    fn text_of(&self, id: NodeId) -> String {
        self.nodes[id.0].text.clone()
    }

    /// Collect `cache[from..]` into a statement list headed by a new `kind` node
    fn link(&mut self, kind: Kind, text: &str, index: usize, from: usize) -> NodeId {
        let stmts = self.cache.split_off(from);
        let head = self.add(Expression::new(kind, text, index));

        let mut curr = head;
        for (i, stmt) in stmts.iter().enumerate() {
            self.nodes[curr.0].left = Some(*stmt);
            if i + 1 < stmts.len() {
                let next = self.add(Expression::new(Kind::Next, "", index));
                self.nodes[curr.0].right = Some(next);
                curr = next;
            }
        }

        head
    }

    // ----------------------------

    fn statement(&mut self) -> Result<bool> {
        let saved = self.head.replace(self.cache.len());
        let res = self.expr();
        self.head = saved;

        res
    }

    /// Statements at the level of the indent just consumed
    fn sequence(&mut self) -> Result<()> {
        let level = self.indent;

        loop {
            if !self.statement()? {
                return Err(self.fail(ErrorKind::NotAnExpression));
            }

            self.indent = level;
            if self.check_indent(Indent::More) {
                return Err(self.fail(ErrorKind::UnexpectedIndent));
            }
            if !self.check_indent(Indent::Same) {
                return Ok(());
            }
        }
    }

    fn expr(&mut self) -> Result<bool> {
        Ok(self.call(CallMode::Full)?
            || self.value()?
            || self.block()?
            || self.cond()?
            || self.keyword()?
            || self.file()?)
    }

    fn set(&mut self) -> Result<bool> {
        let orig = self.index;
        if !self.lit("=") {
            return Ok(false);
        }

        if !(self.call(CallMode::Full)?
            || self.value()?
            || self.block()?
            || self.file()?
            || self.cond()?)
        {
            return Err(self.fail(ErrorKind::NothingToSet));
        }

        let mut set = Expression::new(Kind::Set, "", orig);
        set.right = Some(self.uncache()?);
        set.left = Some(self.uncache()?);
        self.push(set);

        Ok(true)
    }

    fn call(&mut self, mode: CallMode) -> Result<bool> {
        let orig = self.index;

        let public = self.lit("public");
        if !self.name() {
            self.index = orig;
            return Ok(false);
        }

        let has_arg = self.value()? || self.call(CallMode::Full)? || self.file()?;
        let has_yield = self.block()?;

        let block = if has_yield { Some(self.uncache()?) } else { None };
        let arg = if has_arg { Some(self.uncache()?) } else { None };
        let name = self.uncache()?;

        let mut call = Expression::new(Kind::Call, &self.text_of(name), self.nodes[name.0].index);
        call.left = block;
        call.right = arg;
        self.push(call);

        if mode == CallMode::Key {
            return Ok(true);
        }

        self.access()?;

        let starts_targets =
            mode == CallMode::Target || self.head == Some(self.cache.len() - 1);
        let mut targets = false;
        if starts_targets && self.lit(",") {
            let origc = self.index;
            if !self.call(CallMode::Target)? {
                return Err(self.fail(ErrorKind::NoName));
            }

            let mut calls = Expression::new(Kind::Calls, "", origc);
            calls.right = Some(self.uncache()?);
            calls.left = Some(self.uncache()?);
            self.push(calls);
            targets = true;
        }

        if mode == CallMode::Full {
            let is_set = self.set()?;
            if !is_set {
                if targets || public {
                    return Err(self.fail(ErrorKind::NothingToSet));
                }
                self.oper()?;
            }

            if public {
                if let Some(top) = self.cache.last() {
                    let node = &mut self.nodes[top.0];
                    if node.kind == Kind::Set {
                        node.text = "pub".to_string();
                    }
                }
            }
        }

        Ok(true)
    }

    fn access(&mut self) -> Result<bool> {
        let orig = self.index;
        if !self.lit(".") {
            return Ok(false);
        }

        if !(self.call(CallMode::Key)? || self.integer()?) {
            return Err(self.fail(ErrorKind::NoAccessKey));
        }

        let mut access = Expression::new(Kind::Access, "", orig);
        access.right = Some(self.uncache()?);
        access.left = Some(self.uncache()?);
        self.push(access);

        // Chained accessors
        self.access()?;

        Ok(true)
    }

    fn oper(&mut self) -> Result<bool> {
        let orig = self.index;
        let cached = self.cache.len();

        if self.current().kind != TokenKind::Operator {
            return Ok(false);
        }

        // A PART_OPER right below the left operand means an outer call owns this run
        let first = cached < self.run_floor + 2
            || self.nodes[self.cache[cached - 2].0].kind != Kind::PartOper;

        let op = self.current().text.clone();
        self.push(Expression::new(Kind::PartOper, &op, orig));
        self.index += 1;

        if !(self.value()? || self.call(CallMode::Full)?) {
            return Err(self.fail(ErrorKind::NoRightValue));
        }
        self.oper()?;

        if !first {
            return Ok(true);
        }

        for tier in (0..=3).rev() {
            let mut i = cached;
            while i < self.cache.len() {
                let part = &self.nodes[self.cache[i].0];
                if part.kind == Kind::PartOper && priority(&part.text) == tier {
                    let mut oper = Expression::new(Kind::Oper, &part.text, part.index);
                    oper.left = Some(self.cache[i - 1]);
                    oper.right = Some(self.cache[i + 1]);

                    let id = self.add(oper);
                    self.cache.splice(i - 1..i + 2, Some(id));

                    // The folded node may now be the left operand of the next operator
                    i -= 1;
                }
                i += 1;
            }
        }

        Ok(true)
    }

    fn branch(&mut self) -> Result<()> {
        if self.check_indent(Indent::More) {
            self.sequence()
        } else if self.statement()? {
            Ok(())
        } else {
            Err(self.fail(ErrorKind::NotAnExpression))
        }
    }

    /// `else` on its own line, indented like the `if` it belongs to
    fn else_on_next_line(&mut self, base: usize) -> bool {
        let tok = self.current();
        if tok.kind != TokenKind::Indent || tok.depth() != base {
            return false;
        }

        match self.tokens.get(self.index + 1) {
            Some(next) if next.kind == TokenKind::Keyword && next.text == "else" => {
                self.indent = base;
                self.index += 2;
                true
            }
            _ => false,
        }
    }

    fn cond(&mut self) -> Result<bool> {
        let orig = self.index;
        let base = self.indent;
        if !self.lit("if") {
            return Ok(false);
        }

        if !(self.call(CallMode::Full)? || self.value()?) {
            return Err(self.fail(ErrorKind::NoConditional));
        }
        if !self.lit("then") {
            return Err(self.fail(ErrorKind::NoThen));
        }

        let orig_t = self.index;
        let cached = self.cache.len();
        self.branch()?;

        let else_cached = self.cache.len();
        let orig_e = self.index;
        let has_else = self.lit("else") || self.else_on_next_line(base);
        if has_else {
            self.branch()?;
        }

        // assemble conditional
        let els = self.link(Kind::Else, "", orig_e, else_cached);
        let main = self.link(Kind::Main, "", orig_t, cached);

        let mut branches = Expression::new(Kind::Branches, "", orig);
        branches.left = Some(main);
        if has_else {
            branches.right = Some(els);
        }
        let branches = self.add(branches);

        let mut ifer = Expression::new(Kind::If, "", orig);
        ifer.left = Some(self.uncache()?);
        ifer.right = Some(branches);
        self.push(ifer);

        Ok(true)
    }

    fn keyword(&mut self) -> Result<bool> {
        let tok = self.current();
        if tok.kind != TokenKind::Keyword {
            return Ok(false);
        }

        let orig = self.index;
        let text = tok.text.clone();
        match text.as_str() {
            "return" => {
                self.index += 1;
                let mut ret = Expression::new(Kind::Return, "", orig);
                if self.expr()? {
                    ret.right = Some(self.uncache()?);
                }
                self.push(ret);
            }
            "break" => {
                self.index += 1;
                self.push(Expression::new(Kind::Break, "", orig));
            }
            "inject" => {
                self.index += 1;
                if !self.file()? {
                    return Err(self.fail(ErrorKind::NothingToInject));
                }
                let mut inject = Expression::new(Kind::Inject, "", orig);
                inject.right = Some(self.uncache()?);
                self.push(inject);
            }
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn file(&mut self) -> Result<bool> {
        let tok = self.current();
        if tok.kind != TokenKind::FilePath {
            return Ok(false);
        }

        let path = tok.text[1..].to_string();
        self.push(Expression::new(Kind::File, &path, self.index));
        self.index += 1;

        Ok(true)
    }

    fn block(&mut self) -> Result<bool> {
        let orig = self.index;
        if !self.lit("do") {
            return Ok(false);
        }

        // check for parameters
        let mut params = Vec::new();
        if self.lit("with") {
            while self.name() {
                let param = self.uncache()?;
                params.push(self.text_of(param));
                if !self.lit(",") {
                    break;
                }
            }

            if params.is_empty() {
                return Err(self.fail(ErrorKind::NoParameter));
            }
        }

        if self.check_indent(Indent::Same) {
            return Err(self.fail(ErrorKind::NoIndent));
        }

        let cached = self.cache.len();
        if self.check_indent(Indent::More) {
            self.sequence()?;
        } else if !self.statement()? {
            return Err(self.fail(ErrorKind::NotAnExpression));
        }

        let block = self.link(Kind::Block, &params.join(" "), orig, cached);
        self.cache.push(block);

        Ok(true)
    }

    // ----------------------------

    fn value(&mut self) -> Result<bool> {
        if self.string() || self.integer()? || self.real()? || self.boolean() {
            self.access()?;
            self.oper()?;
            return Ok(true);
        }

        if !self.lit("(") {
            return Ok(false);
        }

        let cached = self.cache.len();
        let saved_head = self.head.take();
        let saved_floor = self.run_floor;

        self.check_indent(Indent::More);
        let level = self.indent;
        loop {
            self.indent = level;
            if self.check_indent(Indent::More) {
                return Err(self.fail(ErrorKind::UnexpectedIndent));
            }
            self.check_indent(Indent::Same);

            let orig = self.index;
            let mut name = String::new();
            let public = self.lit("public");
            if self.name() {
                if self.lit(":") {
                    let key = self.uncache()?;
                    name = self.text_of(key);
                    if public {
                        name = format!("pub {}", name);
                    }
                } else {
                    self.uncache()?;
                    self.index = orig;
                }
            } else {
                self.index = orig;
            }

            self.run_floor = self.cache.len();
            if !self.expr()? {
                return Err(self.fail(ErrorKind::NothingToSet));
            }

            let mut tup = Expression::new(Kind::Tup, &name, orig);
            tup.left = Some(self.uncache()?);
            self.push(tup);

            if !self.lit(",") {
                break;
            }
        }

        self.indent = level;
        self.check_indent(Indent::Less);
        if !self.lit(")") {
            return Err(self.fail(ErrorKind::NoClosingBrace));
        }

        // assemble tuple
        let members = self.cache.split_off(cached);
        for pair in members.windows(2) {
            self.nodes[pair[0].0].right = Some(pair[1]);
        }
        self.cache.push(members[0]);

        self.head = saved_head;
        self.run_floor = saved_floor;

        self.access()?;
        self.oper()?;

        Ok(true)
    }

    /// Consume a `-` that is the sign of a literal rather than an operator
    fn sign(&mut self) -> bool {
        let tok = self.current();
        if tok.kind != TokenKind::Operator || tok.text != "-" || self.index == 0 {
            return false;
        }

        let prev = &self.tokens[self.index - 1];
        let boundary = prev.kind == TokenKind::Indent
            || (prev.kind == TokenKind::Punct && ["(", ":", "="].contains(&prev.text.as_str()));
        if boundary {
            self.index += 1;
        }

        boundary
    }

    fn string(&mut self) -> bool {
        let tok = self.current();
        if tok.kind != TokenKind::String {
            return false;
        }

        let text = unescape(&tok.text[1..tok.text.len() - 1]);
        self.push(Expression::new(Kind::Str, &text, self.index));
        self.index += 1;

        true
    }

    fn integer(&mut self) -> Result<bool> {
        let tok = self.current();
        let radix = match tok.kind {
            TokenKind::BinNum => Some(2),
            TokenKind::HexNum => Some(16),
            _ => None,
        };

        if let Some(radix) = radix {
            let num = match i64::from_str_radix(&tok.text[2..], radix) {
                Ok(n) => n,
                Err(_) => return Err(self.fail(ErrorKind::InvalidNumber)),
            };
            self.push(Expression::new(Kind::Int, &num.to_string(), self.index));
            self.index += 1;
            return Ok(true);
        }

        let orig = self.index;
        let minus = self.sign();
        if self.current().kind != TokenKind::Integer {
            self.index = orig;
            return Ok(false);
        }

        let text = if minus {
            format!("-{}", self.current().text)
        } else {
            self.current().text.clone()
        };
        if text.parse::<i64>().is_err() {
            return Err(self.fail(ErrorKind::InvalidNumber));
        }

        self.push(Expression::new(Kind::Int, &text, self.index));
        self.index += 1;

        Ok(true)
    }

    fn real(&mut self) -> Result<bool> {
        let orig = self.index;
        let minus = self.sign();
        let tok = self.current();

        let text = match tok.kind {
            TokenKind::ScientNum => {
                let num: f64 = match tok.text.parse() {
                    Ok(n) => n,
                    Err(_) => return Err(self.fail(ErrorKind::InvalidNumber)),
                };
                format!("{:?}", if minus { -num } else { num })
            }
            TokenKind::Real if minus => format!("-{}", tok.text),
            TokenKind::Real => tok.text.clone(),
            _ => {
                self.index = orig;
                return Ok(false);
            }
        };

        self.push(Expression::new(Kind::Real, &text, self.index));
        self.index += 1;

        Ok(true)
    }

    fn boolean(&mut self) -> bool {
        let tok = self.current();
        if tok.kind != TokenKind::Boolean {
            return false;
        }

        let text = tok.text.clone();
        self.push(Expression::new(Kind::Bool, &text, self.index));
        self.index += 1;

        true
    }

    fn name(&mut self) -> bool {
        let tok = self.current();
        if tok.kind != TokenKind::Name {
            return false;
        }

        let text = tok.text.clone();
        self.push(Expression::new(Kind::Name, &text, self.index));
        self.index += 1;

        true
    }

    fn lit(&mut self, t: &str) -> bool {
        let tok = self.current();
        let literal = matches!(tok.kind, TokenKind::Punct | TokenKind::Keyword);
        if !literal || tok.text != t {
            return false;
        }

        self.index += 1;
        true
    }
}

#[cfg(test)]
fn parse_str(input: &str) -> Result<Program> {
    Parser::new(crate::lang::lex::lex(input)?).parse()
}

/// Compact s-expression view of a node, for asserting tree shapes
#[cfg(test)]
fn sexpr(ast: &Ast, id: NodeId) -> String {
    let node = ast.node(id);
    let child = |c: Option<NodeId>| c.map(|c| sexpr(ast, c)).unwrap_or_else(|| "_".to_string());

    match node.kind {
        Kind::Oper => format!("({} {} {})", node.text, child(node.left), child(node.right)),
        Kind::Call if node.left.is_none() && node.right.is_none() => node.text.clone(),
        Kind::Call => format!("(call {} {} {})", node.text, child(node.right), child(node.left)),
        Kind::Tup => {
            let mut members = Vec::new();
            let mut member = Some(id);
            while let Some(m) = member {
                let tup = ast.node(m);
                let value = child(tup.left);
                if tup.text.is_empty() {
                    members.push(value);
                } else {
                    members.push(format!("{}: {}", tup.text, value));
                }
                member = tup.right;
            }
            format!("[{}]", members.join(", "))
        }
        Kind::Block | Kind::Main | Kind::Else => {
            let stmts: Vec<String> = ast.statements(id).map(|s| sexpr(ast, s)).collect();
            format!("{{{}}}", stmts.join("; "))
        }
        Kind::Int | Kind::Real | Kind::Bool | Kind::Str | Kind::Name => node.text.clone(),
        _ => format!("({} {} {})", node.kind, child(node.left), child(node.right)),
    }
}

#[cfg(test)]
fn roots(input: &str) -> Vec<String> {
    let program = parse_str(input).expect("Failed to parse");
    program
        .roots
        .iter()
        .map(|r| sexpr(&program.ast, *r))
        .collect()
}

#[cfg(test)]
fn parse_error(input: &str) -> (ErrorKind, Span) {
    let err = parse_str(input).expect_err("Parsed invalid input");
    let diag = err.downcast_ref::<Diagnostic>().expect("Not a diagnostic");
    (diag.kind.clone(), diag.span)
}

#[test]
fn test_precedence() {
    let tests = vec![
        ("1 + 2 * 3", "(+ 1 (* 2 3))"),
        ("1 * 2 + 3", "(+ (* 1 2) 3)"),
        ("1 - 2 + 3", "(+ (- 1 2) 3)"),
        ("8 / 4 / 2", "(/ (/ 8 4) 2)"),
        ("2 ^ 3 * 4", "(* (^ 2 3) 4)"),
        ("1 + 2 ^ 3 * 4 - 5", "(- (+ 1 (* (^ 2 3) 4)) 5)"),
        ("a == b + c", "(== a (+ b c))"),
        ("a < b == c > d", "(> (== (< a b) c) d)"),
        ("a .. b * 2", "(.. a (* b 2))"),
        ("x and y or z", "(or (and x y) z)"),
    ];

    for (input, expected) in tests {
        assert_eq!(roots(input), vec![expected.to_string()], "input: {}", input);
    }
}

#[test]
fn test_parens() {
    assert_eq!(roots("(1 + 2) * 3"), vec!["(* [(+ 1 2)] 3)"]);
    assert_eq!(roots("a + (b + c)"), vec!["(+ a [(+ b c)])"]);
    assert_eq!(roots("a * (b + c * d) - e"), vec!["(- (* a [(+ b (* c d))]) e)"]);
}

#[test]
fn test_calls() {
    assert_eq!(roots("print x"), vec!["(call print x _)"]);
    assert_eq!(roots("f 1 + 2"), vec!["(call f (+ 1 2) _)"]);
    assert_eq!(roots("f g 1"), vec!["(call f (call g 1 _) _)"]);
    assert_eq!(roots("n.times do print 1"), vec!["(access n (call times _ {(call print 1 _)}))"]);
    assert_eq!(roots("t.a.0"), vec!["(access (access t a) 0)"]);
}

#[test]
fn test_set() {
    assert_eq!(roots("x = 1 + 2 * 3"), vec!["(set x (+ 1 (* 2 3)))"]);
    assert_eq!(roots("t.a = 5"), vec!["(set (access t a) 5)"]);
    assert_eq!(roots("a, b = t"), vec!["(set (calls a b) t)"]);
    assert_eq!(roots("a, b, c = t"), vec!["(set (calls a (calls b c)) t)"]);

    let program = parse_str("public x = 1").expect("Failed to parse");
    let set = program.ast.node(program.roots[0]);
    assert_eq!(set.kind, Kind::Set);
    assert_eq!(set.text, "pub");

    // Commas inside a tuple never start a target list
    assert_eq!(roots("(a, b)"), vec!["[a, b]"]);
}

#[test]
fn test_tuples() {
    assert_eq!(roots("t = (1, name: 2, public p: 3)"), vec!["(set t [1, name: 2, pub p: 3])"]);
    assert_eq!(roots("t = (\n  a: 1,\n  b: 2\n)"), vec!["(set t [a: 1, b: 2])"]);
    assert_eq!(roots("(1, 2).0"), vec!["(access [1, 2] 0)"]);
}

#[test]
fn test_blocks() {
    assert_eq!(roots("f = do with n\n  n"), vec!["(set f {n})"]);
    assert_eq!(roots("f = do with a, b a + b"), vec!["(set f {(+ a b)})"]);

    let program = parse_str("f = do with a, b\n  x = a\n  x + b").expect("Failed to parse");
    let block = program.ast.node(program.roots[0]).right.expect("No block");
    assert_eq!(program.ast.node(block).kind, Kind::Block);
    assert_eq!(program.ast.node(block).text, "a b");
    assert_eq!(sexpr(&program.ast, block), "{(set x a); (+ x b)}");

    // Dedent closes every nested level
    let input = "f = do\n  if c then\n    a\n  b\nc";
    assert_eq!(roots(input), vec!["(set f {(if c (branches {a} _)); b})", "c"]);
}

#[test]
fn test_conditionals() {
    assert_eq!(roots("if c then a else b"), vec!["(if c (branches {a} {b}))"]);
    assert_eq!(roots("if c then a\nelse b"), vec!["(if c (branches {a} {b}))"]);
    assert_eq!(
        roots("if x > 1 then\n  a\n  b\nelse\n  c\nd"),
        vec!["(if (> x 1) (branches {a; b} {c}))", "d"]
    );
    assert_eq!(
        roots("if a then b else if c then d else e"),
        vec!["(if a (branches {b} {(if c (branches {d} {e}))}))"]
    );
    assert_eq!(roots("if c then return 1"), vec!["(if c (branches {(return _ 1)} _))"]);
}

#[test]
fn test_literals() {
    assert_eq!(roots("0b101"), vec!["5"]);
    assert_eq!(roots("0x1F"), vec!["31"]);
    assert_eq!(roots("1.5e3"), vec!["1500.0"]);
    assert_eq!(roots("x = -3"), vec!["(set x -3)"]);
    assert_eq!(roots("x = -2.5"), vec!["(set x -2.5)"]);
    assert_eq!(roots("a - 3"), vec!["(- a 3)"]);
    assert_eq!(roots("(-1, 2)"), vec!["[-1, 2]"]);
    assert_eq!(roots(r#""a\tb\"c""#), vec!["a\tb\"c"]);
}

#[test]
fn test_keywords() {
    assert_eq!(roots("inject @lib/util"), vec!["(inject _ (file _ _))"]);
    assert_eq!(roots("x = @lib/util"), vec!["(set x (file _ _))"]);

    let program = parse_str("x = @lib/util").expect("Failed to parse");
    let file = program.ast.node(program.roots[0]).right.expect("No file");
    assert_eq!(program.ast.node(file).text, "lib/util");
}

#[test]
fn test_round_trip() {
    let input = "x\n1\n2.5\n\"hi\"\ntrue\nf 3\ny = a + b\nt.a\n";
    let program = parse_str(input).expect("Failed to parse");
    assert_eq!(program.to_source(), input);

    let input = concat!(
        "f = do with a, b\n  x = a\n  x + b\n",
        "if f (1, 2) > 2 then\n  print 1\n  print 2\nelse\n  print 3\n  break\n",
    );
    let program = parse_str(input).expect("Failed to parse");
    assert_eq!(program.to_source(), input);

    let input = "t = (1, public p: \"x\")\ng = do with n n\nif c then a else b\n";
    let program = parse_str(input).expect("Failed to parse");
    assert_eq!(program.to_source(), input);

    let input = "print \"h\u{e9}llo\"\ns = \"a\\tb \\\"q\\\" \\\\\"\n";
    let program = parse_str(input).expect("Failed to parse");
    assert_eq!(program.to_source(), input);
    let arg = program.ast.node(program.roots[0]).right.expect("No argument");
    assert_eq!(program.ast.node(arg).text, "h\u{e9}llo");
}

#[test]
fn test_errors() {
    let tests = vec![
        (" x = 1", ErrorKind::IndentedFile),
        ("x\n  y", ErrorKind::UnexpectedIndent),
        ("x = 1 2", ErrorKind::NoNewline),
        ("f = do with\n  1", ErrorKind::NoParameter),
        ("x =", ErrorKind::NothingToSet),
        ("t = (1, 2", ErrorKind::NoClosingBrace),
        ("f = do\nx", ErrorKind::NoIndent),
        ("a, = t", ErrorKind::NoName),
        ("a, b", ErrorKind::NothingToSet),
        ("public f 1", ErrorKind::NothingToSet),
        ("public x", ErrorKind::NothingToSet),
        ("t.", ErrorKind::NoAccessKey),
        ("if then 1", ErrorKind::NoConditional),
        ("if x 1", ErrorKind::NoThen),
        ("1 +", ErrorKind::NoRightValue),
        ("inject x", ErrorKind::NothingToInject),
        ("x = 99999999999999999999", ErrorKind::InvalidNumber),
        (")", ErrorKind::NotAnExpression),
        ("t = (1,\n    2)", ErrorKind::UnexpectedIndent),
    ];

    for (input, expected) in tests {
        assert_eq!(parse_error(input).0, expected, "input: {:?}", input);
    }
}

#[test]
fn test_error_spans() {
    // Indented file points at the very first byte
    assert_eq!(parse_error("  x"), (ErrorKind::IndentedFile, Span::new(0, 1)));

    // Unexpected indent highlights the indentation only
    assert_eq!(parse_error("x\n   y"), (ErrorKind::UnexpectedIndent, Span::new(2, 3)));

    // Missing `then` points at the token before where it should be
    assert_eq!(parse_error("if abc else 1"), (ErrorKind::NoThen, Span::new(3, 3)));
}

#[test]
fn test_empty() {
    assert!(parse_str("").expect("Failed to parse").roots.is_empty());
    assert!(parse_str("\n\n# nothing\n").expect("Failed to parse").roots.is_empty());
}

#[test]
fn test_cache_balanced() {
    let input = "a = 1\nb = (x: a, y: do with n\n  n * 2)\nif a == 1 then\n  b.y 3\n";
    let program = parse_str(input).expect("Failed to parse");
    assert_eq!(program.roots.len(), 3);
    for root in &program.roots {
        let kind = program.ast.node(*root).kind;
        assert!(kind == Kind::Set || kind == Kind::If);
    }
}
