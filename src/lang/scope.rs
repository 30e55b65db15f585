//! Name tables.
//!
//! A `Scope` is a shared handle to an ordered table of entries plus a shared link to the scope it
//! was created in. Insertion order is preserved because unnamed tuple members are stored under
//! their position (`"0"`, `"1"`, ...) and printing a tuple walks the table in order.
//!
//! Lookups come in two flavors:
//!
//! * local: only this scope's table, private entries included
//! * chained: this scope's table first, then every ancestor up to the root. Ancestors only expose
//!   their public entries

use std::cell::RefCell;
use std::rc::Rc;

use crate::lang::eval::Value;

struct Entry {
    name: String,
    value: Value,
    public: bool,
}

#[derive(Default)]
struct Table {
    entries: Vec<Entry>,
    parent: Option<Rc<RefCell<Table>>>,
}

impl Table {
    fn find(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }
}

#[derive(Clone, Default)]
pub struct Scope {
    inner: Rc<RefCell<Table>>,
}

impl Scope {
    /// Create a scope without a parent
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(parent: &Scope) -> Self {
        let table = Table {
            entries: Vec::new(),
            parent: Some(Rc::clone(&parent.inner)),
        };

        Self {
            inner: Rc::new(RefCell::new(table)),
        }
    }

    /// The scope this one was created in
    pub fn parent(&self) -> Option<Scope> {
        let parent = self.inner.borrow().parent.clone()?;
        Some(Scope { inner: parent })
    }

    pub fn lookup(&self, name: &str, chained: bool) -> Option<Value> {
        if let Some(entry) = self.inner.borrow().find(name) {
            return Some(entry.value.clone());
        }

        if !chained {
            return None;
        }

        let mut ancestor = self.parent();
        while let Some(scope) = ancestor {
            if let Some(value) = scope.lookup_public(name) {
                return Some(value);
            }
            ancestor = scope.parent();
        }

        None
    }

    /// Like `lookup` but absent names read as `nil`
    pub fn get(&self, name: &str, chained: bool) -> Value {
        self.lookup(name, chained).unwrap_or(Value::Nil)
    }

    /// Local lookup restricted to public entries
    pub fn lookup_public(&self, name: &str) -> Option<Value> {
        match self.inner.borrow().find(name) {
            Some(entry) if entry.public => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Nearest scope in the chain that a chained lookup of `name` would read from
    pub fn holder(&self, name: &str) -> Option<Scope> {
        if self.inner.borrow().find(name).is_some() {
            return Some(self.clone());
        }

        let mut ancestor = self.parent();
        while let Some(scope) = ancestor {
            if scope.lookup_public(name).is_some() {
                return Some(scope);
            }
            ancestor = scope.parent();
        }

        None
    }

    /// Bind `name` to `value`
    ///
    /// With `declare` the entry is created (or overwritten) in this scope. Without it the nearest
    /// scope already holding `name` is updated, falling back to this scope when none does.
    /// Overwriting keeps an entry's visibility; new entries are private.
    pub fn set(&self, name: &str, value: Value, declare: bool) {
        let target = if declare {
            self.clone()
        } else {
            self.holder(name).unwrap_or_else(|| self.clone())
        };

        let mut table = target.inner.borrow_mut();
        match table.find_mut(name) {
            Some(entry) => entry.value = value,
            None => table.entries.push(Entry {
                name: name.to_string(),
                value,
                public: false,
            }),
        }
    }

    /// Bind `name` in this scope with an explicit visibility
    pub fn define(&self, name: &str, value: Value, public: bool) {
        let mut table = self.inner.borrow_mut();
        match table.find_mut(name) {
            Some(entry) => {
                entry.value = value;
                entry.public = public;
            }
            None => table.entries.push(Entry {
                name: name.to_string(),
                value,
                public,
            }),
        }
    }

    /// Make an existing entry of this scope public
    pub fn export(&self, name: &str) {
        if let Some(entry) = self.inner.borrow_mut().find_mut(name) {
            entry.public = true;
        }
    }

    /// Snapshot of `(name, value, public)` in insertion order
    pub fn entries(&self) -> Vec<(String, Value, bool)> {
        self.inner
            .borrow()
            .entries
            .iter()
            .map(|e| (e.name.clone(), e.value.clone(), e.public))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[test]
fn test_local_lookup() {
    let scope = Scope::root();
    scope.set("x", Value::Integer(1), true);
    scope.define("y", Value::Integer(2), true);

    assert_eq!(scope.lookup("x", false), Some(Value::Integer(1)));
    assert_eq!(scope.lookup_public("x"), None);
    assert_eq!(scope.lookup_public("y"), Some(Value::Integer(2)));
    assert_eq!(scope.get("z", false), Value::Nil);
}

#[test]
fn test_chained_lookup_visibility() {
    let root = Scope::root();
    root.set("hidden", Value::Integer(1), true);
    root.define("shown", Value::Integer(2), true);

    let child = Scope::child(&root);
    let grandchild = Scope::child(&child);

    // Ancestors only expose public entries
    assert_eq!(grandchild.lookup("hidden", true), None);
    assert_eq!(grandchild.lookup("shown", true), Some(Value::Integer(2)));
    assert_eq!(grandchild.lookup("shown", false), None);

    // Shadowing
    child.define("shown", Value::Integer(3), true);
    assert_eq!(grandchild.lookup("shown", true), Some(Value::Integer(3)));
}

#[test]
fn test_set_declare() {
    let root = Scope::root();
    root.define("x", Value::Integer(1), true);
    let child = Scope::child(&root);

    // Update the nearest holder
    child.set("x", Value::Integer(2), false);
    assert_eq!(root.lookup("x", false), Some(Value::Integer(2)));
    assert_eq!(child.len(), 0);

    // Declare shadows
    child.set("x", Value::Integer(3), true);
    assert_eq!(root.lookup("x", false), Some(Value::Integer(2)));
    assert_eq!(child.lookup("x", false), Some(Value::Integer(3)));

    // No holder anywhere falls back to this scope
    child.set("fresh", Value::Bool(true), false);
    assert_eq!(child.lookup("fresh", false), Some(Value::Bool(true)));
    assert_eq!(root.lookup("fresh", false), None);
}

#[test]
fn test_export_and_order() {
    let scope = Scope::root();
    scope.set("b", Value::Integer(1), true);
    scope.set("a", Value::Integer(2), true);
    scope.set("b", Value::Integer(3), true);
    scope.export("a");

    let entries = scope.entries();
    let names: Vec<&str> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, vec!["b", "a"]);
    assert_eq!(entries[0].1, Value::Integer(3));
    assert!(!entries[0].2);
    assert!(entries[1].2);
}

#[test]
fn test_child_keeps_parent() {
    let child = {
        let root = Scope::root();
        root.define("x", Value::Integer(1), true);
        Scope::child(&root)
    };

    assert!(child.parent().is_some());
    assert_eq!(child.lookup("x", true), Some(Value::Integer(1)));
}
