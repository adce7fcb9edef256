// Lexical scopes

use crate::eval::error::{EvalResult, RuntimeError};
use crate::eval::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

struct Slot {
    value: Value,
    mutable: bool,
}

pub struct Scope {
    vars: RefCell<HashMap<String, Slot>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Self {
            vars: RefCell::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    /// Bind `name` in this scope, shadowing any outer binding
    pub fn declare(&self, name: &str, value: Value, mutable: bool) {
        self.vars
            .borrow_mut()
            .insert(name.to_string(), Slot { value, mutable });
    }

    /// Drop every binding in this scope
    pub fn clear(&self) {
        self.vars.borrow_mut().clear();
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(slot) = self.vars.borrow().get(name) {
            return Some(slot.value.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(name))
    }

    pub fn assign(&self, name: &str, value: Value) -> EvalResult<()> {
        if let Some(slot) = self.vars.borrow_mut().get_mut(name) {
            if !slot.mutable {
                return Err(RuntimeError::type_error("Assignment to constant variable."));
            }
            slot.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(RuntimeError::reference_error(format!("{} is not defined", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing_and_assignment() {
        let root = Scope::root();
        root.declare("x", Value::Number(1.0), true);
        let inner = Scope::child(&root);
        inner.assign("x", Value::Number(2.0)).unwrap();
        assert!(matches!(root.lookup("x"), Some(Value::Number(n)) if n == 2.0));

        inner.declare("x", Value::Number(3.0), false);
        assert!(inner.assign("x", Value::Number(4.0)).is_err());
        assert!(matches!(root.lookup("x"), Some(Value::Number(n)) if n == 2.0));
    }

    #[test]
    fn test_undeclared_assignment_fails() {
        let err = Scope::root().assign("nope", Value::Null).unwrap_err();
        assert_eq!(err.kind, "ReferenceError");
    }
}
