//! Variable store: typed, scoped cells and the shared global environment.

use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

use crate::core::evaluator::{self, EvalError};
use crate::schema::operator::{ComparisonOperator, SetOperator};
use crate::schema::order::{Scope, VariableRef};
use crate::schema::story::VariableDecl;
use crate::schema::value::{Value, ValueKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VariableError {
    #[error("unknown variable: {0}")]
    Unknown(VariableRef),
    #[error("variable '{key}' holds {found} values, not {expected}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },
}

#[derive(Debug)]
struct Slot {
    value: Value,
    /// Captured on the first read after creation; restored by `reset`.
    start: Option<Value>,
}

/// Handle to one variable cell. Clones share the cell.
#[derive(Debug, Clone)]
pub struct Variable {
    key: String,
    scope: Scope,
    cell: Rc<RefCell<Slot>>,
}

impl Variable {
    pub fn new(key: &str, scope: Scope, value: Value) -> Self {
        Self {
            key: key.to_string(),
            scope,
            cell: Rc::new(RefCell::new(Slot { value, start: None })),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn kind(&self) -> ValueKind {
        self.cell.borrow().value.kind()
    }

    /// Current value. The first read also captures the reset value.
    pub fn get(&self) -> Value {
        let mut slot = self.cell.borrow_mut();
        if slot.start.is_none() {
            slot.start = Some(slot.value.clone());
        }
        slot.value.clone()
    }

    /// Current value without capturing the reset value.
    pub fn peek(&self) -> Value {
        self.cell.borrow().value.clone()
    }

    pub fn set(&self, value: Value) -> Result<(), VariableError> {
        let mut slot = self.cell.borrow_mut();
        let found = slot.value.kind();
        if value.kind() != found {
            return Err(VariableError::TypeMismatch {
                key: self.key.clone(),
                expected: value.kind(),
                found,
            });
        }
        slot.value = value;
        Ok(())
    }

    /// Restore the value captured at the first read. A variable that was
    /// never read still holds its initial value and is left alone.
    pub fn reset(&self) {
        let mut slot = self.cell.borrow_mut();
        if let Some(start) = slot.start.clone() {
            slot.value = start;
        }
    }

    /// Compare the current value against `value`.
    pub fn evaluate(&self, op: ComparisonOperator, value: &Value) -> Result<bool, EvalError> {
        evaluator::compare(&self.get(), op, value)
    }

    /// Combine the current value with `value` and store the result.
    pub fn apply(&self, op: SetOperator, value: &Value) -> Result<(), EvalError> {
        let next = evaluator::apply(&self.get(), op, value)?;
        self.set(next)?;
        Ok(())
    }

    /// Whether two handles point at the same backing cell.
    pub fn shares_cell_with(&self, other: &Variable) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

/// Registry of global variables, one cell per key. Cloning the handle
/// shares the registry; hand the same environment to every engine that
/// should see the same globals.
#[derive(Debug, Clone, Default)]
pub struct GlobalEnvironment {
    cells: Rc<RefCell<FxHashMap<String, Variable>>>,
}

impl GlobalEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Variable> {
        self.cells.borrow().get(key).cloned()
    }

    /// Return the cell for `key`, creating it with `initial` if absent.
    /// An existing cell of another kind is a type mismatch.
    pub fn get_or_create(&self, key: &str, initial: Value) -> Result<Variable, VariableError> {
        let mut cells = self.cells.borrow_mut();
        if let Some(existing) = cells.get(key) {
            let found = existing.kind();
            if found != initial.kind() {
                return Err(VariableError::TypeMismatch {
                    key: key.to_string(),
                    expected: initial.kind(),
                    found,
                });
            }
            return Ok(existing.clone());
        }

        tracing::debug!(key, kind = %initial.kind(), "creating global variable");
        let variable = Variable::new(key, Scope::Global, initial);
        cells.insert(key.to_string(), variable.clone());
        Ok(variable)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cells.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.borrow().is_empty()
    }

    /// Keys of all global variables, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cells.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn reset_all(&self) {
        for variable in self.cells.borrow().values() {
            variable.reset();
        }
    }
}

/// The variables one engine can see: its own Private and Public cells and
/// aliases into the shared global environment.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    locals: FxHashMap<String, Variable>,
    /// Initial values of declared globals, used when the cell is first
    /// created.
    global_decls: FxHashMap<String, Value>,
    /// Undeclared globals this store has resolved, e.g. dice targets.
    touched_globals: RefCell<FxHashSet<String>>,
    globals: GlobalEnvironment,
}

impl VariableStore {
    pub fn new(globals: GlobalEnvironment) -> Self {
        Self {
            locals: FxHashMap::default(),
            global_decls: FxHashMap::default(),
            touched_globals: RefCell::default(),
            globals,
        }
    }

    pub fn globals(&self) -> &GlobalEnvironment {
        &self.globals
    }

    /// Declare a variable. Locals are created immediately; globals are
    /// created in the environment on first access.
    pub fn declare(&mut self, decl: &VariableDecl) {
        match decl.scope {
            Scope::Global => {
                self.global_decls.insert(decl.key.clone(), decl.value.clone());
            }
            scope => {
                let previous = self.locals.insert(
                    decl.key.clone(),
                    Variable::new(&decl.key, scope, decl.value.clone()),
                );
                if previous.is_some() {
                    tracing::warn!(key = %decl.key, "variable redeclared; previous value dropped");
                }
            }
        }
    }

    /// Resolve a reference to its cell.
    ///
    /// `kind` is the kind the caller expects. A global that does not exist
    /// yet is created with its declared value, or with the default value of
    /// `kind` if it was never declared.
    pub fn variable(
        &self,
        reference: &VariableRef,
        kind: Option<ValueKind>,
    ) -> Result<Variable, VariableError> {
        let variable = match reference.scope {
            Scope::Global => {
                let initial = self
                    .global_decls
                    .get(&reference.key)
                    .cloned()
                    .or_else(|| kind.map(|k| k.default_value()));
                let variable = match initial {
                    Some(initial) => self.globals.get_or_create(&reference.key, initial)?,
                    None => self
                        .globals
                        .get(&reference.key)
                        .ok_or_else(|| VariableError::Unknown(reference.clone()))?,
                };
                if !self.global_decls.contains_key(&reference.key) {
                    self.touched_globals
                        .borrow_mut()
                        .insert(reference.key.clone());
                }
                variable
            }
            scope => self
                .locals
                .get(&reference.key)
                .filter(|v| v.scope() == scope)
                .cloned()
                .ok_or_else(|| VariableError::Unknown(reference.clone()))?,
        };

        if let Some(expected) = kind {
            let found = variable.kind();
            if found != expected {
                return Err(VariableError::TypeMismatch {
                    key: reference.key.clone(),
                    expected,
                    found,
                });
            }
        }
        Ok(variable)
    }

    pub fn get(&self, key: &str, scope: Scope) -> Result<Value, VariableError> {
        Ok(self.variable(&VariableRef::new(key, scope), None)?.get())
    }

    /// Like [`get`](Self::get), but a missing global is created with the
    /// default value of `kind`.
    pub fn get_as(&self, key: &str, scope: Scope, kind: ValueKind) -> Result<Value, VariableError> {
        Ok(self
            .variable(&VariableRef::new(key, scope), Some(kind))?
            .get())
    }

    pub fn set(&self, key: &str, scope: Scope, value: Value) -> Result<(), VariableError> {
        self.variable(&VariableRef::new(key, scope), Some(value.kind()))?
            .set(value)
    }

    pub fn reset(&self, key: &str, scope: Scope) -> Result<(), VariableError> {
        self.variable(&VariableRef::new(key, scope), None)?.reset();
        Ok(())
    }

    /// Reset every local, every declared global that exists and every
    /// global this store has used. Globals only other engines touched are
    /// left alone.
    pub fn reset_all(&self) {
        for variable in self.locals.values() {
            variable.reset();
        }
        let touched = self.touched_globals.borrow();
        for key in self.global_decls.keys().chain(touched.iter()) {
            if let Some(variable) = self.globals.get(key) {
                variable.reset();
            }
        }
    }

    /// Find a variable by bare key: locals first, then globals.
    pub fn lookup(&self, key: &str) -> Option<Variable> {
        if let Some(local) = self.locals.get(key) {
            return Some(local.clone());
        }
        if self.global_decls.contains_key(key) {
            return self.variable(&VariableRef::global(key), None).ok();
        }
        self.globals.get(key)
    }

    /// A Public variable of this store, for reading from other engines.
    pub fn public_variable(&self, key: &str) -> Option<Variable> {
        self.locals
            .get(key)
            .filter(|v| v.scope() == Scope::Public)
            .cloned()
    }

    /// Local variables, sorted by key.
    pub fn locals(&self) -> Vec<Variable> {
        let mut locals: Vec<Variable> = self.locals.values().cloned().collect();
        locals.sort_by(|a, b| a.key.cmp(&b.key));
        locals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(decls: &[VariableDecl], globals: &GlobalEnvironment) -> VariableStore {
        let mut store = VariableStore::new(globals.clone());
        for decl in decls {
            store.declare(decl);
        }
        store
    }

    #[test]
    fn private_get_and_set() {
        let store = store_with(
            &[VariableDecl::new("lamps", Scope::Private, 2i64)],
            &GlobalEnvironment::new(),
        );
        assert_eq!(store.get("lamps", Scope::Private).unwrap(), Value::Integer(2));
        store.set("lamps", Scope::Private, Value::Integer(5)).unwrap();
        assert_eq!(store.get("lamps", Scope::Private).unwrap(), Value::Integer(5));
    }

    #[test]
    fn scope_is_part_of_identity() {
        let store = store_with(
            &[VariableDecl::new("name", Scope::Private, "Ada")],
            &GlobalEnvironment::new(),
        );
        assert!(matches!(
            store.get("name", Scope::Public),
            Err(VariableError::Unknown(_))
        ));
    }

    #[test]
    fn set_with_wrong_kind_fails() {
        let store = store_with(
            &[VariableDecl::new("open", Scope::Private, false)],
            &GlobalEnvironment::new(),
        );
        let err = store
            .set("open", Scope::Private, Value::Integer(1))
            .unwrap_err();
        assert_eq!(
            err,
            VariableError::TypeMismatch {
                key: "open".to_string(),
                expected: ValueKind::Integer,
                found: ValueKind::Boolean,
            }
        );
    }

    #[test]
    fn global_created_lazily_with_requested_kind() {
        let globals = GlobalEnvironment::new();
        let store = VariableStore::new(globals.clone());
        assert!(globals.is_empty());

        let value = store.get_as("coins", Scope::Global, ValueKind::Integer).unwrap();
        assert_eq!(value, Value::Integer(0));
        assert!(globals.contains("coins"));
    }

    #[test]
    fn global_kind_conflict_is_type_mismatch() {
        let globals = GlobalEnvironment::new();
        let store = VariableStore::new(globals.clone());
        store.get_as("flag", Scope::Global, ValueKind::Boolean).unwrap();

        let err = store
            .get_as("flag", Scope::Global, ValueKind::String)
            .unwrap_err();
        assert!(matches!(err, VariableError::TypeMismatch { .. }));
    }

    #[test]
    fn undeclared_global_without_kind_is_unknown() {
        let store = VariableStore::new(GlobalEnvironment::new());
        assert!(matches!(
            store.get("ghost", Scope::Global),
            Err(VariableError::Unknown(_))
        ));
    }

    #[test]
    fn globals_share_one_cell_across_stores() {
        let globals = GlobalEnvironment::new();
        let decl = VariableDecl::new("score", Scope::Global, 1i64);
        let a = store_with(&[decl.clone()], &globals);
        let b = store_with(&[decl], &globals);

        a.set("score", Scope::Global, Value::Integer(42)).unwrap();
        assert_eq!(b.get("score", Scope::Global).unwrap(), Value::Integer(42));

        let va = a.variable(&VariableRef::global("score"), None).unwrap();
        let vb = b.variable(&VariableRef::global("score"), None).unwrap();
        assert!(va.shares_cell_with(&vb));
    }

    #[test]
    fn private_variables_are_not_shared() {
        let globals = GlobalEnvironment::new();
        let decl = VariableDecl::new("hp", Scope::Private, 10i64);
        let a = store_with(&[decl.clone()], &globals);
        let b = store_with(&[decl], &globals);

        a.set("hp", Scope::Private, Value::Integer(1)).unwrap();
        assert_eq!(b.get("hp", Scope::Private).unwrap(), Value::Integer(10));
    }

    #[test]
    fn reset_restores_first_read_value() {
        let var = Variable::new("mood", Scope::Private, Value::String("calm".into()));
        assert_eq!(var.get(), Value::String("calm".into()));
        var.set(Value::String("angry".into())).unwrap();
        var.reset();
        assert_eq!(var.get(), Value::String("calm".into()));
    }

    #[test]
    fn reset_before_any_read_keeps_value() {
        let var = Variable::new("n", Scope::Private, Value::Integer(3));
        var.set(Value::Integer(9)).unwrap();
        var.reset();
        assert_eq!(var.peek(), Value::Integer(9));
    }

    #[test]
    fn peek_does_not_capture_start() {
        let var = Variable::new("n", Scope::Private, Value::Integer(3));
        var.peek();
        var.set(Value::Integer(4)).unwrap();
        assert_eq!(var.get(), Value::Integer(4));
        var.set(Value::Integer(5)).unwrap();
        var.reset();
        assert_eq!(var.peek(), Value::Integer(4));
    }

    #[test]
    fn reset_all_covers_locals_and_declared_globals() {
        let globals = GlobalEnvironment::new();
        let store = store_with(
            &[
                VariableDecl::new("a", Scope::Private, 1i64),
                VariableDecl::new("g", Scope::Global, 1i64),
            ],
            &globals,
        );
        store.get("a", Scope::Private).unwrap();
        store.get("g", Scope::Global).unwrap();
        store.set("a", Scope::Private, Value::Integer(7)).unwrap();
        store.set("g", Scope::Global, Value::Integer(7)).unwrap();

        store.reset_all();
        assert_eq!(store.get("a", Scope::Private).unwrap(), Value::Integer(1));
        assert_eq!(store.get("g", Scope::Global).unwrap(), Value::Integer(1));
    }

    #[test]
    fn reset_all_covers_globals_created_on_use() {
        let globals = GlobalEnvironment::new();
        let store = store_with(&[], &globals);
        let other = store_with(&[], &globals);

        store.get_as("luck", Scope::Global, ValueKind::Dice).unwrap();
        store.set("luck", Scope::Global, Value::Dice(9)).unwrap();
        other.get_as("mood", Scope::Global, ValueKind::Integer).unwrap();
        other.set("mood", Scope::Global, Value::Integer(3)).unwrap();

        store.reset_all();
        assert_eq!(globals.get("luck").unwrap().peek(), Value::Dice(0));
        assert_eq!(globals.get("mood").unwrap().peek(), Value::Integer(3));
    }

    #[test]
    fn lookup_prefers_locals() {
        let globals = GlobalEnvironment::new();
        globals.get_or_create("key", Value::String("global".into())).unwrap();
        let store = store_with(
            &[VariableDecl::new("key", Scope::Private, "local")],
            &globals,
        );
        assert_eq!(store.lookup("key").unwrap().peek(), Value::String("local".into()));
    }

    #[test]
    fn public_variable_hides_private() {
        let store = store_with(
            &[
                VariableDecl::new("shown", Scope::Public, true),
                VariableDecl::new("hidden", Scope::Private, true),
            ],
            &GlobalEnvironment::new(),
        );
        assert!(store.public_variable("shown").is_some());
        assert!(store.public_variable("hidden").is_none());
    }
}
