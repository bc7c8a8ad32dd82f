//! Dynamic values and export namespaces
//!
//! An [`Exports`] namespace is the container a module factory fills in. It is
//! shared by reference: the registry, every requirer, and any namespace that
//! re-exports from it all see the same table. Bindings are either plain values
//! or accessors evaluated on every read, which is how live re-exports observe
//! later writes to their source module.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Name of the binding returned by default-export interop
pub const DEFAULT_EXPORT: &str = "default";

/// Accessor thunk backing a live binding
pub type Accessor = Arc<dyn Fn() -> Value + Send + Sync>;

/// Native callable stored as a value
#[derive(Clone)]
pub struct Function(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

/// Value held by an export binding
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Namespace(Exports),
    Function(Function),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_namespace(&self) -> Option<&Exports> {
        match self {
            Value::Namespace(exports) => Some(exports),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Call the value if it is a function, `Undefined` otherwise
    pub fn call(&self, args: &[Value]) -> Value {
        match self {
            Value::Function(f) => f.call(args),
            _ => Value::Undefined,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Namespace(a), Value::Namespace(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Exports> for Value {
    fn from(exports: Exports) -> Self {
        Value::Namespace(exports)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

#[derive(Clone)]
enum Binding {
    Value(Value),
    Accessor(Accessor),
}

#[derive(Default)]
struct Namespace {
    bindings: RwLock<BTreeMap<String, Binding>>,
    es_module: AtomicBool,
}

/// Shared export namespace of a module
#[derive(Clone, Default)]
pub struct Exports(Arc<Namespace>);

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a binding, evaluating accessors
    ///
    /// The table lock is released before an accessor runs, so accessors may
    /// read other namespaces (or this one) freely.
    pub fn get(&self, name: &str) -> Value {
        let binding = self.read().get(name).cloned();
        match binding {
            Some(Binding::Value(value)) => value,
            Some(Binding::Accessor(accessor)) => accessor(),
            None => Value::Undefined,
        }
    }

    /// Assign a plain value
    ///
    /// Returns `false` without writing when the name is held by an accessor,
    /// which has no setter.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> bool {
        let mut bindings = self.write();
        let name = name.into();
        if let Some(Binding::Accessor(_)) = bindings.get(&name) {
            return false;
        }
        bindings.insert(name, Binding::Value(value.into()));
        true
    }

    /// Install an accessor unless the name is already owned
    pub fn define_accessor(&self, name: impl Into<String>, accessor: Accessor) -> bool {
        let mut bindings = self.write();
        let name = name.into();
        if bindings.contains_key(&name) {
            return false;
        }
        bindings.insert(name, Binding::Accessor(accessor));
        true
    }

    pub fn has_own(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Whether the binding is a live accessor rather than a stored value
    pub fn is_accessor(&self, name: &str) -> bool {
        matches!(self.read().get(name), Some(Binding::Accessor(_)))
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn mark_es_module(&self) {
        self.0.es_module.store(true, Ordering::Release);
    }

    pub fn is_es_module(&self) -> bool {
        self.0.es_module.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &Exports) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Binding>> {
        // A poisoned table still holds consistent bindings: writers never
        // leave a half-inserted entry behind.
        self.0.bindings.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Binding>> {
        self.0.bindings.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exports")
            .field("keys", &self.keys())
            .field("es_module", &self.is_es_module())
            .finish()
    }
}
