//! Runtime values seen by the dispatch core.
//!
//! Only the parts of a value that dispatch cares about are modelled here: which
//! receiver category it falls into and, for objects, its layout identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use rustc_hash::FxHashMap;

use crate::class::Shape;

mod symbol;

pub use symbol::Symbol;

/// Tag for boxed primitive receivers that share one class per tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    Nil,
    Integer,
    Float,
    String,
}

#[derive(Debug, Default, Clone)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Immutable string payload, shared on clone
    Str(Arc<str>),
    Symbol(Symbol),
    /// Heap object with a fixed layout identity
    Object(Arc<ObjectValue>),
    /// Object owned by another language, reached through the interop bridge
    Foreign(Arc<ForeignObject>),
    /// "No method here" sentinel returned by return-missing dispatch
    Missing,
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Symbol::intern(name))
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    #[inline]
    pub fn is_foreign(&self) -> bool {
        matches!(self, Value::Foreign(_))
    }

    /// Ruby-style truthiness: only `nil`, `false` and the sentinel are falsy.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false) | Value::Missing)
    }

    #[inline]
    pub fn native_type(&self) -> Option<NativeType> {
        match self {
            Value::Nil => Some(NativeType::Nil),
            Value::Int(_) => Some(NativeType::Integer),
            Value::Float(_) => Some(NativeType::Float),
            Value::Str(_) => Some(NativeType::String),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Symbol(_) => "Symbol",
            Value::Object(_) => "Object",
            Value::Foreign(_) => "Foreign",
            Value::Missing => "Missing",
        }
    }

    /// Short human-readable rendering used in diagnostics.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Str(s) => format!("{:?}", s.as_ref()),
            Value::Symbol(sym) => format!("{sym:?}"),
            Value::Object(obj) => format!("#<object shape={}>", obj.shape().id.0),
            Value::Foreign(obj) => format!("#<foreign {} {}>", obj.kind(), obj.id()),
            Value::Missing => "<missing>".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Missing, Value::Missing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}

impl From<Symbol> for Value {
    fn from(value: Symbol) -> Self {
        Value::Symbol(value)
    }
}

/// Heap object. The shape never changes after allocation.
#[derive(Debug)]
pub struct ObjectValue {
    shape: Shape,
    fields: Mutex<FxHashMap<Symbol, Value>>,
}

impl ObjectValue {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            fields: Mutex::new(FxHashMap::default()),
        }
    }

    #[inline]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn get_field(&self, name: Symbol) -> Value {
        let fields = self.fields.lock().unwrap_or_else(PoisonError::into_inner);
        fields.get(&name).cloned().unwrap_or_default()
    }

    pub fn set_field(&self, name: Symbol, value: Value) -> Option<Value> {
        let mut fields = self.fields.lock().unwrap_or_else(PoisonError::into_inner);
        fields.insert(name, value)
    }
}

static NEXT_FOREIGN_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to an object living in another language runtime.
#[derive(Debug)]
pub struct ForeignObject {
    id: u64,
    kind: Arc<str>,
}

impl ForeignObject {
    pub fn new(kind: &str) -> Self {
        Self {
            id: NEXT_FOREIGN_ID.fetch_add(1, Ordering::Relaxed),
            kind: Arc::from(kind),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

type BlockFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// Block argument of a call. Dispatch passes it through without looking inside.
#[derive(Clone)]
pub struct Block(Arc<BlockFn>);

impl Block {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Block(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.0)(args)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({:p})", Arc::as_ptr(&self.0))
    }
}
