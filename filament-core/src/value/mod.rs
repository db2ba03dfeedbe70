//! The dynamic value model the engine observes.
//!
//! Everything that flows through an observable view is a [`Value`]:
//! primitives, raw objects, observable views, reference cells, and memoized
//! effects. Raw object storage lives in [`obj`], identities and keys in
//! [`key`].
//!
//! # Equality
//!
//! [`Value`] equality is *same-value*: numbers compare numerically across
//! `Int`/`Float` with NaN equal to NaN and positive and negative zero equal,
//! strings by content, and objects, views, cells and computeds by identity.
//! This is the comparison write interception uses to decide whether a
//! mutation actually changed anything.

mod key;
mod obj;

pub use key::{Key, ObjId};
pub use obj::{MapEntry, Obj, ObjKind};

use key::canonical_float_bits;

use std::fmt::Debug;
use std::sync::Arc;

use crate::reactive::{Computed, Ref, View};

/// A dynamic value: primitive, raw object, observable view, reference cell,
/// or memoized effect.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// A raw object of an observable kind.
    Obj(Arc<Obj>),
    /// An observable view over a raw object.
    View(View),
    /// A single-slot reference cell.
    Ref(Ref),
    /// A lazily-evaluated memoized effect.
    Computed(Computed),
}

impl Value {
    /// Same-value equality: numeric across `Int`/`Float` (NaN equal to NaN,
    /// ±0 equal), content for strings, identity for objects, views, cells
    /// and computeds.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                (a == b) || (a.is_nan() && b.is_nan())
            }
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *b == *a as f64
            }
            (Value::Obj(a), Value::Obj(b)) => Arc::ptr_eq(a, b),
            (Value::View(a), Value::View(b)) => a.ptr_eq(b),
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            (Value::Computed(a), Value::Computed(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Whether this value is of an observable kind (a raw object).
    pub fn is_observable_kind(&self) -> bool {
        matches!(self, Value::Obj(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric reading of the value: `Int` and `Float` convert, everything
    /// else (including `Null`) reads as NaN.
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            _ => f64::NAN,
        }
    }

    pub fn as_obj(&self) -> Option<&Arc<Obj>> {
        match self {
            Value::Obj(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_view(&self) -> Option<&View> {
        match self {
            Value::View(v) => Some(v),
            _ => None,
        }
    }

    /// The hashable key form of this value, used to address container
    /// entries. Views key by their raw object's identity, so a wrapped and
    /// an unwrapped handle to the same object address the same entry.
    pub fn as_key(&self) -> Option<Key> {
        match self {
            Value::Null => Some(Key::Null),
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Float(f) => Some(Key::Float(canonical_float_bits(*f))),
            Value::Str(s) => Some(Key::Str(s.clone())),
            Value::Obj(o) => Some(Key::Obj(o.id())),
            Value::View(v) => Some(Key::Obj(v.target().id())),
            Value::Ref(r) => Some(Key::Obj(r.id())),
            Value::Computed(c) => Some(Key::Obj(c.id())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Obj(o) => write!(f, "{o:?}"),
            Value::View(v) => write!(f, "{v:?}"),
            Value::Ref(r) => write!(f, "Ref({:?})", r.id()),
            Value::Computed(c) => write!(f, "Computed({:?})", c.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<Arc<Obj>> for Value {
    fn from(o: Arc<Obj>) -> Self {
        Value::Obj(o)
    }
}

impl From<View> for Value {
    fn from(v: View) -> Self {
        Value::View(v)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl From<Computed> for Value {
    fn from(c: Computed) -> Self {
        Value::Computed(c)
    }
}
