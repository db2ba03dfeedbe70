//! Raw object storage.
//!
//! An [`Obj`] is the plain, unwrapped heap object that backs an observable
//! view. It owns its data behind an `RwLock` and knows nothing about
//! tracking; the interceptors in `reactive::view` and `reactive::collection`
//! perform the raw operations defined here and feed the dependency graph
//! around them.
//!
//! # Kinds
//!
//! - `Record`: a string-keyed field map (insertion-ordered).
//! - `List`: an ordered sequence.
//! - `Map` / `Set`: keyed containers accepting the full [`Key`] domain,
//!   storing the original key/member values so iteration can yield them.
//! - `WeakMap` / `WeakSet`: object-keyed containers holding weak references,
//!   never extending the lifetime of their keys.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;

use super::key::{Key, ObjId};
use super::Value;

/// The shape of a raw object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjKind {
    Record,
    List,
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl ObjKind {
    /// Container kinds are intercepted at the method level rather than the
    /// property level.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            ObjKind::Map | ObjKind::Set | ObjKind::WeakMap | ObjKind::WeakSet
        )
    }
}

/// One entry of a keyed container: the hashed key plus the original key
/// value, so iteration can hand the original back.
#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: Value,
    pub value: Value,
}

pub(crate) struct WeakMapEntry {
    pub key: Weak<Obj>,
    pub value: Value,
}

pub(crate) enum ObjData {
    Record(IndexMap<Arc<str>, Value>),
    List(Vec<Value>),
    Map(IndexMap<Key, MapEntry>),
    Set(IndexMap<Key, Value>),
    WeakMap(HashMap<ObjId, WeakMapEntry>),
    WeakSet(HashMap<ObjId, Weak<Obj>>),
}

/// A raw heap object of an observable kind.
///
/// User code owns raw objects through `Arc`; the engine's registries key by
/// [`ObjId`] and hold weak references only.
pub struct Obj {
    id: ObjId,
    data: RwLock<ObjData>,
}

impl Obj {
    fn new(data: ObjData) -> Arc<Self> {
        Arc::new(Self {
            id: ObjId::new(),
            data: RwLock::new(data),
        })
    }

    /// Create an empty record.
    pub fn record() -> Arc<Self> {
        Self::new(ObjData::Record(IndexMap::new()))
    }

    /// Create a record from field/value pairs.
    pub fn record_from<K, I>(fields: I) -> Arc<Self>
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let map = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect::<IndexMap<_, _>>();
        Self::new(ObjData::Record(map))
    }

    /// Create a list from its elements.
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Arc<Self> {
        Self::new(ObjData::List(items.into_iter().collect()))
    }

    /// Create an empty keyed container.
    pub fn map() -> Arc<Self> {
        Self::new(ObjData::Map(IndexMap::new()))
    }

    /// Create an empty set container.
    pub fn set() -> Arc<Self> {
        Self::new(ObjData::Set(IndexMap::new()))
    }

    /// Create an empty weak-keyed container.
    pub fn weak_map() -> Arc<Self> {
        Self::new(ObjData::WeakMap(HashMap::new()))
    }

    /// Create an empty weak set container.
    pub fn weak_set() -> Arc<Self> {
        Self::new(ObjData::WeakSet(HashMap::new()))
    }

    /// Get this object's unique ID.
    pub fn id(&self) -> ObjId {
        self.id
    }

    /// Get this object's kind.
    pub fn kind(&self) -> ObjKind {
        match *self.read() {
            ObjData::Record(_) => ObjKind::Record,
            ObjData::List(_) => ObjKind::List,
            ObjData::Map(_) => ObjKind::Map,
            ObjData::Set(_) => ObjKind::Set,
            ObjData::WeakMap(_) => ObjKind::WeakMap,
            ObjData::WeakSet(_) => ObjKind::WeakSet,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ObjData> {
        self.data.read().expect("object data lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ObjData> {
        self.data.write().expect("object data lock poisoned")
    }

    // ------------------------------------------------------------------
    // Record operations
    // ------------------------------------------------------------------

    pub(crate) fn record_get(&self, name: &str) -> Option<Value> {
        match &*self.read() {
            ObjData::Record(fields) => fields.get(name).cloned(),
            _ => panic!("record operation on non-record object"),
        }
    }

    /// Store a field, returning the previous value if the field existed.
    pub(crate) fn record_set(&self, name: Arc<str>, value: Value) -> Option<Value> {
        match &mut *self.write() {
            ObjData::Record(fields) => fields.insert(name, value),
            _ => panic!("record operation on non-record object"),
        }
    }

    pub(crate) fn record_remove(&self, name: &str) -> Option<Value> {
        match &mut *self.write() {
            // shift_remove keeps the remaining fields in insertion order
            ObjData::Record(fields) => fields.shift_remove(name),
            _ => panic!("record operation on non-record object"),
        }
    }

    pub(crate) fn record_has(&self, name: &str) -> bool {
        match &*self.read() {
            ObjData::Record(fields) => fields.contains_key(name),
            _ => panic!("record operation on non-record object"),
        }
    }

    pub(crate) fn record_keys(&self) -> Vec<Arc<str>> {
        match &*self.read() {
            ObjData::Record(fields) => fields.keys().cloned().collect(),
            _ => panic!("record operation on non-record object"),
        }
    }

    // ------------------------------------------------------------------
    // List operations
    // ------------------------------------------------------------------

    pub(crate) fn list_get(&self, index: usize) -> Option<Value> {
        match &*self.read() {
            ObjData::List(items) => items.get(index).cloned(),
            _ => panic!("list operation on non-list object"),
        }
    }

    pub(crate) fn list_len(&self) -> usize {
        match &*self.read() {
            ObjData::List(items) => items.len(),
            _ => panic!("list operation on non-list object"),
        }
    }

    /// Store at `index`, extending the list with nulls when the index lies
    /// past the end. Returns the previous value for in-range writes.
    pub(crate) fn list_set(&self, index: usize, value: Value) -> Option<Value> {
        match &mut *self.write() {
            ObjData::List(items) => {
                if index < items.len() {
                    Some(std::mem::replace(&mut items[index], value))
                } else {
                    items.resize(index, Value::Null);
                    items.push(value);
                    None
                }
            }
            _ => panic!("list operation on non-list object"),
        }
    }

    /// Remove the last element, returning its index and value.
    pub(crate) fn list_pop(&self) -> Option<(usize, Value)> {
        match &mut *self.write() {
            ObjData::List(items) => items.pop().map(|v| (items.len(), v)),
            _ => panic!("list operation on non-list object"),
        }
    }

    pub(crate) fn list_snapshot(&self) -> Vec<Value> {
        match &*self.read() {
            ObjData::List(items) => items.clone(),
            _ => panic!("list operation on non-list object"),
        }
    }

    // ------------------------------------------------------------------
    // Keyed container operations
    // ------------------------------------------------------------------

    pub(crate) fn map_get(&self, key: &Key) -> Option<Value> {
        match &*self.read() {
            ObjData::Map(entries) => entries.get(key).map(|e| e.value.clone()),
            _ => panic!("map operation on non-map object"),
        }
    }

    pub(crate) fn map_has(&self, key: &Key) -> bool {
        match &*self.read() {
            ObjData::Map(entries) => entries.contains_key(key),
            _ => panic!("map operation on non-map object"),
        }
    }

    /// Store an entry, returning the previous value if the key was present.
    pub(crate) fn map_set(&self, key: Key, key_value: Value, value: Value) -> Option<Value> {
        match &mut *self.write() {
            ObjData::Map(entries) => entries
                .insert(
                    key,
                    MapEntry {
                        key: key_value,
                        value,
                    },
                )
                .map(|e| e.value),
            _ => panic!("map operation on non-map object"),
        }
    }

    pub(crate) fn map_remove(&self, key: &Key) -> bool {
        match &mut *self.write() {
            ObjData::Map(entries) => entries.shift_remove(key).is_some(),
            _ => panic!("map operation on non-map object"),
        }
    }

    pub(crate) fn map_len(&self) -> usize {
        match &*self.read() {
            ObjData::Map(entries) => entries.len(),
            _ => panic!("map operation on non-map object"),
        }
    }

    pub(crate) fn map_snapshot(&self) -> Vec<(Value, Value)> {
        match &*self.read() {
            ObjData::Map(entries) => entries
                .values()
                .map(|e| (e.key.clone(), e.value.clone()))
                .collect(),
            _ => panic!("map operation on non-map object"),
        }
    }

    // ------------------------------------------------------------------
    // Set container operations
    // ------------------------------------------------------------------

    pub(crate) fn set_has(&self, key: &Key) -> bool {
        match &*self.read() {
            ObjData::Set(members) => members.contains_key(key),
            _ => panic!("set operation on non-set object"),
        }
    }

    /// Insert a member; returns `true` if it was absent.
    pub(crate) fn set_add(&self, key: Key, member: Value) -> bool {
        match &mut *self.write() {
            ObjData::Set(members) => members.insert(key, member).is_none(),
            _ => panic!("set operation on non-set object"),
        }
    }

    pub(crate) fn set_remove(&self, key: &Key) -> bool {
        match &mut *self.write() {
            ObjData::Set(members) => members.shift_remove(key).is_some(),
            _ => panic!("set operation on non-set object"),
        }
    }

    pub(crate) fn set_len(&self) -> usize {
        match &*self.read() {
            ObjData::Set(members) => members.len(),
            _ => panic!("set operation on non-set object"),
        }
    }

    pub(crate) fn set_snapshot(&self) -> Vec<Value> {
        match &*self.read() {
            ObjData::Set(members) => members.values().cloned().collect(),
            _ => panic!("set operation on non-set object"),
        }
    }

    /// Empty a map or set container; returns `true` if it held entries.
    pub(crate) fn container_clear(&self) -> bool {
        match &mut *self.write() {
            ObjData::Map(entries) => {
                let had = !entries.is_empty();
                entries.clear();
                had
            }
            ObjData::Set(members) => {
                let had = !members.is_empty();
                members.clear();
                had
            }
            _ => panic!("clear operation on non-container object"),
        }
    }

    // ------------------------------------------------------------------
    // Weak container operations
    // ------------------------------------------------------------------

    pub(crate) fn weak_map_get(&self, key: &Arc<Obj>) -> Option<Value> {
        match &*self.read() {
            ObjData::WeakMap(entries) => entries
                .get(&key.id())
                .filter(|e| e.key.upgrade().is_some())
                .map(|e| e.value.clone()),
            _ => panic!("weak-map operation on non-weak-map object"),
        }
    }

    pub(crate) fn weak_map_has(&self, key: &Arc<Obj>) -> bool {
        match &*self.read() {
            ObjData::WeakMap(entries) => entries
                .get(&key.id())
                .is_some_and(|e| e.key.upgrade().is_some()),
            _ => panic!("weak-map operation on non-weak-map object"),
        }
    }

    /// Store an entry; returns the previous value if the key was present.
    pub(crate) fn weak_map_set(&self, key: &Arc<Obj>, value: Value) -> Option<Value> {
        match &mut *self.write() {
            ObjData::WeakMap(entries) => entries
                .insert(
                    key.id(),
                    WeakMapEntry {
                        key: Arc::downgrade(key),
                        value,
                    },
                )
                .filter(|e| e.key.upgrade().is_some())
                .map(|e| e.value),
            _ => panic!("weak-map operation on non-weak-map object"),
        }
    }

    pub(crate) fn weak_map_remove(&self, key: &Arc<Obj>) -> bool {
        match &mut *self.write() {
            ObjData::WeakMap(entries) => entries
                .remove(&key.id())
                .is_some_and(|e| e.key.upgrade().is_some()),
            _ => panic!("weak-map operation on non-weak-map object"),
        }
    }

    pub(crate) fn weak_set_has(&self, member: &Arc<Obj>) -> bool {
        match &*self.read() {
            ObjData::WeakSet(members) => members
                .get(&member.id())
                .is_some_and(|m| m.upgrade().is_some()),
            _ => panic!("weak-set operation on non-weak-set object"),
        }
    }

    /// Insert a member; returns `true` if it was absent.
    pub(crate) fn weak_set_add(&self, member: &Arc<Obj>) -> bool {
        match &mut *self.write() {
            ObjData::WeakSet(members) => members
                .insert(member.id(), Arc::downgrade(member))
                .is_none(),
            _ => panic!("weak-set operation on non-weak-set object"),
        }
    }

    pub(crate) fn weak_set_remove(&self, member: &Arc<Obj>) -> bool {
        match &mut *self.write() {
            ObjData::WeakSet(members) => members
                .remove(&member.id())
                .is_some_and(|m| m.upgrade().is_some()),
            _ => panic!("weak-set operation on non-weak-set object"),
        }
    }
}

impl Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Obj")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .finish()
    }
}
