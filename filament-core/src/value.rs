//! Dynamic Value Model
//!
//! Reactive views intercept reads and writes on plain keyed data. This module
//! defines that data: a dynamic `Value` tree whose branch nodes (`Obj`) are
//! shared, identity-carrying handles over a record or a sequence.
//!
//! # Identity
//!
//! Every `Obj` gets a unique monotonic id at creation. Equality and hashing
//! are by id, so two handles compare equal exactly when they refer to the
//! same underlying data. The subscription store keys its dependency edges by
//! this id and never holds the handle itself; when the last handle drops,
//! the store entry for that id is evicted.
//!
//! # Change comparison
//!
//! `PartialEq` on `Value` keeps IEEE semantics (`NaN != NaN`). Write traps
//! instead use [`Value::same`], which treats two NaN values as identical, so
//! overwriting NaN with NaN does not count as a change while every genuine
//! change does.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::reactive::store;
use crate::reactive::View;

/// Counter for generating unique object ids.
///
/// Synthetic sources (computed values) draw from the same counter, so an id
/// names exactly one dependency source of any kind.
static OBJ_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a reactive source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(u64);

impl ObjId {
    /// Generate a new unique object id.
    pub(crate) fn new() -> Self {
        Self(OBJ_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Error for fallible `Value` conversions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The value was not of the requested kind.
    #[error("expected {expected}, found {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
}

/// A dynamic value: the unit of data flowing through reactive views.
///
/// Scalar variants are plain data. `Obj` is a raw handle to a shared record
/// or sequence; `View` is the same handle seen through reactive
/// interception. Deep views hand out nested objects as `View` values so
/// reads stay tracked all the way down.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Obj(Obj),
    View(View),
}

impl Value {
    /// Name of this value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Num(_) => "num",
            Value::Str(_) => "str",
            Value::Obj(_) => "obj",
            Value::View(_) => "view",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The underlying source object, if this value carries one.
    ///
    /// Both the raw handle and any view over it resolve to the same source.
    pub fn source(&self) -> Option<Obj> {
        match self {
            Value::Obj(o) => Some(o.clone()),
            Value::View(v) => Some(v.raw()),
            _ => None,
        }
    }

    /// Whether this value is a boxed cell (or a view over one).
    pub fn is_boxed(&self) -> bool {
        self.source().is_some_and(|o| o.is_boxed())
    }

    /// Identity-style comparison used for change detection on writes.
    ///
    /// Matches `PartialEq` except that two NaN values count as the same, so
    /// a NaN-over-NaN write is not reported as a change.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    pub fn try_num(&self) -> Result<f64, ValueError> {
        match self {
            Value::Num(n) => Ok(*n),
            other => Err(ValueError::WrongKind {
                expected: "num",
                found: other.kind(),
            }),
        }
    }

    pub fn try_bool(&self) -> Result<bool, ValueError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(ValueError::WrongKind {
                expected: "bool",
                found: other.kind(),
            }),
        }
    }

    pub fn try_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(ValueError::WrongKind {
                expected: "str",
                found: other.kind(),
            }),
        }
    }

    pub fn try_source(&self) -> Result<Obj, ValueError> {
        self.source().ok_or(ValueError::WrongKind {
            expected: "obj",
            found: self.kind(),
        })
    }

    /// Build a value tree from JSON. Objects become records, arrays become
    /// sequences; each branch node gets a fresh identity.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Obj(Obj::sequence_from(items.iter().map(Value::from_json)))
            }
            serde_json::Value::Object(map) => Value::Obj(Obj::record_from(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
            )),
        }
    }

    /// Snapshot this value tree as JSON, reading raw data without recording
    /// any dependency edges. Views serialize as their underlying source;
    /// boxed field accessors serialize as the field's current value.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Obj(o) => o.to_json(),
            Value::View(v) => v.raw().to_json(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => a == b,
            (Value::View(a), Value::View(b)) => a == b,
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
        Value::Num(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Num(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Num(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Obj> for Value {
    fn from(o: Obj) -> Self {
        Value::Obj(o)
    }
}

impl From<View> for Value {
    fn from(v: View) -> Self {
        Value::View(v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Access key into a record or sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Named field of a record.
    Prop(String),
    /// Position in a sequence.
    Index(usize),
}

impl From<&str> for Key {
    fn from(k: &str) -> Self {
        Key::Prop(k.to_owned())
    }
}

impl From<String> for Key {
    fn from(k: String) -> Self {
        Key::Prop(k)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

/// Backing data of a source object.
pub(crate) enum RawData {
    /// Ordered string-keyed record.
    Record(IndexMap<String, Value>),
    /// Ordered sequence.
    Sequence(Vec<Value>),
    /// Accessor pair proxying one field of another view: reads and writes of
    /// the `value` key delegate to `target[key]` through the view machinery.
    Field { target: View, key: String },
}

pub(crate) struct ObjInner {
    id: ObjId,
    /// Discriminant flag for boxed cells. Carried out of band so it never
    /// shows up in key enumeration.
    boxed: bool,
    data: RwLock<RawData>,
}

impl Drop for ObjInner {
    fn drop(&mut self) {
        // Last handle is gone; the store must not keep edges for this id.
        store::drop_source(self.id);
    }
}

/// Shared handle to one source object (a record or a sequence).
///
/// Cloning shares the underlying data; equality is identity (same id).
/// The caller owns the data shape; the reactive layer only wraps it.
#[derive(Clone)]
pub struct Obj {
    inner: Arc<ObjInner>,
}

impl Obj {
    fn with_data(data: RawData, boxed: bool) -> Self {
        Self {
            inner: Arc::new(ObjInner {
                id: ObjId::new(),
                boxed,
                data: RwLock::new(data),
            }),
        }
    }

    /// Create an empty record.
    pub fn record() -> Self {
        Self::with_data(RawData::Record(IndexMap::new()), false)
    }

    /// Create an empty sequence.
    pub fn sequence() -> Self {
        Self::with_data(RawData::Sequence(Vec::new()), false)
    }

    /// Create a record from `(key, value)` entries, preserving order.
    pub fn record_from<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::with_data(
            RawData::Record(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            false,
        )
    }

    /// Create a sequence from values.
    pub fn sequence_from<V, I>(items: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Self::with_data(
            RawData::Sequence(items.into_iter().map(Into::into).collect()),
            false,
        )
    }

    /// One-key record backing a boxed cell.
    pub(crate) fn boxed_record(value: Value) -> Self {
        let mut map = IndexMap::new();
        map.insert("value".to_owned(), value);
        Self::with_data(RawData::Record(map), true)
    }

    /// Accessor object backing a boxed field.
    pub(crate) fn boxed_field(target: View, key: String) -> Self {
        Self::with_data(RawData::Field { target, key }, true)
    }

    /// This object's unique id.
    pub fn id(&self) -> ObjId {
        self.inner.id
    }

    /// Whether this object carries the boxed-cell discriminant.
    pub fn is_boxed(&self) -> bool {
        self.inner.boxed
    }

    pub(crate) fn data(&self) -> &RwLock<RawData> {
        &self.inner.data
    }

    /// Read a key directly from the backing data, recording no edges.
    pub(crate) fn raw_get(&self, key: &Key) -> Value {
        let data = self.inner.data.read();
        match (&*data, key) {
            (RawData::Record(map), Key::Prop(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (RawData::Sequence(items), Key::Index(i)) => {
                items.get(*i).cloned().unwrap_or(Value::Null)
            }
            (RawData::Field { target, key: fk }, Key::Prop(k)) if k == "value" => {
                target.raw().raw_get(&Key::Prop(fk.clone()))
            }
            _ => Value::Null,
        }
    }

    /// Snapshot the backing data as JSON without recording edges.
    pub fn to_json(&self) -> serde_json::Value {
        let data = self.inner.data.read();
        match &*data {
            RawData::Record(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            RawData::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            RawData::Field { target, key } => {
                target.raw().raw_get(&Key::Prop(key.clone())).to_json()
            }
        }
    }
}

impl PartialEq for Obj {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Obj {}

impl std::hash::Hash for Obj {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl Debug for Obj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // try_read: Debug must not block on a held write lock
        let kind = match self.inner.data.try_read().as_deref() {
            Some(RawData::Record(_)) => "record",
            Some(RawData::Sequence(_)) => "sequence",
            Some(RawData::Field { .. }) => "field",
            None => "<locked>",
        };
        f.debug_struct("Obj")
            .field("id", &self.inner.id)
            .field("kind", &kind)
            .field("boxed", &self.inner.boxed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn obj_ids_are_unique() {
        let a = Obj::record();
        let b = Obj::record();
        let c = Obj::sequence();

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn obj_equality_is_identity() {
        let a = Obj::record_from([("x", 1)]);
        let b = Obj::record_from([("x", 1)]);
        let a2 = a.clone();

        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    #[test]
    fn same_treats_nan_as_unchanged() {
        let nan = Value::Num(f64::NAN);
        let other_nan = Value::Num(f64::NAN);

        // IEEE equality stays intact
        assert_ne!(nan, other_nan);
        // change detection does not
        assert!(nan.same(&other_nan));
        assert!(!Value::Num(1.0).same(&Value::Num(2.0)));
        assert!(Value::Num(1.0).same(&Value::Num(1.0)));
        assert!(!nan.same(&Value::Num(1.0)));
    }

    #[test]
    fn json_round_trip() {
        let json = json!({
            "name": "widget",
            "tags": ["a", "b"],
            "size": 3.5,
            "visible": true,
            "parent": null,
        });

        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn try_conversions_report_kind() {
        let v = Value::Str("hello".into());
        assert_eq!(v.try_str().unwrap(), "hello");

        let err = v.try_num().unwrap_err();
        assert_eq!(
            err,
            ValueError::WrongKind {
                expected: "num",
                found: "str"
            }
        );
    }

    #[test]
    fn raw_get_reads_records_and_sequences() {
        let rec = Obj::record_from([("a", 1), ("b", 2)]);
        assert_eq!(rec.raw_get(&Key::Prop("a".into())), Value::Num(1.0));
        assert_eq!(rec.raw_get(&Key::Prop("missing".into())), Value::Null);

        let seq = Obj::sequence_from([10, 20]);
        assert_eq!(seq.raw_get(&Key::Index(1)), Value::Num(20.0));
        assert_eq!(seq.raw_get(&Key::Index(9)), Value::Null);
    }

    #[test]
    fn value_from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(2i64), Value::Num(2.0));
        assert_eq!(Value::from("s"), Value::Str("s".into()));
        assert!(Value::default().is_null());
    }
}
