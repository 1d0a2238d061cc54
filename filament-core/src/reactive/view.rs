//! Reactive Views
//!
//! A view is the interception layer over one source object: every read
//! records a dependency edge for the running reaction, every write resolves
//! its dependents and hands them to the scheduler. Views come in four
//! variants (deep or shallow, mutable or read-only) sharing one dispatch
//! surface: `get`, `set`, `has`, `delete`, and key enumeration.
//!
//! Deep views wrap nested objects lazily: a child is wrapped only when it is
//! actually read, and the wrapper inherits the parent's flags. Shallow views
//! hand nested values back raw. Read-only views never record edges and turn
//! writes into warnings.
//!
//! # Identity
//!
//! A view is a value handle: equality is (source id, variant flags), so
//! wrapping the same source twice yields equal views, while the read-only or
//! shallow view of a source is distinct from its deep mutable view. The raw
//! source is always reachable through the [`View::raw`] escape hatch, which
//! records no edges.

use smallvec::SmallVec;

use super::context;
use super::store::{self, DepKey, TriggerOp};
use crate::value::{Key, Obj, RawData, Value};

/// Intercepting view over one source object.
#[derive(Clone, Debug, PartialEq)]
pub struct View {
    source: Obj,
    readonly: bool,
    shallow: bool,
}

/// Deep mutable view: reads track, writes notify, nested objects wrap.
pub fn make_view(source: Obj) -> View {
    View {
        source,
        readonly: false,
        shallow: false,
    }
}

/// Shallow mutable view: only root-level keys are reactive; nested values
/// come back raw.
pub fn make_shallow_view(source: Obj) -> View {
    View {
        source,
        readonly: false,
        shallow: true,
    }
}

/// Deep read-only view: reads are untracked, writes warn and do nothing.
pub fn make_readonly_view(source: Obj) -> View {
    View {
        source,
        readonly: true,
        shallow: false,
    }
}

/// Shallow read-only view.
pub fn make_shallow_readonly_view(source: Obj) -> View {
    View {
        source,
        readonly: true,
        shallow: true,
    }
}

impl View {
    /// Escape hatch: the raw source object. Never records an edge.
    pub fn raw(&self) -> Obj {
        self.source.clone()
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    pub fn is_record(&self) -> bool {
        matches!(&*self.source.data().read(), RawData::Record(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(&*self.source.data().read(), RawData::Sequence(_))
    }

    fn track(&self, key: DepKey) {
        if !self.readonly {
            store::track(self.source.id(), key);
        }
    }

    /// Wrap a nested value according to this view's depth.
    fn wrap(&self, value: Value) -> Value {
        if self.shallow {
            return value;
        }
        match value {
            Value::Obj(child) => Value::View(View {
                source: child,
                readonly: self.readonly,
                shallow: false,
            }),
            other => other,
        }
    }

    /// Normalize a value for storage. Deep views store raw sources, so a
    /// view assigned into a deep view is unwrapped first.
    fn store_value(&self, value: Value) -> Value {
        if self.shallow {
            return value;
        }
        match value {
            Value::View(view) => Value::Obj(view.raw()),
            other => other,
        }
    }

    fn raw_len(&self) -> usize {
        match &*self.source.data().read() {
            RawData::Sequence(items) => items.len(),
            _ => 0,
        }
    }

    /// Read a key. Missing keys read as `Null`; the read is tracked either
    /// way, so a reaction that saw "missing" re-runs when the key appears.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();

        // Boxed field accessors delegate to their target view.
        let delegate = {
            let data = self.source.data().read();
            match (&*data, &key) {
                (RawData::Field { target, key: field }, Key::Prop(k)) if k == "value" => {
                    Some((target.clone(), field.clone()))
                }
                _ => None,
            }
        };
        if let Some((target, field)) = delegate {
            return target.get(field);
        }

        let value = {
            let data = self.source.data().read();
            match (&*data, &key) {
                (RawData::Record(map), Key::Prop(k)) => {
                    self.track(DepKey::Prop(k.clone()));
                    Some(map.get(k).cloned().unwrap_or(Value::Null))
                }
                (RawData::Sequence(items), Key::Index(i)) => {
                    self.track(DepKey::Index(*i));
                    Some(items.get(*i).cloned().unwrap_or(Value::Null))
                }
                _ => None,
            }
        };

        match value {
            Some(value) => self.wrap(value),
            None => Value::Null,
        }
    }

    /// Sequence element read; `get` with an index key.
    pub fn at(&self, index: usize) -> Value {
        self.get(Key::Index(index))
    }

    /// Membership test; tracked like a read.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        let data = self.source.data().read();
        match (&*data, &key) {
            (RawData::Record(map), Key::Prop(k)) => {
                self.track(DepKey::Prop(k.clone()));
                map.contains_key(k)
            }
            (RawData::Sequence(items), Key::Index(i)) => {
                self.track(DepKey::Index(*i));
                *i < items.len()
            }
            (RawData::Field { .. }, Key::Prop(k)) => k == "value",
            _ => false,
        }
    }

    /// Enumerate keys. Records depend on the reserved iteration key (their
    /// key-set shape); sequences depend on their length, which is the same
    /// thing for ordered data.
    pub fn keys(&self) -> Vec<Key> {
        let data = self.source.data().read();
        match &*data {
            RawData::Record(map) => {
                self.track(DepKey::Iterate);
                map.keys().map(|k| Key::Prop(k.clone())).collect()
            }
            RawData::Sequence(items) => {
                self.track(DepKey::Length);
                (0..items.len()).map(Key::Index).collect()
            }
            RawData::Field { .. } => vec![Key::Prop("value".to_owned())],
        }
    }

    /// Sequence length (tracked); record key count (tracked as iteration).
    pub fn len(&self) -> usize {
        let data = self.source.data().read();
        match &*data {
            RawData::Sequence(items) => {
                self.track(DepKey::Length);
                items.len()
            }
            RawData::Record(map) => {
                self.track(DepKey::Iterate);
                map.len()
            }
            RawData::Field { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a key. Returns false (after a warning) on read-only views.
    ///
    /// A write to an existing key only notifies when the value actually
    /// changed ([`Value::same`], so NaN-over-NaN stays quiet); a write that
    /// creates a key additionally notifies enumeration dependents.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.readonly {
            tracing::warn!(?key, "write on read-only view ignored");
            return false;
        }
        let value = self.store_value(value.into());

        enum Outcome {
            Done(Option<TriggerOp>),
            Delegate(View, String, Value),
            Rejected,
        }

        let outcome = {
            let mut data = self.source.data().write();
            match (&mut *data, key) {
                (RawData::Record(map), Key::Prop(k)) => match map.get(&k) {
                    Some(old) => {
                        let changed = !old.same(&value);
                        map.insert(k.clone(), value);
                        Outcome::Done(changed.then(|| TriggerOp::Set(DepKey::Prop(k))))
                    }
                    None => {
                        map.insert(k.clone(), value);
                        Outcome::Done(Some(TriggerOp::Add(DepKey::Prop(k))))
                    }
                },
                (RawData::Sequence(items), Key::Index(i)) => {
                    if i < items.len() {
                        let changed = !items[i].same(&value);
                        items[i] = value;
                        Outcome::Done(changed.then(|| TriggerOp::Set(DepKey::Index(i))))
                    } else {
                        // writing past the end pads with Null holes
                        items.resize(i, Value::Null);
                        items.push(value);
                        Outcome::Done(Some(TriggerOp::Add(DepKey::Index(i))))
                    }
                }
                (RawData::Field { target, key: field }, Key::Prop(k)) if k == "value" => {
                    Outcome::Delegate(target.clone(), field.clone(), value)
                }
                (_, key) => {
                    tracing::warn!(?key, "write with mismatched key kind ignored");
                    Outcome::Rejected
                }
            }
        };

        match outcome {
            Outcome::Done(Some(op)) => {
                store::trigger(self.source.id(), op);
                true
            }
            Outcome::Done(None) => true,
            Outcome::Delegate(target, field, value) => target.set(field, value),
            Outcome::Rejected => false,
        }
    }

    /// Sequence element write; `set` with an index key.
    pub fn set_at(&self, index: usize, value: impl Into<Value>) -> bool {
        self.set(Key::Index(index), value)
    }

    /// Explicit length write. Shrinking truncates and invalidates every
    /// dependent of a removed index; growing pads with `Null`.
    pub fn set_len(&self, new_len: usize) -> bool {
        if self.readonly {
            tracing::warn!(new_len, "length write on read-only view ignored");
            return false;
        }

        let op = {
            let mut data = self.source.data().write();
            match &mut *data {
                RawData::Sequence(items) => {
                    let old_len = items.len();
                    if new_len == old_len {
                        None
                    } else if new_len < old_len {
                        items.truncate(new_len);
                        Some(TriggerOp::Truncate(new_len))
                    } else {
                        items.resize(new_len, Value::Null);
                        Some(TriggerOp::Set(DepKey::Length))
                    }
                }
                _ => {
                    tracing::warn!("length write on non-sequence ignored");
                    return false;
                }
            }
        };

        if let Some(op) = op {
            store::trigger(self.source.id(), op);
        }
        true
    }

    /// Remove a key. Notifies only if the key existed. On sequences the slot
    /// becomes a `Null` hole and the length is unchanged.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.readonly {
            tracing::warn!(?key, "delete on read-only view ignored");
            return false;
        }

        let op = {
            let mut data = self.source.data().write();
            match (&mut *data, key) {
                (RawData::Record(map), Key::Prop(k)) => map
                    .shift_remove(&k)
                    .map(|_| TriggerOp::Delete(DepKey::Prop(k))),
                (RawData::Sequence(items), Key::Index(i)) => {
                    if i < items.len() && !items[i].is_null() {
                        items[i] = Value::Null;
                        Some(TriggerOp::Delete(DepKey::Index(i)))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };

        match op {
            Some(op) => {
                store::trigger(self.source.id(), op);
                true
            }
            None => false,
        }
    }

    /// Append to a sequence; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let len = self.raw_len();
        self.splice(len, 0, vec![value.into()]);
        self.raw_len()
    }

    /// Remove and return the last element (`Null` when empty).
    pub fn pop(&self) -> Value {
        let len = self.raw_len();
        if len == 0 {
            return Value::Null;
        }
        self.splice(len - 1, 1, Vec::new())
            .pop()
            .unwrap_or(Value::Null)
    }

    /// Insert at a position, shifting later elements.
    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.splice(index, 0, vec![value.into()]);
    }

    /// Remove at a position, shifting later elements; returns the removed
    /// element (`Null` when out of range).
    pub fn remove(&self, index: usize) -> Value {
        self.splice(index, 1, Vec::new()).pop().unwrap_or(Value::Null)
    }

    /// Replace `delete_count` elements at `start` with `new_items`; returns
    /// the removed elements.
    ///
    /// The raw edit runs with tracking paused: a mutating operation must not
    /// record edges for its internal reads, only emit its semantic writes.
    /// Afterwards each affected index is notified as changed, added, or
    /// removed; length dependents are notified exactly when the shape
    /// changed.
    pub fn splice(&self, start: usize, delete_count: usize, new_items: Vec<Value>) -> Vec<Value> {
        if self.readonly {
            tracing::warn!(start, delete_count, "splice on read-only view ignored");
            return Vec::new();
        }
        let new_items: Vec<Value> = new_items
            .into_iter()
            .map(|v| self.store_value(v))
            .collect();

        let mut ops: SmallVec<[TriggerOp; 4]> = SmallVec::new();
        let removed = {
            let _pause = context::pause_tracking();
            let mut data = self.source.data().write();
            let RawData::Sequence(items) = &mut *data else {
                tracing::warn!("splice on non-sequence ignored");
                return Vec::new();
            };

            let start = start.min(items.len());
            let delete_count = delete_count.min(items.len() - start);

            let old_tail: Vec<Value> = items[start..].to_vec();
            let removed: Vec<Value> = items
                .splice(start..start + delete_count, new_items)
                .collect();

            let old_len = start + old_tail.len();
            let new_len = items.len();

            for i in start..new_len.min(old_len) {
                if !old_tail[i - start].same(&items[i]) {
                    ops.push(TriggerOp::Set(DepKey::Index(i)));
                }
            }
            for i in old_len..new_len {
                // Add already propagates to length dependents
                ops.push(TriggerOp::Add(DepKey::Index(i)));
            }
            for i in new_len..old_len {
                ops.push(TriggerOp::Delete(DepKey::Index(i)));
            }
            if new_len < old_len {
                ops.push(TriggerOp::Set(DepKey::Length));
            }

            removed
        };

        for op in ops {
            store::trigger(self.source.id(), op);
        }
        removed
    }

    /// Position of `needle` in a sequence.
    ///
    /// Searches the wrapped elements first (a tracked read of each index and
    /// the length), then falls back to comparing raw sources, so a wrapped
    /// nested view is found in its own backing sequence regardless of which
    /// side is wrapped.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        let len = self.len();
        for i in 0..len {
            if self.get(Key::Index(i)) == *needle {
                return Some(i);
            }
        }

        let needle_source = needle.source()?;
        let data = self.source.data().read();
        if let RawData::Sequence(items) = &*data {
            for (i, item) in items.iter().enumerate() {
                if item.source().is_some_and(|s| s == needle_source) {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Membership by value; tracked like [`View::index_of`].
    pub fn contains(&self, needle: &Value) -> bool {
        self.index_of(needle).is_some()
    }
}
