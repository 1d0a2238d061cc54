//! Boxed Values
//!
//! A boxed value is a single mutable cell pushed through the view
//! machinery: a one-key record holding `value`, marked with an out-of-band
//! discriminant flag. Reads and writes of `.value` track and trigger like
//! any record key.
//!
//! [`to_boxed_field`] produces an accessor object for one field of an
//! existing view, so destructured fields stay live-linked to their source.
//! [`unwrap_boxed`] wraps a view so consuming code can use plain key access
//! without checking the discriminant itself.

use super::context;
use super::view::{make_view, View};
use crate::value::{Key, Obj, Value};

/// Wrap a single value as a reactive cell; access it through the `value`
/// key of the returned view.
pub fn boxed(value: impl Into<Value>) -> View {
    make_view(Obj::boxed_record(value.into()))
}

/// Live accessor for one field of `view`: reading or writing the returned
/// cell's `value` key reads or writes `view[key]`.
pub fn to_boxed_field(view: &View, key: impl Into<String>) -> View {
    make_view(Obj::boxed_field(view.clone(), key.into()))
}

/// A plain record mapping every key of `view` to a boxed field accessor.
///
/// Destructuring state into standalone cells goes through this: each entry
/// stays linked to the original source.
pub fn to_boxed_fields(view: &View) -> Obj {
    let fields: Vec<(String, Value)> = view
        .keys()
        .into_iter()
        .filter_map(|key| match key {
            Key::Prop(name) => {
                let field = to_boxed_field(view, name.clone());
                Some((name, Value::View(field)))
            }
            Key::Index(_) => None,
        })
        .collect();
    Obj::record_from(fields)
}

/// View wrapper that dereferences boxed fields automatically.
#[derive(Clone, Debug)]
pub struct UnwrappedView {
    inner: View,
}

/// Wrap `view` so boxed fields read and write as plain values.
pub fn unwrap_boxed(view: View) -> UnwrappedView {
    UnwrappedView { inner: view }
}

impl UnwrappedView {
    pub fn raw(&self) -> View {
        self.inner.clone()
    }

    /// Read a key, dereferencing a boxed field to its `value`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let value = self.inner.get(key);
        match boxed_view_of(&value) {
            Some(cell) => cell.get("value"),
            None => value,
        }
    }

    /// Write a key. A boxed field receives the write on its `value` unless
    /// the new value is itself boxed, which replaces the field wholesale.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let value = value.into();

        let current = {
            let _pause = context::pause_tracking();
            self.inner.get(key.clone())
        };
        match boxed_view_of(&current) {
            Some(cell) if !value.is_boxed() => cell.set("value", value),
            _ => self.inner.set(key, value),
        }
    }
}

/// A mutable view over the boxed cell inside `value`, if there is one.
fn boxed_view_of(value: &Value) -> Option<View> {
    match value {
        Value::View(view) if view.raw().is_boxed() => Some(view.clone()),
        Value::Obj(obj) if obj.is_boxed() => Some(make_view(obj.clone())),
        _ => None,
    }
}
