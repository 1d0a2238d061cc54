//! Computed Values
//!
//! A computed value is a cached derivation over reactive state. It is built
//! from a lazy reaction whose scheduler, instead of recomputing, flips a
//! dirty flag and notifies the computed's own synthetic dependency edge.
//! The getter re-runs only when someone reads the computed while dirty.
//!
//! This splits the dependency graph in two levels: the computed depends on
//! its sources, and readers of the computed depend on its synthetic edge.
//! The dirty flag decouples the levels, so a chain of computeds recomputes
//! at most once per invalidation no matter how many invalidations pile up
//! between reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::reaction::{Reaction, RunOptions};
use super::store::{self, DepKey, TriggerOp};
use crate::value::{ObjId, Value};

struct ComputedInner {
    /// Synthetic source id the computed publishes its own edge under.
    id: ObjId,
    reaction: Reaction,
    cached: RwLock<Value>,
    dirty: AtomicBool,
}

impl Drop for ComputedInner {
    fn drop(&mut self) {
        store::drop_source(self.id);
    }
}

/// A lazily-recomputed derived value.
///
/// Cloning shares the cache and the underlying reaction.
#[derive(Clone)]
pub struct Computed {
    inner: Arc<ComputedInner>,
}

/// Create a computed value over `getter`.
///
/// The getter does not run until the first read.
pub fn computed<F>(getter: F) -> Computed
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    let id = ObjId::new();

    let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner>| {
        let weak = weak.clone();
        let scheduler = Arc::new(move |_: &Reaction| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // First invalidation marks dirty and tells readers; further
            // invalidations before the next read change nothing.
            if !inner.dirty.swap(true, Ordering::SeqCst) {
                store::trigger(inner.id, TriggerOp::Set(DepKey::Value));
            }
        });

        ComputedInner {
            id,
            reaction: Reaction::with_options(
                getter,
                RunOptions {
                    lazy: true,
                    scheduler: Some(scheduler),
                },
            ),
            cached: RwLock::new(Value::Null),
            dirty: AtomicBool::new(true),
        }
    });

    Computed { inner }
}

impl Computed {
    /// Current value, recomputing first if a dependency changed.
    ///
    /// The read registers an edge on the computed's synthetic key, so a
    /// reaction reading a computed is invalidated like any other dependent.
    pub fn get(&self) -> Value {
        if self.inner.dirty.load(Ordering::SeqCst) {
            let value = self.inner.reaction.run();
            *self.inner.cached.write() = value;
            self.inner.dirty.store(false, Ordering::SeqCst);
        }

        store::track(self.inner.id, DepKey::Value);
        self.inner.cached.read().clone()
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::view::make_view;
    use crate::value::Obj;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn computed_is_lazy() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let derived = computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Value::Num(42.0)
        });

        assert!(derived.is_dirty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(derived.get(), Value::Num(42.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!derived.is_dirty());
    }

    #[test]
    fn repeated_reads_hit_the_cache() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let derived = computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Value::Num(7.0)
        });

        derived.get();
        derived.get();
        derived.get();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidation_marks_dirty_without_recompute() {
        let state = make_view(Obj::record_from([("n", 1)]));
        let calls = Arc::new(AtomicI32::new(0));

        let calls_clone = calls.clone();
        let state_clone = state.clone();
        let doubled = computed(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Value::Num(state_clone.get("n").try_num().unwrap_or(0.0) * 2.0)
        });

        assert_eq!(doubled.get(), Value::Num(2.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // several invalidations, zero recomputes
        state.set("n", 2);
        state.set("n", 3);
        state.set("n", 4);
        assert!(doubled.is_dirty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // one read, one recompute, final state
        assert_eq!(doubled.get(), Value::Num(8.0));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readers_of_a_computed_are_invalidated() {
        let state = make_view(Obj::record_from([("n", 1)]));

        let state_clone = state.clone();
        let doubled = computed(move || {
            Value::Num(state_clone.get("n").try_num().unwrap_or(0.0) * 2.0)
        });

        let hits = Arc::new(AtomicI32::new(0));
        let hits_clone = hits.clone();
        let doubled_clone = doubled.clone();
        let _reader = Reaction::with_options(
            move || doubled_clone.get(),
            RunOptions {
                lazy: false,
                scheduler: Some(Arc::new(move |_: &Reaction| {
                    hits_clone.fetch_add(1, Ordering::SeqCst);
                })),
            },
        );

        state.set("n", 5);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_chains_recompute_once_per_read() {
        let state = make_view(Obj::record_from([("n", 1)]));

        let state_clone = state.clone();
        let doubled = computed(move || {
            Value::Num(state_clone.get("n").try_num().unwrap_or(0.0) * 2.0)
        });

        let tail_calls = Arc::new(AtomicI32::new(0));
        let tail_calls_clone = tail_calls.clone();
        let doubled_clone = doubled.clone();
        let plus_one = computed(move || {
            tail_calls_clone.fetch_add(1, Ordering::SeqCst);
            Value::Num(doubled_clone.get().try_num().unwrap_or(0.0) + 1.0)
        });

        assert_eq!(plus_one.get(), Value::Num(3.0));
        assert_eq!(tail_calls.load(Ordering::SeqCst), 1);

        state.set("n", 2);
        state.set("n", 3);

        assert_eq!(plus_one.get(), Value::Num(7.0));
        assert_eq!(tail_calls.load(Ordering::SeqCst), 2);
    }
}
