//! Subscription Store
//!
//! The store is the persistent dependency graph: it maps `(source id, key)`
//! pairs to the set of reactions that read them, and resolves a write into
//! the set of reactions that are now stale.
//!
//! # How It Works
//!
//! 1. When a view key is read inside a running reaction, [`track`] records
//!    the edge in both directions: into the store's per-source key map, and
//!    into the reaction's own edge list (so the reaction can unlink itself
//!    before its next run).
//!
//! 2. When a view key is written, [`trigger`] collects the stale set
//!    according to the change kind, snapshots it, and dispatches each
//!    reaction through its scheduler or the default job queue.
//!
//! # Ownership
//!
//! Entries are keyed by source id, and the reaction registry holds weak
//! references, so the store keeps neither sources nor reactions alive.
//! Sources evict their entry from `Drop`; dead reactions simply fail to
//! upgrade at dispatch time and are skipped.

use std::collections::HashMap;
use std::sync::{OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexSet;
use smallvec::SmallVec;

use super::context;
use super::reaction::{self, ReactionId, ReactionInner};
use crate::value::ObjId;

/// Dependency key within one source object.
///
/// `Prop` and `Index` are ordinary keys. `Length` is the sequence length,
/// which also stands in for sequence enumeration. `Iterate` is the reserved
/// key for record enumeration ("depends on this record's key set").
/// `Value` is the synthetic key of a derived cell (computed values publish
/// their own dependency edge under it).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    Prop(String),
    Index(usize),
    Length,
    Iterate,
    Value,
}

/// What a write did to its key.
#[derive(Debug)]
pub(crate) enum TriggerOp {
    /// Existing key's value changed: dependents of the key itself.
    Set(DepKey),
    /// New key appeared: dependents of the key, plus enumeration dependents
    /// (and length dependents when the key is a sequence index, since
    /// appending implicitly grows the sequence).
    Add(DepKey),
    /// Key removed: dependents of the key plus enumeration dependents. A
    /// deleted sequence slot becomes a hole; the length is unchanged.
    Delete(DepKey),
    /// Explicit length write that shrank a sequence: length dependents plus
    /// every index at or past the new length.
    Truncate(usize),
}

type KeyDeps = HashMap<DepKey, IndexSet<ReactionId>>;

static DEPS: OnceLock<DashMap<ObjId, KeyDeps>> = OnceLock::new();
static REGISTRY: OnceLock<DashMap<ReactionId, Weak<ReactionInner>>> = OnceLock::new();

fn deps() -> &'static DashMap<ObjId, KeyDeps> {
    DEPS.get_or_init(DashMap::new)
}

fn registry() -> &'static DashMap<ReactionId, Weak<ReactionInner>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// Register a reaction so trigger dispatch can reach it.
///
/// The registry holds only a weak reference; callers keep ownership.
pub(crate) fn register_reaction(reaction: &std::sync::Arc<ReactionInner>) {
    registry().insert(reaction.id(), std::sync::Arc::downgrade(reaction));
}

/// Remove a reaction from the registry.
pub(crate) fn unregister_reaction(id: ReactionId) {
    registry().remove(&id);
}

/// Record that the currently-active reaction read `(source, key)`.
///
/// No-op when no reaction is running or tracking is paused.
pub(crate) fn track(source: ObjId, key: DepKey) {
    let Some(reaction) = context::current() else {
        return;
    };

    let newly_inserted = {
        let mut key_deps = deps().entry(source).or_default();
        key_deps
            .entry(key.clone())
            .or_default()
            .insert(reaction.id())
    };

    // Reverse edge, recorded once per (source, key) per run.
    if newly_inserted {
        tracing::trace!(?source, ?key, reaction = ?reaction.id(), "track");
        reaction.record_edge(source, key);
    }
}

/// Unlink one edge; called by reactions cleaning up before a re-run.
pub(crate) fn untrack(source: ObjId, key: &DepKey, reaction: ReactionId) {
    if let Some(mut key_deps) = deps().get_mut(&source) {
        if let Some(set) = key_deps.get_mut(key) {
            set.shift_remove(&reaction);
            if set.is_empty() {
                key_deps.remove(key);
            }
        }
    }
}

/// Drop every edge for a source; called when the source itself goes away.
pub(crate) fn drop_source(source: ObjId) {
    deps().remove(&source);
}

fn collect_into(key_deps: &KeyDeps, key: &DepKey, stale: &mut IndexSet<ReactionId>) {
    if let Some(set) = key_deps.get(key) {
        stale.extend(set.iter().copied());
    }
}

/// Resolve a write into its stale reactions and dispatch them.
///
/// The stale set is snapshotted before dispatch: running a reaction mutates
/// the live edge sets (cleanup and re-track), so dispatch must never iterate
/// them directly. The reaction currently executing on this thread is skipped
/// (a reaction's own writes never re-enter it).
pub(crate) fn trigger(source: ObjId, op: TriggerOp) {
    let mut stale: IndexSet<ReactionId> = IndexSet::new();

    {
        let Some(key_deps) = deps().get(&source) else {
            return;
        };

        match &op {
            TriggerOp::Set(key) => collect_into(&key_deps, key, &mut stale),
            TriggerOp::Add(key) => {
                collect_into(&key_deps, key, &mut stale);
                collect_into(&key_deps, &DepKey::Iterate, &mut stale);
                if matches!(key, DepKey::Index(_)) {
                    collect_into(&key_deps, &DepKey::Length, &mut stale);
                }
            }
            TriggerOp::Delete(key) => {
                collect_into(&key_deps, key, &mut stale);
                collect_into(&key_deps, &DepKey::Iterate, &mut stale);
            }
            TriggerOp::Truncate(new_len) => {
                collect_into(&key_deps, &DepKey::Length, &mut stale);

                // Indices at or past the new length are implicitly removed.
                let mut truncated: SmallVec<[usize; 8]> = key_deps
                    .keys()
                    .filter_map(|key| match key {
                        DepKey::Index(i) if *i >= *new_len => Some(*i),
                        _ => None,
                    })
                    .collect();
                truncated.sort_unstable();
                for i in truncated {
                    collect_into(&key_deps, &DepKey::Index(i), &mut stale);
                }
            }
        }
    }

    if stale.is_empty() {
        return;
    }

    tracing::trace!(?source, ?op, count = stale.len(), "trigger");

    let current = context::current_id();
    for id in stale {
        if Some(id) == current {
            continue;
        }
        let target = registry().get(&id).and_then(|weak| weak.value().upgrade());
        if let Some(inner) = target {
            reaction::notify(inner);
        }
    }
}
