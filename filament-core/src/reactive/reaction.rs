//! Reaction Engine
//!
//! A Reaction wraps a user computation into a re-runnable unit. Each run
//! first unlinks the reaction from every edge recorded by the previous run,
//! then executes the body inside a tracking scope so reads rebuild the edge
//! set from scratch. Conditional reads therefore never leave stale edges
//! behind: after a run, the edge set is exactly what the run actually read.
//!
//! # Invalidation
//!
//! When a tracked key changes, the store hands the reaction to [`notify`].
//! Without a custom scheduler the reaction is enqueued into the batched job
//! queue; with one, the scheduler callback decides when (and whether) to
//! re-run: computed values use this to mark a dirty flag instead of
//! recomputing, watchers to choose their flush timing.
//!
//! # Lifecycle
//!
//! `Reaction` is a clonable handle. Explicit [`Reaction::dispose`] unlinks
//! everything immediately; alternatively, dropping the last handle has the
//! same effect, since the store only holds weak references.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context;
use super::scheduler;
use super::store::{self, DepKey};
use crate::value::{ObjId, Value};

/// Counter for generating unique reaction ids.
static REACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReactionId(u64);

impl ReactionId {
    fn new() -> Self {
        Self(REACTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Scheduling override: called on invalidation instead of the default queue.
pub type SchedulerFn = Arc<dyn Fn(&Reaction) + Send + Sync>;

/// Creation options for [`Reaction::with_options`].
#[derive(Default)]
pub struct RunOptions {
    /// Skip the initial run; the caller re-runs on demand.
    pub lazy: bool,
    /// Custom invalidation handler.
    pub scheduler: Option<SchedulerFn>,
}

pub(crate) struct ReactionInner {
    id: ReactionId,
    body: Box<dyn Fn() -> Value + Send + Sync>,
    scheduler: Option<SchedulerFn>,
    /// Edges recorded by the current run, rebuilt from scratch every run.
    edges: Mutex<SmallVec<[(ObjId, DepKey); 8]>>,
    disposed: AtomicBool,
}

impl ReactionInner {
    pub(crate) fn id(&self) -> ReactionId {
        self.id
    }

    pub(crate) fn record_edge(&self, source: ObjId, key: DepKey) {
        self.edges.lock().push((source, key));
    }

    /// Unlink this reaction from every recorded edge and clear the set.
    fn cleanup(&self) {
        let edges = std::mem::take(&mut *self.edges.lock());
        for (source, key) in edges {
            store::untrack(source, &key, self.id);
        }
    }
}

impl Drop for ReactionInner {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.cleanup();
        }
        store::unregister_reaction(self.id);
    }
}

/// Handle to a re-runnable tracked computation.
#[derive(Clone)]
pub struct Reaction {
    inner: Arc<ReactionInner>,
}

impl Reaction {
    /// Create an eager side-effect reaction and run it once immediately.
    ///
    /// Later invalidations go through the default batched job queue.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_options(
            move || {
                body();
                Value::Null
            },
            RunOptions::default(),
        )
    }

    /// Create a reaction with explicit laziness and scheduling.
    pub fn with_options<F>(body: F, options: RunOptions) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let inner = Arc::new(ReactionInner {
            id: ReactionId::new(),
            body: Box::new(body),
            scheduler: options.scheduler,
            edges: Mutex::new(SmallVec::new()),
            disposed: AtomicBool::new(false),
        });
        store::register_reaction(&inner);

        let reaction = Self { inner };
        if !options.lazy {
            reaction.run();
        }
        reaction
    }

    /// Execute the body inside a fresh tracking scope and return its result.
    ///
    /// Old edges are unlinked first; reads during the body rebuild the edge
    /// set. The tracking scope is popped on every exit path, so a panicking
    /// body cannot corrupt attribution for whatever runs next.
    pub fn run(&self) -> Value {
        if self.inner.disposed.load(Ordering::SeqCst) {
            // Disposed reactions still evaluate, they just no longer track.
            return (self.inner.body)();
        }

        self.inner.cleanup();
        let _scope = context::enter(self.inner.clone());
        (self.inner.body)()
    }

    /// Unlink from every edge and stop reacting to future changes.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            self.inner.cleanup();
            store::unregister_reaction(self.inner.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn id(&self) -> ReactionId {
        self.inner.id
    }

    pub(crate) fn inner(&self) -> Arc<ReactionInner> {
        self.inner.clone()
    }

    #[cfg(test)]
    pub(crate) fn edge_count(&self) -> usize {
        self.inner.edges.lock().len()
    }
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.inner.id)
            .field("edges", &self.inner.edges.lock().len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Dispatch an invalidation to a reaction.
pub(crate) fn notify(inner: Arc<ReactionInner>) {
    if inner.disposed.load(Ordering::SeqCst) {
        return;
    }
    let reaction = Reaction { inner };
    match reaction.inner.scheduler.clone() {
        Some(custom) => custom(&reaction),
        None => scheduler::enqueue(reaction),
    }
}

/// Wrap a side-effect body into an eagerly-run reaction.
///
/// Convenience alias for [`Reaction::new`]; this is the entry point a
/// renderer uses to make a component's re-render function reactive.
pub fn run<F>(body: F) -> Reaction
where
    F: Fn() + Send + Sync + 'static,
{
    Reaction::new(body)
}
