//! Watchers
//!
//! A watcher runs a side-effect callback with the previous and current
//! values of a watched source. The source is either an explicit getter or a
//! view, in which case every reachable key is read so the whole subtree is
//! subscribed.
//!
//! # The job
//!
//! On invalidation the watcher's job re-evaluates the source, invokes the
//! cleanup registered by the *previous* callback run (so a stale async
//! result can be cancelled or ignored before the next callback fires), then
//! calls the callback and rolls the new value into the old one. With
//! `flush: Post` the job is deferred into the batched queue instead of
//! running inline, deduplicated like any other job.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::reaction::{Reaction, RunOptions};
use super::scheduler;
use super::view::{make_view, View};
use crate::value::{ObjId, Value};

/// When an invalidated watcher runs its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushTiming {
    /// Run the job immediately, inside the triggering write.
    #[default]
    Sync,
    /// Defer the job into the batched flush.
    Post,
}

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Run the callback once at setup instead of only capturing the
    /// initial value.
    pub immediate: bool,
    pub flush: FlushTiming,
}

/// What a watcher observes.
pub enum WatchSource {
    /// Explicit dependency expression.
    Getter(Box<dyn Fn() -> Value + Send + Sync + 'static>),
    /// A view whose entire subtree is subscribed.
    Deep(View),
}

impl WatchSource {
    /// Watch whatever the closure reads.
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        WatchSource::Getter(Box::new(getter))
    }

    /// Watch every key reachable from the view.
    pub fn deep(view: View) -> Self {
        WatchSource::Deep(view)
    }
}

impl From<View> for WatchSource {
    fn from(view: View) -> Self {
        WatchSource::Deep(view)
    }
}

impl From<super::computed::Computed> for WatchSource {
    fn from(computed: super::computed::Computed) -> Self {
        WatchSource::getter(move || computed.get())
    }
}

type Cleanup = Box<dyn FnOnce() + Send>;

/// Handed to the callback so a run can arm a cleanup for its successor.
pub struct CleanupRegistrar<'a> {
    slot: &'a Mutex<Option<Cleanup>>,
}

impl CleanupRegistrar<'_> {
    /// Register a cleanup invoked before the next callback run (or at
    /// [`Watcher::stop`]). A later registration in the same run replaces an
    /// earlier one.
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.slot.lock() = Some(Box::new(cleanup));
    }
}

struct WatchState {
    old: Mutex<Value>,
    cleanup: Mutex<Option<Cleanup>>,
}

/// Handle to an active watcher. Stopping (or dropping every handle)
/// unsubscribes it.
#[derive(Clone)]
pub struct Watcher {
    reaction: Reaction,
    state: Arc<WatchState>,
}

impl Watcher {
    /// Unsubscribe and run any pending cleanup.
    pub fn stop(&self) {
        self.reaction.dispose();
        if let Some(cleanup) = self.state.cleanup.lock().take() {
            cleanup();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.reaction.is_disposed()
    }
}

/// Watch a source and invoke `callback(new, old, registrar)` when it
/// changes.
pub fn watch<S, C>(source: S, callback: C, options: WatchOptions) -> Watcher
where
    S: Into<WatchSource>,
    C: Fn(&Value, &Value, &CleanupRegistrar) + Send + Sync + 'static,
{
    let getter: Box<dyn Fn() -> Value + Send + Sync> = match source.into() {
        WatchSource::Getter(getter) => getter,
        WatchSource::Deep(view) => Box::new(move || {
            let mut seen = HashSet::new();
            traverse(&view, &mut seen);
            Value::View(view.clone())
        }),
    };

    let state = Arc::new(WatchState {
        old: Mutex::new(Value::Null),
        cleanup: Mutex::new(None),
    });
    let callback = Arc::new(callback);

    let job = {
        let state = state.clone();
        let job: Arc<dyn Fn(&Reaction) + Send + Sync> = Arc::new(move |reaction: &Reaction| {
            let new_value = reaction.run();

            // Previous run's cleanup fires before this run's callback.
            if let Some(cleanup) = state.cleanup.lock().take() {
                cleanup();
            }

            let old_value = state.old.lock().clone();
            let registrar = CleanupRegistrar {
                slot: &state.cleanup,
            };
            callback(&new_value, &old_value, &registrar);

            *state.old.lock() = new_value;
        });
        job
    };

    let scheduler = {
        let job = job.clone();
        let flush = options.flush;
        Arc::new(move |reaction: &Reaction| match flush {
            FlushTiming::Sync => job(reaction),
            FlushTiming::Post => {
                let job = job.clone();
                let reaction = reaction.clone();
                let id = reaction.id();
                scheduler::enqueue_invoke(id, Arc::new(move || job(&reaction)));
            }
        })
    };

    let reaction = Reaction::with_options(
        move || getter(),
        RunOptions {
            lazy: true,
            scheduler: Some(scheduler),
        },
    );

    if options.immediate {
        job(&reaction);
    } else {
        // capture the initial value (and the initial dependency set)
        *state.old.lock() = reaction.run();
    }

    Watcher { reaction, state }
}

/// Read every key reachable from `view`, subscribing the running reaction
/// to the whole subtree. Reference cycles are broken by the seen set.
fn traverse(view: &View, seen: &mut HashSet<ObjId>) {
    if !seen.insert(view.raw().id()) {
        return;
    }
    for key in view.keys() {
        match view.get(key) {
            Value::View(child) => traverse(&child, seen),
            Value::Obj(child) => traverse(&make_view(child), seen),
            _ => {}
        }
    }
}
