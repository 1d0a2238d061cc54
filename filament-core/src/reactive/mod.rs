//! Reactive Engine
//!
//! This module implements the reactivity core: dependency-tracked views
//! over plain data, re-runnable reactions, and the batched scheduler that
//! connects writes back to the computations that read them.
//!
//! # Concepts
//!
//! ## Views
//!
//! A view intercepts reads and writes on one source object. Reading a key
//! inside a running reaction records a dependency edge; writing a key
//! resolves the dependent reactions and schedules them. Views come deep or
//! shallow, mutable or read-only.
//!
//! ## Reactions
//!
//! A reaction wraps a computation so it can be re-run when anything it read
//! changes. Its dependency set is rebuilt from scratch on every run, so
//! branches that stop being read stop re-triggering it.
//!
//! ## Scheduling
//!
//! Invalidated reactions are deduplicated into a pending set and drained by
//! a single flush pass in first-enqueued order. Computed values and
//! watchers override scheduling to implement laziness and flush timing.
//!
//! # Implementation Notes
//!
//! Dependency collection uses a thread-local stack of active reactions
//! ("automatic dependency tracking", the approach of Vue 3, SolidJS, and
//! Leptos). The subscription store is keyed by source id and holds weak
//! references only, so it never extends the lifetime of sources or
//! reactions.

mod boxed;
mod computed;
mod context;
mod reaction;
mod scheduler;
pub(crate) mod store;
mod view;
mod watch;

pub use boxed::{boxed, to_boxed_field, to_boxed_fields, unwrap_boxed, UnwrappedView};
pub use computed::{computed, Computed};
pub use reaction::{run, Reaction, ReactionId, RunOptions, SchedulerFn};
pub use scheduler::{
    clear_flush_driver, flush_jobs, install_async_driver, pending_jobs, set_flush_driver,
};
pub use view::{
    make_readonly_view, make_shallow_readonly_view, make_shallow_view, make_view, View,
};
pub use watch::{watch, CleanupRegistrar, FlushTiming, WatchOptions, WatchSource, Watcher};
