//! Filament Core
//!
//! This crate provides the core runtime for the Filament reactive UI
//! framework. It implements:
//!
//! - Reactive views over plain dynamic data (deep/shallow, mutable/read-only)
//! - Automatic dependency tracking and change propagation
//! - Batched, deduplicated update scheduling
//! - Derived values (computed), side-effect watchers, and boxed cells
//!
//! The renderer consumes this crate by wrapping each component's re-render
//! function in a reaction; the runtime decides when to re-invoke it. The
//! template compiler is fully decoupled: it emits code that makes the same
//! calls an application author would make by hand.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `value`: the dynamic data model (`Value`, `Obj`) that views wrap
//! - `reactive`: views, reactions, the subscription store, the scheduler,
//!   and the derived abstractions built on top of them
//!
//! # Example
//!
//! ```rust
//! use filament_core::{boxed, flush_jobs, run};
//!
//! let count = boxed(1);
//!
//! let count_reader = count.clone();
//! let _reaction = run(move || {
//!     println!("count: {:?}", count_reader.get("value"));
//! });
//! // prints: count: Num(1.0)
//!
//! count.set("value", 2);
//! flush_jobs();
//! // prints: count: Num(2.0)
//! ```

pub mod reactive;
pub mod value;

pub use reactive::{
    boxed, clear_flush_driver, computed, flush_jobs, install_async_driver, make_readonly_view,
    make_shallow_readonly_view, make_shallow_view, make_view, pending_jobs, run, set_flush_driver,
    to_boxed_field, to_boxed_fields, unwrap_boxed, watch, CleanupRegistrar, Computed, FlushTiming,
    Reaction, RunOptions, UnwrappedView, View, WatchOptions, WatchSource, Watcher,
};
pub use value::{Key, Obj, ObjId, Value, ValueError};
