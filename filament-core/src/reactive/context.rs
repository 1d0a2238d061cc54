//! Tracking Context
//!
//! The tracking context knows which reaction is currently running. This is
//! what makes dependency collection automatic: when a view key is read, the
//! store asks the context for the active reaction and registers the edge.
//!
//! # Implementation
//!
//! We use a thread-local stack of active reactions. Entering a run pushes
//! the reaction; the returned guard pops it on drop, so the stack stays
//! correct on every exit path, including panics in the reaction body. The
//! stack (rather than a single slot) is what lets nested runs attribute
//! reads to the innermost reaction and then restore the outer one.
//!
//! A separate pause depth lets sequence instrumentation perform raw edits
//! without their incidental reads registering edges.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use super::reaction::{ReactionId, ReactionInner};

thread_local! {
    /// Stack of reactions currently executing on this thread.
    static STACK: RefCell<Vec<Arc<ReactionInner>>> = const { RefCell::new(Vec::new()) };

    /// Nesting depth of pause-tracking guards.
    static PAUSE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Guard for one reaction run; pops the stack when dropped.
pub(crate) struct TrackingGuard {
    reaction_id: ReactionId,
}

/// Enter a tracking scope for the given reaction.
///
/// While the returned guard is alive, reads through views attribute their
/// edges to this reaction.
pub(crate) fn enter(reaction: Arc<ReactionInner>) -> TrackingGuard {
    let reaction_id = reaction.id();
    STACK.with(|stack| stack.borrow_mut().push(reaction));
    TrackingGuard { reaction_id }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched enter/exit pairs early.
            if let Some(reaction) = popped {
                debug_assert_eq!(
                    reaction.id(),
                    self.reaction_id,
                    "tracking scope mismatch: expected {:?}, got {:?}",
                    self.reaction_id,
                    reaction.id()
                );
            }
        });
    }
}

/// The innermost reaction currently running on this thread, if tracking is
/// not paused.
pub(crate) fn current() -> Option<Arc<ReactionInner>> {
    if PAUSE_DEPTH.with(Cell::get) > 0 {
        return None;
    }
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Id of the innermost reaction currently running, ignoring the pause state.
///
/// Self-trigger suppression needs this even while tracking is paused.
pub(crate) fn current_id() -> Option<ReactionId> {
    STACK.with(|stack| stack.borrow().last().map(|r| r.id()))
}

/// Guard that suppresses edge recording while alive.
pub(crate) struct PauseGuard;

/// Suppress dependency tracking until the returned guard drops.
///
/// Nested pauses stack; tracking resumes when the outermost guard drops.
pub(crate) fn pause_tracking() -> PauseGuard {
    PAUSE_DEPTH.with(|depth| depth.set(depth.get() + 1));
    PauseGuard
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        PAUSE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
