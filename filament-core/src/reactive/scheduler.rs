//! Job Scheduler
//!
//! Invalidated reactions without a custom scheduler land here: a pending
//! set, deduplicated by reaction id and ordered by first insertion, drained
//! by a single flush pass. N synchronous writes within one turn therefore
//! re-run each stale reaction exactly once, and that run observes only the
//! final state.
//!
//! # Driving the queue
//!
//! The queue is deliberately decoupled from any event loop: it exposes a
//! schedule/flush contract and nothing else. [`flush_jobs`] drains the
//! current thread's queue synchronously; tests and render loops call it
//! directly. A flush driver, installed per thread with [`set_flush_driver`],
//! is invoked once when a turn first enqueues a job; [`install_async_driver`]
//! provides a tokio-based driver that defers the flush until the current
//! task yields, which gives async hosts microtask-style batching.
//!
//! The queue itself is thread-local. Execution is single-threaded and
//! cooperative: reactions run interleaved turn by turn, never concurrently,
//! so an invalidation joins the queue of the thread that performed the
//! write.

use std::cell::RefCell;
use std::sync::Arc;

use indexmap::IndexMap;

use super::reaction::{Reaction, ReactionId};

/// A unit of deferred work. Either way it is keyed by the reaction id, so a
/// reaction invalidated many times in one turn holds a single slot.
enum Job {
    /// Re-run the reaction body.
    Rerun(Reaction),
    /// Invoke an arbitrary callback (deferred watcher jobs).
    Invoke(Arc<dyn Fn() + Send + Sync>),
}

impl Job {
    fn run(self) {
        match self {
            Job::Rerun(reaction) => {
                if !reaction.is_disposed() {
                    reaction.run();
                }
            }
            Job::Invoke(callback) => callback(),
        }
    }
}

#[derive(Default)]
struct JobQueue {
    pending: IndexMap<ReactionId, Job>,
    /// A flush pass is currently draining the queue.
    flushing: bool,
    /// A flush has been requested and not yet performed.
    scheduled: bool,
}

thread_local! {
    static QUEUE: RefCell<JobQueue> = RefCell::new(JobQueue::default());

    static DRIVER: RefCell<Option<Arc<dyn Fn() + Send + Sync>>> = const { RefCell::new(None) };
}

/// Enqueue a reaction re-run; duplicates within a turn collapse.
pub(crate) fn enqueue(reaction: Reaction) {
    enqueue_job(reaction.id(), Job::Rerun(reaction));
}

/// Enqueue an arbitrary callback under a reaction's id.
pub(crate) fn enqueue_invoke(id: ReactionId, callback: Arc<dyn Fn() + Send + Sync>) {
    enqueue_job(id, Job::Invoke(callback));
}

fn enqueue_job(id: ReactionId, job: Job) {
    let request = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.pending.contains_key(&id) {
            return false;
        }
        queue.pending.insert(id, job);

        // One in-flight flush covers everything enqueued before it runs;
        // jobs arriving mid-flush are drained by the running pass.
        if queue.scheduled || queue.flushing {
            false
        } else {
            queue.scheduled = true;
            true
        }
    });

    if request {
        let driver = DRIVER.with(|driver| driver.borrow().clone());
        if let Some(driver) = driver {
            driver();
        }
    }
}

/// Number of jobs currently pending on this thread.
pub fn pending_jobs() -> usize {
    QUEUE.with(|queue| queue.borrow().pending.len())
}

/// Resets the flush flags even if a job panics mid-drain.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        QUEUE.with(|queue| {
            let mut queue = queue.borrow_mut();
            queue.flushing = false;
            queue.scheduled = false;
        });
    }
}

/// Drain this thread's pending jobs in first-enqueued order.
///
/// Jobs enqueued while the flush is running join the same pass. Reentrant
/// calls (a job flushing from inside a flush) are no-ops.
pub fn flush_jobs() {
    let already_flushing = QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.flushing {
            true
        } else {
            queue.flushing = true;
            false
        }
    });
    if already_flushing {
        return;
    }

    let _guard = FlushGuard;

    loop {
        // Pop before running: the job must not hold the queue borrow while
        // it executes, or its own writes could not enqueue.
        let job = QUEUE.with(|queue| queue.borrow_mut().pending.shift_remove_index(0));
        match job {
            Some((_, job)) => {
                tracing::trace!("flush job");
                job.run();
            }
            None => break,
        }
    }
}

/// Install a flush driver for this thread.
///
/// The driver is called when a turn enqueues its first job; it must arrange
/// for [`flush_jobs`] to run later on this same thread.
pub fn set_flush_driver<F>(driver: F)
where
    F: Fn() + Send + Sync + 'static,
{
    DRIVER.with(|slot| *slot.borrow_mut() = Some(Arc::new(driver)));
}

/// Remove this thread's flush driver; flushing becomes manual again.
pub fn clear_flush_driver() {
    DRIVER.with(|slot| *slot.borrow_mut() = None);
}

/// Install a driver that defers flushes onto the current tokio runtime.
///
/// Must be called from within a runtime. Intended for current-thread
/// runtimes, where the spawned flush shares this thread's queue; the flush
/// runs once the enqueuing task yields, so a turn's writes batch into one
/// pass.
pub fn install_async_driver() {
    let handle = tokio::runtime::Handle::current();
    set_flush_driver(move || {
        handle.spawn(async {
            tokio::task::yield_now().await;
            flush_jobs();
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::reaction::RunOptions;
    use crate::value::Value;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Mutex;

    fn counting_reaction(runs: Arc<AtomicI32>) -> Reaction {
        Reaction::with_options(
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                Value::Null
            },
            RunOptions {
                lazy: true,
                ..RunOptions::default()
            },
        )
    }

    #[test]
    fn duplicate_enqueues_collapse() {
        let runs = Arc::new(AtomicI32::new(0));
        let reaction = counting_reaction(runs.clone());

        enqueue(reaction.clone());
        enqueue(reaction.clone());
        enqueue(reaction.clone());

        flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // next turn enqueues again
        enqueue(reaction);
        flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn jobs_run_in_first_enqueued_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut reactions = Vec::new();
        for label in ["a", "b", "c"] {
            let order = order.clone();
            reactions.push(Reaction::with_options(
                move || {
                    order.lock().unwrap().push(label);
                    Value::Null
                },
                RunOptions {
                    lazy: true,
                    ..RunOptions::default()
                },
            ));
        }

        enqueue(reactions[0].clone());
        enqueue(reactions[1].clone());
        enqueue(reactions[0].clone()); // duplicate keeps first position
        enqueue(reactions[2].clone());

        flush_jobs();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn jobs_enqueued_mid_flush_run_in_same_pass() {
        let runs = Arc::new(AtomicI32::new(0));
        let second = counting_reaction(runs.clone());

        let second_clone = second.clone();
        let first = Reaction::with_options(
            move || {
                enqueue(second_clone.clone());
                Value::Null
            },
            RunOptions {
                lazy: true,
                ..RunOptions::default()
            },
        );

        enqueue(first);
        flush_jobs();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(pending_jobs(), 0);
    }

    #[test]
    fn disposed_jobs_are_skipped() {
        let runs = Arc::new(AtomicI32::new(0));
        let reaction = counting_reaction(runs.clone());

        enqueue(reaction.clone());
        reaction.dispose();

        flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invoke_jobs_dedup_by_id() {
        let runs = Arc::new(AtomicI32::new(0));
        let reaction = counting_reaction(Arc::new(AtomicI32::new(0)));

        let runs_clone = runs.clone();
        let callback: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        enqueue_invoke(reaction.id(), callback.clone());
        enqueue_invoke(reaction.id(), callback);

        flush_jobs();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn driver_fires_once_per_turn() {
        let requests = Arc::new(AtomicI32::new(0));
        let requests_clone = requests.clone();
        set_flush_driver(move || {
            requests_clone.fetch_add(1, Ordering::SeqCst);
        });

        let reaction_a = counting_reaction(Arc::new(AtomicI32::new(0)));
        let reaction_b = counting_reaction(Arc::new(AtomicI32::new(0)));

        enqueue(reaction_a);
        enqueue(reaction_b);
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        flush_jobs();
        clear_flush_driver();
    }
}
