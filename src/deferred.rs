//! Deferred CPU work keyed by GPU submission.
//!
//! Collaborators hand the queue a callback and the submission id whose
//! completion the callback must wait for, typically to release resources
//! the GPU is still reading. Draining is driven by the owning device's
//! per-frame bookkeeping.

use std::collections::VecDeque;

use crate::submit::{FencePrimitive, SubmissionLedger, SubmitId};

type Task = Box<dyn FnOnce() + Send>;

/// FIFO queue of callbacks waiting on submission completion.
///
/// A task never runs before its submission's fence signals, and runs at
/// most once. Tasks whose submission never signals stay queued until
/// teardown; teardown force-runs them (see [`DeferredTaskQueue::drain_all`]).
#[derive(Default)]
pub struct DeferredTaskQueue {
    tasks: VecDeque<(SubmitId, Task)>,
}

impl DeferredTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, id: SubmitId, task: impl FnOnce() + Send + 'static) {
        self.tasks.push_back((id, Box::new(task)));
    }

    /// Whether any queued task still targets `id`.
    pub fn references(&self, id: SubmitId) -> bool {
        self.tasks.iter().any(|(target, _)| *target == id)
    }

    /// Run and remove every task whose submission has completed, in queue
    /// order. Returns the number of tasks run.
    pub fn drain_completed<F: FencePrimitive>(&mut self, ledger: &SubmissionLedger<F>) -> usize {
        let mut ran = 0;
        let mut remaining = VecDeque::with_capacity(self.tasks.len());
        for (id, task) in self.tasks.drain(..) {
            let signaled = match ledger.try_fence(id) {
                Some(fence) => fence.is_signaled().unwrap_or(false),
                // A record the ledger issued but no longer holds was
                // confirmed complete before retirement. An id it never
                // issued has no completion event to wait for; the task is
                // dropped rather than run early.
                None if ledger.was_issued(id) => true,
                None => {
                    log::error!(
                        "discarding deferred task for unknown submission id {}",
                        id.as_raw()
                    );
                    continue;
                }
            };
            if signaled {
                task();
                ran += 1;
            } else {
                remaining.push_back((id, task));
            }
        }
        self.tasks = remaining;
        ran
    }

    /// Teardown policy: force-run every outstanding task regardless of
    /// fence state. Callers wait the device idle first; on device loss the
    /// warning below records how many tasks ran without confirmation.
    pub fn drain_all(&mut self) -> usize {
        if !self.tasks.is_empty() {
            log::warn!(
                "force-running {} deferred task(s) at device teardown",
                self.tasks.len()
            );
        }
        let mut ran = 0;
        for (_, task) in self.tasks.drain(..) {
            task();
            ran += 1;
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submit::test_support::MockFence;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn tasks_do_not_run_before_their_submission_signals() {
        let mut ledger = SubmissionLedger::new();
        let fence = MockFence::default();
        let id = ledger.record(fence.clone());

        let runs = Arc::new(AtomicUsize::new(0));
        let mut queue = DeferredTaskQueue::new();
        let counter = runs.clone();
        queue.enqueue(id, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(queue.drain_completed(&ledger), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(queue.references(id));

        fence.signal();
        assert_eq!(queue.drain_completed(&ledger), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());

        // At most once: a second drain finds nothing.
        assert_eq!(queue.drain_completed(&ledger), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tasks_for_one_submission_run_in_fifo_order() {
        let mut ledger = SubmissionLedger::new();
        let fence = MockFence::signaled();
        let id = ledger.record(fence);

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut queue = DeferredTaskQueue::new();
        for n in 0..4 {
            let order = order.clone();
            queue.enqueue(id, move || order.lock().unwrap().push(n));
        }

        queue.drain_completed(&ledger);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn pending_tasks_survive_while_completed_ones_drain() {
        let mut ledger = SubmissionLedger::new();
        let done = MockFence::signaled();
        let pending = MockFence::default();
        let done_id = ledger.record(done);
        let pending_id = ledger.record(pending);

        let mut queue = DeferredTaskQueue::new();
        queue.enqueue(done_id, || {});
        queue.enqueue(pending_id, || {});
        queue.enqueue(done_id, || {});

        assert_eq!(queue.drain_completed(&ledger), 2);
        assert_eq!(queue.len(), 1);
        assert!(queue.references(pending_id));
        assert!(!queue.references(done_id));
    }

    #[test]
    fn tasks_for_retired_submissions_run_on_next_drain() {
        let mut ledger = SubmissionLedger::new();
        let fence = MockFence::signaled();
        let id = ledger.record(fence);
        ledger.retire_completed(|_| false);
        assert!(ledger.is_empty());

        let mut queue = DeferredTaskQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        queue.enqueue(id, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(queue.drain_completed(&ledger), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tasks_for_never_issued_ids_are_discarded_not_run() {
        let ledger: SubmissionLedger<MockFence> = SubmissionLedger::new();

        let runs = Arc::new(AtomicUsize::new(0));
        let mut queue = DeferredTaskQueue::new();
        let counter = runs.clone();
        queue.enqueue(SubmitId::from_raw(42).unwrap(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(queue.drain_completed(&ledger), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn teardown_force_runs_everything() {
        let mut ledger = SubmissionLedger::new();
        let never_signals = MockFence::default();
        let id = ledger.record(never_signals);

        let runs = Arc::new(AtomicUsize::new(0));
        let mut queue = DeferredTaskQueue::new();
        for _ in 0..3 {
            let counter = runs.clone();
            queue.enqueue(id, move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(queue.drain_all(), 3);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
    }
}
