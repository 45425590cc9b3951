//! Submission tracking.
//!
//! Every unit of submitted GPU work gets an opaque [`SubmitId`]; the
//! [`SubmissionLedger`] is the sole owner of the fence behind each id.
//! Callers store and pass ids as plain values and come back here to query
//! completion, wait with a timeout, or export an interop handle.

use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::backend::traits::{DeviceError, DeviceResult};

/// Opaque identifier for one unit of submitted GPU work.
///
/// Zero is not representable; raw interop handles enter through
/// [`SubmitId::from_raw`], which maps zero to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmitId(NonZeroU64);

impl SubmitId {
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn as_raw(self) -> u64 {
        self.0.get()
    }
}

/// Synchronization primitive that signals once its associated GPU work
/// completes.
pub trait FencePrimitive {
    /// Non-blocking completion query.
    fn is_signaled(&self) -> DeviceResult<bool>;

    /// Block the calling thread until the primitive signals or the timeout
    /// elapses. `Ok(true)` means it signaled before the timeout. A timed
    /// out fence stays waitable.
    fn wait(&self, timeout_ns: u64) -> DeviceResult<bool>;

    /// Export a process-transferable sync handle tied to the same
    /// completion event, on backends that support it.
    fn export_sync_fd(&self) -> DeviceResult<i32> {
        Err(DeviceError::FenceExportUnsupported)
    }
}

/// Maps submission ids to their fences.
///
/// `wait` takes `&self` and blocks only the calling thread; distinct ids
/// resolve to independent primitives, so threads waiting on different ids
/// do not interfere.
pub struct SubmissionLedger<F: FencePrimitive> {
    records: HashMap<u64, F>,
    next_id: NonZeroU64,
}

impl<F: FencePrimitive> Default for SubmissionLedger<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FencePrimitive> SubmissionLedger<F> {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            next_id: NonZeroU64::MIN,
        }
    }

    /// Take ownership of a fence and issue the next submission id.
    ///
    /// Ids are never reused; wrapping would alias live records.
    pub fn record(&mut self, fence: F) -> SubmitId {
        let id = SubmitId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .expect("submission id space exhausted");
        self.records.insert(id.as_raw(), fence);
        id
    }

    /// The fence behind `id`, or `None` with a logged error for an id this
    /// ledger never issued (or already retired).
    pub fn fence_for(&self, id: SubmitId) -> Option<&F> {
        let fence = self.records.get(&id.as_raw());
        if fence.is_none() {
            log::error!("no fence recorded for submission id {}", id.as_raw());
        }
        fence
    }

    /// Lookup without the missing-id diagnostics, for bookkeeping paths
    /// where a retired record is expected.
    pub(crate) fn try_fence(&self, id: SubmitId) -> Option<&F> {
        self.records.get(&id.as_raw())
    }

    /// Whether this ledger ever issued `id`, retired or not.
    pub fn was_issued(&self, id: SubmitId) -> bool {
        id.as_raw() < self.next_id.get()
    }

    /// Block until the submission's fence signals or `timeout_ns` elapses.
    /// Returns whether it signaled. Unknown ids fail immediately without
    /// blocking.
    pub fn wait(&self, id: SubmitId, timeout_ns: u64) -> bool {
        let Some(fence) = self.records.get(&id.as_raw()) else {
            log::error!("wait on unknown submission id {}", id.as_raw());
            return false;
        };
        match fence.wait(timeout_ns) {
            Ok(signaled) => signaled,
            Err(err) => {
                log::error!("fence wait failed for submission id {}: {err}", id.as_raw());
                false
            }
        }
    }

    /// Export a cross-process sync handle for the submission's fence.
    pub fn export_sync_fd(&self, id: SubmitId) -> DeviceResult<i32> {
        let Some(fence) = self.records.get(&id.as_raw()) else {
            log::error!("cannot export fence for unknown submission id {}", id.as_raw());
            return Err(DeviceError::InvalidSubmission(id.as_raw()));
        };
        fence.export_sync_fd().map_err(|err| {
            log::error!("fence export failed for submission id {}: {err}", id.as_raw());
            err
        })
    }

    /// Drop every record whose fence has signaled and that `in_use` does
    /// not claim. Their fences are released; unsignaled or referenced
    /// records stay waitable.
    pub fn retire_completed(&mut self, mut in_use: impl FnMut(SubmitId) -> bool) {
        self.records.retain(|&raw, fence| {
            let Some(id) = SubmitId::from_raw(raw) else {
                return false;
            };
            if in_use(id) {
                return true;
            }
            match fence.is_signaled() {
                Ok(signaled) => !signaled,
                Err(err) => {
                    log::warn!("fence status query failed for submission id {raw}: {err}");
                    true
                }
            }
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Host-side fence for tests: completion is flipped by hand.
    #[derive(Clone, Default)]
    pub(crate) struct MockFence {
        signaled: Arc<AtomicBool>,
        pub(crate) waits: Arc<AtomicUsize>,
    }

    impl MockFence {
        pub(crate) fn signaled() -> Self {
            let fence = Self::default();
            fence.signal();
            fence
        }

        pub(crate) fn signal(&self) {
            self.signaled.store(true, Ordering::SeqCst);
        }
    }

    impl FencePrimitive for MockFence {
        fn is_signaled(&self) -> DeviceResult<bool> {
            Ok(self.signaled.load(Ordering::SeqCst))
        }

        fn wait(&self, _timeout_ns: u64) -> DeviceResult<bool> {
            self.waits.fetch_add(1, Ordering::SeqCst);
            Ok(self.signaled.load(Ordering::SeqCst))
        }

        fn export_sync_fd(&self) -> DeviceResult<i32> {
            if self.signaled.load(Ordering::SeqCst) {
                Ok(7)
            } else {
                Err(DeviceError::FenceExportUnsupported)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockFence;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn raw_zero_is_not_a_submission_id() {
        assert!(SubmitId::from_raw(0).is_none());
        assert_eq!(SubmitId::from_raw(3).map(SubmitId::as_raw), Some(3));
    }

    #[test]
    fn ids_are_nonzero_and_monotonic() {
        let mut ledger = SubmissionLedger::new();
        let a = ledger.record(MockFence::default());
        let b = ledger.record(MockFence::default());
        assert_eq!(a.as_raw(), 1);
        assert_eq!(b.as_raw(), 2);
    }

    #[test]
    fn wait_on_unknown_id_fails_without_touching_any_fence() {
        let mut ledger = SubmissionLedger::new();
        let fence = MockFence::default();
        ledger.record(fence.clone());

        let stranger = SubmitId::from_raw(999).unwrap();
        assert!(!ledger.wait(stranger, u64::MAX));
        assert_eq!(fence.waits.load(Ordering::SeqCst), 0);
        assert!(ledger.fence_for(stranger).is_none());
    }

    #[test]
    fn wait_reflects_fence_state() {
        let mut ledger = SubmissionLedger::new();
        let fence = MockFence::default();
        let id = ledger.record(fence.clone());

        assert!(!ledger.wait(id, 1_000));
        fence.signal();
        assert!(ledger.wait(id, 1_000));
    }

    #[test]
    fn export_on_unknown_id_is_an_invalid_submission() {
        let ledger: SubmissionLedger<MockFence> = SubmissionLedger::new();
        let id = SubmitId::from_raw(1).unwrap();
        assert!(matches!(
            ledger.export_sync_fd(id),
            Err(DeviceError::InvalidSubmission(1))
        ));
    }

    #[test]
    fn retire_drops_only_signaled_unreferenced_records() {
        let mut ledger = SubmissionLedger::new();
        let done = MockFence::signaled();
        let pending = MockFence::default();
        let referenced = MockFence::signaled();

        let done_id = ledger.record(done);
        let pending_id = ledger.record(pending);
        let referenced_id = ledger.record(referenced);

        ledger.retire_completed(|id| id == referenced_id);

        assert!(ledger.fence_for(done_id).is_none());
        assert!(ledger.fence_for(pending_id).is_some());
        assert!(ledger.fence_for(referenced_id).is_some());
        assert_eq!(ledger.len(), 2);
    }
}
