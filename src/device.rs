//! Device facade tying submissions, deferred tasks, and the swapchain
//! cache to one backend.
//!
//! External frameworks interoperate through raw `u64` submission handles.
//! Every raw-handle entry point treats `0` and ids this device never
//! issued as caller errors: they are logged and produce a safe failure
//! result without blocking.

use crate::backend::traits::{DeviceBackend, DeviceError, DeviceResult, TextureHandle};
use crate::deferred::DeferredTaskQueue;
use crate::submit::{FencePrimitive, SubmissionLedger, SubmitId};
use crate::swapchain_cache::SwapchainResourceCache;

pub struct GpuDevice<B: DeviceBackend> {
    backend: B,
    submissions: SubmissionLedger<B::Fence>,
    deferred: DeferredTaskQueue,
    cache: SwapchainResourceCache,
}

impl<B: DeviceBackend> GpuDevice<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            submissions: SubmissionLedger::new(),
            deferred: DeferredTaskQueue::new(),
            cache: SwapchainResourceCache::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Record a submitted unit of work and issue its id. The fence must
    /// have been handed to the queue submission that the id will stand for.
    pub fn register_submission(&mut self, fence: B::Fence) -> SubmitId {
        self.submissions.record(fence)
    }

    /// The fence behind a raw submission handle, for callers that need the
    /// native primitive itself.
    pub fn submission_fence(&self, raw: u64) -> Option<&B::Fence> {
        let Some(id) = SubmitId::from_raw(raw) else {
            log::error!("fence lookup with null submission handle");
            return None;
        };
        self.submissions.fence_for(id)
    }

    /// Block until the submission completes or `timeout_ns` elapses.
    /// Returns whether it completed. A null or unknown handle fails
    /// immediately.
    pub fn wait_for_submission(&self, raw: u64, timeout_ns: u64) -> bool {
        let Some(id) = SubmitId::from_raw(raw) else {
            log::error!("wait with null submission handle");
            return false;
        };
        self.submissions.wait(id, timeout_ns)
    }

    /// Export a cross-process sync file descriptor for the submission.
    /// Ownership of the descriptor transfers to the caller.
    pub fn export_submission_fd(&self, raw: u64) -> DeviceResult<i32> {
        let Some(id) = SubmitId::from_raw(raw) else {
            log::error!("fence export with null submission handle");
            return Err(DeviceError::InvalidSubmission(0));
        };
        self.submissions.export_sync_fd(id)
    }

    /// Run `task` on a later [`process_deferred`] call once the submission
    /// has completed. A task keyed to an already retired submission runs on
    /// the next poll. Returns whether the task was accepted; a null or
    /// never-issued handle drops it.
    ///
    /// [`process_deferred`]: Self::process_deferred
    pub fn run_after_submission(&mut self, raw: u64, task: impl FnOnce() + Send + 'static) -> bool {
        let Some(id) = SubmitId::from_raw(raw) else {
            log::error!("deferred task with null submission handle");
            return false;
        };
        if !self.submissions.was_issued(id) {
            log::error!("deferred task for unknown submission id {raw}");
            return false;
        }
        self.deferred.enqueue(id, task);
        true
    }

    /// Texture backing the current swapchain image, allocated or reused by
    /// the cache. `Ok(None)` while no swapchain exists.
    pub fn current_drawable_texture(&mut self) -> DeviceResult<Option<TextureHandle>> {
        self.cache.current_drawable(&mut self.backend)
    }

    /// Shared depth texture at the given extent. `Ok(None)` while no
    /// swapchain exists.
    pub fn current_depth_texture(
        &mut self,
        width: u32,
        height: u32,
    ) -> DeviceResult<Option<TextureHandle>> {
        self.cache.current_depth(&mut self.backend, width, height)
    }

    /// Per-frame poll: run every deferred task whose submission completed,
    /// then retire submission records nothing references anymore. Returns
    /// the number of tasks run.
    pub fn process_deferred(&mut self) -> usize {
        let ran = self.deferred.drain_completed(&self.submissions);
        let deferred = &self.deferred;
        self.submissions.retire_completed(|id| deferred.references(id));
        ran
    }

    pub fn pending_submissions(&self) -> usize {
        self.submissions.len()
    }

    pub fn pending_deferred_tasks(&self) -> usize {
        self.deferred.len()
    }
}

impl<B: DeviceBackend> Drop for GpuDevice<B> {
    fn drop(&mut self) {
        // Callers wait the device idle before teardown; anything still
        // queued here runs now rather than leaking.
        self.deferred.drain_all();
        self.cache.invalidate(&mut self.backend);
    }
}
