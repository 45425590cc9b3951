//! GPU device layer: capability negotiation, submission tracking, deferred
//! tasks, and swapchain-backed texture caching.
//!
//! The crate splits into a backend-agnostic core and a Vulkan backend:
//! - [`features`]: versioned feature negotiation at device creation
//! - [`submit`]: fence-backed submission ids, bounded waits, fd export
//! - [`deferred`]: CPU callbacks keyed to submission completion
//! - [`swapchain_cache`]: drawable and depth texture reuse per swapchain image
//! - [`device`]: the [`GpuDevice`] facade tying them together
//! - [`backend::vulkan`]: the ash-backed implementation of the backend seam
//!
//! The embedding application owns the Vulkan instance and logical device;
//! everything downstream of them lives here.

pub mod backend;
pub mod deferred;
pub mod device;
pub mod features;
pub mod submit;
pub mod swapchain_cache;

pub use backend::traits::{
    DeviceBackend, DeviceError, DeviceResult, SwapchainState, TextureHandle,
};
pub use backend::types::{TextureDescriptor, TextureFormat, TextureUsage};
pub use deferred::DeferredTaskQueue;
pub use device::GpuDevice;
pub use features::{ApiVersion, DeviceFeatures, FeatureCheck, FeatureConfig, FeatureGroup};
pub use submit::{FencePrimitive, SubmissionLedger, SubmitId};
pub use swapchain_cache::SwapchainResourceCache;

use std::sync::Once;

static DIAGNOSTICS_INIT: Once = Once::new();

/// Initialize env-filtered logging once per process. Later calls are
/// no-ops, so libraries and tests can both call it freely.
pub fn init_diagnostics() {
    DIAGNOSTICS_INIT.call_once(|| {
        let _ = env_logger::Builder::from_default_env().try_init();
    });
}
