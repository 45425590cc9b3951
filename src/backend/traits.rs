//! Core backend abstraction traits
//!
//! The device layer never talks to a graphics API directly; everything it
//! allocates or queries goes through [`DeviceBackend`], which the Vulkan
//! backend implements and tests replace with mocks.

use crate::backend::types::*;
use crate::features::ApiVersion;
use crate::submit::FencePrimitive;
use thiserror::Error;

/// Device layer error type
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("API version mismatch: requested {requested}, available {available}")]
    VersionMismatch {
        requested: ApiVersion,
        available: ApiVersion,
    },
    #[error("missing required device features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),
    #[error("driver query failed: {0}")]
    DriverQueryFailed(String),
    #[error("backend initialization failed: {0}")]
    InitializationFailed(String),
    #[error("invalid submission id {0}")]
    InvalidSubmission(u64),
    #[error("fence operation failed: {0}")]
    FenceFailed(String),
    #[error("fence export is not supported on this device")]
    FenceExportUnsupported,
    #[error("unsupported surface format: {0}")]
    UnsupportedFormat(&'static str),
    #[error("failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("failed to create swapchain: {0}")]
    SwapchainCreationFailed(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

impl TextureHandle {
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// A snapshot of the swapchain state the resource cache keys its slots by.
///
/// A format of `None` means the surface format has no [`TextureFormat`]
/// equivalent; the cache reports that as an unsupported-format error
/// instead of producing a texture with the wrong format.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainState {
    pub width: u32,
    pub height: u32,
    pub image_index: u32,
    pub color_format: Option<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

/// The seam between the device layer and a concrete graphics backend.
///
/// Texture creation may allocate but never submits GPU work or blocks.
pub trait DeviceBackend {
    /// Synchronization primitive this backend signals on submission completion.
    type Fence: FencePrimitive;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> DeviceResult<TextureHandle>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    /// `None` while no swapchain exists (headless rendering, surface lost).
    fn swapchain_state(&self) -> Option<SwapchainState>;
}
