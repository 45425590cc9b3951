//! Backend abstraction layer
//!
//! Provides the traits and types the device layer is written against and
//! that the Vulkan backend implements.

pub mod traits;
pub mod types;
pub mod vulkan;

pub use traits::*;
pub use types::*;
