//! Swapchain-backed texture caching.
//!
//! Per-frame rendering asks this cache for the drawable texture of the
//! current swapchain image and for the shared depth texture. Slots are
//! reused across frames while width, height, and format are unchanged;
//! any mismatch reallocates in place. Both accessors are queries with a
//! caching side effect: they may allocate, but never submit work or block.

use crate::backend::traits::{DeviceBackend, DeviceError, DeviceResult, TextureHandle};
use crate::backend::types::{TextureDescriptor, TextureFormat, TextureUsage};

#[derive(Debug, Clone, Copy)]
struct TextureSlot {
    texture: TextureHandle,
    width: u32,
    height: u32,
    format: TextureFormat,
}

impl TextureSlot {
    fn matches(&self, width: u32, height: u32, format: TextureFormat) -> bool {
        self.width == width && self.height == height && self.format == format
    }
}

/// One depth slot plus a growable color slot per swapchain image index.
///
/// Slots are owned exclusively by the device that created the cache;
/// mutation happens only through the accessors below, which is what keeps
/// the reallocate-on-mismatch invariant.
#[derive(Default)]
pub struct SwapchainResourceCache {
    depth: Option<TextureSlot>,
    drawables: Vec<Option<TextureSlot>>,
}

impl SwapchainResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The drawable texture backing the current swapchain image.
    ///
    /// No swapchain is a valid transient state (headless rendering): every
    /// cached color slot is released and `Ok(None)` returned, so a later
    /// swapchain never sees stale geometry.
    pub fn current_drawable<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
    ) -> DeviceResult<Option<TextureHandle>> {
        let Some(state) = backend.swapchain_state() else {
            self.release_drawables(backend);
            return Ok(None);
        };
        let Some(format) = state.color_format else {
            return Err(DeviceError::UnsupportedFormat(
                "surface color format has no texture equivalent",
            ));
        };

        let index = state.image_index as usize;
        if index >= self.drawables.len() {
            self.drawables.resize_with(index + 1, || None);
        }

        if let Some(slot) = &self.drawables[index] {
            if slot.matches(state.width, state.height, format) {
                return Ok(Some(slot.texture));
            }
        }

        if let Some(old) = self.drawables[index].take() {
            backend.destroy_texture(old.texture);
        }
        let desc = TextureDescriptor {
            label: Some(format!("swapchain drawable {index}")),
            width: state.width,
            height: state.height,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT,
        };
        let texture = backend.create_texture(&desc)?;
        self.drawables[index] = Some(TextureSlot {
            texture,
            width: state.width,
            height: state.height,
            format,
        });
        Ok(Some(texture))
    }

    /// The shared depth texture at the given extent. Depth is not
    /// multi-buffered, so a single slot serves every swapchain image.
    pub fn current_depth<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> DeviceResult<Option<TextureHandle>> {
        let Some(state) = backend.swapchain_state() else {
            self.release_depth(backend);
            return Ok(None);
        };
        let Some(format) = state.depth_format else {
            return Err(DeviceError::UnsupportedFormat(
                "surface depth format has no texture equivalent",
            ));
        };

        if let Some(slot) = &self.depth {
            if slot.matches(width, height, format) {
                return Ok(Some(slot.texture));
            }
        }

        if let Some(old) = self.depth.take() {
            backend.destroy_texture(old.texture);
        }
        let desc = TextureDescriptor {
            label: Some("swapchain depth".to_string()),
            width,
            height,
            format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        };
        let texture = backend.create_texture(&desc)?;
        self.depth = Some(TextureSlot {
            texture,
            width,
            height,
            format,
        });
        Ok(Some(texture))
    }

    /// Release every cached slot. Used at device teardown and when the
    /// swapchain is destroyed out from under the cache.
    pub fn invalidate<B: DeviceBackend>(&mut self, backend: &mut B) {
        self.release_drawables(backend);
        self.release_depth(backend);
    }

    fn release_drawables<B: DeviceBackend>(&mut self, backend: &mut B) {
        for slot in self.drawables.drain(..).flatten() {
            backend.destroy_texture(slot.texture);
        }
    }

    fn release_depth<B: DeviceBackend>(&mut self, backend: &mut B) {
        if let Some(slot) = self.depth.take() {
            backend.destroy_texture(slot.texture);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::backend::traits::SwapchainState;
    use crate::submit::test_support::MockFence;
    use std::collections::HashSet;

    /// Counts allocations and releases; swapchain state is set by hand.
    #[derive(Default)]
    pub(crate) struct MockBackend {
        pub(crate) state: Option<SwapchainState>,
        pub(crate) destroyed: Vec<u64>,
        live: HashSet<u64>,
        next_id: u64,
    }

    impl MockBackend {
        pub(crate) fn with_swapchain(width: u32, height: u32) -> Self {
            Self {
                state: Some(SwapchainState {
                    width,
                    height,
                    image_index: 0,
                    color_format: Some(TextureFormat::Bgra8UnormSrgb),
                    depth_format: Some(TextureFormat::Depth32Float),
                }),
                ..Default::default()
            }
        }

        pub(crate) fn destroyed_count(&self, handle: TextureHandle) -> usize {
            self.destroyed.iter().filter(|&&h| h == handle.0).count()
        }
    }

    impl DeviceBackend for MockBackend {
        type Fence = MockFence;

        fn create_texture(&mut self, _desc: &TextureDescriptor) -> DeviceResult<TextureHandle> {
            self.next_id += 1;
            self.live.insert(self.next_id);
            Ok(TextureHandle(self.next_id))
        }

        fn destroy_texture(&mut self, texture: TextureHandle) {
            assert!(self.live.remove(&texture.0), "double free of {texture:?}");
            self.destroyed.push(texture.0);
        }

        fn swapchain_state(&self) -> Option<SwapchainState> {
            self.state
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockBackend;
    use super::*;

    #[test]
    fn drawable_is_cached_while_state_is_unchanged() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        let mut cache = SwapchainResourceCache::new();

        let first = cache.current_drawable(&mut backend).unwrap().unwrap();
        let second = cache.current_drawable(&mut backend).unwrap().unwrap();
        assert_eq!(first, second);
        assert!(backend.destroyed.is_empty());
    }

    #[test]
    fn resize_reallocates_and_releases_the_old_handle_once() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        let mut cache = SwapchainResourceCache::new();

        let old = cache.current_drawable(&mut backend).unwrap().unwrap();
        if let Some(state) = backend.state.as_mut() {
            state.width = 1024;
        }
        let new = cache.current_drawable(&mut backend).unwrap().unwrap();
        assert_ne!(old, new);
        assert_eq!(backend.destroyed_count(old), 1);

        // Stable again at the new extent.
        assert_eq!(cache.current_drawable(&mut backend).unwrap().unwrap(), new);
        assert_eq!(backend.destroyed.len(), 1);
    }

    #[test]
    fn format_change_reallocates() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        let mut cache = SwapchainResourceCache::new();

        let old = cache.current_drawable(&mut backend).unwrap().unwrap();
        if let Some(state) = backend.state.as_mut() {
            state.color_format = Some(TextureFormat::Rgba16Float);
        }
        let new = cache.current_drawable(&mut backend).unwrap().unwrap();
        assert_ne!(old, new);
        assert_eq!(backend.destroyed_count(old), 1);
    }

    #[test]
    fn slots_are_kept_per_image_index() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        let mut cache = SwapchainResourceCache::new();

        let at_zero = cache.current_drawable(&mut backend).unwrap().unwrap();
        if let Some(state) = backend.state.as_mut() {
            state.image_index = 2;
        }
        let at_two = cache.current_drawable(&mut backend).unwrap().unwrap();
        assert_ne!(at_zero, at_two);
        assert!(backend.destroyed.is_empty());

        if let Some(state) = backend.state.as_mut() {
            state.image_index = 0;
        }
        assert_eq!(cache.current_drawable(&mut backend).unwrap().unwrap(), at_zero);
    }

    #[test]
    fn missing_swapchain_clears_cached_drawables() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        let mut cache = SwapchainResourceCache::new();

        let old = cache.current_drawable(&mut backend).unwrap().unwrap();

        backend.state = None;
        assert!(cache.current_drawable(&mut backend).unwrap().is_none());
        assert_eq!(backend.destroyed_count(old), 1);

        // A fresh swapchain reallocates rather than reusing stale geometry.
        backend.state = MockBackend::with_swapchain(800, 600).state;
        let fresh = cache.current_drawable(&mut backend).unwrap().unwrap();
        assert_ne!(fresh, old);
    }

    #[test]
    fn untranslatable_color_format_is_an_error() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        if let Some(state) = backend.state.as_mut() {
            state.color_format = None;
        }
        let mut cache = SwapchainResourceCache::new();
        assert!(matches!(
            cache.current_drawable(&mut backend),
            Err(DeviceError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn depth_slot_follows_the_same_reuse_policy() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        let mut cache = SwapchainResourceCache::new();

        let first = cache.current_depth(&mut backend, 800, 600).unwrap().unwrap();
        let second = cache.current_depth(&mut backend, 800, 600).unwrap().unwrap();
        assert_eq!(first, second);

        let resized = cache.current_depth(&mut backend, 640, 480).unwrap().unwrap();
        assert_ne!(first, resized);
        assert_eq!(backend.destroyed_count(first), 1);
    }

    #[test]
    fn untranslatable_depth_format_is_an_error() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        if let Some(state) = backend.state.as_mut() {
            state.depth_format = None;
        }
        let mut cache = SwapchainResourceCache::new();
        assert!(matches!(
            cache.current_depth(&mut backend, 800, 600),
            Err(DeviceError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_swapchain_clears_the_depth_slot() {
        let mut backend = MockBackend::with_swapchain(800, 600);
        let mut cache = SwapchainResourceCache::new();

        let old = cache.current_depth(&mut backend, 800, 600).unwrap().unwrap();
        backend.state = None;
        assert!(cache.current_depth(&mut backend, 800, 600).unwrap().is_none());
        assert_eq!(backend.destroyed_count(old), 1);
    }
}
