//! Vulkan backend implementation using ash
//!
//! The instance, physical device, and logical device are created by the
//! embedding application and passed in as handles; this layer never
//! constructs or destroys them. It owns everything downstream: the
//! allocator, textures, fences, and the swapchain.

pub mod features;
pub mod fence;
pub mod swapchain;

use std::collections::HashMap;
use std::sync::Arc;

use ash::khr::{external_fence_fd, surface, swapchain as khr_swapchain};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::backend::traits::{DeviceBackend, DeviceError, DeviceResult, SwapchainState, TextureHandle};
use crate::backend::types::{TextureDescriptor, TextureUsage};
use crate::features::{
    ApiVersion, DeviceFeatures, FeatureCheck, FeatureConfig, FeatureGroup, KHR_EXTERNAL_FENCE_FD,
};

pub use fence::VulkanFence;
pub use features::{required_extension_names, VulkanDriverQuery, VulkanFeatureChain};
pub use swapchain::VulkanSwapchain;

/// Run the full capability negotiation against one physical device:
/// request the defaults for `config`, query what the driver offers, and
/// validate the two against each other.
pub fn negotiate_features(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    version: ApiVersion,
    config: FeatureConfig,
) -> DeviceResult<(DeviceFeatures, FeatureCheck)> {
    let query = VulkanDriverQuery::new(instance, physical_device);

    let mut requested = DeviceFeatures::new(version, config);
    requested.populate_available(&query)?;
    requested.request_defaults();

    let mut available = DeviceFeatures::new(version, config);
    available.populate_available(&query)?;

    let check = requested.validate(&available)?;
    Ok((requested, check))
}

struct VkTexture {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Allocation,
    format: vk::Format,
    _extent: vk::Extent3D,
}

/// Vulkan implementation of the backend seam.
pub struct VulkanDevice {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    swapchain_fn: khr_swapchain::Device,
    external_fence_fd_fn: Option<external_fence_fd::Device>,
    allocator: Option<Arc<Mutex<Allocator>>>,

    swapchain: Option<VulkanSwapchain>,

    textures: HashMap<u64, VkTexture>,
    next_texture_id: u64,
}

impl VulkanDevice {
    /// Wrap externally created handles. `features` must be the negotiated
    /// set the device was created with; it decides which optional loaders
    /// come up.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
        features: &DeviceFeatures,
    ) -> DeviceResult<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: features.is_linked(FeatureGroup::BufferDeviceAddress),
            allocation_sizes: Default::default(),
        })
        .map_err(|e| DeviceError::InitializationFailed(e.to_string()))?;

        let swapchain_fn = khr_swapchain::Device::new(instance, &device);
        let external_fence_fd_fn = if features.has_extension(KHR_EXTERNAL_FENCE_FD) {
            Some(external_fence_fd::Device::new(instance, &device))
        } else {
            None
        };

        Ok(Self {
            physical_device,
            device,
            swapchain_fn,
            external_fence_fd_fn,
            allocator: Some(Arc::new(Mutex::new(allocator))),
            swapchain: None,
            textures: HashMap::new(),
            next_texture_id: 1,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Create an unsignaled fence to hand to a queue submission. When the
    /// external fence fd extension is up the fence is created exportable.
    pub fn create_fence(&self) -> DeviceResult<VulkanFence> {
        VulkanFence::new(self.device.clone(), self.external_fence_fd_fn.clone())
    }

    /// (Re)create the swapchain for a surface. Any previous swapchain is
    /// destroyed after the device goes idle.
    pub fn configure_swapchain(
        &mut self,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> DeviceResult<()> {
        if self.swapchain.take().is_some() {
            unsafe {
                self.device.device_wait_idle().ok();
            }
        }
        self.swapchain = Some(VulkanSwapchain::new(
            self.device.clone(),
            self.swapchain_fn.clone(),
            surface_fn,
            self.physical_device,
            surface,
            width,
            height,
            vsync,
        )?);
        Ok(())
    }

    /// Drop the swapchain, e.g. when the surface is lost. Cached textures
    /// keyed to it are cleared by the resource cache on its next access.
    pub fn release_swapchain(&mut self) {
        if self.swapchain.take().is_some() {
            unsafe {
                self.device.device_wait_idle().ok();
            }
        }
    }

    pub fn swapchain(&mut self) -> Option<&mut VulkanSwapchain> {
        self.swapchain.as_mut()
    }

    pub fn texture_image(&self, texture: TextureHandle) -> Option<vk::Image> {
        self.textures.get(&texture.0).map(|t| t.image)
    }

    pub fn texture_view(&self, texture: TextureHandle) -> Option<vk::ImageView> {
        self.textures.get(&texture.0).map(|t| t.view)
    }

    pub fn texture_vk_format(&self, texture: TextureHandle) -> Option<vk::Format> {
        self.textures.get(&texture.0).map(|t| t.format)
    }
}

impl DeviceBackend for VulkanDevice {
    type Fence = VulkanFence;

    fn create_texture(&mut self, desc: &TextureDescriptor) -> DeviceResult<TextureHandle> {
        unsafe {
            let format = swapchain::convert_format(desc.format);
            let is_depth = desc.format.is_depth();

            let mut usage = vk::ImageUsageFlags::empty();
            if desc.usage.contains(TextureUsage::COPY_SRC) {
                usage |= vk::ImageUsageFlags::TRANSFER_SRC;
            }
            if desc.usage.contains(TextureUsage::COPY_DST) {
                usage |= vk::ImageUsageFlags::TRANSFER_DST;
            }
            if desc.usage.contains(TextureUsage::TEXTURE_BINDING) {
                usage |= vk::ImageUsageFlags::SAMPLED;
            }
            if desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
                if is_depth {
                    usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
                } else {
                    usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
                }
            }

            let extent = vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            };

            let image_info = vk::ImageCreateInfo {
                image_type: vk::ImageType::TYPE_2D,
                extent,
                mip_levels: 1,
                array_layers: 1,
                format,
                tiling: vk::ImageTiling::OPTIMAL,
                initial_layout: vk::ImageLayout::UNDEFINED,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                samples: vk::SampleCountFlags::TYPE_1,
                ..Default::default()
            };

            let image = self
                .device
                .create_image(&image_info, None)
                .map_err(|e| DeviceError::TextureCreationFailed(e.to_string()))?;

            let requirements = self.device.get_image_memory_requirements(image);

            let allocation = self
                .allocator
                .as_ref()
                .ok_or_else(|| DeviceError::TextureCreationFailed("allocator not available".into()))?
                .lock()
                .allocate(&AllocationCreateDesc {
                    name: desc.label.as_deref().unwrap_or("texture"),
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| DeviceError::TextureCreationFailed(e.to_string()))?;

            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| DeviceError::TextureCreationFailed(e.to_string()))?;

            let aspect_mask = if is_depth {
                vk::ImageAspectFlags::DEPTH
            } else {
                vk::ImageAspectFlags::COLOR
            };
            let view_info = vk::ImageViewCreateInfo {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = self
                .device
                .create_image_view(&view_info, None)
                .map_err(|e| DeviceError::TextureCreationFailed(e.to_string()))?;

            let id = self.next_texture_id;
            self.next_texture_id += 1;
            self.textures.insert(
                id,
                VkTexture {
                    image,
                    view,
                    allocation,
                    format,
                    _extent: extent,
                },
            );

            Ok(TextureHandle(id))
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(vk_texture) = self.textures.remove(&texture.0) {
            unsafe {
                self.device.destroy_image_view(vk_texture.view, None);
                self.device.destroy_image(vk_texture.image, None);
                if let Some(ref allocator) = self.allocator {
                    let _ = allocator.lock().free(vk_texture.allocation);
                }
            }
        }
    }

    fn swapchain_state(&self) -> Option<SwapchainState> {
        self.swapchain.as_ref().map(|sc| sc.state())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            if let Some(ref allocator) = self.allocator {
                for (_, texture) in self.textures.drain() {
                    self.device.destroy_image_view(texture.view, None);
                    self.device.destroy_image(texture.image, None);
                    let _ = allocator.lock().free(texture.allocation);
                }
            }

            // The swapchain destroys its own views; the allocator must go
            // before the externally owned device does.
            self.swapchain.take();
            drop(self.allocator.take());
        }
    }
}
