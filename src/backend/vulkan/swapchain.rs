//! Vulkan swapchain ownership and state reporting.

use ash::khr::{surface, swapchain};
use ash::vk;

use crate::backend::traits::{DeviceError, DeviceResult, SwapchainState};
use crate::backend::types::TextureFormat;

/// Translate a surface format into the backend-agnostic one. `None` means
/// the device layer has no equivalent and must refuse to cache textures in
/// this format rather than guess.
pub(crate) fn convert_format_back(format: vk::Format) -> Option<TextureFormat> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(TextureFormat::Rgba8Unorm),
        vk::Format::R8G8B8A8_SRGB => Some(TextureFormat::Rgba8UnormSrgb),
        vk::Format::B8G8R8A8_UNORM => Some(TextureFormat::Bgra8Unorm),
        vk::Format::B8G8R8A8_SRGB => Some(TextureFormat::Bgra8UnormSrgb),
        vk::Format::R16G16B16A16_SFLOAT => Some(TextureFormat::Rgba16Float),
        vk::Format::D16_UNORM => Some(TextureFormat::Depth16Unorm),
        vk::Format::D32_SFLOAT => Some(TextureFormat::Depth32Float),
        vk::Format::D24_UNORM_S8_UINT => Some(TextureFormat::Depth24PlusStencil8),
        _ => None,
    }
}

pub(crate) fn convert_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Depth16Unorm => vk::Format::D16_UNORM,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Owns one `vk::SwapchainKHR` plus its image views. The surface itself is
/// externally owned and outlives the swapchain.
pub struct VulkanSwapchain {
    device: ash::Device,
    swapchain_fn: swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,
    current_image_index: u32,
}

impl VulkanSwapchain {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: ash::Device,
        swapchain_fn: swapchain::Device,
        surface_fn: &surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> DeviceResult<Self> {
        unsafe {
            let capabilities = surface_fn
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(|e| DeviceError::SwapchainCreationFailed(e.to_string()))?;

            let formats = surface_fn
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| DeviceError::SwapchainCreationFailed(e.to_string()))?;
            if formats.is_empty() {
                return Err(DeviceError::SwapchainCreationFailed(
                    "surface reports no formats".into(),
                ));
            }

            let present_modes = surface_fn
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(|e| DeviceError::SwapchainCreationFailed(e.to_string()))?;

            // Prefer an sRGB format, fall back to whatever comes first.
            let format = formats
                .iter()
                .find(|f| {
                    f.format == vk::Format::B8G8R8A8_SRGB
                        && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                })
                .unwrap_or(&formats[0]);

            let present_mode = if vsync {
                vk::PresentModeKHR::FIFO
            } else {
                present_modes
                    .iter()
                    .copied()
                    .find(|&m| m == vk::PresentModeKHR::MAILBOX)
                    .unwrap_or(vk::PresentModeKHR::FIFO)
            };

            let extent = if capabilities.current_extent.width != u32::MAX {
                capabilities.current_extent
            } else {
                vk::Extent2D {
                    width: width.clamp(
                        capabilities.min_image_extent.width,
                        capabilities.max_image_extent.width,
                    ),
                    height: height.clamp(
                        capabilities.min_image_extent.height,
                        capabilities.max_image_extent.height,
                    ),
                }
            };

            let image_count = (capabilities.min_image_count + 1).min(
                if capabilities.max_image_count > 0 {
                    capabilities.max_image_count
                } else {
                    u32::MAX
                },
            );

            let swapchain_info = vk::SwapchainCreateInfoKHR {
                surface,
                min_image_count: image_count,
                image_format: format.format,
                image_color_space: format.color_space,
                image_extent: extent,
                image_array_layers: 1,
                image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
                image_sharing_mode: vk::SharingMode::EXCLUSIVE,
                pre_transform: capabilities.current_transform,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                present_mode,
                clipped: vk::TRUE,
                ..Default::default()
            };

            let swapchain = swapchain_fn
                .create_swapchain(&swapchain_info, None)
                .map_err(|e| DeviceError::SwapchainCreationFailed(e.to_string()))?;

            let images = swapchain_fn
                .get_swapchain_images(swapchain)
                .map_err(|e| DeviceError::SwapchainCreationFailed(e.to_string()))?;

            let image_views = images
                .iter()
                .map(|&image| {
                    let view_info = vk::ImageViewCreateInfo {
                        image,
                        view_type: vk::ImageViewType::TYPE_2D,
                        format: format.format,
                        components: vk::ComponentMapping::default(),
                        subresource_range: vk::ImageSubresourceRange {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            base_mip_level: 0,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        ..Default::default()
                    };
                    device.create_image_view(&view_info, None)
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DeviceError::SwapchainCreationFailed(e.to_string()))?;

            Ok(Self {
                device,
                swapchain_fn,
                swapchain,
                images,
                image_views,
                format: format.format,
                depth_format: vk::Format::D32_SFLOAT,
                extent,
                current_image_index: 0,
            })
        }
    }

    /// Acquire the next presentable image; the index feeds the resource
    /// cache until the following acquire.
    pub fn acquire_next_image(&mut self, semaphore: vk::Semaphore) -> DeviceResult<u32> {
        let (index, _suboptimal) = unsafe {
            self.swapchain_fn
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
                .map_err(|e| DeviceError::SwapchainCreationFailed(e.to_string()))?
        };
        self.current_image_index = index;
        Ok(index)
    }

    pub fn current_image(&self) -> vk::Image {
        self.images[self.current_image_index as usize]
    }

    pub fn current_image_view(&self) -> vk::ImageView {
        self.image_views[self.current_image_index as usize]
    }

    pub fn vk_format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn state(&self) -> SwapchainState {
        SwapchainState {
            width: self.extent.width,
            height: self.extent.height,
            image_index: self.current_image_index,
            color_format: convert_format_back(self.format),
            depth_format: convert_format_back(self.depth_format),
        }
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_fn.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_formats_translate_both_ways() {
        for format in [
            TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float,
        ] {
            assert_eq!(convert_format_back(convert_format(format)), Some(format));
        }
    }

    #[test]
    fn unknown_surface_format_has_no_equivalent() {
        assert_eq!(convert_format_back(vk::Format::R5G6B5_UNORM_PACK16), None);
        assert_eq!(convert_format_back(vk::Format::UNDEFINED), None);
    }
}
