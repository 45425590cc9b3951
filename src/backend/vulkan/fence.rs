//! Vulkan fence wrapper.

use ash::khr::external_fence_fd;
use ash::vk;

use crate::backend::traits::{DeviceError, DeviceResult};
use crate::submit::FencePrimitive;

/// Owns one `vk::Fence`. The device handle is a loader clone; the fence is
/// destroyed on drop, the device is not.
pub struct VulkanFence {
    device: ash::Device,
    external_fence_fd_fn: Option<external_fence_fd::Device>,
    fence: vk::Fence,
}

impl VulkanFence {
    pub(crate) fn new(
        device: ash::Device,
        external_fence_fd_fn: Option<external_fence_fd::Device>,
    ) -> DeviceResult<Self> {
        let mut export_info = vk::ExportFenceCreateInfo {
            handle_types: vk::ExternalFenceHandleTypeFlags::SYNC_FD,
            ..Default::default()
        };
        let mut fence_info = vk::FenceCreateInfo::default();
        if external_fence_fd_fn.is_some() {
            fence_info = fence_info.push_next(&mut export_info);
        }
        let fence = unsafe {
            device
                .create_fence(&fence_info, None)
                .map_err(|e| DeviceError::FenceFailed(e.to_string()))?
        };
        Ok(Self {
            device,
            external_fence_fd_fn,
            fence,
        })
    }

    /// The underlying handle, for passing to `vkQueueSubmit`.
    pub fn raw(&self) -> vk::Fence {
        self.fence
    }
}

impl FencePrimitive for VulkanFence {
    fn is_signaled(&self) -> DeviceResult<bool> {
        unsafe {
            self.device
                .get_fence_status(self.fence)
                .map_err(|e| DeviceError::FenceFailed(e.to_string()))
        }
    }

    fn wait(&self, timeout_ns: u64) -> DeviceResult<bool> {
        match unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(DeviceError::FenceFailed(e.to_string())),
        }
    }

    fn export_sync_fd(&self) -> DeviceResult<i32> {
        let Some(fd_fn) = &self.external_fence_fd_fn else {
            return Err(DeviceError::FenceExportUnsupported);
        };
        let fd_info = vk::FenceGetFdInfoKHR {
            fence: self.fence,
            handle_type: vk::ExternalFenceHandleTypeFlags::SYNC_FD,
            ..Default::default()
        };
        unsafe {
            fd_fn.get_fence_fd(&fd_info).map_err(|e| {
                log::error!("sync fd export failed for fence {:?}: {e}", self.fence);
                DeviceError::FenceFailed(e.to_string())
            })
        }
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}
