//! Vulkan side of capability negotiation.
//!
//! [`VulkanDriverQuery`] answers the driver query interface with real
//! `vkGetPhysicalDeviceFeatures2` data; [`VulkanFeatureChain`] turns a
//! negotiated [`DeviceFeatures`] back into the pNext chain that device
//! creation needs.

use std::ffi::CStr;

use ash::vk;

use crate::backend::traits::{DeviceError, DeviceResult};
use crate::features::{
    ApiVersion, DeviceFeatures, DriverQuery, FeatureGroup, EXT_DESCRIPTOR_INDEXING,
    EXT_INDEX_TYPE_UINT8, KHR_BUFFER_DEVICE_ADDRESS, KHR_SYNCHRONIZATION_2,
    KHR_TIMELINE_SEMAPHORE,
};

fn from_bool32(value: vk::Bool32) -> bool {
    value == vk::TRUE
}

fn to_bool32(value: bool) -> vk::Bool32 {
    if value {
        vk::TRUE
    } else {
        vk::FALSE
    }
}

/// Issues capability queries against one physical device.
pub struct VulkanDriverQuery<'a> {
    instance: &'a ash::Instance,
    physical_device: vk::PhysicalDevice,
}

impl<'a> VulkanDriverQuery<'a> {
    pub fn new(instance: &'a ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        Self {
            instance,
            physical_device,
        }
    }
}

impl DriverQuery for VulkanDriverQuery<'_> {
    fn device_extensions(&self) -> DeviceResult<Vec<String>> {
        let properties = unsafe {
            self.instance
                .enumerate_device_extension_properties(self.physical_device)
                .map_err(|e| DeviceError::DriverQueryFailed(e.to_string()))?
        };
        Ok(properties
            .iter()
            .filter_map(|ext| {
                ext.extension_name_as_c_str()
                    .ok()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect())
    }

    fn query_features(&self, features: &mut DeviceFeatures) -> DeviceResult<()> {
        let linked: Vec<FeatureGroup> = features.linked_groups().to_vec();

        let mut ycbcr = vk::PhysicalDeviceSamplerYcbcrConversionFeatures::default();
        let mut draw_parameters = vk::PhysicalDeviceShaderDrawParametersFeatures::default();
        let mut multiview = vk::PhysicalDeviceMultiviewFeatures::default();
        let mut storage_16bit = vk::PhysicalDevice16BitStorageFeatures::default();
        let mut float16_int8 = vk::PhysicalDeviceShaderFloat16Int8Features::default();
        let mut buffer_device_address = vk::PhysicalDeviceBufferDeviceAddressFeatures::default();
        let mut descriptor_indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
        let mut index_type_uint8 = vk::PhysicalDeviceIndexTypeUint8FeaturesEXT::default();
        let mut synchronization2 = vk::PhysicalDeviceSynchronization2Features::default();
        let mut timeline_semaphore = vk::PhysicalDeviceTimelineSemaphoreFeatures::default();

        // Chain up exactly the linked groups so the driver only fills what
        // negotiation can use.
        let mut features2 = vk::PhysicalDeviceFeatures2::default();
        if linked.contains(&FeatureGroup::SamplerYcbcrConversion) {
            features2 = features2.push_next(&mut ycbcr);
        }
        if linked.contains(&FeatureGroup::ShaderDrawParameters) {
            features2 = features2.push_next(&mut draw_parameters);
        }
        if linked.contains(&FeatureGroup::Multiview) {
            features2 = features2.push_next(&mut multiview);
        }
        if linked.contains(&FeatureGroup::Storage16Bit) {
            features2 = features2.push_next(&mut storage_16bit);
        }
        if linked.contains(&FeatureGroup::ShaderFloat16Int8) {
            features2 = features2.push_next(&mut float16_int8);
        }
        if linked.contains(&FeatureGroup::BufferDeviceAddress) {
            features2 = features2.push_next(&mut buffer_device_address);
        }
        if linked.contains(&FeatureGroup::DescriptorIndexing) {
            features2 = features2.push_next(&mut descriptor_indexing);
        }
        if linked.contains(&FeatureGroup::IndexTypeUint8) {
            features2 = features2.push_next(&mut index_type_uint8);
        }
        if linked.contains(&FeatureGroup::Synchronization2) {
            features2 = features2.push_next(&mut synchronization2);
        }
        if linked.contains(&FeatureGroup::TimelineSemaphore) {
            features2 = features2.push_next(&mut timeline_semaphore);
        }

        unsafe {
            self.instance
                .get_physical_device_features2(self.physical_device, &mut features2);
        }
        let core = features2.features;

        {
            let g = FeatureGroup::Core11;
            features.set_available(g, "dual_src_blend", from_bool32(core.dual_src_blend));
            features.set_available(g, "shader_int16", from_bool32(core.shader_int16));
            features.set_available(g, "multi_draw_indirect", from_bool32(core.multi_draw_indirect));
            features.set_available(
                g,
                "draw_indirect_first_instance",
                from_bool32(core.draw_indirect_first_instance),
            );
            features.set_available(g, "depth_bias_clamp", from_bool32(core.depth_bias_clamp));
            features.set_available(g, "fill_mode_non_solid", from_bool32(core.fill_mode_non_solid));
        }
        features.set_available(
            FeatureGroup::SamplerYcbcrConversion,
            "sampler_ycbcr_conversion",
            from_bool32(ycbcr.sampler_ycbcr_conversion),
        );
        features.set_available(
            FeatureGroup::ShaderDrawParameters,
            "shader_draw_parameters",
            from_bool32(draw_parameters.shader_draw_parameters),
        );
        features.set_available(
            FeatureGroup::Multiview,
            "multiview",
            from_bool32(multiview.multiview),
        );
        features.set_available(
            FeatureGroup::Storage16Bit,
            "storage_buffer_16bit_access",
            from_bool32(storage_16bit.storage_buffer16_bit_access),
        );
        features.set_available(
            FeatureGroup::ShaderFloat16Int8,
            "shader_float16",
            from_bool32(float16_int8.shader_float16),
        );
        features.set_available(
            FeatureGroup::ShaderFloat16Int8,
            "shader_int8",
            from_bool32(float16_int8.shader_int8),
        );
        features.set_available(
            FeatureGroup::BufferDeviceAddress,
            "buffer_device_address",
            from_bool32(buffer_device_address.buffer_device_address),
        );
        {
            let g = FeatureGroup::DescriptorIndexing;
            let di = &descriptor_indexing;
            features.set_available(
                g,
                "shader_sampled_image_array_non_uniform_indexing",
                from_bool32(di.shader_sampled_image_array_non_uniform_indexing),
            );
            features.set_available(
                g,
                "descriptor_binding_uniform_buffer_update_after_bind",
                from_bool32(di.descriptor_binding_uniform_buffer_update_after_bind),
            );
            features.set_available(
                g,
                "descriptor_binding_sampled_image_update_after_bind",
                from_bool32(di.descriptor_binding_sampled_image_update_after_bind),
            );
            features.set_available(
                g,
                "descriptor_binding_storage_image_update_after_bind",
                from_bool32(di.descriptor_binding_storage_image_update_after_bind),
            );
            features.set_available(
                g,
                "descriptor_binding_storage_buffer_update_after_bind",
                from_bool32(di.descriptor_binding_storage_buffer_update_after_bind),
            );
            features.set_available(
                g,
                "descriptor_binding_update_unused_while_pending",
                from_bool32(di.descriptor_binding_update_unused_while_pending),
            );
            features.set_available(
                g,
                "descriptor_binding_partially_bound",
                from_bool32(di.descriptor_binding_partially_bound),
            );
            features.set_available(
                g,
                "runtime_descriptor_array",
                from_bool32(di.runtime_descriptor_array),
            );
        }
        features.set_available(
            FeatureGroup::IndexTypeUint8,
            "index_type_uint8",
            from_bool32(index_type_uint8.index_type_uint8),
        );
        features.set_available(
            FeatureGroup::Synchronization2,
            "synchronization2",
            from_bool32(synchronization2.synchronization2),
        );
        features.set_available(
            FeatureGroup::TimelineSemaphore,
            "timeline_semaphore",
            from_bool32(timeline_semaphore.timeline_semaphore),
        );

        Ok(())
    }
}

/// Owns the feature structs a `vk::DeviceCreateInfo` pNext chain points at.
///
/// Built from a negotiated [`DeviceFeatures`]; only linked groups get a
/// struct, and only requested sub-features are turned on.
#[derive(Default)]
pub struct VulkanFeatureChain {
    core: vk::PhysicalDeviceFeatures,
    ycbcr: Option<vk::PhysicalDeviceSamplerYcbcrConversionFeatures<'static>>,
    draw_parameters: Option<vk::PhysicalDeviceShaderDrawParametersFeatures<'static>>,
    multiview: Option<vk::PhysicalDeviceMultiviewFeatures<'static>>,
    storage_16bit: Option<vk::PhysicalDevice16BitStorageFeatures<'static>>,
    float16_int8: Option<vk::PhysicalDeviceShaderFloat16Int8Features<'static>>,
    buffer_device_address: Option<vk::PhysicalDeviceBufferDeviceAddressFeatures<'static>>,
    descriptor_indexing: Option<vk::PhysicalDeviceDescriptorIndexingFeatures<'static>>,
    index_type_uint8: Option<vk::PhysicalDeviceIndexTypeUint8FeaturesEXT<'static>>,
    synchronization2: Option<vk::PhysicalDeviceSynchronization2Features<'static>>,
    timeline_semaphore: Option<vk::PhysicalDeviceTimelineSemaphoreFeatures<'static>>,
}

impl VulkanFeatureChain {
    pub fn from_features(features: &DeviceFeatures) -> Self {
        let req =
            |group: FeatureGroup, name: &str| to_bool32(features.requested(group, name));

        let mut chain = Self {
            core: vk::PhysicalDeviceFeatures {
                dual_src_blend: req(FeatureGroup::Core11, "dual_src_blend"),
                shader_int16: req(FeatureGroup::Core11, "shader_int16"),
                multi_draw_indirect: req(FeatureGroup::Core11, "multi_draw_indirect"),
                draw_indirect_first_instance: req(
                    FeatureGroup::Core11,
                    "draw_indirect_first_instance",
                ),
                depth_bias_clamp: req(FeatureGroup::Core11, "depth_bias_clamp"),
                fill_mode_non_solid: req(FeatureGroup::Core11, "fill_mode_non_solid"),
                ..Default::default()
            },
            ..Default::default()
        };

        if features.is_linked(FeatureGroup::SamplerYcbcrConversion) {
            chain.ycbcr = Some(vk::PhysicalDeviceSamplerYcbcrConversionFeatures {
                sampler_ycbcr_conversion: req(
                    FeatureGroup::SamplerYcbcrConversion,
                    "sampler_ycbcr_conversion",
                ),
                ..Default::default()
            });
        }
        if features.is_linked(FeatureGroup::ShaderDrawParameters) {
            chain.draw_parameters = Some(vk::PhysicalDeviceShaderDrawParametersFeatures {
                shader_draw_parameters: req(
                    FeatureGroup::ShaderDrawParameters,
                    "shader_draw_parameters",
                ),
                ..Default::default()
            });
        }
        if features.is_linked(FeatureGroup::Multiview) {
            chain.multiview = Some(vk::PhysicalDeviceMultiviewFeatures {
                multiview: req(FeatureGroup::Multiview, "multiview"),
                ..Default::default()
            });
        }
        if features.is_linked(FeatureGroup::Storage16Bit) {
            chain.storage_16bit = Some(vk::PhysicalDevice16BitStorageFeatures {
                storage_buffer16_bit_access: req(
                    FeatureGroup::Storage16Bit,
                    "storage_buffer_16bit_access",
                ),
                ..Default::default()
            });
        }
        if features.is_linked(FeatureGroup::ShaderFloat16Int8) {
            chain.float16_int8 = Some(vk::PhysicalDeviceShaderFloat16Int8Features {
                shader_float16: req(FeatureGroup::ShaderFloat16Int8, "shader_float16"),
                shader_int8: req(FeatureGroup::ShaderFloat16Int8, "shader_int8"),
                ..Default::default()
            });
        }
        if features.is_linked(FeatureGroup::BufferDeviceAddress) {
            chain.buffer_device_address =
                Some(vk::PhysicalDeviceBufferDeviceAddressFeatures {
                    buffer_device_address: req(
                        FeatureGroup::BufferDeviceAddress,
                        "buffer_device_address",
                    ),
                    ..Default::default()
                });
        }
        if features.is_linked(FeatureGroup::DescriptorIndexing) {
            let g = FeatureGroup::DescriptorIndexing;
            chain.descriptor_indexing = Some(vk::PhysicalDeviceDescriptorIndexingFeatures {
                shader_sampled_image_array_non_uniform_indexing: req(
                    g,
                    "shader_sampled_image_array_non_uniform_indexing",
                ),
                descriptor_binding_uniform_buffer_update_after_bind: req(
                    g,
                    "descriptor_binding_uniform_buffer_update_after_bind",
                ),
                descriptor_binding_sampled_image_update_after_bind: req(
                    g,
                    "descriptor_binding_sampled_image_update_after_bind",
                ),
                descriptor_binding_storage_image_update_after_bind: req(
                    g,
                    "descriptor_binding_storage_image_update_after_bind",
                ),
                descriptor_binding_storage_buffer_update_after_bind: req(
                    g,
                    "descriptor_binding_storage_buffer_update_after_bind",
                ),
                descriptor_binding_update_unused_while_pending: req(
                    g,
                    "descriptor_binding_update_unused_while_pending",
                ),
                descriptor_binding_partially_bound: req(g, "descriptor_binding_partially_bound"),
                runtime_descriptor_array: req(g, "runtime_descriptor_array"),
                ..Default::default()
            });
        }
        if features.is_linked(FeatureGroup::IndexTypeUint8) {
            chain.index_type_uint8 = Some(vk::PhysicalDeviceIndexTypeUint8FeaturesEXT {
                index_type_uint8: req(FeatureGroup::IndexTypeUint8, "index_type_uint8"),
                ..Default::default()
            });
        }
        if features.is_linked(FeatureGroup::Synchronization2) {
            chain.synchronization2 = Some(vk::PhysicalDeviceSynchronization2Features {
                synchronization2: req(FeatureGroup::Synchronization2, "synchronization2"),
                ..Default::default()
            });
        }
        if features.is_linked(FeatureGroup::TimelineSemaphore) {
            chain.timeline_semaphore = Some(vk::PhysicalDeviceTimelineSemaphoreFeatures {
                timeline_semaphore: req(FeatureGroup::TimelineSemaphore, "timeline_semaphore"),
                ..Default::default()
            });
        }

        chain
    }

    /// Push every owned struct onto the device create info.
    pub fn add_to_device_create<'a>(
        &'a mut self,
        mut info: vk::DeviceCreateInfo<'a>,
    ) -> vk::DeviceCreateInfo<'a> {
        info = info.enabled_features(&self.core);
        if let Some(feature) = self.ycbcr.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.draw_parameters.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.multiview.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.storage_16bit.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.float16_int8.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.buffer_device_address.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.descriptor_indexing.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.index_type_uint8.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.synchronization2.as_mut() {
            info = info.push_next(feature);
        }
        if let Some(feature) = self.timeline_semaphore.as_mut() {
            info = info.push_next(feature);
        }
        info
    }
}

/// Device extensions the linked chain relies on at the negotiated version.
/// Core-promoted groups need no extension once the version covers them.
pub fn required_extension_names(features: &DeviceFeatures) -> Vec<&'static CStr> {
    let mut names: Vec<&'static CStr> = vec![ash::khr::swapchain::NAME];
    let version = features.version();

    let mut push_if = |linked: bool, promoted: ApiVersion, registered: &str, name: &'static CStr| {
        if linked && version < promoted && features.has_extension(registered) {
            names.push(name);
        }
    };
    push_if(
        features.is_linked(FeatureGroup::BufferDeviceAddress),
        ApiVersion::V1_2,
        KHR_BUFFER_DEVICE_ADDRESS,
        ash::khr::buffer_device_address::NAME,
    );
    push_if(
        features.is_linked(FeatureGroup::DescriptorIndexing),
        ApiVersion::V1_2,
        EXT_DESCRIPTOR_INDEXING,
        ash::ext::descriptor_indexing::NAME,
    );
    push_if(
        features.is_linked(FeatureGroup::IndexTypeUint8),
        ApiVersion::V1_3,
        EXT_INDEX_TYPE_UINT8,
        ash::ext::index_type_uint8::NAME,
    );
    push_if(
        features.is_linked(FeatureGroup::Synchronization2),
        ApiVersion::V1_3,
        KHR_SYNCHRONIZATION_2,
        ash::khr::synchronization2::NAME,
    );
    push_if(
        features.is_linked(FeatureGroup::TimelineSemaphore),
        ApiVersion::V1_2,
        KHR_TIMELINE_SEMAPHORE,
        ash::khr::timeline_semaphore::NAME,
    );
    if features.has_extension(crate::features::KHR_EXTERNAL_FENCE_FD) {
        names.push(ash::khr::external_fence_fd::NAME);
    }
    names
}
