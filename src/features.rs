//! GPU capability negotiation.
//!
//! At device creation the application builds a [`DeviceFeatures`] set,
//! requests the feature groups it needs, populates a second set with what
//! the driver actually supports, and validates one against the other. The
//! chain of capability descriptors is a fixed-order list; each descriptor
//! carries a gate deciding whether it participates at all (core version,
//! gating extension, configuration), and per-sub-feature requested and
//! available flags.

use std::fmt;

use crate::backend::traits::{DeviceError, DeviceResult};

/// Negotiated graphics API version, major.minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    pub const V1_1: Self = Self { major: 1, minor: 1 };
    pub const V1_2: Self = Self { major: 1, minor: 2 };
    pub const V1_3: Self = Self { major: 1, minor: 3 };
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// Device extensions that gate optional descriptors.
pub const EXT_DESCRIPTOR_INDEXING: &str = "VK_EXT_descriptor_indexing";
pub const KHR_BUFFER_DEVICE_ADDRESS: &str = "VK_KHR_buffer_device_address";
pub const EXT_INDEX_TYPE_UINT8: &str = "VK_EXT_index_type_uint8";
pub const KHR_SYNCHRONIZATION_2: &str = "VK_KHR_synchronization2";
pub const KHR_TIMELINE_SEMAPHORE: &str = "VK_KHR_timeline_semaphore";
pub const KHR_EXTERNAL_FENCE_FD: &str = "VK_KHR_external_fence_fd";

/// Which optional feature groups the application wants enabled at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureConfig {
    pub enable_descriptor_indexing: bool,
    pub enable_buffer_device_address: bool,
    pub enable_storage_buffer_16bit_access: bool,
    pub enable_shader_draw_parameters: bool,
    pub enable_dual_src_blend: bool,
    pub enable_shader_int16: bool,
    /// Treat a requested-but-unavailable feature as fatal. Lenient by
    /// default on Apple targets, where MoltenVK under-reports extension
    /// availability for features that still work.
    pub strict: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enable_descriptor_indexing: false,
            enable_buffer_device_address: false,
            enable_storage_buffer_16bit_access: false,
            enable_shader_draw_parameters: false,
            enable_dual_src_blend: false,
            enable_shader_int16: false,
            strict: !cfg!(target_vendor = "apple"),
        }
    }
}

/// Identifies one feature group in the capability chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGroup {
    Core11,
    SamplerYcbcrConversion,
    ShaderDrawParameters,
    Multiview,
    Storage16Bit,
    ShaderFloat16Int8,
    BufferDeviceAddress,
    DescriptorIndexing,
    IndexTypeUint8,
    Synchronization2,
    TimelineSemaphore,
}

impl FeatureGroup {
    /// Name used in missing-feature reports.
    pub fn name(self) -> &'static str {
        match self {
            FeatureGroup::Core11 => "core",
            FeatureGroup::SamplerYcbcrConversion => "sampler_ycbcr_conversion",
            FeatureGroup::ShaderDrawParameters => "shader_draw_parameters",
            FeatureGroup::Multiview => "multiview",
            FeatureGroup::Storage16Bit => "storage_16bit",
            FeatureGroup::ShaderFloat16Int8 => "shader_float16_int8",
            FeatureGroup::BufferDeviceAddress => "buffer_device_address",
            FeatureGroup::DescriptorIndexing => "descriptor_indexing",
            FeatureGroup::IndexTypeUint8 => "index_type_uint8",
            FeatureGroup::Synchronization2 => "synchronization2",
            FeatureGroup::TimelineSemaphore => "timeline_semaphore",
        }
    }
}

/// Predicate deciding whether a descriptor is linked into the chain.
#[derive(Debug, Clone, Copy)]
enum FeatureGate {
    /// Part of every chain at the negotiated version.
    Always,
    /// Linked once the negotiated core version reaches the given one.
    CoreSince(ApiVersion),
    /// Linked when the gating extension is present in the registry.
    Extension(&'static str),
    /// Linked when either the core version or the extension provides it.
    CoreOrExtension(ApiVersion, &'static str),
    /// Opt-in group: linked when the configuration asks for it and the
    /// core version or the gating extension provides it.
    Configured {
        enabled: fn(&FeatureConfig) -> bool,
        since: ApiVersion,
        extension: &'static str,
    },
}

struct GroupSpec {
    group: FeatureGroup,
    /// Version tier shown in missing-feature reports.
    tier: &'static str,
    gate: FeatureGate,
    features: &'static [&'static str],
}

pub(crate) const DESCRIPTOR_INDEXING_FEATURES: &[&str] = &[
    "shader_sampled_image_array_non_uniform_indexing",
    "descriptor_binding_uniform_buffer_update_after_bind",
    "descriptor_binding_sampled_image_update_after_bind",
    "descriptor_binding_storage_image_update_after_bind",
    "descriptor_binding_storage_buffer_update_after_bind",
    "descriptor_binding_update_unused_while_pending",
    "descriptor_binding_partially_bound",
    "runtime_descriptor_array",
];

// Chain order is fixed: 1.1 mandatory groups first, then version-gated,
// then configuration/extension-gated, so diagnostics are reproducible.
const GROUPS: &[GroupSpec] = &[
    GroupSpec {
        group: FeatureGroup::Core11,
        tier: "1.1",
        gate: FeatureGate::Always,
        features: &[
            "dual_src_blend",
            "shader_int16",
            "multi_draw_indirect",
            "draw_indirect_first_instance",
            "depth_bias_clamp",
            "fill_mode_non_solid",
        ],
    },
    GroupSpec {
        group: FeatureGroup::SamplerYcbcrConversion,
        tier: "1.1 EXT",
        gate: FeatureGate::Always,
        features: &["sampler_ycbcr_conversion"],
    },
    GroupSpec {
        group: FeatureGroup::ShaderDrawParameters,
        tier: "1.1 EXT",
        gate: FeatureGate::Always,
        features: &["shader_draw_parameters"],
    },
    GroupSpec {
        group: FeatureGroup::Multiview,
        tier: "1.1 EXT",
        gate: FeatureGate::Always,
        features: &["multiview"],
    },
    GroupSpec {
        group: FeatureGroup::Storage16Bit,
        tier: "1.1 EXT",
        gate: FeatureGate::Always,
        features: &["storage_buffer_16bit_access"],
    },
    GroupSpec {
        group: FeatureGroup::ShaderFloat16Int8,
        tier: "1.2",
        gate: FeatureGate::CoreSince(ApiVersion::V1_2),
        features: &["shader_float16", "shader_int8"],
    },
    GroupSpec {
        group: FeatureGroup::BufferDeviceAddress,
        tier: "1.1 EXT",
        gate: FeatureGate::Configured {
            enabled: |c| c.enable_buffer_device_address,
            since: ApiVersion::V1_2,
            extension: KHR_BUFFER_DEVICE_ADDRESS,
        },
        features: &["buffer_device_address"],
    },
    GroupSpec {
        group: FeatureGroup::DescriptorIndexing,
        tier: "1.1 EXT",
        gate: FeatureGate::Configured {
            enabled: |c| c.enable_descriptor_indexing,
            since: ApiVersion::V1_2,
            extension: EXT_DESCRIPTOR_INDEXING,
        },
        features: DESCRIPTOR_INDEXING_FEATURES,
    },
    GroupSpec {
        group: FeatureGroup::IndexTypeUint8,
        tier: "1.1 EXT",
        gate: FeatureGate::Extension(EXT_INDEX_TYPE_UINT8),
        features: &["index_type_uint8"],
    },
    GroupSpec {
        group: FeatureGroup::Synchronization2,
        tier: "1.3 EXT",
        gate: FeatureGate::CoreOrExtension(ApiVersion::V1_3, KHR_SYNCHRONIZATION_2),
        features: &["synchronization2"],
    },
    GroupSpec {
        group: FeatureGroup::TimelineSemaphore,
        tier: "1.2 EXT",
        gate: FeatureGate::CoreOrExtension(ApiVersion::V1_2, KHR_TIMELINE_SEMAPHORE),
        features: &["timeline_semaphore"],
    },
];

/// One optional feature, its requested flag, and what the driver reported.
#[derive(Debug, Clone)]
struct SubFeature {
    name: &'static str,
    requested: bool,
    available: bool,
}

/// One feature group and the state of its sub-features.
#[derive(Debug, Clone)]
struct CapabilityDescriptor {
    group: FeatureGroup,
    features: Vec<SubFeature>,
}

/// Outcome of a [`DeviceFeatures::validate`] call.
#[derive(Debug, Clone, Default)]
pub struct FeatureCheck {
    /// Descriptor paths for every requested-but-unavailable sub-feature.
    pub missing: Vec<String>,
}

impl FeatureCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Driver query interface: how the feature set learns what the physical
/// device supports. Implemented by the Vulkan backend; tests supply mocks.
pub trait DriverQuery {
    /// Extension names supported by the physical device.
    fn device_extensions(&self) -> DeviceResult<Vec<String>>;

    /// Fill the available flag of every sub-feature the driver supports,
    /// for the groups currently linked into the chain.
    fn query_features(&self, features: &mut DeviceFeatures) -> DeviceResult<()>;
}

/// The ordered collection of capability descriptors plus the negotiated
/// API version, configuration, and extension registry.
#[derive(Debug, Clone)]
pub struct DeviceFeatures {
    version: ApiVersion,
    config: FeatureConfig,
    descriptors: Vec<CapabilityDescriptor>,
    extensions: Vec<String>,
    linked: Vec<FeatureGroup>,
}

impl DeviceFeatures {
    /// Build the full descriptor list with every flag off and link the
    /// chain against an empty extension registry.
    pub fn new(version: ApiVersion, config: FeatureConfig) -> Self {
        let descriptors = GROUPS
            .iter()
            .map(|spec| CapabilityDescriptor {
                group: spec.group,
                features: spec
                    .features
                    .iter()
                    .map(|&name| SubFeature {
                        name,
                        requested: false,
                        available: false,
                    })
                    .collect(),
            })
            .collect();

        let mut features = Self {
            version,
            config,
            descriptors,
            extensions: Vec::new(),
            linked: Vec::new(),
        };
        features.link_chain();
        features
    }

    pub fn version(&self) -> ApiVersion {
        self.version
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext == name)
    }

    pub fn is_linked(&self, group: FeatureGroup) -> bool {
        self.linked.contains(&group)
    }

    /// Groups currently linked into the chain, in traversal order.
    pub fn linked_groups(&self) -> &[FeatureGroup] {
        &self.linked
    }

    /// Sub-feature names of a group, in declaration order.
    pub fn sub_feature_names(&self, group: FeatureGroup) -> &'static [&'static str] {
        GROUPS
            .iter()
            .find(|spec| spec.group == group)
            .map(|spec| spec.features)
            .unwrap_or(&[])
    }

    /// Turn on the requested flags for the known-safe default subset.
    ///
    /// Correctness features downstream code relies on (synchronization2,
    /// timeline semaphores, multiview, YCbCr conversion, multi-draw
    /// indirect) are requested unconditionally; the rest follow the
    /// configuration.
    pub fn request_defaults(&mut self) {
        let config = self.config;
        self.set_requested(FeatureGroup::Core11, "dual_src_blend", config.enable_dual_src_blend);
        self.set_requested(FeatureGroup::Core11, "shader_int16", config.enable_shader_int16);
        self.set_requested(FeatureGroup::Core11, "multi_draw_indirect", true);
        self.set_requested(FeatureGroup::Core11, "draw_indirect_first_instance", true);
        self.set_requested(FeatureGroup::Core11, "depth_bias_clamp", true);
        // fillModeNonSolid is poorly supported on Android
        self.set_requested(
            FeatureGroup::Core11,
            "fill_mode_non_solid",
            cfg!(not(target_os = "android")),
        );

        if config.enable_descriptor_indexing {
            for &name in DESCRIPTOR_INDEXING_FEATURES {
                self.set_requested(FeatureGroup::DescriptorIndexing, name, true);
            }
        }
        self.set_requested(
            FeatureGroup::Storage16Bit,
            "storage_buffer_16bit_access",
            config.enable_storage_buffer_16bit_access,
        );
        if config.enable_buffer_device_address {
            self.set_requested(FeatureGroup::BufferDeviceAddress, "buffer_device_address", true);
        }
        self.set_requested(FeatureGroup::Multiview, "multiview", true);
        self.set_requested(
            FeatureGroup::SamplerYcbcrConversion,
            "sampler_ycbcr_conversion",
            true,
        );
        self.set_requested(
            FeatureGroup::ShaderDrawParameters,
            "shader_draw_parameters",
            config.enable_shader_draw_parameters,
        );
        self.set_requested(FeatureGroup::Synchronization2, "synchronization2", true);
        self.set_requested(FeatureGroup::TimelineSemaphore, "timeline_semaphore", true);
    }

    /// Query the driver for the extension registry and the full capability
    /// record. Re-derives the registry and the chain from scratch, so
    /// re-running yields the same state.
    pub fn populate_available(&mut self, query: &impl DriverQuery) -> DeviceResult<()> {
        self.extensions = query.device_extensions()?;
        self.link_chain();
        for descriptor in &mut self.descriptors {
            for feature in &mut descriptor.features {
                feature.available = false;
            }
        }
        query.query_features(self)
    }

    /// Compare the requested flags of `self` against the available flags
    /// of `available`.
    ///
    /// A version mismatch between the two sets is a configuration defect
    /// and always an error. Missing features are fatal under the strict
    /// policy and a logged warning otherwise; the full missing list is
    /// returned either way for diagnostics.
    pub fn validate(&self, available: &DeviceFeatures) -> DeviceResult<FeatureCheck> {
        if self.version != available.version {
            return Err(DeviceError::VersionMismatch {
                requested: self.version,
                available: available.version,
            });
        }

        let mut missing = Vec::new();
        for (spec, descriptor) in GROUPS.iter().zip(&self.descriptors) {
            for feature in &descriptor.features {
                if feature.requested && !available.available(descriptor.group, feature.name) {
                    missing.push(format!("{} {}.{}", spec.tier, spec.group.name(), feature.name));
                }
            }
        }

        if missing.is_empty() {
            return Ok(FeatureCheck { missing });
        }

        let report: String = missing.iter().map(|m| format!("\n   {m}")).collect();
        if self.config.strict {
            log::error!("Missing device features:{report}");
            Err(DeviceError::MissingFeatures(missing))
        } else {
            log::warn!("Missing device features (driver known to under-report, continuing):{report}");
            Ok(FeatureCheck { missing })
        }
    }

    /// Rebuild the traversal order from the version, configuration, and
    /// extension registry. Deterministic for a given driver.
    pub fn link_chain(&mut self) {
        self.linked = GROUPS
            .iter()
            .filter(|spec| self.gate_open(spec.gate))
            .map(|spec| spec.group)
            .collect();
    }

    /// Copy flags and registry from a compatible feature set. Assignment
    /// across different versions or configurations would produce an
    /// inconsistent chain, so it is ignored.
    pub fn assign_from(&mut self, other: &DeviceFeatures) {
        if self.version != other.version || self.config != other.config {
            log::debug!(
                "ignoring feature-set assignment across incompatible sets ({} vs {})",
                self.version,
                other.version
            );
            return;
        }
        self.descriptors = other.descriptors.clone();
        self.extensions = other.extensions.clone();
        self.link_chain();
    }

    pub fn requested(&self, group: FeatureGroup, name: &str) -> bool {
        self.sub_feature(group, name).map_or(false, |f| f.requested)
    }

    pub fn available(&self, group: FeatureGroup, name: &str) -> bool {
        self.sub_feature(group, name).map_or(false, |f| f.available)
    }

    /// Record what the driver reported for one sub-feature. Unknown names
    /// are ignored; drivers may report more than this chain models.
    pub fn set_available(&mut self, group: FeatureGroup, name: &str, available: bool) {
        match self.sub_feature_mut(group, name) {
            Some(feature) => feature.available = available,
            None => log::debug!("unknown sub-feature {}.{name}", group.name()),
        }
    }

    fn set_requested(&mut self, group: FeatureGroup, name: &str, requested: bool) {
        if let Some(feature) = self.sub_feature_mut(group, name) {
            feature.requested = requested;
        }
    }

    fn sub_feature(&self, group: FeatureGroup, name: &str) -> Option<&SubFeature> {
        self.descriptors
            .iter()
            .find(|d| d.group == group)?
            .features
            .iter()
            .find(|f| f.name == name)
    }

    fn sub_feature_mut(&mut self, group: FeatureGroup, name: &str) -> Option<&mut SubFeature> {
        self.descriptors
            .iter_mut()
            .find(|d| d.group == group)?
            .features
            .iter_mut()
            .find(|f| f.name == name)
    }

    fn gate_open(&self, gate: FeatureGate) -> bool {
        match gate {
            FeatureGate::Always => true,
            FeatureGate::CoreSince(version) => self.version >= version,
            FeatureGate::Extension(ext) => self.has_extension(ext),
            FeatureGate::CoreOrExtension(version, ext) => {
                self.version >= version || self.has_extension(ext)
            }
            FeatureGate::Configured {
                enabled,
                since,
                extension,
            } => enabled(&self.config) && (self.version >= since || self.has_extension(extension)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Grants every feature of every linked group, minus an explicit deny
    /// list. Unlinked groups are never touched, like a real driver that
    /// only fills the structs present in the query chain.
    struct FakeDriver {
        extensions: Vec<String>,
        denied: Vec<(FeatureGroup, &'static str)>,
    }

    impl FakeDriver {
        fn new(extensions: &[&str]) -> Self {
            Self {
                extensions: extensions.iter().map(|e| e.to_string()).collect(),
                denied: Vec::new(),
            }
        }
    }

    impl DriverQuery for FakeDriver {
        fn device_extensions(&self) -> DeviceResult<Vec<String>> {
            Ok(self.extensions.clone())
        }

        fn query_features(&self, features: &mut DeviceFeatures) -> DeviceResult<()> {
            let linked: Vec<FeatureGroup> = features.linked_groups().to_vec();
            for group in linked {
                for &name in features.sub_feature_names(group) {
                    let granted = !self.denied.contains(&(group, name));
                    features.set_available(group, name, granted);
                }
            }
            Ok(())
        }
    }

    fn all_extensions() -> Vec<&'static str> {
        vec![
            EXT_DESCRIPTOR_INDEXING,
            KHR_BUFFER_DEVICE_ADDRESS,
            EXT_INDEX_TYPE_UINT8,
            KHR_SYNCHRONIZATION_2,
            KHR_TIMELINE_SEMAPHORE,
        ]
    }

    #[test]
    fn defaults_validate_against_self_when_driver_grants_all() {
        let config = FeatureConfig {
            enable_descriptor_indexing: true,
            enable_buffer_device_address: true,
            enable_storage_buffer_16bit_access: true,
            ..Default::default()
        };
        let mut features = DeviceFeatures::new(ApiVersion::V1_1, config);
        features.request_defaults();
        features
            .populate_available(&FakeDriver::new(&all_extensions()))
            .unwrap();

        let check = features.validate(&features).unwrap();
        assert!(check.is_complete(), "unexpected missing: {:?}", check.missing);
    }

    #[test]
    fn descriptor_indexing_without_extension_is_never_linked() {
        let config = FeatureConfig {
            enable_descriptor_indexing: true,
            strict: true,
            ..Default::default()
        };
        let mut features = DeviceFeatures::new(ApiVersion::V1_1, config);
        features.request_defaults();
        features
            .populate_available(&FakeDriver::new(&[KHR_SYNCHRONIZATION_2, KHR_TIMELINE_SEMAPHORE]))
            .unwrap();

        assert!(!features.is_linked(FeatureGroup::DescriptorIndexing));

        // Requested but unlinked sub-features are reported missing, never
        // silently satisfied.
        let result = features.validate(&features);
        let missing = match result {
            Err(DeviceError::MissingFeatures(missing)) => missing,
            other => panic!("expected MissingFeatures, got {other:?}"),
        };
        assert_eq!(missing.len(), DESCRIPTOR_INDEXING_FEATURES.len());
        for name in DESCRIPTOR_INDEXING_FEATURES {
            assert!(
                missing.iter().any(|m| m.ends_with(&format!("descriptor_indexing.{name}"))),
                "missing list lacks {name}: {missing:?}"
            );
        }
    }

    #[test]
    fn descriptor_indexing_linked_via_core_version() {
        let config = FeatureConfig {
            enable_descriptor_indexing: true,
            ..Default::default()
        };
        let features = DeviceFeatures::new(ApiVersion::V1_2, config);
        assert!(features.is_linked(FeatureGroup::DescriptorIndexing));
        assert!(features.is_linked(FeatureGroup::ShaderFloat16Int8));
    }

    #[test]
    fn version_mismatch_is_a_configuration_error() {
        let requested = DeviceFeatures::new(ApiVersion::V1_1, FeatureConfig::default());
        let available = DeviceFeatures::new(ApiVersion::V1_2, FeatureConfig::default());
        assert!(matches!(
            requested.validate(&available),
            Err(DeviceError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn lenient_policy_downgrades_missing_features_to_warning() {
        let config = FeatureConfig {
            enable_descriptor_indexing: true,
            strict: false,
            ..Default::default()
        };
        let mut features = DeviceFeatures::new(ApiVersion::V1_1, config);
        features.request_defaults();
        features.populate_available(&FakeDriver::new(&[])).unwrap();

        let check = features.validate(&features).unwrap();
        assert!(!check.is_complete());
    }

    #[test]
    fn partial_availability_reports_exactly_the_denied_features() {
        let mut driver = FakeDriver::new(&all_extensions());
        driver.denied.push((FeatureGroup::Core11, "multi_draw_indirect"));

        let config = FeatureConfig {
            strict: true,
            ..Default::default()
        };
        let mut features = DeviceFeatures::new(ApiVersion::V1_1, config);
        features.request_defaults();
        features.populate_available(&driver).unwrap();

        let result = features.validate(&features);
        let missing = match result {
            Err(DeviceError::MissingFeatures(missing)) => missing,
            other => panic!("expected MissingFeatures, got {other:?}"),
        };
        assert_eq!(missing, vec!["1.1 core.multi_draw_indirect".to_string()]);
    }

    #[test]
    fn populate_is_idempotent() {
        let driver = FakeDriver::new(&all_extensions());
        let mut features = DeviceFeatures::new(ApiVersion::V1_1, FeatureConfig::default());
        features.request_defaults();
        features.populate_available(&driver).unwrap();
        let linked_once = features.linked_groups().to_vec();
        let ext_count = features.extensions.len();

        features.populate_available(&driver).unwrap();
        assert_eq!(features.linked_groups(), linked_once.as_slice());
        assert_eq!(features.extensions.len(), ext_count);
        assert!(features.validate(&features).unwrap().is_complete());
    }

    #[test]
    fn assignment_across_configurations_is_ignored() {
        let strict_di = FeatureConfig {
            enable_descriptor_indexing: true,
            ..Default::default()
        };
        let mut target = DeviceFeatures::new(ApiVersion::V1_1, FeatureConfig::default());
        let mut source = DeviceFeatures::new(ApiVersion::V1_1, strict_di);
        source.request_defaults();

        target.assign_from(&source);
        assert!(!target.requested(FeatureGroup::Multiview, "multiview"));

        let mut compatible = DeviceFeatures::new(ApiVersion::V1_1, FeatureConfig::default());
        compatible.request_defaults();
        target.assign_from(&compatible);
        assert!(target.requested(FeatureGroup::Multiview, "multiview"));
    }

    #[test]
    fn every_modeled_sub_feature_is_requestable() {
        let config = FeatureConfig {
            enable_descriptor_indexing: true,
            enable_buffer_device_address: true,
            enable_storage_buffer_16bit_access: true,
            enable_shader_draw_parameters: true,
            enable_dual_src_blend: true,
            enable_shader_int16: true,
            ..Default::default()
        };
        let mut features = DeviceFeatures::new(ApiVersion::V1_3, config);
        features.request_defaults();

        // No permanently-dead entries: with everything enabled, only the
        // driver-gated leaves stay unrequested.
        let exempt = ["shader_float16", "shader_int8", "index_type_uint8"];
        for spec in GROUPS {
            for &name in spec.features {
                if exempt.contains(&name) {
                    continue;
                }
                assert!(
                    features.requested(spec.group, name),
                    "{}.{name} can never be requested",
                    spec.group.name()
                );
            }
        }
    }

    #[test]
    fn mandatory_groups_always_linked() {
        let features = DeviceFeatures::new(ApiVersion::V1_1, FeatureConfig::default());
        for group in [
            FeatureGroup::Core11,
            FeatureGroup::SamplerYcbcrConversion,
            FeatureGroup::ShaderDrawParameters,
            FeatureGroup::Multiview,
            FeatureGroup::Storage16Bit,
        ] {
            assert!(features.is_linked(group), "{group:?} must always be linked");
        }
        assert!(!features.is_linked(FeatureGroup::ShaderFloat16Int8));
        assert!(!features.is_linked(FeatureGroup::IndexTypeUint8));
    }
}
