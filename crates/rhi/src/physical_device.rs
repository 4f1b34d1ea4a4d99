//! Physical device (GPU) selection.
//!
//! This module handles GPU enumeration and capability checks.
//!
//! # Overview
//!
//! Hardware-buffer presentation has a narrow set of requirements, so no
//! scoring takes place:
//! 1. The first enumerated GPU is selected
//! 2. Its first queue family with graphics support is used for everything
//! 3. Sampler YCbCr conversion and push descriptors must be supported,
//!    along with every device extension listed in [`crate::device`]
//!
//! Presentation support of the queue family is checked later, once a
//! surface exists (see [`crate::swapchain::SurfaceSupport`]).
//!
//! # Example
//!
//! ```no_run
//! use vkplay_rhi::instance::Instance;
//! use vkplay_rhi::physical_device::select_physical_device;
//!
//! let instance = Instance::new(false).expect("Failed to create instance");
//! let device_info = select_physical_device(instance.handle())
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::required_device_extensions;
use crate::error::RhiError;

/// Information about the selected physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// The queue family used for graphics, presentation and ownership transfers.
    pub queue_family: u32,
    /// `maxPushDescriptors` of the push descriptor extension.
    pub max_push_descriptors: u32,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_family", &self.queue_family)
            .field("max_push_descriptors", &self.max_push_descriptors)
            .finish()
    }
}

/// Selects the physical device used for presentation.
///
/// # Errors
///
/// - [`RhiError::NoSuitableGpu`] if no GPU is present or it lacks a graphics queue
/// - [`RhiError::MissingExtension`] if a required device extension is absent
/// - [`RhiError::MissingFeature`] if YCbCr conversion or push descriptors are unsupported
pub fn select_physical_device(instance: &ash::Instance) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());
    for (i, &device) in devices.iter().enumerate() {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        debug!(
            "GPU {}: '{}' ({})",
            i,
            properties
                .device_name_as_c_str()
                .map(CStr::to_string_lossy)
                .unwrap_or_default(),
            device_type_name(properties.device_type)
        );
    }

    let device = devices[0];
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    for (i, family) in queue_families.iter().enumerate() {
        debug!(
            "Queue family {}: {:?} x{}",
            i, family.queue_flags, family.queue_count
        );
    }
    let queue_family = find_graphics_family(&queue_families).ok_or(RhiError::NoSuitableGpu)?;

    check_device_extensions(instance, device)?;

    let mut ycbcr_features = vk::PhysicalDeviceSamplerYcbcrConversionFeatures::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut ycbcr_features);
    unsafe { instance.get_physical_device_features2(device, &mut features2) };

    let mut push_descriptor_properties = vk::PhysicalDevicePushDescriptorPropertiesKHR::default();
    let mut properties2 =
        vk::PhysicalDeviceProperties2::default().push_next(&mut push_descriptor_properties);
    unsafe { instance.get_physical_device_properties2(device, &mut properties2) };

    check_capabilities(
        ycbcr_features.sampler_ycbcr_conversion == vk::TRUE,
        push_descriptor_properties.max_push_descriptors,
    )?;

    let info = PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_family,
        max_push_descriptors: push_descriptor_properties.max_push_descriptors,
    };

    let (major, minor, patch) = info.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, queue family {}",
        info.device_name(),
        info.device_type_name(),
        major,
        minor,
        patch,
        queue_family
    );

    Ok(info)
}

/// Index of the first queue family that supports graphics.
pub fn find_graphics_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|i| i as u32)
}

/// Validates the feature bits hardware-buffer sampling depends on.
pub fn check_capabilities(
    sampler_ycbcr_conversion: bool,
    max_push_descriptors: u32,
) -> Result<(), RhiError> {
    if !sampler_ycbcr_conversion {
        return Err(RhiError::MissingFeature(
            "samplerYcbcrConversion".to_string(),
        ));
    }
    if max_push_descriptors < 1 {
        return Err(RhiError::MissingFeature(format!(
            "maxPushDescriptors is {max_push_descriptors}"
        )));
    }
    Ok(())
}

fn check_device_extensions(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
) -> Result<(), RhiError> {
    let available = unsafe { instance.enumerate_device_extension_properties(device)? };

    for name in required_device_extensions() {
        let found = available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|n| n == name));
        if !found {
            return Err(RhiError::MissingExtension(name.to_string_lossy().into_owned()));
        }
    }

    Ok(())
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_graphics_family_first_match() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(find_graphics_family(&families), Some(1));
    }

    #[test]
    fn test_find_graphics_family_skips_empty() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 2),
        ];
        assert_eq!(find_graphics_family(&families), Some(1));
    }

    #[test]
    fn test_find_graphics_family_none() {
        let families = [family(vk::QueueFlags::COMPUTE, 4)];
        assert_eq!(find_graphics_family(&families), None);
        assert_eq!(find_graphics_family(&[]), None);
    }

    #[test]
    fn test_check_capabilities() {
        assert!(check_capabilities(true, 32).is_ok());

        let err = check_capabilities(false, 32).unwrap_err();
        assert!(matches!(err, RhiError::MissingFeature(_)));
        assert!(err.is_capability_missing());

        let err = check_capabilities(true, 0).unwrap_err();
        assert!(matches!(err, RhiError::MissingFeature(_)));
    }

    #[test]
    fn test_device_type_names() {
        assert_eq!(
            device_type_name(vk::PhysicalDeviceType::INTEGRATED_GPU),
            "Integrated GPU"
        );
        assert_eq!(device_type_name(vk::PhysicalDeviceType::OTHER), "Other");
    }
}
