//! Vulkan logical device and queue management.
//!
//! # Overview
//!
//! The [`Device`] struct owns the logical device, the single queue used for
//! rendering and presentation, and the extension loaders the renderer needs:
//! - `VK_KHR_swapchain` for presentation
//! - `VK_KHR_push_descriptor` for per-draw image bindings
//! - `VK_ANDROID_external_memory_android_hardware_buffer` for zero-copy import (Android)
//!
//! # Example
//!
//! ```no_run
//! use vkplay_rhi::instance::Instance;
//! use vkplay_rhi::physical_device::select_physical_device;
//! use vkplay_rhi::device::Device;
//!
//! let instance = Instance::new(false).expect("Failed to create instance");
//! let physical_device_info = select_physical_device(instance.handle())
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &physical_device_info)
//!     .expect("Failed to create logical device");
//! let queue = device.queue();
//! ```

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;

/// Device extensions every platform needs.
const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME, ash::khr::push_descriptor::NAME];

/// Device extensions needed for importing Android hardware buffers.
#[cfg(target_os = "android")]
const ANDROID_DEVICE_EXTENSIONS: &[&CStr] = &[
    ash::android::external_memory_android_hardware_buffer::NAME,
    ash::ext::queue_family_foreign::NAME,
];

/// All device extensions enabled at device creation.
pub fn required_device_extensions() -> Vec<&'static CStr> {
    #[allow(unused_mut)]
    let mut extensions = DEVICE_EXTENSIONS.to_vec();

    #[cfg(target_os = "android")]
    extensions.extend_from_slice(ANDROID_DEVICE_EXTENSIONS);

    extensions
}

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is shared through `Arc` by every object that must destroy a
/// handle it created. Queue submission is only performed by the render thread.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Instance function table, for physical-device queries made after creation.
    instance: ash::Instance,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Memory types used to pick the import memory type.
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// The single queue for rendering and presentation.
    queue: vk::Queue,
    /// Family index of `queue`.
    queue_family: u32,
    /// Swapchain extension loader.
    swapchain_loader: ash::khr::swapchain::Device,
    /// Push descriptor extension loader.
    push_descriptor_loader: ash::khr::push_descriptor::Device,
    /// Hardware buffer extension loader.
    #[cfg(target_os = "android")]
    hardware_buffer_loader: ash::android::external_memory_android_hardware_buffer::Device,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// One queue is created from the selected family. The `samplerYcbcrConversion`
    /// feature is enabled; everything else stays at its default.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_family = physical_device_info.queue_family;
        let queue_priorities = [1.0f32];

        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let mut ycbcr_features =
            vk::PhysicalDeviceSamplerYcbcrConversionFeatures::default().sampler_ycbcr_conversion(true);

        let extensions = required_device_extensions();
        let extension_names: Vec<*const std::ffi::c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut ycbcr_features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!("Logical device created with {} extension(s)", extensions.len());

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        debug!("Queue retrieved from family {}", queue_family);

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);
        let push_descriptor_loader =
            ash::khr::push_descriptor::Device::new(instance.handle(), &device);

        Ok(Arc::new(Self {
            #[cfg(target_os = "android")]
            hardware_buffer_loader:
                ash::android::external_memory_android_hardware_buffer::Device::new(
                    instance.handle(),
                    &device,
                ),
            device,
            instance: instance.handle().clone(),
            physical_device: physical_device_info.device,
            memory_properties: physical_device_info.memory_properties,
            queue,
            queue_family,
            swapchain_loader,
            push_descriptor_loader,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the instance the device was created from.
    ///
    /// The [`Instance`] must outlive every [`Device`] created from it.
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Returns the queue used for rendering and presentation.
    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    #[inline]
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    #[inline]
    pub fn push_descriptor_loader(&self) -> &ash::khr::push_descriptor::Device {
        &self.push_descriptor_loader
    }

    #[cfg(target_os = "android")]
    #[inline]
    pub fn hardware_buffer_loader(
        &self,
    ) -> &ash::android::external_memory_android_hardware_buffer::Device {
        &self.hardware_buffer_loader
    }

    /// Waits for the device to become idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and recorded
    /// - Synchronization is properly handled
    /// - The fence (if provided) is not in use
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails.
    pub unsafe fn submit(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device.queue_submit(self.queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device and the extension loaders are Send+Sync
// - vk::PhysicalDevice and vk::Queue are Copy types (handles)
// - The memory properties are plain data
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        let extensions = required_device_extensions();
        assert!(extensions.contains(&ash::khr::swapchain::NAME));
        assert!(extensions.contains(&ash::khr::push_descriptor::NAME));

        #[cfg(target_os = "android")]
        assert!(extensions.contains(&ash::ext::queue_family_foreign::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
