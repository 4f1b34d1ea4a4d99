//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and debug messengers.
//!
//! # Overview
//!
//! The [`Instance`] struct targets Vulkan 1.1, where external memory
//! capabilities and the `*2` property queries used for hardware-buffer import
//! are core. Validation is opt-in: when requested, the Khronos validation layer
//! must be installed, and its messages are forwarded to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use vkplay_rhi::instance::Instance;
//!
//! let instance = Instance::new(false).expect("Failed to create Vulkan instance");
//!
//! let vk_instance = instance.handle();
//! let entry = instance.entry();
//! ```

use std::ffi::{CStr, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiError;

/// The Khronos validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// API version requested from the loader.
pub const API_VERSION: u32 = vk::API_VERSION_1_1;

/// Vulkan instance wrapper with optional validation layer support.
///
/// This struct manages the lifetime of the Vulkan instance and its associated
/// debug utilities. When dropped, it properly cleans up all Vulkan resources.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils extension loader (only present when validation is enabled)
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle (only present when validation is enabled)
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `enable_validation` - If true, enables validation layers and debug messenger
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - Validation is requested but the layer is not installed
    /// - A required instance extension is not available
    /// - Instance creation fails
    pub fn new(enable_validation: bool) -> Result<Self, RhiError> {
        let entry = unsafe { Entry::load()? };

        if enable_validation && !Self::is_validation_layer_available(&entry)? {
            return Err(RhiError::MissingLayer(
                VALIDATION_LAYER_NAME.to_string_lossy().into_owned(),
            ));
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"vkplay")
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vkplay")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(API_VERSION);

        let mut extensions = Self::get_required_extensions();
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME);
        }
        let available = Self::check_extensions(&entry, &extensions)?;
        for name in Self::get_optional_extensions() {
            if available.contains(&name) {
                extensions.push(name);
            } else {
                warn!("Optional instance extension {:?} not available", name);
            }
        }
        let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let layers = if enable_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(RhiError::from)?
        };

        info!("Vulkan instance created successfully (API version 1.1)");

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => messenger,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            };
            info!("Validation layers enabled");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Gets the list of required instance extensions.
    ///
    /// This includes the surface extension and platform-specific surface extensions.
    fn get_required_extensions() -> Vec<&'static CStr> {
        let mut extensions = vec![ash::khr::surface::NAME];

        #[cfg(target_os = "android")]
        extensions.push(ash::khr::android_surface::NAME);

        #[cfg(target_os = "windows")]
        extensions.push(ash::khr::win32_surface::NAME);

        #[cfg(target_os = "macos")]
        extensions.push(ash::ext::metal_surface::NAME);

        extensions
    }

    /// Surface extensions enabled only when the loader offers them.
    ///
    /// Linux desktops may ship either X11 or Wayland support.
    fn get_optional_extensions() -> Vec<&'static CStr> {
        #[cfg(all(target_os = "linux", not(target_os = "android")))]
        {
            vec![ash::khr::xlib_surface::NAME, ash::khr::wayland_surface::NAME]
        }

        #[cfg(not(all(target_os = "linux", not(target_os = "android"))))]
        {
            Vec::new()
        }
    }

    /// Returns the optional extensions the loader offers.
    ///
    /// Fails with [`RhiError::MissingExtension`] naming the first required
    /// extension that is not among them.
    fn check_extensions(entry: &Entry, required: &[&CStr]) -> Result<Vec<&'static CStr>, RhiError> {
        let properties = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let available: Vec<String> = properties
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();

        for name in required {
            if !available.iter().any(|a| a.as_bytes() == name.to_bytes()) {
                return Err(RhiError::MissingExtension(name.to_string_lossy().into_owned()));
            }
            debug!("Instance extension {:?} available", name);
        }

        Ok(Self::get_optional_extensions()
            .into_iter()
            .filter(|name| available.iter().any(|a| a.as_bytes() == name.to_bytes()))
            .collect())
    }

    /// Checks if the Khronos validation layer is available.
    fn is_validation_layer_available(entry: &Entry) -> Result<bool, RhiError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        let found = available_layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER_NAME));

        Ok(found)
    }

    /// Sets up the debug messenger for validation layer callbacks.
    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> Result<vk::DebugUtilsMessengerEXT, RhiError> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(RhiError::from)?
        };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            // Destroy debug messenger before instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Debug callback function for validation layer messages.
///
/// # Safety
///
/// This function is called from the Vulkan driver and must follow the
/// Vulkan specification for debug callbacks.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            info!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            debug!("[Vulkan {}] {}", type_str, message);
        }
    }

    // Returning VK_FALSE indicates the call should not be aborted
    vk::FALSE
}
