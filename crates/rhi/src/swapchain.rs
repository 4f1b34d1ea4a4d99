//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] struct provides a safe abstraction over the Vulkan swapchain,
//! including:
//! - Surface capability querying
//! - The fixed presentation policy (RGBA8 UNORM, sRGB non-linear, FIFO)
//! - Image view creation and management
//!
//! A swapchain is never recreated in place. When presentation reports it as
//! out of date or suboptimal, the owner drops it and creates a new one.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use vkplay_rhi::{device::Device, swapchain::Swapchain, vk};
//! # fn demo(device: Arc<Device>, loader: &ash::khr::surface::Instance, surface: vk::SurfaceKHR)
//! # -> Result<(), vkplay_rhi::RhiError> {
//! let swapchain = Swapchain::new(device, loader, surface, 1280, 720)?;
//! // let (image_index, suboptimal) = swapchain.acquire_next_image_with_fence(fence, u64::MAX)?;
//! // let suboptimal = swapchain.present(queue, image_index, render_finished_semaphore)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiError;

/// The only surface format frames are presented in.
pub const PRESENT_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Vertical-sync gated presentation, always available.
pub const PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::FIFO;

/// Surface support details.
///
/// Contains information about what the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Whether the device queue family can present to the surface
    pub present_supported: bool,
}

impl SurfaceSupport {
    /// Queries surface support for a physical device and queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                surface,
            )?
        };

        debug!(
            "Surface support: {} formats, present={}, image count: {}-{}, usage {:?}",
            formats.len(),
            present_supported,
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            },
            capabilities.supported_usage_flags
        );

        Ok(Self {
            capabilities,
            formats,
            present_supported,
        })
    }

    /// Checks everything the presentation policy depends on.
    ///
    /// # Errors
    ///
    /// - [`RhiError::MissingFeature`] if the queue family cannot present
    /// - [`RhiError::UnsupportedSurfaceFormat`] if [`PRESENT_FORMAT`] is not offered
    /// - [`RhiError::SwapchainError`] if images cannot be color attachments
    pub fn validate(&self) -> Result<vk::SurfaceFormatKHR, RhiError> {
        if !self.present_supported {
            return Err(RhiError::MissingFeature(
                "queue family cannot present to the surface".to_string(),
            ));
        }
        if !self
            .capabilities
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        {
            return Err(RhiError::SwapchainError(
                "surface images cannot be used as color attachments".to_string(),
            ));
        }
        choose_surface_format(&self.formats)
    }
}

/// Vulkan swapchain wrapper.
///
/// This struct manages the swapchain and its associated resources:
/// - Swapchain images (owned by the swapchain, not explicitly managed)
/// - Image views (managed by this struct)
///
/// # Thread Safety
///
/// The swapchain is not thread-safe. It is owned by the render thread.
pub struct Swapchain {
    /// Reference to the logical device
    device: Arc<Device>,
    /// Swapchain handle
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain)
    images: Vec<vk::Image>,
    /// Image views for the swapchain images
    image_views: Vec<vk::ImageView>,
    /// Swapchain image format
    format: vk::Format,
    /// Swapchain extent (resolution)
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a new swapchain for a window of `width` x `height`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Surface queries fail
    /// - The surface fails [`SurfaceSupport::validate`]
    /// - Swapchain or image view creation fails
    pub fn new(
        device: Arc<Device>,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        let support = SurfaceSupport::query(
            device.physical_device(),
            device.queue_family(),
            surface,
            surface_loader,
        )?;
        let surface_format = support.validate()?;

        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);
        let composite_alpha = choose_composite_alpha(support.capabilities.supported_composite_alpha);

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            PRESENT_MODE,
            image_count
        );

        let queue_family_indices = [device.queue_family()];

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
            .composite_alpha(composite_alpha)
            .present_mode(PRESENT_MODE)
            .clipped(false);

        let loader = device.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };
        info!("Swapchain created with {} images", images.len());

        let mut this = Self {
            device,
            swapchain,
            images,
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
        };
        // Drop cleans up the swapchain and any views created before a failure.
        this.image_views = create_image_views(&this.device, &this.images, this.format)?;

        Ok(this)
    }

    /// Acquires the next swapchain image, signaling `fence` once it is available.
    ///
    /// # Returns
    ///
    /// Returns a tuple of (image_index, suboptimal).
    ///
    /// # Errors
    ///
    /// Returns the raw result on failure; `ERROR_OUT_OF_DATE_KHR` means the
    /// swapchain must be recreated.
    pub fn acquire_next_image_with_fence(
        &self,
        fence: vk::Fence,
        timeout: u64,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.swapchain,
                timeout,
                vk::Semaphore::null(),
                fence,
            )
        }
    }

    /// Presents the rendered image to the screen.
    ///
    /// # Returns
    ///
    /// Returns true if the swapchain is suboptimal and should be recreated.
    ///
    /// # Errors
    ///
    /// Returns the raw result on failure; `ERROR_OUT_OF_DATE_KHR` means the
    /// swapchain must be recreated.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.device
                .swapchain_loader()
                .queue_present(queue, &present_info)
        }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    /// Returns all image views.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        unsafe {
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Picks [`PRESENT_FORMAT`] from the surface formats.
///
/// There is no fallback: render passes and pipelines are built for this format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR, RhiError> {
    formats
        .iter()
        .find(|f| f.format == PRESENT_FORMAT.format && f.color_space == PRESENT_FORMAT.color_space)
        .copied()
        .ok_or(RhiError::UnsupportedSurfaceFormat {
            format: PRESENT_FORMAT.format,
            color_space: PRESENT_FORMAT.color_space,
        })
}

/// Chooses the swapchain extent from the window size.
///
/// The requested size is clamped to the surface's min/max extents.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width.max(capabilities.min_image_extent.width),
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height.max(capabilities.min_image_extent.height),
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        width,
        height,
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height
    );

    extent
}

/// The surface's minimum image count.
///
/// Frames are bounded by this count, so a larger swapchain only adds latency.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    capabilities.min_image_count.max(1)
}

/// Lowest supported composite alpha mode.
fn choose_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    let raw = supported.as_raw();
    if raw == 0 {
        return vk::CompositeAlphaFlagsKHR::OPAQUE;
    }
    vk::CompositeAlphaFlagsKHR::from_raw(raw & raw.wrapping_neg())
}

/// Creates image views for swapchain images.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let image_view = unsafe { device.handle().create_image_view(&create_info, None) };
        match image_view {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support(formats: Vec<vk::SurfaceFormatKHR>) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
                ..Default::default()
            },
            formats,
            present_supported: true,
        }
    }

    #[test]
    fn test_choose_surface_format_requires_rgba_unorm() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            PRESENT_FORMAT,
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_has_no_fallback() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        let err = choose_surface_format(&formats).unwrap_err();
        assert!(matches!(err, RhiError::UnsupportedSurfaceFormat { .. }));
        assert!(err.is_capability_missing());
    }

    #[test]
    fn test_validate_checks_present_support_and_usage() {
        assert!(support(vec![PRESENT_FORMAT]).validate().is_ok());

        let mut no_present = support(vec![PRESENT_FORMAT]);
        no_present.present_supported = false;
        assert!(matches!(no_present.validate(), Err(RhiError::MissingFeature(_))));

        let mut no_attachment = support(vec![PRESENT_FORMAT]);
        no_attachment.capabilities.supported_usage_flags = vk::ImageUsageFlags::TRANSFER_DST;
        assert!(matches!(no_attachment.validate(), Err(RhiError::SwapchainError(_))));
    }

    #[test]
    fn test_choose_extent_follows_window() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 3000);
        assert_eq!(extent.width, 2000);
        assert_eq!(extent.height, 2000);

        let extent = choose_extent(&capabilities, 50, 50);
        assert_eq!(extent.width, 100);
        assert_eq!(extent.height, 100);
    }

    #[test]
    fn test_determine_image_count_uses_minimum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 2);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);
    }

    #[test]
    fn test_choose_composite_alpha_lowest_bit() {
        let supported =
            vk::CompositeAlphaFlagsKHR::INHERIT | vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED;
        assert_eq!(
            choose_composite_alpha(supported),
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED
        );

        let supported = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(choose_composite_alpha(supported), vk::CompositeAlphaFlagsKHR::OPAQUE);
    }

    #[test]
    fn test_present_mode_is_fifo() {
        assert_eq!(PRESENT_MODE, vk::PresentModeKHR::FIFO);
    }
}
