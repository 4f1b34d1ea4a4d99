//! Descriptor management for shader resource binding.
//!
//! This module provides abstractions for Vulkan descriptor management:
//! - [`DescriptorSetLayout`] defines the layout of shader bindings
//! - Helper functions for building pushed descriptor writes
//!
//! # Overview
//!
//! Frames bind their imported image through `VK_KHR_push_descriptor`, so no
//! descriptor pools or sets are allocated. A set layout created with
//! [`DescriptorSetLayout::new_push`] carries the binding, and each draw pushes
//! a [`combined_image_sampler_write`] right before it is recorded.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkplay_rhi::device::Device;
//! use vkplay_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout};
//!
//! # fn example(device: Arc<Device>, sampler: vk::Sampler) -> Result<(), vkplay_rhi::RhiError> {
//! let samplers = [sampler];
//! let binding = DescriptorBindingBuilder::immutable_combined_image_sampler(
//!     0,
//!     vk::ShaderStageFlags::FRAGMENT,
//!     &samplers,
//! );
//!
//! let layout = DescriptorSetLayout::new_push(device, &[binding])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
///
/// # Thread Safety
///
/// The layout itself is immutable after creation. It can be shared between
/// threads when wrapped in `Arc`.
pub struct DescriptorSetLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor set layout handle.
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a new descriptor set layout.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(flags)
            .bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s), flags {:?}",
            bindings.len(),
            flags
        );

        Ok(Self { device, layout })
    }

    /// Creates a layout whose bindings are updated with pushed descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new_push(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        Self::new(
            device,
            bindings,
            vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR,
        )
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Creates an image info for descriptor writes.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// A combined image sampler write for `binding`, for use with pushed descriptors.
///
/// The destination set is ignored by `vkCmdPushDescriptorSetKHR`.
#[inline]
pub fn combined_image_sampler_write(
    binding: u32,
    image_infos: &[vk::DescriptorImageInfo],
) -> vk::WriteDescriptorSet<'_> {
    vk::WriteDescriptorSet::default()
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(image_infos)
}

/// Builder for creating descriptor set layout bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    /// Creates a combined image sampler binding with samplers baked into the layout.
    ///
    /// Samplers with a YCbCr conversion must be bound this way.
    #[inline]
    pub fn immutable_combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
        samplers: &[vk::Sampler],
    ) -> vk::DescriptorSetLayoutBinding<'_> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .stage_flags(stage_flags)
            .immutable_samplers(samplers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immutable_sampler_binding() {
        let samplers = [vk::Sampler::null()];
        let binding = DescriptorBindingBuilder::immutable_combined_image_sampler(
            0,
            vk::ShaderStageFlags::FRAGMENT,
            &samplers,
        );
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.p_immutable_samplers, samplers.as_ptr());
    }

    #[test]
    fn test_image_info_helper() {
        let info = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(info.sampler, vk::Sampler::null());
        assert_eq!(info.image_view, vk::ImageView::null());
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_combined_image_sampler_write() {
        let infos = [image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        let write = combined_image_sampler_write(0, &infos);
        assert_eq!(write.dst_binding, 0);
        assert_eq!(write.descriptor_count, 1);
        assert_eq!(
            write.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }
}
