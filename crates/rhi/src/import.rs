//! Zero-copy import of Android hardware buffers as sampled images.
//!
//! # Overview
//!
//! Every imported buffer gets its own [`ImportedImage`]: the image bound to a
//! dedicated import of the buffer's memory, a YCbCr conversion built from the
//! driver's suggested parameters, a sampler and view using that conversion,
//! and a pipeline whose set layout bakes the sampler in as immutable. The
//! pipeline cannot be shared between buffers because a conversion created for
//! an external format is only valid with images of that exact format.
//!
//! Choosing how to create the image is split out into the pure
//! [`choose_image_params`] so the policy can be exercised without a device.
//!
//! # Teardown
//!
//! Resources are released in reverse dependency order: pipeline, pipeline
//! layout, set layout, sampler, conversion, view, image, memory. The buffer
//! reference itself is owned by the caller and must be dropped after the
//! [`ImportedImage`].

use std::sync::Arc;

use ash::vk;
use tracing::debug;
use vkplay_core::ExternalFormatPolicy;

use crate::command::CommandBuffer;
use crate::descriptor::{self, DescriptorBindingBuilder, DescriptorSetLayout};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{
    ColorBlendAttachment, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
    PrimitiveTopology,
};
use crate::render_pass::{Framebuffer, RenderPass};
use crate::shader::Shader;

/// Tilings tried, in order, when looking for a device-native image format.
pub const TILING_CANDIDATES: [vk::ImageTiling; 2] =
    [vk::ImageTiling::LINEAR, vk::ImageTiling::OPTIMAL];

/// The only usage imported images are created with.
///
/// Images with an external format must use exactly `SAMPLED`.
pub const IMPORT_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::SAMPLED;

/// Device answer for one native (format, tiling) candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSupport {
    /// The combination supports importing hardware buffer memory.
    Importable,
    /// The combination exists but its memory cannot be imported.
    NotImportable,
    /// The device returned `ERROR_FORMAT_NOT_SUPPORTED`.
    FormatNotSupported,
}

/// How an imported image will be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParams {
    /// `UNDEFINED` when an external format is used.
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    /// Driver-defined format, present only on the external path.
    pub external_format: Option<u64>,
}

impl ImageParams {
    fn external(external_format: u64) -> RhiResult<Self> {
        if external_format == 0 {
            return Err(RhiError::UnsupportedImport(
                "buffer has no external format".to_string(),
            ));
        }
        Ok(Self {
            format: vk::Format::UNDEFINED,
            tiling: vk::ImageTiling::OPTIMAL,
            external_format: Some(external_format),
        })
    }

    /// Whether the image uses a driver-defined external format.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.external_format.is_some()
    }
}

/// Decides between a native and an external image format.
///
/// `native_format` and `external_format` come from the buffer's format
/// properties. `query` is asked about each of [`TILING_CANDIDATES`] in order
/// and is never called on the external path.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedImport`] when the policy forbids the only
/// workable path, or when the device reports a native candidate that is not
/// importable. Errors from `query` are passed through.
pub fn choose_image_params<F>(
    policy: ExternalFormatPolicy,
    native_format: vk::Format,
    external_format: u64,
    mut query: F,
) -> RhiResult<ImageParams>
where
    F: FnMut(vk::Format, vk::ImageTiling) -> RhiResult<CandidateSupport>,
{
    let native_usable = native_format != vk::Format::UNDEFINED;

    if !native_usable {
        debug!("External format required");
    } else if policy == ExternalFormatPolicy::Always {
        debug!("Using external format because the policy is 'always'");
    } else {
        for tiling in TILING_CANDIDATES {
            match query(native_format, tiling)? {
                CandidateSupport::Importable => {
                    debug!("Native format {:?} with {:?} tiling", native_format, tiling);
                    return Ok(ImageParams {
                        format: native_format,
                        tiling,
                        external_format: None,
                    });
                }
                CandidateSupport::NotImportable => {
                    return Err(RhiError::UnsupportedImport(format!(
                        "{:?} with {:?} tiling does not support importing",
                        native_format, tiling
                    )));
                }
                CandidateSupport::FormatNotSupported => {
                    debug!("{:?} with {:?} tiling not supported", native_format, tiling);
                }
            }
        }
        debug!("No native candidate, falling back to external format");
    }

    if policy == ExternalFormatPolicy::Never {
        return Err(RhiError::UnsupportedImport(
            "external format needed but the policy is 'never'".to_string(),
        ));
    }

    ImageParams::external(external_format)
}

/// Index of the lowest memory type allowed by `memory_type_bits`.
pub fn lowest_memory_type(memory_type_bits: u32) -> Option<u32> {
    (memory_type_bits != 0).then(|| memory_type_bits.trailing_zeros())
}

/// What the caller knows about a hardware buffer before importing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareBufferDesc {
    pub width: u32,
    pub height: u32,
    /// Whether the buffer was allocated with GPU sampled-image usage.
    pub gpu_sampled: bool,
}

/// Access to the raw handle of a hardware buffer the caller keeps alive.
pub trait HardwareBufferSource {
    /// The raw `AHardwareBuffer*`. Valid for as long as `self` is.
    fn hardware_buffer(&self) -> *mut vk::AHardwareBuffer;

    fn describe(&self) -> HardwareBufferDesc;
}

/// Shared objects every per-buffer pipeline is built against.
pub struct ImportContext<'a> {
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub render_pass: &'a RenderPass,
    pub policy: ExternalFormatPolicy,
}

/// Barrier moving an imported image from the foreign queue family to ours.
pub fn acquire_barrier(image: vk::Image, queue_family: u32) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .old_layout(vk::ImageLayout::PREINITIALIZED)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_FOREIGN_EXT)
        .dst_queue_family_index(queue_family)
        .image(image)
        .subresource_range(color_subresource_range())
}

/// Barrier handing an imported image back to the foreign queue family.
pub fn release_barrier(image: vk::Image, queue_family: u32) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::SHADER_READ)
        .dst_access_mask(vk::AccessFlags::empty())
        .old_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(queue_family)
        .dst_queue_family_index(vk::QUEUE_FAMILY_FOREIGN_EXT)
        .image(image)
        .subresource_range(color_subresource_range())
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

macro_rules! owned_handle {
    ($name:ident, $handle:ty, $destroy:ident) => {
        #[cfg_attr(not(target_os = "android"), allow(dead_code))]
        struct $name {
            device: Arc<Device>,
            handle: $handle,
        }

        impl Drop for $name {
            fn drop(&mut self) {
                unsafe { self.device.handle().$destroy(self.handle, None) };
            }
        }
    };
}

owned_handle!(OwnedSampler, vk::Sampler, destroy_sampler);
owned_handle!(
    OwnedConversion,
    vk::SamplerYcbcrConversion,
    destroy_sampler_ycbcr_conversion
);
owned_handle!(OwnedImageView, vk::ImageView, destroy_image_view);
owned_handle!(OwnedImage, vk::Image, destroy_image);
owned_handle!(OwnedMemory, vk::DeviceMemory, free_memory);

/// GPU resources derived from one imported hardware buffer.
///
/// Fields are declared in teardown order.
pub struct ImportedImage {
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
    sampler: OwnedSampler,
    _conversion: OwnedConversion,
    view: OwnedImageView,
    image: OwnedImage,
    _memory: OwnedMemory,
    params: ImageParams,
    extent: vk::Extent2D,
}

impl ImportedImage {
    /// Imports `buffer` and builds its sampler, view and pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::UnsupportedImport`] when the buffer cannot be
    /// sampled or the format policy cannot be satisfied, or the Vulkan error
    /// of any failing call. Partially created resources are released.
    #[cfg(target_os = "android")]
    pub fn new(
        device: Arc<Device>,
        ctx: &ImportContext<'_>,
        buffer: &dyn HardwareBufferSource,
    ) -> RhiResult<Self> {
        let ahb = buffer.hardware_buffer();
        let desc = buffer.describe();

        if !desc.gpu_sampled {
            return Err(RhiError::UnsupportedImport(format!(
                "buffer {:p} lacks GPU sampled-image usage",
                ahb
            )));
        }

        let mut format_props = vk::AndroidHardwareBufferFormatPropertiesANDROID::default();
        let mut props =
            vk::AndroidHardwareBufferPropertiesANDROID::default().push_next(&mut format_props);
        unsafe {
            device
                .hardware_buffer_loader()
                .get_android_hardware_buffer_properties(ahb, &mut props)?;
        }
        let allocation_size = props.allocation_size;
        let memory_type_bits = props.memory_type_bits;

        debug!(
            "Importing buffer {:p}: {}x{}, allocation {} bytes, memory types {:#x}, \
             format {:?}, external format {}, model {:?}, range {:?}",
            ahb,
            desc.width,
            desc.height,
            allocation_size,
            memory_type_bits,
            format_props.format,
            format_props.external_format,
            format_props.suggested_ycbcr_model,
            format_props.suggested_ycbcr_range,
        );

        let params = choose_image_params(
            ctx.policy,
            format_props.format,
            format_props.external_format,
            |format, tiling| query_native_candidate(&device, format, tiling),
        )?;

        let extent = vk::Extent2D {
            width: desc.width,
            height: desc.height,
        };
        let queue_families = [device.queue_family()];

        let mut external_memory_info = vk::ExternalMemoryImageCreateInfo::default()
            .handle_types(vk::ExternalMemoryHandleTypeFlags::ANDROID_HARDWARE_BUFFER_ANDROID);
        let mut image_external_format = vk::ExternalFormatANDROID::default()
            .external_format(params.external_format.unwrap_or(0));

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(params.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(params.tiling)
            .usage(IMPORT_USAGE)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families)
            .initial_layout(vk::ImageLayout::PREINITIALIZED)
            .push_next(&mut external_memory_info)
            .push_next(&mut image_external_format);

        let image = OwnedImage {
            handle: unsafe { device.handle().create_image(&image_info, None)? },
            device: device.clone(),
        };

        let memory_type_index = lowest_memory_type(memory_type_bits).ok_or_else(|| {
            RhiError::UnsupportedImport(format!("buffer {:p} reports no memory types", ahb))
        })?;

        let mut import_info = vk::ImportAndroidHardwareBufferInfoANDROID::default().buffer(ahb);
        let mut dedicated_info = vk::MemoryDedicatedAllocateInfo::default().image(image.handle);
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(allocation_size)
            .memory_type_index(memory_type_index)
            .push_next(&mut import_info)
            .push_next(&mut dedicated_info);

        let memory = OwnedMemory {
            handle: unsafe { device.handle().allocate_memory(&allocate_info, None)? },
            device: device.clone(),
        };

        // Dedicated allocations bind at offset 0.
        unsafe {
            device
                .handle()
                .bind_image_memory(image.handle, memory.handle, 0)?;
        }

        let mut conversion_external_format = vk::ExternalFormatANDROID::default()
            .external_format(params.external_format.unwrap_or(0));
        let conversion_info = vk::SamplerYcbcrConversionCreateInfo::default()
            .format(params.format)
            .ycbcr_model(format_props.suggested_ycbcr_model)
            .ycbcr_range(format_props.suggested_ycbcr_range)
            .components(format_props.sampler_ycbcr_conversion_components)
            .x_chroma_offset(format_props.suggested_x_chroma_offset)
            .y_chroma_offset(format_props.suggested_y_chroma_offset)
            .chroma_filter(vk::Filter::NEAREST)
            .force_explicit_reconstruction(false)
            .push_next(&mut conversion_external_format);

        let conversion = OwnedConversion {
            handle: unsafe {
                device
                    .handle()
                    .create_sampler_ycbcr_conversion(&conversion_info, None)?
            },
            device: device.clone(),
        };

        let mut sampler_conversion =
            vk::SamplerYcbcrConversionInfo::default().conversion(conversion.handle);
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .mip_lod_bias(0.0)
            .anisotropy_enable(false)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(0.0)
            .unnormalized_coordinates(false)
            .push_next(&mut sampler_conversion);

        let sampler = OwnedSampler {
            handle: unsafe { device.handle().create_sampler(&sampler_info, None)? },
            device: device.clone(),
        };

        // External formats require an identity swizzle; the conversion already
        // carries the driver's component mapping.
        let mut view_conversion =
            vk::SamplerYcbcrConversionInfo::default().conversion(conversion.handle);
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(params.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(color_subresource_range())
            .push_next(&mut view_conversion);

        let view = OwnedImageView {
            handle: unsafe { device.handle().create_image_view(&view_info, None)? },
            device: device.clone(),
        };

        let immutable_samplers = [sampler.handle];
        let binding = DescriptorBindingBuilder::immutable_combined_image_sampler(
            0,
            vk::ShaderStageFlags::FRAGMENT,
            &immutable_samplers,
        );
        let set_layout = DescriptorSetLayout::new_push(device.clone(), &[binding])?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(ctx.vertex_shader)
            .fragment_shader(ctx.fragment_shader)
            .topology(PrimitiveTopology::TriangleStrip)
            .cull_mode(CullMode::None)
            .front_face(FrontFace::CounterClockwise)
            .color_blend_attachment(ColorBlendAttachment::default())
            .render_pass(ctx.render_pass.handle(), 0)
            .build(device, &pipeline_layout)?;

        debug!(
            "Imported buffer {:p} as {:?} ({:?} tiling, external: {})",
            ahb,
            params.format,
            params.tiling,
            params.is_external()
        );

        Ok(Self {
            pipeline,
            pipeline_layout,
            set_layout,
            sampler,
            _conversion: conversion,
            view,
            image,
            _memory: memory,
            params,
            extent,
        })
    }

    /// Hardware buffer import is only available on Android.
    #[cfg(not(target_os = "android"))]
    pub fn new(
        _device: Arc<Device>,
        _ctx: &ImportContext<'_>,
        _buffer: &dyn HardwareBufferSource,
    ) -> RhiResult<Self> {
        Err(RhiError::UnsupportedImport(
            "hardware buffers can only be imported on Android".to_string(),
        ))
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.handle
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle
    }

    #[inline]
    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.handle()
    }

    #[inline]
    pub fn params(&self) -> ImageParams {
        self.params
    }

    /// Size of the imported buffer in pixels.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Records a full-screen draw of this image into `framebuffer`.
    ///
    /// The image is acquired from the foreign queue family before the render
    /// pass and released back to it afterwards. `cmd` must be recording.
    pub fn record_draw(
        &self,
        cmd: &CommandBuffer,
        render_pass: &RenderPass,
        framebuffer: &Framebuffer,
        queue_family: u32,
    ) {
        let extent = framebuffer.extent();

        cmd.pipeline_barrier(
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[acquire_barrier(self.image(), queue_family)],
        );

        // The quad covers the whole attachment, nothing to clear.
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer.handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            });
        cmd.begin_render_pass(&begin_info);

        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());

        let image_infos = [descriptor::image_info(
            self.sampler(),
            self.view(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        let writes = [descriptor::combined_image_sampler_write(0, &image_infos)];
        cmd.push_descriptor_set(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout.handle(),
            0,
            &writes,
        );

        cmd.set_viewport(&full_viewport(extent));
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });

        cmd.draw(4, 1, 0, 0);
        cmd.end_render_pass();

        cmd.pipeline_barrier(
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &[release_barrier(self.image(), queue_family)],
        );
    }
}

#[cfg(target_os = "android")]
fn query_native_candidate(
    device: &Device,
    format: vk::Format,
    tiling: vk::ImageTiling,
) -> RhiResult<CandidateSupport> {
    let mut external_info = vk::PhysicalDeviceExternalImageFormatInfo::default()
        .handle_type(vk::ExternalMemoryHandleTypeFlags::ANDROID_HARDWARE_BUFFER_ANDROID);
    let format_info = vk::PhysicalDeviceImageFormatInfo2::default()
        .format(format)
        .ty(vk::ImageType::TYPE_2D)
        .tiling(tiling)
        .usage(IMPORT_USAGE)
        .flags(vk::ImageCreateFlags::empty())
        .push_next(&mut external_info);

    let mut external_props = vk::ExternalImageFormatProperties::default();
    let mut props = vk::ImageFormatProperties2::default().push_next(&mut external_props);

    let result = unsafe {
        device.instance().get_physical_device_image_format_properties2(
            device.physical_device(),
            &format_info,
            &mut props,
        )
    };

    match result {
        Ok(()) => {}
        Err(vk::Result::ERROR_FORMAT_NOT_SUPPORTED) => {
            return Ok(CandidateSupport::FormatNotSupported)
        }
        Err(e) => return Err(e.into()),
    }

    let features = external_props
        .external_memory_properties
        .external_memory_features;
    Ok(
        if features.contains(vk::ExternalMemoryFeatureFlags::IMPORTABLE) {
            CandidateSupport::Importable
        } else {
            CandidateSupport::NotImportable
        },
    )
}

fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NV12: vk::Format = vk::Format::G8_B8R8_2PLANE_420_UNORM;

    fn answers(
        answers: &[CandidateSupport],
    ) -> impl FnMut(vk::Format, vk::ImageTiling) -> RhiResult<CandidateSupport> + '_ {
        let mut calls = 0;
        move |_, _| {
            let answer = answers[calls];
            calls += 1;
            Ok(answer)
        }
    }

    #[test]
    fn test_auto_prefers_linear_native() {
        let params = choose_image_params(
            ExternalFormatPolicy::Auto,
            NV12,
            42,
            answers(&[CandidateSupport::Importable]),
        )
        .unwrap();
        assert_eq!(params.format, NV12);
        assert_eq!(params.tiling, vk::ImageTiling::LINEAR);
        assert!(!params.is_external());
    }

    #[test]
    fn test_auto_falls_through_to_optimal() {
        let mut seen = Vec::new();
        let params = choose_image_params(ExternalFormatPolicy::Auto, NV12, 42, |_, tiling| {
            seen.push(tiling);
            Ok(if tiling == vk::ImageTiling::LINEAR {
                CandidateSupport::FormatNotSupported
            } else {
                CandidateSupport::Importable
            })
        })
        .unwrap();
        assert_eq!(seen, TILING_CANDIDATES.to_vec());
        assert_eq!(params.tiling, vk::ImageTiling::OPTIMAL);
        assert!(!params.is_external());
    }

    #[test]
    fn test_auto_falls_back_to_external() {
        let params = choose_image_params(
            ExternalFormatPolicy::Auto,
            NV12,
            42,
            answers(&[
                CandidateSupport::FormatNotSupported,
                CandidateSupport::FormatNotSupported,
            ]),
        )
        .unwrap();
        assert_eq!(params.format, vk::Format::UNDEFINED);
        assert_eq!(params.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(params.external_format, Some(42));
    }

    #[test]
    fn test_not_importable_is_an_error() {
        let result = choose_image_params(
            ExternalFormatPolicy::Auto,
            NV12,
            42,
            answers(&[CandidateSupport::NotImportable]),
        );
        assert!(matches!(result, Err(RhiError::UnsupportedImport(_))));
    }

    #[test]
    fn test_always_skips_native_queries() {
        let params = choose_image_params(ExternalFormatPolicy::Always, NV12, 7, |_, _| {
            panic!("native candidates must not be queried")
        })
        .unwrap();
        assert_eq!(params.external_format, Some(7));
    }

    #[test]
    fn test_undefined_native_format_requires_external() {
        let params = choose_image_params(
            ExternalFormatPolicy::Auto,
            vk::Format::UNDEFINED,
            9,
            |_, _| panic!("native candidates must not be queried"),
        )
        .unwrap();
        assert!(params.is_external());

        let result = choose_image_params(
            ExternalFormatPolicy::Never,
            vk::Format::UNDEFINED,
            9,
            |_, _| panic!("native candidates must not be queried"),
        );
        assert!(matches!(result, Err(RhiError::UnsupportedImport(_))));
    }

    #[test]
    fn test_never_without_native_candidate_fails() {
        let result = choose_image_params(
            ExternalFormatPolicy::Never,
            NV12,
            42,
            answers(&[
                CandidateSupport::FormatNotSupported,
                CandidateSupport::FormatNotSupported,
            ]),
        );
        assert!(matches!(result, Err(RhiError::UnsupportedImport(_))));
    }

    #[test]
    fn test_external_requires_nonzero_format() {
        let result = choose_image_params(ExternalFormatPolicy::Always, NV12, 0, |_, _| {
            Ok(CandidateSupport::Importable)
        });
        assert!(matches!(result, Err(RhiError::UnsupportedImport(_))));
    }

    #[test]
    fn test_query_errors_propagate() {
        let result = choose_image_params(ExternalFormatPolicy::Auto, NV12, 42, |_, _| {
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        });
        assert!(matches!(
            result,
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_lowest_memory_type() {
        assert_eq!(lowest_memory_type(0), None);
        assert_eq!(lowest_memory_type(0b1), Some(0));
        assert_eq!(lowest_memory_type(0b1100), Some(2));
        assert_eq!(lowest_memory_type(0x8000_0000), Some(31));
    }

    #[test]
    fn test_queue_family_transfer_barriers() {
        let acquire = acquire_barrier(vk::Image::null(), 3);
        assert_eq!(acquire.src_queue_family_index, vk::QUEUE_FAMILY_FOREIGN_EXT);
        assert_eq!(acquire.dst_queue_family_index, 3);
        assert_eq!(acquire.old_layout, vk::ImageLayout::PREINITIALIZED);
        assert_eq!(acquire.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(acquire.dst_access_mask, vk::AccessFlags::SHADER_READ);

        let release = release_barrier(vk::Image::null(), 3);
        assert_eq!(release.src_queue_family_index, 3);
        assert_eq!(release.dst_queue_family_index, vk::QUEUE_FAMILY_FOREIGN_EXT);
        assert_eq!(release.old_layout, release.new_layout);
        assert_eq!(release.src_access_mask, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_full_viewport() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1920,
            height: 1080,
        });
        assert_eq!(viewport.width, 1920.0);
        assert_eq!(viewport.height, 1080.0);
        assert_eq!(viewport.max_depth, 1.0);
    }
}
