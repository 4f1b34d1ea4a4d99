//! The Vulkan implementation of [`Backend`].

use std::marker::PhantomData;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use vkplay_core::ExternalFormatPolicy;
use vkplay_platform::{Surface, Window};
use vkplay_rhi::RhiError;
use vkplay_rhi::command::{CommandBuffer, CommandPool};
use vkplay_rhi::device::Device;
use vkplay_rhi::import::{HardwareBufferSource, ImportContext, ImportedImage};
use vkplay_rhi::instance::Instance;
use vkplay_rhi::physical_device::select_physical_device;
use vkplay_rhi::render_pass::{Framebuffer, RenderPass};
use vkplay_rhi::shader::{QUAD_FRAG_SPV, QUAD_VERT_SPV, Shader, ShaderStage};
use vkplay_rhi::swapchain::{PRESENT_FORMAT, SurfaceSupport, Swapchain};
use vkplay_rhi::sync::{Fence, Semaphore};

use crate::engine::{Backend, ImageAcquire, PresentStatus};
use crate::error::RenderResult;
use crate::framechain::FrameFence;
use crate::producer::FrameUnit;

/// A swapchain and the fence its image acquisitions signal.
pub struct VulkanSwapchain {
    acquire_fence: Fence,
    swapchain: Swapchain,
    device: Arc<Device>,
}

impl VulkanSwapchain {
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        // Presentation may still read from the images.
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle before swapchain destruction: {}", e);
        }
    }
}

/// Per-swapchain-image resources.
///
/// The release semaphore orders presentation after rendering; the fence
/// reports when the frame's command buffer has completed.
pub struct VulkanFrame {
    command_buffer: CommandBuffer,
    framebuffer: Framebuffer,
    release: Semaphore,
    fence: Fence,
}

impl VulkanFrame {
    fn new(
        device: &Arc<Device>,
        command_pool: &Arc<CommandPool>,
        render_pass: &RenderPass,
        view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        Ok(Self {
            command_buffer: CommandBuffer::new(command_pool.clone())?,
            framebuffer: Framebuffer::new(device.clone(), render_pass, view, extent)?,
            release: Semaphore::new(device.clone())?,
            fence: Fence::new(device.clone(), false)?,
        })
    }
}

impl FrameFence for VulkanFrame {
    fn is_signaled(&self) -> RenderResult<bool> {
        Ok(self.fence.status()?)
    }

    fn wait(&self) -> RenderResult<()> {
        Ok(self.fence.wait(u64::MAX)?)
    }

    fn reset(&self) -> RenderResult<()> {
        Ok(self.fence.reset()?)
    }
}

/// Presents hardware buffers through Vulkan.
///
/// # Resource Destruction Order
///
/// Fields are declared so that everything built from the device drops
/// before the device, and the device before the instance.
pub struct VulkanBackend<U> {
    command_pool: Arc<CommandPool>,
    render_pass: RenderPass,
    vertex_shader: Shader,
    fragment_shader: Shader,
    device: Arc<Device>,
    instance: Instance,
    policy: ExternalFormatPolicy,
    _unit: PhantomData<fn() -> U>,
}

impl<U> VulkanBackend<U> {
    /// Create the instance, device and every object shared across frames.
    ///
    /// # Errors
    ///
    /// Fails when the Vulkan library cannot be loaded, validation is
    /// requested but unavailable, or no device has the capabilities hardware
    /// buffer presentation needs.
    pub fn new(enable_validation: bool, policy: ExternalFormatPolicy) -> RenderResult<Self> {
        info!("Initializing Vulkan backend (validation: {})", enable_validation);

        let instance = Instance::new(enable_validation)?;
        let physical_device = select_physical_device(instance.handle())?;
        info!("Using {:?}", physical_device);

        let device = Device::new(&instance, &physical_device)?;
        let command_pool = Arc::new(CommandPool::new(device.clone(), device.queue_family())?);
        let render_pass = RenderPass::new(device.clone(), PRESENT_FORMAT.format)?;

        let vertex_shader =
            Shader::from_spirv_bytes(device.clone(), QUAD_VERT_SPV, ShaderStage::Vertex, "main")?;
        let fragment_shader = Shader::from_spirv_bytes(
            device.clone(),
            QUAD_FRAG_SPV,
            ShaderStage::Fragment,
            "main",
        )?;

        info!("Vulkan backend ready, external format policy {:?}", policy);

        Ok(Self {
            command_pool,
            render_pass,
            vertex_shader,
            fragment_shader,
            device,
            instance,
            policy,
            _unit: PhantomData,
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl<U> Backend for VulkanBackend<U>
where
    U: FrameUnit,
    U::Buffer: HardwareBufferSource,
{
    type Window = Window;
    type Unit = U;
    type Surface = Surface;
    type Swapchain = VulkanSwapchain;
    type Frame = VulkanFrame;
    type Resource = ImportedImage;

    fn create_surface(&mut self, window: &Window) -> RenderResult<Surface> {
        let surface = window.create_surface(self.instance.entry(), self.instance.handle())?;
        let format = SurfaceSupport::query(
            self.device.physical_device(),
            self.device.queue_family(),
            surface.handle(),
            surface.loader(),
        )?
        .validate()?;
        debug!("Surface created for {:?}, presenting as {:?}", window, format.format);
        Ok(surface)
    }

    fn create_swapchain(&mut self, window: &Window, surface: &Surface) -> RenderResult<VulkanSwapchain> {
        let (width, height) = window.size();
        let swapchain = Swapchain::new(
            self.device.clone(),
            surface.loader(),
            surface.handle(),
            width,
            height,
        )?;
        let acquire_fence = Fence::new(self.device.clone(), false)?;

        Ok(VulkanSwapchain {
            acquire_fence,
            swapchain,
            device: self.device.clone(),
        })
    }

    fn create_frames(&mut self, swapchain: &VulkanSwapchain) -> RenderResult<Vec<VulkanFrame>> {
        let extent = swapchain.extent();
        swapchain
            .swapchain
            .image_views()
            .iter()
            .map(|&view| {
                VulkanFrame::new(
                    &self.device,
                    &self.command_pool,
                    &self.render_pass,
                    view,
                    extent,
                )
            })
            .collect()
    }

    fn acquire_image(&mut self, swapchain: &VulkanSwapchain) -> RenderResult<ImageAcquire> {
        let fence = &swapchain.acquire_fence;
        fence.reset()?;

        match swapchain
            .swapchain
            .acquire_next_image_with_fence(fence.handle(), u64::MAX)
        {
            Ok((index, _suboptimal)) => {
                fence.wait(u64::MAX)?;
                Ok(ImageAcquire::Ready(index as usize))
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(ImageAcquire::OutOfDate),
            Err(e) => Err(RhiError::from(e).into()),
        }
    }

    fn import(&mut self, buffer: &U::Buffer) -> RenderResult<ImportedImage> {
        let ctx = ImportContext {
            vertex_shader: &self.vertex_shader,
            fragment_shader: &self.fragment_shader,
            render_pass: &self.render_pass,
            policy: self.policy,
        };
        Ok(ImportedImage::new(self.device.clone(), &ctx, buffer)?)
    }

    fn record(&mut self, frame: &VulkanFrame, resource: &ImportedImage) -> RenderResult<()> {
        let cmd = &frame.command_buffer;
        cmd.begin()?;
        resource.record_draw(
            cmd,
            &self.render_pass,
            &frame.framebuffer,
            self.device.queue_family(),
        );
        cmd.end()?;
        Ok(())
    }

    fn submit(&mut self, frame: &VulkanFrame) -> RenderResult<()> {
        let command_buffers = [frame.command_buffer.handle()];
        let signal_semaphores = [frame.release.handle()];
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was just recorded and the frame fence was
        // reset when the frame was prepared.
        unsafe { self.device.submit(&[submit_info], frame.fence.handle())? };
        Ok(())
    }

    fn present(
        &mut self,
        swapchain: &VulkanSwapchain,
        frame: &VulkanFrame,
        image_index: usize,
    ) -> RenderResult<PresentStatus> {
        match swapchain.swapchain.present(
            self.device.queue(),
            image_index as u32,
            frame.release.handle(),
        ) {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(RhiError::from(e).into()),
        }
    }
}
