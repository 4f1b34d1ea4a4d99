//! The render loop state machine.
//!
//! [`Engine`] owns every piece of render state and is only ever touched by
//! the thread running it. Other threads talk to it through an
//! [`EventSender`]; the producer talks to it through the [`BufferSignal`]
//! and the buffer-removed hook.
//!
//! # Loop iteration
//!
//! 1. Take one event: block for it while paused, otherwise poll.
//! 2. Handle the event.
//! 3. If unpaused with a window and a producer, present one frame. Waiting
//!    for the frame is cut short by any new event; the acquired swapchain
//!    image is then kept for the next attempt.
//! 4. Collect frames whose GPU work has completed.
//! 5. Evict cache entries nothing references any more.
//!
//! All GPU work goes through a [`Backend`], so the loop itself has no Vulkan
//! in it and can be driven by a fake backend in tests.
//!
//! [`BufferSignal`]: crate::BufferSignal

use tracing::{debug, error, info, trace, warn};

use crate::cache::ImportCache;
use crate::error::{RenderError, RenderResult};
use crate::event::{Event, EventSender};
use crate::framechain::{FrameFence, Framechain};
use crate::producer::{BoxedProducer, FrameUnit, ProducerHooks};
use crate::signal::Pulled;

/// Result of asking the backend for the next swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAcquire {
    /// The image at this index is ready to be drawn to.
    Ready(usize),
    /// The swapchain no longer matches the surface.
    OutOfDate,
}

/// How the last present went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// Anything but a clean present rebuilds the swapchain before the next
    /// frame.
    pub fn needs_recreation(self) -> bool {
        self != Self::Optimal
    }
}

/// Whether the loop keeps going after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// GPU operations the render loop needs.
///
/// Associated resource types release their GPU objects on drop. The engine
/// drops them in dependency order: frames, then swapchain, then surface.
pub trait Backend: Send + 'static {
    /// A window handle handed over by the platform layer.
    type Window: Send + 'static;
    type Unit: FrameUnit;
    type Surface;
    type Swapchain;
    type Frame: FrameFence;
    /// GPU objects built from one imported hardware buffer.
    type Resource;

    fn create_surface(&mut self, window: &Self::Window) -> RenderResult<Self::Surface>;

    /// Build a swapchain sized to the window's current extent.
    fn create_swapchain(
        &mut self,
        window: &Self::Window,
        surface: &Self::Surface,
    ) -> RenderResult<Self::Swapchain>;

    /// One frame per swapchain image, each with an unsignaled fence.
    fn create_frames(&mut self, swapchain: &Self::Swapchain) -> RenderResult<Vec<Self::Frame>>;

    /// Acquire the next image, blocking until it is actually available.
    fn acquire_image(&mut self, swapchain: &Self::Swapchain) -> RenderResult<ImageAcquire>;

    fn import(
        &mut self,
        buffer: &<Self::Unit as FrameUnit>::Buffer,
    ) -> RenderResult<Self::Resource>;

    /// Record the commands drawing `resource` into `frame`.
    fn record(&mut self, frame: &Self::Frame, resource: &Self::Resource) -> RenderResult<()>;

    /// Submit the recorded frame. Its fence signals once the GPU is done
    /// with it, so a frame is only waited on after this returned `Ok`.
    fn submit(&mut self, frame: &Self::Frame) -> RenderResult<()>;

    /// Present the submitted frame's image.
    fn present(
        &mut self,
        swapchain: &Self::Swapchain,
        frame: &Self::Frame,
        image_index: usize,
    ) -> RenderResult<PresentStatus>;
}

type Cache<B> = ImportCache<<<B as Backend>::Unit as FrameUnit>::Buffer, <B as Backend>::Resource>;

struct Chain<B: Backend> {
    framechain: Framechain<B::Frame, B::Unit>,
    swapchain: B::Swapchain,
    status: PresentStatus,
    /// Image acquired by a present that was interrupted before drawing
    pending_image: Option<usize>,
}

struct Bound<B: Backend> {
    chain: Option<Chain<B>>,
    surface: B::Surface,
    window: B::Window,
}

/// The render loop and everything it owns.
pub struct Engine<B: Backend> {
    sender: EventSender<B::Window, B::Unit>,
    producer: Option<BoxedProducer<B::Unit>>,
    bound: Option<Bound<B>>,
    cache: Cache<B>,
    started: bool,
    paused: bool,
    backend: B,
}

impl<B: Backend> Engine<B> {
    /// Create an engine consuming the events sent through `sender`.
    ///
    /// The engine starts paused, without a window or a producer.
    pub fn new(backend: B, cache_capacity: usize, sender: EventSender<B::Window, B::Unit>) -> Self {
        Self {
            sender,
            producer: None,
            bound: None,
            cache: ImportCache::new(cache_capacity),
            started: false,
            paused: true,
            backend,
        }
    }

    pub fn sender(&self) -> &EventSender<B::Window, B::Unit> {
        &self.sender
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_window_bound(&self) -> bool {
        self.bound.is_some()
    }

    pub fn has_swapchain(&self) -> bool {
        self.chain().is_some()
    }

    pub fn cache(&self) -> &Cache<B> {
        &self.cache
    }

    pub fn framechain(&self) -> Option<&Framechain<B::Frame, B::Unit>> {
        self.chain().map(|chain| &chain.framechain)
    }

    fn chain(&self) -> Option<&Chain<B>> {
        self.bound.as_ref().and_then(|bound| bound.chain.as_ref())
    }

    /// Run until a stop event, end of stream or a fatal error.
    ///
    /// Everything is torn down before returning, on success and on error.
    pub fn run(mut self) -> RenderResult<()> {
        info!("Render loop started");

        let result = loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break Ok(()),
                Err(e) => {
                    error!("Render loop failed: {}", e);
                    break Err(e);
                }
            }
        };

        let teardown = self.teardown();
        info!("Render loop exited");
        result.and(teardown)
    }

    /// One loop iteration.
    pub fn step(&mut self) -> RenderResult<Flow> {
        if let Some(event) = self.sender.next_event(self.paused) {
            if self.handle_event(event)? == Flow::Stop {
                return Ok(Flow::Stop);
            }
        }

        if !self.paused && self.bound.is_some() && self.producer.is_some() {
            if self.present()? == Flow::Stop {
                info!("Producer reached end of stream");
                return Ok(Flow::Stop);
            }
        }

        self.collect_completed()?;
        self.cache.evict_unreferenced();

        Ok(Flow::Continue)
    }

    fn handle_event(&mut self, event: Event<B::Window, B::Unit>) -> RenderResult<Flow> {
        debug!("Handling {:?}", event);

        match event {
            Event::Start(producer) => self.start(producer)?,
            Event::Stop => return Ok(Flow::Stop),
            Event::BindWindow(window) => {
                if self.bound.is_some() {
                    warn!("Window already bound, ignoring bind");
                } else {
                    let surface = self.backend.create_surface(&window)?;
                    self.bound = Some(Bound {
                        chain: None,
                        surface,
                        window,
                    });
                    info!("Window bound");
                }
            }
            Event::UnbindWindow => {
                let result = match self.bound.take() {
                    Some(bound) => Self::release_bound(bound, &mut self.cache),
                    None => Ok(()),
                };
                self.sender.binding().complete_unbind();
                result?;
                info!("Window unbound");
            }
            Event::Pause | Event::Unpause if !self.started => {
                warn!("{:?} before start, ignoring", event);
            }
            Event::Pause => self.paused = true,
            Event::Unpause => self.paused = false,
            Event::BufferInvalidated(id) => {
                self.cache.invalidate(id);
            }
        }

        Ok(Flow::Continue)
    }

    fn start(&mut self, mut producer: BoxedProducer<B::Unit>) -> RenderResult<()> {
        if self.started {
            warn!("Already started, ignoring second producer");
            return Ok(());
        }

        let sender = self.sender.clone();
        let hooks = ProducerHooks::new(self.sender.signal().clone(), move |id| {
            sender.buffer_invalidated(id)
        });
        producer.attach(hooks)?;

        self.producer = Some(producer);
        self.started = true;
        info!("Producer attached");
        Ok(())
    }

    fn present(&mut self) -> RenderResult<Flow> {
        let (Some(bound), Some(producer)) = (self.bound.as_mut(), self.producer.as_mut()) else {
            return Ok(Flow::Continue);
        };

        if let Some(chain) = bound.chain.take_if(|chain| chain.status.needs_recreation()) {
            debug!("Recreating swapchain after {:?} present", chain.status);
            Self::release_chain(chain, &mut self.cache)?;
        }

        if bound.chain.is_none() {
            let swapchain = self.backend.create_swapchain(&bound.window, &bound.surface)?;
            let frames = self.backend.create_frames(&swapchain)?;
            debug!("Created framechain of {} frames", frames.len());
            bound.chain = Some(Chain {
                framechain: Framechain::new(frames),
                swapchain,
                status: PresentStatus::Optimal,
                pending_image: None,
            });
        }

        let Some(chain) = bound.chain.as_mut() else {
            return Ok(Flow::Continue);
        };

        let index = match chain.pending_image.take() {
            Some(index) => index,
            None => match self.backend.acquire_image(&chain.swapchain)? {
                ImageAcquire::Ready(index) => index,
                ImageAcquire::OutOfDate => {
                    debug!("Swapchain out of date on acquire");
                    chain.status = PresentStatus::OutOfDate;
                    return Ok(Flow::Continue);
                }
            },
        };

        let cache = &mut self.cache;
        chain
            .framechain
            .prepare(index, &mut |slot| cache.release_unit(slot))?;

        let unit = match self
            .sender
            .signal()
            .wait_and_pull(|| producer.acquire_latest())?
        {
            Pulled::Ready(unit) => unit,
            Pulled::Interrupted => {
                trace!("Frame wait interrupted, keeping image {}", index);
                chain.pending_image = Some(index);
                return Ok(Flow::Continue);
            }
            Pulled::EndOfStream => return Ok(Flow::Stop),
        };

        let backend = &mut self.backend;
        let slot = cache.import(unit.buffer_id(), || {
            let buffer = unit.buffer()?;
            let resource = backend.import(&buffer)?;
            Ok((buffer, resource))
        })?;
        cache.mark_active(slot);

        // The frame only takes the unit once its fence is on the queue.
        // Until then it stays reset and is never waited on.
        let submitted = chain.framechain.frame(index).and_then(|frame| {
            let resource = cache
                .resource(slot)
                .ok_or(RenderError::StaleSlot(slot.index()))?;
            backend.record(frame, resource)?;
            backend.submit(frame)
        });
        if let Err(e) = submitted {
            drop(unit);
            cache.release_unit(slot);
            return Err(e);
        }
        chain.framechain.assign(index, slot, unit)?;
        chain.framechain.push_in_flight(index);

        chain.status = backend.present(&chain.swapchain, chain.framechain.frame(index)?, index)?;
        if chain.status.needs_recreation() {
            debug!("Present returned {:?}", chain.status);
        }

        Ok(Flow::Continue)
    }

    fn collect_completed(&mut self) -> RenderResult<()> {
        let Some(chain) = self.bound.as_mut().and_then(|bound| bound.chain.as_mut()) else {
            return Ok(());
        };

        let cache = &mut self.cache;
        chain
            .framechain
            .collect_completed(&mut |slot| cache.release_unit(slot))?;
        Ok(())
    }

    /// Waits for every frame, then drops frames before the swapchain.
    fn release_chain(mut chain: Chain<B>, cache: &mut Cache<B>) -> RenderResult<()> {
        let result = chain
            .framechain
            .release(&mut |slot| cache.release_unit(slot));
        drop(chain);
        result
    }

    fn release_bound(bound: Bound<B>, cache: &mut Cache<B>) -> RenderResult<()> {
        let Bound {
            chain,
            surface,
            window,
        } = bound;

        let result = match chain {
            Some(chain) => Self::release_chain(chain, cache),
            None => Ok(()),
        };
        drop(surface);
        drop(window);
        result
    }

    /// Releases everything in dependency order. Safe to call more than once.
    fn teardown(&mut self) -> RenderResult<()> {
        let result = match self.bound.take() {
            Some(bound) => Self::release_bound(bound, &mut self.cache),
            None => Ok(()),
        };
        if let Err(e) = &result {
            error!("Failed to release presentation resources: {}", e);
        }

        self.cache.clear();
        self.producer = None;
        self.started = false;
        self.sender.binding().mark_exited();
        result
    }
}

impl<B: Backend> Drop for Engine<B> {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}
