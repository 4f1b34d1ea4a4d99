//! MediaCodec decoding into an `AImageReader`, whose hardware buffers are
//! handed to the renderer.

use std::fs::File;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ash::vk;
use ndk::hardware_buffer::{HardwareBuffer, HardwareBufferRef, HardwareBufferUsage};
use ndk::media::image_reader::{Image, ImageFormat, ImageReader};
use ndk::media::media_codec::{
    DequeuedInputBufferResult, DequeuedOutputBufferInfoResult, MediaCodec, MediaCodecDirection,
};
use ndk::media::media_format::MediaFormat;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use vkplay_core::Channel;
use vkplay_renderer::{
    Acquire, BufferId, FrameProducer, FrameUnit, ProducerHooks, RenderResult,
};
use vkplay_rhi::import::{HardwareBufferDesc, HardwareBufferSource};

use crate::decoder::{self, Codec, DecoderEvent, InputSample, OutputSample, POLL_TIMEOUT};
use crate::error::{MediaError, MediaResult};
use crate::latch::StreamEnd;

const THREAD_NAME: &str = "vkplay-decode";

/// Images the reader may hand out at once.
const MAX_IMAGES: i32 = 8;

const KEY_MIME: &str = "mime";
const KEY_WIDTH: &str = "width";
const KEY_HEIGHT: &str = "height";

fn check(call: &'static str, status: ndk_sys::media_status_t) -> MediaResult<()> {
    match status.0 {
        0 => Ok(()),
        status => Err(MediaError::Status { call, status }),
    }
}

fn buffer_id(buffer: &HardwareBuffer) -> BufferId {
    BufferId(buffer.as_ptr() as usize as u64)
}

/// Owned `AMediaExtractor` reading from a file.
struct Extractor {
    ptr: NonNull<ndk_sys::AMediaExtractor>,
    file: File,
}

impl Extractor {
    fn open(path: &Path) -> MediaResult<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();

        // SAFETY: plain constructor; null is handled below.
        let ptr = NonNull::new(unsafe { ndk_sys::AMediaExtractor_new() }).ok_or(
            MediaError::Status {
                call: "AMediaExtractor_new",
                status: -1,
            },
        )?;
        let extractor = Self { ptr, file };

        // SAFETY: the descriptor stays open for as long as the extractor.
        let status = unsafe {
            ndk_sys::AMediaExtractor_setDataSourceFd(
                extractor.ptr.as_ptr(),
                extractor.file.as_raw_fd(),
                0,
                length as i64,
            )
        };
        check("AMediaExtractor_setDataSourceFd", status)?;
        Ok(extractor)
    }

    fn track_format(&self, index: usize) -> MediaResult<MediaFormat> {
        // SAFETY: `index` is below the track count; the returned format is
        // owned by the caller.
        let ptr = unsafe { ndk_sys::AMediaExtractor_getTrackFormat(self.ptr.as_ptr(), index) };
        let ptr = NonNull::new(ptr).ok_or(MediaError::Status {
            call: "AMediaExtractor_getTrackFormat",
            status: -1,
        })?;
        // SAFETY: freshly created format, not shared with anything else.
        Ok(unsafe { MediaFormat::from_ptr(ptr) })
    }

    /// The first video track and its format.
    fn video_track(&self) -> MediaResult<Option<(usize, MediaFormat)>> {
        // SAFETY: valid extractor.
        let count = unsafe { ndk_sys::AMediaExtractor_getTrackCount(self.ptr.as_ptr()) };
        let mut formats = (0..count)
            .map(|i| self.track_format(i))
            .collect::<MediaResult<Vec<_>>>()?;

        for (i, format) in formats.iter().enumerate() {
            debug!("Track {}: {}", i, format);
        }

        let index = decoder::select_video_track(formats.iter().map(|f| f.str(KEY_MIME)));
        Ok(index.map(|i| (i, formats.swap_remove(i))))
    }

    fn select_track(&self, index: usize) -> MediaResult<()> {
        // SAFETY: valid extractor.
        let status = unsafe { ndk_sys::AMediaExtractor_selectTrack(self.ptr.as_ptr(), index) };
        check("AMediaExtractor_selectTrack", status)
    }

    /// Copy the current sample into `buffer`. Negative once exhausted.
    fn read_sample(&self, buffer: &mut [MaybeUninit<u8>]) -> isize {
        // SAFETY: the extractor writes at most `buffer.len()` bytes.
        unsafe {
            ndk_sys::AMediaExtractor_readSampleData(
                self.ptr.as_ptr(),
                buffer.as_mut_ptr().cast(),
                buffer.len(),
            )
        }
    }

    fn sample_time(&self) -> i64 {
        // SAFETY: valid extractor.
        unsafe { ndk_sys::AMediaExtractor_getSampleTime(self.ptr.as_ptr()) }
    }

    fn advance(&self) -> bool {
        // SAFETY: valid extractor.
        unsafe { ndk_sys::AMediaExtractor_advance(self.ptr.as_ptr()) }
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        // SAFETY: the pointer came from AMediaExtractor_new and is deleted once.
        unsafe {
            ndk_sys::AMediaExtractor_delete(self.ptr.as_ptr());
        }
    }
}

/// The codec and its input, owned by the decoder thread.
struct NdkDecoder {
    codec: MediaCodec,
    extractor: Extractor,
}

// SAFETY: both objects move to the decoder thread once and are only used
// there afterwards.
unsafe impl Send for NdkDecoder {}

impl Codec for NdkDecoder {
    fn start(&mut self) -> MediaResult<()> {
        Ok(self.codec.start()?)
    }

    fn stop(&mut self) -> MediaResult<()> {
        Ok(self.codec.stop()?)
    }

    fn queue_input(&mut self) -> MediaResult<Option<InputSample>> {
        let mut buffer = match self.codec.dequeue_input_buffer(POLL_TIMEOUT)? {
            DequeuedInputBufferResult::Buffer(buffer) => buffer,
            DequeuedInputBufferResult::TryAgainLater => return Ok(None),
        };

        let sample_size = self.extractor.read_sample(buffer.buffer_mut());
        let time = self.extractor.sample_time();
        let sample = InputSample::new(sample_size, || self.extractor.advance());

        self.codec.queue_input_buffer(
            buffer,
            0,
            sample.size,
            u64::try_from(time).unwrap_or(0),
            sample.flags(),
        )?;
        Ok(Some(sample))
    }

    fn release_output(&mut self) -> MediaResult<Option<OutputSample>> {
        let buffer = match self.codec.dequeue_output_buffer(POLL_TIMEOUT)? {
            DequeuedOutputBufferInfoResult::Buffer(buffer) => buffer,
            DequeuedOutputBufferInfoResult::OutputFormatChanged => {
                debug!("Decoder output format: {}", self.codec.output_format());
                return Ok(None);
            }
            _ => return Ok(None),
        };

        let info = buffer.info();
        let output = OutputSample {
            size: info.size(),
            flags: info.flags(),
        };
        self.codec
            .release_output_buffer(buffer, output.should_render())?;
        Ok(Some(output))
    }
}

/// The image reader shared by the session and its producer.
struct SharedReader(Mutex<ImageReader>);

// SAFETY: AImageReader may be used from any thread; calls are serialized by
// the mutex and the listeners only capture `Send` hooks.
unsafe impl Send for SharedReader {}
unsafe impl Sync for SharedReader {}

/// A video file decoding into hardware buffers.
///
/// Decoding waits for [`start`](Self::start). Dropping the session stops the
/// decoder thread and joins it; the image reader lives on while a producer
/// still refers to it.
pub struct Session {
    decoder: Option<JoinHandle<MediaResult<()>>>,
    events: Arc<Channel<DecoderEvent>>,
    reader: Arc<SharedReader>,
    end: Arc<StreamEnd>,
    size: (u32, u32),
}

impl Session {
    /// Open `path` and prepare a decoder for its first video track.
    pub fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        let extractor = Extractor::open(path)?;
        let (track, format) = extractor
            .video_track()?
            .ok_or_else(|| MediaError::NoVideoTrack(path.display().to_string()))?;
        extractor.select_track(track)?;

        let mime = format
            .str(KEY_MIME)
            .ok_or(MediaError::MissingFormatKey(KEY_MIME))?
            .to_string();
        let width = format
            .i32(KEY_WIDTH)
            .ok_or(MediaError::MissingFormatKey(KEY_WIDTH))?;
        let height = format
            .i32(KEY_HEIGHT)
            .ok_or(MediaError::MissingFormatKey(KEY_HEIGHT))?;
        info!("Decoding track {} of {}: {} {}x{}", track, path.display(), mime, width, height);

        let reader = ImageReader::new_with_usage(
            width,
            height,
            ImageFormat::YUV_420_888,
            HardwareBufferUsage::GPU_SAMPLED_IMAGE
                | HardwareBufferUsage::CPU_READ_NEVER
                | HardwareBufferUsage::CPU_WRITE_NEVER,
            MAX_IMAGES,
        )?;
        let window = reader.window()?;

        let codec =
            MediaCodec::from_decoder_type(&mime).ok_or_else(|| MediaError::NoDecoder(mime.clone()))?;
        codec.configure(&format, Some(&window), MediaCodecDirection::Decoder)?;

        let events = Arc::new(Channel::new(4));
        let end = Arc::new(StreamEnd::new());
        let mut ndk_decoder = NdkDecoder { codec, extractor };

        let decoder = thread::Builder::new().name(THREAD_NAME.to_string()).spawn({
            let events = events.clone();
            let end = end.clone();
            move || decoder::run(&mut ndk_decoder, &events, &end)
        })?;

        Ok(Self {
            decoder: Some(decoder),
            events,
            reader: Arc::new(SharedReader(Mutex::new(reader))),
            end,
            size: (width as u32, height as u32),
        })
    }

    /// A producer handing the renderer the reader's newest image.
    pub fn producer(&self) -> ReaderProducer {
        ReaderProducer {
            reader: self.reader.clone(),
            end: self.end.clone(),
        }
    }

    /// Begin decoding. A second start is ignored.
    pub fn start(&self) {
        self.events.push(DecoderEvent::Start);
    }

    /// Width and height of the decoded video.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(decoder) = self.decoder.take() else {
            return;
        };

        self.events.push(DecoderEvent::Stop);
        match decoder.join() {
            Ok(Ok(())) => debug!("Decoder thread joined"),
            Ok(Err(e)) => warn!("Decoder thread exited with error: {}", e),
            Err(_) => error!("{}", MediaError::ThreadPanicked),
        }
    }
}

/// [`FrameProducer`] over the session's image reader.
pub struct ReaderProducer {
    reader: Arc<SharedReader>,
    end: Arc<StreamEnd>,
}

impl FrameProducer for ReaderProducer {
    type Unit = DecodedFrame;

    fn attach(&mut self, hooks: ProducerHooks) -> RenderResult<()> {
        {
            let mut reader = self.reader.0.lock();

            let available = hooks.clone();
            let end = self.end.clone();
            reader
                .set_image_listener(Box::new(move |_| {
                    available.notify_available();
                    end.frame_delivered();
                }))
                .map_err(MediaError::from)?;

            let removed = hooks.clone();
            reader
                .set_buffer_removed_listener(Box::new(move |_, buffer| {
                    removed.buffer_removed(buffer_id(buffer))
                }))
                .map_err(MediaError::from)?;
        }

        self.end.attach(hooks);
        debug!("Image reader listeners installed");
        Ok(())
    }

    fn acquire_latest(&mut self) -> RenderResult<Acquire<DecodedFrame>> {
        let image = self
            .reader
            .0
            .lock()
            .acquire_latest_image()
            .map_err(MediaError::from)?;

        Ok(match image {
            Some(image) => Acquire::Ready(DecodedFrame::new(image)?),
            None if self.end.has_fired() => Acquire::EndOfStream,
            None => Acquire::NotReady,
        })
    }
}

/// An acquired reader image. The reader gets it back when this drops.
pub struct DecodedFrame {
    image: Image,
    id: BufferId,
}

// SAFETY: AImage_delete may run on any thread.
unsafe impl Send for DecodedFrame {}

impl DecodedFrame {
    fn new(image: Image) -> MediaResult<Self> {
        let id = buffer_id(&image.hardware_buffer()?);
        Ok(Self { image, id })
    }
}

impl FrameUnit for DecodedFrame {
    type Buffer = SharedBuffer;

    fn buffer_id(&self) -> BufferId {
        self.id
    }

    fn buffer(&self) -> RenderResult<SharedBuffer> {
        let buffer = self.image.hardware_buffer().map_err(MediaError::from)?;
        Ok(SharedBuffer(buffer.acquire()))
    }
}

/// A strong reference to an image's hardware buffer.
pub struct SharedBuffer(HardwareBufferRef);

// SAFETY: hardware buffer reference counting is thread-safe.
unsafe impl Send for SharedBuffer {}

impl HardwareBufferSource for SharedBuffer {
    fn hardware_buffer(&self) -> *mut vk::AHardwareBuffer {
        self.0.as_ptr().cast()
    }

    fn describe(&self) -> HardwareBufferDesc {
        let desc = self.0.describe();
        HardwareBufferDesc {
            width: desc.width,
            height: desc.height,
            gpu_sampled: desc.usage.contains(HardwareBufferUsage::GPU_SAMPLED_IMAGE),
        }
    }
}
