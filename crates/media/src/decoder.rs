//! The decoder thread's control loop.
//!
//! The loop is written against [`Codec`] so that its start/stop and
//! end-of-stream handling does not depend on the platform decoder.

use std::time::Duration;

use tracing::{debug, info, warn};

use vkplay_core::Channel;

use crate::error::MediaResult;
use crate::latch::StreamEnd;

/// Codec buffer flag marking the last buffer of the stream.
pub const BUFFER_FLAG_END_OF_STREAM: u32 = 4;

/// How long one dequeue call may block before the loop checks its events.
pub(crate) const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// MIME prefix of the track a session decodes.
const VIDEO_MIME_PREFIX: &str = "video/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecoderEvent {
    Start,
    Stop,
}

/// One sample handed to the codec's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InputSample {
    pub size: usize,
    pub end_of_stream: bool,
}

impl InputSample {
    /// Build from the size the extractor reported for its current sample.
    ///
    /// A negative size means the extractor is exhausted; `advance` is only
    /// called for a sample that was actually read.
    pub fn new(sample_size: isize, advance: impl FnOnce() -> bool) -> Self {
        let end_of_stream = sample_size < 0 || !advance();
        Self {
            size: usize::try_from(sample_size).unwrap_or(0),
            end_of_stream,
        }
    }

    pub fn flags(&self) -> u32 {
        if self.end_of_stream {
            BUFFER_FLAG_END_OF_STREAM
        } else {
            0
        }
    }
}

/// What the codec reported for one output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OutputSample {
    pub size: i32,
    pub flags: u32,
}

impl OutputSample {
    /// Only buffers with content are rendered to the output surface.
    pub fn should_render(&self) -> bool {
        self.size > 0
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags & BUFFER_FLAG_END_OF_STREAM != 0
    }
}

/// Index of the first track whose MIME type is a video type.
pub(crate) fn select_video_track<I, S>(mimes: I) -> Option<usize>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    mimes
        .into_iter()
        .position(|mime| mime.is_some_and(|m| m.as_ref().starts_with(VIDEO_MIME_PREFIX)))
}

/// The operations the decoder loop needs from a codec.
pub(crate) trait Codec {
    fn start(&mut self) -> MediaResult<()>;

    fn stop(&mut self) -> MediaResult<()>;

    /// Feed the next sample if an input buffer is free.
    ///
    /// Returns `None` when the codec had no input buffer to give.
    fn queue_input(&mut self) -> MediaResult<Option<InputSample>>;

    /// Release the next decoded buffer, rendering it if it has content.
    ///
    /// Returns `None` when nothing was decoded within the poll timeout.
    fn release_output(&mut self) -> MediaResult<Option<OutputSample>>;
}

/// How the decoder loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ended {
    Stopped,
    EndOfStream,
}

/// Run the decoder until end of stream, a stop event or an error.
///
/// The stream-end latch fires whichever way the loop ends, since no frame
/// can arrive after it. After a clean end of stream it first waits for the
/// reader to deliver the frames still on their way.
pub(crate) fn run<C: Codec>(
    codec: &mut C,
    events: &Channel<DecoderEvent>,
    end: &StreamEnd,
) -> MediaResult<()> {
    match decode(codec, events, end) {
        Ok(Ended::EndOfStream) => {
            end.finish();
            Ok(())
        }
        result => {
            end.fire();
            result.map(drop)
        }
    }
}

fn decode<C: Codec>(
    codec: &mut C,
    events: &Channel<DecoderEvent>,
    end: &StreamEnd,
) -> MediaResult<Ended> {
    if events.pop_wait() == DecoderEvent::Stop {
        debug!("Decoder stopped before start");
        return Ok(Ended::Stopped);
    }

    codec.start()?;
    info!("Decoder started");

    let result = pump(codec, events, end);
    let stopped = codec.stop();
    info!("Decoder stopped");
    let ended = result?;
    stopped.map(|()| ended)
}

fn pump<C: Codec>(
    codec: &mut C,
    events: &Channel<DecoderEvent>,
    end: &StreamEnd,
) -> MediaResult<Ended> {
    let mut input_done = false;

    loop {
        match events.pop_nowait() {
            Some(DecoderEvent::Stop) => return Ok(Ended::Stopped),
            Some(DecoderEvent::Start) => warn!("Decoder already started, ignoring start"),
            None => {}
        }

        if !input_done
            && let Some(sample) = codec.queue_input()?
            && sample.end_of_stream
        {
            debug!("End of input queued");
            input_done = true;
        }

        let Some(output) = codec.release_output()? else {
            continue;
        };
        if output.should_render() {
            end.frame_rendered();
        }
        if output.is_end_of_stream() {
            info!("Decoder reached end of stream");
            return Ok(Ended::EndOfStream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;

    /// Delivers `samples` inputs, then `frames` outputs with the last one
    /// carrying the end-of-stream flag.
    #[derive(Default)]
    struct ScriptedCodec {
        samples: usize,
        frames: usize,
        queued: usize,
        released: usize,
        rendered: usize,
        started: bool,
        stopped: bool,
        fail_output: bool,
    }

    impl ScriptedCodec {
        fn new(samples: usize, frames: usize) -> Self {
            Self {
                samples,
                frames,
                ..Default::default()
            }
        }
    }

    impl Codec for ScriptedCodec {
        fn start(&mut self) -> MediaResult<()> {
            self.started = true;
            Ok(())
        }

        fn stop(&mut self) -> MediaResult<()> {
            self.stopped = true;
            Ok(())
        }

        fn queue_input(&mut self) -> MediaResult<Option<InputSample>> {
            assert!(self.queued < self.samples, "input queued after end of stream");
            self.queued += 1;
            let last = self.queued == self.samples;
            Ok(Some(InputSample::new(if last { -1 } else { 100 }, || true)))
        }

        fn release_output(&mut self) -> MediaResult<Option<OutputSample>> {
            if self.fail_output {
                return Err(MediaError::Status {
                    call: "dequeue output",
                    status: -10000,
                });
            }
            self.released += 1;
            let last = self.released == self.frames;
            let output = OutputSample {
                size: if last { 0 } else { 64 },
                flags: if last { BUFFER_FLAG_END_OF_STREAM } else { 0 },
            };
            if output.should_render() {
                self.rendered += 1;
            }
            Ok(Some(output))
        }
    }

    fn channel(events: &[DecoderEvent]) -> Channel<DecoderEvent> {
        let channel = Channel::new(4);
        for &event in events {
            channel.push(event);
        }
        channel
    }

    #[test]
    fn test_decodes_until_end_of_stream() {
        let mut codec = ScriptedCodec::new(3, 5);
        let end = StreamEnd::new();

        run(&mut codec, &channel(&[DecoderEvent::Start]), &end).unwrap();

        assert!(codec.started && codec.stopped);
        assert_eq!(codec.queued, 3);
        assert_eq!(codec.released, 5);
        assert_eq!(codec.rendered, 4);

        // The latch waits for the reader to hand over every rendered frame.
        for _ in 0..3 {
            end.frame_delivered();
        }
        assert!(!end.has_fired());
        end.frame_delivered();
        assert!(end.has_fired());
    }

    #[test]
    fn test_end_without_rendered_frames_fires_at_once() {
        let mut codec = ScriptedCodec::new(1, 1);
        let end = StreamEnd::new();

        run(&mut codec, &channel(&[DecoderEvent::Start]), &end).unwrap();

        assert_eq!(codec.rendered, 0);
        assert!(end.has_fired());
    }

    #[test]
    fn test_stop_before_start_never_starts_codec() {
        let mut codec = ScriptedCodec::new(1, 1);
        let end = StreamEnd::new();

        run(&mut codec, &channel(&[DecoderEvent::Stop]), &end).unwrap();

        assert!(!codec.started);
        assert!(!codec.stopped);
        assert!(end.has_fired());
    }

    #[test]
    fn test_stop_while_decoding_stops_codec() {
        let mut codec = ScriptedCodec::new(usize::MAX, usize::MAX);
        let end = StreamEnd::new();

        run(
            &mut codec,
            &channel(&[DecoderEvent::Start, DecoderEvent::Stop]),
            &end,
        )
        .unwrap();

        assert!(codec.stopped);
        assert_eq!(codec.released, 0);
        assert!(end.has_fired());
    }

    #[test]
    fn test_second_start_is_ignored() {
        let mut codec = ScriptedCodec::new(2, 2);
        let end = StreamEnd::new();

        run(
            &mut codec,
            &channel(&[DecoderEvent::Start, DecoderEvent::Start]),
            &end,
        )
        .unwrap();

        assert_eq!(codec.released, 2);
    }

    #[test]
    fn test_output_error_still_stops_codec() {
        let mut codec = ScriptedCodec::new(4, 4);
        codec.fail_output = true;
        let end = StreamEnd::new();

        let result = run(&mut codec, &channel(&[DecoderEvent::Start]), &end);

        assert!(matches!(result, Err(MediaError::Status { .. })));
        assert!(codec.stopped);
        assert!(end.has_fired());
    }

    #[test]
    fn test_negative_sample_size_ends_input_without_advancing() {
        let sample = InputSample::new(-1, || panic!("advanced past the end"));
        assert_eq!(
            sample,
            InputSample {
                size: 0,
                end_of_stream: true
            }
        );
        assert_eq!(sample.flags(), BUFFER_FLAG_END_OF_STREAM);
    }

    #[test]
    fn test_last_sample_keeps_its_size() {
        let sample = InputSample::new(512, || false);
        assert_eq!(sample.size, 512);
        assert!(sample.end_of_stream);

        let sample = InputSample::new(512, || true);
        assert!(!sample.end_of_stream);
        assert_eq!(sample.flags(), 0);
    }

    #[test]
    fn test_empty_output_is_not_rendered() {
        let output = OutputSample {
            size: 0,
            flags: BUFFER_FLAG_END_OF_STREAM,
        };
        assert!(!output.should_render());
        assert!(output.is_end_of_stream());
    }

    #[test]
    fn test_selects_first_video_track() {
        let tracks = [Some("audio/mp4a-latm"), None, Some("video/avc"), Some("video/hevc")];
        assert_eq!(select_video_track(tracks), Some(2));
        assert_eq!(select_video_track([Some("audio/opus"), None]), None);
    }
}
