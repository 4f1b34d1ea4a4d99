//! Integration tests driving the render loop on its own thread.

use std::cell::Cell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use vkplay_renderer::{
    Acquire, Backend, BufferId, FrameFence, FrameProducer, FrameUnit, ImageAcquire,
    PresentStatus, ProducerHooks, RenderResult, RenderThread,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Journal {
    surfaces: usize,
    swapchains: usize,
    presents: usize,
    drops: Vec<&'static str>,
}

type SharedJournal = Arc<Mutex<Journal>>;

/// Poll `condition` until it holds, failing the test after [`TIMEOUT`].
fn wait_for(journal: &SharedJournal, condition: impl Fn(&Journal) -> bool) {
    let start = Instant::now();
    while !condition(&journal.lock()) {
        assert!(start.elapsed() < TIMEOUT, "timed out waiting for the render thread");
        thread::sleep(Duration::from_millis(1));
    }
}

struct Unit(u64);

impl FrameUnit for Unit {
    type Buffer = u64;

    fn buffer_id(&self) -> BufferId {
        BufferId(self.0)
    }

    fn buffer(&self) -> RenderResult<u64> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct Feed {
    latest: Option<u64>,
    finished: bool,
    hooks: Option<ProducerHooks>,
}

#[derive(Clone, Default)]
struct Feeder(Arc<Mutex<Feed>>);

impl Feeder {
    fn publish(&self, id: u64) {
        let hooks = {
            let mut feed = self.0.lock();
            feed.latest = Some(id);
            feed.hooks.clone()
        };
        if let Some(hooks) = hooks {
            hooks.notify_available();
        }
    }

    fn finish(&self) {
        let hooks = {
            let mut feed = self.0.lock();
            feed.finished = true;
            feed.hooks.clone()
        };
        if let Some(hooks) = hooks {
            hooks.end_of_stream();
        }
    }
}

impl FrameProducer for Feeder {
    type Unit = Unit;

    fn attach(&mut self, hooks: ProducerHooks) -> RenderResult<()> {
        self.0.lock().hooks = Some(hooks);
        Ok(())
    }

    fn acquire_latest(&mut self) -> RenderResult<Acquire<Unit>> {
        let mut feed = self.0.lock();
        Ok(match feed.latest.take() {
            Some(id) => Acquire::Ready(Unit(id)),
            None if feed.finished => Acquire::EndOfStream,
            None => Acquire::NotReady,
        })
    }
}

struct Frame(Cell<bool>);

impl FrameFence for Frame {
    fn is_signaled(&self) -> RenderResult<bool> {
        Ok(self.0.get())
    }

    fn wait(&self) -> RenderResult<()> {
        self.0.set(true);
        Ok(())
    }

    fn reset(&self) -> RenderResult<()> {
        self.0.set(false);
        Ok(())
    }
}

struct Tracked(&'static str, SharedJournal);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.1.lock().drops.push(self.0);
    }
}

struct FakeBackend {
    journal: SharedJournal,
    next_image: usize,
}

impl Backend for FakeBackend {
    type Window = u32;
    type Unit = Unit;
    type Surface = Tracked;
    type Swapchain = Tracked;
    type Frame = Frame;
    type Resource = ();

    fn create_surface(&mut self, _window: &u32) -> RenderResult<Tracked> {
        self.journal.lock().surfaces += 1;
        Ok(Tracked("surface", self.journal.clone()))
    }

    fn create_swapchain(&mut self, _window: &u32, _surface: &Tracked) -> RenderResult<Tracked> {
        self.journal.lock().swapchains += 1;
        Ok(Tracked("swapchain", self.journal.clone()))
    }

    fn create_frames(&mut self, _swapchain: &Tracked) -> RenderResult<Vec<Frame>> {
        Ok((0..2).map(|_| Frame(Cell::new(false))).collect())
    }

    fn acquire_image(&mut self, _swapchain: &Tracked) -> RenderResult<ImageAcquire> {
        self.next_image = (self.next_image + 1) % 2;
        Ok(ImageAcquire::Ready(self.next_image))
    }

    fn import(&mut self, _buffer: &u64) -> RenderResult<()> {
        Ok(())
    }

    fn record(&mut self, _frame: &Frame, _resource: &()) -> RenderResult<()> {
        Ok(())
    }

    fn submit(&mut self, frame: &Frame) -> RenderResult<()> {
        frame.0.set(true);
        Ok(())
    }

    fn present(
        &mut self,
        _swapchain: &Tracked,
        _frame: &Frame,
        _image_index: usize,
    ) -> RenderResult<PresentStatus> {
        self.journal.lock().presents += 1;
        Ok(PresentStatus::Optimal)
    }
}

fn spawn() -> (RenderThread<u32, Unit>, Feeder, SharedJournal) {
    let journal = SharedJournal::default();
    let backend = FakeBackend {
        journal: journal.clone(),
        next_image: 0,
    };
    let thread = RenderThread::spawn(backend, 8).unwrap();
    (thread, Feeder::default(), journal)
}

fn play(thread: &RenderThread<u32, Unit>, feeder: &Feeder, journal: &SharedJournal) {
    thread.start(feeder.clone());
    thread.bind_window(1);
    thread.unpause();
    feeder.publish(1);
    wait_for(journal, |j| j.presents >= 1);
}

#[test]
fn test_stop_wakes_thread_waiting_for_frames() {
    let (thread, feeder, journal) = spawn();
    play(&thread, &feeder, &journal);

    // Nothing else is published, so the loop sits waiting for a frame.
    thread.stop();
    thread.join().unwrap();

    let journal = journal.lock();
    assert_eq!(journal.presents, 1);
    assert_eq!(journal.drops, ["swapchain", "surface"]);
}

#[test]
fn test_unbind_returns_after_surface_is_gone() {
    let (thread, feeder, journal) = spawn();
    play(&thread, &feeder, &journal);

    thread.unbind_window();
    assert_eq!(journal.lock().drops, ["swapchain", "surface"]);

    thread.bind_window(2);
    feeder.publish(2);
    wait_for(&journal, |j| j.swapchains == 2 && j.presents >= 2);
    assert_eq!(journal.lock().surfaces, 2);
}

#[test]
fn test_paused_thread_does_not_present() {
    let (thread, feeder, journal) = spawn();
    play(&thread, &feeder, &journal);

    thread.pause();
    // Unbind is acknowledged, so the pause before it has been handled too.
    thread.unbind_window();
    thread.bind_window(2);
    feeder.publish(2);
    thread::sleep(Duration::from_millis(50));

    {
        let journal = journal.lock();
        assert_eq!(journal.presents, 1);
        assert_eq!(journal.surfaces, 2);
        assert_eq!(journal.swapchains, 1);
    }

    thread.unpause();
    wait_for(&journal, |j| j.presents == 2);
    assert_eq!(journal.lock().swapchains, 2);
}

#[test]
fn test_end_of_stream_finishes_thread() {
    let (thread, feeder, journal) = spawn();
    play(&thread, &feeder, &journal);

    feeder.finish();
    let start = Instant::now();
    while !thread.is_finished() {
        assert!(start.elapsed() < TIMEOUT, "render thread did not finish");
        thread::sleep(Duration::from_millis(1));
    }

    // The loop is gone; unbinding must not block.
    thread.unbind_window();
    assert!(thread.sender().has_exited());
    thread.join().unwrap();
}

#[test]
fn test_drop_stops_thread() {
    let (thread, feeder, journal) = spawn();
    play(&thread, &feeder, &journal);

    drop(thread);
    assert_eq!(journal.lock().drops, ["swapchain", "surface"]);
}
