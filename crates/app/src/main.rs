//! Desktop entry point.
//!
//! Launch arguments are read from the environment under the same names the
//! Android intent extras use, e.g. `mediaSrc=/path/to/clip.mp4 vkplay`.

use anyhow::Result;
use tracing::info;
use winit::event_loop::EventLoop;

use vkplay_core::Config;

fn main() -> Result<()> {
    vkplay_core::init_logging();
    info!("Starting vkplay");

    let config = Config::from_lookup(|key| std::env::var(key).ok())?;
    let event_loop = EventLoop::new()?;
    vkplay_app::run(event_loop, &config)
}
