//! Logging initialization and configuration.

/// Initialize the logging system with tracing.
///
/// On desktop this sets up tracing-subscriber with:
/// - Environment-based filtering (RUST_LOG)
/// - Target and thread id in every line
///
/// On Android, tracing events are forwarded through the `log` facade to
/// logcat under the `vkplay` tag.
///
/// # Example
/// ```no_run
/// vkplay_core::init_logging();
/// tracing::info!("Presenter initialized");
/// ```
#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vkplay=debug"));

    // A second call (tests, embedded shells) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}

#[cfg(target_os = "android")]
pub fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_tag("vkplay")
            .with_max_level(log::LevelFilter::Debug),
    );
}
