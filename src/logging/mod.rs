//! Logging infrastructure for structured console output.

mod logger;
mod subscriber;
mod utils;

pub use logger::Logger;
pub use subscriber::{LOG_ENV, init_subscriber};

/// Create a Logger together with a thread-local subscriber that records
/// every event, so tests can assert on what was logged.
///
/// Returns a [`tracing::dispatcher::DefaultGuard`] that must be kept alive
/// for the duration of the test; dropping it restores the previous
/// thread-local dispatcher.
#[cfg(test)]
pub(crate) fn captured_logger() -> (
    Logger,
    std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    tracing::dispatcher::DefaultGuard,
) {
    use tracing_subscriber::layer::SubscriberExt as _;
    let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let layer = subscriber::CaptureLayer {
        events: std::sync::Arc::clone(&events),
    };
    let subscriber = tracing_subscriber::registry().with(layer);
    let guard = tracing::dispatcher::set_default(&tracing::Dispatch::new(subscriber));
    (Logger::new(), events, guard)
}
