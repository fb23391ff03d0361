//! Console logger with warning collection.
use std::sync::Mutex;

use super::subscriber::STAGE_TARGET;

/// Console logger.
///
/// Thin facade over [`tracing`] that also remembers how many warnings were
/// issued, so commands can report them at the end of a run.
#[derive(Debug, Default)]
pub struct Logger {
    warnings: Mutex<usize>,
}

#[allow(clippy::unused_self)]
impl Logger {
    /// Create a new logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        if let Ok(mut count) = self.warnings.lock() {
            *count += 1;
        }
        tracing::warn!("{msg}");
    }

    /// Log a stage header (major section).
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Number of warnings logged so far.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.lock().map_or(0, |count| *count)
    }

    /// Log `msg` as the closing line of a run, noting any warnings.
    pub fn finish(&self, msg: &str) {
        match self.warning_count() {
            0 => self.info(msg),
            1 => self.info(&format!("{msg} (1 warning)")),
            n => self.info(&format!("{msg} ({n} warnings)")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use crate::logging::captured_logger;

    #[test]
    fn levels_reach_the_subscriber() {
        let (log, events, _guard) = captured_logger();
        log.stage("Compiling");
        log.info("info-marker");
        log.debug("debug-marker");
        log.warn("warn-marker");
        log.error("error-marker");
        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "STAGE Compiling",
                "INFO info-marker",
                "DEBUG debug-marker",
                "WARN warn-marker",
                "ERROR error-marker",
            ]
        );
    }

    #[test]
    fn warnings_are_counted() {
        let (log, _events, _guard) = captured_logger();
        assert_eq!(log.warning_count(), 0);
        log.warn("a");
        log.error("not a warning");
        log.warn("b");
        assert_eq!(log.warning_count(), 2);
    }

    #[test]
    fn finish_mentions_warnings() {
        let (log, events, _guard) = captured_logger();
        log.finish("done");
        log.warn("w");
        log.finish("done");
        let events = events.lock().unwrap().clone();
        assert_eq!(events[0], "INFO done");
        assert_eq!(events[2], "INFO done (1 warning)");
    }
}
