//! Tracing subscriber setup: console formatter and initialisation.
use super::utils::{stderr_supports_color, strip_ansi};

/// Target used by [`Logger::stage`](super::Logger::stage).
pub(super) const STAGE_TARGET: &str = "confbundler::stage";

/// Environment variable holding an optional `EnvFilter` directive.
pub const LOG_ENV: &str = "CONFBUNDLER_LOG";

/// Extracts the `message` field from a [`tracing::Event`].
#[derive(Default)]
pub(super) struct MessageExtractor {
    pub(super) message: String,
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] that emits bundler-style
/// console output.
pub(super) struct ConsoleFormatter {
    pub(super) ansi: bool,
}

impl ConsoleFormatter {
    fn line(level: tracing::Level, target: &str, msg: &str) -> String {
        match level {
            tracing::Level::ERROR => format!("\x1b[31mERROR\x1b[0m {msg}"),
            tracing::Level::WARN => format!("\x1b[33mWARN\x1b[0m  {msg}"),
            tracing::Level::INFO if target == STAGE_TARGET => {
                format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m")
            }
            tracing::Level::INFO => format!("  {msg}"),
            _ => format!("  \x1b[2m{msg}\x1b[0m"),
        }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);

        let line = Self::line(*metadata.level(), metadata.target(), &extractor.message);
        if self.ansi {
            writeln!(writer, "{line}")
        } else {
            writeln!(writer, "{}", strip_ansi(&line))
        }
    }
}

/// Initialise the global [`tracing`] subscriber.
///
/// Every event goes to stderr, leaving stdout free for archive output.
/// The console shows `info` and above, or `debug` when `verbose` is set;
/// a directive in `CONFBUNDLER_LOG` replaces either.
/// Must be called once at program startup, before any logging.
pub fn init_subscriber(verbose: bool) {
    use tracing_subscriber::{
        EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
    };

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .event_format(ConsoleFormatter {
            ansi: stderr_supports_color(),
        })
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .init();
}

/// Layer that records every event as `LEVEL message` for assertions.
#[cfg(test)]
pub(super) struct CaptureLayer {
    pub(super) events: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        let tag = if metadata.target() == STAGE_TARGET {
            "STAGE".to_string()
        } else {
            metadata.level().to_string()
        };
        if let Ok(mut events) = self.events.lock() {
            events.push(format!("{tag} {}", extractor.message));
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::SubscriberExt as _;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn render(ansi: bool, emit: impl FnOnce()) -> String {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let layer = tracing_subscriber::fmt::layer()
            .event_format(ConsoleFormatter { ansi })
            .with_writer(move || writer.clone());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, emit);
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn plain_output_has_no_escape_codes() {
        let out = render(false, || {
            tracing::info!(target: STAGE_TARGET, "Compiling");
            tracing::info!("3 node(s)");
            tracing::warn!("override at /etc/motd");
            tracing::error!("conflict");
        });
        assert_eq!(
            out,
            "==> Compiling\n  3 node(s)\nWARN  override at /etc/motd\nERROR conflict\n"
        );
    }

    #[test]
    fn ansi_output_colours_levels() {
        let out = render(true, || tracing::error!("boom"));
        assert_eq!(out, "\x1b[31mERROR\x1b[0m boom\n");
    }
}
