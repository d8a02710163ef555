//! Tracing setup for the `stash` binary and anything embedding the stores.

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `level` when set. `json` switches to one JSON object
/// per line. Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    subscriber(json, filter, std::io::stderr).try_init().ok();
}

fn subscriber<W>(json: bool, filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let fmt_layer = fmt::layer().with_target(false).with_writer(writer);
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if json {
        fmt_layer.json().boxed()
    } else {
        fmt_layer.boxed()
    };
    tracing_subscriber::registry().with(fmt_layer).with(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Test writer appending into a shared buffer.
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(data)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(json: bool, filter: &str, emit: impl FnOnce()) -> String {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let writer_buf = Arc::clone(&buf);
        let sub = subscriber(json, EnvFilter::new(filter), move || {
            SharedBuf(Arc::clone(&writer_buf))
        });
        tracing::subscriber::with_default(sub, emit);
        let bytes = buf.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn json_mode_writes_one_object_per_event() {
        let out = capture(true, "info", || {
            tracing::info!(event = "artifact_saved", version = 3u64, "saved");
            tracing::info!("second");
        });
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["fields"]["event"], "artifact_saved");
        assert_eq!(lines[0]["fields"]["version"], 3);
        assert!(lines[0].get("target").is_none());
    }

    #[test]
    fn text_mode_respects_the_filter() {
        let out = capture(false, "warn", || {
            tracing::info!("hidden");
            tracing::warn!("shown");
        });
        assert!(out.contains("shown"));
        assert!(!out.contains("hidden"));
        assert!(!out.trim_start().starts_with('{'));
    }

    #[test]
    fn init_tracing_twice_does_not_panic() {
        init_tracing(false, Level::DEBUG);
        init_tracing(true, Level::INFO);
        tracing::info!("still logging");
    }
}
