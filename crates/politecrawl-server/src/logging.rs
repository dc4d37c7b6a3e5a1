use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

/// Substrings of noisy TLS/transport log lines that are already surfaced,
/// classified, through `FetcherResponse::last_error` — logging them again at
/// the transport layer would just duplicate what the fetcher already reports
/// per URL. This is the "Log filter side-effect" of the core contract: a
/// process-wide registration performed once at startup.
const NOISE_ALLOW_LIST: &[&str] = &[
    "connection reset by peer",
    "certificate has expired",
    "unexpected end of file",
    "operation timed out",
    "broken pipe",
];

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

fn event_message(event: &Event<'_>) -> String {
    let mut visitor = MessageVisitor {
        message: String::new(),
    };
    event.record(&mut visitor);
    visitor.message
}

fn is_suppressed(message: &str) -> bool {
    NOISE_ALLOW_LIST.iter().any(|needle| message.contains(needle))
}

/// Wraps an inner layer and drops events whose rendered message matches the
/// transport-noise allow-list before they ever reach it.
struct NoiseFilterLayer<L> {
    inner: L,
}

impl<S, L> Layer<S> for NoiseFilterLayer<L>
where
    S: Subscriber,
    L: Layer<S>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if is_suppressed(&event_message(event)) {
            return;
        }
        self.inner.on_event(event, ctx);
    }
}

/// Installs the process-wide tracing subscriber: an `EnvFilter` (`RUST_LOG`,
/// defaulting to `info`) feeding a formatting layer wrapped in the noise
/// filter above, plus a `log` → `tracing` bridge so libraries still emitting
/// through the `log` facade (parts of the TLS/transport stack) show up in
/// the same pipeline. Call exactly once, from `main`.
pub fn init() {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let noise_filtered = NoiseFilterLayer { inner: fmt_layer };

    Registry::default().with(filter).with(noise_filtered).init();
}
