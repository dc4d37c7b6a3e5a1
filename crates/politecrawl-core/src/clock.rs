use tokio::time::Instant;

/// Monotonic time source used by the scheduler and the TTL map.
///
/// Abstracted behind a trait so tests can drive time deterministically.
/// The concrete [`TokioClock`] reads `tokio::time::Instant::now`, which
/// respects `tokio::time::pause`/`advance` under `#[tokio::test(start_paused
/// = true)]` — that's how the scheduler's spacing tests get sub-millisecond
/// determinism without real sleeps.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// The real clock, backed by the tokio runtime's timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
