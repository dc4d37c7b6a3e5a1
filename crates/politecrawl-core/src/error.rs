use thiserror::Error;

/// Signalled by [`crate::Scheduler::get_work`] once the crawl's URL
/// budget has been exhausted.
///
/// This is not a classified failure — cancellation is a normal,
/// expected end to a bounded crawl and must propagate unchanged rather
/// than being mistaken for a fetch error.
#[derive(Debug, Error)]
#[error("crawl budget exhausted, scheduler is shutting down")]
pub struct Cancelled;
