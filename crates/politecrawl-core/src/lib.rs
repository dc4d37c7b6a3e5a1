//! Per-host rate-limited work scheduler for a polite web crawler.
//!
//! This crate implements the admission-control core described for the
//! crawler: a priority queue of pending work, a side table of rich
//! per-item metadata (the "ridealong"), and a bounded map tracking the
//! next fetchable instant for every host. The [`Scheduler`] ties these
//! together and is the only thing workers talk to.
//!
//! Fetch execution itself (the part that actually performs an HTTP GET)
//! lives in the `politecrawl-fetch` crate; this crate only decides
//! *when* a worker is allowed to act on a URL.

mod clock;
mod error;
mod queue;
mod ridealong;
mod scheduler;
mod snapshot;
mod ttl_map;

pub use clock::{Clock, TokioClock};
pub use error::Cancelled;
pub use queue::WorkItem;
pub use ridealong::Ridealong;
pub use scheduler::{Scheduler, SchedulerReport};
pub use snapshot::{SnapshotError, SnapshotFile};
pub use ttl_map::NextFetchMap;

/// Splits a SURT-form key (`host)path`) into its host and the remainder.
///
/// Hosts are delimited by the first `)` in the key; a key with no `)`
/// is treated as its own host with an empty path, which keeps the
/// scheduler well-defined even if a caller hands it a bare hostname.
pub fn host_of(key: &str) -> &str {
    match key.split_once(')') {
        Some((host, _rest)) => host,
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_splits_on_first_paren() {
        assert_eq!(host_of("example.com)/a/b"), "example.com");
        assert_eq!(host_of("example.com)/a)b"), "example.com");
    }

    #[test]
    fn host_of_without_delimiter_is_whole_key() {
        assert_eq!(host_of("example.com"), "example.com");
    }
}
