use serde::{Deserialize, Serialize};

/// Out-of-band metadata for a queued or in-flight [`crate::WorkItem`],
/// keyed by the item's `key`.
///
/// The queue only carries the `(priority, rand, key)` triple needed for
/// ordering; everything a worker actually needs to act on a URL — the
/// real URL string, the host it belongs to, and how many times it's
/// already been tried — lives here instead, so the heap stays compact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ridealong {
    pub url: String,
    pub netloc: String,
    pub priority: u32,
    pub tries: u32,
}

impl Ridealong {
    pub fn new(url: impl Into<String>, netloc: impl Into<String>, priority: u32) -> Self {
        Self {
            url: url.into(),
            netloc: netloc.into(),
            priority,
            tries: 0,
        }
    }
}
