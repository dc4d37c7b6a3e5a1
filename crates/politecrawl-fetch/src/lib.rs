//! Bounded-latency, bounded-size HTTP fetch execution.
//!
//! This crate answers exactly one question for a worker that has
//! already been handed a URL by `politecrawl_core::Scheduler`: what
//! happened when we tried to fetch it? Every outcome — success,
//! truncation, or a classified failure — comes back as a
//! [`FetcherResponse`]; nothing here ever panics on a bad network
//! condition or ambiguous status code.

mod error;
mod fetcher;
mod header_policy;
mod response;

pub use error::{classify_reqwest_error, FetchError};
pub use fetcher::fetch;
pub use header_policy::{derive_headers, upgrade_scheme, HeaderPolicy, ProxyConfig};
pub use response::{FetcherResponse, ResponseMeta, TruncationReason};
