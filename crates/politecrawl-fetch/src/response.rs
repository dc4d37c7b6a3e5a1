use std::net::IpAddr;

use bytes::Bytes;
use reqwest::header::HeaderMap;

/// Categorical reason a body was returned short of what the server
/// actually sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
    None,
    /// Stopped after `max_page_size` bytes; the connection was closed.
    Length,
    /// The fetch deadline fired mid-body; the prefix read so far is kept.
    Time,
    /// The connection dropped mid-body; the prefix read so far is kept.
    Disconnect,
}

/// The parts of the HTTP response worth keeping, captured once headers
/// arrive. Present only when the fetch did not end in a classified
/// failure — see [`FetcherResponse::last_error`].
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: u16,
    pub headers: HeaderMap,
}

/// The outcome of one `fetch` call: either a response (possibly
/// truncated) or a classified failure, never both.
///
/// Invariant (the "classification law"): `last_error.is_some()` iff
/// `response.is_none()`. `body` is independent of that law — a
/// time/disconnect truncation still carries whatever prefix was read
/// before the failure, even though `response` is `None` in that case.
#[derive(Debug, Clone)]
pub struct FetcherResponse {
    pub response: Option<ResponseMeta>,
    pub body: Bytes,
    pub peer_ip: Option<IpAddr>,
    pub request_headers: HeaderMap,
    pub t_first_byte_ms: Option<u64>,
    pub t_last_byte_ms: Option<u64>,
    pub truncation_reason: TruncationReason,
    pub last_error: Option<String>,
}

impl FetcherResponse {
    pub fn is_success(&self) -> bool {
        self.last_error.is_none()
    }
}
