use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, instrument};

use crate::error::{classify_reqwest_error, FetchError};
use crate::response::{FetcherResponse, ResponseMeta, TruncationReason};

/// `max_page_size < 0` means unbounded, matching the source's `-1`
/// sentinel (kept rather than an `Option<usize>` parameter so the
/// config layer's raw `i64` doesn't need two representations).
fn cap_from(max_page_size: i64) -> Option<usize> {
    if max_page_size < 0 {
        None
    } else {
        Some(max_page_size as usize)
    }
}

/// Executes one GET against an already-configured client (proxy and
/// redirect policy live on the `Client`, not per call — reqwest, unlike
/// the source's per-request `session.get(..., proxy=, allow_redirects=)`,
/// configures both at client-build time).
///
/// The body is always fully drained before this returns, success or
/// failure, so callers never race a network exception against whatever
/// parsing they do with `body` afterward. A non-empty `body` can
/// accompany a classified failure (time/disconnect truncation); a
/// `None` `response` cannot.
#[instrument(skip(client, request_headers), fields(url))]
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    request_headers: HeaderMap,
    max_page_size: i64,
    fetch_timeout: Duration,
    capture_peer_ip: bool,
) -> FetcherResponse {
    let t0 = Instant::now();
    let deadline = t0 + fetch_timeout;
    let cap = cap_from(max_page_size);

    metrics::counter!("fetch_urls_total").increment(1);

    let response = tokio::select! {
        res = client.get(url).headers(request_headers.clone()).send() => res,
        _ = sleep_until(deadline) => {
            metrics::counter!("fetch_timeout_total").increment(1);
            return timeout_response(request_headers);
        }
    };

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            let classified = classify_reqwest_error(&e);
            debug!(error = %classified, "request failed before headers arrived");
            metrics::counter!("fetch_client_error_total").increment(1);
            return failure_response(request_headers, classified);
        }
    };

    let t_first_byte_ms = elapsed_ms(t0);
    let status = response.status().as_u16();
    let response_headers = response.headers().clone();
    let peer_ip = if capture_peer_ip {
        response.remote_addr().map(|addr| addr.ip())
    } else {
        None
    };

    let (body, truncation_reason, last_error) =
        read_body(response.bytes_stream(), cap, deadline).await;

    let t_last_byte_ms = elapsed_ms(t0);
    metrics::counter!("fetch_bytes_total").increment(body.len() as u64);

    let response_meta = if last_error.is_none() {
        metrics::counter!("fetch_urls_completed_total").increment(1);
        metrics::counter!("fetch_http_status_total", "code" => status.to_string()).increment(1);
        Some(ResponseMeta {
            status,
            headers: response_headers,
        })
    } else {
        None
    };

    FetcherResponse {
        response: response_meta,
        body,
        peer_ip,
        request_headers,
        t_first_byte_ms: Some(t_first_byte_ms),
        t_last_byte_ms: Some(t_last_byte_ms),
        truncation_reason,
        last_error,
    }
}

fn elapsed_ms(t0: Instant) -> u64 {
    Instant::now().duration_since(t0).as_millis() as u64
}

fn timeout_response(request_headers: HeaderMap) -> FetcherResponse {
    FetcherResponse {
        response: None,
        body: Bytes::new(),
        peer_ip: None,
        request_headers,
        t_first_byte_ms: None,
        t_last_byte_ms: None,
        truncation_reason: TruncationReason::None,
        last_error: Some(FetchError::Timeout.to_classified_string()),
    }
}

fn failure_response(request_headers: HeaderMap, error: FetchError) -> FetcherResponse {
    FetcherResponse {
        response: None,
        body: Bytes::new(),
        peer_ip: None,
        request_headers,
        t_first_byte_ms: None,
        t_last_byte_ms: None,
        truncation_reason: TruncationReason::None,
        last_error: Some(error.to_classified_string()),
    }
}

/// Reads the body stream to completion (EOF), to the size cap, or to
/// the deadline — whichever comes first. Both the cap-truncation exit
/// and the exception exits converge on the same `blocks` accumulator
/// and are concatenated once here, at the single return point, rather
/// than duplicating the join logic per exit path.
async fn read_body(
    mut stream: impl futures_util::Stream<Item = reqwest::Result<Bytes>> + Unpin,
    cap: Option<usize>,
    deadline: Instant,
) -> (Bytes, TruncationReason, Option<String>) {
    let mut blocks: Vec<Bytes> = Vec::new();
    let mut received = 0usize;
    let mut truncation_reason = TruncationReason::None;
    let mut last_error = None;

    loop {
        if let Some(limit) = cap {
            if received >= limit {
                truncation_reason = TruncationReason::Length;
                metrics::counter!("fetch_truncated_length_total").increment(1);
                break;
            }
        }

        tokio::select! {
            chunk = stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        received += bytes.len();
                        blocks.push(bytes);
                    }
                    Some(Err(e)) => {
                        let classified = classify_reqwest_error(&e);
                        if received > 0 {
                            truncation_reason = TruncationReason::Disconnect;
                            metrics::counter!("fetch_disconnect_body_bytes_found_total").increment(1);
                        }
                        last_error = Some(classified.to_classified_string());
                        break;
                    }
                    None => break,
                }
            }
            _ = sleep_until(deadline) => {
                if received > 0 {
                    truncation_reason = TruncationReason::Time;
                    metrics::counter!("fetch_timeout_body_bytes_found_total").increment(1);
                }
                last_error = Some(FetchError::Timeout.to_classified_string());
                metrics::counter!("fetch_timeout_total").increment(1);
                break;
            }
        }
    }

    let mut body = Vec::with_capacity(received.min(cap.unwrap_or(received)));
    for block in blocks {
        body.extend_from_slice(&block);
    }
    if let (Some(limit), TruncationReason::Length) = (cap, truncation_reason) {
        body.truncate(limit);
    }

    (Bytes::from(body), truncation_reason, last_error)
}
