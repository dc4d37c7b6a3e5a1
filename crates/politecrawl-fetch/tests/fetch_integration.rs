use std::time::Duration;

use politecrawl_fetch::{fetch, TruncationReason};
use reqwest::header::HeaderMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn length_truncation_returns_exactly_the_cap() {
    let server = MockServer::start().await;
    let full_body = vec![b'x'; 1024 * 1024];
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(full_body))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let url = format!("{}/big", server.uri());
    let result = fetch(
        &client,
        &url,
        HeaderMap::new(),
        65536,
        Duration::from_secs(10),
        false,
    )
    .await;

    assert_eq!(result.body.len(), 65536);
    assert_eq!(result.truncation_reason, TruncationReason::Length);
    assert!(result.last_error.is_none());
    assert_eq!(result.response.unwrap().status, 200);
}

#[tokio::test]
async fn small_body_under_the_cap_is_returned_whole() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/small"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello crawler".to_vec()))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let url = format!("{}/small", server.uri());
    let result = fetch(
        &client,
        &url,
        HeaderMap::new(),
        65536,
        Duration::from_secs(10),
        false,
    )
    .await;

    assert_eq!(result.body.as_ref(), b"hello crawler");
    assert_eq!(result.truncation_reason, TruncationReason::None);
    assert!(result.last_error.is_none());
}

#[tokio::test]
async fn slow_response_past_the_deadline_classifies_as_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let url = format!("{}/slow", server.uri());
    let result = fetch(
        &client,
        &url,
        HeaderMap::new(),
        -1,
        Duration::from_millis(50),
        false,
    )
    .await;

    assert!(result.response.is_none());
    assert_eq!(result.last_error.as_deref(), Some("TimeoutError"));
    assert!(result.body.is_empty());
}

#[tokio::test]
async fn unresolvable_host_classifies_as_client_error() {
    let client = reqwest::Client::new();
    let result = fetch(
        &client,
        "http://nx.invalid.example-tld-that-does-not-resolve/",
        HeaderMap::new(),
        -1,
        Duration::from_secs(5),
        false,
    )
    .await;

    assert!(result.response.is_none());
    let err = result.last_error.expect("dns resolution should fail");
    assert!(err.starts_with("ClientError:"), "got: {err}");
}
