use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::{Deserialize, Serialize};

/// A single upstream proxy every request is routed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
}

/// What a crawl process negotiates when no compression is being
/// suppressed. A real browser UA would offer more; a crawler that
/// stores raw bytes has no use for content encodings it can't itself
/// decode downstream, so this stays conservative.
const NEGOTIATED_ACCEPT_ENCODING: &str = "gzip, deflate";

/// Per-crawler knobs that feed into every request's headers.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    pub user_agent: String,
    pub prevent_compression: bool,
    pub upgrade_insecure_requests: bool,
    pub proxy_all: Option<ProxyConfig>,
    pub proxy_geoip: bool,
}

/// Derives the header set, proxy, and DNS-prefetch decision for every
/// request this process sends. DNS prefetch is skipped only when every
/// request goes through a proxy that itself resolves geo-aware — there's
/// no point resolving a name the proxy is going to re-resolve anyway.
pub fn derive_headers(policy: &HeaderPolicy) -> (HeaderMap, Option<ProxyConfig>, bool) {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&policy.user_agent).unwrap_or_else(|_| HeaderValue::from_static("politecrawl")),
    );

    let encoding = if policy.prevent_compression {
        "identity"
    } else {
        NEGOTIATED_ACCEPT_ENCODING
    };
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(encoding));

    if policy.upgrade_insecure_requests {
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    }

    let prefetch_dns = policy.proxy_all.is_none() || policy.proxy_geoip;

    (headers, policy.proxy_all.clone(), prefetch_dns)
}

/// HTTPS-upgrade stub: today the identity function, pending an
/// HSTS-preload table that would let the crawler skip straight to
/// `https://` for known-upgradable hosts.
pub fn upgrade_scheme(url: &str) -> String {
    url.to_string()
}
