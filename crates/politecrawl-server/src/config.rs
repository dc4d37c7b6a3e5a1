use std::path::{Path, PathBuf};
use std::time::Duration;

use politecrawl_fetch::ProxyConfig;
use serde::Deserialize;

use crate::error::ConfigError;

/// On-disk shape of the config file. Kept separate from [`CrawlConfig`] so the
/// `max_crawled_urls = 0 ⇒ unlimited` idiom and the `fetch_timeout_secs → Duration`
/// conversion happen once, at load time, rather than leaking into every call site.
#[derive(Debug, Deserialize)]
struct RawConfig {
    crawl: RawCrawlSection,
    #[serde(default)]
    fetcher: RawFetcherSection,
    #[serde(default)]
    geoip: RawGeoIpSection,
}

#[derive(Debug, Deserialize)]
struct RawCrawlSection {
    max_host_qps: f64,
    #[serde(default)]
    max_crawled_urls: u64,
    #[serde(default = "default_worker_count")]
    worker_count: usize,
    #[serde(default = "default_max_page_size")]
    max_page_size: i64,
    #[serde(default = "default_fetch_timeout_secs")]
    fetch_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    user_agent: String,
    #[serde(default)]
    prevent_compression: bool,
    #[serde(default)]
    upgrade_insecure_requests: bool,
    #[serde(default)]
    snapshot_path: Option<PathBuf>,
    #[serde(default)]
    seeds: Vec<String>,
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
}

#[derive(Debug, Default, Deserialize)]
struct RawFetcherSection {
    #[serde(default)]
    proxy_all: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGeoIpSection {
    #[serde(default)]
    proxy_geoip: bool,
}

fn default_worker_count() -> usize {
    8
}

fn default_max_page_size() -> i64 {
    1024 * 1024
}

fn default_fetch_timeout_secs() -> u64 {
    20
}

fn default_user_agent() -> String {
    "politecrawl/0.1".to_string()
}

/// `0` disables the exporter, matching the `max_crawled_urls = 0 ⇒ unlimited`
/// idiom used elsewhere in this file for an on/off TOML scalar.
fn default_metrics_port() -> u16 {
    9090
}

/// Typed, validated crawl configuration — the loaded form of [`RawConfig`].
///
/// `max_crawled_urls = None` means unlimited, matching `Crawl.MaxCrawledUrls = 0`
/// in the on-disk form.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_host_qps: f64,
    pub max_crawled_urls: Option<u64>,
    pub proxy_all: Option<ProxyConfig>,
    pub proxy_geoip: bool,
    pub worker_count: usize,
    pub max_page_size: i64,
    pub fetch_timeout: Duration,
    pub user_agent: String,
    pub prevent_compression: bool,
    pub upgrade_insecure_requests: bool,
    pub snapshot_path: Option<PathBuf>,
    pub seeds: Vec<String>,
    pub metrics_port: Option<u16>,
}

impl CrawlConfig {
    /// Loads and validates a config file. Rejects `max_host_qps <= 0.0` up
    /// front — `Scheduler::new` would otherwise divide by zero computing
    /// `delta_t`, silently producing an always-eligible host and breaking the
    /// QPS ceiling invariant rather than failing loudly at startup.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.crawl.max_host_qps <= 0.0 {
            return Err(ConfigError::NonPositiveQps(raw.crawl.max_host_qps));
        }
        if raw.crawl.worker_count == 0 {
            return Err(ConfigError::ZeroWorkers(raw.crawl.worker_count));
        }

        Ok(Self {
            max_host_qps: raw.crawl.max_host_qps,
            max_crawled_urls: (raw.crawl.max_crawled_urls != 0).then_some(raw.crawl.max_crawled_urls),
            proxy_all: raw.fetcher.proxy_all.map(|url| ProxyConfig { url }),
            proxy_geoip: raw.geoip.proxy_geoip,
            worker_count: raw.crawl.worker_count,
            max_page_size: raw.crawl.max_page_size,
            fetch_timeout: Duration::from_secs(raw.crawl.fetch_timeout_secs),
            user_agent: raw.crawl.user_agent,
            prevent_compression: raw.crawl.prevent_compression,
            upgrade_insecure_requests: raw.crawl.upgrade_insecure_requests,
            snapshot_path: raw.crawl.snapshot_path,
            seeds: raw.crawl.seeds,
            metrics_port: (raw.crawl.metrics_port != 0).then_some(raw.crawl.metrics_port),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("crawl.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            [crawl]
            max_host_qps = 2.0
            "#,
        );

        let cfg = CrawlConfig::load(&path).unwrap();
        assert_eq!(cfg.max_host_qps, 2.0);
        assert_eq!(cfg.max_crawled_urls, None);
        assert_eq!(cfg.worker_count, 8);
        assert_eq!(cfg.max_page_size, 1024 * 1024);
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(20));
        assert!(cfg.proxy_all.is_none());
        assert!(!cfg.proxy_geoip);
        assert_eq!(cfg.metrics_port, Some(9090));
    }

    #[test]
    fn zero_metrics_port_disables_the_exporter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            [crawl]
            max_host_qps = 1.0
            metrics_port = 0
            "#,
        );
        let cfg = CrawlConfig::load(&path).unwrap();
        assert_eq!(cfg.metrics_port, None);
    }

    #[test]
    fn zero_max_crawled_urls_means_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            [crawl]
            max_host_qps = 1.0
            max_crawled_urls = 0
            "#,
        );
        let cfg = CrawlConfig::load(&path).unwrap();
        assert_eq!(cfg.max_crawled_urls, None);
    }

    #[test]
    fn nonzero_max_crawled_urls_is_a_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            [crawl]
            max_host_qps = 1.0
            max_crawled_urls = 500
            "#,
        );
        let cfg = CrawlConfig::load(&path).unwrap();
        assert_eq!(cfg.max_crawled_urls, Some(500));
    }

    #[test]
    fn rejects_non_positive_qps() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            [crawl]
            max_host_qps = 0.0
            "#,
        );
        let err = CrawlConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NonPositiveQps(_)));
    }

    #[test]
    fn proxy_all_and_geoip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
            [crawl]
            max_host_qps = 1.0

            [fetcher]
            proxy_all = "http://proxy.example:3128"

            [geoip]
            proxy_geoip = true
            "#,
        );
        let cfg = CrawlConfig::load(&path).unwrap();
        assert_eq!(cfg.proxy_all.unwrap().url, "http://proxy.example:3128");
        assert!(cfg.proxy_geoip);
    }
}
