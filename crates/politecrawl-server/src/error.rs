use std::path::PathBuf;

use thiserror::Error;

/// Startup/config failures, distinct from the per-fetch [`politecrawl_fetch::FetchError`]
/// taxonomy: these are the ones that keep the process from ever reaching a point
/// where it can dispense work at all.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("max_host_qps must be positive, got {0}")]
    NonPositiveQps(f64),
    #[error("worker_count must be at least 1, got {0}")]
    ZeroWorkers(usize),
}
