//! CLI entry point: loads a crawl config, seeds the scheduler (from a
//! snapshot or from configured seed URLs), wires the scheduler and fetcher
//! into a worker pool, and runs until the URL budget is exhausted or the
//! process receives Ctrl-C.

use std::fs::File;
use std::io::BufWriter;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use politecrawl_core::{Scheduler, SnapshotFile};
use politecrawl_fetch::{derive_headers, HeaderPolicy};
use politecrawl_server::config::CrawlConfig;
use politecrawl_server::worker::WorkerConfig;
use politecrawl_server::{logging, seed, worker};
use tracing::{info, warn};

/// `metrics::counter!`/`histogram!` calls throughout this workspace run as a
/// no-op facade until a recorder is installed; this is that installation,
/// gated on `metrics_port` so a crawl that doesn't want a `/metrics` endpoint
/// doesn't pay for binding one.
fn install_metrics_exporter(port: u16) -> Result<()> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install prometheus metrics exporter")
}

/// Runs a polite, per-host-rate-limited web crawl.
#[derive(Parser, Debug)]
#[command(author, version, about = "Per-host rate-limited crawl scheduler and fetcher")]
struct Cli {
    /// Path to the crawl's TOML config file.
    #[arg(long, default_value = "crawl.toml")]
    config: PathBuf,

    /// Overrides `worker_count` from the config file.
    #[arg(long)]
    workers: Option<usize>,

    /// Resume from a previously saved snapshot instead of seeding from config.
    #[arg(long)]
    snapshot_in: Option<PathBuf>,

    /// Where to write a snapshot on shutdown. Defaults to the config's
    /// `snapshot_path`, if set.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,
}

fn config_digest(config: &CrawlConfig) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    config.max_host_qps.to_bits().hash(&mut hasher);
    config.max_crawled_urls.hash(&mut hasher);
    config.worker_count.hash(&mut hasher);
    config.max_page_size.hash(&mut hasher);
    hasher.finish()
}

fn build_client(config: &CrawlConfig, proxy: Option<politecrawl_fetch::ProxyConfig>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.url.clone()).context("invalid proxy url")?);
    }
    builder
        .connect_timeout(config.fetch_timeout)
        .build()
        .context("failed to build HTTP client")
}

fn seed_scheduler(scheduler: &Scheduler, urls: &[String]) {
    let mut rng = rand::rng();
    for url in urls {
        match seed::seed_work_item(url, &mut rng) {
            Some((item, ridealong)) => {
                scheduler.set_ridealong(item.key.clone(), ridealong);
                scheduler.queue_work(item);
            }
            None => warn!(url = %url, "skipping unparseable seed URL"),
        }
    }
}

fn load_snapshot_into(scheduler: &Scheduler, path: &PathBuf) -> Result<Vec<String>> {
    let mut file = File::open(path).with_context(|| format!("opening snapshot {}", path.display()))?;
    let snapshot = SnapshotFile::load(&mut file).with_context(|| format!("loading snapshot {}", path.display()))?;
    scheduler.load_queue(snapshot.items);
    scheduler.load_ridealong(snapshot.ridealong);
    Ok(snapshot.seeds)
}

fn save_snapshot(scheduler: &Scheduler, path: &PathBuf, config_digest: u64, seeds: Vec<String>) -> Result<()> {
    let items = scheduler.drain_queue();
    let ridealong = scheduler.ridealong_snapshot();
    let snapshot = SnapshotFile::new(items, ridealong, seeds);

    let file = File::create(path).with_context(|| format!("creating snapshot {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    snapshot
        .save(&mut writer, config_digest, Utc::now())
        .with_context(|| format!("writing snapshot {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let config = CrawlConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let worker_count = cli.workers.unwrap_or(config.worker_count);
    let digest = config_digest(&config);

    if let Some(port) = config.metrics_port {
        install_metrics_exporter(port)?;
        info!(port, "prometheus metrics exporter listening");
    }

    let scheduler = Arc::new(Scheduler::new(config.max_host_qps, config.max_crawled_urls));

    let snapshot_in = cli.snapshot_in.clone().or_else(|| config.snapshot_path.clone());
    let seeds = if let Some(path) = &snapshot_in {
        if path.exists() {
            info!(path = %path.display(), "resuming from snapshot");
            load_snapshot_into(&scheduler, path)?
        } else {
            seed_scheduler(&scheduler, &config.seeds);
            config.seeds.clone()
        }
    } else {
        seed_scheduler(&scheduler, &config.seeds);
        config.seeds.clone()
    };

    let policy = HeaderPolicy {
        user_agent: config.user_agent.clone(),
        prevent_compression: config.prevent_compression,
        upgrade_insecure_requests: config.upgrade_insecure_requests,
        proxy_all: config.proxy_all.clone(),
        proxy_geoip: config.proxy_geoip,
    };
    let (headers, proxy, prefetch_dns) = derive_headers(&policy);
    info!(prefetch_dns, worker_count, max_host_qps = config.max_host_qps, "starting crawl");

    // Per §4.2's peer-IP capture note: behind a proxy, the transport's peer
    // address is the proxy's, not the origin's, so there's nothing worth
    // capturing.
    let capture_peer_ip = proxy.is_none();
    let client = build_client(&config, proxy)?;
    let worker_config = WorkerConfig {
        max_page_size: config.max_page_size,
        fetch_timeout: config.fetch_timeout,
        capture_peer_ip,
    };

    let handles = worker::spawn_workers(
        Arc::clone(&scheduler),
        client,
        headers,
        worker_config,
        worker_count,
    );
    // Kept separately from `handles` so Ctrl-C can abort every worker task
    // even though `join_all` below takes ownership of the handles themselves.
    let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

    tokio::select! {
        _ = worker::join_all(handles) => {
            scheduler.close().await;
            let report = scheduler.summarize();
            info!(?report, "crawl finished: budget exhausted");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(%err, "failed to listen for ctrl-c, shutting down anyway");
            } else {
                info!("ctrl-c received, shutting down");
            }
            // Cancellation here is ordinary tokio task cancellation (an
            // aborted future), never a classified fetch failure — in-flight
            // fetches are dropped rather than completed, per §5's
            // cancellation contract. Whatever was mid-flight is lost; the
            // snapshot below captures everything still queued.
            for handle in abort_handles {
                handle.abort();
            }
        }
    }

    if let Some(path) = cli.snapshot_out.or(config.snapshot_path) {
        save_snapshot(&scheduler, &path, digest, seeds)?;
        info!(path = %path.display(), "snapshot saved");
    }

    Ok(())
}
