use std::sync::Arc;
use std::time::Duration;

use politecrawl_core::Scheduler;
use politecrawl_fetch::fetch;
use reqwest::header::HeaderMap;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn, Instrument};

/// Per-fetch knobs threaded into every worker task; everything that doesn't
/// vary per request (the derived headers, the client) is passed alongside
/// rather than folded in here, since those are shared, not copied, per task.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub max_page_size: i64,
    pub fetch_timeout: Duration,
    pub capture_peer_ip: bool,
}

/// Spawns `worker_count` tasks, each running the `get_work -> fetch ->
/// classify -> work_done/requeue_work` loop, and returns their handles
/// without waiting on them. A task exits cleanly the moment `get_work`
/// returns `Cancelled` — that's the scheduler's only shutdown signal for a
/// budget-bounded crawl. An unbounded crawl never exits on its own; the
/// caller aborts these handles on an external shutdown request (Ctrl-C)
/// instead, after `Scheduler::close` has drained whatever was in flight.
pub fn spawn_workers(
    scheduler: Arc<Scheduler>,
    client: reqwest::Client,
    headers: HeaderMap,
    config: WorkerConfig,
    worker_count: usize,
) -> Vec<JoinHandle<()>> {
    (0..worker_count)
        .map(|id| {
            let scheduler = Arc::clone(&scheduler);
            let client = client.clone();
            let headers = headers.clone();
            tokio::spawn(worker_loop(id, scheduler, client, headers, config))
        })
        .collect()
}

/// Waits for every worker task to finish naturally (all hit `Cancelled`).
pub async fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(err) = handle.await {
            if err.is_panic() {
                warn!(%err, "worker task panicked");
            }
        }
    }
}

#[instrument(skip(scheduler, client, headers, config), fields(worker_id = id))]
async fn worker_loop(
    id: usize,
    scheduler: Arc<Scheduler>,
    client: reqwest::Client,
    headers: HeaderMap,
    config: WorkerConfig,
) {
    loop {
        let item = match scheduler.get_work().await {
            Ok(item) => item,
            Err(_cancelled) => {
                info!("worker stopping: crawl budget exhausted");
                return;
            }
        };

        let Some(mut ridealong) = scheduler.get_ridealong(&item.key) else {
            warn!(key = %item.key, "dispensed item has no ridealong entry, dropping");
            scheduler.work_done();
            continue;
        };

        // `coroutine_state` is this crate's concrete form of the abstract stats
        // sink's scoped-label wait state (§6): a span entered for the duration
        // of the fetch, not a per-URL metric label (which would blow up
        // cardinality on a real crawl).
        let span = tracing::trace_span!("coroutine_state", state = "fetching");
        let response = fetch(
            &client,
            &ridealong.url,
            headers.clone(),
            config.max_page_size,
            config.fetch_timeout,
            config.capture_peer_ip,
        )
        .instrument(span)
        .await;

        if let Some(t_last_byte_ms) = response.t_last_byte_ms {
            metrics::histogram!("fetch_latency_seconds").record(t_last_byte_ms as f64 / 1000.0);
        }

        if response.is_success() {
            scheduler.del_ridealong(&item.key);
            scheduler.work_done();
        } else {
            warn!(
                key = %item.key,
                url = %ridealong.url,
                error = response.last_error.as_deref().unwrap_or("unknown"),
                "fetch failed, requeuing"
            );
            ridealong.tries += 1;
            scheduler.set_ridealong(item.key.clone(), ridealong);
            scheduler.requeue_work(item);
            scheduler.work_done();
        }
    }
}
