use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::clock::{Clock, TokioClock};
use crate::error::Cancelled;
use crate::host_of;
use crate::queue::{update_priority, WorkItem, WorkQueue};
use crate::ridealong::Ridealong;
use crate::ttl_map::NextFetchMap;

/// If a host's next fetchable instant is more than this far away, a
/// worker holding that item yields it back to the queue rather than
/// sleeping through the whole wait — that's the head-of-line bound.
const HOL_THRESHOLD: Duration = Duration::from_secs(3);
/// How long a worker sleeps before retrying a head-of-line-blocked item.
const HOL_SLEEP: Duration = Duration::from_secs(3);

struct Inner {
    queue: WorkQueue,
    next_fetch: NextFetchMap,
    remaining_budget: Option<u64>,
}

/// Admission control for a single crawl process.
///
/// Owns the priority queue and the per-host spacing map behind one
/// mutex (the two must be read and written together, atomically, for
/// every admission decision — see `get_work`), and a separate
/// concurrent map for the heavier per-item ridealong metadata, which
/// has no ordering requirement beyond "a worker only reads the entry
/// for the item it just dequeued".
pub struct Scheduler {
    inner: Mutex<Inner>,
    ridealong: DashMap<String, Ridealong>,
    dequeue_notify: Notify,
    close_notify: Notify,
    awaiting_work: AtomicU32,
    outstanding: AtomicI64,
    delta_t: Duration,
    clock: Box<dyn Clock>,
}

/// Human-readable occupancy report, the Rust analogue of cocrawler's
/// `scheduler.summarize`.
#[derive(Debug, Clone, Default)]
pub struct SchedulerReport {
    pub queue_len: usize,
    pub ridealong_len: usize,
    pub urls_with_tries: u64,
    pub priority_counts: BTreeMap<u32, u64>,
    pub top_netlocs: Vec<(String, u64)>,
}

impl Scheduler {
    /// `max_host_qps` must be positive; `delta_t = 1 / max_host_qps`.
    /// `max_crawled_urls` of `None` means an unbounded budget.
    pub fn new(max_host_qps: f64, max_crawled_urls: Option<u64>) -> Self {
        Self::with_clock(max_host_qps, max_crawled_urls, Box::new(TokioClock))
    }

    pub fn with_clock(max_host_qps: f64, max_crawled_urls: Option<u64>, clock: Box<dyn Clock>) -> Self {
        assert!(
            max_host_qps > 0.0,
            "max_host_qps must be positive, got {max_host_qps}"
        );
        Self {
            inner: Mutex::new(Inner {
                queue: WorkQueue::new(),
                next_fetch: NextFetchMap::new(),
                remaining_budget: max_crawled_urls,
            }),
            ridealong: DashMap::new(),
            dequeue_notify: Notify::new(),
            close_notify: Notify::new(),
            awaiting_work: AtomicU32::new(0),
            outstanding: AtomicI64::new(0),
            delta_t: Duration::from_secs_f64(1.0 / max_host_qps),
            clock,
        }
    }

    /// Inserts an item with no rate check of any kind.
    pub fn queue_work(&self, item: WorkItem) {
        self.inner.lock().unwrap().queue.push(item);
        self.dequeue_notify.notify_one();
    }

    /// Requeues `item` after a failed fetch: bumps `rand` by 0.5, rolls
    /// the priority band forward if that pushes `rand` past 1.2, then
    /// inserts exactly like [`Scheduler::queue_work`].
    pub fn requeue_work(&self, mut item: WorkItem) {
        let (priority, rand) = update_priority(item.priority, item.rand + 0.5);
        item.priority = priority;
        item.rand = rand;
        self.queue_work(item);
    }

    /// Dequeues one item, enforcing per-host spacing and the URL
    /// budget. Blocks until an item is dispensable or the budget is
    /// exhausted, in which case `Err(Cancelled)` is returned and the
    /// item that would have been dispensed is pushed back unchanged.
    pub async fn get_work(&self) -> Result<WorkItem, Cancelled> {
        loop {
            let item = self.dequeue().await;

            if self.budget_exhausted_and_requeue(&item) {
                self.dequeue_notify.notify_one();
                return Err(Cancelled);
            }

            let host = host_of(&item.key).to_string();
            let now = self.clock.now();

            // §5 requires the read of `nextFetch[host]` through the write of
            // its reservation to be one atomic critical section, so that two
            // workers racing on the same host can never both observe `dt`
            // before either has reserved the slot. Holding a single guard
            // across the read and the (conditional) write, rather than
            // dropping and reacquiring the lock between them, is what makes
            // that true.
            let (dt, hol_blocked) = {
                let mut inner = self.inner.lock().unwrap();
                let dt = inner.next_fetch.dt(&host, now);
                if dt > HOL_THRESHOLD {
                    (dt, true)
                } else {
                    inner.next_fetch.reserve(&host, now + dt + self.delta_t, now);
                    (dt, false)
                }
            };

            if hol_blocked {
                metrics::counter!("scheduler_hol_sleep_total").increment(1);
                tokio::time::sleep(HOL_SLEEP).await;
                self.inner.lock().unwrap().queue.push(item);
                self.dequeue_notify.notify_one();
                continue;
            }

            if dt > Duration::ZERO {
                metrics::histogram!("scheduler_short_sleep_seconds").record(dt.as_secs_f64());
                tokio::time::sleep(dt).await;
            }
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(remaining) = inner.remaining_budget.as_mut() {
                    *remaining = remaining.saturating_sub(1);
                }
            }

            self.outstanding.fetch_add(1, Ordering::SeqCst);
            return Ok(item);
        }
    }

    fn budget_exhausted_and_requeue(&self, item: &WorkItem) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.remaining_budget {
            Some(0) => {
                inner.queue.push(item.clone());
                true
            }
            _ => false,
        }
    }

    /// Non-blocking dequeue first; on an empty queue, marks this caller
    /// as awaiting work and blocks until something is pushed.
    async fn dequeue(&self) -> WorkItem {
        if let Some(item) = self.inner.lock().unwrap().queue.pop() {
            return item;
        }

        self.awaiting_work.fetch_add(1, Ordering::SeqCst);
        let item = loop {
            // Register interest before the second check so a concurrent
            // `queue_work`/`requeue_work` between the check and the await
            // can't be missed: `Notify` stores a wakeup permit for a
            // `notified()` future created before `notify_one` fires.
            let notified = self.dequeue_notify.notified();
            if let Some(item) = self.inner.lock().unwrap().queue.pop() {
                break item;
            }
            notified.await;
        };
        self.awaiting_work.fetch_sub(1, Ordering::SeqCst);
        item
    }

    /// Signals that one previously dispensed item has been fully
    /// accounted for (completed or abandoned). Must be called exactly
    /// once per successful `get_work`.
    pub fn work_done(&self) {
        let remaining = self.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining <= 0 {
            self.close_notify.notify_waiters();
        }
    }

    /// Waits until every dispensed item has been acknowledged by
    /// [`Scheduler::work_done`].
    pub async fn close(&self) {
        loop {
            let notified = self.close_notify.notified();
            if self.outstanding.load(Ordering::SeqCst) <= 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn set_ridealong(&self, key: impl Into<String>, ridealong: Ridealong) {
        self.ridealong.insert(key.into(), ridealong);
    }

    pub fn get_ridealong(&self, key: &str) -> Option<Ridealong> {
        self.ridealong.get(key).map(|entry| entry.clone())
    }

    pub fn del_ridealong(&self, key: &str) {
        self.ridealong.remove(key);
    }

    pub fn q_size(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Drains every item currently in the queue, in dequeue order, for a
    /// snapshot save. Per §4.5 this is destructive to the live queue — the
    /// caller must have already stopped workers from calling `get_work`
    /// before reaching for this, or items could be lost to a race between
    /// this drain and a concurrent dispensation.
    pub fn drain_queue(&self) -> Vec<WorkItem> {
        let mut inner = self.inner.lock().unwrap();
        let mut items = Vec::with_capacity(inner.queue.len());
        while let Some(item) = inner.queue.pop() {
            items.push(item);
        }
        items
    }

    /// Restores previously-drained items into the queue, as a snapshot
    /// `load` does. No rate check, same as `queue_work`.
    pub fn load_queue(&self, items: impl IntoIterator<Item = WorkItem>) {
        let mut inner = self.inner.lock().unwrap();
        for item in items {
            inner.queue.push(item);
        }
        self.dequeue_notify.notify_waiters();
    }

    /// A point-in-time copy of the full ridealong table, for a snapshot save.
    pub fn ridealong_snapshot(&self) -> HashMap<String, Ridealong> {
        self.ridealong
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Bulk-loads ridealong entries, as a snapshot `load` does.
    pub fn load_ridealong(&self, entries: HashMap<String, Ridealong>) {
        for (key, value) in entries {
            self.ridealong.insert(key, value);
        }
    }

    /// True once every worker is blocked awaiting work and the queue is
    /// empty — i.e. the crawl has nothing left to do.
    pub fn done(&self, worker_count: u32) -> bool {
        self.awaiting_work.load(Ordering::SeqCst) == worker_count && self.q_size() == 0
    }

    /// Occupancy report. If the queue and ridealong sizes disagree —
    /// invariant R1/R2 has been broken — this drains the queue to
    /// diagnose the divergence, logs both sides' extra keys, and aborts
    /// the process; the snapshot mechanism is the recovery path for
    /// that case, not this function.
    pub fn summarize(&self) -> SchedulerReport {
        let queue_len = self.q_size();
        let ridealong_len = self.ridealong.len();

        if queue_len != ridealong_len {
            self.diagnose_and_abort(queue_len, ridealong_len);
        }

        let mut urls_with_tries = 0u64;
        let mut priority_counts = BTreeMap::new();
        let mut netlocs: BTreeMap<String, u64> = BTreeMap::new();
        for entry in self.ridealong.iter() {
            let r = entry.value();
            if r.tries > 0 {
                urls_with_tries += 1;
            }
            *priority_counts.entry(r.priority).or_insert(0) += 1;
            *netlocs.entry(r.netloc.clone()).or_insert(0) += 1;
        }

        let mut top_netlocs: Vec<(String, u64)> = netlocs.into_iter().collect();
        top_netlocs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_netlocs.truncate(10);

        SchedulerReport {
            queue_len,
            ridealong_len,
            urls_with_tries,
            priority_counts,
            top_netlocs,
        }
    }

    fn diagnose_and_abort(&self, queue_len: usize, ridealong_len: usize) -> ! {
        let mut q_keys = HashSet::new();
        {
            let mut inner = self.inner.lock().unwrap();
            while let Some(item) = inner.queue.pop() {
                q_keys.insert(item.key);
            }
        }
        let ridealong_keys: HashSet<String> =
            self.ridealong.iter().map(|e| e.key().clone()).collect();

        let extra_q: Vec<&String> = q_keys.difference(&ridealong_keys).collect();
        let extra_r: Vec<&String> = ridealong_keys.difference(&q_keys).collect();

        error!(
            queue_len,
            ridealong_len,
            ?extra_q,
            ?extra_r,
            "queue size and ridealong size disagree, invariant R1/R2 violated"
        );
        if !extra_r.is_empty() {
            warn!("ridealong entries with no matching queue item will be lost");
        }
        panic!(
            "scheduler invariant violated: {queue_len} items in queue but {ridealong_len} in ridealong"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn item(priority: u32, rand: f64, key: &str) -> WorkItem {
        WorkItem::new(priority, rand, key)
    }

    #[tokio::test(start_paused = true)]
    async fn single_host_spacing_respects_delta_t() {
        // max_host_qps = 2.0 -> delta_t = 0.5s
        let sched = Arc::new(Scheduler::new(2.0, None));
        sched.queue_work(item(0, 0.1, "a)1"));
        sched.queue_work(item(0, 0.2, "a)2"));
        sched.queue_work(item(0, 0.3, "a)3"));

        let t0 = Instant::now();
        let mut dispense_times = Vec::new();
        for _ in 0..3 {
            sched.get_work().await.unwrap();
            dispense_times.push(Instant::now().duration_since(t0));
        }

        assert_eq!(dispense_times[0], Duration::ZERO);
        assert_eq!(dispense_times[1], Duration::from_millis(500));
        assert_eq!(dispense_times[2], Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn hol_retry_is_chunked_not_one_long_sleep() {
        // QPS 0.1 -> delta_t = 10s, so the second item for host "a" is
        // nowhere near fetchable and must cycle through several
        // HOL_SLEEP-sized naps rather than blocking for the full 10s.
        let sched = Scheduler::new(0.1, None);
        sched.queue_work(item(0, 0.0, "a)1"));
        sched.get_work().await.unwrap();

        sched.queue_work(item(0, 0.0, "a)2"));
        let t0 = Instant::now();
        let got = sched.get_work().await.unwrap();
        let elapsed = Instant::now().duration_since(t0);

        assert_eq!(got.key, "a)2");
        assert!(elapsed >= Duration::from_secs(9) && elapsed <= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn hol_blocked_host_does_not_starve_a_ready_peer() {
        // QPS 0.1 -> delta_t = 10s.
        let sched = Arc::new(Scheduler::new(0.1, None));
        sched.queue_work(item(0, 0.0, "a)1"));
        sched.get_work().await.unwrap();

        sched.queue_work(item(0, 0.0, "a)2"));
        let sched_a = Arc::clone(&sched);
        let worker_a = tokio::spawn(async move { sched_a.get_work().await.unwrap() });

        // Let worker_a run up to its first HOL sleep, at which point
        // "a)2" is held by that task and out of the queue entirely.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        sched.queue_work(item(0, 0.0, "b)1"));
        let t0 = Instant::now();
        let got_b = sched.get_work().await.unwrap();
        let elapsed = Instant::now().duration_since(t0);

        assert_eq!(host_of(&got_b.key), "b");
        assert!(elapsed < HOL_THRESHOLD);

        worker_a.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn budget_cutoff_preserves_remaining_items() {
        let sched = Scheduler::new(1000.0, Some(2));
        for i in 0..5 {
            sched.queue_work(item(0, 0.0, &format!("h{i})1")));
        }

        assert!(sched.get_work().await.is_ok());
        assert!(sched.get_work().await.is_ok());
        assert!(sched.get_work().await.is_err());

        assert_eq!(sched.q_size(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn work_done_unblocks_close() {
        let sched = Arc::new(Scheduler::new(1000.0, None));
        sched.queue_work(item(0, 0.0, "a)1"));
        let got = sched.get_work().await.unwrap();

        let sched2 = Arc::clone(&sched);
        let closer = tokio::spawn(async move {
            sched2.close().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!closer.is_finished());

        sched.set_ridealong(got.key.clone(), Ridealong::new("http://a/1", "a", 0));
        sched.del_ridealong(&got.key);
        sched.work_done();

        closer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn done_reports_idle_pool() {
        let sched = Scheduler::new(1000.0, None);
        assert!(sched.done(0));
        assert!(!sched.done(1));
    }

    #[tokio::test(start_paused = true)]
    async fn summarize_counts_priorities_and_netlocs() {
        let sched = Scheduler::new(1000.0, None);
        sched.queue_work(item(0, 0.0, "a)1"));
        sched.set_ridealong("a)1", Ridealong::new("http://a/1", "a.example", 0));
        sched.queue_work(item(1, 0.0, "b)1"));
        let mut r = Ridealong::new("http://b/1", "b.example", 1);
        r.tries = 2;
        sched.set_ridealong("b)1", r);

        let report = sched.summarize();
        assert_eq!(report.queue_len, 2);
        assert_eq!(report.ridealong_len, 2);
        assert_eq!(report.urls_with_tries, 1);
        assert_eq!(report.priority_counts.get(&0), Some(&1));
        assert_eq!(report.priority_counts.get(&1), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_and_load_queue_round_trips_the_multiset() {
        let sched = Scheduler::new(1000.0, None);
        sched.queue_work(item(0, 0.1, "a)1"));
        sched.queue_work(item(1, 0.2, "b)1"));

        let drained = sched.drain_queue();
        assert_eq!(sched.q_size(), 0);
        assert_eq!(drained.len(), 2);

        sched.load_queue(drained);
        assert_eq!(sched.q_size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ridealong_snapshot_and_load_round_trip() {
        let sched = Scheduler::new(1000.0, None);
        sched.set_ridealong("a)1", Ridealong::new("http://a/1", "a", 0));

        let snap = sched.ridealong_snapshot();
        assert_eq!(snap.len(), 1);

        let sched2 = Scheduler::new(1000.0, None);
        sched2.load_ridealong(snap);
        assert_eq!(sched2.get_ridealong("a)1").unwrap().url, "http://a/1");
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "scheduler invariant violated")]
    async fn summarize_aborts_on_ridealong_mismatch() {
        let sched = Scheduler::new(1000.0, None);
        sched.queue_work(item(0, 0.0, "a)1"));
        // No matching ridealong entry: R1 violated.
        let _ = sched.summarize();
    }
}
