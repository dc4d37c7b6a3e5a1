use politecrawl_core::{Ridealong, WorkItem};
use rand::Rng;
use url::Url;

/// Turns a seed URL into the `(key, netloc)` pair the scheduler and ridealong
/// table need. Full SURT computation is an external collaborator per this
/// crate's scope (§1's "Out of scope" list) — this is the minimal stand-in a
/// CLI needs to seed a crawl at all, not a replacement for a real SURT
/// normalizer. It reverses nothing and does no case-folding; it exists only
/// so `host_of` has something well-formed to split on.
pub fn key_and_netloc(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_string();

    let mut rest = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        rest.push('?');
        rest.push_str(query);
    }

    Some((format!("{host}){rest}"), host))
}

/// Builds the starting `(WorkItem, Ridealong)` pair for one seed URL at
/// priority 0, with `rand` drawn uniformly from `[0, 1)` as §3 specifies.
pub fn seed_work_item(url: &str, rng: &mut impl Rng) -> Option<(WorkItem, Ridealong)> {
    let (key, netloc) = key_and_netloc(url)?;
    let item = WorkItem::seed(0, key, rng);
    let ridealong = Ridealong::new(url, netloc, 0);
    Some((item, ridealong))
}
