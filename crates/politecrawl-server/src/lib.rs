//! Ambient stack wiring the scheduler (`politecrawl_core`) and fetcher
//! (`politecrawl_fetch`) into a running crawl process: typed config, a
//! process-wide logging/metrics setup, URL seeding, and the worker pool.
//!
//! Split out as a library so the CLI binary (`src/main.rs`) stays a thin
//! wiring layer and the worker pool / config loader can be exercised in
//! integration tests without spawning a process.

pub mod config;
pub mod error;
pub mod logging;
pub mod seed;
pub mod worker;
