use std::collections::HashMap;
use std::io::{Read, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::WorkItem;
use crate::ridealong::Ridealong;

/// Bumped whenever [`SnapshotHeader`] or the record layout changes.
/// `load` refuses a snapshot whose version it doesn't recognize rather
/// than guessing at its layout.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("snapshot version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    version: u32,
    saved_at: DateTime<Utc>,
    config_digest: u64,
    queue_len: usize,
}

/// The full on-disk content of a paused crawl: everything needed to
/// resume dispensing work without re-seeding or re-deriving priorities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotFile {
    pub items: Vec<WorkItem>,
    pub ridealong: HashMap<String, Ridealong>,
    pub seeds: Vec<String>,
}

/// Writes a length-prefixed bincode record to `w`.
fn write_record<T: Serialize>(w: &mut impl Write, value: &T) -> Result<(), SnapshotError> {
    let bytes = bincode::serialize(value)?;
    w.write_all(&(bytes.len() as u64).to_le_bytes())?;
    w.write_all(&bytes)?;
    Ok(())
}

/// Reads one length-prefixed bincode record from `r`.
fn read_record<T: for<'de> Deserialize<'de>>(r: &mut impl Read) -> Result<T, SnapshotError> {
    let mut len_buf = [0u8; 8];
    r.read_exact(&mut len_buf)?;
    let len = u64::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}

impl SnapshotFile {
    pub fn new(items: Vec<WorkItem>, ridealong: HashMap<String, Ridealong>, seeds: Vec<String>) -> Self {
        Self {
            items,
            ridealong,
            seeds,
        }
    }

    /// Serializes `self` to `w` as a header record followed by the
    /// ridealong table, the seed list, and the queue items in the
    /// order given. Draining the live queue into `items` before calling
    /// this is the caller's responsibility — the save itself is a pure
    /// write and does not touch a `Scheduler`.
    pub fn save(&self, w: &mut impl Write, config_digest: u64, now: DateTime<Utc>) -> Result<(), SnapshotError> {
        let header = SnapshotHeader {
            version: SNAPSHOT_VERSION,
            saved_at: now,
            config_digest,
            queue_len: self.items.len(),
        };
        write_record(w, &header)?;
        write_record(w, &self.ridealong)?;
        write_record(w, &self.seeds)?;
        for item in &self.items {
            write_record(w, item)?;
        }
        Ok(())
    }

    /// Restores a snapshot written by [`SnapshotFile::save`]. Rejects a
    /// header with an unrecognized version up front, before attempting
    /// to parse anything that version might have laid out differently.
    pub fn load(r: &mut impl Read) -> Result<Self, SnapshotError> {
        let header: SnapshotHeader = read_record(r)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: header.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let ridealong: HashMap<String, Ridealong> = read_record(r)?;
        let seeds: Vec<String> = read_record(r)?;
        let mut items = Vec::with_capacity(header.queue_len);
        for _ in 0..header.queue_len {
            items.push(read_record(r)?);
        }

        Ok(Self {
            items,
            ridealong,
            seeds,
        })
    }
}
