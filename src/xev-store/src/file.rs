// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! File-backed store on pickledb.
//!
//! One JSON file holds every table, namespaced by key prefix. pickledb
//! dumps the whole file on each write, so a call is atomic on its own;
//! write failures go through the busy-retry policy before surfacing.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use pickledb::{PickleDb, PickleDbDumpPolicy, SerializationMethod};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ScheduleRow, Store, StoreError, StoreResult};

const NV_PREFIX: &str = "nv:";
const SCRIPT_PREFIX: &str = "script:";
const ACTION_PREFIX: &str = "act:";
const TRIG_PREFIX: &str = "trig:";
const HBEAT_PREFIX: &str = "hbeat:";
const SCHED_PREFIX: &str = "sched:";

/// Backoff applied to failing writes: sleep `backoff`, retry, give up
/// after `attempts`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub backoff: Duration,
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(25),
            attempts: 10,
        }
    }
}

impl RetryPolicy {
    fn run<T>(
        &self,
        what: &str,
        mut f: impl FnMut() -> Result<T, pickledb::error::Error>,
    ) -> StoreResult<T> {
        let mut last = String::new();
        for attempt in 1..=self.attempts.max(1) {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) => {
                    last = e.to_string();
                    if attempt < self.attempts {
                        warn!(attempt, what, "store write failed, backing off: {last}");
                        std::thread::sleep(self.backoff);
                    }
                }
            }
        }
        Err(StoreError::Busy {
            attempts: self.attempts,
            last,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NvRecord {
    value: String,
    ts: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrigRecord {
    schema: String,
    nvpairs: String,
    ts: i64,
}

pub struct FileStore {
    db: Mutex<PickleDb>,
    retry: RetryPolicy,
    path: PathBuf,
}

impl FileStore {
    /// Open or create the store file with the default retry policy.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, RetryPolicy::default())
    }

    pub fn open_with(path: impl AsRef<Path>, retry: RetryPolicy) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = if path.exists() {
            PickleDb::load(
                &path,
                PickleDbDumpPolicy::AutoDump,
                SerializationMethod::Json,
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?
        } else {
            PickleDb::new(
                &path,
                PickleDbDumpPolicy::AutoDump,
                SerializationMethod::Json,
            )
        };
        Ok(Self {
            db: Mutex::new(db),
            retry,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn set<V: Serialize>(&self, key: &str, value: &V) -> StoreResult<()> {
        let mut db = self.db.lock().unwrap();
        self.retry.run(key, || db.set(key, value))
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

impl Store for FileStore {
    fn read_nvstate(&self, key: &str) -> StoreResult<Option<String>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .get::<NvRecord>(&format!("{NV_PREFIX}{key}"))
            .map(|r| r.value))
    }

    fn write_nvstate(&self, key: &str, value: &str) -> StoreResult<()> {
        let record = NvRecord {
            value: value.to_string(),
            ts: Self::now(),
        };
        self.set(&format!("{NV_PREFIX}{key}"), &record)
    }

    fn fetch_script(&self, name: &str) -> StoreResult<Option<String>> {
        let db = self.db.lock().unwrap();
        Ok(db.get::<String>(&format!("{SCRIPT_PREFIX}{name}")))
    }

    fn fetch_script_by_tag(&self, source_tag: &str) -> StoreResult<Option<String>> {
        let db = self.db.lock().unwrap();
        let Some(script_name) = db.get::<String>(&format!("{ACTION_PREFIX}{source_tag}")) else {
            return Ok(None);
        };
        Ok(db.get::<String>(&format!("{SCRIPT_PREFIX}{script_name}")))
    }

    fn upsert_script(&self, name: &str, text: &str) -> StoreResult<()> {
        self.set(&format!("{SCRIPT_PREFIX}{name}"), &text.to_string())
    }

    fn set_trigger_action(&self, source_tag: &str, script_name: &str) -> StoreResult<()> {
        self.set(
            &format!("{ACTION_PREFIX}{source_tag}"),
            &script_name.to_string(),
        )
    }

    fn update_trigger_log(
        &self,
        source: &str,
        schema: &str,
        nvpairs: &str,
        ts: i64,
    ) -> StoreResult<()> {
        let record = TrigRecord {
            schema: schema.to_string(),
            nvpairs: nvpairs.to_string(),
            ts,
        };
        self.set(&format!("{TRIG_PREFIX}{source}"), &record)
    }

    fn update_heartbeat_log(&self, source: &str, ts: i64) -> StoreResult<()> {
        self.set(&format!("{HBEAT_PREFIX}{source}"), &ts)
    }

    fn schedule_entries(&self) -> StoreResult<Vec<ScheduleRow>> {
        let db = self.db.lock().unwrap();
        let mut rows: Vec<ScheduleRow> = db
            .get_all()
            .into_iter()
            .filter(|k| k.starts_with(SCHED_PREFIX))
            .filter_map(|k| db.get::<ScheduleRow>(&k))
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn upsert_schedule_entry(&self, row: &ScheduleRow) -> StoreResult<()> {
        self.set(&format!("{SCHED_PREFIX}{}", row.name), row)
    }
}
