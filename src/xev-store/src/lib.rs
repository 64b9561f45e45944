// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Persistent store contract and its two implementations.
//!
//! The daemon reaches persistence only through the [`Store`] trait: the
//! script `nvstate` hash, the script catalog, the trigger-action mapping,
//! the trigger/heartbeat logs, and the schedule table. Each call is atomic
//! on its own. [`MemoryStore`] backs tests and ephemeral runs;
//! [`FileStore`] keeps everything in a pickledb JSON file with the
//! busy-retry policy applied to writes.

mod file;
mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::{FileStore, RetryPolicy};
pub use memory::{MemoryStore, TrigLogRow};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("store still busy after {attempts} attempts: {last}")]
    Busy { attempts: u32, last: String },
}

/// One row of the schedule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub name: String,
    pub cron_expr: String,
    pub script_name: String,
}

/// The abstract persistence contract consumed by the interpreter and the
/// trigger orchestrator.
pub trait Store {
    /// Read a value from the persistent `nvstate` hash.
    fn read_nvstate(&self, key: &str) -> StoreResult<Option<String>>;

    /// Upsert a `nvstate` key with the current timestamp.
    fn write_nvstate(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Fetch a script body by name.
    fn fetch_script(&self, name: &str) -> StoreResult<Option<String>>;

    /// Resolve a trigger source tag through the trigger-action mapping and
    /// fetch the mapped script body.
    fn fetch_script_by_tag(&self, source_tag: &str) -> StoreResult<Option<String>>;

    /// Insert or replace a script body.
    fn upsert_script(&self, name: &str, text: &str) -> StoreResult<()>;

    /// Map a trigger source tag (with optional sub-address) to a script.
    fn set_trigger_action(&self, source_tag: &str, script_name: &str) -> StoreResult<()>;

    /// Record the latest trigger from `source`, replacing any earlier row.
    fn update_trigger_log(
        &self,
        source: &str,
        schema: &str,
        nvpairs: &str,
        ts: i64,
    ) -> StoreResult<()>;

    /// Record the latest heartbeat from `source`.
    fn update_heartbeat_log(&self, source: &str, ts: i64) -> StoreResult<()>;

    /// All schedule rows.
    fn schedule_entries(&self) -> StoreResult<Vec<ScheduleRow>>;

    /// Insert or replace a schedule row.
    fn upsert_schedule_entry(&self, row: &ScheduleRow) -> StoreResult<()>;
}
