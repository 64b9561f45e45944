// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-memory store for tests and ephemeral runs.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{ScheduleRow, Store, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrigLogRow {
    pub schema: String,
    pub nvpairs: String,
    pub ts: i64,
}

#[derive(Default)]
struct Inner {
    nvstate: HashMap<String, (String, i64)>,
    scripts: HashMap<String, String>,
    trigger_actions: HashMap<String, String>,
    trigger_log: HashMap<String, TrigLogRow>,
    heartbeat_log: HashMap<String, i64>,
    schedule: Vec<ScheduleRow>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test accessor: the logged trigger row for a source, if any.
    pub fn trigger_log(&self, source: &str) -> Option<TrigLogRow> {
        self.inner.lock().unwrap().trigger_log.get(source).cloned()
    }

    /// Test accessor: the logged heartbeat timestamp for a source, if any.
    pub fn heartbeat_log(&self, source: &str) -> Option<i64> {
        self.inner.lock().unwrap().heartbeat_log.get(source).copied()
    }
}

impl Store for MemoryStore {
    fn read_nvstate(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .nvstate
            .get(key)
            .map(|(v, _)| v.clone()))
    }

    fn write_nvstate(&self, key: &str, value: &str) -> StoreResult<()> {
        let ts = now();
        self.inner
            .lock()
            .unwrap()
            .nvstate
            .insert(key.to_string(), (value.to_string(), ts));
        Ok(())
    }

    fn fetch_script(&self, name: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.lock().unwrap().scripts.get(name).cloned())
    }

    fn fetch_script_by_tag(&self, source_tag: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .trigger_actions
            .get(source_tag)
            .and_then(|script| inner.scripts.get(script))
            .cloned())
    }

    fn upsert_script(&self, name: &str, text: &str) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .insert(name.to_string(), text.to_string());
        Ok(())
    }

    fn set_trigger_action(&self, source_tag: &str, script_name: &str) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .trigger_actions
            .insert(source_tag.to_string(), script_name.to_string());
        Ok(())
    }

    fn update_trigger_log(
        &self,
        source: &str,
        schema: &str,
        nvpairs: &str,
        ts: i64,
    ) -> StoreResult<()> {
        self.inner.lock().unwrap().trigger_log.insert(
            source.to_string(),
            TrigLogRow {
                schema: schema.to_string(),
                nvpairs: nvpairs.to_string(),
                ts,
            },
        );
        Ok(())
    }

    fn update_heartbeat_log(&self, source: &str, ts: i64) -> StoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .heartbeat_log
            .insert(source.to_string(), ts);
        Ok(())
    }

    fn schedule_entries(&self) -> StoreResult<Vec<ScheduleRow>> {
        Ok(self.inner.lock().unwrap().schedule.clone())
    }

    fn upsert_schedule_entry(&self, row: &ScheduleRow) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.schedule.iter_mut().find(|r| r.name == row.name) {
            *existing = row.clone();
        } else {
            inner.schedule.push(row.clone());
        }
        Ok(())
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nvstate_read_back_after_write() {
        let store = MemoryStore::new();
        assert_eq!(store.read_nvstate("mode").unwrap(), None);
        store.write_nvstate("mode", "away").unwrap();
        assert_eq!(store.read_nvstate("mode").unwrap(), Some("away".into()));
        store.write_nvstate("mode", "home").unwrap();
        assert_eq!(store.read_nvstate("mode").unwrap(), Some("home".into()));
    }

    #[test]
    fn script_fetch_by_tag_resolves_action_mapping() {
        let store = MemoryStore::new();
        store.upsert_script("porch", "%xplout{x} = 1;").unwrap();
        store
            .set_trigger_action("acme-sense.pool:3", "porch")
            .unwrap();

        assert_eq!(
            store.fetch_script_by_tag("acme-sense.pool:3").unwrap(),
            Some("%xplout{x} = 1;".into())
        );
        assert_eq!(store.fetch_script_by_tag("acme-sense.pool").unwrap(), None);
    }

    #[test]
    fn logs_replace_per_source() {
        let store = MemoryStore::new();
        store
            .update_trigger_log("a-b.c", "sensor.basic", "device=1", 10)
            .unwrap();
        store
            .update_trigger_log("a-b.c", "sensor.basic", "device=2", 20)
            .unwrap();
        let row = store.trigger_log("a-b.c").unwrap();
        assert_eq!(row.nvpairs, "device=2");
        assert_eq!(row.ts, 20);

        store.update_heartbeat_log("a-b.c", 30).unwrap();
        store.update_heartbeat_log("a-b.c", 40).unwrap();
        assert_eq!(store.heartbeat_log("a-b.c"), Some(40));
    }

    #[test]
    fn schedule_upsert_replaces_by_name() {
        let store = MemoryStore::new();
        let row = ScheduleRow {
            name: "night".into(),
            cron_expr: "@dusk".into(),
            script_name: "lights_on".into(),
        };
        store.upsert_schedule_entry(&row).unwrap();
        store
            .upsert_schedule_entry(&ScheduleRow {
                cron_expr: "@sunset".into(),
                ..row.clone()
            })
            .unwrap();
        let rows = store.schedule_entries().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cron_expr, "@sunset");
    }
}
