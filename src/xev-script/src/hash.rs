// SPDX-FileCopyrightText: 2026 The xev authors
//
// SPDX-License-Identifier: BSD-2-Clause

//! Named hash symbol table.
//!
//! Each hash is an insertion-ordered key/value list with a precomputed
//! hash per key to short-circuit comparisons. Assigning an existing key
//! replaces its value in place, so iteration order is stable. The reserved
//! name `nvstate` never lives in the table: [`HashScope`] routes its reads
//! and writes to the persistent store, one atomic call per operation.

use xev_proto::oat_hash;
use xev_store::{Store, StoreError};

/// Hash name transparently backed by the persistent store.
pub const NVSTATE: &str = "nvstate";

struct Entry {
    key: String,
    key_hash: u32,
    value: String,
}

struct NamedHash {
    name: String,
    name_hash: u32,
    entries: Vec<Entry>,
}

/// Flat table of named in-memory hashes, in creation order.
#[derive(Default)]
pub struct SymbolTable {
    hashes: Vec<NamedHash>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, name: &str) -> Option<&NamedHash> {
        let nh = oat_hash(name.as_bytes());
        self.hashes
            .iter()
            .find(|h| h.name_hash == nh && h.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut NamedHash> {
        let nh = oat_hash(name.as_bytes());
        self.hashes
            .iter_mut()
            .find(|h| h.name_hash == nh && h.name == name)
    }

    pub fn has_hash(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn get(&self, name: &str, key: &str) -> Option<&str> {
        let hash = self.find(name)?;
        let kh = oat_hash(key.as_bytes());
        hash.entries
            .iter()
            .find(|e| e.key_hash == kh && e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Insert or replace in place; the hash is created on first use.
    pub fn set(&mut self, name: &str, key: &str, value: &str) {
        if self.find(name).is_none() {
            self.hashes.push(NamedHash {
                name: name.to_string(),
                name_hash: oat_hash(name.as_bytes()),
                entries: Vec::new(),
            });
        }
        let hash = self
            .find_mut(name)
            .unwrap_or_else(|| unreachable!("hash was just created"));
        let kh = oat_hash(key.as_bytes());
        if let Some(entry) = hash
            .entries
            .iter_mut()
            .find(|e| e.key_hash == kh && e.key == key)
        {
            entry.value = value.to_string();
        } else {
            hash.entries.push(Entry {
                key: key.to_string(),
                key_hash: kh,
                value: value.to_string(),
            });
        }
    }

    /// Visit entries in insertion order. Returns false when the hash does
    /// not exist.
    pub fn walk(&self, name: &str, mut f: impl FnMut(&str, &str)) -> bool {
        match self.find(name) {
            Some(hash) => {
                for entry in &hash.entries {
                    f(&entry.key, &entry.value);
                }
                true
            }
            None => false,
        }
    }

    /// Drop all keys of a hash, keeping the (now empty) hash itself.
    pub fn clear(&mut self, name: &str) {
        if let Some(hash) = self.find_mut(name) {
            hash.entries.clear();
        }
    }
}

/// The hash layer one script execution sees: the in-memory table plus the
/// optional store passthrough for `nvstate`.
pub struct HashScope<'a> {
    pub table: SymbolTable,
    store: Option<&'a dyn Store>,
}

impl<'a> HashScope<'a> {
    pub fn new(store: Option<&'a dyn Store>) -> Self {
        Self {
            table: SymbolTable::new(),
            store,
        }
    }

    pub fn get(&self, name: &str, key: &str) -> Result<Option<String>, StoreError> {
        if name == NVSTATE {
            if let Some(store) = self.store {
                return store.read_nvstate(key);
            }
        }
        Ok(self.table.get(name, key).map(str::to_string))
    }

    pub fn set(&mut self, name: &str, key: &str, value: &str) -> Result<(), StoreError> {
        if name == NVSTATE {
            if let Some(store) = self.store {
                return store.write_nvstate(key, value);
            }
        }
        self.table.set(name, key, value);
        Ok(())
    }
}
