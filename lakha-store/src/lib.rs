//! Durable key-value persistence layer.
//!
//! A single `redb` database backs every namespace (`block:`, `account:`,
//! `validator:`, `contract:`): redb's B-tree tables keep keys in sorted
//! order, which is what lets `iterate(prefix)` walk a namespace without a
//! full scan.

use std::path::Path;

use lakha_common::error::{NodeError, Result};
use redb::{Database, ReadableTable, TableDefinition};

const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

pub const BLOCK_PREFIX: &str = "block:";
pub const ACCOUNT_PREFIX: &str = "account:";
pub const VALIDATOR_PREFIX: &str = "validator:";
pub const CONTRACT_PREFIX: &str = "contract:";

fn store_err(e: impl std::fmt::Display) -> NodeError {
    NodeError::PersistenceError(e.to_string())
}

pub struct Store {
    db: Database,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(store_err)?;
        }
        let db = Database::create(path.as_ref()).map_err(store_err)?;
        let write_txn = db.begin_write().map_err(store_err)?;
        {
            // Touch the table once so empty-store iteration never fails
            // with "table does not exist" on a fresh file.
            let _ = write_txn.open_table(KV).map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Writes are single-writer and transactional: the commit either fully
    /// lands or the whole write is rolled back, so recovery after a crash
    /// always yields a prefix of previously committed writes.
    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = write_txn.open_table(KV).map_err(store_err)?;
            table.insert(key, value).map_err(store_err)?;
        }
        write_txn.commit().map_err(store_err)?;
        Ok(())
    }

    pub fn put_json(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(store_err)?;
        self.put(key, &bytes)
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(KV).map_err(store_err)?;
        let result = table
            .get(key)
            .map_err(store_err)?
            .map(|v| v.value().to_vec());
        Ok(result)
    }

    pub fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(store_err)?)),
            None => Ok(None),
        }
    }

    /// Returns every `(key, value)` pair whose key starts with `prefix`, in
    /// ascending key order.
    pub fn iterate(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let read_txn = self.db.begin_read().map_err(store_err)?;
        let table = read_txn.open_table(KV).map_err(store_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (k, v) = entry.map_err(store_err)?;
            let key = k.value();
            if key.starts_with(prefix) {
                out.push((key.to_string(), v.value().to_vec()));
            }
        }
        Ok(out)
    }

    /// Reads blocks in ascending index order until the first gap, as
    /// rehydration requires.
    pub fn blocks_until_gap(&self) -> Result<Vec<Vec<u8>>> {
        let mut out = Vec::new();
        let mut idx = 0u64;
        loop {
            let key = format!("{BLOCK_PREFIX}{idx}");
            match self.get(&key)? {
                Some(bytes) => {
                    out.push(bytes);
                    idx += 1;
                }
                None => break,
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("lakha.redb")).unwrap();
        (store, dir)
    }

    #[test]
    fn put_get_round_trip() {
        let (store, _dir) = scratch_store();
        store.put("account:lakha1abc", b"{}").unwrap();
        assert_eq!(store.get("account:lakha1abc").unwrap().unwrap(), b"{}");
        assert!(store.get("account:missing").unwrap().is_none());
    }

    #[test]
    fn iterate_is_prefix_scoped_and_ordered() {
        let (store, _dir) = scratch_store();
        store.put("block:1", b"one").unwrap();
        store.put("block:0", b"zero").unwrap();
        store.put("account:x", b"acct").unwrap();

        let blocks = store.iterate(BLOCK_PREFIX).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].0, "block:0");
        assert_eq!(blocks[1].0, "block:1");
    }

    #[test]
    fn blocks_until_gap_stops_at_first_missing_index() {
        let (store, _dir) = scratch_store();
        store.put("block:0", b"zero").unwrap();
        store.put("block:1", b"one").unwrap();
        store.put("block:3", b"three").unwrap();

        let loaded = store.blocks_until_gap().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn reopening_an_existing_database_preserves_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lakha.redb");
        {
            let store = Store::open(&path).unwrap();
            store.put("account:a", b"1").unwrap();
        }
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.get("account:a").unwrap().unwrap(), b"1");
    }
}
