//! KV store adapter.
//!
//! [`KvStore`] is the only surface the config stores touch. It models a
//! flat, ordered keyspace with per-key revisions, which is what a
//! distributed KV service (Consul, etcd) offers: get, put, conditional
//! put, delete, subtree delete and prefix listing.
//!
//! [`RedbKv`] implements it on top of redb, on disk or in memory. Every
//! call is one redb transaction, so [`KvStore::put_if`] is atomic.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::debug;

use crate::error::{map_err, StateResult};
use crate::tables::*;

/// A stored entry with the revision of its last write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
}

/// Operations the config stores need from the backing store.
pub trait KvStore: Send + Sync {
    /// Fetch a single key.
    fn get(&self, key: &str) -> StateResult<Option<KvPair>>;

    /// Unconditional write. Returns the new revision.
    fn put(&self, key: &str, value: &[u8]) -> StateResult<u64>;

    /// Conditional write.
    ///
    /// `expected = None` requires the key to be absent; `Some(rev)` requires
    /// its current revision to be `rev`. Returns false, writing nothing,
    /// when the condition does not hold.
    fn put_if(&self, key: &str, value: &[u8], expected: Option<u64>) -> StateResult<bool>;

    /// Delete a key. Returns true if it existed.
    fn delete(&self, key: &str) -> StateResult<bool>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    fn delete_prefix(&self, prefix: &str) -> StateResult<u32>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn list(&self, prefix: &str) -> StateResult<Vec<KvPair>>;
}

/// Process-wide handle to the backing store.
pub type SharedKv = Arc<dyn KvStore>;

/// redb-backed [`KvStore`].
#[derive(Clone)]
pub struct RedbKv {
    db: Arc<Database>,
}

impl RedbKv {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "kv store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory kv store opened");
        Ok(store)
    }

    /// Wrap into the shared handle the config stores take.
    pub fn shared(self) -> SharedKv {
        Arc::new(self)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(KV).map_err(map_err!(Table))?;
        txn.open_table(REVISIONS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Write `value` under `key` inside `txn`, stamping a fresh revision.
    fn write_entry(txn: &WriteTransaction, key: &str, value: &[u8]) -> StateResult<u64> {
        let revision = {
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            let last = meta
                .get(REVISION_COUNTER)
                .map_err(map_err!(Read))?
                .map(|g| g.value())
                .unwrap_or(0);
            let next = last + 1;
            meta.insert(REVISION_COUNTER, next).map_err(map_err!(Write))?;
            next
        };
        let mut kv = txn.open_table(KV).map_err(map_err!(Table))?;
        kv.insert(key, value).map_err(map_err!(Write))?;
        let mut revisions = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
        revisions.insert(key, revision).map_err(map_err!(Write))?;
        Ok(revision)
    }
}

impl KvStore for RedbKv {
    fn get(&self, key: &str) -> StateResult<Option<KvPair>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let kv = txn.open_table(KV).map_err(map_err!(Table))?;
        let revisions = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
        let Some(value) = kv.get(key).map_err(map_err!(Read))? else {
            return Ok(None);
        };
        let revision = revisions
            .get(key)
            .map_err(map_err!(Read))?
            .map(|g| g.value())
            .unwrap_or(0);
        Ok(Some(KvPair {
            key: key.to_string(),
            value: value.value().to_vec(),
            revision,
        }))
    }

    fn put(&self, key: &str, value: &[u8]) -> StateResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let revision = Self::write_entry(&txn, key, value)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, revision, "kv put");
        Ok(revision)
    }

    fn put_if(&self, key: &str, value: &[u8], expected: Option<u64>) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let current = {
            let revisions = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
            revisions
                .get(key)
                .map_err(map_err!(Read))?
                .map(|g| g.value())
        };
        if current != expected {
            txn.abort().map_err(map_err!(Transaction))?;
            debug!(%key, ?expected, ?current, "kv conditional put rejected");
            return Ok(false);
        }
        let revision = Self::write_entry(&txn, key, value)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, revision, "kv conditional put");
        Ok(true)
    }

    fn delete(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut kv = txn.open_table(KV).map_err(map_err!(Table))?;
            existed = kv.remove(key).map_err(map_err!(Write))?.is_some();
            let mut revisions = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
            revisions.remove(key).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "kv delete");
        Ok(existed)
    }

    fn delete_prefix(&self, prefix: &str) -> StateResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count;
        {
            let mut kv = txn.open_table(KV).map_err(map_err!(Table))?;
            let mut revisions = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
            // Collect first; the range borrows the table.
            let mut keys = Vec::new();
            for entry in kv.range(prefix..).map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                let key = key.value();
                if !key.starts_with(prefix) {
                    break;
                }
                keys.push(key.to_string());
            }
            for key in &keys {
                kv.remove(key.as_str()).map_err(map_err!(Write))?;
                revisions.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            count = keys.len() as u32;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%prefix, count, "kv subtree deleted");
        Ok(count)
    }

    fn list(&self, prefix: &str) -> StateResult<Vec<KvPair>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let kv = txn.open_table(KV).map_err(map_err!(Table))?;
        let revisions = txn.open_table(REVISIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in kv.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            let revision = revisions
                .get(key)
                .map_err(map_err!(Read))?
                .map(|g| g.value())
                .unwrap_or(0);
            results.push(KvPair {
                key: key.to_string(),
                value: value.value().to_vec(),
                revision,
            });
        }
        Ok(results)
    }
}
