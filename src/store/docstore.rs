use std::path::Path;

use rocksdb::{
    Direction, IteratorMode, OptimisticTransactionDB, OptimisticTransactionOptions, Options,
    Transaction, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::contracts::CoreError;
use crate::store::retry::is_transient_kind;

/// Key prefix for counter records
const SEQ_PREFIX: &str = "seq";

/// Embedded document store over optimistic transactions.
///
/// Documents are JSON values keyed `{collection}:{id:016x}`; counter and
/// unique-index entries hold big-endian u64 values. Every access goes through
/// a snapshot transaction. Commit validation detects write-write conflicts
/// with concurrently committed transactions and surfaces them as
/// `CoreError::TransientConflict`, so races resolve first-committer-wins.
#[derive(Debug)]
pub struct DocStore {
    db: OptimisticTransactionDB,
}

impl DocStore {
    /// Opens or creates the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Compression: LZ4 is fast with decent compression
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // Parallelism: use available CPU cores
        let parallelism = std::thread::available_parallelism()
            .map(|p| p.get() as i32)
            .unwrap_or(4);
        opts.increase_parallelism(parallelism);

        let db = OptimisticTransactionDB::open(&opts, path)
            .map_err(|e| CoreError::ConnectionFailure(e.to_string()))?;

        tracing::info!(path = %path.display(), "opened document store");
        Ok(Self { db })
    }

    /// Begins a transaction with a consistent snapshot.
    ///
    /// Writes are invisible to other transactions until commit; within the
    /// transaction reads see its own writes. Dropping the returned value
    /// without committing discards all of its writes.
    pub fn begin(&self) -> Txn<'_> {
        let write_opts = WriteOptions::default();
        let mut txn_opts = OptimisticTransactionOptions::default();
        txn_opts.set_snapshot(true);
        Txn {
            inner: self.db.transaction_opt(&write_opts, &txn_opts),
        }
    }
}

/// Builds a document key.
fn doc_key(collection: &str, id: u64) -> String {
    format!("{}:{:016x}", collection, id)
}

/// Builds a counter key.
fn seq_key(counter: &str) -> String {
    format!("{}:{}", SEQ_PREFIX, counter)
}

fn map_store_err(e: rocksdb::Error) -> CoreError {
    if is_transient_kind(e.kind()) {
        CoreError::TransientConflict(e.to_string())
    } else {
        CoreError::Storage(e.to_string())
    }
}

fn map_codec_err(e: serde_json::Error) -> CoreError {
    CoreError::Serialization(e.to_string())
}

/// Parses a u64 from big-endian bytes.
fn parse_u64_be(bytes: &[u8]) -> Result<u64, CoreError> {
    bytes
        .try_into()
        .map(u64::from_be_bytes)
        .map_err(|_| CoreError::Serialization("invalid u64 bytes".into()))
}

/// Parses the id from a document key suffix (after `{collection}:`).
fn parse_hex_id(bytes: &[u8]) -> Result<u64, CoreError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| u64::from_str_radix(s, 16).ok())
        .ok_or_else(|| CoreError::Serialization("invalid document key".into()))
}

/// A single snapshot transaction against the store.
pub struct Txn<'db> {
    inner: Transaction<'db, OptimisticTransactionDB>,
}

impl Txn<'_> {
    /// Reads a document without guarding it against concurrent modification.
    pub fn get_doc<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: u64,
    ) -> Result<Option<T>, CoreError> {
        match self.inner.get(doc_key(collection, id)).map_err(map_store_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(map_codec_err)?)),
            None => Ok(None),
        }
    }

    /// Reads a document and records the read for commit-time conflict
    /// validation. Guarded conditional updates must use this, not `get_doc`:
    /// the guard is what makes races resolve first-committer-wins instead of
    /// trusting a stale pre-transaction read.
    pub fn get_doc_for_update<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: u64,
    ) -> Result<Option<T>, CoreError> {
        match self
            .inner
            .get_for_update(doc_key(collection, id), true)
            .map_err(map_store_err)?
        {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(map_codec_err)?)),
            None => Ok(None),
        }
    }

    pub fn put_doc<T: Serialize>(
        &self,
        collection: &str,
        id: u64,
        doc: &T,
    ) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(doc).map_err(map_codec_err)?;
        self.inner
            .put(doc_key(collection, id), bytes)
            .map_err(map_store_err)
    }

    pub fn delete_doc(&self, collection: &str, id: u64) -> Result<(), CoreError> {
        self.inner
            .delete(doc_key(collection, id))
            .map_err(map_store_err)
    }

    /// Scans every document in a collection in id order.
    pub fn scan<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<(u64, T)>, CoreError> {
        let prefix = format!("{}:", collection);
        let mut out = Vec::new();

        let iter = self.inner.iterator(IteratorMode::From(
            prefix.as_bytes(),
            Direction::Forward,
        ));

        for item in iter {
            let (key, value) = item.map_err(map_store_err)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let id = parse_hex_id(&key[prefix.len()..])?;
            let doc = serde_json::from_slice(&value).map_err(map_codec_err)?;
            out.push((id, doc));
        }

        Ok(out)
    }

    /// Reads a unique-index entry.
    pub fn get_index(&self, key: &str) -> Result<Option<u64>, CoreError> {
        match self.inner.get(key).map_err(map_store_err)? {
            Some(bytes) => Ok(Some(parse_u64_be(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Guarded read of a unique-index entry. Two transactions that both read
    /// the entry as absent and insert it cannot both commit.
    pub fn get_index_for_update(&self, key: &str) -> Result<Option<u64>, CoreError> {
        match self.inner.get_for_update(key, true).map_err(map_store_err)? {
            Some(bytes) => Ok(Some(parse_u64_be(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_index(&self, key: &str, id: u64) -> Result<(), CoreError> {
        self.inner
            .put(key, id.to_be_bytes())
            .map_err(map_store_err)
    }

    pub fn delete_index(&self, key: &str) -> Result<(), CoreError> {
        self.inner.delete(key).map_err(map_store_err)
    }

    /// Reads a counter record.
    pub fn get_counter(&self, counter: &str) -> Result<Option<u64>, CoreError> {
        match self.inner.get(seq_key(counter)).map_err(map_store_err)? {
            Some(bytes) => Ok(Some(parse_u64_be(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Writes a counter record.
    pub fn put_counter(&self, counter: &str, value: u64) -> Result<(), CoreError> {
        self.inner
            .put(seq_key(counter), value.to_be_bytes())
            .map_err(map_store_err)
    }

    /// Commits the transaction, making all of its writes atomically and
    /// durably visible. A conflict with a concurrently committed transaction
    /// surfaces as `TransientConflict`.
    pub fn commit(self) -> Result<(), CoreError> {
        self.inner.commit().map_err(map_store_err)
    }
}
