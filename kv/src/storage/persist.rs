//! The persistence decorator: logs a mutation to the write-ahead log before
//! applying it to the wrapped store, and a replay routine that rebuilds a
//! store's state from a log stream.
//!
//! Grounded in `original_source/stores/persist.go` (`withPersistence`,
//! `applyRecord`, `FromPersistence`), translated from Go's decorator-over-
//! interface to a decorator over a `Store` trait object.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::CResult;
use crate::record::{Record, RecordKind};
use crate::storage::log::LogWriter;
use crate::storage::{Store, TxContext};

/// Wraps a [`Store`], appending a [`Record`] to the WAL before every `Set`
/// and `Delete`. If the log append fails the mutation is not applied.
pub struct PersistentStore<S> {
    inner: S,
    writer: Mutex<LogWriter>,
}

impl<S: Store> PersistentStore<S> {
    pub fn new(inner: S, writer: LogWriter) -> Self {
        PersistentStore { inner, writer: Mutex::new(writer) }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Store> Store for PersistentStore<S> {
    fn get(&self, ctx: TxContext, key: &str) -> CResult<String> {
        self.inner.get(ctx, key)
    }

    fn set(&self, ctx: TxContext, key: &str, value: &str) -> CResult<()> {
        let record = Record::set(ctx.txid, key, value);
        self.writer.lock()?.append(&record)?;
        self.inner.set(ctx, key, value)
    }

    fn delete(&self, ctx: TxContext, key: &str) -> CResult<()> {
        let record = Record::delete(ctx.txid, key);
        self.writer.lock()?.append(&record)?;
        self.inner.delete(ctx, key)
    }

    fn keys(&self, ctx: TxContext) -> CResult<Vec<String>> {
        self.inner.keys(ctx)
    }

    fn release(&self, ctx: TxContext) {
        self.inner.release(ctx)
    }

    /// Appends a `COMMIT` record for `txid` so that replay can flush the
    /// transaction's buffered records.
    fn append_commit(&self, txid: i64) -> CResult<()> {
        self.writer.lock()?.append(&Record::commit(txid))
    }
}

/// Rebuilds `store`'s state by walking `records` in order. `SET`/`DEL`
/// records with a non-zero `txid` are buffered until a matching `COMMIT` is
/// seen; records still pending at stream end belong to transactions that
/// never committed and are discarded. Idempotent over the same log prefix.
pub fn replay<S: Store>(store: &S, records: impl IntoIterator<Item = Record>) -> CResult<()> {
    let mut pending: HashMap<i64, Vec<Record>> = HashMap::new();

    for record in records {
        apply_record(store, &mut pending, record);
    }

    if !pending.is_empty() {
        log::warn!(
            "discarding {} uncommitted transaction(s) at end of log replay",
            pending.len()
        );
    }

    Ok(())
}

fn apply_record<S: Store>(store: &S, pending: &mut HashMap<i64, Vec<Record>>, record: Record) {
    match record.kind {
        RecordKind::Set | RecordKind::Delete if record.txid != 0 => {
            pending.entry(record.txid).or_default().push(record);
        }
        RecordKind::Set => {
            if let Err(e) = store.set(TxContext::NONE, &record.key, &record.value) {
                log::warn!("failed to replay set record: {}", e);
            }
        }
        RecordKind::Delete => {
            if let Err(e) = store.delete(TxContext::NONE, &record.key) {
                log::warn!("failed to replay delete record: {}", e);
            }
        }
        RecordKind::Commit => {
            if let Some(buffered) = pending.remove(&record.txid) {
                for mut r in buffered {
                    r.txid = 0;
                    apply_record(store, pending, r);
                }
            }
            // A COMMIT with no pending entries is a no-op.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    #[test]
    fn committed_transaction_survives_replay() {
        let store = MemoryStore::new();
        let records = vec![Record::set(1, "a", "1"), Record::set(1, "b", "2"), Record::commit(1)];
        replay(&store, records).unwrap();
        assert_eq!(store.get(TxContext::NONE, "a").unwrap(), "1");
        assert_eq!(store.get(TxContext::NONE, "b").unwrap(), "2");
    }

    #[test]
    fn uncommitted_transaction_is_discarded() {
        let store = MemoryStore::new();
        let records = vec![Record::set(1, "a", "1")];
        replay(&store, records).unwrap();
        assert!(store.get(TxContext::NONE, "a").is_err());
    }

    #[test]
    fn autocommitted_records_apply_immediately() {
        let store = MemoryStore::new();
        let records = vec![Record::set(0, "a", "1"), Record::delete(0, "a")];
        replay(&store, records).unwrap();
        assert!(store.get(TxContext::NONE, "a").is_err());
    }

    #[test]
    fn commit_with_no_pending_entries_is_a_no_op() {
        let store = MemoryStore::new();
        let records = vec![Record::commit(42)];
        replay(&store, records).unwrap();
        assert_eq!(store.keys(TxContext::NONE).unwrap().len(), 0);
    }

    #[test]
    fn replay_is_idempotent_over_the_same_prefix() {
        let store = MemoryStore::new();
        let records = vec![Record::set(1, "a", "1"), Record::commit(1)];
        replay(&store, records.clone()).unwrap();
        replay(&store, records).unwrap();
        assert_eq!(store.get(TxContext::NONE, "a").unwrap(), "1");
    }

    #[test]
    fn persistent_store_logs_before_applying() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let writer = crate::storage::log::LogWriter::open(&path).unwrap();
        let store = PersistentStore::new(MemoryStore::new(), writer);

        store.set(TxContext::new(1), "a", "1").unwrap();
        store.append_commit(1).unwrap();

        let records = crate::storage::log::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "a");
        assert_eq!(records[1].kind, RecordKind::Commit);
    }
}
