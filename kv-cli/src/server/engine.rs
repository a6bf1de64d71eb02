//! Wires the `kv-rs` storage stack together: an in-memory map, optionally
//! decorated with a persistence layer when `--out` names a WAL file, with
//! startup replay from `--in`, behind the serializable-store/transactor pair
//! that the TCP and HTTP listeners share.

use std::path::Path;
use std::sync::Arc;

use kv_rs::error::CResult;
use kv_rs::storage::log::{read_all, LogWriter};
use kv_rs::storage::memory::MemoryStore;
use kv_rs::storage::persist::{replay, PersistentStore};
use kv_rs::storage::{Store, TxContext};
use kv_rs::txn::{SerializableStore, Transactor};

/// The in-memory store, optionally decorated with write-ahead logging.
/// `--out` is independent of `--in`: a server can replay a prior log on
/// startup without continuing to log (no `--out`), or log fresh mutations
/// without ever having replayed anything (no `--in`).
pub enum Backing {
    Memory(MemoryStore),
    Persistent(PersistentStore<MemoryStore>),
}

impl Store for Backing {
    fn get(&self, ctx: TxContext, key: &str) -> CResult<String> {
        match self {
            Backing::Memory(m) => m.get(ctx, key),
            Backing::Persistent(p) => p.get(ctx, key),
        }
    }

    fn set(&self, ctx: TxContext, key: &str, value: &str) -> CResult<()> {
        match self {
            Backing::Memory(m) => m.set(ctx, key, value),
            Backing::Persistent(p) => p.set(ctx, key, value),
        }
    }

    fn delete(&self, ctx: TxContext, key: &str) -> CResult<()> {
        match self {
            Backing::Memory(m) => m.delete(ctx, key),
            Backing::Persistent(p) => p.delete(ctx, key),
        }
    }

    fn keys(&self, ctx: TxContext) -> CResult<Vec<String>> {
        match self {
            Backing::Memory(m) => m.keys(ctx),
            Backing::Persistent(p) => p.keys(ctx),
        }
    }

    fn release(&self, ctx: TxContext) {
        match self {
            Backing::Memory(m) => m.release(ctx),
            Backing::Persistent(p) => p.release(ctx),
        }
    }

    fn append_commit(&self, txid: i64) -> CResult<()> {
        match self {
            Backing::Memory(m) => m.append_commit(txid),
            Backing::Persistent(p) => p.append_commit(txid),
        }
    }
}

/// Builds the transactor the listeners share: replays `wal_in` (if given)
/// into a fresh [`MemoryStore`], then wraps it for persistence if `wal_out`
/// names a log to append subsequent mutations to.
pub fn build(
    wal_in: Option<&Path>,
    wal_out: Option<&Path>,
) -> CResult<Arc<Transactor<Backing>>> {
    let memory = MemoryStore::new();

    if let Some(path) = wal_in {
        let records = read_all(path)?;
        log::info!("replaying {} record(s) from {:?}", records.len(), path);
        replay(&memory, records)?;
    }

    let backing = match wal_out {
        Some(path) => {
            let writer = LogWriter::open(path)?;
            log::info!("logging mutations to {:?}", path);
            Backing::Persistent(PersistentStore::new(memory, writer))
        }
        None => Backing::Memory(memory),
    };

    let store = Arc::new(SerializableStore::new(backing));
    Ok(Arc::new(Transactor::new(store)))
}
