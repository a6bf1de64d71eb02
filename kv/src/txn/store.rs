//! The serializable store decorator: requires a transaction id in the
//! ambient context, acquires the appropriate lock, then delegates to the
//! underlying store.
//!
//! Grounded on `original_source/stores/serializable/two-phase-lock.go`
//! (`twoPhaseLockStore`). The source's `Keys` recurses into itself instead
//! of delegating to the wrapped store's `Keys` (almost certainly a typo) —
//! fixed here by calling `self.inner.keys(..)` directly.

use tokio_util::sync::CancellationToken;

use crate::error::{CResult, Error};
use crate::storage::{Store, TxContext};
use crate::txn::lock::LockerMap;

/// Decorates any [`Store`] with strict two-phase locking. Every operation
/// requires a non-zero `txid` in the ambient [`TxContext`]; its absence is
/// a [`Error::NoTransaction`].
pub struct SerializableStore<S> {
    inner: S,
    locks: LockerMap,
}

impl<S: Store> SerializableStore<S> {
    pub fn new(inner: S) -> Self {
        SerializableStore { inner, locks: LockerMap::new() }
    }

    fn require_txid(ctx: TxContext) -> CResult<i64> {
        if ctx.has_transaction() {
            Ok(ctx.txid)
        } else {
            Err(Error::NoTransaction)
        }
    }

    pub async fn get(&self, ctx: TxContext, cancel: &CancellationToken, key: &str) -> CResult<String> {
        let txid = Self::require_txid(ctx)?;
        self.locks.racquire(cancel, txid, key).await?;
        self.inner.get(ctx, key)
    }

    pub async fn set(
        &self,
        ctx: TxContext,
        cancel: &CancellationToken,
        key: &str,
        value: &str,
    ) -> CResult<()> {
        let txid = Self::require_txid(ctx)?;
        self.locks.acquire(cancel, txid, key).await?;
        self.inner.set(ctx, key, value)
    }

    pub async fn delete(&self, ctx: TxContext, cancel: &CancellationToken, key: &str) -> CResult<()> {
        let txid = Self::require_txid(ctx)?;
        self.locks.acquire(cancel, txid, key).await?;
        self.inner.delete(ctx, key)
    }

    /// Snapshots the key list, then `RAcquire`s each key in deterministic
    /// (sorted) order. The snapshot is taken before the locks are held, so
    /// consistency between the two is advisory, not transactional.
    pub async fn keys(&self, ctx: TxContext, cancel: &CancellationToken) -> CResult<Vec<String>> {
        let txid = Self::require_txid(ctx)?;
        let mut keys = self.inner.keys(ctx)?;
        keys.sort();
        for key in &keys {
            self.locks.racquire(cancel, txid, key).await?;
        }
        Ok(keys)
    }

    pub fn release(&self, ctx: TxContext) {
        if ctx.has_transaction() {
            self.locks.release(ctx.txid);
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn append_commit(&self, txid: i64) -> CResult<()> {
        self.inner.append_commit(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    #[tokio::test]
    async fn requires_a_transaction_id() {
        let store = SerializableStore::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let err = store.set(TxContext::NONE, &cancel, "a", "1").await.unwrap_err();
        assert!(matches!(err, Error::NoTransaction));
    }

    #[tokio::test]
    async fn set_then_get_then_release() {
        let store = SerializableStore::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let ctx = TxContext::new(1);
        store.set(ctx, &cancel, "a", "1").await.unwrap();
        assert_eq!(store.get(ctx, &cancel, "a").await.unwrap(), "1");
        store.release(ctx);
    }

    #[tokio::test]
    async fn keys_delegates_to_inner_store_not_itself() {
        let store = SerializableStore::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let ctx = TxContext::new(1);
        store.set(ctx, &cancel, "b", "2").await.unwrap();
        store.set(ctx, &cancel, "a", "1").await.unwrap();
        let keys = store.keys(ctx, &cancel).await.unwrap();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}
