//! Per-key shared/exclusive locks with FIFO waiter queues.
//!
//! Grounded directly on `original_source/stores/serializable/key-locker.go`
//! (`lockerMap`, `keyLocker`, `waiter`), translated from `sync.Mutex` +
//! `chan struct{}` to `std::sync::Mutex` guarding plain state plus a
//! `tokio::sync::oneshot` channel per waiter, delivered exactly once and
//! observed under the same mutex that protects the queues so a cancelling
//! waiter can never miss a concurrently-delivered wake-up.
//!
//! Two bugs in the source are fixed here rather than carried forward:
//! `RAcquire`'s cancellation path now re-takes the locker mutex before
//! mutating `waitingReaders` (the source mutates it unlocked), and `Release`
//! wakes *either* every queued reader *or* one queued writer, never both in
//! the same event.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{CResult, Error};

struct Waiter {
    txid: i64,
    ready: oneshot::Sender<()>,
}

struct KeyLockerState {
    active_transactions: HashSet<i64>,
    write_lock_txid: i64,
    waiting_readers: Vec<Waiter>,
    waiting_writers: Vec<Waiter>,
}

impl KeyLockerState {
    fn new() -> Self {
        KeyLockerState {
            active_transactions: HashSet::new(),
            write_lock_txid: 0,
            waiting_readers: Vec::new(),
            waiting_writers: Vec::new(),
        }
    }
}

struct KeyLocker {
    state: Mutex<KeyLockerState>,
}

impl KeyLocker {
    fn new() -> Self {
        KeyLocker { state: Mutex::new(KeyLockerState::new()) }
    }
}

struct LockerMapState {
    lockers: HashMap<String, Arc<KeyLocker>>,
    tx_keys: HashMap<i64, Vec<String>>,
}

/// Maps keys to their [`KeyLocker`] and transactions to the ordered list of
/// keys they have touched, for bulk release. Guarded by its own mutex,
/// separate from the per-key mutexes, to keep top-level contention cheap.
pub struct LockerMap {
    inner: Mutex<LockerMapState>,
}

impl LockerMap {
    pub fn new() -> Self {
        LockerMap {
            inner: Mutex::new(LockerMapState { lockers: HashMap::new(), tx_keys: HashMap::new() }),
        }
    }

    fn key_locker(&self, key: &str) -> Arc<KeyLocker> {
        let mut state = self.inner.lock().expect("lockermap mutex poisoned");
        state.lockers.entry(key.to_string()).or_insert_with(|| Arc::new(KeyLocker::new())).clone()
    }

    fn record_tx_key(&self, txid: i64, key: &str) {
        let mut state = self.inner.lock().expect("lockermap mutex poisoned");
        state.tx_keys.entry(txid).or_default().push(key.to_string());
    }

    /// Obtains an exclusive lock on `key` for `txid`, blocking (without
    /// spinning) until it is available or `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken, txid: i64, key: &str) -> CResult<()> {
        let locker = self.key_locker(key);

        loop {
            let wait = {
                let mut st = locker.state.lock().expect("keylocker mutex poisoned");

                if st.write_lock_txid == txid {
                    return Ok(());
                }

                if st.active_transactions.is_empty() {
                    st.active_transactions.insert(txid);
                    st.write_lock_txid = txid;
                    drop(st);
                    self.record_tx_key(txid, key);
                    return Ok(());
                }

                if st.active_transactions.len() == 1 && st.active_transactions.contains(&txid) {
                    st.write_lock_txid = txid;
                    return Ok(());
                }

                let (tx, rx) = oneshot::channel();
                st.waiting_writers.push(Waiter { txid, ready: tx });
                rx
            };

            wait_or_cancel(&locker, cancel, txid, wait, false).await?;
        }
    }

    /// Obtains a shared lock on `key` for `txid`. Writer-preference unless
    /// `txid` already holds a shared lock on this key (reentrancy).
    pub async fn racquire(&self, cancel: &CancellationToken, txid: i64, key: &str) -> CResult<()> {
        let locker = self.key_locker(key);

        loop {
            let wait = {
                let mut st = locker.state.lock().expect("keylocker mutex poisoned");

                if st.write_lock_txid == txid {
                    return Ok(());
                }

                let already_holds_shared = st.active_transactions.contains(&txid);
                if st.write_lock_txid == 0 && (already_holds_shared || st.waiting_writers.is_empty())
                {
                    st.active_transactions.insert(txid);
                    drop(st);
                    self.record_tx_key(txid, key);
                    return Ok(());
                }

                let (tx, rx) = oneshot::channel();
                st.waiting_readers.push(Waiter { txid, ready: tx });
                rx
            };

            wait_or_cancel(&locker, cancel, txid, wait, true).await?;
        }
    }

    /// Releases every lock held by `txid`, waking the appropriate waiters
    /// on each key, then forgets the transaction's key-set.
    pub fn release(&self, txid: i64) {
        let keys = {
            let mut state = self.inner.lock().expect("lockermap mutex poisoned");
            state.tx_keys.remove(&txid).unwrap_or_default()
        };

        for key in &keys {
            let locker = self.key_locker(key);
            let mut st = locker.state.lock().expect("keylocker mutex poisoned");
            st.active_transactions.remove(&txid);

            if st.write_lock_txid == txid {
                st.write_lock_txid = 0;
                if !st.waiting_readers.is_empty() {
                    for w in st.waiting_readers.drain(..) {
                        let _ = w.ready.send(());
                    }
                } else if !st.waiting_writers.is_empty() {
                    let w = st.waiting_writers.remove(0);
                    let _ = w.ready.send(());
                }
            } else if st.active_transactions.is_empty() && !st.waiting_writers.is_empty() {
                let w = st.waiting_writers.remove(0);
                let _ = w.ready.send(());
            }
        }
    }
}

impl Default for LockerMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Awaits `wait` (the waiter's one-shot ready signal) or `cancel`, whichever
/// comes first. On cancellation, re-acquires the locker mutex before
/// removing `txid` from the appropriate queue.
async fn wait_or_cancel(
    locker: &KeyLocker,
    cancel: &CancellationToken,
    txid: i64,
    wait: oneshot::Receiver<()>,
    is_reader: bool,
) -> CResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => {
            let mut st = locker.state.lock().expect("keylocker mutex poisoned");
            if is_reader {
                if let Some(pos) = st.waiting_readers.iter().position(|w| w.txid == txid) {
                    st.waiting_readers.remove(pos);
                }
            } else if let Some(pos) = st.waiting_writers.iter().position(|w| w.txid == txid) {
                st.waiting_writers.remove(pos);
            }
            Err(Error::Cancelled)
        }
        _ = wait => Ok(()),
    }
}
