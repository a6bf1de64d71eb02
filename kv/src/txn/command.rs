//! The command contract that the protocol layer drives: every client verb
//! (GET, SET, DEL, BEGIN, COMMIT, ROLLBACK, QUIT) becomes a [`Command`],
//! executed once and, for the mutating verbs, capable of being undone.
//!
//! Grounded on `original_source/command.go` and `original_source/commands/*`.
//! The source splits these into several Go interfaces (a small
//! `commands.Command` with just `Execute`, and a larger `kvdb.Command` with
//! `Execute`/`Undo`/`ShouldAutoTransact`) and only ever routes GET through
//! the larger one; SET and DELETE are executed directly by the connection
//! loop without ever reaching the transactor or lock manager. Here every
//! verb is a variant of one enum and all of them carry the full contract, so
//! SET/DEL/GET equally participate in locking, auto-transact and rollback.
//!
//! A tagged union dispatched by `match` stood in for a `Box<dyn Command>`
//! trait object here: no command needs dynamic dispatch across crate
//! boundaries, and a plain enum keeps per-command state (the prior value an
//! undo needs to restore) next to the data instead of behind a trait object.

use tokio_util::sync::CancellationToken;

use crate::error::{CResult, Error};
use crate::storage::{Store, TxContext};
use crate::txn::store::SerializableStore;
use crate::txn::transactor::Transactor;

/// One client request, carrying whatever mutable state its own undo needs.
#[derive(Debug, Clone)]
pub enum Command {
    Get { key: String },
    Set { key: String, value: String, prior: Option<String> },
    Delete { key: String, prior: Option<String> },
    Begin,
    Commit,
    Rollback,
    Quit,
}

/// What running a [`Command`] produced, for the protocol layer to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Ok,
    Value(String),
    Miss,
    Began(i64),
    Closed,
}

impl Command {
    pub fn get(key: impl Into<String>) -> Self {
        Command::Get { key: key.into() }
    }

    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Command::Set { key: key.into(), value: value.into(), prior: None }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Command::Delete { key: key.into(), prior: None }
    }

    /// Whether the transactor should wrap a bare call to this command in its
    /// own transaction when the caller isn't already inside one. GET/SET/DEL
    /// are auto-transactable; BEGIN/COMMIT/ROLLBACK/QUIT manage transaction
    /// state themselves and are never auto-wrapped.
    pub fn should_auto_transact(&self) -> bool {
        matches!(self, Command::Get { .. } | Command::Set { .. } | Command::Delete { .. })
    }

    /// Runs the command under `ctx`, acquiring whatever locks it needs
    /// through `store` and consulting `transactor` for the control verbs.
    pub async fn execute<S: Store>(
        &mut self,
        ctx: TxContext,
        cancel: &CancellationToken,
        store: &SerializableStore<S>,
        transactor: &Transactor<S>,
    ) -> CResult<CommandOutcome> {
        match self {
            Command::Get { key } => match store.get(ctx, cancel, key).await {
                Ok(value) => Ok(CommandOutcome::Value(value)),
                Err(Error::NotFound) => Ok(CommandOutcome::Miss),
                Err(e) => Err(e),
            },
            Command::Set { key, value, prior } => {
                *prior = read_prior(store, ctx, cancel, key).await?;
                store.set(ctx, cancel, key, value).await?;
                Ok(CommandOutcome::Ok)
            }
            Command::Delete { key, prior } => {
                *prior = read_prior(store, ctx, cancel, key).await?;
                store.delete(ctx, cancel, key).await?;
                Ok(CommandOutcome::Ok)
            }
            Command::Begin => Ok(CommandOutcome::Began(transactor.begin(ctx)?)),
            Command::Commit => {
                transactor.commit(ctx)?;
                Ok(CommandOutcome::Ok)
            }
            Command::Rollback => {
                transactor.rollback(ctx).await?;
                Ok(CommandOutcome::Ok)
            }
            Command::Quit => Ok(CommandOutcome::Closed),
        }
    }

    /// Reverses a previously executed command. GET, BEGIN and QUIT never
    /// mutated anything and undo to nothing; SET and DELETE restore or
    /// remove the key's prior value captured at execute time. COMMIT and
    /// ROLLBACK are never pushed onto a transaction's command history, so
    /// they should never reach here.
    pub async fn undo<S: Store>(
        &self,
        ctx: TxContext,
        cancel: &CancellationToken,
        store: &SerializableStore<S>,
    ) -> CResult<()> {
        match self {
            Command::Get { .. } | Command::Begin | Command::Quit => Ok(()),
            Command::Set { key, prior, .. } => restore_prior(store, ctx, cancel, key, prior).await,
            Command::Delete { key, prior } => restore_prior(store, ctx, cancel, key, prior).await,
            Command::Commit | Command::Rollback => {
                Err(Error::Internal("commit/rollback commands are never undone".into()))
            }
        }
    }
}

async fn read_prior<S: Store>(
    store: &SerializableStore<S>,
    ctx: TxContext,
    cancel: &CancellationToken,
    key: &str,
) -> CResult<Option<String>> {
    match store.get(ctx, cancel, key).await {
        Ok(value) => Ok(Some(value)),
        Err(Error::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn restore_prior<S: Store>(
    store: &SerializableStore<S>,
    ctx: TxContext,
    cancel: &CancellationToken,
    key: &str,
    prior: &Option<String>,
) -> CResult<()> {
    match prior {
        Some(value) => store.set(ctx, cancel, key, value).await,
        None => match store.delete(ctx, cancel, key).await {
            Ok(()) | Err(Error::NotFound) => Ok(()),
            Err(e) => Err(e),
        },
    }
}
