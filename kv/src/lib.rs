//! `kv-rs` is a transactional key-value store: an append-only write-ahead
//! log backing an in-memory map, a strict two-phase lock manager, and a
//! transactor that turns a stream of commands into atomic, undoable
//! transactions.
//!
//! ## Getting started
//!
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use kv_rs::storage::memory::MemoryStore;
//! use kv_rs::txn::{Command, SerializableStore, Transactor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(SerializableStore::new(MemoryStore::new()));
//!     let transactor = Transactor::new(store);
//!     let cancel = CancellationToken::new();
//!
//!     transactor
//!         .execute(Default::default(), &cancel, Command::set("a", "1"))
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod codec;
pub mod error;
pub mod record;
pub mod storage;
pub mod txn;
