//! The transaction subsystem: strict two-phase locking, the serializable
//! store decorator built on top of it, the transactor that allocates and
//! finalizes transactions, and the command contract it drives.

pub mod command;
pub mod lock;
pub mod store;
pub mod transactor;

pub use command::Command;
pub use store::SerializableStore;
pub use transactor::Transactor;
