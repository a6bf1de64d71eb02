//! The TCP/HTTP front door for `kv-rs`: configuration, the storage engine
//! these listeners share, line-protocol parsing/rendering, and the two
//! concrete listeners (`tcp`, `http`) themselves.

pub mod config;
pub mod engine;
pub mod http;
pub mod protocol;
pub mod tcp;

pub use config::ConfigLoad;
