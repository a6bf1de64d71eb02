//! `kvcli` — the TCP/HTTP front door for `kv-rs` and an interactive client.
//!
//! ## Getting started
//!
//! ```doc
//! ❯ ./kvcli serve
//!
//! ██  ██  █        █
//! ██ ██   ██      ██
//! ███      ██    ██
//! ██ ██     ██  ██
//! ██  ██     ████  KV Storage CLI
//!
//! listening on 127.0.0.1:8888 (tcp), 127.0.0.1:3001 (http)
//! ```
//!
//! ```doc
//! ❯ ./kvcli client
//!
//! kvcli > SET order_key xxx
//! OK
//!
//! kvcli > GET order_key
//! xxx
//!
//! kvcli > DEL order_key
//! OK
//!
//! kvcli > GET order_key
//! (nil)
//! ```

pub mod client;
pub mod rusty;
pub mod server;
pub mod trace;
