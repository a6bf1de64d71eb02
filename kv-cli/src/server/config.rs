//! Server/client configuration: TCP and HTTP bind addresses, the optional
//! `--in`/`--out` WAL paths, and logging knobs. Loaded from an optional YAML
//! file via `confy` and overridable by CLI flags, in the style of the
//! teacher's `ConfigLoad::new` / `Args` precedence.

use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_PROMPT: &str = "kvcli";
const DEFAULT_TCP_ADDR: &str = "127.0.0.1:8888";
const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3001";

/// Server-side configuration: where to listen, and where the write-ahead
/// log lives. `wal_in`/`wal_out` mirror `spec.md` §6's `--in`/`--out` flags
/// and are independent of each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLoad {
    /// TCP bind address for the line protocol, default `127.0.0.1:8888`.
    pub tcp_addr: Option<String>,

    /// HTTP bind address for the REST-ish interface, default `127.0.0.1:3001`.
    pub http_addr: Option<String>,

    /// Disables the HTTP listener entirely when `true`.
    pub http_disabled: Option<bool>,

    /// Log at startup, replaying this WAL into the initial store.
    pub wal_in: Option<PathBuf>,

    /// Append subsequent mutations to this WAL.
    pub wal_out: Option<PathBuf>,

    /// `log::LevelFilter` name (`trace`/`debug`/`info`/`warn`/`error`).
    pub log_level: Option<String>,

    /// Directory the rolling log file is written under.
    pub log_dir: Option<String>,

    /// REPL prompt string.
    pub prompt: Option<String>,
}

impl Default for ConfigLoad {
    fn default() -> Self {
        ConfigLoad {
            tcp_addr: Some(DEFAULT_TCP_ADDR.to_string()),
            http_addr: Some(DEFAULT_HTTP_ADDR.to_string()),
            http_disabled: Some(false),
            wal_in: None,
            wal_out: None,
            log_level: Some("info".to_string()),
            log_dir: None,
            prompt: Some(DEFAULT_PROMPT.to_string()),
        }
    }
}

impl ConfigLoad {
    /// Loads `path` via `confy`, falling back to defaults if the file is
    /// absent (confy creates it on first save; a missing path is not an
    /// error here since every field already has a sensible default).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        match confy::load_path::<ConfigLoad>(path) {
            Ok(cfg) => Ok(cfg),
            Err(_) => Ok(ConfigLoad::default()),
        }
    }

    pub fn tcp_addr(&self) -> &str {
        self.tcp_addr.as_deref().unwrap_or(DEFAULT_TCP_ADDR)
    }

    pub fn http_addr(&self) -> &str {
        self.http_addr.as_deref().unwrap_or(DEFAULT_HTTP_ADDR)
    }

    pub fn http_enabled(&self) -> bool {
        !self.http_disabled.unwrap_or(false)
    }

    pub fn log_dir(&self) -> String {
        self.log_dir.clone().unwrap_or_else(|| {
            format!("{}/.kvcli", std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
        })
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_spec_ports() {
        let cfg = ConfigLoad::default();
        assert_eq!(cfg.tcp_addr(), "127.0.0.1:8888");
        assert_eq!(cfg.http_addr(), "127.0.0.1:3001");
        assert!(cfg.http_enabled());
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = ConfigLoad::new("/nonexistent/kvdb.yaml").unwrap();
        assert_eq!(cfg.tcp_addr(), "127.0.0.1:8888");
    }
}
