//! Backend selection for a process's stores.
//!
//! Reads:
//! - `STASH_BACKEND` (optional, default: "memory") - one of memory | fs | surreal
//! - `STASH_DATA_DIR` (optional, default: ".stash") - root for fs and local surreal data
//! - `SURREALDB_URL` (optional) - explicit SurrealDB endpoint for the surreal backend

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_DATA_DIR: &str = ".stash";

/// Errors produced while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown backend {0:?} (expected memory, fs or surreal)")]
    UnknownBackend(String),
}

/// Which storage medium backs the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Process memory; nothing survives a restart
    #[default]
    Memory,
    /// Files under `data_dir`
    Fs,
    /// SurrealDB, resolved through `SurrealHandle::setup_from_env`
    Surreal,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" | "in-memory" => Ok(Self::Memory),
            "fs" | "file" | "filesystem" => Ok(Self::Fs),
            "surreal" | "surrealdb" => Ok(Self::Surreal),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Fs => write!(f, "fs"),
            Self::Surreal => write!(f, "surreal"),
        }
    }
}

/// Store configuration for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub surreal_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            surreal_url: None,
        }
    }
}

impl StoreConfig {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_surreal_url(mut self, url: impl Into<String>) -> Self {
        self.surreal_url = Some(url.into());
        self
    }

    /// Create from environment variables (see module docs).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("STASH_BACKEND") {
            Some(raw) => raw.parse()?,
            None => BackendKind::default(),
        };
        let data_dir = lookup("STASH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let surreal_url = lookup("SURREALDB_URL").filter(|u| !u.trim().is_empty());

        Ok(Self {
            backend,
            data_dir,
            surreal_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.data_dir, PathBuf::from(".stash"));
    }

    #[test]
    fn reads_all_variables() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("STASH_BACKEND", "Surreal"),
            ("STASH_DATA_DIR", "/var/lib/stash"),
            ("SURREALDB_URL", "ws://localhost:8000"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::Surreal);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/stash"));
        assert_eq!(config.surreal_url.as_deref(), Some("ws://localhost:8000"));
    }

    #[test]
    fn blank_surreal_url_is_ignored() {
        let config = StoreConfig::from_lookup(lookup(&[("SURREALDB_URL", " ")])).unwrap();
        assert!(config.surreal_url.is_none());
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let err = StoreConfig::from_lookup(lookup(&[("STASH_BACKEND", "redis")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBackend(ref b) if b == "redis"));
    }

    #[test]
    fn backend_kind_display_round_trips() {
        for kind in [BackendKind::Memory, BackendKind::Fs, BackendKind::Surreal] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }
}
