//! Session Stash Core Library
//!
//! Wires the storage traits from `stash-state` into something a runtime can
//! hold: a configured [`Stores`] bundle, a per-session facade that logs every
//! operation, filesystem backends, and tracing setup for binaries.

pub mod config;
pub mod fs;
pub mod obs;
pub mod stores;
pub mod telemetry;

pub use config::{BackendKind, ConfigError, StoreConfig, DEFAULT_DATA_DIR};
pub use fs::{FsArtifactStore, FsMemoryIndex};
pub use stores::{SessionArtifacts, SessionMemory, SessionStores, Stores};
pub use telemetry::init_tracing;
