//! Stash-State: storage layer for Session Stash
//!
//! This crate defines the two stateful stores used by agent runtimes and
//! their backends:
//!
//! - `ArtifactStore`: named, append-only versioned payloads scoped by
//!   `(tenant, user, session)`
//! - `MemoryIndex`: keyword-searchable session history scoped by
//!   `(tenant, user)` and shared across that user's sessions
//!
//! ## Backends
//!
//! - `in_memory`: process-local reference implementations
//! - `SurrealArtifactStore` / `SurrealMemoryIndex`: SurrealDB persistence
//!   (`mem://`, `surrealkv://`, or a remote endpoint via `SurrealHandle`)

pub mod content;
mod error;
mod handle;
pub mod in_memory;
mod migrations;
mod schema;
pub mod search;
pub mod storage_traits;
pub mod surreal_artifacts;
pub mod surreal_memory;

pub use content::{Content, Part, Role};
pub use error::{ErrorKind, StoreError};
pub use handle::{AuthLevel, CloudConfig, SurrealHandle};
pub use in_memory::{InMemoryArtifactStore, InMemoryMemoryIndex};
pub use search::QueryTokens;
pub use storage_traits::{
    validate_artifact_name, ArtifactStore, IdentityKey, MemoryEntry, MemoryIndex, Scope,
    SessionEvent, StoreResult,
};
pub use surreal_artifacts::SurrealArtifactStore;
pub use surreal_memory::SurrealMemoryIndex;
