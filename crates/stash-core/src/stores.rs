//! Process-scoped store bundle and the per-session view over it.
//!
//! A binary builds one [`Stores`] at start-up (usually via [`Stores::open`])
//! and hands clones to whatever needs them. Tool code then works through
//! [`SessionStores`], which fixes the identity key once:
//!
//! ```no_run
//! # async fn demo() -> stash_state::StoreResult<()> {
//! use stash_core::Stores;
//! use stash_state::{IdentityKey, Part};
//!
//! let stores = Stores::in_memory();
//! let session = stores.session(IdentityKey::new("app", "alice", "s1")?);
//! let version = session.artifacts().save("notes.md", Part::text("hi")).await?;
//! assert_eq!(version, 0);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use stash_state::{
    ArtifactStore, IdentityKey, InMemoryArtifactStore, InMemoryMemoryIndex, MemoryEntry,
    MemoryIndex, Part, SessionEvent, StoreResult, SurrealArtifactStore, SurrealHandle,
    SurrealMemoryIndex,
};
use tracing::{info, Instrument};

use crate::config::{BackendKind, StoreConfig};
use crate::fs::{FsArtifactStore, FsMemoryIndex};
use crate::obs;

/// One artifact store and one memory index, shared behind `Arc`.
#[derive(Clone)]
pub struct Stores {
    artifacts: Arc<dyn ArtifactStore>,
    memory: Arc<dyn MemoryIndex>,
}

impl Stores {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, memory: Arc<dyn MemoryIndex>) -> Self {
        Self { artifacts, memory }
    }

    /// Process-local stores; nothing survives a restart.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(InMemoryMemoryIndex::new()),
        )
    }

    /// Build the backend selected by `config`.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        let stores = match config.backend {
            BackendKind::Memory => Self::in_memory(),
            BackendKind::Fs => Self::new(
                Arc::new(FsArtifactStore::open(&config.data_dir)?),
                Arc::new(FsMemoryIndex::open(&config.data_dir)?),
            ),
            BackendKind::Surreal => {
                let handle =
                    SurrealHandle::setup_from_env(config.surreal_url.as_deref(), &config.data_dir)
                        .await?;
                Self::new(
                    Arc::new(SurrealArtifactStore::new(handle.clone())),
                    Arc::new(SurrealMemoryIndex::new(handle)),
                )
            }
        };
        info!(backend = %config.backend, data_dir = %config.data_dir.display(), "stores opened");
        Ok(stores)
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    pub fn memory(&self) -> &Arc<dyn MemoryIndex> {
        &self.memory
    }

    /// View of both stores bound to one session.
    pub fn session(&self, key: IdentityKey) -> SessionStores {
        SessionStores {
            key,
            stores: self.clone(),
        }
    }
}

/// Both stores bound to one `(tenant, user, session)`.
#[derive(Clone)]
pub struct SessionStores {
    key: IdentityKey,
    stores: Stores,
}

impl SessionStores {
    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn artifacts(&self) -> SessionArtifacts {
        SessionArtifacts {
            key: self.key.clone(),
            store: Arc::clone(&self.stores.artifacts),
        }
    }

    pub fn memory(&self) -> SessionMemory {
        SessionMemory {
            key: self.key.clone(),
            index: Arc::clone(&self.stores.memory),
        }
    }
}

fn logged<T>(operation: &str, result: StoreResult<T>) -> StoreResult<T> {
    result.inspect_err(|e| obs::emit_store_error(operation, e))
}

/// Artifact operations for one session.
#[derive(Clone)]
pub struct SessionArtifacts {
    key: IdentityKey,
    store: Arc<dyn ArtifactStore>,
}

impl SessionArtifacts {
    /// Append a new version of `name`; returns the version assigned.
    pub async fn save(&self, name: &str, part: Part) -> StoreResult<u64> {
        let part_kind = part.kind();
        async {
            let version = logged("artifact.save", self.store.save(&self.key, name, part).await)?;
            obs::emit_artifact_saved(name, version, part_kind);
            Ok(version)
        }
        .instrument(obs::session_span(&self.key))
        .await
    }

    /// Latest version of `name`.
    pub async fn load(&self, name: &str) -> StoreResult<Part> {
        self.load_inner(name, None).await
    }

    pub async fn load_version(&self, name: &str, version: u64) -> StoreResult<Part> {
        self.load_inner(name, Some(version)).await
    }

    async fn load_inner(&self, name: &str, version: Option<u64>) -> StoreResult<Part> {
        async {
            let part = logged(
                "artifact.load",
                self.store.load(&self.key, name, version).await,
            )?;
            obs::emit_artifact_loaded(name, version);
            Ok(part)
        }
        .instrument(obs::session_span(&self.key))
        .await
    }

    pub async fn list(&self) -> StoreResult<Vec<String>> {
        logged("artifact.list", self.store.list(&self.key).await)
    }

    pub async fn versions(&self, name: &str) -> StoreResult<Vec<u64>> {
        logged("artifact.versions", self.store.versions(&self.key, name).await)
    }
}

/// Memory operations for one session; reads and writes the user's scope.
#[derive(Clone)]
pub struct SessionMemory {
    key: IdentityKey,
    index: Arc<dyn MemoryIndex>,
}

impl SessionMemory {
    /// Ingest this session's events into the user's memory.
    pub async fn add_session(&self, events: &[SessionEvent]) -> StoreResult<usize> {
        let scope = self.key.scope();
        async {
            let created = logged("memory.ingest", self.index.ingest(&scope, events).await)?;
            obs::emit_memory_ingested(&scope, events.len(), created);
            Ok(created)
        }
        .instrument(obs::session_span(&self.key))
        .await
    }

    pub async fn search(&self, query: &str) -> StoreResult<Vec<MemoryEntry>> {
        let scope = self.key.scope();
        async {
            let hits = logged("memory.search", self.index.search(&scope, query).await)?;
            obs::emit_memory_searched(&scope, query, hits.len());
            Ok(hits)
        }
        .instrument(obs::session_span(&self.key))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stash_state::{Content, ErrorKind, Role};

    fn key(session: &str) -> IdentityKey {
        IdentityKey::new("app", "alice", session).unwrap()
    }

    #[tokio::test]
    async fn session_views_share_the_bundle() {
        let stores = Stores::in_memory();
        let a = stores.session(key("s1")).artifacts();
        let b = stores.session(key("s1")).artifacts();

        a.save("doc", Part::text("from a")).await.unwrap();
        assert_eq!(b.load("doc").await.unwrap(), Part::text("from a"));
        assert_eq!(b.save("doc", Part::text("from b")).await.unwrap(), 1);
        assert_eq!(a.versions("doc").await.unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let artifacts = Stores::in_memory().session(key("s1")).artifacts();
        let err = artifacts.load_version("nope", 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = artifacts.save("", Part::text("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn memory_is_shared_across_sessions_of_a_user() {
        let stores = Stores::in_memory();
        let event = SessionEvent::new(
            "user",
            Utc::now(),
            Content::from_text("remember the lighthouse", Role::User),
        );
        stores
            .session(key("s1"))
            .memory()
            .add_session(&[event])
            .await
            .unwrap();

        let hits = stores.session(key("s2")).memory().search("lighthouse").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].author, "user");
    }

    #[tokio::test]
    async fn open_fs_backend_in_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(BackendKind::Fs).with_data_dir(dir.path());
        let stores = Stores::open(&config).await.unwrap();
        stores
            .session(key("s1"))
            .artifacts()
            .save("a.txt", Part::text("x"))
            .await
            .unwrap();
        assert!(dir.path().join("objects").is_dir());
        assert!(dir.path().join("artifacts").is_dir());
    }
}
