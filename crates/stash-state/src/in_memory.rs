//! In-memory reference implementations of the storage traits
//!
//! Provides `InMemoryArtifactStore` and `InMemoryMemoryIndex`. State lives in
//! process memory only and is lost when the store is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::content::Part;
use crate::error::StoreError;
use crate::search::QueryTokens;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// InMemoryArtifactStore
// ---------------------------------------------------------------------------

/// Name → version history (index = version number).
type ArtifactVersions = BTreeMap<String, Vec<Part>>;

/// In-memory artifact store backed by a `HashMap<IdentityKey, name → versions>`.
///
/// `save` holds the write lock while it appends, so the version it returns is
/// always `len - 1` of the history it pushed onto.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<IdentityKey, ArtifactVersions>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(&self, key: &IdentityKey, name: &str, part: Part) -> StoreResult<u64> {
        validate_artifact_name(name)?;
        let mut artifacts = self.artifacts.write().await;
        let history = artifacts
            .entry(key.clone())
            .or_default()
            .entry(name.to_string())
            .or_default();
        history.push(part);
        let version = (history.len() - 1) as u64;
        debug!(key = %key, name, version, "artifact saved");
        Ok(version)
    }

    async fn load(
        &self,
        key: &IdentityKey,
        name: &str,
        version: Option<u64>,
    ) -> StoreResult<Part> {
        let artifacts = self.artifacts.read().await;
        let history = artifacts
            .get(key)
            .and_then(|names| names.get(name))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| StoreError::ArtifactNotFound {
                name: name.to_string(),
            })?;
        match version {
            None => Ok(history[history.len() - 1].clone()),
            Some(v) => usize::try_from(v)
                .ok()
                .and_then(|i| history.get(i))
                .cloned()
                .ok_or_else(|| StoreError::VersionNotFound {
                    name: name.to_string(),
                    version: v,
                }),
        }
    }

    async fn list(&self, key: &IdentityKey) -> StoreResult<Vec<String>> {
        let artifacts = self.artifacts.read().await;
        Ok(artifacts
            .get(key)
            .map(|names| names.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn versions(&self, key: &IdentityKey, name: &str) -> StoreResult<Vec<u64>> {
        let artifacts = self.artifacts.read().await;
        let count = artifacts
            .get(key)
            .and_then(|names| names.get(name))
            .map(Vec::len)
            .unwrap_or(0);
        Ok((0..count as u64).collect())
    }
}

// ---------------------------------------------------------------------------
// InMemoryMemoryIndex
// ---------------------------------------------------------------------------

type ScopeEntries = Arc<RwLock<Vec<MemoryEntry>>>;

/// In-memory memory index with one `RwLock<Vec<MemoryEntry>>` per scope.
///
/// The outer map lock is only held long enough to find or create the scope's
/// collection; ingest and search on different scopes never contend.
#[derive(Debug, Default)]
pub struct InMemoryMemoryIndex {
    scopes: RwLock<HashMap<Scope, ScopeEntries>>,
}

impl InMemoryMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    async fn scope_entries(&self, scope: &Scope) -> Option<ScopeEntries> {
        self.scopes.read().await.get(scope).cloned()
    }

    async fn scope_entries_or_create(&self, scope: &Scope) -> ScopeEntries {
        if let Some(entries) = self.scope_entries(scope).await {
            return entries;
        }
        let mut scopes = self.scopes.write().await;
        scopes.entry(scope.clone()).or_default().clone()
    }
}

#[async_trait]
impl MemoryIndex for InMemoryMemoryIndex {
    async fn ingest(&self, scope: &Scope, events: &[SessionEvent]) -> StoreResult<usize> {
        let new_entries: Vec<MemoryEntry> =
            events.iter().filter_map(SessionEvent::to_memory_entry).collect();
        if new_entries.is_empty() {
            return Ok(0);
        }
        let created = new_entries.len();
        let entries = self.scope_entries_or_create(scope).await;
        entries.write().await.extend(new_entries);
        debug!(scope = %scope, created, skipped = events.len() - created, "memory ingested");
        Ok(created)
    }

    async fn search(&self, scope: &Scope, query: &str) -> StoreResult<Vec<MemoryEntry>> {
        let tokens = QueryTokens::parse(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let Some(entries) = self.scope_entries(scope).await else {
            return Ok(Vec::new());
        };
        let entries = entries.read().await;
        Ok(tokens.filter(entries.iter()))
    }
}
