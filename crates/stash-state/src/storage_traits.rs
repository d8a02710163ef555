//! Storage trait definitions for Session Stash
//!
//! These traits define the two stateful stores:
//! - `ArtifactStore`: named, versioned payloads scoped by `IdentityKey`
//! - `MemoryIndex`: keyword-searchable session history scoped by `Scope`
//!
//! All traits are async and backend-agnostic. The in-memory reference
//! implementations live in the `in_memory` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::content::Part;
use crate::error::StoreError;

/// Result type for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

fn require_non_empty(field: &str, value: String) -> StoreResult<String> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// `(tenant, user, session)` key that partitions every stored artifact.
///
/// Fields are private so that every key in circulation has passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    tenant: String,
    user: String,
    session: String,
}

impl IdentityKey {
    /// Build a key. Fails with `InvalidArgument` if any component is blank.
    pub fn new(
        tenant: impl Into<String>,
        user: impl Into<String>,
        session: impl Into<String>,
    ) -> StoreResult<Self> {
        Ok(Self {
            tenant: require_non_empty("tenant", tenant.into())?,
            user: require_non_empty("user", user.into())?,
            session: require_non_empty("session", session.into())?,
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// The `(tenant, user)` memory scope this key belongs to.
    pub fn scope(&self) -> Scope {
        Scope {
            tenant: self.tenant.clone(),
            user: self.user.clone(),
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant, self.user, self.session)
    }
}

/// `(tenant, user)` partition of the memory index. Spans all sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    tenant: String,
    user: String,
}

impl Scope {
    pub fn new(tenant: impl Into<String>, user: impl Into<String>) -> StoreResult<Self> {
        Ok(Self {
            tenant: require_non_empty("tenant", tenant.into())?,
            user: require_non_empty("user", user.into())?,
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant, self.user)
    }
}

// ---------------------------------------------------------------------------
// ArtifactStore: Versioned Artifacts
// ---------------------------------------------------------------------------

/// Reject empty artifact names before touching any backend.
pub fn validate_artifact_name(name: &str) -> StoreResult<()> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidArgument(
            "artifact name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Versioned artifact store.
///
/// Guarantees:
/// - Versions of `(key, name)` are assigned densely from 0, one per `save`,
///   even under concurrent callers.
/// - Prior versions are never mutated or removed.
/// - Different names under one key version independently.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Append a new version of `name` and return its version number.
    async fn save(&self, key: &IdentityKey, name: &str, part: Part) -> StoreResult<u64>;

    /// Load `version` of `name`, or the latest when `version` is `None`.
    ///
    /// Returns `ArtifactNotFound` if `name` was never saved under `key` and
    /// `VersionNotFound` if it was but `version` does not exist.
    async fn load(&self, key: &IdentityKey, name: &str, version: Option<u64>)
        -> StoreResult<Part>;

    /// All artifact names saved under `key`, sorted ascending.
    async fn list(&self, key: &IdentityKey) -> StoreResult<Vec<String>>;

    /// All versions of `name`, ascending. Empty if `name` was never saved.
    async fn versions(&self, key: &IdentityKey, name: &str) -> StoreResult<Vec<u64>>;
}

// ---------------------------------------------------------------------------
// MemoryIndex: Cross-Session Memory
// ---------------------------------------------------------------------------

/// One recorded event of a session, as pushed by the session service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(default = "new_event_id")]
    pub id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub content: Option<Content>,
}

fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl SessionEvent {
    pub fn new(author: impl Into<String>, timestamp: DateTime<Utc>, content: Content) -> Self {
        Self {
            id: new_event_id(),
            author: author.into(),
            timestamp,
            content: Some(content),
        }
    }

    /// Convert into a memory entry, or `None` if the event carries no text.
    pub fn to_memory_entry(&self) -> Option<MemoryEntry> {
        let content = self.content.as_ref().filter(|c| c.has_text())?;
        Some(MemoryEntry {
            content: content.clone(),
            author: self.author.clone(),
            timestamp: self.timestamp,
        })
    }
}

/// An immutable, searchable record derived from a session event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: Content,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

/// Keyword-searchable memory shared by all sessions of a user.
///
/// Semantics:
/// - `ingest` appends one entry per event with non-blank text; others are
///   skipped. Not idempotent.
/// - `search` returns entries whose text contains any query token,
///   case-insensitively, in ingestion order.
/// - No call ever observes entries of a different scope.
#[async_trait]
pub trait MemoryIndex: Send + Sync {
    /// Ingest a batch of events; returns how many entries were created.
    async fn ingest(&self, scope: &Scope, events: &[SessionEvent]) -> StoreResult<usize>;

    /// Entries of `scope` matching any token of `query`.
    async fn search(&self, scope: &Scope, query: &str) -> StoreResult<Vec<MemoryEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Role;

    #[test]
    fn identity_key_rejects_blank_components() {
        assert!(IdentityKey::new("app", "user", "s1").is_ok());
        for (t, u, s) in [("", "u", "s"), ("t", " ", "s"), ("t", "u", "")] {
            let err = IdentityKey::new(t, u, s).unwrap_err();
            assert!(matches!(err, StoreError::InvalidArgument(_)));
        }
    }

    #[test]
    fn identity_key_scope_drops_session() {
        let a = IdentityKey::new("app", "alice", "s1").unwrap();
        let b = IdentityKey::new("app", "alice", "s2").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.scope(), b.scope());
        assert_eq!(a.scope(), Scope::new("app", "alice").unwrap());
        assert_eq!(a.to_string(), "app/alice/s1");
    }

    #[test]
    fn artifact_name_validation() {
        assert!(validate_artifact_name("notes/today.md").is_ok());
        assert!(validate_artifact_name("").is_err());
        assert!(validate_artifact_name("  ").is_err());
    }

    #[test]
    fn events_without_text_yield_no_entry() {
        let now = Utc::now();
        let empty = SessionEvent {
            id: "e1".into(),
            author: "model".into(),
            timestamp: now,
            content: None,
        };
        assert!(empty.to_memory_entry().is_none());

        let blank = SessionEvent::new("model", now, Content::from_text("", Role::Model));
        assert!(blank.to_memory_entry().is_none());

        let entry = SessionEvent::new("user1", now, Content::from_text("hello", Role::User))
            .to_memory_entry()
            .unwrap();
        assert_eq!(entry.author, "user1");
        assert_eq!(entry.timestamp, now);
        assert_eq!(entry.content.text(), "hello");
    }

    #[test]
    fn session_event_id_defaults_when_missing() {
        let event: SessionEvent = serde_json::from_value(serde_json::json!({
            "author": "user1",
            "timestamp": "2025-01-01T10:00:00Z",
            "content": {"role": "user", "parts": [{"type": "text", "text": "hi"}]}
        }))
        .unwrap();
        assert!(!event.id.is_empty());
        assert_eq!(event.content.unwrap().text(), "hi");
    }
}
