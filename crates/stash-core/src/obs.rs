//! Structured observability hooks for store operations.
//!
//! This module provides:
//! - Session-scoped tracing spans via [`session_span`]
//! - Emission functions for store lifecycle events: artifact save/load,
//!   memory ingest/search, and operation failures

use stash_state::{IdentityKey, Scope, StoreError};
use tracing::info;

/// Span tagging everything inside it with the session's identity.
///
/// Attach it to async work with `tracing::Instrument::instrument` rather than
/// entering it, so the resulting future stays `Send`.
pub fn session_span(key: &IdentityKey) -> tracing::Span {
    tracing::info_span!(
        "stash.session",
        tenant = %key.tenant(),
        user = %key.user(),
        session = %key.session(),
    )
}

pub fn emit_artifact_saved(name: &str, version: u64, part_kind: &str) {
    info!(event = "artifact.saved", name = %name, version = version, part_kind = %part_kind);
}

pub fn emit_artifact_loaded(name: &str, version: Option<u64>) {
    info!(event = "artifact.loaded", name = %name, version = ?version);
}

pub fn emit_memory_ingested(scope: &Scope, received: usize, created: usize) {
    info!(
        event = "memory.ingested",
        scope = %scope,
        received = received,
        created = created,
    );
}

pub fn emit_memory_searched(scope: &Scope, query: &str, hits: usize) {
    info!(event = "memory.searched", scope = %scope, query = %query, hits = hits);
}

/// Emit event: a store operation failed (warning level).
pub fn emit_store_error(operation: &str, error: &StoreError) {
    tracing::warn!(
        event = "store.error",
        operation = %operation,
        kind = %error.kind(),
        retryable = error.is_retryable(),
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_span_enter_and_emit() {
        let key = IdentityKey::new("app", "user", "s1").unwrap();
        let _entered = session_span(&key).entered();
        emit_artifact_saved("a.txt", 0, "text");
        emit_store_error("load", &StoreError::ArtifactNotFound { name: "a.txt".into() });
    }
}
