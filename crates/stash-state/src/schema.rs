//! Schema definitions for Session Stash SurrealDB tables
//!
//! Tables:
//! - artifacts: one row per artifact version
//! - memories: one row per ingested memory entry
//!
//! Payloads are stored as JSON text so that every `Part` shape round-trips
//! through SurrealDB unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{Content, Part};
use crate::error::StoreError;
use crate::storage_traits::{IdentityKey, MemoryEntry, Scope, StoreResult};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// One artifact version stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub tenant: String,
    pub user_id: String,
    pub session_id: String,
    /// Logical artifact name
    pub file_name: String,
    /// Dense, 0-based version within `(tenant, user_id, session_id, file_name)`
    pub version: u64,
    /// `Part` encoded as JSON
    pub part_json: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl ArtifactRow {
    pub fn new(key: &IdentityKey, file_name: &str, version: u64, part: &Part) -> StoreResult<Self> {
        Ok(ArtifactRow {
            id: None,
            tenant: key.tenant().to_string(),
            user_id: key.user().to_string(),
            session_id: key.session().to_string(),
            file_name: file_name.to_string(),
            version,
            part_json: serde_json::to_string(part)?,
            created_at: Utc::now(),
        })
    }

    pub fn part(&self) -> StoreResult<Part> {
        serde_json::from_str(&self.part_json).map_err(|e| {
            StoreError::Serialization(format!(
                "artifact {} v{}: {e}",
                self.file_name, self.version
            ))
        })
    }
}

/// Projection used when only the version column is selected
#[derive(Debug, Clone, Deserialize)]
pub struct VersionRow {
    pub version: u64,
}

/// Projection used when only the name column is selected
#[derive(Debug, Clone, Deserialize)]
pub struct FileNameRow {
    pub file_name: String,
}

/// One memory entry stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRow {
    /// SurrealDB record ID, assigned on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub tenant: String,
    pub user_id: String,
    /// Ingestion order within `(tenant, user_id)`
    pub seq: u64,
    pub author: String,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    /// `Content` encoded as JSON
    pub content_json: String,
    /// Lowercased searchable text of the content
    pub text_lower: String,
}

impl MemoryRow {
    pub fn new(scope: &Scope, seq: u64, entry: &MemoryEntry) -> StoreResult<Self> {
        Ok(MemoryRow {
            id: None,
            tenant: scope.tenant().to_string(),
            user_id: scope.user().to_string(),
            seq,
            author: entry.author.clone(),
            timestamp: entry.timestamp,
            content_json: serde_json::to_string(&entry.content)?,
            text_lower: entry.content.text().to_lowercase(),
        })
    }

    pub fn into_entry(self) -> StoreResult<MemoryEntry> {
        let content: Content = serde_json::from_str(&self.content_json)
            .map_err(|e| StoreError::Serialization(format!("memory seq {}: {e}", self.seq)))?;
        Ok(MemoryEntry {
            content,
            author: self.author,
            timestamp: self.timestamp,
        })
    }
}

/// Projection used when only the sequence column is selected
#[derive(Debug, Clone, Deserialize)]
pub struct SeqRow {
    pub seq: u64,
}
