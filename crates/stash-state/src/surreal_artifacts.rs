//! SurrealDB-backed ArtifactStore implementation
//!
//! Each version is one `artifacts` row (see `schema::ArtifactRow`).

use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::content::Part;
use crate::error::StoreError;
use crate::handle::SurrealHandle;
use crate::schema::{ArtifactRow, FileNameRow, VersionRow};
use crate::storage_traits::{validate_artifact_name, ArtifactStore, IdentityKey, StoreResult};

const SESSION_FILTER: &str =
    "tenant = $tenant AND user_id = $user_id AND session_id = $session_id";

/// SurrealDB-backed implementation of [`ArtifactStore`].
///
/// Saves in this process are serialised by `write_lock` so that reading the
/// current maximum version and inserting the next one happen as a unit. The
/// unique index on `(.., file_name, version)` rejects any duplicate committed
/// by another process.
pub struct SurrealArtifactStore {
    handle: SurrealHandle,
    write_lock: Mutex<()>,
}

impl SurrealArtifactStore {
    pub fn new(handle: SurrealHandle) -> Self {
        Self {
            handle,
            write_lock: Mutex::new(()),
        }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(SurrealHandle::in_memory().await?))
    }

    // -- private helpers -----------------------------------------------------

    async fn latest_version(&self, key: &IdentityKey, name: &str) -> StoreResult<Option<u64>> {
        let sql = format!(
            "SELECT version FROM artifacts WHERE {SESSION_FILTER} AND file_name = $file_name \
             ORDER BY version DESC LIMIT 1"
        );
        let mut res = self
            .handle
            .db()
            .query(sql)
            .bind(("tenant", key.tenant().to_string()))
            .bind(("user_id", key.user().to_string()))
            .bind(("session_id", key.session().to_string()))
            .bind(("file_name", name.to_string()))
            .await?;

        let rows: Vec<VersionRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(|r| r.version))
    }

    async fn fetch_version(
        &self,
        key: &IdentityKey,
        name: &str,
        version: u64,
    ) -> StoreResult<Option<ArtifactRow>> {
        let sql = format!(
            "SELECT * FROM artifacts WHERE {SESSION_FILTER} AND file_name = $file_name \
             AND version = $version"
        );
        let mut res = self
            .handle
            .db()
            .query(sql)
            .bind(("tenant", key.tenant().to_string()))
            .bind(("user_id", key.user().to_string()))
            .bind(("session_id", key.session().to_string()))
            .bind(("file_name", name.to_string()))
            .bind(("version", version))
            .await?;

        let rows: Vec<ArtifactRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl ArtifactStore for SurrealArtifactStore {
    async fn save(&self, key: &IdentityKey, name: &str, part: Part) -> StoreResult<u64> {
        validate_artifact_name(name)?;
        let _guard = self.write_lock.lock().await;

        let version = match self.latest_version(key, name).await? {
            Some(latest) => latest + 1,
            None => 0,
        };
        let row = ArtifactRow::new(key, name, version, &part)?;

        let _created: Option<ArtifactRow> = self
            .handle
            .db()
            .create("artifacts")
            .content(row)
            .await?;

        debug!(key = %key, name, version, "artifact saved");
        Ok(version)
    }

    async fn load(
        &self,
        key: &IdentityKey,
        name: &str,
        version: Option<u64>,
    ) -> StoreResult<Part> {
        let latest = self
            .latest_version(key, name)
            .await?
            .ok_or_else(|| StoreError::ArtifactNotFound {
                name: name.to_string(),
            })?;
        let wanted = version.unwrap_or(latest);
        if wanted > latest {
            return Err(StoreError::VersionNotFound {
                name: name.to_string(),
                version: wanted,
            });
        }

        let row = self
            .fetch_version(key, name, wanted)
            .await?
            .ok_or_else(|| StoreError::VersionNotFound {
                name: name.to_string(),
                version: wanted,
            })?;
        row.part()
    }

    async fn list(&self, key: &IdentityKey) -> StoreResult<Vec<String>> {
        let sql = format!("SELECT file_name FROM artifacts WHERE {SESSION_FILTER}");
        let mut res = self
            .handle
            .db()
            .query(sql)
            .bind(("tenant", key.tenant().to_string()))
            .bind(("user_id", key.user().to_string()))
            .bind(("session_id", key.session().to_string()))
            .await?;

        let rows: Vec<FileNameRow> = res.take(0)?;
        let names: BTreeSet<String> = rows.into_iter().map(|r| r.file_name).collect();
        Ok(names.into_iter().collect())
    }

    async fn versions(&self, key: &IdentityKey, name: &str) -> StoreResult<Vec<u64>> {
        let sql = format!(
            "SELECT version FROM artifacts WHERE {SESSION_FILTER} AND file_name = $file_name \
             ORDER BY version ASC"
        );
        let mut res = self
            .handle
            .db()
            .query(sql)
            .bind(("tenant", key.tenant().to_string()))
            .bind(("user_id", key.user().to_string()))
            .bind(("session_id", key.session().to_string()))
            .bind(("file_name", name.to_string()))
            .await?;

        let rows: Vec<VersionRow> = res.take(0)?;
        Ok(rows.into_iter().map(|r| r.version).collect())
    }
}
