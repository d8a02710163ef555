//! SurrealDB schema migrations and initialization
//!
//! Defines the `artifacts` and `memories` tables with the unique indexes that
//! back the version and ingestion-order invariants.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::storage_traits::StoreResult;

/// Initialize all Session Stash tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StoreResult<()> {
    info!("Initializing Session Stash SurrealDB schema");

    init_artifacts_table(db).await?;
    init_memories_table(db).await?;

    info!("Session Stash schema initialization complete");
    Ok(())
}

/// Initialize `artifacts` table
///
/// Schema:
/// ```text
/// TABLE artifacts {
///   tenant:      STRING
///   user_id:     STRING
///   session_id:  STRING
///   file_name:   STRING
///   version:     INT (0-based, dense per artifact)
///   part_json:   STRING
///   created_at:  DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(tenant, user_id, session_id, file_name, version)` is unique, so two
///   writers can never commit the same version
/// - rows are never updated or deleted
async fn init_artifacts_table(db: &Surreal<Any>) -> StoreResult<()> {
    debug!("Initializing artifacts table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS artifacts AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_artifact_version ON TABLE artifacts
            COLUMNS tenant, user_id, session_id, file_name, version UNIQUE;

        DEFINE INDEX IF NOT EXISTS idx_artifact_session ON TABLE artifacts
            COLUMNS tenant, user_id, session_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ artifacts table initialized");
    Ok(())
}

/// Initialize `memories` table
///
/// Schema:
/// ```text
/// TABLE memories {
///   tenant:       STRING
///   user_id:      STRING
///   seq:          INT (ingestion order within scope)
///   author:       STRING
///   timestamp:    DATETIME
///   content_json: STRING
///   text_lower:   STRING
/// }
/// ```
///
/// Constraints:
/// - `(tenant, user_id, seq)` is unique
/// - rows are never updated or deleted
async fn init_memories_table(db: &Surreal<Any>) -> StoreResult<()> {
    debug!("Initializing memories table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS memories AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_memory_seq ON TABLE memories
            COLUMNS tenant, user_id, seq UNIQUE;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ memories table initialized");
    Ok(())
}
