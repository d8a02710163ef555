//! SurrealDB-backed MemoryIndex implementation
//!
//! Entries are `memories` rows ordered by a per-scope `seq`. Matching runs in
//! process through [`QueryTokens`] so every backend answers a query identically.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::handle::SurrealHandle;
use crate::schema::{MemoryRow, SeqRow};
use crate::search::QueryTokens;
use crate::storage_traits::{MemoryEntry, MemoryIndex, Scope, SessionEvent, StoreResult};

/// SurrealDB-backed implementation of [`MemoryIndex`].
pub struct SurrealMemoryIndex {
    handle: SurrealHandle,
    write_lock: Mutex<()>,
}

impl SurrealMemoryIndex {
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

    async fn next_seq(&self, scope: &Scope) -> StoreResult<u64> {
        let mut res = self
            .handle
            .db()
            .query(
                "SELECT seq FROM memories WHERE tenant = $tenant AND user_id = $user_id \
                 ORDER BY seq DESC LIMIT 1",
            )
            .bind(("tenant", scope.tenant().to_string()))
            .bind(("user_id", scope.user().to_string()))
            .await?;

        let rows: Vec<SeqRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(|r| r.seq + 1).unwrap_or(0))
    }

    /// Insert a whole batch in one transaction: every row commits or none do.
    async fn insert_rows(&self, rows: Vec<MemoryRow>) -> StoreResult<()> {
        self.handle
            .db()
            .query("BEGIN TRANSACTION; INSERT INTO memories $rows; COMMIT TRANSACTION;")
            .bind(("rows", rows))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl MemoryIndex for SurrealMemoryIndex {
    async fn ingest(&self, scope: &Scope, events: &[SessionEvent]) -> StoreResult<usize> {
        let entries: Vec<MemoryEntry> =
            events.iter().filter_map(SessionEvent::to_memory_entry).collect();
        if entries.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;
        let first_seq = self.next_seq(scope).await?;
        let rows = entries
            .iter()
            .enumerate()
            .map(|(offset, entry)| MemoryRow::new(scope, first_seq + offset as u64, entry))
            .collect::<StoreResult<Vec<_>>>()?;
        self.insert_rows(rows).await?;

        debug!(scope = %scope, created = entries.len(), first_seq, "memory ingested");
        Ok(entries.len())
    }

    async fn search(&self, scope: &Scope, query: &str) -> StoreResult<Vec<MemoryEntry>> {
        let tokens = QueryTokens::parse(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut res = self
            .handle
            .db()
            .query(
                "SELECT * FROM memories WHERE tenant = $tenant AND user_id = $user_id \
                 ORDER BY seq ASC",
            )
            .bind(("tenant", scope.tenant().to_string()))
            .bind(("user_id", scope.user().to_string()))
            .await?;

        let rows: Vec<MemoryRow> = res.take(0)?;
        rows.into_iter()
            .filter(|row| tokens.matches_lowercase(&row.text_lower))
            .map(MemoryRow::into_entry)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, Role};
    use chrono::{TimeZone, Utc};

    fn scope() -> Scope {
        Scope::new("app", "user1").unwrap()
    }

    fn event(text: &str) -> SessionEvent {
        SessionEvent::new(
            "user",
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
            Content::from_text(text, Role::User),
        )
    }

    fn entry(text: &str) -> MemoryEntry {
        event(text).to_memory_entry().unwrap()
    }

    async fn texts(index: &SurrealMemoryIndex, query: &str) -> Vec<String> {
        index
            .search(&scope(), query)
            .await
            .unwrap()
            .iter()
            .map(|e| e.content.text())
            .collect()
    }

    #[tokio::test]
    async fn batch_with_a_duplicate_seq_commits_nothing() {
        let index = SurrealMemoryIndex::in_memory().await.unwrap();
        let rows = vec![
            MemoryRow::new(&scope(), 0, &entry("batch zero")).unwrap(),
            MemoryRow::new(&scope(), 1, &entry("batch one")).unwrap(),
            MemoryRow::new(&scope(), 1, &entry("batch clash")).unwrap(),
        ];

        let err = index.insert_rows(rows).await.unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
        assert!(texts(&index, "batch").await.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_leaves_earlier_entries_and_seq_intact() {
        let index = SurrealMemoryIndex::in_memory().await.unwrap();
        index.ingest(&scope(), &[event("kept first")]).await.unwrap();

        // A foreign writer already holds seq 0.
        let rows = vec![
            MemoryRow::new(&scope(), 1, &entry("kept never")).unwrap(),
            MemoryRow::new(&scope(), 0, &entry("kept never")).unwrap(),
        ];
        assert!(index.insert_rows(rows).await.is_err());

        assert_eq!(texts(&index, "kept").await, vec!["kept first"]);
        assert_eq!(index.next_seq(&scope()).await.unwrap(), 1);
    }
}
