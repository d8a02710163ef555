//! Filesystem-backed stores.
//!
//! Layout under the data directory:
//!
//! ```text
//! objects/<2 hex>/<62 hex>                         artifact payload blobs (SHA-256)
//! artifacts/<tenant>/<user>/<session>/<name>.json  per-artifact version manifest
//! memory/<tenant>/<user>.jsonl                     memory entries, one per line
//! ```
//!
//! Every tenant, user, session and artifact name becomes a path component
//! through [`path_component`]: hex for short names, a `~`-prefixed SHA-256
//! digest for names whose hex form would not fit in one file name. Either
//! way `/` or `..` inside a name stays a name.

pub mod artifacts;
pub mod memory;

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use stash_state::{StoreError, StoreResult};
use tempfile::NamedTempFile;

pub use artifacts::FsArtifactStore;
pub use memory::FsMemoryIndex;

/// Longest hex component used verbatim. Leaves room for an extension under
/// the common 255-byte file name limit.
const MAX_HEX_COMPONENT: usize = 200;

/// Path-safe, bounded-length encoding of an arbitrary identifier.
///
/// Not reversible for long names; callers that need the original keep it in
/// the file's contents.
pub(crate) fn path_component(raw: &str) -> String {
    let encoded = hex::encode(raw.as_bytes());
    if encoded.len() <= MAX_HEX_COMPONENT {
        encoded
    } else {
        format!("~{}", hex::encode(Sha256::digest(raw.as_bytes())))
    }
}

/// Atomic write: write to a temp file in the same directory, then rename.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let dir = path.parent().ok_or_else(|| {
        StoreError::Backend(format!("path has no parent directory: {}", path.display()))
    })?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_data()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Run blocking filesystem work off the async runtime.
pub(crate) async fn run_blocking<L, T, F>(layout: &Arc<L>, f: F) -> StoreResult<T>
where
    L: Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&L) -> StoreResult<T> + Send + 'static,
{
    let layout = Arc::clone(layout);
    tokio::task::spawn_blocking(move || f(&layout))
        .await
        .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
}
