use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use stash_state::{
    MemoryEntry, MemoryIndex, QueryTokens, Scope, SessionEvent, StoreError, StoreResult,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{path_component, run_blocking};

#[derive(Debug)]
struct MemoryLayout {
    memory_dir: PathBuf,
}

impl MemoryLayout {
    fn new(root: &Path) -> StoreResult<Self> {
        let memory_dir = root.join("memory");
        fs::create_dir_all(&memory_dir)?;
        Ok(Self { memory_dir })
    }

    fn scope_path(&self, scope: &Scope) -> PathBuf {
        self.memory_dir
            .join(path_component(scope.tenant()))
            .join(format!("{}.jsonl", path_component(scope.user())))
    }

    /// Append a batch as whole lines. On failure the file is cut back to its
    /// previous length, so a batch is either fully visible or absent.
    fn append(&self, scope: &Scope, entries: &[MemoryEntry]) -> StoreResult<()> {
        let path = self.scope_path(scope);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let mut buf = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        let start = complete_len(&mut file)?;
        if start < file.metadata()?.len() {
            warn!(path = %path.display(), "dropping torn tail of memory log");
            file.set_len(start)?;
        }

        let written = file
            .seek(SeekFrom::Start(start))
            .and_then(|_| file.write_all(&buf))
            .and_then(|_| file.sync_data());
        if let Err(e) = written {
            file.set_len(start)?;
            return Err(e.into());
        }
        Ok(())
    }

    fn read(&self, scope: &Scope) -> StoreResult<Vec<MemoryEntry>> {
        let path = self.scope_path(scope);
        let mut data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // A final line without its newline is an interrupted append.
        let complete = data.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        if complete < data.len() {
            warn!(path = %path.display(), "ignoring torn tail of memory log");
            data.truncate(complete);
        }

        let mut entries = Vec::new();
        for (lineno, line) in data.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let entry = serde_json::from_slice(line).map_err(|e| {
                StoreError::Serialization(format!("memory line {}: {e}", lineno + 1))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Length of `file` up to and including its last newline.
fn complete_len(file: &mut File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    let mut data = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut data)?;
    Ok(data
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i as u64 + 1))
}

/// Filesystem-backed [`MemoryIndex`]: one JSON-lines file per scope.
pub struct FsMemoryIndex {
    layout: Arc<MemoryLayout>,
    lock: RwLock<()>,
}

impl FsMemoryIndex {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self {
            layout: Arc::new(MemoryLayout::new(root.as_ref())?),
            lock: RwLock::new(()),
        })
    }
}

#[async_trait]
impl MemoryIndex for FsMemoryIndex {
    async fn ingest(&self, scope: &Scope, events: &[SessionEvent]) -> StoreResult<usize> {
        let entries: Vec<MemoryEntry> =
            events.iter().filter_map(SessionEvent::to_memory_entry).collect();
        if entries.is_empty() {
            return Ok(0);
        }
        let created = entries.len();

        let _guard = self.lock.write().await;
        let s = scope.clone();
        run_blocking(&self.layout, move |l| l.append(&s, &entries)).await?;
        debug!(scope = %scope, created, skipped = events.len() - created, "memory ingested");
        Ok(created)
    }

    async fn search(&self, scope: &Scope, query: &str) -> StoreResult<Vec<MemoryEntry>> {
        let tokens = QueryTokens::parse(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.lock.read().await;
        let s = scope.clone();
        let entries = run_blocking(&self.layout, move |l| l.read(&s)).await?;
        Ok(tokens.filter(entries.iter()))
    }
}
