use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use stash_state::{
    validate_artifact_name, ArtifactStore, IdentityKey, Part, StoreError, StoreResult,
};
use tokio::sync::Mutex;
use tracing::debug;

use super::{path_component, run_blocking, write_atomic};

const MANIFEST_EXT: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestVersion {
    version: u64,
    digest: String,
    saved_at: DateTime<Utc>,
}

/// Version history of one artifact. `versions[i].version == i` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    name: String,
    versions: Vec<ManifestVersion>,
}

/// Directory layout and the blocking operations on it.
#[derive(Debug)]
struct ArtifactLayout {
    objects_dir: PathBuf,
    artifacts_dir: PathBuf,
}

impl ArtifactLayout {
    fn new(root: &Path) -> StoreResult<Self> {
        let objects_dir = root.join("objects");
        let artifacts_dir = root.join("artifacts");
        fs::create_dir_all(&objects_dir)?;
        fs::create_dir_all(&artifacts_dir)?;
        Ok(Self {
            objects_dir,
            artifacts_dir,
        })
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.objects_dir.join(&digest[..2]).join(&digest[2..])
    }

    fn session_dir(&self, key: &IdentityKey) -> PathBuf {
        self.artifacts_dir
            .join(path_component(key.tenant()))
            .join(path_component(key.user()))
            .join(path_component(key.session()))
    }

    fn manifest_path(&self, key: &IdentityKey, name: &str) -> PathBuf {
        self.session_dir(key)
            .join(format!("{}.{MANIFEST_EXT}", path_component(name)))
    }

    /// Store `data` content-addressed; identical payloads share one blob.
    fn put_blob(&self, data: &[u8]) -> StoreResult<String> {
        let digest = hex::encode(Sha256::digest(data));
        let path = self.blob_path(&digest);
        if !path.exists() {
            write_atomic(&path, data)?;
        }
        Ok(digest)
    }

    fn get_blob(&self, digest: &str) -> StoreResult<Vec<u8>> {
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::Serialization(format!(
                "manifest holds invalid digest {digest:?}"
            )));
        }
        fs::read(self.blob_path(digest)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::Backend(format!("blob {digest} referenced by manifest is missing"))
            } else {
                StoreError::Io(e)
            }
        })
    }

    fn read_manifest(&self, key: &IdentityKey, name: &str) -> StoreResult<Option<Manifest>> {
        read_manifest_file(&self.manifest_path(key, name))
    }

    fn save(&self, key: &IdentityKey, name: &str, part: &Part) -> StoreResult<u64> {
        let payload = serde_json::to_vec(part)?;
        let digest = self.put_blob(&payload)?;

        let mut manifest = self.read_manifest(key, name)?.unwrap_or_else(|| Manifest {
            name: name.to_string(),
            versions: Vec::new(),
        });
        let version = manifest.versions.len() as u64;
        manifest.versions.push(ManifestVersion {
            version,
            digest,
            saved_at: Utc::now(),
        });
        write_atomic(
            &self.manifest_path(key, name),
            &serde_json::to_vec_pretty(&manifest)?,
        )?;
        Ok(version)
    }

    fn load(&self, key: &IdentityKey, name: &str, version: Option<u64>) -> StoreResult<Part> {
        let manifest = self
            .read_manifest(key, name)?
            .filter(|m| !m.versions.is_empty())
            .ok_or_else(|| StoreError::ArtifactNotFound {
                name: name.to_string(),
            })?;
        let entry = match version {
            None => manifest.versions.last(),
            Some(v) => usize::try_from(v)
                .ok()
                .and_then(|i| manifest.versions.get(i)),
        }
        .ok_or_else(|| StoreError::VersionNotFound {
            name: name.to_string(),
            version: version.unwrap_or_default(),
        })?;
        let bytes = self.get_blob(&entry.digest)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn list(&self, key: &IdentityKey) -> StoreResult<Vec<String>> {
        let dir = self.session_dir(key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXT) {
                continue;
            }
            // File names may be digests; the manifest carries the real name.
            if let Some(manifest) = read_manifest_file(&path)? {
                names.push(manifest.name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn versions(&self, key: &IdentityKey, name: &str) -> StoreResult<Vec<u64>> {
        Ok(self
            .read_manifest(key, name)?
            .map(|m| m.versions.iter().map(|v| v.version).collect())
            .unwrap_or_default())
    }
}

fn read_manifest_file(path: &Path) -> StoreResult<Option<Manifest>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Filesystem-backed [`ArtifactStore`].
///
/// Payloads are content-addressed blobs with git-style 2-char sharding; each
/// artifact has a JSON manifest listing its versions. Saves are serialised by
/// an async lock so the manifest read-modify-write cannot interleave within
/// this process. One process per data directory.
pub struct FsArtifactStore {
    layout: Arc<ArtifactLayout>,
    write_lock: Mutex<()>,
}

impl FsArtifactStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self {
            layout: Arc::new(ArtifactLayout::new(root.as_ref())?),
            write_lock: Mutex::new(()),
        })
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn save(&self, key: &IdentityKey, name: &str, part: Part) -> StoreResult<u64> {
        validate_artifact_name(name)?;
        let _guard = self.write_lock.lock().await;
        let (k, n) = (key.clone(), name.to_string());
        let version = run_blocking(&self.layout, move |l| l.save(&k, &n, &part)).await?;
        debug!(key = %key, name, version, "artifact saved");
        Ok(version)
    }

    async fn load(
        &self,
        key: &IdentityKey,
        name: &str,
        version: Option<u64>,
    ) -> StoreResult<Part> {
        let (k, n) = (key.clone(), name.to_string());
        run_blocking(&self.layout, move |l| l.load(&k, &n, version)).await
    }

    async fn list(&self, key: &IdentityKey) -> StoreResult<Vec<String>> {
        let k = key.clone();
        run_blocking(&self.layout, move |l| l.list(&k)).await
    }

    async fn versions(&self, key: &IdentityKey, name: &str) -> StoreResult<Vec<u64>> {
        let (k, n) = (key.clone(), name.to_string());
        run_blocking(&self.layout, move |l| l.versions(&k, &n)).await
    }
}
