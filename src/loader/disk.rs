//! On-disk cache for format blobs.
//!
//! Entries are keyed by build version alone. A build version names exactly
//! one format blob, so the cached bytes are trusted without hashing. File
//! names percent-encode the build, which keeps every build in its own file.

use log::{debug, warn};
use quire_resource::encode_component;
use quire_traits::SharedAssetData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FormatDiskCache {
    dir: PathBuf,
}

impl FormatDiskCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for one build version.
    pub fn entry_path(&self, build_id: &str) -> PathBuf {
        self.dir
            .join(format!("lualatex-{}.fmt", encode_component(build_id)))
    }

    /// Returns the cached blob, or `None` on any miss or read failure.
    pub async fn load(&self, build_id: &str) -> Option<SharedAssetData> {
        let path = self.entry_path(build_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("[LOADER] Format cache hit {} ({} bytes)", path.display(), bytes.len());
                Some(Arc::new(bytes))
            }
            Err(e) => {
                debug!("[LOADER] Format cache miss {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Stores a blob. Write failures are logged and otherwise ignored.
    pub async fn store(&self, build_id: &str, blob: &[u8]) {
        let path = self.entry_path(build_id);
        if let Err(e) = self.write_atomic(&path, blob).await {
            warn!("[LOADER] Could not cache format blob at {}: {}", path.display(), e);
        }
    }

    async fn write_atomic(&self, path: &Path, blob: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let partial = path.with_extension("fmt.partial");
        tokio::fs::write(&partial, blob).await?;
        tokio::fs::rename(&partial, path).await?;
        debug!("[LOADER] Cached format blob at {}", path.display());
        Ok(())
    }
}
