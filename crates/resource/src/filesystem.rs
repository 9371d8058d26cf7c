//! Filesystem-based asset source for native platforms.
//!
//! Serves engine assets (the format blob and friends) out of a local
//! directory, standing in for the web server the assets normally ship from.
//!
//! # Security
//!
//! All resolved paths must remain within the base directory; traversal
//! attempts such as `../../etc/passwd` are reported as `NotFound`. Remote
//! URLs and absolute paths are `InvalidUrl`.

use log::debug;
use quire_traits::{AssetSource, FetchError, SharedAssetData, strip_query};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// An asset source that reads from a local directory.
///
/// The query string of a URL (the build tag) is ignored: a directory holds
/// exactly one build.
#[derive(Debug)]
pub struct FilesystemAssetSource {
    base_path: PathBuf,
    /// Canonicalized base path for security checks
    canonical_base: Option<PathBuf>,
}

impl FilesystemAssetSource {
    /// Creates a source rooted at `base_path`.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base = base_path.as_ref().to_path_buf();
        // May fail if the directory doesn't exist yet
        let canonical = base.canonicalize().ok();
        Self {
            base_path: base,
            canonical_base: canonical,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base_path
    }

    /// Maps a relative URL onto the base directory.
    fn resolve_path_safe(&self, url: &str) -> Result<PathBuf, FetchError> {
        let (path, _) = strip_query(url);
        if path.contains("://") || Path::new(path).is_absolute() {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let outside = || FetchError::NotFound(format!("{} (outside asset directory)", url));
        let full_path = self.base_path.join(path);

        if let Ok(canonical) = full_path.canonicalize()
            && let Some(ref base) = self.canonical_base
        {
            return canonical
                .starts_with(base)
                .then_some(canonical)
                .ok_or_else(outside);
        }

        // Not on disk (yet): fall back to a lexical check
        if Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(outside());
        }

        Ok(full_path)
    }
}

impl AssetSource for FilesystemAssetSource {
    fn fetch(&self, url: &str) -> Result<SharedAssetData, FetchError> {
        let full_path = self.resolve_path_safe(url)?;

        debug!("[ASSETS] Reading {} from {}", url, full_path.display());
        std::fs::read(&full_path).map(Arc::new).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(url.to_string())
            } else {
                FetchError::Io(format!("{}: {}", url, e))
            }
        })
    }

    fn name(&self) -> &'static str {
        "FilesystemAssetSource"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_fetch_existing_asset_ignoring_build_tag() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("lualatex.fmt"), b"FMT").unwrap();

        let source = FilesystemAssetSource::new(dir.path());
        let data = source.fetch("./lualatex.fmt?build=1700000000000").unwrap();
        assert_eq!(&*data, b"FMT");
    }

    #[test]
    fn test_fetch_missing_asset() {
        let dir = tempdir().unwrap();
        let source = FilesystemAssetSource::new(dir.path());

        let result = source.fetch("lualatex.fmt?build=1");
        assert!(matches!(result, Err(FetchError::NotFound(_))));
    }

    #[test]
    fn test_directory_read_is_io_error() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let source = FilesystemAssetSource::new(dir.path());
        match source.fetch("sub?build=2") {
            Err(FetchError::Io(message)) => assert!(message.starts_with("sub?build=2: ")),
            other => panic!("expected an I/O error, got {:?}", other),
        }
    }

    #[test]
    fn test_blocks_path_traversal_and_absolute_paths() {
        let dir = tempdir().unwrap();
        let source = FilesystemAssetSource::new(dir.path());

        assert!(matches!(
            source.fetch("../../../etc/passwd"),
            Err(FetchError::NotFound(_))
        ));
        assert!(matches!(
            source.fetch("foo/../../bar"),
            Err(FetchError::NotFound(_))
        ));
        assert!(matches!(
            source.fetch("/etc/passwd"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            source.fetch("https://cdn.example/lualatex.fmt"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_allows_nested_paths() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("fonts")).unwrap();
        fs::write(dir.path().join("fonts/lm.otf"), b"OTTO").unwrap();

        let source = FilesystemAssetSource::new(dir.path());
        assert_eq!(&*source.fetch("fonts/lm.otf").unwrap(), b"OTTO");
        assert_eq!(source.base(), dir.path());
    }
}
