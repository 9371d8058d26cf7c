//! AssetSource trait for abstracting support-file retrieval.
//!
//! The engine loader fetches the engine module descriptor and the precompiled
//! format blob through this trait, so the same loader works against a local
//! directory, an in-memory store, or a remote delivery layer.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Error type for asset retrieval.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("fetch failed for '{url}': {message}")]
    Failed { url: String, message: String },

    #[error("Invalid resource URL: {0}")]
    InvalidUrl(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Shared asset data type (reference-counted bytes).
pub type SharedAssetData = Arc<Vec<u8>>;

/// Splits a resource URL into its path and optional query string.
///
/// Cache-busting parameters are part of the URL handed to a source; sources
/// that address content by path alone use this to ignore them.
pub fn strip_query(url: &str) -> (&str, Option<&str>) {
    let without_fragment = url.split('#').next().unwrap_or(url);
    match without_fragment.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (without_fragment, None),
    }
}

/// A source of support assets addressed by URL.
///
/// URLs handed to `fetch` carry the build-version query parameter. A source
/// is free to ignore it, but must not return content for a different path.
///
/// # Implementations
///
/// - `InMemoryAssetSource`: pre-populated memory (always available)
/// - `FilesystemAssetSource` in `quire-resource`: a local directory
pub trait AssetSource: Send + Sync + Debug {
    /// Fetch the full contents of the asset at `url`.
    fn fetch(&self, url: &str) -> Result<SharedAssetData, FetchError>;

    /// Returns a human-readable name for this source (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// An in-memory asset source.
///
/// Assets are keyed by path; the query string of a fetched URL is ignored and
/// a leading `./` is dropped, so `./lualatex.fmt?build=7` resolves the asset
/// stored under `lualatex.fmt`.
#[derive(Debug, Default)]
pub struct InMemoryAssetSource {
    assets: RwLock<HashMap<String, SharedAssetData>>,
}

impl InMemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(url: &str) -> &str {
        let (path, _) = strip_query(url);
        path.trim_start_matches("./")
    }

    /// Add an asset to the store, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Failed` if the internal lock is poisoned.
    pub fn add(&self, path: impl Into<String>, data: Vec<u8>) -> Result<(), FetchError> {
        self.add_shared(path, Arc::new(data))
    }

    /// Add an asset from shared data.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Failed` if the internal lock is poisoned.
    pub fn add_shared(
        &self,
        path: impl Into<String>,
        data: SharedAssetData,
    ) -> Result<(), FetchError> {
        let path_string = path.into();
        let mut assets = self.assets.write().map_err(|_| FetchError::Failed {
            url: path_string.clone(),
            message: "asset store lock poisoned".to_string(),
        })?;
        assets.insert(Self::key(&path_string).to_string(), data);
        Ok(())
    }

    /// Remove an asset from the store.
    ///
    /// Returns `None` if the lock is poisoned or the asset doesn't exist.
    pub fn remove(&self, path: &str) -> Option<SharedAssetData> {
        self.assets.write().ok()?.remove(Self::key(path))
    }

    /// Number of stored assets. Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.assets.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Returns `true` if the store is empty or the lock is poisoned.
    pub fn is_empty(&self) -> bool {
        self.assets.read().map(|a| a.is_empty()).unwrap_or(true)
    }
}

impl AssetSource for InMemoryAssetSource {
    fn fetch(&self, url: &str) -> Result<SharedAssetData, FetchError> {
        let assets = self.assets.read().map_err(|_| FetchError::Failed {
            url: url.to_string(),
            message: "asset store lock poisoned".to_string(),
        })?;
        assets
            .get(Self::key(url))
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }

    fn name(&self) -> &'static str {
        "InMemoryAssetSource"
    }
}
