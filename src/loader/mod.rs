// src/loader/mod.rs
//!
//! Locates and instantiates the typesetting engine for a build version.
//!
//! Two things are expensive to obtain and are cached per loader:
//!
//! - the engine factory (the instantiation function of the engine module),
//!   held in a single slot tagged with the build version it came from;
//! - the format blob, memoized per build version. Concurrent requests for an
//!   uncached version share one in-flight fetch.
//!
//! Every fetched URL carries the build version as a query parameter.

mod disk;

pub use disk::FormatDiskCache;

use crate::error::QuireError;
use log::{debug, info};
use quire_resource::with_build;
use quire_traits::{AssetSource, EngineFactory, EngineModuleSource, SharedAssetData};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OnceCell};
use tokio::task;

/// Location of the engine module, relative to the base URL.
pub const ENGINE_MODULE_PATH: &str = "./luatex.js";

/// Location of the precompiled format blob, relative to the base URL.
pub const FORMAT_BLOB_PATH: &str = "./lualatex.fmt";

/// Format cache key used when no build version is given.
const DEFAULT_BUILD_KEY: &str = "default";

pub type FormatBlob = SharedAssetData;

struct CachedFactory {
    build_id: Option<String>,
    factory: Arc<dyn EngineFactory>,
}

pub struct EngineLoader {
    base_url: String,
    modules: Arc<dyn EngineModuleSource>,
    assets: Arc<dyn AssetSource>,
    disk_cache: Option<FormatDiskCache>,
    factory: Mutex<Option<CachedFactory>>,
    formats: std::sync::Mutex<HashMap<String, Arc<OnceCell<FormatBlob>>>>,
}

impl std::fmt::Debug for EngineLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLoader")
            .field("base_url", &self.base_url)
            .field("modules", &self.modules.name())
            .field("assets", &self.assets.name())
            .field("disk_cache", &self.disk_cache)
            .finish_non_exhaustive()
    }
}

impl EngineLoader {
    pub fn new(
        base_url: impl Into<String>,
        modules: Arc<dyn EngineModuleSource>,
        assets: Arc<dyn AssetSource>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            modules,
            assets,
            disk_cache: None,
            factory: Mutex::new(None),
            formats: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Persists fetched format blobs under `cache`, keyed by build version.
    pub fn with_disk_cache(mut self, cache: FormatDiskCache) -> Self {
        self.disk_cache = Some(cache);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves `path` against the base URL and tags it with the build.
    pub fn resource_url(&self, path: &str, build_id: Option<&str>) -> String {
        with_build(&self.base_url, path, build_id)
    }

    /// Returns the engine factory for `build_id`.
    ///
    /// The factory of the most recent build is kept; asking for a different
    /// build replaces it with a freshly loaded one.
    pub async fn engine_factory(
        &self,
        build_id: Option<&str>,
    ) -> Result<Arc<dyn EngineFactory>, QuireError> {
        let mut slot = self.factory.lock().await;
        if let Some(cached) = slot.as_ref()
            && cached.build_id.as_deref() == build_id
        {
            debug!("[LOADER] Reusing engine factory for build {:?}", build_id);
            return Ok(Arc::clone(&cached.factory));
        }

        let url = self.resource_url(ENGINE_MODULE_PATH, build_id);
        info!("[LOADER] Loading engine module {} via {}", url, self.modules.name());
        let modules = Arc::clone(&self.modules);
        let factory = task::spawn_blocking(move || modules.load(&url)).await??;

        *slot = Some(CachedFactory {
            build_id: build_id.map(str::to_string),
            factory: Arc::clone(&factory),
        });
        Ok(factory)
    }

    /// Returns the format blob for `build_id`, fetching it at most once.
    ///
    /// A failed fetch leaves the version uncached; the next request retries.
    pub async fn format_blob(&self, build_id: Option<&str>) -> Result<FormatBlob, QuireError> {
        let key = build_id.unwrap_or(DEFAULT_BUILD_KEY).to_string();
        let cell = {
            let mut formats = self.formats.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(formats.entry(key).or_default())
        };
        let blob = cell.get_or_try_init(|| self.fetch_format(build_id)).await?;
        Ok(Arc::clone(blob))
    }

    /// Number of build versions with a cached format blob.
    pub fn cached_formats(&self) -> usize {
        self.formats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    async fn fetch_format(&self, build_id: Option<&str>) -> Result<FormatBlob, QuireError> {
        if let (Some(cache), Some(build)) = (&self.disk_cache, build_id)
            && let Some(blob) = cache.load(build).await
        {
            info!("[LOADER] Format blob for build {} read from {}", build, cache.dir().display());
            return Ok(blob);
        }

        let url = self.resource_url(FORMAT_BLOB_PATH, build_id);
        info!("[LOADER] Fetching format blob {} via {}", url, self.assets.name());
        let assets = Arc::clone(&self.assets);
        let blob = task::spawn_blocking(move || assets.fetch(&url)).await??;
        info!("[LOADER] Format blob ready ({} bytes)", blob.len());

        if let (Some(cache), Some(build)) = (&self.disk_cache, build_id) {
            cache.store(build, &blob).await;
        }
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CountingAssets, ScriptedFactory, ScriptedModules, typesetting_script};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::tempdir;

    fn loader_with(assets: Arc<CountingAssets>) -> (EngineLoader, Arc<ScriptedModules>) {
        let factory = Arc::new(ScriptedFactory::new(typesetting_script()));
        let modules = Arc::new(ScriptedModules::new(factory));
        let loader = EngineLoader::new("", modules.clone(), assets);
        (loader, modules)
    }

    #[tokio::test]
    async fn test_factory_cached_per_build() {
        let (loader, modules) = loader_with(Arc::new(CountingAssets::new(b"FMT")));

        loader.engine_factory(Some("1")).await.unwrap();
        loader.engine_factory(Some("1")).await.unwrap();
        assert_eq!(modules.loads.load(Ordering::SeqCst), 1);

        loader.engine_factory(Some("2")).await.unwrap();
        loader.engine_factory(Some("1")).await.unwrap();
        assert_eq!(modules.loads.load(Ordering::SeqCst), 3);

        let urls = modules.urls.lock().unwrap().clone();
        assert_eq!(urls[0], "./luatex.js?build=1");
        assert_eq!(urls[1], "./luatex.js?build=2");
    }

    #[tokio::test]
    async fn test_factory_without_build_is_cached_too() {
        let (loader, modules) = loader_with(Arc::new(CountingAssets::new(b"FMT")));
        loader.engine_factory(None).await.unwrap();
        loader.engine_factory(None).await.unwrap();
        assert_eq!(modules.loads.load(Ordering::SeqCst), 1);
        assert_eq!(modules.urls.lock().unwrap()[0], "./luatex.js");
    }

    #[tokio::test]
    async fn test_format_blob_fetched_once_per_build() {
        let assets = Arc::new(CountingAssets::new(b"FMT"));
        let (loader, _) = loader_with(assets.clone());

        let first = loader.format_blob(Some("9")).await.unwrap();
        let second = loader.format_blob(Some("9")).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(assets.fetch_count(), 1);
        assert_eq!(assets.urls.lock().unwrap()[0], "./lualatex.fmt?build=9");

        loader.format_blob(Some("10")).await.unwrap();
        assert_eq!(assets.fetch_count(), 2);
        assert_eq!(loader.cached_formats(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_format_requests_share_one_fetch() {
        let assets = Arc::new(CountingAssets::new(b"FMT").with_delay(Duration::from_millis(50)));
        let (loader, _) = loader_with(assets.clone());
        let loader = Arc::new(loader);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let loader = Arc::clone(&loader);
            handles.push(tokio::spawn(async move {
                loader.format_blob(Some("shared")).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(&*handle.await.unwrap(), b"FMT");
        }
        assert_eq!(assets.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let assets = Arc::new(CountingAssets::empty());
        let (loader, _) = loader_with(assets.clone());

        let err = loader.format_blob(Some("1")).await.unwrap_err();
        assert!(matches!(err, QuireError::Fetch(_)));
        assert!(loader.format_blob(Some("1")).await.is_err());
        assert_eq!(assets.fetch_count(), 2);
        assert_eq!(loader.cached_formats(), 0);
    }

    #[tokio::test]
    async fn test_disk_cache_survives_loader() {
        let dir = tempdir().unwrap();
        let assets = Arc::new(CountingAssets::new(b"FMT"));

        let (loader, _) = loader_with(assets.clone());
        let loader = loader.with_disk_cache(FormatDiskCache::new(dir.path()));
        loader.format_blob(Some("5")).await.unwrap();
        assert_eq!(assets.fetch_count(), 1);

        let (fresh, _) = loader_with(assets.clone());
        let fresh = fresh.with_disk_cache(FormatDiskCache::new(dir.path()));
        assert_eq!(&*fresh.format_blob(Some("5")).await.unwrap(), b"FMT");
        assert_eq!(assets.fetch_count(), 1);
    }

    #[test]
    fn test_resource_url_uses_base() {
        let factory = Arc::new(ScriptedFactory::new(typesetting_script()));
        let loader = EngineLoader::new(
            "https://cdn.example/tex",
            Arc::new(ScriptedModules::new(factory)),
            Arc::new(CountingAssets::new(b"")),
        );
        assert_eq!(
            loader.resource_url(FORMAT_BLOB_PATH, Some("3")),
            "https://cdn.example/tex/lualatex.fmt?build=3"
        );
    }
}
