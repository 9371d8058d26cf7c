// src/config.rs
use crate::controller::{Controller, DEFAULT_LOG_LIMIT, DEFAULT_SOURCE};
use crate::error::QuireError;
use crate::loader::{EngineLoader, FormatDiskCache};
use quire_resource::FilesystemAssetSource;
use quire_traits::{AssetSource, EngineModuleSource};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A build id derived from the current time, in Unix epoch milliseconds.
pub fn default_build_id() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// Everything a compile session needs to start.
#[derive(Clone)]
pub struct SessionConfig {
    /// Build version tagged onto every fetched resource. `None` leaves URLs
    /// untagged and disables the format disk cache.
    pub build_id: Option<String>,
    /// Location that relative resource URLs are resolved against.
    pub base_url: String,
    pub log_limit: usize,
    pub format_cache_dir: Option<PathBuf>,
    pub initial_source: String,
    pub modules: Arc<dyn EngineModuleSource>,
    pub assets: Arc<dyn AssetSource>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("build_id", &self.build_id)
            .field("base_url", &self.base_url)
            .field("log_limit", &self.log_limit)
            .field("format_cache_dir", &self.format_cache_dir)
            .field("modules", &self.modules.name())
            .field("assets", &self.assets.name())
            .finish_non_exhaustive()
    }
}

impl SessionConfig {
    /// Creates the engine loader this session compiles with.
    pub fn loader(&self) -> EngineLoader {
        let loader = EngineLoader::new(
            self.base_url.clone(),
            Arc::clone(&self.modules),
            Arc::clone(&self.assets),
        );
        match &self.format_cache_dir {
            Some(dir) => loader.with_disk_cache(FormatDiskCache::new(dir)),
            None => loader,
        }
    }
}

/// A builder for creating a `SessionConfig`.
pub struct SessionBuilder {
    build_id: Option<String>,
    base_url: String,
    log_limit: usize,
    format_cache_dir: Option<PathBuf>,
    initial_source: Option<String>,
    modules: Option<Arc<dyn EngineModuleSource>>,
    assets: Option<Arc<dyn AssetSource>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            build_id: Some(default_build_id()),
            base_url: String::new(),
            log_limit: DEFAULT_LOG_LIMIT,
            format_cache_dir: None,
            initial_source: None,
            modules: None,
            assets: None,
        }
    }
}

impl SessionBuilder {
    /// Creates a builder with a time-derived build id.
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }

    /// Fetches resources without a build tag.
    pub fn without_build_id(mut self) -> Self {
        self.build_id = None;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Maximum number of lines kept in the log panel.
    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit;
        self
    }

    /// Keeps fetched format blobs in `dir` across sessions.
    pub fn with_format_cache_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.format_cache_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Replaces the built-in sample document.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.initial_source = Some(source.into());
        self
    }

    pub fn with_engine_modules(mut self, modules: Arc<dyn EngineModuleSource>) -> Self {
        self.modules = Some(modules);
        self
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetSource>) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Serves the engine assets from a local directory.
    pub fn with_asset_dir<P: AsRef<Path>>(self, dir: P) -> Self {
        self.with_assets(Arc::new(FilesystemAssetSource::new(dir)))
    }

    /// Runs `program` installed on the host as the engine. When `texmf` is
    /// given, that tree is copied to `/texmf` in every sandbox.
    #[cfg(feature = "native")]
    pub fn with_host_engine<P: AsRef<Path>>(self, program: P, texmf: Option<&Path>) -> Self {
        let mut factory = quire_host::HostEngineFactory::new(program);
        if let Some(tree) = texmf {
            factory = factory.with_preload(tree, "/texmf");
        }
        self.with_engine_modules(Arc::new(quire_host::HostModuleSource::new(factory)))
    }

    /// Consumes the builder and validates the configuration.
    pub fn build(self) -> Result<SessionConfig, QuireError> {
        let modules = self.modules.ok_or_else(|| {
            QuireError::Config(
                "No engine has been configured. Use `with_engine_modules` or `with_host_engine`."
                    .to_string(),
            )
        })?;
        let assets = self.assets.ok_or_else(|| {
            QuireError::Config(
                "No asset source has been configured. Use `with_assets` or `with_asset_dir`."
                    .to_string(),
            )
        })?;
        if self.log_limit == 0 {
            return Err(QuireError::Config("log limit must be at least 1".to_string()));
        }

        Ok(SessionConfig {
            build_id: self.build_id.filter(|id| !id.is_empty()),
            base_url: self.base_url,
            log_limit: self.log_limit,
            format_cache_dir: self.format_cache_dir,
            initial_source: self
                .initial_source
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            modules,
            assets,
        })
    }

    /// Builds the configuration and starts a controller with its worker.
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> Result<Controller, QuireError> {
        Ok(Controller::start(self.build()?))
    }
}
