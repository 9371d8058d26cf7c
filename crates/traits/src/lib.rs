pub mod asset;
pub mod engine;
pub mod fs;

pub use asset::{AssetSource, FetchError, InMemoryAssetSource, SharedAssetData, strip_query};
pub use engine::{
    Engine, EngineError, EngineFactory, EngineModuleSource, EngineOptions, OutputHook,
};
pub use fs::{FsError, MemoryFs, PrivateFs, normalize_path, parent_path};
