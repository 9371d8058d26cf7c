//! quire: compile sessions around an opaque LuaLaTeX engine.
//!
//! A session consists of a [`Controller`] on the caller's side and a
//! persistent background worker. The controller keeps the source document,
//! uploaded style files and the rendered output; the worker loads the
//! engine through an [`EngineLoader`], stages inputs into the engine's
//! private filesystem, runs it and sends the produced PDF back.
//!
//! ```ignore
//! let mut controller = SessionBuilder::new()
//!     .with_host_engine("lualatex", Some(Path::new("/usr/share/texmf")))
//!     .with_asset_dir("assets")
//!     .start()?;
//! controller.run_compile();
//! controller.wait_idle().await;
//! controller.save_output("out.pdf").await?;
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod loader;
pub mod protocol;
pub mod runner;
pub mod stage;

#[cfg(test)]
mod test_utils;

pub use config::{SessionBuilder, SessionConfig, default_build_id};
pub use controller::{Controller, DEFAULT_SOURCE, OutputRef, StyleListView, StyleUpload};
pub use error::QuireError;
pub use loader::{EngineLoader, FormatDiskCache};
pub use protocol::{CompileRequest, JobId, StyleEntry, WorkerEvent, WorkerRequest};
pub use runner::{JobPhase, JobRunner, WorkerHandle, spawn_worker};

pub use quire_traits::{
    AssetSource, Engine, EngineError, EngineFactory, EngineModuleSource, EngineOptions,
    FetchError, FsError, InMemoryAssetSource, MemoryFs, PrivateFs,
};
