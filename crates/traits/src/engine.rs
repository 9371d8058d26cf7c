//! The typesetting engine boundary.
//!
//! The engine is an external collaborator: quire loads it, stages files into
//! its private filesystem, runs its entry point and harvests the output. How
//! it typesets is none of quire's business.

use crate::asset::FetchError;
use crate::fs::{FsError, PrivateFs};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error type for engine instantiation and invocation.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// The engine signalled an unrecoverable internal fault.
    #[error("abort: {0}")]
    Abort(String),

    #[error("engine instantiation failed: {0}")]
    Instantiate(String),

    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Receives one line of engine output.
pub type OutputHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Options handed to an `EngineFactory` when creating an instance.
#[derive(Clone)]
pub struct EngineOptions {
    /// Program identity the engine reports as its own executable path.
    pub this_program: String,
    /// Initial environment of the instance.
    pub env: BTreeMap<String, String>,
    /// Standard output lines.
    pub print: OutputHook,
    /// Standard error lines.
    pub print_err: OutputHook,
    /// When set the factory must not run the entry point on its own.
    pub no_initial_run: bool,
}

impl EngineOptions {
    /// Options that discard all engine output.
    pub fn silent(this_program: impl Into<String>) -> Self {
        let discard: OutputHook = Arc::new(|_: &str| {});
        Self {
            this_program: this_program.into(),
            env: BTreeMap::new(),
            print: Arc::clone(&discard),
            print_err: discard,
            no_initial_run: true,
        }
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("this_program", &self.this_program)
            .field("env", &self.env)
            .field("no_initial_run", &self.no_initial_run)
            .finish_non_exhaustive()
    }
}

/// One instantiated engine with its own sandbox and environment.
pub trait Engine: Send {
    fn fs(&self) -> &dyn PrivateFs;

    fn fs_mut(&mut self) -> &mut dyn PrivateFs;

    /// The instance's general environment mapping.
    fn env(&self) -> &BTreeMap<String, String>;

    fn env_mut(&mut self) -> &mut BTreeMap<String, String>;

    /// Whether the engine exposes a native environment setter.
    ///
    /// Some engines snapshot the environment below the general mapping;
    /// those need every variable pushed through `setenv` as well.
    fn supports_setenv(&self) -> bool {
        false
    }

    /// Native environment setter. Only called when `supports_setenv` is true.
    fn setenv(&mut self, _key: &str, _value: &str, _overwrite: bool) -> Result<(), EngineError> {
        Ok(())
    }

    /// Runs the entry point to completion and returns its exit status.
    ///
    /// This call blocks for the whole typesetting run.
    fn call_main(&mut self, args: &[String]) -> Result<i32, EngineError>;
}

/// The instantiation function of one engine build.
pub trait EngineFactory: Send + Sync + fmt::Debug {
    fn instantiate(&self, options: EngineOptions) -> Result<Box<dyn Engine>, EngineError>;

    /// Returns a human-readable name for this factory (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// Loads the engine module published at a URL.
pub trait EngineModuleSource: Send + Sync + fmt::Debug {
    fn load(&self, url: &str) -> Result<Arc<dyn EngineFactory>, FetchError>;

    fn name(&self) -> &'static str;
}
