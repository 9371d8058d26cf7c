//! Runs a typesetting program installed on the host inside a sandbox
//! directory.

use crate::sandbox::{HostFs, mount_tree};
use log::{debug, info};
use quire_traits::{
    Engine, EngineError, EngineFactory, EngineModuleSource, EngineOptions, FetchError,
    OutputHook, PrivateFs,
};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

/// One sandboxed run environment for a host program.
///
/// The sandbox directory is removed when the engine is dropped.
pub struct HostEngine {
    program: PathBuf,
    options: EngineOptions,
    env: BTreeMap<String, String>,
    fs: HostFs,
    _sandbox: TempDir,
}

impl HostEngine {
    pub fn sandbox_root(&self) -> &Path {
        self.fs.root()
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(args.iter().map(|arg| self.fs.rebase(arg)))
            .current_dir(self.fs.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.env {
            command.env(key, self.fs.rebase(value));
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.arg0(self.fs.rebase(&self.options.this_program));
        }
        command
    }
}

impl Engine for HostEngine {
    fn fs(&self) -> &dyn PrivateFs {
        &self.fs
    }

    fn fs_mut(&mut self) -> &mut dyn PrivateFs {
        &mut self.fs
    }

    fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn env_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.env
    }

    fn call_main(&mut self, args: &[String]) -> Result<i32, EngineError> {
        let program = self.program.display().to_string();
        info!("[HOST] Running {} with {} argument(s)", program, args.len());

        let mut child = self
            .command(args)
            .spawn()
            .map_err(|e| EngineError::Abort(format!("failed to start '{}': {}", program, e)))?;

        let stderr_pump = child.stderr.take().map(|stderr| {
            let hook = Arc::clone(&self.options.print_err);
            thread::spawn(move || pump_lines(stderr, &hook))
        });
        if let Some(stdout) = child.stdout.take() {
            pump_lines(stdout, &self.options.print);
        }
        if let Some(handle) = stderr_pump
            && handle.join().is_err()
        {
            return Err(EngineError::Abort("stderr reader panicked".to_string()));
        }

        let status = child
            .wait()
            .map_err(|e| EngineError::Abort(format!("waiting for '{}' failed: {}", program, e)))?;
        debug!("[HOST] {} exited with {}", program, status);
        status
            .code()
            .ok_or_else(|| EngineError::Abort(format!("'{}' terminated by signal", program)))
    }
}

fn pump_lines<R: Read>(reader: R, hook: &OutputHook) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                hook(line.trim_end_matches(['\n', '\r']));
            }
        }
    }
}

/// Instantiates `HostEngine`s for one host program.
#[derive(Debug, Clone)]
pub struct HostEngineFactory {
    program: PathBuf,
    preloads: Vec<(PathBuf, String)>,
}

impl HostEngineFactory {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            preloads: Vec::new(),
        }
    }

    /// Mounts the host directory `dir` at `mount` in every new sandbox,
    /// the way an engine build ships its support tree. The directory is
    /// shared between sandboxes and left untouched by them.
    pub fn with_preload<P: AsRef<Path>>(mut self, dir: P, mount: impl Into<String>) -> Self {
        self.preloads.push((dir.as_ref().to_path_buf(), mount.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl EngineFactory for HostEngineFactory {
    fn instantiate(&self, options: EngineOptions) -> Result<Box<dyn Engine>, EngineError> {
        let sandbox = tempfile::Builder::new()
            .prefix("quire-")
            .tempdir()
            .map_err(|e| EngineError::Instantiate(format!("cannot create sandbox: {}", e)))?;
        let fs = HostFs::new(sandbox.path());

        for (dir, mount) in &self.preloads {
            mount_tree(dir, &fs.host_path(mount)).map_err(|e| {
                EngineError::Instantiate(format!("cannot preload '{}': {}", dir.display(), e))
            })?;
            debug!("[HOST] Mounted {} at {}", dir.display(), mount);
        }

        Ok(Box::new(HostEngine {
            program: self.program.clone(),
            env: options.env.clone(),
            options,
            fs,
            _sandbox: sandbox,
        }))
    }

    fn name(&self) -> &'static str {
        "HostEngineFactory"
    }
}

/// Resolves the engine module to a host program.
///
/// The module URL only names the build; what gets run is the configured
/// program, which must exist when the module is loaded.
#[derive(Debug, Clone)]
pub struct HostModuleSource {
    factory: Arc<HostEngineFactory>,
}

impl HostModuleSource {
    pub fn new(factory: HostEngineFactory) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl EngineModuleSource for HostModuleSource {
    fn load(&self, url: &str) -> Result<Arc<dyn EngineFactory>, FetchError> {
        let program = self.factory.program();
        let resolved = resolve_program(program).ok_or_else(|| {
            FetchError::NotFound(format!("{} (engine program '{}')", url, program.display()))
        })?;
        info!("[HOST] Engine module {} resolved to {}", url, resolved.display());
        let factory: Arc<dyn EngineFactory> = self.factory.clone();
        Ok(factory)
    }

    fn name(&self) -> &'static str {
        "HostModuleSource"
    }
}

/// Finds `program` the way a shell would: paths with a separator are
/// checked directly, bare names are looked up on `PATH`.
pub fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
