//! Scripted engine and asset doubles for unit tests.

use quire_traits::{
    AssetSource, Engine, EngineError, EngineFactory, EngineModuleSource, EngineOptions,
    FetchError, MemoryFs, PrivateFs, SharedAssetData,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What an engine run does with its sandbox.
pub type Script =
    Arc<dyn Fn(&mut MemoryFs, &[String], &EngineOptions) -> Result<i32, EngineError> + Send + Sync>;

/// Reads `/work/input.tex` and writes `/work/input.pdf` from it.
pub fn typesetting_script() -> Script {
    Arc::new(|fs: &mut MemoryFs, _args: &[String], options: &EngineOptions| -> Result<i32, EngineError> {
        let source = fs.read_file("/work/input.tex")?;
        (options.print)("This is LuaHBTeX, Version 1.17.0");
        let mut pdf = b"%PDF-1.5\n".to_vec();
        pdf.extend_from_slice(&source);
        fs.write_file("/work/input.pdf", &pdf)?;
        (options.print)("Output written on /work/input.pdf");
        Ok(0)
    })
}

/// Runs to completion without producing any output file.
pub fn silent_script() -> Script {
    Arc::new(|_: &mut MemoryFs, _: &[String], options: &EngineOptions| -> Result<i32, EngineError> {
        (options.print_err)("! Emergency stop.");
        Ok(1)
    })
}

pub fn aborting_script(reason: &'static str) -> Script {
    Arc::new(move |_: &mut MemoryFs, _: &[String], _: &EngineOptions| -> Result<i32, EngineError> {
        Err(EngineError::Abort(reason.to_string()))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub native_env: BTreeMap<String, String>,
    pub files: Vec<String>,
}

pub struct ScriptedEngine {
    fs: MemoryFs,
    env: BTreeMap<String, String>,
    native_env: BTreeMap<String, String>,
    options: EngineOptions,
    script: Script,
    native_setenv: bool,
    invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            fs: MemoryFs::new(),
            env: BTreeMap::new(),
            native_env: BTreeMap::new(),
            options: EngineOptions::silent("/texmf/bin/luatex"),
            script,
            native_setenv: false,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_native_setenv(mut self) -> Self {
        self.native_setenv = true;
        self
    }

    pub fn memory_fs(&self) -> &MemoryFs {
        &self.fs
    }

    pub fn native_env(&self) -> &BTreeMap<String, String> {
        &self.native_env
    }
}

impl Engine for ScriptedEngine {
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

    fn supports_setenv(&self) -> bool {
        self.native_setenv
    }

    fn setenv(&mut self, key: &str, value: &str, overwrite: bool) -> Result<(), EngineError> {
        if overwrite || !self.native_env.contains_key(key) {
            self.native_env.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn call_main(&mut self, args: &[String]) -> Result<i32, EngineError> {
        self.invocations.lock().unwrap().push(Invocation {
            args: args.to_vec(),
            env: self.env.clone(),
            native_env: self.native_env.clone(),
            files: self.fs.file_paths().map(str::to_string).collect(),
        });
        (self.script)(&mut self.fs, args, &self.options)
    }
}

/// Creates `ScriptedEngine`s and counts instantiations.
pub struct ScriptedFactory {
    script: Script,
    pub instances: AtomicUsize,
    pub invocations: Arc<Mutex<Vec<Invocation>>>,
}

impl std::fmt::Debug for ScriptedFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedFactory").finish_non_exhaustive()
    }
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            instances: AtomicUsize::new(0),
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn last_invocation(&self) -> Option<Invocation> {
        self.invocations.lock().unwrap().last().cloned()
    }
}

impl EngineFactory for ScriptedFactory {
    fn instantiate(&self, options: EngineOptions) -> Result<Box<dyn Engine>, EngineError> {
        self.instances.fetch_add(1, Ordering::SeqCst);
        let mut engine = ScriptedEngine::new(Arc::clone(&self.script));
        engine.fs.preload("/texmf/texmf-dist/web2c/texmf.cnf", b"% texmf.cnf".to_vec())?;
        engine.env = options.env.clone();
        engine.options = options;
        engine.invocations = Arc::clone(&self.invocations);
        Ok(Box::new(engine))
    }

    fn name(&self) -> &'static str {
        "ScriptedFactory"
    }
}

/// Hands out one factory and records every module URL it was asked for.
#[derive(Debug)]
pub struct ScriptedModules {
    factory: Arc<ScriptedFactory>,
    pub loads: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
}

impl ScriptedModules {
    pub fn new(factory: Arc<ScriptedFactory>) -> Self {
        Self {
            factory,
            loads: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }
}

impl EngineModuleSource for ScriptedModules {
    fn load(&self, url: &str) -> Result<Arc<dyn EngineFactory>, FetchError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        let factory: Arc<dyn EngineFactory> = self.factory.clone();
        Ok(factory)
    }

    fn name(&self) -> &'static str {
        "ScriptedModules"
    }
}

/// Serves one format blob after an optional delay, counting fetches.
#[derive(Debug)]
pub struct CountingAssets {
    blob: Option<SharedAssetData>,
    delay: Duration,
    pub fetches: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
}

impl CountingAssets {
    pub fn new(blob: &[u8]) -> Self {
        Self {
            blob: Some(Arc::new(blob.to_vec())),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// A source where every fetch fails.
    pub fn empty() -> Self {
        Self {
            blob: None,
            ..Self::new(b"")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl AssetSource for CountingAssets {
    fn fetch(&self, url: &str) -> Result<SharedAssetData, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        std::thread::sleep(self.delay);
        self.blob
            .clone()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }

    fn name(&self) -> &'static str {
        "CountingAssets"
    }
}
