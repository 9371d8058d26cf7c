use quire::{
    Engine, EngineError, EngineFactory, EngineModuleSource, EngineOptions, FetchError,
    InMemoryAssetSource, MemoryFs, PrivateFs,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A source containing this line blocks in the engine until the gate opens.
pub const GATE_MARKER: &str = "% fixture: wait";

/// A source containing this line makes the engine produce no output.
pub const NO_OUTPUT_MARKER: &str = "% fixture: no output";

/// Blocks engine runs until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    signal: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            let (guard, _) = self
                .signal
                .wait_timeout(open, Duration::from_secs(10))
                .unwrap();
            open = guard;
        }
    }
}

/// An engine that "typesets" by echoing its inputs into a fake PDF.
///
/// The produced document starts with `%PDF-1.7`, followed by the source and
/// the list of files in `/work` at the time of the run.
pub struct FixtureEngine {
    fs: MemoryFs,
    env: BTreeMap<String, String>,
    options: EngineOptions,
    gate: Arc<Gate>,
}

impl Engine for FixtureEngine {
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
        let source = String::from_utf8_lossy(&self.fs.read_file("/work/input.tex")?).into_owned();
        if !self.fs.exists("/texmf/texmf-var/web2c/lualatex.fmt") {
            return Err(EngineError::Abort("format file missing".to_string()));
        }
        (self.options.print)(&format!("This is FixtureTeX, {} argument(s)", args.len()));

        if source.contains(GATE_MARKER) {
            self.gate.wait();
        }
        if source.contains(NO_OUTPUT_MARKER) {
            (self.options.print_err)("! Emergency stop.");
            return Ok(1);
        }

        let mut pdf = format!("%PDF-1.7\n{}\n", source);
        for path in self.fs.file_paths().filter(|p| p.starts_with("/work/")) {
            pdf.push_str(path);
            pdf.push('\n');
        }
        self.fs.write_file("/work/input.pdf", pdf.as_bytes())?;
        Ok(0)
    }
}

#[derive(Default)]
pub struct FixtureFactory {
    pub gate: Arc<Gate>,
    pub instances: AtomicUsize,
}

impl std::fmt::Debug for FixtureFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureFactory")
            .field("instances", &self.instances)
            .finish_non_exhaustive()
    }
}

impl FixtureFactory {
    pub fn instance_count(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }
}

impl EngineFactory for FixtureFactory {
    fn instantiate(&self, options: EngineOptions) -> Result<Box<dyn Engine>, EngineError> {
        self.instances.fetch_add(1, Ordering::SeqCst);
        let mut fs = MemoryFs::new();
        fs.preload("/texmf/texmf-dist/web2c/texmf.cnf", b"% fixture cnf".to_vec())?;
        Ok(Box::new(FixtureEngine {
            fs,
            env: options.env.clone(),
            options,
            gate: Arc::clone(&self.gate),
        }))
    }

    fn name(&self) -> &'static str {
        "FixtureFactory"
    }
}

#[derive(Debug)]
pub struct FixtureModules {
    pub factory: Arc<FixtureFactory>,
    pub loads: AtomicUsize,
}

impl FixtureModules {
    pub fn new(factory: Arc<FixtureFactory>) -> Self {
        Self {
            factory,
            loads: AtomicUsize::new(0),
        }
    }
}

impl EngineModuleSource for FixtureModules {
    fn load(&self, url: &str) -> Result<Arc<dyn EngineFactory>, FetchError> {
        if !url.contains("luatex.js") {
            return Err(FetchError::NotFound(url.to_string()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        let factory: Arc<dyn EngineFactory> = self.factory.clone();
        Ok(factory)
    }

    fn name(&self) -> &'static str {
        "FixtureModules"
    }
}

/// An asset store holding a format blob.
pub fn format_assets() -> Arc<InMemoryAssetSource> {
    let assets = InMemoryAssetSource::new();
    assets
        .add("lualatex.fmt", b"FIXTURE-FORMAT".to_vec())
        .unwrap();
    Arc::new(assets)
}
