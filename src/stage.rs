// src/stage.rs
//!
//! Prepares the engine's private filesystem for a run and harvests the
//! output afterwards.
//!
//! The layout is fixed:
//!
//! ```text
//! /texmf/bin/luatex                  zero-length program placeholder
//! /texmf/texmf-var/web2c/lualatex.fmt  format blob
//! /texmf/texmf-config, /texmf/home   config and home roots
//! /work/input.tex                    the user's source
//! /work/<safeName>                   style resources
//! /work/input.pdf                    the output, if the run produced one
//! ```

use crate::error::QuireError;
use crate::protocol::StyleEntry;
use log::{debug, trace};
use quire_traits::{Engine, FsError, PrivateFs};
use std::collections::BTreeMap;

/// Program identity reported to the engine.
pub const PROGRAM_PATH: &str = "/texmf/bin/luatex";

/// Format name passed to the engine.
pub const FORMAT_NAME: &str = "lualatex";

pub const FORMAT_PATH: &str = "/texmf/texmf-var/web2c/lualatex.fmt";

pub const WORK_DIR: &str = "/work";

pub const INPUT_PATH: &str = "/work/input.tex";

pub const OUTPUT_PATH: &str = "/work/input.pdf";

/// Configuration file shipped with the engine build.
pub const CNF_SOURCE: &str = "/texmf/texmf-dist/web2c/texmf.cnf";

/// Secondary location some engine builds search for the configuration.
pub const CNF_MIRROR: &str = "/texmf-dist/web2c/texmf.cnf";

/// Directories created before every run, parents first.
pub const DIRECTORIES: &[&str] = &[
    "/texmf/bin",
    "/texmf/texmf-var/web2c",
    "/texmf/texmf-config",
    "/texmf/home",
    WORK_DIR,
    "/texmf-dist/web2c",
];

/// Environment applied to every engine instance.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("TEXMFCNF", "/texmf/texmf-dist/web2c"),
    ("TEXMFROOT", "/texmf"),
    ("TEXMFDIST", "/texmf/texmf-dist"),
    ("TEXMFMAIN", "/texmf/texmf-dist"),
    ("TEXMFVAR", "/texmf/texmf-var"),
    ("TEXMFSYSCONFIG", "/texmf/texmf-config"),
    ("TEXMFCONFIG", "/texmf/texmf-config"),
    ("TEXMF", "/texmf/texmf-var,/texmf/texmf-dist"),
    ("TEXMFDBS", "/texmf/texmf-dist"),
    ("TEXMFHOME", "/texmf/home"),
    ("HOME", "/texmf/home"),
    ("TEXINPUTS", ".;/work//;/texmf/texmf-dist/tex//;"),
    ("TEXFORMATS", "/texmf/texmf-var/web2c//;/texmf/texmf-dist/web2c//;"),
    ("KPATHSEA_DEBUG", "0"),
];

pub fn env_overrides() -> BTreeMap<String, String> {
    ENV_OVERRIDES
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Command-line arguments of one run.
pub fn engine_arguments() -> Vec<String> {
    vec![
        format!("-progname={}", FORMAT_NAME),
        "-interaction=nonstopmode".to_string(),
        "-halt-on-error".to_string(),
        format!("-fmt={}", FORMAT_NAME),
        "-output-directory".to_string(),
        WORK_DIR.to_string(),
        INPUT_PATH.to_string(),
    ]
}

/// Creates `path` and every missing ancestor. Existing directories are fine.
pub fn ensure_dir(fs: &mut dyn PrivateFs, path: &str) -> Result<(), FsError> {
    let mut current = String::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        match fs.mkdir(&current) {
            Ok(()) => trace!("[STAGE] Created {}", current),
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Lays out directories, placeholder, configuration and environment.
///
/// Must complete before any input is written.
pub fn prepare(engine: &mut dyn Engine) -> Result<(), QuireError> {
    let fs = engine.fs_mut();
    for dir in DIRECTORIES {
        ensure_dir(fs, dir)?;
    }
    fs.write_file(PROGRAM_PATH, &[])?;

    match fs.read_file(CNF_SOURCE) {
        Ok(cnf) => {
            fs.write_file(CNF_MIRROR, &cnf)?;
            debug!("[STAGE] Mirrored {} to {}", CNF_SOURCE, CNF_MIRROR);
        }
        Err(e) => debug!("[STAGE] No configuration to mirror: {}", e),
    }

    engine.env_mut().extend(env_overrides());
    if engine.supports_setenv() {
        for (key, value) in ENV_OVERRIDES {
            engine.setenv(key, value, true)?;
        }
    }
    debug!("[STAGE] Prepared sandbox with {} environment overrides", ENV_OVERRIDES.len());
    Ok(())
}

/// Writes the format blob, the style resources and the source.
///
/// Styles without a storage name are skipped. Returns the number of styles
/// written.
pub fn write_inputs(
    fs: &mut dyn PrivateFs,
    format: &[u8],
    styles: &[StyleEntry],
    source: &str,
) -> Result<usize, QuireError> {
    fs.write_file(FORMAT_PATH, format)?;

    let mut written = 0;
    for style in styles {
        if style.safe_name.is_empty() {
            debug!("[STAGE] Skipping style '{}' without a storage name", style.name);
            continue;
        }
        let path = format!("{}/{}", WORK_DIR, style.safe_name);
        fs.write_file(&path, style.content.as_bytes())?;
        trace!("[STAGE] Wrote {} ({} bytes)", path, style.content.len());
        written += 1;
    }

    fs.write_file(INPUT_PATH, source.as_bytes())?;
    Ok(written)
}

/// Reads the produced document.
pub fn harvest_output(fs: &dyn PrivateFs) -> Result<Vec<u8>, QuireError> {
    if !fs.exists(OUTPUT_PATH) {
        return Err(QuireError::OutputMissing(OUTPUT_PATH.to_string()));
    }
    Ok(fs.read_file(OUTPUT_PATH)?)
}
