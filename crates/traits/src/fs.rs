//! The engine's private filesystem.
//!
//! The typesetting engine only ever sees this sandbox. Paths are absolute,
//! `/`-separated virtual paths; they never name anything on the host.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Error type for private filesystem operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("File exists: {0}")]
    AlreadyExists(String),

    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },
}

impl FsError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, FsError::AlreadyExists(_))
    }
}

/// The operations the engine boundary exposes on its sandbox.
pub trait PrivateFs: Send {
    /// Create one directory. The parent must already exist.
    fn mkdir(&mut self, path: &str) -> Result<(), FsError>;

    /// Replace the whole content of a file, creating it if needed.
    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError>;

    /// Read the whole content of a file.
    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Check whether a file or directory exists at `path`.
    fn exists(&self, path: &str) -> bool;
}

/// Normalizes a virtual path: leading `/`, no empty or `.` segments, `..`
/// resolved lexically (never above the root), no trailing `/`.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Parent directory of a normalized path; `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// An in-memory sandbox.
///
/// Behaves like the engine's own virtual filesystem: `mkdir` does not create
/// parents, writes into a missing directory fail, and reading a directory is
/// an error.
#[derive(Debug, Clone)]
pub struct MemoryFs {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        Self {
            dirs,
            files: BTreeMap::new(),
        }
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a file, creating every missing parent directory.
    ///
    /// This is how support files shipped with an engine build appear in the
    /// sandbox before any staging runs.
    pub fn preload(&mut self, path: &str, data: impl Into<Vec<u8>>) -> Result<(), FsError> {
        let normalized = normalize_path(path);
        let mut current = String::new();
        if let Some(parent) = parent_path(&normalized) {
            for part in parent.split('/').filter(|p| !p.is_empty()) {
                current.push('/');
                current.push_str(part);
                if self.files.contains_key(&current) {
                    return Err(FsError::NotADirectory(current));
                }
                self.dirs.insert(current.clone());
            }
        }
        self.write_file(&normalized, &data.into())
    }

    /// Whether `path` is a directory.
    pub fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(&normalize_path(path))
    }

    /// All file paths, in sorted order.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    fn check_parent(&self, path: &str) -> Result<(), FsError> {
        match parent_path(path) {
            Some(parent) if self.dirs.contains(parent) => Ok(()),
            Some(parent) if self.files.contains_key(parent) => {
                Err(FsError::NotADirectory(parent.to_string()))
            }
            Some(parent) => Err(FsError::NotFound(parent.to_string())),
            None => Ok(()),
        }
    }
}

impl PrivateFs for MemoryFs {
    fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let normalized = normalize_path(path);
        if self.dirs.contains(&normalized) || self.files.contains_key(&normalized) {
            return Err(FsError::AlreadyExists(normalized));
        }
        self.check_parent(&normalized)?;
        self.dirs.insert(normalized);
        Ok(())
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let normalized = normalize_path(path);
        if self.dirs.contains(&normalized) {
            return Err(FsError::IsADirectory(normalized));
        }
        self.check_parent(&normalized)?;
        self.files.insert(normalized, data.to_vec());
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let normalized = normalize_path(path);
        if let Some(data) = self.files.get(&normalized) {
            return Ok(data.clone());
        }
        if self.dirs.contains(&normalized) {
            return Err(FsError::IsADirectory(normalized));
        }
        Err(FsError::NotFound(normalized))
    }

    fn exists(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        self.dirs.contains(&normalized) || self.files.contains_key(&normalized)
    }
}
