//! A private filesystem backed by a host directory.

use quire_traits::{FsError, PrivateFs, normalize_path};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maps virtual sandbox paths onto a directory of the host filesystem.
///
/// `/work/input.tex` becomes `<root>/work/input.tex`. Virtual paths are
/// normalized first, so they can never climb out of `root`.
///
/// Parts of the tree may be symlinks into a mounted host directory (see
/// [`mount_tree`]). Writes never go through such a link: a linked
/// directory on the way to a write is replaced by a real directory of
/// links first, and a linked file is unlinked before it is rewritten.
#[derive(Debug, Clone)]
pub struct HostFs {
    root: PathBuf,
}

impl HostFs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host location of a virtual path.
    pub fn host_path(&self, virtual_path: &str) -> PathBuf {
        let normalized = normalize_path(virtual_path);
        match normalized.strip_prefix('/') {
            Some("") | None => self.root.clone(),
            Some(relative) => self.root.join(relative),
        }
    }

    /// Rewrites absolute virtual paths inside an argument or environment
    /// value so the host program sees sandbox locations.
    ///
    /// Values are treated as `;`/`,` separated lists; a `key=/path` token has
    /// only its value rebased. Trailing `//` (recursive search) survives.
    pub fn rebase(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut token = String::new();
        for ch in value.chars() {
            if ch == ';' || ch == ',' {
                out.push_str(&self.rebase_token(&token));
                token.clear();
                out.push(ch);
            } else {
                token.push(ch);
            }
        }
        out.push_str(&self.rebase_token(&token));
        out
    }

    /// Replaces every symlinked directory between `root` and the parent of
    /// `virtual_path` with a real one, so a write lands in the sandbox.
    fn unshare_parents(&self, virtual_path: &str) -> io::Result<()> {
        let normalized = normalize_path(virtual_path);
        let mut components: Vec<&str> = normalized.split('/').filter(|c| !c.is_empty()).collect();
        components.pop();

        let mut current = self.root.clone();
        for component in components {
            current.push(component);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() && current.is_dir() => {
                    split_linked_dir(&current)?;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn rebase_token(&self, token: &str) -> String {
        if let Some((key, rest)) = token.split_once('=')
            && rest.starts_with('/')
        {
            return format!("{}={}", key, self.rebase_token(rest));
        }
        if token.starts_with('/') {
            format!("{}{}", self.root.display(), token)
        } else {
            token.to_string()
        }
    }
}

fn map_io(path: &str, err: io::Error) -> FsError {
    match err.kind() {
        io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_string()),
        io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        io::ErrorKind::NotADirectory => FsError::NotADirectory(path.to_string()),
        io::ErrorKind::IsADirectory => FsError::IsADirectory(path.to_string()),
        _ => FsError::Io {
            path: path.to_string(),
            message: err.to_string(),
        },
    }
}

impl PrivateFs for HostFs {
    fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        self.unshare_parents(path).map_err(|e| map_io(path, e))?;
        fs::create_dir(self.host_path(path)).map_err(|e| map_io(path, e))
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let target = self.host_path(path);
        if target.is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        self.unshare_parents(path).map_err(|e| map_io(path, e))?;
        if fs::symlink_metadata(&target).is_ok_and(|meta| meta.file_type().is_symlink()) {
            fs::remove_file(&target).map_err(|e| map_io(path, e))?;
        }
        fs::write(target, data).map_err(|e| map_io(path, e))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let target = self.host_path(path);
        if target.is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        fs::read(target).map_err(|e| map_io(path, e))
    }

    fn exists(&self, path: &str) -> bool {
        self.host_path(path).exists()
    }
}

/// Makes the host directory `src` visible at `dst` without copying it.
///
/// On unix `dst` becomes a symlink to `src`; `HostFs` splits it lazily where
/// the sandbox writes, so `src` itself is never modified. Other platforms
/// get a full copy.
pub(crate) fn mount_tree(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    link_entry(&fs::canonicalize(src)?, dst)
}

/// Turns the symlinked directory `dir` into a real directory holding one
/// link per entry of the link target.
fn split_linked_dir(dir: &Path) -> io::Result<()> {
    let target = fs::canonicalize(dir)?;
    fs::remove_file(dir)?;
    fs::create_dir(dir)?;
    for entry in fs::read_dir(&target)? {
        let entry = entry?;
        link_entry(&entry.path(), &dir.join(entry.file_name()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn link_entry(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(not(unix))]
fn link_entry(src: &Path, dst: &Path) -> io::Result<()> {
    if fs::metadata(src)?.is_dir() {
        copy_tree(src, dst).map(|_| ())
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

/// Recursively copies `src` into `dst`, following symlinks. Returns the
/// number of files copied.
#[cfg(any(not(unix), test))]
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if fs::metadata(&from)?.is_dir() {
            copied += copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
            copied += 1;
        }
    }
    Ok(copied)
}
