//! Local copies of sources that exist only inside the engine.
//!
//! Files live at `<tmp>/<script id>/<file name>` and are read-only. The
//! whole directory is removed on [`TempScriptCache::cleanup`] or drop.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::script::NodeScript;

/// Temp directory holding fetched script sources.
#[derive(Debug)]
pub struct TempScriptCache {
    dir: Option<TempDir>,
    files: Vec<PathBuf>,
}

impl TempScriptCache {
    /// Create the backing temp directory.
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("nodedbg-").tempdir()?;
        tracing::debug!("temp script cache at {}", dir.path().display());
        Ok(Self {
            dir: Some(dir),
            files: Vec::new(),
        })
    }

    /// The cache directory, until cleanup.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Files written so far.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Write `source` for `script`, mark it read-only, and record it as the
    /// script's local file.
    pub fn save(&mut self, script: &NodeScript, source: &str) -> std::io::Result<PathBuf> {
        let root = self
            .path()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "temp script cache already cleaned up"))?;
        let dir = root.join(script.id.to_string());
        fs::create_dir_all(&dir)?;
        let file_name = match script.file_name() {
            "" => format!("script-{}.js", script.id),
            name => name.to_string(),
        };
        let path = dir.join(file_name);
        if path.exists() {
            set_writable(&path);
        }
        fs::write(&path, source)?;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms)?;
        script.set_local_file(path.clone());
        if !self.files.contains(&path) {
            self.files.push(path.clone());
        }
        Ok(path)
    }

    /// Delete every cached file, then the directory. Failures are logged
    /// and otherwise ignored. Safe to call more than once.
    pub fn cleanup(&mut self) {
        for file in self.files.drain(..) {
            set_writable(&file);
            if let Err(e) = fs::remove_file(&file) {
                tracing::debug!("cannot remove {}: {}", file.display(), e);
            }
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::debug!("cannot remove {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for TempScriptCache {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Clear the read-only attribute where deleting requires it.
#[cfg(windows)]
fn set_writable(path: &Path) {
    if let Ok(meta) = fs::metadata(path) {
        let mut perms = meta.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        let _ = fs::set_permissions(path, perms);
    }
}

#[cfg(not(windows))]
fn set_writable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o644));
}
