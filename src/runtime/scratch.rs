//! Scratch files for invocation scripts.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{NodeflowError, Result, utils};

/// A directory of uniquely named temporary files.
///
/// Only files created through this instance are tracked and removed by [`ScratchDir::clear`].
pub struct ScratchDir {
    root: PathBuf,
    files: Mutex<HashSet<PathBuf>>,
}

impl ScratchDir {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            files: Mutex::new(HashSet::new()),
        }
    }

    /// Write `content` to a new file whose name ends with `suffix`.
    pub fn create(
        &self,
        content: &str,
        suffix: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|e| NodeflowError::IoError(format!("failed to create scratch dir {}: {}", self.root.display(), e)))?;

        let path = self.root.join(format!("nodeflow_{}_{}{}", utils::time::time_millis(), utils::shortid(), suffix));
        fs::write(&path, content).map_err(|e| NodeflowError::IoError(format!("failed to write {}: {}", path.display(), e)))?;
        tracing::trace!(path = %path.display(), "scratch file created");

        self.files.lock().unwrap_or_else(PoisonError::into_inner).insert(path.clone());
        Ok(path)
    }

    /// Like [`ScratchDir::create`], but the file is removed when the guard drops.
    pub fn create_guarded(
        self: &Arc<Self>,
        content: &str,
        suffix: &str,
    ) -> Result<ScratchFile> {
        let path = self.create(content, suffix)?;
        Ok(ScratchFile {
            dir: self.clone(),
            path,
        })
    }

    /// Delete one file. Failures are logged, never returned.
    pub fn remove(
        &self,
        path: &Path,
    ) {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).remove(path);
        match fs::remove_file(path) {
            Ok(()) => tracing::trace!(path = %path.display(), "scratch file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file"),
        }
    }

    /// Delete every file this instance created and still tracks.
    pub fn clear(&self) {
        let files: Vec<PathBuf> = self.files.lock().unwrap_or_else(PoisonError::into_inner).drain().collect();
        for path in files {
            self.remove(&path);
        }
    }

    pub fn tracked(&self) -> usize {
        self.files.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Removes its file on drop.
pub struct ScratchFile {
    dir: Arc<ScratchDir>,
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.dir.remove(&self.path);
    }
}
