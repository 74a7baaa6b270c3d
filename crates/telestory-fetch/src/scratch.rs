//! Scratch files owned by a single fetched item.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A downloaded file in scratch storage.
///
/// The file is deleted when the handle is dropped, so every exit path of
/// whoever owns it (success, error, cancellation, panic) leaves no file
/// behind. Use [`ScratchFile::remove`] to delete it from async code.
#[derive(Debug)]
pub struct ScratchFile {
    path: Option<PathBuf>,
}

impl ScratchFile {
    /// Take ownership of an existing file; it is deleted when the handle drops.
    pub fn adopt(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub fn path(&self) -> &Path {
        // `path` is only taken by `remove`, which consumes `self`.
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Lower-cased extension without the leading dot.
    pub fn extension(&self) -> Option<String> {
        self.path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Delete the file now.
    pub async fn remove(mut self) {
        if let Some(path) = self.path.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "scratch file removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove scratch file"),
            }
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "scratch file removed on drop"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove scratch file"),
            }
        }
    }
}
