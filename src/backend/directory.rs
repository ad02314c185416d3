//! Local filesystem directory backend: each object is a file in a
//! directory whose path is the backend identifier.

use super::{Backend, BackendError, BackendResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Prefix used for temporary files during a `put`. Objects may never be
/// named with this prefix; it is hidden from `list()` and anything left
/// over from a crashed `put` is cleaned up on construction.
const HIDDEN_PREFIX: &str = ".cairn-tmp.";

pub struct DirectoryBackend {
    path: PathBuf,
}

impl DirectoryBackend {
    /// # Errors
    /// Returns an error if the directory cannot be created or a stale
    /// temporary file cannot be removed.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(HIDDEN_PREFIX) {
                let _ = fs::remove_file(entry.path());
            }
        }
        Ok(Self { path })
    }
}

fn check_name(name: &str) -> BackendResult<()> {
    if name.starts_with(HIDDEN_PREFIX) {
        return Err(BackendError::Io(std::io::Error::other(format!(
            "object name {name:?} collides with the internal temp-file prefix"
        ))));
    }
    Ok(())
}

impl Backend for DirectoryBackend {
    fn put(&mut self, name: &str, data: &[u8]) -> BackendResult<()> {
        check_name(name)?;
        let tmp_name = format!("{HIDDEN_PREFIX}{}.{}", std::process::id(), name);
        let tmp_path = self.path.join(&tmp_name);
        let mut f = fs::File::create(&tmp_path)?;
        f.write_all(data)?;
        // Critical: without this fsync, a crash between write and rename
        // can leave the renamed file containing garbage rather than just
        // being absent.
        f.sync_all()?;
        drop(f);
        fs::rename(&tmp_path, self.path.join(name))?;
        Ok(())
    }

    fn get(&mut self, name: &str) -> BackendResult<Vec<u8>> {
        check_name(name)?;
        fs::read(self.path.join(name)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::NotFound(name.to_string())
            } else {
                BackendError::Io(e)
            }
        })
    }

    fn list(&mut self) -> BackendResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let fname = entry.file_name().to_string_lossy().into_owned();
            if !fname.starts_with(HIDDEN_PREFIX) {
                names.push(fname);
            }
        }
        Ok(names)
    }

    fn delete(&mut self, name: &str) -> BackendResult<()> {
        check_name(name)?;
        match fs::remove_file(self.path.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(name.to_string()))
            }
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    fn exists(&mut self) -> BackendResult<bool> {
        Ok(self.path.exists())
    }

    fn create(&mut self) -> BackendResult<()> {
        fs::create_dir_all(&self.path)?;
        Ok(())
    }
}
