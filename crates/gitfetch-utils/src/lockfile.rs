use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// RAII lock file guard following git's lock protocol:
///
/// - create `<path>.lock` with O_CREAT|O_EXCL
/// - write the replacement contents into the lock file
/// - `commit()` atomically renames `.lock` over the target
/// - dropping without commit removes `.lock` (rollback)
///
/// The shallow-state file is updated through this guard so that a fetch
/// killed mid-write never leaves a torn shallow file behind.
pub struct LockFile {
    /// Target path (without the .lock suffix).
    path: PathBuf,
    /// The held lock file path (with the .lock suffix).
    lock_path: PathBuf,
    file: Option<File>,
    resolved: bool,
}

impl LockFile {
    /// Take the lock for `path`. Fails with `LockError::AlreadyLocked` if
    /// another process holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock_path = PathBuf::from(format!("{}{}", path.display(), LOCK_SUFFIX));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    UtilError::Lock(LockError::AlreadyLocked {
                        path: lock_path.clone(),
                    })
                } else {
                    UtilError::Lock(LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            })?;

        Ok(Self {
            path,
            lock_path,
            file: Some(file),
            resolved: false,
        })
    }

    /// Target path this lock protects.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the `.lock` file itself.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, fsync, and atomically rename the lock file over the target.
    pub fn commit(mut self) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush()
                .and_then(|()| file.sync_all())
                .map_err(|e| {
                    UtilError::Lock(LockError::Commit {
                        path: self.lock_path.clone(),
                        source: e,
                    })
                })?;
        }
        // The handle must be closed before the rename on some platforms.
        self.file.take();

        fs::rename(&self.lock_path, &self.path).map_err(|e| {
            UtilError::Lock(LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })
        })?;

        self.resolved = true;
        Ok(())
    }

    /// Discard the lock file, leaving the target untouched.
    pub fn rollback(mut self) -> Result<()> {
        self.file.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)?;
        }
        self.resolved = true;
        Ok(())
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.resolved {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}
