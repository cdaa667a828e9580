//! The shallow-commits file.
//!
//! A shallow repository records its history boundary as a newline-separated
//! list of hex OIDs. This is the only repository file the fetch core writes
//! directly; updates go through the lock file discipline, and concurrent
//! modification is detected by comparing the file's mtime against a snapshot
//! taken before negotiation started.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use gitfetch_hash::ObjectId;
use gitfetch_utils::LockFile;

use crate::StoreError;

/// Handle to a repository's shallow file.
pub struct ShallowFile {
    path: PathBuf,
}

/// Failure modes of a guarded shallow-set update.
#[derive(Debug, thiserror::Error)]
pub enum ShallowUpdateError {
    #[error("shallow file was changed during fetch")]
    Changed,

    #[error("shallow file was removed during fetch")]
    Removed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Snapshot of the shallow file's modification state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShallowStamp {
    /// File did not exist at snapshot time.
    Absent,
    /// File existed with this mtime.
    ModifiedAt(SystemTime),
}

impl ShallowFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current shallow set. A missing file is an empty set.
    /// Malformed lines are ignored, matching a tolerant reader's view of a
    /// file some other tool may have touched.
    pub fn load(&self) -> Result<Vec<ObjectId>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut commits = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if let Ok(oid) = ObjectId::from_hex(line.trim()) {
                commits.push(oid);
            }
        }
        Ok(commits)
    }

    /// Snapshot the file's modification state for later drift detection.
    pub fn stamp(&self) -> ShallowStamp {
        match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => ShallowStamp::ModifiedAt(mtime),
            Err(_) => ShallowStamp::Absent,
        }
    }

    /// Whether the file's state still matches a snapshot.
    pub fn matches(&self, stamp: ShallowStamp) -> bool {
        self.stamp() == stamp
    }

    /// Replace the shallow set under lock.
    ///
    /// An empty set deletes the file (a repository with no boundary is not
    /// shallow at all); otherwise the new set is written and committed
    /// atomically. Any error path rolls the lock back.
    pub fn write_set(&self, commits: &[ObjectId]) -> Result<(), StoreError> {
        let lock = LockFile::acquire(&self.path).map_err(StoreError::from)?;
        self.write_locked(lock, commits)
    }

    /// Replace the shallow set under lock, but only if the file still
    /// matches the snapshot taken before negotiation started. The check
    /// runs after lock acquisition so a concurrent writer cannot slip in
    /// between the comparison and the update.
    pub fn commit_update(
        &self,
        commits: &[ObjectId],
        expected: ShallowStamp,
    ) -> Result<(), ShallowUpdateError> {
        let lock = LockFile::acquire(&self.path).map_err(StoreError::from)?;
        let now = self.stamp();
        if now != expected {
            // The lock rolls back on drop.
            return Err(match (expected, now) {
                (ShallowStamp::ModifiedAt(_), ShallowStamp::Absent) => ShallowUpdateError::Removed,
                _ => ShallowUpdateError::Changed,
            });
        }
        self.write_locked(lock, commits)?;
        Ok(())
    }

    fn write_locked(&self, mut lock: LockFile, commits: &[ObjectId]) -> Result<(), StoreError> {
        if commits.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            lock.rollback().map_err(StoreError::from)?;
            return Ok(());
        }
        for oid in commits {
            writeln!(lock, "{oid}")?;
        }
        lock.commit().map_err(StoreError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from([n; 20])
    }

    #[test]
    fn missing_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = ShallowFile::new(dir.path().join("shallow"));
        assert!(shallow.load().unwrap().is_empty());
        assert_eq!(shallow.stamp(), ShallowStamp::Absent);
    }

    #[test]
    fn write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = ShallowFile::new(dir.path().join("shallow"));
        shallow.write_set(&[oid(1), oid(2)]).unwrap();

        let loaded = shallow.load().unwrap();
        assert_eq!(loaded, vec![oid(1), oid(2)]);

        let text = fs::read_to_string(shallow.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn empty_set_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = ShallowFile::new(dir.path().join("shallow"));
        shallow.write_set(&[oid(1)]).unwrap();
        assert!(shallow.path().exists());

        shallow.write_set(&[]).unwrap();
        assert!(!shallow.path().exists());
        assert!(!dir.path().join("shallow.lock").exists());
    }

    #[test]
    fn stamp_detects_modification() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = ShallowFile::new(dir.path().join("shallow"));
        shallow.write_set(&[oid(1)]).unwrap();

        let stamp = shallow.stamp();
        assert!(shallow.matches(stamp));

        // Rewrite with a distinct mtime.
        let later = SystemTime::now() + std::time::Duration::from_secs(10);
        fs::write(shallow.path(), "junk\n").unwrap();
        let f = fs::File::open(shallow.path()).unwrap();
        f.set_modified(later).unwrap();

        assert!(!shallow.matches(stamp));
    }

    #[test]
    fn stamp_detects_removal() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = ShallowFile::new(dir.path().join("shallow"));
        shallow.write_set(&[oid(1)]).unwrap();

        let stamp = shallow.stamp();
        fs::remove_file(shallow.path()).unwrap();
        assert!(!shallow.matches(stamp));
    }

    #[test]
    fn guarded_update_applies_when_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = ShallowFile::new(dir.path().join("shallow"));
        shallow.write_set(&[oid(1)]).unwrap();

        let stamp = shallow.stamp();
        shallow.commit_update(&[oid(2)], stamp).unwrap();
        assert_eq!(shallow.load().unwrap(), vec![oid(2)]);
    }

    #[test]
    fn guarded_update_detects_change() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = ShallowFile::new(dir.path().join("shallow"));

        // Snapshot taken when the file did not exist; it appears later.
        let stamp = shallow.stamp();
        fs::write(shallow.path(), "interloper\n").unwrap();

        let err = shallow.commit_update(&[oid(2)], stamp).unwrap_err();
        assert!(matches!(err, ShallowUpdateError::Changed));
        // The failed update left no lock behind.
        assert!(!dir.path().join("shallow.lock").exists());
    }

    #[test]
    fn guarded_update_detects_removal() {
        let dir = tempfile::tempdir().unwrap();
        let shallow = ShallowFile::new(dir.path().join("shallow"));
        shallow.write_set(&[oid(1)]).unwrap();

        let stamp = shallow.stamp();
        fs::remove_file(shallow.path()).unwrap();

        let err = shallow.commit_update(&[oid(2)], stamp).unwrap_err();
        assert!(matches!(err, ShallowUpdateError::Removed));
    }

    #[test]
    fn ignores_junk_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shallow");
        fs::write(&path, format!("{}\nnot-a-hash\n\n", oid(7))).unwrap();
        let shallow = ShallowFile::new(&path);
        assert_eq!(shallow.load().unwrap(), vec![oid(7)]);
    }
}
