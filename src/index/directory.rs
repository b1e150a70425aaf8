//! Where index snapshots live.
//!
//! A [`Directory`] persists whole snapshots and hands out the single write
//! lock of an index. [`FsDirectory`] keeps one checksummed bincode file per
//! index directory; [`RamDirectory`] keeps the snapshot in memory for tests
//! and throwaway indexes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use parking_lot::RwLock;

use crate::error::{QuarryError, Result};
use crate::index::snapshot::IndexSnapshot;

const SNAPSHOT_FILE: &str = "snapshot.bin";
const SNAPSHOT_TEMP_FILE: &str = "snapshot.bin.tmp";
const LOCK_FILE: &str = "write.lock";
const MAGIC: &[u8; 4] = b"QRRY";
const FORMAT_VERSION: u32 = 1;

/// Exclusive right to write an index, released on drop.
pub struct WriteLock {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl WriteLock {
    fn new<F: FnOnce() + Send + 'static>(release: F) -> Self {
        WriteLock {
            release: Some(Box::new(release)),
        }
    }

    /// Release the lock now instead of at drop.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for WriteLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteLock")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Storage of index snapshots.
pub trait Directory: Send + Sync + std::fmt::Debug {
    /// Latest committed snapshot, `None` for a fresh index.
    fn load(&self) -> Result<Option<Arc<IndexSnapshot>>>;

    /// Replace the committed snapshot.
    fn store(&self, snapshot: &IndexSnapshot) -> Result<()>;

    /// Take the write lock; fails when another writer holds it.
    fn obtain_lock(&self) -> Result<WriteLock>;

    /// Human readable location, also used as cache key.
    fn location(&self) -> String;
}

/// Snapshot file inside a filesystem directory.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
}

impl FsDirectory {
    /// Open (creating if needed) the directory at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        if !path.is_dir() {
            return Err(QuarryError::index(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }
        Ok(FsDirectory { path })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(snapshot: &IndexSnapshot) -> Result<Vec<u8>> {
        let payload = bincode::serialize(snapshot)?;
        let mut bytes = Vec::with_capacity(payload.len() + 12);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<IndexSnapshot> {
        let corrupt = |what: &str| {
            QuarryError::conversion(
                format!("snapshot in {}", self.path.display()),
                io::Error::new(io::ErrorKind::InvalidData, what.to_string()),
            )
        };

        if bytes.len() < 12 || &bytes[0..4] != MAGIC {
            return Err(corrupt("not a snapshot file"));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(&format!("unsupported format version {version}")));
        }
        let checksum = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let payload = &bytes[12..];
        if crc32fast::hash(payload) != checksum {
            return Err(corrupt("checksum mismatch"));
        }
        bincode::deserialize(payload)
            .map_err(|e| QuarryError::conversion(format!("snapshot in {}", self.path.display()), e))
    }
}

impl Directory for FsDirectory {
    fn load(&self) -> Result<Option<Arc<IndexSnapshot>>> {
        let mut file = match File::open(self.path.join(SNAPSHOT_FILE)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let snapshot = self.decode(&bytes)?;
        debug!(
            "loaded snapshot generation {} from {}",
            snapshot.generation(),
            self.path.display()
        );
        Ok(Some(Arc::new(snapshot)))
    }

    fn store(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let bytes = Self::encode(snapshot)?;
        let temp = self.path.join(SNAPSHOT_TEMP_FILE);
        {
            let mut file = File::create(&temp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp, self.path.join(SNAPSHOT_FILE))?;
        Ok(())
    }

    fn obtain_lock(&self) -> Result<WriteLock> {
        let lock_path = self.path.join(LOCK_FILE);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    QuarryError::index(format!(
                        "index {} is locked by another writer ({})",
                        self.path.display(),
                        lock_path.display()
                    ))
                } else {
                    QuarryError::from(e)
                }
            })?;

        Ok(WriteLock::new(move || {
            if let Err(e) = fs::remove_file(&lock_path) {
                log::warn!("failed to release {}: {e}", lock_path.display());
            }
        }))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory directory; clones share the same contents.
#[derive(Debug, Clone)]
pub struct RamDirectory {
    name: String,
    snapshot: Arc<RwLock<Option<Arc<IndexSnapshot>>>>,
    locked: Arc<AtomicBool>,
}

impl RamDirectory {
    /// Create an empty directory with a display name.
    pub fn new<S: Into<String>>(name: S) -> Self {
        RamDirectory {
            name: name.into(),
            snapshot: Arc::new(RwLock::new(None)),
            locked: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for RamDirectory {
    fn default() -> Self {
        Self::new("ram")
    }
}

impl Directory for RamDirectory {
    fn load(&self) -> Result<Option<Arc<IndexSnapshot>>> {
        Ok(self.snapshot.read().clone())
    }

    fn store(&self, snapshot: &IndexSnapshot) -> Result<()> {
        *self.snapshot.write() = Some(Arc::new(snapshot.clone()));
        Ok(())
    }

    fn obtain_lock(&self) -> Result<WriteLock> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(QuarryError::index(format!(
                "index {} is locked by another writer",
                self.name
            )));
        }
        let locked = Arc::clone(&self.locked);
        Ok(WriteLock::new(move || locked.store(false, Ordering::Release)))
    }

    fn location(&self) -> String {
        format!("ram://{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_roundtrip() {
        let dir = TempDir::new().unwrap();
        let directory = FsDirectory::open(dir.path().join("news")).unwrap();
        assert!(directory.load().unwrap().is_none());

        let mut snapshot = IndexSnapshot::new();
        snapshot.dictionary_mut().increment_word("hello");
        snapshot.bump_generation();
        directory.store(&snapshot).unwrap();

        let loaded = directory.load().unwrap().unwrap();
        assert_eq!(*loaded, snapshot);
        assert!(!dir.path().join("news").join(SNAPSHOT_TEMP_FILE).exists());
    }

    #[test]
    fn test_fs_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let directory = FsDirectory::open(dir.path()).unwrap();
        directory.store(&IndexSnapshot::new()).unwrap();

        let path = dir.path().join(SNAPSHOT_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(directory.load(), Err(QuarryError::Conversion { .. })));
    }

    #[test]
    fn test_fs_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let directory = FsDirectory::open(dir.path()).unwrap();

        let lock = directory.obtain_lock().unwrap();
        assert!(directory.obtain_lock().is_err());
        lock.release();
        assert!(directory.obtain_lock().is_ok());
    }

    #[test]
    fn test_ram_directory_shares_state() {
        let directory = RamDirectory::new("test");
        let clone = directory.clone();
        clone.store(&IndexSnapshot::new()).unwrap();
        assert!(directory.load().unwrap().is_some());

        let lock = directory.obtain_lock().unwrap();
        assert!(clone.obtain_lock().is_err());
        drop(lock);
        assert!(clone.obtain_lock().is_ok());
        assert_eq!(directory.location(), "ram://test");
    }
}
