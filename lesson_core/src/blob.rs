//! Binary storage for uploaded audio and artwork.
//!
//! Blobs are opaque byte strings addressed by key. The file-backed store
//! keeps one file per key and holds an exclusive lock on its directory for
//! as long as it is open.

use crate::{Error, Result};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Key-value byte store
pub trait BlobStore {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn delete(&mut self, key: &str) -> Result<()>;
    fn clear(&mut self) -> Result<()>;

    /// Release the store; further use is an error
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

const LOCK_FILE: &str = ".lock";
const BLOB_EXTENSION: &str = "blob";

/// Directory-backed blob store
#[derive(Debug)]
pub struct FsBlobStore {
    dir: PathBuf,
    lock: Option<File>,
}

impl FsBlobStore {
    /// Open (creating if needed) the store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive().map_err(|e| {
            Error::Storage(format!("Blob store {:?} is in use: {}", dir, e))
        })?;

        tracing::debug!("Opened blob store at {:?}", dir);
        Ok(Self {
            dir,
            lock: Some(lock),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lock.is_none() {
            return Err(Error::Storage("Blob store is closed".into()));
        }
        Ok(())
    }

    /// Map a key onto a file name that is safe on every platform
    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for c in key.chars() {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                name.push(c);
            } else {
                name.push_str(&format!("%{:02X}", c as u32));
            }
        }
        self.dir.join(format!("{}.{}", name, BLOB_EXTENSION))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let path = self.path_for(key);

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Stored {} bytes under {}", bytes.len(), key);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.ensure_open()?;
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                tracing::debug!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut count = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == BLOB_EXTENSION) {
                std::fs::remove_file(&path)?;
                count += 1;
            }
        }
        tracing::info!("Cleared {} blobs", count);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(lock) = self.lock.take() {
            lock.unlock()?;
            tracing::debug!("Closed blob store at {:?}", self.dir);
        }
        Ok(())
    }
}

impl Drop for FsBlobStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to release blob store lock: {}", e);
        }
    }
}

/// In-memory blob store with optional write failures
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
    pub fail_writes: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Storage("write rejected".into()));
        }
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.blobs.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.check_writable()?;
        self.blobs.clear();
        Ok(())
    }
}
