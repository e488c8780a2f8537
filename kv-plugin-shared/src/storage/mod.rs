//! KV Storage Engine: a durable file-backed map with per-key exclusive
//! locking and mandatory fsync (§4.C).

use crate::error::{Result, StorageError};
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Maximum length of the `kv-data-<key>` filename fragment we're willing to
/// write, a conservative margin under common filesystem name limits (§9).
const MAX_KEY_LEN: usize = 200;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A durable, file-backed key-value store rooted at one directory.
#[derive(Clone)]
pub struct KvStore {
    dir: PathBuf,
    lock_timeout: Duration,
    started_at: Instant,
}

impl KvStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, lock_timeout: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock_timeout,
            started_at: Instant::now(),
        })
    }

    /// Seconds since this store (i.e. the server process) started, used for
    /// the enrichment `received_at` field (§3, §4.D).
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("kv-data-{key}")))
    }

    /// Write `value` under `key`, fsync'd before returning (§3, §4.C).
    ///
    /// `put("", _)` is a silent no-op (§4.C).
    pub async fn put(&self, key: String, value: Vec<u8>) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        let path = self.path_for(&key)?;
        let lock_timeout = self.lock_timeout;
        tokio::task::spawn_blocking(move || put_blocking(&path, &key, &value, lock_timeout))
            .await
            .expect("storage put task panicked")
    }

    /// Read the bytes stored under `key`, or `StorageError::NotFound`.
    ///
    /// `get("")` returns empty bytes without error (§4.C).
    pub async fn get(&self, key: String) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Ok(Vec::new());
        }
        let path = self.path_for(&key)?;
        tokio::task::spawn_blocking(move || get_blocking(&path, &key))
            .await
            .expect("storage get task panicked")
    }

    /// Paths the server has actually written, matching existing `kv-data-*`
    /// files under the store directory — used by the harness to prove
    /// server participation (§6 "Filesystem layout").
    pub fn written_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("kv-data-"))
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.contains('\0') {
        return Err(StorageError::FilesystemConstraint {
            key: key.to_string(),
            reason: "key contains a NUL byte".to_string(),
        }
        .into());
    }
    if key.contains('/') || key.contains('\\') {
        return Err(StorageError::FilesystemConstraint {
            key: key.to_string(),
            reason: "key contains a path separator".to_string(),
        }
        .into());
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StorageError::FilesystemConstraint {
            key: key.to_string(),
            reason: format!("key exceeds {MAX_KEY_LEN} bytes"),
        }
        .into());
    }
    Ok(())
}

fn put_blocking(path: &Path, key: &str, value: &[u8], lock_timeout: Duration) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    acquire_exclusive(&file, key, lock_timeout)?;

    // The lock is held across truncate + write + fsync so a concurrent
    // reader can never observe a torn write (§4.C, §9 cancellation note).
    let result = (|| -> Result<()> {
        file.set_len(0)?;
        let mut file = &file;
        file.write_all(value)?;
        file.sync_all()?;
        Ok(())
    })();

    let _ = file.unlock();
    result
}

fn get_blocking(path: &Path, key: &str) -> Result<Vec<u8>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            }
            .into())
        }
        Err(e) => return Err(e.into()),
    };

    // A shared lock is sufficient: it only needs to exclude an in-progress
    // writer, and full-file reads are otherwise atomic enough for our
    // purposes once the writer's exclusive lock has been released.
    file.lock_shared().map_err(|e| StorageError::Io {
        key: key.to_string(),
        source: e,
    })?;

    let mut buf = Vec::new();
    let mut file_ref = &file;
    let result = file_ref.read_to_end(&mut buf).map(|_| buf);

    let _ = file.unlock();
    result.map_err(|e| {
        StorageError::Io {
            key: key.to_string(),
            source: e,
        }
        .into()
    })
}

fn acquire_exclusive(file: &File, key: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source: e,
                }
                .into())
            }
        }
        if Instant::now() >= deadline {
            return Err(StorageError::LockTimeout {
                key: key.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }
            .into());
        }
        std::thread::sleep(LOCK_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests;
