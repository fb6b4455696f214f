//! File-per-message durable log
//!
//! Writes go to a hidden temporary file which is synced and then renamed over
//! the final name, followed by a sync of the directory. A record therefore
//! either exists completely or not at all. Distinct (topic, id) pairs touch
//! distinct files, so no global lock is taken.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::message::Message;
use crate::utils::error::PersistenceError;

const TEMP_SUFFIX: &str = ".tmp";
const MAX_COMPONENT_LEN: usize = 255;

/// Checks that `value` can be used as a single file name component.
/// Names starting with `.` are reserved for temporary files.
pub fn validate_component(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.len() > MAX_COMPONENT_LEN {
        return Err(format!("must be at most {MAX_COMPONENT_LEN} bytes"));
    }
    if value.starts_with('.') {
        return Err("must not start with '.'".to_string());
    }
    if value.contains(['/', '\\', '\0']) {
        return Err("must not contain '/', '\\' or NUL".to_string());
    }
    Ok(())
}

#[derive(Clone)]
pub struct DurableLog {
    root: PathBuf,
    next_seq: Arc<AtomicU64>,
}

impl DurableLog {
    /// Open or create the log rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| PersistenceError::io("create", &root, e))?;
        Ok(Self {
            root,
            next_seq: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hands out the next publish sequence number.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Makes sure future sequence numbers sort after `seq`.
    pub fn observe_sequence(&self, seq: u64) {
        self.next_seq.fetch_max(seq.saturating_add(1), Ordering::Relaxed);
    }

    pub fn record_path(&self, topic: &str, id: &str) -> PathBuf {
        self.root.join(topic).join(id)
    }

    /// Persist `message` under (topic, id). Once this returns `Ok` the record
    /// survives a crash.
    pub async fn write(&self, message: &Message) -> Result<(), PersistenceError> {
        let path = self.record_path(&message.topic, &message.id);
        for name in [&message.topic, &message.id] {
            validate_component(name).map_err(|reason| PersistenceError::io(
                "write",
                &path,
                io::Error::new(io::ErrorKind::InvalidInput, reason),
            ))?;
        }

        let dir = self.root.join(&message.topic);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => sync_dir(&self.root).await?,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(PersistenceError::io("create", &dir, e)),
        }

        let data = serde_json::to_vec(message)?;
        let tmp = dir.join(format!(".{}{TEMP_SUFFIX}", Uuid::new_v4()));

        if let Err(e) = write_synced(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(PersistenceError::io("rename", &path, e));
        }
        // the rename has landed, so the record exists either way
        if let Err(e) = sync_dir(&dir).await {
            warn!(topic = %message.topic, id = %message.id, error = %e, "record written but directory sync failed");
        }

        debug!(topic = %message.topic, id = %message.id, seq = message.seq, "persisted record");
        Ok(())
    }

    /// Remove the record for (topic, id). Returns whether a record existed.
    pub async fn delete(&self, topic: &str, id: &str) -> Result<bool, PersistenceError> {
        if validate_component(topic).is_err() || validate_component(id).is_err() {
            return Ok(false);
        }
        let path = self.record_path(topic, id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                if let Err(e) = sync_dir(&self.root.join(topic)).await {
                    warn!(%topic, %id, error = %e, "record removed but directory sync failed");
                }
                debug!(%topic, %id, "deleted record");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PersistenceError::io("delete", &path, e)),
        }
    }

    /// Names of every topic directory under the root, sorted.
    pub fn topics(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = fs::read_dir(&self.root).map_err(|e| PersistenceError::io("list", &self.root, e))?;

        let mut topics = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io("list", &self.root, e))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if validate_component(&name).is_ok() => topics.push(name),
                Ok(name) => warn!(dir = %name, "ignoring directory with an invalid topic name"),
                Err(name) => warn!(dir = ?name, "ignoring directory with a non UTF-8 name"),
            }
        }
        topics.sort();
        Ok(topics)
    }

    /// A lazy pass over every persisted record of `topic`. Each call starts a fresh pass.
    pub fn scan(&self, topic: &str) -> Result<LogScan, PersistenceError> {
        let dir = self.root.join(topic);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(PersistenceError::io("scan", &dir, e)),
        };
        Ok(LogScan {
            topic: topic.to_string(),
            dir,
            entries,
        })
    }

    /// Delete temporary files left behind by writes that never reached the rename.
    pub fn remove_stale_temp(&self, topic: &str) -> Result<usize, PersistenceError> {
        let dir = self.root.join(topic);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(PersistenceError::io("scan", &dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io("scan", &dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
                let path = entry.path();
                fs::remove_file(&path).map_err(|e| PersistenceError::io("delete", &path, e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for DurableLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLog")
            .field("root", &self.root)
            .field("next_seq", &self.next_seq.load(Ordering::Relaxed))
            .finish()
    }
}

/// Iterator returned by [`DurableLog::scan`]. Yields `(id, message)` pairs;
/// unreadable or mismatched records come out as errors so the caller can skip them.
#[derive(Debug)]
pub struct LogScan {
    topic: String,
    dir: PathBuf,
    entries: Option<fs::ReadDir>,
}

impl LogScan {
    fn read_record(&self, path: &Path, id: &str) -> Result<Message, PersistenceError> {
        let data = fs::read(path).map_err(|e| PersistenceError::io("read", path, e))?;
        let message: Message = serde_json::from_slice(&data).map_err(|e| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if message.topic != self.topic || message.id != id {
            return Err(PersistenceError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "record names {}/{} but is stored as {}/{}",
                    message.topic, message.id, self.topic, id
                ),
            });
        }
        Ok(message)
    }
}

impl Iterator for LogScan {
    type Item = Result<(String, Message), PersistenceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.as_mut()?.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(PersistenceError::io("scan", &self.dir, e))),
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let Ok(id) = entry.file_name().into_string() else {
                continue;
            };
            if !is_file || id.starts_with('.') {
                continue;
            }
            let path = entry.path();
            return Some(self.read_record(&path, &id).map(|message| (id, message)));
        }
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> Result<(), PersistenceError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| PersistenceError::io("create", path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| PersistenceError::io("write", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| PersistenceError::io("sync", path, e))?;
    Ok(())
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), PersistenceError> {
    let handle = tokio::fs::File::open(dir)
        .await
        .map_err(|e| PersistenceError::io("open", dir, e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| PersistenceError::io("sync", dir, e))
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), PersistenceError> {
    Ok(())
}
