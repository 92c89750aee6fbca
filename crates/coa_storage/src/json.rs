//! JSON-file checkpoint backend.
//!
//! The whole checkpoint is rewritten on every change, but through a sibling
//! temporary file that is synced and then renamed over the target. Readers
//! therefore only ever see a complete file.

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointRecord, CheckpointResult, CheckpointStore};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Checkpoint stored as a single JSON document
#[derive(Debug)]
pub struct JsonCheckpointStore {
    /// Target file
    path: PathBuf,
    /// In-memory copy, always equal to what is on disk
    checkpoint: Checkpoint,
}

impl JsonCheckpointStore {
    /// Open a checkpoint file, starting empty if it does not exist yet
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn open(path: impl AsRef<Path>) -> CheckpointResult<Self> {
        let path = path.as_ref().to_path_buf();
        let checkpoint = match fs::read_to_string(&path) {
            Ok(json) => Checkpoint::from_json(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Checkpoint::new(),
            Err(e) => return Err(CheckpointError::io(&path, e)),
        };
        debug!(path = %path.display(), entries = checkpoint.len(), "opened json checkpoint");
        Ok(Self { path, checkpoint })
    }

    /// Path of the checkpoint file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `checkpoint` to disk atomically
    fn persist(&self, checkpoint: &Checkpoint) -> CheckpointResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CheckpointError::io(parent, e))?;
        }

        let json = checkpoint.to_json()?;
        let tmp = tmp_path(&self.path);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)
                .map_err(|e| CheckpointError::io(&tmp, e))?;
            file.write_all(json.as_bytes())
                .and_then(|()| file.sync_all())
                .map_err(|e| CheckpointError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| CheckpointError::io(&self.path, e))?;
        sync_parent(&self.path);
        Ok(())
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn get(&self, identifier: &str) -> Option<CheckpointRecord> {
        self.checkpoint.get(identifier).cloned()
    }

    fn record(&mut self, identifier: &str, record: CheckpointRecord) -> CheckpointResult<()> {
        let mut next = self.checkpoint.clone();
        next.insert(identifier, record)?;
        self.persist(&next)?;
        self.checkpoint = next;
        Ok(())
    }

    fn set_last_batch_index(&mut self, index: usize) -> CheckpointResult<()> {
        let mut next = self.checkpoint.clone();
        next.last_batch_index = index;
        self.persist(&next)?;
        self.checkpoint = next;
        Ok(())
    }

    fn snapshot(&self) -> Checkpoint {
        self.checkpoint.clone()
    }

    fn len(&self) -> usize {
        self.checkpoint.len()
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Make the rename itself durable. Best effort: not every platform lets a
/// directory be opened for syncing.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}
