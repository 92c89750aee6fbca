//! Embedded key-value checkpoint backend.
//!
//! Each entry is its own `redb` write transaction, committed with immediate
//! durability before `record` returns.

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointRecord, CheckpointResult, CheckpointStore};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::debug;

/// identifier -> JSON-encoded [`CheckpointRecord`]
const MINTED: TableDefinition<&str, &str> = TableDefinition::new("minted_certificates");

/// Scalar run metadata
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const LAST_BATCH_INDEX: &str = "last_batch_index";

fn db_err<E: Into<redb::Error>>(err: E) -> CheckpointError {
    CheckpointError::Database(err.into())
}

/// Checkpoint stored in a `redb` database file
pub struct RedbCheckpointStore {
    /// Database handle
    db: Database,
    /// Database file
    path: PathBuf,
    /// Cached contents, updated only after a successful commit
    checkpoint: Checkpoint,
}

impl RedbCheckpointStore {
    /// Open or create the database and load its contents
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or holds invalid entries
    pub fn open(path: impl AsRef<Path>) -> CheckpointResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::io(parent, e))?;
        }

        let db = Database::create(&path).map_err(db_err)?;

        // Make sure both tables exist so read transactions can open them
        let txn = db.begin_write().map_err(db_err)?;
        {
            txn.open_table(MINTED).map_err(db_err)?;
            txn.open_table(META).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;

        let checkpoint = Self::load(&db)?;
        debug!(path = %path.display(), entries = checkpoint.len(), "opened redb checkpoint");
        Ok(Self { db, path, checkpoint })
    }

    fn load(db: &Database) -> CheckpointResult<Checkpoint> {
        let mut checkpoint = Checkpoint::new();
        let txn = db.begin_read().map_err(db_err)?;

        let minted = txn.open_table(MINTED).map_err(db_err)?;
        for item in minted.iter().map_err(db_err)? {
            let (key, value) = item.map_err(db_err)?;
            let record: CheckpointRecord = serde_json::from_str(value.value())?;
            checkpoint.minted_certificates.insert(key.value().to_string(), record);
        }

        let meta = txn.open_table(META).map_err(db_err)?;
        if let Some(index) = meta.get(LAST_BATCH_INDEX).map_err(db_err)? {
            checkpoint.last_batch_index = usize::try_from(index.value()).unwrap_or(usize::MAX);
        }

        Ok(checkpoint)
    }

    /// Path of the database file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for RedbCheckpointStore {
    fn get(&self, identifier: &str) -> Option<CheckpointRecord> {
        self.checkpoint.get(identifier).cloned()
    }

    fn record(&mut self, identifier: &str, record: CheckpointRecord) -> CheckpointResult<()> {
        if self.checkpoint.get(identifier).is_some() {
            return Err(CheckpointError::AlreadyRecorded {
                identifier: identifier.to_string(),
            });
        }

        let encoded = serde_json::to_string(&record)?;
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(MINTED).map_err(db_err)?;
            table.insert(identifier, encoded.as_str()).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;

        self.checkpoint.insert(identifier, record)
    }

    fn set_last_batch_index(&mut self, index: usize) -> CheckpointResult<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(META).map_err(db_err)?;
            table.insert(LAST_BATCH_INDEX, index as u64).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;

        self.checkpoint.last_batch_index = index;
        Ok(())
    }

    fn snapshot(&self) -> Checkpoint {
        self.checkpoint.clone()
    }

    fn len(&self) -> usize {
        self.checkpoint.len()
    }
}
