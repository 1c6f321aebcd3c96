//! StatusStore — redb-backed persistence for completed jobs.
//!
//! Values are JSON-serialized `CompletedJobRecord`s in a single table keyed
//! by job id. Every write commits its own transaction, so a record is
//! durable once `append` returns.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable, StorageError};
use tracing::{debug, info, warn};

use scribe_core::epoch_millis;

use crate::error::{StateError, StateResult};
use crate::tables::COMPLETED_JOBS;
use crate::types::CompletedJobRecord;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe status store backed by redb.
#[derive(Clone)]
pub struct StatusStore {
    db: Arc<Database>,
}

impl StatusStore {
    /// Open (or create) the store at `path`.
    ///
    /// A corrupt file is removed and recreated empty, and a table holding
    /// undecodable records is cleared. Any other open failure (lock held by
    /// another handle, I/O trouble) is returned and the file is left alone.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = match Database::create(path) {
            Ok(db) => db,
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                return Err(StateError::Locked(path.display().to_string()));
            }
            Err(e) if is_corruption(&e) => {
                warn!(?path, error = %e, "status store corrupt, reinitializing");
                std::fs::remove_file(path).map_err(map_err!(Reset))?;
                Database::create(path).map_err(map_err!(Open))?
            }
            Err(e) => return Err(StateError::Open(e.to_string())),
        };
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        store.heal()?;
        debug!(?path, records = store.len()?, "status store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory status store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Reinitialize the table if any record fails to read or decode.
    ///
    /// Returns the number of bad records found.
    fn heal(&self) -> StateResult<usize> {
        let bad = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
            let mut bad = 0;
            for entry in table.iter().map_err(map_err!(Read))? {
                match entry {
                    Ok((_, value)) => {
                        if serde_json::from_slice::<CompletedJobRecord>(value.value()).is_err() {
                            bad += 1;
                        }
                    }
                    Err(_) => bad += 1,
                }
            }
            bad
        };

        if bad == 0 {
            return Ok(0);
        }

        warn!(bad, "status store holds undecodable records, reinitializing");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.delete_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
        txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        info!("status store reinitialized empty");
        Ok(bad)
    }

    /// Insert or replace the record for `record.id`.
    ///
    /// Returns true when the id was not stored before.
    pub fn append(&self, record: &CompletedJobRecord) -> StateResult<bool> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut table = txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
            inserted = table
                .insert(record.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?
                .is_none();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(job_id = %record.id, inserted, "completed job stored");
        Ok(inserted)
    }

    /// Get the stored record for a job id.
    pub fn lookup(&self, job_id: &str) -> StateResult<Option<CompletedJobRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
        match table.get(job_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: CompletedJobRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// All stored records, oldest completion first.
    pub fn list_completed(&self) -> StateResult<Vec<CompletedJobRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: CompletedJobRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        results.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(results)
    }

    /// Number of stored records.
    pub fn len(&self) -> StateResult<usize> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
        let mut count = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            entry.map_err(map_err!(Read))?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> StateResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop records that completed more than `max_age` ago.
    pub fn prune(&self, max_age: Duration) -> StateResult<u32> {
        let cutoff = epoch_millis().saturating_sub(max_age.as_millis() as u64);
        self.prune_before(cutoff)
    }

    /// Drop records with `completed_at < cutoff_ms`. Nothing is written
    /// when no record qualifies.
    pub fn prune_before(&self, cutoff_ms: u64) -> StateResult<u32> {
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    let record: CompletedJobRecord =
                        serde_json::from_slice(value.value()).ok()?;
                    (record.completed_at < cutoff_ms).then(|| key.value().to_string())
                })
                .collect()
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(COMPLETED_JOBS).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(removed = count, cutoff_ms, "pruned completed jobs");
        Ok(count)
    }
}

/// Errors that mean the file content is unusable, as opposed to the file
/// being unreachable right now.
fn is_corruption(e: &DatabaseError) -> bool {
    match e {
        DatabaseError::Storage(StorageError::Corrupted(_)) => true,
        // Bad magic number or a truncated header.
        DatabaseError::Storage(StorageError::Io(io)) => {
            matches!(io.kind(), ErrorKind::InvalidData | ErrorKind::UnexpectedEof)
        }
        _ => false,
    }
}
