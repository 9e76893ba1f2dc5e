//! Redb-backed persistent catalog and camera log.
//!
//! Both live in one database file. Every mutation runs in its own write
//! transaction, so a batch that fails midway leaves the mutations made
//! before the failure committed.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

use crate::camlog::{CameraLog, CameraLogEntry};
use crate::catalog::{Catalog, IdentityRecord};
use crate::error::store_err;
use crate::vector::Embedding;
use crate::FaceIdError;

const IDENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("identities");
const CAMERA_LOGS: TableDefinition<u64, &[u8]> = TableDefinition::new("camera_logs");
/// `(camera_id, sequence)` index into `CAMERA_LOGS`.
const CAMERA_INDEX: TableDefinition<(&str, u64), ()> = TableDefinition::new("camera_index");

/// Opens or creates the database at `path` and returns handles to its
/// catalog and camera log.
pub fn open<P: AsRef<Path>>(path: P) -> Result<(RedbCatalog, RedbCameraLog), FaceIdError> {
    let db = Database::create(path).map_err(store_err)?;

    // Create the tables if they don't exist.
    let tx = db.begin_write().map_err(store_err)?;
    {
        tx.open_table(IDENTITIES).map_err(store_err)?;
        tx.open_table(CAMERA_LOGS).map_err(store_err)?;
        tx.open_table(CAMERA_INDEX).map_err(store_err)?;
    }
    tx.commit().map_err(store_err)?;

    let db = Arc::new(db);
    Ok((
        RedbCatalog { db: Arc::clone(&db) },
        RedbCameraLog { db },
    ))
}

/// Persistent [`Catalog`]. Records are stored as JSON keyed by identity id.
pub struct RedbCatalog {
    db: Arc<Database>,
}

impl Catalog for RedbCatalog {
    fn all(&self) -> Result<Vec<IdentityRecord>, FaceIdError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(IDENTITIES).map_err(store_err)?;

        let mut records = Vec::new();
        for item in table.iter().map_err(store_err)? {
            let (_, value) = item.map_err(store_err)?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    fn get(&self, identity_id: u64) -> Result<Option<IdentityRecord>, FaceIdError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(IDENTITIES).map_err(store_err)?;

        let record = match table.get(identity_id).map_err(store_err)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(record)
    }

    fn insert(&mut self, record: IdentityRecord) -> Result<(), FaceIdError> {
        let bytes = serde_json::to_vec(&record)?;
        let tx = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = tx.open_table(IDENTITIES).map_err(store_err)?;
            let exists = table.get(record.identity_id).map_err(store_err)?.is_some();
            if exists {
                return Err(FaceIdError::DuplicateIdentity(record.identity_id));
            }
            table
                .insert(record.identity_id, bytes.as_slice())
                .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    fn update_prototype(
        &mut self,
        identity_id: u64,
        prototype: Embedding,
        observation_count: u64,
    ) -> Result<(), FaceIdError> {
        let tx = self.db.begin_write().map_err(store_err)?;
        {
            let mut table = tx.open_table(IDENTITIES).map_err(store_err)?;
            let mut record: IdentityRecord = match table.get(identity_id).map_err(store_err)? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(FaceIdError::UnknownIdentity(identity_id)),
            };
            record.prototype = prototype;
            record.observation_count = observation_count;

            let bytes = serde_json::to_vec(&record)?;
            table
                .insert(identity_id, bytes.as_slice())
                .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    fn len(&self) -> Result<usize, FaceIdError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(IDENTITIES).map_err(store_err)?;
        Ok(table.len().map_err(store_err)? as usize)
    }

    fn max_identity_id(&self) -> Result<Option<u64>, FaceIdError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(IDENTITIES).map_err(store_err)?;
        let last = table.last().map_err(store_err)?.map(|(k, _)| k.value());
        Ok(last)
    }
}

/// Persistent [`CameraLog`]. Entries are stored as JSON keyed by sequence.
pub struct RedbCameraLog {
    db: Arc<Database>,
}

impl CameraLog for RedbCameraLog {
    fn append(&self, entry: &CameraLogEntry) -> Result<u64, FaceIdError> {
        let bytes = serde_json::to_vec(entry)?;
        let tx = self.db.begin_write().map_err(store_err)?;
        let seq;
        {
            let mut table = tx.open_table(CAMERA_LOGS).map_err(store_err)?;
            let last = table.last().map_err(store_err)?.map(|(k, _)| k.value());
            seq = last.unwrap_or(0) + 1;
            table.insert(seq, bytes.as_slice()).map_err(store_err)?;

            let mut index = tx.open_table(CAMERA_INDEX).map_err(store_err)?;
            index
                .insert((entry.camera_id.as_str(), seq), ())
                .map_err(store_err)?;
        }
        tx.commit().map_err(store_err)?;
        Ok(seq)
    }

    fn entries(&self) -> Result<Vec<CameraLogEntry>, FaceIdError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let table = tx.open_table(CAMERA_LOGS).map_err(store_err)?;

        let mut entries = Vec::new();
        for item in table.iter().map_err(store_err)? {
            let (_, value) = item.map_err(store_err)?;
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }

    fn entries_for_camera(&self, camera_id: &str) -> Result<Vec<CameraLogEntry>, FaceIdError> {
        let tx = self.db.begin_read().map_err(store_err)?;
        let index = tx.open_table(CAMERA_INDEX).map_err(store_err)?;
        let table = tx.open_table(CAMERA_LOGS).map_err(store_err)?;

        let mut entries = Vec::new();
        let range = index
            .range((camera_id, 0u64)..=(camera_id, u64::MAX))
            .map_err(store_err)?;
        for item in range {
            let (key, _) = item.map_err(store_err)?;
            let (_, seq) = key.value();
            let Some(value) = table.get(seq).map_err(store_err)? else {
                return Err(FaceIdError::Store(format!(
                    "camera index points at missing entry {seq}"
                )));
            };
            entries.push(serde_json::from_slice(value.value())?);
        }
        Ok(entries)
    }
}
