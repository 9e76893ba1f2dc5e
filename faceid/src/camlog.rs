//! Camera event log and the queries built on it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::store_err;
use crate::time::DetectTime;
use crate::FaceIdError;

/// One resolved sighting of an identity by a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraLogEntry {
    pub camera_id: String,
    pub identity_id: u64,
    pub time_detect: DetectTime,
    pub face_image: String,
}

/// Append-only store of camera log entries.
///
/// Implementations must be safe for concurrent use.
pub trait CameraLog: Send + Sync {
    /// Stores an entry. Returns its sequence number (starting at 1).
    fn append(&self, entry: &CameraLogEntry) -> Result<u64, FaceIdError>;

    /// Returns all entries in insertion order.
    fn entries(&self) -> Result<Vec<CameraLogEntry>, FaceIdError>;

    /// Returns entries for any of the given identities, in insertion order.
    fn entries_for(&self, identity_ids: &HashSet<u64>) -> Result<Vec<CameraLogEntry>, FaceIdError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| identity_ids.contains(&e.identity_id))
            .collect())
    }

    /// Returns one camera's entries, in insertion order.
    fn entries_for_camera(&self, camera_id: &str) -> Result<Vec<CameraLogEntry>, FaceIdError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.camera_id == camera_id)
            .collect())
    }
}

/// In-memory [`CameraLog`]. Data is lost on restart.
#[derive(Default)]
pub struct MemoryCameraLog {
    entries: Mutex<Vec<CameraLogEntry>>,
}

impl MemoryCameraLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraLog for MemoryCameraLog {
    fn append(&self, entry: &CameraLogEntry) -> Result<u64, FaceIdError> {
        let mut entries = self.entries.lock().map_err(store_err)?;
        entries.push(entry.clone());
        Ok(entries.len() as u64)
    }

    fn entries(&self) -> Result<Vec<CameraLogEntry>, FaceIdError> {
        let entries = self.entries.lock().map_err(store_err)?;
        Ok(entries.clone())
    }

    fn entries_for_camera(&self, camera_id: &str) -> Result<Vec<CameraLogEntry>, FaceIdError> {
        let entries = self.entries.lock().map_err(store_err)?;
        Ok(entries
            .iter()
            .filter(|e| e.camera_id == camera_id)
            .cloned()
            .collect())
    }
}

/// Number of distinct people a camera saw during one minute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePoint {
    /// Start of the minute, Unix milliseconds.
    pub minute: i64,
    pub people: usize,
}

/// Groups `camera_id`'s entries by minute and counts distinct identities
/// per minute, ascending by minute.
pub fn people_per_minute(entries: &[CameraLogEntry], camera_id: &str) -> Vec<PresencePoint> {
    let mut buckets: BTreeMap<i64, BTreeSet<u64>> = BTreeMap::new();
    for e in entries.iter().filter(|e| e.camera_id == camera_id) {
        buckets
            .entry(e.time_detect.minute_bucket_millis())
            .or_default()
            .insert(e.identity_id);
    }
    buckets
        .into_iter()
        .map(|(minute, ids)| PresencePoint {
            minute,
            people: ids.len(),
        })
        .collect()
}

/// When and how a searched identity was seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    pub identity_id: u64,
    pub camera_id: String,
    pub time_detect: DetectTime,
    pub face_image: String,
}

/// Finds every sighting of identities whose id, student id, or display
/// name equals `keyword`, ascending by detection time.
pub fn search(
    catalog: &dyn Catalog,
    log: &dyn CameraLog,
    keyword: &str,
) -> Result<Vec<Sighting>, FaceIdError> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Ok(Vec::new());
    }

    let ids: HashSet<u64> = catalog
        .all()?
        .into_iter()
        .filter(|r| {
            r.identity_id.to_string() == keyword
                || r.external_student_id.as_deref() == Some(keyword)
                || r.display_name.as_deref() == Some(keyword)
        })
        .map(|r| r.identity_id)
        .collect();
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut sightings: Vec<Sighting> = log
        .entries_for(&ids)?
        .into_iter()
        .map(|e| Sighting {
            identity_id: e.identity_id,
            camera_id: e.camera_id,
            time_detect: e.time_detect,
            face_image: e.face_image,
        })
        .collect();
    sightings.sort_by_key(|s| s.time_detect);
    Ok(sightings)
}
