use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vector::Embedding;
use crate::FaceIdError;

/// A known identity and its running-average prototype.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_id: u64,

    /// Mean of every embedding matched to this identity so far.
    pub prototype: Embedding,

    /// Number of embeddings folded into `prototype`. Starts at 1.
    pub observation_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_student_id: Option<String>,

    /// Image reference captured when the identity was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_image: Option<String>,
}

impl IdentityRecord {
    /// A fresh record seeded by a single observation.
    pub fn seed(identity_id: u64, prototype: Embedding) -> Self {
        Self {
            identity_id,
            prototype,
            observation_count: 1,
            display_name: None,
            external_student_id: None,
            face_image: None,
        }
    }

    /// Human-readable label: name and student id on their own lines
    /// (`<br>`-separated) before the numeric id, when known.
    pub fn label(&self) -> String {
        let mut label = String::new();
        if let Some(name) = self.display_name.as_deref().filter(|s| !s.is_empty()) {
            label.push_str(name);
            label.push_str("<br>");
        }
        if let Some(sid) = self.external_student_id.as_deref().filter(|s| !s.is_empty()) {
            label.push_str(sid);
            label.push_str("<br>");
        }
        label.push_str(&self.identity_id.to_string());
        label
    }
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("identity_id", &self.identity_id)
            .field("observation_count", &self.observation_count)
            .field("prototype_len", &self.prototype.len())
            .field("display_name", &self.display_name)
            .field("external_student_id", &self.external_student_id)
            .finish()
    }
}

/// The reference catalog: `identity_id -> IdentityRecord`.
///
/// Mutations take `&mut self`; whoever owns the handle owns the catalog for
/// the duration of a batch. Callers sharing one catalog between tasks must
/// serialize access themselves (e.g. behind a mutex).
pub trait Catalog: Send + Sync {
    /// Returns every record, ascending by `identity_id`.
    fn all(&self) -> Result<Vec<IdentityRecord>, FaceIdError>;

    /// Returns one record, or `None` if absent.
    fn get(&self, identity_id: u64) -> Result<Option<IdentityRecord>, FaceIdError>;

    /// Adds a new record. Fails with `DuplicateIdentity` if the id exists.
    fn insert(&mut self, record: IdentityRecord) -> Result<(), FaceIdError>;

    /// Replaces a record's prototype and count. Fails with
    /// `UnknownIdentity` if the id does not exist.
    fn update_prototype(
        &mut self,
        identity_id: u64,
        prototype: Embedding,
        observation_count: u64,
    ) -> Result<(), FaceIdError>;

    fn len(&self) -> Result<usize, FaceIdError>;

    fn is_empty(&self) -> Result<bool, FaceIdError> {
        Ok(self.len()? == 0)
    }

    /// Largest identity id present, if any.
    fn max_identity_id(&self) -> Result<Option<u64>, FaceIdError>;
}

/// In-memory [`Catalog`]. Data is lost on restart.
#[derive(Default, Clone)]
pub struct MemoryCatalog {
    records: BTreeMap<u64, IdentityRecord>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from already-loaded records, e.g. a snapshot
    /// fetched from an external store.
    pub fn from_records(
        records: impl IntoIterator<Item = IdentityRecord>,
    ) -> Result<Self, FaceIdError> {
        let mut catalog = Self::new();
        for r in records {
            catalog.insert(r)?;
        }
        Ok(catalog)
    }
}

impl Catalog for MemoryCatalog {
    fn all(&self) -> Result<Vec<IdentityRecord>, FaceIdError> {
        Ok(self.records.values().cloned().collect())
    }

    fn get(&self, identity_id: u64) -> Result<Option<IdentityRecord>, FaceIdError> {
        Ok(self.records.get(&identity_id).cloned())
    }

    fn insert(&mut self, record: IdentityRecord) -> Result<(), FaceIdError> {
        if self.records.contains_key(&record.identity_id) {
            return Err(FaceIdError::DuplicateIdentity(record.identity_id));
        }
        self.records.insert(record.identity_id, record);
        Ok(())
    }

    fn update_prototype(
        &mut self,
        identity_id: u64,
        prototype: Embedding,
        observation_count: u64,
    ) -> Result<(), FaceIdError> {
        let record = self
            .records
            .get_mut(&identity_id)
            .ok_or(FaceIdError::UnknownIdentity(identity_id))?;
        record.prototype = prototype;
        record.observation_count = observation_count;
        Ok(())
    }

    fn len(&self) -> Result<usize, FaceIdError> {
        Ok(self.records.len())
    }

    fn max_identity_id(&self) -> Result<Option<u64>, FaceIdError> {
        Ok(self.records.keys().next_back().copied())
    }
}
