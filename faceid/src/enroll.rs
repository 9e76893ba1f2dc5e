//! Administrative enrollment of named identities.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{Catalog, IdentityRecord};
use crate::resolver::Resolver;
use crate::vector::Embedding;
use crate::FaceIdError;

/// A person registered ahead of time with a reference embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub display_name: String,
    pub student_id: String,
    pub embedding: Embedding,
    #[serde(default)]
    pub face_image: Option<String>,
}

impl Resolver {
    /// Inserts an enrolled identity with `observation_count = 1`.
    ///
    /// The id comes from the same allocator used for minted identities.
    /// Enrolled identities are matched like any other afterwards.
    pub fn enroll(
        &mut self,
        catalog: &mut dyn Catalog,
        enrollment: Enrollment,
    ) -> Result<IdentityRecord, FaceIdError> {
        enrollment.embedding.validate()?;

        let id = self.allocate_id(catalog.max_identity_id()?);
        let mut record = IdentityRecord::seed(id, enrollment.embedding);
        record.display_name = Some(enrollment.display_name).filter(|s| !s.is_empty());
        record.external_student_id = Some(enrollment.student_id).filter(|s| !s.is_empty());
        record.face_image = enrollment.face_image;

        catalog.insert(record.clone())?;
        info!(identity_id = id, "enrolled identity");
        Ok(record)
    }
}
