use serde::{Deserialize, Serialize};

use crate::time::DetectTime;
use crate::vector::Embedding;
use crate::FaceIdError;

/// A detection as sent by a camera device, embedding still in text form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    pub camera_id: String,
    pub time_detect: DetectTime,
    /// Reference to (or inline encoding of) the cropped face image.
    pub face_image: String,
    pub face_vector: String,
}

impl RawDetection {
    /// Decodes the embedding. Fails with `MalformedVector`.
    pub fn parse(&self) -> Result<DetectionEvent, FaceIdError> {
        Ok(DetectionEvent {
            camera_id: self.camera_id.clone(),
            timestamp: self.time_detect,
            raw_image_reference: self.face_image.clone(),
            embedding: Embedding::parse(&self.face_vector)?,
        })
    }
}

/// A parsed detection. Only `embedding` takes part in resolution; the rest
/// is carried through for logging and broadcast.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub camera_id: String,
    pub timestamp: DetectTime,
    pub raw_image_reference: String,
    pub embedding: Embedding,
}

/// How one detection was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub identity_id: u64,

    /// Smallest distance to a comparable prototype. `None` when nothing was
    /// comparable (empty catalog or every prototype length-mismatched).
    pub distance: Option<f64>,

    pub is_new_identity: bool,

    /// Prototypes the detection was compared against.
    pub compared: usize,

    /// Prototypes excluded because their length differed.
    pub skipped: usize,
}
