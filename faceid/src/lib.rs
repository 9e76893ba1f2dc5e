//! Persistent face identities via online nearest-prototype matching.
//!
//! Each incoming detection is compared (Euclidean distance) against the
//! prototype of every known identity. Below the threshold it joins the
//! closest identity, whose prototype becomes the running average of all its
//! observations; otherwise a new identity is minted from the detection.
//!
//! # Usage
//!
//! ```
//! use facelog_faceid::{MemoryCatalog, RawDetection, Resolver, ResolverConfig};
//!
//! let mut catalog = MemoryCatalog::new();
//! let mut resolver = Resolver::with_monotonic_ids(ResolverConfig::default()).unwrap();
//!
//! let batch: Vec<RawDetection> = serde_json::from_str(r#"[
//!     {"camera_id": "CCTV01", "time_detect": "2020-02-03 10:15:42",
//!      "face_image": "a.jpg", "face_vector": "[0.1,0.1]"},
//!     {"camera_id": "CCTV01", "time_detect": "2020-02-03 10:15:43",
//!      "face_image": "b.jpg", "face_vector": "[0.1,0.12]"}
//! ]"#).unwrap();
//!
//! let (_events, results) = resolver.resolve_raw_batch(&mut catalog, &batch).unwrap();
//! assert!(results[0].is_new_identity);
//! assert_eq!(results[1].identity_id, results[0].identity_id);
//! ```
//!
//! # Design
//!
//! The resolver owns no state besides its threshold and id allocator. The
//! catalog is passed in per batch; callers that share one catalog between
//! tasks serialize batches themselves so one batch's inserts are visible
//! before the next begins.

mod camlog;
mod catalog;
mod detection;
mod enroll;
mod error;
mod ids;
mod resolver;
pub mod store;
mod time;
mod vector;

pub use camlog::{
    people_per_minute, search, CameraLog, CameraLogEntry, MemoryCameraLog, PresencePoint,
    Sighting,
};
pub use catalog::{Catalog, IdentityRecord, MemoryCatalog};
pub use detection::{DetectionEvent, RawDetection, ResolutionResult};
pub use enroll::Enrollment;
pub use error::FaceIdError;
pub use ids::{IdAllocator, MonotonicIds};
pub use resolver::{Resolver, ResolverConfig, DEFAULT_THRESHOLD};
pub use store::{RedbCameraLog, RedbCatalog};
pub use time::DetectTime;
pub use vector::{euclidean, running_average, Comparison, Embedding};
