use tracing::{debug, info, warn};

use crate::catalog::{Catalog, IdentityRecord};
use crate::detection::{DetectionEvent, RawDetection, ResolutionResult};
use crate::ids::{IdAllocator, MonotonicIds};
use crate::vector::{euclidean, running_average, Comparison, Embedding};
use crate::FaceIdError;

/// Distance cutoff used by the reference deployment.
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Controls resolver behavior.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Maximum Euclidean distance (exclusive) at which a detection is
    /// considered the same identity as a prototype.
    /// Lower = stricter (more new identities). Default: 0.85.
    pub threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ResolverConfig {
    fn validate(&self) -> Result<(), FaceIdError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(FaceIdError::InvalidThreshold(self.threshold));
        }
        Ok(())
    }
}

/// Closest comparable prototype for one detection.
struct Nearest {
    best: Option<(usize, f64)>,
    compared: usize,
    skipped: usize,
}

/// Assigns persistent identities to detections and maintains each
/// identity's running-average prototype.
///
/// Not thread-safe by itself: one resolver and one catalog handle process
/// one batch at a time.
pub struct Resolver {
    cfg: ResolverConfig,
    ids: Box<dyn IdAllocator>,
}

impl Resolver {
    pub fn new(cfg: ResolverConfig, ids: Box<dyn IdAllocator>) -> Result<Self, FaceIdError> {
        cfg.validate()?;
        Ok(Self { cfg, ids })
    }

    /// Creates a resolver that numbers new identities with [`MonotonicIds`].
    pub fn with_monotonic_ids(cfg: ResolverConfig) -> Result<Self, FaceIdError> {
        Self::new(cfg, Box::new(MonotonicIds::new()))
    }

    pub fn threshold(&self) -> f64 {
        self.cfg.threshold
    }

    /// Adjusts matching strictness at runtime.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), FaceIdError> {
        let cfg = ResolverConfig { threshold };
        cfg.validate()?;
        self.cfg = cfg;
        Ok(())
    }

    /// Issues an id for an identity created outside of resolution
    /// (enrollment), keeping numbering consistent with minted identities.
    pub(crate) fn allocate_id(&mut self, catalog_max: Option<u64>) -> u64 {
        self.ids.next_id(catalog_max)
    }

    /// Resolves detections in order, returning one result per detection.
    ///
    /// The catalog is read once, then updated as the batch proceeds: a match
    /// is written with `update_prototype`, a new identity with `insert`.
    /// Later detections see the effect of earlier ones in the same batch.
    ///
    /// Every embedding is validated before the first mutation. An error
    /// raised after that point (NaN distance, catalog contract violation)
    /// aborts the batch without rolling back mutations already applied.
    pub fn resolve_batch(
        &mut self,
        catalog: &mut dyn Catalog,
        detections: &[DetectionEvent],
    ) -> Result<Vec<ResolutionResult>, FaceIdError> {
        for det in detections {
            det.embedding.validate()?;
        }

        let mut snapshot = catalog.all()?;
        let mut results = Vec::with_capacity(detections.len());

        for (i, det) in detections.iter().enumerate() {
            let nearest = nearest(&snapshot, &det.embedding)?;
            let distance = nearest.best.map(|(_, d)| d);

            let result = match nearest.best {
                Some((idx, d)) if d < self.cfg.threshold => {
                    let record = &mut snapshot[idx];
                    let n = record.observation_count;
                    let prototype = running_average(&record.prototype, n, &det.embedding)?;
                    catalog.update_prototype(record.identity_id, prototype.clone(), n + 1)?;
                    record.prototype = prototype;
                    record.observation_count = n + 1;

                    debug!(
                        index = i,
                        identity_id = record.identity_id,
                        distance = d,
                        observations = n + 1,
                        "detection matched"
                    );
                    ResolutionResult {
                        identity_id: record.identity_id,
                        distance,
                        is_new_identity: false,
                        compared: nearest.compared,
                        skipped: nearest.skipped,
                    }
                }
                _ => {
                    let catalog_max = snapshot.last().map(|r| r.identity_id);
                    let id = self.ids.next_id(catalog_max);
                    let mut record = IdentityRecord::seed(id, det.embedding.clone());
                    record.face_image = Some(det.raw_image_reference.clone());
                    catalog.insert(record.clone())?;
                    snapshot.push(record);

                    info!(
                        index = i,
                        identity_id = id,
                        camera_id = %det.camera_id,
                        distance = ?distance,
                        "new identity"
                    );
                    ResolutionResult {
                        identity_id: id,
                        distance,
                        is_new_identity: true,
                        compared: nearest.compared,
                        skipped: nearest.skipped,
                    }
                }
            };
            results.push(result);
        }

        Ok(results)
    }

    /// Parses every detection, then resolves them. A malformed embedding
    /// anywhere in the batch fails it before the catalog is touched.
    pub fn resolve_raw_batch(
        &mut self,
        catalog: &mut dyn Catalog,
        raw: &[RawDetection],
    ) -> Result<(Vec<DetectionEvent>, Vec<ResolutionResult>), FaceIdError> {
        let events = raw
            .iter()
            .map(RawDetection::parse)
            .collect::<Result<Vec<_>, _>>()?;
        let results = self.resolve_batch(catalog, &events)?;
        Ok((events, results))
    }
}

/// Scans every prototype for the one closest to `emb`.
/// Ties keep the earliest record, i.e. the lowest identity id.
fn nearest(records: &[IdentityRecord], emb: &Embedding) -> Result<Nearest, FaceIdError> {
    let mut out = Nearest {
        best: None,
        compared: 0,
        skipped: 0,
    };

    for (idx, record) in records.iter().enumerate() {
        match euclidean(emb, &record.prototype)? {
            Comparison::LengthMismatch { left, right } => {
                warn!(
                    identity_id = record.identity_id,
                    detection_len = left,
                    prototype_len = right,
                    "skipping prototype with mismatched length"
                );
                out.skipped += 1;
            }
            Comparison::Distance(d) => {
                out.compared += 1;
                match out.best {
                    Some((_, best)) if d >= best => {}
                    _ => out.best = Some((idx, d)),
                }
            }
        }
    }
    Ok(out)
}
