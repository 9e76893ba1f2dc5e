//! Request handling independent of HTTP: resolve, log, broadcast, query.

use facelog_faceid::{
    people_per_minute, search, CameraLog, CameraLogEntry, Catalog, Embedding, Enrollment,
    FaceIdError, IdentityRecord, RawDetection, ResolutionResult, Resolver,
};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task;
use tracing::debug;

/// Body of `POST /add_camera_logs`.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraLogsRequest {
    pub logs: Vec<RawDetection>,
    #[serde(default)]
    pub full_image: String,
}

/// Body of `POST /add_new_student`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddStudentRequest {
    #[serde(rename = "studentInfo")]
    pub student_info: StudentInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StudentInfo {
    pub face_name: String,
    pub face_vector: String,
    #[serde(default)]
    pub face_image: Option<String>,
    pub student_id_number: String,
}

/// Pushed to every live subscriber after a batch is resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveUpdate {
    pub camera_id: String,
    /// One label per detection, e.g. `"Alice<br>6010<br>1"` or `"7"`.
    pub face_id: Vec<String>,
    pub time_detect: String,
    pub face_image: Vec<String>,
    pub full_image: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub results: Vec<ResolutionResult>,
    pub live: LiveUpdate,
}

/// Per-minute head count, shaped for the dashboard chart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PresenceSeries {
    pub each_timestamp: Vec<i64>,
    pub number_people: Vec<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub time_detect: Vec<String>,
    pub face_image: Vec<String>,
}

/// Resolver and catalog are locked together: one batch at a time.
struct Core {
    resolver: Resolver,
    catalog: Box<dyn Catalog>,
}

/// Catalog and log calls are synchronous and may wait on disk commits, so
/// they run on the blocking pool while the core lock is held.
pub struct Service {
    core: Arc<Mutex<Core>>,
    log: Arc<dyn CameraLog>,
    live: broadcast::Sender<LiveUpdate>,
}

impl Service {
    pub fn new(
        resolver: Resolver,
        catalog: Box<dyn Catalog>,
        log: Box<dyn CameraLog>,
        live_buffer: usize,
    ) -> Self {
        let (live, _) = broadcast::channel(live_buffer.max(1));
        Self {
            core: Arc::new(Mutex::new(Core { resolver, catalog })),
            log: Arc::from(log),
            live,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.live.subscribe()
    }

    /// Locks the core and runs `f` on the blocking pool.
    async fn with_core<T, F>(&self, f: F) -> Result<T, FaceIdError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Core, &dyn CameraLog) -> Result<T, FaceIdError> + Send + 'static,
    {
        let mut core = Arc::clone(&self.core).lock_owned().await;
        let log = Arc::clone(&self.log);
        task::spawn_blocking(move || f(&mut core, log.as_ref()))
            .await
            .map_err(|e| FaceIdError::Store(format!("blocking task failed: {e}")))?
    }

    /// Resolves a batch, records one log entry per detection and broadcasts
    /// the labeled result.
    pub async fn ingest(&self, req: CameraLogsRequest) -> Result<IngestResponse, FaceIdError> {
        let (results, live) = self
            .with_core(move |core, log| ingest_batch(core, log, req))
            .await?;

        if !results.is_empty() {
            // No subscribers is not an error.
            let receivers = self.live.send(live.clone()).unwrap_or(0);
            debug!(receivers, detections = results.len(), "live update sent");
        }

        Ok(IngestResponse { results, live })
    }

    pub async fn add_student(&self, req: AddStudentRequest) -> Result<IdentityRecord, FaceIdError> {
        let info = req.student_info;
        let enrollment = Enrollment {
            display_name: info.face_name,
            student_id: info.student_id_number,
            embedding: Embedding::parse(&info.face_vector)?,
            face_image: info.face_image,
        };

        self.with_core(move |core, _| core.resolver.enroll(core.catalog.as_mut(), enrollment))
            .await
    }

    pub async fn presence(&self, camera_id: &str) -> Result<PresenceSeries, FaceIdError> {
        let log = Arc::clone(&self.log);
        let camera = camera_id.to_string();
        let entries = task::spawn_blocking(move || log.entries_for_camera(&camera))
            .await
            .map_err(|e| FaceIdError::Store(format!("blocking task failed: {e}")))??;

        let mut series = PresenceSeries::default();
        for p in people_per_minute(&entries, camera_id) {
            series.each_timestamp.push(p.minute);
            series.number_people.push(p.people);
        }
        Ok(series)
    }

    pub async fn search(&self, keyword: &str) -> Result<SearchResponse, FaceIdError> {
        let keyword = keyword.to_string();
        let sightings = self
            .with_core(move |core, log| search(core.catalog.as_ref(), log, &keyword))
            .await?;

        let mut resp = SearchResponse::default();
        for s in sightings {
            resp.time_detect.push(s.time_detect.to_string());
            resp.face_image.push(s.face_image);
        }
        Ok(resp)
    }
}

fn ingest_batch(
    core: &mut Core,
    log: &dyn CameraLog,
    req: CameraLogsRequest,
) -> Result<(Vec<ResolutionResult>, LiveUpdate), FaceIdError> {
    let Core { resolver, catalog } = core;
    let (events, results) = resolver.resolve_raw_batch(catalog.as_mut(), &req.logs)?;

    let mut live = LiveUpdate {
        camera_id: String::new(),
        face_id: Vec::with_capacity(results.len()),
        time_detect: String::new(),
        face_image: Vec::with_capacity(results.len()),
        full_image: req.full_image,
    };
    for (ev, res) in events.iter().zip(&results) {
        log.append(&CameraLogEntry {
            camera_id: ev.camera_id.clone(),
            identity_id: res.identity_id,
            time_detect: ev.timestamp,
            face_image: ev.raw_image_reference.clone(),
        })?;

        let label = match catalog.get(res.identity_id)? {
            Some(record) => record.label(),
            None => res.identity_id.to_string(),
        };
        live.face_id.push(label);
        live.face_image.push(ev.raw_image_reference.clone());
        live.camera_id = ev.camera_id.clone();
        live.time_detect = ev.timestamp.to_string();
    }
    Ok((results, live))
}

#[cfg(test)]
mod tests {
    use super::*;
    use facelog_faceid::{MemoryCameraLog, MemoryCatalog, ResolverConfig};

    fn service() -> Service {
        Service::new(
            Resolver::with_monotonic_ids(ResolverConfig::default()).unwrap(),
            Box::new(MemoryCatalog::new()),
            Box::new(MemoryCameraLog::new()),
            8,
        )
    }

    fn logs(json: &str) -> CameraLogsRequest {
        serde_json::from_str(json).unwrap()
    }

    const TWO_SAME_FACES: &str = r#"{
        "full_image": "frame.jpg",
        "logs": [
            {"camera_id": "CCTV01", "time_detect": "2020-01-01 08:00:10",
             "face_image": "a.jpg", "face_vector": "[0.1,0.2]"},
            {"camera_id": "CCTV01", "time_detect": "2020-01-01 08:00:40",
             "face_image": "b.jpg", "face_vector": "[0.1,0.25]"}
        ]
    }"#;

    #[tokio::test]
    async fn ingest_resolves_logs_and_broadcasts() {
        let svc = service();
        let mut rx = svc.subscribe();

        let resp = svc.ingest(logs(TWO_SAME_FACES)).await.unwrap();
        assert_eq!(resp.results.len(), 2);
        assert!(resp.results[0].is_new_identity);
        assert!(!resp.results[1].is_new_identity);
        assert_eq!(resp.live.face_id, vec!["1", "1"]);
        assert_eq!(resp.live.time_detect, "2020-01-01 08:00:40");

        let update = rx.recv().await.unwrap();
        assert_eq!(update.camera_id, "CCTV01");
        assert_eq!(update.full_image, "frame.jpg");
        assert_eq!(update.face_image, vec!["a.jpg", "b.jpg"]);

        let series = svc.presence("CCTV01").await.unwrap();
        assert_eq!(series.number_people, vec![1]);
    }

    #[tokio::test]
    async fn ingest_on_redb_store() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, log) = facelog_faceid::store::open(dir.path().join("faces.redb")).unwrap();
        let svc = Service::new(
            Resolver::with_monotonic_ids(ResolverConfig::default()).unwrap(),
            Box::new(catalog),
            Box::new(log),
            8,
        );

        let resp = svc.ingest(logs(TWO_SAME_FACES)).await.unwrap();
        assert_eq!(resp.live.face_id, vec!["1", "1"]);
        assert_eq!(svc.presence("CCTV01").await.unwrap().number_people, vec![1]);
        assert!(svc.presence("CCTV02").await.unwrap().number_people.is_empty());
        assert_eq!(svc.search("1").await.unwrap().face_image, vec!["a.jpg", "b.jpg"]);
    }

    #[tokio::test]
    async fn ingest_without_subscribers_succeeds() {
        let svc = service();
        assert!(svc.ingest(logs(TWO_SAME_FACES)).await.is_ok());
    }

    #[tokio::test]
    async fn malformed_batch_logs_nothing() {
        let svc = service();
        let bad = logs(
            r#"{"logs": [
                {"camera_id": "CCTV01", "time_detect": "2020-01-01 08:00:10",
                 "face_image": "a.jpg", "face_vector": "[0.1,0.2]"},
                {"camera_id": "CCTV01", "time_detect": "2020-01-01 08:00:11",
                 "face_image": "b.jpg", "face_vector": "0.1,0.2"}
            ]}"#,
        );
        let err = svc.ingest(bad).await.unwrap_err();
        assert!(matches!(err, FaceIdError::MalformedVector(_)));
        assert!(svc.presence("CCTV01").await.unwrap().number_people.is_empty());
    }

    #[tokio::test]
    async fn enrolled_student_labels_and_search() {
        let svc = service();
        let req: AddStudentRequest = serde_json::from_str(
            r#"{"studentInfo": {"face_name": "Alice", "face_vector": "[0.1,0.2]",
                "face_image": "alice.jpg", "student_id_number": "6010"}}"#,
        )
        .unwrap();
        let rec = svc.add_student(req).await.unwrap();
        assert_eq!(rec.identity_id, 1);

        let resp = svc.ingest(logs(TWO_SAME_FACES)).await.unwrap();
        assert_eq!(resp.live.face_id, vec!["Alice<br>6010<br>1", "Alice<br>6010<br>1"]);

        let found = svc.search("6010").await.unwrap();
        assert_eq!(found.time_detect, vec!["2020-01-01 08:00:10", "2020-01-01 08:00:40"]);
        assert_eq!(found.face_image, vec!["a.jpg", "b.jpg"]);
        assert!(svc.search("nobody").await.unwrap().time_detect.is_empty());
    }

    #[tokio::test]
    async fn add_student_rejects_bad_vector() {
        let svc = service();
        let req: AddStudentRequest = serde_json::from_str(
            r#"{"studentInfo": {"face_name": "Bob", "face_vector": "[]",
                "student_id_number": "1"}}"#,
        )
        .unwrap();
        assert!(matches!(
            svc.add_student(req).await,
            Err(FaceIdError::MalformedVector(_))
        ));
    }
}
