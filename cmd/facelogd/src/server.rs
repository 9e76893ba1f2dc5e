//! HTTP server with SSE support for live identities.
//!
//! API endpoints:
//! - POST /add_camera_logs - resolve a detection batch, log and broadcast it
//! - POST /add_new_student - enroll a named identity
//! - GET /api/people       - distinct people per minute for one camera
//! - GET /api/search       - sightings of an identity by id, student id or name
//! - GET /api/live         - SSE stream of live updates
//! - GET /                 - static dashboard files, or an embedded index

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use facelog_faceid::FaceIdError;
use futures::stream::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{error, info, warn};

use crate::service::{AddStudentRequest, CameraLogsRequest, Service};

#[derive(Debug, Deserialize)]
struct PeopleQuery {
    #[serde(default = "default_camera")]
    camera: String,
}

fn default_camera() -> String {
    "CCTV01".to_string()
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    keyword: String,
}

pub fn router(service: Arc<Service>, static_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/add_camera_logs", post(add_camera_logs))
        .route("/add_new_student", post(add_new_student))
        .route("/api/people", get(people))
        .route("/api/search", get(search))
        .route("/api/live", get(live));

    // Serve the dashboard directory or fall back to the embedded index.
    match static_dir {
        Some(dir) if dir.is_dir() => {
            app = app.fallback_service(ServeDir::new(dir));
        }
        Some(dir) => {
            warn!(dir = %dir.display(), "static dir not found, serving embedded index");
            app = app.route("/", get(fallback_index));
        }
        None => {
            app = app.route("/", get(fallback_index));
        }
    }

    app.layer(CorsLayer::permissive()).with_state(service)
}

/// Start HTTP server.
pub async fn serve(addr: &str, service: Arc<Service>, static_dir: Option<PathBuf>) -> Result<()> {
    let app = router(service, static_dir);

    let addr = parse_addr(addr)?;
    info!("server started at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse address string to SocketAddr.
fn parse_addr(addr: &str) -> Result<SocketAddr> {
    let addr = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    Ok(addr.parse()?)
}

/// Maps a core error to a generic response. Details stay in the log.
fn failure(what: &str, e: FaceIdError) -> Response {
    error!(error = %e, "{what} failed");
    let status = match e {
        FaceIdError::MalformedVector(_) | FaceIdError::InvalidTimestamp(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("unsuccessful {what}")).into_response()
}

fn bad_body(rejection: JsonRejection) -> Response {
    warn!(error = %rejection, "rejected request body");
    (StatusCode::BAD_REQUEST, rejection.body_text()).into_response()
}

async fn add_camera_logs(
    State(service): State<Arc<Service>>,
    body: Result<Json<CameraLogsRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_body(rejection),
    };
    match service.ingest(req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => failure("camera log ingest", e),
    }
}

async fn add_new_student(
    State(service): State<Arc<Service>>,
    body: Result<Json<AddStudentRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_body(rejection),
    };
    match service.add_student(req).await {
        Ok(record) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "face_id": record.identity_id })),
        )
            .into_response(),
        Err(e) => failure("student enrollment", e),
    }
}

async fn people(State(service): State<Arc<Service>>, Query(q): Query<PeopleQuery>) -> Response {
    match service.presence(&q.camera).await {
        Ok(series) => Json(series).into_response(),
        Err(e) => failure("presence query", e),
    }
}

async fn search(State(service): State<Arc<Service>>, Query(q): Query<SearchQuery>) -> Response {
    match service.search(&q.keyword).await {
        Ok(found) => Json(found).into_response(),
        Err(e) => failure("search", e),
    }
}

async fn fallback_index() -> impl IntoResponse {
    Html(FALLBACK_HTML)
}

async fn live(
    State(service): State<Arc<Service>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = service.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(update) => {
                    let data = serde_json::to_string(&update).unwrap_or_default();
                    yield Ok(Event::default().event("my_response").data(data));
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "live subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Minimal index page when no dashboard directory is configured.
const FALLBACK_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>facelogd</title>
    <style>
        body { font-family: -apple-system, sans-serif; padding: 2rem; }
        li { margin: 0.3rem 0; }
        #live { font-family: monospace; white-space: pre-wrap; }
    </style>
</head>
<body>
    <h1>facelogd</h1>
    <p>No dashboard directory configured. Start with <code>--static-dir</code> to serve one.</p>
    <ul>
        <li><a href="/api/people?camera=CCTV01">/api/people?camera=CCTV01</a></li>
        <li><a href="/api/search?keyword=1">/api/search?keyword=1</a></li>
        <li><a href="/api/live">/api/live</a> (server-sent events)</li>
    </ul>
    <h2>Live</h2>
    <div id="live"></div>
    <script>
        const out = document.getElementById("live");
        const es = new EventSource("/api/live");
        es.addEventListener("my_response", (ev) => {
            const u = JSON.parse(ev.data);
            const line = `${u.time_detect} ${u.camera_id}: ${u.face_id.join(", ")}\n`;
            out.textContent = line + out.textContent;
        });
    </script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use facelog_faceid::{MemoryCameraLog, MemoryCatalog, Resolver, ResolverConfig};
    use tower::ServiceExt;

    fn app() -> Router {
        let service = Service::new(
            Resolver::with_monotonic_ids(ResolverConfig::default()).unwrap(),
            Box::new(MemoryCatalog::new()),
            Box::new(MemoryCameraLog::new()),
            8,
        );
        router(Arc::new(service), None)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn parse_addr_forms() {
        assert_eq!(parse_addr(":8080").unwrap().to_string(), "0.0.0.0:8080");
        assert_eq!(parse_addr("127.0.0.1:9000").unwrap().to_string(), "127.0.0.1:9000");
        assert!(parse_addr("nowhere").is_err());
    }

    #[test]
    fn failure_status_mapping() {
        let r = failure("x", FaceIdError::MalformedVector("bad".into()));
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);
        let r = failure("x", FaceIdError::DuplicateIdentity(1));
        assert_eq!(r.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_body_is_bad_request() {
        let resp = app()
            .oneshot(Request::post("/add_camera_logs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        // No JSON content type.
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app().oneshot(post_json("/add_camera_logs", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app().oneshot(post_json("/add_new_student", "{}")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_vector_is_bad_request() {
        let body = r#"{"logs": [{"camera_id": "CCTV01", "time_detect": "2020-01-01 08:00:10",
            "face_image": "a.jpg", "face_vector": "[0.1,oops]"}]}"#;
        let resp = app().oneshot(post_json("/add_camera_logs", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn routes_answer() {
        let body = r#"{"logs": [{"camera_id": "CCTV01", "time_detect": "2020-01-01 08:00:10",
            "face_image": "a.jpg", "face_vector": "[0.1,0.2]"}]}"#;
        let resp = app().oneshot(post_json("/add_camera_logs", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let student = r#"{"studentInfo": {"face_name": "Alice", "face_vector": "[0.1,0.2]",
            "student_id_number": "6010"}}"#;
        let resp = app().oneshot(post_json("/add_new_student", student)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        for uri in ["/api/people", "/api/search?keyword=1"] {
            let resp = app()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn embedded_index_without_static_dir() {
        let resp = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn static_dir_is_served() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>dashboard</h1>").unwrap();
        let service = Service::new(
            Resolver::with_monotonic_ids(ResolverConfig::default()).unwrap(),
            Box::new(MemoryCatalog::new()),
            Box::new(MemoryCameraLog::new()),
            8,
        );
        let app = router(Arc::new(service), Some(dir.path().to_path_buf()));
        let resp = app
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
