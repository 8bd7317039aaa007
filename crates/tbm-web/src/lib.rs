//! Axum JSON API over the bookmark store, plus snapshot download and export endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Local, NaiveDateTime};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use tbm_core::{AnnotationUpdate, Bookmark, NewBookmark};
use tbm_snapshot::{CancelHandle, CancelToken, DownloadReport, SnapshotConfig, SnapshotDownloader};
use tbm_storage::{BookmarkStore, SqliteBookmarkStore, StoreError};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "tbm-web";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub database_path: PathBuf,
    pub snapshot: SnapshotConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("TBM_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("TBM_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            database_path: std::env::var("TBM_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("../pcc_data/2026/bookmarks.db")),
            snapshot: SnapshotConfig::from_env(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookmarkStore>,
    pub downloader: Arc<SnapshotDownloader>,
    pub cancel: CancelToken,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BookmarkStore>,
        downloader: Arc<SnapshotDownloader>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            store,
            downloader,
            cancel,
        }
    }
}

/// Failures surfaced to HTTP clients. Store detail is logged, never returned.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Store(_) => "store",
            Self::Encoding(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Store(_) | Self::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::MethodNotAllowed => "method not allowed".to_string(),
            Self::Store(_) => "storage operation failed".to_string(),
            Self::Encoding(_) => "response encoding failed".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Store(_) | Self::Encoding(_)) {
            error!(error = %self, "request failed");
        }
        let body = json!({
            "success": false,
            "error": self.kind(),
            "message": self.public_message(),
        });
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize, Default)]
struct JobNumberQuery {
    job_number: Option<String>,
}

impl JobNumberQuery {
    fn required(query: Result<Query<Self>, QueryRejection>) -> Result<String, ApiError> {
        let Query(query) =
            query.map_err(|err| ApiError::Validation(format!("invalid query string: {err}")))?;
        match query.job_number {
            Some(job_number) if !job_number.trim().is_empty() => Ok(job_number),
            _ => Err(missing_job_number()),
        }
    }
}

fn missing_job_number() -> ApiError {
    ApiError::Validation("missing job_number parameter".to_string())
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::Validation(format!("invalid request body: {err}")))
}

pub fn app(state: AppState) -> Router {
    let routes = bookmark_routes();
    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(middleware::from_fn(cors))
        .with_state(Arc::new(state))
}

fn bookmark_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/bookmarks",
            get(list_bookmarks_handler)
                .post(create_bookmark_handler)
                .put(update_bookmark_handler)
                .delete(delete_bookmark_handler)
                .fallback(method_not_allowed_handler),
        )
        .route(
            "/bookmarks/list",
            get(list_keys_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/bookmarks/check",
            get(check_bookmark_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/bookmarks/download",
            get(download_handler).fallback(method_not_allowed_handler),
        )
        .route(
            "/bookmarks/export",
            get(export_handler).fallback(method_not_allowed_handler),
        )
}

// Pre-flight requests are answered here and never reach a handler.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn method_not_allowed_handler() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn list_bookmarks_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Bookmark>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

async fn create_bookmark_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let bookmark: NewBookmark = parse_body(&body)?;
    if bookmark.job_number.trim().is_empty() {
        return Err(missing_job_number());
    }
    let job_number = bookmark.job_number.clone();
    let id = state.store.upsert(bookmark).await?;
    info!(%job_number, id, "bookmark saved");
    Ok(Json(json!({
        "success": true,
        "id": id,
        "message": "bookmark added",
    })))
}

async fn update_bookmark_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let update: AnnotationUpdate = parse_body(&body)?;
    if update.job_number.trim().is_empty() {
        return Err(missing_job_number());
    }
    state.store.update_annotation(&update).await?;
    Ok(Json(json!({
        "success": true,
        "message": "bookmark updated",
    })))
}

async fn delete_bookmark_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<JobNumberQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_number = JobNumberQuery::required(query)?;
    state.store.delete(&job_number).await?;
    info!(%job_number, "bookmark deleted");
    Ok(Json(json!({
        "success": true,
        "message": "bookmark deleted",
    })))
}

async fn list_keys_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.list_keys().await?))
}

async fn check_bookmark_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<JobNumberQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job_number = JobNumberQuery::required(query)?;
    let bookmarked = state.store.exists(&job_number).await?;
    Ok(Json(json!({ "bookmarked": bookmarked })))
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DownloadReport>, ApiError> {
    let report = state
        .downloader
        .run(state.store.as_ref(), state.cancel.clone())
        .await?;
    Ok(Json(report))
}

async fn export_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let body = export_json(state.store.as_ref()).await?;
    let disposition = format!(
        "attachment; filename={}",
        export_filename(Local::now().naive_local())
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

/// The canonical bookmark array exactly as `GET /bookmarks` encodes it.
pub async fn export_json(store: &dyn BookmarkStore) -> Result<Vec<u8>, ApiError> {
    let bookmarks = store.list().await?;
    Ok(serde_json::to_vec(&bookmarks)?)
}

pub fn export_filename(at: NaiveDateTime) -> String {
    format!("bookmarks_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Opens the store, builds the downloader, and serves until Ctrl-C.
///
/// Shutdown fires `shutdown`, which cancels any snapshot batch still running.
pub async fn serve(config: ServerConfig, shutdown: CancelHandle) -> anyhow::Result<()> {
    let store = SqliteBookmarkStore::open(&config.database_path)
        .await
        .with_context(|| format!("opening bookmark database {}", config.database_path.display()))?;
    let downloader = SnapshotDownloader::new(&config.snapshot)?;
    let state = AppState::new(Arc::new(store), Arc::new(downloader), shutdown.token());

    let listener = TcpListener::bind((config.bind_addr.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.bind_addr, config.port))?;
    log_banner(&config);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    serve(ServerConfig::from_env(), CancelHandle::new()).await
}

fn log_banner(config: &ServerConfig) {
    info!(
        addr = %format!("http://{}:{}", config.bind_addr, config.port),
        database = %config.database_path.display(),
        snapshots = %config.snapshot.output_dir.display(),
        "tender bookmark server listening"
    );
    for (method, path, what) in [
        ("GET", "/bookmarks", "list bookmarks"),
        ("POST", "/bookmarks", "add or replace a bookmark"),
        ("PUT", "/bookmarks", "update note and priority"),
        ("DELETE", "/bookmarks?job_number=", "delete a bookmark"),
        ("GET", "/bookmarks/list", "bookmarked job numbers"),
        ("GET", "/bookmarks/check?job_number=", "is a job bookmarked"),
        ("GET", "/bookmarks/download", "download tender snapshots"),
        ("GET", "/bookmarks/export", "export bookmarks as a file"),
    ] {
        info!("  {method:<6} [/api]{path:<30} {what}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::HeaderMap;
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tbm_storage::InMemoryBookmarkStore;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        store: Arc<InMemoryBookmarkStore>,
        snapshot_dir: TempDir,
    }

    fn downloader(dir: &TempDir) -> Arc<SnapshotDownloader> {
        let config = SnapshotConfig {
            output_dir: dir.path().to_path_buf(),
            timeout: Duration::from_secs(2),
            rate_interval: Duration::from_millis(10),
            ..SnapshotConfig::default()
        };
        Arc::new(SnapshotDownloader::new(&config).unwrap())
    }

    fn test_app() -> TestApp {
        let snapshot_dir = tempdir().unwrap();
        let store = Arc::new(InMemoryBookmarkStore::new());
        let state = AppState::new(store.clone(), downloader(&snapshot_dir), CancelToken::never());
        TestApp {
            router: app(state),
            store,
            snapshot_dir,
        }
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let resp = router.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, bytes)
    }

    fn json_body(bytes: &Bytes) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    /// Fails the test if any handler reaches the store.
    struct UnreachableStore;

    #[async_trait]
    impl BookmarkStore for UnreachableStore {
        async fn upsert(&self, _: NewBookmark) -> Result<i64, StoreError> {
            panic!("store touched")
        }
        async fn list(&self) -> Result<Vec<Bookmark>, StoreError> {
            panic!("store touched")
        }
        async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
            panic!("store touched")
        }
        async fn exists(&self, _: &str) -> Result<bool, StoreError> {
            panic!("store touched")
        }
        async fn update_annotation(&self, _: &AnnotationUpdate) -> Result<(), StoreError> {
            panic!("store touched")
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            panic!("store touched")
        }
    }

    struct BrokenStore;

    fn broken() -> StoreError {
        StoreError::Io(std::io::Error::other("disk on fire at /var/secret/path"))
    }

    #[async_trait]
    impl BookmarkStore for BrokenStore {
        async fn upsert(&self, _: NewBookmark) -> Result<i64, StoreError> {
            Err(broken())
        }
        async fn list(&self) -> Result<Vec<Bookmark>, StoreError> {
            Err(broken())
        }
        async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
            Err(broken())
        }
        async fn exists(&self, _: &str) -> Result<bool, StoreError> {
            Err(broken())
        }
        async fn update_annotation(&self, _: &AnnotationUpdate) -> Result<(), StoreError> {
            Err(broken())
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            Err(broken())
        }
    }

    #[tokio::test]
    async fn create_then_list_returns_replaced_row() {
        let t = test_app();
        let (status, _, body) = send(
            &t.router,
            "POST",
            "/bookmarks",
            Some(r#"{"job_number":"A1","title":"Road Repair","priority":0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let created = json_body(&body);
        assert_eq!(created["success"], true);
        assert!(created["id"].as_i64().is_some());

        send(
            &t.router,
            "POST",
            "/bookmarks",
            Some(r#"{"job_number":"A1","title":"Road Repair v2","priority":5}"#),
        )
        .await;

        let (status, headers, body) = send(&t.router, "GET", "/bookmarks", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let rows = json_body(&body);
        assert_eq!(rows.as_array().unwrap().len(), 1);
        assert_eq!(rows[0]["title"], "Road Repair v2");
        assert_eq!(rows[0]["priority"], 5);
    }

    #[tokio::test]
    async fn empty_listing_is_an_empty_array() {
        let t = test_app();
        let (_, _, body) = send(&t.router, "GET", "/bookmarks", None).await;
        assert_eq!(&body[..], b"[]");
        let (_, _, body) = send(&t.router, "GET", "/bookmarks/list", None).await;
        assert_eq!(&body[..], b"[]");
    }

    #[tokio::test]
    async fn check_flips_after_bookmarking() {
        let t = test_app();
        let (_, _, before) = send(&t.router, "GET", "/bookmarks/check?job_number=X", None).await;
        assert_eq!(json_body(&before), json!({ "bookmarked": false }));

        send(&t.router, "POST", "/bookmarks", Some(r#"{"job_number":"X","title":"x"}"#)).await;

        let (_, _, after) = send(&t.router, "GET", "/bookmarks/check?job_number=X", None).await;
        assert_eq!(json_body(&after), json!({ "bookmarked": true }));

        let (_, _, keys) = send(&t.router, "GET", "/bookmarks/list", None).await;
        assert_eq!(json_body(&keys), json!(["X"]));
    }

    #[tokio::test]
    async fn put_updates_annotation_only() {
        let t = test_app();
        send(
            &t.router,
            "POST",
            "/bookmarks",
            Some(r#"{"job_number":"B2","title":"Bridge","url":"https://example.test/b2"}"#),
        )
        .await;

        let (status, _, body) = send(
            &t.router,
            "PUT",
            "/bookmarks",
            Some(r#"{"job_number":"B2","note":"site visit","priority":3}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["success"], true);

        let row = t.store.list().await.unwrap().remove(0);
        assert_eq!(row.note, "site visit");
        assert_eq!(row.priority, 3);
        assert_eq!(row.title, "Bridge");
        assert_eq!(row.url, "https://example.test/b2");
    }

    #[tokio::test]
    async fn delete_requires_job_number() {
        let t = test_app();
        let (status, _, body) = send(&t.router, "DELETE", "/bookmarks", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let err = json_body(&body);
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "validation");

        let (status, _, _) = send(&t.router, "GET", "/bookmarks/check?job_number=", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_removes_and_tolerates_unknown_keys() {
        let t = test_app();
        send(&t.router, "POST", "/bookmarks", Some(r#"{"job_number":"D/1","title":"d"}"#)).await;

        let (status, _, _) = send(&t.router, "DELETE", "/bookmarks?job_number=D%2F1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!t.store.exists("D/1").await.unwrap());

        let (status, _, body) = send(&t.router, "DELETE", "/bookmarks?job_number=nope", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["success"], true);
    }

    #[tokio::test]
    async fn malformed_body_is_a_validation_failure() {
        let t = test_app();
        let (status, _, body) = send(&t.router, "POST", "/bookmarks", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"], "validation");

        let (status, _, _) = send(&t.router, "POST", "/bookmarks", Some(r#"{"title":"no key"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(t.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_verb_is_method_not_allowed() {
        let t = test_app();
        let (status, headers, body) = send(&t.router, "PATCH", "/bookmarks", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(json_body(&body)["error"], "method_not_allowed");
    }

    #[tokio::test]
    async fn preflight_never_touches_store() {
        let dir = tempdir().unwrap();
        let state = AppState::new(Arc::new(UnreachableStore), downloader(&dir), CancelToken::never());
        let router = app(state);

        for uri in ["/bookmarks", "/bookmarks/download", "/api/bookmarks/export"] {
            let (status, headers, body) = send(&router, "OPTIONS", uri, None).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.is_empty());
            assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(
                headers[header::ACCESS_CONTROL_ALLOW_METHODS],
                "GET, POST, PUT, DELETE, OPTIONS"
            );
        }
    }

    #[tokio::test]
    async fn store_failures_are_sanitized() {
        let dir = tempdir().unwrap();
        let state = AppState::new(Arc::new(BrokenStore), downloader(&dir), CancelToken::never());
        let router = app(state);

        let (status, _, body) = send(&router, "GET", "/bookmarks", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let err = json_body(&body);
        assert_eq!(err["error"], "store");
        assert_eq!(err["message"], "storage operation failed");
        assert!(!String::from_utf8_lossy(&body).contains("/var/secret/path"));
    }

    #[tokio::test]
    async fn export_matches_listing_as_attachment() {
        let t = test_app();
        send(&t.router, "POST", "/bookmarks", Some(r#"{"job_number":"E1","title":"one","priority":1}"#)).await;
        send(&t.router, "POST", "/bookmarks", Some(r#"{"job_number":"E2","title":"two","priority":4}"#)).await;

        let (_, _, listing) = send(&t.router, "GET", "/bookmarks", None).await;
        let (status, headers, export) = send(&t.router, "GET", "/bookmarks/export", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(listing, export);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=bookmarks_"));
        assert!(disposition.ends_with(".json"));
    }

    #[test]
    fn export_filename_is_timestamped() {
        let at = NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(9, 30, 15)
            .unwrap();
        assert_eq!(export_filename(at), "bookmarks_20260105_093015.json");
    }

    #[tokio::test]
    async fn api_prefix_serves_same_routes() {
        let t = test_app();
        let (status, _, _) = send(
            &t.router,
            "POST",
            "/api/bookmarks",
            Some(r#"{"job_number":"P1","title":"prefixed"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, _, body) = send(&t.router, "GET", "/api/bookmarks/check?job_number=P1", None).await;
        assert_eq!(json_body(&body)["bookmarked"], true);
    }

    #[tokio::test]
    async fn download_reports_per_item_outcomes() {
        let t = test_app();
        send(&t.router, "POST", "/bookmarks", Some(r#"{"job_number":"NOURL","title":"n"}"#)).await;
        send(
            &t.router,
            "POST",
            "/bookmarks",
            Some(r#"{"job_number":"DEAD","title":"d","api_url":"http://127.0.0.1:1/x"}"#),
        )
        .await;

        let (status, _, body) = send(&t.router, "GET", "/bookmarks/download", None).await;
        assert_eq!(status, StatusCode::OK);
        let report = json_body(&body);
        assert_eq!(report["total"], 2);
        assert_eq!(report["output_dir"], t.snapshot_dir.path().display().to_string());
        let results = report["results"].as_array().unwrap();
        assert!(results.iter().all(|r| r["status"] == "error"));
        assert!(results
            .iter()
            .any(|r| r["job_number"] == "NOURL" && r["error"] == tbm_snapshot::MISSING_API_URL));
        assert_eq!(t.store.list().await.unwrap().len(), 2);
    }
}
