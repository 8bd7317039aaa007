//! Rate-limited batch download of tender detail snapshots for bookmarked jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::StatusCode;
use serde::Serialize;
use tbm_core::Bookmark;
use tbm_storage::{BookmarkStore, StoreError};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "tbm-snapshot";

pub const MISSING_API_URL: &str = "missing api_url";

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub output_dir: PathBuf,
    pub timeout: Duration,
    pub rate_interval: Duration,
    pub concurrency: usize,
    pub user_agent: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("../pcc_data/2026/bookmarked_tenders"),
            timeout: Duration::from_secs(30),
            rate_interval: Duration::from_millis(500),
            concurrency: 2,
            user_agent: "tbm-snapshot/0.1".to_string(),
        }
    }
}

impl SnapshotConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            output_dir: std::env::var("TBM_SNAPSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            timeout: std::env::var("TBM_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            rate_interval: std::env::var("TBM_RATE_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.rate_interval),
            concurrency: std::env::var("TBM_DOWNLOAD_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.concurrency),
            user_agent: std::env::var("TBM_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }
}

/// Single-bucket limiter shared by every download worker.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketState {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            refill_every,
            state: Mutex::new(TokenBucketState {
                tokens: capacity.max(1),
                last_refill: Instant::now(),
            }),
        }
    }

    pub async fn take(&self) {
        loop {
            let mut state = self.state.lock().await;
            if self.refill_every.is_zero() {
                return;
            }
            let elapsed = state.last_refill.elapsed();
            if elapsed >= self.refill_every {
                let refills = (elapsed.as_nanos() / self.refill_every.as_nanos()) as u32;
                state.tokens = state.tokens.saturating_add(refills).min(self.capacity);
                state.last_refill = Instant::now();
            }

            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }

            let sleep_for = self.refill_every.saturating_sub(elapsed);
            drop(state);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    #[error("reading response body failed: {0}")]
    Body(reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// One GET per call, no retries. Any received response counts, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let resp = self.client.get(url).send().await.map_err(FetchError::Request)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(FetchError::Body)?.to_vec();
        Ok(FetchedResponse { status, body })
    }
}

/// Keeps a job number to one path segment.
pub fn sanitize_job_number(job_number: &str) -> String {
    let cleaned = job_number.replace(|c: char| c == '/' || c == '\\', "_");
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    root: PathBuf,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self, job_number: &str) -> PathBuf {
        self.root
            .join(format!("{}.json", sanitize_job_number(job_number)))
    }

    /// Replaces the job's snapshot through a temp file + rename in the same directory.
    pub async fn write(&self, job_number: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating snapshot directory {}", self.root.display()))?;

        let final_path = self.snapshot_path(job_number);
        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

        let written = async {
            let mut file = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&temp_path)
                .await
                .with_context(|| format!("opening temp snapshot file {}", temp_path.display()))?;
            file.write_all(bytes)
                .await
                .with_context(|| format!("writing temp snapshot file {}", temp_path.display()))?;
            file.flush()
                .await
                .with_context(|| format!("flushing temp snapshot file {}", temp_path.display()))?;
            drop(file);
            fs::rename(&temp_path, &final_path).await.with_context(|| {
                format!(
                    "renaming temp snapshot {} -> {}",
                    temp_path.display(),
                    final_path.display()
                )
            })
        }
        .await;

        match written {
            Ok(()) => Ok(final_path),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(err)
            }
        }
    }
}

/// Fires the shared cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// A token nothing can cancel.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Success,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotResult {
    pub job_number: String,
    pub title: String,
    pub status: DownloadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl SnapshotResult {
    fn pending(bookmark: &Bookmark) -> Self {
        Self {
            job_number: bookmark.job_number.clone(),
            title: bookmark.title.clone(),
            status: DownloadStatus::Pending,
            error: None,
            file: None,
            http_status: None,
        }
    }

    fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = DownloadStatus::Error;
        self.error = Some(message.into());
        self
    }

    fn succeeded(mut self, file: &Path, http_status: StatusCode) -> Self {
        self.status = DownloadStatus::Success;
        self.http_status = Some(http_status.as_u16());
        self.file = Some(file.display().to_string());
        self
    }

    fn cancelled(mut self) -> Self {
        self.status = DownloadStatus::Cancelled;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub total: usize,
    pub results: Vec<SnapshotResult>,
    pub output_dir: String,
}

impl DownloadReport {
    pub fn count(&self, status: DownloadStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}

/// Walks the bookmark set and stores each tender's detail payload on disk.
///
/// Network requests go through a bounded worker pool and share one token bucket,
/// so at most one request starts per `rate_interval`. Per-item failures are
/// recorded in that item's result and never abort the batch. Results keep the
/// canonical bookmark order whatever order the workers finish in.
#[derive(Debug, Clone)]
pub struct SnapshotDownloader {
    fetcher: HttpFetcher,
    writer: Arc<SnapshotWriter>,
    bucket: Arc<TokenBucket>,
    permits: Arc<Semaphore>,
}

impl SnapshotDownloader {
    pub fn new(config: &SnapshotConfig) -> anyhow::Result<Self> {
        Ok(Self {
            fetcher: HttpFetcher::new(config.timeout, &config.user_agent)?,
            writer: Arc::new(SnapshotWriter::new(config.output_dir.clone())),
            bucket: Arc::new(TokenBucket::new(1, config.rate_interval)),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
        })
    }

    pub fn output_dir(&self) -> &Path {
        self.writer.root()
    }

    /// Reads the store once, then downloads every bookmark. The store is never written.
    pub async fn run(
        &self,
        store: &dyn BookmarkStore,
        cancel: CancelToken,
    ) -> Result<DownloadReport, StoreError> {
        let bookmarks = store.list().await?;
        Ok(self.download_all(bookmarks, cancel).await)
    }

    pub async fn download_all(&self, bookmarks: Vec<Bookmark>, cancel: CancelToken) -> DownloadReport {
        let total = bookmarks.len();
        info!(total, output_dir = %self.output_dir().display(), "snapshot download started");

        if let Err(err) = fs::create_dir_all(self.output_dir()).await {
            warn!(error = %err, output_dir = %self.output_dir().display(), "could not create snapshot directory");
        }

        let mut results: Vec<SnapshotResult> = bookmarks.iter().map(SnapshotResult::pending).collect();
        let mut tasks = JoinSet::new();
        for (idx, bookmark) in bookmarks.into_iter().enumerate() {
            let worker = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { (idx, worker.download_one(bookmark, cancel).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = result,
                Err(err) => warn!(error = %err, "snapshot task did not complete"),
            }
        }

        for result in results.iter_mut().filter(|r| r.status == DownloadStatus::Pending) {
            *result = result.clone().failed("download task aborted");
        }

        let report = DownloadReport {
            total,
            results,
            output_dir: self.output_dir().display().to_string(),
        };
        info!(
            total,
            success = report.count(DownloadStatus::Success),
            error = report.count(DownloadStatus::Error),
            cancelled = report.count(DownloadStatus::Cancelled),
            "snapshot download finished"
        );
        report
    }

    async fn download_one(&self, bookmark: Bookmark, mut cancel: CancelToken) -> SnapshotResult {
        let result = SnapshotResult::pending(&bookmark);
        if bookmark.api_url.is_empty() {
            return result.failed(MISSING_API_URL);
        }

        let span = info_span!("snapshot_fetch", job_number = %bookmark.job_number, url = %bookmark.api_url);
        let fetched = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                fetched = async {
                    let _permit = self.permits.acquire().await.ok()?;
                    self.bucket.take().await;
                    Some(self.fetcher.fetch_bytes(&bookmark.api_url).await)
                } => fetched,
            }
        }
        .instrument(span)
        .await;

        match fetched {
            None => result.cancelled(),
            Some(Err(err)) => {
                warn!(job_number = %bookmark.job_number, error = %err, "snapshot fetch failed");
                result.failed(err.to_string())
            }
            Some(Ok(resp)) => match self.writer.write(&bookmark.job_number, &resp.body).await {
                Ok(path) => result.succeeded(&path, resp.status),
                Err(err) => {
                    warn!(job_number = %bookmark.job_number, error = %err, "snapshot write failed");
                    result.failed(format!("{err:#}"))
                }
            },
        }
    }
}
