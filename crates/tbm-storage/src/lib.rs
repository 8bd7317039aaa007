//! Bookmark persistence: the `BookmarkStore` contract plus SQLite and in-memory backends.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tbm_core::{AnnotationUpdate, Bookmark, NewBookmark};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CRATE_NAME: &str = "tbm-storage";

const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

// julianday() puts the legacy space-separated layout and the RFC 3339 layout on one
// timeline; the text tiebreak keeps sub-millisecond order among same-layout rows.
const SELECT_BOOKMARKS: &str = r#"
    SELECT id, job_number, title, unit_name, url, api_url, type, date, note, priority, data, created_at
      FROM bookmarks
     ORDER BY priority DESC, julianday(created_at) DESC, created_at DESC, id DESC
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable set of bookmarks keyed by `job_number`.
///
/// Implementations keep at most one row per `job_number` and return listings
/// in canonical order: `priority` descending, then `created_at` descending.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Inserts the bookmark or fully replaces the row sharing its `job_number`.
    /// The replacement gets a fresh `id` and `created_at`.
    async fn upsert(&self, bookmark: NewBookmark) -> Result<i64, StoreError>;

    /// Every bookmark in canonical order. Unreadable rows are skipped.
    async fn list(&self) -> Result<Vec<Bookmark>, StoreError>;

    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;

    async fn exists(&self, job_number: &str) -> Result<bool, StoreError>;

    /// Changes `note` and `priority` only. Unknown keys are a no-op.
    async fn update_annotation(&self, update: &AnnotationUpdate) -> Result<(), StoreError>;

    /// Unknown keys are a no-op.
    async fn delete(&self, job_number: &str) -> Result<(), StoreError>;
}

/// Canonical listing order shared by every backend.
pub fn canonical_order(a: &Bookmark, b: &Bookmark) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

#[derive(Debug, Clone)]
pub struct SqliteBookmarkStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteBookmarkStore {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool, path };
        store.init_schema().await?;
        info!(path = %store.path.display(), "bookmark database ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bookmarks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_number TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                unit_name TEXT,
                url TEXT,
                api_url TEXT,
                type TEXT,
                date INTEGER,
                note TEXT DEFAULT '',
                priority INTEGER DEFAULT 0,
                data TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_number ON bookmarks(job_number)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_priority ON bookmarks(priority DESC)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BookmarkStore for SqliteBookmarkStore {
    async fn upsert(&self, bookmark: NewBookmark) -> Result<i64, StoreError> {
        let created_at = Utc::now().format(CREATED_AT_FORMAT).to_string();
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO bookmarks
                (job_number, title, unit_name, url, api_url, type, date, note, priority, data, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bookmark.job_number)
        .bind(&bookmark.title)
        .bind(&bookmark.unit_name)
        .bind(&bookmark.url)
        .bind(&bookmark.api_url)
        .bind(&bookmark.tender_type)
        .bind(bookmark.date)
        .bind(&bookmark.note)
        .bind(bookmark.priority)
        .bind(&bookmark.data)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(job_number = %bookmark.job_number, id, "bookmark upserted");
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<Bookmark>, StoreError> {
        let rows = sqlx::query(SELECT_BOOKMARKS).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match bookmark_from_row(&row) {
                Ok(bookmark) => out.push(bookmark),
                Err(err) => warn!(error = %err, "skipping unreadable bookmark row"),
            }
        }
        Ok(out)
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT job_number FROM bookmarks")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("job_number").ok())
            .collect())
    }

    async fn exists(&self, job_number: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookmarks WHERE job_number = ?")
            .bind(job_number)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn update_annotation(&self, update: &AnnotationUpdate) -> Result<(), StoreError> {
        sqlx::query("UPDATE bookmarks SET note = ?, priority = ? WHERE job_number = ?")
            .bind(&update.note)
            .bind(update.priority)
            .bind(&update.job_number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, job_number: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM bookmarks WHERE job_number = ?")
            .bind(job_number)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn bookmark_from_row(row: &SqliteRow) -> Result<Bookmark, sqlx::Error> {
    let text = |column: &str| -> Result<String, sqlx::Error> {
        Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
    };
    let created_at: String = row.try_get("created_at")?;
    Ok(Bookmark {
        id: row.try_get("id")?,
        job_number: row.try_get("job_number")?,
        title: text("title")?,
        unit_name: text("unit_name")?,
        url: text("url")?,
        api_url: text("api_url")?,
        tender_type: text("type")?,
        date: row.try_get::<Option<i64>, _>("date")?.unwrap_or_default(),
        note: text("note")?,
        priority: row.try_get::<Option<i64>, _>("priority")?.unwrap_or_default(),
        data: text("data")?,
        created_at: parse_created_at(&created_at)
            .ok_or_else(|| sqlx::Error::Decode(format!("invalid created_at {created_at:?}").into()))?,
    })
}

// Accepts RFC 3339 and the bare `CURRENT_TIMESTAMP` layout older databases carry.
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Process-local store with the same semantics as the SQLite backend.
#[derive(Debug, Default)]
pub struct InMemoryBookmarkStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<Bookmark>,
    last_id: i64,
}

impl InMemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookmarkStore for InMemoryBookmarkStore {
    async fn upsert(&self, bookmark: NewBookmark) -> Result<i64, StoreError> {
        let mut state = self.state.lock().await;
        state.rows.retain(|b| b.job_number != bookmark.job_number);
        state.last_id += 1;
        let id = state.last_id;
        state.rows.push(bookmark.into_bookmark(id, Utc::now()));
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<Bookmark>, StoreError> {
        let mut rows = self.state.lock().await.rows.clone();
        rows.sort_by(canonical_order);
        Ok(rows)
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.rows.iter().map(|b| b.job_number.clone()).collect())
    }

    async fn exists(&self, job_number: &str) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.rows.iter().any(|b| b.job_number == job_number))
    }

    async fn update_annotation(&self, update: &AnnotationUpdate) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.rows.iter_mut().find(|b| b.job_number == update.job_number) {
            row.note = update.note.clone();
            row.priority = update.priority;
        }
        Ok(())
    }

    async fn delete(&self, job_number: &str) -> Result<(), StoreError> {
        self.state.lock().await.rows.retain(|b| b.job_number != job_number);
        Ok(())
    }
}
