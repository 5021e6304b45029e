use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::AnalysisResult;
use crate::apis::{PaperRecord, Source};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS analyzed_papers (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id    TEXT NOT NULL UNIQUE,
    title        TEXT NOT NULL,
    abstract     TEXT NOT NULL DEFAULT '',
    authors      TEXT NOT NULL DEFAULT '[]',
    year         INTEGER,
    venue        TEXT NOT NULL DEFAULT '',
    url          TEXT NOT NULL DEFAULT '',
    pdf_url      TEXT,
    citations    INTEGER NOT NULL DEFAULT 0,
    source       TEXT NOT NULL,
    summary      TEXT NOT NULL DEFAULT '',
    key_findings TEXT NOT NULL DEFAULT '[]',
    methodology  TEXT NOT NULL DEFAULT '',
    applications TEXT NOT NULL DEFAULT '[]',
    future_work  TEXT NOT NULL DEFAULT '[]',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    doi          TEXT
);
CREATE INDEX IF NOT EXISTS idx_analyzed_papers_created_at ON analyzed_papers (created_at);
";

const SELECT_COLUMNS: &str = "SELECT id, source_id, title, abstract, authors, year, venue, url, \
     pdf_url, citations, source, summary, key_findings, methodology, applications, future_work, \
     created_at, updated_at, doi FROM analyzed_papers";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A paper and its analysis as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub id: i64,
    #[serde(flatten)]
    pub paper: PaperRecord,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub methodology: String,
    pub applications: Vec<String>,
    pub future_work: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total: u64,
    pub per_source: BTreeMap<String, u64>,
}

/// SQLite-backed store of analyzed papers, keyed by `source_id`.
///
/// Each call opens its own connection on a blocking thread and drops it
/// before returning. Public methods never fail: storage errors are logged
/// and reported as an absent or empty result.
#[derive(Debug, Clone)]
pub struct AnalysisStore {
    path: PathBuf,
}

impl AnalysisStore {
    /// Open (and if needed create) the database at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };
        if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        store
            .with_conn(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(&mut conn)
        })
        .await?
    }

    /// Store a paper with its analysis, or return the row already stored
    /// under the same `source_id`. The first write wins; an existing row is
    /// never updated.
    pub async fn store(
        &self,
        paper: &PaperRecord,
        analysis: &AnalysisResult,
    ) -> Option<StoredAnalysis> {
        let paper = paper.clone();
        let analysis = analysis.clone();
        let source_id = paper.source_id.clone();
        match self.with_conn(move |conn| insert_or_fetch(conn, &paper, &analysis)).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::error!("Error storing paper analysis for {}: {}", source_id, e);
                None
            }
        }
    }

    pub async fn fetch_by_source_id(&self, source_id: &str) -> Option<StoredAnalysis> {
        let key = source_id.to_string();
        let result = self
            .with_conn(move |conn| Ok(select_by_source_id(conn, &key).optional()?))
            .await;
        match result {
            Ok(found) => found,
            Err(e) => {
                tracing::error!("Error retrieving paper analysis {}: {}", source_id, e);
                None
            }
        }
    }

    /// Most recently created analyses first.
    pub async fn list_recent(&self, limit: usize) -> Vec<StoredAnalysis> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let result = self
            .with_conn(move |conn| {
                let sql = format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id DESC LIMIT ?1");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![limit], row_to_stored)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await;
        result.unwrap_or_else(|e| {
            tracing::error!("Error retrieving recent analyses: {}", e);
            Vec::new()
        })
    }

    pub async fn stats(&self) -> AnalysisStats {
        let result = self
            .with_conn(|conn| {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM analyzed_papers", [], |r| r.get(0))?;
                let mut stmt =
                    conn.prepare("SELECT source, COUNT(*) FROM analyzed_papers GROUP BY source")?;
                let per_source = stmt
                    .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?
                    .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
                Ok(AnalysisStats {
                    total: total as u64,
                    per_source,
                })
            })
            .await;
        result.unwrap_or_else(|e| {
            tracing::error!("Error retrieving paper stats: {}", e);
            AnalysisStats::default()
        })
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Insert inside one immediate transaction; on a `source_id` conflict,
/// roll back and return the existing row.
fn insert_or_fetch(
    conn: &mut Connection,
    paper: &PaperRecord,
    analysis: &AnalysisResult,
) -> Result<StoredAnalysis, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let now = Utc::now();
    let inserted = tx.execute(
        "INSERT INTO analyzed_papers (
            source_id, title, abstract, authors, year, venue, url, pdf_url, citations, source,
            summary, key_findings, methodology, applications, future_work, created_at, updated_at,
            doi
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            paper.source_id,
            paper.title,
            paper.abstract_text,
            serde_json::to_string(&paper.authors)?,
            paper.year,
            paper.venue,
            paper.url,
            paper.pdf_url,
            paper.citations,
            paper.source.as_str(),
            analysis.summary,
            serde_json::to_string(&analysis.key_findings)?,
            analysis.methodology,
            serde_json::to_string(&analysis.applications)?,
            serde_json::to_string(&analysis.future_work)?,
            now,
            now,
            paper.doi,
        ],
    );

    match inserted {
        Ok(_) => {
            let stored = select_by_source_id(&tx, &paper.source_id)?;
            tx.commit()?;
            tracing::info!("Stored analysis for paper: {}", paper.title);
            Ok(stored)
        }
        Err(e) if is_unique_violation(&e) => {
            let existing = select_by_source_id(&tx, &paper.source_id);
            tx.rollback()?;
            tracing::info!("Paper already analyzed: {}", paper.source_id);
            Ok(existing?)
        }
        Err(e) => Err(e.into()),
    }
}

fn select_by_source_id(conn: &Connection, source_id: &str) -> rusqlite::Result<StoredAnalysis> {
    let sql = format!("{SELECT_COLUMNS} WHERE source_id = ?1");
    conn.query_row(&sql, params![source_id], row_to_stored)
}

fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredAnalysis> {
    let source_name: String = row.get(10)?;
    let source = Source::from_name(&source_name).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            Type::Text,
            format!("unknown source {source_name:?}").into(),
        )
    })?;
    Ok(StoredAnalysis {
        id: row.get(0)?,
        paper: PaperRecord {
            source_id: row.get(1)?,
            title: row.get(2)?,
            abstract_text: row.get(3)?,
            authors: json_list(row, 4)?,
            year: row.get(5)?,
            venue: row.get(6)?,
            url: row.get(7)?,
            pdf_url: row.get(8)?,
            citations: row.get(9)?,
            source,
            doi: row.get(18)?,
        },
        summary: row.get(11)?,
        key_findings: json_list(row, 12)?,
        methodology: row.get(13)?,
        applications: json_list(row, 14)?,
        future_work: json_list(row, 15)?,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
