use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::akool::{CallbackPayload, CallbackStatus, WebhookEnvelope};
use crate::core::migrations::{MigrationReport, MigrationRunner};

const RECORD_COLUMNS: &str =
    "id, task_id, task_type, status, url, error, payload, nonce, sent_at, received_at";

/// Open (or create) the SQLite file, creating parent directories.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("opening database {}", path.display()))?;
    debug!("Opened database {}", path.display());
    Ok(conn)
}

/// A stored callback row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackRecord {
    pub id: i64,
    pub task_id: String,
    pub task_type: String,
    pub status: CallbackStatus,
    pub url: Option<String>,
    pub error: Option<String>,
    pub payload: String,
    pub nonce: String,
    pub sent_at: i64,
    pub received_at: String,
}

/// Callback log over the shared service database.
#[derive(Clone)]
pub struct CallbackStore {
    db: Arc<Mutex<Connection>>,
}

impl CallbackStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(Mutex::new(open_database(path)?))))
    }

    /// Apply pending migrations on the shared connection.
    pub async fn migrate(&self, runner: &MigrationRunner) -> Result<MigrationReport> {
        let mut db = self.db.lock().await;
        Ok(runner.run(&mut db)?)
    }

    pub async fn record(
        &self,
        envelope: &WebhookEnvelope,
        payload: &CallbackPayload,
        raw: &serde_json::Value,
    ) -> Result<i64> {
        let body = serde_json::to_string(raw)?;
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO akool_callbacks (task_id, task_type, status, url, error, payload, nonce, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                payload.id,
                payload.kind,
                payload.status.code(),
                payload.url,
                payload.error,
                body,
                envelope.nonce,
                envelope.timestamp,
            ],
        )
        .context("storing Akool callback")?;
        let id = db.last_insert_rowid();
        info!(
            "Stored Akool callback #{} for task {} ({})",
            id,
            payload.id,
            payload.status.label()
        );
        Ok(id)
    }

    /// Newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<CallbackRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM akool_callbacks ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], read_record)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Latest callback for one task.
    pub async fn latest_for_task(&self, task_id: &str) -> Result<Option<CallbackRecord>> {
        let db = self.db.lock().await;
        let record = db
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM akool_callbacks WHERE task_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                params![task_id],
                read_record,
            )
            .optional()?;
        Ok(record)
    }
}

fn read_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CallbackRecord> {
    Ok(CallbackRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        task_type: row.get(2)?,
        status: CallbackStatus::from(row.get::<_, i64>(3)?),
        url: row.get(4)?,
        error: row.get(5)?,
        payload: row.get(6)?,
        nonce: row.get(7)?,
        sent_at: row.get(8)?,
        received_at: row.get(9)?,
    })
}
