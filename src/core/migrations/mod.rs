use rusqlite::fallible_iterator::FallibleIterator;
use rusqlite::{Batch, Connection, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const TRACKING_TABLE: &str = "migrations";
pub const DEFAULT_EXTENSION: &str = "sql";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration {filename} failed: {source}")]
    Execution {
        filename: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("migration {filename} controls the transaction itself ({statement}); remove it")]
    TransactionControl { filename: String, statement: String },
    #[error("migration {filename} could not be read: {source}")]
    Read {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not list migrations in {}: {source}", dir.display())]
    Discovery {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("migration tracking table is unusable: {0}")]
    Tracking(#[from] rusqlite::Error),
    #[error("applied migrations changed on disk: {}", filenames.join(", "))]
    Drift { filenames: Vec<String> },
}

impl MigrationError {
    /// The migration file this error belongs to, for per-file failures.
    pub fn filename(&self) -> Option<&str> {
        match self {
            MigrationError::Execution { filename, .. }
            | MigrationError::TransactionControl { filename, .. }
            | MigrationError::Read { filename, .. } => Some(filename),
            _ => None,
        }
    }
}

/// What to do with the rest of the batch once a file fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Stop,
}

/// What to do when an applied file no longer matches its recorded checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftPolicy {
    #[default]
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub filename: String,
    pub executed_at: String,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub total: usize,
    pub executed: Vec<AppliedMigration>,
    pub pending: Vec<String>,
}

/// Outcome of one run. `failed` holds per-file errors only.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<MigrationError>,
    pub drifted: Vec<String>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_files(&self) -> Vec<&str> {
        self.failed.iter().filter_map(|e| e.filename()).collect()
    }
}

/// Applies `.sql` files from one directory, each at most once.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    dir: PathBuf,
    extension: String,
    on_failure: FailurePolicy,
    on_drift: DriftPolicy,
}

impl MigrationRunner {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            on_failure: FailurePolicy::default(),
            on_drift: DriftPolicy::default(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn with_drift_policy(mut self, policy: DriftPolicy) -> Self {
        self.on_drift = policy;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Apply every pending file in ascending filename order.
    pub fn run(&self, conn: &mut Connection) -> Result<MigrationReport, MigrationError> {
        info!("Running migrations from {}", self.dir.display());
        ensure_tracking_table(conn)?;

        let files = self.discover()?;
        let applied = load_applied(conn)?;
        let mut report = MigrationReport {
            drifted: self.detect_drift(&files, &applied),
            ..Default::default()
        };

        if !report.drifted.is_empty() {
            match self.on_drift {
                DriftPolicy::Warn => warn!(
                    "Applied migrations changed on disk: {}",
                    report.drifted.join(", ")
                ),
                DriftPolicy::Fail => {
                    return Err(MigrationError::Drift {
                        filenames: report.drifted,
                    });
                }
            }
        }

        let mut pending = Vec::new();
        for name in &files {
            if applied.contains_key(name) {
                debug!("Migration {} already applied, skipping", name);
                report.skipped.push(name.clone());
            } else {
                pending.push(name);
            }
        }

        if pending.is_empty() {
            info!("All {} migrations already applied", files.len());
            return Ok(report);
        }
        info!("Found {} pending migrations", pending.len());

        for filename in pending {
            match self.apply_one(conn, filename) {
                Ok(()) => report.applied.push(filename.clone()),
                Err(e) => {
                    error!("{}", e);
                    report.failed.push(e);
                    if self.on_failure == FailurePolicy::Stop {
                        warn!("Stopping after first failed migration");
                        break;
                    }
                }
            }
        }

        if report.is_success() {
            info!("Applied {} migrations", report.applied.len());
        } else {
            warn!(
                "Migrations finished with {} failures: {}",
                report.failed.len(),
                report.failed_files().join(", ")
            );
        }
        Ok(report)
    }

    /// Applied and pending files, without touching anything but the tracking table.
    pub fn status(&self, conn: &Connection) -> Result<MigrationStatus, MigrationError> {
        ensure_tracking_table(conn)?;
        let files = self.discover()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT filename, executed_at, checksum FROM {TRACKING_TABLE} ORDER BY id"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(AppliedMigration {
                filename: row.get(0)?,
                executed_at: row.get(1)?,
                checksum: row.get(2)?,
            })
        })?;
        let mut executed = Vec::new();
        for row in rows {
            executed.push(row?);
        }

        let pending = files
            .iter()
            .filter(|name| !executed.iter().any(|m| &m.filename == *name))
            .cloned()
            .collect();

        Ok(MigrationStatus {
            total: files.len(),
            executed,
            pending,
        })
    }

    /// Migration filenames in execution order. A missing directory is empty.
    pub fn discover(&self) -> Result<Vec<String>, MigrationError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Migrations directory {} not found", self.dir.display());
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(MigrationError::Discovery {
                    dir: self.dir.clone(),
                    source,
                });
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MigrationError::Discovery {
                dir: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                files.push(name.to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    fn detect_drift(
        &self,
        files: &[String],
        applied: &HashMap<String, Option<String>>,
    ) -> Vec<String> {
        let mut drifted = Vec::new();
        for name in files {
            let Some(Some(recorded)) = applied.get(name) else {
                continue;
            };
            match std::fs::read_to_string(self.dir.join(name)) {
                Ok(content) if &checksum(&content) != recorded => drifted.push(name.clone()),
                Ok(_) => {}
                Err(e) => warn!("Could not re-read applied migration {}: {}", name, e),
            }
        }
        drifted
    }

    fn apply_one(&self, conn: &mut Connection, filename: &str) -> Result<(), MigrationError> {
        let sql = std::fs::read_to_string(self.dir.join(filename)).map_err(|source| {
            MigrationError::Read {
                filename: filename.to_string(),
                source,
            }
        })?;
        let sum = checksum(&sql);
        let exec_err = |source: rusqlite::Error| MigrationError::Execution {
            filename: filename.to_string(),
            source,
        };

        info!("Applying migration {}", filename);
        // Dropping the transaction on any early return rolls it back.
        let tx = conn.transaction().map_err(exec_err)?;
        let mut batch = Batch::new(&tx, &sql);
        while let Some(mut stmt) = batch.next().map_err(exec_err)? {
            let text = stmt.expanded_sql().unwrap_or_default();
            if is_transaction_control(&text) {
                return Err(MigrationError::TransactionControl {
                    filename: filename.to_string(),
                    statement: text.trim().trim_end_matches(';').trim_end().to_string(),
                });
            }
            match stmt.execute([]) {
                // Some PRAGMAs return a row; the statement still ran.
                Ok(_) | Err(rusqlite::Error::ExecuteReturnedResults) => {}
                Err(e) => return Err(exec_err(e)),
            }
        }
        tx.execute(
            &format!("INSERT INTO {TRACKING_TABLE} (filename, checksum) VALUES (?1, ?2)"),
            params![filename, sum],
        )
        .map_err(exec_err)?;
        tx.commit().map_err(exec_err)?;
        info!("Migration {} applied", filename);
        Ok(())
    }
}

/// BEGIN/COMMIT/END/ROLLBACK would escape the per-file transaction.
fn is_transaction_control(statement: &str) -> bool {
    let mut rest = statement.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            break;
        }
    }
    let keyword: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    matches!(keyword.as_str(), "BEGIN" | "COMMIT" | "END" | "ROLLBACK")
}

/// Hex SHA-256 of a migration file's content.
pub fn checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn ensure_tracking_table(conn: &Connection) -> Result<(), MigrationError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {TRACKING_TABLE} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL UNIQUE,
            executed_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
            checksum TEXT
        )"
    ))?;
    Ok(())
}

fn load_applied(conn: &Connection) -> Result<HashMap<String, Option<String>>, MigrationError> {
    let mut stmt = conn.prepare(&format!("SELECT filename, checksum FROM {TRACKING_TABLE}"))?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut applied = HashMap::new();
    for row in rows {
        let (filename, sum): (String, Option<String>) = row?;
        applied.insert(filename, sum);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests;
