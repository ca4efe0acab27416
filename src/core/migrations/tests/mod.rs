
use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;

pub(super) fn scratch() -> (TempDir, Connection) {
    let dir = tempfile::tempdir().expect("temp dir");
    let conn = Connection::open(dir.path().join("test.db")).expect("open db");
    (dir, conn)
}

pub(super) fn migrations_dir(root: &TempDir) -> std::path::PathBuf {
    let dir = root.path().join("migrations");
    std::fs::create_dir_all(&dir).expect("create migrations dir");
    dir
}

pub(super) fn write(dir: &Path, name: &str, sql: &str) {
    std::fs::write(dir.join(name), sql).expect("write migration");
}

pub(super) fn tracked(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT filename FROM migrations ORDER BY id")
        .expect("prepare");
    stmt.query_map([], |row| row.get(0))
        .expect("query")
        .map(|r| r.expect("row"))
        .collect()
}

pub(super) fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .expect("sqlite_master query")
        > 0
}
