//! Database schema definitions
//!
//! The run history table has a fixed name; the document collection table is
//! named by configuration and created on open.

/// SQL schema for the run history
pub const RUNS_SQL: &str = r#"
-- Track ingestion runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    mode TEXT NOT NULL,
    status TEXT NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0
);
"#;

/// SQL for one document collection
///
/// `collection` must already be validated as a plain identifier.
pub fn collection_sql(collection: &str) -> String {
    format!(
        "
        CREATE TABLE IF NOT EXISTS {collection} (
            id INTEGER PRIMARY KEY,
            document TEXT NOT NULL,
            stored_at TEXT NOT NULL
        );
        "
    )
}

/// Initializes the run history and the document collection
pub fn initialize_schema(
    conn: &rusqlite::Connection,
    collection: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute_batch(RUNS_SQL)?;
    conn.execute_batch(&collection_sql(collection))?;
    Ok(())
}
