use rusqlite::{Connection, Result};

/// Initialize the photo ledger schema
pub fn init_ledger_schema(conn: &Connection) -> Result<()> {
    // Schema version table for the ledger
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photo_ledger_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT version FROM photo_ledger_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        create_ledger_schema_v1(conn)?;
        conn.execute("INSERT INTO photo_ledger_version (version) VALUES (1)", [])?;
    }

    Ok(())
}

/// Create ledger schema version 1
fn create_ledger_schema_v1(conn: &Connection) -> Result<()> {
    // Table: photo_records - one row per stored photo
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photo_records (
            identity TEXT PRIMARY KEY,
            owner_entity_id TEXT NOT NULL,
            category TEXT NOT NULL CHECK(category IN ('profile', 'progress', 'weight-check')),
            capture_date TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            local_path TEXT,
            remote_url TEXT,
            remote_backend TEXT,
            remote_delete_token TEXT,
            uploading_device_id TEXT NOT NULL,
            checksum TEXT NOT NULL,
            byte_size INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0 CHECK(deleted IN (0,1)),
            deleted_at TEXT,
            CHECK(local_path IS NOT NULL OR remote_url IS NOT NULL)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_photo_records_owner ON photo_records(owner_entity_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_photo_records_owner_category
         ON photo_records(owner_entity_id, category)",
        [],
    )?;

    // Table: photo_upload_journal - uploads whose record is not written yet
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photo_upload_journal (
            identity TEXT PRIMARY KEY,
            owner_entity_id TEXT NOT NULL,
            category TEXT NOT NULL,
            remote_url TEXT,
            remote_backend TEXT,
            remote_delete_token TEXT,
            started_at TEXT NOT NULL
        )",
        [],
    )?;

    // Table: photo_failed_deletes - remote deletes to retry
    conn.execute(
        "CREATE TABLE IF NOT EXISTS photo_failed_deletes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            remote_url TEXT NOT NULL,
            remote_backend TEXT NOT NULL,
            remote_delete_token TEXT,
            attempts INTEGER NOT NULL DEFAULT 1,
            last_error TEXT,
            queued_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Initialize the per-install identity table
pub fn init_device_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS install_identity (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            device_id TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}
