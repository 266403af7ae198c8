use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "agrifield.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

/// Creates the record table under its external column names.
///
/// `table` must already be validated (see `config::valid_table_name`).
pub fn ensure_records_table(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\"(
                id INTEGER PRIMARY KEY CHECK(id > 0),
                \"Farmer_name\" TEXT NOT NULL CHECK(length(trim(\"Farmer_name\")) > 0),
                \"Location\" TEXT NOT NULL CHECK(length(trim(\"Location\")) > 0),
                \"Crop Type\" TEXT,
                \"N\" INTEGER,
                \"P\" INTEGER,
                \"K\" INTEGER,
                \"Fertilizer\" REAL,
                \"Rainfall\" REAL,
                \"Yield\" REAL NOT NULL,
                \"Note\" TEXT
            )"
        ),
        [],
    )?;

    // Tables created before notes existed get the column added in place.
    if !table_has_column(conn, table, "Note")? {
        conn.execute(&format!("ALTER TABLE \"{table}\" ADD COLUMN \"Note\" TEXT"), [])?;
    }
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let sql = format!("PRAGMA table_info(\"{}\")", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
