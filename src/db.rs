use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    // Writers wait on each other instead of failing fast with SQLITE_BUSY.
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    // One row per record; `position` preserves collection order, which is
    // the tie-break for every stable ranking sort.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            collection TEXT NOT NULL,
            position INTEGER NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY(collection, position)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS id_counters(
            collection TEXT PRIMARY KEY,
            next_value INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}
