use crate::store::Storage;
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "marksy.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_db(workspace)?,
        })
    }
}

impl Storage for SqliteStore {
    fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |r| r.get(0))
            .optional()
            .with_context(|| format!("failed to read key {key}"))
    }

    fn set_raw(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv_store(key, value, updated_at) VALUES(?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                (key, value, now_rfc3339()),
            )
            .with_context(|| format!("failed to write key {key}"))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?", [key])
            .with_context(|| format!("failed to remove key {key}"))?;
        Ok(())
    }

    fn set_many(&self, entries: &[(String, String)]) -> anyhow::Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("failed to begin transaction")?;
        let updated_at = now_rfc3339();
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv_store(key, value, updated_at) VALUES(?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                (key, value, &updated_at),
            )
            .with_context(|| format!("failed to write key {key}"))?;
        }
        tx.commit().context("failed to commit transaction")?;
        Ok(())
    }
}
