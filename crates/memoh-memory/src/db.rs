use rusqlite::{Connection, Result};

/// Idempotent, mirrors `skynet_memory::db::init_db`.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bot_memory (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            namespace  TEXT NOT NULL,
            scope_id   TEXT NOT NULL,
            memory     TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_bot_memory_scope
            ON bot_memory(namespace, scope_id);
        CREATE VIRTUAL TABLE IF NOT EXISTS bot_memory_fts
            USING fts5(memory, content='bot_memory', content_rowid='id');",
    )
}
