use rusqlite::{Connection, Result};

/// Creates every table this crate owns. Safe to call on every startup
/// (idempotent), mirroring `skynet_memory::db::init_db`.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_messages_table(conn)?;
    create_asset_refs_table(conn)?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id                         INTEGER PRIMARY KEY AUTOINCREMENT,
            bot_id                     TEXT NOT NULL,
            chat_id                    TEXT NOT NULL,
            role                       TEXT NOT NULL,
            content_json               TEXT NOT NULL,
            tool_calls_json            TEXT,
            tool_call_id               TEXT,
            route_id                   TEXT,
            platform                   TEXT,
            sender_channel_identity_id TEXT,
            sender_user_id             TEXT,
            display_name               TEXT,
            external_message_id        TEXT,
            source_reply_to_message_id TEXT,
            created_at                 TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(bot_id, chat_id, created_at);",
    )
}

fn create_asset_refs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS message_asset_refs (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id   INTEGER NOT NULL,
            ordinal      INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            FOREIGN KEY(message_id) REFERENCES messages(id)
        );",
    )
}
