use rusqlite::{Connection, Result};

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY,
            display_name TEXT,
            created_at   TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS channel_identities (
            id           TEXT PRIMARY KEY,
            user_id      TEXT,
            display_name TEXT,
            created_at   TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        );",
    )
}
