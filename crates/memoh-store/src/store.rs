use std::sync::Mutex;

use chrono::Utc;
use memoh_core::error::{MemohError, Result};
use memoh_core::ModelMessage;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::db;
use crate::types::{NewMessage, PersistedMessage};

/// SQLite-backed message store.
///
/// Thread-safe: wraps the connection in a `Mutex`, matching
/// `skynet_memory::manager::MemoryManager`'s concurrency shape. One instance
/// is shared across the process.
pub struct SqliteMessageStore {
    db: Mutex<Connection>,
}

impl SqliteMessageStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| MemohError::Storage(e.to_string()))?;
        db::init_db(&conn).map_err(|e| MemohError::Storage(e.to_string()))?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| MemohError::Storage(e.to_string()))?;
        db::init_db(&conn).map_err(|e| MemohError::Storage(e.to_string()))?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Persists one message and its asset references. Failures here are
    /// `FailStorage`: logged by the caller, never fatal to delivery of
    /// events already in flight.
    pub fn persist_message(&self, msg: NewMessage) -> Result<PersistedMessage> {
        let content_json = serde_json::to_string(&msg.message.content)?;
        let tool_calls_json = msg
            .message
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = Utc::now().to_rfc3339();

        let conn = self.db.lock().expect("message store mutex poisoned");
        conn.execute(
            "INSERT INTO messages (
                bot_id, chat_id, role, content_json, tool_calls_json, tool_call_id, route_id, platform,
                sender_channel_identity_id, sender_user_id, display_name,
                external_message_id, source_reply_to_message_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                msg.bot_id,
                msg.chat_id,
                msg.message.role,
                content_json,
                tool_calls_json,
                msg.message.tool_call_id,
                msg.route_id,
                msg.platform,
                msg.sender_channel_identity_id,
                msg.sender_user_id,
                msg.display_name,
                msg.external_message_id,
                msg.source_reply_to_message_id,
                now,
            ],
        )
        .map_err(|e| MemohError::Storage(e.to_string()))?;
        let id = conn.last_insert_rowid();

        for (ordinal, hash) in msg.asset_content_hashes.iter().enumerate() {
            conn.execute(
                "INSERT INTO message_asset_refs (message_id, ordinal, content_hash) VALUES (?1, ?2, ?3)",
                params![id, ordinal as i64, hash],
            )
            .map_err(|e| MemohError::Storage(e.to_string()))?;
        }

        Ok(PersistedMessage {
            id,
            bot_id: msg.bot_id,
            chat_id: msg.chat_id,
            message: msg.message,
            route_id: msg.route_id,
            platform: msg.platform,
            sender_channel_identity_id: msg.sender_channel_identity_id,
            sender_user_id: msg.sender_user_id,
            display_name: msg.display_name,
            external_message_id: msg.external_message_id,
            source_reply_to_message_id: msg.source_reply_to_message_id,
            asset_content_hashes: msg.asset_content_hashes,
            created_at: now,
        })
    }

    /// Loads messages for a chat created within the last `minutes` minutes,
    /// oldest first — the window C4's resolve step folds into history.
    pub fn list_since(&self, bot_id: &str, chat_id: &str, minutes: i64) -> Result<Vec<PersistedMessage>> {
        let cutoff = (Utc::now() - chrono::Duration::minutes(minutes)).to_rfc3339();
        let conn = self.db.lock().expect("message store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, bot_id, chat_id, role, content_json, tool_calls_json, tool_call_id, route_id, platform,
                        sender_channel_identity_id, sender_user_id, display_name,
                        external_message_id, source_reply_to_message_id, created_at
                 FROM messages
                 WHERE bot_id = ?1 AND chat_id = ?2 AND created_at >= ?3
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| MemohError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![bot_id, chat_id, cutoff], row_to_message)
            .map_err(|e| MemohError::Storage(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            match row {
                Ok(mut msg) => {
                    msg.asset_content_hashes = self.asset_hashes_for(&conn, msg.id)?;
                    out.push(msg);
                }
                Err(e) => warn!(error = %e, "skipping unreadable message row"),
            }
        }
        Ok(out)
    }

    /// Pages history newest-first by id cursor, then returns it oldest-first
    /// (the shape `GET /bots/{bot_id}/messages?limit&before` responds with).
    /// `before` excludes messages at or after that id; `None` starts at the
    /// newest message.
    pub fn list_page(&self, bot_id: &str, chat_id: &str, limit: i64, before: Option<i64>) -> Result<Vec<PersistedMessage>> {
        let conn = self.db.lock().expect("message store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, bot_id, chat_id, role, content_json, tool_calls_json, tool_call_id, route_id, platform,
                        sender_channel_identity_id, sender_user_id, display_name,
                        external_message_id, source_reply_to_message_id, created_at
                 FROM messages
                 WHERE bot_id = ?1 AND chat_id = ?2 AND (?3 IS NULL OR id < ?3)
                 ORDER BY id DESC LIMIT ?4",
            )
            .map_err(|e| MemohError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![bot_id, chat_id, before, limit], row_to_message)
            .map_err(|e| MemohError::Storage(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            match row {
                Ok(mut msg) => {
                    msg.asset_content_hashes = self.asset_hashes_for(&conn, msg.id)?;
                    out.push(msg);
                }
                Err(e) => warn!(error = %e, "skipping unreadable message row"),
            }
        }
        out.reverse();
        Ok(out)
    }

    pub fn clear_chat(&self, bot_id: &str, chat_id: &str) -> Result<()> {
        let conn = self.db.lock().expect("message store mutex poisoned");
        conn.execute(
            "DELETE FROM message_asset_refs WHERE message_id IN (
                SELECT id FROM messages WHERE bot_id = ?1 AND chat_id = ?2
            )",
            params![bot_id, chat_id],
        )
        .map_err(|e| MemohError::Storage(e.to_string()))?;
        conn.execute(
            "DELETE FROM messages WHERE bot_id = ?1 AND chat_id = ?2",
            params![bot_id, chat_id],
        )
        .map_err(|e| MemohError::Storage(e.to_string()))?;
        Ok(())
    }

    fn asset_hashes_for(&self, conn: &Connection, message_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT content_hash FROM message_asset_refs WHERE message_id = ?1 ORDER BY ordinal ASC")
            .map_err(|e| MemohError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![message_id], |r| r.get::<_, String>(0))
            .map_err(|e| MemohError::Storage(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| MemohError::Storage(e.to_string()))?);
        }
        Ok(out)
    }

    #[allow(dead_code)]
    fn get_message(&self, id: i64) -> Result<Option<PersistedMessage>> {
        let conn = self.db.lock().expect("message store mutex poisoned");
        conn.query_row(
            "SELECT id, bot_id, chat_id, role, content_json, tool_calls_json, tool_call_id, route_id, platform,
                    sender_channel_identity_id, sender_user_id, display_name,
                    external_message_id, source_reply_to_message_id, created_at
             FROM messages WHERE id = ?1",
            params![id],
            row_to_message,
        )
        .optional()
        .map_err(|e| MemohError::Storage(e.to_string()))
    }
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<PersistedMessage> {
    let content_json: String = row.get(4)?;
    let content: serde_json::Value = serde_json::from_str(&content_json).unwrap_or(serde_json::Value::Null);
    let tool_calls_json: Option<String> = row.get(5)?;
    let tool_calls = tool_calls_json.and_then(|s| serde_json::from_str(&s).ok());
    Ok(PersistedMessage {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        chat_id: row.get(2)?,
        message: ModelMessage {
            role: row.get(3)?,
            content,
            tool_call_id: row.get(6)?,
            tool_calls,
            usage_input_tokens: None,
        },
        route_id: row.get(7)?,
        platform: row.get(8)?,
        sender_channel_identity_id: row.get(9)?,
        sender_user_id: row.get(10)?,
        display_name: row.get(11)?,
        external_message_id: row.get(12)?,
        source_reply_to_message_id: row.get(13)?,
        asset_content_hashes: Vec::new(),
        created_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoh_core::ModelMessage;
    use serde_json::json;

    fn sample_message(role: &str) -> ModelMessage {
        ModelMessage {
            role: role.to_string(),
            content: json!("hello"),
            tool_call_id: None,
            tool_calls: None,
            usage_input_tokens: None,
        }
    }

    #[test]
    fn persists_and_lists_a_message() {
        let store = SqliteMessageStore::in_memory().unwrap();
        store
            .persist_message(NewMessage {
                bot_id: "b1".into(),
                chat_id: "c1".into(),
                message: sample_message("user"),
                route_id: None,
                platform: Some("telegram".into()),
                sender_channel_identity_id: None,
                sender_user_id: None,
                display_name: Some("User".into()),
                external_message_id: Some("42".into()),
                source_reply_to_message_id: None,
                asset_content_hashes: vec![],
            })
            .unwrap();

        let listed = store.list_since("b1", "c1", 60).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message.role, "user");
        assert_eq!(listed[0].external_message_id.as_deref(), Some("42"));
    }

    #[test]
    fn s6_cross_channel_threading_fields_round_trip() {
        let store = SqliteMessageStore::in_memory().unwrap();
        store
            .persist_message(NewMessage {
                bot_id: "b1".into(),
                chat_id: "c1".into(),
                message: sample_message("assistant"),
                route_id: None,
                platform: Some("telegram".into()),
                sender_channel_identity_id: None,
                sender_user_id: None,
                display_name: None,
                external_message_id: None,
                source_reply_to_message_id: Some("42".into()),
                asset_content_hashes: vec![],
            })
            .unwrap();
        let listed = store.list_since("b1", "c1", 60).unwrap();
        assert_eq!(listed[0].source_reply_to_message_id.as_deref(), Some("42"));
        assert!(listed[0].external_message_id.is_none());
    }

    #[test]
    fn list_page_pages_newest_first_then_returns_oldest_first() {
        let store = SqliteMessageStore::in_memory().unwrap();
        for i in 0..5 {
            store
                .persist_message(NewMessage {
                    bot_id: "b1".into(),
                    chat_id: "c1".into(),
                    message: sample_message(&format!("msg{i}")),
                    route_id: None,
                    platform: None,
                    sender_channel_identity_id: None,
                    sender_user_id: None,
                    display_name: None,
                    external_message_id: None,
                    source_reply_to_message_id: None,
                    asset_content_hashes: vec![],
                })
                .unwrap();
        }
        let page = store.list_page("b1", "c1", 2, None).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].message.role, "msg3");
        assert_eq!(page[1].message.role, "msg4");

        let older = store.list_page("b1", "c1", 2, Some(page[0].id)).unwrap();
        assert_eq!(older.len(), 2);
        assert_eq!(older[0].message.role, "msg1");
        assert_eq!(older[1].message.role, "msg2");
    }

    #[test]
    fn clear_chat_removes_messages_and_asset_refs() {
        let store = SqliteMessageStore::in_memory().unwrap();
        store
            .persist_message(NewMessage {
                bot_id: "b1".into(),
                chat_id: "c1".into(),
                message: sample_message("user"),
                route_id: None,
                platform: None,
                sender_channel_identity_id: None,
                sender_user_id: None,
                display_name: None,
                external_message_id: None,
                source_reply_to_message_id: None,
                asset_content_hashes: vec!["hash1".into()],
            })
            .unwrap();
        store.clear_chat("b1", "c1").unwrap();
        assert!(store.list_since("b1", "c1", 60).unwrap().is_empty());
    }

    #[test]
    fn asset_refs_attach_to_the_right_message_only() {
        let store = SqliteMessageStore::in_memory().unwrap();
        store
            .persist_message(NewMessage {
                bot_id: "b1".into(),
                chat_id: "c1".into(),
                message: sample_message("user"),
                route_id: None,
                platform: None,
                sender_channel_identity_id: None,
                sender_user_id: None,
                display_name: None,
                external_message_id: None,
                source_reply_to_message_id: None,
                asset_content_hashes: vec!["h1".into(), "h2".into()],
            })
            .unwrap();
        store
            .persist_message(NewMessage {
                bot_id: "b1".into(),
                chat_id: "c1".into(),
                message: sample_message("assistant"),
                route_id: None,
                platform: None,
                sender_channel_identity_id: None,
                sender_user_id: None,
                display_name: None,
                external_message_id: None,
                source_reply_to_message_id: None,
                asset_content_hashes: vec![],
            })
            .unwrap();
        let listed = store.list_since("b1", "c1", 60).unwrap();
        assert_eq!(listed[0].asset_content_hashes, vec!["h1", "h2"]);
        assert!(listed[1].asset_content_hashes.is_empty());
    }
}
