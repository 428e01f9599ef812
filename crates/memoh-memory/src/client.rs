use std::sync::Mutex;

use chrono::Utc;
use memoh_core::error::{MemohError, Result};
use memoh_core::{MemoryItem, ModelMessage, MEMORY_NAMESPACE};
use rusqlite::{params, Connection};

use crate::db;

/// Parameters for a memory search, matching the consumed `Search` operation
/// of §6.2. `namespace`/`scope_id` are always `"bot"`/`bot_id` in this
/// system — the field names survive from the external interface shape this
/// mirrors even though only one namespace is ever used.
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub bot_id: &'a str,
    pub limit: usize,
}

/// One message to extract memory from, matching the consumed `Add`
/// operation of §6.2.
pub struct AddMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Wraps a raw user query as a single FTS5 phrase so punctuation the user
/// typed (an unbalanced `"`, a trailing `:`, `(`, `*`, a bare `AND`/`OR`/
/// `NEAR`) is never parsed as query syntax. Embedded `"` are escaped by
/// doubling, matching FTS5's own phrase-quoting rule.
fn quote_fts_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

/// SQLite/FTS5-backed memory service client.
///
/// Grounded in `skynet_memory::manager::MemoryManager::search`/`learn`
/// (FTS5 MATCH query, external-content table synced manually on write), but
/// collapsed to the single `"bot"` namespace this system uses instead of the
/// teacher's per-category/per-user model.
pub struct SqliteMemoryClient {
    db: Mutex<Connection>,
}

impl SqliteMemoryClient {
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

    /// `Search({Query, BotID, Limit, Filters, NoStats}) -> {Results}`.
    /// Scopes to `namespace="bot", scopeId=BotID` per §4.4 step 6.
    pub fn search(&self, req: SearchRequest<'_>) -> Result<Vec<MemoryItem>> {
        if req.query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let db = self.db.lock().expect("memory client mutex poisoned");
        let mut stmt = db
            .prepare(
                "SELECT m.id, m.memory, bm25(bot_memory_fts) AS score
                 FROM bot_memory m
                 JOIN bot_memory_fts f ON m.id = f.rowid
                 WHERE m.namespace = ?1 AND m.scope_id = ?2 AND bot_memory_fts MATCH ?3
                 ORDER BY score
                 LIMIT ?4",
            )
            .map_err(|e| MemohError::Storage(e.to_string()))?;

        let fts_query = quote_fts_phrase(req.query);
        let rows = stmt
            .query_map(
                params![MEMORY_NAMESPACE, req.bot_id, fts_query, req.limit as i64],
                |row| {
                    let id: i64 = row.get(0)?;
                    let memory: String = row.get(1)?;
                    // bm25 is negative and lower-is-better; invert to a
                    // conventional ascending "higher is more relevant" score.
                    let bm25: f64 = row.get(2)?;
                    Ok((id, memory, -bm25))
                },
            )
            .map_err(|e| MemohError::Storage(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, memory, score) = row.map_err(|e| MemohError::Storage(e.to_string()))?;
            out.push(MemoryItem {
                id: id.to_string(),
                memory,
                score,
                namespace: MEMORY_NAMESPACE.to_string(),
                scope_id: req.bot_id.to_string(),
            });
        }
        Ok(out)
    }

    /// `Add({Messages, BotID, Filters})`. Stores every non-empty message as
    /// one memory row, syncing the FTS5 index the way `learn` does.
    pub fn add(&self, bot_id: &str, messages: &[AddMessage<'_>]) -> Result<()> {
        let db = self.db.lock().expect("memory client mutex poisoned");
        let now = Utc::now().to_rfc3339();
        for m in messages {
            if m.content.trim().is_empty() {
                continue;
            }
            let memory_text = format!("{}: {}", m.role, m.content);
            db.execute(
                "INSERT INTO bot_memory (namespace, scope_id, memory, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![MEMORY_NAMESPACE, bot_id, memory_text, now],
            )
            .map_err(|e| MemohError::Storage(e.to_string()))?;
            let id = db.last_insert_rowid();
            db.execute(
                "INSERT INTO bot_memory_fts(rowid, memory) VALUES (?1, ?2)",
                params![id, memory_text],
            )
            .map_err(|e| MemohError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    /// Convenience for StoreRound's "for every non-empty-text message" rule.
    pub fn add_model_messages(&self, bot_id: &str, messages: &[ModelMessage]) -> Result<()> {
        let mut owned = Vec::new();
        let mut refs = Vec::new();
        for m in messages {
            let text = match &m.content {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            owned.push((m.role.clone(), text));
        }
        for (role, text) in &owned {
            refs.push(AddMessage { role, content: text });
        }
        self.add(bot_id, &refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_returns_nothing_for_blank_query() {
        let client = SqliteMemoryClient::in_memory().unwrap();
        let results = client
            .search(SearchRequest { query: "  ", bot_id: "b1", limit: 4 })
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn add_then_search_roundtrips() {
        let client = SqliteMemoryClient::in_memory().unwrap();
        client
            .add(
                "b1",
                &[AddMessage { role: "user", content: "my favorite color is teal" }],
            )
            .unwrap();
        let results = client
            .search(SearchRequest { query: "favorite color", bot_id: "b1", limit: 4 })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].memory.contains("teal"));
        assert_eq!(results[0].namespace, "bot");
        assert_eq!(results[0].scope_id, "b1");
    }

    #[test]
    fn search_tolerates_fts5_special_characters() {
        let client = SqliteMemoryClient::in_memory().unwrap();
        client.add("b1", &[AddMessage { role: "user", content: "likes tea" }]).unwrap();
        for query in ["unbalanced \"quote", "trailing:", "paren(", "star*", "AND", "a OR b", "NEAR(x y)"] {
            let results = client.search(SearchRequest { query, bot_id: "b1", limit: 4 }).unwrap();
            assert!(results.is_empty());
        }
    }

    #[test]
    fn search_is_scoped_to_bot_id() {
        let client = SqliteMemoryClient::in_memory().unwrap();
        client.add("b1", &[AddMessage { role: "user", content: "likes tea" }]).unwrap();
        client.add("b2", &[AddMessage { role: "user", content: "likes tea" }]).unwrap();
        let results = client
            .search(SearchRequest { query: "tea", bot_id: "b1", limit: 10 })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].scope_id, "b1");
    }
}
