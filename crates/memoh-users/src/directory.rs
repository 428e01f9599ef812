use std::collections::HashMap;
use std::sync::Mutex;

use memoh_core::error::{MemohError, Result};
use rusqlite::{params, Connection};
use tracing::debug;

use crate::db;

/// The literal display-name fallback when no identity or user record
/// supplies one (§4.4 sender resolution).
pub const DEFAULT_DISPLAY_NAME: &str = "User";

#[derive(Debug, Clone, Default)]
pub struct SenderResolution {
    pub sender_channel_identity_id: Option<String>,
    pub sender_user_id: Option<String>,
    pub display_name: String,
}

struct IdentityRow {
    linked_user_id: Option<String>,
    display_name: Option<String>,
}

/// Channel-identity and user directory used for sender resolution.
///
/// Grounded in `skynet_users::resolver::UserResolver`'s cache-then-DB shape,
/// but existence-check only: this system never auto-creates users on first
/// contact, it silently demotes unknown ids to `None` to keep foreign keys
/// satisfied (§9 "Identity existence checks").
pub struct IdentityDirectory {
    db: Mutex<Connection>,
    identity_cache: Mutex<HashMap<String, (Option<String>, Option<String>)>>,
    user_display_name_cache: Mutex<HashMap<String, Option<String>>>,
}

impl IdentityDirectory {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| MemohError::Storage(e.to_string()))?;
        db::init_db(&conn).map_err(|e| MemohError::Storage(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| MemohError::Storage(e.to_string()))?;
        db::init_db(&conn).map_err(|e| MemohError::Storage(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
            identity_cache: Mutex::new(HashMap::new()),
            user_display_name_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn upsert_user(&self, user_id: &str, display_name: Option<&str>) -> Result<()> {
        let conn = self.db.lock().expect("identity directory mutex poisoned");
        conn.execute(
            "INSERT INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
            params![user_id, display_name, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| MemohError::Storage(e.to_string()))?;
        self.user_display_name_cache.lock().unwrap().remove(user_id);
        Ok(())
    }

    pub fn upsert_identity(&self, identity_id: &str, user_id: Option<&str>, display_name: Option<&str>) -> Result<()> {
        let conn = self.db.lock().expect("identity directory mutex poisoned");
        conn.execute(
            "INSERT INTO channel_identities (id, user_id, display_name, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, display_name = excluded.display_name",
            params![identity_id, user_id, display_name, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| MemohError::Storage(e.to_string()))?;
        self.identity_cache.lock().unwrap().remove(identity_id);
        Ok(())
    }

    fn identity_row(&self, identity_id: &str) -> Result<Option<IdentityRow>> {
        if let Some((linked, display)) = self.identity_cache.lock().unwrap().get(identity_id).cloned() {
            debug!(identity_id, "identity cache hit");
            return Ok(Some(IdentityRow { linked_user_id: linked, display_name: display }));
        }
        let conn = self.db.lock().expect("identity directory mutex poisoned");
        let row: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT user_id, display_name FROM channel_identities WHERE id = ?1",
                params![identity_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .ok();
        if let Some((linked, display)) = &row {
            self.identity_cache
                .lock()
                .unwrap()
                .insert(identity_id.to_string(), (linked.clone(), display.clone()));
        }
        Ok(row.map(|(linked_user_id, display_name)| IdentityRow { linked_user_id, display_name }))
    }

    fn user_display_name(&self, user_id: &str) -> Result<Option<String>> {
        if let Some(cached) = self.user_display_name_cache.lock().unwrap().get(user_id).cloned() {
            return Ok(cached);
        }
        let conn = self.db.lock().expect("identity directory mutex poisoned");
        let name: Option<String> = conn
            .query_row("SELECT display_name FROM users WHERE id = ?1", params![user_id], |r| r.get(0))
            .ok()
            .flatten();
        self.user_display_name_cache
            .lock()
            .unwrap()
            .insert(user_id.to_string(), name.clone());
        Ok(name)
    }

    fn user_exists(&self, user_id: &str) -> Result<bool> {
        let conn = self.db.lock().expect("identity directory mutex poisoned");
        Ok(conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id], |_| Ok(()))
            .is_ok())
    }

    /// Implements §4.4's sender-resolution rules exactly.
    pub fn resolve_sender(
        &self,
        source_channel_identity_id: Option<&str>,
        user_id: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<SenderResolution> {
        let identity_row = match source_channel_identity_id {
            Some(id) => self.identity_row(id)?,
            None => None,
        };
        let sender_channel_identity_id = if identity_row.is_some() {
            source_channel_identity_id.map(String::from)
        } else {
            None
        };

        let direct_user_valid = match user_id {
            Some(id) => self.user_exists(id)?,
            None => false,
        };
        let sender_user_id = if direct_user_valid {
            user_id.map(String::from)
        } else {
            identity_row.as_ref().and_then(|r| r.linked_user_id.clone())
        };

        let resolved_display_name = display_name
            .map(String::from)
            .or_else(|| identity_row.as_ref().and_then(|r| r.display_name.clone()))
            .or_else(|| sender_user_id.as_deref().and_then(|uid| self.user_display_name(uid).ok().flatten()))
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        Ok(SenderResolution {
            sender_channel_identity_id,
            sender_user_id,
            display_name: resolved_display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_identity_and_user_ids_are_silently_dropped() {
        let dir = IdentityDirectory::in_memory().unwrap();
        let resolution = dir.resolve_sender(Some("ghost-identity"), Some("ghost-user"), None).unwrap();
        assert!(resolution.sender_channel_identity_id.is_none());
        assert!(resolution.sender_user_id.is_none());
        assert_eq!(resolution.display_name, DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn known_identity_links_to_its_user() {
        let dir = IdentityDirectory::in_memory().unwrap();
        dir.upsert_user("u1", Some("Ada")).unwrap();
        dir.upsert_identity("tg:1", Some("u1"), Some("Ada on Telegram")).unwrap();

        let resolution = dir.resolve_sender(Some("tg:1"), None, None).unwrap();
        assert_eq!(resolution.sender_channel_identity_id.as_deref(), Some("tg:1"));
        assert_eq!(resolution.sender_user_id.as_deref(), Some("u1"));
        assert_eq!(resolution.display_name, "Ada on Telegram");
    }

    #[test]
    fn explicit_display_name_wins_over_directory_lookups() {
        let dir = IdentityDirectory::in_memory().unwrap();
        dir.upsert_user("u1", Some("Ada")).unwrap();
        dir.upsert_identity("tg:1", Some("u1"), Some("Ada on Telegram")).unwrap();

        let resolution = dir.resolve_sender(Some("tg:1"), None, Some("Override")).unwrap();
        assert_eq!(resolution.display_name, "Override");
    }

    #[test]
    fn explicit_user_id_wins_over_identity_linked_user_when_it_exists() {
        let dir = IdentityDirectory::in_memory().unwrap();
        dir.upsert_user("u1", Some("Ada")).unwrap();
        dir.upsert_user("u2", Some("Bob")).unwrap();
        dir.upsert_identity("tg:1", Some("u1"), None).unwrap();

        let resolution = dir.resolve_sender(Some("tg:1"), Some("u2"), None).unwrap();
        assert_eq!(resolution.sender_user_id.as_deref(), Some("u2"));
    }

    #[test]
    fn falls_back_to_linked_users_display_name() {
        let dir = IdentityDirectory::in_memory().unwrap();
        dir.upsert_user("u1", Some("Ada")).unwrap();
        dir.upsert_identity("tg:1", Some("u1"), None).unwrap();

        let resolution = dir.resolve_sender(Some("tg:1"), None, None).unwrap();
        assert_eq!(resolution.display_name, "Ada");
    }
}
