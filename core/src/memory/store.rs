use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    message TEXT NOT NULL,
    response TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS user_memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    memory_key TEXT NOT NULL,
    memory_value TEXT NOT NULL,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(user_id, memory_key)
);

CREATE INDEX IF NOT EXISTS idx_user_session ON conversations (user_id, session_id);
CREATE INDEX IF NOT EXISTS idx_user_memories ON user_memories (user_id);
"#;

/// One user message and the answer that was given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub message: String,
    pub response: String,
}

impl Exchange {
    pub fn new(message: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: response.into(),
        }
    }
}

/// SQLite-backed conversation log and per-user fact store
pub struct MemoryStore {
    conn: Mutex<Connection>,
    default_history: usize,
}

impl MemoryStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>, default_history: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        debug!("Opened memory database at {}", path.display());
        Self::with_connection(conn, default_history)
    }

    /// Volatile store, used by tests and `--incognito`-style runs
    pub fn open_in_memory(default_history: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, default_history)
    }

    fn with_connection(conn: Connection, default_history: usize) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            default_history,
        })
    }

    pub fn store_conversation(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
        response: &str,
    ) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO conversations (user_id, session_id, message, response) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, session_id, message, response],
        )?;
        Ok(())
    }

    /// Insert or replace the fact stored under `(user_id, key)`
    pub fn store_memory(&self, user_id: &str, key: &str, value: &str) -> Result<()> {
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO user_memories (user_id, memory_key, memory_value) VALUES (?1, ?2, ?3)",
            params![user_id, key, value],
        )?;
        Ok(())
    }

    pub fn get_user_memories(&self, user_id: &str) -> Result<BTreeMap<String, String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT memory_key, memory_value FROM user_memories WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut memories = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            memories.insert(key, value);
        }
        Ok(memories)
    }

    /// Last `limit` exchanges of a session, oldest first
    pub fn get_recent_conversations(
        &self,
        user_id: &str,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Exchange>> {
        let limit = limit.unwrap_or(self.default_history) as i64;
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT message, response FROM conversations
             WHERE user_id = ?1 AND session_id = ?2
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, session_id, limit], |row| {
            Ok(Exchange {
                message: row.get(0)?,
                response: row.get(1)?,
            })
        })?;

        let mut exchanges = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        exchanges.reverse();
        Ok(exchanges)
    }

    /// Drop everything known about a user. Returns the number of rows removed.
    pub fn clear_user(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let memories = conn.execute("DELETE FROM user_memories WHERE user_id = ?1", params![user_id])?;
        let conversations =
            conn.execute("DELETE FROM conversations WHERE user_id = ?1", params![user_id])?;
        Ok(memories + conversations)
    }
}
