//! Per-conversation session memory.
//!
//! A [`Session`] is an append-only message log keyed by a stable
//! session id. The log is shared by *every* agent invoked within one
//! conversation: agents see each other's turns, which is what makes
//! multi-turn references like "restaurants there" resolve. Session ids
//! are never derived per agent or per component.
//!
//! Storage is SQLite via `rusqlite`, either file-backed (survives
//! process restarts) or in-memory (tests, ephemeral conversations).

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

/// Role of a recorded conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions.
    System,
    /// User input (including dispatched subquery text).
    User,
    /// Agent or model output.
    Assistant,
}

impl MessageRole {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parses a role string (case-insensitive). Unknown roles map to
    /// [`Self::Assistant`] so history replay never drops rows.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "system" => Self::System,
            "user" => Self::User,
            _ => Self::Assistant,
        }
    }
}

/// One recorded message in a session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Message role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Unix timestamp (seconds) when the message was appended.
    pub created_at: i64,
}

/// SQLite-backed store for session message logs.
///
/// One store may hold any number of sessions; rows are keyed by
/// session id and ordered by insertion. File-backed stores keep keys
/// stable across process restarts.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Opens (creating if needed) a file-backed store.
    ///
    /// Parent directories are created when missing.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Session`] on filesystem or SQLite errors.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| RouterError::Session {
                message: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| RouterError::Session {
            message: format!("cannot open {}: {e}", path.display()),
        })?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store. State is lost when the store drops.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Session`] on SQLite errors.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| RouterError::Session {
            message: format!("cannot open in-memory store: {e}"),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_messages (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT    NOT NULL,
                role       TEXT    NOT NULL,
                content    TEXT    NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_session_messages_session
                ON session_messages(session_id, id);",
        )
        .map_err(|e| RouterError::Session {
            message: format!("cannot initialize schema: {e}"),
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Appends a message to a session log.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Session`] on SQLite errors.
    pub fn append(&self, session_id: &str, role: MessageRole, content: &str) -> Result<()> {
        let created_at = unix_now();
        self.lock()
            .execute(
                "INSERT INTO session_messages (session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, role.as_str(), content, created_at],
            )
            .map_err(|e| RouterError::Session {
                message: format!("cannot append to session '{session_id}': {e}"),
            })?;
        Ok(())
    }

    /// Returns a session's messages in append order.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Session`] on SQLite errors.
    pub fn history(&self, session_id: &str) -> Result<Vec<SessionMessage>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT role, content, created_at FROM session_messages
                 WHERE session_id = ?1 ORDER BY id ASC",
            )
            .map_err(|e| RouterError::Session {
                message: format!("cannot read session '{session_id}': {e}"),
            })?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(SessionMessage {
                    role: MessageRole::parse(&row.get::<_, String>(0)?),
                    content: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })
            .map_err(|e| RouterError::Session {
                message: format!("cannot read session '{session_id}': {e}"),
            })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(|e| RouterError::Session {
                message: format!("cannot read session '{session_id}': {e}"),
            })?);
        }
        Ok(messages)
    }

    /// Deletes all messages of one session.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Session`] on SQLite errors.
    pub fn clear(&self, session_id: &str) -> Result<()> {
        self.lock()
            .execute(
                "DELETE FROM session_messages WHERE session_id = ?1",
                params![session_id],
            )
            .map_err(|e| RouterError::Session {
                message: format!("cannot clear session '{session_id}': {e}"),
            })?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Cloneable handle to one conversation's log within a [`SessionStore`].
///
/// All components participating in one conversation hold clones of the
/// same handle and therefore write to the same log.
#[derive(Clone)]
pub struct Session {
    id: String,
    store: Arc<SessionStore>,
}

impl Session {
    /// Creates a handle for `id` over `store`.
    #[must_use]
    pub fn new(id: impl Into<String>, store: Arc<SessionStore>) -> Self {
        Self {
            id: id.into(),
            store,
        }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Appends a message to this session's log.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Session`] on store errors.
    pub fn append(&self, role: MessageRole, content: &str) -> Result<()> {
        self.store.append(&self.id, role, content)
    }

    /// This session's messages in append order.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Session`] on store errors.
    pub fn history(&self) -> Result<Vec<SessionMessage>> {
        self.store.history(&self.id)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}
