//! Conversation history repository

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::chat::{ConversationTurn, Role};
use crate::{Error, Result};

/// Repository for persisted conversation turns
#[derive(Clone)]
pub struct HistoryRepo {
    pool: DbPool,
}

impl HistoryRepo {
    /// Create a new history repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append one turn
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn append(&self, turn: &ConversationTurn) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO turns (id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                turn.role.as_str(),
                turn.text,
                turn.timestamp.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// List all turns in insertion order
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self) -> Result<Vec<ConversationTurn>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt =
            conn.prepare("SELECT role, content, created_at FROM turns ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            let role: String = row.get(0)?;
            let content: String = row.get(1)?;
            let created_at: String = row.get(2)?;
            Ok((role, content, created_at))
        })?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, content, created_at) = row?;
            let role = match role.as_str() {
                "assistant" => Role::Assistant,
                _ => Role::User,
            };
            turns.push(ConversationTurn {
                role,
                text: content,
                timestamp: parse_datetime(&created_at),
            });
        }

        Ok(turns)
    }

    /// Delete all turns
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn clear(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute("DELETE FROM turns", [])?;
        Ok(())
    }
}

/// Parse an RFC 3339 timestamp, defaulting to now on failure
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
