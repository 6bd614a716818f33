//! In-memory conversation log
//!
//! Turns are immutable once appended. Persistence is delegated to
//! [`HistoryRepo`](crate::db::HistoryRepo), best-effort: a failed write is
//! logged and never blocks the conversation.

use chrono::{DateTime, Utc};

use crate::db::HistoryRepo;

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in the conversation
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered conversation log with optional persistence
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
    repo: Option<HistoryRepo>,
}

impl ConversationLog {
    /// Create an unpersisted log
    #[must_use]
    pub const fn new() -> Self {
        Self {
            turns: Vec::new(),
            repo: None,
        }
    }

    /// Create a log backed by a history repository
    ///
    /// Previously stored turns are loaded into the log; a load failure
    /// starts empty.
    #[must_use]
    pub fn with_repo(repo: HistoryRepo) -> Self {
        let turns = match repo.list() {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load history, starting empty");
                Vec::new()
            }
        };

        Self {
            turns,
            repo: Some(repo),
        }
    }

    /// Append a turn, persisting it best-effort
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> &ConversationTurn {
        let turn = ConversationTurn {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        };

        if let Some(repo) = &self.repo {
            if let Err(e) = repo.append(&turn) {
                tracing::warn!(error = %e, "failed to persist turn");
            }
        }

        self.turns.push(turn);
        self.turns.last().unwrap_or_else(|| unreachable!())
    }

    /// Append a user/assistant turn pair for one exchange
    pub fn append_exchange(&mut self, user_text: &str, assistant_text: &str) {
        self.append(Role::User, user_text);
        self.append(Role::Assistant, assistant_text);
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Clear the log and its persisted mirror
    pub fn clear(&mut self) {
        self.turns.clear();
        if let Some(repo) = &self.repo {
            if let Err(e) = repo.clear() {
                tracing::warn!(error = %e, "failed to clear persisted history");
            }
        }
    }
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}
