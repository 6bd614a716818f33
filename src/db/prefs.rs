//! Key/value preference store
//!
//! Holds the handful of client preferences read at startup and written on
//! change: theme, voice-output flag, wake-word-enabled flag.

use super::DbPool;
use crate::{Error, Result};

/// Preference key for the UI theme
pub const THEME: &str = "theme";
/// Preference key for the voice-output flag
pub const VOICE_OUTPUT: &str = "voice_output";
/// Preference key for the wake-word-enabled flag
pub const WAKE_WORD_ENABLED: &str = "wake_word_enabled";

/// Repository for client preferences
#[derive(Clone)]
pub struct PrefsRepo {
    pool: DbPool,
}

impl PrefsRepo {
    /// Create a new preferences repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a preference value
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let value = conn
            .query_row("SELECT value FROM prefs WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .ok();

        Ok(value)
    }

    /// Set a preference value
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO prefs (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;

        Ok(())
    }

    /// Get a boolean preference, with a default when unset
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.get(key)?.map_or(default, |v| v == "true"))
    }

    /// Set a boolean preference
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, if value { "true" } else { "false" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_get_unset_returns_none() {
        let repo = PrefsRepo::new(db::init_memory().unwrap());
        assert_eq!(repo.get(THEME).unwrap(), None);
    }

    #[test]
    fn test_set_and_overwrite() {
        let repo = PrefsRepo::new(db::init_memory().unwrap());
        repo.set(THEME, "light").unwrap();
        repo.set(THEME, "dark").unwrap();
        assert_eq!(repo.get(THEME).unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn test_bool_defaults() {
        let repo = PrefsRepo::new(db::init_memory().unwrap());
        assert!(repo.get_bool(VOICE_OUTPUT, true).unwrap());
        repo.set_bool(VOICE_OUTPUT, false).unwrap();
        assert!(!repo.get_bool(VOICE_OUTPUT, true).unwrap());
        assert!(!repo.get_bool(WAKE_WORD_ENABLED, false).unwrap());
    }
}
