//! Voice session state machines
//!
//! Three mutually exclusive consumers of the speech resources: push-to-talk
//! dictation, the continuous voice-mode dialog loop, and the always-on
//! wake-word loop. Each session is a sequential async loop; deferred
//! continuations (re-listen timers, restart debounces) are raced against
//! the session's activation generation so a teardown invalidates them.

mod dictation;
mod voice_mode;
mod wake;

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::chat::{ChatClient, ConversationLog};
use crate::config::Config;
use crate::db::{PrefsRepo, prefs};
use crate::error::Result;
use crate::speech::{SpeechArbiter, SpeechRecognizer, SpeechSynthesizer};

pub use dictation::{DictationSession, DictationState};
pub use voice_mode::{VoiceModeSession, VoiceModeState};
pub use wake::{WakePhraseMatcher, WakeState, WakeWordSession};

/// Shared dependencies handed to every session
#[derive(Clone)]
pub struct VoiceDeps {
    pub arbiter: Arc<SpeechArbiter>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub chat: ChatClient,
    pub log: Arc<Mutex<ConversationLog>>,
}

/// Persisted voice settings bound to the live arbiter
///
/// Preferences win over configured defaults at startup; toggles are
/// written back so the next start resumes where the user left off.
pub struct VoiceSettings {
    arbiter: Arc<SpeechArbiter>,
    prefs: PrefsRepo,
}

impl VoiceSettings {
    /// Builds the arbiter from configuration, then applies the persisted
    /// preferences on top.
    ///
    /// # Errors
    ///
    /// Returns error if the preference store cannot be read.
    pub fn load(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: &Config,
        prefs: PrefsRepo,
    ) -> Result<Self> {
        let arbiter = Arc::new(SpeechArbiter::new(
            synthesizer,
            config.voice.voice_hint.clone(),
        ));
        let output = prefs.get_bool(prefs::VOICE_OUTPUT, config.voice.output_enabled)?;
        arbiter.set_output_enabled(output);
        tracing::debug!(voice_output = output, "voice settings loaded");

        Ok(Self { arbiter, prefs })
    }

    /// The arbiter the settings were applied to
    #[must_use]
    pub fn arbiter(&self) -> Arc<SpeechArbiter> {
        self.arbiter.clone()
    }

    /// Whether assistant responses are spoken aloud
    #[must_use]
    pub fn voice_output(&self) -> bool {
        self.arbiter.output_enabled()
    }

    /// Toggles spoken output, persisting the choice
    ///
    /// Disabling cuts off any utterance in progress.
    ///
    /// # Errors
    ///
    /// Returns error if the preference cannot be written.
    pub fn set_voice_output(&self, enabled: bool) -> Result<()> {
        self.prefs.set_bool(prefs::VOICE_OUTPUT, enabled)?;
        self.arbiter.set_output_enabled(enabled);
        Ok(())
    }

    /// Whether the wake-word session was left enabled last run
    ///
    /// # Errors
    ///
    /// Returns error if the preference store cannot be read.
    pub fn wake_word_enabled(&self) -> Result<bool> {
        self.prefs.get_bool(prefs::WAKE_WORD_ENABLED, false)
    }

    /// Persists the wake-word toggle
    ///
    /// # Errors
    ///
    /// Returns error if the preference cannot be written.
    pub fn set_wake_word_enabled(&self, enabled: bool) -> Result<()> {
        self.prefs.set_bool(prefs::WAKE_WORD_ENABLED, enabled)
    }
}

/// Events surfaced to the UI layer
///
/// The core never renders; whoever owns the screen subscribes to these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// Interim transcript to mirror into the input field
    InputPreview(String),
    /// Final transcript of what the user said
    Transcript(String),
    /// Informational status line
    Status(String),
    /// Error status line
    StatusError(String),
    /// One incremental fragment of a streaming response
    Delta(String),
}

/// Best-effort sink for [`VoiceEvent`]s
///
/// A session with no subscriber runs fine; emission is never an error.
#[derive(Clone, Default)]
pub struct UiSink {
    tx: Option<mpsc::UnboundedSender<VoiceEvent>>,
}

impl UiSink {
    /// A sink that discards everything
    #[must_use]
    pub const fn none() -> Self {
        Self { tx: None }
    }

    /// A sink feeding the given channel
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<VoiceEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub(crate) fn emit(&self, event: VoiceEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

/// Case-insensitive exit-phrase check (substring match)
pub(crate) fn contains_exit_phrase(phrases: &[String], transcript: &str) -> bool {
    let lower = transcript.to_lowercase();
    phrases
        .iter()
        .any(|phrase| lower.contains(&phrase.to_lowercase()))
}
