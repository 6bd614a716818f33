//! Speech resource arbitration
//!
//! One microphone, one synthesizer, three voice modes. The arbiter is the
//! single owner of "which mode holds the mic" and "what is being spoken";
//! sessions acquire and release through it and never touch the hardware
//! state directly.
//!
//! Utterance pre-emption is a first-class outcome: a superseded `speak`
//! resolves [`SpeechOutcome::Preempted`], never `Completed`, so a stale
//! completion can never drive a state transition in the session that lost
//! the synthesizer.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;

use super::cleanup;
use super::synthesizer::{SpeechSynthesizer, UtteranceEnd};
use crate::Result;

/// The voice mode holding the microphone lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseHolder {
    Dictation,
    VoiceMode,
    WakeWord,
}

impl std::fmt::Display for LeaseHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dictation => write!(f, "dictation"),
            Self::VoiceMode => write!(f, "voice-mode"),
            Self::WakeWord => write!(f, "wake-word"),
        }
    }
}

/// How a `speak` call resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// The utterance ran to natural completion
    Completed,
    /// The utterance was superseded or stopped before completing
    Preempted,
}

struct ArbiterState {
    mic: Option<LeaseHolder>,
    utterance_gen: u64,
    preempt: Option<oneshot::Sender<()>>,
}

/// Arbiter for the shared recognizer/synthesizer pair
pub struct SpeechArbiter {
    state: Mutex<ArbiterState>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice_hint: Option<String>,
    output_enabled: AtomicBool,
}

impl SpeechArbiter {
    /// Create an arbiter over the given synthesizer
    #[must_use]
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, voice_hint: Option<String>) -> Self {
        Self {
            state: Mutex::new(ArbiterState {
                mic: None,
                utterance_gen: 0,
                preempt: None,
            }),
            synthesizer,
            voice_hint,
            output_enabled: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ArbiterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Acquire the microphone lease
    ///
    /// Succeeds iff the lease is free or already held by `holder`
    /// (idempotent re-acquisition). Never displaces another mode; use
    /// [`preempt_mic`](Self::preempt_mic) for explicit mode switches.
    pub fn acquire_mic(&self, holder: LeaseHolder) -> bool {
        let mut state = self.lock();
        match state.mic {
            None => {
                state.mic = Some(holder);
                tracing::debug!(%holder, "mic lease acquired");
                true
            }
            Some(held) if held == holder => true,
            Some(held) => {
                tracing::debug!(%holder, %held, "mic lease refused");
                false
            }
        }
    }

    /// Force-take the microphone lease (last writer wins)
    ///
    /// Returns the displaced holder, if any. The caller is responsible for
    /// having torn down the displaced mode's capture first.
    pub fn preempt_mic(&self, holder: LeaseHolder) -> Option<LeaseHolder> {
        let mut state = self.lock();
        let displaced = state.mic.take().filter(|held| *held != holder);
        state.mic = Some(holder);
        if let Some(prev) = displaced {
            tracing::info!(%holder, displaced = %prev, "mic lease preempted");
        }
        displaced
    }

    /// Release the microphone lease
    ///
    /// A release by a mode that does not hold the lease is a no-op.
    pub fn release_mic(&self, holder: LeaseHolder) {
        let mut state = self.lock();
        if state.mic == Some(holder) {
            state.mic = None;
            tracing::debug!(%holder, "mic lease released");
        }
    }

    /// The current lease holder, if any
    pub fn mic_holder(&self) -> Option<LeaseHolder> {
        self.lock().mic
    }

    /// Whether an utterance is currently in flight
    pub fn is_speaking(&self) -> bool {
        self.lock().preempt.is_some()
    }

    /// Whether assistant responses are spoken aloud
    pub fn output_enabled(&self) -> bool {
        self.output_enabled.load(Ordering::Relaxed)
    }

    /// Toggle voice output; disabling cuts off any current utterance
    pub fn set_output_enabled(&self, enabled: bool) {
        self.output_enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            self.stop_speaking();
        }
    }

    /// Speak `text`, first stopping any utterance already in progress
    ///
    /// Resolves `Completed` only on natural completion of this exact
    /// utterance. If a later `speak` or `stop_speaking` supersedes it, this
    /// call resolves `Preempted`. With voice output disabled the call
    /// completes immediately without synthesis.
    ///
    /// # Errors
    ///
    /// Returns error if the synthesizer fails before speech starts.
    pub async fn speak(&self, text: &str) -> Result<SpeechOutcome> {
        if !self.output_enabled() {
            return Ok(SpeechOutcome::Completed);
        }

        let (preempt_tx, mut preempt_rx) = oneshot::channel();
        let generation = {
            let mut state = self.lock();
            if let Some(prev) = state.preempt.take() {
                let _ = prev.send(());
            }
            state.utterance_gen += 1;
            state.preempt = Some(preempt_tx);
            state.utterance_gen
        };

        // Single active utterance: whatever was playing stops now
        self.synthesizer.cancel();

        let cleaned = cleanup::strip_markup(text);
        tracing::debug!(generation, len = cleaned.len(), "speaking");

        let speak_fut = self.synthesizer.speak(&cleaned, self.voice_hint.as_deref());
        tokio::pin!(speak_fut);

        let result = tokio::select! {
            end = &mut speak_fut => end,
            _ = &mut preempt_rx => Ok(UtteranceEnd::Cancelled),
        };

        {
            let mut state = self.lock();
            if state.utterance_gen == generation {
                state.preempt = None;
            }
        }

        let outcome = match result? {
            // A cancel can race natural completion; trust the generation
            UtteranceEnd::Completed if self.current_generation() == generation => {
                SpeechOutcome::Completed
            }
            _ => SpeechOutcome::Preempted,
        };
        tracing::debug!(generation, ?outcome, "utterance finished");
        Ok(outcome)
    }

    /// Stop any utterance in progress; idempotent, safe when silent
    pub fn stop_speaking(&self) {
        let preempt = self.lock().preempt.take();
        if let Some(tx) = preempt {
            let _ = tx.send(());
        }
        self.synthesizer.cancel();
    }

    fn current_generation(&self) -> u64 {
        self.lock().utterance_gen
    }
}
