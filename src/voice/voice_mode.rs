//! Hands-free conversation loop
//!
//! `Listening -> Thinking -> Speaking -> Listening` until an exit phrase
//! is heard or the session is deactivated. Each activation carries a
//! generation; deferred re-listen timers re-check it before touching the
//! microphone so a rapid deactivate/reactivate never leaves two loops
//! running.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};

use crate::chat::{ChatClient, ConversationLog, Role};
use crate::config::Config;
use crate::error::Result;
use crate::speech::{
    LeaseHolder, RecognitionErrorKind, RecognitionEvent, RecognizerConfig, SpeechArbiter,
    SpeechOutcome, SpeechRecognizer,
};

use super::{UiSink, VoiceDeps, VoiceEvent, contains_exit_phrase};

/// Where the voice-mode loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceModeState {
    #[default]
    Inactive,
    Listening,
    Thinking,
    Speaking,
}

/// What one listening pass produced
enum ListenOutcome {
    Heard(String),
    Silence,
    Aborted,
    Failed(RecognitionErrorKind),
    Deactivated,
}

/// Continuous voice dialog session
pub struct VoiceModeSession {
    arbiter: Arc<SpeechArbiter>,
    recognizer: Arc<dyn SpeechRecognizer>,
    chat: ChatClient,
    log: Arc<Mutex<ConversationLog>>,
    ui: UiSink,
    language: String,
    exit_phrases: Vec<String>,
    farewell: String,
    apology: String,
    relisten_delay: Duration,
    state: watch::Sender<VoiceModeState>,
    active: watch::Sender<bool>,
    generation: AtomicU64,
    retrigger: Notify,
}

impl VoiceModeSession {
    #[must_use]
    pub fn new(deps: VoiceDeps, config: &Config, ui: UiSink) -> Self {
        Self {
            arbiter: deps.arbiter,
            recognizer: deps.recognizer,
            chat: deps.chat,
            log: deps.log,
            ui,
            language: config.voice.language.clone(),
            exit_phrases: config.exit_phrases.clone(),
            farewell: config.wake.farewell_text.clone(),
            apology: config.apology_text.clone(),
            relisten_delay: config.timing.relisten_delay,
            state: watch::Sender::new(VoiceModeState::Inactive),
            active: watch::Sender::new(false),
            generation: AtomicU64::new(0),
            retrigger: Notify::new(),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> VoiceModeState {
        *self.state.borrow()
    }

    /// Watch the session state
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<VoiceModeState> {
        self.state.subscribe()
    }

    /// Whether the session is currently active
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// Restarts listening after a silent or failed pass.
    pub fn retrigger_listening(&self) {
        self.retrigger.notify_one();
    }

    /// Deactivates the session: silences speech, invalidates any pending
    /// re-listen, and lets `run` tear down.
    pub fn deactivate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.active.send_replace(false);
        self.arbiter.stop_speaking();
        self.retrigger.notify_one();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation && *self.active.borrow()
    }

    /// Runs the dialog loop until an exit phrase, a fatal recognizer
    /// failure, or [`deactivate`](Self::deactivate).
    ///
    /// Entering displaces whichever session held the microphone.
    ///
    /// # Errors
    ///
    /// Returns an error when the recognizer cannot start or a
    /// non-transport chat failure occurs.
    pub async fn run(&self) -> Result<()> {
        if self.is_active() {
            tracing::warn!("voice mode already active, ignoring run");
            return Ok(());
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(displaced) = self.arbiter.preempt_mic(LeaseHolder::VoiceMode) {
            tracing::info!(displaced = %displaced, "voice mode displaced microphone holder");
        }
        self.active.send_replace(true);
        tracing::info!("voice mode activated");

        let result = self.dialog_loop(generation).await;
        self.teardown();
        result
    }

    async fn dialog_loop(&self, generation: u64) -> Result<()> {
        let mut active_rx = self.active.subscribe();

        while self.is_current(generation) {
            self.state.send_replace(VoiceModeState::Listening);
            self.ui
                .emit(VoiceEvent::Status("Listening...".to_string()));

            let outcome = self.listen_once(&mut active_rx).await?;
            if !self.is_current(generation) {
                break;
            }

            match outcome {
                ListenOutcome::Heard(transcript) => {
                    if contains_exit_phrase(&self.exit_phrases, &transcript) {
                        tracing::info!(transcript = %transcript, "exit phrase heard");
                        self.ui.emit(VoiceEvent::Transcript(transcript));
                        self.state.send_replace(VoiceModeState::Speaking);
                        let _ = self.arbiter.speak(&self.farewell).await?;
                        break;
                    }
                    let spoke = self.respond(&transcript).await?;
                    if spoke == SpeechOutcome::Completed
                        && self.relisten(generation, &mut active_rx).await
                    {
                        continue;
                    }
                    // Preempted speech or an invalidated timer: wait for
                    // the user to retrigger rather than grabbing the mic.
                    if !self.wait_for_retrigger(&mut active_rx).await {
                        break;
                    }
                }
                ListenOutcome::Silence => {
                    self.ui.emit(VoiceEvent::Status(
                        "No speech detected. Tap to try again".to_string(),
                    ));
                    if !self.wait_for_retrigger(&mut active_rx).await {
                        break;
                    }
                }
                ListenOutcome::Aborted => {
                    // Abort is our own doing (teardown or mode switch).
                    if !self.is_current(generation) {
                        break;
                    }
                }
                ListenOutcome::Failed(kind) => {
                    tracing::warn!(kind = %kind, "voice mode recognition failed");
                    self.ui
                        .emit(VoiceEvent::StatusError(format!("Speech error: {kind}")));
                    if kind == RecognitionErrorKind::PermissionDenied {
                        break;
                    }
                    if !self.wait_for_retrigger(&mut active_rx).await {
                        break;
                    }
                }
                ListenOutcome::Deactivated => break,
            }
        }
        Ok(())
    }

    /// One single-shot capture, raced against deactivation.
    async fn listen_once(&self, active_rx: &mut watch::Receiver<bool>) -> Result<ListenOutcome> {
        let mut capture = self
            .recognizer
            .start(RecognizerConfig::single_shot(&self.language))?;

        let mut heard: Option<String> = None;
        loop {
            let event = tokio::select! {
                event = capture.next_event() => event,
                _ = active_rx.wait_for(|active| !*active) => None,
            };
            if !self.is_active() {
                capture.abort();
                return Ok(ListenOutcome::Deactivated);
            }
            match event {
                Some(RecognitionEvent::Partial(text)) => {
                    self.ui.emit(VoiceEvent::InputPreview(text));
                }
                Some(RecognitionEvent::Final(text)) => {
                    heard = Some(text);
                    capture.stop();
                }
                Some(RecognitionEvent::Error(kind)) => {
                    return Ok(match kind {
                        RecognitionErrorKind::NoSpeech => ListenOutcome::Silence,
                        RecognitionErrorKind::Aborted => ListenOutcome::Aborted,
                        other => ListenOutcome::Failed(other),
                    });
                }
                Some(RecognitionEvent::Ended) | None => break,
            }
        }
        Ok(match heard.filter(|t| !t.trim().is_empty()) {
            Some(text) => ListenOutcome::Heard(text),
            None => ListenOutcome::Silence,
        })
    }

    /// Sends the transcript and speaks the reply (or the apology on a
    /// transport failure).
    async fn respond(&self, transcript: &str) -> Result<SpeechOutcome> {
        self.ui.emit(VoiceEvent::Transcript(transcript.to_string()));
        self.state.send_replace(VoiceModeState::Thinking);
        self.ui.emit(VoiceEvent::Status("Thinking...".to_string()));
        self.log.lock().await.append(Role::User, transcript);

        let reply = match self.chat.send_message(transcript).await {
            Ok(text) => text,
            Err(e) if e.is_transport() => {
                tracing::warn!(error = %e, "chat request failed, apologizing");
                self.apology.clone()
            }
            Err(e) => return Err(e),
        };

        self.log.lock().await.append(Role::Assistant, &reply);
        self.state.send_replace(VoiceModeState::Speaking);
        self.arbiter.speak(&reply).await
    }

    /// Waits out the re-listen delay; true when the loop may re-enter
    /// listening.
    async fn relisten(&self, generation: u64, active_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            () = tokio::time::sleep(self.relisten_delay) => self.is_current(generation),
            _ = active_rx.wait_for(|active| !*active) => false,
        }
    }

    /// Parks until the user retriggers listening; false on deactivation.
    async fn wait_for_retrigger(&self, active_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            () = self.retrigger.notified() => self.is_active(),
            _ = active_rx.wait_for(|active| !*active) => false,
        }
    }

    fn teardown(&self) {
        self.active.send_replace(false);
        self.arbiter.stop_speaking();
        self.arbiter.release_mic(LeaseHolder::VoiceMode);
        self.state.send_replace(VoiceModeState::Inactive);
        tracing::info!("voice mode deactivated");
    }
}
