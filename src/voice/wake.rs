//! Wake-word activation
//!
//! Keeps a continuous background capture running, scanning final
//! transcripts for the wake phrase. On a match the background capture is
//! stopped before the acknowledgement is spoken (so the assistant never
//! hears itself), a single command is captured and dispatched, and the
//! loop returns to waiting. Background capture restarts are debounced;
//! a permission denial disables the session permanently.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};

use crate::chat::{ChatClient, ConversationLog, Role};
use crate::config::Config;
use crate::error::Result;
use crate::speech::{
    Capture, LeaseHolder, RecognitionErrorKind, RecognitionEvent, RecognizerConfig, SpeechArbiter,
    SpeechOutcome, SpeechRecognizer,
};

use super::{UiSink, VoiceDeps, VoiceEvent, contains_exit_phrase};

/// Matches a wake phrase (and its common misrecognitions) in transcripts
#[derive(Debug, Clone)]
pub struct WakePhraseMatcher {
    phrases: Vec<String>,
}

impl WakePhraseMatcher {
    /// Builds a matcher for a primary phrase plus accepted variants.
    ///
    /// Phrases are normalized to lowercase; empty entries are dropped.
    #[must_use]
    pub fn new(phrase: &str, variants: &[String]) -> Self {
        let phrases: Vec<String> = std::iter::once(phrase)
            .chain(variants.iter().map(String::as_str))
            .map(|p| p.to_lowercase().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        tracing::debug!(phrases = ?phrases, "wake phrase matcher initialized");
        Self { phrases }
    }

    /// Whether the transcript contains any accepted wake phrase.
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        let lower = transcript.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p))
    }

    /// The accepted phrases, normalized
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

/// Where the wake-word loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakeState {
    #[default]
    Disabled,
    /// Background capture running, scanning for the wake phrase
    Waiting,
    /// Wake phrase heard, speaking the acknowledgement
    Activating,
    /// Capturing the follow-up command
    CommandListening,
    /// Command sent, waiting for the response
    Dispatching,
    /// Speaking the response
    Speaking,
}

/// What the background scan pass decided
enum ScanOutcome {
    Activated,
    Restart,
    RestartSlow,
    PermissionLost,
    Disabled,
}

/// Always-on wake-word session
pub struct WakeWordSession {
    arbiter: Arc<SpeechArbiter>,
    recognizer: Arc<dyn SpeechRecognizer>,
    chat: ChatClient,
    log: Arc<Mutex<ConversationLog>>,
    ui: UiSink,
    matcher: WakePhraseMatcher,
    language: String,
    exit_phrases: Vec<String>,
    ack_text: String,
    farewell: String,
    apology: String,
    restart_debounce: Duration,
    error_restart_delay: Duration,
    state: watch::Sender<WakeState>,
    enabled: watch::Sender<bool>,
    generation: AtomicU64,
}

impl WakeWordSession {
    #[must_use]
    pub fn new(deps: VoiceDeps, config: &Config, ui: UiSink) -> Self {
        Self {
            arbiter: deps.arbiter,
            recognizer: deps.recognizer,
            chat: deps.chat,
            log: deps.log,
            ui,
            matcher: WakePhraseMatcher::new(&config.wake.phrase, &config.wake.variants),
            language: config.voice.language.clone(),
            exit_phrases: config.exit_phrases.clone(),
            ack_text: config.wake.ack_text.clone(),
            farewell: config.wake.farewell_text.clone(),
            apology: config.apology_text.clone(),
            restart_debounce: config.timing.restart_debounce,
            error_restart_delay: config.timing.error_restart_delay,
            state: watch::Sender::new(WakeState::Disabled),
            enabled: watch::Sender::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> WakeState {
        *self.state.borrow()
    }

    /// Watch the session state
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<WakeState> {
        self.state.subscribe()
    }

    /// Whether the session is currently enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.enabled.borrow()
    }

    /// Disables the session: silences speech, invalidates pending restart
    /// timers, and lets `run` tear down.
    pub fn disable(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.enabled.send_replace(false);
        self.arbiter.stop_speaking();
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation && *self.enabled.borrow()
    }

    /// Runs the wake-word loop until an exit phrase, a permission
    /// denial, or [`disable`](Self::disable).
    ///
    /// Enabling displaces whichever session held the microphone.
    ///
    /// # Errors
    ///
    /// Returns an error when the recognizer cannot start or a
    /// non-transport chat failure occurs.
    pub async fn run(&self) -> Result<()> {
        if self.is_enabled() {
            tracing::warn!("wake word already enabled, ignoring run");
            return Ok(());
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(displaced) = self.arbiter.preempt_mic(LeaseHolder::WakeWord) {
            tracing::info!(displaced = %displaced, "wake word displaced microphone holder");
        }
        self.enabled.send_replace(true);
        tracing::info!(phrases = ?self.matcher.phrases(), "wake word enabled");

        let result = self.wake_loop(generation).await;
        self.teardown();
        result
    }

    async fn wake_loop(&self, generation: u64) -> Result<()> {
        let mut enabled_rx = self.enabled.subscribe();

        while self.is_current(generation) {
            self.state.send_replace(WakeState::Waiting);
            self.ui.emit(VoiceEvent::Status(format!(
                "Say \"{}\" to wake me up",
                self.matcher
                    .phrases()
                    .first()
                    .map_or("", String::as_str)
            )));

            let outcome = self.scan_for_wake(&mut enabled_rx).await?;
            if !self.is_current(generation) {
                break;
            }

            match outcome {
                ScanOutcome::Activated => {
                    if self.handle_activation(generation, &mut enabled_rx).await? {
                        break;
                    }
                }
                ScanOutcome::Restart => {
                    // Recognizers end idle captures on their own schedule;
                    // debounce so a flapping backend cannot spin the loop.
                    tokio::time::sleep(self.restart_debounce).await;
                }
                ScanOutcome::RestartSlow => {
                    tokio::time::sleep(self.error_restart_delay).await;
                }
                ScanOutcome::PermissionLost => {
                    tracing::warn!("microphone permission denied, disabling wake word");
                    self.ui.emit(VoiceEvent::StatusError(
                        "Microphone permission denied".to_string(),
                    ));
                    break;
                }
                ScanOutcome::Disabled => break,
            }
        }
        Ok(())
    }

    /// Starts the background capture and scans it for the wake phrase.
    ///
    /// On activation the capture is stopped and drained before this
    /// returns, so the acknowledgement is never transcribed back in.
    async fn scan_for_wake(
        &self,
        enabled_rx: &mut watch::Receiver<bool>,
    ) -> Result<ScanOutcome> {
        let capture = self
            .recognizer
            .start(RecognizerConfig::continuous(&self.language))?;
        Ok(self.scan_events(capture, enabled_rx).await)
    }

    async fn scan_events(
        &self,
        mut capture: Capture,
        enabled_rx: &mut watch::Receiver<bool>,
    ) -> ScanOutcome {
        loop {
            let event = tokio::select! {
                event = capture.next_event() => event,
                _ = enabled_rx.wait_for(|enabled| !*enabled) => None,
            };
            if !self.is_enabled() {
                capture.abort();
                return ScanOutcome::Disabled;
            }
            match event {
                Some(RecognitionEvent::Partial(text)) => {
                    // Interim transcripts are too jittery to activate on;
                    // finals only.
                    if self.matcher.matches(&text) {
                        tracing::trace!(text = %text, "wake phrase in interim transcript");
                    }
                }
                Some(RecognitionEvent::Final(text)) => {
                    if self.matcher.matches(&text) {
                        tracing::info!(text = %text, "wake phrase detected");
                        // Stop before acknowledging so the ack is not
                        // transcribed back into the scan.
                        capture.stop();
                        while capture.next_event().await.is_some() {}
                        return ScanOutcome::Activated;
                    }
                }
                Some(RecognitionEvent::Error(kind)) => {
                    return match kind {
                        RecognitionErrorKind::PermissionDenied => ScanOutcome::PermissionLost,
                        RecognitionErrorKind::NoSpeech | RecognitionErrorKind::Aborted => {
                            ScanOutcome::Restart
                        }
                        RecognitionErrorKind::Other(message) => {
                            tracing::warn!(message = %message, "wake scan error");
                            ScanOutcome::RestartSlow
                        }
                    };
                }
                Some(RecognitionEvent::Ended) | None => return ScanOutcome::Restart,
            }
        }
    }

    /// Speaks the ack, captures one command, and dispatches it.
    ///
    /// Returns true when the session should shut down (exit phrase).
    async fn handle_activation(
        &self,
        generation: u64,
        enabled_rx: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        self.state.send_replace(WakeState::Activating);
        if self.arbiter.speak(&self.ack_text).await? != SpeechOutcome::Completed {
            // Something displaced the ack; skip the command capture and
            // fall back to waiting.
            return Ok(false);
        }
        if !self.is_current(generation) {
            return Ok(false);
        }

        self.state.send_replace(WakeState::CommandListening);
        self.ui
            .emit(VoiceEvent::Status("Listening for your command...".to_string()));
        let command = self.capture_command(enabled_rx).await?;
        if !self.is_current(generation) {
            return Ok(false);
        }

        let Some(command) = command else {
            self.ui
                .emit(VoiceEvent::Status("No command heard".to_string()));
            return Ok(false);
        };

        if contains_exit_phrase(&self.exit_phrases, &command) {
            tracing::info!(command = %command, "exit phrase heard, shutting down wake word");
            self.ui.emit(VoiceEvent::Transcript(command));
            self.state.send_replace(WakeState::Speaking);
            let _ = self.arbiter.speak(&self.farewell).await?;
            return Ok(true);
        }

        self.dispatch_command(&command).await?;
        Ok(false)
    }

    /// One single-shot capture for the post-wake command.
    ///
    /// Final transcripts accumulate until the capture ends, matching how
    /// a user pauses mid-command.
    async fn capture_command(
        &self,
        enabled_rx: &mut watch::Receiver<bool>,
    ) -> Result<Option<String>> {
        let mut capture = self
            .recognizer
            .start(RecognizerConfig::single_shot(&self.language))?;

        let mut command = String::new();
        loop {
            let event = tokio::select! {
                event = capture.next_event() => event,
                _ = enabled_rx.wait_for(|enabled| !*enabled) => None,
            };
            if !self.is_enabled() {
                capture.abort();
                return Ok(None);
            }
            match event {
                Some(RecognitionEvent::Partial(text)) => {
                    self.ui.emit(VoiceEvent::InputPreview(text));
                }
                Some(RecognitionEvent::Final(text)) => {
                    if !command.is_empty() {
                        command.push(' ');
                    }
                    command.push_str(text.trim());
                }
                Some(RecognitionEvent::Error(kind)) => {
                    if kind == RecognitionErrorKind::PermissionDenied {
                        self.disable();
                    } else {
                        tracing::debug!(kind = %kind, "command capture error");
                    }
                    return Ok(None);
                }
                Some(RecognitionEvent::Ended) | None => break,
            }
        }
        Ok((!command.trim().is_empty()).then(|| command.trim().to_string()))
    }

    /// Sends the command and speaks the reply (or the apology on a
    /// transport failure).
    async fn dispatch_command(&self, command: &str) -> Result<()> {
        self.ui.emit(VoiceEvent::Transcript(command.to_string()));
        self.state.send_replace(WakeState::Dispatching);
        self.log.lock().await.append(Role::User, command);

        let reply = match self.chat.send_message(command).await {
            Ok(text) => text,
            Err(e) if e.is_transport() => {
                tracing::warn!(error = %e, "chat request failed, apologizing");
                self.apology.clone()
            }
            Err(e) => return Err(e),
        };

        self.log.lock().await.append(Role::Assistant, &reply);
        self.state.send_replace(WakeState::Speaking);
        let _ = self.arbiter.speak(&reply).await?;
        Ok(())
    }

    fn teardown(&self) {
        self.enabled.send_replace(false);
        self.arbiter.stop_speaking();
        self.arbiter.release_mic(LeaseHolder::WakeWord);
        self.state.send_replace(WakeState::Disabled);
        tracing::info!("wake word disabled");
    }
}
