//! Push-to-talk dictation
//!
//! One tap captures a single utterance, mirrors interim transcripts into
//! the input preview, then sends the final transcript through the
//! streaming chat path and speaks the response.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use crate::chat::{ChatClient, ConversationLog, Role};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::speech::{
    LeaseHolder, RecognitionEvent, RecognizerConfig, SpeechArbiter, SpeechRecognizer,
};

use super::{UiSink, VoiceDeps, VoiceEvent};

/// Where a dictation session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DictationState {
    #[default]
    Idle,
    Capturing,
}

/// Single-utterance capture-and-send session
pub struct DictationSession {
    arbiter: Arc<SpeechArbiter>,
    recognizer: Arc<dyn SpeechRecognizer>,
    chat: ChatClient,
    log: Arc<Mutex<ConversationLog>>,
    language: String,
    apology: String,
    ui: UiSink,
    state: watch::Sender<DictationState>,
    stop: watch::Sender<u64>,
}

impl DictationSession {
    #[must_use]
    pub fn new(deps: VoiceDeps, config: &Config, ui: UiSink) -> Self {
        Self {
            arbiter: deps.arbiter,
            recognizer: deps.recognizer,
            chat: deps.chat,
            log: deps.log,
            language: config.voice.language.clone(),
            apology: config.apology_text.clone(),
            ui,
            state: watch::Sender::new(DictationState::Idle),
            stop: watch::Sender::new(0),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> DictationState {
        *self.state.borrow()
    }

    /// Watch the session state
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<DictationState> {
        self.state.subscribe()
    }

    /// Ends an in-flight capture early (the push-to-talk release).
    ///
    /// The recognizer is asked to finish gracefully, so a pending final
    /// transcript is still flushed and sent. No-op while idle.
    pub fn stop_capture(&self) {
        self.stop.send_modify(|generation| *generation += 1);
    }

    /// Captures one utterance, sends it, and speaks the response.
    ///
    /// Returns the assistant's reply, or `None` when the microphone was
    /// busy, nothing was heard, or recognition failed (failures surface
    /// as a status event, not an error).
    ///
    /// # Errors
    ///
    /// Returns an error when the recognizer cannot start or a
    /// non-transport failure occurs while sending.
    pub async fn capture_and_send(&self) -> Result<Option<String>> {
        if !self.arbiter.acquire_mic(LeaseHolder::Dictation) {
            tracing::debug!("dictation blocked, microphone lease held elsewhere");
            self.ui
                .emit(VoiceEvent::StatusError("Microphone is busy".to_string()));
            return Ok(None);
        }
        // Subscribe before publishing Capturing: a stop issued by anyone
        // who has observed the state change is then never missed.
        let mut stop_rx = self.stop.subscribe();
        self.state.send_replace(DictationState::Capturing);

        let captured = self.capture_utterance(&mut stop_rx).await;

        self.arbiter.release_mic(LeaseHolder::Dictation);
        self.state.send_replace(DictationState::Idle);

        let transcript = match captured {
            Ok(Some(text)) => text,
            Ok(None) => {
                self.ui
                    .emit(VoiceEvent::Status("No speech detected".to_string()));
                return Ok(None);
            }
            Err(Error::Recognition(kind)) => {
                tracing::warn!(kind = %kind, "dictation recognition failed");
                self.ui
                    .emit(VoiceEvent::StatusError(format!("Speech error: {kind}")));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.ui.emit(VoiceEvent::Transcript(transcript.clone()));
        let reply = self.send_streaming(&transcript).await?;
        Ok(Some(reply))
    }

    /// Runs one single-shot capture, previewing interim transcripts.
    ///
    /// Ends on a final transcript, the recognizer's own end event, or an
    /// explicit [`stop_capture`](Self::stop_capture).
    async fn capture_utterance(
        &self,
        stop_rx: &mut watch::Receiver<u64>,
    ) -> Result<Option<String>> {
        let mut capture = self
            .recognizer
            .start(RecognizerConfig::single_shot(&self.language))?;
        self.ui
            .emit(VoiceEvent::Status("Listening...".to_string()));

        let mut final_text: Option<String> = None;
        loop {
            let event = tokio::select! {
                event = capture.next_event() => Some(event),
                _ = stop_rx.changed() => None,
            };
            let Some(event) = event else {
                // Graceful stop: the backend flushes any pending final
                // transcript and ends, so keep draining events.
                capture.stop();
                continue;
            };
            match event {
                Some(RecognitionEvent::Partial(text)) => {
                    self.ui.emit(VoiceEvent::InputPreview(text));
                }
                Some(RecognitionEvent::Final(text)) => {
                    final_text = Some(text);
                    capture.stop();
                }
                Some(RecognitionEvent::Ended) | None => break,
                Some(RecognitionEvent::Error(kind)) => return Err(Error::Recognition(kind)),
            }
        }
        Ok(final_text.filter(|t| !t.trim().is_empty()))
    }

    /// Streams the response, forwarding deltas, then speaks the full text.
    async fn send_streaming(&self, message: &str) -> Result<String> {
        self.log.lock().await.append(Role::User, message);

        let reply = match self.stream_reply(message).await {
            Ok(text) => text,
            Err(e) if e.is_transport() => {
                tracing::warn!(error = %e, "chat request failed, apologizing");
                self.apology.clone()
            }
            Err(e) => return Err(e),
        };

        self.log.lock().await.append(Role::Assistant, &reply);
        let _ = self.arbiter.speak(&reply).await?;
        Ok(reply)
    }

    async fn stream_reply(&self, message: &str) -> Result<String> {
        let mut stream = self.chat.stream_message(message).await?;
        while let Some(delta) = stream.next_delta().await? {
            if let Some(content) = delta.content {
                self.ui.emit(VoiceEvent::Delta(content));
            }
            if let Some(error) = delta.error {
                return Err(Error::Transport(error));
            }
        }
        Ok(stream.full_text().to_string())
    }
}
