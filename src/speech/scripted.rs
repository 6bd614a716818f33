//! Scripted speech backend
//!
//! Deterministic recognizer/synthesizer implementations driven by an event
//! script instead of audio hardware. Used by the session integration tests
//! and useful to embedders for driving the voice state machines headless.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::recognizer::{
    Capture, CaptureControl, RecognitionEvent, RecognizerConfig, SpeechRecognizer,
};
use super::synthesizer::{SpeechSynthesizer, UtteranceEnd};
use crate::error::RecognitionErrorKind;
use crate::Result;

/// One step of a scripted capture
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Pause before the next event
    Wait(Duration),
    /// Emit an interim transcript
    Partial(String),
    /// Emit a final transcript
    Final(String),
    /// Emit a recognizer end event
    Ended,
    /// Emit a recognizer error
    Error(RecognitionErrorKind),
}

impl ScriptStep {
    /// Shorthand for a partial transcript step
    #[must_use]
    pub fn partial(text: &str) -> Self {
        Self::Partial(text.to_string())
    }

    /// Shorthand for a final transcript step
    #[must_use]
    pub fn done(text: &str) -> Self {
        Self::Final(text.to_string())
    }
}

/// Recognizer that replays pre-loaded scripts, one per `start` call
///
/// An exhausted script (or a `start` with no script queued) ends the
/// capture with [`RecognitionEvent::Ended`], mirroring a recognizer that
/// timed out without hearing anything.
#[derive(Default)]
pub struct ScriptedRecognizer {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    starts: AtomicUsize,
}

impl ScriptedRecognizer {
    /// Create a recognizer with no scripts queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a script for the next unconsumed `start` call
    pub fn push_script(&self, script: Vec<ScriptStep>) {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(script);
    }

    /// How many captures have been started
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl SpeechRecognizer for ScriptedRecognizer {
    fn start(&self, config: RecognizerConfig) -> Result<Capture> {
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or_default();
        self.starts.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(steps = script.len(), continuous = config.continuous, "scripted capture started");

        let (event_tx, event_rx) = mpsc::channel(16);
        let (control_tx, control_rx) = mpsc::channel(4);

        tokio::spawn(run_script(script, event_tx, control_rx));

        Ok(Capture::new(event_rx, control_tx))
    }
}

async fn run_script(
    script: Vec<ScriptStep>,
    events: mpsc::Sender<RecognitionEvent>,
    mut control: mpsc::Receiver<CaptureControl>,
) {
    let explicit_terminal = matches!(
        script.last(),
        Some(ScriptStep::Ended | ScriptStep::Error(_))
    );

    for step in script {
        match control.try_recv() {
            Ok(CaptureControl::Stop) => {
                let _ = events.send(RecognitionEvent::Ended).await;
                return;
            }
            Ok(CaptureControl::Abort) => return,
            Err(_) => {}
        }

        let event = match step {
            ScriptStep::Wait(delay) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => continue,
                    ctrl = control.recv() => {
                        if matches!(ctrl, Some(CaptureControl::Stop)) {
                            let _ = events.send(RecognitionEvent::Ended).await;
                        }
                        return;
                    }
                }
            }
            ScriptStep::Partial(text) => RecognitionEvent::Partial(text),
            ScriptStep::Final(text) => RecognitionEvent::Final(text),
            ScriptStep::Ended => RecognitionEvent::Ended,
            ScriptStep::Error(kind) => RecognitionEvent::Error(kind),
        };

        if events.send(event).await.is_err() {
            return;
        }
    }

    if !explicit_terminal {
        let _ = events.send(RecognitionEvent::Ended).await;
    }
}

/// Synthesizer that "speaks" by sleeping for a fixed latency per utterance
pub struct ScriptedSynthesizer {
    latency: Duration,
    cancel: watch::Sender<u64>,
    spoken: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    /// Create a synthesizer whose utterances take `latency` to complete
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        let (cancel, _) = watch::channel(0);
        Self {
            latency,
            cancel,
            spoken: Mutex::new(Vec::new()),
        }
    }

    /// Every utterance text passed to `speak`, in order
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn speak(&self, text: &str, _voice_hint: Option<&str>) -> Result<UtteranceEnd> {
        self.spoken
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(text.to_string());

        let mut cancelled = self.cancel.subscribe();
        tokio::select! {
            () = tokio::time::sleep(self.latency) => Ok(UtteranceEnd::Completed),
            _ = cancelled.changed() => Ok(UtteranceEnd::Cancelled),
        }
    }

    fn cancel(&self) {
        self.cancel.send_modify(|generation| *generation += 1);
    }
}
