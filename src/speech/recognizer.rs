//! Speech recognition capability boundary
//!
//! The core never touches audio; it sequences an opaque recognizer through
//! this trait. A capture emits partial and final transcripts followed by a
//! terminal `Ended` or `Error` event, and can be stopped or aborted early.

use tokio::sync::mpsc;

use crate::{Result, error::RecognitionErrorKind};

/// Configuration for one capture
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// Keep recognizing across utterances instead of stopping after one
    pub continuous: bool,

    /// Emit partial (interim) transcripts
    pub interim_results: bool,

    /// Language tag (e.g. "en-US")
    pub language: String,
}

impl RecognizerConfig {
    /// Single-utterance capture with partials, the foreground default
    #[must_use]
    pub fn single_shot(language: &str) -> Self {
        Self {
            continuous: false,
            interim_results: true,
            language: language.to_string(),
        }
    }

    /// Continuous background capture, used while waiting for the wake word
    #[must_use]
    pub fn continuous(language: &str) -> Self {
        Self {
            continuous: true,
            interim_results: true,
            language: language.to_string(),
        }
    }
}

/// One event from an in-flight capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Interim transcript, superseded by the next event
    Partial(String),
    /// Final transcript; terminates a single-shot capture
    Final(String),
    /// The recognizer stopped on its own (timeout, `stop()`, end of input)
    Ended,
    /// The recognizer failed
    Error(RecognitionErrorKind),
}

/// Control messages sent back to a capture backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureControl {
    /// Finish gracefully: flush a pending final transcript, then end
    Stop,
    /// Tear down immediately, discarding pending results
    Abort,
}

/// Handle to an in-flight capture
///
/// Dropping the handle abandons the capture; buffered events are discarded
/// with it, which is what makes "stop background recognition before
/// activating" race-free.
pub struct Capture {
    events: mpsc::Receiver<RecognitionEvent>,
    control: mpsc::Sender<CaptureControl>,
}

impl Capture {
    /// Create a capture from its two channel halves (used by backends)
    #[must_use]
    pub const fn new(
        events: mpsc::Receiver<RecognitionEvent>,
        control: mpsc::Sender<CaptureControl>,
    ) -> Self {
        Self { events, control }
    }

    /// Next recognition event; `None` once the backend has gone away
    pub async fn next_event(&mut self) -> Option<RecognitionEvent> {
        self.events.recv().await
    }

    /// Ask the backend to finish gracefully
    ///
    /// The backend responds with a final `Ended` event (flushing any
    /// pending final transcript first) and then closes the event channel.
    pub fn stop(&self) {
        let _ = self.control.try_send(CaptureControl::Stop);
    }

    /// Tear the capture down immediately
    pub fn abort(&self) {
        let _ = self.control.try_send(CaptureControl::Abort);
    }
}

/// An opaque speech recognizer
///
/// `start` may be called repeatedly; each call is an independent capture.
/// The recognizer itself does not arbitrate the microphone — that is
/// [`SpeechArbiter`](crate::speech::SpeechArbiter)'s job.
pub trait SpeechRecognizer: Send + Sync {
    /// Begin a capture
    ///
    /// Backend contract: after [`Capture::stop`] or [`Capture::abort`],
    /// the backend must finish promptly and drop its event sender, so
    /// `next_event` returns `None` in bounded time. Callers rely on this
    /// to drain a stopped capture to completion.
    ///
    /// # Errors
    ///
    /// Returns error if the capture cannot be started
    fn start(&self, config: RecognizerConfig) -> Result<Capture>;
}
