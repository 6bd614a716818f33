//! Speech capability boundary and resource arbitration
//!
//! Recognition and synthesis are opaque: the traits here are the only
//! surface the voice sessions see. [`SpeechArbiter`] owns the microphone
//! lease and the single-active-utterance invariant.

mod arbiter;
pub mod cleanup;
mod recognizer;
pub mod scripted;
mod synthesizer;

pub use crate::error::RecognitionErrorKind;

pub use arbiter::{LeaseHolder, SpeechArbiter, SpeechOutcome};
pub use recognizer::{
    Capture, CaptureControl, RecognitionEvent, RecognizerConfig, SpeechRecognizer,
};
pub use synthesizer::{SpeechSynthesizer, UtteranceEnd};
