//! Speech synthesis capability boundary

use async_trait::async_trait;

use crate::Result;

/// How an utterance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceEnd {
    /// Speech ran to natural completion
    Completed,
    /// Speech was cut off by `cancel`
    Cancelled,
}

/// An opaque speech synthesizer
///
/// `speak` resolves when the utterance finishes or is cancelled; it must be
/// cancel-safe, since the arbiter may drop the future on pre-emption.
/// `cancel` is idempotent and safe to call when nothing is speaking.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak the given text, resolving when speech ends
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails before speech starts
    async fn speak(&self, text: &str, voice_hint: Option<&str>) -> Result<UtteranceEnd>;

    /// Cut off any utterance in progress
    fn cancel(&self);
}
