//! Whisker - orchestration core for a voice-enabled chat assistant
//!
//! This library provides the client-side plumbing for a streaming chat
//! assistant with speech input and output:
//! - Streaming response consumption (line-delimited `data:` records)
//! - A speech arbiter serializing microphone and synthesis access
//! - Session state machines: dictation, voice mode, wake word
//! - Conversation history and preference persistence (SQLite)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   Sessions                        │
//! │   Dictation  │  Voice Mode  │  Wake Word         │
//! └───────────┬──────────────────────┬───────────────┘
//!             │                      │
//! ┌───────────▼──────────┐  ┌────────▼───────────────┐
//! │    Speech Arbiter     │  │      Chat Client       │
//! │  mic lease │ speech   │  │  streaming │ one-shot  │
//! └───────────┬──────────┘  └────────┬───────────────┘
//!             │                      │
//! ┌───────────▼──────────┐  ┌────────▼───────────────┐
//! │  Recognizer / Synth   │  │       Backend          │
//! │  (pluggable traits)   │  │  /api/chat[/stream]    │
//! └──────────────────────┘  └────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod speech;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
