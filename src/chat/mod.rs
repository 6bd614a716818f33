//! Chat backend client: streaming consumer, single-shot requests, and the
//! conversation log

mod client;
mod log;
mod stream;

pub use client::ChatClient;
pub use log::{ConversationLog, ConversationTurn, Role};
pub use stream::{DeltaParser, ResponseStream, StreamDelta};
