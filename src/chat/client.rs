//! HTTP client for the chat backend

use serde::{Deserialize, Serialize};
use url::Url;

use super::stream::ResponseStream;
use crate::{Error, Result};

/// Request body shared by the streaming and single-shot endpoints
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

/// Response body of the single-shot endpoint
#[derive(Debug, Deserialize)]
struct ChatResponse {
    response: String,
}

/// Client for the chat backend's HTTP API
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ChatClient {
    /// Create a client for the given backend base URL
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid backend url: {e}")))?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid endpoint path {path}: {e}")))
    }

    /// Send a message to the streaming endpoint
    ///
    /// Returns a lazy delta stream; used by the typed-chat path so the
    /// response can render progressively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a non-success status, before any
    /// delta is yielded.
    pub async fn stream_message(&self, message: &str) -> Result<ResponseStream> {
        tracing::debug!(len = message.len(), "sending streaming chat request");

        let response = self
            .http
            .post(self.endpoint("/api/chat/stream")?)
            .json(&ChatRequest { message })
            .send()
            .await?;

        ResponseStream::from_response(response)
    }

    /// Send a message to the single-shot endpoint
    ///
    /// Lower-latency exchange used by the voice modes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a non-success status.
    pub async fn send_message(&self, message: &str) -> Result<String> {
        tracing::debug!(len = message.len(), "sending chat request");

        let response = self
            .http
            .post(self.endpoint("/api/chat")?)
            .json(&ChatRequest { message })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("chat returned status {status}")));
        }

        let body: ChatResponse = response.json().await?;
        Ok(body.response)
    }

    /// Clear server-side conversation state
    ///
    /// The caller is responsible for mirroring this by clearing the local
    /// log and history store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a non-success status.
    pub async fn reset(&self) -> Result<()> {
        let response = self.http.post(self.endpoint("/api/reset")?).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("reset returned status {status}")));
        }

        tracing::info!("server conversation reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_url() {
        assert!(ChatClient::new("not a url").is_err());
    }

    #[test]
    fn test_endpoint_join() {
        let client = ChatClient::new("http://localhost:5000").unwrap();
        let url = client.endpoint("/api/chat/stream").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/chat/stream");
    }
}
