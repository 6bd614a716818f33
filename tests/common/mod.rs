//! Shared test utilities

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use whisker::db::{self, DbPool};

/// Set up an in-memory test database
#[must_use]
#[allow(dead_code)]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

#[derive(Clone)]
struct BackendState {
    reply: String,
    received: Arc<Mutex<Vec<String>>>,
    resets: Arc<Mutex<usize>>,
}

/// A fake chat backend speaking the streaming wire format
pub struct TestBackend {
    pub url: String,
    received: Arc<Mutex<Vec<String>>>,
    resets: Arc<Mutex<usize>>,
}

impl TestBackend {
    /// Spawns a backend that answers every message with `reply`,
    /// streamed as multiple `data:` records.
    pub async fn spawn(reply: &str) -> Self {
        let state = BackendState {
            reply: reply.to_string(),
            received: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(Mutex::new(0)),
        };
        let received = state.received.clone();
        let resets = state.resets.clone();

        let app = Router::new()
            .route("/api/chat/stream", post(chat_stream))
            .route("/api/chat", post(chat))
            .route("/api/reset", post(reset))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test backend");
        let addr = listener.local_addr().expect("no local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test backend died");
        });

        Self {
            url: format!("http://{addr}"),
            received,
            resets,
        }
    }

    /// Spawns a backend that answers every request with a 500.
    pub async fn spawn_failing() -> Self {
        let app = Router::new()
            .route("/api/chat/stream", post(fail))
            .route("/api/chat", post(fail))
            .route("/api/reset", post(fail));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test backend");
        let addr = listener.local_addr().expect("no local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test backend died");
        });

        Self {
            url: format!("http://{addr}"),
            received: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(Mutex::new(0)),
        }
    }

    /// Messages the backend has received, in order
    #[must_use]
    pub fn received(&self) -> Vec<String> {
        self.received.lock().expect("lock poisoned").clone()
    }

    /// Number of reset requests served
    #[must_use]
    #[allow(dead_code)]
    pub fn resets(&self) -> usize {
        *self.resets.lock().expect("lock poisoned")
    }
}

async fn chat_stream(
    State(state): State<BackendState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record_message(&state, &body);

    // Stream the reply split across two records so clients must
    // reassemble, plus a chunk boundary inside a record.
    let reply = state.reply.clone();
    let mid = reply.len() / 2;
    let first = json!({ "content": &reply[..mid] }).to_string();
    let second = json!({ "content": &reply[mid..] }).to_string();
    let wire = format!("data: {first}\ndata: {second}\n");
    let split = wire.len() / 2;
    let chunks: Vec<Result<Vec<u8>, Infallible>> = vec![
        Ok(wire.as_bytes()[..split].to_vec()),
        Ok(wire.as_bytes()[split..].to_vec()),
    ];

    Body::from_stream(futures::stream::iter(chunks))
}

async fn chat(State(state): State<BackendState>, Json(body): Json<Value>) -> impl IntoResponse {
    record_message(&state, &body);
    Json(json!({ "response": state.reply }))
}

async fn reset(State(state): State<BackendState>) -> StatusCode {
    *state.resets.lock().expect("lock poisoned") += 1;
    StatusCode::OK
}

async fn fail() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

fn record_message(state: &BackendState, body: &Value) {
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        state
            .received
            .lock()
            .expect("lock poisoned")
            .push(message.to_string());
    }
}
