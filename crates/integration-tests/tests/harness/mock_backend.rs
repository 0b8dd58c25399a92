//! Mock text-only backend for integration tests
//!
//! Serves the legacy completions endpoint and a chat completions endpoint
//! that never returns structured tool calls. Replies are scripted; the last
//! one repeats once the script runs out.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Mock backend returning scripted text
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Value>>,
    fail: bool,
}

impl MockBackend {
    /// Start a backend that answers every request with `reply`
    pub async fn start(reply: &str) -> anyhow::Result<Self> {
        Self::start_scripted(&[reply]).await
    }

    /// Start a backend that answers with `replies` in order
    pub async fn start_scripted(replies: &[&str]) -> anyhow::Result<Self> {
        Self::start_inner(replies, false).await
    }

    /// Start a backend that fails every request with 500
    pub async fn start_failing() -> anyhow::Result<Self> {
        Self::start_inner(&[], true).await
    }

    async fn start_inner(replies: &[&str], fail: bool) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_owned()).collect()),
            requests: Mutex::new(Vec::new()),
            fail,
        });

        let app = Router::new()
            .route("/v1/completions", routing::post(handle_completions))
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as a backend
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Request bodies received so far
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockState {
    fn next_reply(&self, request: Value) -> Option<String> {
        self.requests.lock().unwrap().push(request);

        if self.fail {
            return None;
        }

        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            Some(replies.front().cloned().unwrap_or_default())
        }
    }
}

async fn handle_completions(State(state): State<Arc<MockState>>, Json(request): Json<Value>) -> Response {
    let Some(text) = state.next_reply(request) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "mock failure").into_response();
    };

    Json(json!({
        "id": "cmpl-mock",
        "object": "text_completion",
        "choices": [{ "text": text, "index": 0, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30 }
    }))
    .into_response()
}

async fn handle_chat_completions(State(state): State<Arc<MockState>>, Json(request): Json<Value>) -> Response {
    let Some(text) = state.next_reply(request) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "mock failure").into_response();
    };

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 0,
        "model": "mock-model",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 20, "completion_tokens": 10, "total_tokens": 30 }
    }))
    .into_response()
}
