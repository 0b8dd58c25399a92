//! Axum route handlers for OpenAI-compatible and Anthropic-compatible endpoints

use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::Stream;
use serde_json::json;
use toolgate_core::{HttpError, RequestContext};

use crate::convert::openai::{ChunkHeader, delta_to_chunk, usage_to_chunk};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicErrorDetail, AnthropicErrorResponse, AnthropicRequest, AnthropicResponse};
use crate::protocol::openai::{
    OpenAiErrorDetail, OpenAiErrorResponse, OpenAiModel, OpenAiModelList, OpenAiRequest, OpenAiResponse, OpenAiTool,
};
use crate::protocol::tools::{ExecuteToolsRequest, ToolList};
use crate::state::LlmState;
use crate::stream::{anthropic_event_name, anthropic_events, response_events};
use crate::types::{CompletionRequest, CompletionResponse, StreamEvent, ToolCall};

/// Build the LLM router with all endpoints
pub fn llm_router(state: LlmState) -> Router {
    Router::new()
        // OpenAI-compatible endpoints
        .route("/v1/chat/completions", routing::post(openai_chat_completions))
        .route("/v1/models", routing::get(openai_list_models))
        // Anthropic-compatible endpoint
        .route("/v1/messages", routing::post(anthropic_messages))
        // Tool endpoints
        .route("/v1/tools", routing::get(list_tools))
        .route("/v1/tools/execute", routing::post(execute_tools))
        // Conversation management
        .route(
            "/v1/conversations/{id}",
            routing::get(get_conversation).delete(delete_conversation),
        )
        .with_state(state)
}

// -- OpenAI-compatible handlers --

/// Handle `POST /v1/chat/completions`
async fn openai_chat_completions(
    State(state): State<LlmState>,
    axum::Extension(context): axum::Extension<RequestContext>,
    Json(wire_request): Json<OpenAiRequest>,
) -> Response {
    let request = match CompletionRequest::try_from(wire_request) {
        Ok(request) => request,
        Err(e) => return error_to_openai_response(&e),
    };

    let stream = request.stream;
    match state.complete(request, &context).await {
        Ok(completion) if stream => openai_stream_response(&completion.response).into_response(),
        Ok(completion) => Json(OpenAiResponse::from(completion.response)).into_response(),
        Err(e) => error_to_openai_response(&e),
    }
}

/// Handle `GET /v1/models`
async fn openai_list_models(State(state): State<LlmState>) -> Response {
    let now = unix_now();

    let data = state
        .backends()
        .map(|backend| OpenAiModel {
            id: backend
                .default_model()
                .map_or_else(|| backend.name().to_owned(), |model| format!("{}/{model}", backend.name())),
            object: "model".to_owned(),
            created: now,
            owned_by: backend.kind().to_string(),
        })
        .collect();

    Json(OpenAiModelList {
        object: "list".to_owned(),
        data,
    })
    .into_response()
}

/// Build a streaming SSE response in `OpenAI` format
fn openai_stream_response(
    response: &CompletionResponse,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let header = ChunkHeader {
        id: response.id.clone(),
        created: response.created,
        model: response.model.clone(),
    };

    let events: Vec<_> = response_events(response)
        .into_iter()
        .map(|event| {
            let data = match event {
                StreamEvent::Delta(delta) => serde_json::to_string(&delta_to_chunk(&delta, &header)),
                StreamEvent::Usage(usage) => serde_json::to_string(&usage_to_chunk(usage, &header)),
                StreamEvent::Done => Ok("[DONE]".to_owned()),
            };
            Ok::<_, Infallible>(Event::default().data(data.unwrap_or_default()))
        })
        .collect();

    Sse::new(futures_util::stream::iter(events)).keep_alive(KeepAlive::default())
}

/// Convert an LLM error to an `OpenAI`-style JSON error response
fn error_to_openai_response(error: &LlmError) -> Response {
    log_error(error);

    let body = OpenAiErrorResponse {
        error: OpenAiErrorDetail {
            message: error.client_message(),
            error_type: error.error_type().to_owned(),
            param: matches!(error, LlmError::ValidationFailed(_)).then(|| "tools".to_owned()),
            code: None,
            details: error.details(),
        },
    };

    (error.status_code(), Json(body)).into_response()
}

// -- Anthropic-compatible handler --

/// Handle `POST /v1/messages`
async fn anthropic_messages(
    State(state): State<LlmState>,
    axum::Extension(context): axum::Extension<RequestContext>,
    Json(wire_request): Json<AnthropicRequest>,
) -> Response {
    let request = match CompletionRequest::try_from(wire_request) {
        Ok(request) => request,
        Err(e) => return error_to_anthropic_response(&e),
    };

    let stream = request.stream;
    match state.complete(request, &context).await {
        Ok(completion) if stream => anthropic_stream_response(&completion.response).into_response(),
        Ok(completion) => Json(AnthropicResponse::from(completion.response)).into_response(),
        Err(e) => error_to_anthropic_response(&e),
    }
}

/// Build a streaming SSE response in Anthropic format
fn anthropic_stream_response(
    response: &CompletionResponse,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let events: Vec<_> = anthropic_events(response)
        .into_iter()
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok::<_, Infallible>(Event::default().event(anthropic_event_name(&event)).data(data))
        })
        .collect();

    Sse::new(futures_util::stream::iter(events)).keep_alive(KeepAlive::default())
}

/// Convert an LLM error to an Anthropic-style JSON error response
fn error_to_anthropic_response(error: &LlmError) -> Response {
    log_error(error);

    let body = AnthropicErrorResponse {
        error_type: "error".to_owned(),
        error: AnthropicErrorDetail {
            error_type: error.error_type().to_owned(),
            message: error.client_message(),
            details: error.details(),
        },
    };

    (error.status_code(), Json(body)).into_response()
}

fn log_error(error: &LlmError) {
    if error.status_code().is_server_error() {
        tracing::error!(error = %error, "completion failed");
    } else {
        tracing::debug!(error = %error, "request rejected");
    }
}

// -- Tool handlers --

/// Handle `GET /v1/tools`
async fn list_tools(State(state): State<LlmState>) -> Json<ToolList> {
    let data = state
        .tools()
        .registry()
        .definitions()
        .iter()
        .map(OpenAiTool::from)
        .collect();

    Json(ToolList {
        object: "list".to_owned(),
        data,
    })
}

/// Handle `POST /v1/tools/execute`
async fn execute_tools(State(state): State<LlmState>, Json(request): Json<ExecuteToolsRequest>) -> Response {
    let calls: Vec<ToolCall> = request.tool_calls.into_iter().map(ToolCall::from).collect();
    let results = state.tools().execute_batch(&calls).await;

    Json(json!({ "object": "list", "data": results })).into_response()
}

// -- Conversation handlers --

/// Handle `GET /v1/conversations/{id}`
async fn get_conversation(State(state): State<LlmState>, Path(id): Path<String>) -> Response {
    let Some(conversation) = state.emulation().conversations().get(&id) else {
        return error_to_openai_response(&LlmError::ConversationNotFound { id });
    };

    let summary = conversation
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .summary();

    Json(json!({ "id": id, "object": "conversation", "summary": summary })).into_response()
}

/// Handle `DELETE /v1/conversations/{id}`
async fn delete_conversation(State(state): State<LlmState>, Path(id): Path<String>) -> Response {
    if state.emulation().conversations().remove(&id) {
        tracing::debug!(conversation_id = %id, "conversation cleared");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_to_openai_response(&LlmError::ConversationNotFound { id })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
