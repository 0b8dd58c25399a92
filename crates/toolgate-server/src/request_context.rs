use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use toolgate_core::RequestContext;

/// Middleware that constructs a `RequestContext` from the incoming request
///
/// Reads the forwarded API key and the `x-conversation-id` header so
/// handlers never touch raw headers.
pub async fn request_context_middleware(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let context = RequestContext::from_parts(parts.clone());
    if let Some(id) = &context.conversation_id {
        tracing::Span::current().record("conversation_id", id.as_str());
    }

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);

    next.run(request).await
}
