use secrecy::SecretString;

/// Runtime context for a single gateway request
///
/// Built by the server middleware and passed by parameter into the
/// emulation pipeline. Nothing in here outlives the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions)
    pub parts: http::request::Parts,
    /// Caller-provided API key, forwarded to backends that allow it
    pub api_key: Option<SecretString>,
    /// Logical conversation this request belongs to
    pub conversation_id: Option<String>,
}

impl RequestContext {
    /// Create a minimal context for non-HTTP use
    ///
    /// Contains empty headers, no API key and no conversation
    pub fn empty() -> Self {
        let (parts, ()) = http::Request::new(()).into_parts();

        Self {
            parts,
            api_key: None,
            conversation_id: None,
        }
    }

    /// Build a context from request parts, reading the well-known headers
    pub fn from_parts(parts: http::request::Parts) -> Self {
        let api_key = crate::headers::api_key(&parts.headers);
        let conversation_id = crate::headers::conversation_id(&parts.headers);

        Self {
            parts,
            api_key,
            conversation_id,
        }
    }

    /// Access request headers
    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_has_no_identity() {
        let ctx = RequestContext::empty();
        assert!(ctx.api_key.is_none());
        assert!(ctx.conversation_id.is_none());
        assert!(ctx.headers().is_empty());
    }

    #[test]
    fn from_parts_reads_conversation_header() {
        let (parts, ()) = http::Request::builder()
            .header("x-conversation-id", "thread-42")
            .header("authorization", "Bearer sk-test")
            .body(())
            .unwrap()
            .into_parts();

        let ctx = RequestContext::from_parts(parts);
        assert_eq!(ctx.conversation_id.as_deref(), Some("thread-42"));
        assert!(ctx.api_key.is_some());
    }
}
