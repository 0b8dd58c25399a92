//! Well-known request headers

use http::HeaderMap;
use http::header::{AUTHORIZATION, HeaderName};
use secrecy::SecretString;

/// Header carrying the logical conversation identifier
pub const CONVERSATION_ID: HeaderName = HeaderName::from_static("x-conversation-id");

/// Anthropic-style API key header
pub const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");

/// Longest conversation identifier accepted from clients
const MAX_CONVERSATION_ID_LEN: usize = 128;

/// Extract the caller's API key from `Authorization: Bearer` or `x-api-key`
pub fn api_key(headers: &HeaderMap) -> Option<SecretString> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    bearer
        .or_else(|| headers.get(X_API_KEY).and_then(|v| v.to_str().ok()).map(str::trim))
        .filter(|key| !key.is_empty())
        .map(|key| SecretString::from(key.to_owned()))
}

/// Extract a well-formed conversation identifier
///
/// Identifiers are limited to ASCII alphanumerics, `-`, `_`, `.` and `:`;
/// anything else is ignored so the request runs without shared state.
pub fn conversation_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONVERSATION_ID)?.to_str().ok()?.trim();

    let valid = !raw.is_empty()
        && raw.len() <= MAX_CONVERSATION_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));

    valid.then(|| raw.to_owned())
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn bearer_token_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(X_API_KEY, HeaderValue::from_static("xyz"));

        let key = api_key(&headers).unwrap();
        assert_eq!(key.expose_secret(), "abc");
    }

    #[test]
    fn x_api_key_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(X_API_KEY, HeaderValue::from_static("xyz"));

        let key = api_key(&headers).unwrap();
        assert_eq!(key.expose_secret(), "xyz");
    }

    #[test]
    fn empty_bearer_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(api_key(&headers).is_none());
    }

    #[test]
    fn conversation_id_rejects_odd_characters() {
        let mut headers = HeaderMap::new();
        headers.insert(CONVERSATION_ID, HeaderValue::from_static("../../etc"));
        assert!(conversation_id(&headers).is_none());

        headers.insert(CONVERSATION_ID, HeaderValue::from_static("user-7:session_1"));
        assert_eq!(conversation_id(&headers).as_deref(), Some("user-7:session_1"));
    }

    #[test]
    fn conversation_id_length_limit() {
        let mut headers = HeaderMap::new();
        let long = "a".repeat(MAX_CONVERSATION_ID_LEN + 1);
        headers.insert(CONVERSATION_ID, HeaderValue::from_str(&long).unwrap());
        assert!(conversation_id(&headers).is_none());
    }
}
