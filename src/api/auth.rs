//! Bearer token resolution

use axum::http::HeaderMap;

use super::ApiState;
use crate::security::{AuthorizationContext, Principal};

/// Extract the bearer token from the Authorization header
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller; unknown or missing tokens are anonymous
pub fn principal(state: &ApiState, headers: &HeaderMap) -> Principal {
    let principal = state.tokens.resolve(extract_bearer(headers));
    if matches!(principal, Principal::Anonymous) && extract_bearer(headers).is_some() {
        tracing::debug!("unrecognized bearer token");
    }
    principal
}

/// Authorization context for `capability` on behalf of the caller
pub fn context_for(state: &ApiState, headers: &HeaderMap, capability: &str) -> AuthorizationContext {
    AuthorizationContext::for_mode(principal(state, headers), capability, state.auth_mode)
}

/// Copy the named headers, if present, for forwarding to a backend
pub fn forwarded_headers(headers: &HeaderMap, names: &[&str]) -> Vec<(String, String)> {
    names
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| ((*name).to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer kiosk-secret"));
        assert_eq!(extract_bearer(&headers), Some("kiosk-secret"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer(&headers), None);
    }

    #[test]
    fn test_forwarded_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-context-baton", HeaderValue::from_static("baton-1"));
        headers.insert("x-other", HeaderValue::from_static("dropped"));

        let forwarded = forwarded_headers(&headers, &["x-context-baton", "x-test-role"]);
        assert_eq!(forwarded, vec![("x-context-baton".to_string(), "baton-1".to_string())]);
    }
}
