//! Request-scoped identity extraction (§4.15). This is deliberately not an auth layer:
//! the `X-User-Id` header (or an unverified bearer token's subject) is trusted as-is.
//! Ownership and tier checks still run downstream, but nothing here verifies a signature.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

const ANONYMOUS_USER_ID: &str = "anonymous";

#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Option<String>,
}

impl UserContext {
    /// The caller's id, or the anonymous placeholder for endpoints that accept `user_id?`.
    pub fn user_id_or_anonymous(&self) -> String {
        self.user_id.clone().unwrap_or_else(|| ANONYMOUS_USER_ID.to_string())
    }
}

impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(header) = parts.headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
            let trimmed = header.trim();
            if !trimmed.is_empty() {
                return Ok(Self { user_id: Some(trimmed.to_string()) });
            }
        }

        if let Some(auth) = parts.headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok())
            && let Some(token) = auth.strip_prefix("Bearer ")
            && let Some(subject) = bearer_subject(token)
        {
            return Ok(Self { user_id: Some(subject) });
        }

        Ok(Self { user_id: None })
    }
}

/// Pulls the `sub` claim out of a JWT-shaped token without verifying its signature.
/// Any base64url-decodable middle segment containing a `sub` field is accepted as-is.
fn bearer_subject(token: &str) -> Option<String> {
    use base64::Engine;

    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    value.get("sub").and_then(|v| v.as_str()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_fallback_is_stable() {
        let ctx = UserContext { user_id: None };
        assert_eq!(ctx.user_id_or_anonymous(), "anonymous");
    }

    #[test]
    fn decodes_unsigned_bearer_subject() {
        use base64::Engine;
        let encode = |b: &[u8]| base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b);
        let header = encode(br#"{"alg":"none"}"#);
        let payload = encode(br#"{"sub":"user-123"}"#);
        let token = format!("{header}.{payload}.");
        assert_eq!(bearer_subject(&token), Some("user-123".to_string()));
    }
}
