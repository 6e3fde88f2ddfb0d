//! Bearer-token gate in front of the MCP HTTP routes.
//!
//! When no token is configured every request passes. Otherwise the request
//! must carry `Authorization: Bearer <token>` with the exact configured value.

extern crate alloc;

use alloc::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::config::Secret;

/// Scheme prefix expected in the `Authorization` header.
const BEARER_PREFIX: &str = "Bearer ";

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthRejection {
    /// No header, or not a bearer credential.
    MissingHeader,
    /// Bearer credential that does not match.
    InvalidToken,
}

impl AuthRejection {
    /// Message returned in the JSON error body.
    const fn message(self) -> &'static str {
        match self {
            Self::MissingHeader => {
                "Missing or invalid Authorization header. Expected: Bearer <token>"
            }
            Self::InvalidToken => "Invalid authentication token",
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Bearer")],
            Json(json!({ "error": self.message() })),
        )
            .into_response()
    }
}

/// Shared-secret bearer authentication.
#[derive(Debug, Clone, Default)]
pub(crate) struct BearerAuth {
    /// Expected token; `None` disables the check.
    token: Option<Arc<Secret>>,
}

/// Compares two byte strings without short-circuiting on the first mismatch.
fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    lhs.iter()
        .zip(rhs)
        .fold(0_u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

impl BearerAuth {
    /// Creates the gate; `None` lets everything through.
    pub(crate) fn new(token: Option<Secret>) -> Self {
        Self {
            token: token.map(Arc::new),
        }
    }

    /// Whether a token is required.
    pub(crate) const fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Checks the value of an `Authorization` header.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason when a token is configured and the header
    /// does not carry it.
    pub(crate) fn check(&self, header: Option<&HeaderValue>) -> Result<(), AuthRejection> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };
        let provided = header
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .ok_or(AuthRejection::MissingHeader)?;
        if constant_time_eq(provided.as_bytes(), expected.expose().as_bytes()) {
            Ok(())
        } else {
            Err(AuthRejection::InvalidToken)
        }
    }
}

/// Axum middleware enforcing [`BearerAuth`].
pub(crate) async fn require_bearer(
    State(auth): State<BearerAuth>,
    request: Request,
    next: Next,
) -> Response {
    match auth.check(request.headers().get(AUTHORIZATION)) {
        Ok(()) => next.run(request).await,
        Err(rejection) => {
            tracing::warn!(
                method = %request.method(),
                path = request.uri().path(),
                reason = rejection.message(),
                "rejected unauthenticated request"
            );
            rejection.into_response()
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "test code uses expect for readability"
)]
mod tests {
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
    use axum::http::{HeaderValue, Request, StatusCode};
    use axum::middleware;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::{AuthRejection, BearerAuth, constant_time_eq, require_bearer};
    use crate::config::Secret;

    fn gate(token: Option<&str>) -> BearerAuth {
        BearerAuth::new(token.map(|t| Secret::new(t.to_owned())))
    }

    fn app(auth: BearerAuth) -> Router {
        Router::new()
            .route("/sse", get(|| async { "stream" }))
            .layer(middleware::from_fn_with_state(auth, require_bearer))
    }

    async fn status_for(auth: BearerAuth, header: Option<&str>) -> StatusCode {
        let mut builder = Request::builder().uri("/sse");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        let request = builder.body(Body::empty()).expect("request");
        app(auth).oneshot(request).await.expect("response").status()
    }

    #[test]
    fn byte_comparison() {
        assert!(constant_time_eq(b"secret123", b"secret123"));
        assert!(!constant_time_eq(b"secret123", b"secret124"));
        assert!(!constant_time_eq(b"secret", b"secret123"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn check_without_token_accepts_anything() {
        let auth = gate(None);
        assert!(!auth.is_enabled());
        assert_eq!(auth.check(None), Ok(()));
        let junk = HeaderValue::from_static("Basic Zm9vOmJhcg==");
        assert_eq!(auth.check(Some(&junk)), Ok(()));
    }

    #[test]
    fn check_distinguishes_missing_and_wrong() {
        let auth = gate(Some("secret123"));
        assert!(auth.is_enabled());
        assert_eq!(auth.check(None), Err(AuthRejection::MissingHeader));
        let basic = HeaderValue::from_static("Basic secret123");
        assert_eq!(auth.check(Some(&basic)), Err(AuthRejection::MissingHeader));
        let lowercase = HeaderValue::from_static("bearer secret123");
        assert_eq!(auth.check(Some(&lowercase)), Err(AuthRejection::MissingHeader));
        let wrong = HeaderValue::from_static("Bearer wrong");
        assert_eq!(auth.check(Some(&wrong)), Err(AuthRejection::InvalidToken));
        let right = HeaderValue::from_static("Bearer secret123");
        assert_eq!(auth.check(Some(&right)), Ok(()));
    }

    #[tokio::test]
    async fn configured_token_scenario() {
        assert_eq!(
            status_for(gate(Some("secret123")), Some("Bearer secret123")).await,
            StatusCode::OK
        );
        assert_eq!(
            status_for(gate(Some("secret123")), Some("Bearer wrong")).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(gate(Some("secret123")), None).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn unset_token_scenario() {
        assert_eq!(status_for(gate(None), None).await, StatusCode::OK);
        assert_eq!(
            status_for(gate(None), Some("Bearer anything")).await,
            StatusCode::OK
        );
        assert_eq!(status_for(gate(None), Some("garbage")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn rejection_carries_challenge_and_json_body() {
        let request = Request::builder()
            .uri("/sse")
            .header(AUTHORIZATION, "Bearer wrong")
            .body(Body::empty())
            .expect("request");
        let response = app(gate(Some("secret123")))
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).map(HeaderValue::as_bytes),
            Some(b"Bearer".as_slice())
        );
        let body = to_bytes(response.into_body(), 1024).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(
            json.get("error").and_then(serde_json::Value::as_str),
            Some("Invalid authentication token")
        );
    }
}
