//! Caller credential check.
//!
//! Requests must carry a key and a secret in two headers.  With no
//! credentials configured the check is a pass-through and authentication is
//! left to whatever proxy fronts the service.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::AuthConfig;

pub async fn require_credentials(
    State(auth): State<Arc<AuthConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let (Some(key), Some(secret)) = (&auth.key, &auth.secret) else {
        return next.run(request).await;
    };

    let headers = request.headers();
    // Evaluate both so timing does not reveal which one was wrong.
    let key_ok = header_matches(headers, &auth.key_header, key);
    let secret_ok = header_matches(headers, &auth.secret_header, secret);
    if key_ok & secret_ok {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "rejected request with missing or invalid credentials");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "missing or invalid credentials" })),
    )
        .into_response()
}

fn header_matches(headers: &HeaderMap, name: &str, expected: &str) -> bool {
    headers
        .get(name)
        .is_some_and(|v| constant_time_eq(v.as_bytes(), expected.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
