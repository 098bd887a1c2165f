//! Origin check for the websocket endpoint

use crate::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

/// Proof that the request comes from the configured origin or host
#[derive(Debug, Clone, Copy)]
pub struct AllowedOrigin;

/// Origin rejection response
pub struct OriginError {
    pub origin: Option<String>,
}

impl IntoResponse for OriginError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": format!(
                "Origin {} is not allowed",
                self.origin.as_deref().unwrap_or("<none>")
            ),
            "code": "forbidden_origin"
        }));
        (StatusCode::FORBIDDEN, body).into_response()
    }
}

/// True when `Origin` matches `allowed_origin` or `Host` matches `allowed_host`
pub fn is_allowed(headers: &HeaderMap, allowed_origin: &str, allowed_host: &str) -> bool {
    let header_is = |name: header::HeaderName, expected: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(|value| value == expected)
            .unwrap_or(false)
    };

    header_is(header::ORIGIN, allowed_origin) || header_is(header::HOST, allowed_host)
}

#[async_trait]
impl FromRequestParts<AppState> for AllowedOrigin {
    type Rejection = OriginError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if is_allowed(
            &parts.headers,
            &state.config.allowed_origin,
            &state.config.allowed_host,
        ) {
            return Ok(AllowedOrigin);
        }

        let origin = parts
            .headers
            .get(header::ORIGIN)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        warn!("Rejected connection from origin {:?}", origin);
        Err(OriginError { origin })
    }
}
