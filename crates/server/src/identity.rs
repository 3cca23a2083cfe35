//! Request identity: uploader extraction and trace context.

use crate::error::ApiError;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the uploader identity when no authentication layer sets one.
pub const UPLOADER_HEADER: &str = "x-uploader-id";

/// Maximum length for trace IDs.
const MAX_TRACE_ID_LEN: usize = 128;

/// Identity of the caller that owns newly created files.
///
/// An authentication layer in front of depot may insert this as a request
/// extension. Otherwise it is read from `X-Uploader-Id`, and defaults to 0
/// (anonymous).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Uploader(pub i64);

impl Uploader {
    pub const ANONYMOUS: Uploader = Uploader(0);

    pub fn id(&self) -> i64 {
        self.0
    }
}

impl<S> FromRequestParts<S> for Uploader
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(uploader) = parts.extensions.get::<Uploader>() {
            return Ok(*uploader);
        }

        match parts.headers.get(UPLOADER_HEADER) {
            None => Ok(Uploader::ANONYMOUS),
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<i64>().ok())
                .map(Uploader)
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("invalid {UPLOADER_HEADER} header"))
                }),
        }
    }
}

/// Trace ID for request correlation.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random trace ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create a trace ID from a client-provided value.
    ///
    /// Truncated to 128 characters with non-printable characters removed.
    pub fn from_client(value: &str) -> Self {
        let sanitized: String = value
            .chars()
            .take(MAX_TRACE_ID_LEN)
            .filter(|c| c.is_ascii_graphic())
            .collect();

        if sanitized.is_empty() {
            Self::new()
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach a trace ID to the request and run it inside a span carrying it.
pub async fn trace_context_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = req
        .headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(TraceId::from_client)
        .unwrap_or_default();
    let span = tracing::info_span!("request", trace_id = %trace_id.as_str());
    req.extensions_mut().insert(trace_id);

    next.run(req).instrument(span).await
}
