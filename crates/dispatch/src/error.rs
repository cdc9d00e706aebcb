use crate::context::RequestContext;
use crate::responder::{Json, Responder};
use bytes::Bytes;
use http::{Response, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// The single failure type flowing through a handler chain.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("response has already been sent")]
    AlreadySent,

    #[error("failed to read request body: {source}")]
    Body { source: BoxError },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("handler chain finished without sending a response")]
    NoResponse,
}

impl DispatchError {
    pub fn body<E: Into<BoxError>>(e: E) -> Self {
        Self::Body { source: e.into() }
    }
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("path must start with '/': {path}")]
    MissingLeadingSlash { path: String },

    #[error("empty parameter name in path: {path}")]
    EmptyParam { path: String },

    #[error("invalid route '{path}': {source}")]
    InvalidRoute {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// The error channel of a dispatcher.
///
/// Every failure raised by a handler, a step or the dispatcher itself ends up here exactly
/// once, and the returned response is sent unless something was already sent for the request.
pub trait ErrorHandler: Send + Sync {
    fn on_error(&self, error: &BoxError, cx: &RequestContext) -> Response<Bytes>;
}

/// Maps dispatcher failures to their statuses and everything else to 500.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn on_error(&self, error: &BoxError, cx: &RequestContext) -> Response<Bytes> {
        let status = match error.downcast_ref::<DispatchError>() {
            Some(DispatchError::Body { .. }) => StatusCode::BAD_REQUEST,
            Some(DispatchError::Timeout(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_envelope(status, status.canonical_reason().unwrap_or("error")).response_to(cx)
    }
}

/// The JSON body used for error responses: `{"error": <message>}`.
pub fn error_envelope(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": message.into() })))
}
