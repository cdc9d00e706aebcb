use micro_dispatch::{
    error_envelope, BoxError, DefaultErrorHandler, ErrorHandler, PatternError, RequestContext, Responder,
};
use bytes::Bytes;
use http::{Response, StatusCode};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Build-time failures of the chain builders.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{builder} has already been consumed")]
    UseAfterConsume { builder: &'static str },

    #[error(transparent)]
    InvalidPath(#[from] PatternError),

    #[error("mounting this delegate would make the handler list contain itself")]
    CyclicMount,

    #[error("leaf {path} starts from a narrowed request and cannot be mounted on its own")]
    NarrowedLeaf { path: String },

    /// Raised at request time when the lineage value is not of the type a step expects.
    #[error("request lineage is not a {expected}")]
    LineageMismatch { expected: &'static str },
}

/// The part of a request a narrowing step reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facet {
    Params,
    Query,
    Body,
}

impl Facet {
    pub fn as_str(self) -> &'static str {
        match self {
            Facet::Params => "params",
            Facet::Query => "query",
            Facet::Body => "body",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request facet rejected by a schema.
#[derive(Debug, Error)]
#[error("invalid {facet}: {message}")]
pub struct ValidationError {
    facet: Facet,
    message: String,
    value: serde_json::Value,
}

impl ValidationError {
    pub fn new(facet: Facet, message: impl Into<String>, value: serde_json::Value) -> Self {
        Self { facet, message: message.into(), value }
    }

    pub fn facet(&self) -> Facet {
        self.facet
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// the offending value, as it was read from the request
    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }
}

/// Answers [`ValidationError`]s with `400 Bad Request` and leaves every other failure to
/// [`DefaultErrorHandler`].
///
/// The body of a validation failure looks like
/// `{"error": "invalid params: ...", "facet": "params", "value": {...}}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChainErrorHandler;

impl ErrorHandler for ChainErrorHandler {
    fn on_error(&self, error: &BoxError, cx: &RequestContext) -> Response<Bytes> {
        let Some(e) = error.downcast_ref::<ValidationError>() else {
            return DefaultErrorHandler.on_error(error, cx);
        };

        let (status, mut body) = error_envelope(StatusCode::BAD_REQUEST, e.to_string());
        if let Some(envelope) = body.0.as_object_mut() {
            envelope.insert("facet".into(), e.facet.as_str().into());
            envelope.insert("value".into(), e.value.clone());
        }
        (status, body).response_to(cx)
    }
}
