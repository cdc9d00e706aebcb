//! Response handling module that converts handler results into HTTP responses.
//!
//! This module provides the [`Responder`] trait which defines how different types
//! can be converted into HTTP responses. It includes implementations for common types
//! like Result, Option, String, as well as [`Json`] and [`Redirect`].
//!
//! The [`Responder`] trait is how terminal handlers hand their result to the
//! [`Exchange`](crate::Exchange), which sends it as the response of the request.

use crate::RequestContext;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use tracing::error;

const TEXT_PLAIN_UTF_8: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");
const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// A trait for types that can be converted into HTTP responses.
///
/// Types implementing this trait can be returned directly from terminal handlers
/// and will be automatically converted into HTTP responses.
pub trait Responder {
    fn response_to(self, cx: &RequestContext) -> Response<Bytes>;
}

/// Serializes the wrapped value as the JSON body of a `200 OK` response.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

/// A redirect to another location, `302 Found` unless stated otherwise.
#[derive(Debug, Clone)]
pub struct Redirect {
    status: StatusCode,
    location: String,
}

impl Redirect {
    /// Redirects with `302 Found`
    pub fn to(location: impl Into<String>) -> Self {
        Self { status: StatusCode::FOUND, location: location.into() }
    }

    /// Redirects with `303 See Other`
    pub fn see_other(location: impl Into<String>) -> Self {
        Self { status: StatusCode::SEE_OTHER, location: location.into() }
    }

    /// Redirects with `301 Moved Permanently`
    pub fn permanent(location: impl Into<String>) -> Self {
        Self { status: StatusCode::MOVED_PERMANENTLY, location: location.into() }
    }
}

impl Responder for Redirect {
    fn response_to(self, _cx: &RequestContext) -> Response<Bytes> {
        match HeaderValue::try_from(self.location.as_str()) {
            Ok(location) => {
                let mut response = Response::new(Bytes::new());
                *response.status_mut() = self.status;
                response.headers_mut().insert(LOCATION, location);
                response
            }
            Err(e) => {
                error!(cause = %e, location = %self.location, "invalid redirect location");
                internal_error()
            }
        }
    }
}

impl<T: Serialize> Responder for Json<T> {
    fn response_to(self, _cx: &RequestContext) -> Response<Bytes> {
        match serde_json::to_vec(&self.0) {
            Ok(body) => {
                let mut response = Response::new(Bytes::from(body));
                response.headers_mut().insert(CONTENT_TYPE, APPLICATION_JSON);
                response
            }
            Err(e) => {
                error!(cause = %e, "serialize json response error");
                internal_error()
            }
        }
    }
}

/// Implementation for Result allows handlers to return Result types directly.
/// The Ok and Err variants must both implement Responder.
impl<T: Responder, E: Responder> Responder for Result<T, E> {
    fn response_to(self, cx: &RequestContext) -> Response<Bytes> {
        match self {
            Ok(t) => t.response_to(cx),
            Err(e) => e.response_to(cx),
        }
    }
}

/// None case returns an empty `404 Not Found`.
impl<T: Responder> Responder for Option<T> {
    fn response_to(self, cx: &RequestContext) -> Response<Bytes> {
        match self {
            Some(t) => t.response_to(cx),
            None => {
                let mut response = Response::new(Bytes::new());
                *response.status_mut() = StatusCode::NOT_FOUND;
                response
            }
        }
    }
}

/// Pre-built responses pass through, with the body converted to [`Bytes`].
impl<B> Responder for Response<B>
where
    B: Into<Bytes>,
{
    fn response_to(self, _cx: &RequestContext) -> Response<Bytes> {
        self.map(Into::into)
    }
}

/// Implementation for (StatusCode, T) tuple allows setting a status code
/// along with the response content.
impl<T: Responder> Responder for (StatusCode, T) {
    fn response_to(self, cx: &RequestContext) -> Response<Bytes> {
        let (status, responder) = self;
        let mut response = responder.response_to(cx);
        *response.status_mut() = status;
        response
    }
}

impl<T: Responder> Responder for (T, StatusCode) {
    fn response_to(self, cx: &RequestContext) -> Response<Bytes> {
        let (responder, status) = self;
        (status, responder).response_to(cx)
    }
}

impl<T: Responder> Responder for Box<T> {
    fn response_to(self, cx: &RequestContext) -> Response<Bytes> {
        (*self).response_to(cx)
    }
}

/// Implementation for unit type () returns an empty `200 OK`.
impl Responder for () {
    fn response_to(self, _cx: &RequestContext) -> Response<Bytes> {
        Response::new(Bytes::new())
    }
}

impl Responder for &'static str {
    fn response_to(self, _cx: &RequestContext) -> Response<Bytes> {
        plain_text(Bytes::from_static(self.as_bytes()))
    }
}

impl Responder for String {
    fn response_to(self, _cx: &RequestContext) -> Response<Bytes> {
        plain_text(Bytes::from(self))
    }
}

impl Responder for Infallible {
    fn response_to(self, _cx: &RequestContext) -> Response<Bytes> {
        match self {}
    }
}

fn plain_text(body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    response.headers_mut().insert(CONTENT_TYPE, TEXT_PLAIN_UTF_8);
    response
}

fn internal_error() -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
