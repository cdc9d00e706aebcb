//! The narrowed request value threaded through one chain.
//!
//! A [`Request`] starts out knowing nothing (`Request<(), (), ()>`). Each narrowing step
//! replaces one facet with a validated value and, with it, one type parameter, so the
//! compiler tracks which facets a terminal function may rely on.

use http::Extensions;

/// A request whose path params, query and body have been narrowed to `P`, `Q` and `B`.
///
/// Values attached by custom steps live in [`extensions`](Self::extensions).
#[derive(Debug, Clone, Default)]
pub struct Request<P = (), Q = (), B = ()> {
    params: P,
    query: Q,
    body: B,
    extensions: Extensions,
}

impl Request {
    /// The un-narrowed request every chain starts with.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P, Q, B> Request<P, Q, B> {
    pub fn params(&self) -> &P {
        &self.params
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn into_parts(self) -> (P, Q, B) {
        (self.params, self.query, self.body)
    }

    pub fn with_params<T>(self, params: T) -> Request<T, Q, B> {
        Request { params, query: self.query, body: self.body, extensions: self.extensions }
    }

    pub fn with_query<T>(self, query: T) -> Request<P, T, B> {
        Request { params: self.params, query, body: self.body, extensions: self.extensions }
    }

    pub fn with_body<T>(self, body: T) -> Request<P, Q, T> {
        Request { params: self.params, query: self.query, body, extensions: self.extensions }
    }
}
