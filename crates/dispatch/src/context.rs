//! Request data shared by every handler of one dispatch.
//!
//! This module contains the read-only view handlers and steps get of an incoming request:
//! - `RequestContext`: method, uri, headers, collected body and the currently matched path params
//! - `PathParams`: named segments captured by a route pattern or a mount prefix

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri, Version};
use mime::Mime;
use std::sync::Arc;

/// Represents the context of an HTTP request, providing access to the request head,
/// the collected body and the path parameters matched so far.
///
/// Cloning is cheap: the head is reference counted and the body is a [`Bytes`] handle.
#[derive(Debug, Clone)]
pub struct RequestContext {
    head: Arc<Parts>,
    body: Bytes,
    path_params: PathParams,
    path: String,
    base_path: String,
}

impl RequestContext {
    /// Creates a new RequestContext from the request head and its collected body
    pub fn new(head: Parts, body: Bytes) -> Self {
        let path = head.uri.path().to_string();
        Self { head: Arc::new(head), body, path_params: PathParams::empty(), path, base_path: String::new() }
    }

    /// Creates a RequestContext from a complete in-memory request
    pub fn from_request(request: http::Request<Bytes>) -> Self {
        let (head, body) = request.into_parts();
        Self::new(head, body)
    }

    /// Replaces the path parameters, mostly useful when driving a step by hand
    #[must_use]
    pub fn with_path_params(mut self, path_params: PathParams) -> Self {
        self.path_params = path_params;
        self
    }

    /// Returns the HTTP method of the request
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Returns the URI of the request
    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// Returns the HTTP version of the request
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// Returns the HTTP headers of the request
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Returns the raw query string, if any
    pub fn query(&self) -> Option<&str> {
        self.head.uri.query()
    }

    /// Returns the parsed `content-type` header, if present and well formed
    pub fn content_type(&self) -> Option<Mime> {
        self.headers().get(http::header::CONTENT_TYPE)?.to_str().ok()?.parse().ok()
    }

    /// Returns the collected request body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the path parameters captured by the route or mount currently running
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Returns the path relative to the mount currently running
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the prefix stripped by the enclosing mounts, empty at the root
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub(crate) fn replace_path_params(&mut self, path_params: PathParams) -> PathParams {
        std::mem::replace(&mut self.path_params, path_params)
    }

    pub(crate) fn replace_path(&mut self, path: String, base_path: String) -> (String, String) {
        let path = std::mem::replace(&mut self.path, path);
        let base_path = std::mem::replace(&mut self.base_path, base_path);
        (path, base_path)
    }
}

/// Represents path parameters extracted from the URL path of an HTTP request.
///
/// Values are kept exactly as they appear in the matched path, in capture order.
/// For example, in the pattern "/users/:id", "id" is a path parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    inner: Vec<(String, String)>,
}

impl PathParams {
    /// Creates an empty PathParams instance with no parameters
    #[inline]
    pub fn empty() -> Self {
        Self { inner: Vec::new() }
    }

    /// Returns true if there are no path parameters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of path parameters
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Gets the value of a path parameter by its name
    /// Returns None if the parameter doesn't exist
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.inner.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    /// Iterates over `(name, value)` pairs in capture order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub(crate) fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns these params extended by `inner`; a name captured by both keeps the value
    /// from `inner`.
    pub(crate) fn merged(&self, inner: PathParams) -> PathParams {
        if self.is_empty() {
            return inner;
        }
        let mut merged: Vec<_> =
            self.inner.iter().filter(|(name, _)| inner.get(name).is_none()).cloned().collect();
        merged.extend(inner.inner);
        Self { inner: merged }
    }
}

impl<K, V> FromIterator<(K, V)> for PathParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { inner: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
