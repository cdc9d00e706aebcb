//! Validation of request facets.
//!
//! A [`Schema`] turns the raw content of one facet into a typed value or rejects it with a
//! [`ValidationError`]. Raw content comes as a [`Source`], which knows how the facet is
//! encoded:
//!
//! - path params and the query string are decoded with [`serde_qs`], so string values
//!   coerce into numbers and booleans and nested keys like `filter[tag]=rust` work
//! - bodies sent as `application/x-www-form-urlencoded` are decoded with [`serde_urlencoded`]
//! - every other body is decoded as JSON with [`serde_json`]

use crate::error::{Facet, ValidationError};
use micro_dispatch::RequestContext;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

/// Validates one request facet into `Output`.
pub trait Schema: Send + Sync {
    type Output;

    fn validate(&self, source: Source<'_>) -> Result<Self::Output, ValidationError>;
}

impl<F, T> Schema for F
where
    F: Fn(Source<'_>) -> Result<T, ValidationError> + Send + Sync,
{
    type Output = T;

    fn validate(&self, source: Source<'_>) -> Result<T, ValidationError> {
        (self)(source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `a=1&b[c]=2`, as read by `serde_qs`
    Query,
    /// `a=1&b=2`, as read by `serde_urlencoded`
    Form,
    Json,
}

/// The raw content of one request facet.
#[derive(Debug, Clone)]
pub struct Source<'a> {
    facet: Facet,
    encoding: Encoding,
    raw: Cow<'a, [u8]>,
}

impl<'a> Source<'a> {
    pub fn new(facet: Facet, encoding: Encoding, raw: impl Into<Cow<'a, [u8]>>) -> Self {
        Self { facet, encoding, raw: raw.into() }
    }

    /// The path params matched by the current route, encoded as a query string.
    pub fn params(cx: &RequestContext) -> Source<'static> {
        let pairs = cx.path_params().iter().collect::<Vec<_>>();
        // pairs of strings always encode
        let raw = serde_urlencoded::to_string(pairs).unwrap_or_default();
        Source::new(Facet::Params, Encoding::Query, raw.into_bytes())
    }

    pub fn query(cx: &'a RequestContext) -> Self {
        Source::new(Facet::Query, Encoding::Query, cx.query().unwrap_or_default().as_bytes())
    }

    pub fn body(cx: &'a RequestContext) -> Self {
        let encoding = match cx.content_type() {
            Some(mime) if mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str() => Encoding::Form,
            _ => Encoding::Json,
        };
        Source::new(Facet::Body, encoding, cx.body().as_ref())
    }

    pub fn facet(&self) -> Facet {
        self.facet
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Deserializes the raw content into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ValidationError> {
        let decoded = match self.encoding {
            Encoding::Query => serde_qs::from_bytes::<T>(&self.raw).map_err(|e| e.to_string()),
            Encoding::Form => serde_urlencoded::from_bytes::<T>(&self.raw).map_err(|e| e.to_string()),
            Encoding::Json => serde_json::from_slice::<T>(&self.raw).map_err(|e| e.to_string()),
        };
        decoded.map_err(|message| self.reject(message))
    }

    /// Renders the raw content for error reports: an object of strings for url encoded
    /// content, the parsed document for JSON, or the text itself when it does not parse.
    pub fn value(&self) -> serde_json::Value {
        match self.encoding {
            Encoding::Query | Encoding::Form => {
                match serde_urlencoded::from_bytes::<Vec<(String, String)>>(&self.raw) {
                    Ok(pairs) => pairs.into_iter().map(|(k, v)| (k, serde_json::Value::String(v))).collect(),
                    Err(_) => self.text(),
                }
            }
            Encoding::Json => serde_json::from_slice(&self.raw).unwrap_or_else(|_| self.text()),
        }
    }

    /// A [`ValidationError`] for this facet carrying the rendered raw content.
    pub fn reject(&self, message: impl Into<String>) -> ValidationError {
        ValidationError::new(self.facet, message, self.value())
    }

    fn text(&self) -> serde_json::Value {
        serde_json::Value::String(String::from_utf8_lossy(&self.raw).into_owned())
    }
}

type Refinement<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A schema for any deserializable type, see [`typed`].
pub struct Typed<T> {
    refinements: Vec<(String, Refinement<T>)>,
    _type: PhantomData<fn() -> T>,
}

/// A schema that deserializes the facet into `T`.
///
/// ```
/// use micro_chain::typed;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Page {
///     page: u32,
/// }
///
/// let schema = typed::<Page>().refine("page starts at 1", |p| p.page >= 1);
/// # let _ = schema;
/// ```
pub fn typed<T: DeserializeOwned>() -> Typed<T> {
    Typed { refinements: Vec::new(), _type: PhantomData }
}

impl<T> Typed<T> {
    /// Adds a check run after decoding; a value failing it is rejected with `message`.
    #[must_use]
    pub fn refine(mut self, message: impl Into<String>, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.refinements.push((message.into(), Box::new(predicate)));
        self
    }
}

impl<T: DeserializeOwned> Schema for Typed<T> {
    type Output = T;

    fn validate(&self, source: Source<'_>) -> Result<T, ValidationError> {
        let value = source.decode::<T>()?;
        for (message, predicate) in &self.refinements {
            if !predicate(&value) {
                return Err(source.reject(message.as_str()));
            }
        }
        Ok(value)
    }
}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Typed")
            .field("type", &std::any::type_name::<T>())
            .field("refinements", &self.refinements.len())
            .finish()
    }
}
