//! The per-request object handed to every handler.
//!
//! An [`Exchange`] owns the [`RequestContext`], the response once one is sent, and the
//! *lineage*: the single typed value a chain of narrowing steps threads through one request.
//! The dispatcher stores the lineage type-erased; the builders that compile steps into
//! handlers are responsible for putting in and taking out the types they expect.

use crate::context::{PathParams, RequestContext};
use crate::error::DispatchError;
use crate::responder::Responder;
use bytes::Bytes;
use http::Response;
use std::any::Any;
use std::fmt;

/// A type-erased lineage value.
pub type Lineage = Box<dyn Any + Send + Sync>;

pub struct Exchange {
    context: RequestContext,
    lineage: Option<Lineage>,
    response: Option<Response<Bytes>>,
}

/// What a mount changed on entry, restored when it is left.
pub(crate) struct Scope {
    path: String,
    base_path: String,
    path_params: PathParams,
    lineage: Option<Lineage>,
}

impl Exchange {
    pub fn new(context: RequestContext) -> Self {
        Self { context, lineage: None, response: None }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub(crate) fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.context
    }

    /// Sends the response of this request. Only the first call succeeds.
    pub fn send(&mut self, responder: impl Responder) -> Result<(), DispatchError> {
        if self.response.is_some() {
            return Err(DispatchError::AlreadySent);
        }
        self.response = Some(responder.response_to(&self.context));
        Ok(())
    }

    pub fn is_sent(&self) -> bool {
        self.response.is_some()
    }

    pub fn take_response(&mut self) -> Option<Response<Bytes>> {
        self.response.take()
    }

    /// Takes the current lineage value out, leaving the slot empty.
    pub fn take_lineage(&mut self) -> Option<Lineage> {
        self.lineage.take()
    }

    pub fn set_lineage(&mut self, lineage: Lineage) {
        self.lineage = Some(lineage);
    }

    /// Enters a mount: the path becomes `rest`, `matched` joins the base path, the mount's
    /// params extend the current ones and the lineage starts empty.
    pub(crate) fn enter(&mut self, matched: &str, rest: String, path_params: PathParams) -> Scope {
        let base_path = format!("{}{}", self.context.base_path(), matched);
        let (path, base_path) = self.context.replace_path(rest, base_path);
        let path_params = self.context.path_params().merged(path_params);
        let path_params = self.context.replace_path_params(path_params);
        Scope { path, base_path, path_params, lineage: self.lineage.take() }
    }

    pub(crate) fn leave(&mut self, scope: Scope) {
        self.context.replace_path(scope.path, scope.base_path);
        self.context.replace_path_params(scope.path_params);
        self.lineage = scope.lineage;
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("context", &self.context)
            .field("has_lineage", &self.lineage.is_some())
            .field("response", &self.response)
            .finish()
    }
}
