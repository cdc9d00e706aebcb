//! The shared, append-only list of handlers a dispatcher runs.
//!
//! A [`HandlerList`] is a cheap handle: every clone points to the same list. Builders append
//! to it during the synchronous build phase by copy-on-write, request handling reads a
//! lock-free snapshot, so a list can be served while the last routes are still registered.
//! Layers are never reordered or removed; a [`Slot`] reserved with [`HandlerList::reserve`]
//! keeps its position and is skipped until it is filled.

use crate::context::{PathParams, RequestContext};
use crate::error::BoxError;
use crate::exchange::Exchange;
use crate::handler::{Flow, RequestHandler};
use crate::pattern::{MountPrefix, PrefixMatch, RoutePattern};
use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use http::Method;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct HandlerList {
    layers: Arc<ArcSwap<Vec<Layer>>>,
}

#[derive(Clone)]
pub enum Layer {
    /// runs for every request reaching it
    Handler(Arc<dyn RequestHandler>),
    Route(Arc<Route>),
    Mount(Arc<Mount>),
    /// a reserved slot, not filled yet
    Pending,
}

/// A handler sequence bound to one method and path pattern.
pub struct Route {
    method: Method,
    pattern: Arc<RoutePattern>,
    handlers: Vec<Arc<dyn RequestHandler>>,
}

/// A nested list, optionally scoped under a path prefix.
///
/// The nested list runs with the prefix stripped from the path and an empty lineage; both
/// are restored when it yields.
pub struct Mount {
    prefix: Option<MountPrefix>,
    handlers: HandlerList,
}

/// The position of a reserved layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

impl HandlerList {
    pub fn new() -> Self {
        Self { layers: Arc::new(ArcSwap::from_pointee(Vec::new())) }
    }

    /// Appends a layer and returns its position.
    pub fn push(&self, layer: Layer) -> usize {
        let previous = self.layers.rcu(|layers| {
            let mut layers = Vec::clone(layers);
            layers.push(layer.clone());
            layers
        });
        previous.len()
    }

    /// Appends a [`Layer::Pending`] placeholder to be filled later.
    pub fn reserve(&self) -> Slot {
        Slot(self.push(Layer::Pending))
    }

    /// Fills a reserved slot. A slot that is not pending is left untouched.
    pub fn fill(&self, slot: Slot, layer: Layer) {
        let mut filled = false;
        self.layers.rcu(|layers| {
            let mut layers = Vec::clone(layers);
            filled = matches!(layers.get(slot.0), Some(Layer::Pending));
            if filled {
                layers[slot.0] = layer.clone();
            }
            layers
        });
        if !filled {
            warn!(slot = slot.0, "ignore fill of a slot that is not pending");
        }
    }

    pub fn len(&self) -> usize {
        self.layers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.load().is_empty()
    }

    /// Number of reserved slots still waiting to be filled.
    pub fn pending(&self) -> usize {
        self.layers.load().iter().filter(|layer| matches!(layer, Layer::Pending)).count()
    }

    /// A snapshot of the current layers.
    pub fn snapshot(&self) -> Arc<Vec<Layer>> {
        self.layers.load_full()
    }

    /// true if both handles point to the same list
    pub fn ptr_eq(&self, other: &HandlerList) -> bool {
        Arc::ptr_eq(&self.layers, &other.layers)
    }

    /// true if `other` is this list or is mounted somewhere below it
    pub fn reaches(&self, other: &HandlerList) -> bool {
        self.ptr_eq(other)
            || self.layers.load().iter().any(|layer| match layer {
                Layer::Mount(mount) => mount.handlers.reaches(other),
                _ => false,
            })
    }

    /// Runs the layers in order until one halts or fails.
    ///
    /// Returns [`Flow::Next`] when nothing answered the request.
    pub fn run<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Result<Flow, BoxError>> {
        Box::pin(async move {
            let layers = self.layers.load_full();
            for layer in layers.iter() {
                let flow = match layer {
                    Layer::Pending => continue,
                    Layer::Handler(handler) => handler.invoke(exchange).await?,
                    Layer::Route(route) => route.run(exchange).await?,
                    Layer::Mount(mount) => mount.run(exchange).await?,
                };
                if flow == Flow::Halt || exchange.is_sent() {
                    return Ok(Flow::Halt);
                }
            }
            Ok(Flow::Next)
        })
    }
}

impl Default for HandlerList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.layers.load().iter()).finish()
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Handler(_) => f.write_str("Handler"),
            Layer::Route(route) => fmt::Debug::fmt(route, f),
            Layer::Mount(mount) => fmt::Debug::fmt(mount, f),
            Layer::Pending => f.write_str("Pending"),
        }
    }
}

impl Route {
    pub fn new(method: Method, pattern: impl Into<Arc<RoutePattern>>, handlers: Vec<Arc<dyn RequestHandler>>) -> Self {
        Self { method, pattern: pattern.into(), handlers }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// `GET` routes answer `HEAD` as well.
    fn accepts(&self, cx: &RequestContext) -> bool {
        let method = cx.method();
        self.method == method || (self.method == Method::GET && method == Method::HEAD)
    }

    async fn run(&self, exchange: &mut Exchange) -> Result<Flow, BoxError> {
        if !self.accepts(exchange.context()) {
            return Ok(Flow::Next);
        }
        let Some(params) = self.pattern.matches(exchange.context().path()) else {
            return Ok(Flow::Next);
        };

        let params = exchange.context().path_params().merged(params);
        let outer = exchange.context_mut().replace_path_params(params);
        let result = self.run_handlers(exchange).await;
        exchange.context_mut().replace_path_params(outer);
        result
    }

    async fn run_handlers(&self, exchange: &mut Exchange) -> Result<Flow, BoxError> {
        for handler in &self.handlers {
            if handler.invoke(exchange).await? == Flow::Halt || exchange.is_sent() {
                return Ok(Flow::Halt);
            }
        }
        Ok(Flow::Next)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Mount {
    /// Mounts `handlers` under `prefix`; `None` or `/` mounts inline.
    pub fn new(prefix: Option<MountPrefix>, handlers: HandlerList) -> Self {
        let prefix = prefix.filter(|prefix| !prefix.is_root());
        Self { prefix, handlers }
    }

    pub fn prefix(&self) -> Option<&MountPrefix> {
        self.prefix.as_ref()
    }

    pub fn handlers(&self) -> &HandlerList {
        &self.handlers
    }

    async fn run(&self, exchange: &mut Exchange) -> Result<Flow, BoxError> {
        let scope = match &self.prefix {
            None => {
                let path = exchange.context().path().to_string();
                exchange.enter("", path, PathParams::empty())
            }
            Some(prefix) => {
                let Some(PrefixMatch { matched, rest, params }) = prefix.strip(exchange.context().path()) else {
                    return Ok(Flow::Next);
                };
                let matched = matched.to_string();
                exchange.enter(&matched, rest, params)
            }
        };

        let result = self.handlers.run(exchange).await;
        exchange.leave(scope);
        result
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("prefix", &self.prefix.as_ref().map(MountPrefix::as_str))
            .field("handlers", &self.handlers)
            .finish()
    }
}
