use crate::consumable::Consumable;
use crate::error::ChainError;
use crate::request::Request;
use crate::step::{take_lineage, Step, StepHandler};
use async_trait::async_trait;
use micro_dispatch::{
    BoxError, Exchange, Flow, HandlerList, Json, Layer, RequestContext, RequestHandler, Responder, Route, RoutePattern,
    Slot,
};
use http::Method;
use serde::Serialize;
use std::any::{type_name, TypeId};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// The builder of one endpoint: a method, a path pattern and the steps narrowing its request.
///
/// A leaf reserves its position in the handler list of the router that spawned it when it is
/// created, and writes its route there once it is terminated with [`returns`](Self::returns)
/// or [`finish`](Self::finish). Until then the position is skipped.
///
/// Every leaf also owns a list holding nothing but its own route; that list is what gets
/// mounted when the leaf is used as a [`Delegate`](crate::Delegate).
pub struct LeafRouter<Req = Request> {
    consumable: Consumable,
    method: Method,
    pattern: Arc<RoutePattern>,
    steps: Vec<Arc<dyn RequestHandler>>,
    targets: Arc<Targets>,
    _req: PhantomData<fn() -> Req>,
}

/// Where a leaf writes its route.
struct Targets {
    parent: Option<(HandlerList, Slot)>,
    own: HandlerList,
    own_slot: Slot,
    /// true if the first step takes an un-narrowed [`Request`]
    starts_plain: bool,
}

impl LeafRouter<Request> {
    /// A standalone endpoint writing into a list of its own, meant to be mounted into a
    /// [`Router`](crate::Router).
    pub fn new(method: Method, path: &str) -> Result<Self, ChainError> {
        let pattern = RoutePattern::parse(path)?;
        Ok(Self::with_parent(method, Arc::new(pattern), None))
    }
}

impl<Req> LeafRouter<Req>
where
    Req: Send + Sync + 'static,
{
    pub(crate) fn spawn(method: Method, pattern: Arc<RoutePattern>, handlers: HandlerList) -> Self {
        let slot = handlers.reserve();
        Self::with_parent(method, pattern, Some((handlers, slot)))
    }

    fn with_parent(method: Method, pattern: Arc<RoutePattern>, parent: Option<(HandlerList, Slot)>) -> Self {
        let own = HandlerList::new();
        let own_slot = own.reserve();
        let starts_plain = TypeId::of::<Req>() == TypeId::of::<Request>();
        let targets = Targets { parent, own, own_slot, starts_plain };
        Self::from_parts(method, pattern, Vec::new(), Arc::new(targets))
    }

    fn from_parts(
        method: Method,
        pattern: Arc<RoutePattern>,
        steps: Vec<Arc<dyn RequestHandler>>,
        targets: Arc<Targets>,
    ) -> Self {
        Self { consumable: Consumable::new("LeafRouter"), method, pattern, steps, targets, _req: PhantomData }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }

    /// The list holding only this endpoint's route.
    ///
    /// A mounted leaf starts from an un-narrowed [`Request`], so a leaf spawned behind
    /// narrowing router steps cannot be mounted on its own.
    pub(crate) fn handlers(&self) -> Result<HandlerList, ChainError> {
        self.consumable.check_usable()?;
        if !self.targets.starts_plain {
            return Err(ChainError::NarrowedLeaf { path: self.pattern.as_str().to_string() });
        }
        Ok(self.targets.own.clone())
    }

    /// Appends a step; the returned leaf carries the step's output type.
    pub fn then<S>(&self, step: S) -> Result<LeafRouter<S::Output>, ChainError>
    where
        S: Step<Req> + 'static,
    {
        self.consumable.consume()?;
        let mut steps = self.steps.clone();
        steps.push(Arc::new(StepHandler::<S, Req>::new(step)));
        Ok(LeafRouter::from_parts(self.method.clone(), Arc::clone(&self.pattern), steps, Arc::clone(&self.targets)))
    }

    /// Terminates the endpoint with `f`, whose `Ok` value is sent as a JSON `200 OK`.
    ///
    /// An `Err` from `f`, like a failing step, goes to the error handler and nothing is sent.
    pub fn returns<F, Fut, T, E>(&self, f: F) -> Result<(), ChainError>
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + 'static,
        E: Into<BoxError> + 'static,
    {
        self.consumable.consume()?;
        self.register(Arc::new(Returns { f, _req: PhantomData }));
        Ok(())
    }

    /// Terminates the endpoint with a [`Terminal`] that answers the request itself.
    pub fn finish<T>(&self, terminal: T) -> Result<(), ChainError>
    where
        T: Terminal<Req> + 'static,
    {
        self.consumable.consume()?;
        self.register(Arc::new(TerminalHandler { terminal, _req: PhantomData }));
        Ok(())
    }

    fn register(&self, terminal: Arc<dyn RequestHandler>) {
        let mut handlers = self.steps.clone();
        handlers.push(terminal);
        debug!(method = %self.method, path = self.pattern.as_str(), steps = self.steps.len(), "register route");
        let route = Arc::new(Route::new(self.method.clone(), Arc::clone(&self.pattern), handlers));
        if let Some((parent, slot)) = &self.targets.parent {
            parent.fill(*slot, Layer::Route(Arc::clone(&route)));
        }
        self.targets.own.fill(self.targets.own_slot, Layer::Route(route));
    }
}

impl<Req> Drop for LeafRouter<Req> {
    fn drop(&mut self) {
        if !self.consumable.is_consumed() {
            warn!(method = %self.method, path = self.pattern.as_str(), "leaf router dropped without a terminal");
        }
    }
}

impl<Req> fmt::Debug for LeafRouter<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafRouter")
            .field("method", &self.method)
            .field("path", &self.pattern.as_str())
            .field("request", &type_name::<Req>())
            .field("steps", &self.steps.len())
            .field("consumed", &self.consumable.is_consumed())
            .finish_non_exhaustive()
    }
}

/// The last link of an endpoint, fully responsible for the response.
///
/// A failure it does not answer itself is returned as `Err` and goes to the error handler.
#[async_trait]
pub trait Terminal<In>: Send + Sync
where
    In: Send + 'static,
{
    async fn respond(&self, request: In, exchange: &mut Exchange) -> Result<(), BoxError>;
}

/// a closure holder used as a [`Terminal`]
#[derive(Debug)]
pub struct FnTerminal<F> {
    f: F,
}

/// Wraps an async closure into a [`Terminal`] that sends whatever the closure returns.
pub fn terminal_fn<F, In, Fut>(f: F) -> FnTerminal<F>
where
    F: Fn(In, RequestContext) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: Responder,
{
    FnTerminal { f }
}

#[async_trait]
impl<F, In, Fut> Terminal<In> for FnTerminal<F>
where
    F: Fn(In, RequestContext) -> Fut + Send + Sync,
    In: Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Responder,
{
    async fn respond(&self, request: In, exchange: &mut Exchange) -> Result<(), BoxError> {
        let responder = (self.f)(request, exchange.context().clone()).await;
        exchange.send(responder)?;
        Ok(())
    }
}

struct Returns<F, Req> {
    f: F,
    _req: PhantomData<fn(Req)>,
}

#[async_trait]
impl<F, Req, Fut, T, E> RequestHandler for Returns<F, Req>
where
    F: Fn(Req) -> Fut + Send + Sync,
    Req: Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize + 'static,
    E: Into<BoxError> + 'static,
{
    async fn invoke(&self, exchange: &mut Exchange) -> Result<Flow, BoxError> {
        let request = take_lineage::<Req>(exchange)?;
        let value = (self.f)(request).await.map_err(Into::<BoxError>::into)?;
        let body = serde_json::to_value(&value)?;
        exchange.send(Json(body))?;
        Ok(Flow::Halt)
    }
}

struct TerminalHandler<T, Req> {
    terminal: T,
    _req: PhantomData<fn(Req)>,
}

#[async_trait]
impl<T, Req> RequestHandler for TerminalHandler<T, Req>
where
    T: Terminal<Req>,
    Req: Send + Sync + 'static,
{
    async fn invoke(&self, exchange: &mut Exchange) -> Result<Flow, BoxError> {
        let request = take_lineage::<Req>(exchange)?;
        self.terminal.respond(request, exchange).await?;
        Ok(Flow::Halt)
    }
}
