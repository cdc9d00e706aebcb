use crate::error::ChainError;
use crate::request::Request;
use async_trait::async_trait;
use micro_dispatch::{BoxError, Exchange, Flow, Lineage, RequestContext, RequestHandler};
use std::any::{type_name, Any};
use std::future::Future;
use std::marker::PhantomData;

/// One non-terminal link of a chain: turns the current request value into a narrower one.
///
/// A failure is returned as `Err` and ends the chain; it reaches the dispatcher's error
/// handler and no later step runs.
#[async_trait]
pub trait Step<In>: Send + Sync
where
    In: Send + 'static,
{
    type Output: Send + Sync + 'static;

    async fn apply(&self, input: In, cx: &RequestContext) -> Result<Self::Output, BoxError>;
}

/// a closure holder used as a [`Step`]
#[derive(Debug)]
pub struct FnStep<F> {
    f: F,
}

/// Wraps an async closure into a [`Step`]. The closure gets the request value and a clone
/// of the request context.
///
/// ```
/// use micro_chain::{step_fn, Request};
/// use micro_dispatch::BoxError;
///
/// #[derive(Clone)]
/// struct Trace(&'static str);
///
/// let tag = step_fn(|mut request: Request, _cx| async move {
///     request.extensions_mut().insert(Trace("tagged"));
///     Ok::<_, BoxError>(request)
/// });
/// # let _ = tag;
/// ```
pub fn step_fn<F, In, Fut, Out, E>(f: F) -> FnStep<F>
where
    F: Fn(In, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Out, E>> + Send,
    E: Into<BoxError>,
{
    FnStep { f }
}

#[async_trait]
impl<F, In, Fut, Out, E> Step<In> for FnStep<F>
where
    F: Fn(In, RequestContext) -> Fut + Send + Sync,
    In: Send + 'static,
    Fut: Future<Output = Result<Out, E>> + Send + 'static,
    Out: Send + Sync + 'static,
    E: Into<BoxError> + 'static,
{
    type Output = Out;

    async fn apply(&self, input: In, cx: &RequestContext) -> Result<Out, BoxError> {
        (self.f)(input, cx.clone()).await.map_err(Into::into)
    }
}

/// Takes the lineage value out of the exchange as an `In`.
///
/// An empty lineage is the start of a chain and reads as an un-narrowed [`Request`].
pub(crate) fn take_lineage<In: Any + Send + Sync>(exchange: &mut Exchange) -> Result<In, ChainError> {
    let lineage: Lineage = exchange.take_lineage().unwrap_or_else(|| Box::new(Request::new()));
    lineage
        .downcast::<In>()
        .map(|input| *input)
        .map_err(|_| ChainError::LineageMismatch { expected: type_name::<In>() })
}

/// Runs a [`Step`] as a dispatch handler: lineage in, narrowed lineage out.
pub(crate) struct StepHandler<S, In> {
    step: S,
    _in: PhantomData<fn(In)>,
}

impl<S, In> StepHandler<S, In> {
    pub(crate) fn new(step: S) -> Self {
        Self { step, _in: PhantomData }
    }
}

#[async_trait]
impl<S, In> RequestHandler for StepHandler<S, In>
where
    S: Step<In>,
    In: Send + Sync + 'static,
{
    async fn invoke(&self, exchange: &mut Exchange) -> Result<Flow, BoxError> {
        let input = take_lineage::<In>(exchange)?;
        let output = self.step.apply(input, exchange.context()).await?;
        exchange.set_lineage(Box::new(output));
        Ok(Flow::Next)
    }
}
