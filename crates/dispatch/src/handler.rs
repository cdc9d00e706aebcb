use crate::error::BoxError;
use crate::exchange::Exchange;
use crate::responder::Responder;
use crate::RequestContext;
use async_trait::async_trait;
use std::future::Future;

/// What the chain does after a handler returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// continue with the following handler
    Next,
    /// the request is answered, stop here
    Halt,
}

/// One entry of a handler chain.
///
/// A failure is returned as `Err` and forwarded to the dispatcher's
/// [`ErrorHandler`](crate::ErrorHandler); no later handler runs.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, exchange: &mut Exchange) -> Result<Flow, BoxError>;
}

/// a closure holder which answers every request it sees
#[derive(Debug)]
pub struct FnHandler<F> {
    f: F,
}

/// Wraps an async closure into a [`RequestHandler`] that always sends the closure's output.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future + Send,
    Fut::Output: Responder,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future + Send + 'static,
    Fut::Output: Responder,
{
    async fn invoke(&self, exchange: &mut Exchange) -> Result<Flow, BoxError> {
        let responder = (self.f)(exchange.context().clone()).await;
        exchange.send(responder)?;
        Ok(Flow::Halt)
    }
}
