use crate::context::RequestContext;
use crate::error::{error_envelope, BoxError, DefaultErrorHandler, DispatchError, ErrorHandler};
use crate::exchange::Exchange;
use crate::handler::{Flow, RequestHandler};
use crate::handler_list::HandlerList;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

pub struct DispatcherBuilder {
    handlers: Option<HandlerList>,
    error_handler: Option<Arc<dyn ErrorHandler>>,
    fallback: Option<Arc<dyn RequestHandler>>,
    timeout: Option<Duration>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self { handlers: None, error_handler: None, fallback: None, timeout: None }
    }

    pub fn handlers(mut self, handlers: HandlerList) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn error_handler(mut self, error_handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Some(Arc::new(error_handler));
        self
    }

    /// Answers requests the handler list passed on. Defaults to a JSON `404 Not Found`.
    pub fn fallback(mut self, fallback: impl RequestHandler + 'static) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// Fails requests whose handlers take longer than `timeout` with `503 Service Unavailable`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let handlers = self.handlers.ok_or(BuildError::MissingHandlers)?;
        let pending = handlers.pending();
        if pending > 0 {
            debug!(pending, "handler list has unfilled slots, they are skipped until filled");
        }
        Ok(Dispatcher {
            handlers,
            error_handler: self.error_handler.unwrap_or_else(|| Arc::new(DefaultErrorHandler)),
            fallback: self.fallback.unwrap_or_else(|| Arc::new(NotFound)),
            timeout: self.timeout,
        })
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("handlers must be set")]
    MissingHandlers,
}

/// Runs a [`HandlerList`] for in-memory requests.
///
/// Every failure of one request reaches the configured [`ErrorHandler`] exactly once.
#[derive(Clone)]
pub struct Dispatcher {
    handlers: HandlerList,
    error_handler: Arc<dyn ErrorHandler>,
    fallback: Arc<dyn RequestHandler>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn handlers(&self) -> &HandlerList {
        &self.handlers
    }

    pub async fn dispatch<B>(&self, request: Request<B>) -> Response<Bytes>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let (head, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let cx = RequestContext::new(head, Bytes::new());
                return self.fail(DispatchError::body(e).into(), &cx);
            }
        };

        let mut exchange = Exchange::new(RequestContext::new(head, body));
        debug!(method = %exchange.context().method(), path = exchange.context().path(), "dispatch request");

        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.handlers.run(&mut exchange)).await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Timeout(timeout).into()),
            },
            None => self.handlers.run(&mut exchange).await,
        };

        let result = match result {
            Ok(Flow::Next) if !exchange.is_sent() => self.fallback.invoke(&mut exchange).await,
            result => result,
        };

        let mut response = match (result, exchange.take_response()) {
            (Ok(_), Some(response)) => response,
            (Ok(_), None) => self.fail(DispatchError::NoResponse.into(), exchange.context()),
            (Err(e), None) => self.fail(e, exchange.context()),
            (Err(e), Some(response)) => {
                error!(cause = %e, "handler failed after the response was sent");
                // the sent response wins; the handler is only told about the failure
                let _ = self.error_handler.on_error(&e, exchange.context());
                response
            }
        };

        if exchange.context().method() == Method::HEAD {
            *response.body_mut() = Bytes::new();
        }
        response
    }

    fn fail(&self, e: BoxError, cx: &RequestContext) -> Response<Bytes> {
        warn!(cause = %e, path = cx.path(), "request failed");
        self.error_handler.on_error(&e, cx)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("handlers", &self.handlers)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// The default fallback.
struct NotFound;

#[async_trait]
impl RequestHandler for NotFound {
    async fn invoke(&self, exchange: &mut Exchange) -> Result<Flow, BoxError> {
        exchange.send(error_envelope(StatusCode::NOT_FOUND, "Not Found"))?;
        Ok(Flow::Halt)
    }
}
