//! An in-process dispatch engine for ordered handler lists.
//!
//! This crate runs an ordered, shared [`HandlerList`] against already parsed HTTP requests:
//! plain handlers run for every request reaching them, routes match a method and an
//! Express-style path pattern, and mounts scope a nested list under a path prefix.
//! Every failure is funneled to a single [`ErrorHandler`].
//!
//! Networking is out of scope: the [`Dispatcher`] takes an `http::Request` with any body
//! and returns an `http::Response<Bytes>`, ready to be written by whatever server embeds it.
//!
//! # Example
//!
//! ```no_run
//! use micro_dispatch::{handler_fn, Dispatcher, HandlerList, Layer, RequestContext};
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let handlers = HandlerList::new();
//! handlers.push(Layer::Handler(Arc::new(handler_fn(|cx: RequestContext| async move {
//!     format!("hello from {}", cx.path())
//! }))));
//!
//! let dispatcher = Dispatcher::builder().handlers(handlers).build().unwrap();
//! let request = http::Request::builder().uri("/world").body(http_body_util::Empty::<bytes::Bytes>::new()).unwrap();
//! let response = dispatcher.dispatch(request).await;
//! assert_eq!(response.body().as_ref(), b"hello from /world");
//! # }
//! ```

mod context;
mod dispatcher;
mod error;
mod exchange;
mod handler;
mod handler_list;
mod pattern;
mod responder;

pub use context::PathParams;
pub use context::RequestContext;
pub use dispatcher::{BuildError, Dispatcher, DispatcherBuilder};
pub use error::{error_envelope, BoxError, DefaultErrorHandler, DispatchError, ErrorHandler, PatternError};
pub use exchange::{Exchange, Lineage};
pub use handler::{handler_fn, Flow, FnHandler, RequestHandler};
pub use handler_list::{HandlerList, Layer, Mount, Route, Slot};
pub use pattern::{MountPrefix, PrefixMatch, RoutePattern};
pub use responder::{Json, Redirect, Responder};
