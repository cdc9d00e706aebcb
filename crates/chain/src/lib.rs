//! Consume-once router builders that narrow the request type step by step.
//!
//! A [`Router`] collects steps and delegations into a shared
//! [`HandlerList`](micro_dispatch::HandlerList); its per-method factories spawn
//! [`LeafRouter`]s, one per endpoint. Every step may replace the request value with a
//! narrower one, and the builders carry that type along, so a terminal function only
//! compiles against facets that were validated on the way:
//!
//! - [`marshal_params`], [`marshal_query`] and [`marshal_body`] validate one facet through a
//!   [`Schema`], usually [`typed`]
//! - [`step_fn`] turns any async closure into a [`Step`]
//! - [`LeafRouter::returns`] sends a value as JSON, [`LeafRouter::finish`] hands the request
//!   to a [`Terminal`]
//!
//! Each builder is usable once: an operation producing a derived builder or terminating an
//! endpoint consumes it, and any later call fails with [`ChainError::UseAfterConsume`].
//! Failures while serving a request, validation failures included, all travel the
//! dispatcher's single error channel; [`ChainErrorHandler`] answers validation failures
//! with `400 Bad Request`.

mod consumable;
mod error;
mod leaf;
mod marshal;
mod request;
mod router;
mod schema;
mod step;

pub use consumable::Consumable;
pub use error::{ChainError, ChainErrorHandler, Facet, ValidationError};
pub use leaf::{terminal_fn, FnTerminal, LeafRouter, Terminal};
pub use marshal::{marshal_body, marshal_params, marshal_query, MarshalBody, MarshalParams, MarshalQuery};
pub use request::Request;
pub use router::{raw, Delegate, Raw, Router};
pub use schema::{typed, Encoding, Schema, Source, Typed};
pub use step::{step_fn, FnStep, Step};
