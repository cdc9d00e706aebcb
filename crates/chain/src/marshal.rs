//! Steps that narrow one request facet through a [`Schema`].
//!
//! Each factory returns a [`Step`] over any [`Request<P, Q, B>`] which reads its facet from
//! the request context, validates it and replaces the facet's type parameter with the
//! schema's output. A rejected facet fails the step with a
//! [`ValidationError`](crate::ValidationError), reported like any other step failure.

use crate::request::Request;
use crate::schema::{Schema, Source};
use crate::step::Step;
use async_trait::async_trait;
use micro_dispatch::{BoxError, RequestContext};
use tracing::debug;

macro_rules! marshal_step {
    ($(#[$doc:meta])* $factory:ident, $step:ident, $source:ident, $with:ident, $output:ty) => {
        $(#[$doc])*
        pub fn $factory<S: Schema>(schema: S) -> $step<S> {
            $step { schema }
        }

        #[derive(Debug)]
        pub struct $step<S> {
            schema: S,
        }

        #[async_trait]
        impl<S, P, Q, B> Step<Request<P, Q, B>> for $step<S>
        where
            S: Schema,
            S::Output: Send + Sync + 'static,
            P: Send + Sync + 'static,
            Q: Send + Sync + 'static,
            B: Send + Sync + 'static,
        {
            type Output = $output;

            async fn apply(&self, input: Request<P, Q, B>, cx: &RequestContext) -> Result<Self::Output, BoxError> {
                let value = self.schema.validate(Source::$source(cx)).inspect_err(|e| {
                    debug!(facet = %e.facet(), message = e.message(), "request rejected by schema");
                })?;
                Ok(input.$with(value))
            }
        }
    };
}

marshal_step!(
    /// Narrows the path params matched by the current route.
    marshal_params, MarshalParams, params, with_params, Request<S::Output, Q, B>
);
marshal_step!(
    /// Narrows the query string.
    marshal_query, MarshalQuery, query, with_query, Request<P, S::Output, B>
);
marshal_step!(
    /// Narrows the body, read as a form when sent as `application/x-www-form-urlencoded`
    /// and as JSON otherwise.
    marshal_body, MarshalBody, body, with_body, Request<P, Q, S::Output>
);
