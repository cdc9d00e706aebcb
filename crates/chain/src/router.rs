use crate::consumable::Consumable;
use crate::error::ChainError;
use crate::leaf::LeafRouter;
use crate::request::Request;
use crate::step::{Step, StepHandler};
use micro_dispatch::{HandlerList, Layer, Mount, MountPrefix, RequestHandler, RoutePattern};
use http::Method;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// A consume-once chain builder.
///
/// Every operation returning a new builder consumes this one, so the returned value is the
/// only live handle afterwards. All builders derived from one `Router`, and every
/// [`LeafRouter`] it spawns, write into the same shared [`HandlerList`], which
/// [`compile`](Self::compile) hands out.
///
/// `Req` is the request type the steps registered so far produce.
///
/// ```
/// use micro_chain::{marshal_params, typed, Request, Router};
/// use micro_dispatch::BoxError;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Slug {
///     slug: String,
/// }
///
/// # fn main() -> Result<(), micro_chain::ChainError> {
/// let router = Router::new();
/// router
///     .get("/:slug")?
///     .then(marshal_params(typed::<Slug>()))?
///     .returns(|request: Request<Slug>| async move { Ok::<_, BoxError>(request.params().slug.clone()) })?;
///
/// let handlers = router.compile()?;
/// assert_eq!(handlers.pending(), 0);
/// # Ok(())
/// # }
/// ```
pub struct Router<Req = Request> {
    consumable: Consumable,
    handlers: HandlerList,
    _req: PhantomData<fn() -> Req>,
}

impl Router {
    pub fn new() -> Self {
        Self::over(HandlerList::new())
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! method_route {
    ($method:ident, $method_const:ident) => {
        #[doc = concat!("Spawns a `", stringify!($method_const), "` endpoint at `path`, see [`route`](Self::route).")]
        pub fn $method(&self, path: &str) -> Result<LeafRouter<Req>, ChainError> {
            self.route(Method::$method_const, path)
        }
    };
}

impl<Req> Router<Req>
where
    Req: Send + Sync + 'static,
{
    fn over(handlers: HandlerList) -> Self {
        Self { consumable: Consumable::new("Router"), handlers, _req: PhantomData }
    }

    /// Appends a step run for every request reaching this point of the list.
    pub fn then<S>(&self, step: S) -> Result<Router<S::Output>, ChainError>
    where
        S: Step<Req> + 'static,
    {
        self.consumable.consume()?;
        debug!(step = type_name::<S>(), "append step");
        self.handlers.push(Layer::Handler(Arc::new(StepHandler::<S, Req>::new(step))));
        Ok(Router::over(self.handlers.clone()))
    }

    /// Runs `delegate` inline at this point of the list.
    ///
    /// The delegate starts from an un-narrowed [`Request`]; the request type of this router
    /// is unchanged afterwards.
    pub fn mount(&self, delegate: impl Delegate) -> Result<Router<Req>, ChainError> {
        self.consumable.consume()?;
        self.delegate_to(None, delegate)
    }

    /// Runs `delegate` for paths under `path`, with the prefix stripped.
    ///
    /// `path` may capture segments (`/users/:id`); they are the delegate's path params.
    pub fn mount_at(&self, path: &str, delegate: impl Delegate) -> Result<Router<Req>, ChainError> {
        self.consumable.consume()?;
        let prefix = MountPrefix::parse(path)?;
        self.delegate_to(Some(prefix), delegate)
    }

    fn delegate_to(&self, prefix: Option<MountPrefix>, delegate: impl Delegate) -> Result<Router<Req>, ChainError> {
        let handlers = delegate.into_handlers()?;
        if handlers.reaches(&self.handlers) {
            return Err(ChainError::CyclicMount);
        }

        debug!(prefix = prefix.as_ref().map_or("/", MountPrefix::as_str), layers = handlers.len(), "mount delegate");
        self.handlers.push(Layer::Mount(Arc::new(Mount::new(prefix, handlers))));
        Ok(Router::over(self.handlers.clone()))
    }

    /// Spawns an endpoint for `method` and `path` without consuming this router.
    ///
    /// `path` is a pattern such as `/posts/:slug` or `/files/*`. The endpoint's position in
    /// the list is taken now, so it runs after everything registered before this call.
    pub fn route(&self, method: Method, path: &str) -> Result<LeafRouter<Req>, ChainError> {
        self.consumable.check_usable()?;
        let pattern = RoutePattern::parse(path)?;
        Ok(LeafRouter::spawn(method, Arc::new(pattern), self.handlers.clone()))
    }

    method_route!(get, GET);
    method_route!(post, POST);
    method_route!(put, PUT);
    method_route!(delete, DELETE);
    method_route!(patch, PATCH);
    method_route!(head, HEAD);
    method_route!(options, OPTIONS);

    /// Consumes the router and returns the list every derived builder wrote into.
    pub fn compile(&self) -> Result<HandlerList, ChainError> {
        self.consumable.consume()?;
        let pending = self.handlers.pending();
        if pending > 0 {
            debug!(pending, "compiled list has endpoints without a terminal yet");
        }
        Ok(self.handlers.clone())
    }
}

impl<Req> fmt::Debug for Router<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("request", &type_name::<Req>())
            .field("consumed", &self.consumable.is_consumed())
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Anything a [`Router`] can mount.
pub trait Delegate {
    fn into_handlers(self) -> Result<HandlerList, ChainError>;
}

/// Compiles the router, consuming it.
impl<Req: Send + Sync + 'static> Delegate for Router<Req> {
    fn into_handlers(self) -> Result<HandlerList, ChainError> {
        self.compile()
    }
}

impl<Req: Send + Sync + 'static> Delegate for &Router<Req> {
    fn into_handlers(self) -> Result<HandlerList, ChainError> {
        self.compile()
    }
}

/// Mounts the leaf's own route, none of its siblings. The leaf stays usable and may be
/// terminated later; a leaf spawned behind narrowing steps fails with
/// [`ChainError::NarrowedLeaf`].
impl<Req: Send + Sync + 'static> Delegate for &LeafRouter<Req> {
    fn into_handlers(self) -> Result<HandlerList, ChainError> {
        self.handlers()
    }
}

impl Delegate for HandlerList {
    fn into_handlers(self) -> Result<HandlerList, ChainError> {
        Ok(self)
    }
}

/// A plain [`RequestHandler`] to be mounted, see [`raw`].
#[derive(Debug)]
pub struct Raw<H>(H);

/// Wraps a handler of the dispatch engine so it can be mounted like a builder.
pub fn raw<H: RequestHandler + 'static>(handler: H) -> Raw<H> {
    Raw(handler)
}

impl<H: RequestHandler + 'static> Delegate for Raw<H> {
    fn into_handlers(self) -> Result<HandlerList, ChainError> {
        let handlers = HandlerList::new();
        handlers.push(Layer::Handler(Arc::new(self.0)));
        Ok(handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChainErrorHandler, ValidationError};
    use crate::marshal::marshal_params;
    use crate::schema::typed;
    use crate::step::step_fn;
    use bytes::Bytes;
    use http::{Response, StatusCode};
    use http_body_util::Full;
    use micro_dispatch::{handler_fn, BoxError, Dispatcher, ErrorHandler, RequestContext};
    use mockall::mock;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    mock! {
        Errors {}

        impl ErrorHandler for Errors {
            fn on_error(&self, error: &BoxError, cx: &RequestContext) -> Response<Bytes>;
        }
    }

    #[derive(Debug, Deserialize)]
    struct Slug {
        slug: String,
    }

    #[derive(Debug, Deserialize)]
    struct NumericId {
        #[allow(dead_code, reason = "only decoded")]
        slug: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct User(&'static str);

    fn request(method: Method, uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder().method(method).uri(uri).body(Full::new(Bytes::new())).unwrap()
    }

    async fn call(handlers: HandlerList, method: Method, uri: &str) -> Response<Bytes> {
        let dispatcher = Dispatcher::builder().handlers(handlers).error_handler(ChainErrorHandler).build().unwrap();
        dispatcher.dispatch(request(method, uri)).await
    }

    fn slug_router() -> Router {
        let router = Router::new();
        router
            .get("/:slug")
            .unwrap()
            .then(marshal_params(typed::<Slug>()))
            .unwrap()
            .returns(|request: Request<Slug>| async move { Ok::<_, BoxError>(request.params().slug.clone()) })
            .unwrap();
        router
    }

    #[test]
    fn test_consuming_twice_fails() {
        let router = Router::new();
        let next = router.then(step_fn(|request: Request, _cx| async move { Ok::<_, BoxError>(request) })).unwrap();

        assert!(matches!(router.compile(), Err(ChainError::UseAfterConsume { builder: "Router" })));
        assert!(matches!(router.mount(HandlerList::new()), Err(ChainError::UseAfterConsume { .. })));
        assert!(matches!(router.get("/"), Err(ChainError::UseAfterConsume { .. })));

        let handlers = next.compile().unwrap();
        assert!(matches!(next.compile(), Err(ChainError::UseAfterConsume { .. })));
        assert_eq!(handlers.len(), 1);
    }

    #[test]
    fn test_then_after_compile_leaves_list_unchanged() {
        let router = slug_router();
        let handlers = router.compile().unwrap();
        let before = format!("{handlers:?}");

        let result = router.then(step_fn(|request: Request, _cx| async move { Ok::<_, BoxError>(request) }));

        assert!(matches!(result, Err(ChainError::UseAfterConsume { .. })));
        assert!(matches!(router.post("/"), Err(ChainError::UseAfterConsume { .. })));
        assert_eq!(format!("{handlers:?}"), before);
        assert_eq!(handlers.len(), 1);
    }

    #[test]
    fn test_method_factories_do_not_consume() {
        let router = Router::new();
        let get = router.get("/posts").unwrap();
        let post = router.post("/posts").unwrap();
        let delete = router.route(Method::DELETE, "/posts/:id").unwrap();

        assert_eq!(get.method(), Method::GET);
        assert_eq!(post.method(), Method::POST);
        assert_eq!(delete.path(), "/posts/:id");
        assert!(matches!(router.get("posts"), Err(ChainError::InvalidPath(_))));

        get.returns(|_request: Request| async { Ok::<_, BoxError>("list") }).unwrap();
        post.returns(|_request: Request| async { Ok::<_, BoxError>("created") }).unwrap();
        delete.returns(|_request: Request| async { Ok::<_, BoxError>("deleted") }).unwrap();

        let handlers = router.compile().unwrap();
        assert_eq!(handlers.len(), 3);
        assert_eq!(handlers.pending(), 0);
    }

    #[tokio::test]
    async fn test_slug_is_returned() {
        let response = call(slug_router().compile().unwrap(), Method::GET, "/hello").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[http::header::CONTENT_TYPE], "application/json");
        assert_eq!(response.body().as_ref(), br#""hello""#);
    }

    #[tokio::test]
    async fn test_rejected_params_reach_error_channel_once() {
        let called = Arc::new(AtomicBool::new(false));
        let router = Router::new();
        let returned = Arc::clone(&called);
        router
            .get("/:slug")
            .unwrap()
            .then(marshal_params(typed::<NumericId>()))
            .unwrap()
            .returns(move |_request: Request<NumericId>| {
                returned.store(true, Ordering::SeqCst);
                async { Ok::<_, BoxError>("unreachable") }
            })
            .unwrap();

        let mut errors = MockErrors::new();
        errors.expect_on_error().times(1).returning(|e, _cx| {
            let e = e.downcast_ref::<ValidationError>().unwrap();
            assert_eq!(e.value(), &serde_json::json!({"slug": "hello"}));
            let mut response = Response::new(Bytes::new());
            *response.status_mut() = StatusCode::BAD_REQUEST;
            response
        });
        let dispatcher = Dispatcher::builder().handlers(router.compile().unwrap()).error_handler(errors).build().unwrap();

        let response = dispatcher.dispatch(request(Method::GET, "/hello")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.body().is_empty());
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_steps_run_in_order_until_failure() {
        let log = Arc::new(Mutex::new(vec![]));
        let step = |name: &'static str, fail: bool| {
            let log = Arc::clone(&log);
            step_fn(move |request: Request, _cx| {
                log.lock().unwrap().push(name);
                async move { if fail { Err::<Request, BoxError>(format!("{name} failed").into()) } else { Ok(request) } }
            })
        };

        let router = Router::new().then(step("s1", false)).unwrap().then(step("s2", true)).unwrap();
        let router = router.then(step("s3", false)).unwrap();
        router.get("/").unwrap().returns(|_request: Request| async { Ok::<_, BoxError>("done") }).unwrap();

        let mut errors = MockErrors::new();
        errors.expect_on_error().times(1).returning(|e, _cx| {
            assert_eq!(e.to_string(), "s2 failed");
            Response::new(Bytes::from_static(b"handled"))
        });
        let dispatcher = Dispatcher::builder().handlers(router.compile().unwrap()).error_handler(errors).build().unwrap();

        let response = dispatcher.dispatch(request(Method::GET, "/")).await;

        assert_eq!(response.body().as_ref(), b"handled");
        assert_eq!(*log.lock().unwrap(), vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_router_steps_narrow_endpoints() {
        let router = Router::new()
            .then(step_fn(|mut request: Request, cx: RequestContext| async move {
                match cx.headers().get("x-user") {
                    Some(_) => {
                        request.extensions_mut().insert(User("ada"));
                        Ok(request)
                    }
                    None => Err(BoxError::from("anonymous")),
                }
            }))
            .unwrap();
        router
            .get("/me")
            .unwrap()
            .returns(|request: Request| async move {
                let user = request.extensions().get::<User>().cloned();
                Ok::<_, BoxError>(user.map(|user| user.0))
            })
            .unwrap();
        let dispatcher =
            Dispatcher::builder().handlers(router.compile().unwrap()).error_handler(ChainErrorHandler).build().unwrap();

        let request = http::Request::builder().uri("/me").header("x-user", "1").body(Full::new(Bytes::new())).unwrap();
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.body().as_ref(), br#""ada""#);

        let response = dispatcher.dispatch(self::request(Method::GET, "/me")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_mount_at_strips_prefix() {
        let root = Router::new();
        let root = root.mount_at("/blog", slug_router()).unwrap();
        root.get("/").unwrap().returns(|_request: Request| async { Ok::<_, BoxError>("home") }).unwrap();
        let handlers = root.compile().unwrap();

        let response = call(handlers.clone(), Method::GET, "/blog/hello").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), br#""hello""#);

        let response = call(handlers.clone(), Method::GET, "/").await;
        assert_eq!(response.body().as_ref(), br#""home""#);

        let response = call(handlers, Method::GET, "/blogs/hello").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mount_isolates_narrowing() {
        let blog = slug_router();
        let root = Router::new()
            .then(step_fn(|request: Request, _cx| async move { Ok::<_, BoxError>(request.with_query(1_u8)) }))
            .unwrap()
            .mount(&blog)
            .unwrap();
        root.get("/check/:slug")
            .unwrap()
            .returns(|request: Request<(), u8>| async move { Ok::<_, BoxError>(*request.query()) })
            .unwrap();
        let handlers = root.compile().unwrap();

        let response = call(handlers.clone(), Method::GET, "/hello").await;
        assert_eq!(response.body().as_ref(), br#""hello""#);

        let response = call(handlers, Method::GET, "/check/it/").await;
        assert_eq!(response.body().as_ref(), b"1");
    }

    #[tokio::test]
    async fn test_leaf_keeps_reserved_position() {
        let router = Router::new();
        let early = router.get("/early").unwrap();
        let router = router
            .mount(raw(handler_fn(|_cx: RequestContext| async { (StatusCode::NOT_FOUND, "catch all") })))
            .unwrap();
        early.returns(|_request: Request| async { Ok::<_, BoxError>("early") }).unwrap();
        let handlers = router.compile().unwrap();

        let response = call(handlers.clone(), Method::GET, "/early").await;
        assert_eq!(response.body().as_ref(), br#""early""#);

        let response = call(handlers, Method::GET, "/late").await;
        assert_eq!(response.body().as_ref(), b"catch all");
    }

    #[test]
    fn test_cyclic_mount_is_rejected() {
        let list = HandlerList::new();
        let router: Router = Router::over(list.clone());
        assert!(matches!(router.mount(list), Err(ChainError::CyclicMount)));

        let router = Router::new();
        assert!(matches!(router.mount(&router), Err(ChainError::UseAfterConsume { .. })));
    }

    #[derive(Debug, Deserialize)]
    struct UserPost {
        id: u32,
        slug: String,
    }

    #[tokio::test]
    async fn test_mount_prefix_params_reach_delegate() {
        #[derive(Debug, Deserialize)]
        struct UserId {
            id: u32,
        }

        let child = Router::new();
        child
            .get("/posts")
            .unwrap()
            .then(marshal_params(typed::<UserId>()))
            .unwrap()
            .returns(|request: Request<UserId>| async move { Ok::<_, BoxError>(request.params().id) })
            .unwrap();
        let root = Router::new().mount_at("/users/:id", child).unwrap();

        let response = call(root.compile().unwrap(), Method::GET, "/users/42/posts").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"42");
    }

    #[tokio::test]
    async fn test_params_survive_nested_mounts() {
        let posts = Router::new();
        posts
            .get("/:slug")
            .unwrap()
            .then(marshal_params(typed::<UserPost>()))
            .unwrap()
            .returns(|request: Request<UserPost>| async move {
                Ok::<_, BoxError>(format!("{}:{}", request.params().id, request.params().slug))
            })
            .unwrap();
        let user = Router::new().mount_at("/posts", posts).unwrap();
        let root = Router::new().mount_at("/users/:id", user).unwrap();
        let handlers = root.compile().unwrap();

        let response = call(handlers.clone(), Method::GET, "/users/7/posts/hello").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), br#""7:hello""#);

        let response = call(handlers, Method::GET, "/users/seven/posts/hello").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_mounted_leaf_exposes_only_its_route() {
        let narrowed = Router::new()
            .then(step_fn(|request: Request, _cx| async move { Ok::<_, BoxError>(request.with_query(1_u8)) }))
            .unwrap();
        let behind_step = narrowed.get("/a").unwrap();
        assert!(matches!(Router::new().mount(&behind_step), Err(ChainError::NarrowedLeaf { .. })));
        behind_step.returns(|request: Request<(), u8>| async move { Ok::<_, BoxError>(*request.query()) }).unwrap();

        let plain = Router::new();
        let leaf = plain.get("/a").unwrap();
        plain.get("/b").unwrap().returns(|_request: Request| async { Ok::<_, BoxError>("sibling b") }).unwrap();
        let mounted = Router::new().mount(&leaf).unwrap();
        leaf.returns(|_request: Request| async { Ok::<_, BoxError>("a") }).unwrap();
        let handlers = mounted.compile().unwrap();

        let response = call(handlers.clone(), Method::GET, "/a").await;
        assert_eq!(response.body().as_ref(), br#""a""#);

        let response = call(handlers, Method::GET, "/b").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = call(plain.compile().unwrap(), Method::GET, "/a").await;
        assert_eq!(response.body().as_ref(), br#""a""#);
    }
}
