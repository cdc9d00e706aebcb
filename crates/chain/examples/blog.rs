//! A small blog API assembled with chain builders and driven with in-memory requests.
//!
//! Run with `cargo run -p micro-chain --example blog`.

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::Full;
use micro_chain::{
    marshal_body, marshal_params, marshal_query, raw, step_fn, terminal_fn, typed, ChainError, ChainErrorHandler,
    Request, Router,
};
use micro_dispatch::{handler_fn, BoxError, Dispatcher, Json, RequestContext};
use serde::{Deserialize, Serialize};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize)]
struct Slug {
    slug: String,
}

#[derive(Deserialize)]
struct Page {
    page: u32,
    size: Option<u32>,
}

#[derive(Deserialize, Serialize, Clone)]
struct NewPost {
    title: String,
    body: String,
}

#[derive(Clone)]
struct Author(String);

fn blog() -> Result<Router, ChainError> {
    let blog = Router::new();

    blog.get("/")?
        .then(marshal_query(typed::<Page>().refine("page starts at 1", |p| p.page >= 1)))?
        .returns(|request: Request<(), Page>| async move {
            let Page { page, size } = request.query();
            Ok::<_, BoxError>(format!("page {page} of {} posts", size.unwrap_or(10)))
        })?;

    blog.get("/:slug")?.then(marshal_params(typed::<Slug>()))?.returns(|request: Request<Slug>| async move {
        match request.params().slug.as_str() {
            "missing" => Err(BoxError::from("no such post")),
            slug => Ok(format!("post {slug}")),
        }
    })?;

    // authors come from a header, anything else is rejected before the body is read
    blog.post("/")?
        .then(step_fn(|mut request: Request, cx: RequestContext| async move {
            match cx.headers().get("x-author").and_then(|v| v.to_str().ok()) {
                Some(author) => {
                    request.extensions_mut().insert(Author(author.to_string()));
                    Ok(request)
                }
                None => Err(BoxError::from("missing x-author header")),
            }
        }))?
        .then(marshal_body(typed::<NewPost>().refine("title must not be empty", |p| !p.title.is_empty())))?
        .finish(terminal_fn(|request: Request<(), (), NewPost>, _cx| async move {
            let author = request.extensions().get::<Author>().map(|a| a.0.clone()).unwrap_or_default();
            info!(%author, title = %request.body().title, "create post");
            (StatusCode::CREATED, Json(request.body().clone()))
        }))?;

    Ok(blog)
}

fn app() -> Result<Router, ChainError> {
    let health = raw(handler_fn(|cx: RequestContext| async move { (cx.path() == "/health").then_some("ok") }));
    let app = Router::new().mount_at("/blog", blog()?)?;
    let app = app.mount(health)?;
    Ok(app)
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let handlers = match app().and_then(|app| app.compile()) {
        Ok(handlers) => handlers,
        Err(e) => {
            tracing::error!(cause = %e, "build router error");
            return;
        }
    };
    let dispatcher = Dispatcher::builder()
        .handlers(handlers)
        .error_handler(ChainErrorHandler)
        .build()
        .expect("handlers are set");

    let requests = [
        (Method::GET, "/health", None, ""),
        (Method::GET, "/blog/?page=2&size=5", None, ""),
        (Method::GET, "/blog/?page=0", None, ""),
        (Method::GET, "/blog/hello-world", None, ""),
        (Method::GET, "/blog/missing", None, ""),
        (Method::POST, "/blog", Some("alice"), r#"{"title":"Hello","body":"first post"}"#),
        (Method::POST, "/blog", Some("alice"), r#"{"title":"","body":"untitled"}"#),
        (Method::POST, "/blog", None, r#"{"title":"Anonymous","body":"?"}"#),
        (Method::GET, "/about", None, ""),
    ];

    for (method, uri, author, body) in requests {
        let mut builder = http::Request::builder().method(method.clone()).uri(uri);
        if let Some(author) = author {
            builder = builder.header("x-author", author).header(http::header::CONTENT_TYPE, "application/json");
        }
        let request = builder.body(Full::new(Bytes::from_static(body.as_bytes()))).expect("valid request");

        let response = dispatcher.dispatch(request).await;
        info!(%method, uri, status = %response.status(), body = %String::from_utf8_lossy(response.body()), "dispatched");
    }
}
