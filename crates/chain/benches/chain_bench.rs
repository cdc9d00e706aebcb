use bytes::Bytes;
use criterion::{criterion_group, criterion_main, Criterion};
use http::{Method, Request};
use http_body_util::Full;
use micro_chain::{marshal_params, marshal_query, typed, ChainErrorHandler, Router};
use micro_dispatch::{BoxError, Dispatcher};
use serde::Deserialize;
use std::hint::black_box;
use tokio::runtime::Runtime;

#[derive(Deserialize)]
struct Slug {
    slug: String,
}

#[derive(Deserialize)]
struct Page {
    page: u32,
}

fn dispatcher() -> Dispatcher {
    let blog = Router::new();
    blog.get("/:slug")
        .unwrap()
        .then(marshal_params(typed::<Slug>()))
        .unwrap()
        .then(marshal_query(typed::<Page>()))
        .unwrap()
        .returns(|request: micro_chain::Request<Slug, Page>| async move {
            Ok::<_, BoxError>(format!("{}#{}", request.params().slug, request.query().page))
        })
        .unwrap();

    let root = Router::new().mount_at("/blog", blog).unwrap();
    Dispatcher::builder().handlers(root.compile().unwrap()).error_handler(ChainErrorHandler).build().unwrap()
}

fn request(uri: &'static str) -> Request<Full<Bytes>> {
    Request::builder().method(Method::GET).uri(uri).body(Full::new(Bytes::new())).unwrap()
}

fn bench_compile_router(c: &mut Criterion) {
    c.bench_function("compile_router", |b| {
        b.iter(|| black_box(dispatcher()));
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let dispatcher = dispatcher();

    c.bench_function("dispatch_narrowed_route", |b| {
        b.to_async(&runtime).iter(|| async { black_box(dispatcher.dispatch(request("/blog/hello?page=2")).await) });
    });

    c.bench_function("dispatch_validation_failure", |b| {
        b.to_async(&runtime).iter(|| async { black_box(dispatcher.dispatch(request("/blog/hello?page=x")).await) });
    });

    c.bench_function("dispatch_not_found", |b| {
        b.to_async(&runtime).iter(|| async { black_box(dispatcher.dispatch(request("/about")).await) });
    });
}

criterion_group!(benches, bench_compile_router, bench_dispatch);
criterion_main!(benches);
