//! End-to-end dispatch through a compiled route with injected modules.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::{Method, StatusCode};
use serde_json::{json, Value};
use sluice_core::{
    FieldSchema, ModuleRegistry, Modules, RequestContext, RequestSchemas, ResponseSchemas,
    SchemaMap,
};
use sluice_route::{HandlerError, Invocation, RawRequest, Reply, RouteContract};

/// A module that counts how often it is used.
#[derive(Debug, Default)]
struct Counter(AtomicUsize);

impl Counter {
    fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn registry(constructions: Arc<AtomicUsize>) -> Arc<ModuleRegistry> {
    Arc::new(
        ModuleRegistry::builder()
            .module("counter", move || {
                let constructions = Arc::clone(&constructions);
                async move {
                    constructions.fetch_add(1, Ordering::SeqCst);
                    Ok(Counter::default())
                }
            })
            .build(),
    )
}

fn counter_route() -> sluice_route::CompiledRoute {
    RouteContract::new("counter")
        .post_validated(
            RequestSchemas::new().body(SchemaMap::new().field("by", FieldSchema::number().min(1))),
            ResponseSchemas::new().status(
                StatusCode::OK,
                SchemaMap::new().field("count", FieldSchema::number().required()),
            ),
            |inv: Invocation| async move {
                let counter = inv.module::<Counter>("counter").await?;
                Ok(Reply::new(json!({ "count": counter.bump(), "debug": true })))
            },
        )
        .get(|inv: Invocation| async move {
            inv.module::<String>("missing").await?;
            Ok(Reply::empty())
        })
        .build()
        .unwrap()
}

fn request(method: Method, body: Option<Value>) -> RawRequest {
    let request = RawRequest::new(method, "/counter".parse().unwrap());
    match body {
        Some(body) => request.with_json(&body),
        None => request,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn modules_are_shared_across_concurrent_requests() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let modules = Modules::new(registry(Arc::clone(&constructions)));
    let route = Arc::new(counter_route());

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let route = Arc::clone(&route);
        let modules = modules.clone();
        tasks.push(tokio::spawn(async move {
            route
                .dispatch(
                    RequestContext::new("POST", "/counter"),
                    request(Method::POST, Some(json!({ "by": 1 }))),
                    modules,
                )
                .await
                .unwrap()
        }));
    }

    let mut counts = Vec::new();
    for task in tasks {
        let response = task.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().get("debug").is_none());
        counts.push(response.body()["count"].as_u64().unwrap());
    }
    counts.sort_unstable();

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert_eq!(counts, (1..=20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn module_failure_is_a_handler_error() {
    let modules = Modules::new(registry(Arc::new(AtomicUsize::new(0))));
    let response = counter_route()
        .dispatch(RequestContext::mock(), request(Method::GET, None), modules)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.body(),
        &json!({ "success": false, "error": "Internal Server Error" })
    );
}

#[tokio::test]
async fn non_object_body_is_reported_as_body_type_error() {
    let modules = Modules::new(registry(Arc::new(AtomicUsize::new(0))));
    let response = counter_route()
        .dispatch(
            RequestContext::mock(),
            request(Method::POST, None).with_body("not json"),
            modules,
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.body()["errors"],
        json!([{ "field": "body", "constraint": "type", "value": "not json" }])
    );
}

#[tokio::test]
async fn handler_chosen_status_is_kept() {
    let route = RouteContract::new("users")
        .post(|_inv: Invocation| async {
            Err(HandlerError::new("email already registered").with_status(StatusCode::CONFLICT))
        })
        .build()
        .unwrap();

    let response = route
        .dispatch(
            RequestContext::mock(),
            request(Method::POST, Some(json!({}))),
            Modules::empty(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        response.body(),
        &json!({ "success": false, "error": "email already registered" })
    );
}
