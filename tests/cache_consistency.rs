//! Cache-aside behaviour observed through the HTTP surface: reads are served
//! from the cache until a write through the API sweeps the affected keys, and
//! an unreachable cache never fails a request.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use icelog::application::readings::ReadingService;
use icelog::application::repos::ReadingsRepo;
use icelog::cache::{CacheAside, CacheBackend, CacheConfig, CacheError, KeyPattern};
use icelog::infra::db::SqliteRepositories;
use icelog::infra::http::{HttpState, build_router};
use icelog_api_types::NewReadingPayload;

async fn repositories() -> SqliteRepositories {
    let pool = SqliteRepositories::connect_in_memory()
        .await
        .expect("in-memory pool");
    SqliteRepositories::run_migrations(&pool)
        .await
        .expect("migrations apply");
    SqliteRepositories::new(pool)
}

fn router(repos: &SqliteRepositories, cache: CacheAside) -> Router {
    let state = HttpState {
        readings: ReadingService::new(Arc::new(repos.clone())),
        cache,
        auth: None,
        db: repos.clone(),
    };
    build_router(state, None)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn payload(collector: &str) -> NewReadingPayload {
    NewReadingPayload {
        region: Some("A".into()),
        density: Some(1.0),
        thickness: Some(0.3),
        collector: Some(collector.into()),
        ..Default::default()
    }
}

fn total(body: &Value) -> u64 {
    body["pagination"]["total"].as_u64().unwrap()
}

#[tokio::test]
async fn reads_are_cached_until_an_api_write() {
    let repos = repositories().await;
    let app = router(&repos, CacheAside::in_memory(CacheConfig::default()));

    let (_, first) = send(&app, "GET", "/api/ice-data?region=A&page=1", None).await;
    assert_eq!(total(&first), 0);

    // A write that bypasses the API leaves the cached view in place.
    repos.insert(payload("direct")).await.unwrap();
    let (_, reordered) = send(&app, "GET", "/api/ice-data?page=1&region=A", None).await;
    assert_eq!(total(&reordered), 0);

    let (status, _) = send(
        &app,
        "POST",
        "/api/ice-data",
        Some(json!({ "region": "A", "density": 1.0, "thickness": 0.3, "collector": "api" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, fresh) = send(&app, "GET", "/api/ice-data?region=A&page=1", None).await;
    assert_eq!(total(&fresh), 2);
}

#[tokio::test]
async fn item_reads_observe_updates_and_deletes() {
    let repos = repositories().await;
    let app = router(&repos, CacheAside::in_memory(CacheConfig::default()));
    let id = repos.insert(payload("Bob")).await.unwrap().id;
    let item = format!("/api/ice-data/{id}");

    let (_, before) = send(&app, "GET", &item, None).await;
    assert_eq!(before["data"]["temperature"], Value::Null);
    let (_, list) = send(&app, "GET", "/api/ice-data", None).await;
    assert_eq!(total(&list), 1);

    let (status, _) = send(&app, "PUT", &item, Some(json!({ "temperature": -2.5 }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, after) = send(&app, "GET", &item, None).await;
    assert_eq!(after["data"]["temperature"], json!(-2.5));

    let (status, _) = send(&app, "DELETE", &item, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &item, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, list) = send(&app, "GET", "/api/ice-data", None).await;
    assert_eq!(total(&list), 0);
}

#[tokio::test]
async fn failed_writes_do_not_sweep_the_cache() {
    let repos = repositories().await;
    let cache = CacheAside::in_memory(CacheConfig::default());
    let app = router(&repos, cache.clone());

    send(&app, "GET", "/api/ice-data", None).await;
    let (status, _) = send(&app, "POST", "/api/ice-data", Some(json!({ "region": "A" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The cached list is still present, so an explicit sweep finds it.
    let removed = cache
        .invalidate(&cache.collection_patterns("/api/ice-data"))
        .await;
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn stats_are_cached_and_swept_by_writes() {
    let repos = repositories().await;
    let app = router(&repos, CacheAside::in_memory(CacheConfig::default()));

    let (_, first) = send(&app, "GET", "/api/ice-data/stats", None).await;
    assert_eq!(first["data"]["totalRecords"], json!(0));

    repos.insert(payload("direct")).await.unwrap();
    let (_, cached) = send(&app, "GET", "/api/ice-data/stats", None).await;
    assert_eq!(cached["data"]["totalRecords"], json!(0));

    let (_, created) = send(
        &app,
        "POST",
        "/api/ice-data",
        Some(json!({ "region": "B", "density": 1.0, "thickness": 0.3, "collector": "api" })),
    )
    .await;
    let (_, fresh) = send(&app, "GET", "/api/ice-data/stats", None).await;
    assert_eq!(fresh["data"]["totalRecords"], json!(2));

    let id = created["data"]["id"].as_i64().unwrap();
    send(&app, "DELETE", &format!("/api/ice-data/{id}"), None).await;
    let (_, after_delete) = send(&app, "GET", "/api/ice-data/stats", None).await;
    assert_eq!(after_delete["data"]["totalRecords"], json!(1));
}

struct Unreachable;

#[async_trait]
impl CacheBackend for Unreachable {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn set_ex(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn keys(&self, _pattern: &KeyPattern) -> Result<Vec<String>, CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn delete_many(&self, _keys: &[String]) -> Result<u64, CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::unavailable("connection refused"))
    }
}

#[tokio::test]
async fn unreachable_cache_degrades_to_the_store() {
    let repos = repositories().await;
    let cache = CacheAside::new(Arc::new(Unreachable), CacheConfig::default());
    let app = router(&repos, cache);

    let (status, list) = send(&app, "GET", "/api/ice-data", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(total(&list), 0);

    let (status, created) = send(
        &app,
        "POST",
        "/api/ice-data",
        Some(json!({ "region": "B", "density": 2.0, "thickness": 1.0, "collector": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_i64().unwrap();

    let (status, item) = send(&app, "GET", &format!("/api/ice-data/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["data"]["collector"], "x");

    let (_, list) = send(&app, "GET", "/api/ice-data", None).await;
    assert_eq!(total(&list), 1);
}
