#![cfg(feature = "http-server")]

mod support;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use accessmap::http::{create_router, AppState};
use accessmap::services::DistributionConfig;
use support::{aggregation_service, MockProvider};

fn app(provider: Arc<MockProvider>) -> Router {
    let service = aggregation_service(provider, vec![], vec![], DistributionConfig::width(60.0));
    create_router(AppState::new(Arc::new(service)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn wait_until_complete(app: &Router) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, body) = send(app, "GET", "/v1/aggregation", None).await;
            assert_eq!(status, StatusCode::OK);
            if body["complete"] == json!(true) && body["total_weight"] != json!(0.0) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_health_reports_provider() {
    let app = app(Arc::new(MockProvider::constant(1.0)));
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "mock");
    assert_eq!(body["population"], 0);
}

#[tokio::test]
async fn test_population_upload_reports_skipped_records() {
    let app = app(Arc::new(MockProvider::constant(1.0)));
    let records = json!([
        {"id": 1, "lat": 40.0, "lon": -3.7, "weight": 120.0},
        {"id": 2, "latitude": 40.1, "lng": -3.6, "population": 80.0},
        {"id": 3, "lat": 95.0, "lon": 0.0, "weight": 5.0},
    ]);
    let (status, body) = send(&app, "POST", "/v1/population", Some(records)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["issues"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "POST", "/v1/population", Some(json!({"not": "an array"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_target_lifecycle() {
    let app = app(Arc::new(MockProvider::constant(1.0)));
    let school = json!({"id": 7, "lat": 40.0, "lng": -3.7, "category": "school",
                        "metadata": {"name": "North Primary"}});

    let (status, body) = send(&app, "POST", "/v1/targets", Some(school.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], 7);

    let (status, _) = send(&app, "POST", "/v1/targets", Some(school)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/v1/targets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["targets"][0]["metadata"]["name"], "North Primary");

    let (status, _) = send(&app, "DELETE", "/v1/targets/7", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", "/v1/targets/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let moved = json!({"id": 7, "lat": 41.0, "lng": -3.7, "category": "school"});
    let (status, _) = send(&app, "POST", "/v1/targets", Some(moved)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_selection_validation() {
    let app = app(Arc::new(MockProvider::constant(1.0)));
    send(
        &app,
        "POST",
        "/v1/targets",
        Some(json!({"id": 1, "lat": 40.0, "lon": -3.7, "category": "clinic"})),
    )
    .await;

    let (status, _) = send(
        &app,
        "PUT",
        "/v1/selection",
        Some(json!({"target_ids": [1], "category": "clinic"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "PUT", "/v1/selection", Some(json!({"target_ids": [404]}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "PUT",
        "/v1/selection",
        Some(json!({"category": "CLINIC", "mode": "driving"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["target_selection"], json!([1]));
    assert_eq!(body["mode"], "driving");
}

#[tokio::test]
async fn test_refresh_flow() {
    let provider = Arc::new(MockProvider::new(|request, _| {
        Ok(accessmap::api::RouteCost::new(
            support::origin_point(request) as f64 * 45.0,
        ))
    }));
    let app = app(provider.clone());

    let records = json!([
        {"id": 1, "lat": 0.0, "lon": 0.001, "weight": 10.0},
        {"id": 2, "lat": 0.0, "lon": 0.002, "weight": 30.0},
    ]);
    send(&app, "POST", "/v1/population", Some(records)).await;
    send(
        &app,
        "POST",
        "/v1/targets",
        Some(json!({"id": 1, "lat": 0.5, "lon": 0.001, "category": "school"})),
    )
    .await;

    let (status, body) = send(&app, "PUT", "/v1/selection", Some(json!({"target_ids": [1]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["complete"], false);
    assert_eq!(body["pending_pairs"], 2);

    let (status, body) = send(&app, "POST", "/v1/aggregation/refresh", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let generation = body["generation"].as_u64().unwrap();

    let result = wait_until_complete(&app).await;
    assert_eq!(result["total_weight"], 40.0);
    assert_eq!(result["unreachable_weight"], 0.0);
    // 45 s and 90 s with 60 s buckets.
    assert_eq!(result["buckets"][0]["total_weight"], 10.0);
    assert_eq!(result["buckets"][1]["total_weight"], 30.0);
    assert_eq!(result["point_costs"].as_array().unwrap().len(), 2);
    assert_eq!(provider.calls(), 2);

    let (status, body) = send(&app, "GET", "/v1/aggregation?include_points=false", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["point_costs"].as_array().unwrap().is_empty());

    let (status, body) = send(&app, "GET", &format!("/v1/batches/{}", generation), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["reachable"], 2);

    let (status, body) = send(
        &app,
        "PUT",
        "/v1/distribution",
        Some(json!({"bucket": {"type": "edges", "edges": [0.0, 60.0]}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buckets"][1]["kind"], "overflow");
    assert_eq!(body["buckets"][1]["total_weight"], 30.0);
    assert_eq!(provider.calls(), 2);
}
