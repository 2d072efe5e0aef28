//! End-to-end tests against a running API
//!
//! These tests require:
//! 1. PostgreSQL database running (with migrations applied)
//! 2. Redis running
//! 3. API server running on configured port
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:3000)

use serde_json::{json, Value};
use uuid::Uuid;

fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_e2e_health_check() {
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", get_base_url()))
        .send()
        .await
        .expect("Failed to reach API");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Invalid health JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["database"]["status"], "ok");
    assert_eq!(body["checks"]["queue"]["status"], "ok");
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_e2e_job_is_queued_and_visible() {
    let client = reqwest::Client::new();
    let base_url = get_base_url();
    let job_id = Uuid::new_v4();

    let response = client
        .post(format!("{base_url}/api/v1/jobs"))
        .json(&json!({
            "job_id": job_id,
            "user_id": "e2e-user",
            "source_path": "e2e-user/clip.mp4",
            "variant_count": 3,
            "kind": "video",
            "settings": { "brightness_range": [-0.03, 0.03] }
        }))
        .send()
        .await
        .expect("Failed to submit job");

    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let body: Value = response.json().await.expect("Invalid submit JSON");
    assert_eq!(body["status"], "queued");
    assert_eq!(body["job_id"], job_id.to_string());
    assert!(body["call_id"].is_string());

    let status: Value = client
        .get(format!("{base_url}/api/v1/jobs/{job_id}"))
        .send()
        .await
        .expect("Failed to fetch status")
        .json()
        .await
        .expect("Invalid status JSON");
    assert!(["queued", "processing", "completed", "failed"]
        .contains(&status["status"].as_str().unwrap_or_default()));
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_e2e_inverted_interval_is_rejected() {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/jobs", get_base_url()))
        .json(&json!({
            "job_id": Uuid::new_v4(),
            "user_id": "e2e-user",
            "source_path": "e2e-user/clip.mp4",
            "variant_count": 2,
            "kind": "video",
            "settings": { "brightness_range": [0.05, -0.05] }
        }))
        .send()
        .await
        .expect("Failed to submit job");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("Invalid error JSON");
    assert_eq!(body["status"], "error");
    assert!(body["error"].as_str().unwrap().contains("brightness"));
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_e2e_unbounded_interval_is_rejected() {
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/jobs", get_base_url()))
        .json(&json!({
            "job_id": Uuid::new_v4(),
            "user_id": "e2e-user",
            "source_path": "e2e-user/clip.mp4",
            "variant_count": 2,
            "kind": "video",
            "settings": { "brightness_range": [-1e308, 1e308] }
        }))
        .send()
        .await
        .expect("Failed to submit job");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore] // Requires running API server and infrastructure
async fn test_e2e_unknown_job_is_not_found() {
    let response = reqwest::Client::new()
        .get(format!("{}/api/v1/jobs/{}", get_base_url(), Uuid::new_v4()))
        .send()
        .await
        .expect("Failed to fetch status");

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
