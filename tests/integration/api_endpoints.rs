//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Reports and deletes are accepted and reach the registry
//! - Malformed requests are rejected
//! - Authentication middleware guards everything except the health check
//! - The dashboard WebSocket route exists only when the dashboard is enabled

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use fleet_sentinel::{
    ProbeStatus,
    actors::registry::RegistryHandle,
    alerts::AlertDispatcher,
    api::{ApiConfig, ApiState, spawn_api_server},
};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::helpers::*;

const TOKEN: &str = "test-token";

// Helper to create test API server
async fn spawn_test_api(dashboard: bool) -> (SocketAddr, RegistryHandle) {
    let dashboard_tx = dashboard.then(|| broadcast::channel(16).0);
    let registry = RegistryHandle::spawn(
        create_test_settings(2, 3, 5),
        AlertDispatcher::disabled(),
        dashboard_tx.clone(),
    );

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: Some(TOKEN.to_string()),
        enable_cors: true,
    };

    let addr = spawn_api_server(config, ApiState::new(registry.clone(), dashboard_tx))
        .await
        .unwrap();

    (addr, registry)
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn wait_for_probe(registry: &RegistryHandle, machine: &str, present: bool) {
    for _ in 0..100 {
        let snapshot = registry.snapshot().await.unwrap();
        if snapshot.get(machine).is_some() == present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("probe {machine} never became present={present}");
}

#[tokio::test]
async fn test_health_endpoint_without_auth() {
    let (addr, registry) = spawn_test_api(false).await;

    let response = client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["status"], "pass");

    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_report_is_accepted_and_routed() {
    let (addr, registry) = spawn_test_api(false).await;

    let response = client()
        .post(format!("http://{addr}/probe/web1/report"))
        .bearer_auth(TOKEN)
        .json(&json!({ "services": { "nginx": "pass", "redis": "warn" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    wait_for_probe(&registry, "web1", true).await;

    let response = client()
        .get(format!("http://{addr}/probes"))
        .header("Authorization", TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = response.json().await.unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["probes"][0]["name"], "web1");
    assert_eq!(json["probes"][0]["status"], "normal");

    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_probe() {
    let (addr, registry) = spawn_test_api(false).await;

    client()
        .post(format!("http://{addr}/probe/web1/report"))
        .bearer_auth(TOKEN)
        .json(&json!({ "services": {} }))
        .send()
        .await
        .unwrap();
    wait_for_probe(&registry, "web1", true).await;

    let response = client()
        .delete(format!("http://{addr}/probe/web1"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    wait_for_probe(&registry, "web1", false).await;
    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_delete_through_report_payload() {
    let (addr, registry) = spawn_test_api(false).await;

    client()
        .post(format!("http://{addr}/probe/db1/report"))
        .bearer_auth(TOKEN)
        .json(&json!({ "services": { "pg": "fail" } }))
        .send()
        .await
        .unwrap();
    wait_for_probe(&registry, "db1", true).await;

    let response = client()
        .post(format!("http://{addr}/probe/db1/report"))
        .bearer_auth(TOKEN)
        .json(&json!({ "machineStatus": "delete" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    wait_for_probe(&registry, "db1", false).await;
    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_malformed_reports_are_rejected() {
    let (addr, registry) = spawn_test_api(false).await;

    let response = client()
        .post(format!("http://{addr}/probe/web1/report"))
        .bearer_auth(TOKEN)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["status"], "fail");

    let response = client()
        .post(format!("http://{addr}/probe/web1/report"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client()
        .post(format!("http://{addr}/probe/%20/report"))
        .bearer_auth(TOKEN)
        .json(&json!({ "services": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let snapshot = registry.snapshot().await.unwrap();
    assert!(snapshot.probes.is_empty());

    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_auth_is_required() {
    let (addr, registry) = spawn_test_api(false).await;

    let response = client()
        .post(format!("http://{addr}/probe/web1/report"))
        .json(&json!({ "services": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client()
        .get(format!("http://{addr}/probes"))
        .bearer_auth("wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_dashboard_route_follows_configuration() {
    let (addr, registry) = spawn_test_api(false).await;
    let response = client()
        .get(format!("http://{addr}/dashws"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    registry.shutdown().await.unwrap();

    let (addr, registry) = spawn_test_api(true).await;
    let response = client()
        .get(format!("http://{addr}/dashws"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    // Route exists, but a plain GET is not a WebSocket upgrade
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.status().is_client_error());
    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_report_keeps_probe_normal() {
    let (addr, registry) = spawn_test_api(false).await;

    for _ in 0..3 {
        let response = client()
            .post(format!("http://{addr}/probe/web1/report"))
            .bearer_auth(TOKEN)
            .json(&json!({ "services": { "nginx": "fail" } }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    wait_for_probe(&registry, "web1", true).await;

    let state = registry.probe_state("web1").await.unwrap().unwrap();
    assert_eq!(state.status, ProbeStatus::Normal);

    registry.shutdown().await.unwrap();
}
