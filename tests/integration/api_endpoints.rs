//! Integration tests for the agent HTTP API
//!
//! These tests verify that:
//! - Every request is authenticated before anything else happens
//! - Only GET is served
//! - Status, series and config bodies have the documented shape

use std::time::Duration;

use hostmon::{
    NetworkStatus,
    actors::SamplingCoordinator,
    api::{ConfigResponse, SeriesResponse, StatusResponse},
    config::SettingsProvider,
    devices::DeviceIdentity,
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::helpers::{TOKEN, TestAgent, fixed_samplers, memory_snapshot, test_settings};

fn url(addr: std::net::SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

async fn get(addr: std::net::SocketAddr, path: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(url(addr, path))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("request failed")
}

#[tokio::test]
async fn test_missing_or_wrong_token_is_rejected() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;
    let client = reqwest::Client::new();

    let response = client
        .get(url(addr, "/api/v1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let response = client
        .get(url(addr, "/api/v1/status"))
        .bearer_auth("not-the-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(url(addr, "/api/v1/config"))
        .header("Authorization", format!("Basic {TOKEN}"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_scheme_is_case_insensitive() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;
    let client = reqwest::Client::new();

    for scheme in ["bearer", "BEARER"] {
        let response = client
            .get(url(addr, "/api/v1/config"))
            .header("Authorization", format!("{scheme} {TOKEN}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_auth_is_checked_before_method_and_route() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;
    let client = reqwest::Client::new();

    let response = client
        .post(url(addr, "/api/v1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(url(addr, "/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_only_get_is_allowed() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;
    let client = reqwest::Client::new();

    for path in ["/api/v1/status", "/api/v1/config", "/unknown"] {
        let response = client
            .post(url(addr, path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{path}");
    }

    let response = client
        .delete(url(addr, "/api/v1/series"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;

    let response = get(addr, "/api/v2/status").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_malformed_request_is_bad_request() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /api/v1/status HTTP/1.1\r\nthis header has no colon\r\n\r\n")
        .await
        .unwrap();

    let mut buf = vec![0u8; 256];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("server did not answer")
        .unwrap();
    let response = String::from_utf8_lossy(&buf[..read]);
    assert!(response.starts_with("HTTP/1.1 400"), "got {response:?}");
}

#[tokio::test]
async fn test_status_unavailable_before_first_sample() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;

    let response = get(addr, "/api/v1/status").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_after_sample() {
    let agent = TestAgent::new(test_settings());
    let coordinator = SamplingCoordinator::new(
        fixed_samplers(42.0, true),
        agent.store.clone(),
        agent.engine.clone(),
        agent.provider(),
        DeviceIdentity::new("local", "Test Mac"),
    );
    let sampled = coordinator.sample_now().await;
    let addr = agent.serve().await;

    let response = get(addr, "/api/v1/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();

    assert_eq!(body["timestamp"].as_f64(), Some(sampled.timestamp));
    assert_eq!(body["metrics"]["memory"]["used_percent"].as_f64(), Some(42.0));
    assert_eq!(body["metrics"]["cpu"]["usage_percent"].as_f64(), Some(12.5));
    assert_eq!(body["metrics"]["disk"]["used_percent"].as_f64(), Some(55.0));
    assert_eq!(body["metrics"]["network"]["status"], "normal");
    assert_eq!(body["alerts"]["active"], false);

    let items = body["alerts"]["items"].as_array().unwrap();
    let types = items
        .iter()
        .map(|item| item["type"].as_str().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(types, vec!["memory", "cpu", "disk", "network"]);
    assert!(items.iter().all(|item| item["status"] == "normal"));
    assert!(items.iter().all(|item| item["sinceTimestamp"] == 0.0));
    assert!(items.iter().all(|item| item["nextSoundTimestamp"] == 0.0));

    let parsed: StatusResponse = serde_json::from_value(body).unwrap();
    assert_eq!(parsed.into_snapshot(), sampled);
}

#[tokio::test]
async fn test_status_reports_active_alert() {
    let agent = TestAgent::new(test_settings());
    let local = DeviceIdentity::new("local", "Test Mac");
    for (i, memory) in [95.0, 96.0].into_iter().enumerate() {
        let snapshot = memory_snapshot(1000.0 + i as f64 * 5.0, memory);
        agent.store.write().await.add_snapshot(snapshot.clone());
        agent.engine.evaluate(&local, &snapshot, snapshot.timestamp).await;
    }
    let addr = agent.serve().await;

    let body: StatusResponse = get(addr, "/api/v1/status").await.json().await.unwrap();
    assert!(body.alerts.active);

    let memory = &body.alerts.items[0];
    assert_eq!(memory.since_timestamp, 1005.0);
    assert_eq!(memory.next_sound_timestamp, 1005.0 + 180.0);
}

#[tokio::test]
async fn test_series_clamps_points() {
    let agent = TestAgent::new(test_settings());
    {
        let mut store = agent.store.write().await;
        for i in 0..80 {
            store.add_snapshot(memory_snapshot(i as f64, i as f64));
        }
    }
    let addr = agent.serve().await;

    let body: SeriesResponse = get(addr, "/api/v1/series?points=10").await.json().await.unwrap();
    assert_eq!(body.series.len(), 10);
    assert_eq!(body.series.memory_used_percent.first(), Some(&70.0));
    assert_eq!(body.series.memory_used_percent.last(), Some(&79.0));
    assert_eq!(body.timestamp, 79.0);

    let body: SeriesResponse = get(addr, "/api/v1/series").await.json().await.unwrap();
    assert_eq!(body.series.len(), 60);

    let body: SeriesResponse = get(addr, "/api/v1/series?points=0").await.json().await.unwrap();
    assert_eq!(body.series.len(), 1);

    let body: SeriesResponse = get(addr, "/api/v1/series?points=abc").await.json().await.unwrap();
    assert_eq!(body.series.len(), 60);

    let body: Value = get(addr, "/api/v1/series?points=2").await.json().await.unwrap();
    assert_eq!(body["series"]["networkStatus"], serde_json::json!(["normal", "normal"]));
}

#[tokio::test]
async fn test_series_empty_before_first_sample() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;

    let response = get(addr, "/api/v1/series").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: SeriesResponse = response.json().await.unwrap();
    assert!(body.series.is_empty());
}

#[tokio::test]
async fn test_config_reflects_live_settings() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;

    let body: ConfigResponse = get(addr, "/api/v1/config").await.json().await.unwrap();
    assert_eq!(body.refresh_interval_seconds, 5);
    assert_eq!(body.thresholds.memory_percent, 85.0);
    assert_eq!(body.network_probe_target, "gateway");

    agent.settings.set_refresh_interval_seconds(30);
    agent.settings.set_thresholds(70.0, 75.0, 80.0);
    agent.settings.set_network_probe_target("example.com");

    let body: Value = get(addr, "/api/v1/config").await.json().await.unwrap();
    assert_eq!(body["refreshIntervalSeconds"], 30);
    assert_eq!(body["thresholds"]["cpuPercent"], 75.0);
    assert_eq!(body["networkProbeTarget"], "example.com");
    assert!(body.get("token").is_none());
    assert!(body.get("httpServerToken").is_none());
}

#[tokio::test]
async fn test_token_rotation_applies_immediately() {
    let agent = TestAgent::new(test_settings());
    let addr = agent.serve().await;
    assert_eq!(get(addr, "/api/v1/config").await.status(), StatusCode::OK);

    agent.settings.regenerate_token();
    assert_eq!(get(addr, "/api/v1/config").await.status(), StatusCode::UNAUTHORIZED);

    let token = agent.settings.current().http_server_token;
    let response = reqwest::Client::new()
        .get(url(addr, "/api/v1/config"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_network_down_is_reported() {
    let agent = TestAgent::new(test_settings());
    let coordinator = SamplingCoordinator::new(
        fixed_samplers(10.0, false),
        agent.store.clone(),
        agent.engine.clone(),
        agent.provider(),
        DeviceIdentity::new("local", "Test Mac"),
    );
    // Two failed probes are needed before the network counts as down
    coordinator.sample_now().await;
    let second = coordinator.sample_now().await;
    assert_eq!(second.network.status, NetworkStatus::Down);

    let addr = agent.serve().await;
    let body: Value = get(addr, "/api/v1/status").await.json().await.unwrap();
    assert_eq!(body["metrics"]["network"]["status"], "down");
    assert_eq!(body["metrics"]["network"]["last_ok_timestamp"], 0.0);
}
