//! Webhook, health and admin endpoints over real HTTP.

use axum::http::StatusCode;
use serde_json::Value;

use video_resilience::provider::{AssetStatus, JobStatus};
use video_resilience::store::{AssetStore, UpdateSource};
use video_resilience::webhook::WebhookEnvelope;

mod common;

const READY_EVENT: &str = r#"{"type":"video.asset.ready","id":"evt-1","data":{"id":"asset-1","status":"ready","duration":30.0,"playback_ids":[{"id":"pb-1","policy":"public"}]}}"#;

async fn post_webhook(server: &common::TestServer, payload: &str, signature: Option<String>) -> reqwest::Response {
    let mut request = reqwest::Client::new()
        .post(server.url("/webhooks/video"))
        .header("content-type", "application/json")
        .body(payload.to_string());
    if let Some(signature) = signature {
        request = request.header("mux-signature", signature);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_signed_webhook_is_applied() {
    let server = common::spawn_server(common::test_config("http://127.0.0.1:9/")).await;

    let signature = common::sign(READY_EVENT, common::now_unix(), common::WEBHOOK_SECRET);
    let response = post_webhook(&server, READY_EVENT, Some(signature)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["applied"], true);

    let record = server.state.store.get("asset-1").unwrap();
    assert_eq!(record.status, JobStatus::Ready);
    assert_eq!(record.playback_id.as_deref(), Some("pb-1"));
    assert_eq!(record.source, UpdateSource::Webhook);

    server.stop().await;
}

#[tokio::test]
async fn test_rejected_webhooks_change_nothing() {
    let server = common::spawn_server(common::test_config("http://127.0.0.1:9/")).await;
    let now = common::now_unix();

    // Signed with another secret
    let forged = common::sign(READY_EVENT, now, "some-other-secret");
    assert_eq!(post_webhook(&server, READY_EVENT, Some(forged)).await.status(), StatusCode::UNAUTHORIZED);

    // Payload altered after signing
    let signature = common::sign(READY_EVENT, now, common::WEBHOOK_SECRET);
    let tampered = READY_EVENT.replace("pb-1", "pb-2");
    assert_eq!(post_webhook(&server, &tampered, Some(signature)).await.status(), StatusCode::UNAUTHORIZED);

    // Replayed from an hour ago
    let stale = common::sign(READY_EVENT, now - 3600, common::WEBHOOK_SECRET);
    assert_eq!(post_webhook(&server, READY_EVENT, Some(stale)).await.status(), StatusCode::UNAUTHORIZED);

    // No or garbled signature header
    assert_eq!(post_webhook(&server, READY_EVENT, None).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        post_webhook(&server, READY_EVENT, Some("v1=deadbeef".into())).await.status(),
        StatusCode::BAD_REQUEST
    );

    // Authentic but not an event we can read
    let payload = r#"{"status":"ready"}"#;
    let signature = common::sign(payload, now, common::WEBHOOK_SECRET);
    assert_eq!(post_webhook(&server, payload, Some(signature)).await.status(), StatusCode::BAD_REQUEST);

    assert_eq!(server.state.store.count(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_webhook_secret_hot_reload() {
    let config = common::test_config("http://127.0.0.1:9/");
    let server = common::spawn_server(config.clone()).await;

    let mut reloaded = config;
    reloaded.webhook.secret = "rotated-secret".into();
    server.config_tx.send(reloaded).unwrap();

    let rotated = WebhookEnvelope::from_header(
        b"{}".to_vec(),
        &common::sign("{}", common::now_unix(), "rotated-secret"),
    )
    .unwrap();
    let verifier = server.state.verifier.clone();
    assert!(common::eventually(100, || verifier.load().verify(&rotated).is_verified()).await);

    let old = common::sign(READY_EVENT, common::now_unix(), common::WEBHOOK_SECRET);
    assert_eq!(post_webhook(&server, READY_EVENT, Some(old)).await.status(), StatusCode::UNAUTHORIZED);

    let rotated = common::sign(READY_EVENT, common::now_unix(), "rotated-secret");
    assert_eq!(post_webhook(&server, READY_EVENT, Some(rotated)).await.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn test_health() {
    let server = common::spawn_server(common::test_config("http://127.0.0.1:9/")).await;

    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["circuit_state"], "closed");

    server.stop().await;
}

#[tokio::test]
async fn test_admin_requires_token() {
    let server = common::spawn_server(common::test_config("http://127.0.0.1:9/")).await;
    let client = reqwest::Client::new();

    let response = client.get(server.url("/admin/status")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(server.url("/admin/status"))
        .bearer_auth("wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(server.url("/admin/resilience"))
        .bearer_auth(common::ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["circuit_breaker"]["state"], "closed");

    server.stop().await;
}

#[tokio::test]
async fn test_admin_submit_then_poll_to_ready() {
    let provider = common::start_mock_provider(|_, request| async move {
        if request.method == "POST" {
            (201, common::asset_json("asset-9", "waiting"))
        } else {
            (200, common::asset_json("asset-9", "ready"))
        }
    })
    .await;

    let server = common::spawn_server(common::test_config(&provider.url())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/admin/assets"))
        .bearer_auth(common::ADMIN_KEY)
        .json(&serde_json::json!({ "input_url": "https://cdn.example.com/a.mp4" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["asset_id"], "asset-9");
    assert!(body["poll_session_id"].is_string());

    let store = server.state.store.clone();
    let ready = common::eventually(300, || {
        store
            .get("asset-9")
            .map(|record| record.status == JobStatus::Ready)
            .unwrap_or(false)
    })
    .await;
    assert!(ready);

    let poller = server.state.poller.clone();
    assert!(common::eventually(100, || !poller.is_polling("asset-9")).await);

    let response = client
        .get(server.url("/admin/assets/asset-9"))
        .bearer_auth(common::ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record: Value = response.json().await.unwrap();
    assert_eq!(record["playback_id"], "pb-asset-9");

    server.stop().await;
}

#[tokio::test]
async fn test_admin_poll_control() {
    let provider = common::start_mock_provider(|_, _| async move {
        (200, common::asset_json("asset-slow", "preparing"))
    })
    .await;

    let server = common::spawn_server(common::test_config(&provider.url())).await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.url("/admin/assets/asset-slow/poll"))
        .bearer_auth(common::ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(server.state.poller.is_polling("asset-slow"));

    let response = client
        .delete(server.url("/admin/assets/asset-slow/poll"))
        .bearer_auth(common::ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let poller = server.state.poller.clone();
    assert!(common::eventually(100, || !poller.is_polling("asset-slow")).await);

    let response = client
        .delete(server.url("/admin/assets/asset-slow/poll"))
        .bearer_auth(common::ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn test_terminal_webhook_stops_polling() {
    let provider = common::start_mock_provider(|_, _| async move {
        (200, common::asset_json("asset-1", "preparing"))
    })
    .await;
    let server = common::spawn_server(common::test_config(&provider.url())).await;

    server.state.start_tracking("asset-1");
    assert!(common::eventually(100, || provider.calls() > 0).await);
    assert!(server.state.poller.is_polling("asset-1"));

    let signature = common::sign(READY_EVENT, common::now_unix(), common::WEBHOOK_SECRET);
    let response = post_webhook(&server, READY_EVENT, Some(signature)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let poller = server.state.poller.clone();
    assert!(common::eventually(100, || !poller.is_polling("asset-1")).await);
    assert_eq!(server.state.store.get("asset-1").unwrap().status, JobStatus::Ready);

    server.stop().await;
}

#[tokio::test]
async fn test_unfinished_assets_resume_polling_on_start() {
    let provider = common::start_mock_provider(|_, request| async move {
        let id = request.path.rsplit('/').next().unwrap_or_default().to_string();
        (200, common::asset_json(&id, "preparing"))
    })
    .await;

    let store = AssetStore::new(None);
    for (id, status) in [("asset-pending", JobStatus::Preparing), ("asset-done", JobStatus::Ready)] {
        store.apply_status(
            &AssetStatus {
                asset_id: id.to_string(),
                status,
                playback_id: None,
                duration_secs: None,
            },
            UpdateSource::Submission,
        );
    }

    let server = common::spawn_server_with_store(common::test_config(&provider.url()), store).await;

    let poller = server.state.poller.clone();
    assert!(common::eventually(100, || poller.is_polling("asset-pending")).await);
    assert!(!poller.is_polling("asset-done"));

    server.stop().await;
}

#[tokio::test]
async fn test_health_reports_degraded_when_circuit_open() {
    let provider = common::start_mock_provider(|_, _| async move {
        (500, r#"{"error":"boom"}"#.to_string())
    })
    .await;
    let server = common::spawn_server(common::test_config(&provider.url())).await;

    let client = server.state.client.clone();
    let result = server
        .state
        .context
        .execute("asset_status", None, || client.asset_status("asset-1"))
        .await;
    assert!(result.is_err());
    assert_eq!(provider.calls(), 3);

    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["circuit_state"], "open");

    server.stop().await;
}

#[tokio::test]
async fn test_polling_unknown_asset_leaves_no_record() {
    let provider = common::start_mock_provider(|_, _| async move {
        (404, r#"{"error":{"type":"not_found"}}"#.to_string())
    })
    .await;
    let server = common::spawn_server(common::test_config(&provider.url())).await;

    let response = reqwest::Client::new()
        .post(server.url("/admin/assets/bogus-id/poll"))
        .bearer_auth(common::ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let poller = server.state.poller.clone();
    assert!(common::eventually(100, || provider.calls() > 0 && !poller.is_polling("bogus-id")).await);
    assert!(server.state.store.get("bogus-id").is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_failed_submission_is_not_repeated() {
    let provider = common::start_mock_provider(|_, _| async move {
        (503, r#"{"error":"unavailable"}"#.to_string())
    })
    .await;
    let server = common::spawn_server(common::test_config(&provider.url())).await;

    let response = reqwest::Client::new()
        .post(server.url("/admin/assets"))
        .bearer_auth(common::ADMIN_KEY)
        .json(&serde_json::json!({ "input_url": "https://cdn.example.com/a.mp4" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(provider.calls(), 1);
    assert_eq!(server.state.store.count(), 0);

    server.stop().await;
}
