use std::sync::Arc;
use devauth_crypto::WireCipher;
use devauth_server::{
    build_router, AppState, DeviceRegistry, HealthResponse, MemoryRegistry,
    DECRYPTION_FAILED_DETAIL,
};
use devauth_types::{
    DeviceId, EncryptedEnvelope, ErrorDetail, HeartbeatRequest, HeartbeatResponse,
};
use serde_json::json;

const SECRET: &str = "server-test-secret";

fn cipher() -> WireCipher {
    WireCipher::new(SECRET).unwrap()
}

/// Spin up the HTTP server on an OS-assigned port, returning the base URL
/// and the registry behind it.
async fn spawn_test_server() -> (String, Arc<MemoryRegistry>) {
    let registry = Arc::new(MemoryRegistry::new());
    let app = build_router(AppState::new(cipher(), registry.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://127.0.0.1:{}", port), registry)
}

fn heartbeat(device_id: &str, software_name: Option<&str>) -> HeartbeatRequest {
    HeartbeatRequest {
        device_id: DeviceId::new(device_id).unwrap(),
        software_name: software_name.map(String::from),
        device_info: Some(json!({"hostname": "box"})),
    }
}

async fn post_sealed(base: &str, request: &HeartbeatRequest) -> reqwest::Response {
    let envelope = EncryptedEnvelope::new(cipher().seal(request).unwrap());
    reqwest::Client::new()
        .post(format!("{}/api/auth/heartbeat", base))
        .json(&envelope)
        .send()
        .await
        .unwrap()
}

async fn verdict(resp: reqwest::Response) -> HeartbeatResponse {
    assert_eq!(resp.status(), 200);
    let envelope: EncryptedEnvelope = resp.json().await.unwrap();
    cipher().open(&envelope.encrypted_data).unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: HealthResponse = resp.json().await.unwrap();
    assert_eq!(body.status, "ok");
}

#[tokio::test]
async fn first_heartbeat_registers_authorized_device() {
    let (base, registry) = spawn_test_server().await;
    let resp = post_sealed(&base, &heartbeat("dev-1", Some("app"))).await;

    let body = verdict(resp).await;
    assert!(body.authorized);
    assert_eq!(body.message, "device authorized");

    let record = registry.get("dev-1").unwrap().unwrap();
    assert!(record.is_authorized);
    assert_eq!(record.software_name.as_deref(), Some("app"));
    assert_eq!(record.device_info, Some(json!({"hostname": "box"})));
    assert!(record.last_check.is_some());
}

#[tokio::test]
async fn revoked_device_is_told_so() {
    let (base, registry) = spawn_test_server().await;
    verdict(post_sealed(&base, &heartbeat("dev-2", None)).await).await;
    registry.set_authorized("dev-2", false).unwrap();

    let body = verdict(post_sealed(&base, &heartbeat("dev-2", None)).await).await;
    assert!(!body.authorized);
    assert_eq!(body.message, "device not authorized");
}

#[tokio::test]
async fn heartbeat_never_re_authorizes() {
    let (base, registry) = spawn_test_server().await;
    verdict(post_sealed(&base, &heartbeat("dev-3", Some("app"))).await).await;
    registry.set_authorized("dev-3", false).unwrap();

    for _ in 0..3 {
        verdict(post_sealed(&base, &heartbeat("dev-3", Some("app"))).await).await;
    }
    assert!(!registry.get("dev-3").unwrap().unwrap().is_authorized);
}

#[tokio::test]
async fn absent_fields_keep_stored_values() {
    let (base, registry) = spawn_test_server().await;
    verdict(post_sealed(&base, &heartbeat("dev-4", Some("app"))).await).await;

    let bare = HeartbeatRequest {
        device_id: DeviceId::new("dev-4").unwrap(),
        software_name: None,
        device_info: None,
    };
    verdict(post_sealed(&base, &bare).await).await;

    let record = registry.get("dev-4").unwrap().unwrap();
    assert_eq!(record.software_name.as_deref(), Some("app"));
    assert_eq!(record.device_info, Some(json!({"hostname": "box"})));
}

#[tokio::test]
async fn undecryptable_heartbeat_is_forbidden() {
    let (base, registry) = spawn_test_server().await;
    let wrong = WireCipher::new("not-the-secret").unwrap();
    let envelope = EncryptedEnvelope::new(wrong.seal(&heartbeat("dev-5", None)).unwrap());

    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/heartbeat", base))
        .json(&envelope)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 403);
    let body: ErrorDetail = resp.json().await.unwrap();
    assert_eq!(body.detail, DECRYPTION_FAILED_DETAIL);
    assert!(registry.list().unwrap().is_empty());
}

#[tokio::test]
async fn garbage_token_is_forbidden() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/heartbeat", base))
        .json(&json!({"encrypted_data": "AAAA"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn sealed_non_heartbeat_is_forbidden() {
    let (base, _) = spawn_test_server().await;
    let envelope = EncryptedEnvelope::new(cipher().seal(&json!({"hello": "world"})).unwrap());
    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/heartbeat", base))
        .json(&envelope)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn missing_envelope_is_rejected() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/auth/heartbeat", base))
        .json(&json!({"device_id": "plain"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn heartbeat_requires_post() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::get(format!("{}/api/auth/heartbeat", base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let (base, _) = spawn_test_server().await;
    let resp = reqwest::get(format!("{}/api/v1/nonexistent", base))
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn response_content_type_is_json() {
    let (base, _) = spawn_test_server().await;
    let resp = post_sealed(&base, &heartbeat("dev-6", None)).await;
    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.contains("application/json"));
}
