//! HTTP API and device registry for the devauth server.

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{
    DeviceRecord, DeviceRegistry, MemoryRegistry, SqliteRegistry, AUTHORIZED_MESSAGE,
    UNAUTHORIZED_MESSAGE,
};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use devauth_crypto::WireCipher;
use devauth_types::{EncryptedEnvelope, ErrorDetail, HeartbeatRequest, HEARTBEAT_PATH};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Detail sent when a heartbeat does not decrypt.
pub const DECRYPTION_FAILED_DETAIL: &str = "decryption failed, cannot verify device";

/// Detail sent when the verdict cannot be sealed.
pub const ENCRYPTION_FAILED_DETAIL: &str = "failed to encrypt response";

/// Detail sent when the registry fails.
pub const REGISTRY_FAILED_DETAIL: &str = "failed to record device";

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub cipher: Arc<WireCipher>,
    pub registry: Arc<dyn DeviceRegistry>,
}

impl AppState {
    pub fn new(cipher: WireCipher, registry: Arc<dyn DeviceRegistry>) -> Self {
        Self {
            cipher: Arc::new(cipher),
            registry,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorDetail::new(message))).into_response()
}

async fn heartbeat_handler(
    State(state): State<AppState>,
    Json(envelope): Json<EncryptedEnvelope>,
) -> Response {
    let Some(request) = state
        .cipher
        .open::<HeartbeatRequest>(&envelope.encrypted_data)
    else {
        warn!("Rejected heartbeat that did not decrypt");
        return detail(StatusCode::FORBIDDEN, DECRYPTION_FAILED_DETAIL);
    };

    let registry = Arc::clone(&state.registry);
    let device_id = request.device_id.clone();
    let record = match tokio::task::spawn_blocking(move || registry.record_heartbeat(&request)).await
    {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => {
            error!("Failed to record heartbeat for {}: {}", device_id, e);
            return detail(StatusCode::INTERNAL_SERVER_ERROR, REGISTRY_FAILED_DETAIL);
        }
        Err(e) => {
            error!("Heartbeat task for {} failed: {}", device_id, e);
            return detail(StatusCode::INTERNAL_SERVER_ERROR, REGISTRY_FAILED_DETAIL);
        }
    };
    debug!(
        "Heartbeat from {} (authorized: {})",
        record.device_id, record.is_authorized
    );

    match state.cipher.seal(&record.verdict()) {
        Ok(token) => (StatusCode::OK, Json(EncryptedEnvelope::new(token))).into_response(),
        Err(e) => {
            error!("Failed to seal verdict for {}: {}", device_id, e);
            detail(StatusCode::INTERNAL_SERVER_ERROR, ENCRYPTION_FAILED_DETAIL)
        }
    }
}

/// Build the HTTP API router with the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(HEARTBEAT_PATH, post(heartbeat_handler))
        .with_state(state)
}

/// Serve the API on `listener` until the process exits.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP API listening on {}", addr);
    }
    axum::serve(listener, build_router(state)).await
}
