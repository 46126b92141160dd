//! HTTP surface: `POST /sign` and `GET /health`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::hsm::Token;
use crate::service::{SigningMode, SigningService};

/// Query string of `POST /sign`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignQuery {
    /// `self-signed` (also when absent or empty) or `ca`.
    pub mode: Option<String>,
}

/// Request to sign document bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    /// Document bytes (standard base64)
    pub encoded_contents: String,
}

/// Detached PKCS#7 signature, or `null` when none could be made
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// Base64 of the DER ContentInfo
    pub p7: Option<String>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

// ==================== Error Handling ====================

pub struct ApiError(pub StatusCode, pub Json<ErrorResponse>);

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: msg.into() }),
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: msg.into() }),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

// ==================== Handlers ====================

/// Health check
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Sign the posted document under the certificate selected by `mode`.
///
/// Signing failures are reported as `{"p7": null}` with status 200; only
/// malformed requests are rejected.
pub async fn sign<T>(
    State(service): State<Arc<SigningService<T>>>,
    Query(query): Query<SignQuery>,
    Json(request): Json<SignRequest>,
) -> Result<Json<SignResponse>, ApiError>
where
    T: Token + Send + Sync + 'static,
{
    let mode = match query.mode.as_deref() {
        None | Some("") => SigningMode::default(),
        Some(mode) => mode
            .parse::<SigningMode>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?,
    };

    let content = STANDARD
        .decode(&request.encoded_contents)
        .map_err(|e| ApiError::bad_request(format!("Invalid base64 data: {}", e)))?;

    info!(%mode, content_len = content.len(), "signing request");

    // The HSM calls block; keep them off the async workers.
    let signed = tokio::task::spawn_blocking(move || service.sign(mode, &content))
        .await
        .map_err(|e| ApiError::internal(format!("Signing task failed: {}", e)))?;

    let p7 = match signed {
        Ok(p7) => p7,
        Err(e) => {
            error!(%mode, error = %e, "signing failed");
            None
        }
    };

    Ok(Json(SignResponse {
        p7: p7.map(|der| STANDARD.encode(der)),
    }))
}

/// Create and configure the Axum router
pub fn create_router<T>(service: Arc<SigningService<T>>) -> Router
where
    T: Token + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/sign", post(sign::<T>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Run the HTTP server until Ctrl+C or SIGTERM.
pub async fn run<T>(
    listener: tokio::net::TcpListener,
    service: Arc<SigningService<T>>,
) -> std::io::Result<()>
where
    T: Token + Send + Sync + 'static,
{
    info!(
        "signing service listening on {}",
        listener
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
    );

    axum::serve(listener, create_router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Wait for SIGTERM or SIGINT signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Starting graceful shutdown...");
}
