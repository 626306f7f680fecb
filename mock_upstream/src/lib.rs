//! Stand-in for a text-generation inference endpoint.
//!
//! Echoes `inputs` back as `generated_text` in one of the response shapes real
//! endpoints produce, so the relay can be exercised without network access or
//! an API token.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Shape {
    /// `[{"generated_text": ...}]`
    #[default]
    List,
    /// `{"generated_text": ...}`
    Object,
    /// `{"error": "model loading"}`
    Error,
    /// `[]`
    Empty,
    /// A plain-text body that is not JSON.
    Text,
}

#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub shape: Shape,
    pub prefix: String,
    /// When set, requests must carry exactly this `Authorization` value.
    pub authorization: Option<String>,
    pub delay: Duration,
}

#[derive(serde::Deserialize, Debug)]
struct GenerateRequest {
    inputs: String,
}

pub fn router(config: MockConfig) -> Router {
    Router::new()
        .route("/", post(generate_handler))
        .layer(DefaultBodyLimit::disable())
        .with_state(Arc::new(config))
}

/// Serves the mock on an ephemeral local port in the background.
pub async fn spawn(config: MockConfig) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(config);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Mock upstream stopped: {:?}", e);
        }
    });
    Ok(addr)
}

/// Resolves on Ctrl-C or SIGTERM. A listener that cannot be installed never
/// fires, so a setup failure does not stop the server.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {:?}", e);
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
    tracing::info!("Shutdown signal received");
}

#[instrument(skip_all, fields(shape = ?config.shape))]
async fn generate_handler(
    State(config): State<Arc<MockConfig>>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if let Some(expected) = &config.authorization {
        let provided = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            tracing::warn!("Rejecting request with wrong authorization");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "unauthorized"})),
            )
                .into_response();
        }
    }

    if !config.delay.is_zero() {
        tokio::time::sleep(config.delay).await;
    }

    let text = format!("{}{}", config.prefix, request.inputs);
    tracing::info!("Generated {} bytes", text.len());

    match config.shape {
        Shape::List => Json(json!([{ "generated_text": text }])).into_response(),
        Shape::Object => Json(json!({ "generated_text": text })).into_response(),
        Shape::Error => Json(json!({"error": "model loading"})).into_response(),
        Shape::Empty => Json(json!([])).into_response(),
        Shape::Text => text.into_response(),
    }
}
