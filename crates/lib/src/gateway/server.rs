//! Gateway HTTP server: `POST /callback` for LINE webhooks and `GET /` for probes.

use crate::analysis::DifyClient;
use crate::channels::signature::{verify_signature, SIGNATURE_HEADER};
use crate::channels::{LineClient, WebhookPayload};
use crate::config::Config;
use crate::handler::Handler;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared state for the gateway (config and the event handler).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub handler: Handler,
}

impl GatewayState {
    /// Build state with the real LINE and Dify clients.
    pub fn from_config(config: Config) -> Result<Self> {
        let line = LineClient::new(&config.line).context("building LINE client")?;
        let dify = DifyClient::new(&config.analysis).context("building Dify client")?;
        let handler = Handler::new(Arc::new(line), Arc::new(dify), config.messages.clone());
        Ok(Self {
            config: Arc::new(config),
            handler,
        })
    }
}

/// Routes served by the gateway.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/callback", post(callback))
        .with_state(state)
}

/// Bind and serve until SIGINT or SIGTERM. Credentials must already be applied to `config`.
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.bind.trim(), config.server.port);
    log::info!(
        "analysis strategy: {:?}, endpoint: {}",
        config.analysis.strategy,
        config.analysis.api_url.as_deref().unwrap_or("(unset)")
    );
    let state = GatewayState::from_config(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining in-flight callbacks");
}

/// POST /callback: verify `X-Line-Signature`, parse the events and handle them before answering.
/// 400 on a missing or bad signature (nothing else happens), 500 on an unparseable body, else 200 `OK`.
async fn callback(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let request_id = uuid::Uuid::new_v4();
    let Some(secret) = state.config.line.channel_secret.as_deref() else {
        log::error!("callback {}: channel secret not configured, rejecting", request_id);
        return (StatusCode::BAD_REQUEST, "Bad Request");
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if signature.is_empty() || !verify_signature(secret, &body, signature) {
        log::warn!("callback {}: invalid signature", request_id);
        return (StatusCode::BAD_REQUEST, "Bad Request");
    }
    log::debug!(
        "callback {}: request body: {}",
        request_id,
        String::from_utf8_lossy(&body)
    );

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::error!("callback {}: parsing webhook body failed: {}", request_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }
    };
    log::info!("callback {}: {} event(s)", request_id, payload.events.len());
    state.handler.dispatch(payload).await;
    (StatusCode::OK, "OK")
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.server.port,
    }))
}
