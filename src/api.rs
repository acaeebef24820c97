//! HTTP surface for the faucet
//!
//! Thin transport over the orchestrator:
//! - POST /api/v1/claim           - attempt a claim
//! - GET  /api/v1/assets          - active assets
//! - GET  /api/v1/claims/{address} - claim history for a wallet
//! - GET  /health                 - status + queue counts (JSON)
//! - GET  /healthz                - liveness probe
//! - GET  /metrics                - Prometheus metrics
//!
//! Input validation and the request-rate guard (per-IP governor, per-wallet
//! throttle) run here, before the orchestrator is invoked.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use eyre::{eyre, Result, WrapErr};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tracing::info;

use crate::assets::AssetRegistry;
use crate::config::ServerConfig;
use crate::db;
use crate::orchestrator::{ClaimOrchestrator, ClaimOutcome};
use crate::ratelimit::WalletThrottle;
use crate::store::ClaimStore;
use crate::types::{AssetSymbol, ClaimStatus, WalletAddress};

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ClaimOrchestrator>,
    pub registry: Arc<AssetRegistry>,
    pub claims: Arc<dyn ClaimStore>,
    pub throttle: Arc<WalletThrottle>,
    pub db: PgPool,
    pub history_limit: i64,
    pub started_at: Instant,
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub address: String,
    pub asset: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: String,
}

#[derive(Serialize)]
struct AssetInfo {
    symbol: String,
    name: String,
    amount: String,
    decimals: u8,
    cooldown_secs: u64,
}

#[derive(Serialize)]
struct ClaimInfo {
    id: i64,
    asset: String,
    amount: String,
    status: ClaimStatus,
    transfer_ref: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    queues: QueueStatus,
}

#[derive(Serialize)]
struct QueueStatus {
    pending_claims: i64,
    confirmed_claims: i64,
    failed_claims: i64,
}

fn error_response(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            status: kind,
            error: message.into(),
        }),
    )
        .into_response()
}

/// Claim endpoint handler
async fn attempt_claim(
    State(state): State<AppState>,
    Json(request): Json<ClaimRequest>,
) -> Response {
    let wallet = match WalletAddress::parse(&request.address) {
        Ok(wallet) => wallet,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", err.to_string())
        }
    };
    let symbol = match AssetSymbol::parse(&request.asset) {
        Ok(symbol) => symbol,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", err.to_string())
        }
    };

    if !state.throttle.check(&wallet).await {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "throttled",
            "too many requests for this wallet",
        );
    }

    let outcome = state.orchestrator.attempt_claim(&wallet, &symbol).await;
    let status = match &outcome {
        ClaimOutcome::Success { .. } => StatusCode::OK,
        ClaimOutcome::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
        ClaimOutcome::UnsupportedAsset => StatusCode::BAD_REQUEST,
        ClaimOutcome::InsufficientPoolBalance => StatusCode::SERVICE_UNAVAILABLE,
        ClaimOutcome::TransferFailed { .. } => StatusCode::BAD_GATEWAY,
        ClaimOutcome::ConcurrencyConflict => StatusCode::CONFLICT,
        ClaimOutcome::RetryLater => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(outcome)).into_response()
}

/// Active assets, symbol ascending
async fn list_assets(State(state): State<AppState>) -> Json<Vec<AssetInfo>> {
    let assets = state
        .registry
        .list_active()
        .await
        .into_iter()
        .map(|asset| AssetInfo {
            symbol: asset.symbol.to_string(),
            name: asset.name,
            amount: asset.amount,
            decimals: asset.decimals,
            cooldown_secs: asset.cooldown_secs,
        })
        .collect();
    Json(assets)
}

/// Claim history for a wallet, most recent first
async fn claim_history(State(state): State<AppState>, Path(address): Path<String>) -> Response {
    let wallet = match WalletAddress::parse(&address) {
        Ok(wallet) => wallet,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", err.to_string())
        }
    };

    match state.claims.history_for(&wallet, state.history_limit).await {
        Ok(claims) => {
            let history: Vec<ClaimInfo> = claims
                .into_iter()
                .map(|claim| ClaimInfo {
                    id: claim.id,
                    asset: claim.asset,
                    amount: claim.amount,
                    status: claim.status,
                    transfer_ref: claim.transfer_ref,
                    created_at: claim.created_at,
                })
                .collect();
            Json(history).into_response()
        }
        Err(err) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "retry_later",
            err.to_string(),
        ),
    }
}

/// Health check endpoint handler
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let queues = QueueStatus {
        pending_claims: db::count_claims_with_status(&state.db, "pending")
            .await
            .unwrap_or(0),
        confirmed_claims: db::count_claims_with_status(&state.db, "confirmed")
            .await
            .unwrap_or(0),
        failed_claims: db::count_claims_with_status(&state.db, "failed")
            .await
            .unwrap_or(0),
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        queues,
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

/// Start the API server
pub async fn start_api_server(config: &ServerConfig, state: AppState) -> Result<()> {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.ip_replenish_secs)
            .burst_size(config.ip_burst)
            .finish()
            .ok_or_else(|| eyre!("Invalid per-IP rate limiter configuration"))?,
    );

    // The governor keys on peer IP and guards only the claim route; read
    // endpoints stay cheap and unthrottled.
    let claim_route = Router::new()
        .route("/api/v1/claim", post(attempt_claim))
        .layer(GovernorLayer::new(governor_conf));

    let app = Router::new()
        .route("/api/v1/assets", get(list_assets))
        .route("/api/v1/claims/{address}", get(claim_history))
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/metrics", get(prometheus_metrics))
        .merge(claim_route)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| {
            eyre!(
                "Invalid bind address {}:{}: {}",
                config.bind_address,
                config.port,
                e
            )
        })?;
    info!(%addr, "API server started");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .wrap_err("API server error")?;

    Ok(())
}
