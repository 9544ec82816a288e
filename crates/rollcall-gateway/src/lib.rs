//! Realtime gateway service: authenticates websocket sessions, tracks
//! room membership, fans out applied attendance mutations and services
//! queue replay on reconnect.

pub mod messages;
pub mod rooms;
pub mod ws;


use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rollcall_attendance::AttendanceService;
use rollcall_core::auth::JwtConfig;
use rollcall_core::{cache as cache_backend, config, db, http, logging, metrics, server};
use rollcall_sync::{RedisCache, SyncCache, SyncCoordinator};
use serde::Serialize;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::messages::RoomEvent;

const SERVICE_NAME: &str = "rollcall-gateway";
const BROADCAST_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub attendance: AttendanceService,
    pub cache: Arc<dyn SyncCache>,
    pub sync: SyncCoordinator,
    pub jwt: JwtConfig,
    pub realtime_tx: broadcast::Sender<RoomEvent>,
    /// Fired once at process shutdown; sessions close themselves on it so
    /// the graceful drain can complete.
    pub shutdown_tx: broadcast::Sender<()>,
}

pub struct GatewayConfig {
    pub addr: std::net::SocketAddr,
    pub database_url: String,
    pub redis_url: String,
    pub jwt: JwtConfig,
}

pub fn load_config() -> Result<GatewayConfig> {
    let addr = config::socket_addr_from_env("GATEWAY_ADDR", "0.0.0.0:8085")?;
    let database_url = config::required_env("DATABASE_URL")?;
    let redis_url = config::env_or("REDIS_URL", "redis://127.0.0.1:6379");
    let jwt = JwtConfig {
        issuer: config::env_or("JWT_ISSUER", "rollcall"),
        audience: config::env_or("JWT_AUDIENCE", "rollcall-ws"),
        secret: config::required_env("JWT_SECRET")?,
        ttl_seconds: config::env_or("JWT_TTL_SECONDS", "86400").parse()?,
    };
    Ok(GatewayConfig {
        addr,
        database_url,
        redis_url,
        jwt,
    })
}

pub async fn run(config: GatewayConfig) -> Result<()> {
    logging::init(SERVICE_NAME);

    let pool = db::connect(&config.database_url).await?;
    db::migrate(&pool).await?;
    let redis = cache_backend::connect(&config.redis_url).await?;

    let cache: Arc<dyn SyncCache> = Arc::new(RedisCache::new(redis));
    let (realtime_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
    let (shutdown_tx, _) = broadcast::channel(1);

    let state = AppState {
        attendance: AttendanceService::new(pool.clone()),
        sync: SyncCoordinator::new(cache.clone()),
        pool,
        cache,
        jwt: config.jwt,
        realtime_tx,
        shutdown_tx: shutdown_tx.clone(),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_endpoint))
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    let router = http::apply_standard_layers(router, SERVICE_NAME);
    server::serve(config.addr, router, move || {
        let _ = shutdown_tx.send(());
    })
    .await
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    database: &'static str,
    cache: &'static str,
}

/// The durable store is load-bearing; the cache is not. A Redis outage
/// reports as degraded while the service keeps accepting marks.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let database_ok = db::check_ready(&state.pool).await.is_ok();
    let cache_ok = state.cache.check_ready().await.is_ok();

    let status = HealthStatus {
        status: if database_ok { "ok" } else { "unavailable" },
        database: if database_ok { "ok" } else { "unavailable" },
        cache: if cache_ok { "ok" } else { "degraded" },
    };
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn metrics_endpoint() -> impl IntoResponse {
    metrics::metrics_response()
}
