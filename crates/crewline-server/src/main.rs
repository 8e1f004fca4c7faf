use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crewline_api::error::ApiError;
use crewline_api::middleware::{decode_claims, require_auth};
use crewline_api::{AppState, AppStateInner, channels, compliance, messages, moderation, search};
use crewline_db::{DurableStore, MemoryStore, Store, StoreHealth};
use crewline_gateway::{Broadcaster, ConnectionRegistry, handle_connection};
use crewline_types::api::{HealthResponse, HealthStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crewline=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CREWLINE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let host = std::env::var("CREWLINE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CREWLINE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Store selection: durable when a database path is configured and opens
    // cleanly, otherwise the in-memory fallback. /health reports which one.
    let store: Arc<dyn Store> = match std::env::var("CREWLINE_DB_PATH") {
        Ok(path) => match DurableStore::open(&PathBuf::from(&path)) {
            Ok(durable) => {
                info!("durable store at {path}");
                Arc::new(durable)
            }
            Err(e) => {
                warn!("failed to open durable store at {path}: {e}; using in-memory store");
                Arc::new(MemoryStore::new())
            }
        },
        Err(_) => {
            warn!("CREWLINE_DB_PATH not set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = ConnectionRegistry::new();
    let broadcaster = Broadcaster::new(registry.clone(), store.clone());
    let state: AppState = Arc::new(AppStateInner {
        store,
        broadcaster,
        registry,
        jwt_secret,
    });

    let protected_routes = Router::new()
        .route("/channels", get(channels::list_channels))
        .route("/channels", post(channels::create_channel))
        .route("/channels/{channel_id}", patch(channels::update_channel))
        .route("/channels/{channel_id}/members", post(channels::add_member))
        .route("/channels/{channel_id}/members", delete(channels::remove_member))
        .route("/channels/{channel_id}/messages", get(messages::get_messages))
        .route("/channels/{channel_id}/messages", post(messages::send_message))
        .route("/channels/{channel_id}/analytics", get(search::channel_analytics))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/messages/{message_id}/reactions", post(messages::add_reaction))
        .route("/messages/{message_id}/read", post(messages::mark_read))
        .route("/messages/{message_id}/flag", post(moderation::flag_message))
        .route("/moderation/cases", get(moderation::list_cases))
        .route("/moderation/cases/{case_id}", patch(moderation::review_case))
        .route("/moderation/audit", get(moderation::list_audit))
        .route("/search", get(search::search_messages))
        .route("/compliance/requests", post(compliance::submit_request))
        .route("/compliance/requests/{request_id}", get(compliance::get_request))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .route("/health", get(health))
        .route("/gateway", get(ws_upgrade))
        .merge(protected_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("crewline listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.clone();
    let health = tokio::task::spawn_blocking(move || store.health())
        .await
        .unwrap_or(StoreHealth {
            durable: false,
            tables_exist: false,
        });
    Json(HealthResponse {
        status: if health.is_healthy() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unavailable
        },
        tables_exist: health.tables_exist,
    })
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

/// WebSocket upgrade. Browsers cannot set headers on the upgrade request,
/// so the JWT rides in the query string.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let claims = decode_claims(&query.token, &state.jwt_secret)?;
    let identity = claims.summary();

    Ok(ws.on_upgrade(move |socket| {
        handle_connection(
            socket,
            state.registry.clone(),
            state.broadcaster.clone(),
            identity,
        )
    }))
}
