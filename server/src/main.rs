use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod dispatch;
mod games;
mod lobbies;
mod persist;
mod sessions;
mod ws;

use auth::{AuthService, Credentials};
use config::Config;
use games::GameManager;
use lobbies::LobbyManager;
use persist::Snapshots;
use sessions::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionRegistry>,
    pub lobbies: Arc<LobbyManager>,
    pub games: Arc<GameManager>,
    pub snapshots: Arc<Snapshots>,
}

impl AppState {
    pub fn new(config: Config) -> AppState {
        let snapshots = Snapshots::new(config.database_url.as_deref());
        let auth = AuthService::new(snapshots.load_users());

        AppState {
            config: Arc::new(config),
            auth: Arc::new(auth),
            sessions: Arc::new(SessionRegistry::new()),
            lobbies: Arc::new(LobbyManager::new()),
            games: Arc::new(GameManager::new()),
            snapshots: Arc::new(snapshots),
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    let filter = config
        .log_level
        .clone()
        .map(EnvFilter::new)
        .unwrap_or_else(|| {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=info".into())
        });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = config.bind_address();
    let state = AppState::new(config);

    let app = Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/ws", get(ws::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("listening on {addr}");

    let listener = TcpListener::bind(addr).await.unwrap();

    axum::serve(listener, app).await.unwrap();
}

async fn register(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Response {
    match state
        .auth
        .register(&credentials.username, &credentials.password)
    {
        Ok(response) => {
            state.snapshots.record_users(&state.auth.export_users());
            tracing::info!(username = %response.username, "user registered");

            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn login(State(state): State<AppState>, Json(credentials): Json<Credentials>) -> Response {
    match state
        .auth
        .login(&credentials.username, &credentials.password)
    {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct StatsResponse {
    connections: ConnectionStats,
    games: GameStats,
    lobbies: LobbyStats,
}

#[derive(Serialize)]
struct ConnectionStats {
    total: usize,
    active: usize,
    inactive: usize,
}

#[derive(Serialize)]
struct GameStats {
    active_games: usize,
}

#[derive(Serialize)]
struct LobbyStats {
    open_lobbies: usize,
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let (total, active, inactive) = state.sessions.counts();

    Json(StatsResponse {
        connections: ConnectionStats {
            total,
            active,
            inactive,
        },
        games: GameStats {
            active_games: state.games.active_count(),
        },
        lobbies: LobbyStats {
            open_lobbies: state.lobbies.open_count(),
        },
    })
}
