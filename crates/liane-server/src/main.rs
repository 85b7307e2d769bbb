use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use liane_api::auth::{self, AppState, AppStateInner};
use liane_api::dispatch::GatewayDispatch;
use liane_api::middleware::require_auth;
use liane_api::{lianes, messages, trips};
use liane_engine::{LianeMessageService, LianeService, OsrmRouting};
use liane_gateway::connection;
use liane_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "liane=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("LIANE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("LIANE_DB_PATH").unwrap_or_else(|_| "liane.db".into());
    let host = std::env::var("LIANE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("LIANE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let osrm_url = std::env::var("LIANE_OSRM_URL")
        .unwrap_or_else(|_| "https://router.project-osrm.org".into());

    // Init database
    let db = Arc::new(liane_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let dispatch = Arc::new(GatewayDispatch::new(dispatcher.clone()));
    let routing = Arc::new(OsrmRouting::new(osrm_url));
    let liane_service = LianeService::new(db.clone(), routing, dispatch.clone());
    let message_service = LianeMessageService::new(db.clone(), dispatch);

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        lianes: liane_service,
        messages: message_service,
        dispatcher: dispatcher.clone(),
        jwt_secret: jwt_secret.clone(),
    });

    let state = ServerState { dispatcher, jwt_secret };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/lianes/requests", post(lianes::create_request))
        .route("/lianes/requests", get(lianes::list_requests))
        .route("/lianes/requests/{id}", get(lianes::get_request))
        .route("/lianes/requests/{id}", patch(lianes::update_request))
        .route("/lianes/requests/{id}", axum::routing::delete(lianes::delete_request))
        .route("/lianes/{liane_id}", get(lianes::get_liane))
        .route("/lianes/{liane_id}/join/{request_id}", post(lianes::join))
        .route("/lianes/{liane_id}/accept/{request_id}", post(lianes::accept))
        .route("/lianes/{liane_id}/reject/{request_id}", post(lianes::reject))
        .route("/lianes/{liane_id}/leave", post(lianes::leave))
        .route("/lianes/{liane_id}/messages", get(messages::get_messages))
        .route("/lianes/{liane_id}/messages", post(messages::send_message))
        .route("/lianes/{liane_id}/read", post(messages::mark_read))
        .route("/lianes/unread", get(messages::unread_counts))
        .route("/trips", post(trips::create_trip))
        .route("/trips/{id}/join", post(trips::join_trip))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Liane server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
