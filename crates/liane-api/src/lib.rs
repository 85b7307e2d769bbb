//! HTTP handlers for the liane REST surface.

pub mod auth;
pub mod dispatch;
pub mod lianes;
pub mod messages;
pub mod middleware;
pub mod trips;

use axum::http::StatusCode;
use tracing::{error, warn};

use liane_engine::EngineError;

pub use auth::{AppState, AppStateInner};

/// Maps engine errors onto HTTP statuses. Anything unexpected is logged
/// here so handlers can stay terse.
pub(crate) fn engine_status(err: EngineError) -> StatusCode {
    match err {
        EngineError::NotFound => StatusCode::NOT_FOUND,
        EngineError::Unauthorized => StatusCode::FORBIDDEN,
        EngineError::Validation(reason) => {
            warn!("rejected request: {}", reason);
            StatusCode::BAD_REQUEST
        }
        other => {
            error!("engine error: {}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn join_error(err: tokio::task::JoinError) -> StatusCode {
    error!("spawn_blocking join error: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}
