use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use liane_types::api::{Claims, MarkReadRequest, Pagination, SendMessageRequest};

use crate::auth::AppState;
use crate::{engine_status, join_error};

pub async fn get_messages(
    State(state): State<AppState>,
    Path(liane_id): Path<Uuid>,
    Query(page): Query<Pagination>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.messages.clone();
    let user = claims.sub;
    let messages = tokio::task::spawn_blocking(move || service.get_messages(user, liane_id, &page))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(messages))
}

/// Returns the created message, or null when the text was empty and the
/// message was dropped.
pub async fn send_message(
    State(state): State<AppState>,
    Path(liane_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.messages.clone();
    let user = claims.sub;
    let sent = tokio::task::spawn_blocking(move || service.send_message(user, liane_id, &req.text))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok((StatusCode::CREATED, Json(sent)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(liane_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.messages.clone();
    let user = claims.sub;
    tokio::task::spawn_blocking(move || service.mark_as_read(user, liane_id, req.timestamp))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.messages.clone();
    let user = claims.sub;
    let counts = tokio::task::spawn_blocking(move || service.unread_counts(user))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(counts))
}
