use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use liane_types::api::{Claims, CreateLianeRequest, UpdateLianeRequest};

use crate::auth::AppState;
use crate::{engine_status, join_error};

pub async fn create_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateLianeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    // Creation may call the routing backend, so it runs off the async runtime.
    let created = tokio::task::spawn_blocking(move || service.create(user, req))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let listed = tokio::task::spawn_blocking(move || service.list(user))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(listed))
}

pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let found = tokio::task::spawn_blocking(move || service.get(user, id))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(found))
}

pub async fn update_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<UpdateLianeRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let updated = tokio::task::spawn_blocking(move || service.update(user, id, patch))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(updated))
}

pub async fn delete_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    tokio::task::spawn_blocking(move || service.delete(user, id))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_liane(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let liane = tokio::task::spawn_blocking(move || service.get_liane(user, id))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(liane))
}

pub async fn join(
    State(state): State<AppState>,
    Path((liane_id, request_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let filed = tokio::task::spawn_blocking(move || service.join_request(user, request_id, liane_id))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(filed))
}

pub async fn accept(
    State(state): State<AppState>,
    Path((liane_id, request_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let liane = tokio::task::spawn_blocking(move || service.accept(user, request_id, liane_id))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(liane))
}

pub async fn reject(
    State(state): State<AppState>,
    Path((liane_id, request_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    tokio::task::spawn_blocking(move || service.reject(user, request_id, liane_id))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave(
    State(state): State<AppState>,
    Path(liane_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let left = tokio::task::spawn_blocking(move || service.leave(user, liane_id))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(left))
}
