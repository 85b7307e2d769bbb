use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use liane_types::api::{Claims, CreateTripRequest};

use crate::auth::AppState;
use crate::{engine_status, join_error};

pub async fn create_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTripRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let trip = tokio::task::spawn_blocking(move || {
        service.create_trip(user, req.liane_id, req.way_points, req.departure_time)
    })
    .await
    .map_err(join_error)?
    .map_err(engine_status)?;

    Ok((StatusCode::CREATED, Json(trip)))
}

pub async fn join_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let service = state.lianes.clone();
    let user = claims.sub;
    let joined = tokio::task::spawn_blocking(move || service.join_trip(user, trip_id))
        .await
        .map_err(join_error)?
        .map_err(engine_status)?;

    Ok(Json(joined))
}
