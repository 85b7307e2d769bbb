use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use liane_db::{Database, fmt_ts, queries};
use liane_engine::{LianeMessageService, LianeService};
use liane_gateway::Dispatcher;
use liane_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::join_error;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub lianes: LianeService,
    pub messages: LianeMessageService,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.pseudo.len() < 3 || req.pseudo.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let user_id = Uuid::new_v4();
    let db = state.db.clone();
    let pseudo = req.pseudo.clone();
    let taken = tokio::task::spawn_blocking(move || {
        db.with_conn(|conn| {
            if queries::user_by_pseudo(conn, &pseudo)?.is_some() {
                return Ok(true);
            }
            queries::insert_user(
                conn,
                &user_id.to_string(),
                &pseudo,
                &password_hash,
                &fmt_ts(chrono::Utc::now()),
            )?;
            Ok(false)
        })
    })
    .await
    .map_err(join_error)?
    .map_err(|_: rusqlite::Error| StatusCode::INTERNAL_SERVER_ERROR)?;

    if taken {
        return Err(StatusCode::CONFLICT);
    }

    let token = create_token(&state.jwt_secret, user_id, &req.pseudo)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let pseudo = req.pseudo.clone();
    let user = tokio::task::spawn_blocking(move || {
        db.with_conn(|conn| queries::user_by_pseudo(conn, &pseudo))
    })
    .await
    .map_err(join_error)?
    .map_err(|_: rusqlite::Error| StatusCode::INTERNAL_SERVER_ERROR)?
    .ok_or(StatusCode::UNAUTHORIZED)?;

    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let token = create_token(&state.jwt_secret, user_id, &user.pseudo)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse { user_id, pseudo: user.pseudo, token }))
}

fn create_token(secret: &str, user_id: Uuid, pseudo: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        pseudo: pseudo.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
