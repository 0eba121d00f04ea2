//! Authentication: registration, login, and the bearer-token extractor.
//!
//! Tokens are HS256 JWTs with a 24 hour expiry and `sub` carrying the
//! user id.

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, ApiResult, AppState};
use crate::error::DomainError;

const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user_id: Uuid,
    pub email: String,
    pub username: String,
    pub token_type: &'static str,
}

pub fn create_token(secret: &str, user_id: Uuid) -> Result<String, DomainError> {
    let expiry = Utc::now() + Duration::hours(TOKEN_LIFETIME_HOURS);
    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiry.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| DomainError::Auth(format!("token creation failed: {}", e)))
}

pub fn decode_user_id(secret: &str, token: &str) -> Result<Uuid, DomainError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            DomainError::Auth("Token expired".into())
        }
        _ => DomainError::Auth("Invalid token".into()),
    })?;

    Uuid::parse_str(&data.claims.sub).map_err(|_| DomainError::Auth("Invalid token".into()))
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if state.db.user_exists(&request.email, &request.username).await? {
        return Err(DomainError::Validation("User already exists".into()).into());
    }

    let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)
        .map_err(|e| DomainError::Crypto(format!("password hashing failed: {}", e)))?;

    let user = state
        .db
        .create_user(&request.email, &request.username, &password_hash)
        .await?;

    let access_token = create_token(&state.jwt_secret, user.id)?;
    tracing::info!("User registered: {}", user.email);

    Ok(Json(AuthResponse {
        access_token,
        user_id: user.id,
        email: user.email,
        username: user.username,
        token_type: "bearer",
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = state
        .db
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(|| DomainError::Auth("Invalid credentials".into()))?;

    let valid = bcrypt::verify(&request.password, &user.password_hash)
        .map_err(|e| DomainError::Crypto(format!("password verification failed: {}", e)))?;
    if !valid {
        return Err(DomainError::Auth("Invalid credentials".into()).into());
    }
    if !user.is_active {
        return Err(DomainError::Auth("User is inactive".into()).into());
    }

    let access_token = create_token(&state.jwt_secret, user.id)?;
    tracing::info!("User logged in: {}", user.email);

    Ok(Json(AuthResponse {
        access_token,
        user_id: user.id,
        email: user.email,
        username: user.username,
        token_type: "bearer",
    }))
}

/// Authenticated caller, extracted from the Authorization header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| DomainError::Auth("Missing authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| DomainError::Auth("Invalid authorization header".into()))?;

        let user_id = decode_user_id(&state.jwt_secret, token)?;
        Ok(AuthUser(user_id))
    }
}
