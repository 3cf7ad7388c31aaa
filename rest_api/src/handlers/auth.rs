// rest_api/src/handlers/auth.rs
// Account registration and the session lifecycle. The refresh token
// travels only in the HttpOnly `jwt` cookie; the access token only in
// response bodies.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use models::{NewUser, User};
use security::{login_user, logout_user, refresh_session, register_user, AuthError};

use crate::auth::{clear_refresh_cookie, refresh_cookie, refresh_token_from_headers};
use crate::{AppState, RestApiError};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// Handler for POST /api/v1/users/register
pub async fn register_handler(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> Result<impl IntoResponse, RestApiError> {
    let user = User::from_new_user(payload)?;
    let (user, pair) = register_user(&state.store, user, &state.tokens).await?;
    info!(email = %user.email, "new account registered");

    let mut data = user.sanitized();
    data["accessToken"] = json!(pair.access_token);

    let cookie = refresh_cookie(
        &pair.refresh_token,
        state.tokens.refresh_ttl_days,
        state.settings.is_development(),
    );
    Ok((
        StatusCode::CREATED,
        AppendHeaders([cookie]),
        Json(json!({
            "status": "success",
            "message": "User registered successfully",
            "data": data,
        })),
    ))
}

// Handler for POST /api/v1/users/auth
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let presented = refresh_token_from_headers(&headers);
    let (user, pair) = login_user(
        &state.store,
        &payload.email,
        &payload.password,
        presented.as_deref(),
        &state.tokens,
    )
    .await?;
    info!(email = %user.email, "login");

    let mut data = user.sanitized();
    data["accessToken"] = json!(pair.access_token);

    let cookie = refresh_cookie(
        &pair.refresh_token,
        state.tokens.refresh_ttl_days,
        state.settings.is_development(),
    );
    Ok((
        StatusCode::CREATED,
        AppendHeaders([cookie]),
        Json(json!({
            "status": "success",
            "message": "Login successful",
            "data": data,
        })),
    ))
}

// Handler for POST /api/v1/users/logout
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RestApiError> {
    let Some(token) = refresh_token_from_headers(&headers) else {
        // Nothing to retire; still a clean end state for the client.
        return Ok((StatusCode::NO_CONTENT, AppendHeaders([clear_refresh_cookie()])).into_response());
    };

    logout_user(&state.store, &token).await?;
    Ok((
        StatusCode::OK,
        AppendHeaders([clear_refresh_cookie()]),
        Json(json!({
            "status": "success",
            "message": "User logged out successfully",
        })),
    )
        .into_response())
}

// Handler for GET /api/v1/users/refresh
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RestApiError> {
    let token = refresh_token_from_headers(&headers).ok_or(AuthError::MissingCredential)?;
    let (user, pair) = refresh_session(&state.store, &token, &state.tokens).await?;

    let cookie = refresh_cookie(
        &pair.refresh_token,
        state.tokens.refresh_ttl_days,
        state.settings.is_development(),
    );
    Ok((
        StatusCode::CREATED,
        AppendHeaders([cookie]),
        Json(json!({
            "status": "success",
            "message": "Token refreshed",
            "data": { "accessToken": pair.access_token, "role": user.role },
        })),
    ))
}
