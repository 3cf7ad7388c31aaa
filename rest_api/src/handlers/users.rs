// rest_api/src/handlers/users.rs

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use models::Role;
use security::{authorize, AuthError};
use storage::UserChanges;

use crate::auth::Identity;
use crate::{AppState, RestApiError};

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub user_id: Uuid,
    pub role: Role,
}

// Handler for GET /api/v1/users/me
pub async fn current_user_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    let user = state
        .store
        .find_user_by_id(actor.id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    Ok(Json(json!({
        "status": "success",
        "data": user.sanitized(),
    })))
}

// Handler for GET /api/v1/users
pub async fn list_users_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Admin])?;

    let users = state.store.list_users().await?;
    let data: Vec<_> = users.iter().map(|user| user.sanitized()).collect();

    Ok(Json(json!({
        "status": "success",
        "count": data.len(),
        "data": data,
    })))
}

// Handler for PUT /api/v1/users/role
pub async fn update_role_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Admin])?;

    let user = state
        .store
        .update_user(
            payload.user_id,
            UserChanges {
                role: Some(payload.role),
                ..Default::default()
            },
        )
        .await?;
    info!(user = %user.email, role = %user.role, "role overridden by admin");

    Ok(Json(json!({
        "status": "success",
        "message": "User role updated successfully",
        "data": user.sanitized(),
    })))
}
