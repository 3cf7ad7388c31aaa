// rest_api/src/handlers/admin.rs
// Admin surface: professional validation, account management and the
// oversight reads. Every handler sits behind the admin role gate.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use models::{
    Doctor, DoctorProfileInput, Laboratory, LaboratoryProfileInput, Role,
};
use security::{authorize, AuthError};
use storage::{DoctorFilter, LaboratoryFilter, PermissionFilter, UserChanges};

use crate::auth::Identity;
use crate::{AppState, RestApiError};

#[derive(Debug, Deserialize)]
pub struct ValidateProfessionalRequest {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountAction {
    Activate,
    Deactivate,
    ChangeRole,
}

#[derive(Debug, Deserialize)]
pub struct ManageUserRequest {
    pub user_id: Uuid,
    pub action: AccountAction,
    pub new_role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionListQuery {
    pub patient_id: Option<Uuid>,
}

// Handler for POST /api/v1/admin/validate-professional
//
// Approves a doctor or laboratory. A missing profile row is created on
// the spot so validation can precede the professional's own paperwork.
pub async fn validate_professional_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<ValidateProfessionalRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Admin])?;

    let user = state
        .store
        .find_user_by_id(payload.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    if !matches!(payload.role, Role::Doctor | Role::Laboratory) {
        return Err(RestApiError::InvalidInput(
            "Invalid role. Can only validate doctors and laboratories".to_string(),
        ));
    }
    if user.role != payload.role {
        return Err(RestApiError::InvalidInput(format!(
            "User role is not {}",
            payload.role.as_str()
        )));
    }

    let now = Utc::now();
    match payload.role {
        Role::Doctor => {
            let mut doctor = match state.store.find_doctor_by_user_id(user.id).await? {
                Some(doctor) => doctor,
                None => {
                    // Skeleton profile; the doctor fills in the details later.
                    let input = DoctorProfileInput {
                        specialization: String::new(),
                        license_number: String::new(),
                        hospital_affiliation: None,
                    };
                    state
                        .store
                        .create_doctor(Doctor::from_profile_input(user.id, &input))
                        .await?
                }
            };
            doctor.approve(actor.id, now);
            let doctor = state.store.save_doctor(doctor).await?;
            state
                .store
                .update_user(
                    user.id,
                    UserChanges {
                        is_verified: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            info!(doctor = %doctor.id, admin = %actor.id, "doctor validated");

            Ok(Json(json!({
                "status": "success",
                "message": "Doctor validated successfully",
                "data": doctor,
            })))
        }
        Role::Laboratory => {
            let mut laboratory = match state.store.find_laboratory_by_user_id(user.id).await? {
                Some(laboratory) => laboratory,
                None => {
                    let input = LaboratoryProfileInput {
                        lab_name: String::new(),
                        license_number: String::new(),
                        address: None,
                    };
                    state
                        .store
                        .create_laboratory(Laboratory::from_profile_input(user.id, &input))
                        .await?
                }
            };
            laboratory.approve(actor.id, now);
            let laboratory = state.store.save_laboratory(laboratory).await?;
            state
                .store
                .update_user(
                    user.id,
                    UserChanges {
                        is_verified: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            info!(laboratory = %laboratory.id, admin = %actor.id, "laboratory validated");

            Ok(Json(json!({
                "status": "success",
                "message": "Laboratory validated successfully",
                "data": laboratory,
            })))
        }
        _ => unreachable!("role checked above"),
    }
}

// Handler for GET /api/v1/admin/pending-validations
pub async fn pending_validations_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Admin])?;

    let mut pending_doctors = state.store.list_doctors(DoctorFilter::default()).await?;
    pending_doctors.retain(|doctor| !doctor.is_approved);
    let mut pending_laboratories = state
        .store
        .list_laboratories(LaboratoryFilter::default())
        .await?;
    pending_laboratories.retain(|laboratory| !laboratory.is_approved);

    Ok(Json(json!({
        "status": "success",
        "data": {
            "pendingDoctors": pending_doctors,
            "pendingLaboratories": pending_laboratories,
        },
    })))
}

// Handler for PUT /api/v1/admin/manage-user
pub async fn manage_user_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<ManageUserRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Admin])?;

    let user = state
        .store
        .find_user_by_id(payload.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    let message = match payload.action {
        AccountAction::Deactivate => {
            state
                .store
                .update_user(
                    user.id,
                    UserChanges {
                        is_active: Some(false),
                        ..Default::default()
                    },
                )
                .await?;
            "User account deactivated successfully".to_string()
        }
        AccountAction::Activate => {
            state
                .store
                .update_user(
                    user.id,
                    UserChanges {
                        is_active: Some(true),
                        ..Default::default()
                    },
                )
                .await?;
            "User account activated successfully".to_string()
        }
        AccountAction::ChangeRole => {
            let new_role = payload.new_role.ok_or_else(|| {
                RestApiError::InvalidInput("Invalid action specified".to_string())
            })?;
            state
                .store
                .update_user(
                    user.id,
                    UserChanges {
                        role: Some(new_role),
                        ..Default::default()
                    },
                )
                .await?;
            format!("User role changed to {}", new_role.as_str())
        }
    };
    info!(user = %user.email, admin = %actor.id, action = ?payload.action, "user account managed");

    Ok(Json(json!({ "status": "success", "message": message })))
}

// Handler for GET /api/v1/admin/statistics
pub async fn statistics_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Admin])?;

    let counts = state.store.system_counts(Utc::now()).await?;

    Ok(Json(json!({ "status": "success", "data": counts })))
}

// Handler for GET /api/v1/admin/access-permissions
//
// Oversight view of the consent ledger: every unexpired grant, revoked
// ones included, newest first.
pub async fn access_permissions_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(query): Query<PermissionListQuery>,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Admin])?;

    let permissions = state
        .store
        .list_access_permissions(PermissionFilter {
            patient_id: query.patient_id,
            unexpired_at: Some(Utc::now()),
            ..Default::default()
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": permissions.len(),
        "data": permissions,
    })))
}
