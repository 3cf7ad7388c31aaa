// rest_api/src/handlers/patients.rs
// The patient-facing surface: profile upkeep, the own-data reads and the
// consent ledger operations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use models::medical::validate_emergency_code;
use models::{AccessType, DomainError, Patient, PatientProfileInput, Role};
use security::{authorize, ensure_approved_professional, issue_token, AuthError, TokenKind, TokenPair};
use storage::{LabTestFilter, PatientChanges, PrescriptionFilter, RecordFilter, UserChanges};

use crate::auth::{refresh_cookie, Identity};
use crate::grants;
use crate::{AppState, RestApiError};

#[derive(Debug, Deserialize)]
pub struct EmergencyAccessRequest {
    pub emergency_access_enabled: Option<bool>,
    pub emergency_access_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub grantee_id: Uuid,
    #[serde(default)]
    pub access_type: AccessType,
    pub expires_at: String,
    pub purpose: Option<String>,
}

async fn own_patient_profile(
    state: &AppState,
    user_id: Uuid,
) -> Result<Patient, RestApiError> {
    state
        .store
        .find_patient_by_user_id(user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Patient profile".to_string()).into())
}

// Handler for GET /api/v1/patients/profile/me
pub async fn get_my_profile_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    let patient = own_patient_profile(&state, actor.id).await?;
    Ok(Json(json!({ "status": "success", "data": patient })))
}

// Handler for GET /api/v1/patients/profile/:user_id
pub async fn get_profile_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, RestApiError> {
    if actor.role != Role::Admin && actor.id != user_id {
        return Err(RestApiError::Forbidden(
            "Unauthorized: You can only view your own profile".to_string(),
        ));
    }

    let patient = state
        .store
        .find_patient_by_user_id(user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Patient profile".to_string()))?;
    Ok(Json(json!({ "status": "success", "data": patient })))
}

// Handler for PUT /api/v1/patients/profile/me
//
// First creation promotes a plain `user` to `patient` and hands back a
// token pair carrying the new role.
pub async fn upsert_my_profile_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<PatientProfileInput>,
) -> Result<impl IntoResponse, RestApiError> {
    if let Some(existing) = state.store.find_patient_by_user_id(actor.id).await? {
        let patient = state
            .store
            .update_patient(
                existing.id,
                PatientChanges {
                    date_of_birth: Some(models::dates::parse_date(&payload.date_of_birth)?),
                    gender: Some(payload.gender),
                    blood_type: payload.blood_type,
                    genotype: payload.genotype,
                    known_allergies: payload.known_allergies,
                    known_diseases: payload.known_diseases,
                    height_cm: payload.height_cm,
                    weight_kg: payload.weight_kg,
                    ..Default::default()
                },
            )
            .await?;
        return Ok(Json(json!({
            "status": "success",
            "message": "Patient profile updated successfully",
            "data": patient,
        }))
        .into_response());
    }

    let patient = state
        .store
        .create_patient(Patient::from_profile_input(actor.id, &payload)?)
        .await?;

    if actor.role != Role::User {
        return Ok(Json(json!({
            "status": "success",
            "message": "Patient profile created successfully",
            "data": patient,
        }))
        .into_response());
    }

    // Promotion path: re-issue tokens so the new role takes effect
    // without a fresh login.
    let pair = TokenPair {
        access_token: issue_token(actor.id, Role::Patient, TokenKind::Access, &state.tokens)?,
        refresh_token: issue_token(actor.id, Role::Patient, TokenKind::Refresh, &state.tokens)?,
    };
    let user = state
        .store
        .find_user_by_id(actor.id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    let mut tokens = user.refresh_tokens.clone();
    tokens.push(pair.refresh_token.clone());
    state
        .store
        .update_user(
            actor.id,
            UserChanges {
                role: Some(Role::Patient),
                refresh_tokens: Some(tokens),
                ..Default::default()
            },
        )
        .await?;
    info!(user = %actor.email, "promoted to patient on first profile creation");

    let cookie = refresh_cookie(
        &pair.refresh_token,
        state.tokens.refresh_ttl_days,
        state.settings.is_development(),
    );
    Ok((
        AppendHeaders([cookie]),
        Json(json!({
            "status": "success",
            "message": "Patient profile created successfully (role updated to patient)",
            "data": patient,
            "accessToken": pair.access_token,
        })),
    )
        .into_response())
}

// Handler for PUT /api/v1/patients/emergency-access
pub async fn configure_emergency_access_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<EmergencyAccessRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let patient = own_patient_profile(&state, actor.id).await?;

    if let Some(code) = payload.emergency_access_code.as_deref() {
        validate_emergency_code(code)?;
    }

    let patient = state
        .store
        .update_patient(
            patient.id,
            PatientChanges {
                emergency_access_enabled: payload.emergency_access_enabled,
                emergency_access_code: payload.emergency_access_code.map(Some),
                ..Default::default()
            },
        )
        .await?;
    info!(
        patient = %patient.id,
        enabled = patient.emergency_access_enabled,
        "emergency access reconfigured"
    );

    Ok(Json(json!({
        "status": "success",
        "message": "Emergency access configuration updated",
        "data": {
            "emergency_access_enabled": patient.emergency_access_enabled,
            "emergency_access_code": patient.emergency_access_code,
        },
    })))
}

// Handler for GET /api/v1/patients/medical-records
pub async fn my_medical_records_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    let patient = own_patient_profile(&state, actor.id).await?;
    let records = state
        .store
        .list_medical_records(RecordFilter {
            patient_id: Some(patient.id),
            ..Default::default()
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": records.len(),
        "data": records,
    })))
}

// Handler for GET /api/v1/patients/prescriptions
pub async fn my_prescriptions_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    let patient = own_patient_profile(&state, actor.id).await?;
    let prescriptions = state
        .store
        .list_prescriptions(PrescriptionFilter {
            patient_id: Some(patient.id),
            ..Default::default()
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": prescriptions.len(),
        "data": prescriptions,
    })))
}

// Handler for GET /api/v1/patients/lab-tests
pub async fn my_lab_tests_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    let patient = own_patient_profile(&state, actor.id).await?;
    let tests = state
        .store
        .list_lab_tests(LabTestFilter {
            patient_id: Some(patient.id),
            ..Default::default()
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": tests.len(),
        "data": tests,
    })))
}

// Handler for POST /api/v1/patients/grant
pub async fn grant_access_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<GrantRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let permission = grants::grant_access(
        &state.store,
        actor.id,
        payload.grantee_id,
        payload.access_type,
        &payload.expires_at,
        payload.purpose,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Access granted successfully",
            "data": permission,
        })),
    ))
}

// Handler for DELETE /api/v1/patients/revoke/:permission_id
pub async fn revoke_access_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(permission_id): Path<Uuid>,
) -> Result<impl IntoResponse, RestApiError> {
    let permission = grants::revoke_access(&state.store, permission_id, actor.id).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Access revoked successfully",
        "data": permission,
    })))
}

// Handler for GET /api/v1/patients/granted-accesses
pub async fn granted_accesses_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    let grants = grants::list_grants(&state.store, actor.id).await?;

    Ok(Json(json!({
        "status": "success",
        "count": grants.len(),
        "data": grants,
    })))
}

// Handler for GET /api/v1/patients/check-access/:patient_id
pub async fn check_access_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(patient_id): Path<Uuid>,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Doctor])?;
    ensure_approved_professional(&state.store, actor.id, actor.role).await?;

    let probe = grants::check_doctor_access(&state.store, actor.id, patient_id).await?;

    Ok(Json(json!({
        "status": "success",
        "has_access": probe.has_access,
        "access_details": probe.access_details,
    })))
}
