// rest_api/src/handlers/laboratories.rs
// The laboratory surface: profile upkeep, the execution work queue and
// the two result-delivery writes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use models::{DomainError, Laboratory, LaboratoryProfileInput, Role, TestStatus};
use security::{
    authorize, ensure_approved_professional, issue_token, AuthError, TokenKind, TokenPair,
};
use storage::{LabTestFilter, LaboratoryFilter, UserChanges};

use crate::auth::{refresh_cookie, Identity};
use crate::{AppState, RestApiError};

#[derive(Debug, Deserialize)]
pub struct ListLaboratoriesQuery {
    #[serde(rename = "approvedOnly")]
    pub approved_only: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WorkQueueQuery {
    pub status: Option<TestStatus>,
    pub patient_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: TestStatus,
}

#[derive(Debug, Deserialize)]
pub struct DepositResultsRequest {
    pub results: Option<String>,
    pub result_file_url: Option<String>,
}

/// Approval gate shared by every write on this surface.
async fn approved_laboratory(
    state: &AppState,
    user_id: Uuid,
    role: Role,
) -> Result<Laboratory, RestApiError> {
    authorize(role, &[Role::Laboratory])?;
    ensure_approved_professional(&state.store, user_id, role).await?;
    Ok(state
        .store
        .find_laboratory_by_user_id(user_id)
        .await?
        .ok_or(AuthError::ProfileNotFound(Role::Laboratory))?)
}

// Handler for GET /api/v1/laboratories/profile/me
pub async fn get_my_profile_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    match state.store.find_laboratory_by_user_id(actor.id).await? {
        Some(laboratory) => Ok(Json(json!({
            "status": "success",
            "hasProfile": true,
            "data": laboratory,
        }))
        .into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "error",
                "hasProfile": false,
                "message": "Laboratory profile not found. Please create a profile first.",
            })),
        )
            .into_response()),
    }
}

// Handler for PUT /api/v1/laboratories/profile/me
//
// Approved profiles are frozen; edits have to go through an admin.
// First creation promotes a plain `user` to `laboratory`.
pub async fn upsert_my_profile_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<LaboratoryProfileInput>,
) -> Result<impl IntoResponse, RestApiError> {
    if let Some(mut existing) = state.store.find_laboratory_by_user_id(actor.id).await? {
        if existing.is_approved {
            return Err(
                DomainError::CannotModifyApprovedProfile("laboratory".to_string()).into(),
            );
        }
        existing.lab_name = payload.lab_name;
        existing.license_number = payload.license_number;
        existing.address = payload.address;
        existing.updated_at = Utc::now();
        let laboratory = state.store.save_laboratory(existing).await?;
        return Ok(Json(json!({
            "status": "success",
            "message": "Laboratory profile updated successfully (pending admin approval)",
            "data": laboratory,
        }))
        .into_response());
    }

    let laboratory = state
        .store
        .create_laboratory(Laboratory::from_profile_input(actor.id, &payload))
        .await?;

    if actor.role != Role::User {
        return Ok(Json(json!({
            "status": "success",
            "message": "Laboratory profile created successfully (pending admin approval)",
            "data": laboratory,
        }))
        .into_response());
    }

    // Promotion path: re-issue tokens so the new role takes effect
    // without a fresh login.
    let pair = TokenPair {
        access_token: issue_token(actor.id, Role::Laboratory, TokenKind::Access, &state.tokens)?,
        refresh_token: issue_token(actor.id, Role::Laboratory, TokenKind::Refresh, &state.tokens)?,
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
                role: Some(Role::Laboratory),
                refresh_tokens: Some(tokens),
                ..Default::default()
            },
        )
        .await?;
    info!(user = %actor.email, "promoted to laboratory on first profile creation");

    let cookie = refresh_cookie(
        &pair.refresh_token,
        state.tokens.refresh_ttl_days,
        state.settings.is_development(),
    );
    Ok((
        AppendHeaders([cookie]),
        Json(json!({
            "status": "success",
            "message": "Laboratory profile created successfully (pending admin approval) (role updated to laboratory)",
            "data": laboratory,
            "accessToken": pair.access_token,
        })),
    )
        .into_response())
}

// Handler for GET /api/v1/laboratories
pub async fn list_laboratories_handler(
    State(state): State<AppState>,
    Identity(_actor): Identity,
    Query(query): Query<ListLaboratoriesQuery>,
) -> Result<impl IntoResponse, RestApiError> {
    let laboratories = state
        .store
        .list_laboratories(LaboratoryFilter {
            approved_only: query.approved_only.unwrap_or(true),
            search: query.search,
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": laboratories.len(),
        "data": laboratories,
    })))
}

// Handler for GET /api/v1/laboratories/tests
//
// The execution queue: open tests oldest first, so the longest-waiting
// order is always on top. A `status` filter narrows to one state.
pub async fn work_queue_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(query): Query<WorkQueueQuery>,
) -> Result<impl IntoResponse, RestApiError> {
    let laboratory = approved_laboratory(&state, actor.id, actor.role).await?;

    let statuses = match query.status {
        Some(status) => vec![status],
        None => vec![TestStatus::Pending, TestStatus::InProgress],
    };
    let tests = state
        .store
        .list_lab_tests(LabTestFilter {
            patient_id: query.patient_id,
            laboratory_id: Some(laboratory.id),
            statuses: Some(statuses),
            oldest_first: true,
            ..Default::default()
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": tests.len(),
        "data": tests,
    })))
}

// Handler for PUT /api/v1/laboratories/tests/:id/status
pub async fn update_test_status_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let laboratory = approved_laboratory(&state, actor.id, actor.role).await?;

    let mut test = state
        .store
        .find_lab_test(id)
        .await?
        .filter(|test| test.laboratory_id == laboratory.id)
        .ok_or_else(|| DomainError::NotFound("Lab test".to_string()))?;

    test.transition_status(payload.status, Utc::now())?;
    let test = state.store.save_lab_test(test).await?;
    info!(test = %test.id, status = %test.status, "lab test status updated");

    Ok(Json(json!({
        "status": "success",
        "message": "Exam status updated",
        "data": test,
    })))
}

// Handler for PUT /api/v1/laboratories/tests/:id/results
//
// Depositing results completes the test in the same write. The
// `completed_date` stamp survives later deposits untouched.
pub async fn deposit_results_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<DepositResultsRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let laboratory = approved_laboratory(&state, actor.id, actor.role).await?;

    let mut test = state
        .store
        .find_lab_test(id)
        .await?
        .filter(|test| test.laboratory_id == laboratory.id)
        .ok_or_else(|| DomainError::NotFound("Lab test".to_string()))?;

    if payload.results.is_some() {
        test.results = payload.results;
    }
    if payload.result_file_url.is_some() {
        test.result_file_url = payload.result_file_url;
    }
    test.transition_status(TestStatus::Completed, Utc::now())?;
    let test = state.store.save_lab_test(test).await?;
    info!(test = %test.id, "analysis results deposited");

    Ok(Json(json!({
        "status": "success",
        "message": "Analysis results deposited",
        "data": test,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use models::{Gender, LabTest, NewUser, Patient, PatientProfileInput, User};
    use security::AuthenticatedUser;
    use storage::{HealthStore, InMemoryStore};

    use crate::config::ApiSettings;

    fn test_state() -> AppState {
        let settings = ApiSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "development".to_string(),
            access_token_secret: "access-secret-for-tests".to_string(),
            refresh_token_secret: "refresh-secret-for-tests".to_string(),
            access_token_ttl_days: 15,
            refresh_token_ttl_days: 30,
            storage_engine: "memory".to_string(),
        };
        AppState::new(Arc::new(InMemoryStore::new()), settings)
    }

    fn identity(user: &User) -> Identity {
        Identity(AuthenticatedUser {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            is_verified: user.is_verified,
        })
    }

    fn sample_user(email: &str, role: Role) -> User {
        let mut user = User::from_new_user(NewUser {
            first_name: "Esi".to_string(),
            last_name: "Owusu".to_string(),
            email: email.to_string(),
            password: "Passw0rd99".to_string(),
            phone: "233201234567".to_string(),
            country: None,
            avatar: None,
        })
        .unwrap();
        user.role = role;
        user
    }

    async fn seeded_laboratory(
        state: &AppState,
        email: &str,
        approved: bool,
    ) -> (User, Laboratory) {
        let user = state
            .store
            .create_user(sample_user(email, Role::Laboratory))
            .await
            .unwrap();
        let input = LaboratoryProfileInput {
            lab_name: "Accra Central Lab".to_string(),
            license_number: "LAB-2001".to_string(),
            address: None,
        };
        let mut laboratory = Laboratory::from_profile_input(user.id, &input);
        if approved {
            laboratory.approve(Uuid::new_v4(), Utc::now());
        }
        let laboratory = state.store.create_laboratory(laboratory).await.unwrap();
        (user, laboratory)
    }

    async fn seeded_patient_id(state: &AppState, email: &str) -> Uuid {
        let user = state
            .store
            .create_user(sample_user(email, Role::Patient))
            .await
            .unwrap();
        let input = PatientProfileInput {
            date_of_birth: "1992-01-15".to_string(),
            gender: Gender::Female,
            blood_type: None,
            genotype: None,
            known_allergies: None,
            known_diseases: None,
            height_cm: None,
            weight_kg: None,
        };
        let patient = state
            .store
            .create_patient(Patient::from_profile_input(user.id, &input).unwrap())
            .await
            .unwrap();
        patient.id
    }

    async fn pending_test(state: &AppState, laboratory_id: Uuid, patient_id: Uuid) -> LabTest {
        let now = Utc::now();
        state
            .store
            .create_lab_test(LabTest {
                id: Uuid::new_v4(),
                patient_id,
                doctor_id: Uuid::new_v4(),
                laboratory_id,
                test_name: "Full blood count".to_string(),
                status: TestStatus::Pending,
                results: None,
                result_file_url: None,
                doctor_interpretation: None,
                ordered_date: now,
                completed_date: None,
                deleted_at: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn deposit_requires_an_approved_profile() {
        let state = test_state();
        let (lab_user, laboratory) =
            seeded_laboratory(&state, "newlab@example.com", false).await;
        let patient_id = seeded_patient_id(&state, "p1@example.com").await;
        let test = pending_test(&state, laboratory.id, patient_id).await;

        let err = deposit_results_handler(
            State(state.clone()),
            identity(&lab_user),
            Path(test.id),
            Json(DepositResultsRequest {
                results: Some("All values in range".to_string()),
                result_file_url: None,
            }),
        )
        .await
        .err().unwrap();
        assert_eq!(
            err.to_string(),
            "Laboratory profile not approved. Please wait for admin approval."
        );
    }

    #[tokio::test]
    async fn deposit_completes_own_tests_and_rejects_foreign_ones() {
        let state = test_state();
        let (lab_user, laboratory) =
            seeded_laboratory(&state, "lab@example.com", true).await;
        let (_, other_laboratory) =
            seeded_laboratory(&state, "rival@example.com", true).await;
        let patient_id = seeded_patient_id(&state, "p2@example.com").await;

        let own = pending_test(&state, laboratory.id, patient_id).await;
        let foreign = pending_test(&state, other_laboratory.id, patient_id).await;

        let response = deposit_results_handler(
            State(state.clone()),
            identity(&lab_user),
            Path(own.id),
            Json(DepositResultsRequest {
                results: Some("Hemoglobin 14.1 g/dL".to_string()),
                result_file_url: None,
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = state.store.find_lab_test(own.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TestStatus::Completed);
        assert!(stored.completed_date.is_some());
        assert_eq!(stored.results.as_deref(), Some("Hemoglobin 14.1 g/dL"));

        let err = deposit_results_handler(
            State(state.clone()),
            identity(&lab_user),
            Path(foreign.id),
            Json(DepositResultsRequest {
                results: Some("should not land".to_string()),
                result_file_url: None,
            }),
        )
        .await
        .err().unwrap();
        assert_eq!(err.to_string(), "Lab test not found");
        let untouched = state.store.find_lab_test(foreign.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, TestStatus::Pending);
    }
}
