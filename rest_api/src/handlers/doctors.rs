// rest_api/src/handlers/doctors.rs
// The doctor-facing surface. Writes pass the approval gate first, reads
// of other patients' data consume an effective grant.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{AppendHeaders, IntoResponse};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use models::{
    DomainError, Doctor, DoctorProfileInput, LabTest, MedicalRecord, Prescription, RecordType,
    Role, TestStatus,
};
use security::{
    authorize, ensure_approved_professional, issue_token, AuthError, TokenKind, TokenPair,
};
use storage::{
    DoctorFilter, LabTestFilter, MedicalRecordChanges, PrescriptionFilter, RecordFilter,
    UserChanges,
};

use crate::auth::{refresh_cookie, Identity};
use crate::policy::{can_access, AccessDecision, AccessIntent, ActorContext, ArtifactRef};
use crate::{AppState, RestApiError};

#[derive(Debug, Deserialize)]
pub struct ListDoctorsQuery {
    #[serde(rename = "approvedOnly")]
    pub approved_only: Option<bool>,
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewRecordRequest {
    pub title: String,
    pub description: Option<String>,
    pub record_type: Option<RecordType>,
    pub laboratory_id: Option<Uuid>,
    /// `YYYY-MM-DD`; today when absent.
    pub date: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub record_type: Option<RecordType>,
    pub date: Option<String>,
    pub attachment_url: Option<String>,
    pub is_shared: Option<bool>,
    /// `YYYY-MM-DD` end of the sharing window; `is_shared` alone keeps it open-ended.
    pub shared_until: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewPrescriptionRequest {
    pub patient_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub end_date: String,
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionListQuery {
    pub patient_id: Option<Uuid>,
    #[serde(rename = "isActive")]
    pub is_active: Option<bool>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct NewLabTestRequest {
    pub patient_id: Uuid,
    pub laboratory_id: Uuid,
    pub test_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LabTestListQuery {
    pub status: Option<TestStatus>,
    pub patient_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct InterpretRequest {
    pub doctor_interpretation: String,
}

/// Approval gate shared by every clinical write on this surface.
async fn approved_doctor(
    state: &AppState,
    user_id: Uuid,
    role: Role,
) -> Result<Doctor, RestApiError> {
    authorize(role, &[Role::Doctor])?;
    ensure_approved_professional(&state.store, user_id, role).await?;
    Ok(state
        .store
        .find_doctor_by_user_id(user_id)
        .await?
        .ok_or(AuthError::ProfileNotFound(Role::Doctor))?)
}

fn doctor_actor(actor_id: Uuid, doctor: &Doctor) -> ActorContext {
    ActorContext::new(actor_id, Role::Doctor).with_doctor(doctor.id)
}

// Handler for GET /api/v1/doctors/profile/me
pub async fn get_my_profile_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    match state.store.find_doctor_by_user_id(actor.id).await? {
        Some(doctor) => Ok(Json(json!({
            "status": "success",
            "hasProfile": true,
            "data": doctor,
        }))
        .into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "status": "error",
                "hasProfile": false,
                "message": "Doctor profile not found. Please create a profile first.",
            })),
        )
            .into_response()),
    }
}

// Handler for PUT /api/v1/doctors/profile/me
//
// Approved profiles are frozen; edits have to go through an admin.
// First creation promotes a plain `user` to `doctor`.
pub async fn upsert_my_profile_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<DoctorProfileInput>,
) -> Result<impl IntoResponse, RestApiError> {
    if let Some(mut existing) = state.store.find_doctor_by_user_id(actor.id).await? {
        if existing.is_approved {
            return Err(DomainError::CannotModifyApprovedProfile("doctor".to_string()).into());
        }
        existing.specialization = payload.specialization;
        existing.license_number = payload.license_number;
        existing.hospital_affiliation = payload.hospital_affiliation;
        existing.updated_at = Utc::now();
        let doctor = state.store.save_doctor(existing).await?;
        return Ok(Json(json!({
            "status": "success",
            "message": "Doctor profile updated successfully (pending admin approval)",
            "data": doctor,
        }))
        .into_response());
    }

    let doctor = state
        .store
        .create_doctor(Doctor::from_profile_input(actor.id, &payload))
        .await?;

    if actor.role != Role::User {
        return Ok(Json(json!({
            "status": "success",
            "message": "Doctor profile created successfully (pending admin approval)",
            "data": doctor,
        }))
        .into_response());
    }

    // Promotion path: re-issue tokens so the new role takes effect
    // without a fresh login.
    let pair = TokenPair {
        access_token: issue_token(actor.id, Role::Doctor, TokenKind::Access, &state.tokens)?,
        refresh_token: issue_token(actor.id, Role::Doctor, TokenKind::Refresh, &state.tokens)?,
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
                role: Some(Role::Doctor),
                refresh_tokens: Some(tokens),
                ..Default::default()
            },
        )
        .await?;
    info!(user = %actor.email, "promoted to doctor on first profile creation");

    let cookie = refresh_cookie(
        &pair.refresh_token,
        state.tokens.refresh_ttl_days,
        state.settings.is_development(),
    );
    Ok((
        AppendHeaders([cookie]),
        Json(json!({
            "status": "success",
            "message": "Doctor profile created successfully (pending admin approval) (role updated to doctor)",
            "data": doctor,
            "accessToken": pair.access_token,
        })),
    )
        .into_response())
}

// Handler for GET /api/v1/doctors
pub async fn list_doctors_handler(
    State(state): State<AppState>,
    Identity(_actor): Identity,
    Query(query): Query<ListDoctorsQuery>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctors = state
        .store
        .list_doctors(DoctorFilter {
            approved_only: query.approved_only.unwrap_or(true),
            specialization_contains: query.specialty,
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "count": doctors.len(),
        "data": doctors,
    })))
}

// Handler for GET /api/v1/doctors/patients/:patient_id/medical-records
//
// The whole clinical picture for one patient, readable only while that
// patient's grant to this doctor is live.
pub async fn patient_records_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(patient_id): Path<Uuid>,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Doctor])?;
    ensure_approved_professional(&state.store, actor.id, actor.role).await?;

    let grant = state
        .store
        .find_effective_permission(patient_id, actor.id, Utc::now())
        .await?;
    if grant.is_none() {
        return Err(RestApiError::Forbidden(
            "Access denied to patient records".to_string(),
        ));
    }

    let records = state
        .store
        .list_medical_records(RecordFilter {
            patient_id: Some(patient_id),
            ..Default::default()
        })
        .await?;
    let prescriptions = state
        .store
        .list_prescriptions(PrescriptionFilter {
            patient_id: Some(patient_id),
            ..Default::default()
        })
        .await?;
    let lab_tests = state
        .store
        .list_lab_tests(LabTestFilter {
            patient_id: Some(patient_id),
            ..Default::default()
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "medicalRecords": records,
            "prescriptions": prescriptions,
            "labTests": lab_tests,
        },
    })))
}

// Handler for POST /api/v1/doctors/patients/:patient_id/medical-records
pub async fn create_record_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(patient_id): Path<Uuid>,
    Json(payload): Json<NewRecordRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let patient = state.store.find_patient_by_id(patient_id).await?;
    if patient.is_none() {
        return Err(DomainError::NotFound("Patient".to_string()).into());
    }
    if payload.title.trim().is_empty() {
        return Err(RestApiError::InvalidInput("Title is required".to_string()));
    }

    let date = match payload.date.as_deref() {
        Some(raw) => models::dates::parse_date(raw)?,
        None => Utc::now().date_naive(),
    };
    let now = Utc::now();
    let record = state
        .store
        .create_medical_record(MedicalRecord {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: Some(doctor.id),
            laboratory_id: payload.laboratory_id,
            record_type: payload.record_type.unwrap_or(RecordType::Consultation),
            title: payload.title.trim().to_string(),
            description: payload.description.map(|d| d.trim().to_string()),
            date,
            attachment_url: None,
            is_shared: payload.is_shared,
            shared_until: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .await?;
    info!(record = %record.id, patient = %patient_id, "medical record created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Medical record created successfully",
            "data": record,
        })),
    ))
}

// Handler for PUT /api/v1/doctors/medical-records/:id
pub async fn update_record_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRecordRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let record = state
        .store
        .find_medical_record(id, false)
        .await?
        .ok_or_else(|| DomainError::NotFound("Medical record".to_string()))?;

    let decision = can_access(
        &doctor_actor(actor.id, &doctor),
        &ArtifactRef::from_medical_record(&record),
        AccessIntent::Write,
        Utc::now(),
    );
    if let AccessDecision::Deny(reason) = decision {
        return Err(RestApiError::Forbidden(reason.message().to_string()));
    }

    let shared_until = match payload.shared_until.as_deref() {
        Some(raw) => Some(Some(models::dates::parse_expiry(raw)?)),
        None => None,
    };
    let record = state
        .store
        .update_medical_record(
            id,
            MedicalRecordChanges {
                record_type: payload.record_type,
                title: payload.title,
                description: payload.description,
                date: payload
                    .date
                    .as_deref()
                    .map(models::dates::parse_date)
                    .transpose()?,
                attachment_url: payload.attachment_url,
                is_shared: payload.is_shared,
                shared_until,
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Medical record updated",
        "data": record,
    })))
}

// Handler for DELETE /api/v1/doctors/medical-records/:id
pub async fn delete_record_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let record = state
        .store
        .find_medical_record(id, false)
        .await?
        .ok_or_else(|| DomainError::NotFound("Medical record".to_string()))?;

    let decision = can_access(
        &doctor_actor(actor.id, &doctor),
        &ArtifactRef::from_medical_record(&record),
        AccessIntent::Write,
        Utc::now(),
    );
    if let AccessDecision::Deny(reason) = decision {
        return Err(RestApiError::Forbidden(reason.message().to_string()));
    }

    state.store.soft_delete_medical_record(id).await?;
    info!(record = %id, "medical record soft-deleted");

    Ok(Json(json!({
        "status": "success",
        "message": "Medical record deleted",
    })))
}

// Handler for POST /api/v1/doctors/prescriptions
//
// Every prescription also lands in the record timeline as a
// `prescription` entry so the history reads in one place.
pub async fn create_prescription_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<NewPrescriptionRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let patient = state.store.find_patient_by_id(payload.patient_id).await?;
    if patient.is_none() {
        return Err(DomainError::NotFound("Patient".to_string()).into());
    }

    let now = Utc::now();
    let prescription = state
        .store
        .create_prescription(Prescription {
            id: Uuid::new_v4(),
            patient_id: payload.patient_id,
            doctor_id: doctor.id,
            medication_name: payload.medication_name.clone(),
            dosage: payload.dosage.clone(),
            frequency: payload.frequency.clone(),
            duration: payload.duration.clone(),
            prescribed_date: now,
            end_date: models::dates::parse_date(&payload.end_date)?,
            instructions: payload.instructions.clone(),
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .await?;

    let description = match payload.instructions.as_deref() {
        Some(instructions) => format!(
            "{} - {}, {}, {}. Instructions: {}",
            payload.medication_name, payload.dosage, payload.frequency, payload.duration,
            instructions
        ),
        None => format!(
            "{} - {}, {}, {}.",
            payload.medication_name, payload.dosage, payload.frequency, payload.duration
        ),
    };
    state
        .store
        .create_medical_record(MedicalRecord {
            id: Uuid::new_v4(),
            patient_id: payload.patient_id,
            doctor_id: Some(doctor.id),
            laboratory_id: None,
            record_type: RecordType::Prescription,
            title: format!("Prescription: {}", payload.medication_name),
            description: Some(description),
            date: now.date_naive(),
            attachment_url: None,
            is_shared: false,
            shared_until: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
        .await?;
    info!(prescription = %prescription.id, patient = %payload.patient_id, "prescription created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Prescription created successfully",
            "data": prescription,
        })),
    ))
}

// Handler for GET /api/v1/doctors/prescriptions
pub async fn list_prescriptions_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(query): Query<PrescriptionListQuery>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let limit = query.limit.unwrap_or(50).max(1);
    let page = query.page.unwrap_or(1).max(1);

    let rows = state
        .store
        .list_prescriptions(PrescriptionFilter {
            patient_id: query.patient_id,
            doctor_id: Some(doctor.id),
            is_active: query.is_active,
            ..Default::default()
        })
        .await?;
    let count = rows.len();
    let prescriptions: Vec<_> = rows
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    Ok(Json(json!({
        "status": "success",
        "count": count,
        "totalPages": count.div_ceil(limit),
        "currentPage": page,
        "data": prescriptions,
    })))
}

// Handler for POST /api/v1/doctors/lab-tests
pub async fn order_lab_test_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Json(payload): Json<NewLabTestRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let patient = state.store.find_patient_by_id(payload.patient_id).await?;
    if patient.is_none() {
        return Err(DomainError::NotFound("Patient".to_string()).into());
    }
    let laboratory = state
        .store
        .find_laboratory_by_id(payload.laboratory_id)
        .await?;
    if !laboratory.map_or(false, |lab| lab.is_approved) {
        return Err(RestApiError::NotFound(
            "Laboratory not found or not approved".to_string(),
        ));
    }

    let now = Utc::now();
    let test = state
        .store
        .create_lab_test(LabTest {
            id: Uuid::new_v4(),
            patient_id: payload.patient_id,
            doctor_id: doctor.id,
            laboratory_id: payload.laboratory_id,
            test_name: payload.test_name,
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
        .await?;
    info!(test = %test.id, laboratory = %payload.laboratory_id, "lab test ordered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "message": "Lab test ordered successfully",
            "data": test,
        })),
    ))
}

// Handler for GET /api/v1/doctors/lab-tests
pub async fn list_lab_tests_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(query): Query<LabTestListQuery>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let limit = query.limit.unwrap_or(50).max(1);
    let page = query.page.unwrap_or(1).max(1);

    let rows = state
        .store
        .list_lab_tests(LabTestFilter {
            patient_id: query.patient_id,
            doctor_id: Some(doctor.id),
            statuses: query.status.map(|status| vec![status]),
            ..Default::default()
        })
        .await?;
    let count = rows.len();
    let tests: Vec<_> = rows
        .into_iter()
        .skip((page - 1) * limit)
        .take(limit)
        .collect();

    Ok(Json(json!({
        "status": "success",
        "count": count,
        "totalPages": count.div_ceil(limit),
        "currentPage": page,
        "data": tests,
    })))
}

// Handler for PUT /api/v1/doctors/lab-tests/:id/interpret
//
// Interpretation only makes sense over delivered results, so anything
// short of `completed` is rejected.
pub async fn interpret_lab_test_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
    Json(payload): Json<InterpretRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let mut test = state
        .store
        .find_lab_test(id)
        .await?
        .filter(|test| test.doctor_id == doctor.id)
        .ok_or_else(|| DomainError::NotFound("Test".to_string()))?;

    if test.status != TestStatus::Completed {
        return Err(RestApiError::InvalidInput(
            "Test not completed yet".to_string(),
        ));
    }

    test.doctor_interpretation = Some(payload.doctor_interpretation);
    test.updated_at = Utc::now();
    let test = state.store.save_lab_test(test).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Interpretation added",
        "data": test,
    })))
}

// Handler for PUT /api/v1/doctors/lab-tests/:id/cancel
pub async fn cancel_lab_test_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, RestApiError> {
    let doctor = approved_doctor(&state, actor.id, actor.role).await?;

    let mut test = state
        .store
        .find_lab_test(id)
        .await?
        .filter(|test| test.doctor_id == doctor.id)
        .ok_or_else(|| DomainError::NotFound("Test".to_string()))?;

    if test.status == TestStatus::Cancelled {
        return Err(RestApiError::InvalidInput(
            "Test already cancelled".to_string(),
        ));
    }
    // A completed test cannot be cancelled; the machine rejects it.
    test.transition_status(TestStatus::Cancelled, Utc::now())?;
    let test = state.store.save_lab_test(test).await?;
    info!(test = %test.id, "lab test cancelled");

    Ok(Json(json!({
        "status": "success",
        "message": "Test cancelled successfully",
        "data": test,
    })))
}
