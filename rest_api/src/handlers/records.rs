// rest_api/src/handlers/records.rs
// Record views shared across roles. Every read funnels through the
// access policy; the deny reason picks the client-facing refusal line.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use models::{DomainError, RecordType, Role};
use security::{authorize, AuthenticatedUser};
use storage::{Page, RecordFilter};

use crate::auth::Identity;
use crate::policy::{can_access, AccessDecision, AccessIntent, ActorContext, ArtifactRef};
use crate::{AppState, RestApiError};

const SEARCH_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    #[serde(rename = "patientId")]
    pub patient_id: Option<Uuid>,
    #[serde(rename = "doctorId")]
    pub doctor_id: Option<Uuid>,
    pub record_type: Option<RecordType>,
    #[serde(rename = "fromDate")]
    pub from_date: Option<String>,
    #[serde(rename = "toDate")]
    pub to_date: Option<String>,
}

/// Profile-aware actor for the policy checks. Roles without a profile
/// row keep the bare context and fall through to a deny.
async fn actor_context(
    state: &AppState,
    actor: &AuthenticatedUser,
) -> Result<ActorContext, RestApiError> {
    let mut context = ActorContext::new(actor.id, actor.role);
    match actor.role {
        Role::Patient => {
            if let Some(patient) = state.store.find_patient_by_user_id(actor.id).await? {
                context = context.with_patient(patient.id);
            }
        }
        Role::Doctor => {
            if let Some(doctor) = state.store.find_doctor_by_user_id(actor.id).await? {
                context = context.with_doctor(doctor.id);
            }
        }
        Role::Laboratory => {
            if let Some(laboratory) = state.store.find_laboratory_by_user_id(actor.id).await? {
                context = context.with_laboratory(laboratory.id);
            }
        }
        Role::User | Role::Admin => {}
    }
    Ok(context)
}

// Handler for GET /api/v1/medical-records/:id
pub async fn get_record_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, RestApiError> {
    let record = state
        .store
        .find_medical_record(id, actor.role == Role::Admin)
        .await?
        .ok_or_else(|| DomainError::NotFound("Medical record".to_string()))?;

    let mut context = actor_context(&state, &actor).await?;
    if actor.role == Role::Doctor {
        let grant = state
            .store
            .find_effective_permission(record.patient_id, actor.id, Utc::now())
            .await?;
        if grant.is_some() {
            context = context.with_grant_from(record.patient_id);
        }
    }

    let decision = can_access(
        &context,
        &ArtifactRef::from_medical_record(&record),
        AccessIntent::Read,
        Utc::now(),
    );
    if let AccessDecision::Deny(reason) = decision {
        return Err(RestApiError::Forbidden(reason.message().to_string()));
    }

    Ok(Json(json!({ "status": "success", "data": record })))
}

// Handler for GET /api/v1/medical-records/search
//
// The filters narrow, the role scopes: patients see only their own
// rows, doctors their own plus open shares, laboratories the rows
// addressed to them. Admins search everything.
pub async fn search_records_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, RestApiError> {
    let mut filter = RecordFilter {
        patient_id: query.patient_id,
        doctor_id: query.doctor_id,
        record_type: query.record_type,
        from_date: query
            .from_date
            .as_deref()
            .map(models::dates::parse_date)
            .transpose()?,
        to_date: query
            .to_date
            .as_deref()
            .map(models::dates::parse_date)
            .transpose()?,
        search: query.query,
        ..Default::default()
    };

    let records = match actor.role {
        Role::Admin => {
            filter.page = Some(Page::new(SEARCH_LIMIT, 0));
            state.store.list_medical_records(filter).await?
        }
        Role::Patient => {
            let patient = state
                .store
                .find_patient_by_user_id(actor.id)
                .await?
                .ok_or_else(|| DomainError::NotFound("Patient profile".to_string()))?;
            filter.patient_id = Some(patient.id);
            filter.page = Some(Page::new(SEARCH_LIMIT, 0));
            state.store.list_medical_records(filter).await?
        }
        Role::Doctor => {
            let doctor = state
                .store
                .find_doctor_by_user_id(actor.id)
                .await?
                .ok_or_else(|| DomainError::NotFound("Doctor profile".to_string()))?;
            // Own rows or open shares; the union cannot be pushed into
            // one filter, so scope after the fetch.
            let now = Utc::now();
            let mut rows = state.store.list_medical_records(filter).await?;
            rows.retain(|record| {
                record.doctor_id == Some(doctor.id) || record.is_share_window_open(now)
            });
            rows.truncate(SEARCH_LIMIT);
            rows
        }
        Role::Laboratory => {
            let laboratory = state
                .store
                .find_laboratory_by_user_id(actor.id)
                .await?
                .ok_or_else(|| DomainError::NotFound("Laboratory profile".to_string()))?;
            filter.laboratory_id = Some(laboratory.id);
            filter.page = Some(Page::new(SEARCH_LIMIT, 0));
            state.store.list_medical_records(filter).await?
        }
        Role::User => Vec::new(),
    };

    Ok(Json(json!({
        "status": "success",
        "count": records.len(),
        "data": records,
    })))
}

// Handler for GET /api/v1/medical-records/stats
pub async fn record_stats_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    let mut filter = RecordFilter::default();
    match actor.role {
        Role::Doctor => {
            let doctor = state
                .store
                .find_doctor_by_user_id(actor.id)
                .await?
                .ok_or_else(|| RestApiError::Forbidden("Doctor not found".to_string()))?;
            filter.doctor_id = Some(doctor.id);
        }
        Role::Patient => {
            let patient = state
                .store
                .find_patient_by_user_id(actor.id)
                .await?
                .ok_or_else(|| DomainError::NotFound("Patient".to_string()))?;
            filter.patient_id = Some(patient.id);
        }
        Role::Laboratory => {
            let laboratory = state
                .store
                .find_laboratory_by_user_id(actor.id)
                .await?
                .ok_or_else(|| DomainError::NotFound("Laboratory".to_string()))?;
            filter.laboratory_id = Some(laboratory.id);
        }
        Role::Admin | Role::User => {}
    }

    let total_records = state.store.count_medical_records(filter.clone()).await?;
    filter.created_after = Some(Utc::now() - Duration::days(30));
    let recent_records = state.store.count_medical_records(filter).await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "totalRecords": total_records,
            "recentRecords": recent_records,
        },
    })))
}

// Handler for PUT /api/v1/medical-records/:id/restore
pub async fn restore_record_handler(
    State(state): State<AppState>,
    Identity(actor): Identity,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, RestApiError> {
    authorize(actor.role, &[Role::Admin])?;

    let record = state.store.restore_medical_record(id).await?;
    info!(record = %id, admin = %actor.id, "medical record restored");

    Ok(Json(json!({
        "status": "success",
        "message": "Medical record restored",
        "data": record,
    })))
}

// Handler for GET /api/v1/medical-records/types
pub async fn record_types_handler(
    Identity(_actor): Identity,
) -> Result<impl IntoResponse, RestApiError> {
    let types: Vec<_> = RecordType::ALL
        .iter()
        .map(|record_type| {
            json!({
                "value": record_type,
                "label": type_label(*record_type),
            })
        })
        .collect();

    Ok(Json(json!({ "status": "success", "data": types })))
}

fn type_label(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::Vaccination => "Vaccination",
        RecordType::Prescription => "Prescription",
        RecordType::Diagnosis => "Diagnosis",
        RecordType::Consultation => "Consultation",
        RecordType::Other => "Other",
    }
}
