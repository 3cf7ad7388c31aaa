// rest_api/src/handlers/emergency.rs
// Break-glass view of one patient's records. No session is involved;
// the grant from `security::emergency` is the whole credential.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use models::AuditEvent;
use security::emergency_authenticate;
use storage::RecordFilter;

use crate::{AppState, RestApiError};

#[derive(Debug, Deserialize)]
pub struct EmergencyViewRequest {
    pub patient_id: Uuid,
    pub emergency_code: String,
}

// Handler for POST /api/v1/emergency/records
//
// The audit row is written before the response leaves; if that write
// fails the whole request fails and no data goes out.
pub async fn emergency_records_handler(
    State(state): State<AppState>,
    Json(payload): Json<EmergencyViewRequest>,
) -> Result<impl IntoResponse, RestApiError> {
    let grant =
        emergency_authenticate(&state.store, payload.patient_id, &payload.emergency_code).await?;

    let records = state
        .store
        .list_medical_records(RecordFilter {
            patient_id: Some(grant.patient_id),
            ..Default::default()
        })
        .await?;

    state
        .store
        .record_audit_event(AuditEvent::new(
            "emergency:code-holder",
            grant.patient_id,
            "emergency_records_view",
            Some(format!("viewed {} medical records", records.len())),
        ))
        .await?;
    warn!(patient = %grant.patient_id, "emergency break-glass access granted");

    Ok(Json(json!({
        "status": "success",
        "message": "Emergency access granted",
        "data": {
            "patient": {
                "id": grant.patient_id,
                "name": grant.patient_name,
            },
            "records": records,
            "granted_at": grant.granted_at,
            "access_expires_at": grant.expires_at,
        },
    })))
}
