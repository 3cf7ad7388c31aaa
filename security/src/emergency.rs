// security/src/emergency.rs
// Break-glass access for emergency responders. No account is involved; the
// patient id plus a pre-shared code buys a short read-only window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use storage::HealthStore;

use crate::AuthError;

const EMERGENCY_WINDOW_HOURS: i64 = 1;

/// A one-hour read-only capability scoped to a single patient. Carries no
/// user id, so nothing downstream can mistake it for a session.
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyGrant {
    pub patient_id: Uuid,
    pub patient_name: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EmergencyGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// Comparison cost must not depend on where the codes diverge.
fn codes_match(presented: &str, stored: &str) -> bool {
    let presented = presented.as_bytes();
    let stored = stored.as_bytes();
    if presented.len() != stored.len() {
        return false;
    }
    presented
        .iter()
        .zip(stored)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Checks a break-glass request against the patient's emergency settings.
///
/// The two refusals are distinct in the type but share one client-facing
/// line; callers must not reveal which check tripped.
pub async fn emergency_authenticate(
    store: &Arc<dyn HealthStore>,
    patient_id: Uuid,
    emergency_code: &str,
) -> Result<EmergencyGrant, AuthError> {
    let patient = store
        .find_patient_by_id(patient_id)
        .await?
        .ok_or(AuthError::PatientNotFound)?;

    if !patient.emergency_access_enabled {
        return Err(AuthError::EmergencyAccessDisabled);
    }
    let stored = patient
        .emergency_access_code
        .as_deref()
        .ok_or(AuthError::InvalidEmergencyCode)?;
    if !codes_match(emergency_code, stored) {
        return Err(AuthError::InvalidEmergencyCode);
    }

    let user = store
        .find_user_by_id(patient.user_id)
        .await?
        .ok_or(AuthError::PatientNotFound)?;

    let granted_at = Utc::now();
    Ok(EmergencyGrant {
        patient_id: patient.id,
        patient_name: user.full_name(),
        granted_at,
        expires_at: granted_at + Duration::hours(EMERGENCY_WINDOW_HOURS),
    })
}
