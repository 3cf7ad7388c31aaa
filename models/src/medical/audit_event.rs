// models/src/medical/audit_event.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An append-only record of a sensitive access. Emergency reads must
/// produce one of these before any data leaves the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Description of the acting party, e.g. `emergency:<code-holder>`.
    pub actor: String,
    pub patient_id: Uuid,
    pub action: String,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(actor: impl Into<String>, patient_id: Uuid, action: impl Into<String>, detail: Option<String>) -> Self {
        AuditEvent {
            id: Uuid::new_v4(),
            actor: actor.into(),
            patient_id,
            action: action.into(),
            detail,
            recorded_at: Utc::now(),
        }
    }
}
