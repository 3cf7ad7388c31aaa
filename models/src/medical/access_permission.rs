// models/src/medical/access_permission.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    View,
    Edit,
}

impl Default for AccessType {
    fn default() -> Self {
        AccessType::View
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::View => f.write_str("view"),
            AccessType::Edit => f.write_str("edit"),
        }
    }
}

/// A consent grant in the ledger: one patient allowing one professional
/// to see their data until `expires_at`. Revocation flips `is_active`
/// and is final; a fresh grant is a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPermission {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// User id of the doctor or laboratory the grant is for.
    pub granted_to_id: Uuid,
    /// User id of the granting patient. Always the patient's own account.
    pub granted_by_id: Uuid,
    pub access_type: AccessType,
    pub purpose: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccessPermission {
    /// The one effectiveness test for the whole system: a grant counts
    /// only while it is active and strictly before its expiry.
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    /// Terminal revocation.
    pub fn revoke(&mut self, at: DateTime<Utc>) {
        self.is_active = false;
        self.updated_at = at;
    }
}
