// models/src/medical/doctor.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Doctor profile, one-to-one with a `User` row. Privileged operations
/// stay locked until an admin approves the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialization: String,
    pub license_number: String,
    pub hospital_affiliation: Option<String>,
    pub is_approved: bool,
    pub approved_by_admin_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoctorProfileInput {
    pub specialization: String,
    pub license_number: String,
    pub hospital_affiliation: Option<String>,
}

impl Doctor {
    pub fn from_profile_input(user_id: Uuid, input: &DoctorProfileInput) -> Self {
        let now = Utc::now();
        Doctor {
            id: Uuid::new_v4(),
            user_id,
            specialization: input.specialization.clone(),
            license_number: input.license_number.clone(),
            hospital_affiliation: input.hospital_affiliation.clone(),
            is_approved: false,
            approved_by_admin_id: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the profile approved. The approving admin and the instant
    /// are always recorded together with the flag.
    pub fn approve(&mut self, admin_id: Uuid, at: DateTime<Utc>) {
        self.is_approved = true;
        self.approved_by_admin_id = Some(admin_id);
        self.approved_at = Some(at);
        self.updated_at = at;
    }

    /// Withdraws approval, clearing both bookkeeping fields.
    pub fn revoke_approval(&mut self, at: DateTime<Utc>) {
        self.is_approved = false;
        self.approved_by_admin_id = None;
        self.approved_at = None;
        self.updated_at = at;
    }
}
