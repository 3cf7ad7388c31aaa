// models/src/medical/laboratory.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Laboratory profile, one-to-one with a `User` row. Subject to the same
/// admin approval gate as doctors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Laboratory {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lab_name: String,
    pub license_number: String,
    pub address: Option<String>,
    pub is_approved: bool,
    pub approved_by_admin_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaboratoryProfileInput {
    pub lab_name: String,
    pub license_number: String,
    pub address: Option<String>,
}

impl Laboratory {
    pub fn from_profile_input(user_id: Uuid, input: &LaboratoryProfileInput) -> Self {
        let now = Utc::now();
        Laboratory {
            id: Uuid::new_v4(),
            user_id,
            lab_name: input.lab_name.clone(),
            license_number: input.license_number.clone(),
            address: input.address.clone(),
            is_approved: false,
            approved_by_admin_id: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn approve(&mut self, admin_id: Uuid, at: DateTime<Utc>) {
        self.is_approved = true;
        self.approved_by_admin_id = Some(admin_id);
        self.approved_at = Some(at);
        self.updated_at = at;
    }

    pub fn revoke_approval(&mut self, at: DateTime<Utc>) {
        self.is_approved = false;
        self.approved_by_admin_id = None;
        self.approved_at = None;
        self.updated_at = at;
    }
}
