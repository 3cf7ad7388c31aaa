// models/src/medical/medical_record.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Vaccination,
    Prescription,
    Diagnosis,
    Consultation,
    Other,
}

impl RecordType {
    pub const ALL: [RecordType; 5] = [
        RecordType::Vaccination,
        RecordType::Prescription,
        RecordType::Diagnosis,
        RecordType::Consultation,
        RecordType::Other,
    ];
}

/// A clinical record owned by one patient, optionally authored by a
/// doctor or a laboratory. Soft-deleted rows keep their data and stay
/// reachable for the admin restore path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub laboratory_id: Option<Uuid>,
    pub record_type: RecordType,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub attachment_url: Option<String>,
    pub is_shared: bool,
    /// End of the sharing window. `None` means shared indefinitely.
    pub shared_until: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicalRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the record is visible through the sharing flag at `now`.
    /// An elapsed `shared_until` closes the window without anyone
    /// touching the row.
    pub fn is_share_window_open(&self, now: DateTime<Utc>) -> bool {
        self.is_shared && self.shared_until.map_or(true, |until| until >= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(is_shared: bool, shared_until: Option<DateTime<Utc>>) -> MedicalRecord {
        let now = Utc::now();
        MedicalRecord {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: None,
            laboratory_id: None,
            record_type: RecordType::Consultation,
            title: "Checkup".to_string(),
            description: None,
            date: now.date_naive(),
            attachment_url: None,
            is_shared,
            shared_until,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unshared_record_has_no_window() {
        let now = Utc::now();
        assert!(!record(false, None).is_share_window_open(now));
    }

    #[test]
    fn open_ended_share_stays_open() {
        let now = Utc::now();
        assert!(record(true, None).is_share_window_open(now));
    }

    #[test]
    fn share_window_closes_after_deadline() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let rec = record(true, Some(deadline));
        assert!(rec.is_share_window_open(deadline));
        assert!(rec.is_share_window_open(deadline - chrono::Duration::days(1)));
        assert!(!rec.is_share_window_open(deadline + chrono::Duration::seconds(1)));
    }
}
