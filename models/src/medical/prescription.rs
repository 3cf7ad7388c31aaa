// models/src/medical/prescription.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub prescribed_date: DateTime<Utc>,
    pub end_date: NaiveDate,
    pub instructions: Option<String>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prescription {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// A prescription counts as current while the flag is up and the end
    /// date has not passed. The end date itself is inclusive.
    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.is_active && self.end_date >= today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prescription(is_active: bool, end_date: NaiveDate) -> Prescription {
        let now = Utc::now();
        Prescription {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            medication_name: "Amoxicillin".to_string(),
            dosage: "500mg".to_string(),
            frequency: "3x daily".to_string(),
            duration: "7 days".to_string(),
            prescribed_date: now,
            end_date,
            instructions: None,
            is_active,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn current_through_the_end_date_inclusive() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 10).unwrap();
        assert!(prescription(true, today).is_current(today));
        assert!(!prescription(true, today.pred_opt().unwrap()).is_current(today));
        assert!(!prescription(false, today).is_current(today));
    }
}
