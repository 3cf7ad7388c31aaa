// models/src/medical/patient.rs

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{FieldError, ValidationError, ValidationResult};

static EMERGENCY_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4,6}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
    #[serde(rename = "unknown")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genotype {
    #[serde(rename = "AA")]
    Aa,
    #[serde(rename = "AS")]
    As,
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "SS")]
    Ss,
    #[serde(rename = "SC")]
    Sc,
    #[serde(rename = "CC")]
    Cc,
    #[serde(rename = "unknown")]
    Unknown,
}

/// Patient profile, one-to-one with a `User` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub blood_type: BloodType,
    pub genotype: Genotype,
    /// Comma-separated free text, as entered by the patient.
    pub known_allergies: Option<String>,
    pub known_diseases: Option<String>,
    pub height_cm: Option<f32>,
    pub weight_kg: Option<f32>,
    /// Break-glass switch. Off by default; the patient opts in and picks
    /// the code.
    pub emergency_access_enabled: bool,
    pub emergency_access_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert DTO for the patient's own profile.
#[derive(Debug, Clone, Deserialize)]
pub struct PatientProfileInput {
    pub date_of_birth: String,
    pub gender: Gender,
    #[serde(default)]
    pub blood_type: Option<BloodType>,
    #[serde(default)]
    pub genotype: Option<Genotype>,
    pub known_allergies: Option<String>,
    pub known_diseases: Option<String>,
    pub height_cm: Option<f32>,
    pub weight_kg: Option<f32>,
}

impl Patient {
    pub fn from_profile_input(user_id: Uuid, input: &PatientProfileInput) -> ValidationResult<Self> {
        let dob = crate::dates::parse_date(&input.date_of_birth)?;
        let now = Utc::now();
        Ok(Patient {
            id: Uuid::new_v4(),
            user_id,
            date_of_birth: dob,
            gender: input.gender,
            blood_type: input.blood_type.unwrap_or(BloodType::Unknown),
            genotype: input.genotype.unwrap_or(Genotype::Unknown),
            known_allergies: input.known_allergies.clone(),
            known_diseases: input.known_diseases.clone(),
            height_cm: input.height_cm,
            weight_kg: input.weight_kg,
            emergency_access_enabled: false,
            emergency_access_code: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Emergency codes are short numeric PINs, four to six digits.
pub fn validate_emergency_code(code: &str) -> ValidationResult<()> {
    if EMERGENCY_CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(ValidationError::Fields(vec![FieldError::new(
            "emergency_access_code",
            "must be 4 to 6 digits",
        )]))
    }
}
