// storage/src/store.rs
// The persistence boundary. Handlers and the security layer talk to an
// `Arc<dyn HealthStore>`; engines implement this trait.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use models::errors::DomainResult;
use models::medical::{
    AccessPermission, AuditEvent, Doctor, LabTest, Laboratory, MedicalRecord, Patient,
    Prescription, RecordType, Role, TestStatus, User,
};

/// Pagination window. The default matches the API's page size.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Page { limit: 50, offset: 0 }
    }
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Page { limit, offset }
    }
}

/// Partial update for a user row. Only `Some` fields are applied;
/// `updated_at` is refreshed whenever anything changes.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub avatar: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub password_hash: Option<String>,
    /// Whole-list replacement; callers read, modify and write back.
    pub refresh_tokens: Option<Vec<String>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct PatientChanges {
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<models::medical::Gender>,
    pub blood_type: Option<models::medical::BloodType>,
    pub genotype: Option<models::medical::Genotype>,
    pub known_allergies: Option<String>,
    pub known_diseases: Option<String>,
    pub height_cm: Option<f32>,
    pub weight_kg: Option<f32>,
    pub emergency_access_enabled: Option<bool>,
    /// `Some(None)` clears the stored code.
    pub emergency_access_code: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct MedicalRecordChanges {
    pub record_type: Option<RecordType>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub attachment_url: Option<String>,
    pub laboratory_id: Option<Option<Uuid>>,
    pub is_shared: Option<bool>,
    pub shared_until: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct DoctorFilter {
    pub approved_only: bool,
    /// Case-insensitive substring over the specialization.
    pub specialization_contains: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LaboratoryFilter {
    pub approved_only: bool,
    /// Case-insensitive substring over lab name and address.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub laboratory_id: Option<Uuid>,
    pub record_type: Option<RecordType>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    /// Case-insensitive substring over title and description.
    pub search: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub include_deleted: bool,
    pub page: Option<Page>,
}

#[derive(Debug, Clone, Default)]
pub struct PrescriptionFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub page: Option<Page>,
}

#[derive(Debug, Clone, Default)]
pub struct LabTestFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub laboratory_id: Option<Uuid>,
    pub statuses: Option<Vec<TestStatus>>,
    /// Work queues read oldest first; everything else newest first.
    pub oldest_first: bool,
    pub page: Option<Page>,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionFilter {
    pub patient_id: Option<Uuid>,
    pub granted_to_id: Option<Uuid>,
    /// Keep only rows whose expiry lies after the given instant.
    pub unexpired_at: Option<DateTime<Utc>>,
}

/// Aggregate counters for the admin statistics endpoint.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemCounts {
    pub total_users: usize,
    pub total_patients: usize,
    pub total_doctors: usize,
    pub total_laboratories: usize,
    pub total_medical_records: usize,
    pub total_prescriptions: usize,
    pub total_lab_tests: usize,
    pub total_active_accesses: usize,
}

#[async_trait]
pub trait HealthStore: Send + Sync {
    // --- users ---
    /// Inserts a user. Fails with `AlreadyExists` when the email is taken.
    async fn create_user(&self, user: User) -> DomainResult<User>;
    async fn find_user_by_id(&self, id: Uuid) -> DomainResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> DomainResult<Option<User>>;
    /// The account currently holding the given refresh token, if any.
    async fn find_user_by_refresh_token(&self, token: &str) -> DomainResult<Option<User>>;
    /// All accounts, newest first.
    async fn list_users(&self) -> DomainResult<Vec<User>>;
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> DomainResult<User>;

    // --- patients ---
    async fn create_patient(&self, patient: Patient) -> DomainResult<Patient>;
    async fn find_patient_by_id(&self, id: Uuid) -> DomainResult<Option<Patient>>;
    async fn find_patient_by_user_id(&self, user_id: Uuid) -> DomainResult<Option<Patient>>;
    async fn update_patient(&self, id: Uuid, changes: PatientChanges) -> DomainResult<Patient>;

    // --- doctors ---
    async fn create_doctor(&self, doctor: Doctor) -> DomainResult<Doctor>;
    async fn find_doctor_by_id(&self, id: Uuid) -> DomainResult<Option<Doctor>>;
    async fn find_doctor_by_user_id(&self, user_id: Uuid) -> DomainResult<Option<Doctor>>;
    /// Full-row replacement keyed by id.
    async fn save_doctor(&self, doctor: Doctor) -> DomainResult<Doctor>;
    async fn list_doctors(&self, filter: DoctorFilter) -> DomainResult<Vec<Doctor>>;

    // --- laboratories ---
    async fn create_laboratory(&self, laboratory: Laboratory) -> DomainResult<Laboratory>;
    async fn find_laboratory_by_id(&self, id: Uuid) -> DomainResult<Option<Laboratory>>;
    async fn find_laboratory_by_user_id(&self, user_id: Uuid) -> DomainResult<Option<Laboratory>>;
    async fn save_laboratory(&self, laboratory: Laboratory) -> DomainResult<Laboratory>;
    async fn list_laboratories(&self, filter: LaboratoryFilter) -> DomainResult<Vec<Laboratory>>;

    // --- medical records ---
    async fn create_medical_record(&self, record: MedicalRecord) -> DomainResult<MedicalRecord>;
    /// Soft-deleted rows are only returned when `include_deleted` is set.
    async fn find_medical_record(&self, id: Uuid, include_deleted: bool) -> DomainResult<Option<MedicalRecord>>;
    async fn list_medical_records(&self, filter: RecordFilter) -> DomainResult<Vec<MedicalRecord>>;
    async fn update_medical_record(&self, id: Uuid, changes: MedicalRecordChanges) -> DomainResult<MedicalRecord>;
    async fn soft_delete_medical_record(&self, id: Uuid) -> DomainResult<()>;
    /// Clears the deletion marker. Fails with `InvalidData` when the row
    /// is not deleted.
    async fn restore_medical_record(&self, id: Uuid) -> DomainResult<MedicalRecord>;
    async fn count_medical_records(&self, filter: RecordFilter) -> DomainResult<usize>;

    // --- prescriptions ---
    async fn create_prescription(&self, prescription: Prescription) -> DomainResult<Prescription>;
    async fn list_prescriptions(&self, filter: PrescriptionFilter) -> DomainResult<Vec<Prescription>>;

    // --- lab tests ---
    async fn create_lab_test(&self, test: LabTest) -> DomainResult<LabTest>;
    async fn find_lab_test(&self, id: Uuid) -> DomainResult<Option<LabTest>>;
    async fn list_lab_tests(&self, filter: LabTestFilter) -> DomainResult<Vec<LabTest>>;
    async fn save_lab_test(&self, test: LabTest) -> DomainResult<LabTest>;

    // --- consent ledger ---
    /// Inserts a grant. The no-duplicate rule is enforced here, under
    /// the engine's own serialization: if an effective grant already
    /// links the patient to the grantee, `DuplicateActiveGrant` comes
    /// back and nothing is written.
    async fn create_access_permission(&self, permission: AccessPermission) -> DomainResult<AccessPermission>;
    async fn find_access_permission(&self, id: Uuid) -> DomainResult<Option<AccessPermission>>;
    async fn save_access_permission(&self, permission: AccessPermission) -> DomainResult<AccessPermission>;
    /// Newest first.
    async fn list_access_permissions(&self, filter: PermissionFilter) -> DomainResult<Vec<AccessPermission>>;
    /// The effective grant linking a patient to a grantee, if any.
    async fn find_effective_permission(
        &self,
        patient_id: Uuid,
        granted_to_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<AccessPermission>>;

    // --- audit ---
    async fn record_audit_event(&self, event: AuditEvent) -> DomainResult<AuditEvent>;
    async fn list_audit_events(&self, patient_id: Uuid) -> DomainResult<Vec<AuditEvent>>;

    // --- aggregates ---
    async fn system_counts(&self, now: DateTime<Utc>) -> DomainResult<SystemCounts>;
}
