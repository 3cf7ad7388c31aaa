// storage/src/memory.rs
// In-memory implementation of `HealthStore`. One mutex over all tables
// keeps check-then-insert sequences serialized, which is what the
// consent ledger's uniqueness rule relies on.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::errors::{DomainError, DomainResult};
use models::medical::{
    AccessPermission, AuditEvent, Doctor, LabTest, Laboratory, MedicalRecord, Patient,
    Prescription, Role, User,
};

use crate::store::{
    DoctorFilter, HealthStore, LabTestFilter, LaboratoryFilter, MedicalRecordChanges, Page,
    PatientChanges, PermissionFilter, PrescriptionFilter, RecordFilter,
    SystemCounts, UserChanges,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<Uuid, User>,
    patients: BTreeMap<Uuid, Patient>,
    doctors: BTreeMap<Uuid, Doctor>,
    laboratories: BTreeMap<Uuid, Laboratory>,
    medical_records: BTreeMap<Uuid, MedicalRecord>,
    prescriptions: BTreeMap<Uuid, Prescription>,
    lab_tests: BTreeMap<Uuid, LabTest>,
    access_permissions: BTreeMap<Uuid, AccessPermission>,
    audit_events: Vec<AuditEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    internal: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore { internal: Arc::new(Mutex::new(Tables::default())) }
    }

    fn tables(&self) -> DomainResult<MutexGuard<'_, Tables>> {
        self.internal.lock().map_err(|e| DomainError::LockError(e.to_string()))
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn paginate<T>(items: Vec<T>, page: Option<Page>) -> Vec<T> {
    match page {
        None => items,
        Some(p) => items.into_iter().skip(p.offset).take(p.limit).collect(),
    }
}

fn matching_records(tables: &Tables, filter: &RecordFilter) -> Vec<MedicalRecord> {
    let mut rows: Vec<MedicalRecord> = tables
        .medical_records
        .values()
        .filter(|r| filter.include_deleted || !r.is_deleted())
        .filter(|r| filter.patient_id.map_or(true, |id| r.patient_id == id))
        .filter(|r| filter.doctor_id.map_or(true, |id| r.doctor_id == Some(id)))
        .filter(|r| filter.laboratory_id.map_or(true, |id| r.laboratory_id == Some(id)))
        .filter(|r| filter.record_type.map_or(true, |t| r.record_type == t))
        .filter(|r| filter.from_date.map_or(true, |d| r.date >= d))
        .filter(|r| filter.to_date.map_or(true, |d| r.date <= d))
        .filter(|r| filter.created_after.map_or(true, |t| r.created_at >= t))
        .filter(|r| {
            filter.search.as_deref().map_or(true, |needle| {
                contains_ci(&r.title, needle)
                    || r.description.as_deref().map_or(false, |d| contains_ci(d, needle))
            })
        })
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait]
impl HealthStore for InMemoryStore {
    // --- users ---

    async fn create_user(&self, user: User) -> DomainResult<User> {
        let mut tables = self.tables()?;
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(DomainError::AlreadyExists(format!("user with email {}", user.email)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> DomainResult<Option<User>> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_refresh_token(&self, token: &str) -> DomainResult<Option<User>> {
        Ok(self
            .tables()?
            .users
            .values()
            .find(|u| u.refresh_tokens.iter().any(|t| t == token))
            .cloned())
    }

    async fn list_users(&self) -> DomainResult<Vec<User>> {
        let mut users: Vec<User> = self.tables()?.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> DomainResult<User> {
        let mut tables = self.tables()?;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DomainError::NotFound("User".to_string()))?;
        if let Some(v) = changes.first_name {
            user.first_name = v;
        }
        if let Some(v) = changes.last_name {
            user.last_name = v;
        }
        if let Some(v) = changes.phone {
            user.phone = v;
        }
        if let Some(v) = changes.country {
            user.country = Some(v);
        }
        if let Some(v) = changes.avatar {
            user.avatar = Some(v);
        }
        if let Some(v) = changes.role {
            user.role = v;
        }
        if let Some(v) = changes.is_active {
            user.is_active = v;
        }
        if let Some(v) = changes.is_verified {
            user.is_verified = v;
        }
        if let Some(v) = changes.password_hash {
            user.password_hash = v;
        }
        if let Some(v) = changes.refresh_tokens {
            user.refresh_tokens = v;
        }
        if let Some(v) = changes.last_login_at {
            user.last_login_at = Some(v);
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    // --- patients ---

    async fn create_patient(&self, patient: Patient) -> DomainResult<Patient> {
        let mut tables = self.tables()?;
        if tables.patients.values().any(|p| p.user_id == patient.user_id) {
            return Err(DomainError::AlreadyExists("patient profile for this user".to_string()));
        }
        tables.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn find_patient_by_id(&self, id: Uuid) -> DomainResult<Option<Patient>> {
        Ok(self.tables()?.patients.get(&id).cloned())
    }

    async fn find_patient_by_user_id(&self, user_id: Uuid) -> DomainResult<Option<Patient>> {
        Ok(self.tables()?.patients.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn update_patient(&self, id: Uuid, changes: PatientChanges) -> DomainResult<Patient> {
        let mut tables = self.tables()?;
        let patient = tables
            .patients
            .get_mut(&id)
            .ok_or_else(|| DomainError::NotFound("Patient profile".to_string()))?;
        if let Some(v) = changes.date_of_birth {
            patient.date_of_birth = v;
        }
        if let Some(v) = changes.gender {
            patient.gender = v;
        }
        if let Some(v) = changes.blood_type {
            patient.blood_type = v;
        }
        if let Some(v) = changes.genotype {
            patient.genotype = v;
        }
        if let Some(v) = changes.known_allergies {
            patient.known_allergies = Some(v);
        }
        if let Some(v) = changes.known_diseases {
            patient.known_diseases = Some(v);
        }
        if let Some(v) = changes.height_cm {
            patient.height_cm = Some(v);
        }
        if let Some(v) = changes.weight_kg {
            patient.weight_kg = Some(v);
        }
        if let Some(v) = changes.emergency_access_enabled {
            patient.emergency_access_enabled = v;
        }
        if let Some(v) = changes.emergency_access_code {
            patient.emergency_access_code = v;
        }
        patient.updated_at = Utc::now();
        Ok(patient.clone())
    }

    // --- doctors ---

    async fn create_doctor(&self, doctor: Doctor) -> DomainResult<Doctor> {
        let mut tables = self.tables()?;
        if tables.doctors.values().any(|d| d.user_id == doctor.user_id) {
            return Err(DomainError::AlreadyExists("doctor profile for this user".to_string()));
        }
        tables.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn find_doctor_by_id(&self, id: Uuid) -> DomainResult<Option<Doctor>> {
        Ok(self.tables()?.doctors.get(&id).cloned())
    }

    async fn find_doctor_by_user_id(&self, user_id: Uuid) -> DomainResult<Option<Doctor>> {
        Ok(self.tables()?.doctors.values().find(|d| d.user_id == user_id).cloned())
    }

    async fn save_doctor(&self, doctor: Doctor) -> DomainResult<Doctor> {
        let mut tables = self.tables()?;
        if !tables.doctors.contains_key(&doctor.id) {
            return Err(DomainError::NotFound("Doctor profile".to_string()));
        }
        tables.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn list_doctors(&self, filter: DoctorFilter) -> DomainResult<Vec<Doctor>> {
        let mut doctors: Vec<Doctor> = self
            .tables()?
            .doctors
            .values()
            .filter(|d| !filter.approved_only || d.is_approved)
            .filter(|d| {
                filter
                    .specialization_contains
                    .as_deref()
                    .map_or(true, |needle| contains_ci(&d.specialization, needle))
            })
            .cloned()
            .collect();
        doctors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(doctors)
    }

    // --- laboratories ---

    async fn create_laboratory(&self, laboratory: Laboratory) -> DomainResult<Laboratory> {
        let mut tables = self.tables()?;
        if tables.laboratories.values().any(|l| l.user_id == laboratory.user_id) {
            return Err(DomainError::AlreadyExists("laboratory profile for this user".to_string()));
        }
        tables.laboratories.insert(laboratory.id, laboratory.clone());
        Ok(laboratory)
    }

    async fn find_laboratory_by_id(&self, id: Uuid) -> DomainResult<Option<Laboratory>> {
        Ok(self.tables()?.laboratories.get(&id).cloned())
    }

    async fn find_laboratory_by_user_id(&self, user_id: Uuid) -> DomainResult<Option<Laboratory>> {
        Ok(self.tables()?.laboratories.values().find(|l| l.user_id == user_id).cloned())
    }

    async fn save_laboratory(&self, laboratory: Laboratory) -> DomainResult<Laboratory> {
        let mut tables = self.tables()?;
        if !tables.laboratories.contains_key(&laboratory.id) {
            return Err(DomainError::NotFound("Laboratory profile".to_string()));
        }
        tables.laboratories.insert(laboratory.id, laboratory.clone());
        Ok(laboratory)
    }

    async fn list_laboratories(&self, filter: LaboratoryFilter) -> DomainResult<Vec<Laboratory>> {
        let mut labs: Vec<Laboratory> = self
            .tables()?
            .laboratories
            .values()
            .filter(|l| !filter.approved_only || l.is_approved)
            .filter(|l| {
                filter.search.as_deref().map_or(true, |needle| {
                    contains_ci(&l.lab_name, needle)
                        || l.address.as_deref().map_or(false, |a| contains_ci(a, needle))
                })
            })
            .cloned()
            .collect();
        labs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(labs)
    }

    // --- medical records ---

    async fn create_medical_record(&self, record: MedicalRecord) -> DomainResult<MedicalRecord> {
        let mut tables = self.tables()?;
        tables.medical_records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_medical_record(
        &self,
        id: Uuid,
        include_deleted: bool,
    ) -> DomainResult<Option<MedicalRecord>> {
        Ok(self
            .tables()?
            .medical_records
            .get(&id)
            .filter(|r| include_deleted || !r.is_deleted())
            .cloned())
    }

    async fn list_medical_records(&self, filter: RecordFilter) -> DomainResult<Vec<MedicalRecord>> {
        let tables = self.tables()?;
        let page = filter.page;
        Ok(paginate(matching_records(&tables, &filter), page))
    }

    async fn update_medical_record(
        &self,
        id: Uuid,
        changes: MedicalRecordChanges,
    ) -> DomainResult<MedicalRecord> {
        let mut tables = self.tables()?;
        let record = tables
            .medical_records
            .get_mut(&id)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| DomainError::NotFound("Medical record".to_string()))?;
        if let Some(v) = changes.record_type {
            record.record_type = v;
        }
        if let Some(v) = changes.title {
            record.title = v;
        }
        if let Some(v) = changes.description {
            record.description = Some(v);
        }
        if let Some(v) = changes.date {
            record.date = v;
        }
        if let Some(v) = changes.attachment_url {
            record.attachment_url = Some(v);
        }
        if let Some(v) = changes.laboratory_id {
            record.laboratory_id = v;
        }
        if let Some(v) = changes.is_shared {
            record.is_shared = v;
        }
        if let Some(v) = changes.shared_until {
            record.shared_until = v;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn soft_delete_medical_record(&self, id: Uuid) -> DomainResult<()> {
        let mut tables = self.tables()?;
        let record = tables
            .medical_records
            .get_mut(&id)
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| DomainError::NotFound("Medical record".to_string()))?;
        record.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn restore_medical_record(&self, id: Uuid) -> DomainResult<MedicalRecord> {
        let mut tables = self.tables()?;
        let record = tables
            .medical_records
            .get_mut(&id)
            .ok_or_else(|| DomainError::NotFound("Medical record".to_string()))?;
        if !record.is_deleted() {
            return Err(DomainError::InvalidData("Medical record is not deleted".to_string()));
        }
        record.deleted_at = None;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn count_medical_records(&self, filter: RecordFilter) -> DomainResult<usize> {
        let tables = self.tables()?;
        Ok(matching_records(&tables, &filter).len())
    }

    // --- prescriptions ---

    async fn create_prescription(&self, prescription: Prescription) -> DomainResult<Prescription> {
        let mut tables = self.tables()?;
        tables.prescriptions.insert(prescription.id, prescription.clone());
        Ok(prescription)
    }

    async fn list_prescriptions(&self, filter: PrescriptionFilter) -> DomainResult<Vec<Prescription>> {
        let mut rows: Vec<Prescription> = self
            .tables()?
            .prescriptions
            .values()
            .filter(|p| !p.is_deleted())
            .filter(|p| filter.patient_id.map_or(true, |id| p.patient_id == id))
            .filter(|p| filter.doctor_id.map_or(true, |id| p.doctor_id == id))
            .filter(|p| filter.is_active.map_or(true, |v| p.is_active == v))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, filter.page))
    }

    // --- lab tests ---

    async fn create_lab_test(&self, test: LabTest) -> DomainResult<LabTest> {
        let mut tables = self.tables()?;
        tables.lab_tests.insert(test.id, test.clone());
        Ok(test)
    }

    async fn find_lab_test(&self, id: Uuid) -> DomainResult<Option<LabTest>> {
        Ok(self.tables()?.lab_tests.get(&id).filter(|t| !t.is_deleted()).cloned())
    }

    async fn list_lab_tests(&self, filter: LabTestFilter) -> DomainResult<Vec<LabTest>> {
        let mut rows: Vec<LabTest> = self
            .tables()?
            .lab_tests
            .values()
            .filter(|t| !t.is_deleted())
            .filter(|t| filter.patient_id.map_or(true, |id| t.patient_id == id))
            .filter(|t| filter.doctor_id.map_or(true, |id| t.doctor_id == id))
            .filter(|t| filter.laboratory_id.map_or(true, |id| t.laboratory_id == id))
            .filter(|t| filter.statuses.as_ref().map_or(true, |s| s.contains(&t.status)))
            .cloned()
            .collect();
        if filter.oldest_first {
            rows.sort_by(|a, b| a.ordered_date.cmp(&b.ordered_date));
        } else {
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Ok(paginate(rows, filter.page))
    }

    async fn save_lab_test(&self, test: LabTest) -> DomainResult<LabTest> {
        let mut tables = self.tables()?;
        if !tables.lab_tests.contains_key(&test.id) {
            return Err(DomainError::NotFound("Lab test".to_string()));
        }
        tables.lab_tests.insert(test.id, test.clone());
        Ok(test)
    }

    // --- consent ledger ---

    async fn create_access_permission(
        &self,
        permission: AccessPermission,
    ) -> DomainResult<AccessPermission> {
        let mut tables = self.tables()?;
        let now = Utc::now();
        let duplicate = tables.access_permissions.values().any(|p| {
            p.patient_id == permission.patient_id
                && p.granted_to_id == permission.granted_to_id
                && p.is_effective(now)
        });
        if duplicate {
            return Err(DomainError::DuplicateActiveGrant);
        }
        tables.access_permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn find_access_permission(&self, id: Uuid) -> DomainResult<Option<AccessPermission>> {
        Ok(self.tables()?.access_permissions.get(&id).cloned())
    }

    async fn save_access_permission(
        &self,
        permission: AccessPermission,
    ) -> DomainResult<AccessPermission> {
        let mut tables = self.tables()?;
        if !tables.access_permissions.contains_key(&permission.id) {
            return Err(DomainError::PermissionNotFound);
        }
        tables.access_permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn list_access_permissions(
        &self,
        filter: PermissionFilter,
    ) -> DomainResult<Vec<AccessPermission>> {
        let mut rows: Vec<AccessPermission> = self
            .tables()?
            .access_permissions
            .values()
            .filter(|p| filter.patient_id.map_or(true, |id| p.patient_id == id))
            .filter(|p| filter.granted_to_id.map_or(true, |id| p.granted_to_id == id))
            .filter(|p| filter.unexpired_at.map_or(true, |t| p.expires_at > t))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn find_effective_permission(
        &self,
        patient_id: Uuid,
        granted_to_id: Uuid,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<AccessPermission>> {
        Ok(self
            .tables()?
            .access_permissions
            .values()
            .filter(|p| p.patient_id == patient_id && p.granted_to_id == granted_to_id)
            .filter(|p| p.is_effective(now))
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    // --- audit ---

    async fn record_audit_event(&self, event: AuditEvent) -> DomainResult<AuditEvent> {
        let mut tables = self.tables()?;
        tables.audit_events.push(event.clone());
        Ok(event)
    }

    async fn list_audit_events(&self, patient_id: Uuid) -> DomainResult<Vec<AuditEvent>> {
        let mut rows: Vec<AuditEvent> = self
            .tables()?
            .audit_events
            .iter()
            .filter(|e| e.patient_id == patient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(rows)
    }

    // --- aggregates ---

    async fn system_counts(&self, now: DateTime<Utc>) -> DomainResult<SystemCounts> {
        let tables = self.tables()?;
        let role_count =
            |role: Role| tables.users.values().filter(|u| u.role == role).count();
        Ok(SystemCounts {
            total_users: tables.users.len(),
            total_patients: role_count(Role::Patient),
            total_doctors: role_count(Role::Doctor),
            total_laboratories: role_count(Role::Laboratory),
            total_medical_records: tables.medical_records.values().filter(|r| !r.is_deleted()).count(),
            total_prescriptions: tables.prescriptions.values().filter(|p| !p.is_deleted()).count(),
            total_lab_tests: tables.lab_tests.values().filter(|t| !t.is_deleted()).count(),
            total_active_accesses: tables
                .access_permissions
                .values()
                .filter(|p| p.is_effective(now))
                .count(),
        })
    }
}
