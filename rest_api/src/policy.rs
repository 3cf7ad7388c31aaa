// rest_api/src/policy.rs
// Pure visibility decisions. Handlers gather the actor's profile ids and
// any effective consent links first, then ask; nothing in here touches
// the store or the clock.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use models::{LabTest, MedicalRecord, Prescription, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    MedicalRecord,
    Prescription,
    LabTest,
}

/// The slice of a clinical artifact the policy looks at.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub laboratory_id: Option<Uuid>,
    pub is_shared: bool,
    pub shared_until: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

impl ArtifactRef {
    pub fn from_medical_record(record: &MedicalRecord) -> Self {
        ArtifactRef {
            kind: ArtifactKind::MedicalRecord,
            patient_id: record.patient_id,
            doctor_id: record.doctor_id,
            laboratory_id: record.laboratory_id,
            is_shared: record.is_shared,
            shared_until: record.shared_until,
            is_deleted: record.is_deleted(),
        }
    }

    pub fn from_prescription(prescription: &Prescription) -> Self {
        ArtifactRef {
            kind: ArtifactKind::Prescription,
            patient_id: prescription.patient_id,
            doctor_id: Some(prescription.doctor_id),
            laboratory_id: None,
            is_shared: false,
            shared_until: None,
            is_deleted: prescription.is_deleted(),
        }
    }

    pub fn from_lab_test(test: &LabTest) -> Self {
        ArtifactRef {
            kind: ArtifactKind::LabTest,
            patient_id: test.patient_id,
            doctor_id: Some(test.doctor_id),
            laboratory_id: Some(test.laboratory_id),
            is_shared: false,
            shared_until: None,
            is_deleted: test.is_deleted(),
        }
    }

    fn share_window_open(&self, now: DateTime<Utc>) -> bool {
        self.is_shared && self.shared_until.map_or(true, |until| until >= now)
    }
}

/// Who is asking, resolved once per request.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub role: Role,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub laboratory_id: Option<Uuid>,
    /// Patients linked to this user by an effective consent grant.
    pub granted_patient_ids: BTreeSet<Uuid>,
}

impl ActorContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        ActorContext {
            user_id,
            role,
            patient_id: None,
            doctor_id: None,
            laboratory_id: None,
            granted_patient_ids: BTreeSet::new(),
        }
    }

    pub fn with_patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn with_doctor(mut self, doctor_id: Uuid) -> Self {
        self.doctor_id = Some(doctor_id);
        self
    }

    pub fn with_laboratory(mut self, laboratory_id: Uuid) -> Self {
        self.laboratory_id = Some(laboratory_id);
        self
    }

    pub fn with_grant_from(mut self, patient_id: Uuid) -> Self {
        self.granted_patient_ids.insert(patient_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Deleted,
    WrongRole,
    NotOwner,
    ReadOnly,
    NotCreator,
    NotShared,
    NoConsent,
}

impl DenyReason {
    /// Client-facing refusal line.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::NoConsent | DenyReason::NotShared => {
                "Access denied, patient did not allow access"
            }
            _ => "Access denied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

/// First matching rule wins, top to bottom:
/// admin, owning patient, doctor paths, assigned laboratory, then deny.
pub fn can_access(
    actor: &ActorContext,
    artifact: &ArtifactRef,
    intent: AccessIntent,
    now: DateTime<Utc>,
) -> AccessDecision {
    // Admins see everything, soft-deleted rows included.
    if actor.role == Role::Admin {
        return AccessDecision::Allow;
    }
    if artifact.is_deleted {
        return AccessDecision::Deny(DenyReason::Deleted);
    }

    match actor.role {
        Role::Patient => {
            if actor.patient_id != Some(artifact.patient_id) {
                return AccessDecision::Deny(DenyReason::NotOwner);
            }
            match intent {
                AccessIntent::Read => AccessDecision::Allow,
                // Clinical rows stay read-only for their owner.
                AccessIntent::Write => AccessDecision::Deny(DenyReason::ReadOnly),
            }
        }
        Role::Doctor => {
            let is_creator = actor.doctor_id.is_some() && actor.doctor_id == artifact.doctor_id;
            match intent {
                AccessIntent::Write => {
                    if is_creator {
                        AccessDecision::Allow
                    } else {
                        AccessDecision::Deny(DenyReason::NotCreator)
                    }
                }
                AccessIntent::Read => {
                    if is_creator {
                        return AccessDecision::Allow;
                    }
                    if artifact.share_window_open(now) {
                        return AccessDecision::Allow;
                    }
                    if actor.granted_patient_ids.contains(&artifact.patient_id) {
                        return AccessDecision::Allow;
                    }
                    if artifact.is_shared {
                        // A share existed but its window has lapsed.
                        AccessDecision::Deny(DenyReason::NotShared)
                    } else {
                        AccessDecision::Deny(DenyReason::NoConsent)
                    }
                }
            }
        }
        Role::Laboratory => {
            let is_assigned = artifact.kind == ArtifactKind::LabTest
                && actor.laboratory_id.is_some()
                && actor.laboratory_id == artifact.laboratory_id;
            if is_assigned {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny(DenyReason::WrongRole)
            }
        }
        Role::User | Role::Admin => AccessDecision::Deny(DenyReason::WrongRole),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_for(patient_id: Uuid, doctor_id: Option<Uuid>) -> ArtifactRef {
        ArtifactRef {
            kind: ArtifactKind::MedicalRecord,
            patient_id,
            doctor_id,
            laboratory_id: None,
            is_shared: false,
            shared_until: None,
            is_deleted: false,
        }
    }

    fn lab_test_for(patient_id: Uuid, doctor_id: Uuid, laboratory_id: Uuid) -> ArtifactRef {
        ArtifactRef {
            kind: ArtifactKind::LabTest,
            patient_id,
            doctor_id: Some(doctor_id),
            laboratory_id: Some(laboratory_id),
            is_shared: false,
            shared_until: None,
            is_deleted: false,
        }
    }

    #[test]
    fn admin_reads_and_writes_everything_even_deleted() {
        let admin = ActorContext::new(Uuid::new_v4(), Role::Admin);
        let mut record = record_for(Uuid::new_v4(), Some(Uuid::new_v4()));
        record.is_deleted = true;
        let now = Utc::now();

        assert!(can_access(&admin, &record, AccessIntent::Read, now).is_allowed());
        assert!(can_access(&admin, &record, AccessIntent::Write, now).is_allowed());
    }

    #[test]
    fn patient_reads_own_but_cannot_write_clinical_rows() {
        let patient_id = Uuid::new_v4();
        let patient = ActorContext::new(Uuid::new_v4(), Role::Patient).with_patient(patient_id);
        let record = record_for(patient_id, Some(Uuid::new_v4()));
        let now = Utc::now();

        assert!(can_access(&patient, &record, AccessIntent::Read, now).is_allowed());
        assert_eq!(
            can_access(&patient, &record, AccessIntent::Write, now),
            AccessDecision::Deny(DenyReason::ReadOnly)
        );
    }

    #[test]
    fn patient_cannot_read_another_patients_row() {
        let patient = ActorContext::new(Uuid::new_v4(), Role::Patient).with_patient(Uuid::new_v4());
        let record = record_for(Uuid::new_v4(), None);

        assert_eq!(
            can_access(&patient, &record, AccessIntent::Read, Utc::now()),
            AccessDecision::Deny(DenyReason::NotOwner)
        );
    }

    #[test]
    fn creator_doctor_reads_and_writes() {
        let doctor_id = Uuid::new_v4();
        let doctor = ActorContext::new(Uuid::new_v4(), Role::Doctor).with_doctor(doctor_id);
        let record = record_for(Uuid::new_v4(), Some(doctor_id));
        let now = Utc::now();

        assert!(can_access(&doctor, &record, AccessIntent::Read, now).is_allowed());
        assert!(can_access(&doctor, &record, AccessIntent::Write, now).is_allowed());
    }

    #[test]
    fn stranger_doctor_is_refused_for_want_of_consent() {
        let doctor = ActorContext::new(Uuid::new_v4(), Role::Doctor).with_doctor(Uuid::new_v4());
        let record = record_for(Uuid::new_v4(), Some(Uuid::new_v4()));
        let now = Utc::now();

        assert_eq!(
            can_access(&doctor, &record, AccessIntent::Read, now),
            AccessDecision::Deny(DenyReason::NoConsent)
        );
        assert_eq!(
            can_access(&doctor, &record, AccessIntent::Write, now),
            AccessDecision::Deny(DenyReason::NotCreator)
        );
    }

    #[test]
    fn share_window_admits_readers_until_it_lapses() {
        let doctor = ActorContext::new(Uuid::new_v4(), Role::Doctor).with_doctor(Uuid::new_v4());
        let now = Utc::now();

        let mut record = record_for(Uuid::new_v4(), Some(Uuid::new_v4()));
        record.is_shared = true;
        assert!(can_access(&doctor, &record, AccessIntent::Read, now).is_allowed());

        record.shared_until = Some(now + Duration::days(3));
        assert!(can_access(&doctor, &record, AccessIntent::Read, now).is_allowed());

        // The deadline instant itself still admits.
        record.shared_until = Some(now);
        assert!(can_access(&doctor, &record, AccessIntent::Read, now).is_allowed());

        record.shared_until = Some(now - Duration::seconds(1));
        assert_eq!(
            can_access(&doctor, &record, AccessIntent::Read, now),
            AccessDecision::Deny(DenyReason::NotShared)
        );
        // A lapsed share never reopens the write path either.
        assert_eq!(
            can_access(&doctor, &record, AccessIntent::Write, now),
            AccessDecision::Deny(DenyReason::NotCreator)
        );
    }

    #[test]
    fn consent_grant_opens_reads_but_never_writes() {
        let patient_id = Uuid::new_v4();
        let doctor = ActorContext::new(Uuid::new_v4(), Role::Doctor)
            .with_doctor(Uuid::new_v4())
            .with_grant_from(patient_id);
        let record = record_for(patient_id, Some(Uuid::new_v4()));
        let now = Utc::now();

        assert!(can_access(&doctor, &record, AccessIntent::Read, now).is_allowed());
        assert_eq!(
            can_access(&doctor, &record, AccessIntent::Write, now),
            AccessDecision::Deny(DenyReason::NotCreator)
        );
    }

    #[test]
    fn laboratory_touches_only_its_assigned_tests() {
        let laboratory_id = Uuid::new_v4();
        let lab =
            ActorContext::new(Uuid::new_v4(), Role::Laboratory).with_laboratory(laboratory_id);
        let now = Utc::now();

        let own_test = lab_test_for(Uuid::new_v4(), Uuid::new_v4(), laboratory_id);
        assert!(can_access(&lab, &own_test, AccessIntent::Read, now).is_allowed());
        assert!(can_access(&lab, &own_test, AccessIntent::Write, now).is_allowed());

        let foreign_test = lab_test_for(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            can_access(&lab, &foreign_test, AccessIntent::Read, now),
            AccessDecision::Deny(DenyReason::WrongRole)
        );

        // Consent grants do not apply to laboratories.
        let patient_id = Uuid::new_v4();
        let lab_with_grant = ActorContext::new(Uuid::new_v4(), Role::Laboratory)
            .with_laboratory(laboratory_id)
            .with_grant_from(patient_id);
        let record = record_for(patient_id, None);
        assert_eq!(
            can_access(&lab_with_grant, &record, AccessIntent::Read, now),
            AccessDecision::Deny(DenyReason::WrongRole)
        );
    }

    #[test]
    fn prescriptions_and_lab_tests_convert_with_their_assignments() {
        use models::TestStatus;

        let now = Utc::now();
        let doctor_id = Uuid::new_v4();
        let laboratory_id = Uuid::new_v4();

        let prescription = Prescription {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id,
            medication_name: "Lisinopril".to_string(),
            dosage: "10mg".to_string(),
            frequency: "daily".to_string(),
            duration: "30 days".to_string(),
            prescribed_date: now,
            end_date: now.date_naive(),
            instructions: None,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let artifact = ArtifactRef::from_prescription(&prescription);
        assert_eq!(artifact.kind, ArtifactKind::Prescription);
        // Prescriptions carry no share window of their own.
        assert!(!artifact.is_shared);
        let creator = ActorContext::new(Uuid::new_v4(), Role::Doctor).with_doctor(doctor_id);
        assert!(can_access(&creator, &artifact, AccessIntent::Read, now).is_allowed());
        let stranger = ActorContext::new(Uuid::new_v4(), Role::Doctor).with_doctor(Uuid::new_v4());
        assert_eq!(
            can_access(&stranger, &artifact, AccessIntent::Read, now),
            AccessDecision::Deny(DenyReason::NoConsent)
        );

        let test = LabTest {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id,
            laboratory_id,
            test_name: "HbA1c".to_string(),
            status: TestStatus::Pending,
            results: None,
            result_file_url: None,
            doctor_interpretation: None,
            ordered_date: now,
            completed_date: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let artifact = ArtifactRef::from_lab_test(&test);
        assert_eq!(artifact.kind, ArtifactKind::LabTest);
        let lab =
            ActorContext::new(Uuid::new_v4(), Role::Laboratory).with_laboratory(laboratory_id);
        assert!(can_access(&lab, &artifact, AccessIntent::Write, now).is_allowed());
    }

    #[test]
    fn soft_deleted_rows_are_invisible_to_non_admins() {
        let patient_id = Uuid::new_v4();
        let patient = ActorContext::new(Uuid::new_v4(), Role::Patient).with_patient(patient_id);
        let mut record = record_for(patient_id, None);
        record.is_deleted = true;

        assert_eq!(
            can_access(&patient, &record, AccessIntent::Read, Utc::now()),
            AccessDecision::Deny(DenyReason::Deleted)
        );
    }

    #[test]
    fn plain_users_have_no_clinical_visibility() {
        let user = ActorContext::new(Uuid::new_v4(), Role::User);
        let record = record_for(Uuid::new_v4(), None);

        assert_eq!(
            can_access(&user, &record, AccessIntent::Read, Utc::now()),
            AccessDecision::Deny(DenyReason::WrongRole)
        );
    }
}
