// rest_api/src/grants.rs
// The consent grant ledger: patients handing professionals a time-boxed
// key to their data, and taking it back.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use models::dates::parse_future_expiry;
use models::{AccessPermission, AccessType, DomainError, Role};
use storage::{HealthStore, PermissionFilter};

use crate::RestApiError;

/// One ledger row together with its effectiveness at read time.
#[derive(Debug, Clone, Serialize)]
pub struct GrantView {
    #[serde(flatten)]
    pub grant: AccessPermission,
    pub is_effective: bool,
}

/// Answer to a doctor asking "may I see this patient?".
#[derive(Debug, Clone, Serialize)]
pub struct AccessProbe {
    pub has_access: bool,
    pub access_details: Option<AccessPermission>,
}

/// Records a new grant from the calling patient to a professional.
///
/// `expires_at` accepts exactly one canonical shape: `YYYY-MM-DD`
/// (end of that day, UTC) or a full RFC 3339 instant. The expiry must
/// lie in the future.
pub async fn grant_access(
    store: &Arc<dyn HealthStore>,
    patient_user_id: Uuid,
    grantee_id: Uuid,
    access_type: AccessType,
    expires_at: &str,
    purpose: Option<String>,
) -> Result<AccessPermission, RestApiError> {
    let patient = store
        .find_patient_by_user_id(patient_user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Patient profile".to_string()))?;

    let grantee = store
        .find_user_by_id(grantee_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("User to grant access to".to_string()))?;
    if !matches!(grantee.role, Role::Doctor | Role::Laboratory) {
        return Err(DomainError::GranteeNotEligible.into());
    }

    let now = Utc::now();
    if store
        .find_effective_permission(patient.id, grantee_id, now)
        .await?
        .is_some()
    {
        return Err(DomainError::DuplicateActiveGrant.into());
    }

    let expires_at = parse_future_expiry(expires_at, now)?;
    // The store re-checks for a live duplicate under its own lock.
    let permission = store
        .create_access_permission(AccessPermission {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            granted_to_id: grantee_id,
            granted_by_id: patient_user_id,
            access_type,
            purpose,
            expires_at,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;

    info!(
        "Access granted: patient {} -> {} {} until {}",
        patient.id, grantee.role, grantee_id, permission.expires_at
    );
    Ok(permission)
}

/// Revokes one of the caller's grants. Revocation is terminal; calling
/// it again on the same row succeeds without changing anything.
pub async fn revoke_access(
    store: &Arc<dyn HealthStore>,
    permission_id: Uuid,
    patient_user_id: Uuid,
) -> Result<AccessPermission, RestApiError> {
    let patient = store
        .find_patient_by_user_id(patient_user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Patient profile".to_string()))?;

    let mut permission = store
        .find_access_permission(permission_id)
        .await?
        .ok_or(DomainError::PermissionNotFound)?;
    // Rows belonging to other patients are indistinguishable from
    // missing ones.
    if permission.patient_id != patient.id || permission.granted_by_id != patient_user_id {
        return Err(DomainError::PermissionNotFound.into());
    }

    if !permission.is_active {
        return Ok(permission);
    }

    permission.revoke(Utc::now());
    let permission = store.save_access_permission(permission).await?;
    info!(
        "Access revoked: patient {} withdrew grant {}",
        patient.id, permission.id
    );
    Ok(permission)
}

/// All of the caller's grants, newest first, each carrying its
/// effectiveness at the time of the call.
pub async fn list_grants(
    store: &Arc<dyn HealthStore>,
    patient_user_id: Uuid,
) -> Result<Vec<GrantView>, RestApiError> {
    let patient = store
        .find_patient_by_user_id(patient_user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Patient profile".to_string()))?;

    let now = Utc::now();
    let grants = store
        .list_access_permissions(PermissionFilter {
            patient_id: Some(patient.id),
            ..PermissionFilter::default()
        })
        .await?;

    Ok(grants
        .into_iter()
        .map(|grant| GrantView {
            is_effective: grant.is_effective(now),
            grant,
        })
        .collect())
}

/// Doctor-side probe for an effective grant from a given patient.
pub async fn check_doctor_access(
    store: &Arc<dyn HealthStore>,
    doctor_user_id: Uuid,
    patient_id: Uuid,
) -> Result<AccessProbe, RestApiError> {
    let grant = store
        .find_effective_permission(patient_id, doctor_user_id, Utc::now())
        .await?;
    Ok(AccessProbe {
        has_access: grant.is_some(),
        access_details: grant,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{Gender, NewUser, Patient, PatientProfileInput, User, ValidationError};
    use storage::InMemoryStore;

    fn sample_user(email: &str, role: Role) -> User {
        let mut user = User::from_new_user(NewUser {
            first_name: "Ama".to_string(),
            last_name: "Mensah".to_string(),
            email: email.to_string(),
            password: "Passw0rd99".to_string(),
            phone: "123456789".to_string(),
            country: Some("GH".to_string()),
            avatar: None,
        })
        .unwrap();
        user.role = role;
        user
    }

    async fn seeded_patient(store: &Arc<dyn HealthStore>, email: &str) -> (User, Patient) {
        let user = store
            .create_user(sample_user(email, Role::Patient))
            .await
            .unwrap();
        let input = PatientProfileInput {
            date_of_birth: "1990-04-12".to_string(),
            gender: Gender::Female,
            blood_type: None,
            genotype: None,
            known_allergies: None,
            known_diseases: None,
            height_cm: None,
            weight_kg: None,
        };
        let patient = store
            .create_patient(Patient::from_profile_input(user.id, &input).unwrap())
            .await
            .unwrap();
        (user, patient)
    }

    async fn seeded_doctor_user(store: &Arc<dyn HealthStore>, email: &str) -> User {
        store
            .create_user(sample_user(email, Role::Doctor))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn grant_records_an_active_row_for_the_profile() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let (user, patient) = seeded_patient(&store, "grantee@example.com").await;
        let doctor = seeded_doctor_user(&store, "doc@example.com").await;

        let permission = grant_access(
            &store,
            user.id,
            doctor.id,
            AccessType::View,
            "2031-01-15",
            Some("Follow-up".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(permission.patient_id, patient.id);
        assert_eq!(permission.granted_to_id, doctor.id);
        assert_eq!(permission.granted_by_id, user.id);
        assert!(permission.is_active);
        assert!(permission.is_effective(Utc::now()));
    }

    #[tokio::test]
    async fn grant_refuses_plain_users_and_strangers() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let (user, _) = seeded_patient(&store, "owner@example.com").await;
        let bystander = store
            .create_user(sample_user("bystander@example.com", Role::User))
            .await
            .unwrap();

        let err = grant_access(&store, user.id, bystander.id, AccessType::View, "2031-01-15", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RestApiError::Domain(DomainError::GranteeNotEligible)
        ));

        let err = grant_access(
            &store,
            user.id,
            Uuid::new_v4(),
            AccessType::View,
            "2031-01-15",
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RestApiError::Domain(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn live_duplicate_blocks_but_revoked_one_does_not() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let (user, _) = seeded_patient(&store, "repeat@example.com").await;
        let doctor = seeded_doctor_user(&store, "doc2@example.com").await;

        let first = grant_access(&store, user.id, doctor.id, AccessType::View, "2031-01-15", None)
            .await
            .unwrap();

        let err = grant_access(&store, user.id, doctor.id, AccessType::Edit, "2032-01-15", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RestApiError::Domain(DomainError::DuplicateActiveGrant)
        ));

        revoke_access(&store, first.id, user.id).await.unwrap();
        grant_access(&store, user.id, doctor.id, AccessType::View, "2031-06-01", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expiry_must_be_canonical_and_in_the_future() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let (user, _) = seeded_patient(&store, "dates@example.com").await;
        let doctor = seeded_doctor_user(&store, "doc3@example.com").await;

        let err = grant_access(&store, user.id, doctor.id, AccessType::View, "15-06-2031", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RestApiError::Validation(ValidationError::InvalidDateFormat(_))
        ));

        let err = grant_access(&store, user.id, doctor.id, AccessType::View, "2001-01-01", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RestApiError::Validation(ValidationError::DateNotInFuture(_))
        ));
    }

    #[tokio::test]
    async fn revocation_is_scoped_terminal_and_idempotent() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let (owner, _) = seeded_patient(&store, "careful@example.com").await;
        let (other, _) = seeded_patient(&store, "other@example.com").await;
        let doctor = seeded_doctor_user(&store, "doc4@example.com").await;

        let permission =
            grant_access(&store, owner.id, doctor.id, AccessType::View, "2031-01-15", None)
                .await
                .unwrap();

        // Someone else's row reads as missing.
        let err = revoke_access(&store, permission.id, other.id).await.unwrap_err();
        assert!(matches!(
            err,
            RestApiError::Domain(DomainError::PermissionNotFound)
        ));

        let revoked = revoke_access(&store, permission.id, owner.id).await.unwrap();
        assert!(!revoked.is_active);

        let again = revoke_access(&store, permission.id, owner.id).await.unwrap();
        assert!(!again.is_active);
    }

    #[tokio::test]
    async fn listing_annotates_effectiveness() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let (user, _) = seeded_patient(&store, "lister@example.com").await;
        let doctor = seeded_doctor_user(&store, "doc5@example.com").await;
        let second = seeded_doctor_user(&store, "doc6@example.com").await;

        let kept = grant_access(&store, user.id, doctor.id, AccessType::View, "2031-01-15", None)
            .await
            .unwrap();
        let dropped =
            grant_access(&store, user.id, second.id, AccessType::View, "2031-01-15", None)
                .await
                .unwrap();
        revoke_access(&store, dropped.id, user.id).await.unwrap();

        let grants = list_grants(&store, user.id).await.unwrap();
        assert_eq!(grants.len(), 2);
        for view in grants {
            if view.grant.id == kept.id {
                assert!(view.is_effective);
            } else {
                assert!(!view.is_effective);
            }
        }
    }

    #[tokio::test]
    async fn probe_follows_the_ledger() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let (user, patient) = seeded_patient(&store, "probed@example.com").await;
        let doctor = seeded_doctor_user(&store, "doc7@example.com").await;

        let before = check_doctor_access(&store, doctor.id, patient.id).await.unwrap();
        assert!(!before.has_access);
        assert!(before.access_details.is_none());

        let permission =
            grant_access(&store, user.id, doctor.id, AccessType::View, "2031-01-15", None)
                .await
                .unwrap();

        let after = check_doctor_access(&store, doctor.id, patient.id).await.unwrap();
        assert!(after.has_access);
        assert_eq!(
            after.access_details.map(|detail| detail.id),
            Some(permission.id)
        );
    }
}
