// security/src/roles.rs
// Route-level role and approval gates.

use std::sync::Arc;

use uuid::Uuid;

use models::Role;
use storage::HealthStore;

use crate::AuthError;

/// Role gate for a route. The error message names every role that would
/// have been accepted.
pub fn authorize(role: Role, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&role) {
        return Ok(());
    }
    let wanted = allowed
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Err(AuthError::AccessDenied(wanted))
}

/// Approval gate for professional routes. Doctors and laboratories need a
/// profile row plus an admin approval before acting in their role; every
/// other role passes through untouched.
pub async fn ensure_approved_professional(
    store: &Arc<dyn HealthStore>,
    user_id: Uuid,
    role: Role,
) -> Result<(), AuthError> {
    match role {
        Role::Doctor => {
            let doctor = store
                .find_doctor_by_user_id(user_id)
                .await?
                .ok_or(AuthError::ProfileNotFound(Role::Doctor))?;
            if !doctor.is_approved {
                return Err(AuthError::ProfileNotApproved(Role::Doctor));
            }
            Ok(())
        }
        Role::Laboratory => {
            let laboratory = store
                .find_laboratory_by_user_id(user_id)
                .await?
                .ok_or(AuthError::ProfileNotFound(Role::Laboratory))?;
            if !laboratory.is_approved {
                return Err(AuthError::ProfileNotApproved(Role::Laboratory));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
