// models/src/medical/role.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// The closed set of account roles. Stored and serialized as lowercase
/// strings; unknown values are rejected at the boundary instead of being
/// carried around as free-form text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Patient,
    Doctor,
    Laboratory,
    Admin,
}

impl Role {
    /// Roles that own a professional profile subject to admin approval.
    pub fn is_professional(&self) -> bool {
        matches!(self, Role::Doctor | Role::Laboratory)
    }

    /// Roles eligible to receive a consent grant from a patient.
    pub fn is_grantee_eligible(&self) -> bool {
        self.is_professional()
    }

    /// The one promotion an account performs on its own: a plain `user`
    /// becomes specialized when it creates its first profile. Any other
    /// role change is an admin operation.
    pub fn can_promote_to(&self, target: Role) -> bool {
        *self == Role::User
            && matches!(target, Role::Patient | Role::Doctor | Role::Laboratory)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Laboratory => "laboratory",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "laboratory" => Ok(Role::Laboratory),
            "admin" => Ok(Role::Admin),
            other => Err(ValidationError::UnknownVariant {
                field: "role".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles() {
        assert_eq!(Role::from_str("doctor").unwrap(), Role::Doctor);
        assert_eq!(Role::from_str("LABORATORY").unwrap(), Role::Laboratory);
    }

    #[test]
    fn rejects_unknown_role() {
        assert!(Role::from_str("superuser").is_err());
    }

    #[test]
    fn only_user_can_self_promote() {
        assert!(Role::User.can_promote_to(Role::Patient));
        assert!(Role::User.can_promote_to(Role::Doctor));
        assert!(!Role::User.can_promote_to(Role::Admin));
        assert!(!Role::Patient.can_promote_to(Role::Doctor));
        assert!(!Role::Doctor.can_promote_to(Role::Patient));
    }

    #[test]
    fn grantee_eligibility_tracks_professionals() {
        assert!(Role::Doctor.is_grantee_eligible());
        assert!(Role::Laboratory.is_grantee_eligible());
        assert!(!Role::Patient.is_grantee_eligible());
        assert!(!Role::Admin.is_grantee_eligible());
    }
}
