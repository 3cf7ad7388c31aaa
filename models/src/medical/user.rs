// models/src/medical/user.rs
// Stores the bcrypt hash only; the plaintext password never leaves the
// registration DTO.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use bcrypt::{DEFAULT_COST, hash, verify};
use serde_json::json;
use uuid::Uuid;

use crate::errors::{FieldError, ValidationError, ValidationResult};
use crate::medical::role::Role;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]+$").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+([\.-]?\w+)*@\w+([\.-]?\w+)*(\.\w{2,3})+$").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9,13}$").unwrap());
static PASSWORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]\w{7,14}$").unwrap());

// --- DTO for New User Registration ---
// Temporarily holds the plaintext password for hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String, // Plaintext password for input
    pub phone: String,
    pub country: Option<String>,
    pub avatar: Option<String>,
}

impl NewUser {
    /// Shape checks for registration input. All failing fields are
    /// collected so the client sees every problem at once.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if !NAME_RE.is_match(&self.first_name) {
            errors.push(FieldError::new("first_name", "must be alphanumeric"));
        }
        if !NAME_RE.is_match(&self.last_name) {
            errors.push(FieldError::new("last_name", "must be alphanumeric"));
        }
        if !EMAIL_RE.is_match(&self.email) {
            errors.push(FieldError::new("email", "must be a valid email address"));
        }
        if !PHONE_RE.is_match(&self.phone) {
            errors.push(FieldError::new("phone", "must be 9 to 13 digits"));
        }
        if !PASSWORD_RE.is_match(&self.password) {
            errors.push(FieldError::new(
                "password",
                "must start with a letter and be 8 to 15 word characters",
            ));
        }
        if errors.is_empty() { Ok(()) } else { Err(ValidationError::Fields(errors)) }
    }
}

// --- Stored User Struct ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub country: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    /// Live refresh tokens, one per session. Mutated read-modify-write;
    /// concurrent writers are last-write-wins and a lost entry only
    /// forces that session to log in again.
    pub refresh_tokens: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Hashes a plaintext password.
    pub fn hash_password(password: &str) -> ValidationResult<String> {
        hash(password, DEFAULT_COST).map_err(|_| ValidationError::PasswordHashingFailed)
    }

    /// Verifies a plaintext password against the stored hash.
    pub fn verify_password(&self, password: &str) -> bool {
        verify(password, &self.password_hash).unwrap_or(false)
    }

    /// Creates a `User` from a registration DTO, validating the fields
    /// and hashing the password. New accounts always start as `user`;
    /// the role changes when a profile is first created or when an admin
    /// intervenes.
    pub fn from_new_user(new_user: NewUser) -> ValidationResult<Self> {
        new_user.validate()?;
        let now = Utc::now();
        let password_hash = Self::hash_password(&new_user.password)?;

        Ok(User {
            id: Uuid::new_v4(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email: new_user.email,
            phone: new_user.phone,
            password_hash,
            country: new_user.country,
            avatar: new_user.avatar,
            role: Role::User,
            is_active: true,
            is_verified: false,
            refresh_tokens: Vec::new(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    // --- refresh-credential list operations ---

    pub fn has_refresh_token(&self, token: &str) -> bool {
        self.refresh_tokens.iter().any(|t| t == token)
    }

    pub fn push_refresh_token(&mut self, token: String) {
        self.refresh_tokens.push(token);
    }

    /// Removes the presented token. Returns whether it was present.
    pub fn remove_refresh_token(&mut self, token: &str) -> bool {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|t| t != token);
        self.refresh_tokens.len() != before
    }

    /// Swaps a spent refresh token for its replacement.
    pub fn rotate_refresh_token(&mut self, old: &str, new: String) {
        self.remove_refresh_token(old);
        self.push_refresh_token(new);
    }

    /// Drops every session. Used when a rotated-out token is replayed.
    pub fn clear_refresh_tokens(&mut self) {
        self.refresh_tokens.clear();
    }

    /// Public projection of the account. The password hash and the
    /// refresh-token list never appear in responses.
    pub fn sanitized(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "email": self.email,
            "phone": self.phone,
            "country": self.country,
            "avatar": self.avatar,
            "role": self.role,
            "is_active": self.is_active,
            "is_verified": self.is_verified,
            "last_login_at": self.last_login_at,
            "created_at": self.created_at,
        })
    }
}
