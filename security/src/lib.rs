// security/src/lib.rs
// JWT issuance and session lifecycle for the health records API. The REST
// layer adapts these into extractors and handlers; nothing here knows about
// HTTP frameworks.

pub mod emergency;
pub mod identity;
pub mod roles;

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use models::{DomainError, Role, User};
use storage::{HealthStore, UserChanges};

pub use emergency::{EmergencyGrant, emergency_authenticate};
pub use identity::{AuthenticatedUser, resolve_identity, token_from_parts};
pub use roles::{authorize, ensure_approved_professional};

/// Claims carried by both access and refresh tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: u64,
    pub iat: u64,
}

/// Which signing key and lifetime a token is minted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signing secrets and lifetimes, supplied by the server configuration.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_days: i64,
    pub refresh_ttl_days: i64,
}

impl TokenSettings {
    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.access_secret.as_bytes(),
            TokenKind::Refresh => self.refresh_secret.as_bytes(),
        }
    }

    fn ttl_days(&self, kind: TokenKind) -> i64 {
        match kind {
            TokenKind::Access => self.access_ttl_days,
            TokenKind::Refresh => self.refresh_ttl_days,
        }
    }
}

/// A freshly issued access/refresh pair. The refresh half travels only in
/// the `jwt` cookie; the access half goes to the response body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug)]
pub enum AuthError {
    MissingCredential,
    InvalidToken,
    TokenExpired,
    InvalidCredentials,
    UserExists,
    UserNotFound,
    AccountDeactivated,
    AccessDenied(String),
    ProfileNotFound(Role),
    ProfileNotApproved(Role),
    PatientNotFound,
    EmergencyAccessDisabled,
    InvalidEmergencyCode,
    JwtError(String),
    StorageError(String),
}

fn profile_label(role: &Role) -> &'static str {
    match role {
        Role::Doctor => "Doctor",
        Role::Laboratory => "Laboratory",
        _ => "Professional",
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingCredential => write!(f, "Authentication required"),
            AuthError::InvalidToken => write!(f, "Invalid token."),
            AuthError::TokenExpired => write!(f, "Token expired. Please login again."),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::UserExists => write!(f, "User already exists"),
            AuthError::UserNotFound => write!(f, "User not found"),
            AuthError::AccountDeactivated => {
                write!(f, "Account is deactivated. Please contact administrator.")
            }
            AuthError::AccessDenied(roles) => {
                write!(f, "Access denied. Required roles: {}", roles)
            }
            AuthError::ProfileNotFound(role) => write!(
                f,
                "{} profile not found. Please complete your profile.",
                profile_label(role)
            ),
            AuthError::ProfileNotApproved(role) => write!(
                f,
                "{} profile not approved. Please wait for admin approval.",
                profile_label(role)
            ),
            AuthError::PatientNotFound => write!(f, "Patient not found"),
            // One refusal line for both break-glass failures; the wire
            // must not say which check tripped.
            AuthError::EmergencyAccessDisabled | AuthError::InvalidEmergencyCode => {
                write!(f, "Emergency access denied. Invalid code or access not enabled.")
            }
            AuthError::JwtError(msg) => write!(f, "JWT error: {}", msg),
            AuthError::StorageError(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::AlreadyExists(_) => AuthError::UserExists,
            other => AuthError::StorageError(other.to_string()),
        }
    }
}

/// Signs a token for the given account. `exp` counts whole days from now.
pub fn issue_token(
    user_id: Uuid,
    role: Role,
    kind: TokenKind,
    settings: &TokenSettings,
) -> Result<String, AuthError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AuthError::JwtError(e.to_string()))?
        .as_secs();
    let exp = now as i64 + settings.ttl_days(kind) * 24 * 60 * 60;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: exp.max(0) as u64,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.secret(kind)),
    )
    .map_err(|e| AuthError::JwtError(e.to_string()))
}

/// Verifies signature and expiry for a token of the given kind.
pub fn decode_token(
    token: &str,
    kind: TokenKind,
    settings: &TokenSettings,
) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.secret(kind)),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })
}

/// Mints a matching access/refresh pair for one account.
pub fn issue_pair(user: &User, settings: &TokenSettings) -> Result<TokenPair, AuthError> {
    Ok(TokenPair {
        access_token: issue_token(user.id, user.role, TokenKind::Access, settings)?,
        refresh_token: issue_token(user.id, user.role, TokenKind::Refresh, settings)?,
    })
}

/// Registers a validated account and opens its first session.
///
/// The caller validates and hashes the incoming payload via
/// `User::from_new_user` before handing the row over.
pub async fn register_user(
    store: &Arc<dyn HealthStore>,
    user: User,
    settings: &TokenSettings,
) -> Result<(User, TokenPair), AuthError> {
    if store.find_user_by_email(&user.email).await?.is_some() {
        return Err(AuthError::UserExists);
    }

    let created = store.create_user(user).await?;
    let pair = issue_pair(&created, settings)?;

    let mut tokens = created.refresh_tokens.clone();
    tokens.push(pair.refresh_token.clone());
    let saved = store
        .update_user(
            created.id,
            UserChanges {
                refresh_tokens: Some(tokens),
                ..Default::default()
            },
        )
        .await?;

    Ok((saved, pair))
}

/// Verifies credentials and rotates the refresh token list.
///
/// `presented_refresh` is the `jwt` cookie sent with the login request, if
/// any. A cookie the account no longer holds means an earlier rotation was
/// replayed, so every outstanding session is dropped before the new one is
/// granted.
pub async fn login_user(
    store: &Arc<dyn HealthStore>,
    email: &str,
    password: &str,
    presented_refresh: Option<&str>,
    settings: &TokenSettings,
) -> Result<(User, TokenPair), AuthError> {
    let user = store
        .find_user_by_email(email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !user.verify_password(password) {
        return Err(AuthError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(AuthError::AccountDeactivated);
    }

    let mut tokens: Vec<String> = match presented_refresh {
        Some(presented) if !user.has_refresh_token(presented) => {
            warn!(email = %user.email, "refresh token reuse detected at login; clearing sessions");
            Vec::new()
        }
        Some(presented) => user
            .refresh_tokens
            .iter()
            .filter(|t| t.as_str() != presented)
            .cloned()
            .collect(),
        None => user.refresh_tokens.clone(),
    };

    let pair = issue_pair(&user, settings)?;
    tokens.push(pair.refresh_token.clone());

    let saved = store
        .update_user(
            user.id,
            UserChanges {
                refresh_tokens: Some(tokens),
                last_login_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    Ok((saved, pair))
}

/// Exchanges a live refresh token for a new pair, retiring the old token.
///
/// A token no account holds is treated as replay: if it still decodes, the
/// account it was minted for loses all outstanding sessions.
pub async fn refresh_session(
    store: &Arc<dyn HealthStore>,
    presented: &str,
    settings: &TokenSettings,
) -> Result<(User, TokenPair), AuthError> {
    let Some(user) = store.find_user_by_refresh_token(presented).await? else {
        if let Ok(claims) = decode_token(presented, TokenKind::Refresh, settings) {
            if let Ok(user_id) = Uuid::parse_str(&claims.sub) {
                if let Some(hacked) = store.find_user_by_id(user_id).await? {
                    warn!(email = %hacked.email, "refresh token reuse detected; clearing sessions");
                    store
                        .update_user(
                            hacked.id,
                            UserChanges {
                                refresh_tokens: Some(Vec::new()),
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }
        }
        return Err(AuthError::InvalidToken);
    };

    let remaining: Vec<String> = user
        .refresh_tokens
        .iter()
        .filter(|t| t.as_str() != presented)
        .cloned()
        .collect();

    let claims = match decode_token(presented, TokenKind::Refresh, settings) {
        Ok(claims) => claims,
        Err(e) => {
            // Dead token stays retired even though the exchange fails.
            store
                .update_user(
                    user.id,
                    UserChanges {
                        refresh_tokens: Some(remaining),
                        ..Default::default()
                    },
                )
                .await?;
            return Err(e);
        }
    };

    if claims.sub != user.id.to_string() {
        store
            .update_user(
                user.id,
                UserChanges {
                    refresh_tokens: Some(remaining),
                    ..Default::default()
                },
            )
            .await?;
        return Err(AuthError::InvalidToken);
    }

    let pair = issue_pair(&user, settings)?;
    let mut tokens = remaining;
    tokens.push(pair.refresh_token.clone());

    let saved = store
        .update_user(
            user.id,
            UserChanges {
                refresh_tokens: Some(tokens),
                ..Default::default()
            },
        )
        .await?;

    Ok((saved, pair))
}

/// Retires one refresh token. Returns whether any account held it.
pub async fn logout_user(store: &Arc<dyn HealthStore>, token: &str) -> Result<bool, AuthError> {
    let Some(user) = store.find_user_by_refresh_token(token).await? else {
        return Ok(false);
    };

    let remaining: Vec<String> = user
        .refresh_tokens
        .iter()
        .filter(|t| t.as_str() != token)
        .cloned()
        .collect();
    store
        .update_user(
            user.id,
            UserChanges {
                refresh_tokens: Some(remaining),
                ..Default::default()
            },
        )
        .await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::NewUser;
    use storage::InMemoryStore;

    fn settings() -> TokenSettings {
        TokenSettings {
            access_secret: "access-secret-for-tests".to_string(),
            refresh_secret: "refresh-secret-for-tests".to_string(),
            access_ttl_days: 15,
            refresh_ttl_days: 30,
        }
    }

    fn store() -> Arc<dyn HealthStore> {
        Arc::new(InMemoryStore::new())
    }

    fn sample_user(email: &str) -> User {
        User::from_new_user(NewUser {
            first_name: "Ada".to_string(),
            last_name: "Osei".to_string(),
            email: email.to_string(),
            password: "Passw0rd99".to_string(),
            phone: "123456789".to_string(),
            country: Some("GH".to_string()),
            avatar: None,
        })
        .unwrap()
    }

    #[test]
    fn access_token_roundtrip() {
        let settings = settings();
        let id = Uuid::new_v4();
        let token = issue_token(id, Role::Patient, TokenKind::Access, &settings).unwrap();
        let claims = decode_token(&token, TokenKind::Access, &settings).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.role, "patient");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let settings = settings();
        let token = issue_token(Uuid::new_v4(), Role::User, TokenKind::Access, &settings).unwrap();
        assert!(matches!(
            decode_token(&token, TokenKind::Refresh, &settings),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_reports_expiry() {
        let mut settings = settings();
        settings.access_ttl_days = -1;
        let token = issue_token(Uuid::new_v4(), Role::User, TokenKind::Access, &settings).unwrap();
        assert!(matches!(
            decode_token(&token, TokenKind::Access, &settings),
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let store = store();
        let settings = settings();
        register_user(&store, sample_user("ada@example.com"), &settings)
            .await
            .unwrap();
        let err = register_user(&store, sample_user("ada@example.com"), &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserExists));
    }

    #[tokio::test]
    async fn login_rotates_the_presented_refresh_token() {
        let store = store();
        let settings = settings();
        let (user, first) = register_user(&store, sample_user("rot@example.com"), &settings)
            .await
            .unwrap();
        assert!(user.has_refresh_token(&first.refresh_token));

        let (user, second) = login_user(
            &store,
            "rot@example.com",
            "Passw0rd99",
            Some(&first.refresh_token),
            &settings,
        )
        .await
        .unwrap();

        assert!(!user.has_refresh_token(&first.refresh_token));
        assert!(user.has_refresh_token(&second.refresh_token));
    }

    #[tokio::test]
    async fn login_with_foreign_cookie_clears_all_sessions() {
        let store = store();
        let settings = settings();
        let (user, _) = register_user(&store, sample_user("wipe@example.com"), &settings)
            .await
            .unwrap();
        assert_eq!(user.refresh_tokens.len(), 1);

        let (user, pair) = login_user(
            &store,
            "wipe@example.com",
            "Passw0rd99",
            Some("not-a-token-this-account-holds"),
            &settings,
        )
        .await
        .unwrap();

        assert_eq!(user.refresh_tokens, vec![pair.refresh_token]);
    }

    #[tokio::test]
    async fn login_rejects_wrong_password_and_deactivated_account() {
        let store = store();
        let settings = settings();
        let (user, _) = register_user(&store, sample_user("off@example.com"), &settings)
            .await
            .unwrap();

        let err = login_user(&store, "off@example.com", "WrongPass1", None, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        store
            .update_user(
                user.id,
                UserChanges {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let err = login_user(&store, "off@example.com", "Passw0rd99", None, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountDeactivated));
    }

    #[tokio::test]
    async fn refresh_exchanges_and_retires_the_old_token() {
        let store = store();
        let settings = settings();
        let (_, first) = register_user(&store, sample_user("ref@example.com"), &settings)
            .await
            .unwrap();

        let (user, second) = refresh_session(&store, &first.refresh_token, &settings)
            .await
            .unwrap();
        assert!(!user.has_refresh_token(&first.refresh_token));
        assert!(user.has_refresh_token(&second.refresh_token));
    }

    #[tokio::test]
    async fn replayed_refresh_token_wipes_every_session() {
        let store = store();
        let settings = settings();
        let (user, first) = register_user(&store, sample_user("replay@example.com"), &settings)
            .await
            .unwrap();

        refresh_session(&store, &first.refresh_token, &settings)
            .await
            .unwrap();
        let err = refresh_session(&store, &first.refresh_token, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));

        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(user.refresh_tokens.is_empty());
    }

    #[tokio::test]
    async fn logout_retires_only_the_presented_token() {
        let store = store();
        let settings = settings();
        let (user, pair) = register_user(&store, sample_user("out@example.com"), &settings)
            .await
            .unwrap();

        assert!(logout_user(&store, &pair.refresh_token).await.unwrap());
        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(user.refresh_tokens.is_empty());

        assert!(!logout_user(&store, &pair.refresh_token).await.unwrap());
    }
}
