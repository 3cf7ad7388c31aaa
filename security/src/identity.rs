// security/src/identity.rs
// Resolves a bearer credential to a live account.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use models::Role;
use storage::{HealthStore, UserChanges};

use crate::{AuthError, TokenKind, TokenSettings, decode_token};

/// The request identity handlers work with. Rebuilt from the user row on
/// every request so role changes and deactivation bite immediately, however
/// old the token is.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_verified: bool,
}

impl AuthenticatedUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Picks the credential out of the supported channels, in priority order:
/// `Authorization: Bearer`, the `jwt` cookie, then the `access_token`
/// query parameter.
pub fn token_from_parts(
    authorization: Option<&str>,
    cookie_header: Option<&str>,
    query_token: Option<&str>,
) -> Option<String> {
    if let Some(header) = authorization {
        if let Some(token) = header.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookies) = cookie_header {
        for part in cookies.split(';') {
            if let Some(value) = part.trim().strip_prefix("jwt=") {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    query_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

/// Verifies an access token and loads the account it names.
pub async fn resolve_identity(
    store: &Arc<dyn HealthStore>,
    token: &str,
    settings: &TokenSettings,
) -> Result<AuthenticatedUser, AuthError> {
    let claims = decode_token(token, TokenKind::Access, settings)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    let user = store
        .find_user_by_id(user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    if !user.is_active {
        return Err(AuthError::AccountDeactivated);
    }

    // The row is the authority on role; the claim is only a hint and goes
    // stale after promotion.
    let identity = AuthenticatedUser {
        id: user.id,
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        role: user.role,
        is_verified: user.is_verified,
    };

    // Patients and doctors get a last-seen stamp. A failed stamp never
    // blocks the request.
    if matches!(identity.role, Role::Patient | Role::Doctor) {
        let touch = store
            .update_user(
                user.id,
                UserChanges {
                    last_login_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await;
        if let Err(e) = touch {
            warn!(error = %e, user_id = %user.id, "failed to stamp last login");
        }
    }

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TokenKind, issue_token, register_user};
    use models::NewUser;
    use models::User;
    use storage::InMemoryStore;

    fn settings() -> TokenSettings {
        TokenSettings {
            access_secret: "identity-access".to_string(),
            refresh_secret: "identity-refresh".to_string(),
            access_ttl_days: 1,
            refresh_ttl_days: 2,
        }
    }

    fn sample_user(email: &str) -> User {
        User::from_new_user(NewUser {
            first_name: "Kofi".to_string(),
            last_name: "Mensah".to_string(),
            email: email.to_string(),
            password: "Passw0rd99".to_string(),
            phone: "1234567890".to_string(),
            country: None,
            avatar: None,
        })
        .unwrap()
    }

    #[test]
    fn bearer_header_wins_over_cookie_and_query() {
        let token = token_from_parts(
            Some("Bearer aaa"),
            Some("theme=dark; jwt=bbb"),
            Some("ccc"),
        );
        assert_eq!(token.as_deref(), Some("aaa"));
    }

    #[test]
    fn cookie_wins_over_query_when_header_is_absent() {
        let token = token_from_parts(None, Some("theme=dark; jwt=bbb"), Some("ccc"));
        assert_eq!(token.as_deref(), Some("bbb"));

        let token = token_from_parts(Some("Basic xyz"), Some("jwt=bbb"), None);
        assert_eq!(token.as_deref(), Some("bbb"));
    }

    #[test]
    fn query_parameter_is_the_last_resort() {
        assert_eq!(token_from_parts(None, None, Some("ccc")).as_deref(), Some("ccc"));
        assert_eq!(token_from_parts(None, None, None), None);
        assert_eq!(token_from_parts(None, Some("jwt="), Some("")), None);
    }

    #[tokio::test]
    async fn resolves_a_live_account() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let settings = settings();
        let (user, pair) = register_user(&store, sample_user("live@example.com"), &settings)
            .await
            .unwrap();

        let identity = resolve_identity(&store, &pair.access_token, &settings)
            .await
            .unwrap();
        assert_eq!(identity.id, user.id);
        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.full_name(), "Kofi Mensah");
    }

    #[tokio::test]
    async fn row_role_overrides_a_stale_claim() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let settings = settings();
        let (user, pair) = register_user(&store, sample_user("stale@example.com"), &settings)
            .await
            .unwrap();

        store
            .update_user(
                user.id,
                UserChanges {
                    role: Some(Role::Patient),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let identity = resolve_identity(&store, &pair.access_token, &settings)
            .await
            .unwrap();
        assert_eq!(identity.role, Role::Patient);
    }

    #[tokio::test]
    async fn deactivated_and_deleted_accounts_are_refused() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryStore::new());
        let settings = settings();
        let (user, pair) = register_user(&store, sample_user("gone@example.com"), &settings)
            .await
            .unwrap();

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
        let err = resolve_identity(&store, &pair.access_token, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountDeactivated));

        let orphan = issue_token(Uuid::new_v4(), Role::User, TokenKind::Access, &settings).unwrap();
        let err = resolve_identity(&store, &orphan, &settings).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }
}
