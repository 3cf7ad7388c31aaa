// rest_api/src/auth.rs
// Request-side identity plumbing: the extractor that turns credentials
// into an AuthenticatedUser, and the refresh cookie helpers.

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use security::{resolve_identity, token_from_parts, AuthError, AuthenticatedUser};

use crate::{AppState, RestApiError};

pub const REFRESH_COOKIE: &str = "jwt";

/// The resolved caller, available to any handler that lists it.
pub struct Identity(pub AuthenticatedUser);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = RestApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let cookie_header = parts
            .headers
            .get(COOKIE)
            .and_then(|value| value.to_str().ok());
        let query_token = query_param(parts.uri.query(), "access_token");

        let token = token_from_parts(authorization, cookie_header, query_token.as_deref())
            .ok_or(AuthError::MissingCredential)?;
        let user = resolve_identity(&state.store, &token, &state.tokens).await?;
        Ok(Identity(user))
    }
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        let mut halves = pair.splitn(2, '=');
        if halves.next() == Some(name) {
            return halves.next().map(|value| value.to_string());
        }
    }
    None
}

/// The `jwt` refresh cookie carried across the session. `Secure` is on
/// everywhere except development so local plain-HTTP testing works.
pub fn refresh_cookie(token: &str, ttl_days: i64, development: bool) -> (HeaderName, HeaderValue) {
    let max_age = ttl_days.max(0) * 24 * 60 * 60;
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Strict; Max-Age={}",
        REFRESH_COOKIE, token, max_age
    );
    if !development {
        cookie.push_str("; Secure");
    }
    set_cookie_pair(cookie)
}

/// Expires the `jwt` cookie immediately.
pub fn clear_refresh_cookie() -> (HeaderName, HeaderValue) {
    set_cookie_pair(format!(
        "{}=; HttpOnly; Path=/; SameSite=Strict; Max-Age=0",
        REFRESH_COOKIE
    ))
}

fn set_cookie_pair(cookie: String) -> (HeaderName, HeaderValue) {
    // The value is token text plus fixed attributes; always a valid header.
    let value = HeaderValue::from_str(&cookie)
        .unwrap_or_else(|_| HeaderValue::from_static("jwt=; Max-Age=0"));
    (SET_COOKIE, value)
}

/// Reads the refresh token out of the request's cookie header.
pub fn refresh_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    for part in cookies.split(';') {
        if let Some(value) = part.trim().strip_prefix("jwt=") {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_finds_the_named_pair() {
        assert_eq!(
            query_param(Some("access_token=abc&x=1"), "access_token"),
            Some("abc".to_string())
        );
        assert_eq!(
            query_param(Some("x=1&access_token=abc"), "access_token"),
            Some("abc".to_string())
        );
        assert_eq!(query_param(Some("x=1"), "access_token"), None);
        assert_eq!(query_param(None, "access_token"), None);
    }

    #[test]
    fn refresh_cookie_is_http_only_and_scoped() {
        let (_, value) = refresh_cookie("tok123", 30, true);
        let cookie = value.to_str().unwrap();
        assert!(cookie.starts_with("jwt=tok123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(!cookie.contains("Secure"));

        let (_, value) = refresh_cookie("tok123", 30, false);
        assert!(value.to_str().unwrap().contains("Secure"));
    }

    #[test]
    fn clearing_sets_an_expired_cookie() {
        let (_, value) = clear_refresh_cookie();
        assert!(value.to_str().unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn refresh_token_reads_only_the_jwt_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; jwt=refresh123; lang=en"),
        );
        assert_eq!(
            refresh_token_from_headers(&headers),
            Some("refresh123".to_string())
        );

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark"));
        assert_eq!(refresh_token_from_headers(&headers), None);
    }
}
