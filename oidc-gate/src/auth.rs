//! Session cookie handling and the login guard extractor.

use crate::authenticator::LOGIN_PATH;
use crate::server::AuthServer;
use crate::session::Session;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use sha2::{Digest, Sha512};

/// Name of the cookie carrying the session
pub const SESSION_COOKIE_NAME: &str = "oidc-session";

/// Attributes of the session cookie
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub max_age_seconds: i64,
    pub http_only: bool,
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: SESSION_COOKIE_NAME.to_string(),
            max_age_seconds: 1800,
            http_only: true,
            secure: false,
        }
    }
}

impl CookieSettings {
    pub(crate) fn build(&self, value: String) -> Cookie<'static> {
        Cookie::build((self.name.clone(), value))
            .http_only(self.http_only)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::seconds(self.max_age_seconds))
            .build()
    }
}

/// Derive the cookie encryption key from a secret of any length.
pub fn cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// Read the raw session cookie value
pub(crate) fn session_cookie(jar: &PrivateCookieJar, settings: &CookieSettings) -> Option<String> {
    jar.get(&settings.name).map(|c| c.value().to_string())
}

/// Extractor for routes that need a logged in caller.
///
/// Anonymous callers are sent to the login page with a 303.
///
/// ```rust,ignore
/// async fn profile(RequireLogin(session): RequireLogin) -> String {
///     session.data().user.clone().unwrap_or_default()
/// }
/// ```
pub struct RequireLogin(pub Session);

impl FromRequestParts<AuthServer> for RequireLogin {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        server: &AuthServer,
    ) -> std::result::Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, server.cookie_key().clone());
        let session = server
            .load_session(&jar)
            .await
            .map_err(IntoResponse::into_response)?;

        if !server.authenticator().is_authenticated(&session) {
            tracing::debug!(path = %parts.uri.path(), "redirecting anonymous caller to login");
            return Err(Redirect::to(LOGIN_PATH).into_response());
        }

        Ok(RequireLogin(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_secrets_derive_a_key() {
        let a = cookie_key("6251655468576D5A");
        let b = cookie_key("6251655468576D5A");
        let c = cookie_key("another");

        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let settings = CookieSettings {
            secure: true,
            ..Default::default()
        };

        let cookie = settings.build("value".into());

        assert_eq!(cookie.name(), "oidc-session");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(1800)));
    }
}
