use crate::{
    auth::{CookieSettings, RequireLogin, session_cookie},
    authenticator::{Authenticator, LOGIN_PATH},
    error::{Error, Result},
    session::Session,
    store::SessionStore,
};
use axum::{
    Json, Router,
    extract::{FromRef, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::{PrivateCookieJar, cookie::Key};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Path of the logout route
pub const LOGOUT_PATH: &str = "/logout";

/// Path of the authentication probe
pub const CHECK_PATH: &str = "/check";

/// Response header carrying the authenticated subject on `/check`
pub const USER_HEADER: &str = "user";

/// HTTP front of the [`Authenticator`]: resolves the caller's session from the
/// session cookie, runs one operation and writes the cookie back after a save.
#[derive(Clone)]
pub struct AuthServer {
    authenticator: Authenticator,
    session_store: Arc<dyn SessionStore>,
    cookie_key: Key,
    cookie: CookieSettings,
}

impl AuthServer {
    /// Create a new server builder.
    pub fn builder() -> AuthServerBuilder {
        AuthServerBuilder::default()
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn cookie_key(&self) -> &Key {
        &self.cookie_key
    }

    /// Create the axum router with the authentication routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handle_banner))
            .route(LOGIN_PATH, get(handle_login))
            .route(LOGOUT_PATH, get(handle_logout))
            .route(CHECK_PATH, get(handle_check))
            .route("/user/data", get(handle_user_data))
            .route("/user/tokens", get(handle_user_tokens))
            .with_state(self.clone())
    }

    /// Resolve the session the request's cookie points at
    pub async fn load_session(&self, jar: &PrivateCookieJar) -> Result<Session> {
        let cookie = session_cookie(jar, &self.cookie);
        Session::load(self.session_store.clone(), cookie.as_deref()).await
    }

    /// Add the cookie produced by the last save, if the session was saved
    fn store_cookie(&self, jar: PrivateCookieJar, session: &mut Session) -> PrivateCookieJar {
        match session.take_cookie() {
            Some(value) => jar.add(self.cookie.build(value)),
            None => jar,
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl FromRef<AuthServer> for Key {
    fn from_ref(server: &AuthServer) -> Self {
        server.cookie_key.clone()
    }
}

// Handler functions

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Banner {
    application: &'static str,
    version: &'static str,
}

async fn handle_banner() -> Json<Banner> {
    Json(Banner {
        application: "OIDC Authenticator",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    code: Option<String>,
    state: Option<String>,
}

/// Start a login, or complete one when the provider calls back with a code
async fn handle_login(
    State(server): State<AuthServer>,
    jar: PrivateCookieJar,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> Result<(PrivateCookieJar, Response)> {
    let mut session = server.load_session(&jar).await?;

    let transition = match params.code {
        Some(code) => {
            tracing::info!("handling login callback");
            let state = params.state.unwrap_or_default();
            server
                .authenticator
                .handle_callback(&mut session, &code, &state)
                .await?
        }
        None => {
            let referer = header_str(&headers, header::REFERER);
            let host = host_url(&headers);
            server
                .authenticator
                .begin_login(&mut session, referer, host.as_deref())
                .await?
        }
    };

    let jar = server.store_cookie(jar, &mut session);
    Ok((jar, transition.into_response()))
}

async fn handle_logout(
    State(server): State<AuthServer>,
    jar: PrivateCookieJar,
) -> Result<(PrivateCookieJar, Response)> {
    let mut session = server.load_session(&jar).await?;
    let transition = server.authenticator.logout(&mut session).await?;

    let jar = server.store_cookie(jar, &mut session);
    Ok((jar, transition.into_response()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResponse {
    user_id: Option<String>,
}

async fn handle_check(
    State(server): State<AuthServer>,
    jar: PrivateCookieJar,
) -> Result<Response> {
    let session = server.load_session(&jar).await?;
    if !server.authenticator.is_authenticated(&session) {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    let user = session.data().user.clone();
    let mut response = Json(CheckResponse {
        user_id: user.clone(),
    })
    .into_response();

    if let Some(value) = user.and_then(|u| HeaderValue::from_str(&u).ok()) {
        response.headers_mut().insert(USER_HEADER, value);
    }
    Ok(response)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UserData {
    user: Option<String>,
}

async fn handle_user_data(RequireLogin(session): RequireLogin) -> Json<UserData> {
    Json(UserData {
        user: session.data().user.clone(),
    })
}

#[derive(Debug, Serialize)]
struct UserTokens {
    #[serde(rename = "AccessToken")]
    access_token: Option<String>,
    #[serde(rename = "RefreshToken")]
    refresh_token: Option<String>,
    #[serde(rename = "IDToken")]
    id_token: Option<String>,
}

async fn handle_user_tokens(RequireLogin(session): RequireLogin) -> Json<UserTokens> {
    let data = session.data();
    Json(UserTokens {
        access_token: data.access_token.clone(),
        refresh_token: data.refresh_token.clone(),
        id_token: data.id_token.clone(),
    })
}

fn header_str<K: header::AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// URL of the host the request was addressed to
fn host_url(headers: &HeaderMap) -> Option<String> {
    let host = header_str(headers, header::HOST)?;
    let scheme = header_str(headers, "x-forwarded-proto").unwrap_or("http");
    Some(format!("{}://{}", scheme, host))
}

/// Builder for AuthServer.
#[derive(Default)]
pub struct AuthServerBuilder {
    authenticator: Option<Authenticator>,
    session_store: Option<Arc<dyn SessionStore>>,
    cookie_key: Option<Key>,
    cookie: CookieSettings,
}

impl AuthServerBuilder {
    pub fn authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn cookie_key(mut self, key: Key) -> Self {
        self.cookie_key = Some(key);
        self
    }

    pub fn cookie_settings(mut self, settings: CookieSettings) -> Self {
        self.cookie = settings;
        self
    }

    pub fn build(self) -> Result<AuthServer> {
        let authenticator = self
            .authenticator
            .ok_or_else(|| Error::Config("authenticator required".to_string()))?;
        let session_store = self
            .session_store
            .ok_or_else(|| Error::Config("session_store required".to_string()))?;
        let cookie_key = self
            .cookie_key
            .ok_or_else(|| Error::Config("cookie_key required".to_string()))?;

        Ok(AuthServer {
            authenticator,
            session_store,
            cookie_key,
            cookie: self.cookie,
        })
    }
}
