//! Authorization Code flow state machine.
//!
//! A session moves from anonymous to pending when a login starts, from
//! pending to authenticated when the provider calls back with a matching
//! state, and back to anonymous on logout. Every operation works on the
//! caller's [`Session`] and reports what the HTTP layer should answer with
//! as an [`Outcome`].

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::provider::{ProviderClient, ProviderMetadata, TokenTypeHint};
use crate::session::{Session, generate_state};
use std::sync::Arc;
use url::Url;

/// Path the login flow is served under
pub const LOGIN_PATH: &str = "/login";

/// Fallback target when nothing better can be resolved
const ROOT: &str = "/";

/// Response an operation asks the HTTP layer to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 303 See Other
    SeeOther(String),
    /// 307 Temporary Redirect
    TemporaryRedirect(String),
    /// 200 with an empty body
    Ok,
}

/// Result of a completed operation together with the non-fatal failures
/// that happened on the way.
#[derive(Debug)]
pub struct Transition {
    pub outcome: Outcome,
    pub warnings: Vec<Error>,
}

impl Transition {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            warnings: Vec::new(),
        }
    }
}

/// Drives the login, callback and logout operations against a provider
#[derive(Clone)]
pub struct Authenticator {
    config: Arc<AuthConfig>,
    provider: Arc<dyn ProviderClient>,
}

impl Authenticator {
    pub fn new(config: AuthConfig, provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        self.provider.metadata()
    }

    /// Authorization endpoint URL for a login carrying `state`
    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.metadata().authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_url.as_str())
            .append_pair("scope", &self.config.scope_param())
            .append_pair("state", state);
        url
    }

    /// Start a login flow, or send an already authenticated caller back to
    /// where they came from.
    pub async fn begin_login(
        &self,
        session: &mut Session,
        referer: Option<&str>,
        host: Option<&str>,
    ) -> Result<Transition> {
        let target = resolve_redirect(referer, host);

        if session.data().is_authenticated() {
            tracing::debug!(redirect = %target, "session already authenticated");
            return Ok(Transition::new(Outcome::SeeOther(target)));
        }

        let state = generate_state()?;
        let url = self.authorization_url(&state);

        let data = session.data_mut();
        data.state = Some(state);
        data.redirect = Some(target);
        session.save().await?;

        tracing::info!(redirect = ?session.data().redirect, "login flow started");
        Ok(Transition::new(Outcome::TemporaryRedirect(url.into())))
    }

    /// Complete a login flow with the code and state the provider sent back
    pub async fn handle_callback(
        &self,
        session: &mut Session,
        code: &str,
        state: &str,
    ) -> Result<Transition> {
        let stored = session.data().state.as_deref().ok_or(Error::StateMissing)?;
        if stored != state {
            return Err(Error::StateMismatch);
        }

        let tokens = self.provider.exchange(code).await.map_err(|e| match e {
            Error::Exchange(_) => e,
            other => Error::Exchange(other.to_string()),
        })?;

        let id_token = tokens.id_token().ok_or(Error::IdTokenMissing)?.to_string();
        let claims = self
            .provider
            .verify_id_token(&id_token)
            .await
            .map_err(|e| match e {
                Error::IdTokenInvalid(_) => e,
                other => Error::IdTokenInvalid(other.to_string()),
            })?;
        tracing::debug!(sub = %claims.sub, "ID token verified");

        let mut warnings = Vec::new();
        let user = match self.provider.user_info(&tokens.access_token).await {
            Ok(info) => Some(info.sub),
            Err(e) => {
                let e = match e {
                    Error::UserInfo(_) => e,
                    other => Error::UserInfo(other.to_string()),
                };
                tracing::warn!(error = %e, "continuing without user information");
                warnings.push(e);
                None
            }
        };

        let data = session.data_mut();
        let redirect = data.redirect.take().unwrap_or_else(|| ROOT.to_string());
        data.state = None;
        data.access_token = Some(tokens.access_token);
        data.refresh_token = tokens.refresh_token;
        data.id_token = Some(id_token);
        data.user = user;
        session.rotate_id();
        session.save().await?;

        tracing::info!(user = ?session.data().user, "login completed");
        Ok(Transition {
            outcome: Outcome::SeeOther(redirect),
            warnings,
        })
    }

    /// Revoke the session's tokens upstream, clear it, and hand over to the
    /// provider's end-session endpoint.
    pub async fn logout(&self, session: &mut Session) -> Result<Transition> {
        if !self.is_authenticated(session) {
            return Ok(Transition::new(Outcome::Ok));
        }

        let data = session.data();
        let (access, refresh) = tokio::join!(
            self.revoke(data.access_token.as_deref(), TokenTypeHint::AccessToken),
            self.revoke(data.refresh_token.as_deref(), TokenTypeHint::RefreshToken),
        );
        let warnings: Vec<Error> = [access, refresh].into_iter().flatten().collect();

        session.clear();
        session.save().await?;

        let target = self
            .metadata()
            .end_session_endpoint
            .as_ref()
            .map(|url| url.to_string())
            .unwrap_or_else(|| ROOT.to_string());

        tracing::info!(revocation_failures = warnings.len(), "logged out");
        Ok(Transition {
            outcome: Outcome::TemporaryRedirect(target),
            warnings,
        })
    }

    /// Access token presence; expiry is not consulted
    pub fn is_authenticated(&self, session: &Session) -> bool {
        session.data().is_authenticated()
    }

    async fn revoke(&self, token: Option<&str>, hint: TokenTypeHint) -> Option<Error> {
        let token = token?;
        match self.provider.revoke(token, hint).await {
            Ok(()) => None,
            Err(e) => {
                let e = match e {
                    Error::Revocation { .. } => e,
                    other => Error::Revocation {
                        hint: hint.as_str(),
                        message: other.to_string(),
                    },
                };
                tracing::warn!(error = %e, "token revocation failed");
                Some(e)
            }
        }
    }
}

enum Target {
    Absolute(Url),
    Path(String),
}

/// Pick where a user goes after logging in: the referer, else the request's
/// host URL, else `/`. A target pointing back at the login page is replaced
/// by its origin.
pub fn resolve_redirect(referer: Option<&str>, host: Option<&str>) -> String {
    let target = referer
        .and_then(parse_target)
        .or_else(|| host.and_then(parse_target));

    match target {
        None => ROOT.to_string(),
        Some(Target::Absolute(url)) => {
            if is_login_path(url.path()) {
                origin_of(&url)
            } else {
                url.to_string()
            }
        }
        Some(Target::Path(path)) => {
            let path_only = path.split(['?', '#']).next().unwrap_or_default();
            if is_login_path(path_only) {
                ROOT.to_string()
            } else {
                path
            }
        }
    }
}

fn parse_target(raw: &str) -> Option<Target> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) if url.has_host() => Some(Target::Absolute(url)),
        Ok(_) => None,
        // Protocol relative references would leave the site
        Err(_) if raw.starts_with('/') && !raw.starts_with("//") => {
            Some(Target::Path(raw.to_string()))
        }
        Err(_) => None,
    }
}

fn is_login_path(path: &str) -> bool {
    let login = LOGIN_PATH.trim_matches('/');
    path.trim_end_matches('/').rsplit('/').next() == Some(login)
}

fn origin_of(url: &Url) -> String {
    match (url.scheme(), url.host_str()) {
        (scheme, Some(host)) if !scheme.is_empty() => match url.port() {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        },
        _ => ROOT.to_string(),
    }
}
