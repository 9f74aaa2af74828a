use crate::error::{Error, Result};
use url::Url;

/// Scope every OpenID Connect authorization request must carry.
pub const OPENID_SCOPE: &str = "openid";

/// Configuration for the authenticator
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Issuer URL the discovery document is fetched from
    pub provider: Url,

    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Callback URL registered with the provider
    pub redirect_url: Url,

    /// OAuth scopes to request
    pub scopes: Vec<String>,

    /// Timeout applied to every call made to the provider (seconds)
    pub request_timeout_seconds: u64,
}

impl AuthConfig {
    /// Create a new configuration with sensible defaults
    pub fn new(
        provider: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: Url,
    ) -> Self {
        Self {
            provider,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url,
            scopes: vec![OPENID_SCOPE.to_string(), "profile".to_string()],
            request_timeout_seconds: 10,
        }
    }

    /// Parse the string form used by settings files and environment variables.
    pub fn parse(
        provider: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: &str,
    ) -> Result<Self> {
        let provider = Url::parse(provider)
            .map_err(|e| Error::Config(format!("provider URL {:?}: {}", provider, e)))?;
        let redirect_url = Url::parse(redirect_url)
            .map_err(|e| Error::Config(format!("redirect URL {:?}: {}", redirect_url, e)))?;

        Ok(Self::new(provider, client_id, client_secret, redirect_url))
    }

    /// Set custom scopes, `openid` is always kept first
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        let mut merged = vec![OPENID_SCOPE.to_string()];
        for scope in scopes {
            let scope = scope.trim();
            if !scope.is_empty() && !merged.iter().any(|s| s == scope) {
                merged.push(scope.to_string());
            }
        }
        self.scopes = merged;
        self
    }

    /// Set the provider request timeout in seconds
    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    /// Space-separated scope parameter value
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// Discovery document location for the configured provider
    pub fn discovery_url(&self) -> Result<Url> {
        let base = self.provider.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/.well-known/openid-configuration", base))
            .map_err(|e| Error::Config(format!("discovery URL: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig::parse(
            "https://idp.example.com/realms/main/",
            "app",
            "secret",
            "https://app.example.com/login",
        )
        .unwrap()
    }

    #[test]
    fn test_with_scopes_keeps_openid_and_dedups() {
        let config = test_config().with_scopes(vec![
            "profile".into(),
            "email".into(),
            "openid".into(),
            " profile ".into(),
            "".into(),
        ]);

        assert_eq!(config.scopes, vec!["openid", "profile", "email"]);
        assert_eq!(config.scope_param(), "openid profile email");
    }

    #[test]
    fn test_discovery_url_strips_trailing_slash() {
        let config = test_config();

        assert_eq!(
            config.discovery_url().unwrap().as_str(),
            "https://idp.example.com/realms/main/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_parse_rejects_relative_redirect() {
        let result = AuthConfig::parse("https://idp.example.com", "app", "secret", "/login");

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
