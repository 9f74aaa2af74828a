//! Identity provider client: discovery, code exchange, ID token verification,
//! user info and revocation.

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

/// Endpoints resolved from the provider's discovery document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub revocation_endpoint: Option<Url>,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
    pub jwks_uri: Url,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Every other member of the response, `id_token` included
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenSet {
    /// String-valued extra member
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    pub fn id_token(&self) -> Option<&str> {
        self.extra_str("id_token")
    }
}

/// Claims of a verified ID token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// User info endpoint response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Kind of token sent to the revocation endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenTypeHint {
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenTypeHint::AccessToken => "access_token",
            TokenTypeHint::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for TokenTypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations the authenticator needs from the identity provider
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Endpoints resolved at construction
    fn metadata(&self) -> &ProviderMetadata;

    /// Exchange an authorization code for tokens
    async fn exchange(&self, code: &str) -> Result<TokenSet>;

    /// Check signature, issuer, audience and expiry of an ID token
    async fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims>;

    /// Fetch user info with an access token
    async fn user_info(&self, access_token: &str) -> Result<UserInfo>;

    /// Ask the provider to invalidate a token
    async fn revoke(&self, token: &str, hint: TokenTypeHint) -> Result<()>;
}

/// [`ProviderClient`] talking to a standards compliant provider over HTTP
pub struct HttpProviderClient {
    config: AuthConfig,
    metadata: ProviderMetadata,
    http: reqwest::Client,
    jwks: RwLock<Option<JwkSet>>,
}

impl HttpProviderClient {
    /// Resolve the provider's discovery document and build a client for it
    pub async fn discover(config: AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        let discovery_url = config.discovery_url()?;
        tracing::info!(url = %discovery_url, "discovering OIDC provider");

        let response = http
            .get(discovery_url)
            .send()
            .await
            .map_err(|e| Error::Discovery(e.to_string()))?;
        let response = ensure_success(response, "discovery")
            .await
            .map_err(|e| Error::Discovery(e.to_string()))?;
        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("invalid discovery document: {}", e)))?;

        Ok(Self::with_metadata(config, metadata, http))
    }

    /// Build a client from already known endpoints
    pub fn with_metadata(config: AuthConfig, metadata: ProviderMetadata, http: reqwest::Client) -> Self {
        Self {
            config,
            metadata,
            http,
            jwks: RwLock::new(None),
        }
    }

    async fn fetch_jwks(&self) -> Result<JwkSet> {
        let response = self.http.get(self.metadata.jwks_uri.clone()).send().await?;
        let response = ensure_success(response, "jwks").await?;
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| Error::Network(format!("invalid JWKS: {}", e)))
    }

    /// Key for `kid`, refreshing the cached key set once when it is unknown
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey> {
        if let Some(jwks) = self.jwks.read().await.as_ref() {
            if let Some(key) = select_key(jwks, kid) {
                return key;
            }
        }

        let fresh = self.fetch_jwks().await?;
        let key = select_key(&fresh, kid).unwrap_or_else(|| {
            Err(Error::IdTokenInvalid(format!(
                "no signing key for kid {:?}",
                kid
            )))
        });
        *self.jwks.write().await = Some(fresh);
        key
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn exchange(&self, code: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];

        let response = self
            .http
            .post(self.metadata.token_endpoint.clone())
            .basic_auth(
                urlencoding::encode(&self.config.client_id),
                Some(urlencoding::encode(&self.config.client_secret)),
            )
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Exchange(e.to_string()))?;

        let response = ensure_success(response, "token exchange")
            .await
            .map_err(|e| Error::Exchange(e.to_string()))?;
        response
            .json::<TokenSet>()
            .await
            .map_err(|e| Error::Exchange(format!("invalid token response: {}", e)))
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims> {
        let header = decode_header(id_token)
            .map_err(|e| Error::IdTokenInvalid(format!("malformed header: {}", e)))?;
        let key = self.decoding_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&[self.metadata.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| Error::IdTokenInvalid(e.to_string()))?;
        Ok(data.claims)
    }

    async fn user_info(&self, access_token: &str) -> Result<UserInfo> {
        let endpoint = self
            .metadata
            .userinfo_endpoint
            .clone()
            .ok_or_else(|| Error::UserInfo("provider has no userinfo endpoint".to_string()))?;

        let response = self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::UserInfo(e.to_string()))?;
        let response = ensure_success(response, "userinfo")
            .await
            .map_err(|e| Error::UserInfo(e.to_string()))?;
        response
            .json::<UserInfo>()
            .await
            .map_err(|e| Error::UserInfo(format!("invalid userinfo response: {}", e)))
    }

    async fn revoke(&self, token: &str, hint: TokenTypeHint) -> Result<()> {
        let revocation_error = |message: String| Error::Revocation {
            hint: hint.as_str(),
            message,
        };

        let mut endpoint = self
            .metadata
            .revocation_endpoint
            .clone()
            .ok_or_else(|| revocation_error("provider has no revocation endpoint".to_string()))?;
        endpoint
            .query_pairs_mut()
            .append_pair("token", token)
            .append_pair("token_type_hint", hint.as_str());

        let response = self
            .http
            .post(endpoint)
            .basic_auth(
                urlencoding::encode(&self.config.client_id),
                Some(urlencoding::encode(&self.config.client_secret)),
            )
            .send()
            .await
            .map_err(|e| revocation_error(e.to_string()))?;
        ensure_success(response, "revocation")
            .await
            .map_err(|e| revocation_error(e.to_string()))?;
        Ok(())
    }
}

fn select_key(jwks: &JwkSet, kid: Option<&str>) -> Option<Result<DecodingKey>> {
    let jwk = match kid {
        Some(kid) => jwks.find(kid)?,
        // Without a kid only an unambiguous key set can be used
        None if jwks.keys.len() == 1 => &jwks.keys[0],
        None => return None,
    };
    Some(
        DecodingKey::from_jwk(jwk)
            .map_err(|e| Error::IdTokenInvalid(format!("unusable signing key: {}", e))),
    )
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Network(format!(
        "{} failed with status {}: {}",
        operation, status, body
    )))
}
