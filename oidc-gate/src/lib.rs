//! # oidc-gate
//!
//! An OpenID Connect Authorization Code flow authentication layer.
//!
//! Unauthenticated users are redirected to an identity provider; the code it
//! returns is exchanged for tokens, the ID token is verified, and the result
//! is kept in a session. Logout revokes the tokens upstream before clearing
//! the session.
//!
//! ## Features
//!
//! - **CSRF-safe login**: a fresh state nonce per login flow, checked before any exchange
//! - **ID token verification**: signature, issuer, audience and expiry against the provider JWKS
//! - **Revocation on logout**: access and refresh tokens revoked concurrently, best effort
//! - **Pluggable storage**: encrypted cookie, Redis or in-memory sessions
//!
//! ## Example
//!
//! ```rust,no_run
//! use oidc_gate::{AuthConfig, AuthServer, Authenticator, CookieStore, HttpProviderClient, cookie_key};
//! use std::sync::Arc;
//!
//! # async fn example() -> oidc_gate::Result<()> {
//! let config = AuthConfig::parse(
//!     "https://idp.example.com/realms/main",
//!     "my-app",
//!     "secret",
//!     "https://app.example.com/login",
//! )?;
//! let provider = HttpProviderClient::discover(config.clone()).await?;
//! let server = AuthServer::builder()
//!     .authenticator(Authenticator::new(config, Arc::new(provider)))
//!     .session_store(Arc::new(CookieStore::new()))
//!     .cookie_key(cookie_key("session secret"))
//!     .build()?;
//!
//! let app = server.router();
//! # Ok(())
//! # }
//! ```

pub mod authenticator;
pub mod config;
pub mod error;
pub mod provider;
pub mod session;
pub mod store;

#[cfg(feature = "axum")]
pub mod auth;
#[cfg(feature = "axum")]
mod handlers;
#[cfg(feature = "axum")]
pub mod server;

pub use authenticator::{Authenticator, LOGIN_PATH, Outcome, Transition, resolve_redirect};
pub use config::AuthConfig;
pub use error::{Error, Result};
pub use provider::{HttpProviderClient, ProviderClient, ProviderMetadata, TokenSet, TokenTypeHint};
pub use session::{Session, SessionData};
pub use store::{CookieStore, MemoryStore, RedisProtocol, RedisStore, RedisStoreConfig, SessionStore};

#[cfg(feature = "axum")]
pub use auth::{CookieSettings, RequireLogin, SESSION_COOKIE_NAME, cookie_key};
#[cfg(feature = "axum")]
pub use server::{AuthServer, AuthServerBuilder};
