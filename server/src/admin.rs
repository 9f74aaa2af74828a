//! Runtime administration routes behind HTTP basic auth.

use crate::logging::LogControl;
use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Account allowed on the admin routes
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub user: String,
    pub password: String,
}

impl AdminCredentials {
    /// `SERVER_USER` (default `admin`) and `SERVER_PASSWORD`
    pub fn from_env() -> Self {
        Self {
            user: std::env::var("SERVER_USER")
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "admin".to_string()),
            password: std::env::var("SERVER_PASSWORD").unwrap_or_default(),
        }
    }

    fn accepts(&self, headers: &HeaderMap) -> bool {
        // Without a password the routes stay locked
        if self.password.is_empty() {
            return false;
        }

        let Some(encoded) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
        else {
            return false;
        };

        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };

        match decoded.split_once(':') {
            Some((user, password)) => {
                let user_ok = constant_time_eq(user.as_bytes(), self.user.as_bytes());
                let password_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
                user_ok & password_ok
            }
            None => false,
        }
    }
}

/// Compare without stopping at the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[derive(Clone)]
pub struct AdminState {
    credentials: Arc<AdminCredentials>,
    log: LogControl,
}

impl AdminState {
    pub fn new(credentials: AdminCredentials, log: LogControl) -> Self {
        Self {
            credentials: Arc::new(credentials),
            log,
        }
    }
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/server/configuration",
            get(get_configuration).patch(set_log_level),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_basic_auth))
        .with_state(state)
}

async fn require_basic_auth(
    State(state): State<AdminState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.credentials.accepts(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "rejected admin request");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"Authorization Required\"")],
        )
            .into_response();
    }
    next.run(request).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Configuration {
    log_level: String,
}

impl Configuration {
    fn current(log: &LogControl) -> Self {
        Self {
            log_level: log.level().as_str().to_ascii_lowercase(),
        }
    }
}

async fn get_configuration(State(state): State<AdminState>) -> Json<Configuration> {
    Json(Configuration::current(&state.log))
}

#[derive(Debug, Deserialize)]
struct LogLevelParams {
    #[serde(rename = "logLevel", default)]
    log_level: String,
}

async fn set_log_level(
    State(state): State<AdminState>,
    Query(params): Query<LogLevelParams>,
) -> Response {
    match state.log.set_level(&params.log_level) {
        Ok(_) => Json(Configuration::current(&state.log)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}
