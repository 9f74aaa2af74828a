pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Flow errors
    #[error("state parameter is not valid")]
    StateMismatch,
    #[error("no login flow in progress")]
    StateMissing,

    // Upstream authentication errors
    #[error("error exchanging token: {0}")]
    Exchange(String),
    #[error("error verifying ID token: {0}")]
    IdTokenInvalid(String),
    #[error("ID token not found")]
    IdTokenMissing,

    // Degraded upstream errors
    #[error("error fetching user information: {0}")]
    UserInfo(String),
    #[error("error revoking {hint}: {message}")]
    Revocation {
        hint: &'static str,
        message: String,
    },

    // Provider setup errors
    #[error("provider discovery failed: {0}")]
    Discovery(String),

    // Storage errors
    #[error("session storage error: {0}")]
    Storage(String),

    // Entropy source failure while generating a nonce
    #[error("random source failure: {0}")]
    Entropy(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),
}

impl Error {
    /// HTTP status an aborted flow surfaces with.
    pub fn status(&self) -> http::StatusCode {
        use http::StatusCode;

        match self {
            Error::StateMismatch | Error::StateMissing => StatusCode::BAD_REQUEST,
            Error::Exchange(_) | Error::IdTokenInvalid(_) => StatusCode::UNAUTHORIZED,
            Error::Network(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}

// axum IntoResponse implementation
#[cfg(feature = "axum")]
impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request aborted");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_status_mapping_follows_taxonomy() {
        assert_eq!(Error::StateMismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::StateMissing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::Exchange("denied".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::IdTokenInvalid("expired".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::IdTokenMissing.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Storage("down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Entropy("no entropy".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
