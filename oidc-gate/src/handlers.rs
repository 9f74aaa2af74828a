//! Conversion of authenticator outcomes into axum responses.

use crate::authenticator::{Outcome, Transition};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::SeeOther(location) => Redirect::to(&location).into_response(),
            Outcome::TemporaryRedirect(location) => Redirect::temporary(&location).into_response(),
            Outcome::Ok => StatusCode::OK.into_response(),
        }
    }
}

impl IntoResponse for Transition {
    fn into_response(self) -> Response {
        // Warnings were already logged where they happened
        if !self.warnings.is_empty() {
            tracing::debug!(warnings = self.warnings.len(), "completed with warnings");
        }
        self.outcome.into_response()
    }
}
