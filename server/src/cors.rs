use crate::settings::{CorsSettings, SettingsError};
use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Build the CORS layer described by the settings.
///
/// A `*` origin combined with credentials echoes the request origin, since
/// browsers refuse a literal wildcard on credentialed requests.
pub fn layer(settings: &CorsSettings) -> Result<CorsLayer, SettingsError> {
    let methods = settings
        .allow_methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
                SettingsError::Cors {
                    name: "method",
                    value: m.clone(),
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let origin = if settings.allow_origins.iter().any(|o| o == "*") {
        if settings.allow_credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        let origins = settings
            .allow_origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).map_err(|_| SettingsError::Cors {
                    name: "origin",
                    value: o.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(header_names(&settings.allow_headers, "header")?)
        .expose_headers(header_names(&settings.expose_headers, "exposed header")?)
        .allow_credentials(settings.allow_credentials)
        .max_age(Duration::from_secs(settings.max_age)))
}

fn header_names(values: &[String], name: &'static str) -> Result<Vec<HeaderName>, SettingsError> {
    values
        .iter()
        .map(|v| {
            HeaderName::from_bytes(v.trim().as_bytes()).map_err(|_| SettingsError::Cors {
                name,
                value: v.clone(),
            })
        })
        .collect()
}
