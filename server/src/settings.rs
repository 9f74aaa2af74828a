use crate::logging::LogOutput;
use clap::Parser;
use oidc_gate::{AuthConfig, RedisProtocol, RedisStoreConfig};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yml::Error,
    },
    #[error("invalid value {value:?} for {name}")]
    Env { name: &'static str, value: String },
    #[error("invalid CORS {name} entry {value:?}")]
    Cors { name: &'static str, value: String },
    #[error(transparent)]
    Auth(#[from] oidc_gate::Error),
}

/// Command line flags
#[derive(Debug, Parser)]
#[command(name = "oidc-gate", version, about = "OpenID Connect authentication gateway")]
pub struct Flags {
    /// Debug mode, forces the debug log level
    #[arg(long)]
    pub debug: bool,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Log output
    #[arg(long = "log-output", value_enum, default_value = "console")]
    pub log_output: LogOutput,

    /// Configuration file
    #[arg(long, default_value = "oidc.yaml")]
    pub config: String,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Server hostname
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub redis: RedisSettings,
    pub oidc: OidcSettings,
    pub cors: CorsSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub debug: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4600,
            debug: false,
        }
    }
}

/// Backend holding session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Cookie,
    Redis,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cookie" => Ok(StoreKind::Cookie),
            "redis" => Ok(StoreKind::Redis),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub store: StoreKind,
    pub secret: String,
    pub max_age: u64,
    pub http_only: bool,
    pub secure: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            store: StoreKind::Cookie,
            secret: "6251655468576D5A".to_string(),
            max_age: 1800,
            http_only: true,
            secure: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub protocol: String,
    pub connections: usize,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            protocol: "tcp".to_string(),
            connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OidcSettings {
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl Default for OidcSettings {
    fn default() -> Self {
        Self {
            provider: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: String::new(),
            scopes: vec!["profile".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: u64,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: list(&["GET", "POST", "HEAD", "OPTIONS"]),
            allow_headers: list(&["Origin", "Content-Length", "Content-Type"]),
            expose_headers: list(&["Content-Length", "Content-Type"]),
            allow_credentials: true,
            max_age: 86400,
        }
    }
}

fn list(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Settings {
    /// Defaults, then the YAML file, then environment variables, then flags
    pub fn load(flags: &Flags) -> Result<Self, SettingsError> {
        let mut settings = Self::from_file(&flags.config)?;
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.apply_flags(flags);
        Ok(settings)
    }

    /// Parse a YAML file; a missing file yields the defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %shown, "configuration file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: shown,
                    source,
                });
            }
        };

        Self::from_yaml(&contents).map_err(|source| SettingsError::Parse {
            path: shown,
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(contents)
    }

    /// Overlay values found through `lookup`; empty variables are ignored
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = get("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SERVER_PORT") {
            self.server.port = parse("SERVER_PORT", v)?;
        }
        if let Some(v) = get("SERVER_DEBUG") {
            self.server.debug = parse_flag("SERVER_DEBUG", v)?;
        }

        if let Some(v) = get("SESSION_STORE") {
            self.session.store = parse("SESSION_STORE", v)?;
        }
        if let Some(v) = get("SESSION_SECRET") {
            self.session.secret = v;
        }
        if let Some(v) = get("SESSION_MAX_AGE") {
            self.session.max_age = parse("SESSION_MAX_AGE", v)?;
        }
        if let Some(v) = get("SESSION_HTTP_ONLY") {
            self.session.http_only = parse_flag("SESSION_HTTP_ONLY", v)?;
        }
        if let Some(v) = get("SESSION_SECURE") {
            self.session.secure = parse_flag("SESSION_SECURE", v)?;
        }

        if let Some(v) = get("REDIS_HOST") {
            self.redis.host = v;
        }
        if let Some(v) = get("REDIS_PORT") {
            self.redis.port = parse("REDIS_PORT", v)?;
        }
        if let Some(v) = get("REDIS_PASSWORD") {
            self.redis.password = v;
        }
        if let Some(v) = get("REDIS_PROTOCOL") {
            self.redis.protocol = v;
        }
        if let Some(v) = get("REDIS_CONNECTIONS") {
            self.redis.connections = parse("REDIS_CONNECTIONS", v)?;
        }

        if let Some(v) = get("OIDC_PROVIDER") {
            self.oidc.provider = v;
        }
        if let Some(v) = get("OIDC_CLIENT_ID") {
            self.oidc.client_id = v;
        }
        if let Some(v) = get("OIDC_CLIENT_SECRET") {
            self.oidc.client_secret = v;
        }
        if let Some(v) = get("OIDC_REDIRECT_URL") {
            self.oidc.redirect_url = v;
        }
        if let Some(v) = get("OIDC_SCOPE") {
            self.oidc.scopes = split_list(&v);
        }

        if let Some(v) = get("CORS_ALLOW_ORIGINS") {
            self.cors.allow_origins = split_list(&v);
        }
        if let Some(v) = get("CORS_ALLOW_METHODS") {
            self.cors.allow_methods = split_list(&v);
        }
        if let Some(v) = get("CORS_ALLOW_HEADERS") {
            self.cors.allow_headers = split_list(&v);
        }
        if let Some(v) = get("CORS_EXPOSE_HEADERS") {
            self.cors.expose_headers = split_list(&v);
        }
        if let Some(v) = get("CORS_ALLOW_CREDENTIALS") {
            self.cors.allow_credentials = parse_flag("CORS_ALLOW_CREDENTIALS", v)?;
        }
        if let Some(v) = get("CORS_MAX_AGE") {
            self.cors.max_age = parse("CORS_MAX_AGE", v)?;
        }

        Ok(())
    }

    pub fn apply_flags(&mut self, flags: &Flags) {
        if flags.debug {
            self.server.debug = true;
        }
        if let Some(port) = flags.port {
            self.server.port = port;
        }
        if let Some(host) = &flags.host {
            self.server.host = host.clone();
        }
    }

    pub fn auth_config(&self) -> Result<AuthConfig, SettingsError> {
        let config = AuthConfig::parse(
            &self.oidc.provider,
            self.oidc.client_id.clone(),
            self.oidc.client_secret.clone(),
            &self.oidc.redirect_url,
        )?;
        Ok(config.with_scopes(self.oidc.scopes.clone()))
    }

    pub fn redis_config(&self) -> Result<RedisStoreConfig, SettingsError> {
        let protocol: RedisProtocol = self.redis.protocol.parse()?;
        Ok(RedisStoreConfig {
            protocol,
            host: self.redis.host.clone(),
            port: self.redis.port,
            password: Some(self.redis.password.clone()).filter(|p| !p.is_empty()),
            connections: self.redis.connections,
            max_age_seconds: self.session.max_age,
            ..Default::default()
        })
    }
}

fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, SettingsError> {
    let parsed = value.trim().parse();
    parsed.map_err(|_| SettingsError::Env { name, value })
}

fn parse_flag(name: &'static str, value: String) -> Result<bool, SettingsError> {
    truthy(&value).ok_or(SettingsError::Env { name, value })
}

/// Boolean spellings accepted in the environment: `1`, `t`, `true` and
/// their negatives, in any of the usual cases
pub fn truthy(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Split a comma or whitespace separated list
fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', ' '])
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();

        assert_eq!(settings.server.host, "localhost");
        assert_eq!(settings.server.port, 4600);
        assert_eq!(settings.session.store, StoreKind::Cookie);
        assert_eq!(settings.session.max_age, 1800);
        assert_eq!(settings.redis.connections, 10);
        assert_eq!(settings.oidc.scopes, vec!["profile"]);
        assert_eq!(settings.cors.allow_origins, vec!["*"]);
        assert_eq!(settings.cors.max_age, 86400);
    }

    #[test]
    fn test_yaml_overrides_defaults_partially() {
        let settings = Settings::from_yaml(
            r#"
server:
  port: 8080
session:
  store: redis
oidc:
  provider: https://idp.example.com
  scopes: [email]
"#,
        )
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "localhost");
        assert_eq!(settings.session.store, StoreKind::Redis);
        assert_eq!(settings.session.secret, "6251655468576D5A");
        assert_eq!(settings.oidc.scopes, vec!["email"]);
    }

    #[test]
    fn test_environment_wins_over_file() {
        let mut settings = Settings::from_yaml("server:\n  port: 8080\n").unwrap();

        settings
            .apply_env(env(&[
                ("SERVER_PORT", "9090"),
                ("SESSION_STORE", "memory"),
                ("OIDC_SCOPE", "email, groups offline_access"),
                ("REDIS_PASSWORD", ""),
            ]))
            .unwrap();

        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.session.store, StoreKind::Memory);
        assert_eq!(settings.oidc.scopes, vec!["email", "groups", "offline_access"]);
        assert_eq!(settings.redis.password, "");
    }

    #[test]
    fn test_invalid_environment_value_is_reported() {
        let mut settings = Settings::default();

        let result = settings.apply_env(env(&[("SERVER_PORT", "eighty")]));

        assert!(matches!(
            result,
            Err(SettingsError::Env {
                name: "SERVER_PORT",
                ..
            })
        ));
    }

    #[test]
    fn test_boolean_spellings() {
        let mut settings = Settings::default();

        settings
            .apply_env(env(&[
                ("SERVER_DEBUG", "1"),
                ("SESSION_SECURE", "T"),
                ("SESSION_HTTP_ONLY", "0"),
                ("CORS_ALLOW_CREDENTIALS", "False"),
            ]))
            .unwrap();

        assert!(settings.server.debug);
        assert!(settings.session.secure);
        assert!(!settings.session.http_only);
        assert!(!settings.cors.allow_credentials);

        let result = settings.apply_env(env(&[("SESSION_SECURE", "yes")]));
        assert!(matches!(
            result,
            Err(SettingsError::Env {
                name: "SESSION_SECURE",
                ..
            })
        ));
        assert_eq!(truthy("tRuE"), None);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();

        let settings = Settings::from_file(dir.path().join("absent.yaml")).unwrap();

        assert_eq!(settings.server.port, 4600);
        assert_eq!(settings.session.store, StoreKind::Cookie);
    }

    #[test]
    fn test_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oidc.yaml");
        std::fs::write(&path, "server:\n  port: 7000\nsession:\n  store: memory\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();

        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.session.store, StoreKind::Memory);
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oidc.yaml");
        std::fs::write(&path, "server:\n  port: [not, a, port]\n").unwrap();

        let result = Settings::from_file(&path);

        assert!(matches!(result, Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn test_flags_win_over_everything() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[("SERVER_HOST", "0.0.0.0")]))
            .unwrap();

        let flags = Flags::parse_from(["oidc-gate", "--host", "127.0.0.1", "--debug"]);
        settings.apply_flags(&flags);

        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 4600);
        assert!(settings.server.debug);
    }

    #[test]
    fn test_auth_config_always_requests_openid() {
        let mut settings = Settings::default();
        settings.oidc.provider = "https://idp.example.com".into();
        settings.oidc.client_id = "app".into();
        settings.oidc.redirect_url = "https://app.example.com/login".into();

        let config = settings.auth_config().unwrap();

        assert_eq!(config.scopes, vec!["openid", "profile"]);
    }

    #[test]
    fn test_redis_config_uses_session_max_age() {
        let mut settings = Settings::default();
        settings.session.max_age = 60;
        settings.redis.protocol = "unix".into();

        let config = settings.redis_config().unwrap();

        assert_eq!(config.max_age_seconds, 60);
        assert_eq!(config.protocol, RedisProtocol::Unix);
        assert_eq!(config.password, None);
    }
}
