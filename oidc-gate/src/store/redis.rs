use super::SessionStore;
use crate::error::{Error, Result};
use crate::session::{SessionData, SessionRecord, generate_session_id};
use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Transport used to reach the Redis server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisProtocol {
    Tcp,
    /// `host` is the path of the server socket
    Unix,
}

impl FromStr for RedisProtocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(RedisProtocol::Tcp),
            "unix" => Ok(RedisProtocol::Unix),
            other => Err(Error::Config(format!("unsupported redis protocol: {}", other))),
        }
    }
}

impl fmt::Display for RedisProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedisProtocol::Tcp => write!(f, "tcp"),
            RedisProtocol::Unix => write!(f, "unix"),
        }
    }
}

/// Connection settings for the Redis session store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub protocol: RedisProtocol,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Number of multiplexed connections kept open
    pub connections: usize,
    /// Lifetime of a stored session in seconds, 0 keeps entries forever
    pub max_age_seconds: u64,
    /// Prefix of every session key
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            protocol: RedisProtocol::Tcp,
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            connections: 10,
            max_age_seconds: 1800,
            key_prefix: "session_".to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Connection URL understood by the redis client
    pub fn url(&self) -> String {
        let password = self
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| urlencoding::encode(p).into_owned());

        match self.protocol {
            RedisProtocol::Tcp => match password {
                Some(password) => format!("redis://:{}@{}:{}/", password, self.host, self.port),
                None => format!("redis://{}:{}/", self.host, self.port),
            },
            RedisProtocol::Unix => match password {
                Some(password) => format!("redis+unix://{}?pass={}", self.host, password),
                None => format!("redis+unix://{}", self.host),
            },
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }
}

/// Server-held session store backed by Redis
///
/// The cookie only carries the session id; session fields are stored as a
/// JSON document under `<prefix><id>`.
#[derive(Clone)]
pub struct RedisStore {
    config: RedisStoreConfig,
    pool: Arc<Vec<MultiplexedConnection>>,
    next: Arc<AtomicUsize>,
}

impl RedisStore {
    /// Open the configured number of connections
    pub async fn connect(config: RedisStoreConfig) -> Result<Self> {
        let client = ::redis::Client::open(config.url())?;

        let size = config.connections.max(1);
        let mut pool = Vec::with_capacity(size);
        for _ in 0..size {
            pool.push(client.get_multiplexed_async_connection().await?);
        }

        tracing::info!(
            protocol = %config.protocol,
            host = %config.host,
            connections = size,
            "connected to redis session store"
        );

        Ok(Self {
            config,
            pool: Arc::new(pool),
            next: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn connection(&self) -> MultiplexedConnection {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[index].clone()
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn load(&self, cookie: Option<&str>) -> Result<SessionRecord> {
        let Some(id) = cookie else {
            return Ok(SessionRecord::default());
        };

        let mut conn = self.connection();
        let value: Option<String> = conn.get(self.config.key(id)).await?;

        Ok(decode_record(id, value))
    }

    async fn save(&self, record: &mut SessionRecord) -> Result<String> {
        let id = match &record.id {
            Some(id) => id.clone(),
            None => {
                let id = generate_session_id()?;
                record.id = Some(id.clone());
                id
            }
        };

        let value = encode_data(&record.data)?;

        let mut conn = self.connection();
        let () = write_command(&self.config.key(&id), &value, self.config.max_age_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(id)
    }
}

/// A missing or undecodable value starts a fresh session
fn decode_record(id: &str, value: Option<String>) -> SessionRecord {
    let Some(value) = value else {
        return SessionRecord::default();
    };

    match serde_json::from_str::<SessionData>(&value) {
        Ok(data) => SessionRecord {
            id: Some(id.to_string()),
            data,
        },
        Err(e) => {
            tracing::warn!(error = %e, "discarding undecodable redis session");
            SessionRecord::default()
        }
    }
}

fn encode_data(data: &SessionData) -> Result<String> {
    serde_json::to_string(data)
        .map_err(|e| Error::Storage(format!("failed to encode session: {}", e)))
}

/// `SET key value EX max_age`, or a plain `SET` when entries never expire
fn write_command(key: &str, value: &str, max_age_seconds: u64) -> ::redis::Cmd {
    let mut cmd = ::redis::cmd("SET");
    cmd.arg(key).arg(value);
    if max_age_seconds > 0 {
        cmd.arg("EX").arg(max_age_seconds);
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_url_escapes_password() {
        let config = RedisStoreConfig {
            password: Some("p@ss:word".to_string()),
            ..Default::default()
        };

        assert_eq!(config.url(), "redis://:p%40ss%3Aword@localhost:6379/");
    }

    #[test]
    fn test_url_without_password() {
        let config = RedisStoreConfig {
            password: Some(String::new()),
            host: "cache".to_string(),
            port: 6380,
            ..Default::default()
        };

        assert_eq!(config.url(), "redis://cache:6380/");
    }

    #[test]
    fn test_unix_url_uses_socket_path() {
        let config = RedisStoreConfig {
            protocol: RedisProtocol::Unix,
            host: "/var/run/redis.sock".to_string(),
            ..Default::default()
        };

        assert_eq!(config.url(), "redis+unix:///var/run/redis.sock");
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("TCP".parse::<RedisProtocol>().unwrap(), RedisProtocol::Tcp);
        assert_eq!("unix".parse::<RedisProtocol>().unwrap(), RedisProtocol::Unix);
        assert!("udp".parse::<RedisProtocol>().is_err());
    }

    #[test]
    fn test_session_keys_are_prefixed() {
        let config = RedisStoreConfig::default();

        assert_eq!(config.key("abc"), "session_abc");
    }

    #[test]
    fn test_stored_session_is_decoded() {
        let data = SessionData {
            access_token: Some("T1".to_string()),
            ..Default::default()
        };
        let value = encode_data(&data).unwrap();

        let record = decode_record("abc", Some(value));

        assert_eq!(record.id.as_deref(), Some("abc"));
        assert_eq!(record.data.access_token.as_deref(), Some("T1"));
    }

    #[test]
    fn test_missing_or_corrupt_session_starts_fresh() {
        let record = decode_record("abc", None);
        assert!(record.id.is_none());

        let record = decode_record("abc", Some("{not json".to_string()));
        assert!(record.id.is_none());
        assert!(record.data.access_token.is_none());
    }

    #[test]
    fn test_write_sets_expiry_when_configured() {
        let expiring = write_command("session_abc", "{}", 60);
        let expected = ::redis::cmd("SET")
            .arg("session_abc")
            .arg("{}")
            .arg("EX")
            .arg(60u64)
            .get_packed_command();
        assert_eq!(expiring.get_packed_command(), expected);

        let forever = write_command("session_abc", "{}", 0);
        let expected = ::redis::cmd("SET")
            .arg("session_abc")
            .arg("{}")
            .get_packed_command();
        assert_eq!(forever.get_packed_command(), expected);
    }
}
