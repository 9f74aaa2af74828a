//! Session persistence backends.

mod cookie;
mod memory;
mod redis;

pub use self::cookie::{CookieStore, MAX_COOKIE_PAYLOAD};
pub use self::memory::MemoryStore;
pub use self::redis::{RedisProtocol, RedisStore, RedisStoreConfig};

use crate::error::Result;
use crate::session::SessionRecord;
use async_trait::async_trait;

/// Storage abstraction for browser sessions
///
/// Every backend is addressed through the value of the session cookie: the
/// cookie store keeps the whole session in it, server-held stores keep only a
/// session id there.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve the session referenced by the request cookie.
    ///
    /// A missing, stale or undecodable cookie yields an empty record.
    async fn load(&self, cookie: Option<&str>) -> Result<SessionRecord>;

    /// Persist the record and return the cookie value the client must send back.
    async fn save(&self, record: &mut SessionRecord) -> Result<String>;
}
