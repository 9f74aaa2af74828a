use super::SessionStore;
use crate::error::{Error, Result};
use crate::session::{SessionData, SessionRecord};
use async_trait::async_trait;

/// Largest serialized session the cookie store accepts.
///
/// Encryption adds a nonce and tag and base64 grows the result by a third;
/// this keeps the final cookie under the 4096 byte browser limit.
pub const MAX_COOKIE_PAYLOAD: usize = 3000;

/// Client-held session store: the whole session travels in the (encrypted)
/// session cookie, nothing is kept server side.
#[derive(Debug, Clone)]
pub struct CookieStore {
    max_payload: usize,
}

impl CookieStore {
    pub fn new() -> Self {
        Self {
            max_payload: MAX_COOKIE_PAYLOAD,
        }
    }

    /// Override the payload limit
    pub fn with_max_payload(mut self, bytes: usize) -> Self {
        self.max_payload = bytes;
        self
    }
}

impl Default for CookieStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for CookieStore {
    async fn load(&self, cookie: Option<&str>) -> Result<SessionRecord> {
        let data = match cookie {
            Some(value) => serde_json::from_str::<SessionData>(value).unwrap_or_else(|e| {
                tracing::debug!(error = %e, "discarding undecodable session cookie");
                SessionData::default()
            }),
            None => SessionData::default(),
        };

        Ok(SessionRecord { id: None, data })
    }

    async fn save(&self, record: &mut SessionRecord) -> Result<String> {
        let value = serde_json::to_string(&record.data)
            .map_err(|e| Error::Storage(format!("failed to encode session: {}", e)))?;

        if value.len() > self.max_payload {
            return Err(Error::Storage(format!(
                "session of {} bytes exceeds the cookie limit of {} bytes",
                value.len(),
                self.max_payload
            )));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_through_cookie_value() {
        let store = CookieStore::new();
        let mut record = SessionRecord::default();
        record.data.access_token = Some("T1".into());
        record.data.user = Some("u123".into());

        let cookie = store.save(&mut record).await.unwrap();
        let loaded = store.load(Some(&cookie)).await.unwrap();

        assert_eq!(loaded.data, record.data);
        assert!(loaded.id.is_none());
    }

    #[tokio::test]
    async fn test_garbage_cookie_is_an_empty_session() {
        let store = CookieStore::new();

        let loaded = store.load(Some("not json")).await.unwrap();

        assert_eq!(loaded.data, SessionData::default());
    }

    #[tokio::test]
    async fn test_oversized_session_is_a_storage_error() {
        let store = CookieStore::new().with_max_payload(64);
        let mut record = SessionRecord::default();
        record.data.id_token = Some("x".repeat(128));

        let result = store.save(&mut record).await;

        assert!(matches!(result, Err(Error::Storage(_))));
    }
}
