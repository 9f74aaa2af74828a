use crate::error::{Error, Result};
use crate::store::SessionStore;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Unique identifier for a server-held session
pub type SessionId = String;

/// Number of random bytes behind a state nonce
pub const STATE_BYTES: usize = 32;

/// Authentication fields kept for one browser client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    /// CSRF nonce of the login flow in progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Where to send the user once the login flow completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Verified subject identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl SessionData {
    /// A session is authenticated exactly when it holds an access token.
    ///
    /// Token expiry is not consulted.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Check if a login flow is waiting for its callback
    pub fn is_pending(&self) -> bool {
        self.state.is_some()
    }
}

/// What a store hands back for one request: the backend key, if the backend
/// keeps one, and the decoded fields.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub id: Option<SessionId>,
    pub data: SessionData,
}

/// The caller's session for the duration of a single request.
///
/// Reads and writes touch only the in-memory copy; [`Session::save`] is the
/// single point where pending writes reach the backing store.
pub struct Session {
    record: SessionRecord,
    store: Arc<dyn SessionStore>,
    cookie: Option<String>,
}

impl Session {
    /// Resolve the session referenced by the request cookie
    pub async fn load(store: Arc<dyn SessionStore>, cookie: Option<&str>) -> Result<Self> {
        let record = store.load(cookie).await?;
        Ok(Self {
            record,
            store,
            cookie: None,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.record.id.as_deref()
    }

    pub fn data(&self) -> &SessionData {
        &self.record.data
    }

    pub fn data_mut(&mut self) -> &mut SessionData {
        &mut self.record.data
    }

    /// Drop every field
    pub fn clear(&mut self) {
        self.record.data = SessionData::default();
    }

    /// Have the next save issue a new backend key, so an id handed out
    /// before login never names the authenticated session
    pub fn rotate_id(&mut self) {
        self.record.id = None;
    }

    /// Persist pending writes
    pub async fn save(&mut self) -> Result<()> {
        let cookie = self.store.save(&mut self.record).await?;
        self.cookie = Some(cookie);
        Ok(())
    }

    /// Cookie value produced by the last successful save, if any
    pub fn take_cookie(&mut self) -> Option<String> {
        self.cookie.take()
    }
}

/// Generate a fresh state nonce: 32 bytes from the OS entropy source,
/// standard base64.
pub fn generate_state() -> Result<String> {
    let bytes = random_bytes::<STATE_BYTES>()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

pub(crate) fn generate_session_id() -> Result<SessionId> {
    let bytes = random_bytes::<32>()?;
    Ok(hex::encode(bytes))
}

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::Entropy(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_state_is_base64_of_32_bytes() {
        let state = generate_state().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&state)
            .unwrap();

        assert_eq!(decoded.len(), STATE_BYTES);
        assert_ne!(state, generate_state().unwrap());
    }

    #[test]
    fn test_session_id_is_hex() {
        let id = generate_session_id().unwrap();

        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_serialization_skips_unset_fields() {
        let data = SessionData {
            state: Some("nonce".into()),
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_string(&data).unwrap(),
            r#"{"state":"nonce"}"#
        );
        assert!(!data.is_authenticated());
        assert!(data.is_pending());
    }

    #[tokio::test]
    async fn test_writes_are_pending_until_save() {
        let store = Arc::new(MemoryStore::new());

        let mut session = Session::load(store.clone(), None).await.unwrap();
        session.data_mut().user = Some("u1".into());
        assert!(session.take_cookie().is_none());

        session.save().await.unwrap();
        let cookie = session.take_cookie().unwrap();

        let reloaded = Session::load(store, Some(&cookie)).await.unwrap();
        assert_eq!(reloaded.data().user.as_deref(), Some("u1"));
        assert_eq!(reloaded.id(), Some(cookie.as_str()));
    }

    #[tokio::test]
    async fn test_rotated_session_is_saved_under_new_id() {
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::load(store.clone(), None).await.unwrap();
        session.save().await.unwrap();
        let first = session.take_cookie().unwrap();

        session.data_mut().user = Some("u1".into());
        session.rotate_id();
        session.save().await.unwrap();
        let second = session.take_cookie().unwrap();

        assert_ne!(first, second);
        assert_eq!(session.id(), Some(second.as_str()));
        assert!(store.get(&first).await.unwrap().user.is_none());
        assert_eq!(store.get(&second).await.unwrap().user.as_deref(), Some("u1"));
    }
}
