use super::SessionStore;
use crate::error::Result;
use crate::session::{SessionData, SessionId, SessionRecord, generate_session_id};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local session store, for development and tests
#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionData>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored copy of a session
    pub async fn get(&self, id: &str) -> Option<SessionData> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load(&self, cookie: Option<&str>) -> Result<SessionRecord> {
        let Some(id) = cookie else {
            return Ok(SessionRecord::default());
        };

        match self.sessions.read().await.get(id) {
            Some(data) => Ok(SessionRecord {
                id: Some(id.to_string()),
                data: data.clone(),
            }),
            None => Ok(SessionRecord::default()),
        }
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

        self.sessions
            .write()
            .await
            .insert(id.clone(), record.data.clone());
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_cookie_yields_fresh_record() {
        let store = MemoryStore::new();

        let record = store.load(Some("deadbeef")).await.unwrap();

        assert!(record.id.is_none());
        assert_eq!(record.data, SessionData::default());
    }

    #[tokio::test]
    async fn test_save_assigns_id_once() {
        let store = MemoryStore::new();
        let mut record = SessionRecord::default();

        let first = store.save(&mut record).await.unwrap();
        let second = store.save(&mut record).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len().await, 1);
    }
}
