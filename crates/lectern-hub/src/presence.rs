use std::collections::HashSet;

use async_trait::async_trait;
use bb8_redis::bb8::Pool;
use bb8_redis::redis::AsyncCommands;
use bb8_redis::RedisConnectionManager;
use dashmap::DashMap;

use lectern_core::{ConnectionId, PresenceError, PresenceStore, SessionId};

/// Process-local presence store. Correct for a single hub instance and for
/// tests; a multi-instance deployment needs the Redis store below.
#[derive(Default)]
pub struct LocalPresenceStore {
    sets: DashMap<String, HashSet<String>>,
}

impl LocalPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for LocalPresenceStore {
    async fn add_member(
        &self,
        session_id: &SessionId,
        member: &ConnectionId,
    ) -> Result<(), PresenceError> {
        self.sets
            .entry(session_id.as_str().to_string())
            .or_default()
            .insert(member.as_str().to_string());
        Ok(())
    }

    async fn remove_member(
        &self,
        session_id: &SessionId,
        member: &ConnectionId,
    ) -> Result<(), PresenceError> {
        if let Some(mut set) = self.sets.get_mut(session_id.as_str()) {
            set.remove(member.as_str());
        }
        Ok(())
    }

    async fn member_count(&self, session_id: &SessionId) -> Result<u64, PresenceError> {
        Ok(self
            .sets
            .get(session_id.as_str())
            .map(|set| set.len() as u64)
            .unwrap_or(0))
    }
}

/// Redis-backed presence store shared by every hub process. SADD/SREM/
/// SCARD are single atomic commands, so concurrent attach/detach from
/// different processes never lose an update.
pub struct RedisPresenceStore {
    pool: Pool<RedisConnectionManager>,
}

impl RedisPresenceStore {
    pub async fn connect(url: &str) -> Result<Self, PresenceError> {
        let manager = RedisConnectionManager::new(url)
            .map_err(|e| PresenceError::Backend(e.to_string()))?;
        let pool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| PresenceError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    fn key(session_id: &SessionId) -> String {
        format!("presence:session:{}:teachers", session_id.as_str())
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn add_member(
        &self,
        session_id: &SessionId,
        member: &ConnectionId,
    ) -> Result<(), PresenceError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PresenceError::Backend(e.to_string()))?;
        let _: i64 = conn
            .sadd(Self::key(session_id), member.as_str())
            .await
            .map_err(|e| PresenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove_member(
        &self,
        session_id: &SessionId,
        member: &ConnectionId,
    ) -> Result<(), PresenceError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PresenceError::Backend(e.to_string()))?;
        let _: i64 = conn
            .srem(Self::key(session_id), member.as_str())
            .await
            .map_err(|e| PresenceError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn member_count(&self, session_id: &SessionId) -> Result<u64, PresenceError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PresenceError::Backend(e.to_string()))?;
        conn.scard(Self::key(session_id))
            .await
            .map_err(|e| PresenceError::Backend(e.to_string()))
    }
}
