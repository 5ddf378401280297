use async_trait::async_trait;

use crate::ids::{ConnectionId, SessionId};

/// Error from the presence backend. Callers treat these as transient
/// infrastructure failures: log and degrade, never abort the operation
/// that triggered the presence call.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("presence backend error: {0}")]
    Backend(String),
}

/// Cross-process set of live teacher connections per session.
///
/// Implementations must make each mutation an atomic set operation so
/// concurrent attach/detach from different hub processes never lose an
/// update. Membership is per connection id; the per-session set is created
/// on first add and may remain empty after the last remove.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn add_member(
        &self,
        session_id: &SessionId,
        member: &ConnectionId,
    ) -> Result<(), PresenceError>;

    async fn remove_member(
        &self,
        session_id: &SessionId,
        member: &ConnectionId,
    ) -> Result<(), PresenceError>;

    async fn member_count(&self, session_id: &SessionId) -> Result<u64, PresenceError>;
}
