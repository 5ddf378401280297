use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use lectern_core::{ConnectionId, GroupKey, Role, SessionEvent, SessionId};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(90);

/// One attached WebSocket connection, filed under its (session, role)
/// group. Owned by the registry; dropped on detach.
pub struct Connection {
    pub id: ConnectionId,
    pub session_id: SessionId,
    pub role: Role,
    pub attached_at: u64,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Connection {
    fn new(id: ConnectionId, session_id: SessionId, role: Role, tx: mpsc::Sender<String>) -> Self {
        let now = now_secs();
        Self {
            id,
            session_id,
            role,
            attached_at: now,
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < CONNECTION_TIMEOUT.as_secs()
    }

    fn matches(&self, group: &GroupKey) -> bool {
        self.session_id == group.session_id && self.role == group.role
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Per-process registry of attached connections, addressed by
/// (session, role) group keys for broadcast.
///
/// Delivery is fire-and-forget per connection: a closed or full send
/// queue drops that one delivery and never propagates to the caller or
/// the other group members. Detaching during a broadcast is tolerated:
/// the connection either receives the message or has already been
/// removed from the iteration.
pub struct GroupRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    max_send_queue: usize,
}

impl GroupRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue,
        }
    }

    /// Attach a new connection under (session, role). Returns its id and
    /// the receiver half the transport writer drains.
    pub fn attach(&self, session_id: SessionId, role: Role) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let conn = Arc::new(Connection::new(id.clone(), session_id, role, tx));
        self.connections.insert(id.clone(), conn);
        (id, rx)
    }

    /// Detach a connection. Unknown ids are a no-op.
    pub fn detach(&self, id: &ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(id) {
            conn.connected.store(false, Ordering::Relaxed);
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Send an event to one connection. Returns false when the connection
    /// is gone or its queue rejected the message.
    pub fn send_to(&self, id: &ConnectionId, event: &SessionEvent) -> bool {
        let Some(conn) = self.get(id) else {
            return false;
        };
        let Ok(json) = serde_json::to_string(event) else {
            return false;
        };
        deliver(&conn, json)
    }

    /// Deliver an event to every connection in a group.
    pub fn broadcast(&self, group: &GroupKey, event: &SessionEvent) {
        self.broadcast_many(std::slice::from_ref(group), event);
    }

    /// Deliver an event to the union of several groups. Serializes once.
    pub fn broadcast_many(&self, groups: &[GroupKey], event: &SessionEvent) {
        let Ok(json) = serde_json::to_string(event) else {
            tracing::warn!("unserializable session event, dropping broadcast");
            return;
        };
        for entry in self.connections.iter() {
            let conn = entry.value();
            if conn.is_connected() && groups.iter().any(|g| conn.matches(g)) {
                deliver(conn, json.clone());
            }
        }
    }

    /// Record a protocol-level pong for liveness tracking.
    pub fn record_pong(&self, id: &ConnectionId) {
        if let Some(conn) = self.connections.get(id) {
            conn.record_pong();
        }
    }

    /// All connection ids attached to a session, both roles.
    pub fn connections_for_session(&self, session_id: &SessionId) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| &entry.value().session_id == session_id)
            .map(|entry| entry.value().id.clone())
            .collect()
    }

    /// Detach every connection of a session. Dropping the senders lets the
    /// transport writers drain their queues and close the sockets.
    pub fn close_session(&self, session_id: &SessionId) -> usize {
        let ids = self.connections_for_session(session_id);
        let closed = ids.len();
        for id in ids {
            self.detach(&id);
        }
        closed
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Remove connections that missed the pong deadline.
    pub fn cleanup_dead_connections(&self) -> usize {
        let dead: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.value().id.clone())
            .collect();

        let removed = dead.len();
        for id in dead {
            self.detach(&id);
            tracing::info!(connection_id = %id, "cleaned up dead connection");
        }
        removed
    }
}

fn deliver(conn: &Connection, json: String) -> bool {
    match conn.tx.try_send(json) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(connection_id = %conn.id, "send queue full, dropping event");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Periodic sweep for connections that stopped answering pings.
pub fn start_cleanup_task(
    registry: Arc<GroupRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_connections();
            if removed > 0 {
                tracing::info!(removed, "dead connection sweep");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> SessionEvent {
        SessionEvent::TeacherPresence {
            teacher_online: true,
        }
    }

    #[test]
    fn attach_and_detach() {
        let registry = GroupRegistry::new(32);
        let session = SessionId::new();
        let (id1, _rx1) = registry.attach(session.clone(), Role::Student);
        let (id2, _rx2) = registry.attach(session, Role::Teacher);
        assert_eq!(registry.count(), 2);

        registry.detach(&id1);
        assert_eq!(registry.count(), 1);

        // Detaching an unknown connection is a no-op
        registry.detach(&id1);
        registry.detach(&id2);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn broadcast_reaches_only_the_group() {
        let registry = GroupRegistry::new(32);
        let session = SessionId::new();
        let other_session = SessionId::new();

        let (_s1, mut rx_student) = registry.attach(session.clone(), Role::Student);
        let (_t1, mut rx_teacher) = registry.attach(session.clone(), Role::Teacher);
        let (_s2, mut rx_other) = registry.attach(other_session, Role::Student);

        registry.broadcast(&GroupKey::student(&session), &event());

        assert!(rx_student.try_recv().is_ok());
        assert!(rx_teacher.try_recv().is_err());
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn broadcast_many_covers_both_roles() {
        let registry = GroupRegistry::new(32);
        let session = SessionId::new();
        let (_s, mut rx_student) = registry.attach(session.clone(), Role::Student);
        let (_t, mut rx_teacher) = registry.attach(session.clone(), Role::Teacher);

        registry.broadcast_many(&GroupKey::both(&session), &event());

        assert!(rx_student.try_recv().is_ok());
        assert!(rx_teacher.try_recv().is_ok());
    }

    #[test]
    fn full_queue_drops_without_failing_others() {
        let registry = GroupRegistry::new(1);
        let session = SessionId::new();
        let (_a, mut rx_a) = registry.attach(session.clone(), Role::Student);
        let (_b, mut rx_b) = registry.attach(session.clone(), Role::Student);

        let group = GroupKey::student(&session);
        registry.broadcast(&group, &event());
        // rx_a's queue is now full; the second broadcast drops for a but
        // still lands in b once b drains.
        assert!(rx_b.try_recv().is_ok());
        registry.broadcast(&group, &event());

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn detached_connection_receives_nothing_new() {
        let registry = GroupRegistry::new(32);
        let session = SessionId::new();
        let (id, mut rx) = registry.attach(session.clone(), Role::Teacher);

        registry.detach(&id);
        registry.broadcast(&GroupKey::teacher(&session), &event());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_to_unknown_connection_is_false() {
        let registry = GroupRegistry::new(32);
        assert!(!registry.send_to(&ConnectionId::new(), &event()));
    }

    #[test]
    fn close_session_detaches_both_roles() {
        let registry = GroupRegistry::new(32);
        let session = SessionId::new();
        let other = SessionId::new();
        registry.attach(session.clone(), Role::Student);
        registry.attach(session.clone(), Role::Teacher);
        let (_o, _rx) = registry.attach(other, Role::Student);

        let closed = registry.close_session(&session);
        assert_eq!(closed, 2);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn cleanup_removes_expired_connections() {
        let registry = GroupRegistry::new(32);
        let session = SessionId::new();
        let (id, _rx) = registry.attach(session, Role::Student);

        if let Some(conn) = registry.get(&id) {
            conn.last_pong.store(0, Ordering::Relaxed);
        }

        assert_eq!(registry.cleanup_dead_connections(), 1);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn events_arrive_in_send_order() {
        let registry = GroupRegistry::new(32);
        let session = SessionId::new();
        let (_id, mut rx) = registry.attach(session.clone(), Role::Student);
        let group = GroupKey::student(&session);

        registry.broadcast(
            &group,
            &SessionEvent::QuestionLikeUpdate {
                question_id: 1,
                like_count: 1,
            },
        );
        registry.broadcast(
            &group,
            &SessionEvent::QuestionLikeUpdate {
                question_id: 1,
                like_count: 2,
            },
        );

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(first.contains("\"like_count\":1"));
        assert!(second.contains("\"like_count\":2"));
    }
}
