use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use lectern_core::{
    ClientFrame, ConnectionId, GroupKey, PresenceStore, Role, SessionEvent, SessionId,
};

use crate::groups::{GroupRegistry, HEARTBEAT_INTERVAL};

/// Orchestrates connection lifecycle and presence-derived broadcasts.
///
/// Attach and detach go through here so teacher-role connections keep the
/// cross-process presence set in sync and students hear about it. The
/// presence store is injected at construction; a failing store degrades to
/// "teacher offline" instead of failing the connection.
pub struct SessionHub {
    registry: Arc<GroupRegistry>,
    presence: Arc<dyn PresenceStore>,
}

impl SessionHub {
    pub fn new(registry: Arc<GroupRegistry>, presence: Arc<dyn PresenceStore>) -> Self {
        Self { registry, presence }
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    /// Whether any teacher connection is attached to the session, across
    /// all hub processes sharing the presence store.
    pub async fn teacher_online(&self, session_id: &SessionId) -> bool {
        match self.presence.member_count(session_id).await {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "presence query failed, reporting offline");
                false
            }
        }
    }

    /// Attach a connection and send it the initial snapshot. Teacher
    /// attaches update the presence set and notify the student group.
    #[instrument(skip(self), fields(session_id = %session_id, role = %role))]
    pub async fn attach(
        &self,
        session_id: SessionId,
        role: Role,
    ) -> (ConnectionId, mpsc::Receiver<String>) {
        let (conn_id, rx) = self.registry.attach(session_id.clone(), role);
        info!(connection_id = %conn_id, "connection attached");

        if role == Role::Teacher {
            if let Err(e) = self.presence.add_member(&session_id, &conn_id).await {
                warn!(session_id = %session_id, error = %e, "presence add failed");
            }
            let teacher_online = self.teacher_online(&session_id).await;
            self.registry.broadcast(
                &GroupKey::student(&session_id),
                &SessionEvent::TeacherPresence { teacher_online },
            );
        }

        let teacher_online = self.teacher_online(&session_id).await;
        self.registry.send_to(
            &conn_id,
            &SessionEvent::Connected {
                session_id,
                role,
                teacher_online,
            },
        );

        (conn_id, rx)
    }

    /// Detach a connection (explicit close or transport failure). Teacher
    /// detaches update the presence set and notify the student group with
    /// the remaining-count result.
    #[instrument(skip(self), fields(connection_id = %conn_id))]
    pub async fn detach(&self, conn_id: &ConnectionId) {
        let Some(conn) = self.registry.get(conn_id) else {
            return;
        };
        let session_id = conn.session_id.clone();
        let role = conn.role;
        self.registry.detach(conn_id);
        info!(session_id = %session_id, role = %role, "connection detached");

        if role == Role::Teacher {
            if let Err(e) = self.presence.remove_member(&session_id, conn_id).await {
                warn!(session_id = %session_id, error = %e, "presence remove failed");
            }
            let teacher_online = self.teacher_online(&session_id).await;
            self.registry.broadcast(
                &GroupKey::student(&session_id),
                &SessionEvent::TeacherPresence { teacher_online },
            );
        }
    }

    /// Broadcast `session_ended` to both role groups, then close every
    /// connection of the session. Queued events drain before the sockets
    /// close, so clients see the event first.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn end_session(&self, session_id: &SessionId) -> usize {
        self.registry
            .broadcast_many(&GroupKey::both(session_id), &SessionEvent::SessionEnded);
        let closed = self.registry.close_session(session_id);
        info!(closed, "session ended");
        closed
    }

    /// Dispatch an inbound application-level frame. Pings get an immediate
    /// pong; anything unrecognized is ignored.
    pub fn handle_frame(&self, conn_id: &ConnectionId, raw: &str) {
        match serde_json::from_str::<ClientFrame>(raw) {
            Ok(ClientFrame::Ping) => {
                self.registry.send_to(conn_id, &SessionEvent::Pong);
            }
            Err(_) => {}
        }
    }
}

/// Drive one WebSocket: writer forwards queued events and pings on a
/// heartbeat, reader dispatches inbound frames and tracks pongs. Either
/// side ending detaches the connection.
pub async fn handle_ws_connection(
    socket: WebSocket,
    hub: Arc<SessionHub>,
    conn_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let reader_hub = Arc::clone(&hub);
    let reader_cid = conn_id.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    reader_hub.handle_frame(&reader_cid, text.as_str());
                }
                WsMessage::Pong(_) => {
                    reader_hub.registry().record_pong(&reader_cid);
                }
                WsMessage::Close(_) => break,
                // axum answers protocol pings automatically
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    hub.detach(&conn_id).await;
}
