use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::session::registry::{Color, ColorAssignment, SessionPolicy, SessionRegistry};
use crate::websocket::connection::ServerMessage;
use crate::websocket::pool::ConnectionPool;

/// Translates channel events into registry operations and broadcasts.
///
/// All state lives behind one lock and every event handler holds it for its
/// whole body, so each event runs to completion before the next one touches
/// the registry or the broadcast groups. That is the only synchronization
/// the session layer needs.
pub struct SessionCoordinator {
    state: RwLock<CoordinatorState>,
}

struct CoordinatorState {
    registry: SessionRegistry,
    pool: ConnectionPool,
}

impl SessionCoordinator {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            state: RwLock::new(CoordinatorState {
                registry: SessionRegistry::new(policy),
                pool: ConnectionPool::new(),
            }),
        }
    }

    /// Register a freshly accepted connection and tell it its identifier.
    /// Clients need the id to recognize themselves in snapshots.
    pub async fn connect(&self, id: Uuid, sender: mpsc::UnboundedSender<Message>) {
        let mut state = self.state.write().await;
        state.pool.add(id, sender);
        Self::send(&state, id, &ServerMessage::Connected { connection_id: id });
    }

    /// Subscribe to the room and push the current snapshot to every member,
    /// the joiner included.
    pub async fn join(&self, id: Uuid, room_id: &str) {
        let mut state = self.state.write().await;
        state.pool.join_room(room_id, id);
        state.registry.ensure_room(room_id);
        info!("Connection {} joined room {}", id, room_id);
        Self::broadcast_snapshot(&state, room_id);
    }

    /// Claim a color slot. On success the whole room hears the new snapshot;
    /// a policy rejection is reported to the requester alone.
    pub async fn set_color(&self, id: Uuid, room_id: &str, color: Color) {
        let mut state = self.state.write().await;
        if state.registry.assign_color(room_id, color, id) {
            info!("Connection {} is now {} in room {}", id, color, room_id);
            Self::broadcast_snapshot(&state, room_id);
        } else {
            warn!(
                "Connection {} denied {} in room {}: already holds the other color",
                id, color, room_id
            );
            Self::send(
                &state,
                id,
                &ServerMessage::Error {
                    message: format!("cannot claim {}: you already hold the other color", color),
                },
            );
        }
    }

    /// Forward an opaque move payload to the room, excluding the sender.
    /// The payload is relayed verbatim; legality is the clients' business.
    pub async fn relay_move(&self, id: Uuid, room_id: &str, payload: serde_json::Value) {
        let state = self.state.read().await;
        match serde_json::to_string(&ServerMessage::OpponentMove(payload)) {
            Ok(text) => state.pool.broadcast_room(room_id, &text, Some(id)),
            Err(e) => error!("Failed to serialize move for room {}: {}", room_id, e),
        }
    }

    /// Tear down a departed connection: release its color slots, drop it from
    /// every broadcast group, and rebroadcast the rooms its departure changed.
    pub async fn disconnect(&self, id: Uuid) {
        let mut state = self.state.write().await;
        let touched = state.registry.clear_connection(id);
        state.pool.remove(&id);
        for room_id in &touched {
            Self::broadcast_snapshot(&state, room_id);
        }
        info!(
            "Connection {} disconnected, cleared {} room(s)",
            id,
            touched.len()
        );
    }

    pub async fn snapshot(&self, room_id: &str) -> ColorAssignment {
        self.state.read().await.registry.snapshot(room_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.pool.connection_count()
    }

    pub async fn room_member_count(&self, room_id: &str) -> usize {
        self.state.read().await.pool.room_member_count(room_id)
    }

    fn broadcast_snapshot(state: &CoordinatorState, room_id: &str) {
        let msg = ServerMessage::ColorAssignment(state.registry.snapshot(room_id));
        match serde_json::to_string(&msg) {
            Ok(text) => state.pool.broadcast_room(room_id, &text, None),
            Err(e) => error!("Failed to serialize snapshot for room {}: {}", room_id, e),
        }
    }

    fn send(state: &CoordinatorState, id: Uuid, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(text) => state.pool.send_to(&id, &text),
            Err(e) => error!("Failed to serialize message for connection {}: {}", id, e),
        }
    }
}
