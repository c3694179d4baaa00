use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info};
use uuid::Uuid;

/// Outbound senders plus room broadcast groups for all live connections.
///
/// Mutations are not synchronized here; the coordinator serializes every
/// event under one lock so that group membership and color assignments
/// change together.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    connections: HashMap<Uuid, mpsc::UnboundedSender<Message>>,
    rooms: HashMap<String, HashSet<Uuid>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: Uuid, sender: mpsc::UnboundedSender<Message>) {
        self.connections.insert(id, sender);
        info!("Added connection {} to pool", id);
    }

    /// Drop a connection and remove it from every broadcast group.
    pub fn remove(&mut self, id: &Uuid) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            self.rooms.retain(|_, members| {
                members.remove(id);
                !members.is_empty()
            });
            info!("Removed connection {} from pool", id);
        }
        removed
    }

    /// Subscribe a connection to a room's broadcast group. Returns false if
    /// it was already a member.
    pub fn join_room(&mut self, room_id: &str, id: Uuid) -> bool {
        self.rooms.entry(room_id.to_owned()).or_default().insert(id)
    }

    pub fn send_to(&self, id: &Uuid, msg: &str) {
        if let Some(sender) = self.connections.get(id) {
            if let Err(e) = sender.send(Message::Text(msg.to_string())) {
                error!("Failed to send to connection {}: {}", id, e);
            }
        }
    }

    /// Best-effort fanout to the room's current members. An unknown room is
    /// a no-op; a failed send is logged and skipped.
    pub fn broadcast_room(&self, room_id: &str, msg: &str, exclude: Option<Uuid>) {
        let members = match self.rooms.get(room_id) {
            Some(members) => members,
            None => return,
        };
        let message = Message::Text(msg.to_string());

        for id in members {
            if Some(*id) == exclude {
                continue;
            }
            if let Some(sender) = self.connections.get(id) {
                if let Err(e) = sender.send(message.clone()) {
                    error!("Failed to broadcast to connection {}: {}", id, e);
                }
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|m| m.len()).unwrap_or(0)
    }
}
