use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// One of the two sides of the board a connection can claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

/// Current color occupancy of a room. Absent slots are omitted on the wire,
/// so clients see `{ "white": "<id>" }` rather than `"black": null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAssignment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub black: Option<Uuid>,
}

impl ColorAssignment {
    pub fn slot(&self, color: Color) -> Option<Uuid> {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    fn slot_mut(&mut self, color: Color) -> &mut Option<Uuid> {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    fn holds(&self, connection_id: Uuid) -> bool {
        self.white == Some(connection_id) || self.black == Some(connection_id)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Whether one connection may occupy both colors of the same room.
    pub allow_self_assignment: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            allow_self_assignment: true,
        }
    }
}

/// Source of truth for which connection plays which side in each room.
///
/// Rooms are created lazily and kept for the life of the process; an empty
/// assignment is not a reason to drop the room. The `held` index inverts the
/// slot occupancy so that disconnect cleanup only visits rooms the departing
/// connection actually played in.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    rooms: HashMap<String, ColorAssignment>,
    held: HashMap<Uuid, HashSet<String>>,
    policy: SessionPolicy,
}

impl SessionRegistry {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            rooms: HashMap::new(),
            held: HashMap::new(),
            policy,
        }
    }

    /// Create the room's assignment table if it does not exist yet. Idempotent.
    pub fn ensure_room(&mut self, room_id: &str) {
        self.rooms.entry(room_id.to_owned()).or_default();
    }

    /// Claim a color slot for a connection, creating the room if needed.
    ///
    /// Last writer wins: an occupied slot is overwritten without complaint.
    /// Returns false (and leaves the room untouched) only when the policy
    /// forbids self-assignment and the connection already holds the opposite
    /// color in this room.
    pub fn assign_color(&mut self, room_id: &str, color: Color, connection_id: Uuid) -> bool {
        if !self.policy.allow_self_assignment {
            let opposite = self
                .rooms
                .get(room_id)
                .and_then(|a| a.slot(color.opposite()));
            if opposite == Some(connection_id) {
                debug!(
                    "Rejected self-assignment of {} in room {} by connection {}",
                    color, room_id, connection_id
                );
                return false;
            }
        }

        let assignment = self.rooms.entry(room_id.to_owned()).or_default();
        let displaced = assignment.slot_mut(color).replace(connection_id);
        let displaced_still_holds = displaced.map(|prev| assignment.holds(prev)).unwrap_or(false);

        self.held
            .entry(connection_id)
            .or_default()
            .insert(room_id.to_owned());

        if let Some(prev) = displaced {
            if prev != connection_id && !displaced_still_holds {
                if let Some(rooms) = self.held.get_mut(&prev) {
                    rooms.remove(room_id);
                    if rooms.is_empty() {
                        self.held.remove(&prev);
                    }
                }
            }
        }

        true
    }

    /// Release every slot the connection occupies and return the rooms that
    /// changed, so callers know which snapshots to rebroadcast.
    pub fn clear_connection(&mut self, connection_id: Uuid) -> Vec<String> {
        let rooms = match self.held.remove(&connection_id) {
            Some(rooms) => rooms,
            None => return Vec::new(),
        };

        let mut touched: Vec<String> = Vec::with_capacity(rooms.len());
        for room_id in rooms {
            if let Some(assignment) = self.rooms.get_mut(&room_id) {
                if assignment.white == Some(connection_id) {
                    assignment.white = None;
                }
                if assignment.black == Some(connection_id) {
                    assignment.black = None;
                }
            }
            touched.push(room_id);
        }
        // Stable order keeps rebroadcasts deterministic
        touched.sort();
        touched
    }

    /// Current assignment for a room; an unknown room reads as empty and is
    /// not created as a side effect.
    pub fn snapshot(&self, room_id: &str) -> ColorAssignment {
        self.rooms.get(room_id).cloned().unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
