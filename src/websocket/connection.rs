use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, WebSocketError};
use crate::session::{Color, ColorAssignment, SessionCoordinator};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join(String),
    #[serde(rename = "set-color")]
    SetColor {
        #[serde(rename = "roomId")]
        room_id: String,
        color: Color,
    },
    #[serde(rename = "move")]
    Move {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "move")]
        payload: serde_json::Value,
    },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: Uuid,
    },
    #[serde(rename = "color-assignment")]
    ColorAssignment(ColorAssignment),
    #[serde(rename = "opponent-move")]
    OpponentMove(serde_json::Value),
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

pub struct Connection {
    id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
    coordinator: Arc<SessionCoordinator>,
    last_heartbeat: Arc<RwLock<std::time::Instant>>,
}

impl Connection {
    pub fn new(tx: mpsc::UnboundedSender<Message>, coordinator: Arc<SessionCoordinator>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            coordinator,
            last_heartbeat: Arc::new(RwLock::new(std::time::Instant::now())),
        }
    }

    pub async fn handle_message(&mut self, msg: Message) -> Result<(), AppError> {
        match msg {
            Message::Text(text) => {
                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        // Malformed input drops the event, not the connection
                        warn!("Invalid message on connection {}: {}", self.id, e);
                        self.send_error(&format!("Invalid message format: {}", e))?;
                        return Ok(());
                    }
                };

                match client_msg {
                    ClientMessage::Join(room_id) => {
                        self.coordinator.join(self.id, &room_id).await;
                    }
                    ClientMessage::SetColor { room_id, color } => {
                        self.coordinator.set_color(self.id, &room_id, color).await;
                    }
                    ClientMessage::Move { room_id, payload } => {
                        self.coordinator.relay_move(self.id, &room_id, payload).await;
                    }
                    ClientMessage::Ping => {
                        self.send_message(ServerMessage::Pong)?;
                    }
                    ClientMessage::Pong => {
                        *self.last_heartbeat.write().await = std::time::Instant::now();
                    }
                }
            }
            Message::Close(_) => {
                info!("Client initiated close for connection {}", self.id);
                return Err(WebSocketError::ConnectionError(
                    "Connection closed by client".to_string(),
                )
                .into());
            }
            Message::Ping(data) => {
                self.tx
                    .send(Message::Pong(data))
                    .map_err(|e| WebSocketError::SendError(format!("Failed to send pong: {}", e)))?;
            }
            Message::Pong(_) => {
                *self.last_heartbeat.write().await = std::time::Instant::now();
            }
            _ => {
                warn!("Received unsupported message type on connection {}", self.id);
            }
        }
        Ok(())
    }

    fn send_message(&self, msg: ServerMessage) -> Result<(), AppError> {
        let text = serde_json::to_string(&msg)
            .map_err(|e| WebSocketError::InvalidFormat(format!("Failed to serialize message: {}", e)))?;

        self.tx
            .send(Message::Text(text))
            .map_err(|e| WebSocketError::SendError(format!("Failed to send message: {}", e)))?;

        Ok(())
    }

    fn send_error(&self, message: &str) -> Result<(), AppError> {
        self.send_message(ServerMessage::Error {
            message: message.to_string(),
        })
    }

    pub async fn start_heartbeat(&self) {
        let last_heartbeat = self.last_heartbeat.clone();
        let tx = self.tx.clone();
        let id = self.id;

        tokio::spawn(async move {
            loop {
                sleep(HEARTBEAT_INTERVAL).await;

                let elapsed = std::time::Instant::now()
                    .duration_since(*last_heartbeat.read().await);

                if elapsed > HEARTBEAT_TIMEOUT {
                    error!("Heartbeat timeout for connection {}", id);
                    let _ = tx.send(Message::Close(None));
                    break;
                }

                if let Err(e) = tx.send(Message::Ping(vec![])) {
                    error!("Failed to send heartbeat for connection {}: {}", id, e);
                    break;
                }
            }
        });
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}
