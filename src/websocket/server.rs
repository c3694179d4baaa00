use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::session::SessionCoordinator;
use crate::websocket::Connection;

pub struct RelayServer {
    coordinator: Arc<SessionCoordinator>,
}

impl RelayServer {
    pub fn new(coordinator: Arc<SessionCoordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn handle_connection(
        self: Arc<Self>,
        raw_stream: tokio::net::TcpStream,
        addr: std::net::SocketAddr,
    ) {
        info!("New WebSocket connection from: {}", addr);

        let ws_stream = match tokio_tungstenite::accept_async(raw_stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Error during WebSocket handshake: {}", e);
                return;
            }
        };

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connection = Connection::new(tx.clone(), self.coordinator.clone());
        let connection_id = connection.id();

        // Start connection heartbeat
        connection.start_heartbeat().await;

        // Register with the coordinator; this also pushes the connected event
        self.coordinator.connect(connection_id, tx).await;

        let coordinator = self.coordinator.clone();

        // Forward messages from rx to WebSocket
        let send_task = tokio::spawn(async move {
            let mut ws_sink = ws_sink;
            let mut rx = rx;

            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_sink.send(message).await {
                    error!("Error sending WebSocket message: {}", e);
                    break;
                }
            }

            if let Err(e) = ws_sink.close().await {
                error!("Error closing WebSocket connection: {}", e);
            }
        });

        // Handle incoming WebSocket messages
        let receive_task = tokio::spawn(async move {
            let mut ws_stream = ws_stream;

            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(msg) => {
                        if let Err(e) = connection.handle_message(msg).await {
                            info!("Closing connection {}: {}", connection_id, e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving WebSocket message: {}", e);
                        break;
                    }
                }
            }
        });

        // Wait for either task to complete
        tokio::select! {
            _ = send_task => {
                info!("Send task completed for connection {}", connection_id);
            }
            _ = receive_task => {
                info!("Receive task completed for connection {}", connection_id);
            }
        }

        // Release any color slots and notify the rooms this connection played in
        coordinator.disconnect(connection_id).await;
        info!("Connection {} closed", connection_id);
    }

    pub fn coordinator(&self) -> Arc<SessionCoordinator> {
        self.coordinator.clone()
    }
}
