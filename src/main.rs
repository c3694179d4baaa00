use chess_relay_server::websocket::RelayServer;
use chess_relay_server::{AppState, Settings};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> chess_relay_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    let state = AppState::new(config);
    let addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    );

    let listener = TcpListener::bind(&addr).await?;
    info!("Relay server listening on ws://{}", addr);

    let server = Arc::new(RelayServer::new(state.coordinator.clone()));

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let server = server.clone();
                tokio::spawn(async move {
                    server.handle_connection(stream, peer).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
