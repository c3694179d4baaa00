pub mod config;
pub mod error;
pub mod session;
pub mod websocket;

use std::sync::Arc;

use session::{SessionCoordinator, SessionPolicy};

pub use crate::config::Settings;
pub use crate::error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub coordinator: Arc<SessionCoordinator>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let policy = SessionPolicy {
            allow_self_assignment: config.session.allow_self_assignment,
        };

        Self {
            config: Arc::new(config),
            coordinator: Arc::new(SessionCoordinator::new(policy)),
        }
    }
}
