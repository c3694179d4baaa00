pub mod connection;
pub mod pool;
pub mod server;

pub use connection::{ClientMessage, Connection, ServerMessage};
pub use pool::ConnectionPool;
pub use server::RelayServer;
