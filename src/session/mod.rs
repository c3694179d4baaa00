pub mod coordinator;
pub mod registry;

pub use coordinator::SessionCoordinator;
pub use registry::{Color, ColorAssignment, SessionPolicy, SessionRegistry};
