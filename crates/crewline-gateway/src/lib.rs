pub mod broadcast;
pub mod connection;
pub mod registry;

pub use broadcast::Broadcaster;
pub use connection::handle_connection;
pub use registry::{ConnectionHandle, ConnectionRegistry, OUTBOUND_QUEUE_CAPACITY};
