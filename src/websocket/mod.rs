mod handler;
mod message;

pub use handler::ws_handler;
pub use message::{OutboundMessage, ServerMessage, CLOSE_POLICY_VIOLATION};
