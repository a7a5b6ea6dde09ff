/// Live session layer
///
/// Sessions are connected viewers/editors. This module provides:
/// - The broadcast hub (who is connected, who watches which workflow)
/// - The JSON relay protocol spoken over the WebSocket

pub mod hub;
pub mod messages;

pub use hub::{SessionHandle, SessionHub, SessionInfo};
pub use messages::{ClientMessage, ServerMessage};
