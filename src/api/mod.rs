/// HTTP API Layer
///
/// This module provides the network-facing surfaces of the relay:
/// - REST endpoints mirroring the sync engine for operators and tools
/// - The WebSocket relay that live sessions connect to

// Workflow REST endpoints (GET/PUT/sync/pull/...)
pub mod workflows;

// WebSocket session relay
pub mod relay;

// Re-export router builders
pub use relay::create_relay_routes;
pub use workflows::{create_workflow_routes, AppState};
