/// flowsync: keeps remote automation workflows in sync with local files and
/// live editor sessions
///
/// A single engine decides, for every change coming from the remote server,
/// the local snapshot directory or a connected session, where the change
/// must be written next, and suppresses the echoes of its own writes.

// Core configuration and setup
pub mod config;

// Workflow definitions, local snapshots and the last-synced registry
pub mod workflow;

// Remote automation server adapter
pub mod remote;

// Live sessions - broadcast hub and relay protocol
pub mod session;

// Synchronization engine, origin tracking, watcher and poller
pub mod sync;

// HTTP API layer - REST mirror and WebSocket relay
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use remote::{HttpRemoteStore, RemoteError, RemoteStore};
pub use server::start_server;
pub use session::SessionHub;
pub use sync::{ChangeIntent, Origin, SyncEngine, SyncError};
pub use workflow::{SnapshotStore, Workflow};
