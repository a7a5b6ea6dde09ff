/// Synchronization Layer
///
/// Keeps the remote copy, the local snapshot and live sessions of every
/// workflow in step:
/// - Change intents and their origins
/// - The origin tracker that suppresses echoes of our own writes
/// - The per-workflow serialized engine
/// - The filesystem watch bridge and the remote poller feeding it

pub mod engine;
pub mod error;
pub mod intent;
pub mod origin;
pub mod poller;
pub mod watcher;

pub use engine::{PropagationReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use intent::{ChangeIntent, Origin, SessionId};
pub use origin::{ChangeOriginTracker, TagState};
pub use poller::{PollSummary, RemotePoller};
pub use watcher::{WatchBridge, WatchHandle, WatchOutcome};
