/// Workflow Management Layer
///
/// This module handles workflow definitions and their local copies:
/// - Type definitions (Workflow, Node, connection map)
/// - Pretty-printed JSON snapshot files, one per workflow id
/// - Lock-free registry of the content last propagated per workflow

// Core workflow type definitions
pub mod types;

// On-disk snapshot store (workflow_<id>.json)
pub mod storage;

// Last-synced registry using ArcSwap
pub mod registry;

// Re-export commonly used types
pub use registry::{SyncedRegistry, SyncedWorkflow};
pub use storage::{is_valid_workflow_id, SnapshotError, SnapshotStore};
pub use types::{ConnectionTarget, Connections, ExecutionResult, Node, Workflow, WorkflowSummary};
