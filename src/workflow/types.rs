/// Core workflow type definitions
///
/// Mirrors the JSON shape the automation server uses for workflows, nodes and
/// connections. Fields this crate does not interpret are carried in `extra`
/// maps so a remote copy round-trips through the local snapshot unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A complete workflow definition containing nodes and their connections
///
/// The id is opaque and assigned by the remote server. Server-side bookkeeping
/// fields (`active`, `createdAt`, `tags`, ...) live in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Opaque workflow identifier (e.g., "42")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human-readable workflow name
    #[serde(default)]
    pub name: String,
    /// Ordered list of nodes in this workflow
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Connection map keyed by source node *name*
    #[serde(default)]
    pub connections: Connections,
    /// Workflow-level configuration bag (error workflow, retry policy, ...)
    #[serde(default = "empty_object")]
    pub settings: Value,
    /// Every other field the server sent, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single node in the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Globally unique node identifier within the workflow
    #[serde(default)]
    pub id: String,
    /// Unique display name, used as the connection endpoint key
    pub name: String,
    /// Node type (e.g., "n8n-nodes-base.manualTrigger")
    #[serde(rename = "type")]
    pub node_type: String,
    /// Canvas position as `[x, y]`
    #[serde(default)]
    pub position: [f64; 2],
    /// Node-specific parameters as opaque JSON
    #[serde(default = "empty_object")]
    pub parameters: Value,
    /// Version of the node type implementation
    #[serde(default = "default_type_version")]
    pub type_version: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Connection map: source node name -> output type -> output slots -> targets
///
/// A BTreeMap keeps the pretty-printed snapshot stable between writes.
pub type Connections = BTreeMap<String, BTreeMap<String, Vec<Vec<ConnectionTarget>>>>;

/// One edge endpoint in the connection map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    /// Target node *name*
    pub node: String,
    /// Output/input type, almost always "main"
    #[serde(rename = "type", default = "default_connection_type")]
    pub connection_type: String,
    /// Input slot on the target node
    #[serde(default)]
    pub index: u32,
}

/// Basic workflow metadata returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Result of a remote execution, kept opaque
pub type ExecutionResult = Value;

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn default_type_version() -> i64 {
    1
}

fn default_connection_type() -> String {
    "main".to_string()
}

impl Workflow {
    /// Whether the workflow is active on the server, if the server said so
    pub fn is_active(&self) -> Option<bool> {
        self.extra.get("active").and_then(Value::as_bool)
    }

    /// Look up a node by its display name
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Node names referenced in `connections` that match no node
    ///
    /// The engine propagates such workflows as-is; this is for callers that
    /// want to warn before the server rejects them.
    pub fn dangling_connections(&self) -> Vec<String> {
        let mut dangling = Vec::new();
        for (source, outputs) in &self.connections {
            if self.node_by_name(source).is_none() {
                dangling.push(source.clone());
            }
            for target in outputs.values().flatten().flatten() {
                if self.node_by_name(&target.node).is_none() && !dangling.contains(&target.node) {
                    dangling.push(target.node.clone());
                }
            }
        }
        dangling
    }

    /// The part of the workflow that the sync engine treats as content
    ///
    /// Server timestamps and version counters change on every save, so drift
    /// detection compares only nodes, connections, settings and name.
    pub fn content(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "nodes": self.nodes,
            "connections": self.connections,
            "settings": self.settings,
        })
    }

    /// Body accepted by the server's replace endpoint
    ///
    /// The server rejects read-only fields (`id`, `active`, timestamps) on
    /// write, so only the editable subset is sent.
    pub fn replace_body(&self) -> Value {
        let mut body = self.content();
        if let Some(static_data) = self.extra.get("staticData") {
            body["staticData"] = static_data.clone();
        }
        body
    }
}
