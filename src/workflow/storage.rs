/// Local snapshot store
///
/// Owns the on-disk JSON file for each workflow id. One pretty-printed file
/// per workflow, named `workflow_<id>.json`, all inside a single directory.
/// Pure read/write: deciding *when* to write belongs to the sync engine.

use crate::workflow::types::Workflow;
use std::io;
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "workflow_";
const FILE_SUFFIX: &str = ".json";

/// Errors raised while reading or writing a snapshot file
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("snapshot {path} is not a valid workflow: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode workflow for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SnapshotError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SnapshotError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Whether `workflow_id` can name a snapshot file inside the store
///
/// Ids end up verbatim in file names, so only ASCII letters, digits, `-` and
/// `_` are accepted. Anything else (path separators, dots) is refused at the
/// API boundary.
pub fn is_valid_workflow_id(workflow_id: &str) -> bool {
    !workflow_id.is_empty()
        && workflow_id.len() <= 128
        && workflow_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// File-based snapshot store rooted at one directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding every snapshot
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the snapshot directory if it does not exist yet
    pub async fn ensure_dir(&self) -> Result<(), SnapshotError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SnapshotError::Io {
                path: self.dir.clone(),
                source,
            })
    }

    /// Deterministic snapshot path for a workflow id
    pub fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", FILE_PREFIX, workflow_id, FILE_SUFFIX))
    }

    /// Reverse of [`SnapshotStore::path_for`]: the workflow id a path maps to
    ///
    /// Returns `None` for files that are not workflow snapshots (editor swap
    /// files, hidden files, other extensions).
    pub fn workflow_id_for(path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        let id = file_name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?;
        if is_valid_workflow_id(id) {
            Some(id.to_string())
        } else {
            None
        }
    }

    /// Read and parse the snapshot for a workflow
    pub async fn read(&self, workflow_id: &str) -> Result<Workflow, SnapshotError> {
        self.read_path(&self.path_for(workflow_id)).await
    }

    /// Read and parse an arbitrary snapshot file
    pub async fn read_path(&self, path: &Path) -> Result<Workflow, SnapshotError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the snapshot for a workflow, pretty-printed
    ///
    /// Returns the path that was written.
    pub async fn write(&self, workflow_id: &str, workflow: &Workflow) -> Result<PathBuf, SnapshotError> {
        let path = self.path_for(workflow_id);
        let encoded = serde_json::to_string_pretty(workflow).map_err(|source| SnapshotError::Encode {
            path: path.clone(),
            source,
        })?;

        self.ensure_dir().await?;
        tokio::fs::write(&path, encoded)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!("💾 Wrote snapshot for workflow {}: {}", workflow_id, path.display());
        Ok(path)
    }

    /// Ids of every snapshot currently on disk
    pub async fn list_ids(&self) -> Result<Vec<String>, SnapshotError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(ids),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        while let Some(entry) = entries.next_entry().await.map_err(|source| SnapshotError::Io {
            path: self.dir.clone(),
            source,
        })? {
            if let Some(id) = Self::workflow_id_for(&entry.path()) {
                ids.push(id);
            }
        }

        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow() -> Workflow {
        serde_json::from_value(json!({
            "id": "42",
            "name": "Demo",
            "nodes": [{
                "id": "a1",
                "name": "A",
                "type": "n8n-nodes-base.manualTrigger",
                "position": [250, 300],
                "parameters": {},
                "typeVersion": 1
            }],
            "connections": {}
        }))
        .unwrap()
    }

    #[test]
    fn maps_ids_to_paths_and_back() {
        let store = SnapshotStore::new("/tmp/snapshots");
        let path = store.path_for("42");
        assert_eq!(path, PathBuf::from("/tmp/snapshots/workflow_42.json"));
        assert_eq!(SnapshotStore::workflow_id_for(&path).as_deref(), Some("42"));

        assert_eq!(SnapshotStore::workflow_id_for(Path::new("workflow_.json")), None);
        assert_eq!(SnapshotStore::workflow_id_for(Path::new("notes.json")), None);
        assert_eq!(SnapshotStore::workflow_id_for(Path::new("workflow_42.json.swp")), None);
    }

    #[test]
    fn only_plain_ids_name_snapshots() {
        for id in ["42", "GfzD3sG2xk1-ab_c"] {
            assert!(is_valid_workflow_id(id), "{} should be accepted", id);
        }
        for id in ["", "a/b", "..", "../etc", "a\\b", "a.b", "with space"] {
            assert!(!is_valid_workflow_id(id), "{:?} should be rejected", id);
        }
        assert!(!is_valid_workflow_id(&"x".repeat(129)));
        assert_eq!(SnapshotStore::workflow_id_for(Path::new("workflow_a.b.json")), None);
    }

    #[tokio::test]
    async fn writes_pretty_json_and_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested"));

        let path = store.write("42", &workflow()).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  \"name\": \"Demo\""));

        let loaded = store.read("42").await.unwrap();
        assert_eq!(loaded, workflow());
        assert_eq!(store.list_ids().await.unwrap(), vec!["42".to_string()]);
    }

    #[tokio::test]
    async fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(store.path_for("7"), "{ not json").unwrap();

        let err = store.read("7").await.unwrap_err();
        assert!(matches!(err, SnapshotError::Parse { .. }));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());

        let err = store.read("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.list_ids().await.unwrap().is_empty());
    }
}
