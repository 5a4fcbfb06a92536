use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;

use crate::models::GroupCollection;

/// Filename of the serialized group collection under the snapshot directory.
pub const SNAPSHOT_FILE: &str = "groups_v1.json";

/// Abstraction over where the serialized group collection lives.
///
/// `Memory` keeps the blob in-process (tests, ephemeral demos); `Local` writes
/// a JSON document to disk. Both store the full collection on every save —
/// there is no incremental persistence.
#[derive(Clone)]
pub enum SnapshotStore {
    Memory {
        blob: Arc<Mutex<Option<String>>>,
    },
    Local {
        path: PathBuf,
    },
}

impl SnapshotStore {
    pub fn memory() -> Self {
        SnapshotStore::Memory {
            blob: Arc::new(Mutex::new(None)),
        }
    }

    /// Snapshot file [`SNAPSHOT_FILE`] under `dir`. The directory is created
    /// on first save.
    pub fn local(dir: impl AsRef<Path>) -> Self {
        SnapshotStore::Local {
            path: dir.as_ref().join(SNAPSHOT_FILE),
        }
    }

    pub fn save(&self, collection: &GroupCollection) -> anyhow::Result<()> {
        let json = serde_json::to_string(collection).context("serialize group snapshot")?;
        let bytes = json.len();
        match self {
            SnapshotStore::Memory { blob } => {
                *blob.lock().expect("snapshot blob lock poisoned") = Some(json);
            }
            SnapshotStore::Local { path } => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create snapshot directory {}", parent.display()))?;
                }
                // Write to a sibling temp file first so a crash mid-write
                // never truncates the previous snapshot.
                let tmp = path.with_extension("json.tmp");
                fs::write(&tmp, &json)
                    .with_context(|| format!("write snapshot {}", tmp.display()))?;
                fs::rename(&tmp, path)
                    .with_context(|| format!("replace snapshot {}", path.display()))?;
            }
        }
        tracing::debug!(bytes, "group snapshot saved");
        Ok(())
    }

    /// Load the last saved collection.
    ///
    /// A missing, unreadable, or corrupt snapshot is not fatal: it logs a
    /// warning and falls back to the empty collection rather than refusing
    /// to start.
    pub fn load(&self) -> GroupCollection {
        let raw = match self {
            SnapshotStore::Memory { blob } => blob.lock().expect("snapshot blob lock poisoned").clone(),
            SnapshotStore::Local { path } => match fs::read_to_string(path) {
                Ok(json) => Some(json),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "failed to read group snapshot, starting empty");
                    None
                }
            },
        };

        match raw {
            Some(json) => match serde_json::from_str(&json) {
                Ok(collection) => collection,
                Err(err) => {
                    tracing::warn!(%err, "corrupt group snapshot, starting empty");
                    GroupCollection::default()
                }
            },
            None => GroupCollection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Appearance, Group, Visibility};
    use chrono::Utc;
    use uuid::Uuid;

    fn one_group_collection() -> GroupCollection {
        let now = Utc::now();
        GroupCollection {
            groups: vec![Group {
                id: Uuid::new_v4(),
                name: "Crypto CTF Circle".into(),
                description: "Weekly crypto CTF practice and writeups.".into(),
                topic: "CTF".into(),
                visibility: Visibility::Public,
                invite_code: None,
                creator_id: "0xRaven".into(),
                members: vec!["0xRaven".into()],
                admins: vec!["0xRaven".into()],
                messages: Vec::new(),
                posts: Vec::new(),
                appearance: Appearance::default(),
                created_at: now,
                last_activity: now,
            }],
        }
    }

    #[test]
    fn memory_roundtrip() {
        let store = SnapshotStore::memory();
        let collection = one_group_collection();
        store.save(&collection).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.groups.len(), 1);
        assert_eq!(loaded.groups[0].id, collection.groups[0].id);
        assert_eq!(loaded.groups[0].name, "Crypto CTF Circle");
    }

    #[test]
    fn local_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::local(dir.path());
        let collection = one_group_collection();
        store.save(&collection).unwrap();

        let loaded = SnapshotStore::local(dir.path()).load();
        assert_eq!(loaded.groups.len(), 1);
        assert_eq!(loaded.groups[0].creator_id, "0xRaven");
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = SnapshotStore::local(dir.path()).load();
        assert!(loaded.groups.is_empty());
    }

    #[test]
    fn corrupt_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), "{not json").unwrap();

        let loaded = SnapshotStore::local(dir.path()).load();
        assert!(loaded.groups.is_empty());
    }
}
