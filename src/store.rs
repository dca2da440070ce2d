//! Durable key-value storage for the step ledger.
//!
//! Writes are staged with [`KeyValueStore::set`] and become durable only on
//! [`KeyValueStore::commit`]. A commit is all-or-nothing: readers only ever
//! see a fully committed prior state.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Storage errors.
#[derive(Debug)]
pub enum StoreError {
    Io(String),
    Serialize(String),
    Corrupt(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {e}"),
            StoreError::Serialize(e) => write!(f, "Serialize error: {e}"),
            StoreError::Corrupt(e) => write!(f, "Corrupt store: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Key-value store with atomic commits.
pub trait KeyValueStore: Send {
    /// Read the committed value for a key.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stage a value. Not visible to `get` until committed.
    fn set(&mut self, key: &str, value: Value);

    /// Stage the removal of a key.
    fn remove(&mut self, key: &str);

    /// Atomically make all staged changes durable.
    fn commit(&mut self) -> Result<(), StoreError>;
}

/// Store backed by a single JSON file, replaced atomically on commit.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    committed: Map<String, Value>,
    staged: Map<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let committed = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(StoreError::Corrupt("expected a JSON object".to_string())),
                Err(e) => return Err(StoreError::Corrupt(e.to_string())),
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            staged: committed.clone(),
            committed,
        })
    }

    /// Open the store, starting empty if the file is unreadable.
    ///
    /// The damaged file is left in place and overwritten by the next commit.
    pub fn open_or_empty(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::open(&path) {
            Ok(store) => store,
            Err(e) => {
                tracing::warn!("Could not read ledger store {:?}: {}", path, e);
                Self {
                    path,
                    committed: Map::new(),
                    staged: Map::new(),
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.committed.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.staged.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.staged.remove(key);
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        use std::io::Write;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }

        let json = serde_json::to_string_pretty(&self.staged)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        let tmp = self.temp_path();
        let mut file = std::fs::File::create(&tmp).map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;

        self.committed = self.staged.clone();
        Ok(())
    }
}

/// In-memory store. Commits can be made to fail to exercise error paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    committed: Map<String, Value>,
    staged: Map<String, Value>,
    fail_commits: bool,
    commit_count: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail (or succeed again).
    pub fn set_fail_commits(&mut self, fail: bool) {
        self.fail_commits = fail;
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commit_count
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.committed.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.staged.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.staged.remove(key);
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.fail_commits {
            return Err(StoreError::Io("simulated write failure".to_string()));
        }
        self.committed = self.staged.clone();
        self.commit_count += 1;
        Ok(())
    }
}
