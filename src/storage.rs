//! Client-side key/value persistence
//!
//! The tracker only needs get/set/remove primitives over two scopes: a durable
//! scope that survives across sessions and a session scope that lives for one
//! browsing episode. Hosts plug in whatever backs those scopes.

use crate::error::TrackerError;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Durable key holding the visitor identifier
pub const VISITOR_ID_KEY: &str = "intentiq_visitor_id";
/// Durable key flagging that the visitor has been seen before
pub const RETURN_VISITOR_KEY: &str = "intentiq_visited_before";
/// Durable key holding the stored visitor profile (JSON)
pub const VISITOR_PROFILE_KEY: &str = "intentiq_visitor_info";
/// Session key holding the session identifier
pub const SESSION_ID_KEY: &str = "intentiq_session_id";
/// Session key holding the pages visited this session (JSON array)
pub const SESSION_PAGES_KEY: &str = "intentiq_session_pages";

/// Lifetime of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Persisted indefinitely
    Durable,
    /// Cleared when the browsing session ends
    Session,
}

/// Get/set primitives over the client's storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, TrackerError>;

    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), TrackerError>;

    fn remove(&self, scope: StorageScope, key: &str) -> Result<(), TrackerError>;
}

/// Read a JSON value, treating malformed or missing data as absent
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    scope: StorageScope,
    key: &str,
) -> Result<Option<T>, TrackerError> {
    let Some(raw) = store.get(scope, key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            debug!(key, error = %e, "discarding malformed stored value");
            Ok(None)
        }
    }
}

fn poisoned(scope: StorageScope) -> TrackerError {
    TrackerError::StorageUnavailable(format!("{scope:?} storage lock poisoned"))
}

/// Both scopes held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    durable: RwLock<HashMap<String, String>>,
    session: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the session scope, as when the browser session ends
    pub fn end_session(&self) {
        if let Ok(mut guard) = self.session.write() {
            guard.clear();
        }
    }

    fn scope(&self, scope: StorageScope) -> &RwLock<HashMap<String, String>> {
        match scope {
            StorageScope::Durable => &self.durable,
            StorageScope::Session => &self.session,
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, TrackerError> {
        let guard = self.scope(scope).read().map_err(|_| poisoned(scope))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), TrackerError> {
        let mut guard = self.scope(scope).write().map_err(|_| poisoned(scope))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, scope: StorageScope, key: &str) -> Result<(), TrackerError> {
        let mut guard = self.scope(scope).write().map_err(|_| poisoned(scope))?;
        guard.remove(key);
        Ok(())
    }
}

/// Durable scope backed by a JSON file, session scope in memory.
///
/// One process is treated as one browsing session.
pub struct FileStore {
    path: PathBuf,
    durable: RwLock<BTreeMap<String, String>>,
    session: MemoryStore,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable or malformed file starts the store empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let durable = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                debug!(path = %path.display(), error = %e, "ignoring malformed store file");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            durable: RwLock::new(durable),
            session: MemoryStore::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> Result<(), TrackerError> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized).map_err(|e| {
            TrackerError::StorageUnavailable(format!(
                "failed to write {}: {e}",
                self.path.display()
            ))
        })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, TrackerError> {
        match scope {
            StorageScope::Session => self.session.get(scope, key),
            StorageScope::Durable => {
                let guard = self.durable.read().map_err(|_| poisoned(scope))?;
                Ok(guard.get(key).cloned())
            }
        }
    }

    fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), TrackerError> {
        match scope {
            StorageScope::Session => self.session.set(scope, key, value),
            StorageScope::Durable => {
                let mut guard = self.durable.write().map_err(|_| poisoned(scope))?;
                guard.insert(key.to_string(), value.to_string());
                self.persist(&guard)
            }
        }
    }

    fn remove(&self, scope: StorageScope, key: &str) -> Result<(), TrackerError> {
        match scope {
            StorageScope::Session => self.session.remove(scope, key),
            StorageScope::Durable => {
                let mut guard = self.durable.write().map_err(|_| poisoned(scope))?;
                if guard.remove(key).is_some() {
                    self.persist(&guard)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_scopes_are_separate() {
        let store = MemoryStore::new();
        store.set(StorageScope::Durable, "k", "durable").unwrap();
        store.set(StorageScope::Session, "k", "session").unwrap();

        assert_eq!(
            store.get(StorageScope::Durable, "k").unwrap().as_deref(),
            Some("durable")
        );
        assert_eq!(
            store.get(StorageScope::Session, "k").unwrap().as_deref(),
            Some("session")
        );

        store.end_session();
        assert_eq!(store.get(StorageScope::Session, "k").unwrap(), None);
        assert!(store.get(StorageScope::Durable, "k").unwrap().is_some());
    }

    #[test]
    fn test_memory_store_remove() {
        let store = MemoryStore::new();
        store.set(StorageScope::Durable, "k", "v").unwrap();
        store.remove(StorageScope::Durable, "k").unwrap();
        assert_eq!(store.get(StorageScope::Durable, "k").unwrap(), None);
    }

    #[test]
    fn test_read_json_treats_malformed_as_absent() {
        let store = MemoryStore::new();
        store
            .set(StorageScope::Session, SESSION_PAGES_KEY, "[\"/\", ")
            .unwrap();

        let pages: Option<Vec<String>> =
            read_json(&store, StorageScope::Session, SESSION_PAGES_KEY).unwrap();
        assert_eq!(pages, None);

        store
            .set(StorageScope::Session, SESSION_PAGES_KEY, "[\"/\",\"/docs\"]")
            .unwrap();
        let pages: Option<Vec<String>> =
            read_json(&store, StorageScope::Session, SESSION_PAGES_KEY).unwrap();
        assert_eq!(pages, Some(vec!["/".to_string(), "/docs".to_string()]));
    }

    #[test]
    fn test_file_store_persists_durable_scope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");

        {
            let store = FileStore::open(&path);
            store.set(StorageScope::Durable, VISITOR_ID_KEY, "v_1").unwrap();
            store.set(StorageScope::Session, SESSION_ID_KEY, "s_1").unwrap();
        }

        let reopened = FileStore::open(&path);
        assert_eq!(
            reopened
                .get(StorageScope::Durable, VISITOR_ID_KEY)
                .unwrap()
                .as_deref(),
            Some("v_1")
        );
        // A new process is a new session
        assert_eq!(reopened.get(StorageScope::Session, SESSION_ID_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_ignores_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        fs::write(&path, "not json").unwrap();

        let store = FileStore::open(&path);
        assert_eq!(store.get(StorageScope::Durable, VISITOR_ID_KEY).unwrap(), None);

        store.set(StorageScope::Durable, VISITOR_ID_KEY, "v_2").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.contains("v_2"));
    }

    #[test]
    fn test_file_store_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A directory path cannot be written as a file
        let store = FileStore::open(dir.path());
        let result = store.set(StorageScope::Durable, VISITOR_ID_KEY, "v_3");
        assert!(matches!(result, Err(TrackerError::StorageUnavailable(_))));
    }
}
