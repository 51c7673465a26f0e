//! Visitor identity store
//!
//! Derives a durable visitor identifier and a session-scoped identifier, and
//! persists the optional self-reported visitor profile. When storage is
//! unavailable the store fails soft: identifiers live in memory for the
//! lifetime of this store and no error reaches the caller.

use crate::error::TrackerError;
use crate::storage::{
    read_json, KeyValueStore, StorageScope, SESSION_ID_KEY, VISITOR_ID_KEY, VISITOR_PROFILE_KEY,
};
use crate::types::{VisitorIdentity, VisitorProfile};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

const VISITOR_PREFIX: &str = "v";
const SESSION_PREFIX: &str = "s";

/// Generate a collision-resistant token with a time-ordered prefix.
///
/// UUIDv7 carries a millisecond timestamp followed by random bits.
pub fn generate_token(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7().simple())
}

#[derive(Debug, Default)]
struct EphemeralIds {
    visitor_id: Option<String>,
    session_id: Option<String>,
}

/// Owner of the visitor's identifiers and stored profile
pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
    ephemeral: Mutex<EphemeralIds>,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            ephemeral: Mutex::new(EphemeralIds::default()),
        }
    }

    /// Durable visitor identifier, created on first read
    pub fn visitor_id(&self) -> String {
        self.get_or_create(StorageScope::Durable, VISITOR_ID_KEY, VISITOR_PREFIX)
    }

    /// Session identifier, created on first read in each session
    pub fn session_id(&self) -> String {
        self.get_or_create(StorageScope::Session, SESSION_ID_KEY, SESSION_PREFIX)
    }

    pub fn identity(&self) -> VisitorIdentity {
        VisitorIdentity {
            visitor_id: self.visitor_id(),
            session_id: self.session_id(),
        }
    }

    fn get_or_create(&self, scope: StorageScope, key: &str, prefix: &str) -> String {
        match self.store.get(scope, key) {
            Ok(Some(id)) if !id.trim().is_empty() => return id,
            Ok(_) => {}
            Err(e) => {
                warn!(key, error = %e, "storage unavailable, using in-memory identifier");
                return self.with_slot(scope, |slot| {
                    slot.get_or_insert_with(|| generate_token(prefix)).clone()
                });
            }
        }

        // An id held in memory is one whose write failed; retry it so reads stay stable
        let id = self
            .with_slot(scope, |slot| slot.clone())
            .unwrap_or_else(|| generate_token(prefix));
        match self.store.set(scope, key, &id) {
            Ok(()) => self.with_slot(scope, |slot| *slot = None),
            Err(e) => {
                warn!(key, error = %e, "failed to persist identifier");
                self.with_slot(scope, |slot| *slot = Some(id.clone()));
            }
        }
        id
    }

    fn with_slot<R>(&self, scope: StorageScope, f: impl FnOnce(&mut Option<String>) -> R) -> R {
        let mut guard = match self.ephemeral.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = match scope {
            StorageScope::Durable => &mut guard.visitor_id,
            StorageScope::Session => &mut guard.session_id,
        };
        f(slot)
    }

    /// Stored visitor profile, if the visitor has identified.
    ///
    /// Malformed or unreadable data reads as anonymous.
    pub fn profile(&self) -> Option<VisitorProfile> {
        match read_json(self.store.as_ref(), StorageScope::Durable, VISITOR_PROFILE_KEY) {
            Ok(profile) => profile,
            Err(e) => {
                debug!(error = %e, "could not read visitor profile");
                None
            }
        }
    }

    /// Validate and persist a profile, returning the stored (trimmed) copy
    pub fn save_profile(&self, profile: &VisitorProfile) -> Result<VisitorProfile, TrackerError> {
        let profile = profile
            .validated()
            .map_err(|e| TrackerError::InvalidProfile(e.to_string()))?;
        let json = serde_json::to_string(&profile)?;
        self.store
            .set(StorageScope::Durable, VISITOR_PROFILE_KEY, &json)?;
        Ok(profile)
    }

    /// Forget the stored profile; the visitor is tracked anonymously again
    pub fn clear_profile(&self) -> Result<(), TrackerError> {
        self.store.remove(StorageScope::Durable, VISITOR_PROFILE_KEY)
    }
}
