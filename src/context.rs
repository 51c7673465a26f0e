//! Injectable tracker context
//!
//! One [`TrackerContext`] is built per process (one browsing session) and
//! shared by every component that needs identity, storage or the network. It
//! replaces ambient singletons: tests construct their own with in-memory
//! storage and a fake transport.

use crate::behavior::observer::BehaviorObserver;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::identity::IdentityStore;
use crate::protocol::{TrackBehaviorBatch, VisitorPayload};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::transport::{HttpTransport, Transport};
use crate::types::TrackingEvent;
use std::sync::Arc;

/// Shared state and services for one tracked session
pub struct TrackerContext {
    pub config: TrackerConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub identity: IdentityStore,
    pub observer: BehaviorObserver,
    pub transport: Arc<dyn Transport>,
}

impl TrackerContext {
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let identity = IdentityStore::new(store.clone());
        let observer = BehaviorObserver::new(store.clone(), config.return_visitor_flag_delay());
        Arc::new(Self {
            config,
            store,
            identity,
            observer,
            transport,
        })
    }

    /// Build the default stack for a configuration: file or memory storage
    /// and the HTTP transport
    pub fn from_config(config: TrackerConfig) -> Result<Arc<Self>, TrackerError> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> = match &config.storage_path {
            Some(path) => Arc::new(FileStore::open(path)),
            None => Arc::new(MemoryStore::new()),
        };
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::new(config, store, transport))
    }

    /// Scoring payload for `page` with the current identity, profile and behavior
    pub fn visitor_payload(&self, page: &str, time_on_page: u64) -> VisitorPayload {
        VisitorPayload::new(
            self.identity.identity(),
            self.identity.profile().as_ref(),
            page,
            time_on_page,
            self.observer.snapshot(),
        )
    }

    /// Tracking batch wrapping `events`
    pub fn behavior_batch(&self, events: Vec<TrackingEvent>) -> TrackBehaviorBatch {
        TrackBehaviorBatch::new(
            self.identity.identity(),
            self.identity.profile().as_ref(),
            events,
            self.observer.snapshot(),
        )
    }
}
