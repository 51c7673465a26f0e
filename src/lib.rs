//! Intent Tracker - client-side visitor behavior telemetry and intent scoring
//!
//! The tracker observes an anonymous visitor's navigation and engagement,
//! estimates purchase intent locally with a weighted additive model, and shows
//! a proactive message that the remote scoring service can refine:
//! identity → behavior observation → local scoring → message lifecycle, with an
//! optional debounced queue of tracking events.
//!
//! ## Modules
//!
//! - **Identity**: durable visitor and session identifiers, visitor profile
//! - **Behavior**: observer, intent scoring model, learning insights
//! - **Delivery**: wire protocol, transport, event queue
//! - **Messaging**: proactive message lifecycle and the [`VisitorTracker`]

pub mod behavior;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod message;
pub mod protocol;
pub mod queue;
pub mod schedule;
pub mod storage;
pub mod tracker;
pub mod transport;
pub mod types;

pub use config::TrackerConfig;
pub use context::TrackerContext;
pub use error::TrackerError;
pub use tracker::{FormPrompt, VisitorTracker};

// Scoring exports
pub use behavior::{compute_intent_score, infer_intent_level, BehaviorObserver};

/// Tracker version, reported by the CLI
pub const TRACKER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "intent-tracker";
