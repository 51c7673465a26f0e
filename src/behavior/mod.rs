//! Behavioral signal module
//!
//! This module follows what the visitor does on the site (pages, scroll
//! depth, referrer, return visits) and turns it into an intent estimate.
//!
//! Pipeline: Observer → BehaviorSnapshot → Scoring → IntentLevel

pub mod insights;
pub mod observer;
pub mod scoring;

pub use insights::{insights_from_value, learning_insights};
pub use observer::{scroll_depth_percent, BehaviorObserver, ScrollMetrics};
pub use scoring::{
    compute_intent_score, infer_intent_level, reconcile_level, score_breakdown, ScoreBreakdown,
};
