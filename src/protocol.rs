//! Wire types for the remote scoring service
//!
//! Requests flatten the behavior snapshot into the body next to the identity,
//! the visitor profile (empty strings when anonymous), the page and the time
//! spent on it. Responses are parsed leniently: every field is optional and a
//! malformed optional field never invalidates the rest.

use crate::behavior::insights::insights_from_value;
use crate::types::{
    BehaviorSnapshot, Cta, IntentLevel, LeadForm, TrackingEvent, VisitorIdentity, VisitorProfile,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote service endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Per-page scoring and message generation
    ProcessVisitor,
    /// Batched tracking events
    TrackBehavior,
    /// Gated content lead capture
    CaptureLead,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ProcessVisitor => "/api/process-visitor",
            Endpoint::TrackBehavior => "/api/track-behavior",
            Endpoint::CaptureLead => "/api/capture-lead",
        }
    }
}

/// Body of a scoring request (and of the page-exit beacon)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorPayload {
    pub visitor_id: String,
    pub session_id: String,
    pub name: String,
    pub email: String,
    pub company: String,
    pub page: String,
    /// Whole seconds spent on `page`
    pub time_on_page: u64,
    #[serde(flatten)]
    pub behavior: BehaviorSnapshot,
}

impl VisitorPayload {
    pub fn new(
        identity: VisitorIdentity,
        profile: Option<&VisitorProfile>,
        page: impl Into<String>,
        time_on_page: u64,
        behavior: BehaviorSnapshot,
    ) -> Self {
        let (name, email, company) = profile_fields(profile);
        Self {
            visitor_id: identity.visitor_id,
            session_id: identity.session_id,
            name,
            email,
            company,
            page: page.into(),
            time_on_page,
            behavior,
        }
    }
}

/// Body of a batched tracking request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackBehaviorBatch {
    pub visitor_id: String,
    pub session_id: String,
    pub name: String,
    pub email: String,
    pub company: String,
    pub events: Vec<TrackingEvent>,
    #[serde(flatten)]
    pub behavior: BehaviorSnapshot,
}

impl TrackBehaviorBatch {
    pub fn new(
        identity: VisitorIdentity,
        profile: Option<&VisitorProfile>,
        events: Vec<TrackingEvent>,
        behavior: BehaviorSnapshot,
    ) -> Self {
        let (name, email, company) = profile_fields(profile);
        Self {
            visitor_id: identity.visitor_id,
            session_id: identity.session_id,
            name,
            email,
            company,
            events,
            behavior,
        }
    }
}

/// Body of a lead capture request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadCaptureRequest {
    #[serde(flatten)]
    pub lead: LeadForm,
    pub behavioral_context: BehaviorSnapshot,
}

fn profile_fields(profile: Option<&VisitorProfile>) -> (String, String, String) {
    match profile {
        Some(p) => (p.name.clone(), p.email.clone(), p.company.clone()),
        None => (String::new(), String::new(), String::new()),
    }
}

/// Response of the scoring service
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScoringResponse {
    #[serde(default)]
    pub message: Option<String>,
    /// Raw declared level; see [`ScoringResponse::declared_level`]
    #[serde(default)]
    pub intent_level: Option<Value>,
    #[serde(default)]
    pub intent_score: Option<Value>,
    #[serde(default)]
    pub cta: Option<Value>,
    /// Opaque key -> object/string statistics
    #[serde(default)]
    pub learning_stats: Option<Value>,
    #[serde(default)]
    pub visitor: Option<Value>,
}

impl ScoringResponse {
    /// Message content, if present and non-blank
    pub fn message_text(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// Declared intent level; unknown values are ignored
    pub fn declared_level(&self) -> Option<IntentLevel> {
        self.intent_level
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Declared numeric score, if any
    pub fn declared_score(&self) -> Option<f64> {
        self.intent_score.as_ref().and_then(Value::as_f64)
    }

    /// Declared call to action, if it parses
    pub fn declared_cta(&self) -> Option<Cta> {
        self.cta
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Insight lines derived from the learning statistics
    pub fn insights(&self) -> Option<Vec<String>> {
        let insights = insights_from_value(self.learning_stats.as_ref()?);
        (!insights.is_empty()).then_some(insights)
    }
}
