//! Core data types
//!
//! This module defines the values that flow through the tracking pipeline:
//! visitor identity, the behavior snapshot taken at send time, queued tracking
//! events, intent levels and the proactive message shown to the visitor.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest accepted duration for a single page view (one day)
pub const MAX_EVENT_DURATION_SEC: u64 = 86_400;

/// Longest accepted page path in a tracking event
pub const MAX_PAGE_PATH_LEN: usize = 2_048;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const MAX_COMPANY_LEN: usize = 100;
const MAX_LEAD_COMPANY_LEN: usize = 200;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

/// Durable visitor token plus the token of the current browsing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorIdentity {
    pub visitor_id: String,
    pub session_id: String,
}

/// Self-reported identification submitted by the visitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorProfile {
    pub name: String,
    pub email: String,
    pub company: String,
}

impl VisitorProfile {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        company: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            company: company.into(),
        }
    }

    /// Trim every field and check it against the identification form rules.
    ///
    /// Returns the trimmed profile on success.
    pub fn validated(&self) -> Result<Self, ProfileError> {
        let profile = Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            company: self.company.trim().to_string(),
        };
        check_person_fields(&profile.name, &profile.email, &profile.company, MAX_COMPANY_LEN)?;
        Ok(profile)
    }
}

/// Reasons a profile or lead form is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("Name is required")]
    MissingName,

    #[error("Name must be at most {} characters", MAX_NAME_LEN)]
    NameTooLong,

    #[error("Invalid email")]
    InvalidEmail,

    #[error("Email must be at most {} characters", MAX_EMAIL_LEN)]
    EmailTooLong,

    #[error("Company is required")]
    MissingCompany,

    #[error("Company must be at most {max} characters")]
    CompanyTooLong { max: usize },
}

fn check_person_fields(
    name: &str,
    email: &str,
    company: &str,
    max_company: usize,
) -> Result<(), ProfileError> {
    if name.is_empty() {
        return Err(ProfileError::MissingName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ProfileError::NameTooLong);
    }
    if !EMAIL_RE.is_match(email) {
        return Err(ProfileError::InvalidEmail);
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(ProfileError::EmailTooLong);
    }
    if company.is_empty() {
        return Err(ProfileError::MissingCompany);
    }
    if company.chars().count() > max_company {
        return Err(ProfileError::CompanyTooLong { max: max_company });
    }
    Ok(())
}

/// Point-in-time view of the visitor's session behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorSnapshot {
    /// Distinct paths visited this session, in first-visit order
    pub pages_visited: Vec<String>,
    /// Maximum scroll depth on the current page (0-100)
    pub scroll_depth: u8,
    /// Number of distinct pages visited this session
    pub session_page_count: u32,
    /// Whether the visitor has been seen in an earlier session
    pub is_return_visitor: bool,
    /// Referrer captured when the page was loaded
    pub referrer: String,
}

/// Tracking event types accepted by the batch endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingEventType {
    PageView,
}

/// A discrete observation queued for delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    #[serde(rename = "type")]
    pub event_type: TrackingEventType,
    /// Path of the viewed page
    pub page: String,
    /// ISO-8601 timestamp of when the view started
    pub timestamp: String,
    /// Seconds spent on the page (backfilled when the visitor leaves)
    #[serde(default)]
    pub duration_seconds: u64,
}

impl TrackingEvent {
    /// Create a page view event stamped with the given time
    pub fn page_view(page: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            event_type: TrackingEventType::PageView,
            page: page.into(),
            timestamp: at.to_rfc3339(),
            duration_seconds: 0,
        }
    }

    /// Validate the event against the batch schema
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.page.is_empty() {
            return Err(EventValidationError::EmptyPage);
        }
        if self.page.len() > MAX_PAGE_PATH_LEN {
            return Err(EventValidationError::PageTooLong(self.page.len()));
        }
        if DateTime::parse_from_rfc3339(&self.timestamp).is_err() {
            return Err(EventValidationError::InvalidTimestamp(
                self.timestamp.clone(),
            ));
        }
        if self.duration_seconds > MAX_EVENT_DURATION_SEC {
            return Err(EventValidationError::DurationOutOfRange(
                self.duration_seconds,
            ));
        }
        Ok(())
    }
}

/// Validation errors for tracking events
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventValidationError {
    #[error("Page path is empty")]
    EmptyPage,

    #[error("Page path is {0} bytes, limit is {}", MAX_PAGE_PATH_LEN)]
    PageTooLong(usize),

    #[error("Timestamp is not ISO-8601: {0}")]
    InvalidTimestamp(String),

    #[error("Duration {0}s exceeds {}s", MAX_EVENT_DURATION_SEC)]
    DurationOutOfRange(u64),
}

/// Coarse three-tier classification of conversion likelihood
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentLevel {
    Low,
    Medium,
    High,
}

impl IntentLevel {
    /// Lower bound (inclusive) of the medium bucket
    pub const MEDIUM_THRESHOLD: f64 = 40.0;
    /// Lower bound (inclusive) of the high bucket
    pub const HIGH_THRESHOLD: f64 = 70.0;

    /// Bucket a clamped score into a level
    pub fn from_score(score: IntentScore) -> Self {
        let value = score.value();
        if value >= Self::HIGH_THRESHOLD {
            IntentLevel::High
        } else if value >= Self::MEDIUM_THRESHOLD {
            IntentLevel::Medium
        } else {
            IntentLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentLevel::Low => "low",
            IntentLevel::Medium => "medium",
            IntentLevel::High => "high",
        }
    }
}

impl fmt::Display for IntentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(IntentLevel::Low),
            "medium" => Ok(IntentLevel::Medium),
            "high" => Ok(IntentLevel::High),
            other => Err(format!("unknown intent level: {other}")),
        }
    }
}

/// Numeric intent score, always within 0-100
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct IntentScore(f64);

impl IntentScore {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 100.0;

    /// Clamp a raw score into range. NaN maps to zero.
    pub fn new(raw: f64) -> Self {
        if raw.is_nan() {
            return Self(Self::MIN);
        }
        Self(raw.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Score rounded to a whole number, for display
    pub fn rounded(&self) -> u8 {
        self.0.round() as u8
    }

    pub fn level(&self) -> IntentLevel {
        IntentLevel::from_score(*self)
    }
}

impl From<f64> for IntentScore {
    fn from(raw: f64) -> Self {
        Self::new(raw)
    }
}

impl From<IntentScore> for f64 {
    fn from(score: IntentScore) -> Self {
        score.0
    }
}

/// Call to action attached to a proactive message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cta {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub url: String,
}

/// Unsolicited engagement prompt surfaced to the visitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProactiveMessage {
    pub id: String,
    pub content: String,
    pub intent_level: IntentLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub researched_insights: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<Cta>,
}

/// Kinds of gated content a lead form unlocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatedContentType {
    Whitepaper,
    Demo,
}

/// Lead details submitted to unlock gated content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadForm {
    pub name: String,
    pub email: String,
    pub company: String,
    pub content_type: GatedContentType,
}

impl LeadForm {
    /// Trim and validate the form, returning the cleaned copy
    pub fn validated(&self) -> Result<Self, ProfileError> {
        let lead = Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            company: self.company.trim().to_string(),
            content_type: self.content_type,
        };
        check_person_fields(&lead.name, &lead.email, &lead.company, MAX_LEAD_COMPANY_LEN)?;
        Ok(lead)
    }
}
