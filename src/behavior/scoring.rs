//! Intent scoring model
//!
//! Converts a behavior snapshot into a 0-100 intent score and a three-tier
//! intent level using an additive weighted model. The model is pure: the same
//! snapshot and time on page always produce the same score.
//!
//! ```text
//! score = 40   * pricing_page_views
//!       + 25   * docs_page_views
//!       + 2    * time_on_page_sec
//!       + 0.15 * scroll_depth_pct
//!       + 10   if return visitor
//!       + 10   if referred by a search or social site
//!       + 10   if >= 4 pages visited, 5 if exactly 3
//! ```
//!
//! The total is clamped to 0-100 and bucketed: `>= 70` high, `>= 40` medium,
//! otherwise low.

use crate::types::{BehaviorSnapshot, IntentLevel, IntentScore};
use serde::Serialize;

/// Points per pricing page view
pub const PRICING_PAGE_WEIGHT: f64 = 40.0;
/// Points per docs page view
pub const DOCS_PAGE_WEIGHT: f64 = 25.0;
/// Points per second on the current page
pub const TIME_ON_PAGE_WEIGHT: f64 = 2.0;
/// Points per percent of scroll depth
pub const SCROLL_DEPTH_WEIGHT: f64 = 0.15;
/// Flat bonus for a return visitor
pub const RETURN_VISITOR_BONUS: f64 = 10.0;
/// Flat bonus for a search or social referrer
pub const REFERRER_BONUS: f64 = 10.0;
/// Bonus for visiting four or more distinct pages
pub const MULTI_PAGE_BONUS: f64 = 10.0;
/// Bonus for visiting exactly three distinct pages
pub const THREE_PAGE_BONUS: f64 = 5.0;

/// Search engines matched by any host label (`www.google.co.uk`)
const SEARCH_ENGINE_LABELS: &[&str] = &["google", "bing", "duckduckgo", "yahoo", "baidu", "yandex"];

/// Social sites matched by domain suffix
const SOCIAL_DOMAINS: &[&str] = &[
    "linkedin.com",
    "lnkd.in",
    "twitter.com",
    "x.com",
    "t.co",
    "facebook.com",
    "reddit.com",
    "news.ycombinator.com",
];

/// Per-signal contributions to an intent score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub pricing_page_views: u32,
    pub docs_page_views: u32,
    pub pricing_points: f64,
    pub docs_points: f64,
    pub time_on_page_points: f64,
    pub scroll_depth_points: f64,
    pub return_visitor_points: f64,
    pub referrer_points: f64,
    pub multi_page_points: f64,
    /// Sum of all contributions before clamping
    pub raw_total: f64,
    pub score: IntentScore,
    pub level: IntentLevel,
}

/// Score a snapshot, returning every contribution
pub fn score_breakdown(snapshot: &BehaviorSnapshot, time_on_page_sec: u64) -> ScoreBreakdown {
    let pricing_page_views = count_section_views(&snapshot.pages_visited, "pricing");
    let docs_page_views = count_section_views(&snapshot.pages_visited, "docs");

    let pricing_points = pricing_page_views as f64 * PRICING_PAGE_WEIGHT;
    let docs_points = docs_page_views as f64 * DOCS_PAGE_WEIGHT;
    let time_on_page_points = time_on_page_sec as f64 * TIME_ON_PAGE_WEIGHT;
    let scroll_depth_points = snapshot.scroll_depth.min(100) as f64 * SCROLL_DEPTH_WEIGHT;
    let return_visitor_points = if snapshot.is_return_visitor {
        RETURN_VISITOR_BONUS
    } else {
        0.0
    };
    let referrer_points = if is_high_intent_referrer(&snapshot.referrer) {
        REFERRER_BONUS
    } else {
        0.0
    };
    let multi_page_points = multi_page_bonus(distinct_pages(&snapshot.pages_visited));

    let raw_total = pricing_points
        + docs_points
        + time_on_page_points
        + scroll_depth_points
        + return_visitor_points
        + referrer_points
        + multi_page_points;
    let score = IntentScore::new(raw_total);

    ScoreBreakdown {
        pricing_page_views,
        docs_page_views,
        pricing_points,
        docs_points,
        time_on_page_points,
        scroll_depth_points,
        return_visitor_points,
        referrer_points,
        multi_page_points,
        raw_total,
        score,
        level: score.level(),
    }
}

/// Clamped intent score for a snapshot
pub fn compute_intent_score(snapshot: &BehaviorSnapshot, time_on_page_sec: u64) -> IntentScore {
    score_breakdown(snapshot, time_on_page_sec).score
}

/// Intent level for a snapshot
pub fn infer_intent_level(snapshot: &BehaviorSnapshot, time_on_page_sec: u64) -> IntentLevel {
    score_breakdown(snapshot, time_on_page_sec).level
}

/// Pick the level to act on once the server has answered.
///
/// A level declared by the server wins. Otherwise a declared score is bucketed
/// locally, and with neither the local estimate stands.
pub fn reconcile_level(
    local: IntentLevel,
    declared_level: Option<IntentLevel>,
    declared_score: Option<f64>,
) -> IntentLevel {
    declared_level
        .or_else(|| declared_score.map(|score| IntentScore::new(score).level()))
        .unwrap_or(local)
}

/// Whether the referrer is a known search or social site (case-insensitive)
pub fn is_high_intent_referrer(referrer: &str) -> bool {
    let referrer = referrer.trim();
    if referrer.is_empty() {
        return false;
    }

    let host = url::Url::parse(referrer)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .unwrap_or_else(|| {
            // Bare hosts such as "google.com/search"
            let lowered = referrer.to_ascii_lowercase();
            lowered.split('/').next().unwrap_or_default().to_string()
        });

    if host.split('.').any(|label| SEARCH_ENGINE_LABELS.contains(&label)) {
        return true;
    }
    SOCIAL_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// First path segment, lowercased (`/Pricing/teams` -> `pricing`)
pub fn page_section(path: &str) -> String {
    path.trim_start_matches('/')
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn count_section_views(pages: &[String], section: &str) -> u32 {
    pages.iter().filter(|p| page_section(p) == section).count() as u32
}

fn distinct_pages(pages: &[String]) -> usize {
    let mut seen: Vec<&str> = Vec::with_capacity(pages.len());
    for page in pages {
        if !seen.contains(&page.as_str()) {
            seen.push(page);
        }
    }
    seen.len()
}

fn multi_page_bonus(distinct: usize) -> f64 {
    match distinct {
        n if n >= 4 => MULTI_PAGE_BONUS,
        3 => THREE_PAGE_BONUS,
        _ => 0.0,
    }
}
