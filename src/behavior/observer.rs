//! Behavior observer
//!
//! Passively follows the visitor's navigation, scroll depth and referrer and
//! serves point-in-time [`BehaviorSnapshot`]s. It writes only to its own
//! storage keys: the durable "visited before" flag and the session page list.

use crate::schedule::ScheduledTask;
use crate::storage::{read_json, KeyValueStore, StorageScope, RETURN_VISITOR_KEY, SESSION_PAGES_KEY};
use crate::types::BehaviorSnapshot;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

const RETURN_VISITOR_FLAG: &str = "1";

/// Scroll position reported by the host at a given moment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    /// Distance scrolled from the top of the document
    pub scroll_top: f64,
    /// Full height of the document
    pub document_height: f64,
    /// Height of the visible viewport
    pub viewport_height: f64,
}

/// Percentage of the scrollable range that has been scrolled.
///
/// Formula: `round(scroll_top / (document_height - viewport_height) * 100)`,
/// clamped to 0-100. Returns `None` when the page cannot scroll.
pub fn scroll_depth_percent(metrics: ScrollMetrics) -> Option<u8> {
    let scrollable = metrics.document_height - metrics.viewport_height;
    if scrollable.is_nan() || scrollable <= 0.0 || !metrics.scroll_top.is_finite() {
        return None;
    }
    let depth = (metrics.scroll_top / scrollable * 100.0).round();
    Some(depth.clamp(0.0, 100.0) as u8)
}

#[derive(Debug, Default)]
struct ObserverState {
    started: bool,
    referrer: String,
    current_page: Option<String>,
    max_scroll_depth: u8,
    /// Latest scroll position seen since the last frame
    latest_scroll: Option<ScrollMetrics>,
    frame_requested: bool,
    /// In-memory mirror of the session page list
    pages: Vec<String>,
    /// Set while the mirror holds pages storage refused to take
    pages_unsynced: bool,
    return_flag_task: Option<ScheduledTask>,
}

/// Rolling observer of a visitor's session behavior
pub struct BehaviorObserver {
    store: Arc<dyn KeyValueStore>,
    return_flag_delay: Duration,
    state: Mutex<ObserverState>,
}

impl BehaviorObserver {
    pub fn new(store: Arc<dyn KeyValueStore>, return_flag_delay: Duration) -> Self {
        Self {
            store,
            return_flag_delay,
            state: Mutex::new(ObserverState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ObserverState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Capture the referrer for this page lifetime and arm the return-visitor flag.
    ///
    /// The flag is written after a delay so the first visit never reads as a
    /// return visit. Only the first call has any effect.
    pub fn start(&self, referrer: &str) {
        let mut state = self.lock();
        if state.started {
            return;
        }
        state.started = true;
        state.referrer = referrer.to_string();

        match self.store.get(StorageScope::Durable, RETURN_VISITOR_KEY) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let store = self.store.clone();
                state.return_flag_task = Some(ScheduledTask::after(
                    self.return_flag_delay,
                    move || async move {
                        if let Err(e) =
                            store.set(StorageScope::Durable, RETURN_VISITOR_KEY, RETURN_VISITOR_FLAG)
                        {
                            debug!(error = %e, "could not mark return visitor");
                        }
                    },
                ));
            }
            Err(e) => debug!(error = %e, "return visitor flag unavailable"),
        }
    }

    /// Record a navigation to `path`.
    ///
    /// Appends the path to the session page list if it is new and resets the
    /// scroll depth for the new page.
    pub fn record_navigation(&self, path: &str) {
        let mut state = self.lock();
        state.current_page = Some(path.to_string());
        state.max_scroll_depth = 0;
        state.latest_scroll = None;
        state.frame_requested = false;

        let mut pages = self.load_pages(&state);
        if pages.iter().any(|p| p == path) {
            state.pages = pages;
            return;
        }
        pages.push(path.to_string());

        match serde_json::to_string(&pages) {
            Ok(json) => match self.store.set(StorageScope::Session, SESSION_PAGES_KEY, &json) {
                Ok(()) => state.pages_unsynced = false,
                Err(e) => {
                    debug!(error = %e, "session page list kept in memory only");
                    state.pages_unsynced = true;
                }
            },
            Err(e) => {
                debug!(error = %e, "could not encode session page list");
                state.pages_unsynced = true;
            }
        }
        state.pages = pages;
    }

    /// Note a scroll event.
    ///
    /// Returns `true` when the host should request an animation frame; further
    /// scrolls before that frame only update the position to sample.
    pub fn on_scroll(&self, metrics: ScrollMetrics) -> bool {
        let mut state = self.lock();
        state.latest_scroll = Some(metrics);
        if state.frame_requested {
            return false;
        }
        state.frame_requested = true;
        true
    }

    /// Sample the latest scroll position, at most once per animation frame
    pub fn on_animation_frame(&self) {
        let mut state = self.lock();
        state.frame_requested = false;
        let Some(metrics) = state.latest_scroll.take() else {
            return;
        };
        if let Some(depth) = scroll_depth_percent(metrics) {
            if depth > state.max_scroll_depth {
                trace!(depth, "scroll depth increased");
                state.max_scroll_depth = depth;
            }
        }
    }

    pub fn current_page(&self) -> Option<String> {
        self.lock().current_page.clone()
    }

    pub fn max_scroll_depth(&self) -> u8 {
        self.lock().max_scroll_depth
    }

    pub fn is_return_visitor(&self) -> bool {
        matches!(
            self.store.get(StorageScope::Durable, RETURN_VISITOR_KEY),
            Ok(Some(flag)) if flag == RETURN_VISITOR_FLAG
        )
    }

    /// Point-in-time behavior snapshot
    pub fn snapshot(&self) -> BehaviorSnapshot {
        let (pages, scroll_depth, referrer) = {
            let state = self.lock();
            (
                self.load_pages(&state),
                state.max_scroll_depth,
                state.referrer.clone(),
            )
        };

        BehaviorSnapshot {
            session_page_count: pages.len() as u32,
            pages_visited: pages,
            scroll_depth,
            is_return_visitor: self.is_return_visitor(),
            referrer,
        }
    }

    /// Cancel the pending return-visitor flag write, as when the page is torn down
    pub fn shutdown(&self) {
        self.lock().return_flag_task = None;
    }

    /// Session pages from storage, or the in-memory mirror when storage is
    /// unreadable or behind it
    fn load_pages(&self, state: &ObserverState) -> Vec<String> {
        if state.pages_unsynced {
            return state.pages.clone();
        }
        let stored: Option<Vec<String>> =
            match read_json(self.store.as_ref(), StorageScope::Session, SESSION_PAGES_KEY) {
                Ok(pages) => pages,
                Err(_) => return state.pages.clone(),
            };

        let mut unique: Vec<String> = Vec::new();
        for page in stored.unwrap_or_else(|| state.pages.clone()) {
            if !unique.contains(&page) {
                unique.push(page);
            }
        }
        unique
    }
}
