//! Proactive message lifecycle
//!
//! One message cycle runs per page: `Idle -> PendingDisplay -> Visible ->
//! Dismissed | Expired`. Entering a page supersedes everything the previous
//! page owned: its scoring request is cancelled, its timers are dropped and its
//! message is cleared. A locally computed fallback is scheduled for display
//! after a randomized delay, and the server's answer either replaces the
//! pending payload or upgrades the visible message in place.
//!
//! Every page gets an epoch and a cancellation token ([`PageLease`]). Updates
//! and timers carry the epoch they were issued for and are ignored once it is
//! stale, so a late answer can never touch the next page's state.

use crate::behavior::scoring::{page_section, reconcile_level};
use crate::config::TrackerConfig;
use crate::protocol::ScoringResponse;
use crate::schedule::ScheduledTask;
use crate::types::{Cta, IntentLevel, ProactiveMessage};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

/// Internal route used when a CTA has no usable target
pub const BOOK_DEMO_PATH: &str = "/book-demo";

const PLACEHOLDER_HOSTS: &[&str] = &["example.com", "example.org", "example.net", "localhost"];

/// Where the current page's message cycle stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePhase {
    Idle,
    PendingDisplay,
    Visible,
    Dismissed,
    Expired,
}

/// Display and auto-dismiss timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageTiming {
    pub display_min: Duration,
    pub display_max: Duration,
    pub dismiss_low: Duration,
    pub dismiss_medium: Duration,
}

impl MessageTiming {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            display_min: Duration::from_millis(config.display_delay_min_ms),
            display_max: Duration::from_millis(config.display_delay_max_ms),
            dismiss_low: Duration::from_millis(config.auto_dismiss_low_ms),
            dismiss_medium: Duration::from_millis(config.auto_dismiss_medium_ms),
        }
    }

    /// A natural-looking delay within the display window
    pub fn display_delay(&self) -> Duration {
        let min = self.display_min.as_millis() as u64;
        let max = (self.display_max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// How long a visible message stays up; high intent stays until acted on
    pub fn auto_dismiss(&self, level: IntentLevel) -> Option<Duration> {
        match level {
            IntentLevel::Low => Some(self.dismiss_low),
            IntentLevel::Medium => Some(self.dismiss_medium),
            IntentLevel::High => None,
        }
    }
}

impl Default for MessageTiming {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

/// The right to update one page's message state
#[derive(Debug, Clone)]
pub struct PageLease {
    epoch: u64,
    token: CancellationToken,
}

impl PageLease {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Resolves when the page is left or the request is reissued
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// What the scoring service contributed for the current page
#[derive(Debug, Clone, PartialEq)]
pub struct ServerUpdate {
    pub level: IntentLevel,
    pub content: Option<String>,
    pub insights: Option<Vec<String>>,
    pub cta: Option<Cta>,
}

/// Reduce a scoring response to the update it implies for the page.
///
/// The level follows [`reconcile_level`] and the CTA passes through
/// [`resolve_cta`].
pub fn compose_server_update(response: &ScoringResponse, local: IntentLevel) -> ServerUpdate {
    let level = reconcile_level(local, response.declared_level(), response.declared_score());
    ServerUpdate {
        level,
        content: response.message_text().map(str::to_string),
        insights: response.insights(),
        cta: response.declared_cta().map(|cta| resolve_cta(cta, level)),
    }
}

/// Where activating a CTA takes the visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtaTarget {
    /// An internal route
    Navigate(String),
    /// An external page, opened in a new tab
    OpenInNewTab(String),
}

impl CtaTarget {
    fn for_url(url: &str) -> Self {
        if url.starts_with('/') {
            CtaTarget::Navigate(url.to_string())
        } else {
            CtaTarget::OpenInNewTab(url.to_string())
        }
    }
}

/// Default call to action per intent level
pub fn default_cta(level: IntentLevel) -> Cta {
    let (label, url) = match level {
        IntentLevel::Low => ("Explore the docs", "/docs"),
        IntentLevel::Medium => ("See it in action", "/demo"),
        IntentLevel::High => ("Book a demo", BOOK_DEMO_PATH),
    };
    Cta {
        label: label.to_string(),
        url: url.to_string(),
    }
}

/// Rewrite placeholder or missing CTA values to the level's default route
pub fn resolve_cta(cta: Cta, level: IntentLevel) -> Cta {
    let fallback = default_cta(level);
    let label = if cta.label.trim().is_empty() {
        fallback.label
    } else {
        cta.label.trim().to_string()
    };
    let url = if is_placeholder_url(&cta.url) {
        fallback.url
    } else {
        cta.url.trim().to_string()
    };
    Cta { label, url }
}

fn is_placeholder_url(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.is_empty() || lowered.starts_with('#') {
        return true;
    }
    if lowered.contains("placeholder") || lowered.contains("your-") {
        return true;
    }
    match url::Url::parse(&lowered) {
        Ok(url) => url.host_str().is_some_and(|host| {
            PLACEHOLDER_HOSTS
                .iter()
                .any(|p| host == *p || host.ends_with(&format!(".{p}")))
        }),
        // Relative routes are fine
        Err(_) => !lowered.starts_with('/'),
    }
}

/// Page-specific canned message shown until the server answers
pub fn fallback_message(path: &str, level: IntentLevel) -> ProactiveMessage {
    let content = match page_section(path).as_str() {
        "pricing" => "Comparing plans? I can help you figure out which tier fits your traffic.",
        "docs" => "Digging into the docs? The quickstart gets the tracker live in under ten minutes.",
        "demo" | "book-demo" => {
            "Want to see IntentIQ on your own traffic? A walkthrough takes 20 minutes."
        }
        "" => "Welcome! See how teams turn anonymous visitors into qualified pipeline.",
        _ => "Have a question? We're happy to help you find what you need.",
    };
    ProactiveMessage {
        id: new_message_id(),
        content: content.to_string(),
        intent_level: level,
        researched_insights: None,
        cta: Some(default_cta(level)),
    }
}

fn new_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

struct Slots {
    epoch: u64,
    phase: MessagePhase,
    level: IntentLevel,
    /// Payload waiting for the display timer
    pending: Option<ProactiveMessage>,
    request: Option<CancellationToken>,
    display_timer: Option<ScheduledTask>,
    dismiss_timer: Option<ScheduledTask>,
}

struct Inner {
    slots: Mutex<Slots>,
    timing: MessageTiming,
    visible_tx: watch::Sender<Option<ProactiveMessage>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn show(self: &Arc<Self>, epoch: u64) {
        let mut slots = self.lock();
        if slots.epoch != epoch || slots.phase != MessagePhase::PendingDisplay {
            return;
        }
        slots.display_timer = None;
        let Some(message) = slots.pending.take() else {
            slots.phase = MessagePhase::Idle;
            return;
        };

        trace!(id = %message.id, level = %message.intent_level, "showing message");
        slots.phase = MessagePhase::Visible;
        slots.dismiss_timer = self.arm_auto_dismiss(epoch, message.intent_level);
        self.visible_tx.send_replace(Some(message));
    }

    fn arm_auto_dismiss(self: &Arc<Self>, epoch: u64, level: IntentLevel) -> Option<ScheduledTask> {
        let delay = self.timing.auto_dismiss(level)?;
        let weak: Weak<Self> = Arc::downgrade(self);
        Some(ScheduledTask::after(delay, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.expire(epoch);
            }
        }))
    }

    fn expire(&self, epoch: u64) {
        let mut slots = self.lock();
        if slots.epoch != epoch || slots.phase != MessagePhase::Visible {
            return;
        }
        trace!("message expired");
        slots.phase = MessagePhase::Expired;
        slots.dismiss_timer = None;
        self.visible_tx.send_replace(None);
    }
}

/// Owner of the single visible-message slot and its timers
#[derive(Clone)]
pub struct MessageController {
    inner: Arc<Inner>,
}

impl MessageController {
    pub fn new(timing: MessageTiming) -> Self {
        let (visible_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(Slots {
                    epoch: 0,
                    phase: MessagePhase::Idle,
                    level: IntentLevel::Low,
                    pending: None,
                    request: None,
                    display_timer: None,
                    dismiss_timer: None,
                }),
                timing,
                visible_tx,
            }),
        }
    }

    /// Enter a new page with `fallback` as its provisional message.
    ///
    /// Cancels the previous page's request and timers, clears its message and
    /// schedules the fallback. Must be called within a tokio runtime.
    pub fn begin_page(&self, fallback: ProactiveMessage) -> PageLease {
        let delay = self.inner.timing.display_delay();
        let mut slots = self.inner.lock();

        if let Some(request) = slots.request.take() {
            request.cancel();
        }
        slots.display_timer = None;
        slots.dismiss_timer = None;
        self.inner.visible_tx.send_replace(None);

        slots.epoch += 1;
        let epoch = slots.epoch;
        slots.phase = MessagePhase::PendingDisplay;
        slots.level = fallback.intent_level;
        slots.pending = Some(fallback);

        let token = CancellationToken::new();
        slots.request = Some(token.clone());

        let weak = Arc::downgrade(&self.inner);
        slots.display_timer = Some(ScheduledTask::after(delay, move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.show(epoch);
            }
        }));

        trace!(epoch, delay_ms = delay.as_millis() as u64, "message scheduled");
        PageLease { epoch, token }
    }

    /// Replace the current page's request lease, cancelling the old one.
    ///
    /// Returns `None` before the first page.
    pub fn reissue_request(&self) -> Option<PageLease> {
        let mut slots = self.inner.lock();
        if slots.epoch == 0 {
            return None;
        }
        if let Some(request) = slots.request.take() {
            request.cancel();
        }
        let token = CancellationToken::new();
        slots.request = Some(token.clone());
        Some(PageLease {
            epoch: slots.epoch,
            token,
        })
    }

    /// Apply the server's answer for the page `lease` belongs to.
    ///
    /// Returns whether the message changed. Stale or cancelled leases are
    /// ignored.
    pub fn apply_server_update(&self, lease: &PageLease, update: ServerUpdate) -> bool {
        let mut slots = self.inner.lock();
        if lease.epoch != slots.epoch || lease.is_cancelled() {
            trace!(epoch = lease.epoch, "ignoring update for a superseded page");
            return false;
        }
        slots.level = update.level;

        let Some(content) = update.content.clone() else {
            return false;
        };
        let upgrade = |base: &ProactiveMessage| ProactiveMessage {
            id: base.id.clone(),
            content: content.clone(),
            intent_level: update.level,
            researched_insights: update.insights.clone(),
            cta: Some(
                update
                    .cta
                    .clone()
                    .unwrap_or_else(|| default_cta(update.level)),
            ),
        };

        match slots.phase {
            MessagePhase::PendingDisplay => {
                let Some(pending) = slots.pending.as_ref() else {
                    return false;
                };
                // Display time is left as scheduled
                slots.pending = Some(upgrade(pending));
                debug!(level = %update.level, "server message replaced fallback");
                true
            }
            MessagePhase::Visible => {
                let Some(current) = self.inner.visible_tx.borrow().clone() else {
                    return false;
                };
                let upgraded = upgrade(&current);
                if upgraded.intent_level != current.intent_level {
                    slots.dismiss_timer = self
                        .inner
                        .arm_auto_dismiss(slots.epoch, upgraded.intent_level);
                }
                self.inner.visible_tx.send_replace(Some(upgraded));
                debug!(level = %update.level, "visible message upgraded");
                true
            }
            MessagePhase::Idle | MessagePhase::Dismissed | MessagePhase::Expired => false,
        }
    }

    /// Close the visible message. Returns `false` if nothing was visible.
    pub fn dismiss(&self) -> bool {
        let mut slots = self.inner.lock();
        if slots.phase != MessagePhase::Visible {
            return false;
        }
        slots.phase = MessagePhase::Dismissed;
        slots.dismiss_timer = None;
        self.inner.visible_tx.send_replace(None);
        true
    }

    /// Act on the visible message's CTA: dismiss it and report where to go
    pub fn activate_cta(&self) -> Option<CtaTarget> {
        let message = self.visible()?;
        let url = message
            .cta
            .map(|cta| cta.url)
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_cta(message.intent_level).url);
        self.dismiss();
        Some(CtaTarget::for_url(&url))
    }

    /// Tear down the current page without starting another
    pub fn end_page(&self) {
        let mut slots = self.inner.lock();
        if let Some(request) = slots.request.take() {
            request.cancel();
        }
        slots.display_timer = None;
        slots.dismiss_timer = None;
        slots.pending = None;
        slots.phase = MessagePhase::Idle;
        self.inner.visible_tx.send_replace(None);
    }

    /// Watch the visible message slot
    pub fn subscribe(&self) -> watch::Receiver<Option<ProactiveMessage>> {
        self.inner.visible_tx.subscribe()
    }

    pub fn visible(&self) -> Option<ProactiveMessage> {
        self.inner.visible_tx.borrow().clone()
    }

    pub fn phase(&self) -> MessagePhase {
        self.inner.lock().phase
    }

    /// Intent level currently in effect for the page
    pub fn page_level(&self) -> IntentLevel {
        self.inner.lock().level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn controller() -> MessageController {
        MessageController::new(MessageTiming::default())
    }

    fn server_update(level: IntentLevel, content: &str) -> ServerUpdate {
        ServerUpdate {
            level,
            content: Some(content.to_string()),
            insights: None,
            cta: None,
        }
    }

    #[test]
    fn test_display_delay_is_within_window() {
        let timing = MessageTiming::default();
        for _ in 0..100 {
            let delay = timing.display_delay();
            assert!(delay >= Duration::from_secs(5) && delay <= Duration::from_secs(7));
        }
    }

    #[test]
    fn test_auto_dismiss_by_level() {
        let timing = MessageTiming::default();
        assert_eq!(timing.auto_dismiss(IntentLevel::Low), Some(Duration::from_secs(8)));
        assert_eq!(timing.auto_dismiss(IntentLevel::Medium), Some(Duration::from_secs(15)));
        assert_eq!(timing.auto_dismiss(IntentLevel::High), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_shows_after_natural_delay() {
        let messages = controller();
        messages.begin_page(fallback_message("/pricing", IntentLevel::Medium));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(messages.visible(), None);
        assert_eq!(messages.phase(), MessagePhase::PendingDisplay);

        tokio::time::sleep(Duration::from_millis(2_200)).await;
        let visible = messages.visible().unwrap();
        assert!(visible.content.starts_with("Comparing plans?"));
        assert_eq!(messages.phase(), MessagePhase::Visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_supersedes_pending_message() {
        let messages = controller();
        let first = messages.begin_page(fallback_message("/pricing", IntentLevel::Medium));

        tokio::time::sleep(Duration::from_secs(3)).await;
        let second = messages.begin_page(fallback_message("/docs", IntentLevel::Low));
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        // The first page's display time passes with nothing shown
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(messages.visible(), None);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let visible = messages.visible().unwrap();
        assert!(visible.content.starts_with("Digging into the docs?"));

        // Low intent expires on its own
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(messages.visible(), None);
        assert_eq!(messages.phase(), MessagePhase::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_before_display_replaces_payload() {
        let messages = controller();
        let lease = messages.begin_page(fallback_message("/pricing", IntentLevel::Medium));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(messages.apply_server_update(
            &lease,
            server_update(IntentLevel::High, "Hi Sarah, want a tailored demo?")
        ));
        assert_eq!(messages.visible(), None);

        tokio::time::sleep(Duration::from_millis(7_100)).await;
        let visible = messages.visible().unwrap();
        assert_eq!(visible.content, "Hi Sarah, want a tailored demo?");
        assert_eq!(visible.intent_level, IntentLevel::High);
        assert_eq!(visible.cta, Some(default_cta(IntentLevel::High)));

        // High intent is never auto-dismissed
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(messages.visible().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_after_display_upgrades_in_place() {
        let messages = controller();
        let lease = messages.begin_page(fallback_message("/", IntentLevel::Low));
        tokio::time::sleep(Duration::from_millis(7_100)).await;
        let fallback = messages.visible().unwrap();

        assert!(messages.apply_server_update(
            &lease,
            server_update(IntentLevel::Medium, "Welcome back!")
        ));
        let upgraded = messages.visible().unwrap();
        assert_eq!(upgraded.id, fallback.id);
        assert_eq!(upgraded.content, "Welcome back!");

        // Auto-dismiss now follows the medium timeout, not the low one
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(messages.visible().is_some());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(messages.visible(), None);
        assert_eq!(messages.phase(), MessagePhase::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lease_is_ignored() {
        let messages = controller();
        let stale = messages.begin_page(fallback_message("/pricing", IntentLevel::Medium));
        messages.begin_page(fallback_message("/docs", IntentLevel::Low));

        assert!(!messages.apply_server_update(
            &stale,
            server_update(IntentLevel::High, "For the old page")
        ));
        assert_eq!(messages.page_level(), IntentLevel::Low);

        tokio::time::sleep(Duration::from_millis(7_100)).await;
        assert!(messages.visible().unwrap().content.starts_with("Digging into the docs?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_without_content_keeps_fallback() {
        let messages = controller();
        let lease = messages.begin_page(fallback_message("/docs", IntentLevel::Low));
        let update = ServerUpdate {
            level: IntentLevel::Medium,
            content: None,
            insights: None,
            cta: None,
        };

        assert!(!messages.apply_server_update(&lease, update));
        assert_eq!(messages.page_level(), IntentLevel::Medium);
        tokio::time::sleep(Duration::from_millis(7_100)).await;
        assert!(messages.visible().unwrap().content.starts_with("Digging into the docs?"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_cancels_auto_dismiss() {
        let messages = controller();
        messages.begin_page(fallback_message("/", IntentLevel::Low));
        tokio::time::sleep(Duration::from_millis(7_100)).await;

        assert!(messages.dismiss());
        assert_eq!(messages.phase(), MessagePhase::Dismissed);
        assert!(!messages.dismiss());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(messages.phase(), MessagePhase::Dismissed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cta_activation() {
        let messages = controller();
        messages.begin_page(fallback_message("/pricing", IntentLevel::High));
        assert_eq!(messages.activate_cta(), None);

        tokio::time::sleep(Duration::from_millis(7_100)).await;
        assert_eq!(
            messages.activate_cta(),
            Some(CtaTarget::Navigate(BOOK_DEMO_PATH.to_string()))
        );
        assert_eq!(messages.visible(), None);
        assert_eq!(messages.phase(), MessagePhase::Dismissed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cta_opens_new_tab() {
        let messages = controller();
        let lease = messages.begin_page(fallback_message("/", IntentLevel::Low));
        let update = ServerUpdate {
            cta: Some(Cta {
                label: "Read the report".to_string(),
                url: "https://research.intentiq.io/report".to_string(),
            }),
            ..server_update(IntentLevel::Low, "New research is out")
        };
        messages.apply_server_update(&lease, update);
        tokio::time::sleep(Duration::from_millis(7_100)).await;

        assert_eq!(
            messages.activate_cta(),
            Some(CtaTarget::OpenInNewTab(
                "https://research.intentiq.io/report".to_string()
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_page_clears_everything() {
        let messages = controller();
        let lease = messages.begin_page(fallback_message("/", IntentLevel::Low));
        messages.end_page();

        assert!(lease.is_cancelled());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(messages.visible(), None);
        assert_eq!(messages.phase(), MessagePhase::Idle);
    }

    #[tokio::test]
    async fn test_reissue_cancels_previous_request() {
        let messages = controller();
        assert!(messages.reissue_request().is_none());

        let first = messages.begin_page(fallback_message("/", IntentLevel::Low));
        let second = messages.reissue_request().unwrap();
        assert!(first.is_cancelled());
        assert_eq!(second.epoch(), first.epoch());
        assert!(!messages.apply_server_update(&first, server_update(IntentLevel::High, "x")));
        assert!(messages.apply_server_update(&second, server_update(IntentLevel::High, "y")));
    }

    #[test]
    fn test_placeholder_ctas_are_rewritten() {
        for url in [
            "",
            "#",
            "https://example.com/demo",
            "https://www.example.org",
            "https://your-calendar-link.com",
            "https://cal.com/placeholder",
        ] {
            let cta = Cta {
                label: "Book".to_string(),
                url: url.to_string(),
            };
            assert_eq!(resolve_cta(cta, IntentLevel::High).url, BOOK_DEMO_PATH, "{url}");
        }

        let real = Cta {
            label: " ".to_string(),
            url: "https://cal.com/intentiq/30min".to_string(),
        };
        let resolved = resolve_cta(real, IntentLevel::Medium);
        assert_eq!(resolved.url, "https://cal.com/intentiq/30min");
        assert_eq!(resolved.label, "See it in action");

        let route = Cta {
            label: "Pricing".to_string(),
            url: "/pricing".to_string(),
        };
        assert_eq!(resolve_cta(route, IntentLevel::Low).url, "/pricing");
    }

    #[test]
    fn test_placeholder_cta_takes_route_for_level() {
        let placeholder = || Cta {
            label: "Learn more".to_string(),
            url: "https://example.com/cta".to_string(),
        };

        assert_eq!(resolve_cta(placeholder(), IntentLevel::Low).url, "/docs");
        assert_eq!(resolve_cta(placeholder(), IntentLevel::Medium).url, "/demo");
        let high = resolve_cta(placeholder(), IntentLevel::High);
        assert_eq!(high.url, BOOK_DEMO_PATH);
        assert_eq!(high.label, "Learn more");
    }

    #[test]
    fn test_compose_server_update() {
        let response: ScoringResponse = serde_json::from_value(json!({
            "message": "Welcome back, Stripe team",
            "intent_score": 75,
            "cta": { "label": "Book Demo", "url": "https://calendly.com/your-link" },
            "learning_stats": { "returning_visitors": { "count": 2 } }
        }))
        .unwrap();

        let update = compose_server_update(&response, IntentLevel::Low);
        assert_eq!(update.level, IntentLevel::High);
        assert_eq!(update.content.as_deref(), Some("Welcome back, Stripe team"));
        assert_eq!(update.insights, Some(vec!["Returning visitors: 2".to_string()]));
        assert_eq!(update.cta.unwrap().url, BOOK_DEMO_PATH);

        let bare = compose_server_update(&ScoringResponse::default(), IntentLevel::Medium);
        assert_eq!(bare.level, IntentLevel::Medium);
        assert_eq!(bare.content, None);
    }

    #[test]
    fn test_fallback_copy_per_section() {
        let home = fallback_message("/", IntentLevel::Low);
        let demo = fallback_message("/book-demo", IntentLevel::High);
        let other = fallback_message("/about", IntentLevel::Low);

        assert!(home.content.starts_with("Welcome!"));
        assert!(demo.content.contains("walkthrough"));
        assert!(other.content.starts_with("Have a question?"));
        assert_ne!(home.id, other.id);
        assert!(home.id.starts_with("msg_"));
    }
}
