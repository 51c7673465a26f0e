//! Visitor tracker
//!
//! [`VisitorTracker`] wires the pipeline together for one browsing session:
//! each navigation records behavior, computes a local intent estimate, starts
//! the message cycle with a fallback and asks the scoring service for a better
//! answer. Page teardown hands the final numbers to the best-effort transport.
//!
//! The host drives it with `start`, `navigate`, scroll callbacks and
//! `on_page_exit`, and renders whatever the watch channels publish.

use crate::behavior::observer::ScrollMetrics;
use crate::behavior::scoring::{infer_intent_level, score_breakdown, ScoreBreakdown};
use crate::config::TrackerConfig;
use crate::context::TrackerContext;
use crate::error::TrackerError;
use crate::message::{
    compose_server_update, fallback_message, CtaTarget, MessageController, MessageTiming,
    PageLease,
};
use crate::protocol::{Endpoint, LeadCaptureRequest};
use crate::queue::{EventQueue, FlushOutcome};
use crate::schedule::ScheduledTask;
use crate::types::{
    BehaviorSnapshot, IntentLevel, LeadForm, ProactiveMessage, VisitorIdentity, VisitorProfile,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Copy for the identification prompt, tuned to the visitor's intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormPrompt {
    pub level: IntentLevel,
    pub heading: &'static str,
    pub subheading: &'static str,
    pub button: &'static str,
}

impl FormPrompt {
    pub fn for_level(level: IntentLevel) -> Self {
        let (heading, subheading, button) = match level {
            IntentLevel::Low => ("Stay in the Loop", "Get updates and tips", "Subscribe"),
            IntentLevel::Medium => (
                "Unlock Personalized Insights",
                "Get personalized insights",
                "Get Personalized Insights",
            ),
            IntentLevel::High => (
                "Get Your Personalized Demo",
                "See how IntentIQ works for your team",
                "Book Demo",
            ),
        };
        Self {
            level,
            heading,
            subheading,
            button,
        }
    }
}

#[derive(Debug, Default)]
struct PageState {
    started: bool,
    page: Option<String>,
    entered_at: Option<Instant>,
    form_prompted: bool,
    form_timer: Option<ScheduledTask>,
}

/// Session-level orchestrator of the tracking pipeline
pub struct VisitorTracker {
    ctx: Arc<TrackerContext>,
    messages: MessageController,
    queue: Option<EventQueue>,
    form_tx: Arc<watch::Sender<Option<FormPrompt>>>,
    state: Mutex<PageState>,
}

impl VisitorTracker {
    pub fn new(ctx: Arc<TrackerContext>) -> Self {
        let messages = MessageController::new(MessageTiming::from_config(&ctx.config));
        let queue = ctx
            .config
            .batched_events
            .then(|| EventQueue::new(ctx.clone()));
        let (form_tx, _) = watch::channel(None);

        Self {
            ctx,
            messages,
            queue,
            form_tx: Arc::new(form_tx),
            state: Mutex::new(PageState::default()),
        }
    }

    /// Tracker over the default storage and HTTP transport for `config`
    pub fn from_config(config: TrackerConfig) -> Result<Self, TrackerError> {
        Ok(Self::new(TrackerContext::from_config(config)?))
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn context(&self) -> &Arc<TrackerContext> {
        &self.ctx
    }

    /// Begin tracking: capture the referrer, arm the identification prompt
    /// and enter the landing page.
    ///
    /// Must be called within a tokio runtime. Later calls only navigate.
    pub fn start(&self, referrer: &str, path: &str) {
        let first = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.started, true)
        };
        if first {
            self.ctx.observer.start(referrer);
            self.arm_form_prompt();
            info!(visitor_id = %self.ctx.identity.visitor_id(), "tracking started");
        }
        self.navigate(path);
    }

    fn arm_form_prompt(&self) {
        if self.ctx.identity.profile().is_some() {
            return;
        }
        let mut state = self.lock();
        if state.form_prompted {
            return;
        }
        state.form_prompted = true;

        let ctx = self.ctx.clone();
        let messages = self.messages.clone();
        let form_tx = self.form_tx.clone();
        state.form_timer = Some(ScheduledTask::after(
            self.ctx.config.form_prompt_delay(),
            move || async move {
                if ctx.identity.profile().is_none() {
                    form_tx.send_replace(Some(FormPrompt::for_level(messages.page_level())));
                }
            },
        ));
    }

    /// Enter `path`, superseding everything the previous page started
    pub fn navigate(&self, path: &str) {
        if let Some(queue) = &self.queue {
            queue.close_page_view();
        }
        self.ctx.observer.record_navigation(path);
        {
            let mut state = self.lock();
            state.page = Some(path.to_string());
            state.entered_at = Some(Instant::now());
        }

        let local = infer_intent_level(&self.ctx.observer.snapshot(), 0);
        trace!(path, level = %local, "page entered");
        let lease = self.messages.begin_page(fallback_message(path, local));

        if let Some(queue) = &self.queue {
            queue.record_page_view(path);
        }
        self.spawn_scoring(lease, path, 0);
    }

    /// Ask the scoring service about `page`, applying the answer only while
    /// `lease` is current
    fn spawn_scoring(&self, lease: PageLease, page: &str, time_on_page: u64) {
        let payload = self.ctx.visitor_payload(page, time_on_page);
        let local = infer_intent_level(&payload.behavior, time_on_page);
        let ctx = self.ctx.clone();
        let messages = self.messages.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = lease.cancelled() => {
                    trace!(epoch = lease.epoch(), "scoring request superseded");
                }
                result = ctx.transport.process_visitor(&payload) => match result {
                    Ok(response) => {
                        let update = compose_server_update(&response, local);
                        messages.apply_server_update(&lease, update);
                    }
                    Err(e) if e.is_cancelled() => trace!("scoring request cancelled"),
                    Err(e) => debug!(error = %e, "scoring request failed, keeping fallback"),
                },
            }
        });
    }

    /// Store the visitor's self-reported profile and rescore the current page
    pub fn identify_visitor(&self, profile: &VisitorProfile) -> Result<VisitorProfile, TrackerError> {
        let stored = self.ctx.identity.save_profile(profile)?;
        self.dismiss_form();
        self.lock().form_timer = None;

        if let Some(page) = self.current_page() {
            if let Some(lease) = self.messages.reissue_request() {
                self.spawn_scoring(lease, &page, 0);
            }
        }
        info!(company = %stored.company, "visitor identified");
        Ok(stored)
    }

    /// Forget the stored profile; later requests are anonymous
    pub fn clear_profile(&self) -> Result<(), TrackerError> {
        self.ctx.identity.clear_profile()
    }

    pub fn profile(&self) -> Option<VisitorProfile> {
        self.ctx.identity.profile()
    }

    pub fn dismiss_form(&self) {
        self.form_tx.send_replace(None);
    }

    pub fn form_prompt(&self) -> Option<FormPrompt> {
        self.form_tx.borrow().clone()
    }

    pub fn subscribe_form(&self) -> watch::Receiver<Option<FormPrompt>> {
        self.form_tx.subscribe()
    }

    /// Submit a gated content lead. Unlike scoring, failures are returned.
    pub async fn capture_lead(&self, lead: &LeadForm) -> Result<Value, TrackerError> {
        let lead = lead
            .validated()
            .map_err(|e| TrackerError::InvalidProfile(e.to_string()))?;
        let request = LeadCaptureRequest {
            lead,
            behavioral_context: self.ctx.observer.snapshot(),
        };
        let response = self.ctx.transport.capture_lead(&request).await?;
        info!(content_type = ?request.lead.content_type, "lead captured");
        Ok(response)
    }

    /// Page teardown: deliver the final time on page and any queued events
    /// without waiting, then stop every timer.
    pub fn on_page_exit(&self) {
        let (page, elapsed) = {
            let mut state = self.lock();
            state.form_timer = None;
            (state.page.take(), state.entered_at.take().map(|t| t.elapsed()))
        };

        if let (Some(page), Some(elapsed)) = (page, elapsed) {
            if elapsed >= self.ctx.config.unload_noise_floor() {
                let secs = elapsed.as_secs_f64().round() as u64;
                let payload = self.ctx.visitor_payload(&page, secs);
                match serde_json::to_value(&payload) {
                    Ok(body) => self.ctx.transport.send_beacon(Endpoint::ProcessVisitor, body),
                    Err(e) => debug!(error = %e, "could not encode exit payload"),
                }
            } else {
                trace!(elapsed_ms = elapsed.as_millis() as u64, "exit below noise floor");
            }
        }

        if let Some(queue) = &self.queue {
            queue.flush_on_exit();
        }
        self.messages.end_page();
        self.ctx.observer.shutdown();
    }

    /// Flush queued tracking events now. `None` when batching is off.
    pub async fn flush_events(&self) -> Option<FlushOutcome> {
        match &self.queue {
            Some(queue) => Some(queue.flush().await),
            None => None,
        }
    }

    pub fn on_scroll(&self, metrics: ScrollMetrics) -> bool {
        self.ctx.observer.on_scroll(metrics)
    }

    pub fn on_animation_frame(&self) {
        self.ctx.observer.on_animation_frame()
    }

    pub fn dismiss_message(&self) -> bool {
        self.messages.dismiss()
    }

    pub fn activate_cta(&self) -> Option<CtaTarget> {
        self.messages.activate_cta()
    }

    pub fn visible_message(&self) -> Option<ProactiveMessage> {
        self.messages.visible()
    }

    pub fn subscribe_messages(&self) -> watch::Receiver<Option<ProactiveMessage>> {
        self.messages.subscribe()
    }

    /// Intent level in effect for the current page
    pub fn intent_level(&self) -> IntentLevel {
        self.messages.page_level()
    }

    pub fn identity(&self) -> VisitorIdentity {
        self.ctx.identity.identity()
    }

    pub fn current_page(&self) -> Option<String> {
        self.lock().page.clone()
    }

    pub fn snapshot(&self) -> BehaviorSnapshot {
        self.ctx.observer.snapshot()
    }

    /// Local score of the current page so far
    pub fn assess(&self) -> ScoreBreakdown {
        let secs = self
            .lock()
            .entered_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0);
        score_breakdown(&self.snapshot(), secs)
    }
}
