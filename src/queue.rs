//! Event queue and flush scheduler
//!
//! Tracking events are appended to an in-memory queue and delivered in
//! batches to `/api/track-behavior`. A debounce timer coalesces bursts into one
//! request. Delivery is at most once: a flush takes the whole queue before any
//! I/O starts, drops events that fail validation, and discards the batch if
//! the request fails.

use crate::context::TrackerContext;
use crate::protocol::Endpoint;
use crate::schedule::ScheduledTask;
use crate::types::{TrackingEvent, MAX_EVENT_DURATION_SEC};
use chrono::Utc;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Result of a flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing valid to send; no request was made
    Empty { dropped: usize },
    /// The batch was accepted by the service
    Delivered { events: usize, dropped: usize },
    /// The request failed and the batch was discarded
    Failed { events: usize, dropped: usize },
}

#[derive(Debug)]
struct QueuedEvent {
    seq: u64,
    event: TrackingEvent,
}

/// The page view currently in progress
#[derive(Debug)]
struct OpenView {
    seq: u64,
    event: TrackingEvent,
    entered_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    events: Vec<QueuedEvent>,
    next_seq: u64,
    open_view: Option<OpenView>,
    flush_timer: Option<ScheduledTask>,
}

struct QueueInner {
    ctx: Arc<TrackerContext>,
    debounce: Duration,
    state: Mutex<QueueState>,
}

/// Debounced batch queue of tracking events
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl EventQueue {
    pub fn new(ctx: Arc<TrackerContext>) -> Self {
        let debounce = ctx.config.flush_debounce();
        Self {
            inner: Arc::new(QueueInner {
                ctx,
                debounce,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append an event and (re)start the debounce timer
    pub fn enqueue(&self, event: TrackingEvent) {
        self.push(event);
        self.schedule_flush();
    }

    fn push(&self, event: TrackingEvent) -> u64 {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.events.push(QueuedEvent { seq, event });
        seq
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush once the debounce window passes with no further calls.
    ///
    /// Any pending timer is replaced, so a burst yields a single flush.
    pub fn schedule_flush(&self) {
        let weak: Weak<QueueInner> = Arc::downgrade(&self.inner);
        let timer = ScheduledTask::after(self.inner.debounce, move || async move {
            if let Some(inner) = weak.upgrade() {
                EventQueue { inner }.flush().await;
            }
        });
        self.lock().flush_timer = Some(timer);
    }

    /// Queue a page view for `page` and mark it as the view in progress
    pub fn record_page_view(&self, page: &str) {
        let event = TrackingEvent::page_view(page, Utc::now());
        let seq = self.push(event.clone());
        self.lock().open_view = Some(OpenView {
            seq,
            event,
            entered_at: Instant::now(),
        });
        self.schedule_flush();
    }

    /// Close the view in progress, recording the time spent on it.
    ///
    /// The queued page view gets its duration backfilled. If it was already
    /// sent, a page view with the same timestamp and the final duration is
    /// queued instead. Returns the recorded duration in seconds.
    pub fn close_page_view(&self) -> Option<u64> {
        let mut state = self.lock();
        let view = state.open_view.take()?;
        let secs = (view.entered_at.elapsed().as_secs_f64().round() as u64)
            .min(MAX_EVENT_DURATION_SEC);

        match state.events.iter_mut().find(|q| q.seq == view.seq) {
            Some(queued) => queued.event.duration_seconds = secs,
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.events.push(QueuedEvent {
                    seq,
                    event: TrackingEvent {
                        duration_seconds: secs,
                        ..view.event
                    },
                });
            }
        }
        Some(secs)
    }

    /// Take the queue and validate it, returning the sendable events and the
    /// number dropped
    fn drain_valid(&self) -> (Vec<TrackingEvent>, usize) {
        let taken = {
            let mut state = self.lock();
            state.flush_timer = None;
            mem::take(&mut state.events)
        };

        let total = taken.len();
        let valid: Vec<TrackingEvent> = taken
            .into_iter()
            .map(|q| q.event)
            .filter(|event| match event.validate() {
                Ok(()) => true,
                Err(e) => {
                    debug!(page = %event.page, error = %e, "dropping invalid tracking event");
                    false
                }
            })
            .collect();
        let dropped = total - valid.len();
        (valid, dropped)
    }

    /// Send everything queued so far as one batch.
    ///
    /// Events enqueued while the request is in flight start a new queue.
    pub async fn flush(&self) -> FlushOutcome {
        let (events, dropped) = self.drain_valid();
        if events.is_empty() {
            return FlushOutcome::Empty { dropped };
        }

        let count = events.len();
        let batch = self.inner.ctx.behavior_batch(events);
        match self.inner.ctx.transport.track_behavior(&batch).await {
            Ok(()) => {
                info!(events = count, dropped, "flushed tracking events");
                FlushOutcome::Delivered {
                    events: count,
                    dropped,
                }
            }
            Err(e) => {
                debug!(events = count, error = %e, "tracking batch discarded");
                FlushOutcome::Failed {
                    events: count,
                    dropped,
                }
            }
        }
    }

    /// Page teardown: backfill the open view and send the queue as a beacon,
    /// bypassing the debounce. Returns the number of events handed off.
    pub fn flush_on_exit(&self) -> usize {
        self.close_page_view();
        let (events, dropped) = self.drain_valid();
        if events.is_empty() {
            return 0;
        }

        let count = events.len();
        let batch = self.inner.ctx.behavior_batch(events);
        match serde_json::to_value(&batch) {
            Ok(body) => {
                info!(events = count, dropped, "flushing tracking events on exit");
                self.inner
                    .ctx
                    .transport
                    .send_beacon(Endpoint::TrackBehavior, body);
                count
            }
            Err(e) => {
                debug!(error = %e, "could not encode exit batch");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::storage::MemoryStore;
    use crate::transport::tests::{FakeTransport, Reply};
    use pretty_assertions::assert_eq;

    fn setup(transport: FakeTransport) -> (EventQueue, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let ctx = TrackerContext::new(
            TrackerConfig::default(),
            Arc::new(MemoryStore::new()),
            transport.clone(),
        );
        (EventQueue::new(ctx), transport)
    }

    fn event(page: &str) -> TrackingEvent {
        TrackingEvent::page_view(page, Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_coalesced_into_one_batch() {
        let (queue, transport) = setup(FakeTransport::new(Reply::Fail));

        queue.enqueue(event("/"));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        queue.enqueue(event("/pricing"));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        queue.enqueue(event("/docs"));

        // The timer restarts on every enqueue
        assert_eq!(transport.batch_count(), 0);
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        assert_eq!(transport.batch_count(), 1);
        let batches = transport.batches.lock().unwrap();
        let pages: Vec<&str> = batches[0].events.iter().map(|e| e.page.as_str()).collect();
        assert_eq!(pages, vec!["/", "/pricing", "/docs"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_empty_flush_makes_no_request() {
        let (queue, transport) = setup(FakeTransport::new(Reply::Fail));
        assert_eq!(queue.flush().await, FlushOutcome::Empty { dropped: 0 });
        assert_eq!(transport.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_events_are_dropped_individually() {
        let (queue, transport) = setup(FakeTransport::new(Reply::Fail));
        queue.enqueue(event("/pricing"));
        queue.enqueue(TrackingEvent {
            timestamp: "not a time".to_string(),
            ..event("/docs")
        });
        queue.enqueue(event(""));

        let outcome = queue.flush().await;
        assert_eq!(
            outcome,
            FlushOutcome::Delivered {
                events: 1,
                dropped: 2
            }
        );
        assert_eq!(transport.batches.lock().unwrap()[0].events[0].page, "/pricing");
    }

    #[tokio::test]
    async fn test_all_invalid_makes_no_request() {
        let (queue, transport) = setup(FakeTransport::new(Reply::Fail));
        queue.enqueue(event(""));

        assert_eq!(queue.flush().await, FlushOutcome::Empty { dropped: 1 });
        assert_eq!(transport.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_is_not_requeued() {
        let (queue, transport) = setup(FakeTransport::failing_batches());
        queue.enqueue(event("/"));

        assert_eq!(
            queue.flush().await,
            FlushOutcome::Failed {
                events: 1,
                dropped: 0
            }
        );
        assert!(queue.is_empty());
        assert_eq!(queue.flush().await, FlushOutcome::Empty { dropped: 0 });
        assert_eq!(transport.batch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_backfills_duration_and_sends_beacon() {
        let (queue, transport) = setup(FakeTransport::new(Reply::Fail));
        queue.record_page_view("/pricing");
        tokio::time::sleep(Duration::from_millis(1_400)).await;

        assert_eq!(queue.flush_on_exit(), 1);
        assert_eq!(transport.batch_count(), 0);

        let beacons = transport.beacons.lock().unwrap();
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].0, Endpoint::TrackBehavior);
        assert_eq!(beacons[0].1["events"][0]["page"], "/pricing");
        assert_eq!(beacons[0].1["events"][0]["duration_seconds"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_after_flush_resends_view_with_duration() {
        let (queue, transport) = setup(FakeTransport::new(Reply::Fail));
        queue.record_page_view("/docs");
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.batch_count(), 1);

        assert_eq!(queue.flush_on_exit(), 1);
        let sent = transport.batches.lock().unwrap()[0].events[0].clone();
        let beacons = transport.beacons.lock().unwrap();
        assert_eq!(beacons[0].1["events"][0]["timestamp"], sent.timestamp);
        assert_eq!(beacons[0].1["events"][0]["duration_seconds"], 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backfilled_duration_is_capped() {
        let (queue, _transport) = setup(FakeTransport::new(Reply::Fail));
        queue.record_page_view("/");
        tokio::time::sleep(Duration::from_secs(MAX_EVENT_DURATION_SEC + 600)).await;
        assert_eq!(queue.close_page_view(), Some(MAX_EVENT_DURATION_SEC));
        assert_eq!(queue.close_page_view(), None);
    }

    #[tokio::test]
    async fn test_exit_with_nothing_queued_sends_nothing() {
        let (queue, transport) = setup(FakeTransport::new(Reply::Fail));
        assert_eq!(queue.flush_on_exit(), 0);
        assert!(transport.beacons.lock().unwrap().is_empty());
    }
}
