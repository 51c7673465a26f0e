//! Cancellable timer handles
//!
//! Every delayed action in the pipeline (flush debounce, message display,
//! auto-dismiss, return-visitor flag, identification prompt) is a
//! [`ScheduledTask`]. The owner stores the handle in a slot and cancels it by
//! replacing or dropping it, so a stale timer can never fire.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned action that runs once after a delay unless cancelled first.
///
/// Dropping the handle cancels the action if it has not fired yet.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `action` after `delay` on the current tokio runtime.
    ///
    /// Must be called from within a runtime context.
    pub fn after<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // Once fired, the action runs to completion
                    action().await;
                }
            }
        });

        Self { token, handle }
    }

    /// Prevent the action from firing. No effect once it has started.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task has completed, fired or not
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
