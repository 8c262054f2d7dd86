//! Poll delay scheduler.
//!
//! Starts one-shot delays on the [`Environment`] clock and reports their
//! elapse back to the driver as [`RegistrationEvent::PollTimerElapsed`].
//! Cancelling a delay aborts its task, so it cannot report afterwards; a
//! report already queued before the abort is discarded by the machine's
//! timer id check.

use std::{collections::HashMap, time::Duration};

use provision_core::{RegistrationEvent, TimerId, env::Environment};
use tokio::{sync::mpsc, task::JoinHandle};

/// Cancellable one-shot delays keyed by [`TimerId`].
pub struct PollScheduler<E: Environment> {
    env: E,
    pending: HashMap<TimerId, JoinHandle<()>>,
}

impl<E: Environment> PollScheduler<E> {
    /// Create a scheduler on the given environment.
    pub fn new(env: E) -> Self {
        Self { env, pending: HashMap::new() }
    }

    /// Start a delay. When it elapses, `PollTimerElapsed { timer }` is sent
    /// on `elapsed`.
    pub fn start(
        &mut self,
        timer: TimerId,
        delay: Duration,
        elapsed: mpsc::UnboundedSender<RegistrationEvent>,
    ) {
        let env = self.env.clone();
        let handle = tokio::spawn(async move {
            env.sleep(delay).await;
            if elapsed.send(RegistrationEvent::PollTimerElapsed { timer }).is_err() {
                tracing::trace!(%timer, "poll timer elapsed after driver stopped");
            }
        });

        tracing::debug!(%timer, ?delay, "poll timer started");
        if let Some(previous) = self.pending.insert(timer, handle) {
            previous.abort();
        }
    }

    /// Cancel a pending delay. Returns false if it was unknown or already
    /// reported.
    pub fn cancel(&mut self, timer: TimerId) -> bool {
        match self.pending.remove(&timer) {
            Some(handle) => {
                handle.abort();
                tracing::debug!(%timer, "poll timer cancelled");
                true
            },
            None => false,
        }
    }

    /// Forget a delay whose elapse has been delivered.
    pub fn complete(&mut self, timer: TimerId) {
        self.pending.remove(&timer);
    }

    /// Number of delays started and not yet completed or cancelled.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl<E: Environment> Drop for PollScheduler<E> {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::SystemEnv;

    #[tokio::test(start_paused = true)]
    async fn elapsed_timer_reports_its_id() {
        let timer = TimerId::from_raw(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(SystemEnv::new());

        scheduler.start(timer, Duration::from_millis(100), tx);
        assert_eq!(scheduler.pending(), 1);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, RegistrationEvent::PollTimerElapsed { timer: t } if t == timer));

        scheduler.complete(timer);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let timer = TimerId::from_raw(1);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = PollScheduler::new(SystemEnv::new());

        scheduler.start(timer, Duration::from_millis(100), tx);
        assert!(scheduler.cancel(timer));
        assert!(!scheduler.cancel(timer));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
