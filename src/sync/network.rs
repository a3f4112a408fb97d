use super::backend::LiveMatchBackend;
use super::messages::{Push, SyncEvent};
use crate::settings::SyncSettings;
use log::{debug, error, warn};
use scoreboard_api::client::ApiResult;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep};

/// Writes in flight for one match and when the latest one settled. Both
/// fields change under one lock.
#[derive(Debug, Default)]
pub struct PushProgress {
    inner: Mutex<Progress>,
}

#[derive(Debug, Default)]
struct Progress {
    outstanding: usize,
    last_settled: Option<Instant>,
}

impl PushProgress {
    pub fn queued(&self) {
        self.lock().outstanding += 1;
    }

    /// A queued write that will never be sent.
    pub fn dropped(&self) {
        let mut progress = self.lock();
        progress.outstanding = progress.outstanding.saturating_sub(1);
    }

    pub fn settled(&self, at: Instant) {
        let mut progress = self.lock();
        progress.outstanding = progress.outstanding.saturating_sub(1);
        progress.last_settled = Some(at);
    }

    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// True when a poll sent at `requested_at` may predate one of our writes:
    /// something is still in flight, or the latest write settled after it.
    pub fn is_unsettled(&self, requested_at: Instant) -> bool {
        let progress = self.lock();
        progress.outstanding > 0 || progress.last_settled.is_some_and(|at| requested_at <= at)
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sends committed events to the backend one at a time, in commit order,
/// retrying each with exponential backoff.
pub struct PushWorker {
    backend: Arc<dyn LiveMatchBackend>,
    match_id: String,
    requests: mpsc::UnboundedReceiver<Push>,
    responses: mpsc::UnboundedSender<SyncEvent>,
    progress: Arc<PushProgress>,
    shutdown: watch::Receiver<bool>,
    attempts: u32,
    backoff: Duration,
}

impl PushWorker {
    pub fn new(
        backend: Arc<dyn LiveMatchBackend>,
        match_id: String,
        requests: mpsc::UnboundedReceiver<Push>,
        responses: mpsc::UnboundedSender<SyncEvent>,
        progress: Arc<PushProgress>,
        shutdown: watch::Receiver<bool>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            backend,
            match_id,
            requests,
            responses,
            progress,
            shutdown,
            attempts: settings.push_attempts.max(1),
            backoff: settings.push_backoff,
        }
    }

    pub async fn run(mut self) {
        loop {
            let push = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                push = self.requests.recv() => match push {
                    Some(push) => push,
                    None => break,
                },
            };

            let Some(event) = self.deliver(push).await else {
                debug!("push worker for {} stopping mid-retry", self.match_id);
                break;
            };
            self.progress.settled(Instant::now());
            if let Err(e) = self.responses.send(event) {
                error!("Failed to send push result: {e}");
                break;
            }
        }
    }

    /// Try `push` until it lands or attempts run out. `None` means shutdown
    /// was requested while waiting to retry.
    async fn deliver(&mut self, push: Push) -> Option<SyncEvent> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            let e = match self.send(&push).await {
                Ok(()) => {
                    debug!("pushed {push} for match {}", self.match_id);
                    return Some(SyncEvent::PushAcked { push });
                }
                Err(e) => e,
            };
            warn!("push {push} failed (attempt {attempt}): {e}");
            let _ = self.responses.send(SyncEvent::PushFailed {
                push: push.clone(),
                attempt,
                message: e.to_string(),
            });
            if attempt >= self.attempts {
                error!("giving up on {push} after {attempt} attempts");
                return Some(SyncEvent::PushAbandoned { push, message: e.to_string() });
            }

            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return None,
                _ = sleep(delay) => {}
            }
            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }

    async fn send(&self, push: &Push) -> ApiResult<()> {
        let id = self.match_id.as_str();
        match push {
            Push::Status { status } => self.backend.update_status(id, status).await,
            Push::Score { home, away } => self.backend.update_score(id, *home, *away).await,
            Push::Event(event) => self.backend.post_event(id, event).await,
            Push::External(event) => self.backend.post_external_event(id, event).await,
            Push::Period { patch, minutes } => {
                self.backend.update_period(id, *patch, *minutes).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn poll_sent_before_a_write_settled_stays_unsettled() {
        let progress = PushProgress::default();
        let before = Instant::now();
        assert!(!progress.is_unsettled(before));

        progress.queued();
        assert!(progress.is_unsettled(before));

        advance(Duration::from_secs(1)).await;
        progress.settled(Instant::now());
        assert_eq!(progress.outstanding(), 0);
        assert!(progress.is_unsettled(before), "poll went out before the write landed");

        advance(Duration::from_secs(1)).await;
        assert!(!progress.is_unsettled(Instant::now()));
    }

    #[test]
    fn dropped_writes_leave_the_count() {
        let progress = PushProgress::default();
        progress.queued();
        progress.dropped();
        progress.dropped();
        assert_eq!(progress.outstanding(), 0);
    }
}
