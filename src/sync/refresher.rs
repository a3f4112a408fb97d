use super::backend::LiveMatchBackend;
use super::messages::SyncEvent;
use log::{debug, error, warn};
use scoreboard_api::LiveMatch;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};

/// Shortest poll period; `interval` cannot run on zero.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Polls the canonical snapshot of one match for an open scoreboard.
pub struct ScoreboardRefresher {
    backend: Arc<dyn LiveMatchBackend>,
    match_id: String,
    responses: mpsc::UnboundedSender<SyncEvent>,
    shutdown: watch::Receiver<bool>,
    period: Duration,
}

impl ScoreboardRefresher {
    pub fn new(
        backend: Arc<dyn LiveMatchBackend>,
        match_id: String,
        responses: mpsc::UnboundedSender<SyncEvent>,
        shutdown: watch::Receiver<bool>,
        period: Duration,
    ) -> Self {
        Self { backend, match_id, responses, shutdown, period }
    }

    pub async fn run(mut self) {
        let mut ticks = interval(self.period.max(MIN_PERIOD));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The match was just loaded; skip the immediate first tick.
        ticks.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                _ = ticks.tick() => {}
            }

            let requested_at = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                result = self.backend.live_match(&self.match_id) => result,
            };
            let event = match result {
                Ok(snapshot) => SyncEvent::Polled { snapshot, requested_at },
                Err(e) => {
                    warn!("poll for match {} failed: {e}", self.match_id);
                    SyncEvent::PollFailed { message: e.to_string() }
                }
            };
            if let Err(e) = self.responses.send(event) {
                error!("Failed to send poll result: {e}");
                break;
            }
        }
        debug!("scoreboard refresher for {} stopped", self.match_id);
    }
}

/// Keeps a list of live matches fresh for list views. The latest good list
/// stays published when a poll fails.
pub struct ListWatcher {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ListWatcher {
    pub fn spawn(
        backend: Arc<dyn LiveMatchBackend>,
        period: Duration,
    ) -> (Self, watch::Receiver<Vec<LiveMatch>>) {
        let (shutdown, mut stop) = watch::channel(false);
        let (publish, matches) = watch::channel(Vec::new());

        let handle = tokio::spawn(async move {
            let mut ticks = interval(period.max(MIN_PERIOD));
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    _ = ticks.tick() => {}
                }
                let result = tokio::select! {
                    biased;
                    _ = stop.changed() => break,
                    result = backend.live_matches() => result,
                };
                match result {
                    Ok(list) => {
                        debug!("match list refreshed ({} matches)", list.len());
                        if publish.send(list).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("match list refresh failed: {e}"),
                }
            }
        });

        (Self { shutdown, handle }, matches)
    }

    /// Stop polling and wait for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            warn!("match list watcher ended abnormally: {e}");
        }
    }
}
