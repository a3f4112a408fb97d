//! Keeping a match in step with the backend: pushing committed events out and
//! polling the canonical snapshot back in.

pub mod backend;
pub mod messages;
pub mod network;
pub mod reconcile;
pub mod refresher;

pub use backend::{LiveMatchBackend, load_setup};
pub use messages::{Push, SyncEvent};
pub use reconcile::{Reconciliation, SideVerdict, reconcile};
pub use refresher::ListWatcher;

use crate::model::{EventKind, EventSource, MatchEvent, MatchSetup};
use crate::settings::SyncSettings;
use log::{debug, warn};
use network::{PushProgress, PushWorker};
use refresher::ScoreboardRefresher;
use scoreboard_api::{EventPost, EventType, ExternalEventKind, ExternalEventPost};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Background sync for one match. Dropping it without [`SyncClient::shutdown`]
/// leaves the tasks to notice the closed channels on their own.
pub struct SyncClient {
    match_id: String,
    pushes: mpsc::UnboundedSender<Push>,
    progress: Arc<PushProgress>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncClient {
    pub fn spawn(
        backend: Arc<dyn LiveMatchBackend>,
        match_id: &str,
        settings: &SyncSettings,
        events: mpsc::UnboundedSender<SyncEvent>,
    ) -> Self {
        let (pushes, requests) = mpsc::unbounded_channel();
        let (shutdown, stop) = watch::channel(false);
        let progress = Arc::new(PushProgress::default());

        let worker = PushWorker::new(
            backend.clone(),
            match_id.to_owned(),
            requests,
            events.clone(),
            progress.clone(),
            stop.clone(),
            settings,
        );
        let refresher = ScoreboardRefresher::new(
            backend,
            match_id.to_owned(),
            events,
            stop,
            settings.scoreboard_poll,
        );

        Self {
            match_id: match_id.to_owned(),
            pushes,
            progress,
            shutdown,
            tasks: vec![tokio::spawn(worker.run()), tokio::spawn(refresher.run())],
        }
    }

    /// Queue a write. Never waits on the network.
    pub fn push(&self, push: Push) {
        self.progress.queued();
        if let Err(e) = self.pushes.send(push) {
            self.progress.dropped();
            warn!("push for match {} dropped, sync is stopped: {}", self.match_id, e.0);
        }
    }

    /// Writes queued or being retried.
    pub fn outstanding(&self) -> usize {
        self.progress.outstanding()
    }

    /// Whether a poll issued at `requested_at` may not have seen our writes
    /// yet.
    pub fn is_unsettled(&self, requested_at: Instant) -> bool {
        self.progress.is_unsettled(requested_at)
    }

    /// Stop pushing and polling, and wait until both tasks have exited.
    /// Writes still queued are dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("sync task for match {} ended abnormally: {e}", self.match_id);
            }
        }
        debug!("sync for match {} stopped", self.match_id);
    }
}

/// Backend writes for a batch of committed events. Imported events are
/// already on the backend and produce nothing.
pub fn push_plan(events: &[MatchEvent], setup: &MatchSetup) -> Vec<Push> {
    let mut plan = Vec::new();
    let mut score = None;

    for event in events.iter().filter(|e| e.source == EventSource::Local) {
        let side = event.side;
        let external = side.is_some_and(|s| setup.team(s).externally_tracked);
        let minute = event.mark.minute();
        let player_id = event.player.as_ref().map(|p| p.id.clone());

        let post = |event_type, detail: Option<String>| {
            Push::Event(EventPost { event_type, player_id: player_id.clone(), minute, detail })
        };
        let external_post = |kind| {
            Push::External(ExternalEventPost {
                kind,
                player_name: event.player.as_ref().map(|p| p.name.clone()).unwrap_or_default(),
                minute,
            })
        };

        match event.kind {
            EventKind::Status(status) => plan.push(Push::Status { status: status.wire_name() }),
            EventKind::Goal if external => plan.push(external_post(ExternalEventKind::Goal)),
            EventKind::Card(color) if external => {
                plan.push(external_post(ExternalEventKind::Card(color)))
            }
            EventKind::Goal => plan.push(post(EventType::Goal, None)),
            EventKind::Card(color) => {
                plan.push(post(EventType::Card, Some(color.wire_name().into())))
            }
            EventKind::Point(value) => plan.push(post(EventType::Point, Some(value.to_string()))),
            EventKind::Foul => plan.push(post(EventType::Foul, None)),
            EventKind::Timeout => plan.push(post(EventType::Timeout, None)),
            EventKind::SetWin { home, away, .. } => {
                plan.push(post(EventType::SetWin, Some(format!("{home}-{away}"))))
            }
            EventKind::ScoreSet(_) => {}
        }

        // The backend keeps the externally tracked side's score itself.
        if event.kind.affects_score() && !external {
            score = Some(event.score);
        }
        if matches!(event.kind, EventKind::Status(_)) && score.is_some() {
            score = Some(event.score);
        }
    }

    if let Some(score) = score {
        plan.push(Push::Score { home: score.home, away: score.away });
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardColor, ClockMark, Player, Score, Side, TeamSheet};
    use crate::status::MatchStatus;
    use chrono::Utc;
    use scoreboard_api::Sport;

    fn setup() -> MatchSetup {
        MatchSetup {
            id: "7".into(),
            sport: Sport::Football,
            home: TeamSheet {
                id: "t1".into(),
                name: "Harbor".into(),
                roster: vec![],
                externally_tracked: false,
            },
            away: TeamSheet {
                id: String::new(),
                name: "Visitors".into(),
                roster: vec![],
                externally_tracked: true,
            },
            ..Default::default()
        }
    }

    fn event(kind: EventKind, side: Option<Side>, score: Score) -> MatchEvent {
        MatchEvent {
            id: 1,
            kind,
            side,
            player: side.map(|_| Player {
                id: "9".into(),
                name: "Nine".into(),
                position: String::new(),
            }),
            period: 1,
            mark: ClockMark::Minute(12),
            timestamp: Utc::now(),
            score,
            source: EventSource::Local,
        }
    }

    #[test]
    fn local_goal_posts_event_then_score() {
        let goal = event(EventKind::Goal, Some(Side::Home), Score::new(1, 0));
        let plan = push_plan(&[goal], &setup());
        assert_eq!(plan.len(), 2);
        assert!(matches!(
            &plan[0],
            Push::Event(EventPost {
                event_type: EventType::Goal,
                minute: 12,
                player_id: Some(id),
                ..
            }) if id == "9"
        ));
        assert_eq!(plan[1], Push::Score { home: 1, away: 0 });
    }

    #[test]
    fn external_side_goes_to_its_own_endpoint() {
        let card = event(EventKind::Card(CardColor::Red), Some(Side::Away), Score::default());
        let goal = event(EventKind::Goal, Some(Side::Away), Score::new(0, 1));
        let plan = push_plan(&[card, goal], &setup());
        assert_eq!(plan.len(), 2);
        assert!(matches!(
            &plan[0],
            Push::External(ExternalEventPost { kind: ExternalEventKind::Card(CardColor::Red), .. })
        ));
        assert!(matches!(&plan[1], Push::External(p) if p.player_name == "Nine"));
    }

    #[test]
    fn imported_events_are_not_pushed_back() {
        let mut imported = event(EventKind::Goal, Some(Side::Away), Score::new(0, 1));
        imported.source = EventSource::Canonical;
        assert!(push_plan(&[imported], &setup()).is_empty());
    }

    #[test]
    fn status_changes_patch_status() {
        let half_time = event(EventKind::Status(MatchStatus::HalfTime), None, Score::new(1, 1));
        let plan = push_plan(&[half_time], &setup());
        assert_eq!(plan, vec![Push::Status { status: "HALF_TIME".into() }]);
    }

    #[test]
    fn manual_score_set_is_pushed_as_score_only() {
        let correction = event(EventKind::ScoreSet(4), Some(Side::Home), Score::new(4, 0));
        let plan = push_plan(&[correction], &setup());
        assert_eq!(plan, vec![Push::Score { home: 4, away: 0 }]);
    }
}
