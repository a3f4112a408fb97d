use crate::error::{MatchError, MatchResult};
use crate::ledger::EventLedger;
use crate::model::{
    CardRecord, ClockMark, EventKind, EventRequest, EventSource, MatchEvent, MatchSetup, PerSide,
    Player, Score, Side, Sport, Tally,
};
use crate::pending::PendingView;
use crate::rules::{RuleConfig, RuleSet, SportRules};
use crate::status::{MatchStatus, Transition};
use crate::timer::{ClockReading, TimerEvent, TimerService};
use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use tokio::sync::mpsc;

/// What the operator sees: one consistent view of a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchSnapshot {
    pub match_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub status: MatchStatus,
    pub status_label: String,
    pub period: u8,
    pub score: Score,
    pub set_scores: Vec<Score>,
    pub sets_won: PerSide<u32>,
    pub fouls: PerSide<u32>,
    pub timeouts_left: PerSide<u32>,
    pub cards: Vec<CardRecord>,
    pub serving: Option<Side>,
    pub clock: String,
    pub clock_running: bool,
    pub period_expired: bool,
    pub added_time: [u32; 2],
    pub event_count: usize,
    pub last_event: Option<MatchEvent>,
    pub pending: Option<PendingView>,
    pub pushes_outstanding: usize,
}

/// Lifecycle and clock for one match. Owns the ledger and the timer; every
/// change to either goes through here.
pub struct MatchStateMachine {
    setup: MatchSetup,
    rules: RuleSet,
    ledger: EventLedger,
    timer: TimerService,
    added_time: [u32; 2],
    period_expired: bool,
}

impl MatchStateMachine {
    pub fn new(
        setup: MatchSetup,
        config: RuleConfig,
        timer_events: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let rules = RuleSet::for_sport(setup.sport, config);
        let ledger = EventLedger::new(rules.rules());
        Self {
            added_time: setup.added_time,
            setup,
            rules,
            ledger,
            timer: TimerService::new(timer_events),
            period_expired: false,
        }
    }

    pub fn setup(&self) -> &MatchSetup {
        &self.setup
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    pub fn tally(&self) -> &Tally {
        self.ledger.tally()
    }

    pub fn status(&self) -> MatchStatus {
        self.ledger.tally().status
    }

    pub fn rules(&self) -> &dyn SportRules {
        self.rules.rules()
    }

    pub fn clock(&self) -> ClockReading {
        self.timer.reading()
    }

    /// Apply a lifecycle action. The status change is committed as a ledger
    /// event and the clock follows the new status.
    pub async fn transition(&mut self, action: Transition) -> MatchResult<Vec<MatchEvent>> {
        let rules = self.rules.rules();
        let to = rules.next_status(self.ledger.tally(), action)?;
        if action == Transition::Start {
            self.setup.validate()?;
        }
        let mark = self.current_mark();
        let events = self.ledger.commit(rules, &EventRequest::status(to), mark, Utc::now())?;
        info!("match {}: {action} -> {}", self.setup.id, to.wire_name());
        self.sync_timer().await;
        Ok(events)
    }

    /// Move on from the current period: leave a break, or close a running
    /// period.
    pub async fn advance_period(&mut self) -> MatchResult<Vec<MatchEvent>> {
        let action = match self.status() {
            MatchStatus::NotStarted => Transition::Start,
            MatchStatus::HalfTime => Transition::Resume,
            _ => Transition::EndPeriod,
        };
        self.transition(action).await
    }

    /// Walk every remaining step to the terminal status. Only legal from the
    /// final period or later.
    pub async fn end_match(&mut self) -> MatchResult<Vec<MatchEvent>> {
        let path = self.rules.rules().closing_path(self.status())?;
        let mut events = Vec::new();
        for action in path {
            events.extend(self.transition(action).await?);
        }
        Ok(events)
    }

    /// Commit a scoring or team event. A missing mark is taken from the clock.
    pub async fn record(&mut self, request: EventRequest) -> MatchResult<Vec<MatchEvent>> {
        if let EventKind::Status(_) = request.kind {
            return Err(MatchError::InvalidEvent("use a transition to change status".into()));
        }
        if request.source == EventSource::Local
            && let Some(player) = &request.player
        {
            let team = self.setup.team(request.side);
            if !team.externally_tracked && !team.has_player(player) {
                return Err(MatchError::InvalidEvent(format!(
                    "{} is not on the {} roster",
                    player.name,
                    team.name
                )));
            }
        }

        let mark = request.mark.unwrap_or_else(|| self.current_mark());
        let events = self.ledger.commit(self.rules.rules(), &request, mark, Utc::now())?;
        if events.iter().any(|e| matches!(e.kind, EventKind::Status(_))) {
            info!("match {} moved to {}", self.setup.id, self.status().wire_name());
            self.sync_timer().await;
        }
        Ok(events)
    }

    /// Resolve a player reference typed by the operator. Externally tracked
    /// sides have no roster, so any name is taken as given.
    pub fn find_player(&self, side: Side, id_or_name: &str) -> MatchResult<Player> {
        let team = self.setup.team(side);
        if team.externally_tracked {
            return Ok(Player::external(id_or_name.trim()));
        }
        team.find_player(id_or_name.trim()).cloned().ok_or_else(|| {
            MatchError::InvalidEvent(format!(
                "no player '{id_or_name}' on the {} roster",
                team.name
            ))
        })
    }

    /// Operator-entered added time for a football half.
    pub fn set_added_time(&mut self, half: u8, minutes: u32) -> MatchResult<()> {
        if self.setup.sport != Sport::Football {
            return Err(MatchError::InvalidEvent("added time is a football setting".into()));
        }
        let slot = match half {
            1 => &mut self.added_time[0],
            2 => &mut self.added_time[1],
            _ => return Err(MatchError::InvalidEvent(format!("there is no half {half}"))),
        };
        *slot = minutes;
        debug!("match {}: added time for half {half} set to {minutes}", self.setup.id);
        Ok(())
    }

    pub fn added_time(&self) -> [u32; 2] {
        self.added_time
    }

    /// Returns true when the event changed what the snapshot shows.
    pub fn on_timer(&mut self, event: TimerEvent) -> bool {
        let current = self.timer.generation();
        match event {
            TimerEvent::Tick(reading) => reading.generation == current,
            TimerEvent::PeriodExpired { generation } if generation == current => {
                info!("match {}: {} expired", self.setup.id, self.status().label());
                self.period_expired = true;
                true
            }
            TimerEvent::PeriodExpired { .. } => false,
        }
    }

    pub async fn pause_clock(&mut self) {
        self.timer.pause().await;
    }

    pub fn resume_clock(&mut self) -> bool {
        self.status().is_running() && self.timer.resume()
    }

    /// Clock mark for something happening now.
    pub fn current_mark(&self) -> ClockMark {
        let reading = self.timer.reading();
        self.rules
            .rules()
            .mark_for(self.ledger.tally(), reading.elapsed_secs, reading.face_secs)
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        let tally = self.ledger.tally();
        let reading = self.timer.reading();
        MatchSnapshot {
            match_id: self.setup.id.clone(),
            sport: self.setup.sport,
            home_team: self.setup.home.name.clone(),
            away_team: self.setup.away.name.clone(),
            status: tally.status,
            status_label: tally.status.label(),
            period: tally.period,
            score: tally.score,
            set_scores: tally.set_scores.clone(),
            sets_won: tally.sets_won,
            fouls: tally.fouls,
            timeouts_left: tally.timeouts_left,
            cards: tally.cards.clone(),
            serving: tally.serving,
            clock: self.rules.display_clock(tally, reading.face_secs, self.added_time),
            clock_running: reading.running,
            period_expired: self.period_expired,
            added_time: self.added_time,
            event_count: self.ledger.len(),
            last_event: self.ledger.last().cloned(),
            pending: None,
            pushes_outstanding: 0,
        }
    }

    /// Stop the clock for good.
    pub async fn shutdown(&mut self) {
        self.timer.stop().await;
    }

    async fn sync_timer(&mut self) {
        self.period_expired = false;
        match self.rules.rules().clock_for(self.status()) {
            Some(spec) => self.timer.start(spec).await,
            None => self.timer.stop().await,
        }
    }
}
