//! Per-sport scoring and lifecycle rules.
//!
//! A [`RuleSet`] is chosen once when a match is loaded and every event and
//! transition for that match goes through it. Rules are pure: they look at
//! the current [`Tally`] and say which events a request turns into, or why it
//! is rejected. Folding those events is left to the ledger.

mod basketball;
mod football;
mod volleyball;

pub use basketball::BasketballRules;
pub use football::FootballRules;
pub use volleyball::VolleyballRules;

use crate::error::{MatchError, MatchResult};
use crate::model::{
    ClockMark, EventKind, EventRequest, EventSource, MatchEvent, Player, Score, Side, Sport, Tally,
};
use crate::status::{MatchStatus, Transition};
use crate::timer::ClockSpec;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    /// Nominal football half length.
    pub half_minutes: u32,
    /// Basketball period length.
    pub quarter_secs: u32,
    pub timeouts_per_team: u32,
    pub set_points: u32,
    pub deciding_set_points: u32,
    pub sets_to_win: u32,
    /// Real time per football clock step (one match minute).
    pub football_tick: Duration,
    /// Real time per basketball clock step (one second).
    pub basketball_tick: Duration,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            half_minutes: 45,
            quarter_secs: 10 * 60,
            timeouts_per_team: 4,
            set_points: 25,
            deciding_set_points: 15,
            sets_to_win: 3,
            football_tick: Duration::from_secs(60),
            basketball_tick: Duration::from_secs(1),
        }
    }
}

/// An event the rules want appended, before the ledger stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub kind: EventKind,
    pub side: Option<Side>,
    pub player: Option<Player>,
}

impl Draft {
    pub fn from_request(request: &EventRequest) -> Self {
        let side = (!matches!(request.kind, EventKind::Status(_))).then_some(request.side);
        Self { kind: request.kind, side, player: request.player.clone() }
    }

    pub fn status(status: MatchStatus) -> Self {
        Self { kind: EventKind::Status(status), side: None, player: None }
    }
}

/// Ledger position and time the next events are stamped with.
#[derive(Debug, Clone, Copy)]
pub struct Stamp {
    pub next_id: u64,
    pub mark: ClockMark,
    pub at: DateTime<Utc>,
    pub source: EventSource,
}

pub trait SportRules: Send + Sync {
    fn sport(&self) -> Sport;

    fn config(&self) -> &RuleConfig;

    /// Counters before the first event.
    fn initial_tally(&self) -> Tally {
        Tally::new(self.sport(), 0)
    }

    /// Status reached by `action`, or why it is not allowed now.
    fn next_status(&self, tally: &Tally, action: Transition) -> MatchResult<MatchStatus>;

    /// Validate a non-status request and list the events it produces.
    fn plan_event(&self, tally: &Tally, request: &EventRequest) -> MatchResult<Vec<Draft>>;

    /// Scoring is over. The match may still have a closing transition left.
    fn is_terminal(&self, status: MatchStatus) -> bool;

    /// Clock to run while in `status`; `None` stops the clock.
    fn clock_for(&self, status: MatchStatus) -> Option<ClockSpec>;

    /// Transitions `endMatch` walks through from `status`.
    fn closing_path(&self, status: MatchStatus) -> MatchResult<Vec<Transition>>;

    /// Whether local events are de-duplicated by their key. Sports whose
    /// clock can legitimately repeat a mark (free throws on a stopped clock,
    /// rallies) opt out; canonical imports are always checked.
    fn dedups_local_events(&self) -> bool {
        false
    }

    /// Mark for an event made now, when the operator gave none.
    fn mark_for(&self, tally: &Tally, elapsed_secs: u32, face_secs: u32) -> ClockMark;

    /// Validate and list the events for any request, status changes included.
    fn plan(&self, tally: &Tally, request: &EventRequest) -> MatchResult<Vec<Draft>> {
        if let EventKind::Status(to) = request.kind {
            if request.source == EventSource::Canonical {
                return Err(MatchError::InvalidEvent("status is never imported".into()));
            }
            let allowed = Transition::ALL
                .iter()
                .any(|action| self.next_status(tally, *action).ok() == Some(to));
            if !allowed {
                return Err(MatchError::InvalidEvent(format!(
                    "{} cannot follow {}",
                    to.wire_name(),
                    tally.status.wire_name()
                )));
            }
            return Ok(vec![Draft::status(to)]);
        }
        check_playable(tally, request)?;
        self.plan_event(tally, request)
    }

    /// `applyEvent`: validate a request against `tally` and return the new
    /// tally with the stamped events. `tally` itself is left untouched.
    fn apply_event(
        &self,
        tally: &Tally,
        request: &EventRequest,
        stamp: Stamp,
    ) -> MatchResult<(Tally, Vec<MatchEvent>)> {
        let drafts = self.plan(tally, request)?;
        let mut next = tally.clone();
        let mut events = Vec::with_capacity(drafts.len());
        for (offset, draft) in drafts.into_iter().enumerate() {
            let mut event = MatchEvent {
                id: stamp.next_id + offset as u64,
                kind: draft.kind,
                side: draft.side,
                player: draft.player,
                period: next.period,
                mark: stamp.mark,
                timestamp: stamp.at,
                score: Score::default(),
                source: stamp.source,
            };
            next.fold(&event);
            event.score = next.score;
            events.push(event);
        }
        Ok((next, events))
    }
}

/// Checks shared by every sport: the match must be in play and player-bound
/// events must name their player.
fn check_playable(tally: &Tally, request: &EventRequest) -> MatchResult<()> {
    match request.source {
        EventSource::Local if !tally.status.is_running() => {
            return Err(MatchError::InvalidEvent(format!(
                "match is not in play ({})",
                tally.status.label()
            )));
        }
        EventSource::Canonical if tally.status == MatchStatus::NotStarted => {
            return Err(MatchError::InvalidEvent("match has not started".into()));
        }
        _ => {}
    }
    if request.kind.requires_player() && request.player.is_none() {
        return Err(MatchError::MissingPlayer);
    }
    Ok(())
}

fn unsupported(sport: Sport, request: &EventRequest) -> MatchError {
    MatchError::InvalidEvent(format!("{} is not a {} event", request.kind.tag(), sport.label()))
}

fn invalid_transition(tally: &Tally, action: Transition) -> MatchError {
    MatchError::InvalidTransition { from: tally.status, action }
}

/// Rule set for one match, picked from its sport.
#[derive(Debug, Clone)]
pub enum RuleSet {
    Football(FootballRules),
    Basketball(BasketballRules),
    Volleyball(VolleyballRules),
}

impl RuleSet {
    pub fn for_sport(sport: Sport, config: RuleConfig) -> Self {
        match sport {
            Sport::Football => RuleSet::Football(FootballRules::new(config)),
            Sport::Basketball => RuleSet::Basketball(BasketballRules::new(config)),
            Sport::Volleyball => RuleSet::Volleyball(VolleyballRules::new(config)),
        }
    }

    pub fn rules(&self) -> &dyn SportRules {
        match self {
            RuleSet::Football(r) => r,
            RuleSet::Basketball(r) => r,
            RuleSet::Volleyball(r) => r,
        }
    }

    /// Clock face for the snapshot.
    pub fn display_clock(&self, tally: &Tally, face_secs: u32, added_time: [u32; 2]) -> String {
        match self {
            RuleSet::Football(r) => r.display_minute(tally, face_secs, added_time),
            RuleSet::Basketball(_) => format!("{:02}:{:02}", face_secs / 60, face_secs % 60),
            RuleSet::Volleyball(_) => tally.status.label(),
        }
    }
}
