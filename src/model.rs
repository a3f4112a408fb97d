use crate::error::{MatchError, MatchResult};
use crate::status::MatchStatus;
use chrono::{DateTime, Utc};
use scoreboard_api::{LiveMatch, Team};
use serde::Serialize;
use std::fmt;

pub use scoreboard_api::{CardColor, Player, Side, Sport};

// ---------------------------------------------------------------------------
// Per-side counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct PerSide<T> {
    pub home: T,
    pub away: T,
}

impl<T> PerSide<T> {
    pub fn new(home: T, away: T) -> Self {
        Self { home, away }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Home => &mut self.home,
            Side::Away => &mut self.away,
        }
    }
}

impl<T: Clone> PerSide<T> {
    pub fn both(value: T) -> Self {
        Self { home: value.clone(), away: value }
    }
}

pub type Score = PerSide<u32>;

impl Score {
    /// Side ahead on points, if any.
    pub fn leader(&self) -> Option<Side> {
        match self.home.cmp(&self.away) {
            std::cmp::Ordering::Greater => Some(Side::Home),
            std::cmp::Ordering::Less => Some(Side::Away),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn lead(&self) -> u32 {
        self.home.abs_diff(self.away)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.home, self.away)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Goal,
    Card(CardColor),
    Point(u32),
    Foul,
    Timeout,
    /// Final score of the set that was just won.
    SetWin { set: u8, home: u32, away: u32 },
    Status(MatchStatus),
    /// Manual score correction or canonical overwrite for one side.
    ScoreSet(u32),
}

impl EventKind {
    pub fn tag(&self) -> EventTag {
        match self {
            EventKind::Goal => EventTag::Goal,
            EventKind::Card(_) => EventTag::Card,
            EventKind::Point(_) => EventTag::Point,
            EventKind::Foul => EventTag::Foul,
            EventKind::Timeout => EventTag::Timeout,
            EventKind::SetWin { .. } => EventTag::SetWin,
            EventKind::Status(_) => EventTag::Status,
            EventKind::ScoreSet(_) => EventTag::ScoreSet,
        }
    }

    /// Events that name the player responsible and so go through the
    /// two-phase pending flow.
    pub fn requires_player(&self) -> bool {
        matches!(
            self,
            EventKind::Goal | EventKind::Card(_) | EventKind::Point(_) | EventKind::Foul
        )
    }

    pub fn affects_score(&self) -> bool {
        matches!(
            self,
            EventKind::Goal
                | EventKind::Point(_)
                | EventKind::SetWin { .. }
                | EventKind::ScoreSet(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventTag {
    Goal,
    Card,
    Point,
    Foul,
    Timeout,
    SetWin,
    Status,
    ScoreSet,
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventTag::Goal => "GOAL",
            EventTag::Card => "CARD",
            EventTag::Point => "POINT",
            EventTag::Foul => "FOUL",
            EventTag::Timeout => "TIMEOUT",
            EventTag::SetWin => "SET_WIN",
            EventTag::Status => "STATUS",
            EventTag::ScoreSet => "SCORE_SET",
        };
        f.write_str(s)
    }
}

/// Where on the match clock an event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ClockMark {
    /// Football match minute, counted from kick-off (second half starts at 46).
    Minute(u32),
    /// Basketball seconds played in the current quarter.
    Second(u32),
    /// Volleyball rally number within the current set.
    Rally(u32),
}

impl ClockMark {
    /// The closest thing the sport has to a match minute; sent to the backend.
    pub fn minute(&self) -> u32 {
        match self {
            ClockMark::Minute(m) => *m,
            ClockMark::Second(s) => s / 60,
            ClockMark::Rally(r) => *r,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum EventSource {
    #[default]
    Local,
    /// Imported from the backend's canonical snapshot.
    Canonical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchEvent {
    /// Position in the ledger, starting at 1.
    pub id: u64,
    pub kind: EventKind,
    /// `None` for status changes.
    pub side: Option<Side>,
    pub player: Option<Player>,
    pub period: u8,
    pub mark: ClockMark,
    pub timestamp: DateTime<Utc>,
    /// Score after this event was applied.
    pub score: Score,
    pub source: EventSource,
}

impl MatchEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            tag: self.kind.tag(),
            side: self.side,
            player_id: self.player.as_ref().map(|p| p.id.clone()),
            period: Some(self.period),
            mark: self.mark,
        }
    }
}

/// Identity used to spot the same event arriving twice, e.g. from a retried
/// submission or from both the operator and the backend.
///
/// Football marks repeat across halves: first-half stoppage time and the
/// start of the second half both stamp minute 46. The period tells them
/// apart. The backend's event feed carries no period, so keys built from it
/// leave `period` empty and match either half.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub tag: EventTag,
    pub side: Option<Side>,
    pub player_id: Option<String>,
    pub period: Option<u8>,
    pub mark: ClockMark,
}

impl EventKey {
    pub fn without_period(mut self) -> Self {
        self.period = None;
        self
    }

    /// Same event, treating a missing period on either side as a wildcard.
    pub fn matches(&self, other: &EventKey) -> bool {
        let same_period = match (self.period, other.period) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        same_period
            && self.tag == other.tag
            && self.side == other.side
            && self.player_id == other.player_id
            && self.mark == other.mark
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)?;
        if let Some(side) = self.side {
            write!(f, " {}", side.label())?;
        }
        if let Some(player) = &self.player_id {
            write!(f, " by {player}")?;
        }
        write!(f, " at {}", self.mark.minute())?;
        if let Some(period) = self.period {
            write!(f, " in period {period}")?;
        }
        Ok(())
    }
}

/// A request to record something in the ledger. Built by the operator, or
/// by reconciliation for canonical imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    pub kind: EventKind,
    pub side: Side,
    pub player: Option<Player>,
    /// Explicit clock mark; when absent the current clock is used.
    pub mark: Option<ClockMark>,
    pub source: EventSource,
}

impl EventRequest {
    pub fn new(kind: EventKind, side: Side) -> Self {
        Self { kind, side, player: None, mark: None, source: EventSource::Local }
    }

    pub fn status(status: MatchStatus) -> Self {
        Self::new(EventKind::Status(status), Side::Home)
    }

    pub fn with_player(mut self, player: Player) -> Self {
        self.player = Some(player);
        self
    }

    pub fn at(mut self, mark: ClockMark) -> Self {
        self.mark = Some(mark);
        self
    }

    pub fn canonical(mut self) -> Self {
        self.source = EventSource::Canonical;
        self
    }
}

// ---------------------------------------------------------------------------
// Derived counters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardRecord {
    pub side: Side,
    pub player_id: Option<String>,
    pub color: CardColor,
    pub minute: u32,
}

/// Everything derived from the ledger. Only ever changed by [`Tally::fold`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub sport: Sport,
    pub status: MatchStatus,
    pub period: u8,
    pub score: Score,
    pub fouls: PerSide<u32>,
    pub timeouts_left: PerSide<u32>,
    pub sets_won: PerSide<u32>,
    /// Final scores of completed sets, oldest first.
    pub set_scores: Vec<Score>,
    pub cards: Vec<CardRecord>,
    pub serving: Option<Side>,
    /// Latest clock mark seen in the current period.
    pub last_mark: Option<ClockMark>,
}

impl Tally {
    pub fn new(sport: Sport, timeouts_per_team: u32) -> Self {
        Self {
            sport,
            status: MatchStatus::NotStarted,
            period: 0,
            score: Score::default(),
            fouls: PerSide::default(),
            timeouts_left: PerSide::both(timeouts_per_team),
            sets_won: PerSide::default(),
            set_scores: Vec::new(),
            cards: Vec::new(),
            serving: None,
            last_mark: None,
        }
    }

    /// Apply one committed event.
    pub fn fold(&mut self, event: &MatchEvent) {
        let side = event.side.unwrap_or(Side::Home);
        match event.kind {
            EventKind::Goal => *self.score.get_mut(side) += 1,
            EventKind::Point(value) => {
                *self.score.get_mut(side) += value;
                if self.sport == Sport::Volleyball {
                    self.serving = Some(side);
                }
            }
            EventKind::Card(color) => self.cards.push(CardRecord {
                side,
                player_id: event.player.as_ref().map(|p| p.id.clone()),
                color,
                minute: event.mark.minute(),
            }),
            EventKind::Foul => *self.fouls.get_mut(side) += 1,
            EventKind::Timeout => {
                let left = self.timeouts_left.get_mut(side);
                *left = left.saturating_sub(1);
            }
            EventKind::SetWin { home, away, .. } => {
                self.set_scores.push(Score::new(home, away));
                *self.sets_won.get_mut(side) += 1;
                self.score = Score::default();
            }
            EventKind::Status(status) => {
                self.status = status;
                if let Some(period) = status.period()
                    && period != self.period
                {
                    self.period = period;
                    self.last_mark = None;
                }
                return;
            }
            EventKind::ScoreSet(value) => *self.score.get_mut(side) = value,
        }
        self.last_mark = Some(self.last_mark.map_or(event.mark, |m| m.max(event.mark)));
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamSheet {
    pub id: String,
    pub name: String,
    /// Ordered roster, fixed for the match.
    pub roster: Vec<Player>,
    /// The backend tracks this side's events on its own.
    pub externally_tracked: bool,
}

impl TeamSheet {
    pub fn find_player(&self, id_or_name: &str) -> Option<&Player> {
        self.roster
            .iter()
            .find(|p| p.id == id_or_name)
            .or_else(|| self.roster.iter().find(|p| p.name.eq_ignore_ascii_case(id_or_name)))
    }

    pub fn has_player(&self, player: &Player) -> bool {
        self.roster.iter().any(|p| p.id == player.id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSetup {
    pub id: String,
    pub sport: Sport,
    pub home: TeamSheet,
    pub away: TeamSheet,
    pub venue: Option<String>,
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Football added time already announced on the backend, per half.
    pub added_time: [u32; 2],
}

impl MatchSetup {
    /// Build from the backend snapshot and fetched rosters. A side without a
    /// team record is treated as externally tracked.
    pub fn from_live(live: &LiveMatch, home_roster: Vec<Player>, away_roster: Vec<Player>) -> Self {
        let sheet = |team: &Team, roster: Vec<Player>| TeamSheet {
            id: team.id.clone(),
            name: team.name.clone(),
            externally_tracked: team.id.is_empty(),
            roster,
        };
        Self {
            id: live.id.clone(),
            sport: live.sport,
            home: sheet(&live.home, home_roster),
            away: sheet(&live.away, away_roster),
            venue: live.venue.clone(),
            scheduled_start: live.start_time,
            added_time: match live.sport {
                Sport::Football => [
                    live.periods.first_added_time.unwrap_or(0),
                    live.periods.second_added_time.unwrap_or(0),
                ],
                _ => [0, 0],
            },
        }
    }

    pub fn team(&self, side: Side) -> &TeamSheet {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    pub fn external_side(&self) -> Option<Side> {
        [Side::Home, Side::Away]
            .into_iter()
            .find(|s| self.team(*s).externally_tracked)
    }

    /// Side whose team carries this display name. Plain string equality.
    pub fn side_named(&self, team_name: &str) -> Option<Side> {
        [Side::Home, Side::Away]
            .into_iter()
            .find(|s| self.team(*s).name == team_name)
    }

    /// Everything the match needs before it can start.
    pub fn validate(&self) -> MatchResult<()> {
        if self.id.is_empty() {
            return Err(MatchError::SetupIncomplete("match has no id".into()));
        }
        for side in [Side::Home, Side::Away] {
            let team = self.team(side);
            if team.name.is_empty() {
                return Err(MatchError::SetupIncomplete(format!(
                    "{} team has no name",
                    side.label()
                )));
            }
            if !team.externally_tracked && team.roster.is_empty() {
                return Err(MatchError::SetupIncomplete(format!(
                    "{} roster is empty",
                    side.label()
                )));
            }
        }
        Ok(())
    }
}
