use super::{Draft, RuleConfig, SportRules, invalid_transition, unsupported};
use crate::error::MatchResult;
use crate::model::{ClockMark, EventKind, EventRequest, Sport, Tally};
use crate::status::{MatchStatus, Transition};
use crate::timer::ClockSpec;

#[derive(Debug, Clone)]
pub struct FootballRules {
    config: RuleConfig,
}

impl FootballRules {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    /// Minute as shown on the scoreboard. Once the nominal end of the half
    /// has passed the display switches to `45+n'` / `90+n'`, followed by the
    /// announced added time for that half when there is one: `45+2' (+4)`.
    pub fn display_minute(&self, tally: &Tally, face_secs: u32, added_time: [u32; 2]) -> String {
        let (nominal, announced) = match tally.status {
            MatchStatus::FirstHalf => (self.config.half_minutes, added_time[0]),
            MatchStatus::SecondHalf => (self.config.half_minutes * 2, added_time[1]),
            MatchStatus::NotStarted => return "0'".into(),
            MatchStatus::HalfTime => return "HT".into(),
            _ => return "FT".into(),
        };
        let minute = face_secs / 60 + 1;
        if minute <= nominal {
            format!("{minute}'")
        } else if announced > 0 {
            format!("{nominal}+{}' (+{announced})", minute - nominal)
        } else {
            format!("{nominal}+{}'", minute - nominal)
        }
    }
}

impl SportRules for FootballRules {
    fn sport(&self) -> Sport {
        Sport::Football
    }

    fn config(&self) -> &RuleConfig {
        &self.config
    }

    fn next_status(&self, tally: &Tally, action: Transition) -> MatchResult<MatchStatus> {
        use MatchStatus::*;
        match (tally.status, action) {
            (NotStarted, Transition::Start) => Ok(FirstHalf),
            (FirstHalf, Transition::EndPeriod) => Ok(HalfTime),
            (HalfTime, Transition::Resume) => Ok(SecondHalf),
            (SecondHalf, Transition::EndPeriod) => Ok(FullTime),
            (FullTime, Transition::Finish) => Ok(Ended),
            _ => Err(invalid_transition(tally, action)),
        }
    }

    fn plan_event(&self, _tally: &Tally, request: &EventRequest) -> MatchResult<Vec<Draft>> {
        match request.kind {
            // Cards are only recorded; suspensions are handled outside the engine.
            EventKind::Goal | EventKind::Card(_) | EventKind::ScoreSet(_) => {
                Ok(vec![Draft::from_request(request)])
            }
            _ => Err(unsupported(Sport::Football, request)),
        }
    }

    fn is_terminal(&self, status: MatchStatus) -> bool {
        matches!(status, MatchStatus::FullTime | MatchStatus::Ended)
    }

    fn clock_for(&self, status: MatchStatus) -> Option<ClockSpec> {
        let tick = self.config.football_tick;
        match status {
            MatchStatus::FirstHalf => Some(ClockSpec::count_up(0, 60, tick)),
            MatchStatus::SecondHalf => {
                Some(ClockSpec::count_up(self.config.half_minutes * 60, 60, tick))
            }
            _ => None,
        }
    }

    fn closing_path(&self, status: MatchStatus) -> MatchResult<Vec<Transition>> {
        match status {
            MatchStatus::SecondHalf => Ok(vec![Transition::EndPeriod, Transition::Finish]),
            MatchStatus::FullTime => Ok(vec![Transition::Finish]),
            from => Err(crate::error::MatchError::InvalidTransition {
                from,
                action: Transition::Finish,
            }),
        }
    }

    fn dedups_local_events(&self) -> bool {
        true
    }

    fn mark_for(&self, _tally: &Tally, _elapsed_secs: u32, face_secs: u32) -> ClockMark {
        ClockMark::Minute(face_secs / 60 + 1)
    }
}
