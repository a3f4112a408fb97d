use super::{Draft, RuleConfig, SportRules, invalid_transition, unsupported};
use crate::error::{MatchError, MatchResult};
use crate::model::{ClockMark, EventKind, EventRequest, Sport, Tally};
use crate::status::{MatchStatus, Transition};
use crate::timer::ClockSpec;

const QUARTERS: u8 = 4;

#[derive(Debug, Clone)]
pub struct BasketballRules {
    config: RuleConfig,
}

impl BasketballRules {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }
}

impl SportRules for BasketballRules {
    fn sport(&self) -> Sport {
        Sport::Basketball
    }

    fn config(&self) -> &RuleConfig {
        &self.config
    }

    fn initial_tally(&self) -> Tally {
        Tally::new(Sport::Basketball, self.config.timeouts_per_team)
    }

    fn next_status(&self, tally: &Tally, action: Transition) -> MatchResult<MatchStatus> {
        match (tally.status, action) {
            (MatchStatus::NotStarted, Transition::Start) => Ok(MatchStatus::Quarter(1)),
            (MatchStatus::Quarter(n), Transition::EndPeriod) if n < QUARTERS => {
                Ok(MatchStatus::Quarter(n + 1))
            }
            (MatchStatus::Quarter(QUARTERS), Transition::EndPeriod | Transition::Finish) => {
                Ok(MatchStatus::Finished)
            }
            _ => Err(invalid_transition(tally, action)),
        }
    }

    fn plan_event(&self, tally: &Tally, request: &EventRequest) -> MatchResult<Vec<Draft>> {
        match request.kind {
            EventKind::Point(value) if !(1..=3).contains(&value) => Err(MatchError::InvalidEvent(
                format!("a basket is worth 1, 2 or 3 points, not {value}"),
            )),
            EventKind::Timeout if *tally.timeouts_left.get(request.side) == 0 => {
                Err(MatchError::InvalidEvent(format!(
                    "{} team has no timeouts left",
                    request.side.label()
                )))
            }
            EventKind::Point(_) | EventKind::Foul | EventKind::Timeout | EventKind::ScoreSet(_) => {
                Ok(vec![Draft::from_request(request)])
            }
            _ => Err(unsupported(Sport::Basketball, request)),
        }
    }

    fn is_terminal(&self, status: MatchStatus) -> bool {
        status == MatchStatus::Finished
    }

    fn clock_for(&self, status: MatchStatus) -> Option<ClockSpec> {
        match status {
            MatchStatus::Quarter(_) => Some(ClockSpec::count_down(
                self.config.quarter_secs,
                self.config.basketball_tick,
            )),
            _ => None,
        }
    }

    fn closing_path(&self, status: MatchStatus) -> MatchResult<Vec<Transition>> {
        match status {
            MatchStatus::Quarter(QUARTERS) => Ok(vec![Transition::Finish]),
            from => Err(MatchError::InvalidTransition { from, action: Transition::Finish }),
        }
    }

    fn mark_for(&self, _tally: &Tally, elapsed_secs: u32, _face_secs: u32) -> ClockMark {
        ClockMark::Second(elapsed_secs)
    }
}
