use super::{Draft, RuleConfig, SportRules, invalid_transition, unsupported};
use crate::error::{MatchError, MatchResult};
use crate::model::{ClockMark, EventKind, EventRequest, Score, Side, Sport, Tally};
use crate::status::{MatchStatus, Transition};
use crate::timer::ClockSpec;

#[derive(Debug, Clone)]
pub struct VolleyballRules {
    config: RuleConfig,
}

impl VolleyballRules {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    fn deciding_set(&self) -> u8 {
        (self.config.sets_to_win * 2).saturating_sub(1) as u8
    }

    /// Points needed to take set `set`.
    pub fn target(&self, set: u8) -> u32 {
        if set >= self.deciding_set() {
            self.config.deciding_set_points
        } else {
            self.config.set_points
        }
    }

    /// Side that has taken set `set` with this score, if any.
    pub fn set_winner(&self, set: u8, score: &Score) -> Option<Side> {
        let leader = score.leader()?;
        (*score.get(leader) >= self.target(set) && score.lead() >= 2).then_some(leader)
    }

    fn decided(&self, tally: &Tally) -> bool {
        tally.sets_won.home >= self.config.sets_to_win
            || tally.sets_won.away >= self.config.sets_to_win
    }
}

impl SportRules for VolleyballRules {
    fn sport(&self) -> Sport {
        Sport::Volleyball
    }

    fn config(&self) -> &RuleConfig {
        &self.config
    }

    fn next_status(&self, tally: &Tally, action: Transition) -> MatchResult<MatchStatus> {
        match (tally.status, action) {
            (MatchStatus::NotStarted, Transition::Start) => Ok(MatchStatus::Set(1)),
            (MatchStatus::Set(_), Transition::Finish) if self.decided(tally) => {
                Ok(MatchStatus::Finished)
            }
            _ => Err(invalid_transition(tally, action)),
        }
    }

    fn plan_event(&self, tally: &Tally, request: &EventRequest) -> MatchResult<Vec<Draft>> {
        match request.kind {
            EventKind::Point(1) => {}
            EventKind::Point(value) => {
                return Err(MatchError::InvalidEvent(format!(
                    "a rally is worth one point, not {value}"
                )));
            }
            EventKind::ScoreSet(_) => return Ok(vec![Draft::from_request(request)]),
            _ => return Err(unsupported(Sport::Volleyball, request)),
        }

        let MatchStatus::Set(set) = tally.status else {
            return Err(invalid_transition(tally, Transition::EndPeriod));
        };
        let mut drafts = vec![Draft::from_request(request)];
        let mut score = tally.score;
        *score.get_mut(request.side) += 1;

        if let Some(winner) = self.set_winner(set, &score) {
            drafts.push(Draft {
                kind: EventKind::SetWin { set, home: score.home, away: score.away },
                side: Some(winner),
                player: None,
            });
            let won = *tally.sets_won.get(winner) + 1;
            let next = if won >= self.config.sets_to_win {
                MatchStatus::Finished
            } else {
                MatchStatus::Set(set + 1)
            };
            drafts.push(Draft::status(next));
        }
        Ok(drafts)
    }

    fn is_terminal(&self, status: MatchStatus) -> bool {
        status == MatchStatus::Finished
    }

    fn clock_for(&self, _status: MatchStatus) -> Option<ClockSpec> {
        None
    }

    fn closing_path(&self, status: MatchStatus) -> MatchResult<Vec<Transition>> {
        Err(MatchError::InvalidTransition { from: status, action: Transition::Finish })
    }

    fn mark_for(&self, tally: &Tally, _elapsed_secs: u32, _face_secs: u32) -> ClockMark {
        ClockMark::Rally(tally.score.home + tally.score.away + 1)
    }
}
