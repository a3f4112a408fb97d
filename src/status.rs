use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a match. Which variants are reachable depends on the
/// sport; the rule set for the match decides the legal order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStatus {
    #[default]
    NotStarted,
    // Football
    FirstHalf,
    HalfTime,
    SecondHalf,
    FullTime,
    Ended,
    // Basketball
    Quarter(u8),
    // Volleyball
    Set(u8),
    /// Terminal status for basketball and volleyball.
    Finished,
}

impl MatchStatus {
    /// Status string as the backend stores it.
    pub fn wire_name(&self) -> String {
        match self {
            MatchStatus::NotStarted => "NOT_STARTED".into(),
            MatchStatus::FirstHalf => "FIRST_HALF".into(),
            MatchStatus::HalfTime => "HALF_TIME".into(),
            MatchStatus::SecondHalf => "SECOND_HALF".into(),
            MatchStatus::FullTime => "FULL_TIME".into(),
            MatchStatus::Ended => "ENDED".into(),
            MatchStatus::Quarter(n) => format!("Q{n}"),
            MatchStatus::Set(_) => "IN_PROGRESS".into(),
            MatchStatus::Finished => "FINISHED".into(),
        }
    }

    /// Period number this status belongs to. `None` keeps whatever period
    /// was current before.
    pub fn period(&self) -> Option<u8> {
        match self {
            MatchStatus::NotStarted => Some(0),
            MatchStatus::FirstHalf | MatchStatus::HalfTime => Some(1),
            MatchStatus::SecondHalf | MatchStatus::FullTime => Some(2),
            MatchStatus::Quarter(n) | MatchStatus::Set(n) => Some(*n),
            MatchStatus::Ended | MatchStatus::Finished => None,
        }
    }

    /// True while play is live and scoring events are accepted.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            MatchStatus::FirstHalf
                | MatchStatus::SecondHalf
                | MatchStatus::Quarter(_)
                | MatchStatus::Set(_)
        )
    }

    pub fn label(&self) -> String {
        match self {
            MatchStatus::Quarter(n) => format!("Q{n}"),
            MatchStatus::Set(n) => format!("Set {n}"),
            other => other.wire_name().replace('_', " ").to_lowercase(),
        }
    }
}

/// Operator-level lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    Start,
    /// Close the running period (half, quarter).
    EndPeriod,
    /// Leave a break (half time) for the next period.
    Resume,
    /// Move to the terminal status.
    Finish,
}

impl Transition {
    pub const ALL: [Transition; 4] =
        [Transition::Start, Transition::EndPeriod, Transition::Resume, Transition::Finish];
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transition::Start => "start",
            Transition::EndPeriod => "end period",
            Transition::Resume => "resume",
            Transition::Finish => "finish",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_backend_strings() {
        assert_eq!(MatchStatus::NotStarted.wire_name(), "NOT_STARTED");
        assert_eq!(MatchStatus::Quarter(3).wire_name(), "Q3");
        assert_eq!(MatchStatus::Set(4).wire_name(), "IN_PROGRESS");
        assert_eq!(MatchStatus::FullTime.wire_name(), "FULL_TIME");
    }

    #[test]
    fn breaks_are_not_running() {
        assert!(MatchStatus::FirstHalf.is_running());
        assert!(!MatchStatus::HalfTime.is_running());
        assert!(!MatchStatus::FullTime.is_running());
        assert!(MatchStatus::Set(5).is_running());
        assert!(!MatchStatus::Finished.is_running());
    }

    #[test]
    fn terminal_statuses_keep_period() {
        assert_eq!(MatchStatus::Ended.period(), None);
        assert_eq!(MatchStatus::HalfTime.period(), Some(1));
        assert_eq!(MatchStatus::Quarter(2).period(), Some(2));
    }
}
