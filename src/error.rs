use crate::status::{MatchStatus, Transition};
use scoreboard_api::Side;
use scoreboard_api::client::ApiError;
use std::fmt;

pub type MatchResult<T> = Result<T, MatchError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// The requested lifecycle step is not legal from the current status.
    InvalidTransition { from: MatchStatus, action: Transition },
    /// Starting needs both teams and their rosters.
    SetupIncomplete(String),
    /// A rule rejected the event. Nothing was committed.
    InvalidEvent(String),
    /// A player-bound event reached the engine without a player.
    MissingPlayer,
    /// The ledger already holds an event with the same identity.
    DuplicateEvent(String),
    /// Another event is still waiting for its player.
    PendingOutstanding,
    /// Canonical state diverged from local state; canonical was applied.
    SyncConflict { side: Side, local: u32, canonical: u32 },
    NetworkFailure(String),
    /// The match operator has shut down.
    Closed,
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::InvalidTransition { from, action } => {
                write!(f, "cannot {action} from {}", from.wire_name())
            }
            MatchError::SetupIncomplete(msg) => write!(f, "match setup incomplete: {msg}"),
            MatchError::InvalidEvent(msg) => write!(f, "invalid event: {msg}"),
            MatchError::MissingPlayer => {
                write!(f, "event needs a player before it can be committed")
            }
            MatchError::DuplicateEvent(key) => write!(f, "duplicate event {key}"),
            MatchError::PendingOutstanding => {
                write!(f, "another event is still waiting for a player")
            }
            MatchError::SyncConflict { side, local, canonical } => write!(
                f,
                "{} score diverged (local {local}, canonical {canonical}); canonical applied",
                side.label()
            ),
            MatchError::NetworkFailure(msg) => write!(f, "network failure: {msg}"),
            MatchError::Closed => write!(f, "match operator is closed"),
        }
    }
}

impl std::error::Error for MatchError {}

impl From<ApiError> for MatchError {
    fn from(e: ApiError) -> Self {
        MatchError::NetworkFailure(e.to_string())
    }
}
