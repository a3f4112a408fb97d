use scoreboard_api::{EventPost, ExternalEventPost, LiveMatch, PeriodPatch};
use std::fmt;
use tokio::time::Instant;

/// One backend write produced by a committed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Push {
    Status { status: String },
    Score { home: u32, away: u32 },
    Event(EventPost),
    /// Goal or card for the side whose roster the backend tracks itself.
    External(ExternalEventPost),
    Period { patch: PeriodPatch, minutes: u32 },
}

impl fmt::Display for Push {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Push::Status { status } => write!(f, "status {status}"),
            Push::Score { home, away } => write!(f, "score {home}-{away}"),
            Push::Event(event) => write!(f, "{:?} at {}", event.event_type, event.minute),
            Push::External(event) => {
                write!(f, "external {:?} by {}", event.kind, event.player_name)
            }
            Push::Period { patch, minutes } => write!(f, "{} {minutes}", patch.path()),
        }
    }
}

/// Everything the sync tasks report back to their match.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Polled { snapshot: LiveMatch, requested_at: Instant },
    PollFailed { message: String },
    PushAcked { push: Push },
    PushFailed { push: Push, attempt: u32, message: String },
    PushAbandoned { push: Push, message: String },
}
