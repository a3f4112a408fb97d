use crate::model::{ClockMark, EventKind, EventRequest, Player, Side};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// First half of a player-bound event: what happened and when, waiting for
/// the operator to say who did it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub id: u64,
    pub kind: EventKind,
    pub side: Side,
    pub mark: ClockMark,
    pub expires_at: Instant,
}

impl PendingEvent {
    pub fn new(id: u64, kind: EventKind, side: Side, mark: ClockMark, lifetime: Duration) -> Self {
        Self { id, kind, side, mark, expires_at: Instant::now() + lifetime }
    }

    /// Complete the event with its player. The mark stays the one taken when
    /// the event was opened.
    pub fn resolve(self, player: Player) -> EventRequest {
        EventRequest::new(self.kind, self.side).with_player(player).at(self.mark)
    }

    pub fn cancel(self) -> PendingView {
        self.view()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn view(&self) -> PendingView {
        PendingView {
            id: self.id,
            kind: self.kind,
            side: self.side,
            minute: self.mark.minute(),
            expires_in_secs: self
                .expires_at
                .saturating_duration_since(Instant::now())
                .as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingView {
    pub id: u64,
    pub kind: EventKind,
    pub side: Side,
    pub minute: u32,
    pub expires_in_secs: u64,
}
