pub mod client;
pub mod wire;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Domain types — clean model, independent of the backend wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    #[default]
    Football,
    Basketball,
    Volleyball,
}

impl Sport {
    /// Parse the backend's free-form game type string.
    pub fn from_game_type(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "football" | "soccer" => Some(Sport::Football),
            "basketball" => Some(Sport::Basketball),
            "volleyball" => Some(Sport::Volleyball),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Sport::Football => "football",
            Sport::Basketball => "basketball",
            Sport::Volleyball => "volleyball",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn label(&self) -> &'static str {
        match self {
            Side::Home => "home",
            Side::Away => "away",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "home" | "h" => Some(Side::Home),
            "away" | "a" => Some(Side::Away),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub position: String,
}

impl Player {
    /// A player on a side whose roster lives outside our backend. Only the
    /// name is known, so it doubles as the id.
    pub fn external(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { id: format!("ext:{name}"), name, position: String::new() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardColor {
    Yellow,
    Red,
}

impl CardColor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "yellow" | "y" => Some(CardColor::Yellow),
            "red" | "r" => Some(CardColor::Red),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            CardColor::Yellow => "YELLOW",
            CardColor::Red => "RED",
        }
    }
}

/// Canonical match state as the backend sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMatch {
    pub id: String,
    pub sport: Sport,
    pub status: String,
    pub home: Team,
    pub away: Team,
    pub venue: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub home_score: u32,
    pub away_score: u32,
    pub sets: Vec<(u32, u32)>, // (home, away) per completed set
    /// Events for the side whose roster is tracked outside our backend.
    pub external_events: Vec<ExternalEvent>,
    pub periods: PeriodMinutes,
}

impl LiveMatch {
    pub fn is_live(&self) -> bool {
        !matches!(self.status.as_str(), "NOT_STARTED" | "ENDED" | "FINISHED" | "FULL_TIME" | "")
    }

    pub fn score_for(&self, side: Side) -> u32 {
        match side {
            Side::Home => self.home_score,
            Side::Away => self.away_score,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodMinutes {
    pub first_time: Option<u32>,
    pub first_added_time: Option<u32>,
    pub second_time: Option<u32>,
    pub second_added_time: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEvent {
    /// Team the event belongs to, by display name. Matched against local team
    /// names with plain string equality.
    pub team_name: String,
    pub kind: ExternalEventKind,
    pub player_name: String,
    pub minute: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalEventKind {
    Goal,
    Card(CardColor),
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "goal")]
    Goal,
    #[serde(rename = "card")]
    Card,
    #[serde(rename = "point")]
    Point,
    #[serde(rename = "foul")]
    Foul,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "setWin")]
    SetWin,
}

/// Body of `POST /live-matches/{id}/event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPost {
    pub event_type: EventType,
    pub player_id: Option<String>,
    pub minute: u32,
    /// Sub-type: card colour or point value.
    pub detail: Option<String>,
}

/// Body of the `away-team-goal` / `away-team-card` endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEventPost {
    pub kind: ExternalEventKind,
    pub player_name: String,
    pub minute: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodPatch {
    FirstTime,
    FirstAddedTime,
    SecondTime,
    SecondAddedTime,
}

impl PeriodPatch {
    pub fn path(&self) -> &'static str {
        match self {
            PeriodPatch::FirstTime => "first-time",
            PeriodPatch::FirstAddedTime => "first-added-time",
            PeriodPatch::SecondTime => "second-time",
            PeriodPatch::SecondAddedTime => "second-added-time",
        }
    }
}
