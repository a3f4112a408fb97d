/// Backend raw wire types — serde shapes for deserializing live-match responses.
/// These map to the clean domain types via the mapping functions in client.rs.
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Live matches  (GET /live-matches, GET /live-matches/{id})
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LiveMatchResponse {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub game_type: Option<String>,
    pub status: Option<String>,
    pub home_team: Option<WireTeam>,
    pub away_team: Option<WireTeam>,
    /// Free-text name for an away team that has no record in our backend.
    pub away_team_name: Option<String>,
    pub venue: Option<String>,
    pub start_time: Option<String>, // ISO 8601
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    #[serde(default)]
    pub sets: Vec<WireSet>,
    #[serde(default)]
    pub away_team_goals: Vec<WireExternalGoal>,
    #[serde(default)]
    pub away_team_cards: Vec<WireExternalCard>,
    pub first_time: Option<u32>,
    pub first_added_time: Option<u32>,
    pub second_time: Option<u32>,
    pub second_added_time: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct WireTeam {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct WireSet {
    #[serde(default)]
    pub home: u32,
    #[serde(default)]
    pub away: u32,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireExternalGoal {
    pub team_name: Option<String>,
    pub player_name: Option<String>,
    pub minute: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WireExternalCard {
    pub team_name: Option<String>,
    pub player_name: Option<String>,
    pub minute: Option<u32>,
    #[serde(rename = "type")]
    pub card_type: Option<String>, // "YELLOW" | "RED"
}

// ---------------------------------------------------------------------------
// Roster  (GET /teams/{id}/players)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub player_staff: Option<PlayerStaff>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStaff {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position_in_club: Option<String>,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Clone)]
pub struct StatusBody<'a> {
    pub status: &'a str,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    pub home_score: u32,
    pub away_score: u32,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    pub event_type: crate::EventType,
    pub event_data: EventData,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub player_id: Option<String>,
    pub minute: u32,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct PeriodBody {
    pub minutes: u32,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEventBody {
    pub player_name: String,
    pub minute: u32,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
}

/// The backend is inconsistent about numeric vs string ids.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
