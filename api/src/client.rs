use crate::wire::{
    EventBody, EventData, ExternalEventBody, LiveMatchResponse, PeriodBody, RosterEntry, ScoreBody,
    StatusBody,
};
use crate::{
    CardColor, EventPost, ExternalEvent, ExternalEventKind, ExternalEventPost, LiveMatch,
    PeriodMinutes, PeriodPatch, Player, Sport, Team,
};
use chrono::Utc;
use log::debug;
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub type ApiResult<T> = Result<T, ApiError>;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

/// Client for the dashboard's live-match REST backend.
#[derive(Debug, Clone)]
pub struct LiveMatchApi {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl Default for LiveMatchApi {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }
}

#[derive(Debug)]
pub enum ApiError {
    Network(reqwest::Error, String),
    Api(reqwest::Error, String),
    Parsing(reqwest::Error, String),
    NotFound(String),
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Network(e, url) => write!(f, "Network error for {url}: {e}"),
            ApiError::Api(e, url) => write!(f, "API error for {url}: {e}"),
            ApiError::Parsing(e, url) => write!(f, "Parse error for {url}: {e}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Other(msg) => write!(f, "Error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl LiveMatchApi {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("matchop/0.1 (live match operator)")
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Fetch every match the backend currently lists as live or scheduled.
    pub async fn fetch_live_matches(&self) -> ApiResult<Vec<LiveMatch>> {
        let url = format!("{}/live-matches", self.base_url);
        let raw: Vec<LiveMatchResponse> = self.get(&url).await?;
        Ok(raw.into_iter().map(map_live_match).collect())
    }

    /// Fetch the canonical snapshot of a single match.
    pub async fn fetch_live_match(&self, match_id: &str) -> ApiResult<LiveMatch> {
        let url = format!("{}/live-matches/{match_id}", self.base_url);
        let raw: LiveMatchResponse = self.get(&url).await?;
        Ok(map_live_match(raw))
    }

    /// Fetch a team's roster, in the order the backend returns it.
    pub async fn fetch_roster(&self, team_id: &str) -> ApiResult<Vec<Player>> {
        let url = format!("{}/teams/{team_id}/players", self.base_url);
        let raw: Vec<RosterEntry> = self.get(&url).await?;
        Ok(raw.into_iter().filter_map(map_roster_entry).collect())
    }

    pub async fn update_status(&self, match_id: &str, status: &str) -> ApiResult<()> {
        let url = format!("{}/live-matches/{match_id}/status", self.base_url);
        self.send(Method::PATCH, &url, &StatusBody { status }).await
    }

    pub async fn update_score(&self, match_id: &str, home: u32, away: u32) -> ApiResult<()> {
        let url = format!("{}/live-matches/{match_id}/score", self.base_url);
        let body = ScoreBody { home_score: home, away_score: away };
        self.send(Method::PATCH, &url, &body).await
    }

    pub async fn post_event(&self, match_id: &str, event: &EventPost) -> ApiResult<()> {
        let url = format!("{}/live-matches/{match_id}/event", self.base_url);
        let body = EventBody {
            event_type: event.event_type,
            event_data: EventData {
                player_id: event.player_id.clone(),
                minute: event.minute,
                detail: event.detail.clone(),
            },
        };
        self.send(Method::POST, &url, &body).await
    }

    pub async fn update_period(
        &self,
        match_id: &str,
        patch: PeriodPatch,
        minutes: u32,
    ) -> ApiResult<()> {
        let url = format!("{}/live-matches/{match_id}/{}", self.base_url, patch.path());
        self.send(Method::PATCH, &url, &PeriodBody { minutes }).await
    }

    /// Record a goal or card for the side whose roster lives outside our backend.
    pub async fn post_external_event(
        &self,
        match_id: &str,
        event: &ExternalEventPost,
    ) -> ApiResult<()> {
        let (path, card_type) = match event.kind {
            ExternalEventKind::Goal => ("away-team-goal", None),
            ExternalEventKind::Card(color) => {
                ("away-team-card", Some(color.wire_name().to_owned()))
            }
        };
        let url = format!("{}/live-matches/{match_id}/{path}", self.base_url);
        let body = ExternalEventBody {
            player_name: event.player_name.clone(),
            minute: event.minute,
            card_type,
        };
        self.send(Method::POST, &url, &body).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.to_owned()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_owned()));
        }

        match response.error_for_status() {
            Ok(res) => res
                .json::<T>()
                .await
                .map_err(|e| ApiError::Parsing(e, url.to_owned())),
            Err(e) => Err(ApiError::Api(e, url.to_owned())),
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> ApiResult<()> {
        debug!("{method} {url}");
        let response = self
            .client
            .request(method, url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e, url.to_owned()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_owned()));
        }

        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| ApiError::Api(e, url.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Mapping: backend wire types → clean domain types
// ---------------------------------------------------------------------------

fn map_live_match(raw: LiveMatchResponse) -> LiveMatch {
    let sport = raw
        .game_type
        .as_deref()
        .and_then(Sport::from_game_type)
        .unwrap_or_default();

    let home = map_team(raw.home_team.as_ref(), None);
    let away = map_team(raw.away_team.as_ref(), raw.away_team_name.as_deref());

    let start_time = raw
        .start_time
        .as_deref()
        .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let goals = raw.away_team_goals.into_iter().map(|g| ExternalEvent {
        team_name: g.team_name.unwrap_or_else(|| away.name.clone()),
        kind: ExternalEventKind::Goal,
        player_name: g.player_name.unwrap_or_default(),
        minute: g.minute.unwrap_or_default(),
    });
    let cards = raw.away_team_cards.into_iter().filter_map(|c| {
        let color = c.card_type.as_deref().and_then(CardColor::parse)?;
        Some(ExternalEvent {
            team_name: c.team_name.unwrap_or_else(|| away.name.clone()),
            kind: ExternalEventKind::Card(color),
            player_name: c.player_name.unwrap_or_default(),
            minute: c.minute.unwrap_or_default(),
        })
    });
    let mut external_events: Vec<ExternalEvent> = goals.chain(cards).collect();
    external_events.sort_by_key(|e| e.minute);

    LiveMatch {
        id: raw.id.unwrap_or_default(),
        sport,
        status: raw.status.unwrap_or_else(|| "NOT_STARTED".into()),
        home,
        away,
        venue: raw.venue,
        start_time,
        home_score: raw.home_score.unwrap_or_default(),
        away_score: raw.away_score.unwrap_or_default(),
        sets: raw.sets.into_iter().map(|s| (s.home, s.away)).collect(),
        external_events,
        periods: PeriodMinutes {
            first_time: raw.first_time,
            first_added_time: raw.first_added_time,
            second_time: raw.second_time,
            second_added_time: raw.second_added_time,
        },
    }
}

fn map_team(team: Option<&crate::wire::WireTeam>, fallback_name: Option<&str>) -> Team {
    Team {
        id: team.and_then(|t| t.id.clone()).unwrap_or_default(),
        name: team
            .and_then(|t| t.name.clone())
            .or_else(|| fallback_name.map(str::to_owned))
            .unwrap_or_default(),
    }
}

fn map_roster_entry(entry: RosterEntry) -> Option<Player> {
    let staff = entry.player_staff?;
    let id = staff.id.or(entry.id)?;
    let name = match (staff.first_name, staff.last_name) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first,
        (None, Some(last)) => last,
        (None, None) => id.clone(),
    };
    Some(Player {
        id,
        name,
        position: staff.position_in_club.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn live_match_maps_teams_scores_and_external_events() {
        let raw: LiveMatchResponse = serde_json::from_value(json!({
            "id": 42,
            "gameType": "Football",
            "status": "SECOND_HALF",
            "homeTeam": { "id": 7, "name": "Rovers" },
            "awayTeamName": "Visitors",
            "homeScore": 2,
            "awayScore": 1,
            "awayTeamGoals": [{ "playerName": "Ortiz", "minute": 61 }],
            "awayTeamCards": [
                { "teamName": "Visitors", "playerName": "Lee", "minute": 12, "type": "YELLOW" },
                { "playerName": "Nobody", "minute": 3, "type": "PURPLE" }
            ],
            "firstAddedTime": 2
        }))
        .unwrap();

        let m = map_live_match(raw);
        assert_eq!(m.id, "42");
        assert_eq!(m.sport, Sport::Football);
        assert_eq!(m.home.id, "7");
        assert_eq!(m.away.name, "Visitors");
        assert_eq!((m.home_score, m.away_score), (2, 1));
        assert_eq!(m.periods.first_added_time, Some(2));
        assert!(m.is_live());

        // Unknown card colours are dropped; events are ordered by minute.
        assert_eq!(m.external_events.len(), 2);
        assert_eq!(m.external_events[0].kind, ExternalEventKind::Card(CardColor::Yellow));
        assert_eq!(m.external_events[1].team_name, "Visitors");
        assert_eq!(m.external_events[1].minute, 61);
    }

    #[test]
    fn missing_fields_default_to_not_started() {
        let m = map_live_match(LiveMatchResponse::default());
        assert_eq!(m.status, "NOT_STARTED");
        assert!(!m.is_live());
        assert!(m.sets.is_empty());
    }

    #[test]
    fn roster_entry_prefers_player_staff_id() {
        let entry: RosterEntry = serde_json::from_value(json!({
            "id": 1,
            "playerStaff": {
                "id": 99,
                "firstName": "Ana",
                "lastName": "Silva",
                "positionInClub": "GK"
            }
        }))
        .unwrap();
        let player = map_roster_entry(entry).unwrap();
        assert_eq!(player.id, "99");
        assert_eq!(player.name, "Ana Silva");
        assert_eq!(player.position, "GK");
    }

    #[test]
    fn roster_entry_without_staff_is_skipped() {
        let entry: RosterEntry = serde_json::from_value(json!({ "id": 1 })).unwrap();
        assert!(map_roster_entry(entry).is_none());
    }

    #[tokio::test]
    async fn fetch_live_match_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/live-matches/5")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "5",
                    "gameType": "volleyball",
                    "status": "IN_PROGRESS",
                    "homeScore": 12,
                    "awayScore": 10,
                    "sets": [{ "home": 25, "away": 20 }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let api = LiveMatchApi::with_base_url(server.url());
        let m = api.fetch_live_match("5").await.unwrap();
        mock.assert_async().await;
        assert_eq!(m.sport, Sport::Volleyball);
        assert_eq!(m.sets, vec![(25, 20)]);
    }

    #[tokio::test]
    async fn fetch_live_match_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/live-matches/404")
            .with_status(404)
            .create_async()
            .await;

        let api = LiveMatchApi::with_base_url(server.url());
        let err = api.fetch_live_match("404").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn server_errors_surface_as_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/live-matches/1/score")
            .with_status(503)
            .create_async()
            .await;

        let api = LiveMatchApi::with_base_url(server.url());
        let err = api.update_score("1", 1, 0).await.unwrap_err();
        assert!(matches!(err, ApiError::Api(_, _)), "got {err}");
    }

    #[tokio::test]
    async fn post_event_sends_expected_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/live-matches/9/event")
            .match_body(Matcher::Json(json!({
                "eventType": "card",
                "eventData": { "playerId": "11", "minute": 34, "type": "RED" }
            })))
            .with_status(201)
            .create_async()
            .await;

        let api = LiveMatchApi::with_base_url(server.url());
        api.post_event(
            "9",
            &EventPost {
                event_type: EventType::Card,
                player_id: Some("11".into()),
                minute: 34,
                detail: Some("RED".into()),
            },
        )
        .await
        .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn external_card_goes_to_away_team_card() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/live-matches/3/away-team-card")
            .match_body(Matcher::Json(json!({
                "playerName": "Lee", "minute": 70, "type": "YELLOW"
            })))
            .with_status(200)
            .create_async()
            .await;

        let api = LiveMatchApi::with_base_url(format!("{}/", server.url()));
        api.post_external_event(
            "3",
            &ExternalEventPost {
                kind: ExternalEventKind::Card(CardColor::Yellow),
                player_name: "Lee".into(),
                minute: 70,
            },
        )
        .await
        .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn period_patch_uses_period_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/live-matches/3/second-added-time")
            .match_body(Matcher::Json(json!({ "minutes": 4 })))
            .with_status(204)
            .create_async()
            .await;

        let api = LiveMatchApi::with_base_url(server.url());
        api.update_period("3", PeriodPatch::SecondAddedTime, 4).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_roster_maps_players_in_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/teams/7/players")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    { "id": 1, "playerStaff": { "id": 10, "firstName": "A", "lastName": "One" } },
                    { "id": 2, "playerStaff": { "id": 20, "firstName": "B", "lastName": "Two" } }
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let api = LiveMatchApi::with_base_url(server.url());
        let roster = api.fetch_roster("7").await.unwrap();
        let ids: Vec<&str> = roster.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "20"]);
    }
}
