use crate::error::MatchResult;
use crate::model::MatchSetup;
use async_trait::async_trait;
use log::debug;
use scoreboard_api::client::{ApiResult, LiveMatchApi};
use scoreboard_api::{EventPost, ExternalEventPost, LiveMatch, PeriodPatch, Player, Team};

/// The live-match backend as the operator uses it.
#[async_trait]
pub trait LiveMatchBackend: Send + Sync {
    async fn live_matches(&self) -> ApiResult<Vec<LiveMatch>>;

    async fn live_match(&self, match_id: &str) -> ApiResult<LiveMatch>;

    async fn roster(&self, team_id: &str) -> ApiResult<Vec<Player>>;

    async fn update_status(&self, match_id: &str, status: &str) -> ApiResult<()>;

    async fn update_score(&self, match_id: &str, home: u32, away: u32) -> ApiResult<()>;

    async fn post_event(&self, match_id: &str, event: &EventPost) -> ApiResult<()>;

    async fn post_external_event(
        &self,
        match_id: &str,
        event: &ExternalEventPost,
    ) -> ApiResult<()>;

    async fn update_period(
        &self,
        match_id: &str,
        patch: PeriodPatch,
        minutes: u32,
    ) -> ApiResult<()>;
}

#[async_trait]
impl LiveMatchBackend for LiveMatchApi {
    async fn live_matches(&self) -> ApiResult<Vec<LiveMatch>> {
        self.fetch_live_matches().await
    }

    async fn live_match(&self, match_id: &str) -> ApiResult<LiveMatch> {
        self.fetch_live_match(match_id).await
    }

    async fn roster(&self, team_id: &str) -> ApiResult<Vec<Player>> {
        self.fetch_roster(team_id).await
    }

    async fn update_status(&self, match_id: &str, status: &str) -> ApiResult<()> {
        LiveMatchApi::update_status(self, match_id, status).await
    }

    async fn update_score(&self, match_id: &str, home: u32, away: u32) -> ApiResult<()> {
        LiveMatchApi::update_score(self, match_id, home, away).await
    }

    async fn post_event(&self, match_id: &str, event: &EventPost) -> ApiResult<()> {
        LiveMatchApi::post_event(self, match_id, event).await
    }

    async fn post_external_event(
        &self,
        match_id: &str,
        event: &ExternalEventPost,
    ) -> ApiResult<()> {
        LiveMatchApi::post_external_event(self, match_id, event).await
    }

    async fn update_period(
        &self,
        match_id: &str,
        patch: PeriodPatch,
        minutes: u32,
    ) -> ApiResult<()> {
        LiveMatchApi::update_period(self, match_id, patch, minutes).await
    }
}

/// Fetch a match and the rosters of its locally tracked sides.
pub async fn load_setup(
    backend: &dyn LiveMatchBackend,
    match_id: &str,
) -> MatchResult<(MatchSetup, LiveMatch)> {
    let live = backend.live_match(match_id).await?;
    let home = roster_for(backend, &live.home).await?;
    let away = roster_for(backend, &live.away).await?;
    debug!(
        "loaded match {match_id}: {} ({} players) vs {} ({} players)",
        live.home.name,
        home.len(),
        live.away.name,
        away.len()
    );
    Ok((MatchSetup::from_live(&live, home, away), live))
}

async fn roster_for(backend: &dyn LiveMatchBackend, team: &Team) -> MatchResult<Vec<Player>> {
    if team.id.is_empty() {
        return Ok(Vec::new());
    }
    Ok(backend.roster(&team.id).await?)
}
