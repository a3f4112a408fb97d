//! Merging a polled canonical snapshot into local state.
//!
//! Local state wins for responsiveness, with two exceptions. A side whose
//! events the backend tracks on its own always takes the canonical score.
//! A locally tracked side that disagrees with the backend while nothing is
//! in flight is a conflict: canonical is applied and the operator is told.

use crate::ledger::EventLedger;
use crate::model::{ClockMark, EventKey, EventKind, EventRequest, MatchSetup, Player, Side};
use log::debug;
use scoreboard_api::{ExternalEventKind, LiveMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideVerdict {
    Keep,
    Overwrite(u32),
    Conflict { local: u32, canonical: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub home: SideVerdict,
    pub away: SideVerdict,
    /// Canonical events missing from the ledger, oldest first.
    pub imports: Vec<EventRequest>,
}

impl Reconciliation {
    pub fn verdict(&self, side: Side) -> SideVerdict {
        match side {
            Side::Home => self.home,
            Side::Away => self.away,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.home == SideVerdict::Keep && self.away == SideVerdict::Keep && self.imports.is_empty()
    }
}

/// Decide what to do with `canonical`. `unsettled` is true while local pushes
/// are in flight or the poll was issued before the last one settled.
pub fn reconcile(
    ledger: &EventLedger,
    setup: &MatchSetup,
    canonical: &LiveMatch,
    unsettled: bool,
) -> Reconciliation {
    let imports = missing_imports(ledger, setup, canonical);
    let local = ledger.tally().score;

    let verdict = |side: Side| {
        let canonical_score = canonical.score_for(side);
        if setup.team(side).externally_tracked {
            let imported_goals = imports
                .iter()
                .filter(|r| r.side == side && r.kind == EventKind::Goal)
                .count() as u32;
            if canonical_score == local.get(side) + imported_goals {
                SideVerdict::Keep
            } else {
                SideVerdict::Overwrite(canonical_score)
            }
        } else if canonical_score == *local.get(side) || unsettled {
            SideVerdict::Keep
        } else {
            SideVerdict::Conflict { local: *local.get(side), canonical: canonical_score }
        }
    };

    let home = verdict(Side::Home);
    let away = verdict(Side::Away);
    Reconciliation { home, away, imports }
}

fn missing_imports(
    ledger: &EventLedger,
    setup: &MatchSetup,
    canonical: &LiveMatch,
) -> Vec<EventRequest> {
    let mut imports: Vec<EventRequest> = Vec::new();
    for event in &canonical.external_events {
        let Some(side) = setup.side_named(&event.team_name) else {
            debug!("external event for unknown team '{}' skipped", event.team_name);
            continue;
        };
        if !setup.team(side).externally_tracked {
            continue;
        }
        let kind = match event.kind {
            ExternalEventKind::Goal => EventKind::Goal,
            ExternalEventKind::Card(color) => EventKind::Card(color),
        };
        let player = Player::external(event.player_name.clone());
        let mark = ClockMark::Minute(event.minute);
        let key = EventKey {
            tag: kind.tag(),
            side: Some(side),
            player_id: Some(player.id.clone()),
            period: None,
            mark,
        };
        let queued = imports.iter().any(|r| {
            r.kind == kind
                && r.side == side
                && r.mark == Some(mark)
                && r.player.as_ref() == Some(&player)
        });
        if ledger.contains_key(&key) || queued {
            continue;
        }
        imports.push(EventRequest::new(kind, side).with_player(player).at(mark).canonical());
    }
    imports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardColor, TeamSheet};
    use crate::rules::{RuleConfig, RuleSet};
    use crate::status::MatchStatus;
    use chrono::Utc;
    use scoreboard_api::{ExternalEvent, Sport, Team};

    fn setup() -> MatchSetup {
        MatchSetup {
            id: "42".into(),
            sport: Sport::Football,
            home: TeamSheet {
                id: "t1".into(),
                name: "Harbor".into(),
                roster: vec![Player {
                    id: "9".into(),
                    name: "Nine".into(),
                    position: String::new(),
                }],
                externally_tracked: false,
            },
            away: TeamSheet {
                id: String::new(),
                name: "Visitors".into(),
                roster: vec![],
                externally_tracked: true,
            },
            ..Default::default()
        }
    }

    fn ledger_at(home: u32, away: u32) -> (RuleSet, EventLedger) {
        let rules = RuleSet::for_sport(Sport::Football, RuleConfig::default());
        let mut ledger = EventLedger::new(rules.rules());
        let now = Utc::now();
        let kick_off = EventRequest::status(MatchStatus::FirstHalf);
        ledger.commit(rules.rules(), &kick_off, ClockMark::Minute(1), now).unwrap();
        let nine = setup().home.roster[0].clone();
        for minute in 0..home {
            let goal = EventRequest::new(EventKind::Goal, Side::Home).with_player(nine.clone());
            ledger.commit(rules.rules(), &goal, ClockMark::Minute(minute + 2), now).unwrap();
        }
        for minute in 0..away {
            let goal = EventRequest::new(EventKind::Goal, Side::Away)
                .with_player(Player::external(format!("Guest {minute}")))
                .canonical();
            ledger.commit(rules.rules(), &goal, ClockMark::Minute(minute + 2), now).unwrap();
        }
        (rules, ledger)
    }

    fn canonical(home: u32, away: u32) -> LiveMatch {
        LiveMatch {
            id: "42".into(),
            sport: Sport::Football,
            status: "FIRST_HALF".into(),
            home: Team { id: "t1".into(), name: "Harbor".into() },
            away: Team { id: String::new(), name: "Visitors".into() },
            home_score: home,
            away_score: away,
            ..Default::default()
        }
    }

    #[test]
    fn external_side_takes_canonical_and_local_side_is_untouched() {
        let (_, ledger) = ledger_at(2, 1);
        let result = reconcile(&ledger, &setup(), &canonical(2, 2), false);
        assert_eq!(result.home, SideVerdict::Keep);
        assert_eq!(result.away, SideVerdict::Overwrite(2));
        assert!(result.imports.is_empty());
    }

    #[test]
    fn missing_external_goal_is_imported_instead_of_overwritten() {
        let (_, ledger) = ledger_at(2, 1);
        let mut snapshot = canonical(2, 2);
        snapshot.external_events = vec![
            ExternalEvent {
                team_name: "Visitors".into(),
                kind: ExternalEventKind::Goal,
                player_name: "Guest 0".into(),
                minute: 2,
            },
            ExternalEvent {
                team_name: "Visitors".into(),
                kind: ExternalEventKind::Goal,
                player_name: "Okafor".into(),
                minute: 31,
            },
            ExternalEvent {
                team_name: "Visitors".into(),
                kind: ExternalEventKind::Card(CardColor::Yellow),
                player_name: "Okafor".into(),
                minute: 33,
            },
        ];
        let result = reconcile(&ledger, &setup(), &snapshot, false);
        assert_eq!(result.imports.len(), 2, "already known goal is dropped");
        assert_eq!(result.imports[0].mark, Some(ClockMark::Minute(31)));
        assert_eq!(result.away, SideVerdict::Keep);
    }

    #[test]
    fn local_side_divergence_waits_for_outstanding_pushes() {
        let (_, ledger) = ledger_at(3, 0);
        let snapshot = canonical(2, 0);
        assert_eq!(reconcile(&ledger, &setup(), &snapshot, true).home, SideVerdict::Keep);
        assert_eq!(
            reconcile(&ledger, &setup(), &snapshot, false).home,
            SideVerdict::Conflict { local: 3, canonical: 2 }
        );
    }

    #[test]
    fn team_names_must_match_exactly() {
        let (_, ledger) = ledger_at(0, 0);
        let mut snapshot = canonical(0, 1);
        snapshot.external_events = vec![ExternalEvent {
            team_name: "visitors".into(),
            kind: ExternalEventKind::Goal,
            player_name: "Okafor".into(),
            minute: 12,
        }];
        let result = reconcile(&ledger, &setup(), &snapshot, false);
        assert!(result.imports.is_empty());
        assert_eq!(result.away, SideVerdict::Overwrite(1));
    }
}
