use crate::error::{MatchError, MatchResult};
use crate::model::{
    ClockMark, EventKey, EventKind, EventRequest, EventSource, MatchEvent, Score, Side, Tally,
};
use crate::rules::{SportRules, Stamp};
use chrono::{DateTime, Utc};
use log::debug;

/// Append-only record of everything that happened in a match. The [`Tally`]
/// is kept next to it for cheap reads but is only ever produced by folding
/// committed events.
#[derive(Debug, Clone)]
pub struct EventLedger {
    events: Vec<MatchEvent>,
    initial: Tally,
    tally: Tally,
}

impl EventLedger {
    pub fn new(rules: &dyn SportRules) -> Self {
        let initial = rules.initial_tally();
        Self { events: Vec::new(), tally: initial.clone(), initial }
    }

    /// Validate `request` against the current tally and append the events it
    /// produces. Either every event is appended or none is.
    pub fn commit(
        &mut self,
        rules: &dyn SportRules,
        request: &EventRequest,
        mark: ClockMark,
        at: DateTime<Utc>,
    ) -> MatchResult<Vec<MatchEvent>> {
        let is_status = matches!(request.kind, EventKind::Status(_));
        if request.source == EventSource::Local
            && !is_status
            && let Some(last) = self.tally.last_mark
            && mark < last
        {
            return Err(MatchError::InvalidEvent(format!(
                "event at {} is earlier than the last one at {}",
                mark.minute(),
                last.minute()
            )));
        }

        let stamp = Stamp {
            next_id: self.events.len() as u64 + 1,
            mark,
            at,
            source: request.source,
        };
        let (next, events) = rules.apply_event(&self.tally, request, stamp)?;

        // Score corrections overwrite, so repeating one is never a duplicate.
        let check_duplicates = (request.source == EventSource::Canonical
            || rules.dedups_local_events())
            && !is_status
            && !matches!(request.kind, EventKind::ScoreSet(_));
        if check_duplicates && let Some(first) = events.first() {
            let key = match request.source {
                EventSource::Local => first.key(),
                EventSource::Canonical => first.key().without_period(),
            };
            if self.contains_key(&key) {
                return Err(MatchError::DuplicateEvent(key.to_string()));
            }
        }

        debug!(
            "committed {} event(s) starting at #{} ({})",
            events.len(),
            stamp.next_id,
            next.score
        );
        self.events.extend(events.iter().cloned());
        self.tally = next;
        Ok(events)
    }

    pub fn events(&self) -> &[MatchEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn last(&self) -> Option<&MatchEvent> {
        self.events.last()
    }

    pub fn events_for(&self, side: Side) -> impl Iterator<Item = &MatchEvent> {
        self.events.iter().filter(move |e| e.side == Some(side))
    }

    pub fn contains_key(&self, key: &EventKey) -> bool {
        self.events.iter().any(|e| e.key().matches(key))
    }

    /// Score right after the event at `index` (0-based), folded from scratch.
    pub fn score_at(&self, index: usize) -> Option<Score> {
        if index >= self.events.len() {
            return None;
        }
        Some(self.fold_prefix(index + 1).score)
    }

    /// Recompute the tally from an empty state.
    pub fn replay(&self) -> Tally {
        self.fold_prefix(self.events.len())
    }

    fn fold_prefix(&self, len: usize) -> Tally {
        self.events[..len].iter().fold(self.initial.clone(), |mut tally, event| {
            tally.fold(event);
            tally
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardColor, Sport};
    use crate::rules::RuleSet;
    use crate::rules::test_support::player;
    use crate::rules::RuleConfig;
    use crate::status::{MatchStatus, Transition};

    fn started(sport: Sport) -> (RuleSet, EventLedger) {
        let rules = RuleSet::for_sport(sport, RuleConfig::default());
        let mut ledger = EventLedger::new(rules.rules());
        let to = rules.rules().next_status(ledger.tally(), Transition::Start).unwrap();
        ledger
            .commit(rules.rules(), &EventRequest::status(to), ClockMark::Minute(0), Utc::now())
            .unwrap();
        (rules, ledger)
    }

    fn commit(
        rules: &RuleSet,
        ledger: &mut EventLedger,
        request: EventRequest,
        mark: ClockMark,
    ) -> MatchResult<Vec<MatchEvent>> {
        ledger.commit(rules.rules(), &request, mark, Utc::now())
    }

    fn by(kind: EventKind, side: Side, id: &str) -> EventRequest {
        EventRequest::new(kind, side).with_player(player(id))
    }

    fn goal(side: Side, id: &str) -> EventRequest {
        by(EventKind::Goal, side, id)
    }

    #[test]
    fn football_goal_adds_one_event_and_one_goal() {
        let (rules, mut ledger) = started(Sport::Football);
        let before = ledger.len();
        commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(10)).unwrap();
        assert_eq!(ledger.len(), before + 1);
        assert_eq!(ledger.tally().score, Score::new(1, 0));
        assert_eq!(ledger.last().map(|e| e.id), Some(2));
    }

    #[test]
    fn replay_matches_incremental_tally() {
        let (rules, mut ledger) = started(Sport::Football);
        commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(10)).unwrap();
        let card = by(EventKind::Card(CardColor::Yellow), Side::Away, "4");
        commit(&rules, &mut ledger, card, ClockMark::Minute(22)).unwrap();
        commit(&rules, &mut ledger, goal(Side::Away, "11"), ClockMark::Minute(30)).unwrap();
        let half_time = EventRequest::status(MatchStatus::HalfTime);
        commit(&rules, &mut ledger, half_time, ClockMark::Minute(46)).unwrap();
        assert_eq!(&ledger.replay(), ledger.tally());

        let (rules, mut ledger) = started(Sport::Basketball);
        let plays = [(5, EventKind::Point(2)), (9, EventKind::Foul), (14, EventKind::Point(3))];
        for (second, kind) in plays {
            let request = by(kind, Side::Away, "8");
            commit(&rules, &mut ledger, request, ClockMark::Second(second)).unwrap();
        }
        let timeout = EventRequest::new(EventKind::Timeout, Side::Home);
        commit(&rules, &mut ledger, timeout, ClockMark::Second(20)).unwrap();
        let correction = EventRequest::new(EventKind::ScoreSet(12), Side::Home);
        commit(&rules, &mut ledger, correction, ClockMark::Second(21)).unwrap();
        assert_eq!(&ledger.replay(), ledger.tally());
        assert_eq!(ledger.tally().score, Score::new(12, 5));

        let (rules, mut ledger) = started(Sport::Volleyball);
        for rally in 1..=25 {
            let request = by(EventKind::Point(1), Side::Home, "2");
            commit(&rules, &mut ledger, request, ClockMark::Rally(rally)).unwrap();
        }
        let request = by(EventKind::Point(1), Side::Away, "6");
        commit(&rules, &mut ledger, request, ClockMark::Rally(1)).unwrap();
        assert_eq!(ledger.tally().sets_won.home, 1);
        assert_eq!(&ledger.replay(), ledger.tally());
    }

    #[test]
    fn set_win_commits_atomically() {
        let (rules, mut ledger) = started(Sport::Volleyball);
        for rally in 1..=24 {
            let request = by(EventKind::Point(1), Side::Away, "6");
            commit(&rules, &mut ledger, request, ClockMark::Rally(rally)).unwrap();
        }
        let before = ledger.len();
        let request = by(EventKind::Point(1), Side::Away, "6");
        let events = commit(&rules, &mut ledger, request, ClockMark::Rally(25)).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(ledger.len(), before + 3);
        assert_eq!(events[1].kind, EventKind::SetWin { set: 1, home: 0, away: 25 });
        assert_eq!(events[2].kind, EventKind::Status(MatchStatus::Set(2)));
        assert_eq!(ledger.score_at(before), Some(Score::new(0, 25)));
    }

    #[test]
    fn duplicate_football_event_is_rejected_without_mutation() {
        let (rules, mut ledger) = started(Sport::Football);
        commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(10)).unwrap();
        let snapshot = (ledger.len(), ledger.tally().clone());
        let err =
            commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(10)).unwrap_err();
        assert!(matches!(err, MatchError::DuplicateEvent(_)));
        assert_eq!((ledger.len(), ledger.tally().clone()), snapshot);

        commit(&rules, &mut ledger, goal(Side::Home, "10"), ClockMark::Minute(10)).unwrap();
        assert_eq!(ledger.tally().score.home, 2);
    }

    #[test]
    fn stoppage_minute_and_second_half_minute_are_different_goals() {
        let (rules, mut ledger) = started(Sport::Football);
        commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(46)).unwrap();
        for status in [MatchStatus::HalfTime, MatchStatus::SecondHalf] {
            let request = EventRequest::status(status);
            commit(&rules, &mut ledger, request, ClockMark::Minute(46)).unwrap();
        }
        let events =
            commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(46)).unwrap();
        assert_eq!(events[0].period, 2);
        assert_eq!(ledger.tally().score.home, 2);

        // Backend events carry no period, so either goal already covers this one.
        let imported = goal(Side::Home, "9").canonical();
        let err = commit(&rules, &mut ledger, imported, ClockMark::Minute(46)).unwrap_err();
        assert!(matches!(err, MatchError::DuplicateEvent(_)));
    }

    #[test]
    fn basketball_free_throws_may_share_a_second() {
        let (rules, mut ledger) = started(Sport::Basketball);
        for _ in 0..2 {
            let request = by(EventKind::Point(1), Side::Home, "7");
            commit(&rules, &mut ledger, request, ClockMark::Second(300)).unwrap();
        }
        assert_eq!(ledger.tally().score.home, 2);

        let imported = by(EventKind::Point(1), Side::Home, "7").canonical();
        let err = commit(&rules, &mut ledger, imported, ClockMark::Second(300)).unwrap_err();
        assert!(matches!(err, MatchError::DuplicateEvent(_)));
    }

    #[test]
    fn local_events_cannot_go_back_in_time() {
        let (rules, mut ledger) = started(Sport::Football);
        commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(30)).unwrap();
        let err =
            commit(&rules, &mut ledger, goal(Side::Away, "3"), ClockMark::Minute(20)).unwrap_err();
        assert!(matches!(err, MatchError::InvalidEvent(_)));

        let imported = goal(Side::Away, "ext:Smith").canonical();
        commit(&rules, &mut ledger, imported, ClockMark::Minute(20)).unwrap();
        assert_eq!(ledger.tally().score, Score::new(1, 1));
    }

    #[test]
    fn events_for_side_and_score_history() {
        let (rules, mut ledger) = started(Sport::Football);
        commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(3)).unwrap();
        commit(&rules, &mut ledger, goal(Side::Away, "5"), ClockMark::Minute(8)).unwrap();
        commit(&rules, &mut ledger, goal(Side::Home, "9"), ClockMark::Minute(12)).unwrap();

        assert_eq!(ledger.events_for(Side::Home).count(), 2);
        assert_eq!(ledger.events_for(Side::Away).count(), 1);
        assert_eq!(ledger.score_at(0), Some(Score::default()));
        assert_eq!(ledger.score_at(2), Some(Score::new(1, 1)));
        assert_eq!(ledger.score_at(3), Some(Score::new(2, 1)));
        assert_eq!(ledger.score_at(4), None);
    }

    mod replay_properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Advance(Transition),
            Event { kind: u8, home: bool, player: u8, value: u32 },
            SetScore { home: bool, value: u32 },
            Wait(u32),
        }

        fn sport() -> impl Strategy<Value = Sport> {
            prop_oneof![Just(Sport::Football), Just(Sport::Basketball), Just(Sport::Volleyball)]
        }

        fn step() -> impl Strategy<Value = Step> {
            let transition = prop_oneof![
                Just(Transition::Start),
                Just(Transition::EndPeriod),
                Just(Transition::Resume),
                Just(Transition::Finish),
            ];
            prop_oneof![
                1 => transition.prop_map(Step::Advance),
                8 => (0u8..5, any::<bool>(), 0u8..3, 1u32..=3).prop_map(
                    |(kind, home, player, value)| Step::Event { kind, home, player, value }
                ),
                1 => (any::<bool>(), 0u32..30)
                    .prop_map(|(home, value)| Step::SetScore { home, value }),
                2 => (0u32..4).prop_map(Step::Wait),
            ]
        }

        /// Commit every step the rules accept, in order, on a ticking clock.
        fn play(sport: Sport, steps: &[Step]) -> EventLedger {
            let config = RuleConfig {
                set_points: 5,
                deciding_set_points: 3,
                sets_to_win: 2,
                ..RuleConfig::default()
            };
            let rules = RuleSet::for_sport(sport, config);
            let mut ledger = EventLedger::new(rules.rules());
            let mut clock = 0;

            for step in steps {
                let request = match *step {
                    Step::Advance(action) => {
                        match rules.rules().next_status(ledger.tally(), action) {
                            Ok(to) => EventRequest::status(to),
                            Err(_) => continue,
                        }
                    }
                    Step::Event { kind, home, player: id, value } => {
                        let side = if home { Side::Home } else { Side::Away };
                        let kind = match kind {
                            0 => EventKind::Goal,
                            1 if value == 3 => EventKind::Card(CardColor::Red),
                            1 => EventKind::Card(CardColor::Yellow),
                            2 => EventKind::Point(value),
                            3 => EventKind::Foul,
                            _ => EventKind::Timeout,
                        };
                        let request = EventRequest::new(kind, side);
                        if kind.requires_player() {
                            request.with_player(player(&id.to_string()))
                        } else {
                            request
                        }
                    }
                    Step::SetScore { home, value } => {
                        let side = if home { Side::Home } else { Side::Away };
                        EventRequest::new(EventKind::ScoreSet(value), side)
                    }
                    Step::Wait(n) => {
                        clock += n;
                        continue;
                    }
                };
                let mark = match sport {
                    Sport::Football => ClockMark::Minute(clock),
                    Sport::Basketball => ClockMark::Second(clock),
                    Sport::Volleyball => ClockMark::Rally(clock),
                };

                let before = (ledger.len(), ledger.tally().clone());
                if ledger.commit(rules.rules(), &request, mark, Utc::now()).is_err() {
                    let after = (ledger.len(), ledger.tally().clone());
                    assert_eq!(after, before, "rejected commit changed the ledger");
                }
            }
            ledger
        }

        proptest! {
            #[test]
            fn replay_equals_tally_for_any_accepted_stream(
                sport in sport(),
                steps in prop::collection::vec(step(), 0..120),
            ) {
                let ledger = play(sport, &steps);
                prop_assert_eq!(&ledger.replay(), ledger.tally());
                if let Some(last) = ledger.len().checked_sub(1) {
                    prop_assert_eq!(ledger.score_at(last), Some(ledger.tally().score));
                }
            }

            #[test]
            fn volleyball_streams_replay_through_set_wins(
                rallies in prop::collection::vec(any::<bool>(), 0..60),
            ) {
                let mut steps = vec![Step::Advance(Transition::Start)];
                steps.extend(rallies.into_iter().flat_map(|home| {
                    [Step::Event { kind: 2, home, player: 1, value: 1 }, Step::Wait(1)]
                }));
                let ledger = play(Sport::Volleyball, &steps);
                prop_assert_eq!(&ledger.replay(), ledger.tally());
                let set_wins = ledger
                    .events()
                    .iter()
                    .filter(|e| matches!(e.kind, EventKind::SetWin { .. }))
                    .count() as u32;
                let sets_won = ledger.tally().sets_won;
                prop_assert_eq!(set_wins, sets_won.home + sets_won.away);
            }
        }
    }
}
