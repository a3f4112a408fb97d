//! One running match.
//!
//! [`MatchOperator`] is a cheap handle; the match itself lives in a task that
//! owns the state machine, the pending event and the sync client. Commands,
//! clock events and sync results are handled one at a time in that task, so
//! a clock expiry, an operator goal and a poll result can never interleave
//! inside a commit.

use crate::error::{MatchError, MatchResult};
use crate::machine::{MatchSnapshot, MatchStateMachine};
use crate::model::{EventKind, EventRequest, MatchEvent, MatchSetup, Player, Side, Sport};
use crate::pending::{PendingEvent, PendingView};
use crate::settings::Settings;
use crate::status::{MatchStatus, Transition};
use crate::sync::{LiveMatchBackend, Push, SideVerdict, SyncClient, SyncEvent, push_plan, reconcile};
use crate::timer::TimerEvent;
use log::{debug, info, warn};
use scoreboard_api::{LiveMatch, PeriodPatch};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

const COMMAND_BUFFER: usize = 32;
const NOTICE_BUFFER: usize = 64;

/// Result of `record_event`: committed straight away, or waiting for a player.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Recorded {
    Committed { events: Vec<MatchEvent> },
    Pending { pending: PendingView },
}

/// Things the operator should know about that did not come from a command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notice", rename_all = "camelCase")]
pub enum Notice {
    /// The pending event was never given a player and has been dropped.
    PendingExpired { pending: PendingView },
    PeriodExpired { period: u8 },
    PushFailed { what: String, attempt: u32, message: String },
    PushAbandoned { what: String, message: String },
    PollFailed { message: String },
    SyncConflict { side: Side, local: u32, canonical: u32 },
    ImportRejected { what: String, message: String },
}

impl Notice {
    /// The error this notice reports, if it is one.
    pub fn as_error(&self) -> Option<MatchError> {
        match self {
            Notice::PendingExpired { .. } => Some(MatchError::MissingPlayer),
            Notice::PushAbandoned { message, .. } | Notice::PollFailed { message } => {
                Some(MatchError::NetworkFailure(message.clone()))
            }
            Notice::SyncConflict { side, local, canonical } => {
                Some(MatchError::SyncConflict { side: *side, local: *local, canonical: *canonical })
            }
            Notice::ImportRejected { message, .. } => {
                Some(MatchError::InvalidEvent(message.clone()))
            }
            Notice::PeriodExpired { .. } | Notice::PushFailed { .. } => None,
        }
    }
}

type Reply<T> = oneshot::Sender<MatchResult<T>>;

enum Command {
    Advance { action: Option<Transition>, reply: Reply<MatchSnapshot> },
    EndMatch { reply: Reply<MatchSnapshot> },
    Record { kind: EventKind, side: Side, reply: Reply<Recorded> },
    Resolve { player: String, reply: Reply<Vec<MatchEvent>> },
    CancelPending { reply: Reply<Option<PendingView>> },
    SetAddedTime { half: u8, minutes: u32, reply: Reply<MatchSnapshot> },
    SetScore { side: Side, value: u32, reply: Reply<MatchSnapshot> },
    PauseClock { reply: Reply<MatchSnapshot> },
    ResumeClock { reply: Reply<MatchSnapshot> },
    History { reply: Reply<Vec<MatchEvent>> },
    Close { reply: oneshot::Sender<()> },
}

pub struct MatchOperator {
    setup: MatchSetup,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<MatchSnapshot>,
    notices: broadcast::Sender<Notice>,
    task: JoinHandle<()>,
}

impl MatchOperator {
    /// Start the task for `setup`. Without a backend the match runs offline:
    /// nothing is pushed or polled.
    pub fn spawn(
        setup: MatchSetup,
        settings: &Settings,
        backend: Option<Arc<dyn LiveMatchBackend>>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);

        let machine = MatchStateMachine::new(setup.clone(), settings.rules.clone(), timer_tx);
        let sync = backend
            .map(|backend| SyncClient::spawn(backend, &setup.id, &settings.sync, sync_tx));
        let (state_tx, state) = watch::channel(machine.snapshot());

        let actor = MatchActor {
            sync_open: sync.is_some(),
            machine,
            sync,
            commands: command_rx,
            timer: timer_rx,
            sync_events: sync_rx,
            state: state_tx,
            notices: notices.clone(),
            pending: None,
            next_pending_id: 1,
            pending_timeout: settings.pending_timeout,
        };
        info!("operator for match {} ({}) started", setup.id, setup.sport.label());
        let task = tokio::spawn(actor.run());

        Self { setup, commands, state, notices, task }
    }

    pub fn setup(&self) -> &MatchSetup {
        &self.setup
    }

    pub async fn start_match(&self) -> MatchResult<MatchSnapshot> {
        self.advance(Transition::Start).await
    }

    pub async fn advance(&self, action: Transition) -> MatchResult<MatchSnapshot> {
        self.request(|reply| Command::Advance { action: Some(action), reply }).await
    }

    /// Close the running period or leave the current break.
    pub async fn advance_period(&self) -> MatchResult<MatchSnapshot> {
        self.request(|reply| Command::Advance { action: None, reply }).await
    }

    pub async fn end_match(&self) -> MatchResult<MatchSnapshot> {
        self.request(|reply| Command::EndMatch { reply }).await
    }

    /// Team events commit at once; player events wait for
    /// [`resolve_pending_event`](Self::resolve_pending_event).
    pub async fn record_event(&self, kind: EventKind, side: Side) -> MatchResult<Recorded> {
        self.request(|reply| Command::Record { kind, side, reply }).await
    }

    /// Name the player for the pending event, by roster id or name.
    pub async fn resolve_pending_event(&self, player: &str) -> MatchResult<Vec<MatchEvent>> {
        let player = player.to_owned();
        self.request(|reply| Command::Resolve { player, reply }).await
    }

    pub async fn cancel_pending_event(&self) -> MatchResult<Option<PendingView>> {
        self.request(|reply| Command::CancelPending { reply }).await
    }

    pub async fn set_added_time(&self, half: u8, minutes: u32) -> MatchResult<MatchSnapshot> {
        self.request(|reply| Command::SetAddedTime { half, minutes, reply }).await
    }

    /// Overwrite one side's score by hand.
    pub async fn set_score(&self, side: Side, value: u32) -> MatchResult<MatchSnapshot> {
        self.request(|reply| Command::SetScore { side, value, reply }).await
    }

    pub async fn pause_clock(&self) -> MatchResult<MatchSnapshot> {
        self.request(|reply| Command::PauseClock { reply }).await
    }

    pub async fn resume_clock(&self) -> MatchResult<MatchSnapshot> {
        self.request(|reply| Command::ResumeClock { reply }).await
    }

    /// Every committed event so far.
    pub async fn history(&self) -> MatchResult<Vec<MatchEvent>> {
        self.request(|reply| Command::History { reply }).await
    }

    /// Latest published state.
    pub fn get_state(&self) -> MatchSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MatchSnapshot> {
        self.state.clone()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Stop the clock, the sync tasks and the match task, and wait for all of
    /// them.
    pub async fn close(self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).await.is_ok() {
            let _ = done.await;
        }
        if let Err(e) = self.task.await {
            warn!("operator task for match {} ended abnormally: {e}", self.setup.id);
        }
        info!("operator for match {} closed", self.setup.id);
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> MatchResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).await.map_err(|_| MatchError::Closed)?;
        response.await.map_err(|_| MatchError::Closed)?
    }
}

struct MatchActor {
    machine: MatchStateMachine,
    sync: Option<SyncClient>,
    sync_open: bool,
    commands: mpsc::Receiver<Command>,
    timer: mpsc::UnboundedReceiver<TimerEvent>,
    sync_events: mpsc::UnboundedReceiver<SyncEvent>,
    state: watch::Sender<MatchSnapshot>,
    notices: broadcast::Sender<Notice>,
    pending: Option<PendingEvent>,
    next_pending_id: u64,
    pending_timeout: Duration,
}

impl MatchActor {
    async fn run(mut self) {
        loop {
            let deadline = self.pending.as_ref().map(|p| p.expires_at);
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Close { reply }) => {
                        self.teardown().await;
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(event) = self.timer.recv() => self.on_timer(event),
                event = self.sync_events.recv(), if self.sync_open => match event {
                    Some(event) => self.on_sync(event).await,
                    None => self.sync_open = false,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire_pending();
                }
            }
        }
        debug!("every handle for match {} dropped", self.machine.setup().id);
        self.teardown().await;
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Advance { action, reply } => {
                let result = self.advance(action).await;
                let _ = reply.send(result);
            }
            Command::EndMatch { reply } => {
                let played = self.played_minutes();
                let result = match self.machine.end_match().await {
                    Ok(events) => {
                        self.after_commit(&events, played);
                        Ok(self.snapshot())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Record { kind, side, reply } => {
                let result = self.record(kind, side).await;
                let _ = reply.send(result);
            }
            Command::Resolve { player, reply } => {
                let result = self.resolve(&player).await;
                let _ = reply.send(result);
            }
            Command::CancelPending { reply } => {
                let cancelled = self.pending.take().map(PendingEvent::cancel);
                if let Some(view) = &cancelled {
                    debug!("pending {} for {} cancelled", view.kind.tag(), view.side.label());
                    self.publish();
                }
                let _ = reply.send(Ok(cancelled));
            }
            Command::SetAddedTime { half, minutes, reply } => {
                let result = self.machine.set_added_time(half, minutes).map(|()| {
                    let patch = if half == 1 {
                        PeriodPatch::FirstAddedTime
                    } else {
                        PeriodPatch::SecondAddedTime
                    };
                    self.push(Push::Period { patch, minutes });
                    self.publish()
                });
                let _ = reply.send(result);
            }
            Command::SetScore { side, value, reply } => {
                let request = EventRequest::new(EventKind::ScoreSet(value), side);
                let result = match self.machine.record(request).await {
                    Ok(events) => {
                        self.after_commit(&events, 0);
                        Ok(self.snapshot())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::PauseClock { reply } => {
                self.machine.pause_clock().await;
                let _ = reply.send(Ok(self.publish()));
            }
            Command::ResumeClock { reply } => {
                let result = if self.machine.resume_clock() {
                    Ok(self.publish())
                } else {
                    Err(MatchError::InvalidEvent("the clock cannot resume now".into()))
                };
                let _ = reply.send(result);
            }
            Command::History { reply } => {
                let _ = reply.send(Ok(self.machine.ledger().events().to_vec()));
            }
            Command::Close { reply } => {
                // Handled in the run loop.
                let _ = reply.send(());
            }
        }
    }

    async fn advance(&mut self, action: Option<Transition>) -> MatchResult<MatchSnapshot> {
        let played = self.played_minutes();
        let events = match action {
            Some(action) => self.machine.transition(action).await?,
            None => self.machine.advance_period().await?,
        };
        self.after_commit(&events, played);
        Ok(self.snapshot())
    }

    async fn record(&mut self, kind: EventKind, side: Side) -> MatchResult<Recorded> {
        if !kind.requires_player() {
            let events = self.machine.record(EventRequest::new(kind, side)).await?;
            self.after_commit(&events, 0);
            return Ok(Recorded::Committed { events });
        }
        if self.pending.is_some() {
            return Err(MatchError::PendingOutstanding);
        }

        // Check everything but the player now so a doomed event is refused
        // before the operator picks someone.
        let trial = EventRequest::new(kind, side).with_player(Player::default());
        self.machine.rules().plan(self.machine.tally(), &trial)?;

        let pending = PendingEvent::new(
            self.next_pending_id,
            kind,
            side,
            self.machine.current_mark(),
            self.pending_timeout,
        );
        self.next_pending_id += 1;
        let view = pending.view();
        debug!("{} for {} waiting for a player", kind.tag(), side.label());
        self.pending = Some(pending);
        self.publish();
        Ok(Recorded::Pending { pending: view })
    }

    async fn resolve(&mut self, player: &str) -> MatchResult<Vec<MatchEvent>> {
        let Some(side) = self.pending.as_ref().map(|p| p.side) else {
            return Err(MatchError::InvalidEvent("no event is waiting for a player".into()));
        };
        // An unknown player leaves the event pending for another try.
        let player = self.machine.find_player(side, player)?;
        let Some(pending) = self.pending.take() else {
            return Err(MatchError::InvalidEvent("no event is waiting for a player".into()));
        };

        let mut request = pending.resolve(player);
        if let (Some(mark), Some(last)) = (request.mark, self.machine.tally().last_mark)
            && mark < last
        {
            request.mark = Some(last);
        }
        match self.machine.record(request).await {
            Ok(events) => {
                self.after_commit(&events, 0);
                Ok(events)
            }
            Err(e) => {
                self.publish();
                Err(e)
            }
        }
    }

    /// Queue backend writes for fresh local events and publish the new state.
    fn after_commit(&mut self, events: &[MatchEvent], played_minutes: u32) {
        for push in push_plan(events, self.machine.setup()) {
            self.push(push);
        }
        if self.machine.setup().sport == Sport::Football {
            for event in events {
                let patch = match event.kind {
                    EventKind::Status(MatchStatus::HalfTime) => PeriodPatch::FirstTime,
                    EventKind::Status(MatchStatus::FullTime) => PeriodPatch::SecondTime,
                    _ => continue,
                };
                self.push(Push::Period { patch, minutes: played_minutes });
            }
        }
        let status = self.machine.status();
        if self.machine.rules().is_terminal(status) {
            info!(
                "match {} final: {} ({})",
                self.machine.setup().id,
                self.machine.tally().score,
                status.wire_name()
            );
        }
        self.publish();
    }

    fn push(&self, push: Push) {
        if let Some(sync) = &self.sync {
            sync.push(push);
        }
    }

    fn played_minutes(&self) -> u32 {
        self.machine.clock().elapsed_secs / 60
    }

    fn on_timer(&mut self, event: TimerEvent) {
        if !self.machine.on_timer(event) {
            return;
        }
        if let TimerEvent::PeriodExpired { .. } = event {
            self.notify(Notice::PeriodExpired { period: self.machine.tally().period });
        }
        self.publish();
    }

    async fn on_sync(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Polled { snapshot, requested_at } => {
                self.merge(&snapshot, requested_at).await
            }
            SyncEvent::PollFailed { message } => self.notify(Notice::PollFailed { message }),
            SyncEvent::PushAcked { .. } => {
                self.publish();
            }
            SyncEvent::PushFailed { push, attempt, message } => {
                self.notify(Notice::PushFailed { what: push.to_string(), attempt, message });
            }
            SyncEvent::PushAbandoned { push, message } => {
                self.notify(Notice::PushAbandoned { what: push.to_string(), message });
                self.publish();
            }
        }
    }

    async fn merge(&mut self, canonical: &LiveMatch, requested_at: Instant) {
        if self.machine.status() == MatchStatus::NotStarted {
            return;
        }
        let unsettled = self.sync.as_ref().is_some_and(|sync| sync.is_unsettled(requested_at));
        let plan = reconcile(self.machine.ledger(), self.machine.setup(), canonical, unsettled);
        if plan.is_noop() {
            return;
        }

        for import in plan.imports.iter().cloned() {
            let what = import.kind.tag().to_string();
            if let Err(e) = self.machine.record(import).await {
                warn!("canonical {what} not imported: {e}");
                self.notify(Notice::ImportRejected { what, message: e.to_string() });
            }
        }

        for side in [Side::Home, Side::Away] {
            let value = match plan.verdict(side) {
                SideVerdict::Keep => continue,
                SideVerdict::Overwrite(value) => value,
                SideVerdict::Conflict { local, canonical } => {
                    warn!("{} score diverged: local {local}, canonical {canonical}", side.label());
                    self.notify(Notice::SyncConflict { side, local, canonical });
                    canonical
                }
            };
            if *self.machine.tally().score.get(side) == value {
                continue;
            }
            let request = EventRequest::new(EventKind::ScoreSet(value), side).canonical();
            if let Err(e) = self.machine.record(request).await {
                warn!("canonical {} score not applied: {e}", side.label());
            }
        }
        self.publish();
    }

    fn expire_pending(&mut self) {
        let now = Instant::now();
        if !self.pending.as_ref().is_some_and(|p| p.is_expired(now)) {
            return;
        }
        if let Some(pending) = self.pending.take() {
            warn!("{} for {} dropped: no player given", pending.kind.tag(), pending.side.label());
            self.notify(Notice::PendingExpired { pending: pending.cancel() });
            self.publish();
        }
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine.
        let _ = self.notices.send(notice);
    }

    fn snapshot(&self) -> MatchSnapshot {
        let mut snapshot = self.machine.snapshot();
        snapshot.pending = self.pending.as_ref().map(PendingEvent::view);
        snapshot.pushes_outstanding = self.sync.as_ref().map_or(0, SyncClient::outstanding);
        snapshot
    }

    fn publish(&self) -> MatchSnapshot {
        let snapshot = self.snapshot();
        self.state.send_replace(snapshot.clone());
        snapshot
    }

    async fn teardown(&mut self) {
        self.machine.shutdown().await;
        if let Some(sync) = self.sync.take() {
            sync.shutdown().await;
        }
        self.sync_open = false;
        self.pending = None;
        self.publish();
    }
}
