//! The match clock.
//!
//! One [`TimerService`] belongs to one match. It runs at most one ticker task
//! at a time and reports through an unbounded channel so the owner can select
//! on clock events next to its other inputs. Every start, pause and stop bumps
//! a generation number under the clock lock; a ticker only mutates the clock
//! while its own generation is current, and `stop()` awaits the ticker task
//! before it returns.

use log::{debug, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Up,
    /// Counts towards zero and clamps there.
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSpec {
    pub direction: Direction,
    /// Face value when the clock is (re)started.
    pub start_secs: u32,
    /// Clock seconds added or removed per tick.
    pub step_secs: u32,
    /// Real time between ticks.
    pub tick: Duration,
}

impl ClockSpec {
    pub fn count_up(start_secs: u32, step_secs: u32, tick: Duration) -> Self {
        Self { direction: Direction::Up, start_secs, step_secs, tick }
    }

    pub fn count_down(length_secs: u32, tick: Duration) -> Self {
        Self { direction: Direction::Down, start_secs: length_secs, step_secs: 1, tick }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClockReading {
    /// What the scoreboard shows, in seconds.
    pub face_secs: u32,
    /// Clock seconds run since the last start.
    pub elapsed_secs: u32,
    pub running: bool,
    pub expired: bool,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick(ClockReading),
    /// A count-down clock reached zero and stopped.
    PeriodExpired { generation: u64 },
}

#[derive(Debug, Default)]
struct ClockState {
    spec: Option<ClockSpec>,
    face_secs: u32,
    elapsed_secs: u32,
    running: bool,
    expired: bool,
    generation: u64,
}

impl ClockState {
    fn reading(&self) -> ClockReading {
        ClockReading {
            face_secs: self.face_secs,
            elapsed_secs: self.elapsed_secs,
            running: self.running,
            expired: self.expired,
            generation: self.generation,
        }
    }
}

fn lock(state: &Mutex<ClockState>) -> MutexGuard<'_, ClockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Ticker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct TimerService {
    state: Arc<Mutex<ClockState>>,
    events: mpsc::UnboundedSender<TimerEvent>,
    ticker: Option<Ticker>,
}

impl TimerService {
    pub fn new(events: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self { state: Arc::new(Mutex::new(ClockState::default())), events, ticker: None }
    }

    /// Reset the clock to `spec` and start ticking. Any running ticker is
    /// stopped first.
    pub async fn start(&mut self, spec: ClockSpec) {
        self.halt().await;
        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.spec = Some(spec);
            state.face_secs = spec.start_secs;
            state.elapsed_secs = 0;
            state.expired = false;
            state.running = true;
            state.generation
        };
        debug!("clock started at {}s (generation {generation})", spec.start_secs);
        self.spawn_ticker(spec, generation);
    }

    /// Stop ticking but keep the reading so the clock can resume.
    pub async fn pause(&mut self) {
        self.halt().await;
    }

    /// Continue a paused clock. Does nothing for an expired or cleared clock.
    pub fn resume(&mut self) -> bool {
        if self.ticker.is_some() {
            return false;
        }
        let (spec, generation) = {
            let mut state = lock(&self.state);
            let Some(spec) = state.spec else { return false };
            if state.expired || state.running {
                return false;
            }
            state.generation += 1;
            state.running = true;
            (spec, state.generation)
        };
        self.spawn_ticker(spec, generation);
        true
    }

    /// Stop the clock and forget its spec. Once this returns no tick from an
    /// earlier start can change the clock or reach the channel.
    pub async fn stop(&mut self) {
        self.halt().await;
        lock(&self.state).spec = None;
    }

    pub fn reading(&self) -> ClockReading {
        lock(&self.state).reading()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    async fn halt(&mut self) {
        {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.running = false;
        }
        if let Some(ticker) = self.ticker.take() {
            // The ticker may already have exited on expiry.
            let _ = ticker.stop.send(());
            if let Err(e) = ticker.handle.await {
                warn!("clock ticker ended abnormally: {e}");
            }
        }
    }

    fn spawn_ticker(&mut self, spec: ClockSpec, generation: u64) {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(run_ticker(
            self.state.clone(),
            self.events.clone(),
            spec,
            generation,
            stopped,
        ));
        self.ticker = Some(Ticker { stop, handle });
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.handle.abort();
        }
    }
}

async fn run_ticker(
    state: Arc<Mutex<ClockState>>,
    events: mpsc::UnboundedSender<TimerEvent>,
    spec: ClockSpec,
    generation: u64,
    mut stopped: oneshot::Receiver<()>,
) {
    let mut interval = interval_at(Instant::now() + spec.tick, spec.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stopped => break,
            _ = interval.tick() => {}
        }

        let (reading, expired) = {
            let mut state = lock(&state);
            if state.generation != generation {
                break;
            }
            state.elapsed_secs += spec.step_secs;
            match spec.direction {
                Direction::Up => state.face_secs += spec.step_secs,
                Direction::Down => {
                    state.face_secs = state.face_secs.saturating_sub(spec.step_secs);
                    if state.face_secs == 0 {
                        state.expired = true;
                        state.running = false;
                    }
                }
            }
            (state.reading(), state.expired)
        };

        if events.send(TimerEvent::Tick(reading)).is_err() {
            break;
        }
        if expired {
            debug!("clock expired (generation {generation})");
            let _ = events.send(TimerEvent::PeriodExpired { generation });
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, sleep};

    fn service() -> (TimerService, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TimerService::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_leaves_clock_untouched() {
        let (mut timer, mut rx) = service();
        timer.start(ClockSpec::count_up(0, 60, Duration::from_secs(1))).await;
        timer.stop().await;

        advance(Duration::from_secs(5)).await;
        sleep(Duration::from_secs(5)).await;

        let reading = timer.reading();
        assert_eq!(reading.elapsed_secs, 0);
        assert_eq!(reading.face_secs, 0);
        assert!(!reading.running);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_lands_after_stop() {
        let (mut timer, mut rx) = service();
        timer.start(ClockSpec::count_down(600, Duration::from_secs(1))).await;
        sleep(Duration::from_millis(2500)).await;
        timer.stop().await;
        let frozen = timer.reading();
        assert_eq!(frozen.face_secs, 598);

        while rx.try_recv().is_ok() {}
        sleep(Duration::from_secs(3)).await;
        assert_eq!(timer.reading().face_secs, frozen.face_secs);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn count_up_advances_one_step_per_tick() {
        let (mut timer, mut rx) = service();
        timer.start(ClockSpec::count_up(45 * 60, 60, Duration::from_secs(60))).await;
        sleep(Duration::from_secs(150)).await;

        let reading = timer.reading();
        assert_eq!(reading.face_secs, 47 * 60);
        assert_eq!(reading.elapsed_secs, 120);
        assert!(matches!(rx.recv().await, Some(TimerEvent::Tick(r)) if r.face_secs == 46 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn count_down_clamps_and_expires() {
        let (mut timer, mut rx) = service();
        timer.start(ClockSpec::count_down(3, Duration::from_secs(1))).await;
        let generation = timer.generation();

        let mut faces = Vec::new();
        loop {
            match rx.recv().await {
                Some(TimerEvent::Tick(reading)) => faces.push(reading.face_secs),
                Some(TimerEvent::PeriodExpired { generation: g }) => {
                    assert_eq!(g, generation);
                    break;
                }
                None => panic!("timer channel closed"),
            }
        }
        assert_eq!(faces, vec![2, 1, 0]);
        let reading = timer.reading();
        assert!(reading.expired);
        assert!(!reading.running);
        assert!(!timer.resume());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_keep_the_reading() {
        let (mut timer, _rx) = service();
        timer.start(ClockSpec::count_down(600, Duration::from_secs(1))).await;
        sleep(Duration::from_millis(3500)).await;
        timer.pause().await;
        let paused = timer.generation();
        assert_eq!(timer.reading().face_secs, 597);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(timer.reading().face_secs, 597);

        assert!(timer.resume());
        assert!(timer.generation() > paused);
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(timer.reading().face_secs, 595);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_invalidates_earlier_generation() {
        let (mut timer, _rx) = service();
        timer.start(ClockSpec::count_down(600, Duration::from_secs(1))).await;
        let first = timer.generation();
        timer.start(ClockSpec::count_down(600, Duration::from_secs(1))).await;
        assert!(timer.generation() > first);
        assert_eq!(timer.reading().elapsed_secs, 0);
    }
}
