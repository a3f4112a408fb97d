use anyhow::Context;
use log::{error, info, warn};
use matchop::commands::{self, ConsoleCommand, HELP};
use matchop::model::{Player, TeamSheet};
use matchop::sync::{ListWatcher, LiveMatchBackend, load_setup};
use matchop::{
    EventKind, MatchOperator, MatchResult, MatchSetup, Notice, Recorded, Settings, Side, Sport,
};
use scoreboard_api::LiveMatch;
use scoreboard_api::client::LiveMatchApi;
use serde::Serialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

enum Mode {
    Operate(String),
    Offline(Sport),
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(mode) = handle_cli_args() else {
        return Ok(());
    };

    better_panic::install();

    let settings = Settings::load();
    init_logging(&settings.log_filter);

    match mode {
        Mode::List => watch_list(&settings).await,
        Mode::Offline(sport) => {
            info!("running an offline {} match", sport.label());
            let operator = MatchOperator::spawn(demo_setup(sport), &settings, None);
            console(operator).await
        }
        Mode::Operate(match_id) => {
            let backend: Arc<dyn LiveMatchBackend> =
                Arc::new(LiveMatchApi::with_base_url(settings.api_url.clone()));
            let (setup, live) = load_setup(backend.as_ref(), &match_id)
                .await
                .with_context(|| format!("loading match {match_id} from {}", settings.api_url))?;
            if live.is_live() {
                warn!(
                    "match {match_id} is already {} on the backend; \
                     local state starts from NOT_STARTED",
                    live.status
                );
            }
            let operator = MatchOperator::spawn(setup, &settings, Some(backend));
            console(operator).await
        }
    }
}

fn handle_cli_args() -> Option<Mode> {
    let mut args = std::env::args().skip(1);
    let Some(arg) = args.next() else {
        eprintln!("{}", usage_text());
        std::process::exit(2);
    };

    match arg.as_str() {
        "-h" | "--help" => {
            println!("{}", usage_text());
            None
        }
        "-V" | "--version" => {
            println!("matchop {}", env!("CARGO_PKG_VERSION"));
            None
        }
        "--list" => Some(Mode::List),
        "--offline" => {
            let sport = args.next().as_deref().and_then(Sport::from_game_type);
            let Some(sport) = sport else {
                eprintln!("--offline needs a sport: football, basketball or volleyball");
                std::process::exit(2);
            };
            Some(Mode::Offline(sport))
        }
        id if !id.starts_with('-') => Some(Mode::Operate(id.to_owned())),
        _ => {
            eprintln!("Unknown argument: {arg}\n\n{}", usage_text());
            std::process::exit(2);
        }
    }
}

fn usage_text() -> &'static str {
    "matchop - live match operator console

Usage:
  matchop <match-id>           operate a match loaded from the backend
  matchop --offline <sport>    operate a local match with generated rosters
  matchop --list               watch the backend's live matches
  matchop --help
  matchop --version

Environment:
  MATCHOP_API_URL                Backend base URL (default http://127.0.0.1:3000)
  MATCHOP_LOG                    Log filter (default info)
  MATCHOP_SCOREBOARD_POLL_SECS   Canonical poll interval (default 5)
  MATCHOP_LIST_POLL_SECS         Match list poll interval (default 30)
  MATCHOP_PUSH_ATTEMPTS          Attempts per backend write (default 5)
  MATCHOP_PUSH_BACKOFF_MS        First retry delay (default 500)
  MATCHOP_PENDING_TIMEOUT_SECS   How long an event waits for its player (default 60)
  MATCHOP_HALF_MINUTES           Football half length (default 45)
  MATCHOP_QUARTER_MINUTES        Basketball quarter length (default 10)"
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn console(operator: MatchOperator) -> anyhow::Result<()> {
    let (line_tx, mut lines) = mpsc::channel::<String>(16);
    let input = tokio::spawn(read_lines(line_tx));
    let mut notices = operator.notices();

    print_json(&operator.get_state());

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                match commands::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(command)) => execute(&operator, command).await,
                    Err(message) => eprintln!("{message}"),
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => show_notice(&notice),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("{skipped} notices skipped")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    input.abort();
    operator.close().await;
    Ok(())
}

async fn execute(operator: &MatchOperator, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Start => show(operator.start_match().await),
        ConsoleCommand::Next => show(operator.advance_period().await),
        ConsoleCommand::End => show(operator.end_match().await),
        ConsoleCommand::Event { kind, side, player } => record(operator, kind, side, player).await,
        ConsoleCommand::Player(player) => show(operator.resolve_pending_event(&player).await),
        ConsoleCommand::Cancel => show(operator.cancel_pending_event().await),
        ConsoleCommand::AddedTime { half, minutes } => {
            show(operator.set_added_time(half, minutes).await)
        }
        ConsoleCommand::Score { side, value } => show(operator.set_score(side, value).await),
        ConsoleCommand::Pause => show(operator.pause_clock().await),
        ConsoleCommand::Resume => show(operator.resume_clock().await),
        ConsoleCommand::State => print_json(&operator.get_state()),
        ConsoleCommand::History => show(operator.history().await),
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
}

/// Record an event, naming its player straight away when one was typed.
async fn record(operator: &MatchOperator, kind: EventKind, side: Side, player: Option<String>) {
    let recorded = match operator.record_event(kind, side).await {
        Ok(recorded) => recorded,
        Err(e) => return show::<()>(Err(e)),
    };
    match (recorded, player) {
        (Recorded::Pending { .. }, Some(player)) => {
            show(operator.resolve_pending_event(&player).await)
        }
        (recorded @ Recorded::Committed { .. }, Some(player)) => {
            warn!("{} takes no player, '{player}' ignored", kind.tag());
            print_json(&recorded);
        }
        (recorded, None) => print_json(&recorded),
    }
}

fn show<T: Serialize>(result: MatchResult<T>) {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => eprintln!("error: {e}"),
    }
}

fn show_notice(notice: &Notice) {
    if let Some(e) = notice.as_error() {
        warn!("{e}");
    }
    print_json(notice);
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("could not encode output: {e}"),
    }
}

async fn read_lines(lines: mpsc::Sender<String>) {
    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match reader.next_line().await {
            Ok(Some(line)) => {
                if lines.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {e}");
                break;
            }
        }
    }
}

async fn watch_list(settings: &Settings) -> anyhow::Result<()> {
    let backend: Arc<dyn LiveMatchBackend> =
        Arc::new(LiveMatchApi::with_base_url(settings.api_url.clone()));
    let (watcher, mut matches) = ListWatcher::spawn(backend, settings.sync.list_poll);

    loop {
        tokio::select! {
            changed = matches.changed() => {
                if changed.is_err() {
                    break;
                }
                let list = matches.borrow_and_update().clone();
                println!("{} live matches", list.len());
                for m in &list {
                    println!(
                        "{:>8}  {:<10} {:<12} {} {}-{} {}{}",
                        m.id,
                        m.sport.label(),
                        m.status,
                        m.home.name,
                        m.home_score,
                        m.away_score,
                        m.away.name,
                        set_scores(m)
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    watcher.stop().await;
    Ok(())
}

fn set_scores(live: &LiveMatch) -> String {
    if live.sets.is_empty() {
        return String::new();
    }
    let sets: Vec<String> = live.sets.iter().map(|(home, away)| format!("{home}-{away}")).collect();
    format!("  (sets {})", sets.join(", "))
}

/// Shirt numbers double as player ids so `goal home 7` works.
fn demo_setup(sport: Sport) -> MatchSetup {
    let size = match sport {
        Sport::Football => 11,
        Sport::Basketball => 5,
        Sport::Volleyball => 6,
    };
    let sheet = |id: &str, name: &str| TeamSheet {
        id: id.into(),
        name: name.into(),
        roster: (1..=size)
            .map(|n| Player {
                id: n.to_string(),
                name: format!("{name} {n}"),
                position: String::new(),
            })
            .collect(),
        externally_tracked: false,
    };
    MatchSetup {
        id: "offline".into(),
        sport,
        home: sheet("home", "Home"),
        away: sheet("away", "Away"),
        ..Default::default()
    }
}
