use crate::model::{CardColor, EventKind, Side};

/// One line typed at the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    /// Close the running period or leave the break.
    Next,
    End,
    Event { kind: EventKind, side: Side, player: Option<String> },
    Player(String),
    Cancel,
    AddedTime { half: u8, minutes: u32 },
    Score { side: Side, value: u32 },
    Pause,
    Resume,
    State,
    History,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start | next | end            lifecycle
  goal <side> [player]          football
  card <side> <yellow|red> [player]
  point <side> [1-3] [player]   basketball / volleyball
  foul <side> [player]
  timeout <side>
  player <id or name>           name the player for the waiting event
  cancel                        drop the waiting event
  added <half> <minutes>        football added time
  score <side> <value>          set a score by hand
  pause | resume                match clock
  state | history | help | quit";

pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match verb.to_lowercase().as_str() {
        "start" => ConsoleCommand::Start,
        "next" | "advance" => ConsoleCommand::Next,
        "end" => ConsoleCommand::End,
        "cancel" => ConsoleCommand::Cancel,
        "pause" => ConsoleCommand::Pause,
        "resume" => ConsoleCommand::Resume,
        "state" | "s" => ConsoleCommand::State,
        "history" => ConsoleCommand::History,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        "player" | "p" => {
            if rest.is_empty() {
                return Err("player needs an id or a name".into());
            }
            ConsoleCommand::Player(rest.join(" "))
        }
        "goal" => event(EventKind::Goal, &rest)?,
        "foul" => event(EventKind::Foul, &rest)?,
        "timeout" => event(EventKind::Timeout, &rest)?,
        "card" => {
            let color = rest
                .get(1)
                .and_then(|c| CardColor::parse(c))
                .ok_or("card needs a colour: yellow or red")?;
            let mut without_color = rest.clone();
            without_color.remove(1);
            event(EventKind::Card(color), &without_color)?
        }
        "point" => {
            let value = rest.get(1).and_then(|v| v.parse::<u32>().ok());
            let mut args = rest.clone();
            if value.is_some() {
                args.remove(1);
            }
            event(EventKind::Point(value.unwrap_or(1)), &args)?
        }
        "added" => {
            let half = number(rest.first(), "added needs a half (1 or 2)")?;
            let minutes = number(rest.get(1), "added needs minutes")?;
            ConsoleCommand::AddedTime { half: half as u8, minutes }
        }
        "score" => {
            let side = side(rest.first())?;
            let value = number(rest.get(1), "score needs a value")?;
            ConsoleCommand::Score { side, value }
        }
        other => return Err(format!("unknown command '{other}', try help")),
    };
    Ok(Some(command))
}

fn event(kind: EventKind, args: &[&str]) -> Result<ConsoleCommand, String> {
    let side = side(args.first())?;
    let player = (args.len() > 1).then(|| args[1..].join(" "));
    Ok(ConsoleCommand::Event { kind, side, player })
}

fn side(word: Option<&&str>) -> Result<Side, String> {
    word.and_then(|w| Side::parse(w)).ok_or_else(|| "expected a side: home or away".to_string())
}

fn number(word: Option<&&str>, missing: &str) -> Result<u32, String> {
    word.and_then(|w| w.parse().ok()).ok_or_else(|| missing.to_string())
}
