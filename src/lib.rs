//! Live match operator: per-sport scoring rules, a match clock, an append-only
//! event ledger and background sync with the scoreboard backend.

pub mod commands;
pub mod error;
pub mod ledger;
pub mod machine;
pub mod model;
pub mod operator;
pub mod pending;
pub mod rules;
pub mod settings;
pub mod status;
pub mod sync;
pub mod timer;

pub use error::{MatchError, MatchResult};
pub use machine::{MatchSnapshot, MatchStateMachine};
pub use model::{EventKind, EventRequest, MatchEvent, MatchSetup, Side, Sport};
pub use operator::{MatchOperator, Notice, Recorded};
pub use settings::Settings;
pub use status::{MatchStatus, Transition};
