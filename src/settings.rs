use crate::rules::RuleConfig;
use log::warn;
use std::ops::RangeInclusive;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Canonical poll interval while a scoreboard is open.
    pub scoreboard_poll: Duration,
    /// Poll interval for list views.
    pub list_poll: Duration,
    pub push_attempts: u32,
    /// First retry delay; doubled after every failed attempt.
    pub push_backoff: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            scoreboard_poll: Duration::from_secs(5),
            list_poll: Duration::from_secs(30),
            push_attempts: 5,
            push_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub sync: SyncSettings,
    pub rules: RuleConfig,
    /// How long a pending event waits for its player.
    pub pending_timeout: Duration,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            sync: SyncSettings::default(),
            rules: RuleConfig::default(),
            pending_timeout: Duration::from_secs(60),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    /// Defaults overridden by `MATCHOP_*` environment variables.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Settings::default();
        let within = |key: &str, default: u64, range: RangeInclusive<u64>| -> u64 {
            parse_within(&lookup, key, default, range)
        };

        let sync = SyncSettings {
            scoreboard_poll: Duration::from_secs(within(
                "MATCHOP_SCOREBOARD_POLL_SECS",
                defaults.sync.scoreboard_poll.as_secs(),
                1..=3600,
            )),
            list_poll: Duration::from_secs(within(
                "MATCHOP_LIST_POLL_SECS",
                defaults.sync.list_poll.as_secs(),
                1..=3600,
            )),
            push_attempts: within(
                "MATCHOP_PUSH_ATTEMPTS",
                defaults.sync.push_attempts.into(),
                1..=100,
            ) as u32,
            push_backoff: Duration::from_millis(within(
                "MATCHOP_PUSH_BACKOFF_MS",
                defaults.sync.push_backoff.as_millis() as u64,
                0..=600_000,
            )),
        };

        let rules = RuleConfig {
            half_minutes: within(
                "MATCHOP_HALF_MINUTES",
                defaults.rules.half_minutes.into(),
                1..=120,
            ) as u32,
            quarter_secs: within(
                "MATCHOP_QUARTER_MINUTES",
                (defaults.rules.quarter_secs / 60).into(),
                1..=60,
            ) as u32
                * 60,
            ..defaults.rules
        };

        Self {
            api_url: lookup("MATCHOP_API_URL").unwrap_or(defaults.api_url),
            sync,
            rules,
            pending_timeout: Duration::from_secs(within(
                "MATCHOP_PENDING_TIMEOUT_SECS",
                defaults.pending_timeout.as_secs(),
                1..=3600,
            )),
            log_filter: lookup("MATCHOP_LOG").unwrap_or(defaults.log_filter),
        }
    }
}

/// Read `key` as a number in `range`. Anything else is logged and the
/// default kept.
fn parse_within(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
    range: RangeInclusive<u64>,
) -> u64 {
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(value) if range.contains(&value) => value,
        Ok(_) => {
            warn!("ignoring {key}={raw}: must be {} to {}", range.start(), range.end());
            default
        }
        Err(_) => {
            warn!("ignoring {key}={raw}: not a number");
            default
        }
    }
}
