use crate::consts::{
    DEFAULT_COUNTER_SHARDS, DEFAULT_LEADERBOARD_SHARDS, MAX_ATTEMPTS, NUM_MATCHES, TOP_MATCHES,
};
use crate::error::{MidwordError, MwResult};
use crate::matches::MatchStrategy;
use chrono::NaiveTime;
use clap::{parser::ValueSource, ArgMatches, Args};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub rules: GameRules,
    #[command(flatten)]
    pub matching: MatchParams,
    #[command(flatten)]
    pub leaderboard: LeaderboardParams,
    #[command(flatten)]
    pub schedule: ScheduleParams,
}

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    #[arg(long, default_value_t = NUM_MATCHES)]
    pub num_matches: usize,
    #[arg(long, default_value_t = MAX_ATTEMPTS)]
    pub max_attempts: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            num_matches: NUM_MATCHES,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    #[arg(long, default_value_t = TOP_MATCHES)]
    pub top_matches: usize,
    /// Ordering used to pick a round's targets from the cached matches.
    #[arg(long, value_enum, default_value_t = MatchStrategy::LeftTimesRight)]
    pub round_strategy: MatchStrategy,
    #[arg(long, default_value_t = 3)]
    pub retry_attempts: usize,
    #[arg(long, default_value_t = 250)]
    pub retry_base_delay_ms: u64,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            top_matches: TOP_MATCHES,
            round_strategy: MatchStrategy::LeftTimesRight,
            retry_attempts: 3,
            retry_base_delay_ms: 250,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardParams {
    #[arg(long, default_value_t = DEFAULT_LEADERBOARD_SHARDS)]
    pub leaderboard_shards: usize,
    #[arg(long, default_value_t = DEFAULT_COUNTER_SHARDS)]
    pub counter_shards: usize,
}

impl Default for LeaderboardParams {
    fn default() -> Self {
        Self {
            leaderboard_shards: DEFAULT_LEADERBOARD_SHARDS,
            counter_shards: DEFAULT_COUNTER_SHARDS,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleParams {
    /// Daily rotation time, UTC, `HH:MM`.
    #[arg(long, default_value = "00:00")]
    pub rotate_at: String,
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub rotation_enabled: bool,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            rotate_at: "00:00".to_string(),
            rotation_enabled: true,
        }
    }
}

impl ScheduleParams {
    pub fn rotate_time(&self) -> MwResult<NaiveTime> {
        NaiveTime::parse_from_str(self.rotate_at.trim(), "%H:%M").map_err(|e| {
            MidwordError::Config(format!("Invalid --rotate-at '{}': {}", self.rotate_at, e))
        })
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> MwResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MwResult<()> {
        if self.rules.num_matches == 0 {
            return Err(MidwordError::Config("num_matches must be positive".into()));
        }
        if self.rules.max_attempts < self.rules.num_matches {
            return Err(MidwordError::Config(format!(
                "max_attempts ({}) must be at least num_matches ({})",
                self.rules.max_attempts, self.rules.num_matches
            )));
        }
        if self.matching.top_matches < self.rules.num_matches {
            return Err(MidwordError::Config(format!(
                "top_matches ({}) must cover num_matches ({})",
                self.matching.top_matches, self.rules.num_matches
            )));
        }
        if self.matching.retry_attempts == 0 {
            return Err(MidwordError::Config("retry_attempts must be positive".into()));
        }
        self.schedule.rotate_time()?;
        Ok(())
    }

    /// Overrides file values with the ones given explicitly on the command line.
    pub fn merge_from_cli(&mut self, cli: &Config, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($section:ident . $field:ident) => {
                if matches.value_source(stringify!($field)) == Some(ValueSource::CommandLine) {
                    self.$section.$field = cli.$section.$field.clone();
                }
            };
        }

        update_if_present!(rules.num_matches);
        update_if_present!(rules.max_attempts);

        update_if_present!(matching.top_matches);
        update_if_present!(matching.round_strategy);
        update_if_present!(matching.retry_attempts);
        update_if_present!(matching.retry_base_delay_ms);

        update_if_present!(leaderboard.leaderboard_shards);
        update_if_present!(leaderboard.counter_shards);

        update_if_present!(schedule.rotate_at);
        update_if_present!(schedule.rotation_enabled);
    }
}
