/// Number of ranked targets in a round's match set.
pub const NUM_MATCHES: usize = 5;

/// Maximum attempts a player gets per round.
pub const MAX_ATTEMPTS: usize = 9;

/// Size of the cached match list computed around a midpoint.
pub const TOP_MATCHES: usize = 100;

/// Reciprocal rank fusion constant. Contribution is 1 / (k + rank + 1).
pub const RRF_K: f32 = 60.0;

/// Divisor applied to anonymous users on the global board.
pub const ANONYMOUS_SCORE_DIVISOR: f64 = 1000.0;

/// Shards for the hot `guesses:total` counter.
pub const TOTAL_COUNTER_SHARDS: usize = 50;

/// Shards for every other counter.
pub const DEFAULT_COUNTER_SHARDS: usize = 10;

/// Partitions of each leaderboard index.
pub const DEFAULT_LEADERBOARD_SHARDS: usize = 16;

/// Name of the global guess counter.
pub const TOTAL_GUESSES_COUNTER: &str = "guesses:total";
