// Internal Modules
pub mod config;
pub mod consts;
pub mod counter;
pub mod error;
pub mod events;
pub mod guess;
pub mod leaderboard;
pub mod matches;
pub mod ostree;
pub mod round;
pub mod types;
pub mod vector;
