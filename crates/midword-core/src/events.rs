//! Row-change events and the reducers that keep derived aggregates current.
//!
//! Every committed write to a guess or user row produces a [`RowEvent`] with the
//! row before and after. The event is handed to a fixed list of reducers. Each
//! reducer is idempotent for leaderboards, so redelivering an event is harmless.

use crate::config::LeaderboardParams;
use crate::consts::TOTAL_GUESSES_COUNTER;
use crate::counter::{namespace_counter, round_counter, CounterRegistry};
use crate::guess::Guess;
use crate::leaderboard::Leaderboards;
use crate::types::{NamespaceId, User};
use rayon::prelude::*;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct RowEvent<T> {
    pub old: Option<T>,
    pub new: Option<T>,
}

impl<T> RowEvent<T> {
    pub fn inserted(new: T) -> Self {
        Self {
            old: None,
            new: Some(new),
        }
    }

    pub fn updated(old: T, new: T) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
        }
    }

    pub fn deleted(old: T) -> Self {
        Self {
            old: Some(old),
            new: None,
        }
    }
}

/// A guess change plus the namespace of its round.
#[derive(Debug, Clone, PartialEq)]
pub struct GuessEvent {
    pub namespace_id: NamespaceId,
    pub change: RowEvent<Guess>,
}

pub type UserEvent = RowEvent<User>;

type GuessReducer = fn(&Aggregates, &GuessEvent);
type UserReducer = fn(&Aggregates, &UserEvent);

const GUESS_REDUCERS: &[GuessReducer] = &[reduce_round_board, reduce_guess_counters];
const USER_REDUCERS: &[UserReducer] = &[reduce_global_board];

fn reduce_round_board(agg: &Aggregates, event: &GuessEvent) {
    match (&event.change.old, &event.change.new) {
        (_, Some(new)) => {
            agg.leaderboards.upsert_guess(new);
        }
        (Some(old), None) => {
            agg.leaderboards.remove_guess(old.round_id, &old.user_id);
        }
        (None, None) => {}
    }
}

fn reduce_guess_counters(agg: &Aggregates, event: &GuessEvent) {
    let Some(new) = &event.change.new else {
        return;
    };
    let before = event.change.old.as_ref().map_or(0, |g| g.attempts.len());
    let appended = new.attempts.len().saturating_sub(before) as u64;
    if appended == 0 {
        return;
    }
    agg.counters.increment(TOTAL_GUESSES_COUNTER, appended);
    agg.counters.increment(&round_counter(new.round_id), appended);
    agg.counters
        .increment(&namespace_counter(event.namespace_id), appended);
}

fn reduce_global_board(agg: &Aggregates, event: &UserEvent) {
    match (&event.old, &event.new) {
        (_, Some(new)) => {
            agg.leaderboards.upsert_user(new);
        }
        (Some(old), None) => {
            agg.leaderboards.remove_user(&old.id);
        }
        (None, None) => {}
    }
}

/// Shared derived state: leaderboards and counters.
///
/// Built once at startup and handed to request handlers behind an `Arc`.
pub struct Aggregates {
    pub leaderboards: Leaderboards,
    pub counters: CounterRegistry,
}

impl Default for Aggregates {
    fn default() -> Self {
        Self::new(&LeaderboardParams::default())
    }
}

impl Aggregates {
    pub fn new(params: &LeaderboardParams) -> Self {
        Self {
            leaderboards: Leaderboards::new(params.leaderboard_shards),
            counters: CounterRegistry::new(params.counter_shards),
        }
    }

    pub fn dispatch_guess(&self, event: &GuessEvent) {
        for reducer in GUESS_REDUCERS {
            reducer(self, event);
        }
    }

    pub fn dispatch_user(&self, event: &UserEvent) {
        for reducer in USER_REDUCERS {
            reducer(self, event);
        }
    }

    /// Drops everything and replays all rows as inserts.
    pub fn rebuild(&self, guesses: &[(NamespaceId, Guess)], users: &[User]) {
        self.leaderboards.clear();
        self.counters.reset();

        guesses.par_iter().for_each(|(namespace_id, guess)| {
            self.dispatch_guess(&GuessEvent {
                namespace_id: *namespace_id,
                change: RowEvent::inserted(guess.clone()),
            });
        });
        users.par_iter().for_each(|user| {
            self.dispatch_user(&RowEvent::inserted(user.clone()));
        });

        info!(
            "📊 Aggregates rebuilt: {} guesses, {} users",
            guesses.len(),
            users.len()
        );
        debug!("Counters: {:?}", self.counters.names());
    }
}
