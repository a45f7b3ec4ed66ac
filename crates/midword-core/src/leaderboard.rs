//! Sharded order-statistics aggregates and the two leaderboards built on them.
//!
//! An [`Aggregate`] partitions entries by a hash of their row identity. Each
//! shard owns a treap plus an id index behind its own mutex, so concurrent
//! upserts of different rows rarely contend. Queries visit every shard and add
//! up the per-shard answers.
//!
//! Every row carries the version it was written at. Events can reach the
//! aggregate out of commit order, so an upsert older than the stored row is
//! dropped.

use crate::consts::ANONYMOUS_SCORE_DIVISOR;
use crate::guess::Guess;
use crate::ostree::OrderStatTree;
use crate::types::{RoundId, User, UserId};
use chrono::{DateTime, Utc};
use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};
use tracing::error;

/// Position of one entry in an aggregate: prefix first, then key, then id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot<P, K> {
    pub prefix: P,
    pub key: K,
    pub id: UserId,
}

struct Stored<P, K> {
    slot: Slot<P, K>,
    value: f64,
    version: u64,
}

struct Shard<P, K> {
    tree: OrderStatTree<Slot<P, K>>,
    by_id: HashMap<(P, UserId), Stored<P, K>>,
}

impl<P: Ord, K: Ord> Shard<P, K> {
    fn new() -> Self {
        Self {
            tree: OrderStatTree::new(),
            by_id: HashMap::new(),
        }
    }
}

pub struct Aggregate<P, K> {
    shards: Vec<Mutex<Shard<P, K>>>,
}

impl<P, K> Aggregate<P, K>
where
    P: Ord + Hash + Clone,
    K: Ord + Clone,
{
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| Mutex::new(Shard::new()))
            .collect();
        Self { shards }
    }

    fn shard_for(&self, prefix: &P, id: &str) -> MutexGuard<'_, Shard<P, K>> {
        let mut hasher = FnvHasher::default();
        prefix.hash(&mut hasher);
        id.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        lock(&self.shards[idx])
    }

    /// Places row `(prefix, id)` at `key` as of `version`. Applying the same
    /// call twice is a no-op, and a version below the stored one is ignored.
    /// Returns whether anything changed.
    pub fn upsert(&self, prefix: P, id: &str, key: K, value: f64, version: u64) -> bool {
        let slot = Slot {
            prefix: prefix.clone(),
            key,
            id: id.to_string(),
        };
        let mut shard = self.shard_for(&prefix, id);
        let row = (prefix, id.to_string());

        if let Some(old) = shard.by_id.get_mut(&row) {
            if version < old.version {
                return false;
            }
            if old.slot == slot && old.value == value {
                old.version = version;
                return false;
            }
            let old_slot = old.slot.clone();
            shard.tree.remove(&old_slot);
        }
        shard.tree.insert(slot.clone(), value);
        shard.by_id.insert(
            row,
            Stored {
                slot,
                value,
                version,
            },
        );
        true
    }

    pub fn remove(&self, prefix: &P, id: &str) -> bool {
        let mut shard = self.shard_for(prefix, id);
        match shard.by_id.remove(&(prefix.clone(), id.to_string())) {
            Some(old) => {
                shard.tree.remove(&old.slot);
                true
            }
            None => false,
        }
    }

    /// Current key and value of a row.
    pub fn get(&self, prefix: &P, id: &str) -> Option<(K, f64)> {
        let shard = self.shard_for(prefix, id);
        shard
            .by_id
            .get(&(prefix.clone(), id.to_string()))
            .map(|s| (s.slot.key.clone(), s.value))
    }

    /// Entries sorting strictly before `(prefix, key, id)`.
    ///
    /// With `within_prefix` only entries sharing `prefix` are counted.
    pub fn offset_of(&self, prefix: &P, key: &K, id: &str, within_prefix: bool) -> usize {
        let probe = Slot {
            prefix: prefix.clone(),
            key: key.clone(),
            id: id.to_string(),
        };
        self.shards
            .iter()
            .map(|s| {
                let shard = lock(s);
                let before = shard.tree.count_before(|slot| *slot < probe);
                if within_prefix {
                    before - shard.tree.count_before(|slot| slot.prefix < *prefix)
                } else {
                    before
                }
            })
            .sum()
    }

    /// Sum of values, optionally only under `prefix`.
    pub fn sum(&self, prefix: Option<&P>) -> f64 {
        self.shards
            .iter()
            .map(|s| {
                let shard = lock(s);
                match prefix {
                    None => shard.tree.total(),
                    Some(p) => {
                        shard.tree.sum_before(|slot| slot.prefix <= *p)
                            - shard.tree.sum_before(|slot| slot.prefix < *p)
                    }
                }
            })
            .sum()
    }

    pub fn count(&self, prefix: Option<&P>) -> usize {
        self.shards
            .iter()
            .map(|s| {
                let shard = lock(s);
                match prefix {
                    None => shard.tree.len(),
                    Some(p) => {
                        shard.tree.count_before(|slot| slot.prefix <= *p)
                            - shard.tree.count_before(|slot| slot.prefix < *p)
                    }
                }
            })
            .sum()
    }

    /// First `n` entries in order, optionally only under `prefix`.
    pub fn top(&self, prefix: Option<&P>, n: usize) -> Vec<(Slot<P, K>, f64)> {
        let mut merged: Vec<(Slot<P, K>, f64)> = Vec::new();
        for s in &self.shards {
            let shard = lock(s);
            let iter = match prefix {
                Some(p) => shard.tree.iter_from(|slot| slot.prefix < *p),
                None => shard.tree.iter(),
            };
            merged.extend(
                iter.take_while(|(slot, _)| prefix.is_none_or(|p| slot.prefix == *p))
                    .take(n)
                    .map(|(slot, v)| (slot.clone(), v)),
            );
        }
        merged.sort_by(|a, b| a.0.cmp(&b.0));
        merged.truncate(n);
        merged
    }

    pub fn clear(&self) {
        for s in &self.shards {
            let mut shard = lock(s);
            *shard = Shard::new();
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic mid-update leaves at most one row stale; replay repairs it.
    m.lock().unwrap_or_else(|poisoned| {
        error!("Leaderboard shard lock poisoned, continuing");
        poisoned.into_inner()
    })
}

/// Per-round order: higher score first, then earlier submission, unsubmitted last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundScoreKey {
    pub score: Reverse<i64>,
    pub submitted_ms: i64,
}

impl RoundScoreKey {
    pub fn new(score: i64, submitted_at: Option<DateTime<Utc>>) -> Self {
        Self {
            score: Reverse(score),
            submitted_ms: submitted_at.map_or(i64::MAX, |t| t.timestamp_millis()),
        }
    }

    pub fn for_guess(guess: &Guess) -> Self {
        Self::new(guess.score, guess.submitted_at)
    }
}

/// Global order: higher adjusted score first, then older accounts.
///
/// Adjusted scores are kept in thousandths so the anonymous divisor stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalScoreKey {
    pub adjusted_millis: Reverse<i64>,
    pub created_ms: i64,
}

impl GlobalScoreKey {
    pub fn for_user(user: &User) -> Self {
        Self {
            adjusted_millis: Reverse(adjusted_millis(user)),
            created_ms: user.created_at.timestamp_millis(),
        }
    }
}

/// Named users count in full, anonymous ones at 1/1000, captured ones not at all.
pub fn adjusted_millis(user: &User) -> i64 {
    match (user.anonymous, user.captured) {
        (false, _) => user.score.saturating_mul(1000),
        (true, false) => (user.score as f64 * 1000.0 / ANONYMOUS_SCORE_DIVISOR).round() as i64,
        (true, true) => 0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based.
    pub rank: usize,
    pub user_id: UserId,
    pub score: i64,
}

/// The per-round and global boards.
pub struct Leaderboards {
    rounds: Aggregate<RoundId, RoundScoreKey>,
    global: Aggregate<(), GlobalScoreKey>,
}

impl Leaderboards {
    pub fn new(shard_count: usize) -> Self {
        Self {
            rounds: Aggregate::new(shard_count),
            global: Aggregate::new(shard_count),
        }
    }

    /// Every committed guess write appends one attempt, so the attempt count
    /// orders writes of one row.
    pub fn upsert_guess(&self, guess: &Guess) -> bool {
        self.rounds.upsert(
            guess.round_id,
            &guess.user_id,
            RoundScoreKey::for_guess(guess),
            guess.score as f64,
            guess.attempts.len() as u64,
        )
    }

    pub fn remove_guess(&self, round_id: RoundId, user_id: &str) -> bool {
        self.rounds.remove(&round_id, user_id)
    }

    pub fn upsert_user(&self, user: &User) -> bool {
        self.global.upsert(
            (),
            &user.id,
            GlobalScoreKey::for_user(user),
            user.score as f64,
            user.version.max(0) as u64,
        )
    }

    pub fn remove_user(&self, user_id: &str) -> bool {
        self.global.remove(&(), user_id)
    }

    /// 1-based rank of a user's guess within its round.
    pub fn round_rank(&self, round_id: RoundId, user_id: &str) -> Option<usize> {
        let (key, _) = self.rounds.get(&round_id, user_id)?;
        Some(self.rounds.offset_of(&round_id, &key, user_id, true) + 1)
    }

    pub fn global_rank(&self, user_id: &str) -> Option<usize> {
        let (key, _) = self.global.get(&(), user_id)?;
        Some(self.global.offset_of(&(), &key, user_id, false) + 1)
    }

    pub fn round_total(&self, round_id: RoundId) -> i64 {
        self.rounds.sum(Some(&round_id)).round() as i64
    }

    pub fn round_players(&self, round_id: RoundId) -> usize {
        self.rounds.count(Some(&round_id))
    }

    pub fn global_total(&self) -> i64 {
        self.global.sum(None).round() as i64
    }

    pub fn global_players(&self) -> usize {
        self.global.count(None)
    }

    pub fn top_round(&self, round_id: RoundId, n: usize) -> Vec<LeaderboardEntry> {
        to_entries(self.rounds.top(Some(&round_id), n))
    }

    pub fn top_global(&self, n: usize) -> Vec<LeaderboardEntry> {
        to_entries(self.global.top(None, n))
    }

    pub fn clear(&self) {
        self.rounds.clear();
        self.global.clear();
    }
}

fn to_entries<P, K>(rows: Vec<(Slot<P, K>, f64)>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .enumerate()
        .map(|(i, (slot, value))| LeaderboardEntry {
            rank: i + 1,
            user_id: slot.id,
            score: value.round() as i64,
        })
        .collect()
}
