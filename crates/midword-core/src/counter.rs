//! Additive counters split over independent shards.
//!
//! Writers bump one random shard, readers sum all of them.

use crate::consts::{DEFAULT_COUNTER_SHARDS, TOTAL_COUNTER_SHARDS, TOTAL_GUESSES_COUNTER};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

#[derive(Debug)]
pub struct ShardedCounter {
    shards: Box<[AtomicU64]>,
}

impl ShardedCounter {
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1)).map(|_| AtomicU64::new(0)).collect();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn increment(&self, by: u64) {
        let idx = fastrand::usize(..self.shards.len());
        self.shards[idx].fetch_add(by, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.shards.iter().map(|s| s.load(Ordering::Relaxed)).sum()
    }

    pub fn reset(&self) {
        for s in self.shards.iter() {
            s.store(0, Ordering::Relaxed);
        }
    }
}

/// Named counters, created on first write.
#[derive(Debug)]
pub struct CounterRegistry {
    counters: RwLock<HashMap<String, Arc<ShardedCounter>>>,
    default_shards: usize,
}

impl Default for CounterRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTER_SHARDS)
    }
}

impl CounterRegistry {
    pub fn new(default_shards: usize) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            default_shards,
        }
    }

    fn shards_for(&self, name: &str) -> usize {
        if name == TOTAL_GUESSES_COUNTER {
            TOTAL_COUNTER_SHARDS
        } else {
            self.default_shards
        }
    }

    pub fn counter(&self, name: &str) -> Arc<ShardedCounter> {
        if let Some(c) = self
            .counters
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
        {
            return c.clone();
        }

        let mut map = self.counters.write().unwrap_or_else(|p| p.into_inner());
        map.entry(name.to_string())
            .or_insert_with(|| {
                debug!("Creating counter '{}'", name);
                Arc::new(ShardedCounter::new(self.shards_for(name)))
            })
            .clone()
    }

    pub fn increment(&self, name: &str, by: u64) {
        if by > 0 {
            self.counter(name).increment(by);
        }
    }

    /// Zero for counters never written.
    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .map_or(0, |c| c.get())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .counters
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn reset(&self) {
        for c in self
            .counters
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
        {
            c.reset();
        }
    }
}

pub fn round_counter(round_id: impl std::fmt::Display) -> String {
    format!("guesses:{}", round_id)
}

pub fn namespace_counter(namespace_id: impl std::fmt::Display) -> String {
    format!("guesses:{}", namespace_id)
}
