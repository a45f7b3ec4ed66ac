#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use midword_core::guess::Guess;
use midword_core::round::Round;
use midword_core::types::{EmbeddingId, NamespaceId};
use uuid::Uuid;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(minutes)
}

/// Builder for rounds in tests.
pub struct RoundBuilder {
    round: Round,
}

impl RoundBuilder {
    pub fn new(namespace_id: NamespaceId) -> Self {
        let matches = (0..5).map(|_| Uuid::new_v4()).collect();
        Self {
            round: Round::new(namespace_id, "happy", "sad", matches, t0()),
        }
    }

    pub fn words(mut self, left: &str, right: &str) -> Self {
        self.round.left = left.to_string();
        self.round.right = right.to_string();
        self
    }

    pub fn matches(mut self, matches: Vec<EmbeddingId>) -> Self {
        self.round.matches = matches;
        self
    }

    pub fn active(mut self, started_at: DateTime<Utc>) -> Self {
        self.round.active = true;
        self.round.started_at = Some(started_at);
        self
    }

    pub fn ended(mut self, ended_at: DateTime<Utc>) -> Self {
        self.round.ended_at = Some(ended_at);
        self
    }

    pub fn build(self) -> Round {
        self.round
    }
}

pub fn active_round() -> Round {
    RoundBuilder::new(Uuid::new_v4()).active(t0()).build()
}

pub fn guess_for(round: &Round, user: &str) -> Guess {
    Guess::new(round.id, user)
}
