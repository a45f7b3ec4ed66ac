//! Guess scoring state machine for one (user, round) pair.
//!
//! `NoGuess -> InProgress -> Submitted`. Transitions only move forward and a
//! rejected attempt never changes the guess.

use crate::config::GameRules;
use crate::error::GuessRejection;
use crate::round::Round;
use crate::types::{normalize_title, RoundId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub title: String,
    /// Position in the round's match set, `None` when unmatched.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum GuessState {
    NoGuess,
    InProgress,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guess {
    pub round_id: RoundId,
    pub user_id: UserId,
    pub attempts: Vec<Attempt>,
    pub score: i64,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    pub rank: Option<usize>,
    /// Points for the rank alone.
    pub delta: i64,
    /// Early completion bonus, 0 unless this attempt found the last match.
    pub bonus: i64,
    pub score: i64,
    pub attempts_used: usize,
    pub submitted: bool,
}

impl Guess {
    pub fn new(round_id: RoundId, user_id: impl Into<UserId>) -> Self {
        Self {
            round_id,
            user_id: user_id.into(),
            attempts: Vec::new(),
            score: 0,
            submitted_at: None,
        }
    }

    pub fn state(&self) -> GuessState {
        if self.submitted_at.is_some() {
            GuessState::Submitted
        } else if self.attempts.is_empty() {
            GuessState::NoGuess
        } else {
            GuessState::InProgress
        }
    }

    pub fn matched_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.rank.is_some()).count()
    }

    /// Checks that do not depend on the resolved rank.
    ///
    /// Callers run this before resolving `title`, which is the expensive part.
    pub fn check_title(
        &self,
        round: &Round,
        title: &str,
        rules: &GameRules,
    ) -> Result<(), GuessRejection> {
        if !round.active {
            return Err(GuessRejection::RoundNotActive);
        }
        if self.submitted_at.is_some() {
            return Err(GuessRejection::AlreadySubmitted);
        }
        if self.attempts.len() >= rules.max_attempts {
            return Err(GuessRejection::MaxAttemptsReached);
        }
        if self.matched_count() >= rules.num_matches {
            return Err(GuessRejection::AllMatchesFound);
        }

        let normalized = normalize_title(title);
        if normalized.is_empty() {
            return Err(GuessRejection::EmptyGuess);
        }
        if overlaps_target(&normalized, &round.left) || overlaps_target(&normalized, &round.right) {
            return Err(GuessRejection::OverlapsTarget(title.trim().to_string()));
        }
        if self
            .attempts
            .iter()
            .any(|a| normalize_title(&a.title) == normalized)
        {
            return Err(GuessRejection::DuplicateTitle(title.trim().to_string()));
        }
        Ok(())
    }

    /// Validates and applies one attempt whose title resolved to `rank`.
    pub fn apply_attempt(
        &mut self,
        round: &Round,
        title: &str,
        rank: Option<usize>,
        now: DateTime<Utc>,
        rules: &GameRules,
    ) -> Result<AttemptOutcome, GuessRejection> {
        self.check_title(round, title, rules)?;

        if let Some(r) = rank {
            if self.attempts.iter().any(|a| a.rank == Some(r)) {
                return Err(GuessRejection::DuplicateRank(r));
            }
        }

        let prior_attempts = self.attempts.len();
        let delta = rank.map_or(0, |r| rules.num_matches.saturating_sub(r) as i64);

        self.attempts.push(Attempt {
            title: title.trim().to_string(),
            rank,
        });
        self.score += delta;

        let mut bonus = 0;
        if self.matched_count() == rules.num_matches {
            bonus = rules.max_attempts.saturating_sub(self.attempts.len()) as i64;
            self.score += bonus;
            self.finalize(now);
        }
        // Independent of the completion branch; finalize is idempotent.
        if prior_attempts + 1 == rules.max_attempts {
            self.finalize(now);
        }

        Ok(AttemptOutcome {
            rank,
            delta,
            bonus,
            score: self.score,
            attempts_used: self.attempts.len(),
            submitted: self.submitted_at.is_some(),
        })
    }

    /// Sets `submitted_at` once. Returns whether this call set it.
    pub fn finalize(&mut self, now: DateTime<Utc>) -> bool {
        if self.submitted_at.is_some() {
            return false;
        }
        self.submitted_at = Some(now);
        true
    }
}

/// Whether `guess` and `target` are the same word for game purposes.
///
/// Plain substring containment in either direction, or the same `-y` stem
/// (`happiness` vs `happy`).
pub fn overlaps_target(guess: &str, target: &str) -> bool {
    let g = normalize_title(guess);
    let t = normalize_title(target);
    if g.is_empty() || t.is_empty() {
        return false;
    }
    if g.contains(&t) || t.contains(&g) {
        return true;
    }
    y_stem(&g) == y_stem(&t)
}

/// Endings that turn a trailing `y` into `i`.
const Y_SUFFIXES: [&str; 6] = ["iness", "iest", "ier", "ies", "ied", "ily"];

fn y_stem(word: &str) -> String {
    Y_SUFFIXES
        .iter()
        .find_map(|suffix| word.strip_suffix(suffix))
        .filter(|base| base.chars().count() >= 2)
        .map_or_else(|| word.to_string(), |base| format!("{}y", base))
}
