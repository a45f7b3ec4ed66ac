//! Guess submission: validate, resolve the title, write with compare-and-swap,
//! then feed the committed change to the aggregates.

use crate::error::{AppError, AppResult};
use crate::retry::retry_with_backoff;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use midword_core::error::GuessRejection;
use midword_core::events::{GuessEvent, RowEvent};
use midword_core::guess::{AttemptOutcome, Guess, GuessState};
use midword_core::types::{EmbeddingId, NamespaceId, RoundId};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Write conflicts tolerated for one attempt before giving up.
const MAX_CAS_RETRIES: usize = 16;

/// Embedding a title resolves to: exact title in the namespace, else the
/// nearest stored neighbor of its embedding.
pub async fn resolve_title(
    state: &AppState,
    namespace_id: NamespaceId,
    title: &str,
) -> AppResult<Option<EmbeddingId>> {
    if let Some(e) = state.store.find_embedding(namespace_id, title).await? {
        return Ok(Some(e.id));
    }

    let params = &state.config.matching;
    let delay = Duration::from_millis(params.retry_base_delay_ms);
    let vector = retry_with_backoff("embed guess", params.retry_attempts, delay, || {
        state.embedder.embed(title)
    })
    .await?;
    let hits = retry_with_backoff("guess lookup", params.retry_attempts, delay, || {
        state.index.search(namespace_id, &vector, 1)
    })
    .await?;

    Ok(hits.first().map(|h| h.embedding_id))
}

/// Scores one attempt of `user_id` on `round_id`.
pub async fn submit_guess(
    state: &AppState,
    user_id: Option<&str>,
    round_id: RoundId,
    title: &str,
    now: DateTime<Utc>,
) -> AppResult<AttemptOutcome> {
    let user_id = user_id.ok_or(GuessRejection::NotAuthenticated)?;
    let rules = &state.config.rules;

    let round = state
        .store
        .get_round(round_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // Reject what we can before paying for resolution.
    let current = state.store.get_guess(round_id, user_id).await?;
    current
        .as_ref()
        .map_or_else(|| Guess::new(round_id, user_id), |v| v.guess.clone())
        .check_title(&round, title, rules)?;

    let embedding_id = resolve_title(state, round.namespace_id, title).await?;
    let rank = embedding_id.and_then(|id| round.rank_of(id, rules.num_matches));

    state.store.ensure_user(user_id, now).await?;

    for conflict in 0..MAX_CAS_RETRIES {
        let round = state
            .store
            .get_round(round_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let current = state.store.get_guess(round_id, user_id).await?;

        let (old, expected) = match current {
            Some(v) => (Some(v.guess), Some(v.version)),
            None => (None, None),
        };
        let mut guess = old.clone().unwrap_or_else(|| Guess::new(round_id, user_id));
        let outcome = guess.apply_attempt(&round, title, rank, now, rules)?;
        let score_delta = guess.score - old.as_ref().map_or(0, |g| g.score);

        let Some(commit) = state
            .store
            .commit_guess(&guess, expected, score_delta)
            .await?
        else {
            debug!(
                "Guess write for {} on {} lost a race (#{}), retrying",
                user_id,
                round_id,
                conflict + 1
            );
            continue;
        };

        let change = match old {
            Some(o) => RowEvent::updated(o, guess.clone()),
            None => RowEvent::inserted(guess.clone()),
        };
        state.aggregates.dispatch_guess(&GuessEvent {
            namespace_id: round.namespace_id,
            change,
        });
        state
            .aggregates
            .dispatch_user(&RowEvent::updated(commit.user_before, commit.user_after));

        info!(
            "🎲 {} guessed '{}' on {}: rank {:?}, +{} (total {}){}",
            user_id,
            title.trim(),
            round_id,
            outcome.rank,
            outcome.delta + outcome.bonus,
            outcome.score,
            if outcome.submitted { ", submitted" } else { "" }
        );
        return Ok(outcome);
    }

    warn!(
        "⚠️ Gave up on guess for {} on {} after {} conflicts",
        user_id, round_id, MAX_CAS_RETRIES
    );
    Err(AppError::Transient("Too many concurrent guesses, try again".into()))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessView {
    pub state: GuessState,
    pub guess: Option<Guess>,
    pub attempts_left: usize,
    pub rank: Option<usize>,
}

/// Caller's guess on a round, with their position on its leaderboard.
pub async fn guess_view(state: &AppState, user_id: &str, round_id: RoundId) -> AppResult<GuessView> {
    if state.store.get_round(round_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let guess = state
        .store
        .get_guess(round_id, user_id)
        .await?
        .map(|v| v.guess);

    let used = guess.as_ref().map_or(0, |g| g.attempts.len());
    Ok(GuessView {
        state: guess.as_ref().map_or(GuessState::NoGuess, Guess::state),
        attempts_left: state.config.rules.max_attempts.saturating_sub(used),
        rank: state.aggregates.leaderboards.round_rank(round_id, user_id),
        guess,
    })
}
