//! Midpoint cache: embeddings of two words, their midpoint, and the scored
//! match list around it. Also seeds new rounds from that list.

use crate::error::{AppError, AppResult};
use crate::retry::retry_with_backoff;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use midword_core::matches::{score_matches, select_round_matches, MatchQuery, Midpoint, MidpointKey};
use midword_core::round::Round;
use midword_core::types::{Embedding, NamespaceId, RoundId};
use midword_core::vector;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Extra midpoint hits fetched so that filtering the target words out still
/// leaves a full list.
const MIDPOINT_OVERFETCH: usize = 20;

fn retry_delay(state: &AppState) -> Duration {
    Duration::from_millis(state.config.matching.retry_base_delay_ms)
}

/// Vector of `title`, from the namespace's stored embeddings when present,
/// otherwise from the embedding service (and then stored).
pub async fn embed_word(
    state: &AppState,
    namespace_id: NamespaceId,
    title: &str,
) -> AppResult<Vec<f32>> {
    if let Some(e) = state.store.find_embedding(namespace_id, title).await? {
        return Ok(e.vector);
    }

    let vector = retry_with_backoff(
        "embed",
        state.config.matching.retry_attempts,
        retry_delay(state),
        || state.embedder.embed(title),
    )
    .await?;

    let stored = state
        .store
        .insert_embedding(&Embedding {
            id: Uuid::new_v4(),
            namespace_id,
            title: title.trim().to_string(),
            vector,
        })
        .await?;
    debug!("Cached embedding for '{}' in {}", stored.title, namespace_id);
    Ok(stored.vector)
}

/// Returns the cached midpoint for `(namespace_id, left, right)`, computing it
/// first when missing or when `force` is set.
///
/// Nothing is written unless every collaborator call succeeded.
pub async fn get_or_compute(
    state: &AppState,
    namespace_id: NamespaceId,
    left: &str,
    right: &str,
    force: bool,
) -> AppResult<Midpoint> {
    let key = MidpointKey::new(namespace_id, left, right);
    if key.left.is_empty() || key.right.is_empty() {
        return Err(AppError::Validation("Both words are required".into()));
    }

    let cached = state.store.get_midpoint(&key).await?;
    if let Some(mp) = &cached {
        if !force {
            return Ok(mp.clone());
        }
    }

    if cached.is_none() && state.store.get_namespace(namespace_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    let left_embedding = embed_word(state, namespace_id, &key.left).await?;
    let right_embedding = embed_word(state, namespace_id, &key.right).await?;
    let midpoint_embedding = vector::midpoint(&left_embedding, &right_embedding)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "'{}' and '{}' have no midpoint",
                key.left, key.right
            ))
        })?;

    let params = &state.config.matching;
    let search = |v: &[f32], k: usize| {
        let v = v.to_vec();
        async move {
            retry_with_backoff("index search", params.retry_attempts, retry_delay(state), || {
                state.index.search(namespace_id, &v, k)
            })
            .await
        }
    };

    let around_midpoint = search(&midpoint_embedding, params.top_matches + MIDPOINT_OVERFETCH).await?;
    let around_left = search(&left_embedding, params.top_matches).await?;
    let around_right = search(&right_embedding, params.top_matches).await?;

    let top_matches = score_matches(
        &MatchQuery {
            left_title: &key.left,
            right_title: &key.right,
            left: &left_embedding,
            right: &right_embedding,
            around_midpoint: &around_midpoint,
            around_left: &around_left,
            around_right: &around_right,
        },
        params.top_matches,
    );

    let stored = state
        .store
        .upsert_midpoint(&Midpoint {
            id: cached.map_or_else(Uuid::new_v4, |c| c.id),
            cache_id: key.cache_id(),
            namespace_id,
            left: key.left.clone(),
            right: key.right.clone(),
            left_embedding,
            right_embedding,
            midpoint_embedding,
            top_matches,
            updated_at: Utc::now(),
        })
        .await?;

    info!(
        "🎯 Midpoint {} / {} in {}: {} matches",
        stored.left,
        stored.right,
        namespace_id,
        stored.top_matches.len()
    );
    Ok(stored)
}

/// Options for a round created by hand.
#[derive(Debug, Clone)]
pub struct NewRound {
    pub namespace_id: NamespaceId,
    pub left: String,
    pub right: String,
    pub next_round_id: Option<RoundId>,
    pub activate: bool,
}

/// Creates a round whose targets are picked from the midpoint cache with the
/// configured strategy.
pub async fn create_round(state: &AppState, req: NewRound, now: DateTime<Utc>) -> AppResult<Round> {
    if state.store.get_namespace(req.namespace_id).await?.is_none() {
        return Err(AppError::NotFound);
    }

    if let Some(next_id) = req.next_round_id {
        match state.store.get_round(next_id).await? {
            Some(next) if next.namespace_id == req.namespace_id => {}
            Some(_) => {
                return Err(AppError::Validation(format!(
                    "Round {} belongs to another namespace",
                    next_id
                )))
            }
            None => {
                return Err(AppError::Validation(format!(
                    "Next round {} does not exist",
                    next_id
                )))
            }
        }
    }

    let mp = get_or_compute(state, req.namespace_id, &req.left, &req.right, false).await?;
    let matches = select_round_matches(
        &mp.top_matches,
        state.config.matching.round_strategy,
        state.config.rules.num_matches,
    )?;

    let mut round = Round::new(req.namespace_id, &req.left, &req.right, matches, now);
    round.next_round_id = req.next_round_id;
    if req.activate {
        round.active = true;
        round.started_at = Some(now);
    }

    // Activation ends the namespace's current round, so it must not interleave
    // with a rotation.
    let _rotation = if req.activate {
        Some(state.rotation_lock.lock().await)
    } else {
        None
    };
    state.store.create_round(&round, now).await?;
    info!(
        "🆕 Round {} created ({} / {}, active: {})",
        round.id, round.left, round.right, round.active
    );
    Ok(round)
}
