use axum::{
    extract::{Path, Query, State},
    Json,
};
use midword_core::leaderboard::LeaderboardEntry;
use midword_core::types::{RoundId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct BoardQuery {
    pub limit: Option<usize>,
}

impl BoardQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub players: usize,
    pub total_score: i64,
    /// Caller's 1-based rank, when identified and present.
    pub my_rank: Option<usize>,
}

pub async fn round_board(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(round_id): Path<RoundId>,
    Query(q): Query<BoardQuery>,
) -> AppResult<Json<BoardResponse>> {
    if state.store.get_round(round_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    let boards = &state.aggregates.leaderboards;
    Ok(Json(BoardResponse {
        entries: boards.top_round(round_id, q.limit()),
        players: boards.round_players(round_id),
        total_score: boards.round_total(round_id),
        my_rank: identity
            .user_id()
            .and_then(|u| boards.round_rank(round_id, u)),
    }))
}

pub async fn global_board(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(q): Query<BoardQuery>,
) -> Json<BoardResponse> {
    let boards = &state.aggregates.leaderboards;
    Json(BoardResponse {
        entries: boards.top_global(q.limit()),
        players: boards.global_players(),
        total_score: boards.global_total(),
        my_rank: identity.user_id().and_then(|u| boards.global_rank(u)),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankResponse {
    pub user_id: UserId,
    pub rank: usize,
    pub score: i64,
}

pub async fn user_rank(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> AppResult<Json<RankResponse>> {
    let rank = state
        .aggregates
        .leaderboards
        .global_rank(&user_id)
        .ok_or(AppError::NotFound)?;
    let score = state
        .store
        .get_user(&user_id)
        .await?
        .map_or(0, |u| u.score);
    Ok(Json(RankResponse {
        user_id,
        rank,
        score,
    }))
}
