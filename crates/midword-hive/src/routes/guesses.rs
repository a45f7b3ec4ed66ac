use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use midword_core::error::GuessRejection;
use midword_core::guess::AttemptOutcome;
use midword_core::types::RoundId;
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::Identity;
use crate::engine::{self, GuessView};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub struct GuessRequest {
    pub title: String,
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(round_id): Path<RoundId>,
    Json(payload): Json<GuessRequest>,
) -> AppResult<Json<AttemptOutcome>> {
    if payload.title.len() > MAX_TITLE_LEN {
        return Err(AppError::Validation("Guess too long".into()));
    }
    let outcome = engine::submit_guess(
        &state,
        identity.user_id(),
        round_id,
        &payload.title,
        Utc::now(),
    )
    .await?;
    Ok(Json(outcome))
}

pub async fn mine(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(round_id): Path<RoundId>,
) -> AppResult<Json<GuessView>> {
    let user_id = identity.user_id().ok_or(GuessRejection::NotAuthenticated)?;
    Ok(Json(engine::guess_view(&state, user_id, round_id).await?))
}
