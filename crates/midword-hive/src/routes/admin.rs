use axum::{extract::State, Json};
use chrono::Utc;
use midword_core::matches::Midpoint;
use midword_core::round::Round;
use midword_core::types::{NamespaceId, RoundId, User};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::midpoint::{self, NewRound};
use crate::scheduler::{self, RotationReport};
use crate::state::AppState;
use crate::store::UserProfile;
use crate::users;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidpointRequest {
    pub namespace_id: NamespaceId,
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub force: bool,
}

pub async fn compute_midpoint(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MidpointRequest>,
) -> AppResult<Json<Midpoint>> {
    let mp = midpoint::get_or_compute(
        &state,
        payload.namespace_id,
        &payload.left,
        &payload.right,
        payload.force,
    )
    .await?;
    Ok(Json(mp))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundRequest {
    pub namespace_id: NamespaceId,
    pub left: String,
    pub right: String,
    pub next_round_id: Option<RoundId>,
    #[serde(default)]
    pub activate: bool,
}

pub async fn create_round(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RoundRequest>,
) -> AppResult<Json<Round>> {
    let round = midpoint::create_round(
        &state,
        NewRound {
            namespace_id: payload.namespace_id,
            left: payload.left,
            right: payload.right,
            next_round_id: payload.next_round_id,
            activate: payload.activate,
        },
        Utc::now(),
    )
    .await?;
    Ok(Json(round))
}

/// Manual rotation; ignores the scheduler's slot bookkeeping.
pub async fn rotate(State(state): State<Arc<AppState>>) -> AppResult<Json<RotationReport>> {
    Ok(Json(scheduler::rotate_now(&state, None, Utc::now()).await?))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UserProfile>,
) -> AppResult<Json<User>> {
    Ok(Json(users::update_profile(&state, &payload, Utc::now()).await?))
}
