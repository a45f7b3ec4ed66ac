use axum::{
    extract::{Path, State},
    Json,
};
use midword_core::round::Round;
use midword_core::types::NamespaceId;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn active_round(
    State(state): State<Arc<AppState>>,
    Path(namespace_id): Path<NamespaceId>,
) -> AppResult<Json<Round>> {
    state
        .store
        .active_round(namespace_id)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound)
}
