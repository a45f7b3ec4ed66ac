use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct CounterResponse {
    pub name: String,
    pub value: u64,
}

/// Counters that were never written read as zero.
pub async fn get_counter(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<CounterResponse> {
    let value = state.aggregates.counters.get(&name);
    Json(CounterResponse { name, value })
}
