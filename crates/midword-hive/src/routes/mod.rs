pub mod admin;
pub mod counters;
pub mod guesses;
pub mod leaderboard;
pub mod rounds;
pub mod system;

use crate::auth::require_secret;
use crate::state::AppState;
use axum::{middleware, Router};
use std::sync::Arc;

pub fn system_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", axum::routing::get(system::root))
        .route("/health", axum::routing::get(system::health))
}

pub fn game_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/rounds/{round_id}/guesses",
            axum::routing::post(guesses::submit),
        )
        .route(
            "/rounds/{round_id}/guesses/me",
            axum::routing::get(guesses::mine),
        )
        .route(
            "/namespaces/{namespace_id}/active-round",
            axum::routing::get(rounds::active_round),
        )
        .route("/counters/{name}", axum::routing::get(counters::get_counter))
}

pub fn leaderboard_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/rounds/{round_id}/leaderboard",
            axum::routing::get(leaderboard::round_board),
        )
        .route("/leaderboard", axum::routing::get(leaderboard::global_board))
        .route(
            "/users/{user_id}/rank",
            axum::routing::get(leaderboard::user_rank),
        )
}

pub fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/midpoints", axum::routing::post(admin::compute_midpoint))
        .route("/admin/rounds", axum::routing::post(admin::create_round))
        .route("/admin/rotate", axum::routing::post(admin::rotate))
        .route("/admin/users", axum::routing::post(admin::update_user))
        .route_layer(middleware::from_fn_with_state(state, require_secret))
}

/// The full HTTP surface.
pub fn app(state: Arc<AppState>) -> Router {
    system_routes()
        .merge(game_routes())
        .merge(leaderboard_routes())
        .merge(admin_routes(state.clone()))
        .with_state(state)
}
