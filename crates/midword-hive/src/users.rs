//! Account changes made by administrators.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::UserProfile;
use chrono::{DateTime, Utc};
use midword_core::events::RowEvent;
use midword_core::types::User;
use tracing::info;

/// Names, anonymizes or captures an account and moves it on the global board.
pub async fn update_profile(
    state: &AppState,
    profile: &UserProfile,
    now: DateTime<Utc>,
) -> AppResult<User> {
    if profile.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".into()));
    }
    if profile.captured && !profile.anonymous {
        return Err(AppError::Validation(
            "Only anonymous accounts can be captured".into(),
        ));
    }

    let (before, after) = state.store.update_profile(profile, now).await?;
    let event = match before {
        Some(b) => RowEvent::updated(b, after.clone()),
        None => RowEvent::inserted(after.clone()),
    };
    state.aggregates.dispatch_user(&event);

    info!(
        "👤 User {} updated (anonymous: {}, captured: {})",
        after.id, after.anonymous, after.captured
    );
    Ok(after)
}
