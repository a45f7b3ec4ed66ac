use crate::error::AppResult;
use crate::midpoint;
use crate::state::AppState;
use crate::store::LAST_ROTATION_SLOT;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use midword_core::error::MwResult;
use midword_core::round::plan_rotation;
use midword_core::types::{NamespaceId, RoundId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationReport {
    /// The slot had already been rotated.
    pub skipped: bool,
    pub ended: usize,
    pub activated: Vec<RoundId>,
    pub failures: Vec<(NamespaceId, String)>,
}

/// Next instant at `at` (UTC) strictly after `now`.
pub fn next_fire(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Advances every namespace's active round.
///
/// With a `slot`, a slot already recorded as rotated is skipped, so a
/// redelivered trigger is harmless. Newly active rounds get their midpoint
/// cache warmed in the background.
pub async fn rotate_now(
    state: &Arc<AppState>,
    slot: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<RotationReport> {
    let _guard = state.rotation_lock.lock().await;

    if let Some(slot) = slot {
        if state.store.get_meta(LAST_ROTATION_SLOT).await?.as_deref() == Some(slot) {
            info!("⏭️ Rotation slot {} already done, skipping", slot);
            return Ok(RotationReport {
                skipped: true,
                ..Default::default()
            });
        }
    }

    let active = state.store.active_rounds().await?;
    let active_ids: HashSet<RoundId> = active.iter().map(|r| r.id).collect();

    let mut successors = HashMap::new();
    for next_id in active.iter().filter_map(|r| r.next_round_id) {
        if active_ids.contains(&next_id) || successors.contains_key(&next_id) {
            continue;
        }
        if let Some(next) = state.store.get_round(next_id).await? {
            successors.insert(next_id, next);
        }
    }

    let plan = plan_rotation(&active, |id| successors.get(&id).cloned(), now);
    state.store.apply_rotation(&plan, slot).await?;

    for (namespace_id, reason) in &plan.failures {
        error!("🚨 Rotation left {} without an active round: {}", namespace_id, reason);
    }
    info!(
        "🔄 Rotation done: {} ended, {} activated, {} failed",
        active.len(),
        plan.activated.len(),
        plan.failures.len()
    );

    for round_id in plan.activated.iter().copied() {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = seed_midpoint(&state, round_id).await {
                warn!("⚠️ Could not warm midpoint for round {}: {}", round_id, e);
            }
        });
    }

    Ok(RotationReport {
        skipped: false,
        ended: active.len(),
        activated: plan.activated,
        failures: plan.failures,
    })
}

async fn seed_midpoint(state: &AppState, round_id: RoundId) -> AppResult<()> {
    if let Some(round) = state.store.get_round(round_id).await? {
        midpoint::get_or_compute(state, round.namespace_id, &round.left, &round.right, false)
            .await?;
    }
    Ok(())
}

/// Spawns the daily rotation loop.
pub fn spawn_daily_rotation(state: Arc<AppState>) -> MwResult<JoinHandle<()>> {
    let at = state.config.schedule.rotate_time()?;
    info!("⏰ Daily rotation scheduled at {} UTC", at.format("%H:%M"));

    Ok(tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let fire_at = next_fire(now, at);
            sleep((fire_at - now).to_std().unwrap_or_default()).await;

            let slot = fire_at.date_naive().to_string();
            if let Err(e) = rotate_now(&state, Some(&slot), Utc::now()).await {
                error!("❌ Scheduled rotation {} failed: {}", slot, e);
            }
        }
    }))
}
