//! Rounds and the daily rotation state machine.
//!
//! Rounds reference each other only through `next_round_id`, so the chain can
//! be repointed while rotating. Rotation is computed as a [`RotationPlan`] from
//! a snapshot and applied by the caller in one transaction.

use crate::types::{EmbeddingId, NamespaceId, RoundId};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: RoundId,
    pub namespace_id: NamespaceId,
    pub left: String,
    pub right: String,
    /// Target embeddings, best first. Written once at creation.
    pub matches: Vec<EmbeddingId>,
    pub active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub next_round_id: Option<RoundId>,
    pub created_at: DateTime<Utc>,
}

impl Round {
    /// A fresh, inactive round.
    pub fn new(
        namespace_id: NamespaceId,
        left: &str,
        right: &str,
        matches: Vec<EmbeddingId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            namespace_id,
            left: left.trim().to_string(),
            right: right.trim().to_string(),
            matches,
            active: false,
            started_at: None,
            ended_at: None,
            next_round_id: None,
            created_at: now,
        }
    }

    /// First position of `embedding_id` within the scored prefix of the match set.
    pub fn rank_of(&self, embedding_id: EmbeddingId, num_matches: usize) -> Option<usize> {
        self.matches
            .iter()
            .take(num_matches)
            .position(|m| *m == embedding_id)
    }

    /// New active row carrying over content and chain pointer.
    fn clone_forward(&self, now: DateTime<Utc>) -> Round {
        Round {
            id: Uuid::new_v4(),
            namespace_id: self.namespace_id,
            left: self.left.clone(),
            right: self.right.clone(),
            matches: self.matches.clone(),
            active: true,
            started_at: Some(now),
            ended_at: None,
            next_round_id: self.next_round_id,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RoundMutation {
    Deactivate {
        round_id: RoundId,
        ended_at: DateTime<Utc>,
    },
    Activate {
        round_id: RoundId,
        started_at: DateTime<Utc>,
    },
    /// Insert a brand-new active round cloned from a recycled one.
    Spawn(Round),
    Repoint {
        round_id: RoundId,
        next_round_id: RoundId,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationPlan {
    pub mutations: Vec<RoundMutation>,
    /// Rounds that are active once the plan is applied.
    pub activated: Vec<RoundId>,
    /// Namespaces left without an active round, with the reason.
    pub failures: Vec<(NamespaceId, String)>,
}

impl RotationPlan {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Computes the rotation of every namespace that currently has an active round.
///
/// `lookup` resolves rounds outside `active` (the next round in each chain).
pub fn plan_rotation<F>(active: &[Round], lookup: F, now: DateTime<Utc>) -> RotationPlan
where
    F: Fn(RoundId) -> Option<Round>,
{
    let mut plan = RotationPlan::default();

    let mut by_namespace: BTreeMap<NamespaceId, Vec<Round>> = BTreeMap::new();
    for round in active.iter().filter(|r| r.active) {
        by_namespace
            .entry(round.namespace_id)
            .or_default()
            .push(round.clone());
    }

    for (namespace_id, mut rounds) in by_namespace {
        if rounds.len() > 1 {
            warn!(
                "⚠️ Namespace {} has {} active rounds, advancing only the newest",
                namespace_id,
                rounds.len()
            );
        }
        rounds.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        for round in rounds.iter_mut() {
            round.active = false;
            round.ended_at = Some(now);
            plan.mutations.push(RoundMutation::Deactivate {
                round_id: round.id,
                ended_at: now,
            });
        }

        let current = &rounds[0];
        let Some(next_id) = current.next_round_id else {
            debug!("Round {} has no successor, chain ends", current.id);
            plan.failures
                .push((namespace_id, format!("Round {} has no next round", current.id)));
            continue;
        };

        // A ring of one points back at the round we just ended.
        let next = rounds
            .iter()
            .find(|r| r.id == next_id)
            .cloned()
            .or_else(|| lookup(next_id));

        let Some(next) = next else {
            plan.failures.push((
                namespace_id,
                format!("Next round {} of {} not found", next_id, current.id),
            ));
            continue;
        };

        if next.namespace_id != namespace_id {
            plan.failures.push((
                namespace_id,
                format!("Next round {} belongs to another namespace", next_id),
            ));
            continue;
        }

        if next.ended_at.is_some() {
            let spawned = next.clone_forward(now);
            plan.mutations.push(RoundMutation::Repoint {
                round_id: current.id,
                next_round_id: spawned.id,
            });
            plan.activated.push(spawned.id);
            plan.mutations.push(RoundMutation::Spawn(spawned));
        } else {
            plan.mutations.push(RoundMutation::Activate {
                round_id: next.id,
                started_at: now,
            });
            plan.activated.push(next.id);
        }
    }

    plan
}

/// In-memory round store keyed by id.
#[derive(Debug, Default, Clone)]
pub struct RoundArena {
    rounds: HashMap<RoundId, Round>,
}

impl RoundArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, round: Round) -> RoundId {
        let id = round.id;
        self.rounds.insert(id, round);
        id
    }

    pub fn get(&self, id: RoundId) -> Option<&Round> {
        self.rounds.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn active(&self) -> Vec<Round> {
        self.rounds
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect()
    }

    pub fn active_in(&self, namespace_id: NamespaceId) -> Vec<&Round> {
        self.rounds
            .values()
            .filter(|r| r.active && r.namespace_id == namespace_id)
            .collect()
    }

    /// Links rounds into a ring in the given order.
    pub fn link_ring(&mut self, ids: &[RoundId]) {
        for (a, b) in ids.iter().circular_tuple_windows() {
            if let Some(r) = self.rounds.get_mut(a) {
                r.next_round_id = Some(*b);
            }
        }
    }

    pub fn activate(&mut self, id: RoundId, now: DateTime<Utc>) -> bool {
        match self.rounds.get_mut(&id) {
            Some(r) => {
                r.active = true;
                r.started_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Follows `next_round_id` from `start` until it revisits a round.
    pub fn chain_from(&self, start: RoundId) -> Vec<RoundId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                break;
            }
            out.push(id);
            cursor = self.rounds.get(&id).and_then(|r| r.next_round_id);
        }
        out
    }

    pub fn rotate(&mut self, now: DateTime<Utc>) -> RotationPlan {
        let active = self.active();
        let plan = plan_rotation(&active, |id| self.rounds.get(&id).cloned(), now);
        self.apply(&plan);
        plan
    }

    pub fn apply(&mut self, plan: &RotationPlan) {
        for m in &plan.mutations {
            match m {
                RoundMutation::Deactivate { round_id, ended_at } => {
                    if let Some(r) = self.rounds.get_mut(round_id) {
                        r.active = false;
                        r.ended_at = Some(*ended_at);
                    }
                }
                RoundMutation::Activate {
                    round_id,
                    started_at,
                } => {
                    if let Some(r) = self.rounds.get_mut(round_id) {
                        r.active = true;
                        r.started_at = Some(*started_at);
                    }
                }
                RoundMutation::Spawn(round) => {
                    self.rounds.insert(round.id, round.clone());
                }
                RoundMutation::Repoint {
                    round_id,
                    next_round_id,
                } => {
                    if let Some(r) = self.rounds.get_mut(round_id) {
                        r.next_round_id = Some(*next_round_id);
                    }
                }
            }
        }
    }
}
