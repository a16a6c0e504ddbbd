//! Read-only leaderboard query over the world.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::entity::SessionId;
use crate::game::world::World;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub session: SessionId,
    pub name: String,
    /// Summed mass of all owned cells
    pub mass: f32,
}

/// Top `limit` sessions by total owned mass, descending. Sessions without
/// cells do not rank; ties break on session id.
pub fn compute(world: &World, limit: usize) -> Vec<LeaderboardEntry> {
    let mut totals: BTreeMap<SessionId, f32> = BTreeMap::new();
    for entity in world.entities() {
        if let Some(owner) = entity.owner() {
            *totals.entry(owner).or_default() += entity.mass;
        }
    }

    let mut entries: Vec<LeaderboardEntry> = totals
        .into_iter()
        .filter_map(|(session, mass)| {
            world.session(session).map(|state| LeaderboardEntry {
                session,
                name: state.name.clone(),
                mass,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.mass
            .total_cmp(&a.mass)
            .then_with(|| a.session.cmp(&b.session))
    });
    entries.truncate(limit);
    entries
}
