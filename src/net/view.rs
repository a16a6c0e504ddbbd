//! Per-session visibility and delta computation
//!
//! Each session carries a snapshot of the records it was last sent. A tick's
//! diff is computed against that snapshot: entities entering the viewport are
//! `added`, visible entities whose record changed are `updated`, and snapshot
//! entries that are gone or out of view are `removed`. Removal always wins
//! over update; an id never appears in both lists.

use hashbrown::HashMap;
use rustc_hash::{FxBuildHasher, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::game::entity::{Entity, EntityId, EntityKind, SessionId};
use crate::game::spatial::Aabb;
use crate::game::world::World;
use crate::util::vec2::Vec2;

/// Snapshot of one entity as exposed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub position: Vec2,
    pub mass: f32,
    pub color: u8,
    pub owner: Option<SessionId>,
}

impl EntityRecord {
    fn from_entity(entity: &Entity) -> Self {
        Self {
            id: entity.id,
            kind: entity.kind(),
            position: entity.position,
            mass: entity.mass,
            color: entity.color,
            owner: entity.owner(),
        }
    }
}

/// Per-tick view delta for one session. Record lists are ascending by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewDiff {
    pub tick: u64,
    pub added: Vec<EntityRecord>,
    pub updated: Vec<EntityRecord>,
    pub removed: Vec<EntityId>,
}

/// View state of one session.
struct SessionView {
    /// Records as last sent to this session
    last_sent: HashMap<EntityId, EntityRecord, FxBuildHasher>,
    /// Camera center survives the owner's death so the client keeps a view
    last_center: Vec2,
}

/// Owns all per-session view state. Strictly read-only towards the world.
#[derive(Default)]
pub struct ViewManager {
    views: HashMap<SessionId, SessionView, FxBuildHasher>,
}

impl ViewManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, session: SessionId) {
        self.views.entry(session).or_insert_with(|| SessionView {
            last_sent: HashMap::with_hasher(FxBuildHasher),
            last_center: Vec2::ZERO,
        });
    }

    pub fn unregister(&mut self, session: SessionId) {
        self.views.remove(&session);
    }

    #[inline]
    pub fn is_registered(&self, session: SessionId) -> bool {
        self.views.contains_key(&session)
    }

    #[inline]
    pub fn session_count(&self) -> usize {
        self.views.len()
    }

    /// Current viewport rectangle for a session.
    ///
    /// Centered on the average position of the owned cells; the extent grows
    /// with total size via `scale = min(1, base/total_radius)^0.4`. Without
    /// cells the last center is kept at scale 1.
    pub fn viewport(&self, session: SessionId, world: &World) -> Option<Aabb> {
        let view = self.views.get(&session)?;
        Some(Self::viewport_of(view, session, world))
    }

    fn viewport_of(view: &SessionView, session: SessionId, world: &World) -> Aabb {
        let config = &world.config;
        let mut center = view.last_center;
        let mut total_radius = 0.0f32;

        let owned = world.owned_cells(session);
        if !owned.is_empty() {
            let mut sum = Vec2::ZERO;
            let mut n = 0.0f32;
            for id in &owned {
                if let Some(cell) = world.entity(*id) {
                    sum += cell.position;
                    total_radius += cell.radius(config);
                    n += 1.0;
                }
            }
            if n > 0.0 {
                center = sum * (1.0 / n);
            }
        }

        let scale = if total_radius > 0.0 {
            (config.view_camera_base / total_radius).min(1.0).powf(0.4)
        } else {
            1.0
        };
        let half = config.view_base_extent / scale;
        Aabb::new(
            Vec2::new(center.x - half, center.y - half),
            Vec2::new(center.x + half, center.y + half),
        )
    }

    /// Compute the diff between what this session saw and the world now.
    pub fn compute_diff(
        &mut self,
        session: SessionId,
        world: &World,
    ) -> Result<ViewDiff, EngineError> {
        let view = self
            .views
            .get_mut(&session)
            .ok_or(EngineError::UnknownSession(session))?;

        let viewport = Self::viewport_of(view, session, world);
        view.last_center = viewport.center();

        let mut diff = ViewDiff {
            tick: world.tick,
            ..ViewDiff::default()
        };
        let mut seen: FxHashSet<EntityId> = FxHashSet::default();

        // Grid query returns ascending ids, so added/updated come out sorted
        for id in world.grid().query_region(viewport) {
            let Some(entity) = world.entity(id) else {
                continue;
            };
            let record = EntityRecord::from_entity(entity);
            seen.insert(id);
            match view.last_sent.get(&id) {
                None => {
                    diff.added.push(record.clone());
                    view.last_sent.insert(id, record);
                }
                Some(prev) if *prev != record => {
                    diff.updated.push(record.clone());
                    view.last_sent.insert(id, record);
                }
                Some(_) => {}
            }
        }

        diff.removed = view
            .last_sent
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        diff.removed.sort_unstable();
        for id in &diff.removed {
            view.last_sent.remove(id);
        }

        Ok(diff)
    }
}
