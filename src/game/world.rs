//! World aggregate: entity store, spatial index, bounds, sessions, and the
//! seeded RNG behind all placement decisions.
//!
//! Every mutation of an entity's position or mass goes through [`World`] so
//! the spatial index is updated in the same operation and can never drift
//! out of sync with the store.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::EngineConfig;
use crate::error::{index_fault, EngineError};
use crate::game::entity::{
    CellPhase, Entity, EntityClass, EntityId, EntityKind, PlayerCellState, SessionId,
};
use crate::game::input::ControlInput;
use crate::game::spatial::{Aabb, SpatialGrid};
use crate::game::store::EntityStore;
use crate::util::vec2::Vec2;

/// Number of palette entries handed out to new cells
pub const PALETTE_SIZE: u8 = 12;

/// Per-session simulation state. View state lives in the net layer.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: SessionId,
    pub name: String,
    /// Latest sanitized steering target
    pub target: Vec2,
    /// Split request latched until the next tick applies it
    pub split_requested: bool,
    /// Eject request latched until the next tick applies it
    pub eject_requested: bool,
    pub last_eject_tick: u64,
    pub connected_tick: u64,
}

pub struct World {
    pub config: EngineConfig,
    store: EntityStore,
    grid: SpatialGrid,
    pub tick: u64,
    sessions: BTreeMap<SessionId, SessionState>,
    rng: StdRng,
    bounds: Aabb,
}

impl World {
    /// Create an empty world. The seed drives every placement decision, so
    /// two worlds with the same seed and command stream evolve identically.
    pub fn new(config: EngineConfig, seed: u64) -> Self {
        let hw = config.world_width / 2.0;
        let hh = config.world_height / 2.0;
        let bounds = Aabb::new(Vec2::new(-hw, -hh), Vec2::new(hw, hh));
        let grid = SpatialGrid::new(config.grid_cell_size);
        Self {
            config,
            store: EntityStore::new(),
            grid,
            tick: 0,
            sessions: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            bounds,
        }
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    #[inline]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.store.get(id)
    }

    /// All entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.store.iter()
    }

    #[inline]
    pub fn entity_count(&self) -> usize {
        self.store.len()
    }

    #[inline]
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    #[inline]
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Ids of entities matching a predicate, ascending.
    pub fn ids_where(&self, pred: impl FnMut(&Entity) -> bool) -> Vec<EntityId> {
        self.store.ids_where(pred)
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// Add an entity to the world, indexing it. Refused when at capacity.
    pub fn spawn_entity(&mut self, entity: Entity) -> Result<EntityId, EngineError> {
        if self.store.len() >= self.config.max_entities {
            return Err(EngineError::WorldFull(self.config.max_entities));
        }
        let aabb = Aabb::from_circle(entity.position, entity.radius(&self.config));
        let id = self.store.insert(entity);
        if let Err(e) = self.grid.insert(id, aabb) {
            index_fault("spawn_entity", e);
        }
        Ok(id)
    }

    /// Remove an entity from world and index.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.store.remove(id)?;
        if let Err(e) = self.grid.remove(id) {
            index_fault("remove_entity", e);
        }
        Some(entity)
    }

    /// Mutate an entity, keeping the spatial index synced with whatever the
    /// closure did to position or mass.
    pub fn mutate_entity<R>(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut Entity, &EngineConfig) -> R,
    ) -> Result<R, EngineError> {
        let config = &self.config;
        let (result, aabb) = self.store.mutate(id, |entity| {
            let result = f(entity, config);
            let aabb = Aabb::from_circle(entity.position, entity.radius(config));
            (result, aabb)
        })?;
        if let Err(e) = self.grid.update(id, aabb) {
            index_fault("mutate_entity", e);
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Uniform random position keeping a margin from the border.
    pub fn random_position(&mut self, margin: f32) -> Vec2 {
        let min_x = self.bounds.min.x + margin;
        let max_x = (self.bounds.max.x - margin).max(min_x);
        let min_y = self.bounds.min.y + margin;
        let max_y = (self.bounds.max.y - margin).max(min_y);
        Vec2::new(
            self.rng.gen_range(min_x..=max_x),
            self.rng.gen_range(min_y..=max_y),
        )
    }

    pub fn random_color(&mut self) -> u8 {
        self.rng.gen_range(0..PALETTE_SIZE)
    }

    /// Pick a spawn point overlapping no player cell or virus. After the
    /// configured number of attempts the last candidate is used anyway.
    pub fn find_spawn_position(&mut self, radius: f32) -> Vec2 {
        let attempts = self.config.spawn_max_attempts.max(1);
        let mut candidate = self.random_position(radius);
        for _ in 0..attempts {
            let blocked = self
                .grid
                .query_near(candidate, radius)
                .into_iter()
                .filter_map(|id| self.store.get(id))
                .any(|e| matches!(e.kind(), EntityKind::PlayerCell | EntityKind::Virus));
            if !blocked {
                return candidate;
            }
            candidate = self.random_position(radius);
        }
        candidate
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn connect_session(&mut self, session: SessionId) {
        let tick = self.tick;
        self.sessions.entry(session).or_insert_with(|| SessionState {
            id: session,
            name: String::new(),
            target: Vec2::ZERO,
            split_requested: false,
            eject_requested: false,
            last_eject_tick: 0,
            connected_tick: tick,
        });
    }

    /// Deferred disconnect: owned cells survive as decaying detached cells.
    pub fn disconnect_session(&mut self, session: SessionId) {
        if self.sessions.remove(&session).is_none() {
            return;
        }
        for id in self.owned_cells(session) {
            let result = self.mutate_entity(id, |entity, _| {
                if let Some(state) = entity.player_state_mut() {
                    state.owner = None;
                    state.phase = CellPhase::Detached;
                }
            });
            if let Err(e) = result {
                index_fault("disconnect_session", e);
            }
        }
    }

    #[inline]
    pub fn session(&self, session: SessionId) -> Option<&SessionState> {
        self.sessions.get(&session)
    }

    #[inline]
    pub fn session_mut(&mut self, session: SessionId) -> Option<&mut SessionState> {
        self.sessions.get_mut(&session)
    }

    /// Sessions in id order.
    pub fn sessions(&self) -> impl Iterator<Item = &SessionState> {
        self.sessions.values()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Record a sanitized control input for a session.
    pub fn apply_input(
        &mut self,
        session: SessionId,
        input: ControlInput,
    ) -> Result<(), EngineError> {
        let state = self
            .sessions
            .get_mut(&session)
            .ok_or(EngineError::UnknownSession(session))?;
        state.target = input.target;
        state.split_requested |= input.split;
        state.eject_requested |= input.eject;
        Ok(())
    }

    /// Spawn a player cell for a connected session.
    pub fn spawn_player(
        &mut self,
        session: SessionId,
        name: String,
    ) -> Result<EntityId, EngineError> {
        if !self.sessions.contains_key(&session) {
            return Err(EngineError::UnknownSession(session));
        }
        let mass = self.config.start_mass;
        let radius = crate::game::entity::mass_to_radius(mass, &self.config);
        let position = self.find_spawn_position(radius);
        let color = self.random_color();
        let tick = self.tick;

        let entity = Entity::new(
            EntityClass::PlayerCell(PlayerCellState {
                owner: Some(session),
                merge_ready_tick: tick,
                phase: CellPhase::Active,
            }),
            position,
            mass,
            color,
            tick,
        );
        let id = self.spawn_entity(entity)?;

        if let Some(state) = self.sessions.get_mut(&session) {
            state.name = name;
            state.target = position;
        }
        Ok(id)
    }

    /// Ids of cells owned by a session, ascending.
    pub fn owned_cells(&self, session: SessionId) -> Vec<EntityId> {
        self.store.ids_where(|e| e.owner() == Some(session))
    }

    #[inline]
    pub fn owned_cell_count(&self, session: SessionId) -> usize {
        self.store
            .iter()
            .filter(|e| e.owner() == Some(session))
            .count()
    }

    /// A session is alive while it owns at least one cell.
    #[inline]
    pub fn is_alive(&self, session: SessionId) -> bool {
        self.owned_cell_count(session) > 0
    }

    // ------------------------------------------------------------------
    // Population upkeep
    // ------------------------------------------------------------------

    /// Top up food and virus populations. Stops quietly at the entity cap.
    pub fn replenish(&mut self) {
        let mut food = 0usize;
        let mut viruses = 0usize;
        for entity in self.store.iter() {
            match entity.kind() {
                EntityKind::Food => food += 1,
                EntityKind::Virus => viruses += 1,
                _ => {}
            }
        }

        if food < self.config.food_min_count {
            let want = (self.config.food_min_count - food).min(self.config.food_spawn_per_tick);
            for _ in 0..want {
                let mass = self.config.food_mass;
                let radius = crate::game::entity::mass_to_radius(mass, &self.config);
                let position = self.random_position(radius);
                let color = self.random_color();
                let tick = self.tick;
                if self
                    .spawn_entity(Entity::new(EntityClass::Food, position, mass, color, tick))
                    .is_err()
                {
                    return;
                }
            }
        }

        if viruses < self.config.virus_min_count {
            let want = self.config.virus_min_count - viruses;
            for _ in 0..want {
                let mass = self
                    .rng
                    .gen_range(self.config.virus_mass_min..=self.config.virus_mass_max);
                let radius = crate::game::entity::mass_to_radius(mass, &self.config);
                let position = self.find_spawn_position(radius);
                let tick = self.tick;
                if self
                    .spawn_entity(Entity::new(EntityClass::Virus, position, mass, 0, tick))
                    .is_err()
                {
                    return;
                }
            }
        }
    }

    /// Merge cooldown for a cell of the given mass, in ticks.
    pub fn merge_delay_ticks(&self, mass: f32) -> u64 {
        let radius = crate::game::entity::mass_to_radius(mass, &self.config);
        let seconds = self
            .config
            .merge_base_s
            .max(radius * self.config.merge_size_factor);
        (seconds * self.config.tick_rate()) as u64
    }
}
