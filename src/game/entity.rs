//! Entity model: ids, kinds, lifecycle phases, and the mass-to-radius law.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::util::vec2::Vec2;

/// Session identifier assigned by the transport layer.
pub type SessionId = uuid::Uuid;

/// Stable entity identifier. Monotonically allocated, never reused.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Entity kind tag as seen by views and the outbound protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    PlayerCell,
    Food,
    Virus,
    EjectedMass,
}

/// Lifecycle phase of a player cell.
///
/// `Merged` and `Consumed` are terminal events, not states: the entity leaves
/// the store in the same tick, so only the live phases are carried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellPhase {
    Active,
    /// Fragment of a virus pop; reverts to Active once its merge timer runs out
    PoppedChild,
    /// Owner disconnected; keeps decaying until eaten or starved out
    Detached,
}

/// Player-cell-specific state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerCellState {
    /// Owning session, or None once detached
    pub owner: Option<SessionId>,
    /// Earliest tick at which this cell may merge with a sibling
    pub merge_ready_tick: u64,
    pub phase: CellPhase,
}

/// Entity class with per-kind state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityClass {
    PlayerCell(PlayerCellState),
    Food,
    Virus,
    EjectedMass,
}

impl EntityClass {
    #[inline]
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityClass::PlayerCell(_) => EntityKind::PlayerCell,
            EntityClass::Food => EntityKind::Food,
            EntityClass::Virus => EntityKind::Virus,
            EntityClass::EjectedMass => EntityKind::EjectedMass,
        }
    }
}

/// Residual momentum from a split, ejection, or virus pop.
///
/// Advances 1/10 of the remaining distance per tick and expires below one
/// world unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boost {
    pub remaining: f32,
    pub direction: Vec2,
}

/// A simulated entity. Mass is the canonical quantity; radius is derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub class: EntityClass,
    pub position: Vec2,
    pub mass: f32,
    pub boost: Option<Boost>,
    /// Palette index, opaque to the simulation
    pub color: u8,
    pub spawn_tick: u64,
}

impl Entity {
    pub fn new(class: EntityClass, position: Vec2, mass: f32, color: u8, tick: u64) -> Self {
        Self {
            id: EntityId(0),
            class,
            position,
            mass,
            boost: None,
            color,
            spawn_tick: tick,
        }
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.class.kind()
    }

    #[inline]
    pub fn radius(&self, config: &EngineConfig) -> f32 {
        mass_to_radius(self.mass, config)
    }

    #[inline]
    pub fn is_player_cell(&self) -> bool {
        matches!(self.class, EntityClass::PlayerCell(_))
    }

    /// Owning session, if this is an attached player cell.
    #[inline]
    pub fn owner(&self) -> Option<SessionId> {
        match self.class {
            EntityClass::PlayerCell(state) => state.owner,
            _ => None,
        }
    }

    #[inline]
    pub fn player_state(&self) -> Option<&PlayerCellState> {
        match &self.class {
            EntityClass::PlayerCell(state) => Some(state),
            _ => None,
        }
    }

    #[inline]
    pub fn player_state_mut(&mut self) -> Option<&mut PlayerCellState> {
        match &mut self.class {
            EntityClass::PlayerCell(state) => Some(state),
            _ => None,
        }
    }

    #[inline]
    pub fn age(&self, current_tick: u64) -> u64 {
        current_tick.saturating_sub(self.spawn_tick)
    }

    /// Apply residual boost movement. Returns true while still boosting.
    pub fn update_boost(&mut self) -> bool {
        if let Some(ref mut boost) = self.boost {
            if boost.remaining < 1.0 {
                self.boost = None;
                return false;
            }
            // Exponential decay: travel 1/10 of the remaining distance per tick
            let step = boost.remaining / 10.0;
            boost.remaining -= step;
            self.position += boost.direction * step;
            true
        } else {
            false
        }
    }

    pub fn set_boost(&mut self, distance: f32, direction: Vec2) {
        self.boost = Some(Boost {
            remaining: distance,
            direction,
        });
    }

    /// Clamp the center to within half a radius of the border. A cell whose
    /// half-radius exceeds the arena pins to the center line.
    pub fn clamp_to_bounds(&mut self, config: &EngineConfig) {
        let half = self.radius(config) / 2.0;
        let hw = config.world_width / 2.0;
        let hh = config.world_height / 2.0;
        self.position.x = if half < hw {
            self.position.x.clamp(-hw + half, hw - half)
        } else {
            0.0
        };
        self.position.y = if half < hh {
            self.position.y.clamp(-hh + half, hh - half)
        } else {
            0.0
        };
    }
}

/// Radius derived from mass: `radius_scale * mass^radius_exponent`.
#[inline]
pub fn mass_to_radius(mass: f32, config: &EngineConfig) -> f32 {
    config.radius_scale * mass.powf(config.radius_exponent)
}
