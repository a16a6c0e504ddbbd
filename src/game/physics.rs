//! Per-tick simulation pipeline.
//!
//! Phase order within one tick:
//! 1. apply queued split/eject actions from the previous tick's inputs
//! 2. integrate motion (steering + residual boosts), clamp to bounds
//! 3. mass decay
//! 4. broad phase over player cells, then ordered pairwise resolution
//! 5. death detection
//!
//! Pair resolution runs in ascending id of the larger entity, heaviest
//! victim first, so a tick's outcome is a pure function of world state.

use std::f32::consts::TAU;

use rand::Rng;
use rustc_hash::FxHashSet;

use crate::config::EngineConfig;
use crate::error::index_fault;
use crate::game::entity::{
    mass_to_radius, CellPhase, Entity, EntityClass, EntityId, PlayerCellState, SessionId,
};
use crate::game::world::World;
use crate::util::vec2::Vec2;

/// Observable outcomes of one tick.
#[derive(Debug, Default)]
pub struct TickEvents {
    /// (eater, eaten) pairs, in resolution order
    pub consumed: Vec<(EntityId, EntityId)>,
    /// (survivor, absorbed) same-owner merges
    pub merged: Vec<(EntityId, EntityId)>,
    /// Cells that popped on a virus
    pub popped: Vec<EntityId>,
    /// Sessions whose last cell was lost this tick
    pub died: Vec<SessionId>,
}

/// Advance the world by one tick.
pub fn step(world: &mut World) -> TickEvents {
    world.tick += 1;
    let mut events = TickEvents::default();

    let alive_before: Vec<SessionId> = world
        .sessions()
        .map(|s| s.id)
        .filter(|&s| world.is_alive(s))
        .collect();

    apply_actions(world);
    integrate(world);
    decay(world);
    resolve_collisions(world, &mut events);

    for session in alive_before {
        if world.session(session).is_some() && !world.is_alive(session) {
            events.died.push(session);
        }
    }

    events
}

/// Movement speed of a player cell, per tick.
///
/// Bigger cells are slower; the cursor-distance factor lets players slow
/// down by keeping the target close.
#[inline]
pub fn player_speed(radius: f32, target_dist: f32, config: &EngineConfig) -> f32 {
    2.2 * radius.powf(-0.439) * 40.0 * (config.base_speed / 30.0) * (target_dist.min(32.0) / 32.0)
}

// ----------------------------------------------------------------------
// Phase 1: queued actions
// ----------------------------------------------------------------------

fn apply_actions(world: &mut World) {
    for session in world.session_ids() {
        let Some(state) = world.session(session) else {
            continue;
        };
        let target = state.target;
        let split = state.split_requested;
        let eject = state.eject_requested;
        let last_eject = state.last_eject_tick;

        if split {
            apply_split(world, session, target);
        }
        if eject {
            let tick = world.tick;
            let cooled =
                last_eject == 0 || tick - last_eject >= world.config.eject_cooldown_ticks;
            if cooled && apply_eject(world, session, target) {
                if let Some(state) = world.session_mut(session) {
                    state.last_eject_tick = tick;
                }
            }
        }
        if let Some(state) = world.session_mut(session) {
            state.split_requested = false;
            state.eject_requested = false;
        }
    }
}

fn apply_split(world: &mut World, session: SessionId, target: Vec2) {
    let cells = world.owned_cells(session);
    let mut count = cells.len();

    for id in cells {
        if count >= world.config.max_cells {
            break;
        }
        let Some(cell) = world.entity(id) else {
            continue;
        };
        if cell.mass < world.config.min_split_mass {
            continue;
        }
        let position = cell.position;
        let color = cell.color;
        let child_mass = cell.mass / 2.0;

        let dir = {
            let d = (target - position).normalize();
            if d == Vec2::ZERO {
                Vec2::new(1.0, 0.0)
            } else {
                d
            }
        };

        let child_radius = mass_to_radius(child_mass, &world.config);
        let ready = world.tick + world.merge_delay_ticks(child_mass);
        let tick = world.tick;

        let mut child = Entity::new(
            EntityClass::PlayerCell(PlayerCellState {
                owner: Some(session),
                merge_ready_tick: ready,
                phase: CellPhase::Active,
            }),
            position,
            child_mass,
            color,
            tick,
        );
        child.set_boost(
            world.config.split_speed * child_radius.powf(0.0122),
            dir,
        );
        if world.spawn_entity(child).is_err() {
            break;
        }

        let halved = world.mutate_entity(id, |e, _| {
            e.mass = child_mass;
            if let Some(state) = e.player_state_mut() {
                state.merge_ready_tick = ready;
            }
        });
        if let Err(e) = halved {
            index_fault("apply_split", e);
        }
        count += 1;
    }
}

/// Returns true if at least one pellet was ejected.
fn apply_eject(world: &mut World, session: SessionId, target: Vec2) -> bool {
    let cells = world.owned_cells(session);
    let mut ejected = false;

    for id in cells {
        let Some(cell) = world.entity(id) else {
            continue;
        };
        if cell.mass < world.config.min_eject_mass {
            continue;
        }
        let position = cell.position;
        let color = cell.color;
        let radius = cell.radius(&world.config);

        let base_dir = {
            let d = (target - position).normalize();
            if d == Vec2::ZERO {
                Vec2::new(1.0, 0.0)
            } else {
                d
            }
        };
        let max_jitter = world.config.eject_angle_jitter;
        let jitter = world.rng_mut().gen_range(-max_jitter..=max_jitter);
        let dir = base_dir.rotate(jitter);

        let tick = world.tick;
        let mut pellet = Entity::new(
            EntityClass::EjectedMass,
            position + base_dir * radius,
            world.config.eject_mass,
            color,
            tick,
        );
        pellet.set_boost(world.config.eject_speed, dir);
        if world.spawn_entity(pellet).is_err() {
            break;
        }

        let loss = world.config.eject_mass_loss;
        if let Err(e) = world.mutate_entity(id, |e, _| e.mass -= loss) {
            index_fault("apply_eject", e);
        }
        ejected = true;
    }
    ejected
}

// ----------------------------------------------------------------------
// Phase 2: motion
// ----------------------------------------------------------------------

fn integrate(world: &mut World) {
    let ids = world.ids_where(|e| e.is_player_cell() || e.boost.is_some());
    let tick = world.tick;

    for id in ids {
        let target = world
            .entity(id)
            .and_then(|e| e.owner())
            .and_then(|owner| world.session(owner))
            .map(|s| s.target);

        let result = world.mutate_entity(id, |e, config| {
            if let Some(state) = e.player_state_mut() {
                if state.phase == CellPhase::PoppedChild && tick >= state.merge_ready_tick {
                    state.phase = CellPhase::Active;
                }
            }
            if let Some(target) = target {
                let (dir, dist) = (target - e.position).normalize_with_length();
                if dist > 0.5 {
                    let speed = player_speed(e.radius(config), dist, config);
                    e.position += dir * speed;
                }
            }
            e.update_boost();
            e.clamp_to_bounds(config);
        });
        if let Err(e) = result {
            index_fault("integrate", e);
        }
    }
}

// ----------------------------------------------------------------------
// Phase 3: decay
// ----------------------------------------------------------------------

fn decay(world: &mut World) {
    let ids = world.ids_where(|e| e.is_player_cell());
    let mut starved: Vec<EntityId> = Vec::new();

    for id in ids {
        let result = world.mutate_entity(id, |e, config| {
            let detached = matches!(
                e.player_state().map(|s| s.phase),
                Some(CellPhase::Detached)
            );
            let rate = if detached {
                config.decay_rate_per_tick * config.detached_decay_multiplier
            } else {
                config.decay_rate_per_tick
            };
            if detached || e.mass > config.decay_min_mass {
                e.mass *= 1.0 - rate;
            }
            detached && e.mass < config.min_cell_mass
        });
        match result {
            Ok(true) => starved.push(id),
            Ok(false) => {}
            Err(e) => index_fault("decay", e),
        }
    }
    for id in starved {
        world.remove_entity(id);
    }
}

// ----------------------------------------------------------------------
// Phase 4: collisions
// ----------------------------------------------------------------------

struct CandidatePair {
    larger: EntityId,
    smaller: EntityId,
    smaller_mass: f32,
}

fn resolve_collisions(world: &mut World, events: &mut TickEvents) {
    let config = world.config.clone();
    let player_ids = world.ids_where(|e| e.is_player_cell());

    let mut pairs: Vec<CandidatePair> = Vec::new();
    let mut seen: FxHashSet<(EntityId, EntityId)> = FxHashSet::default();

    for &id in &player_ids {
        let Some(cell) = world.entity(id) else {
            continue;
        };
        let position = cell.position;
        let mass = cell.mass;
        let radius = cell.radius(&config);
        // Wide enough that anything we could eat or touch is included
        let search = (radius * 3.0).max(radius + 200.0);

        for candidate in world.grid().query_near(position, search) {
            if candidate == id {
                continue;
            }
            let Some(other) = world.entity(candidate) else {
                continue;
            };
            let (larger, smaller, smaller_mass) =
                if mass > other.mass || (mass == other.mass && id < candidate) {
                    (id, candidate, other.mass)
                } else {
                    (candidate, id, mass)
                };
            if seen.insert((larger, smaller)) {
                pairs.push(CandidatePair {
                    larger,
                    smaller,
                    smaller_mass,
                });
            }
        }
    }

    pairs.sort_by(|a, b| {
        a.larger
            .cmp(&b.larger)
            .then(b.smaller_mass.total_cmp(&a.smaller_mass))
            .then(a.smaller.cmp(&b.smaller))
    });

    let mut removed: FxHashSet<EntityId> = FxHashSet::default();
    for pair in pairs {
        if removed.contains(&pair.larger) || removed.contains(&pair.smaller) {
            continue;
        }
        resolve_pair(world, &config, pair.larger, pair.smaller, &mut removed, events);
    }
}

fn resolve_pair(
    world: &mut World,
    config: &EngineConfig,
    a: EntityId,
    b: EntityId,
    removed: &mut FxHashSet<EntityId>,
    events: &mut TickEvents,
) {
    let (Some(ea), Some(eb)) = (world.entity(a).cloned(), world.entity(b).cloned()) else {
        return;
    };
    // Roles are recomputed from current mass; earlier pairs may have fed
    // either side since the broad phase ran
    let (larger, smaller) = if ea.mass > eb.mass || (ea.mass == eb.mass && a < b) {
        (ea, eb)
    } else {
        (eb, ea)
    };
    let (larger_id, smaller_id) = (larger.id, smaller.id);

    // Only player cells act on contact
    let Some(larger_state) = larger.player_state().copied() else {
        return;
    };

    let lr = larger.radius(config);
    let sr = smaller.radius(config);
    let dist = larger.position.distance_to(smaller.position);
    if dist >= lr + sr {
        return;
    }

    let eats = |lr: f32, sr: f32, dist: f32| {
        lr >= config.eat_radius_ratio * sr && dist <= lr - sr / config.eat_overlap_div
    };

    match smaller.class {
        EntityClass::Food => {
            if eats(lr, sr, dist) {
                consume(world, larger_id, smaller_id, removed, events);
            }
        }
        EntityClass::EjectedMass => {
            let age = smaller.age(world.tick);
            if age >= config.eject_grace_ticks && eats(lr, sr, dist) {
                consume(world, larger_id, smaller_id, removed, events);
            }
        }
        EntityClass::Virus => {
            if larger.mass >= config.virus_pop_min_mass && eats(lr, sr, dist) {
                consume(world, larger_id, smaller_id, removed, events);
                pop_cell(world, config, larger_id, events);
            }
        }
        EntityClass::PlayerCell(smaller_state) => {
            let same_owner =
                larger_state.owner.is_some() && larger_state.owner == smaller_state.owner;
            if same_owner {
                let tick = world.tick;
                let ready = |entity: &Entity, state: &PlayerCellState| {
                    state.merge_ready_tick <= tick
                        && entity.age(tick) >= config.merge_min_age_ticks
                };
                if ready(&larger, &larger_state) && ready(&smaller, &smaller_state) {
                    if dist <= lr - sr / config.eat_overlap_div {
                        merge(world, larger_id, smaller_id, removed, events);
                    }
                    // Merge-eligible cells overlap freely until deep enough
                } else {
                    rigid_push(world, larger_id, smaller_id, lr, sr, dist);
                }
            } else if eats(lr, sr, dist) {
                consume(world, larger_id, smaller_id, removed, events);
            }
        }
    }
}

/// Transfer the eaten entity's full mass to the eater and remove it.
fn consume(
    world: &mut World,
    eater: EntityId,
    eaten: EntityId,
    removed: &mut FxHashSet<EntityId>,
    events: &mut TickEvents,
) {
    let Some(meal) = world.remove_entity(eaten) else {
        return;
    };
    removed.insert(eaten);
    let gained = meal.mass;
    if let Err(e) = world.mutate_entity(eater, |e, _| e.mass += gained) {
        index_fault("consume", e);
    }
    events.consumed.push((eater, eaten));
}

/// Merge two same-owner cells: survivor takes the summed mass and the
/// mass-weighted centroid, and its merge timer restarts.
fn merge(
    world: &mut World,
    survivor: EntityId,
    absorbed: EntityId,
    removed: &mut FxHashSet<EntityId>,
    events: &mut TickEvents,
) {
    let Some(other) = world.remove_entity(absorbed) else {
        return;
    };
    removed.insert(absorbed);

    let (m2, p2) = (other.mass, other.position);
    let total_after = world
        .entity(survivor)
        .map(|e| e.mass + m2)
        .unwrap_or(m2);
    let delay = world.merge_delay_ticks(total_after);
    let tick = world.tick;

    let result = world.mutate_entity(survivor, |e, _| {
        let m1 = e.mass;
        let total = m1 + m2;
        e.position = (e.position * m1 + p2 * m2) * (1.0 / total);
        e.mass = total;
        if let Some(state) = e.player_state_mut() {
            state.merge_ready_tick = tick + delay;
        }
    });
    if let Err(e) = result {
        index_fault("merge", e);
    }
    events.merged.push((survivor, absorbed));
}

/// Push apart overlapping same-owner cells that may not merge yet,
/// distributing the correction by mass ratio.
fn rigid_push(
    world: &mut World,
    a: EntityId,
    b: EntityId,
    ra: f32,
    rb: f32,
    dist: f32,
) {
    let (Some(ea), Some(eb)) = (world.entity(a), world.entity(b)) else {
        return;
    };
    let (ma, mb) = (ea.mass, eb.mass);
    let (pa, pb) = (ea.position, eb.position);

    let overlap = (ra + rb) - dist;
    if overlap <= 0.0 {
        return;
    }
    let dir = if dist > 1e-4 {
        (pb - pa) * (1.0 / dist)
    } else {
        // Exactly stacked cells separate along the x axis
        Vec2::new(1.0, 0.0)
    };
    let total = ma + mb;
    let push_a = overlap * (mb / total);
    let push_b = overlap * (ma / total);

    let moved_a = world.mutate_entity(a, |e, config| {
        e.position -= dir * push_a;
        e.clamp_to_bounds(config);
    });
    if let Err(e) = moved_a {
        index_fault("rigid_push", e);
    }
    let moved_b = world.mutate_entity(b, |e, config| {
        e.position += dir * push_b;
        e.clamp_to_bounds(config);
    });
    if let Err(e) = moved_b {
        index_fault("rigid_push", e);
    }
}

/// Split a cell that ate a virus into boosted fragments.
fn pop_cell(world: &mut World, config: &EngineConfig, cell_id: EntityId, events: &mut TickEvents) {
    let Some(cell) = world.entity(cell_id) else {
        return;
    };
    let Some(owner) = cell.owner() else {
        // Detached cells keep the mass but have no slot budget to split into
        return;
    };
    let position = cell.position;
    let color = cell.color;
    let mass = cell.mass;

    let cells_left = config
        .max_cells
        .saturating_sub(world.owned_cell_count(owner));
    if cells_left == 0 {
        return;
    }

    let splits = virus_split_masses(mass, cells_left, config.virus_split_min_mass);
    if splits.is_empty() {
        return;
    }
    let tick = world.tick;

    for &split_mass in &splits {
        let angle = world.rng_mut().gen::<f32>() * TAU;
        let child_radius = mass_to_radius(split_mass, config);
        let ready = tick + world.merge_delay_ticks(split_mass);

        let mut child = Entity::new(
            EntityClass::PlayerCell(PlayerCellState {
                owner: Some(owner),
                merge_ready_tick: ready,
                phase: CellPhase::PoppedChild,
            }),
            position,
            split_mass,
            color,
            tick,
        );
        child.set_boost(
            config.split_speed * child_radius.powf(0.0122),
            Vec2::from_angle(angle),
        );
        if world.spawn_entity(child).is_err() {
            break;
        }
        if let Err(e) = world.mutate_entity(cell_id, |e, _| e.mass -= split_mass) {
            index_fault("pop_cell", e);
        }
    }

    let parent_mass = world.entity(cell_id).map(|e| e.mass).unwrap_or(mass);
    let delay = world.merge_delay_ticks(parent_mass);
    let reset = world.mutate_entity(cell_id, |e, _| {
        if let Some(state) = e.player_state_mut() {
            state.merge_ready_tick = tick + delay;
        }
    });
    if let Err(e) = reset {
        index_fault("pop_cell", e);
    }
    events.popped.push(cell_id);
}

/// Fragment masses for a virus pop.
///
/// When the average mass per free slot is below the fragment minimum, the
/// count doubles until the budget runs out and the mass is shared evenly
/// (the popped cell keeps one share). Otherwise fragments halve until the
/// remaining mass is spread over the remaining slots.
pub fn virus_split_masses(cell_mass: f32, cells_left: usize, split_min: f32) -> Vec<f32> {
    let mut splits = Vec::new();
    if cells_left == 0 {
        return splits;
    }

    if cell_mass / (cells_left as f32) < split_min {
        let mut split_count: usize = 2;
        let mut split_mass = cell_mass / split_count as f32;
        while split_mass > split_min && 2 * split_count < cells_left {
            split_count *= 2;
            split_mass = cell_mass / split_count as f32;
        }
        split_mass = cell_mass / (split_count + 1) as f32;
        for _ in 0..split_count {
            splits.push(split_mass);
        }
        return splits;
    }

    let mut mass_left = cell_mass / 2.0;
    let mut split_mass = cell_mass / 2.0;
    let mut remaining = cells_left as i64;

    loop {
        if remaining <= 0 {
            break;
        }
        remaining -= 1;

        let rem_f = remaining as f32;
        if mass_left / rem_f < split_min {
            split_mass = mass_left / rem_f;
            while remaining > 0 {
                remaining -= 1;
                splits.push(split_mass);
            }
            // No early exit: the final fragment below still gets pushed
        }

        while split_mass >= mass_left && remaining > 0 {
            split_mass /= 2.0;
        }

        splits.push(split_mass);
        mass_left -= split_mass;
    }

    splits
}
