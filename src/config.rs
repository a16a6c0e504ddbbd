use serde::{Deserialize, Serialize};

/// Simulation configuration.
///
/// All cell quantities are mass-denominated; a cell's radius is derived as
/// `radius_scale * mass^radius_exponent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// World width in world units (arena is centered at the origin)
    pub world_width: f32,
    /// World height in world units
    pub world_height: f32,
    /// Simulation tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Hard cap on live entities of all kinds
    pub max_entities: usize,
    /// Spatial grid cell size in world units
    pub grid_cell_size: f32,

    /// Radius = radius_scale * mass^radius_exponent
    pub radius_scale: f32,
    /// Exponent of the mass-to-radius law (0.5 keeps area proportional to mass)
    pub radius_exponent: f32,

    /// Mass of a freshly spawned player cell
    pub start_mass: f32,
    /// Below this mass a cell is removed outright
    pub min_cell_mass: f32,
    /// Minimum mass required to split
    pub min_split_mass: f32,
    /// Minimum mass required to eject
    pub min_eject_mass: f32,
    /// Maximum cells one session may own
    pub max_cells: usize,
    /// Base movement speed factor
    pub base_speed: f32,

    /// Per-tick fractional mass loss for cells above `decay_min_mass`
    pub decay_rate_per_tick: f32,
    /// Decay only applies above this mass (detached cells ignore the floor)
    pub decay_min_mass: f32,
    /// Decay multiplier for detached (ownerless) player cells
    pub detached_decay_multiplier: f32,

    /// Larger cell must be at least this ratio bigger (by radius) to consume
    pub eat_radius_ratio: f32,
    /// Overlap requirement: dist <= larger_r - smaller_r / eat_overlap_div
    pub eat_overlap_div: f32,

    /// Base boost distance applied to split children
    pub split_speed: f32,
    /// Minimum merge cooldown in seconds
    pub merge_base_s: f32,
    /// Per-radius-unit addition to the merge cooldown, in seconds
    pub merge_size_factor: f32,
    /// A cell younger than this many ticks never merges
    pub merge_min_age_ticks: u64,

    /// Mass of an ejected pellet
    pub eject_mass: f32,
    /// Mass the ejecting cell loses (the difference dissipates)
    pub eject_mass_loss: f32,
    /// Boost distance applied to ejected pellets
    pub eject_speed: f32,
    /// Ticks before a fresh pellet can be consumed
    pub eject_grace_ticks: u64,
    /// Random angular spread applied to ejections, in radians
    pub eject_angle_jitter: f32,
    /// Minimum ticks between ejections per session
    pub eject_cooldown_ticks: u64,

    /// Mass range for spawned viruses
    pub virus_mass_min: f32,
    pub virus_mass_max: f32,
    /// A player cell at or above this mass pops on virus contact
    pub virus_pop_min_mass: f32,
    /// Minimum mass of a virus-pop fragment
    pub virus_split_min_mass: f32,
    /// Virus population is kept within this range
    pub virus_min_count: usize,
    pub virus_max_count: usize,

    /// Mass of a food pellet
    pub food_mass: f32,
    /// Food population is kept within this range
    pub food_min_count: usize,
    pub food_max_count: usize,
    /// Food pellets spawned per tick while below the minimum
    pub food_spawn_per_tick: usize,

    /// Placement attempts before falling back to the last candidate
    pub spawn_max_attempts: usize,

    /// Viewport half-extent at scale 1.0
    pub view_base_extent: f32,
    /// Camera scale law reference: scale = min(1, base/total_radius)^0.4
    pub view_camera_base: f32,

    /// Leaderboard recompute cadence, in ticks
    pub leaderboard_interval_ticks: u64,
    /// Number of leaderboard entries
    pub leaderboard_size: usize,

    /// Command/input buffer capacity
    pub command_buffer_capacity: usize,
    /// Outbound message channel capacity
    pub outbound_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world_width: 14142.0,
            world_height: 14142.0,
            tick_interval_ms: 40,
            max_entities: 8000,
            grid_cell_size: 128.0,

            radius_scale: 10.0,
            radius_exponent: 0.5,

            start_mass: 10.0,
            min_cell_mass: 9.0,
            min_split_mass: 36.0,
            min_eject_mass: 36.0,
            max_cells: 16,
            base_speed: 30.0,

            decay_rate_per_tick: 0.00008,
            decay_min_mass: 100.0,
            detached_decay_multiplier: 10.0,

            eat_radius_ratio: 1.15,
            eat_overlap_div: 3.0,

            split_speed: 780.0,
            merge_base_s: 30.0,
            merge_size_factor: 0.2,
            merge_min_age_ticks: 13,

            eject_mass: 13.0,
            eject_mass_loss: 17.0,
            eject_speed: 780.0,
            eject_grace_ticks: 2,
            eject_angle_jitter: 0.3,
            eject_cooldown_ticks: 2,

            virus_mass_min: 100.0,
            virus_mass_max: 200.0,
            virus_pop_min_mass: 150.0,
            virus_split_min_mass: 36.0,
            virus_min_count: 50,
            virus_max_count: 100,

            food_mass: 1.0,
            food_min_count: 1500,
            food_max_count: 3000,
            food_spawn_per_tick: 30,

            spawn_max_attempts: 16,

            view_base_extent: 1000.0,
            view_camera_base: 64.0,

            leaderboard_interval_ticks: 25,
            leaderboard_size: 10,

            command_buffer_capacity: 1024,
            outbound_capacity: 4096,
        }
    }
}

impl EngineConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(size) = std::env::var("ARENA_WORLD_SIZE") {
            if let Ok(parsed) = size.parse::<f32>() {
                if parsed > 0.0 && parsed.is_finite() {
                    config.world_width = parsed;
                    config.world_height = parsed;
                } else {
                    tracing::warn!("ARENA_WORLD_SIZE must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid ARENA_WORLD_SIZE '{}', using default", size);
            }
        }

        if let Ok(interval) = std::env::var("ARENA_TICK_INTERVAL_MS") {
            if let Ok(parsed) = interval.parse::<u64>() {
                if parsed > 0 {
                    config.tick_interval_ms = parsed;
                } else {
                    tracing::warn!("ARENA_TICK_INTERVAL_MS must be > 0, using default");
                }
            } else {
                tracing::warn!(
                    "Invalid ARENA_TICK_INTERVAL_MS '{}', using default",
                    interval
                );
            }
        }

        if let Ok(max) = std::env::var("ARENA_MAX_ENTITIES") {
            if let Ok(parsed) = max.parse::<usize>() {
                if parsed > 0 {
                    config.max_entities = parsed;
                } else {
                    tracing::warn!("ARENA_MAX_ENTITIES must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid ARENA_MAX_ENTITIES '{}', using default", max);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.world_width <= 0.0 || self.world_height <= 0.0 {
            return Err("world dimensions must be positive".to_string());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be at least 1".to_string());
        }
        if self.grid_cell_size <= 0.0 {
            return Err("grid_cell_size must be positive".to_string());
        }
        if self.eat_radius_ratio < 1.0 {
            return Err("eat_radius_ratio must be >= 1.0".to_string());
        }
        if self.eat_overlap_div <= 0.0 {
            return Err("eat_overlap_div must be positive".to_string());
        }
        if self.max_cells == 0 {
            return Err("max_cells must be at least 1".to_string());
        }
        if self.min_cell_mass <= 0.0 {
            return Err("min_cell_mass must be positive".to_string());
        }
        if self.food_min_count > self.food_max_count {
            return Err("food_min_count cannot exceed food_max_count".to_string());
        }
        if self.virus_min_count > self.virus_max_count {
            return Err("virus_min_count cannot exceed virus_max_count".to_string());
        }
        Ok(())
    }

    /// Ticks per second implied by the tick interval.
    pub fn tick_rate(&self) -> f32 {
        1000.0 / self.tick_interval_ms as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval_ms, 40);
        assert_eq!(config.max_cells, 16);
    }

    #[test]
    fn test_tick_rate() {
        let config = EngineConfig::default();
        assert!((config.tick_rate() - 25.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let config = EngineConfig {
            eat_radius_ratio: 0.9,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
