//! Spatial hash grid for O(n) collision broad phase
//!
//! Divides the world into uniform cells and stores entity ids in every cell
//! their bounding box overlaps, so entities larger than a grid cell are still
//! found. Queries scan only the cells covered by the query region.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::error::EngineError;
use crate::game::entity::EntityId;
use crate::util::vec2::Vec2;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Initial capacity for the cell hashmap (number of expected non-empty cells)
const GRID_INITIAL_CAPACITY: usize = 256;

/// Initial capacity for id vectors within cells
const CELL_INITIAL_CAPACITY: usize = 8;

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    #[inline]
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Bounding box of a circle.
    #[inline]
    pub fn from_circle(center: Vec2, radius: f32) -> Self {
        Self {
            min: Vec2::new(center.x - radius, center.y - radius),
            max: Vec2::new(center.x + radius, center.y + radius),
        }
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    #[inline]
    pub fn contains_point(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Key range covered by an AABB: inclusive min/max cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyRange {
    min: CellKey,
    max: CellKey,
}

impl KeyRange {
    fn keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        let (min, max) = (self.min, self.max);
        (min.0..=max.0).flat_map(move |x| (min.1..=max.1).map(move |y| (x, y)))
    }
}

/// Spatial hash grid keyed by entity id.
///
/// The grid stores only ids and bounding boxes; narrow-phase geometry stays
/// with the entities themselves.
pub struct SpatialGrid {
    /// Cell size in world units (larger = fewer cells, more entities per cell)
    cell_size: f32,
    /// Inverse cell size for fast position-to-cell conversion
    inv_cell_size: f32,
    /// Map from cell key to ids whose bounds overlap that cell
    cells: HashMap<CellKey, Vec<EntityId>, FxBuildHasher>,
    /// Per-id bookkeeping for O(1) removal and movement
    entries: HashMap<EntityId, (KeyRange, Aabb), FxBuildHasher>,
}

impl SpatialGrid {
    /// Create a new spatial grid with the given cell size
    ///
    /// Cell size should be on the order of the typical entity diameter;
    /// oversized entities are handled by multi-cell coverage.
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity_and_hasher(GRID_INITIAL_CAPACITY, FxBuildHasher),
            entries: HashMap::with_capacity_and_hasher(GRID_INITIAL_CAPACITY, FxBuildHasher),
        }
    }

    #[inline]
    fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    #[inline]
    fn range_of(&self, aabb: &Aabb) -> KeyRange {
        KeyRange {
            min: self.position_to_cell(aabb.min),
            max: self.position_to_cell(aabb.max),
        }
    }

    /// Insert an entity with its bounding box.
    pub fn insert(&mut self, id: EntityId, aabb: Aabb) -> Result<(), EngineError> {
        if self.entries.contains_key(&id) {
            return Err(EngineError::DuplicateEntity(id));
        }
        let range = self.range_of(&aabb);
        for key in range.keys() {
            self.cells
                .entry(key)
                .or_insert_with(|| Vec::with_capacity(CELL_INITIAL_CAPACITY))
                .push(id);
        }
        self.entries.insert(id, (range, aabb));
        Ok(())
    }

    /// Remove an entity from the grid.
    pub fn remove(&mut self, id: EntityId) -> Result<(), EngineError> {
        let (range, _) = self
            .entries
            .remove(&id)
            .ok_or(EngineError::UnknownEntity(id))?;
        for key in range.keys() {
            if let Some(cell) = self.cells.get_mut(&key) {
                if let Some(idx) = cell.iter().position(|&e| e == id) {
                    cell.swap_remove(idx);
                }
                if cell.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
        Ok(())
    }

    /// Update an entity's bounding box after movement or resize.
    pub fn update(&mut self, id: EntityId, aabb: Aabb) -> Result<(), EngineError> {
        let new_range = self.range_of(&aabb);
        let (old_range, stored) = self
            .entries
            .get_mut(&id)
            .ok_or(EngineError::UnknownEntity(id))?;

        if *old_range == new_range {
            // Same cells, only the box changed
            *stored = aabb;
            return Ok(());
        }

        self.remove(id)?;
        self.insert(id, aabb)
    }

    /// All ids whose bounding box intersects the region, ascending by id.
    pub fn query_region(&self, region: Aabb) -> Vec<EntityId> {
        let range = self.range_of(&region);
        let mut found: SmallVec<[EntityId; 32]> = SmallVec::new();

        for key in range.keys() {
            if let Some(cell) = self.cells.get(&key) {
                for &id in cell {
                    if let Some((_, aabb)) = self.entries.get(&id) {
                        if aabb.intersects(&region) {
                            found.push(id);
                        }
                    }
                }
            }
        }

        // Multi-cell entities appear once per covered cell
        found.sort_unstable();
        found.dedup();
        found.into_vec()
    }

    /// All ids whose bounding box intersects a circle's bounding box.
    #[inline]
    pub fn query_near(&self, point: Vec2, radius: f32) -> Vec<EntityId> {
        self.query_region(Aabb::from_circle(point, radius))
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get statistics about the grid
    pub fn stats(&self) -> SpatialGridStats {
        let non_empty_cells = self.cells.len();
        let max_per_cell = self.cells.values().map(|c| c.len()).max().unwrap_or(0);
        SpatialGridStats {
            non_empty_cells,
            tracked_entities: self.entries.len(),
            max_per_cell,
        }
    }
}

/// Statistics about the spatial grid
#[derive(Debug, Clone)]
pub struct SpatialGridStats {
    pub non_empty_cells: usize,
    pub tracked_entities: usize,
    pub max_per_cell: usize,
}
