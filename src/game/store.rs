//! Entity storage with monotonic id allocation and id-ordered iteration.

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::game::entity::{Entity, EntityId};

/// Container for all live entities.
///
/// Ids are allocated from a monotonic counter and never reused, so a stale id
/// can always be distinguished from a recycled one. Iteration is in ascending
/// id order, which the physics pipeline relies on for determinism.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            // Id 0 is reserved as a placeholder for not-yet-inserted entities
            next_id: 1,
        }
    }

    /// Insert an entity, assigning it the next id. Returns the assigned id.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        entity.id = id;
        self.entities.insert(id, entity);
        id
    }

    #[inline]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Atomic read-modify-write of a single entity.
    pub fn mutate<R>(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut Entity) -> R,
    ) -> Result<R, EngineError> {
        match self.entities.get_mut(&id) {
            Some(entity) => Ok(f(entity)),
            None => Err(EngineError::UnknownEntity(id)),
        }
    }

    /// Iterate all entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Collect ids matching a predicate, in ascending order.
    pub fn ids_where(&self, mut pred: impl FnMut(&Entity) -> bool) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| pred(e))
            .map(|e| e.id)
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entity::EntityClass;
    use crate::util::vec2::Vec2;

    fn food_at(x: f32, y: f32) -> Entity {
        Entity::new(EntityClass::Food, Vec2::new(x, y), 1.0, 0, 0)
    }

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut store = EntityStore::new();
        let a = store.insert(food_at(0.0, 0.0));
        let b = store.insert(food_at(1.0, 0.0));
        assert!(b > a);

        store.remove(a);
        let c = store.insert(food_at(2.0, 0.0));
        assert!(c > b, "removed ids must not be reused");
    }

    #[test]
    fn test_insert_assigns_id_on_entity() {
        let mut store = EntityStore::new();
        let id = store.insert(food_at(0.0, 0.0));
        assert_eq!(store.get(id).unwrap().id, id);
    }

    #[test]
    fn test_iteration_is_id_ordered() {
        let mut store = EntityStore::new();
        for i in 0..10 {
            store.insert(food_at(i as f32, 0.0));
        }
        let ids: Vec<_> = store.iter().map(|e| e.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_mutate_unknown_id() {
        let mut store = EntityStore::new();
        let err = store.mutate(EntityId(99), |e| e.mass = 5.0).unwrap_err();
        assert_eq!(err, EngineError::UnknownEntity(EntityId(99)));
    }

    #[test]
    fn test_mutate_applies() {
        let mut store = EntityStore::new();
        let id = store.insert(food_at(0.0, 0.0));
        store.mutate(id, |e| e.mass = 7.0).unwrap();
        assert_eq!(store.get(id).unwrap().mass, 7.0);
    }
}
