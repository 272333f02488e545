//! LRU pool of baked buildings that left the viewport

use std::collections::HashMap;

use web_time::Instant;

use super::osm::BuildingId;
use super::{Building, BuildingState};

/// Out-of-view buildings, kept with their meshes until they come back or
/// get disposed
pub struct BuildingPool {
    buildings: HashMap<BuildingId, Building>,
    access_order: Vec<BuildingId>,
    max_pooled: usize,
    current_memory: usize,
}

impl BuildingPool {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            buildings: HashMap::with_capacity(max_pooled),
            access_order: Vec::with_capacity(max_pooled),
            max_pooled,
            current_memory: 0,
        }
    }

    pub fn contains(&self, id: &BuildingId) -> bool {
        self.buildings.contains_key(id)
    }

    pub fn get(&self, id: &BuildingId) -> Option<&Building> {
        self.buildings.get(id)
    }

    /// Pool a building, disposing the oldest ones over capacity. Returns the
    /// disposed ids, which include `building` itself when pooling is off.
    pub fn insert(&mut self, mut building: Building) -> Vec<BuildingId> {
        let id = building.id;
        if let Some(old) = self.buildings.remove(&id) {
            self.current_memory -= old.memory_size();
            self.access_order.retain(|b| b != &id);
        }

        let mut disposed = Vec::new();
        while !self.buildings.is_empty() && self.buildings.len() >= self.max_pooled {
            match self.evict_oldest() {
                Some(evicted) => disposed.push(evicted),
                None => break,
            }
        }

        if self.max_pooled == 0 {
            log::debug!("Disposed building {} (pooling disabled)", id);
            disposed.push(id);
            return disposed;
        }

        building.state = BuildingState::Pooled;
        building.pooled_at = Some(Instant::now());
        self.current_memory += building.memory_size();
        self.buildings.insert(id, building);
        self.access_order.push(id);
        disposed
    }

    /// Take a building back out, e.g. when it re-enters the viewport
    pub fn take(&mut self, id: &BuildingId) -> Option<Building> {
        let mut building = self.buildings.remove(id)?;
        self.current_memory -= building.memory_size();
        self.access_order.retain(|b| b != id);
        building.pooled_at = None;
        Some(building)
    }

    /// Dispose every building for which `keep` returns false, returning
    /// their ids
    pub fn retain(&mut self, mut keep: impl FnMut(&Building) -> bool) -> Vec<BuildingId> {
        let mut disposed = Vec::new();
        let mut freed = 0;
        self.buildings.retain(|id, building| {
            let keep = keep(building);
            if !keep {
                freed += building.memory_size();
                disposed.push(*id);
                log::debug!("Disposed building {}", id);
            }
            keep
        });
        self.current_memory -= freed;
        let buildings = &self.buildings;
        self.access_order.retain(|id| buildings.contains_key(id));
        disposed
    }

    fn evict_oldest(&mut self) -> Option<BuildingId> {
        if self.access_order.is_empty() {
            return None;
        }
        let oldest = self.access_order.remove(0);
        if let Some(building) = self.buildings.remove(&oldest) {
            self.current_memory -= building.memory_size();
            log::debug!("Evicted building {}", oldest);
        }
        Some(oldest)
    }

    pub fn clear(&mut self) {
        self.buildings.clear();
        self.access_order.clear();
        self.current_memory = 0;
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Building> {
        self.buildings.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &BuildingId> {
        self.buildings.keys()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pooled: self.buildings.len(),
            max_pooled: self.max_pooled,
            memory_used: self.current_memory,
        }
    }
}

/// Pool statistics for debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub pooled: usize,
    pub max_pooled: usize,
    /// Mesh buffer bytes held by pooled buildings
    pub memory_used: usize,
}

impl PoolStats {
    pub fn usage_percent(&self) -> f32 {
        if self.max_pooled == 0 {
            0.0
        } else {
            (self.pooled as f32 / self.max_pooled as f32) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::test_building;

    #[test]
    fn test_lru_eviction() {
        let mut pool = BuildingPool::new(2);
        assert!(pool.insert(test_building(1, 0.5, 0.5)).is_empty());
        assert!(pool.insert(test_building(2, 0.5, 0.5)).is_empty());
        assert_eq!(pool.insert(test_building(3, 0.5, 0.5)), vec![BuildingId::Way(1)]);

        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&BuildingId::Way(1)));
        assert!(pool.contains(&BuildingId::Way(3)));
        assert_eq!(pool.get(&BuildingId::Way(3)).map(|b| b.state), Some(BuildingState::Pooled));
    }

    #[test]
    fn test_take_and_memory() {
        let mut pool = BuildingPool::new(4);
        pool.insert(test_building(1, 0.5, 0.5));
        let size = pool.stats().memory_used;
        assert!(size > 0);
        pool.insert(test_building(2, 0.5, 0.5));
        assert_eq!(pool.stats().memory_used, size * 2);

        let building = pool.take(&BuildingId::Way(1)).unwrap();
        assert!(building.pooled_at.is_none());
        assert_eq!(pool.stats().memory_used, size);
        assert!(pool.take(&BuildingId::Way(1)).is_none());
    }

    #[test]
    fn test_retain() {
        let mut pool = BuildingPool::new(4);
        pool.insert(test_building(1, 0.1, 0.5));
        pool.insert(test_building(2, 0.9, 0.5));
        let disposed = pool.retain(|b| b.anchor.x < 0.5);
        assert_eq!(disposed, vec![BuildingId::Way(2)]);
        assert_eq!(pool.ids().copied().collect::<Vec<_>>(), vec![BuildingId::Way(1)]);
        // evicting still works after retain
        pool.insert(test_building(3, 0.1, 0.5));
        pool.insert(test_building(4, 0.1, 0.5));
        pool.insert(test_building(5, 0.1, 0.5));
        pool.insert(test_building(6, 0.1, 0.5));
        assert_eq!(pool.len(), 4);
        assert!(!pool.contains(&BuildingId::Way(1)));
        assert_eq!(pool.stats().usage_percent(), 100.0);
    }

    #[test]
    fn test_pooling_disabled() {
        let mut pool = BuildingPool::new(0);
        assert_eq!(pool.insert(test_building(1, 0.5, 0.5)), vec![BuildingId::Way(1)]);
        assert!(pool.is_empty());
    }
}
