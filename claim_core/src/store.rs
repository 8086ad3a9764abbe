use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bevy::prelude::Resource;

use crate::chunk_index::ChunkIndex;
use crate::claim::{ClaimId, ClaimRecord, PlayerId};
use crate::collaborators::{ClaimEventSink, ClaimPersistence, NullEventSink, NullPersistence};
use crate::config::ClaimConfig;
use crate::geometry::{Location, WorldId};
use crate::siege::SiegeId;

/// World-independent limits applied by every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub min_y: i32,
    pub max_y: i32,
    pub chunk_shift: u32,
    pub depth_floor: i32,
    pub min_width: i64,
    pub min_area: i64,
    pub max_claim_width: i64,
}

impl StoreSettings {
    pub fn from_config(config: &ClaimConfig) -> Self {
        Self {
            min_y: config.world.min_y,
            max_y: config.world.max_y,
            chunk_shift: config.world.chunk_shift,
            depth_floor: config.depth_floor(),
            min_width: config.claims.min_width,
            min_area: config.claims.min_area,
            max_claim_width: config.claims.max_claim_width,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::from_config(&ClaimConfig::default())
    }
}

/// Hands out claim ids. Shared by every store of a [`ClaimWorlds`].
#[derive(Debug, Clone)]
pub struct ClaimIdAllocator(Arc<AtomicU64>);

impl Default for ClaimIdAllocator {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }
}

impl ClaimIdAllocator {
    pub fn next(&self) -> ClaimId {
        ClaimId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Collaborators notified after committed changes.
#[derive(Debug, Clone)]
pub struct ClaimHooks {
    pub persistence: Arc<dyn ClaimPersistence>,
    pub events: Arc<dyn ClaimEventSink>,
}

impl Default for ClaimHooks {
    fn default() -> Self {
        Self {
            persistence: Arc::new(NullPersistence),
            events: Arc::new(NullEventSink),
        }
    }
}

/// Claims of a single world: the record arena, the chunk index over its
/// top-level claims, and the wilderness sentinel.
///
/// Only the lifecycle operations (`create`, `resize`, `delete`,
/// `extend_depth`) touch boundaries, hierarchy links or the index.
#[derive(Debug)]
pub struct ClaimStore {
    world: WorldId,
    settings: StoreSettings,
    pub(crate) records: HashMap<ClaimId, ClaimRecord>,
    pub(crate) top_level: Vec<ClaimId>,
    pub(crate) index: ChunkIndex,
    wilderness: ClaimRecord,
    pub(crate) ids: ClaimIdAllocator,
    pub(crate) hooks: ClaimHooks,
}

impl ClaimStore {
    pub fn new(world: WorldId, settings: StoreSettings) -> Self {
        Self::with_parts(world, settings, ClaimIdAllocator::default(), ClaimHooks::default())
    }

    pub fn with_parts(
        world: WorldId,
        settings: StoreSettings,
        ids: ClaimIdAllocator,
        hooks: ClaimHooks,
    ) -> Self {
        Self {
            world,
            settings,
            records: HashMap::new(),
            top_level: Vec::new(),
            index: ChunkIndex::new(settings.chunk_shift),
            wilderness: ClaimRecord::wilderness(world, settings.min_y, settings.max_y),
            ids,
            hooks,
        }
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn wilderness(&self) -> &ClaimRecord {
        &self.wilderness
    }

    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    /// Live record for `id`. Deleted ids resolve to `None`.
    pub fn claim(&self, id: ClaimId) -> Option<&ClaimRecord> {
        self.records.get(&id).filter(|record| record.is_active())
    }

    pub fn is_live(&self, id: ClaimId) -> bool {
        self.claim(id).is_some()
    }

    /// Active top-level claims in creation order.
    pub fn top_level_claims(&self) -> impl Iterator<Item = &ClaimRecord> + '_ {
        self.top_level.iter().filter_map(|id| self.claim(*id))
    }

    /// Active subdivisions of `parent`, in insertion order.
    pub fn children_of(&self, parent: ClaimId) -> impl Iterator<Item = &ClaimRecord> + '_ {
        self.claim(parent)
            .map(|record| record.children())
            .unwrap_or(&[])
            .iter()
            .filter_map(|id| self.claim(*id))
    }

    pub fn claims_owned_by(&self, owner: PlayerId) -> Vec<&ClaimRecord> {
        self.top_level_claims()
            .filter(|claim| claim.owner() == Some(owner))
            .collect()
    }

    /// Footprint area of every top-level claim the owner holds.
    pub fn claimed_area(&self, owner: PlayerId) -> i64 {
        self.top_level_claims()
            .filter(|claim| claim.owner() == Some(owner))
            .map(ClaimRecord::area)
            .sum()
    }

    /// Number of active claims, subdivisions included.
    pub fn len(&self) -> usize {
        self.records.values().filter(|r| r.is_active()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn set_access_override(&mut self, id: ClaimId, open: bool) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if record.is_active() => {
                record.set_access_override(open);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_siege(&mut self, id: ClaimId, siege: Option<SiegeId>) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if record.is_active() => {
                record.set_siege(siege);
                true
            }
            _ => false,
        }
    }
}

/// Every world's claim store, keyed by world id.
#[derive(Resource, Debug)]
pub struct ClaimWorlds {
    stores: BTreeMap<WorldId, ClaimStore>,
    settings: StoreSettings,
    ids: ClaimIdAllocator,
    hooks: ClaimHooks,
}

impl Default for ClaimWorlds {
    fn default() -> Self {
        Self::new(StoreSettings::default())
    }
}

impl ClaimWorlds {
    pub fn new(settings: StoreSettings) -> Self {
        Self::with_hooks(settings, ClaimHooks::default())
    }

    pub fn with_hooks(settings: StoreSettings, hooks: ClaimHooks) -> Self {
        Self {
            stores: BTreeMap::new(),
            settings,
            ids: ClaimIdAllocator::default(),
            hooks,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn hooks(&self) -> &ClaimHooks {
        &self.hooks
    }

    pub fn store(&self, world: WorldId) -> Option<&ClaimStore> {
        self.stores.get(&world)
    }

    /// Store for `world`, created empty on first use.
    pub fn store_mut(&mut self, world: WorldId) -> &mut ClaimStore {
        let settings = self.settings;
        let ids = &self.ids;
        let hooks = &self.hooks;
        self.stores
            .entry(world)
            .or_insert_with(|| ClaimStore::with_parts(world, settings, ids.clone(), hooks.clone()))
    }

    pub fn existing_store_mut(&mut self, world: WorldId) -> Option<&mut ClaimStore> {
        self.stores.get_mut(&world)
    }

    pub fn stores(&self) -> impl Iterator<Item = &ClaimStore> + '_ {
        self.stores.values()
    }

    pub fn world_ids(&self) -> Vec<WorldId> {
        self.stores.keys().copied().collect()
    }

    pub fn claim(&self, world: WorldId, id: ClaimId) -> Option<&ClaimRecord> {
        self.store(world).and_then(|store| store.claim(id))
    }

    /// Claim owning `location`, or `None` in wilderness or unknown worlds.
    pub fn claim_at(
        &self,
        location: Location,
        ignore_height: bool,
        cached: Option<ClaimId>,
    ) -> Option<&ClaimRecord> {
        self.store(location.world)
            .map(|store| store.find_claim_at(location.pos, ignore_height, cached))
            .filter(|claim| !claim.is_wilderness())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_shared_between_worlds() {
        let mut worlds = ClaimWorlds::default();
        let first = worlds.store_mut(WorldId(0)).ids.next();
        let second = worlds.store_mut(WorldId(1)).ids.next();
        assert_eq!(first, ClaimId(1));
        assert_eq!(second, ClaimId(2));
    }

    #[test]
    fn empty_store_answers_wilderness() {
        let store = ClaimStore::new(WorldId(2), StoreSettings::default());
        assert!(store.is_empty());
        assert!(store.wilderness().is_wilderness());
        assert_eq!(store.wilderness().world(), WorldId(2));
        assert!(store.claim(ClaimId::WILDERNESS).is_none());
        assert_eq!(store.children_of(ClaimId(5)).count(), 0);
    }

    #[test]
    fn unknown_world_has_no_claims() {
        let worlds = ClaimWorlds::default();
        assert!(worlds
            .claim_at(Location::new(WorldId(9), 0, 64, 0), true, None)
            .is_none());
    }
}
