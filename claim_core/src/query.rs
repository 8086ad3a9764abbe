//! Point-in-claim lookups.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::chunk_index::ChunkKey;
use crate::claim::{ClaimId, ClaimRecord, PlayerId};
use crate::geometry::{BlockPos, Location, WorldId};
use crate::store::ClaimStore;

impl ClaimStore {
    /// Most specific claim containing `point`, or this world's wilderness.
    ///
    /// `cached` is a hint from a previous lookup; it is revalidated against
    /// the arena and ignored if the claim is gone or no longer contains the
    /// point. Subdivisions always win over their parent.
    pub fn find_claim_at(
        &self,
        point: BlockPos,
        ignore_height: bool,
        cached: Option<ClaimId>,
    ) -> &ClaimRecord {
        if let Some(guess) = cached.and_then(|id| self.claim(id)) {
            if guess.contains(point, ignore_height) {
                return self.most_specific(guess, point, ignore_height);
            }
        }

        let key = ChunkKey::for_block(point, self.index.shift());
        let candidates = self.index.candidates_at(key);
        for id in candidates.iter() {
            let Some(claim) = self.claim(*id) else {
                continue;
            };
            if claim.is_top_level() && claim.contains(point, ignore_height) {
                return self.most_specific(claim, point, ignore_height);
            }
        }
        self.wilderness()
    }

    /// Descend into active subdivisions of `claim` that also contain `point`.
    fn most_specific<'a>(
        &'a self,
        claim: &'a ClaimRecord,
        point: BlockPos,
        ignore_height: bool,
    ) -> &'a ClaimRecord {
        let mut current = claim;
        while let Some(child) = current
            .children()
            .iter()
            .filter_map(|id| self.claim(*id))
            .find(|child| child.contains(point, ignore_height))
        {
            current = child;
        }
        current
    }

    /// Resolve many points at once on the rayon pool. Results line up with `points`.
    pub fn find_claims_at_many(&self, points: &[BlockPos], ignore_height: bool) -> Vec<ClaimId> {
        points
            .par_iter()
            .map(|point| self.find_claim_at(*point, ignore_height, None).id())
            .collect()
    }
}

/// Last claim each player was found in, used as the lookup hint.
///
/// Entries are plain ids: a deleted claim simply fails revalidation.
#[derive(Debug, Default, Clone)]
pub struct ClaimCache {
    last_claim: HashMap<PlayerId, (WorldId, ClaimId)>,
}

impl ClaimCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the claim at `location` for `player`, refreshing the cached hint.
    pub fn claim_for<'a>(
        &mut self,
        store: &'a ClaimStore,
        player: PlayerId,
        location: Location,
        ignore_height: bool,
    ) -> &'a ClaimRecord {
        let hint = self
            .last_claim
            .get(&player)
            .filter(|(world, _)| *world == store.world())
            .map(|(_, id)| *id);
        let claim = store.find_claim_at(location.pos, ignore_height, hint);
        if claim.is_wilderness() {
            self.last_claim.remove(&player);
        } else {
            self.last_claim.insert(player, (store.world(), claim.id()));
        }
        claim
    }

    pub fn cached(&self, player: PlayerId) -> Option<ClaimId> {
        self.last_claim.get(&player).map(|(_, id)| *id)
    }

    pub fn forget(&mut self, player: PlayerId) {
        self.last_claim.remove(&player);
    }
}
