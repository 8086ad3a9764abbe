//! Footprint overlap checks used before committing a create or resize.
//!
//! Overlap is always tested on the X/Z footprint, even between cuboids at
//! disjoint heights: ownership of a column is exclusive.

use std::collections::HashSet;

use crate::claim::{ClaimId, ClaimRecord};
use crate::geometry::ClaimBounds;
use crate::store::ClaimStore;

/// First active claim in `scope` whose footprint intersects `candidate`.
pub fn first_overlap<'a, I>(candidate: &ClaimBounds, scope: I) -> Option<&'a ClaimRecord>
where
    I: IntoIterator<Item = &'a ClaimRecord>,
{
    scope
        .into_iter()
        .filter(|claim| claim.is_active())
        .find(|claim| claim.bounds().footprint_intersects(candidate))
}

impl ClaimStore {
    /// Linear scan over every other active top-level claim.
    pub fn overlapping_claim(
        &self,
        candidate: &ClaimBounds,
        exclude: Option<ClaimId>,
    ) -> Option<&ClaimRecord> {
        first_overlap(
            candidate,
            self.top_level_claims()
                .filter(|claim| Some(claim.id()) != exclude),
        )
    }

    /// Same answer as [`ClaimStore::overlapping_claim`], shortlisted through
    /// the chunk index. Reports the earliest-created conflict.
    ///
    /// Candidates touching more chunks than there are top-level claims use the
    /// linear scan instead.
    pub fn overlapping_claim_indexed(
        &self,
        candidate: &ClaimBounds,
        exclude: Option<ClaimId>,
    ) -> Option<&ClaimRecord> {
        if self.index.chunk_count(candidate) > self.top_level.len() as u64 {
            return self.overlapping_claim(candidate, exclude);
        }
        let mut seen = HashSet::new();
        let mut shortlist = Vec::new();
        for key in self.index.chunks_for(candidate) {
            for id in self.index.candidates_at(key).iter() {
                if Some(*id) != exclude && seen.insert(*id) {
                    shortlist.push(*id);
                }
            }
        }
        shortlist.sort_unstable();
        first_overlap(
            candidate,
            shortlist
                .into_iter()
                .filter_map(|id| self.claim(id))
                .filter(|claim| claim.is_top_level()),
        )
    }

    /// Sibling subdivisions of `parent` that would collide with `candidate`.
    pub fn overlapping_sibling(
        &self,
        parent: ClaimId,
        candidate: &ClaimBounds,
        exclude: Option<ClaimId>,
    ) -> Option<&ClaimRecord> {
        first_overlap(
            candidate,
            self.children_of(parent)
                .filter(|claim| Some(claim.id()) != exclude),
        )
    }
}
