//! Create, resize, delete and depth extension of claims.
//!
//! Every operation validates fully before touching the arena or the chunk
//! index, so a rejected request leaves the store exactly as it was.

use thiserror::Error;

use crate::claim::{ClaimId, ClaimKind, ClaimRecord, ClaimState, PlayerId};
use crate::collaborators::ClaimEvent;
use crate::geometry::{ClaimBounds, GeometryError, Location, WorldId};
use crate::store::{ClaimStore, ClaimWorlds};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("overlaps existing {conflicting}")]
    Conflict { conflicting: ClaimId },
    #[error("{0} does not exist or was deleted")]
    NotFound(ClaimId),
    #[error("{0} has no claim store")]
    UnknownWorld(WorldId),
    #[error("corners are in {actual} but the store manages {expected}")]
    WrongWorld { expected: WorldId, actual: WorldId },
    #[error("invalid claim geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),
    #[error("parent {0} is not active")]
    ParentInactive(ClaimId),
    #[error("{0} cannot hold subdivisions")]
    NotContainer(ClaimId),
    #[error("subdivision must lie inside {parent}")]
    OutsideParent { parent: ClaimId },
    #[error("new bounds would leave subdivision {child} outside its parent")]
    ChildOutside { child: ClaimId },
    #[error("{width}x{length} claim is below the minimum ({min_width} wide, {min_area} blocks)")]
    TooSmall {
        width: i64,
        length: i64,
        min_width: i64,
        min_area: i64,
    },
    #[error("cannot create a {kind:?} claim: {reason}")]
    InvalidKind {
        kind: ClaimKind,
        reason: &'static str,
    },
}

/// Request for a new claim.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClaim {
    pub first: Location,
    pub second: Location,
    pub cuboid: bool,
    pub kind: ClaimKind,
    pub owner: Option<PlayerId>,
    pub parent: Option<ClaimId>,
}

impl NewClaim {
    pub fn basic(first: Location, second: Location, owner: PlayerId) -> Self {
        Self {
            first,
            second,
            cuboid: false,
            kind: ClaimKind::Basic,
            owner: Some(owner),
            parent: None,
        }
    }

    pub fn town(first: Location, second: Location, owner: PlayerId) -> Self {
        Self {
            kind: ClaimKind::Town,
            ..Self::basic(first, second, owner)
        }
    }

    pub fn admin(first: Location, second: Location) -> Self {
        Self {
            first,
            second,
            cuboid: false,
            kind: ClaimKind::Admin,
            owner: None,
            parent: None,
        }
    }

    pub fn subdivision(first: Location, second: Location, parent: ClaimId) -> Self {
        Self {
            first,
            second,
            cuboid: false,
            kind: ClaimKind::Subdivision,
            owner: None,
            parent: Some(parent),
        }
    }

    pub fn cuboid(mut self, cuboid: bool) -> Self {
        self.cuboid = cuboid;
        self
    }
}

impl ClaimStore {
    /// Validate and commit a new claim. Returns the committed claim's id.
    ///
    /// On a conflict the error names the overlapping claim; nothing is
    /// inserted and the allocated record is discarded.
    pub fn create(&mut self, request: NewClaim) -> Result<ClaimId, ClaimError> {
        let (world, requested) = ClaimBounds::from_locations(request.first, request.second)?;
        self.ensure_world(world)?;

        let (bounds, cuboid, owner) = match request.parent {
            Some(parent_id) => {
                if request.kind != ClaimKind::Subdivision {
                    return Err(ClaimError::InvalidKind {
                        kind: request.kind,
                        reason: "claims with a parent must be subdivisions",
                    });
                }
                let parent = self
                    .claim(parent_id)
                    .ok_or(ClaimError::ParentInactive(parent_id))?;
                if !parent.is_top_level() {
                    return Err(ClaimError::NotContainer(parent_id));
                }
                let (bounds, cuboid) = self.subdivision_shape(parent, requested, request.cuboid);
                self.check_inside_parent(parent, &bounds, cuboid)?;
                if let Some(sibling) = self.overlapping_sibling(parent_id, &bounds, None) {
                    return Err(self.conflict("create", sibling.id()));
                }
                (bounds, cuboid, parent.owner())
            }
            None => {
                self.check_top_level_kind(request.kind, request.owner)?;
                let bounds = self.top_level_shape(requested, request.cuboid)?;
                if request.kind != ClaimKind::Admin {
                    self.check_size(&bounds)?;
                }
                if let Some(existing) = self.overlapping_claim_indexed(&bounds, None) {
                    return Err(self.conflict("create", existing.id()));
                }
                (bounds, request.cuboid, request.owner)
            }
        };

        let id = self.ids.next();
        let mut record = ClaimRecord::uncommitted(
            id,
            world,
            bounds,
            cuboid,
            request.kind,
            owner,
            request.parent,
        );
        record.set_state(ClaimState::Active);

        match request.parent {
            Some(parent_id) => {
                if let Some(parent) = self.records.get_mut(&parent_id) {
                    parent.push_child(id);
                }
            }
            None => {
                self.index.insert(&record);
                self.top_level.push(id);
            }
        }
        self.persist(&record);
        self.records.insert(id, record);
        self.hooks.events.publish(ClaimEvent::Created { world, claim: id });

        tracing::info!(
            target: "claims::lifecycle",
            claim = %id,
            world = %world,
            kind = request.kind.as_str(),
            bounds = %bounds,
            "claim.created"
        );
        Ok(id)
    }

    /// Move a claim to new corners. All-or-nothing: a rejected resize leaves
    /// the bounds and the chunk index untouched.
    pub fn resize(&mut self, id: ClaimId, first: Location, second: Location) -> Result<(), ClaimError> {
        let (world, requested) = ClaimBounds::from_locations(first, second)?;
        self.ensure_world(world)?;
        let claim = self.claim(id).ok_or(ClaimError::NotFound(id))?;
        let old_bounds = *claim.bounds();

        let bounds = match claim.parent() {
            Some(parent_id) => {
                let parent = self
                    .claim(parent_id)
                    .ok_or(ClaimError::ParentInactive(parent_id))?;
                let (bounds, _) = self.subdivision_shape(parent, requested, claim.is_cuboid());
                self.check_inside_parent(parent, &bounds, claim.is_cuboid())?;
                if let Some(sibling) = self.overlapping_sibling(parent_id, &bounds, Some(id)) {
                    return Err(self.conflict("resize", sibling.id()));
                }
                bounds
            }
            None => {
                // Flat claims keep their current depth across resizes.
                let requested = if claim.is_cuboid() {
                    requested
                } else {
                    requested.with_y_range(old_bounds.lesser().y, old_bounds.greater().y)
                };
                let bounds = self.top_level_shape(requested, claim.is_cuboid())?;
                if !claim.is_admin() {
                    self.check_size(&bounds)?;
                }
                for child in self.children_of(id) {
                    let inside = bounds.footprint_contains(child.bounds())
                        && (!claim.is_cuboid() || bounds.y_range_contains(child.bounds()));
                    if !inside {
                        return Err(ClaimError::ChildOutside { child: child.id() });
                    }
                }
                if let Some(existing) = self.overlapping_claim_indexed(&bounds, Some(id)) {
                    return Err(self.conflict("resize", existing.id()));
                }
                bounds
            }
        };
        let top_level = claim.is_top_level();

        if top_level {
            self.index.remove_bounds(id, &old_bounds);
        }
        let Some(record) = self.records.get_mut(&id) else {
            return Err(ClaimError::NotFound(id));
        };
        record.set_bounds(bounds);
        if top_level {
            self.index.insert_bounds(id, &bounds);
        }
        if let Some(record) = self.records.get(&id) {
            self.persist(record);
        }
        self.hooks.events.publish(ClaimEvent::Resized { world, claim: id });

        tracing::info!(
            target: "claims::lifecycle",
            claim = %id,
            from = %old_bounds,
            to = %bounds,
            "claim.resized"
        );
        Ok(())
    }

    /// Delete a claim and every descendant, children first.
    ///
    /// Descendants are always removed; `fire_events` only controls whether a
    /// `Deleted` event is published for each removed node. Returns the removed
    /// records, marked `Deleted`, in removal order.
    pub fn delete(&mut self, id: ClaimId, fire_events: bool) -> Result<Vec<ClaimRecord>, ClaimError> {
        if !self.is_live(id) {
            return Err(ClaimError::NotFound(id));
        }
        let mut removed = Vec::new();
        self.delete_subtree(id, fire_events, &mut removed);

        tracing::info!(
            target: "claims::lifecycle",
            claim = %id,
            removed = removed.len(),
            "claim.deleted"
        );
        Ok(removed)
    }

    fn delete_subtree(&mut self, id: ClaimId, fire_events: bool, removed: &mut Vec<ClaimRecord>) {
        let children = self
            .records
            .get(&id)
            .map(|record| record.children().to_vec())
            .unwrap_or_default();
        for child in children {
            self.delete_subtree(child, fire_events, removed);
        }

        let Some(mut record) = self.records.remove(&id) else {
            return;
        };
        match record.parent() {
            Some(parent) => {
                if let Some(parent) = self.records.get_mut(&parent) {
                    parent.remove_child(id);
                }
            }
            None => {
                self.index.remove_bounds(id, record.bounds());
                self.top_level.retain(|existing| *existing != id);
            }
        }
        record.set_state(ClaimState::Deleted);

        if let Err(err) = self.hooks.persistence.remove_claim(record.world(), id) {
            tracing::warn!(
                target: "claims::lifecycle",
                claim = %id,
                error = %err,
                "claim.remove_failed"
            );
        }
        if fire_events {
            self.hooks.events.publish(ClaimEvent::Deleted {
                world: record.world(),
                claim: id,
                owner: record.owner(),
            });
        }
        removed.push(record);
    }

    /// Lower the bottom of a claim (and all its subdivisions) to `new_y`.
    ///
    /// Subdivisions extend through their top-level parent. The target is
    /// clamped to the configured depth floor and a claim is never raised.
    /// Returns whether anything changed.
    pub fn extend_depth(&mut self, id: ClaimId, new_y: i32) -> Result<bool, ClaimError> {
        let claim = self.claim(id).ok_or(ClaimError::NotFound(id))?;
        let top_id = claim.parent().unwrap_or(id);
        let top = self.claim(top_id).ok_or(ClaimError::NotFound(top_id))?;
        let target = new_y.max(self.settings().depth_floor);
        if target >= top.lesser_corner().y {
            tracing::debug!(
                target: "claims::lifecycle",
                claim = %top_id,
                requested = new_y,
                "claim.extend_skipped"
            );
            return Ok(false);
        }

        let mut touched = top.children().to_vec();
        touched.insert(0, top_id);
        for claim_id in &touched {
            if let Some(record) = self.records.get_mut(claim_id) {
                let lowered = record.bounds().lowered_to(target);
                record.set_bounds(lowered);
            }
        }
        for claim_id in &touched {
            if let Some(record) = self.records.get(claim_id) {
                self.persist(record);
            }
        }
        self.hooks.events.publish(ClaimEvent::Resized {
            world: self.world(),
            claim: top_id,
        });

        tracing::info!(
            target: "claims::lifecycle",
            claim = %top_id,
            depth = target,
            subdivisions = touched.len() - 1,
            "claim.depth_extended"
        );
        Ok(true)
    }

    fn ensure_world(&self, world: WorldId) -> Result<(), ClaimError> {
        if world != self.world() {
            return Err(ClaimError::WrongWorld {
                expected: self.world(),
                actual: world,
            });
        }
        Ok(())
    }

    fn check_top_level_kind(&self, kind: ClaimKind, owner: Option<PlayerId>) -> Result<(), ClaimError> {
        match (kind, owner) {
            (ClaimKind::Admin, None) => Ok(()),
            (ClaimKind::Admin, Some(_)) => Err(ClaimError::InvalidKind {
                kind,
                reason: "administrative claims have no owner",
            }),
            (ClaimKind::Basic | ClaimKind::Town, Some(_)) => Ok(()),
            (ClaimKind::Basic | ClaimKind::Town, None) => Err(ClaimError::InvalidKind {
                kind,
                reason: "player claims need an owner",
            }),
            (ClaimKind::Subdivision, _) => Err(ClaimError::InvalidKind {
                kind,
                reason: "subdivisions need a parent",
            }),
            (ClaimKind::Wilderness, _) => Err(ClaimError::InvalidKind {
                kind,
                reason: "wilderness is a sentinel",
            }),
        }
    }

    /// Flat claims run from their requested bottom up to the build ceiling.
    /// Every top-level footprint, admin claims included, is capped at
    /// `max_claim_width` before it reaches the chunk index.
    fn top_level_shape(&self, requested: ClaimBounds, cuboid: bool) -> Result<ClaimBounds, ClaimError> {
        let settings = self.settings();
        requested.check_extent(settings.max_claim_width)?;
        if cuboid {
            requested.check_build_range(settings.min_y, settings.max_y)?;
            return Ok(requested);
        }
        let bottom = requested.lesser().y.max(settings.min_y).min(settings.max_y);
        let shaped = requested.with_y_range(bottom, settings.max_y);
        shaped.check_build_range(settings.min_y, settings.max_y)?;
        Ok(shaped)
    }

    /// Subdivisions of a cuboid parent are cuboid; flat subdivisions of a flat
    /// parent share the parent's vertical extent.
    fn subdivision_shape(
        &self,
        parent: &ClaimRecord,
        requested: ClaimBounds,
        cuboid: bool,
    ) -> (ClaimBounds, bool) {
        let parent_bounds = parent.bounds();
        if cuboid {
            return (requested, true);
        }
        let shaped = requested.with_y_range(parent_bounds.lesser().y, parent_bounds.greater().y);
        (shaped, parent.is_cuboid())
    }

    fn check_inside_parent(
        &self,
        parent: &ClaimRecord,
        bounds: &ClaimBounds,
        cuboid: bool,
    ) -> Result<(), ClaimError> {
        let parent_bounds = parent.bounds();
        let inside_footprint = parent_bounds.footprint_contains(bounds);
        let inside_height = !(cuboid && parent.is_cuboid()) || parent_bounds.y_range_contains(bounds);
        if !inside_footprint || !inside_height {
            return Err(ClaimError::OutsideParent {
                parent: parent.id(),
            });
        }
        if cuboid {
            let settings = self.settings();
            bounds.check_build_range(settings.min_y, settings.max_y)?;
        }
        Ok(())
    }

    fn check_size(&self, bounds: &ClaimBounds) -> Result<(), ClaimError> {
        let settings = self.settings();
        let (width, length) = (bounds.width(), bounds.length());
        if width < settings.min_width || length < settings.min_width || bounds.area() < settings.min_area {
            return Err(ClaimError::TooSmall {
                width,
                length,
                min_width: settings.min_width,
                min_area: settings.min_area,
            });
        }
        Ok(())
    }

    fn conflict(&self, operation: &'static str, conflicting: ClaimId) -> ClaimError {
        tracing::debug!(
            target: "claims::lifecycle",
            operation,
            conflicting = %conflicting,
            "claim.rejected=overlap"
        );
        ClaimError::Conflict { conflicting }
    }

    fn persist(&self, record: &ClaimRecord) {
        if let Err(err) = self.hooks.persistence.save_claim(record) {
            tracing::warn!(
                target: "claims::lifecycle",
                claim = %record.id(),
                error = %err,
                "claim.save_failed"
            );
        }
    }
}

impl ClaimWorlds {
    /// Create a claim in the world named by the request's corners.
    pub fn create(&mut self, request: NewClaim) -> Result<ClaimId, ClaimError> {
        self.store_mut(request.first.world).create(request)
    }

    pub fn resize(
        &mut self,
        world: WorldId,
        id: ClaimId,
        first: Location,
        second: Location,
    ) -> Result<(), ClaimError> {
        self.existing_store_mut(world)
            .ok_or(ClaimError::UnknownWorld(world))?
            .resize(id, first, second)
    }

    pub fn delete(
        &mut self,
        world: WorldId,
        id: ClaimId,
        fire_events: bool,
    ) -> Result<Vec<ClaimRecord>, ClaimError> {
        self.existing_store_mut(world)
            .ok_or(ClaimError::UnknownWorld(world))?
            .delete(id, fire_events)
    }

    pub fn extend_depth(&mut self, world: WorldId, id: ClaimId, new_y: i32) -> Result<bool, ClaimError> {
        self.existing_store_mut(world)
            .ok_or(ClaimError::UnknownWorld(world))?
            .extend_depth(id, new_y)
    }
}
