use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{BlockPos, ClaimBounds, WorldId};
use crate::siege::SiegeId;

/// Identifier for a claim. Unique across every world of a [`crate::ClaimWorlds`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimId(pub u64);

impl ClaimId {
    /// Reserved id carried by every world's wilderness sentinel.
    pub const WILDERNESS: ClaimId = ClaimId(0);

    pub fn is_wilderness(self) -> bool {
        self == Self::WILDERNESS
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim#{}", self.0)
    }
}

/// Identity of a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Wilderness,
    Basic,
    Admin,
    Subdivision,
    Town,
}

impl ClaimKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimKind::Wilderness => "wilderness",
            ClaimKind::Basic => "basic",
            ClaimKind::Admin => "admin",
            ClaimKind::Subdivision => "subdivision",
            ClaimKind::Town => "town",
        }
    }

    /// Kinds a caller may request for a top-level claim.
    pub fn is_top_level(&self) -> bool {
        matches!(self, ClaimKind::Basic | ClaimKind::Admin | ClaimKind::Town)
    }
}

/// Lifecycle position of a claim. `Deleted` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimState {
    Uncommitted,
    Active,
    Deleted,
}

/// A rectangular land claim.
///
/// Records live in a [`crate::ClaimStore`] arena; `parent` and `children` are
/// ids into that arena, never owning links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    id: ClaimId,
    world: WorldId,
    bounds: ClaimBounds,
    cuboid: bool,
    kind: ClaimKind,
    owner: Option<PlayerId>,
    parent: Option<ClaimId>,
    children: Vec<ClaimId>,
    state: ClaimState,
    access_override: bool,
    siege: Option<SiegeId>,
}

impl ClaimRecord {
    pub(crate) fn uncommitted(
        id: ClaimId,
        world: WorldId,
        bounds: ClaimBounds,
        cuboid: bool,
        kind: ClaimKind,
        owner: Option<PlayerId>,
        parent: Option<ClaimId>,
    ) -> Self {
        Self {
            id,
            world,
            bounds,
            cuboid,
            kind,
            owner,
            parent,
            children: Vec::new(),
            state: ClaimState::Uncommitted,
            access_override: false,
            siege: None,
        }
    }

    /// The per-world "no claim" sentinel. Always active, never indexed.
    pub(crate) fn wilderness(world: WorldId, min_y: i32, max_y: i32) -> Self {
        let bounds = ClaimBounds::from_corners(
            BlockPos::new(i32::MIN, min_y, i32::MIN),
            BlockPos::new(i32::MAX, max_y, i32::MAX),
        );
        Self {
            state: ClaimState::Active,
            ..Self::uncommitted(
                ClaimId::WILDERNESS,
                world,
                bounds,
                false,
                ClaimKind::Wilderness,
                None,
                None,
            )
        }
    }

    pub fn id(&self) -> ClaimId {
        self.id
    }

    pub fn world(&self) -> WorldId {
        self.world
    }

    pub fn bounds(&self) -> &ClaimBounds {
        &self.bounds
    }

    pub fn lesser_corner(&self) -> BlockPos {
        self.bounds.lesser()
    }

    pub fn greater_corner(&self) -> BlockPos {
        self.bounds.greater()
    }

    pub fn is_cuboid(&self) -> bool {
        self.cuboid
    }

    pub fn kind(&self) -> ClaimKind {
        self.kind
    }

    pub fn owner(&self) -> Option<PlayerId> {
        self.owner
    }

    pub fn is_admin(&self) -> bool {
        self.owner.is_none() && self.kind != ClaimKind::Wilderness
    }

    pub fn is_wilderness(&self) -> bool {
        self.kind == ClaimKind::Wilderness
    }

    pub fn parent(&self) -> Option<ClaimId> {
        self.parent
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none() && !self.is_wilderness()
    }

    pub fn children(&self) -> &[ClaimId] {
        &self.children
    }

    pub fn area(&self) -> i64 {
        if self.is_wilderness() {
            return 0;
        }
        self.bounds.area()
    }

    pub fn state(&self) -> ClaimState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ClaimState::Active
    }

    /// Temporary access override (open doors after a lost siege).
    pub fn access_override(&self) -> bool {
        self.access_override
    }

    pub fn siege(&self) -> Option<SiegeId> {
        self.siege
    }

    /// Point containment.
    ///
    /// X/Z are always checked. Y is checked only for cuboid claims and only
    /// when `ignore_height` is false; non-cuboid claims span the full column.
    pub fn contains(&self, point: BlockPos, ignore_height: bool) -> bool {
        if !self.bounds.contains_column(point.x, point.z) {
            return false;
        }
        ignore_height || !self.cuboid || self.bounds.contains_y(point.y)
    }

    pub(crate) fn set_bounds(&mut self, bounds: ClaimBounds) {
        self.bounds = bounds;
    }

    pub(crate) fn set_state(&mut self, state: ClaimState) {
        self.state = state;
    }

    pub(crate) fn push_child(&mut self, child: ClaimId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn remove_child(&mut self, child: ClaimId) {
        self.children.retain(|id| *id != child);
    }

    pub(crate) fn set_access_override(&mut self, open: bool) {
        self.access_override = open;
    }

    pub(crate) fn set_siege(&mut self, siege: Option<SiegeId>) {
        self.siege = siege;
    }
}
