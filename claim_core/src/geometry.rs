//! Block-space geometry for claims.
//!
//! Claims are axis-aligned prisms with inclusive corners. Most of the
//! interesting math only looks at the X/Z footprint; the Y axis matters for
//! cuboid containment and depth extension.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier for a loaded world (dimension).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub u32);

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world:{}", self.0)
    }
}

/// Integer block coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A block position qualified by the world it lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub world: WorldId,
    pub pos: BlockPos,
}

impl Location {
    pub const fn new(world: WorldId, x: i32, y: i32, z: i32) -> Self {
        Self {
            world,
            pos: BlockPos::new(x, y, z),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("lesser corner {lesser} exceeds greater corner {greater}")]
    Inverted { lesser: BlockPos, greater: BlockPos },
    #[error("corners span two worlds ({first} and {second})")]
    CrossWorld { first: WorldId, second: WorldId },
    #[error("y range {min}..={max} leaves the build range {floor}..={ceiling}")]
    OutOfBuildRange {
        min: i32,
        max: i32,
        floor: i32,
        ceiling: i32,
    },
    #[error("footprint {width}x{length} exceeds the widest allowed claim ({max} blocks)")]
    TooLarge { width: i64, length: i64, max: i64 },
}

/// Normalized, inclusive bounds of a claim.
///
/// `lesser <= greater` holds on every axis for any value built through the
/// public constructors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimBounds {
    lesser: BlockPos,
    greater: BlockPos,
}

impl ClaimBounds {
    /// Build bounds from two arbitrary corners, swapping axes as needed.
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        Self {
            lesser: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            greater: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Build bounds from already-ordered corners; inverted input is rejected.
    pub fn new(lesser: BlockPos, greater: BlockPos) -> Result<Self, GeometryError> {
        if lesser.x > greater.x || lesser.y > greater.y || lesser.z > greater.z {
            return Err(GeometryError::Inverted { lesser, greater });
        }
        Ok(Self { lesser, greater })
    }

    /// Build bounds from two world locations. Both must be in the same world.
    pub fn from_locations(a: Location, b: Location) -> Result<(WorldId, Self), GeometryError> {
        if a.world != b.world {
            return Err(GeometryError::CrossWorld {
                first: a.world,
                second: b.world,
            });
        }
        Ok((a.world, Self::from_corners(a.pos, b.pos)))
    }

    pub fn lesser(&self) -> BlockPos {
        self.lesser
    }

    pub fn greater(&self) -> BlockPos {
        self.greater
    }

    /// Inclusive X extent.
    pub fn width(&self) -> i64 {
        i64::from(self.greater.x) - i64::from(self.lesser.x) + 1
    }

    /// Inclusive Z extent.
    pub fn length(&self) -> i64 {
        i64::from(self.greater.z) - i64::from(self.lesser.z) + 1
    }

    pub fn height(&self) -> i64 {
        i64::from(self.greater.y) - i64::from(self.lesser.y) + 1
    }

    /// Footprint area. Height never contributes.
    pub fn area(&self) -> i64 {
        self.width() * self.length()
    }

    pub fn contains_column(&self, x: i32, z: i32) -> bool {
        self.lesser.x <= x && x <= self.greater.x && self.lesser.z <= z && z <= self.greater.z
    }

    pub fn contains_y(&self, y: i32) -> bool {
        self.lesser.y <= y && y <= self.greater.y
    }

    /// Whether the X/Z projections of `self` and `other` share at least one column.
    pub fn footprint_intersects(&self, other: &ClaimBounds) -> bool {
        self.lesser.x <= other.greater.x
            && other.lesser.x <= self.greater.x
            && self.lesser.z <= other.greater.z
            && other.lesser.z <= self.greater.z
    }

    /// Whether `inner`'s footprint lies entirely within `self`'s footprint.
    pub fn footprint_contains(&self, inner: &ClaimBounds) -> bool {
        self.contains_column(inner.lesser.x, inner.lesser.z)
            && self.contains_column(inner.greater.x, inner.greater.z)
    }

    pub fn y_range_contains(&self, inner: &ClaimBounds) -> bool {
        self.lesser.y <= inner.lesser.y && inner.greater.y <= self.greater.y
    }

    /// Whether the column is within `radius` blocks (Chebyshev) of the footprint.
    pub fn footprint_within(&self, x: i32, z: i32, radius: i32) -> bool {
        let radius = radius.max(0);
        self.lesser.x.saturating_sub(radius) <= x
            && x <= self.greater.x.saturating_add(radius)
            && self.lesser.z.saturating_sub(radius) <= z
            && z <= self.greater.z.saturating_add(radius)
    }

    /// Copy with the Y extent replaced.
    pub fn with_y_range(&self, min_y: i32, max_y: i32) -> Self {
        Self::from_corners(
            BlockPos::new(self.lesser.x, min_y, self.lesser.z),
            BlockPos::new(self.greater.x, max_y, self.greater.z),
        )
    }

    /// Copy with the lesser Y lowered to `y`. Never raises it.
    pub fn lowered_to(&self, y: i32) -> Self {
        let mut lowered = *self;
        lowered.lesser.y = lowered.lesser.y.min(y);
        lowered
    }

    /// Reject footprints wider or longer than `max` blocks.
    pub fn check_extent(&self, max: i64) -> Result<(), GeometryError> {
        let (width, length) = (self.width(), self.length());
        if width > max || length > max {
            return Err(GeometryError::TooLarge { width, length, max });
        }
        Ok(())
    }

    pub fn check_build_range(&self, floor: i32, ceiling: i32) -> Result<(), GeometryError> {
        if self.lesser.y < floor || self.greater.y > ceiling {
            return Err(GeometryError::OutOfBuildRange {
                min: self.lesser.y,
                max: self.greater.y,
                floor,
                ceiling,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ClaimBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.lesser, self.greater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(x1: i32, z1: i32, x2: i32, z2: i32) -> ClaimBounds {
        ClaimBounds::from_corners(BlockPos::new(x1, 0, z1), BlockPos::new(x2, 0, z2))
    }

    #[test]
    fn corners_are_normalized() {
        let b = ClaimBounds::from_corners(BlockPos::new(10, 80, -5), BlockPos::new(-3, 60, 7));
        assert_eq!(b.lesser(), BlockPos::new(-3, 60, -5));
        assert_eq!(b.greater(), BlockPos::new(10, 80, 7));
    }

    #[test]
    fn explicit_inverted_bounds_are_rejected() {
        let err = ClaimBounds::new(BlockPos::new(5, 0, 0), BlockPos::new(4, 0, 0)).unwrap_err();
        assert!(matches!(err, GeometryError::Inverted { .. }));
    }

    #[test]
    fn cross_world_corners_are_rejected() {
        let err = ClaimBounds::from_locations(
            Location::new(WorldId(0), 0, 0, 0),
            Location::new(WorldId(1), 5, 0, 5),
        )
        .unwrap_err();
        assert_eq!(
            err,
            GeometryError::CrossWorld {
                first: WorldId(0),
                second: WorldId(1)
            }
        );
    }

    #[test]
    fn area_ignores_height() {
        let b = ClaimBounds::from_corners(BlockPos::new(0, -64, 0), BlockPos::new(9, 319, 4));
        assert_eq!(b.area(), 50);
    }

    #[test]
    fn touching_edges_intersect() {
        let a = bounds(0, 0, 10, 10);
        assert!(a.footprint_intersects(&bounds(10, 10, 20, 20)));
        assert!(!a.footprint_intersects(&bounds(11, 0, 20, 10)));
        assert!(!a.footprint_intersects(&bounds(0, 11, 10, 20)));
    }

    #[test]
    fn footprint_containment_is_inclusive() {
        let outer = bounds(0, 0, 50, 50);
        assert!(outer.footprint_contains(&bounds(0, 0, 50, 50)));
        assert!(outer.footprint_contains(&bounds(10, 10, 20, 20)));
        assert!(!outer.footprint_contains(&bounds(40, 40, 51, 45)));
    }

    #[test]
    fn lowering_never_raises() {
        let b = ClaimBounds::from_corners(BlockPos::new(0, 40, 0), BlockPos::new(1, 90, 1));
        assert_eq!(b.lowered_to(10).lesser().y, 10);
        assert_eq!(b.lowered_to(60).lesser().y, 40);
    }

    #[test]
    fn extent_limit_applies_to_either_axis() {
        assert!(bounds(0, 0, 99, 9).check_extent(100).is_ok());
        assert_eq!(
            bounds(0, 0, 9, 100).check_extent(100),
            Err(GeometryError::TooLarge {
                width: 10,
                length: 101,
                max: 100
            })
        );
        let border = bounds(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert!(matches!(
            border.check_extent(100),
            Err(GeometryError::TooLarge { width: 4_294_967_296, .. })
        ));
    }
}
