//! Bounding volume tracker and anchor store.
//!
//! [`ConstructionBounds`] is an axis-aligned box over absolute block
//! coordinates. It grows incrementally with [`ConstructionBounds::expand`];
//! shrinking is only possible through a reset followed by a full refold,
//! which the owning construction does on every removal.
//!
//! [`Anchors`] holds named reference points in bounds-relative coordinates.

use crate::error::ValidationError;
use crate::types::{BlockPos, Rotation, Vec3};
use log::debug;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructionBounds {
    min: BlockPos,
    max: BlockPos,
    initialized: bool,
}

impl Default for ConstructionBounds {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionBounds {
    /// Empty (uninitialized) bounds.
    pub fn new() -> Self {
        Self {
            min: BlockPos::new(i32::MAX, i32::MAX, i32::MAX),
            max: BlockPos::new(i32::MIN, i32::MIN, i32::MIN),
            initialized: false,
        }
    }

    /// Bounds restored from storage. Corners are normalised so min <= max.
    pub fn from_corners(a: BlockPos, b: BlockPos) -> Self {
        let mut bounds = Self::new();
        bounds.expand(a);
        bounds.expand(b);
        bounds
    }

    pub fn expand(&mut self, pos: BlockPos) {
        self.min = BlockPos::new(
            self.min.x.min(pos.x),
            self.min.y.min(pos.y),
            self.min.z.min(pos.z),
        );
        self.max = BlockPos::new(
            self.max.x.max(pos.x),
            self.max.y.max(pos.y),
            self.max.z.max(pos.z),
        );
        self.initialized = true;
    }

    /// Expand with a continuous position (entities), using its block cell.
    pub fn expand_vec(&mut self, pos: Vec3) {
        self.expand(pos.floor());
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_valid(&self) -> bool {
        self.initialized
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Minimum corner; the origin when uninitialized.
    pub fn min(&self) -> BlockPos {
        if self.initialized {
            self.min
        } else {
            BlockPos::ORIGIN
        }
    }

    pub fn max(&self) -> BlockPos {
        if self.initialized {
            self.max
        } else {
            BlockPos::ORIGIN
        }
    }

    pub fn size_x(&self) -> i32 {
        if self.initialized {
            self.max.x - self.min.x + 1
        } else {
            0
        }
    }

    pub fn size_y(&self) -> i32 {
        if self.initialized {
            self.max.y - self.min.y + 1
        } else {
            0
        }
    }

    pub fn size_z(&self) -> i32 {
        if self.initialized {
            self.max.z - self.min.z + 1
        } else {
            0
        }
    }

    pub fn size(&self) -> BlockPos {
        BlockPos::new(self.size_x(), self.size_y(), self.size_z())
    }

    pub fn center(&self) -> BlockPos {
        if !self.initialized {
            return BlockPos::ORIGIN;
        }
        BlockPos::new(
            (self.min.x + self.max.x).div_euclid(2),
            (self.min.y + self.max.y).div_euclid(2),
            (self.min.z + self.max.z).div_euclid(2),
        )
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.initialized
            && pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    pub fn to_relative(&self, pos: BlockPos) -> BlockPos {
        pos - self.min()
    }

    pub fn to_absolute(&self, rel: BlockPos) -> BlockPos {
        rel + self.min()
    }

    /// `"WxHxD"` size string.
    pub fn size_string(&self) -> String {
        format!("{}x{}x{}", self.size_x(), self.size_y(), self.size_z())
    }
}

// ---------------------------------------------------------------------------
// Anchors
// ---------------------------------------------------------------------------

/// Where a player enters the construction, relative to the bounds minimum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entrance {
    pub pos: BlockPos,
    /// Facing angle (yaw, degrees) a player takes when arriving.
    pub yaw: f32,
}

impl Entrance {
    pub fn new(pos: BlockPos, yaw: f32) -> Self {
        Self { pos, yaw }
    }

    /// Entrance after the construction footprint of `size` is rotated.
    pub fn rotated(&self, rotation: Rotation, size: BlockPos) -> Self {
        Self {
            pos: rotation.rotate_pos(self.pos, size),
            yaw: (self.yaw + rotation.yaw_delta()).rem_euclid(360.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Anchors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    entrance: Option<Entrance>,
}

impl Anchors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entrance(&self) -> Option<&Entrance> {
        self.entrance.as_ref()
    }

    pub fn has_entrance(&self) -> bool {
        self.entrance.is_some()
    }

    /// Set the entrance; rejected when it falls outside `bounds`.
    pub fn set_entrance(
        &mut self,
        entrance: Entrance,
        bounds: &ConstructionBounds,
    ) -> Result<(), ValidationError> {
        if !bounds.is_valid() {
            return Err(ValidationError::NoBounds);
        }
        if !Self::fits(entrance.pos, bounds) {
            return Err(ValidationError::AnchorOutOfBounds { pos: entrance.pos });
        }
        self.entrance = Some(entrance);
        Ok(())
    }

    /// Restore an entrance read from storage without validation.
    pub fn restore_entrance(&mut self, entrance: Option<Entrance>) {
        self.entrance = entrance;
    }

    pub fn clear_entrance(&mut self) {
        self.entrance = None;
    }

    /// Drop anchors that no longer fit `bounds`. Returns `true` if any were cleared.
    pub fn validate(&mut self, bounds: &ConstructionBounds) -> bool {
        let Some(entrance) = self.entrance else {
            return false;
        };
        if bounds.is_valid() && Self::fits(entrance.pos, bounds) {
            return false;
        }
        debug!("Clearing entrance {} (bounds {})", entrance.pos, bounds.size_string());
        self.entrance = None;
        true
    }

    /// y may equal the height: standing on top of the construction.
    fn fits(pos: BlockPos, bounds: &ConstructionBounds) -> bool {
        pos.x >= 0
            && pos.x < bounds.size_x()
            && pos.z >= 0
            && pos.z < bounds.size_z()
            && pos.y >= 0
            && pos.y <= bounds.size_y()
    }
}
