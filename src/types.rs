//! Core types shared across all modules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, Sub};

/// Serialized host data (block-entity payloads, entity state).
///
/// The host's tagged binary format is carried as a JSON object so it can be
/// stored and transferred without knowing the host's schema.
pub type Compound = serde_json::Map<String, serde_json::Value>;

/// Identity of a live entity in the host world.
pub type EntityId = uuid::Uuid;

// ---------------------------------------------------------------------------
// Continuous positions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// The block column/cell this position falls into.
    pub fn floor(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Block coordinates
// ---------------------------------------------------------------------------

/// Integer block coordinate. Used for both absolute (world) and relative
/// (construction-local) positions; the owning field documents which.
#[derive(
    Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Default,
)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const ORIGIN: BlockPos = BlockPos { x: 0, y: 0, z: 0 };

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}

impl Add for BlockPos {
    type Output = BlockPos;

    fn add(self, rhs: BlockPos) -> BlockPos {
        BlockPos::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for BlockPos {
    type Output = BlockPos;

    fn sub(self, rhs: BlockPos) -> BlockPos {
        BlockPos::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Horizontal facing of an actor. Yaw follows the host convention:
/// 0° looks toward +Z (south), 90° toward -X (west).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    North,
    East,
    South,
    West,
}

impl Facing {
    pub fn from_yaw(yaw: f32) -> Self {
        let quarter = ((yaw.rem_euclid(360.0) + 45.0) / 90.0).floor() as i32 % 4;
        match quarter {
            0 => Facing::South,
            1 => Facing::West,
            2 => Facing::North,
            _ => Facing::East,
        }
    }

    /// Unit step (dx, dz) in this direction.
    pub fn step(&self) -> (i32, i32) {
        match self {
            Facing::North => (0, -1),
            Facing::East => (1, 0),
            Facing::South => (0, 1),
            Facing::West => (-1, 0),
        }
    }

    pub fn rotated(&self, rotation: Rotation) -> Self {
        let order = [Facing::North, Facing::East, Facing::South, Facing::West];
        let idx = order.iter().position(|f| f == self).unwrap_or(0);
        order[(idx + rotation.quarter_turns() as usize) % 4]
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "north" => Some(Facing::North),
            "east" => Some(Facing::East),
            "south" => Some(Facing::South),
            "west" => Some(Facing::West),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Facing::North => "north",
            Facing::East => "east",
            Facing::South => "south",
            Facing::West => "west",
        }
    }
}

/// Clockwise rotation (seen from above) applied during placement.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    CounterClockwise90,
}

impl Rotation {
    pub fn from_quarter_turns(turns: i32) -> Self {
        match turns.rem_euclid(4) {
            0 => Rotation::None,
            1 => Rotation::Clockwise90,
            2 => Rotation::Clockwise180,
            _ => Rotation::CounterClockwise90,
        }
    }

    /// Rotation that turns a construction facing `from` so it faces `to`.
    pub fn between(from: Facing, to: Facing) -> Self {
        let idx = |f: Facing| match f {
            Facing::North => 0,
            Facing::East => 1,
            Facing::South => 2,
            Facing::West => 3,
        };
        Self::from_quarter_turns(idx(to) - idx(from))
    }

    pub fn quarter_turns(&self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Clockwise90 => 1,
            Rotation::Clockwise180 => 2,
            Rotation::CounterClockwise90 => 3,
        }
    }

    pub fn yaw_delta(&self) -> f32 {
        self.quarter_turns() as f32 * 90.0
    }

    /// Footprint size after rotation (X and Z swap on quarter turns).
    pub fn rotate_size(&self, size: BlockPos) -> BlockPos {
        match self {
            Rotation::Clockwise90 | Rotation::CounterClockwise90 => {
                BlockPos::new(size.z, size.y, size.x)
            }
            _ => size,
        }
    }

    /// Rotate a relative block position inside a box of `size`, keeping the
    /// result inside the rotated box.
    pub fn rotate_pos(&self, pos: BlockPos, size: BlockPos) -> BlockPos {
        match self {
            Rotation::None => pos,
            Rotation::Clockwise90 => BlockPos::new(size.z - 1 - pos.z, pos.y, pos.x),
            Rotation::Clockwise180 => BlockPos::new(size.x - 1 - pos.x, pos.y, size.z - 1 - pos.z),
            Rotation::CounterClockwise90 => BlockPos::new(pos.z, pos.y, size.x - 1 - pos.x),
        }
    }

    /// Continuous counterpart of [`Rotation::rotate_pos`] for entity positions.
    pub fn rotate_vec(&self, pos: Vec3, size: BlockPos) -> Vec3 {
        let (sx, sz) = (size.x as f64, size.z as f64);
        match self {
            Rotation::None => pos,
            Rotation::Clockwise90 => Vec3::new(sz - pos.z, pos.y, pos.x),
            Rotation::Clockwise180 => Vec3::new(sx - pos.x, pos.y, sz - pos.z),
            Rotation::CounterClockwise90 => Vec3::new(pos.z, pos.y, sx - pos.x),
        }
    }
}

// ---------------------------------------------------------------------------
// Opaque host identifiers
// ---------------------------------------------------------------------------

/// Namespace used by the host's built-in content.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// Host-defined `namespace:path` identifier for a block or entity kind.
///
/// The set of kinds is open (content packs add their own), so this stays an
/// opaque string; classification is injected through [`crate::world::World`].
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part; identifiers without one belong to the default namespace.
    pub fn namespace(&self) -> &str {
        match self.0.split_once(':') {
            Some((ns, _)) => ns,
            None => DEFAULT_NAMESPACE,
        }
    }

    pub fn path(&self) -> &str {
        match self.0.split_once(':') {
            Some((_, path)) => path,
            None => &self.0,
        }
    }

    pub fn is_default_namespace(&self) -> bool {
        self.namespace() == DEFAULT_NAMESPACE
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ---------------------------------------------------------------------------
// Block state
// ---------------------------------------------------------------------------

const AIR_BLOCKS: [&str; 3] = ["minecraft:air", "minecraft:cave_air", "minecraft:void_air"];

/// A resolved block state: kind plus its string properties.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockState {
    pub block: ResourceId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl BlockState {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: ResourceId::new(block),
            properties: BTreeMap::new(),
        }
    }

    pub fn air() -> Self {
        Self::new(AIR_BLOCKS[0])
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn is_air(&self) -> bool {
        AIR_BLOCKS.contains(&self.block.as_str())
    }

    /// Rotate orientation-bearing properties (`facing`, `axis`, `rotation`).
    pub fn rotated(&self, rotation: Rotation) -> Self {
        if rotation == Rotation::None {
            return self.clone();
        }
        let mut out = self.clone();
        if let Some(facing) = self.properties.get("facing").and_then(|f| Facing::from_name(f)) {
            out.properties
                .insert("facing".into(), facing.rotated(rotation).name().into());
        }
        if rotation.quarter_turns() % 2 == 1 {
            match self.properties.get("axis").map(String::as_str) {
                Some("x") => {
                    out.properties.insert("axis".into(), "z".into());
                }
                Some("z") => {
                    out.properties.insert("axis".into(), "x".into());
                }
                _ => {}
            }
        }
        if let Some(r) = self
            .properties
            .get("rotation")
            .and_then(|r| r.parse::<i32>().ok())
        {
            let rotated = (r + rotation.quarter_turns() * 4).rem_euclid(16);
            out.properties.insert("rotation".into(), rotated.to_string());
        }
        out
    }
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.block)?;
        if !self.properties.is_empty() {
            let props: Vec<String> = self
                .properties
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "[{}]", props.join(","))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Advisory statistics cached on a construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructionStats {
    pub solid_blocks: usize,
    pub entities: usize,
    pub mobs: usize,
    pub command_blocks: usize,
}

// ---------------------------------------------------------------------------
// Captured entities
// ---------------------------------------------------------------------------

/// An entity captured out of the world, positioned relative to the
/// construction's bounds minimum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub kind: ResourceId,
    pub pos: Vec3,
    #[serde(default)]
    pub yaw: f32,
    #[serde(default)]
    pub pitch: f32,
    /// Full serialized state, identity and position included as captured.
    #[serde(default)]
    pub data: Compound,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Serialize coordinate-keyed maps as `[[pos, value], …]` (JSON object keys
/// must be strings).
pub mod pos_map {
    use super::BlockPos;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S, T>(map: &BTreeMap<BlockPos, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<BlockPos, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        let entries: Vec<(BlockPos, T)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
