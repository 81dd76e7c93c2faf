use serde::{Deserialize, Serialize};
use std::fmt;

pub const CLIENT_VERSION: u32 = 1;

// Starting town
pub const STARTING_MAP: &str = "Tutorial";
pub const ARENAS: &[&str] = &["Tournament Field"];
pub const FFA_MAPS: &[&str] = &["Tournament Field"];

/// Tag carried by the root object of every instantiated map.
pub const MAP_TAG: &str = "Map";
/// Tag carried by every non-player character placed in a map.
pub const NPC_TAG: &str = "NPC";

pub const MAP_ROOT_ATTEMPTS: u32 = 5;
pub const MAP_ROOT_RETRY_INTERVAL_MS: u64 = 10;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServerType {
    #[default]
    Town,
    World,
    Arena,
    Ffa,
}

impl ServerType {
    pub fn is_pvp(self) -> bool {
        matches!(self, ServerType::Arena | ServerType::Ffa)
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerType::Town => "town",
            ServerType::World => "world",
            ServerType::Arena => "arena",
            ServerType::Ffa => "ffa",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ServerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "town" => Ok(ServerType::Town),
            "world" => Ok(ServerType::World),
            "arena" => Ok(ServerType::Arena),
            "ffa" => Ok(ServerType::Ffa),
            other => Err(format!("unknown server type '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
        current_map: Option<String>,
    },
    ActivatePortal {
        from_map: Option<String>,
        to_map: String,
        server_type: ServerType,
    },
    Disconnect,

    Connected {
        client_id: u32,
    },
    ChangeMap {
        map_name: String,
        server_type: ServerType,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Axis-aligned bounding volume of a map.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    pub fn size(&self) -> Vec3 {
        Vec3::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Clamps each axis of `point` into the volume.
    pub fn clamp_point(&self, point: Vec3) -> Vec3 {
        Vec3::new(
            point.x.max(self.min.x).min(self.max.x),
            point.y.max(self.min.y).min(self.max.y),
            point.z.max(self.min.z).min(self.max.z),
        )
    }
}

pub fn is_arena(map_name: &str) -> bool {
    ARENAS.contains(&map_name)
}

pub fn is_ffa_map(map_name: &str) -> bool {
    FFA_MAPS.contains(&map_name)
}
