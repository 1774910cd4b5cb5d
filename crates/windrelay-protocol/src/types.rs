//! Core data types that travel inside message payloads.
//!
//! Two vector encodings coexist on the wire. Player state uses compact
//! arrays (`[x, y, z]`) because it is sent many times per second; the
//! spawn point uses named fields (`{ "x": .., "y": .., "z": .. }`) because
//! clients read it once and hand it straight to their scene graph.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A verified, stable user handle.
///
/// Produced once per connection by the identity verifier (the `sub` claim
/// of the client's token). Unique per user, not per connection: the same
/// identity shows up again when a user reconnects.
///
/// `#[serde(transparent)]` makes `Identity("user-1")` serialize as the
/// bare string `"user-1"`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wraps a raw identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Vectors
// ---------------------------------------------------------------------------

/// A point or direction with named components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// An orientation quaternion with named components.
///
/// Unit length is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// No rotation.
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ---------------------------------------------------------------------------
// PlayerState
// ---------------------------------------------------------------------------

/// The most recently reported state of one player.
///
/// Each `C2S_PLAYER_UPDATE` replaces the whole value; nothing is merged
/// with the previous update. An omitted `velocity` therefore resets to
/// zero rather than keeping the last known value.
///
/// ```json
/// { "position": [0, 10, 0], "rotation": [0, 0, 0, 1],
///   "velocity": [0, 0, 0], "mode": "gliding" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// World position `[x, y, z]`. Only `x` and `z` matter for interest.
    pub position: [f64; 3],

    /// Orientation quaternion `[x, y, z, w]`.
    pub rotation: [f64; 4],

    /// Linear velocity `[x, y, z]`; zero when the client omits it.
    #[serde(default)]
    pub velocity: [f64; 3],

    /// Free-form movement mode tag reported by the client
    /// (e.g. `"walking"`, `"gliding"`).
    #[serde(default)]
    pub mode: String,
}

// ---------------------------------------------------------------------------
// Spawn point and world seed
// ---------------------------------------------------------------------------

/// Where a freshly authenticated player appears.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub position: Vector3,
    pub rotation: Quaternion,
}

impl Default for SpawnPoint {
    /// Ten units above the world origin, facing forward.
    fn default() -> Self {
        Self {
            position: Vector3::new(0.0, 10.0, 0.0),
            rotation: Quaternion::IDENTITY,
        }
    }
}

/// Terrain resolution per level of detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodLevels {
    pub near: u32,
    pub mid: u32,
    pub far: u32,
}

/// Static world-generation parameters pushed to each client after it
/// authenticates. Not interest-managed; every client gets the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSeed {
    pub seed: u64,
    #[serde(rename = "chunkSize")]
    pub chunk_size: u32,
    pub lod: LodLevels,
}

impl Default for WorldSeed {
    fn default() -> Self {
        Self {
            seed: 12345,
            chunk_size: 256,
            lod: LodLevels {
                near: 257,
                mid: 129,
                far: 65,
            },
        }
    }
}
