//! Server configuration.

use std::time::Duration;

use windrelay_protocol::{SpawnPoint, WorldSeed};
use windrelay_session::{
    DuplicateIdentityPolicy, RegistryConfig, DEFAULT_CELL_SIZE,
};

use crate::WindrelayError;

/// Settings for a relay server, fixed when the server is built.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interest cell edge length in world units.
    pub cell_size: f64,

    /// Sent to every client in its successful `S2C_AUTH_RESULT`.
    pub spawn_point: SpawnPoint,

    /// World generation parameters for `S2C_WORLD_SEED`.
    pub world_seed: WorldSeed,

    /// Push `S2C_WORLD_SEED` right after a successful auth.
    pub push_world_seed: bool,

    /// Capacity of each connection's outbound queue. When a queue is full,
    /// new world updates for that connection are dropped.
    pub outbound_capacity: usize,

    /// How long a new connection has to authenticate, retries included.
    pub auth_timeout: Duration,

    /// Failed `C2S_AUTH` attempts allowed before the connection is closed.
    pub max_auth_attempts: u32,

    pub duplicate_policy: DuplicateIdentityPolicy,

    /// Close an authenticated connection that sends nothing for this long.
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), WindrelayError> {
        if self.outbound_capacity == 0 {
            return Err(WindrelayError::Config(
                "outbound queue capacity must be at least 1".into(),
            ));
        }
        if self.max_auth_attempts == 0 {
            return Err(WindrelayError::Config(
                "max auth attempts must be at least 1".into(),
            ));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(WindrelayError::Config(format!(
                "cell size must be a positive number, got {}",
                self.cell_size
            )));
        }
        Ok(())
    }

    pub(crate) fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            cell_size: self.cell_size,
            duplicate_policy: self.duplicate_policy,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            spawn_point: SpawnPoint::default(),
            world_seed: WorldSeed::default(),
            push_world_seed: true,
            outbound_capacity: 256,
            auth_timeout: Duration::from_secs(10),
            max_auth_attempts: 3,
            duplicate_policy: DuplicateIdentityPolicy::EvictExisting,
            idle_timeout: None,
        }
    }
}
