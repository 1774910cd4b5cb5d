//! Wire protocol for windrelay.
//!
//! Every message in either direction is an envelope `{ "type", "payload" }`.
//! This crate defines:
//!
//! - **Types** ([`Identity`], [`PlayerState`], [`SpawnPoint`], [`WorldSeed`])
//! - **Messages** ([`Envelope`] inbound, [`ServerMessage`] outbound, the
//!   typed client payloads)
//! - **Codec** ([`Codec`] trait, [`JsonCodec`])
//! - **Errors** ([`ProtocolError`])
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session (identity, registry)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use message::{
    decode_tagged_body, AuthRequest, ClientMessageKind, Envelope,
    RaceEventData, RaceEventKind, ServerMessage, StartRace, TaggedBody,
    WorldEntity, RACE_COUNTDOWN,
};
pub use types::{
    Identity, LodLevels, PlayerState, Quaternion, SpawnPoint, Vector3,
    WorldSeed,
};
