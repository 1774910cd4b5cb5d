//! Envelopes and the typed messages carried inside them.
//!
//! Inbound traffic is decoded in two steps. First the [`Envelope`] is read
//! with its payload left as raw JSON, so the supervisor can route on the
//! `type` tag without knowing every payload shape. Then the handler for
//! that tag decodes the payload into its own type.
//!
//! Outbound traffic is a single [`ServerMessage`] enum. Its
//! `#[serde(tag = "type", content = "payload")]` attribute produces the
//! same envelope shape:
//!
//! ```json
//! { "type": "S2C_ERROR", "payload": { "message": "..." } }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Identity, PlayerState, ProtocolError, SpawnPoint, WorldSeed};

/// Countdown value carried by every race start reply.
pub const RACE_COUNTDOWN: u32 = 3;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// The wrapper around every client message.
///
/// `payload` stays as untyped JSON until the message is routed. A missing
/// payload decodes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Builds an envelope, mostly useful for clients and tests.
    pub fn new(kind: ClientMessageKind, payload: Value) -> Self {
        Self {
            kind: kind.tag().to_string(),
            payload,
        }
    }

    /// Returns the recognized message kind, or `None` for an unknown tag.
    pub fn message_kind(&self) -> Option<ClientMessageKind> {
        ClientMessageKind::from_tag(&self.kind)
    }
}

/// The client message types the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientMessageKind {
    /// `C2S_AUTH`: present a token; must be the first message.
    Auth,
    /// `C2S_PLAYER_UPDATE`: report the sender's latest state.
    PlayerUpdate,
    /// `C2S_START_RACE`: ask for a race countdown.
    StartRace,
}

impl ClientMessageKind {
    /// The wire tag for this kind.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Auth => "C2S_AUTH",
            Self::PlayerUpdate => "C2S_PLAYER_UPDATE",
            Self::StartRace => "C2S_START_RACE",
        }
    }

    /// Parses a wire tag. Tags are case-sensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "C2S_AUTH" => Some(Self::Auth),
            "C2S_PLAYER_UPDATE" => Some(Self::PlayerUpdate),
            "C2S_START_RACE" => Some(Self::StartRace),
            _ => None,
        }
    }
}

/// Payload of `C2S_AUTH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

/// Payload of `C2S_START_RACE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRace {
    #[serde(rename = "routeId")]
    pub route_id: String,

    #[serde(
        rename = "partyId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub party_id: Option<String>,
}

/// Result of [`decode_tagged_body`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedBody<T> {
    /// The payload decoded into the expected body.
    Body(T),
    /// The payload carried an embedded tag for a different message type.
    Mismatch { found: String },
}

/// Decodes the body of a message whose payload may repeat the envelope.
///
/// Clients send `C2S_PLAYER_UPDATE` and `C2S_START_RACE` payloads in one of
/// two shapes:
///
/// ```json
/// { "position": [..], "rotation": [..], "mode": "walking" }
/// { "type": "C2S_PLAYER_UPDATE", "payload": { "position": [..], ... } }
/// ```
///
/// When the payload carries its own `type`, that tag must equal
/// `expected`; otherwise the message is reported as a
/// [`TaggedBody::Mismatch`] and callers drop it without error.
///
/// # Errors
/// Returns [`ProtocolError::Decode`] if the body does not match `T`.
pub fn decode_tagged_body<T: DeserializeOwned>(
    expected: ClientMessageKind,
    payload: &Value,
) -> Result<TaggedBody<T>, ProtocolError> {
    let body = match payload.get("type") {
        Some(tag) => {
            let found = match tag.as_str() {
                Some(s) => s.to_string(),
                None => tag.to_string(),
            };
            if found != expected.tag() {
                return Ok(TaggedBody::Mismatch { found });
            }
            payload.get("payload").cloned().unwrap_or(Value::Null)
        }
        None => payload.clone(),
    };

    serde_json::from_value(body)
        .map(TaggedBody::Body)
        .map_err(ProtocolError::Decode)
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// One entity inside a `S2C_WORLD_STATE_UPDATE`.
///
/// The player's state fields are flattened next to its `id`:
///
/// ```json
/// { "id": "user-1", "position": [..], "rotation": [..],
///   "velocity": [..], "mode": "gliding" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEntity {
    pub id: Identity,
    #[serde(flatten)]
    pub state: PlayerState,
}

/// The kind of race event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceEventKind {
    Countdown,
}

/// Extra data attached to a race event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RaceEventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown: Option<u32>,
}

/// Every message the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Answer to `C2S_AUTH`. On success carries the spawn point, on
    /// failure a human-readable reason.
    #[serde(rename = "S2C_AUTH_RESULT")]
    AuthResult {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(
            rename = "spawnPoint",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        spawn_point: Option<SpawnPoint>,
    },

    /// World generation parameters, sent once after authentication.
    #[serde(rename = "S2C_WORLD_SEED")]
    WorldSeed(WorldSeed),

    /// A nearby player's new state. `timestamp` is the send time in
    /// milliseconds since the Unix epoch.
    #[serde(rename = "S2C_WORLD_STATE_UPDATE")]
    WorldStateUpdate {
        entities: Vec<WorldEntity>,
        timestamp: u64,
    },

    /// A race lifecycle event, sent only to the requesting connection.
    #[serde(rename = "S2C_RACE_EVENT")]
    RaceEvent {
        event: RaceEventKind,
        #[serde(rename = "routeId")]
        route_id: String,
        data: RaceEventData,
    },

    /// A request the server could not handle.
    #[serde(rename = "S2C_ERROR")]
    Error { message: String },
}

impl ServerMessage {
    pub fn auth_success(spawn_point: SpawnPoint) -> Self {
        Self::AuthResult {
            success: true,
            error: None,
            spawn_point: Some(spawn_point),
        }
    }

    pub fn auth_failure(error: impl Into<String>) -> Self {
        Self::AuthResult {
            success: false,
            error: Some(error.into()),
            spawn_point: None,
        }
    }

    /// A single-entity world update for `identity`.
    pub fn world_state(
        identity: Identity,
        state: PlayerState,
        timestamp: u64,
    ) -> Self {
        Self::WorldStateUpdate {
            entities: vec![WorldEntity {
                id: identity,
                state,
            }],
            timestamp,
        }
    }

    /// The race start reply with the fixed countdown.
    pub fn countdown(route_id: impl Into<String>) -> Self {
        Self::RaceEvent {
            event: RaceEventKind::Countdown,
            route_id: route_id.into(),
            data: RaceEventData {
                countdown: Some(RACE_COUNTDOWN),
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The reply to a message with an unrecognized tag.
    pub fn unhandled(tag: &str) -> Self {
        Self::error(format!("unhandled message type: {tag}"))
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The JSON shapes below are what browser clients parse, so each test
    //! pins the exact field names rather than round-tripping.

    use serde_json::json;

    use super::*;

    fn sample_state() -> PlayerState {
        PlayerState {
            position: [10.0, 50.0, -4.0],
            rotation: [0.0, 0.0, 0.0, 1.0],
            velocity: [1.0, 0.0, 0.0],
            mode: "gliding".into(),
        }
    }

    // =====================================================================
    // Envelope
    // =====================================================================

    #[test]
    fn test_envelope_reads_type_and_raw_payload() {
        let env: Envelope = serde_json::from_str(
            r#"{"type":"C2S_AUTH","payload":{"token":"t"}}"#,
        )
        .unwrap();
        assert_eq!(env.message_kind(), Some(ClientMessageKind::Auth));
        assert_eq!(env.payload, json!({ "token": "t" }));
    }

    #[test]
    fn test_envelope_missing_payload_is_null() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"C2S_PLAYER_UPDATE"}"#).unwrap();
        assert!(env.payload.is_null());
    }

    #[test]
    fn test_envelope_without_type_is_rejected() {
        let result: Result<Envelope, _> =
            serde_json::from_str(r#"{"payload":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_tag_has_no_kind() {
        let env = Envelope {
            kind: "C2S_FLY_TO_MOON".into(),
            payload: Value::Null,
        };
        assert_eq!(env.message_kind(), None);
    }

    #[test]
    fn test_message_kind_tags_are_stable() {
        for kind in [
            ClientMessageKind::Auth,
            ClientMessageKind::PlayerUpdate,
            ClientMessageKind::StartRace,
        ] {
            assert_eq!(ClientMessageKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ClientMessageKind::from_tag("c2s_auth"), None);
    }

    // =====================================================================
    // decode_tagged_body
    // =====================================================================

    #[test]
    fn test_tagged_body_accepts_bare_payload() {
        let payload = json!({
            "position": [1, 2, 3], "rotation": [0, 0, 0, 1], "mode": "walking"
        });
        let body: TaggedBody<PlayerState> =
            decode_tagged_body(ClientMessageKind::PlayerUpdate, &payload)
                .unwrap();
        match body {
            TaggedBody::Body(state) => {
                assert_eq!(state.position, [1.0, 2.0, 3.0]);
            }
            other => panic!("expected Body, got {other:?}"),
        }
    }

    #[test]
    fn test_tagged_body_accepts_matching_embedded_tag() {
        let payload = json!({
            "type": "C2S_START_RACE",
            "payload": { "routeId": "canyon-run" }
        });
        let body: TaggedBody<StartRace> =
            decode_tagged_body(ClientMessageKind::StartRace, &payload)
                .unwrap();
        assert_eq!(
            body,
            TaggedBody::Body(StartRace {
                route_id: "canyon-run".into(),
                party_id: None,
            })
        );
    }

    #[test]
    fn test_tagged_body_reports_mismatched_embedded_tag() {
        let payload = json!({
            "type": "C2S_SOMETHING_ELSE",
            "payload": { "position": [0, 0, 0], "rotation": [0, 0, 0, 1] }
        });
        let body: TaggedBody<PlayerState> =
            decode_tagged_body(ClientMessageKind::PlayerUpdate, &payload)
                .unwrap();
        assert_eq!(
            body,
            TaggedBody::Mismatch {
                found: "C2S_SOMETHING_ELSE".into()
            }
        );
    }

    #[test]
    fn test_tagged_body_non_string_tag_is_mismatch() {
        let payload = json!({ "type": 7, "payload": {} });
        let body: TaggedBody<StartRace> =
            decode_tagged_body(ClientMessageKind::StartRace, &payload)
                .unwrap();
        assert!(matches!(body, TaggedBody::Mismatch { .. }));
    }

    #[test]
    fn test_tagged_body_malformed_body_is_decode_error() {
        let payload = json!({ "position": "nowhere" });
        let result: Result<TaggedBody<PlayerState>, _> =
            decode_tagged_body(ClientMessageKind::PlayerUpdate, &payload);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    // =====================================================================
    // ServerMessage
    // =====================================================================

    #[test]
    fn test_auth_success_json_format() {
        let json =
            serde_json::to_value(ServerMessage::auth_success(SpawnPoint::default()))
                .unwrap();
        assert_eq!(json["type"], "S2C_AUTH_RESULT");
        assert_eq!(json["payload"]["success"], true);
        assert!(json["payload"].get("error").is_none());
        assert_eq!(json["payload"]["spawnPoint"]["position"]["y"], 10.0);
    }

    #[test]
    fn test_auth_failure_json_format() {
        let json =
            serde_json::to_value(ServerMessage::auth_failure("invalid token"))
                .unwrap();
        assert_eq!(json["payload"]["success"], false);
        assert_eq!(json["payload"]["error"], "invalid token");
        assert!(json["payload"].get("spawnPoint").is_none());
    }

    #[test]
    fn test_world_seed_json_format() {
        let json =
            serde_json::to_value(ServerMessage::WorldSeed(WorldSeed::default()))
                .unwrap();
        assert_eq!(json["type"], "S2C_WORLD_SEED");
        assert_eq!(json["payload"]["seed"], 12345);
        assert_eq!(json["payload"]["chunkSize"], 256);
    }

    #[test]
    fn test_world_state_flattens_entity_fields() {
        let msg = ServerMessage::world_state(
            Identity::new("user-1"),
            sample_state(),
            1_700_000_000_000,
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "S2C_WORLD_STATE_UPDATE");
        assert_eq!(json["payload"]["timestamp"], 1_700_000_000_000u64);
        let entity = &json["payload"]["entities"][0];
        assert_eq!(entity["id"], "user-1");
        assert_eq!(entity["position"], json!([10.0, 50.0, -4.0]));
        assert_eq!(entity["mode"], "gliding");

        let decoded: ServerMessage = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_countdown_json_format() {
        let json =
            serde_json::to_value(ServerMessage::countdown("canyon-run")).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "S2C_RACE_EVENT",
                "payload": {
                    "event": "countdown",
                    "routeId": "canyon-run",
                    "data": { "countdown": 3 }
                }
            })
        );
    }

    #[test]
    fn test_unhandled_names_the_tag() {
        let json =
            serde_json::to_value(ServerMessage::unhandled("C2S_DANCE")).unwrap();
        assert_eq!(json["type"], "S2C_ERROR");
        assert_eq!(
            json["payload"]["message"],
            "unhandled message type: C2S_DANCE"
        );
    }
}
