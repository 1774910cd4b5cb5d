//! Integration tests for the session layer: verified identities moving
//! across interest cells.

use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tokio::sync::mpsc;
use windrelay_protocol::{Identity, PlayerState, ServerMessage};
use windrelay_session::{
    IdentityVerifier, JwtVerifier, Outbound, RegistryConfig, SessionRegistry,
};
use windrelay_transport::ConnectionId;

// =========================================================================
// Helpers
// =========================================================================

const SECRET: &str = "integration-secret";

struct Player {
    identity: Identity,
    rx: mpsc::Receiver<Outbound>,
}

impl Player {
    /// Identities of every world update queued for this player so far.
    fn drain_senders(&mut self) -> Vec<String> {
        let mut senders = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            if let Outbound::Message(msg) = item {
                if let ServerMessage::WorldStateUpdate { entities, .. } = &*msg {
                    senders.extend(
                        entities.iter().map(|e| e.id.as_str().to_string()),
                    );
                }
            }
        }
        senders
    }
}

fn token_for(name: &str) -> String {
    encode(
        &Header::default(),
        &json!({ "sub": name }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("sign")
}

/// Verifies a freshly minted token and registers the identity.
async fn sign_in(
    registry: &SessionRegistry,
    verifier: &JwtVerifier,
    name: &str,
    conn: u64,
) -> Player {
    let identity = verifier
        .verify(&token_for(name))
        .await
        .expect("token should verify");
    let (tx, rx) = mpsc::channel(64);
    registry
        .register(identity.clone(), ConnectionId::new(conn), tx)
        .await
        .expect("register");
    Player { identity, rx }
}

fn at(x: f64, z: f64) -> PlayerState {
    PlayerState {
        position: [x, 80.0, z],
        rotation: [0.0, 0.0, 0.0, 1.0],
        velocity: [0.0, 0.0, 0.0],
        mode: "gliding".into(),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_player_flying_away_drops_out_of_range() {
    let registry = SessionRegistry::default();
    let verifier = JwtVerifier::new(SECRET).unwrap();
    let mut pilot = sign_in(&registry, &verifier, "pilot", 1).await;
    let mut watcher = sign_in(&registry, &verifier, "watcher", 2).await;

    registry.update_state(&watcher.identity, at(100.0, 100.0)).await;

    // Fly east one cell at a time: cells 0, 1, 2, 3.
    for x in [50.0, 300.0, 600.0, 900.0] {
        registry.update_state(&pilot.identity, at(x, 100.0)).await;
    }

    // The watcher sits in cell 0 and hears cells 0 and 1 only.
    assert_eq!(watcher.drain_senders(), vec!["pilot", "pilot"]);
    assert!(pilot.drain_senders().is_empty());
}

#[tokio::test]
async fn test_negative_coordinates_neighbour_across_origin() {
    let registry = SessionRegistry::default();
    let verifier = JwtVerifier::new(SECRET).unwrap();
    let mut west = sign_in(&registry, &verifier, "west", 1).await;
    let mut east = sign_in(&registry, &verifier, "east", 2).await;

    registry.update_state(&west.identity, at(-200.0, -10.0)).await;
    registry.update_state(&east.identity, at(200.0, 10.0)).await;

    assert_eq!(west.drain_senders(), vec!["east"]);
    // West's update came before east was located.
    assert!(east.drain_senders().is_empty());
}

#[tokio::test]
async fn test_custom_cell_size_changes_reach() {
    let registry = SessionRegistry::new(RegistryConfig {
        cell_size: 1000.0,
        ..RegistryConfig::default()
    });
    assert_eq!(registry.grid().cell_size(), 1000.0);
    let verifier = JwtVerifier::new(SECRET).unwrap();
    let _a = sign_in(&registry, &verifier, "a", 1).await;
    let mut b = sign_in(&registry, &verifier, "b", 2).await;

    registry.update_state(&b.identity, at(1500.0, 0.0)).await;
    let queued = registry
        .update_state(&Identity::new("a"), at(0.0, 0.0))
        .await;

    assert_eq!(queued, 1);
    assert_eq!(b.drain_senders(), vec!["a"]);
}

#[tokio::test]
async fn test_crowd_in_one_cell_all_hear_each_other() {
    let registry = Arc::new(SessionRegistry::default());
    let verifier = JwtVerifier::new(SECRET).unwrap();
    let mut players = Vec::new();
    for i in 0..8u64 {
        let player =
            sign_in(&registry, &verifier, &format!("p{i}"), i + 1).await;
        registry.update_state(&player.identity, at(10.0, 10.0)).await;
        players.push(player);
    }
    for player in &mut players {
        player.drain_senders();
    }

    let speaker = players[0].identity.clone();
    let queued = registry.update_state(&speaker, at(11.0, 10.0)).await;

    assert_eq!(queued, 7);
    for player in players.iter_mut().skip(1) {
        assert_eq!(player.drain_senders(), vec!["p0"]);
    }
    assert!(players[0].drain_senders().is_empty());
}

#[tokio::test]
async fn test_signed_out_player_no_longer_receives() {
    let registry = SessionRegistry::default();
    let verifier = JwtVerifier::new(SECRET).unwrap();
    let alice = sign_in(&registry, &verifier, "alice", 1).await;
    let mut bob = sign_in(&registry, &verifier, "bob", 2).await;
    registry.update_state(&alice.identity, at(0.0, 0.0)).await;
    registry.update_state(&bob.identity, at(0.0, 0.0)).await;

    registry.unregister(ConnectionId::new(1)).await;
    let queued = registry.update_state(&bob.identity, at(1.0, 0.0)).await;

    assert_eq!(queued, 0);
    assert!(bob.drain_senders().is_empty());
    assert_eq!(registry.connection_count().await, 1);
}
