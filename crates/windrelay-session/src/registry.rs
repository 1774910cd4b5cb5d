//! The session registry: who is connected, where they are, and who hears
//! about their movement.
//!
//! The registry owns three maps that form one consistency domain:
//!
//! - `connections`: connection → (identity, outbound queue)
//! - `owners`: identity → the one connection currently bound to it
//! - `states`: identity → last reported [`PlayerState`]
//!
//! Every identity in `states` has an entry in `owners`, and every entry in
//! `owners` points at a live entry in `connections`. All three sit behind a
//! single [`RwLock`], so no reader ever sees one map updated without the
//! others.
//!
//! # Outbound queues
//!
//! The registry never writes to a socket. Each connection hands in an
//! [`Outbox`] (a bounded `mpsc` sender) at registration, and a writer task
//! owned by the connection drains it. Fan-out collects the interested
//! outboxes under the lock, releases the lock, then uses `try_send`, so a
//! slow or dead peer costs one dropped message for that peer and nothing
//! else: the sender is never blocked and no error reaches it.
//!
//! Eviction does not travel through that queue. Each connection also hands
//! in a [`Notify`] that the registry raises when its identity moves to a
//! newer connection, so a full queue cannot swallow the signal.
//!
//! # Scaling
//!
//! Each update scans every registered connection: O(peers) per update.
//! That is fine up to a few hundred concurrent players. Beyond that the
//! scan wants a per-cell bucket index.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Notify, RwLock};
use windrelay_protocol::{
    decode_tagged_body, ClientMessageKind, Identity, PlayerState,
    ServerMessage, StartRace, TaggedBody,
};
use windrelay_transport::ConnectionId;

use crate::{InterestGrid, SessionError, DEFAULT_CELL_SIZE};

/// Work item for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Encode and send this message.
    Message(Arc<ServerMessage>),
    /// Close the connection once everything queued ahead of it is sent.
    Close { reason: String },
}

/// The registry's handle on one connection's outbound queue.
pub type Outbox = mpsc::Sender<Outbound>;

/// What a connection hands the registry when it registers.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    /// Where world updates for this connection are queued.
    pub outbox: Outbox,
    /// Raised once if the identity is taken over by another connection.
    pub evicted: Arc<Notify>,
}

impl PeerHandle {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            evicted: Arc::new(Notify::new()),
        }
    }
}

impl From<Outbox> for PeerHandle {
    fn from(outbox: Outbox) -> Self {
        Self::new(outbox)
    }
}

/// What happens when an identity that is already connected registers
/// again on a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateIdentityPolicy {
    /// The new connection takes over. The old one is unbound and its
    /// [`PeerHandle::evicted`] signal is raised. The identity's state is dropped, so the new connection
    /// starts unlocated like any fresh session.
    #[default]
    EvictExisting,
    /// The new connection is refused with
    /// [`SessionError::AlreadyConnected`].
    RejectNew,
}

/// Registry settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Interest cell edge length in world units.
    pub cell_size: f64,
    pub duplicate_policy: DuplicateIdentityPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            duplicate_policy: DuplicateIdentityPolicy::default(),
        }
    }
}

struct Peer {
    identity: Identity,
    handle: PeerHandle,
}

#[derive(Default)]
struct Maps {
    connections: HashMap<ConnectionId, Peer>,
    owners: HashMap<Identity, ConnectionId>,
    states: HashMap<Identity, PlayerState>,
}

/// Tracks authenticated connections and fans player updates out to
/// nearby peers.
///
/// Construct one per server and share it behind an `Arc`; every method
/// takes `&self`.
pub struct SessionRegistry {
    maps: RwLock<Maps>,
    grid: InterestGrid,
    duplicate_policy: DuplicateIdentityPolicy,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            grid: InterestGrid::new(config.cell_size),
            duplicate_policy: config.duplicate_policy,
        }
    }

    /// The interest grid used for fan-out.
    pub fn grid(&self) -> &InterestGrid {
        &self.grid
    }

    /// Binds `identity` to `connection`.
    ///
    /// No player state is created; the identity cannot be located (and so
    /// neither sends nor receives world updates) until its first update.
    ///
    /// Returns the connection that was evicted to make room, if any.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyRegistered`] if `connection` is already
    ///   bound to an identity.
    /// - [`SessionError::AlreadyConnected`] if `identity` is bound to
    ///   another connection and the policy is
    ///   [`DuplicateIdentityPolicy::RejectNew`].
    pub async fn register(
        &self,
        identity: Identity,
        connection: ConnectionId,
        handle: impl Into<PeerHandle>,
    ) -> Result<Option<ConnectionId>, SessionError> {
        let handle = handle.into();
        let mut maps = self.maps.write().await;

        if maps.connections.contains_key(&connection) {
            return Err(SessionError::AlreadyRegistered(connection));
        }

        let mut evicted = None;
        if let Some(existing) = maps.owners.get(&identity).copied() {
            match self.duplicate_policy {
                DuplicateIdentityPolicy::RejectNew => {
                    return Err(SessionError::AlreadyConnected(identity));
                }
                DuplicateIdentityPolicy::EvictExisting => {
                    maps.states.remove(&identity);
                    if let Some(old) = maps.connections.remove(&existing) {
                        old.handle.evicted.notify_one();
                    }
                    tracing::info!(
                        %identity,
                        old = %existing,
                        new = %connection,
                        "identity moved to a new connection"
                    );
                    evicted = Some(existing);
                }
            }
        }

        maps.owners.insert(identity.clone(), connection);
        maps.connections.insert(connection, Peer { identity, handle });
        Ok(evicted)
    }

    /// Unbinds `connection` and drops its identity's player state.
    ///
    /// Safe to call for a connection that was never registered, or that
    /// lost its identity to a newer connection; both are no-ops. Returns
    /// the identity that was bound, if any.
    pub async fn unregister(
        &self,
        connection: ConnectionId,
    ) -> Option<Identity> {
        let mut maps = self.maps.write().await;
        let peer = maps.connections.remove(&connection)?;

        if maps.owners.get(&peer.identity) == Some(&connection) {
            maps.owners.remove(&peer.identity);
            maps.states.remove(&peer.identity);
        }

        tracing::debug!(
            conn_id = %connection,
            identity = %peer.identity,
            "connection unregistered"
        );
        Some(peer.identity)
    }

    /// The identity bound to `connection`, if any.
    pub async fn identity_of(
        &self,
        connection: ConnectionId,
    ) -> Option<Identity> {
        self.maps
            .read()
            .await
            .connections
            .get(&connection)
            .map(|peer| peer.identity.clone())
    }

    /// The last reported state of `identity`, if it has sent one.
    pub async fn state_of(&self, identity: &Identity) -> Option<PlayerState> {
        self.maps.read().await.states.get(identity).cloned()
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.maps.read().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.maps.read().await.connections.is_empty()
    }

    /// Decodes a `C2S_PLAYER_UPDATE` payload and applies it with
    /// [`update_state`](Self::update_state).
    ///
    /// A payload whose embedded type tag names another message is ignored,
    /// as is a malformed one; neither is an error. Returns how many peers
    /// the update was queued for.
    pub async fn handle_player_update(
        &self,
        payload: &Value,
        identity: &Identity,
    ) -> usize {
        match decode_tagged_body::<PlayerState>(
            ClientMessageKind::PlayerUpdate,
            payload,
        ) {
            Ok(TaggedBody::Body(state)) => {
                self.update_state(identity, state).await
            }
            Ok(TaggedBody::Mismatch { found }) => {
                tracing::debug!(
                    %identity,
                    %found,
                    "player update with foreign type tag ignored"
                );
                0
            }
            Err(e) => {
                tracing::debug!(
                    %identity,
                    error = %e,
                    "invalid player update"
                );
                0
            }
        }
    }

    /// Stores `state` for `identity` (full replace) and queues a
    /// `S2C_WORLD_STATE_UPDATE` for every other located peer whose cell is
    /// within one cell of the sender's new cell.
    ///
    /// Updates for an identity that is not registered are dropped so that
    /// no state outlives its connection. Returns how many peers the update
    /// was queued for.
    pub async fn update_state(
        &self,
        identity: &Identity,
        state: PlayerState,
    ) -> usize {
        let sender_cell = self.grid.cell_of(&state.position);

        let recipients: Vec<(ConnectionId, Outbox)> = {
            let mut maps = self.maps.write().await;
            if !maps.owners.contains_key(identity) {
                tracing::debug!(%identity, "update from unregistered identity");
                return 0;
            }
            maps.states.insert(identity.clone(), state.clone());

            let maps = &*maps;
            maps.connections
                .iter()
                .filter(|(_, peer)| peer.identity != *identity)
                .filter(|(_, peer)| {
                    maps.states.get(&peer.identity).is_some_and(|other| {
                        self.grid
                            .cell_of(&other.position)
                            .is_interested(sender_cell)
                    })
                })
                .map(|(conn_id, peer)| (*conn_id, peer.handle.outbox.clone()))
                .collect()
        };

        if recipients.is_empty() {
            return 0;
        }

        let message = Arc::new(ServerMessage::world_state(
            identity.clone(),
            state,
            unix_millis(),
        ));

        let mut queued = 0;
        for (conn_id, outbox) in recipients {
            match outbox.try_send(Outbound::Message(Arc::clone(&message))) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        %conn_id,
                        from = %identity,
                        "outbound queue full, dropping world update"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(
                        %conn_id,
                        from = %identity,
                        "peer outbound queue closed"
                    );
                }
            }
        }
        queued
    }

    /// Builds the countdown reply to a `C2S_START_RACE`.
    ///
    /// Touches no registry state. The reply is for the requesting
    /// connection only; its supervisor queues it like any other direct
    /// reply. Returns `None` for a malformed or foreign-tagged payload.
    pub fn handle_start_race(
        &self,
        payload: &Value,
        identity: &Identity,
    ) -> Option<ServerMessage> {
        let request = match decode_tagged_body::<StartRace>(
            ClientMessageKind::StartRace,
            payload,
        ) {
            Ok(TaggedBody::Body(request)) => request,
            Ok(TaggedBody::Mismatch { found }) => {
                tracing::debug!(
                    %identity,
                    %found,
                    "start race with foreign type tag ignored"
                );
                return None;
            }
            Err(e) => {
                tracing::debug!(%identity, error = %e, "invalid start race");
                return None;
            }
        };

        tracing::info!(
            %identity,
            route_id = %request.route_id,
            party_id = ?request.party_id,
            "starting race"
        );

        Some(ServerMessage::countdown(request.route_id))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Milliseconds since the Unix epoch; 0 if the clock is before 1970.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =========================================================================
// Tests
// =========================================================================
