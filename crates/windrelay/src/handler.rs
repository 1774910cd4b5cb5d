//! Per-connection supervisor: authentication gate, outbound writer, and
//! message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Spawn the outbound writer that drains the connection's queue
//!   2. Wait for `C2S_AUTH` → verify token → register the identity
//!   3. Reply `S2C_AUTH_RESULT` (and push `S2C_WORLD_SEED`)
//!   4. Loop: receive envelopes → dispatch by type tag
//!
//! Everything sent to the client goes through the queue, whether it is a
//! direct reply or a peer's world update, so the writer task is the only
//! place that touches the socket's write half.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use windrelay_protocol::{
    AuthRequest, ClientMessageKind, Codec, Envelope, Identity,
    ServerMessage,
};
use windrelay_session::{
    IdentityVerifier, Outbound, Outbox, PeerHandle, SessionError,
    SessionRegistry,
};
use windrelay_transport::{
    Connection, ConnectionId, TransportError, WebSocketConnection,
};

use crate::server::ServerState;
use crate::WindrelayError;

/// How long the writer gets to flush queued replies before the socket is
/// closed out from under it.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Drop guard that unregisters a connection when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async lock.
struct RegistrationGuard {
    conn_id: ConnectionId,
    registry: Arc<SessionRegistry>,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            registry.unregister(conn_id).await;
        });
    }
}

/// The connection's outbound queue and the task draining it.
struct OutboundWriter {
    outbox: Outbox,
    evicted: Arc<Notify>,
    task: JoinHandle<()>,
    finished: bool,
}

impl OutboundWriter {
    fn spawn<V, C>(
        conn: Arc<WebSocketConnection>,
        state: Arc<ServerState<V, C>>,
    ) -> Self
    where
        V: IdentityVerifier,
        C: Codec,
    {
        let (outbox, rx) = mpsc::channel(state.config.outbound_capacity);
        let task = tokio::spawn(write_outbound(conn, rx, state));
        Self {
            outbox,
            evicted: Arc::new(Notify::new()),
            task,
            finished: false,
        }
    }

    /// The handle the registry keeps for this connection.
    fn peer_handle(&self) -> PeerHandle {
        PeerHandle {
            outbox: self.outbox.clone(),
            evicted: Arc::clone(&self.evicted),
        }
    }

    /// Queues a direct reply, waiting for room if the queue is full.
    ///
    /// Returns `false` once the writer has stopped.
    async fn reply(&self, message: ServerMessage) -> bool {
        self.outbox
            .send(Outbound::Message(Arc::new(message)))
            .await
            .is_ok()
    }

    /// Resolves when the writer task stops on its own (the socket failed
    /// or a close was requested). Never resolves after that.
    async fn stopped(&mut self) {
        if self.finished {
            return std::future::pending().await;
        }
        let _ = (&mut self.task).await;
        self.finished = true;
    }

    /// Flushes what is queued, closes the socket, and waits for the task.
    async fn finish(mut self, conn: &WebSocketConnection) {
        if self.finished {
            return;
        }
        let close = Outbound::Close {
            reason: "session ended".into(),
        };
        if self.outbox.try_send(close).is_err() {
            self.task.abort();
            let _ = conn.close().await;
            return;
        }
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut self.task)
            .await
            .is_err()
        {
            tracing::debug!(
                conn_id = %conn.id(),
                "writer did not drain in time"
            );
            self.task.abort();
            let _ = conn.close().await;
        }
    }
}

/// Drains one connection's queue into its socket.
async fn write_outbound<V, C>(
    conn: Arc<WebSocketConnection>,
    mut rx: mpsc::Receiver<Outbound>,
    state: Arc<ServerState<V, C>>,
) where
    V: IdentityVerifier,
    C: Codec,
{
    let conn_id = conn.id();

    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Message(message) => {
                let bytes = match state.codec.encode(&*message) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(%conn_id, error = %e, "encode failed");
                        continue;
                    }
                };
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(%conn_id, error = %e, "send failed");
                    break;
                }
            }
            Outbound::Close { reason } => {
                tracing::debug!(%conn_id, %reason, "closing connection");
                let _ = conn.close().await;
                break;
            }
        }
    }
}

/// What the supervisor saw while waiting for the next client message.
enum Inbound {
    Data(Vec<u8>),
    Closed,
    Failed(TransportError),
    TimedOut,
    WriterStopped,
    Evicted,
}

async fn next_inbound(
    conn: &WebSocketConnection,
    writer: &mut OutboundWriter,
    limit: Option<Duration>,
) -> Inbound {
    let recv = async {
        let result = match limit {
            Some(limit) => {
                match tokio::time::timeout(limit, conn.recv()).await {
                    Ok(result) => result,
                    Err(_) => return Inbound::TimedOut,
                }
            }
            None => conn.recv().await,
        };
        match result {
            Ok(Some(data)) => Inbound::Data(data),
            Ok(None) => Inbound::Closed,
            Err(e) => Inbound::Failed(e),
        }
    };

    let evicted = Arc::clone(&writer.evicted);
    tokio::select! {
        inbound = recv => inbound,
        () = writer.stopped() => Inbound::WriterStopped,
        () = evicted.notified() => Inbound::Evicted,
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<V, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<V, C>>,
) -> Result<(), WindrelayError>
where
    V: IdentityVerifier,
    C: Codec,
{
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let mut writer =
        OutboundWriter::spawn(Arc::clone(&conn), Arc::clone(&state));

    // --- Step 1: Authentication gate ---
    let identity = match authenticate(&conn, &state, &mut writer).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            writer.finish(&conn).await;
            return Ok(());
        }
        Err(e) => {
            writer.finish(&conn).await;
            return Err(e);
        }
    };
    let guard = RegistrationGuard {
        conn_id,
        registry: Arc::clone(&state.registry),
    };

    tracing::info!(%conn_id, %identity, "player authenticated");

    // --- Step 2: Greeting ---
    let mut greeted = writer
        .reply(ServerMessage::auth_success(state.config.spawn_point))
        .await;
    if greeted && state.config.push_world_seed {
        greeted = writer
            .reply(ServerMessage::WorldSeed(state.config.world_seed))
            .await;
    }

    // --- Step 3: Message loop ---
    if greeted {
        message_loop(&conn, &state, &mut writer).await;
    }

    // Unregister before the socket closes so peers stop queueing for it.
    drop(guard);
    writer.finish(&conn).await;
    tracing::info!(%conn_id, %identity, "player disconnected");
    Ok(())
}

/// Runs the authentication gate.
///
/// Returns the registered identity, or `None` when the connection should
/// be closed without ever being admitted:
///
/// - the first message is not a decodable `C2S_AUTH`, or never arrives
/// - no attempt succeeded within `auth_timeout` of connecting
/// - the client ran out of attempts
/// - the client went away
async fn authenticate<V, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<V, C>>,
    writer: &mut OutboundWriter,
) -> Result<Option<Identity>, WindrelayError>
where
    V: IdentityVerifier,
    C: Codec,
{
    let conn_id = conn.id();
    let mut failures: u32 = 0;
    // One deadline for the whole gate, retries included.
    let deadline = Instant::now() + state.config.auth_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let data = match next_inbound(conn, writer, Some(remaining)).await {
            Inbound::Data(data) => data,
            Inbound::Closed => {
                tracing::debug!(%conn_id, "closed before authenticating");
                return Ok(None);
            }
            Inbound::TimedOut => {
                tracing::debug!(%conn_id, "authentication timed out");
                return Ok(None);
            }
            Inbound::Failed(e) => return Err(e.into()),
            Inbound::WriterStopped | Inbound::Evicted => return Ok(None),
        };

        let envelope = state.codec.decode::<Envelope>(&data).ok();
        let is_auth = envelope.as_ref().is_some_and(|env| {
            env.message_kind() == Some(ClientMessageKind::Auth)
        });

        let Some(envelope) = envelope.filter(|_| is_auth) else {
            if failures == 0 {
                tracing::debug!(
                    %conn_id,
                    "first message was not C2S_AUTH, closing"
                );
                return Ok(None);
            }
            tracing::debug!(%conn_id, "ignoring message before auth");
            continue;
        };

        let request = serde_json::from_value::<AuthRequest>(envelope.payload);
        let outcome = match request {
            Ok(request) => match state.verifier.verify(&request.token).await {
                Ok(identity) => state
                    .registry
                    .register(identity.clone(), conn_id, writer.peer_handle())
                    .await
                    .map(|_| identity),
                Err(e) => Err(e),
            },
            Err(e) => Err(SessionError::AuthFailed(format!(
                "invalid auth payload: {e}"
            ))),
        };

        match outcome {
            Ok(identity) => return Ok(Some(identity)),
            Err(e @ SessionError::AlreadyRegistered(_)) => return Err(e.into()),
            Err(e) => {
                failures += 1;
                tracing::info!(
                    %conn_id,
                    attempt = failures,
                    error = %e,
                    "authentication failed"
                );
                let reply = ServerMessage::auth_failure(client_reason(&e));
                if !writer.reply(reply).await {
                    return Ok(None);
                }
                if failures >= state.config.max_auth_attempts {
                    tracing::debug!(%conn_id, "auth attempts exhausted");
                    return Ok(None);
                }
            }
        }
    }
}

/// The failure text shown to the client.
fn client_reason(err: &SessionError) -> String {
    match err {
        SessionError::AuthFailed(reason) => reason.clone(),
        other => other.to_string(),
    }
}

/// Routes messages from an authenticated connection until it closes, is
/// evicted, or goes idle.
async fn message_loop<V, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<V, C>>,
    writer: &mut OutboundWriter,
) where
    V: IdentityVerifier,
    C: Codec,
{
    let conn_id = conn.id();

    loop {
        let inbound =
            next_inbound(conn, writer, state.config.idle_timeout).await;
        let data = match inbound {
            Inbound::Data(data) => data,
            Inbound::Closed => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Inbound::Failed(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Inbound::TimedOut => {
                tracing::info!(%conn_id, "connection idle, closing");
                break;
            }
            Inbound::WriterStopped => {
                tracing::debug!(%conn_id, "outbound writer stopped");
                break;
            }
            Inbound::Evicted => {
                tracing::info!(%conn_id, "identity taken over, closing");
                break;
            }
        };

        // The identity can move to a newer connection at any time.
        let Some(identity) = state.registry.identity_of(conn_id).await else {
            tracing::info!(%conn_id, "identity taken over, closing");
            break;
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(
                    %conn_id, error = %e, "failed to decode envelope"
                );
                continue;
            }
        };

        let delivered = match envelope.message_kind() {
            Some(ClientMessageKind::PlayerUpdate) => {
                state
                    .registry
                    .handle_player_update(&envelope.payload, &identity)
                    .await;
                true
            }
            Some(ClientMessageKind::StartRace) => {
                match state
                    .registry
                    .handle_start_race(&envelope.payload, &identity)
                {
                    Some(reply) => writer.reply(reply).await,
                    None => true,
                }
            }
            Some(ClientMessageKind::Auth) => {
                writer
                    .reply(ServerMessage::error("already authenticated"))
                    .await
            }
            None => {
                tracing::debug!(
                    %conn_id,
                    tag = %envelope.kind,
                    "unhandled message type"
                );
                writer.reply(ServerMessage::unhandled(&envelope.kind)).await
            }
        };
        if !delivered {
            break;
        }
    }
}
