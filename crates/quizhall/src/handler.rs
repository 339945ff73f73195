//! Per-connection handler: session, read loop, and action routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Upgrade behind the origin gate
//!   2. Resolve the `session_id` cookie → get UserId
//!   3. Loop: decode actions → route them to the target room's actor

use std::sync::Arc;

use quizhall_protocol::{ClientMessage, Codec, RoomId, ServerMessage, UserId};
use quizhall_room::{LeaveOutcome, RoomError, RoomHandle, RoomRegistry};
use quizhall_session::{Credentials, SessionResolver};
use quizhall_store::Store;
use quizhall_transport::{ConnectionId, ConnectionSender, PendingConnection};

use crate::QuizhallError;
use crate::server::ServerState;

/// Drop guard that detaches a connection from its room when the handler
/// exits.
///
/// Since `Drop` is synchronous, we spawn a fire-and-forget task for the
/// room round trip. If the user owned the room, that closes it and the
/// registry entry goes too.
struct ConnectionGuard<S: Store, R: SessionResolver> {
    user_id: UserId,
    conn_id: ConnectionId,
    joined: Option<RoomId>,
    state: Arc<ServerState<S, R>>,
}

impl<S: Store, R: SessionResolver> Drop for ConnectionGuard<S, R> {
    fn drop(&mut self) {
        let Some(room_id) = self.joined else {
            return;
        };
        let user_id = self.user_id;
        let conn_id = self.conn_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let Some(room) = state.registry.get(room_id).await else {
                return;
            };
            match room.disconnect(user_id, conn_id).await {
                Ok(LeaveOutcome::RoomClosed) => state.registry.delete(room_id).await,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(%room_id, %user_id, %conn_id, error = %e, "disconnect failed");
                }
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<S, R>(
    pending: PendingConnection,
    state: Arc<ServerState<S, R>>,
) -> Result<(), QuizhallError>
where
    S: Store,
    R: SessionResolver,
{
    let mut conn = pending.upgrade(&state.gate, state.queue_capacity).await?;
    let conn_id = conn.id();
    let sender = conn.sender();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Session ---
    let credentials = Credentials::from_cookie_header(conn.handshake().cookie.as_deref());
    let user_id = match state.resolver.resolve(&credentials).await {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::info!(%conn_id, error = %e, "session rejected");
            send_error(&sender, state.codec.as_ref(), e.code(), &e.client_message());
            conn.close();
            return Err(e.into());
        }
    };
    tracing::info!(%conn_id, %user_id, "user connected");

    let mut guard = ConnectionGuard {
        user_id,
        conn_id,
        joined: None,
        state: Arc::clone(&state),
    };

    // --- Step 2: Message loop ---
    loop {
        let received = match state.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.recv()).await,
            None => Ok(conn.recv().await),
        };
        let data = match received {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%user_id, %conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%user_id, %conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%user_id, %conn_id, "connection timed out");
                break;
            }
        };

        let msg = match state.codec.decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%user_id, error = %e, "failed to decode action");
                send_error(&sender, state.codec.as_ref(), 400, &e.to_string());
                continue;
            }
        };

        let room_id = msg.room_id();
        let action = msg.action();
        tracing::debug!(%user_id, %room_id, action, "action received");

        if let Err(e) = dispatch(&state, user_id, &sender, &mut guard.joined, msg).await {
            tracing::debug!(%user_id, %room_id, action, error = %e, "action failed");
            send_error(&sender, state.codec.as_ref(), e.code(), &e.client_message());
            if e.closes_connection() {
                tracing::info!(%user_id, %conn_id, error = %e, "closing connection");
                break;
            }
        }
    }

    // Queued frames are flushed before the close frame.
    conn.close();
    // guard drops here → the room sees the disconnect.
    Ok(())
}

/// Routes one action to its room.
async fn dispatch<S, R>(
    state: &ServerState<S, R>,
    user_id: UserId,
    sender: &ConnectionSender,
    joined: &mut Option<RoomId>,
    msg: ClientMessage,
) -> Result<(), RoomError>
where
    S: Store,
    R: SessionResolver,
{
    let registry = &state.registry;
    match msg {
        ClientMessage::JoinRoom(target) => {
            let room_id = target.room_id;
            // Checked again by the room when it claims the user; this only
            // saves creating a room the user can't enter.
            let current = registry.memberships().room_of(user_id).await;
            if let Some(other) = current.filter(|r| *r != room_id) {
                return Err(RoomError::AlreadyInAnotherRoom(user_id, other));
            }
            let (room, created) = registry.get_or_create(room_id).await?;
            let role = room.join(user_id, sender.clone()).await?;
            *joined = Some(room_id);
            tracing::info!(%user_id, %room_id, %role, created, "joined room");
        }
        ClientMessage::LeaveRoom(target) => {
            let room_id = target.room_id;
            let outcome = live_room(registry, room_id).await?.leave(user_id).await?;
            if *joined == Some(room_id) {
                *joined = None;
            }
            if outcome == LeaveOutcome::RoomClosed {
                registry.delete(room_id).await;
            }
        }
        ClientMessage::StartGame(target) => {
            live_room(registry, target.room_id).await?.start_game(user_id).await?;
        }
        ClientMessage::NextQuestion(target) => {
            live_room(registry, target.room_id).await?.next_question(user_id).await?;
        }
        ClientMessage::Answer(payload) => {
            live_room(registry, payload.room_id)
                .await?
                .answer(user_id, payload.answer)
                .await?;
        }
        ClientMessage::GetUsers(target) => {
            let users = live_room(registry, target.room_id).await?.users().await?;
            reply(sender, state.codec.as_ref(), &ServerMessage::UsersList { users });
        }
        ClientMessage::GetGameState(target) => {
            let game = live_room(registry, target.room_id).await?.game_state().await?;
            let (started, finished) = game.flags();
            reply(sender, state.codec.as_ref(), &ServerMessage::GameState { started, finished });
        }
        ClientMessage::BanUser(target) => {
            live_room(registry, target.room_id)
                .await?
                .ban(user_id, target.user_id)
                .await?;
        }
        ClientMessage::UnbanUser(target) => {
            live_room(registry, target.room_id)
                .await?
                .unban(user_id, target.user_id)
                .await?;
        }
    }
    Ok(())
}

/// Actions other than `join_room` never create a room.
async fn live_room<S: Store>(
    registry: &RoomRegistry<S>,
    room_id: RoomId,
) -> Result<RoomHandle, RoomError> {
    registry.get(room_id).await.ok_or(RoomError::NotFound(room_id))
}

/// Queues `msg` on this connection only.
fn reply(sender: &ConnectionSender, codec: &dyn Codec, msg: &ServerMessage) {
    let text = match codec.encode(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(conn_id = %sender.id(), error = %e, "failed to encode reply");
            return;
        }
    };
    if let Err(e) = sender.send_text(Arc::from(text)) {
        tracing::debug!(conn_id = %sender.id(), error = %e, "reply dropped");
    }
}

/// Sends an `error` event to the client.
fn send_error(sender: &ConnectionSender, codec: &dyn Codec, code: u16, message: &str) {
    reply(sender, codec, &ServerMessage::error(code, message));
}
