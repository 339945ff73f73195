//! Room actor: an isolated Tokio task that owns one room's live game.
//!
//! Each room runs in its own task and talks to the outside world through
//! an mpsc channel. Commands are handled one at a time, to completion, so
//! no two actions on the same room ever interleave, and every connection
//! sees the room's events in the order the commands were processed.
//! Different rooms run fully in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use quizhall_protocol::{Codec, Participant, Role, RoomId, ServerMessage, UserId};
use quizhall_store::Store;
use quizhall_transport::{ConnectionId, ConnectionSender};
use tokio::sync::{mpsc, oneshot};

use crate::{Fanout, GameState, Memberships, Question, RoomError};

/// What happened to the room when someone left or disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// A player left; the room carries on.
    Left,
    /// A connection was detached; the participant stays in the room.
    Detached,
    /// The owner left and the room was torn down.
    RoomClosed,
}

/// A snapshot of room metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub state: GameState,
    pub owner: Option<UserId>,
    pub participants: usize,
    pub connections: usize,
    pub capacity: usize,
    /// How many questions have been served.
    pub cursor: usize,
    pub question_count: usize,
    pub banned: Vec<UserId>,
}

type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Commands sent to a room actor through its channel.
///
/// Variants carrying a `reply` are request/response: the caller waits on
/// the oneshot for the outcome.
pub(crate) enum RoomCommand {
    Join {
        user_id: UserId,
        sender: ConnectionSender,
        reply: Reply<Role>,
    },
    Leave {
        user_id: UserId,
        reply: Reply<LeaveOutcome>,
    },
    StartGame {
        user_id: UserId,
        reply: Reply<()>,
    },
    NextQuestion {
        user_id: UserId,
        reply: Reply<()>,
    },
    Answer {
        user_id: UserId,
        answer: usize,
        reply: Reply<()>,
    },
    GetUsers {
        reply: Reply<Vec<Participant>>,
    },
    GetGameState {
        reply: Reply<GameState>,
    },
    Ban {
        by: UserId,
        target: UserId,
        reply: Reply<()>,
    },
    Unban {
        by: UserId,
        target: UserId,
        reply: Reply<()>,
    },
    /// A socket closed.
    Disconnect {
        user_id: UserId,
        conn_id: ConnectionId,
        reply: Reply<LeaveOutcome>,
    },
    Info {
        reply: Reply<RoomInfo>,
    },
    /// Closes every connection and stops the actor. Storage is left alone.
    Shutdown,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Admits `user_id` and attaches `sender` as their connection.
    /// Returns the role they hold in the room.
    pub async fn join(&self, user_id: UserId, sender: ConnectionSender) -> Result<Role, RoomError> {
        self.request(|reply| RoomCommand::Join {
            user_id,
            sender,
            reply,
        })
        .await
    }

    pub async fn leave(&self, user_id: UserId) -> Result<LeaveOutcome, RoomError> {
        self.request(|reply| RoomCommand::Leave { user_id, reply })
            .await
    }

    pub async fn start_game(&self, user_id: UserId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::StartGame { user_id, reply })
            .await
    }

    pub async fn next_question(&self, user_id: UserId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::NextQuestion { user_id, reply })
            .await
    }

    pub async fn answer(&self, user_id: UserId, answer: usize) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Answer {
            user_id,
            answer,
            reply,
        })
        .await
    }

    /// The roster in join order.
    pub async fn users(&self) -> Result<Vec<Participant>, RoomError> {
        self.request(|reply| RoomCommand::GetUsers { reply }).await
    }

    pub async fn game_state(&self) -> Result<GameState, RoomError> {
        self.request(|reply| RoomCommand::GetGameState { reply })
            .await
    }

    pub async fn ban(&self, by: UserId, target: UserId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Ban { by, target, reply })
            .await
    }

    pub async fn unban(&self, by: UserId, target: UserId) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Unban { by, target, reply })
            .await
    }

    /// Reports that `conn_id` (belonging to `user_id`) has closed.
    pub async fn disconnect(
        &self,
        user_id: UserId,
        conn_id: ConnectionId,
    ) -> Result<LeaveOutcome, RoomError> {
        self.request(|reply| RoomCommand::Disconnect {
            user_id,
            conn_id,
            reply,
        })
        .await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::Info { reply }).await
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

/// Everything a room needs at creation.
pub(crate) struct RoomSetup<S> {
    pub room_id: RoomId,
    pub capacity: usize,
    pub questions: Arc<[Question]>,
    pub store: Arc<S>,
    pub memberships: Arc<Memberships>,
    pub codec: Arc<dyn Codec>,
    pub channel_size: usize,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<S> {
    room_id: RoomId,
    capacity: usize,
    state: GameState,
    /// Set by the first join and never changed.
    owner: Option<UserId>,
    /// The owner's most recently attached connection. Kept even after the
    /// fanout drops it, so that socket closing still tears the room down.
    owner_conn: Option<ConnectionId>,
    participants: HashMap<UserId, Participant>,
    /// Join order, for the roster and for ranking ties.
    order: Vec<UserId>,
    banned: HashSet<UserId>,
    questions: Arc<[Question]>,
    /// Number of questions served so far.
    cursor: usize,
    /// Who has answered the question currently served.
    answered: HashSet<UserId>,
    fanout: Fanout,
    store: Arc<S>,
    memberships: Arc<Memberships>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl<S: Store> RoomActor<S> {
    /// Runs the actor loop, processing commands until the room closes.
    async fn run(mut self) {
        tracing::info!(
            room_id = %self.room_id,
            capacity = self.capacity,
            questions = self.questions.len(),
            "room actor started"
        );

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    user_id,
                    sender,
                    reply,
                } => {
                    let result = self.handle_join(user_id, sender).await;
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { user_id, reply } => {
                    let result = self.handle_leave(user_id).await;
                    let closed = matches!(result, Ok(LeaveOutcome::RoomClosed));
                    let _ = reply.send(result);
                    if closed {
                        break;
                    }
                }
                RoomCommand::StartGame { user_id, reply } => {
                    let _ = reply.send(self.handle_start_game(user_id));
                }
                RoomCommand::NextQuestion { user_id, reply } => {
                    let result = self.handle_next_question(user_id).await;
                    let _ = reply.send(result);
                }
                RoomCommand::Answer {
                    user_id,
                    answer,
                    reply,
                } => {
                    let _ = reply.send(self.handle_answer(user_id, answer));
                }
                RoomCommand::GetUsers { reply } => {
                    let _ = reply.send(Ok(self.roster()));
                }
                RoomCommand::GetGameState { reply } => {
                    let _ = reply.send(Ok(self.state));
                }
                RoomCommand::Ban { by, target, reply } => {
                    let result = self.handle_ban(by, target).await;
                    let _ = reply.send(result);
                }
                RoomCommand::Unban { by, target, reply } => {
                    let _ = reply.send(self.handle_unban(by, target));
                }
                RoomCommand::Disconnect {
                    user_id,
                    conn_id,
                    reply,
                } => {
                    let outcome = self.handle_disconnect(user_id, conn_id).await;
                    let _ = reply.send(Ok(outcome));
                    if outcome == LeaveOutcome::RoomClosed {
                        break;
                    }
                }
                RoomCommand::Info { reply } => {
                    let _ = reply.send(Ok(self.info()));
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_id = %self.room_id, "room shutting down");
                    self.fanout.close_all();
                    self.memberships.release_room(self.room_id).await;
                    break;
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    fn is_owner(&self, user_id: UserId) -> bool {
        self.owner == Some(user_id)
    }

    async fn handle_join(
        &mut self,
        user_id: UserId,
        sender: ConnectionSender,
    ) -> Result<Role, RoomError> {
        if self.banned.contains(&user_id) {
            return Err(RoomError::Banned(user_id, self.room_id));
        }

        // Re-joining one's own room just moves the connection.
        if let Some(existing) = self.participants.get(&user_id) {
            let role = existing.role;
            if role == Role::Owner {
                self.owner_conn = Some(sender.id());
            }
            self.fanout.attach(user_id, sender);
            self.fanout
                .send(user_id, &ServerMessage::JoinedRoom { user_id, role });
            tracing::debug!(room_id = %self.room_id, %user_id, "connection re-attached");
            return Ok(role);
        }

        if !self.state.accepts_newcomers() {
            return Err(RoomError::InvalidState(format!(
                "cannot join a room in state {}",
                self.state
            )));
        }
        if self.participants.len() >= self.capacity {
            return Err(RoomError::RoomFull(self.room_id));
        }

        if let Err(other) = self.memberships.claim(user_id, self.room_id).await {
            return Err(RoomError::AlreadyInAnotherRoom(user_id, other));
        }

        let name = match self.persist_join(user_id).await {
            Ok(name) => name,
            Err(e) => {
                self.memberships.release(user_id, self.room_id).await;
                return Err(e);
            }
        };

        let role = if self.owner.is_none() {
            self.owner = Some(user_id);
            self.owner_conn = Some(sender.id());
            Role::Owner
        } else {
            Role::Player
        };
        self.participants.insert(
            user_id,
            Participant {
                id: user_id,
                name,
                role,
                score: 0,
                room_id: self.room_id,
            },
        );
        self.order.push(user_id);
        self.fanout.attach(user_id, sender);
        self.sync_current_users().await;

        tracing::info!(
            room_id = %self.room_id,
            %user_id,
            %role,
            participants = self.participants.len(),
            "user joined"
        );

        self.fanout
            .send(user_id, &ServerMessage::JoinedRoom { user_id, role });
        self.broadcast_roster();
        Ok(role)
    }

    /// Durable side of a join. Returns the user's display name.
    ///
    /// The membership row is the only write, and it comes last.
    async fn persist_join(&self, user_id: UserId) -> Result<String, RoomError> {
        let name = self
            .store
            .user_name(user_id)
            .await?
            .unwrap_or_else(|| user_id.to_string());
        self.store.add_member(user_id, self.room_id).await?;
        Ok(name)
    }

    /// Mirrors the participant count into the room row. Best effort: the
    /// membership rows are authoritative.
    async fn sync_current_users(&self) {
        let users = count(self.participants.len());
        if let Err(e) = self.store.set_current_users(self.room_id, users).await {
            tracing::warn!(room_id = %self.room_id, users, error = %e, "failed to update current users");
        }
    }

    async fn handle_leave(&mut self, user_id: UserId) -> Result<LeaveOutcome, RoomError> {
        if !self.participants.contains_key(&user_id) {
            return Err(RoomError::NotAParticipant(user_id, self.room_id));
        }

        if self.is_owner(user_id) {
            self.teardown().await;
            return Ok(LeaveOutcome::RoomClosed);
        }

        self.store.remove_member(user_id).await?;
        self.remove_participant(user_id).await;
        self.sync_current_users().await;
        self.fanout.send(
            user_id,
            &ServerMessage::LeftRoom {
                room_id: self.room_id,
            },
        );
        self.fanout.detach(user_id);

        tracing::info!(
            room_id = %self.room_id,
            %user_id,
            participants = self.participants.len(),
            "user left"
        );
        self.broadcast_roster();
        Ok(LeaveOutcome::Left)
    }

    fn handle_start_game(&mut self, user_id: UserId) -> Result<(), RoomError> {
        if !self.is_owner(user_id) {
            return Err(RoomError::NotOwner);
        }
        match self.state {
            GameState::Lobby => {
                self.state = GameState::InProgress;
                tracing::info!(room_id = %self.room_id, "game started");
            }
            GameState::InProgress => {
                tracing::debug!(room_id = %self.room_id, "start_game repeated");
            }
            GameState::Finished => return Err(RoomError::GameFinished),
        }
        self.fanout.broadcast(&ServerMessage::GameStarted {
            room_id: self.room_id,
        });
        Ok(())
    }

    async fn handle_next_question(&mut self, user_id: UserId) -> Result<(), RoomError> {
        if !self.is_owner(user_id) {
            return Err(RoomError::NotOwner);
        }
        match self.state {
            GameState::Lobby => return Err(RoomError::GameNotStarted),
            GameState::Finished => return Err(RoomError::GameFinished),
            GameState::InProgress => {}
        }

        let Some(question) = self.questions.get(self.cursor) else {
            return self.finish().await;
        };

        let view = question.view(self.cursor);
        self.cursor += 1;
        self.answered.clear();
        tracing::debug!(
            room_id = %self.room_id,
            cursor = self.cursor,
            total = self.questions.len(),
            "question served"
        );
        self.fanout
            .broadcast(&ServerMessage::Question { question: view });
        Ok(())
    }

    /// Ends the match: announces the ranking and persists the counters.
    ///
    /// The room is finished even if a counter write fails; the failure is
    /// still returned to the owner.
    async fn finish(&mut self) -> Result<(), RoomError> {
        self.state = GameState::Finished;
        let ranking = self.ranking();
        tracing::info!(
            room_id = %self.room_id,
            winner = ?ranking.first().map(|p| p.id),
            "game finished"
        );
        self.fanout.broadcast(&ServerMessage::QuestionsDone {
            ranking: ranking.clone(),
        });

        if let Some(winner) = ranking.first() {
            self.store.record_win(winner.id).await.inspect_err(|e| {
                tracing::error!(room_id = %self.room_id, user_id = %winner.id, error = %e, "failed to record win");
            })?;
        }
        for participant in &ranking {
            self.store.record_played(participant.id).await.inspect_err(|e| {
                tracing::error!(room_id = %self.room_id, user_id = %participant.id, error = %e, "failed to record played match");
            })?;
        }
        Ok(())
    }

    fn handle_answer(&mut self, user_id: UserId, answer: usize) -> Result<(), RoomError> {
        if !self.participants.contains_key(&user_id) {
            return Err(RoomError::NotAParticipant(user_id, self.room_id));
        }
        let served = self.cursor.checked_sub(1).and_then(|i| self.questions.get(i));
        let Some(question) = served.filter(|_| self.state == GameState::InProgress) else {
            return Err(RoomError::NoActiveQuestion);
        };
        if !self.answered.insert(user_id) {
            return Err(RoomError::AlreadyAnswered);
        }

        let correct = question.is_correct(answer);
        if correct {
            let value = question.value;
            if let Some(p) = self.participants.get_mut(&user_id) {
                p.score = p.score.saturating_add(value);
            }
        }
        tracing::debug!(room_id = %self.room_id, %user_id, answer, correct, "answer received");
        self.broadcast_roster();
        Ok(())
    }

    async fn handle_ban(&mut self, by: UserId, target: UserId) -> Result<(), RoomError> {
        if !self.is_owner(by) {
            return Err(RoomError::NotOwner);
        }
        if by == target {
            return Err(RoomError::CannotBanSelf);
        }

        if self.participants.contains_key(&target) {
            self.store.remove_member(target).await?;
            self.remove_participant(target).await;
            self.sync_current_users().await;
            self.banned.insert(target);
            self.fanout.send(
                target,
                &ServerMessage::UserBanned {
                    room_id: self.room_id,
                },
            );
            self.fanout.detach(target);
            self.broadcast_roster();
        } else {
            self.banned.insert(target);
        }

        tracing::info!(room_id = %self.room_id, user_id = %target, "user banned");
        Ok(())
    }

    fn handle_unban(&mut self, by: UserId, target: UserId) -> Result<(), RoomError> {
        if !self.is_owner(by) {
            return Err(RoomError::NotOwner);
        }
        if self.banned.remove(&target) {
            tracing::info!(room_id = %self.room_id, user_id = %target, "user unbanned");
        }
        Ok(())
    }

    /// A closed socket. Only the owner's latest connection closes the room,
    /// whether or not the fanout still holds it.
    async fn handle_disconnect(&mut self, user_id: UserId, conn_id: ConnectionId) -> LeaveOutcome {
        if self.fanout.detach_connection(user_id, conn_id) {
            tracing::debug!(room_id = %self.room_id, %user_id, %conn_id, "connection detached");
        }

        if self.is_owner(user_id) && self.owner_conn == Some(conn_id) {
            tracing::info!(room_id = %self.room_id, %user_id, %conn_id, "owner disconnected");
            self.teardown().await;
            return LeaveOutcome::RoomClosed;
        }
        LeaveOutcome::Detached
    }

    /// Drops a participant from every in-memory collection.
    async fn remove_participant(&mut self, user_id: UserId) {
        self.participants.remove(&user_id);
        self.order.retain(|id| *id != user_id);
        self.answered.remove(&user_id);
        self.memberships.release(user_id, self.room_id).await;
    }

    /// Deletes the room: storage first (best effort), then every
    /// connection gets `room_deleted` and is closed.
    async fn teardown(&mut self) {
        if let Err(e) = self.store.clear_members(self.room_id).await {
            tracing::error!(room_id = %self.room_id, error = %e, "failed to clear room members");
        }
        if let Err(e) = self.store.delete_room(self.room_id).await {
            tracing::error!(room_id = %self.room_id, error = %e, "failed to delete room");
        }

        self.fanout.broadcast(&ServerMessage::RoomDeleted {
            room_id: self.room_id,
        });
        self.fanout.close_all();
        self.memberships.release_room(self.room_id).await;

        tracing::info!(
            room_id = %self.room_id,
            participants = self.participants.len(),
            "room deleted"
        );
        self.participants.clear();
        self.order.clear();
    }

    /// The roster in join order.
    fn roster(&self) -> Vec<Participant> {
        self.order
            .iter()
            .filter_map(|id| self.participants.get(id).cloned())
            .collect()
    }

    /// Score descending; ties keep join order (the sort is stable).
    fn ranking(&self) -> Vec<Participant> {
        let mut ranking = self.roster();
        ranking.sort_by(|a, b| b.score.cmp(&a.score));
        ranking
    }

    fn broadcast_roster(&mut self) {
        let users = self.roster();
        self.fanout.broadcast(&ServerMessage::UsersList { users });
    }

    fn info(&self) -> RoomInfo {
        let mut banned: Vec<UserId> = self.banned.iter().copied().collect();
        banned.sort();
        RoomInfo {
            room_id: self.room_id,
            state: self.state,
            owner: self.owner,
            participants: self.participants.len(),
            connections: self.fanout.len(),
            capacity: self.capacity,
            cursor: self.cursor,
            question_count: self.questions.len(),
            banned,
        }
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Spawns a new room actor task and returns a handle to communicate with it.
pub(crate) fn spawn_room<S: Store>(setup: RoomSetup<S>) -> RoomHandle {
    let (tx, rx) = mpsc::channel(setup.channel_size.max(1));

    let actor = RoomActor {
        room_id: setup.room_id,
        capacity: setup.capacity,
        state: GameState::Lobby,
        owner: None,
        owner_conn: None,
        participants: HashMap::new(),
        order: Vec::new(),
        banned: HashSet::new(),
        questions: setup.questions,
        cursor: 0,
        answered: HashSet::new(),
        fanout: Fanout::new(setup.room_id, setup.codec),
        store: setup.store,
        memberships: setup.memberships,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle {
        room_id: setup.room_id,
        sender: tx,
    }
}
