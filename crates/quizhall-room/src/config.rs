//! Room limits and the game state machine.

// ---------------------------------------------------------------------------
// RoomLimits
// ---------------------------------------------------------------------------

/// Process-wide limits applied to every room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomLimits {
    /// Maximum number of live rooms.
    pub max_rooms: usize,

    /// Upper bound on any room's capacity, whatever its row says.
    pub max_users_in_room: usize,

    /// Bound on each room actor's command queue.
    pub command_channel_size: usize,
}

impl Default for RoomLimits {
    fn default() -> Self {
        Self {
            max_rooms: 2048,
            max_users_in_room: 32,
            command_channel_size: 64,
        }
    }
}

impl RoomLimits {
    /// Effective capacity of a room whose row allows `max_users`.
    ///
    /// Never below one, so the owner can always get in.
    pub fn capacity_for(&self, max_users: u32) -> usize {
        (max_users as usize).min(self.max_users_in_room).max(1)
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Where a room's match is.
///
/// ```text
/// Lobby → InProgress → Finished
/// ```
///
/// - **Lobby**: accepting joins, game not started.
/// - **InProgress**: the owner started the game; questions are served.
/// - **Finished**: every question has been served and the ranking is
///   final. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameState {
    #[default]
    Lobby,
    InProgress,
    Finished,
}

impl GameState {
    /// Returns `true` if new participants may join.
    pub fn accepts_newcomers(self) -> bool {
        !matches!(self, Self::Finished)
    }

    /// `(started, finished)` as reported by `game_state`.
    pub fn flags(self) -> (bool, bool) {
        match self {
            Self::Lobby => (false, false),
            Self::InProgress => (true, false),
            Self::Finished => (true, true),
        }
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}
