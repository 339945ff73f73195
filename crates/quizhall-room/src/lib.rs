//! Live rooms for Quizhall.
//!
//! Each room runs as an isolated Tokio task (actor model) owning its
//! participants, connections, ban list, and question cursor.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: finds live rooms, creates them on first join
//! - [`RoomHandle`]: send actions to a running room actor
//! - [`Fanout`]: a room's live connections and broadcast
//! - [`PackLoader`]: reads a pack's questions once per room
//! - [`GameState`]: `Lobby → InProgress → Finished`
//! - [`Memberships`]: which room each user is in

mod broadcast;
mod config;
mod error;
mod membership;
mod pack;
mod registry;
mod room;

pub use broadcast::Fanout;
pub use config::{GameState, RoomLimits};
pub use error::RoomError;
pub use membership::Memberships;
pub use pack::{Answer, PackError, PackLoader, Question, parse_pack};
pub use registry::RoomRegistry;
pub use room::{LeaveOutcome, RoomHandle, RoomInfo};
