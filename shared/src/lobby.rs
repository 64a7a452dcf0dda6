use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An identifier for a lobby, shared by the client and the server.
pub type LobbyId = u16;

/// The stable identity of an authenticated player, outliving any one socket.
///
/// Other players see this value as `player_id`; it is what game seating and
/// lobby membership are keyed by.
pub type SessionId = String;

/// Shortest and longest turn timeouts a lobby may configure, in seconds.
pub const TURN_TIMEOUT_RANGE_SECS: (u64, u64) = (10, 120);

/// Errors concerning the [`Lobby`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LobbyError {
    /// No lobby exists under the requested id.
    #[error("Lobby not found")]
    NotFound,
    /// The lobby already seats its maximum player count.
    #[error("Lobby is full")]
    Full,
    /// The lobby is no longer open to operations.
    #[error("Lobby is closed")]
    Closed,
    /// The session is already in a lobby or game.
    #[error("Already in a lobby or game")]
    AlreadyJoined,
    /// The session is in no lobby.
    #[error("Not in a lobby")]
    NotInLobby,
    /// Only the host may start the game.
    #[error("Only the host can start the game")]
    NotHost,
    /// The lobby has empty seats left.
    #[error("Not enough players to start")]
    NotEnoughPlayers,
    /// The settings fall outside the accepted ranges.
    #[error("Turn timeout must be between 10 and 120 seconds")]
    InvalidSettings,
}

/// How many seats a lobby's game will have.
#[derive(PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Copy, Clone, Default)]
pub enum PlayerCount {
    /// A three-player game.
    Three,
    /// A four-player game.
    #[default]
    Four,
}

impl PlayerCount {
    /// The number of seats.
    pub fn seats(&self) -> usize {
        match self {
            PlayerCount::Three => 3,
            PlayerCount::Four => 4,
        }
    }
}

/// Host-chosen settings, fixed when the lobby is created and inherited by
/// the game it starts.
#[derive(PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Copy, Clone)]
pub struct LobbySettings {
    /// Seats in the lobby and the game.
    pub player_count: PlayerCount,
    /// Seconds a player has to act before the server acts for them.
    pub turn_timeout_secs: u64,
    /// Whether a dropped player may rebind a new socket to their seat.
    pub allow_reconnect: bool,
}

impl Default for LobbySettings {
    fn default() -> Self {
        LobbySettings {
            player_count: PlayerCount::default(),
            turn_timeout_secs: 30,
            allow_reconnect: true,
        }
    }
}

impl LobbySettings {
    /// Checks the settings against the accepted ranges.
    pub fn validate(&self) -> Result<(), LobbyError> {
        let (min, max) = TURN_TIMEOUT_RANGE_SECS;

        if self.turn_timeout_secs < min || self.turn_timeout_secs > max {
            return Err(LobbyError::InvalidSettings);
        }

        Ok(())
    }
}

/// A player as seen in a lobby roster.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    /// The player's stable session id.
    pub session_id: SessionId,
    /// The player's display name.
    pub username: String,
}

/// Lifecycle state of a [`Lobby`].
#[derive(PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Copy, Clone)]
pub enum LobbyStatus {
    /// Accepting joins.
    Open,
    /// The host has called for the game to start.
    Starting,
    /// Superseded by a game; accepts no further operation.
    Closed,
}

/// What [`Lobby::leave`] did to the lobby.
#[derive(Debug, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The player left; others remain and the host is unchanged.
    Left,
    /// The player left and the host role moved to the named session.
    HostChanged(SessionId),
    /// The last player left; the lobby should be dropped.
    Empty,
}

/// A waiting room gathering players until its game starts.
///
/// The creator becomes host and first member; the host is always a current
/// member, and membership order is the eventual seating order.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Lobby {
    /// The lobby's identifier.
    pub lobby_id: LobbyId,
    /// The session that controls the lobby.
    pub host: SessionId,
    players: Vec<PlayerInfo>,
    /// The host-chosen settings.
    pub settings: LobbySettings,
    /// Lifecycle state.
    pub status: LobbyStatus,
}

impl Lobby {
    /// Creates a lobby with the creator as host and sole member.
    pub fn new(lobby_id: LobbyId, host: PlayerInfo, settings: LobbySettings) -> Lobby {
        Lobby {
            lobby_id,
            host: host.session_id.clone(),
            players: vec![host],
            settings,
            status: LobbyStatus::Open,
        }
    }

    /// The derived seat limit.
    pub fn max_players(&self) -> usize {
        self.settings.player_count.seats()
    }

    /// The roster, in join order.
    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    /// Whether every seat is taken.
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players()
    }

    /// Whether the session is a member.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.players
            .iter()
            .any(|player| player.session_id == *session_id)
    }

    /// Adds a player to an open, non-full lobby. Re-joining the same lobby
    /// is accepted without effect, so a creator's follow-up join is not an
    /// error.
    pub fn join(&mut self, player: PlayerInfo) -> Result<(), LobbyError> {
        if self.contains(&player.session_id) {
            return Ok(());
        }

        if self.status != LobbyStatus::Open {
            return Err(LobbyError::Closed);
        }

        if self.is_full() {
            return Err(LobbyError::Full);
        }

        self.players.push(player);

        Ok(())
    }

    /// Removes a player, reassigning the host role to the earliest joiner
    /// if the host left.
    pub fn leave(&mut self, session_id: &SessionId) -> Result<LeaveOutcome, LobbyError> {
        if !self.contains(session_id) {
            return Err(LobbyError::NotInLobby);
        }

        self.players
            .retain(|player| player.session_id != *session_id);

        if self.players.is_empty() {
            return Ok(LeaveOutcome::Empty);
        }

        if self.host == *session_id {
            self.host = self.players[0].session_id.clone();

            return Ok(LeaveOutcome::HostChanged(self.host.clone()));
        }

        Ok(LeaveOutcome::Left)
    }

    /// Validates that the named session may start the game now: host only,
    /// open lobby, all seats filled. On success the lobby is `Starting` and
    /// the roster, in join order, is the game's seating; the caller closes
    /// the lobby once the game exists.
    pub fn start(&mut self, session_id: &SessionId) -> Result<Vec<SessionId>, LobbyError> {
        if self.status != LobbyStatus::Open {
            return Err(LobbyError::Closed);
        }

        if self.host != *session_id {
            return Err(LobbyError::NotHost);
        }

        if self.players.len() < self.max_players() {
            return Err(LobbyError::NotEnoughPlayers);
        }

        self.status = LobbyStatus::Starting;

        Ok(self
            .players
            .iter()
            .map(|player| player.session_id.clone())
            .collect())
    }

    /// Marks the lobby as superseded by its game.
    pub fn close(&mut self) {
        self.status = LobbyStatus::Closed;
    }
}
