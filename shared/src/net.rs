use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Action, Bid, Card, GameId, GameStateView, Lobby, LobbyId, LobbySettings, PlayerInfo, SessionId,
};

/// A client-to-server envelope, `{"type": ..., "payload": ...}` on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Open a new lobby with the given settings.
    CreateLobby {
        /// Settings for the lobby and its game.
        settings: LobbySettings,
    },
    /// Join (or confirm membership of) the named lobby.
    JoinLobby {
        /// The lobby to join.
        lobby_id: LobbyId,
    },
    /// Leave the current lobby.
    LeaveLobby,
    /// Start the game; host only.
    StartGame,
    /// Request the list of open lobbies.
    ListLobbies,
    /// Place a bid in the current round.
    PlaceBid {
        /// The bid to place.
        bid: Bid,
    },
    /// Play a card into the current trick.
    PlayCard {
        /// The card to play.
        card: Card,
    },
    /// Request a fresh snapshot of the current game.
    RequestGameState,
    /// Deal the next round; last trick's winner only.
    StartNextRound,
    /// Application-level heartbeat.
    Ping,
}

/// A server-to-client envelope, `{"type": ..., "payload": ...}` on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Sent once after a socket authenticates; carries the stable id other
    /// players know this session by.
    Connected {
        /// The session's player id.
        player_id: SessionId,
    },
    /// Heartbeat reply.
    Pong,
    /// An operation failed; sent only to the offending session.
    Error {
        /// Human-readable description.
        message: String,
    },
    /// A lobby was created for the sender.
    LobbyCreated {
        /// The new lobby's id.
        lobby_id: LobbyId,
    },
    /// The sender joined a lobby.
    LobbyJoined {
        /// The joined lobby.
        lobby: LobbySummary,
    },
    /// The membership or host of the sender's lobby changed.
    LobbyUpdated {
        /// The lobby after the change.
        lobby: LobbySummary,
    },
    /// The open lobbies, in reply to `ListLobbies`.
    LobbyList {
        /// Summaries of every open lobby.
        lobbies: Vec<LobbySummary>,
    },
    /// The lobby's game is starting.
    GameStarting {
        /// The new game's id.
        game_id: GameId,
    },
    /// A per-recipient game snapshot.
    GameState {
        /// The game as visible to the recipient.
        state: GameStateView,
    },
    /// The recipient is to act.
    YourTurn {
        /// Every action the recipient may legally take.
        valid_actions: Vec<Action>,
    },
    /// A player acted.
    PlayerAction {
        /// The acting player.
        player_id: SessionId,
        /// What they did.
        action: Action,
        /// The player to act next, when the action handed the turn over.
        #[serde(skip_serializing_if = "Option::is_none")]
        next_player: Option<SessionId>,
    },
    /// A trick was resolved.
    TrickComplete {
        /// The player who took the trick.
        winner: SessionId,
    },
    /// The game ended.
    GameOver {
        /// Final cumulative scores.
        final_scores: BTreeMap<SessionId, i32>,
    },
    /// A player joined the sender's lobby.
    PlayerJoined {
        /// The joining player.
        player_id: SessionId,
    },
    /// A player left the sender's lobby or game for good.
    PlayerLeft {
        /// The departing player.
        player_id: SessionId,
    },
    /// A previously dropped player rebound a new socket.
    PlayerReconnected {
        /// The returning player.
        player_id: SessionId,
    },
}

/// A lobby as rendered to clients, in rosters and lobby lists.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LobbySummary {
    /// The lobby's id.
    pub id: LobbyId,
    /// The host's session id.
    pub host: SessionId,
    /// The roster, in join order.
    pub players: Vec<PlayerInfo>,
    /// The seat limit derived from the settings.
    pub max_players: usize,
    /// The host-chosen settings.
    pub settings: LobbySettings,
}

impl From<&Lobby> for LobbySummary {
    fn from(lobby: &Lobby) -> Self {
        LobbySummary {
            id: lobby.lobby_id,
            host: lobby.host.clone(),
            players: lobby.players().to_vec(),
            max_players: lobby.max_players(),
            settings: lobby.settings,
        }
    }
}
