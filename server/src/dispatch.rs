//! The message router: inbound envelopes become manager calls, failures
//! become an `Error` for the sender alone, and session lifecycle edges
//! (connect, socket loss, grace expiry) are translated into lobby and game
//! membership changes.

use std::time::Duration;

use shared::{
    ClientMessage, GameError, GamePhase, LeaveOutcome, LobbyError, LobbyId, LobbySummary,
    PlayerInfo, ServerMessage, SessionId,
};
use thiserror::Error;

use crate::games::{self, ActionRequest};
use crate::sessions::{Absence, Binding, SendStatus};
use crate::AppState;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Lobby(#[from] LobbyError),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("Not in a game")]
    NotInGame,
}

/// Routes one parsed envelope for the session. Any error is reported to the
/// sender only; nothing else observes a failed operation.
pub fn handle_message(state: &AppState, session_id: &SessionId, message: ClientMessage) {
    let result = match message {
        ClientMessage::Ping => {
            deliver(state, session_id, &ServerMessage::Pong);
            Ok(())
        }
        ClientMessage::ListLobbies => {
            deliver(
                state,
                session_id,
                &ServerMessage::LobbyList {
                    lobbies: state.lobbies.list(),
                },
            );
            Ok(())
        }
        ClientMessage::CreateLobby { settings } => create_lobby(state, session_id, settings),
        ClientMessage::JoinLobby { lobby_id } => join_lobby(state, session_id, lobby_id),
        ClientMessage::LeaveLobby => leave_lobby(state, session_id),
        ClientMessage::StartGame => start_game(state, session_id),
        ClientMessage::PlaceBid { bid } => {
            game_action(state, session_id, ActionRequest::Bid(bid.tricks))
        }
        ClientMessage::PlayCard { card } => {
            game_action(state, session_id, ActionRequest::Play(card))
        }
        ClientMessage::StartNextRound => game_action(state, session_id, ActionRequest::NextRound),
        ClientMessage::RequestGameState => request_game_state(state, session_id),
    };

    if let Err(err) = result {
        deliver(
            state,
            session_id,
            &ServerMessage::Error {
                message: err.to_string(),
            },
        );
    }
}

/// Enqueues a message for one session. Queue overflow drops the socket, and
/// the reconnect grace starts here.
pub fn deliver(state: &AppState, session_id: &SessionId, message: &ServerMessage) {
    if let SendStatus::Overflow(absence) = state.sessions.send(session_id, message) {
        tracing::warn!(session = %session_id, "outbound queue overflow, dropping socket");
        schedule_expiry(state, session_id.clone(), absence);
    }
}

/// Greets a freshly bound socket and, on a rebind, synthesizes the current
/// truth: a state snapshot for a game, the roster for a lobby. Missed
/// events are never replayed.
pub fn on_connected(state: &AppState, binding: &Binding) {
    deliver(
        state,
        &binding.session_id,
        &ServerMessage::Connected {
            player_id: binding.session_id.clone(),
        },
    );

    if !binding.rebound {
        return;
    }

    if let Some(entry) = binding.game.and_then(|game_id| state.games.get(game_id)) {
        let session = entry.lock().expect("game lock");

        deliver(
            state,
            &binding.session_id,
            &ServerMessage::GameState {
                state: session.game.view_for(&binding.session_id),
            },
        );

        // The pending turn deadline is untouched; reconnecting does not
        // reset the clock.
        if binding.reconnected {
            let message = ServerMessage::PlayerReconnected {
                player_id: binding.session_id.clone(),
            };

            for seat in session.game.seating() {
                if seat != &binding.session_id {
                    deliver(state, seat, &message);
                }
            }
        }
    } else if let Some(lobby) = binding.lobby.and_then(|lobby_id| state.lobbies.get(lobby_id)) {
        let lobby = lobby.lock().expect("lobby lock");

        deliver(
            state,
            &binding.session_id,
            &ServerMessage::LobbyJoined {
                lobby: LobbySummary::from(&*lobby),
            },
        );

        if binding.reconnected {
            let message = ServerMessage::PlayerReconnected {
                player_id: binding.session_id.clone(),
            };

            for player in lobby.players() {
                if player.session_id != binding.session_id {
                    deliver(state, &player.session_id, &message);
                }
            }
        }
    }
}

/// Socket teardown: mark the session absent (unless a newer socket already
/// took over) and start its reconnect grace.
pub fn on_socket_closed(state: &AppState, session_id: &SessionId, epoch: u64) {
    if let Some(absence) = state.sessions.mark_absent(session_id, epoch) {
        schedule_expiry(state, session_id.clone(), absence);
    }
}

fn create_lobby(
    state: &AppState,
    session_id: &SessionId,
    settings: shared::LobbySettings,
) -> Result<(), ClientError> {
    ensure_unattached(state, session_id)?;

    let host = player_info(state, session_id)?;
    let (lobby_id, summary) = state.lobbies.create(host, settings)?;

    state.sessions.set_lobby(session_id, Some(lobby_id));

    if let Some(lobby) = state.lobbies.get(lobby_id) {
        state
            .snapshots
            .record_lobby(&lobby.lock().expect("lobby lock"));
    }

    tracing::info!(lobby = lobby_id, host = %session_id, seats = summary.max_players, "lobby created");

    deliver(state, session_id, &ServerMessage::LobbyCreated { lobby_id });

    Ok(())
}

fn join_lobby(
    state: &AppState,
    session_id: &SessionId,
    lobby_id: LobbyId,
) -> Result<(), ClientError> {
    let (current_lobby, _) = state
        .sessions
        .contexts(session_id)
        .ok_or(LobbyError::NotFound)?;

    // A member (the creator included) re-joining their own lobby just gets
    // the roster again.
    if current_lobby != Some(lobby_id) {
        ensure_unattached(state, session_id)?;
    }

    let entry = state.lobbies.get(lobby_id).ok_or(LobbyError::NotFound)?;
    let mut lobby = entry.lock().expect("lobby lock");

    let player = player_info(state, session_id)?;
    let already_member = lobby.contains(session_id);

    lobby.join(player)?;
    state.sessions.set_lobby(session_id, Some(lobby_id));

    let summary = LobbySummary::from(&*lobby);

    deliver(
        state,
        session_id,
        &ServerMessage::LobbyJoined {
            lobby: summary.clone(),
        },
    );

    if !already_member {
        let joined = ServerMessage::PlayerJoined {
            player_id: session_id.clone(),
        };
        let updated = ServerMessage::LobbyUpdated { lobby: summary };

        for player in lobby.players() {
            if player.session_id != *session_id {
                deliver(state, &player.session_id, &joined);
                deliver(state, &player.session_id, &updated);
            }
        }

        state.snapshots.record_lobby(&lobby);
    }

    Ok(())
}

fn leave_lobby(state: &AppState, session_id: &SessionId) -> Result<(), ClientError> {
    let (lobby_id, _) = state
        .sessions
        .contexts(session_id)
        .ok_or(LobbyError::NotInLobby)?;
    let lobby_id = lobby_id.ok_or(LobbyError::NotInLobby)?;

    remove_from_lobby(state, lobby_id, session_id)?;
    state.sessions.set_lobby(session_id, None);

    Ok(())
}

fn start_game(state: &AppState, session_id: &SessionId) -> Result<(), ClientError> {
    let (lobby_id, _) = state
        .sessions
        .contexts(session_id)
        .ok_or(LobbyError::NotInLobby)?;
    let lobby_id = lobby_id.ok_or(LobbyError::NotInLobby)?;

    let entry = state.lobbies.get(lobby_id).ok_or(LobbyError::NotFound)?;

    // Lock order for the handoff is fixed: lobby first, then the new game.
    let mut lobby = entry.lock().expect("lobby lock");
    let seating = lobby.start(session_id)?;

    let (game_id, game_entry) = state.games.create(seating.clone(), lobby.settings);

    lobby.close();
    state.snapshots.record_lobby(&lobby);
    drop(lobby);

    state.lobbies.remove(lobby_id);

    tracing::info!(game = game_id, lobby = lobby_id, "game starting");

    let starting = ServerMessage::GameStarting { game_id };

    for seat in &seating {
        state.sessions.set_lobby(seat, None);
        state.sessions.set_game(seat, Some(game_id));
        deliver(state, seat, &starting);
    }

    games::publish_deal(state, game_id, &game_entry);

    Ok(())
}

fn game_action(
    state: &AppState,
    session_id: &SessionId,
    request: ActionRequest,
) -> Result<(), ClientError> {
    let (_, game_id) = state
        .sessions
        .contexts(session_id)
        .ok_or(ClientError::NotInGame)?;
    let game_id = game_id.ok_or(ClientError::NotInGame)?;
    let entry = state.games.get(game_id).ok_or(ClientError::NotInGame)?;

    games::apply_action(state, game_id, &entry, session_id, request)?;

    Ok(())
}

fn request_game_state(state: &AppState, session_id: &SessionId) -> Result<(), ClientError> {
    let (_, game_id) = state
        .sessions
        .contexts(session_id)
        .ok_or(ClientError::NotInGame)?;
    let game_id = game_id.ok_or(ClientError::NotInGame)?;
    let entry = state.games.get(game_id).ok_or(ClientError::NotInGame)?;

    let session = entry.lock().expect("game lock");

    deliver(
        state,
        session_id,
        &ServerMessage::GameState {
            state: session.game.view_for(session_id),
        },
    );

    Ok(())
}

/// A session may create or join a lobby only while it is in no lobby and no
/// running game. A completed game still lingering for state requests does
/// not hold its players captive.
fn ensure_unattached(state: &AppState, session_id: &SessionId) -> Result<(), ClientError> {
    let (lobby, game) = state
        .sessions
        .contexts(session_id)
        .ok_or(LobbyError::NotFound)?;

    if lobby.is_some() {
        return Err(LobbyError::AlreadyJoined.into());
    }

    if let Some(game_id) = game {
        match state.games.get(game_id) {
            Some(entry) => {
                if entry.lock().expect("game lock").game.phase() != GamePhase::GameComplete {
                    return Err(LobbyError::AlreadyJoined.into());
                }

                state.sessions.set_game(session_id, None);
            }
            None => state.sessions.set_game(session_id, None),
        }
    }

    Ok(())
}

fn player_info(state: &AppState, session_id: &SessionId) -> Result<PlayerInfo, ClientError> {
    let username = state
        .sessions
        .username(session_id)
        .ok_or(LobbyError::NotFound)?;

    Ok(PlayerInfo {
        session_id: session_id.clone(),
        username,
    })
}

/// Takes a player out of a lobby, notifying the remaining members and
/// dropping the lobby when it empties.
fn remove_from_lobby(
    state: &AppState,
    lobby_id: LobbyId,
    session_id: &SessionId,
) -> Result<(), ClientError> {
    let Some(entry) = state.lobbies.get(lobby_id) else {
        return Ok(());
    };

    let mut lobby = entry.lock().expect("lobby lock");
    let outcome = lobby.leave(session_id)?;

    if outcome == LeaveOutcome::Empty {
        drop(lobby);
        state.lobbies.remove(lobby_id);
        tracing::info!(lobby = lobby_id, "lobby emptied and dropped");

        return Ok(());
    }

    let left = ServerMessage::PlayerLeft {
        player_id: session_id.clone(),
    };
    let updated = ServerMessage::LobbyUpdated {
        lobby: LobbySummary::from(&*lobby),
    };

    for player in lobby.players() {
        deliver(state, &player.session_id, &left);
        deliver(state, &player.session_id, &updated);
    }

    state.snapshots.record_lobby(&lobby);

    Ok(())
}

/// Starts the reconnect window for a session that just lost its socket.
/// With reconnects disallowed the session expires immediately.
fn schedule_expiry(state: &AppState, session_id: SessionId, absence: Absence) {
    let grace = reconnect_grace(state, &absence);
    let state = state.clone();

    tracing::info!(session = %session_id, ?grace, "reconnect window open");

    tokio::spawn(async move {
        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }

        expire_session(&state, &session_id, absence.epoch);
    });
}

/// The grace is four turn timeouts of whatever the session is in; sessions
/// at large get the server-wide default.
fn reconnect_grace(state: &AppState, absence: &Absence) -> Duration {
    let settings = absence
        .game
        .and_then(|game_id| state.games.get(game_id))
        .map(|entry| *entry.lock().expect("game lock").game.settings())
        .or_else(|| {
            absence
                .lobby
                .and_then(|lobby_id| state.lobbies.get(lobby_id))
                .map(|entry| entry.lock().expect("lobby lock").settings)
        });

    match settings {
        Some(settings) if !settings.allow_reconnect => Duration::ZERO,
        Some(settings) => Duration::from_secs(settings.turn_timeout_secs * 4),
        None => state.config.default_reconnect_grace(),
    }
}

/// Destroys a session whose grace ran out, cascading into its lobby and
/// game. The game seat itself survives; the scheduler keeps playing for it
/// until the game ends or everyone is gone.
fn expire_session(state: &AppState, session_id: &SessionId, epoch: u64) {
    let Some(expired) = state.sessions.expire(session_id, epoch) else {
        return;
    };

    tracing::info!(session = %session_id, "reconnect window expired, destroying session");

    if let Some(lobby_id) = expired.lobby {
        let _ = remove_from_lobby(state, lobby_id, session_id);
    }

    if let Some(game_id) = expired.game {
        if let Some(entry) = state.games.get(game_id) {
            let session = entry.lock().expect("game lock");
            let seating = session.game.seating().to_vec();

            let left = ServerMessage::PlayerLeft {
                player_id: session_id.clone(),
            };

            for seat in &seating {
                if seat != session_id {
                    deliver(state, seat, &left);
                }
            }

            let abandoned = seating.iter().all(|seat| !state.sessions.exists(seat));
            drop(session);

            if abandoned {
                state.games.remove(game_id);
                tracing::info!(game = game_id, "all seats abandoned, dropping game");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use shared::{Action, Bid, GameId, GamePhase, LobbySettings, PlayerCount};
    use tokio::sync::mpsc;

    use super::*;
    use crate::config::Config;
    use crate::sessions::{Binding, OUTBOUND_QUEUE};
    use crate::AppState;

    fn test_state() -> AppState {
        AppState::new(Config {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            max_connections: 64,
            turn_timeout_secs: 30,
            log_level: None,
            database_url: None,
        })
    }

    fn connect(state: &AppState, user: &str) -> (Binding, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let binding = state.sessions.bind(user, user, tx);

        on_connected(state, &binding);

        (binding, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();

        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }

        messages
    }

    fn created_lobby_id(messages: &[ServerMessage]) -> LobbyId {
        messages
            .iter()
            .find_map(|message| match message {
                ServerMessage::LobbyCreated { lobby_id } => Some(*lobby_id),
                _ => None,
            })
            .expect("LobbyCreated reply")
    }

    /// Creates a lobby, joins three more players and starts the game,
    /// returning the seatings' bindings, receivers and the game id.
    fn start_four_player_game(
        state: &AppState,
        settings: LobbySettings,
    ) -> (Vec<Binding>, Vec<mpsc::Receiver<ServerMessage>>, GameId) {
        let mut bindings = Vec::new();
        let mut receivers = Vec::new();

        for user in ["user-a", "user-b", "user-c", "user-d"] {
            let (binding, rx) = connect(state, user);
            bindings.push(binding);
            receivers.push(rx);
        }

        handle_message(
            state,
            &bindings[0].session_id,
            ClientMessage::CreateLobby { settings },
        );

        let lobby_id = created_lobby_id(&drain(&mut receivers[0]));

        for binding in &bindings[1..] {
            handle_message(state, &binding.session_id, ClientMessage::JoinLobby { lobby_id });
        }

        handle_message(state, &bindings[0].session_id, ClientMessage::StartGame);

        let game_id = drain(&mut receivers[0])
            .iter()
            .find_map(|message| match message {
                ServerMessage::GameStarting { game_id } => Some(*game_id),
                _ => None,
            })
            .expect("GameStarting broadcast");

        for rx in &mut receivers[1..] {
            drain(rx);
        }

        (bindings, receivers, game_id)
    }

    fn rx_of<'a>(
        bindings: &[Binding],
        receivers: &'a mut [mpsc::Receiver<ServerMessage>],
        session_id: &SessionId,
    ) -> &'a mut mpsc::Receiver<ServerMessage> {
        let index = bindings
            .iter()
            .position(|binding| binding.session_id == *session_id)
            .expect("known session");

        &mut receivers[index]
    }

    #[tokio::test]
    async fn create_then_join_echoes_the_roster() {
        let state = test_state();
        let (a, mut rx) = connect(&state, "user-a");

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Connected { .. }]
        ));

        handle_message(
            &state,
            &a.session_id,
            ClientMessage::CreateLobby {
                settings: LobbySettings::default(),
            },
        );

        let lobby_id = created_lobby_id(&drain(&mut rx));

        handle_message(&state, &a.session_id, ClientMessage::JoinLobby { lobby_id });

        match drain(&mut rx).as_slice() {
            [ServerMessage::LobbyJoined { lobby }] => {
                assert_eq!(lobby.id, lobby_id);
                assert_eq!(lobby.host, a.session_id);
                assert_eq!(lobby.players.len(), 1);
                assert_eq!(lobby.max_players, 4);
            }
            other => panic!("expected a lone LobbyJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn context_mismatches_error_only_to_the_sender() {
        let state = test_state();
        let (a, mut rx_a) = connect(&state, "user-a");
        let (_b, mut rx_b) = connect(&state, "user-b");

        drain(&mut rx_a);
        drain(&mut rx_b);

        handle_message(&state, &a.session_id, ClientMessage::StartGame);
        handle_message(
            &state,
            &a.session_id,
            ClientMessage::PlaceBid {
                bid: Bid { tricks: 0 },
            },
        );
        handle_message(&state, &a.session_id, ClientMessage::JoinLobby { lobby_id: 999 });

        let errors: Vec<String> = drain(&mut rx_a)
            .into_iter()
            .filter_map(|message| match message {
                ServerMessage::Error { message } => Some(message),
                _ => None,
            })
            .collect();

        assert_eq!(
            errors,
            vec!["Not in a lobby", "Not in a game", "Lobby not found"]
        );
        assert!(drain(&mut rx_b).is_empty());
    }

    #[tokio::test]
    async fn a_full_game_round_flows_through_the_router() {
        let state = test_state();
        let (bindings, mut receivers, game_id) =
            start_four_player_game(&state, LobbySettings::default());

        let entry = state.games.get(game_id).expect("game exists");

        // Bid around the table through the wire interface; an out-of-turn
        // bid is rejected without touching anyone else.
        let dealer = entry.lock().unwrap().game.seating()[0].clone();

        handle_message(
            &state,
            &dealer,
            ClientMessage::PlaceBid {
                bid: Bid { tricks: 0 },
            },
        );

        let dealer_messages = drain(rx_of(&bindings, &mut receivers, &dealer));
        assert!(dealer_messages
            .iter()
            .any(|message| matches!(message, ServerMessage::Error { message } if message == "Not your turn")));

        while entry.lock().unwrap().game.phase() == GamePhase::Bidding {
            let current = entry.lock().unwrap().game.current_player().clone();
            let Some(Action::Bid(bid)) = entry.lock().unwrap().game.default_action() else {
                panic!("no default bid");
            };

            handle_message(
                &state,
                &current,
                ClientMessage::PlaceBid { bid },
            );
        }

        // One-card round: play around the table.
        while entry.lock().unwrap().game.phase() == GamePhase::Playing {
            let current = entry.lock().unwrap().game.current_player().clone();
            let Some(Action::PlayCard(card)) = entry.lock().unwrap().game.default_action() else {
                panic!("no default card");
            };

            handle_message(&state, &current, ClientMessage::PlayCard { card });
        }

        assert_eq!(entry.lock().unwrap().game.phase(), GamePhase::RoundComplete);

        let winner = entry.lock().unwrap().game.current_player().clone();

        // Everyone saw the trick resolve and received a fresh snapshot.
        for binding in &bindings {
            let messages = drain(rx_of(&bindings, &mut receivers, &binding.session_id));

            assert!(messages
                .iter()
                .any(|message| matches!(message, ServerMessage::TrickComplete { winner: w } if *w == winner)));
            assert!(messages.iter().any(|message| matches!(
                message,
                ServerMessage::GameState { state } if state.phase == GamePhase::RoundComplete
            )));
        }

        // Only the winner may deal the next round.
        let bystander = bindings
            .iter()
            .find(|binding| binding.session_id != winner)
            .unwrap();

        handle_message(&state, &bystander.session_id, ClientMessage::StartNextRound);

        let messages = drain(rx_of(&bindings, &mut receivers, &bystander.session_id));
        assert!(messages
            .iter()
            .any(|message| matches!(message, ServerMessage::Error { message } if message == "Not your turn")));

        handle_message(&state, &winner, ClientMessage::StartNextRound);

        assert_eq!(entry.lock().unwrap().game.phase(), GamePhase::Bidding);
        assert_eq!(entry.lock().unwrap().game.round_number(), 2);
    }

    #[tokio::test]
    async fn reconnecting_rebinds_the_seat_and_synthesizes_state() {
        let state = test_state();
        let (bindings, mut receivers, game_id) =
            start_four_player_game(&state, LobbySettings::default());

        let dropped = bindings[1].clone();

        on_socket_closed(&state, &dropped.session_id, dropped.epoch);

        // Same user, new socket, inside the grace window.
        let (rebound, mut rx_new) = connect(&state, "user-b");

        assert_eq!(rebound.session_id, dropped.session_id);
        assert!(rebound.reconnected);
        assert_eq!(rebound.game, Some(game_id));

        let messages = drain(&mut rx_new);

        assert!(matches!(messages.first(), Some(ServerMessage::Connected { player_id }) if *player_id == rebound.session_id));
        assert!(messages.iter().any(|message| matches!(
            message,
            ServerMessage::GameState { state } if state.game_id == game_id && state.your_turn
        )));

        // The other seats were told.
        let messages = drain(rx_of(&bindings, &mut receivers, &bindings[0].session_id));
        assert!(messages
            .iter()
            .any(|message| matches!(message, ServerMessage::PlayerReconnected { player_id } if *player_id == rebound.session_id)));
    }

    #[tokio::test(start_paused = true)]
    async fn the_scheduler_bids_for_a_silent_player() {
        let state = test_state();
        let settings = LobbySettings {
            player_count: PlayerCount::Four,
            turn_timeout_secs: 10,
            allow_reconnect: true,
        };
        let (bindings, mut receivers, game_id) = start_four_player_game(&state, settings);

        let entry = state.games.get(game_id).expect("game exists");
        let first_bidder = entry.lock().unwrap().game.current_player().clone();

        // Nobody acts; the deadline fires and bids zero on their behalf.
        tokio::time::sleep(Duration::from_secs(11)).await;

        let messages = drain(rx_of(&bindings, &mut receivers, &bindings[0].session_id));

        assert!(messages.iter().any(|message| matches!(
            message,
            ServerMessage::PlayerAction {
                player_id,
                action: Action::Bid(Bid { tricks: 0 }),
                ..
            } if *player_id == first_bidder
        )));

        assert_ne!(entry.lock().unwrap().game.current_player(), &first_bidder);
    }

    #[tokio::test(start_paused = true)]
    async fn an_expired_session_is_removed_from_its_lobby() {
        let state = test_state();
        let (a, mut rx_a) = connect(&state, "user-a");
        let (b, mut rx_b) = connect(&state, "user-b");

        handle_message(
            &state,
            &a.session_id,
            ClientMessage::CreateLobby {
                settings: LobbySettings::default(),
            },
        );

        let lobby_id = created_lobby_id(&drain(&mut rx_a));

        handle_message(&state, &b.session_id, ClientMessage::JoinLobby { lobby_id });
        drain(&mut rx_a);
        drain(&mut rx_b);

        on_socket_closed(&state, &a.session_id, a.epoch);

        // Past the grace of four turn timeouts the session is destroyed and
        // the lobby moves on without it.
        tokio::time::sleep(Duration::from_secs(121)).await;

        assert!(!state.sessions.exists(&a.session_id));

        let messages = drain(&mut rx_b);

        assert!(messages
            .iter()
            .any(|message| matches!(message, ServerMessage::PlayerLeft { player_id } if *player_id == a.session_id)));
        assert!(messages.iter().any(|message| matches!(
            message,
            ServerMessage::LobbyUpdated { lobby } if lobby.host == b.session_id
        )));

        // The returning user is a fresh session, no longer in the lobby.
        let (fresh, mut rx_fresh) = connect(&state, "user-a");

        assert_ne!(fresh.session_id, a.session_id);
        assert!(fresh.lobby.is_none());
        assert!(matches!(
            drain(&mut rx_fresh).as_slice(),
            [ServerMessage::Connected { .. }]
        ));
    }

    #[tokio::test]
    async fn a_leaving_host_hands_the_lobby_over() {
        let state = test_state();
        let (a, mut rx_a) = connect(&state, "user-a");
        let (b, mut rx_b) = connect(&state, "user-b");

        handle_message(
            &state,
            &a.session_id,
            ClientMessage::CreateLobby {
                settings: LobbySettings::default(),
            },
        );

        let lobby_id = created_lobby_id(&drain(&mut rx_a));

        handle_message(&state, &b.session_id, ClientMessage::JoinLobby { lobby_id });
        handle_message(&state, &a.session_id, ClientMessage::LeaveLobby);

        let messages = drain(&mut rx_b);

        assert!(messages.iter().any(|message| matches!(
            message,
            ServerMessage::LobbyUpdated { lobby } if lobby.host == b.session_id && lobby.players.len() == 1
        )));

        // The ex-host is free to open a new lobby at once.
        drain(&mut rx_a);
        handle_message(
            &state,
            &a.session_id,
            ClientMessage::CreateLobby {
                settings: LobbySettings::default(),
            },
        );

        assert!(matches!(
            drain(&mut rx_a).as_slice(),
            [ServerMessage::LobbyCreated { .. }]
        ));

        // And once the last member leaves, the lobby is gone.
        handle_message(&state, &b.session_id, ClientMessage::LeaveLobby);

        assert!(state.lobbies.get(lobby_id).is_none());
    }
}
