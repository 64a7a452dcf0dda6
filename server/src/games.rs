//! The game manager and the turn scheduler.
//!
//! Every game lives behind its own lock; all mutation, and every outbound
//! message caused by it, happens while that lock is held, so each recipient
//! observes one linear history per game. The turn scheduler keeps a single
//! pending deadline per game: arming bumps the game's epoch counter and a
//! firing deadline re-checks the counter under the lock, so a deadline that
//! lost the race against a real action degrades to a no-op.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::{
    Action, Card, Game, GameError, GameEvent, GameId, GamePhase, LobbySettings, ServerMessage,
    SessionId,
};

use crate::dispatch;
use crate::lobbies::generate_entity_id;
use crate::AppState;

/// Completed games linger to answer trailing state requests from
/// reconnectors before they are dropped.
pub const COMPLETED_GAME_LINGER: Duration = Duration::from_secs(60);

/// A game plus its pending-deadline epoch.
pub struct GameSession {
    pub game: Game,
    /// Bumped by every armed deadline and every legal action; a deadline
    /// only fires if the value it was armed with is still current.
    turn_epoch: u64,
}

/// What a client (or the scheduler) asked a game to do.
#[derive(Debug, Clone)]
pub enum ActionRequest {
    Bid(u8),
    Play(Card),
    NextRound,
}

pub struct GameManager {
    games: Mutex<HashMap<GameId, Arc<Mutex<GameSession>>>>,
}

impl GameManager {
    pub fn new() -> GameManager {
        GameManager {
            games: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a game for the given seating, dealing the first round.
    pub fn create(
        &self,
        seating: Vec<SessionId>,
        settings: LobbySettings,
    ) -> (GameId, Arc<Mutex<GameSession>>) {
        let mut games = self.games.lock().expect("game map lock");

        let game_id = loop {
            let candidate = generate_entity_id();

            if !games.contains_key(&candidate) {
                break candidate;
            }
        };

        let game = Game::new(game_id, seating, settings, &mut rand::thread_rng());
        let entry = Arc::new(Mutex::new(GameSession {
            game,
            turn_epoch: 0,
        }));

        games.insert(game_id, entry.clone());

        (game_id, entry)
    }

    pub fn get(&self, game_id: GameId) -> Option<Arc<Mutex<GameSession>>> {
        self.games
            .lock()
            .expect("game map lock")
            .get(&game_id)
            .cloned()
    }

    pub fn remove(&self, game_id: GameId) {
        self.games.lock().expect("game map lock").remove(&game_id);
    }

    pub fn active_count(&self) -> usize {
        let games = self.games.lock().expect("game map lock");

        games
            .values()
            .filter(|entry| {
                entry.lock().expect("game lock").game.phase() != GamePhase::GameComplete
            })
            .count()
    }
}

/// Applies a player action to a game and publishes its consequences.
///
/// On error nothing changed and nothing was sent; the caller reports the
/// error to the offender alone.
pub fn apply_action(
    state: &AppState,
    game_id: GameId,
    entry: &Arc<Mutex<GameSession>>,
    session_id: &SessionId,
    request: ActionRequest,
) -> Result<(), GameError> {
    let mut session = entry.lock().expect("game lock");

    apply_locked(state, game_id, entry, &mut session, session_id, request)
}

/// Publishes the fan-out for a fresh game: per-seat snapshots and the first
/// bidder's turn. Called with the seating already notified of
/// `GameStarting`.
pub fn publish_deal(state: &AppState, game_id: GameId, entry: &Arc<Mutex<GameSession>>) {
    let mut session = entry.lock().expect("game lock");

    let events = vec![
        GameEvent::Dealt,
        GameEvent::Turn {
            player_id: session.game.current_player().clone(),
        },
    ];

    publish_events(state, game_id, entry, &mut session, &events);
}

fn apply_locked(
    state: &AppState,
    game_id: GameId,
    entry: &Arc<Mutex<GameSession>>,
    session: &mut GameSession,
    session_id: &SessionId,
    request: ActionRequest,
) -> Result<(), GameError> {
    let events = match request {
        ActionRequest::Bid(tricks) => session.game.submit_bid(session_id, tricks)?,
        ActionRequest::Play(card) => session.game.play_card(session_id, card)?,
        ActionRequest::NextRound => session
            .game
            .start_next_round(session_id, &mut rand::thread_rng())?,
    };

    // A legal action always cancels the pending deadline.
    session.turn_epoch += 1;

    publish_events(state, game_id, entry, session, &events);

    Ok(())
}

/// Turns game events into wire messages, all enqueued under the game lock.
fn publish_events(
    state: &AppState,
    game_id: GameId,
    entry: &Arc<Mutex<GameSession>>,
    session: &mut GameSession,
    events: &[GameEvent],
) {
    let seating: Vec<SessionId> = session.game.seating().to_vec();

    for event in events {
        match event {
            GameEvent::Action {
                player_id,
                action,
                next_player,
            } => {
                let message = ServerMessage::PlayerAction {
                    player_id: player_id.clone(),
                    action: *action,
                    next_player: next_player.clone(),
                };

                for seat in &seating {
                    dispatch::deliver(state, seat, &message);
                }
            }
            GameEvent::TrickComplete { winner } => {
                let message = ServerMessage::TrickComplete {
                    winner: winner.clone(),
                };

                for seat in &seating {
                    dispatch::deliver(state, seat, &message);
                }
            }
            GameEvent::Dealt | GameEvent::RoundComplete => {
                for seat in &seating {
                    let message = ServerMessage::GameState {
                        state: session.game.view_for(seat),
                    };

                    dispatch::deliver(state, seat, &message);
                }

                state.snapshots.record_game(&session.game);
            }
            GameEvent::Turn { player_id } => {
                let message = ServerMessage::YourTurn {
                    valid_actions: session.game.valid_actions(player_id),
                };

                dispatch::deliver(state, player_id, &message);
                arm_deadline(state, game_id, entry, session);
            }
            GameEvent::GameOver { final_scores } => {
                let message = ServerMessage::GameOver {
                    final_scores: final_scores.clone(),
                };

                for seat in &seating {
                    dispatch::deliver(state, seat, &message);
                }

                state.snapshots.record_game(&session.game);
                linger_and_drop(state, game_id, seating.clone());
            }
        }
    }
}

/// Arms the single pending deadline for the current turn.
fn arm_deadline(
    state: &AppState,
    game_id: GameId,
    entry: &Arc<Mutex<GameSession>>,
    session: &mut GameSession,
) {
    session.turn_epoch += 1;

    let armed_epoch = session.turn_epoch;
    let timeout = Duration::from_secs(session.game.settings().turn_timeout_secs);
    let state = state.clone();
    let entry = entry.clone();

    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;

        let mut session = entry.lock().expect("game lock");

        if session.turn_epoch != armed_epoch {
            return;
        }

        // The deadline fires whether or not the player is connected; an
        // absent player keeps being played for until their grace expires.
        let Some(action) = session.game.default_action() else {
            return;
        };

        let player = session.game.current_player().clone();
        let request = match action {
            Action::Bid(bid) => ActionRequest::Bid(bid.tricks),
            Action::PlayCard(card) => ActionRequest::Play(card),
        };

        tracing::info!(game = game_id, player = %player, ?request, "turn deadline fired, acting for player");

        if let Err(err) = apply_locked(&state, game_id, &entry, &mut session, &player, request) {
            tracing::error!(game = game_id, %err, "scheduled action was rejected");
        }
    });
}

/// Keeps a completed game around briefly for trailing state requests, then
/// drops it and releases its seats.
fn linger_and_drop(state: &AppState, game_id: GameId, seating: Vec<SessionId>) {
    let state = state.clone();

    tokio::spawn(async move {
        tokio::time::sleep(COMPLETED_GAME_LINGER).await;

        state.games.remove(game_id);

        for seat in seating {
            if let Some((_, Some(current))) = state.sessions.contexts(&seat) {
                if current == game_id {
                    state.sessions.set_game(&seat, None);
                }
            }
        }

        tracing::debug!(game = game_id, "completed game dropped");
    });
}
