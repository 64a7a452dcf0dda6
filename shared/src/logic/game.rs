use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    score_round, trick_winner, Card, LobbySettings, PlayerRoundResult, Round, RoundResult,
    SessionId, Suit,
};

/// An identifier for a game, shared by the client and the server.
pub type GameId = u16;

/// The deck holds 52 cards; a round of `k` cards per player is only dealt
/// while `k * players` fits.
pub const DECK_SIZE: usize = 52;

/// Phase of a [`Game`]'s state machine.
#[derive(PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Copy, Clone)]
pub enum GamePhase {
    /// Players are placing bids in order.
    Bidding,
    /// Players are playing out tricks.
    Playing,
    /// Scores are applied; the last trick's winner may start the next round.
    RoundComplete,
    /// Terminal phase, no further actions are accepted.
    GameComplete,
}

/// The number of tricks a player predicts they will win.
#[derive(PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Copy, Clone)]
pub struct Bid {
    /// Predicted trick count, between 0 and the round's card count.
    pub tricks: u8,
}

/// An action a player may take on their turn.
#[derive(PartialEq, Eq, Hash, Debug, Serialize, Deserialize, Copy, Clone)]
pub enum Action {
    /// Play the given card from hand.
    PlayCard(Card),
    /// Predict a number of tricks.
    Bid(Bid),
}

/// Errors concerning a [`Game`] action.
///
/// An erroneous action never mutates game state and is reported only to the
/// offending session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    /// Another player is to act.
    #[error("Not your turn")]
    NotYourTurn,
    /// The played card is not in the player's hand.
    #[error("Card is not in your hand")]
    IllegalCard,
    /// The player holds lead-suit cards and must play one.
    #[error("Must follow suit")]
    MustFollowSuit,
    /// The bid is out of range or would make the bid sum equal the trick
    /// count.
    #[error("Invalid bid")]
    InvalidBid,
    /// The action is not available in the current phase.
    #[error("Wrong phase")]
    WrongPhase,
    /// The session is not seated in this game.
    #[error("Not seated in this game")]
    NotSeated,
}

/// An observable consequence of a successful game action.
///
/// The server turns these into wire messages: `Action`, `TrickComplete` and
/// `GameOver` broadcast to the whole seating, `Dealt` and `RoundComplete` fan
/// out fresh per-seat state snapshots, and `Turn` notifies one player and
/// arms the turn deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A player bid or played a card.
    Action {
        /// The acting player.
        player_id: SessionId,
        /// What they did.
        action: Action,
        /// The player to act next, when the action directly hands the turn
        /// over.
        next_player: Option<SessionId>,
    },
    /// A trick was resolved to a winner.
    TrickComplete {
        /// The player who took the trick and leads the next one.
        winner: SessionId,
    },
    /// A new round was dealt.
    Dealt,
    /// The round finished and score deltas were applied.
    RoundComplete,
    /// The named player is to act.
    Turn {
        /// The player whose turn it is.
        player_id: SessionId,
    },
    /// The game reached its terminal phase.
    GameOver {
        /// Final cumulative scores.
        final_scores: BTreeMap<SessionId, i32>,
    },
}

/// A complete game of German Bridge for three or four players.
///
/// Seating is fixed at creation and immutable for the lifetime of the game;
/// players are addressed by their session ID. All mutation goes through
/// [`Game::submit_bid`], [`Game::play_card`] and [`Game::start_next_round`],
/// each of which either returns the events to publish or an error that left
/// the state untouched.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Game {
    game_id: GameId,
    seating: Vec<SessionId>,
    round: Round,
    round_number: u32,
    total_scores: BTreeMap<SessionId, i32>,
    history: Vec<RoundResult>,
    phase: GamePhase,
    current_player_index: usize,
    settings: LobbySettings,
}

impl Game {
    /// Creates a game for the given seating and deals the first round of one
    /// card per player, with seat 0 as dealer.
    pub fn new(
        game_id: GameId,
        seating: Vec<SessionId>,
        settings: LobbySettings,
        rng: &mut impl Rng,
    ) -> Game {
        let round = Round::deal(&seating, 1, 0, rng);
        let first_bidder = round.first_bidder_index;

        Game {
            game_id,
            total_scores: seating.iter().map(|id| (id.clone(), 0)).collect(),
            round,
            round_number: 1,
            history: Vec::new(),
            phase: GamePhase::Bidding,
            current_player_index: first_bidder,
            seating,
            settings,
        }
    }

    /// The game's identifier.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// The fixed seating order.
    pub fn seating(&self) -> &[SessionId] {
        &self.seating
    }

    /// The settings inherited from the lobby.
    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    /// The current phase.
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    /// The current round number, which is also the cards dealt per player.
    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    /// The session whose turn it is. In `RoundComplete` this is the winner
    /// of the last trick, the only session allowed to start the next round.
    pub fn current_player(&self) -> &SessionId {
        &self.seating[self.current_player_index]
    }

    /// Cumulative scores over all completed rounds.
    pub fn total_scores(&self) -> &BTreeMap<SessionId, i32> {
        &self.total_scores
    }

    /// Whether the session is seated in this game.
    pub fn is_seated(&self, session_id: &SessionId) -> bool {
        self.seating.contains(session_id)
    }

    /// Places a bid for the current player.
    pub fn submit_bid(
        &mut self,
        session_id: &SessionId,
        tricks: u8,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_seated(session_id)?;

        if self.phase != GamePhase::Bidding {
            return Err(GameError::WrongPhase);
        }

        if session_id != self.current_player() {
            return Err(GameError::NotYourTurn);
        }

        if !self.legal_bids().contains(&tricks) {
            return Err(GameError::InvalidBid);
        }

        self.round.bids.insert(session_id.clone(), tricks);

        let players = self.seating.len();

        let next_index = if self.round.bids.len() == players {
            self.phase = GamePhase::Playing;
            self.round.first_bidder_index
        } else {
            (self.current_player_index + 1) % players
        };

        self.current_player_index = next_index;
        let next = self.seating[next_index].clone();

        Ok(vec![
            GameEvent::Action {
                player_id: session_id.clone(),
                action: Action::Bid(Bid { tricks }),
                next_player: Some(next.clone()),
            },
            GameEvent::Turn { player_id: next },
        ])
    }

    /// Plays a card from the current player's hand, resolving the trick and
    /// the round when they complete.
    pub fn play_card(
        &mut self,
        session_id: &SessionId,
        card: Card,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_seated(session_id)?;

        if self.phase != GamePhase::Playing {
            return Err(GameError::WrongPhase);
        }

        if session_id != self.current_player() {
            return Err(GameError::NotYourTurn);
        }

        let hand = self
            .round
            .hands
            .get(session_id)
            .ok_or(GameError::NotSeated)?;

        if !hand.contains(&card) {
            return Err(GameError::IllegalCard);
        }

        if let Some(lead_suit) = self.round.lead_suit {
            let holds_lead = hand.iter().any(|held| held.suit == lead_suit);

            if holds_lead && card.suit != lead_suit {
                return Err(GameError::MustFollowSuit);
            }
        }

        let hand = self
            .round
            .hands
            .get_mut(session_id)
            .ok_or(GameError::NotSeated)?;
        hand.retain(|held| *held != card);

        if self.round.current_trick.is_empty() {
            self.round.lead_suit = Some(card.suit);
        }

        self.round.current_trick.push((session_id.clone(), card));

        let players = self.seating.len();
        let action = Action::PlayCard(card);

        if self.round.current_trick.len() < players {
            let next_index = (self.current_player_index + 1) % players;
            self.current_player_index = next_index;
            let next = self.seating[next_index].clone();

            return Ok(vec![
                GameEvent::Action {
                    player_id: session_id.clone(),
                    action,
                    next_player: Some(next.clone()),
                },
                GameEvent::Turn { player_id: next },
            ]);
        }

        // Trick complete: resolve it and hand the lead to the winner.
        let lead_suit = self.round.lead_suit.expect("a full trick has a lead suit");
        let winner = trick_winner(&self.round.current_trick, lead_suit, self.round.trump_suit);

        *self.round.tricks_won.entry(winner.clone()).or_insert(0) += 1;
        self.round.tricks_played += 1;
        self.round.current_trick.clear();
        self.round.lead_suit = None;

        self.current_player_index = self
            .seating
            .iter()
            .position(|id| *id == winner)
            .expect("trick winner is seated");

        let mut events = vec![
            GameEvent::Action {
                player_id: session_id.clone(),
                action,
                next_player: None,
            },
            GameEvent::TrickComplete {
                winner: winner.clone(),
            },
        ];

        if self.round.tricks_played == self.round.cards_per_player {
            self.complete_round();
            events.push(GameEvent::RoundComplete);
        } else {
            events.push(GameEvent::Turn { player_id: winner });
        }

        Ok(events)
    }

    /// Deals the next round, or completes the game when the deck cannot
    /// cover another deal. Only the winner of the last trick may call this,
    /// and only in `RoundComplete`.
    pub fn start_next_round(
        &mut self,
        session_id: &SessionId,
        rng: &mut impl Rng,
    ) -> Result<Vec<GameEvent>, GameError> {
        self.ensure_seated(session_id)?;

        if self.phase != GamePhase::RoundComplete {
            return Err(GameError::WrongPhase);
        }

        if session_id != self.current_player() {
            return Err(GameError::NotYourTurn);
        }

        let players = self.seating.len();
        let next_round = self.round_number + 1;

        if next_round as usize * players > DECK_SIZE {
            self.phase = GamePhase::GameComplete;

            return Ok(vec![GameEvent::GameOver {
                final_scores: self.total_scores.clone(),
            }]);
        }

        let dealer_index = (next_round as usize - 1) % players;

        self.round_number = next_round;
        self.round = Round::deal(&self.seating, next_round as u8, dealer_index, rng);
        self.phase = GamePhase::Bidding;
        self.current_player_index = self.round.first_bidder_index;

        let first_bidder = self.current_player().clone();

        Ok(vec![
            GameEvent::Dealt,
            GameEvent::Turn {
                player_id: first_bidder,
            },
        ])
    }

    /// The actions the given session may legally take right now; empty for
    /// everyone but the current player, and empty outside `Bidding` and
    /// `Playing`.
    pub fn valid_actions(&self, session_id: &SessionId) -> Vec<Action> {
        if session_id != self.current_player() {
            return Vec::new();
        }

        match self.phase {
            GamePhase::Bidding => self
                .legal_bids()
                .into_iter()
                .map(|tricks| Action::Bid(Bid { tricks }))
                .collect(),
            GamePhase::Playing => self
                .legal_cards(session_id)
                .into_iter()
                .map(Action::PlayCard)
                .collect(),
            GamePhase::RoundComplete | GamePhase::GameComplete => Vec::new(),
        }
    }

    /// The deterministic action taken on the current player's behalf when
    /// their turn deadline fires: the lowest legal bid, or the lowest-rank
    /// legal card with suits breaking ties Clubs first.
    pub fn default_action(&self) -> Option<Action> {
        match self.phase {
            GamePhase::Bidding => {
                let legal = self.legal_bids();

                if legal.contains(&0) {
                    Some(Action::Bid(Bid { tricks: 0 }))
                } else {
                    legal.first().map(|&tricks| Action::Bid(Bid { tricks }))
                }
            }
            GamePhase::Playing => self
                .legal_cards(self.current_player())
                .into_iter()
                .min_by_key(|card| (card.rank, card.suit))
                .map(Action::PlayCard),
            GamePhase::RoundComplete | GamePhase::GameComplete => None,
        }
    }

    /// Renders the game as seen by one session: their own hand, the public
    /// table state, and whether they are to act.
    pub fn view_for(&self, session_id: &SessionId) -> GameStateView {
        GameStateView {
            game_id: self.game_id,
            phase: self.phase,
            your_hand: self
                .round
                .hands
                .get(session_id)
                .cloned()
                .unwrap_or_default(),
            current_trick: self.round.current_trick.clone(),
            scores: self.total_scores.clone(),
            history: self.history.clone(),
            round_number: self.round_number,
            trump_suit: self.round.trump_suit,
            current_player: self.current_player().clone(),
            your_turn: self.phase != GamePhase::GameComplete && session_id == self.current_player(),
        }
    }

    /// The bids the current player may place: `0..=k`, minus the value that
    /// would make the bid sum equal the trick count when the dealer bids
    /// last.
    fn legal_bids(&self) -> Vec<u8> {
        let cards = self.round.cards_per_player;
        let last_bidder = self.round.bids.len() == self.seating.len() - 1;
        let placed = self.round.bid_total();

        (0..=cards)
            .filter(|&tricks| !(last_bidder && placed + tricks == cards))
            .collect()
    }

    /// The cards the given player may play under the follow-suit rule.
    fn legal_cards(&self, session_id: &SessionId) -> Vec<Card> {
        let Some(hand) = self.round.hands.get(session_id) else {
            return Vec::new();
        };

        if let Some(lead_suit) = self.round.lead_suit {
            if hand.iter().any(|card| card.suit == lead_suit) {
                return hand
                    .iter()
                    .filter(|card| card.suit == lead_suit)
                    .copied()
                    .collect();
            }
        }

        hand.clone()
    }

    fn ensure_seated(&self, session_id: &SessionId) -> Result<(), GameError> {
        if self.is_seated(session_id) {
            Ok(())
        } else {
            Err(GameError::NotSeated)
        }
    }

    /// Applies score deltas, appends the round to the history and enters
    /// `RoundComplete`. The current player is left at the last trick's
    /// winner, who alone may start the next round.
    fn complete_round(&mut self) {
        let mut players = BTreeMap::new();

        for id in &self.seating {
            let bid = self.round.bids.get(id).copied().unwrap_or(0);
            let tricks_won = self.round.tricks_won.get(id).copied().unwrap_or(0);
            let score_delta = score_round(bid, tricks_won);

            *self.total_scores.entry(id.clone()).or_insert(0) += score_delta;

            players.insert(
                id.clone(),
                PlayerRoundResult {
                    bid,
                    tricks_won,
                    score_delta,
                },
            );
        }

        self.history.push(RoundResult {
            round_number: self.round_number,
            players,
        });

        self.phase = GamePhase::RoundComplete;
    }
}

/// A game snapshot as rendered for a single session.
///
/// Only the recipient's own hand is included; other players' hands never
/// leave the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameStateView {
    /// The game's identifier.
    pub game_id: GameId,
    /// The current phase.
    pub phase: GamePhase,
    /// The recipient's remaining hand.
    pub your_hand: Vec<Card>,
    /// Cards on the table in play order.
    pub current_trick: Vec<(SessionId, Card)>,
    /// Cumulative scores.
    pub scores: BTreeMap<SessionId, i32>,
    /// Results of completed rounds.
    pub history: Vec<RoundResult>,
    /// The round in progress.
    pub round_number: u32,
    /// The trump suit for this round, if any.
    pub trump_suit: Option<Suit>,
    /// The session whose turn it is.
    pub current_player: SessionId,
    /// Whether the recipient is to act.
    pub your_turn: bool,
}
