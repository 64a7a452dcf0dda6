use std::collections::BTreeMap;

use itertools::Itertools;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Card, Deck, SessionId, Suit};

/// One deal's worth of state: hands, bids, tricks and the trick in flight.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Round {
    /// Cards dealt to every player this round; equals the round number.
    pub cards_per_player: u8,
    /// Seat index of the dealer, who bids last.
    pub dealer_index: usize,
    /// Seat index of the first bidder, left of the dealer.
    pub first_bidder_index: usize,
    /// The trump suit, taken from the first undealt card; `None` when the
    /// deal consumed all 52 cards.
    pub trump_suit: Option<Suit>,
    /// Remaining hand of each player.
    pub hands: BTreeMap<SessionId, Vec<Card>>,
    /// Bids placed so far, keyed by player.
    pub bids: BTreeMap<SessionId, u8>,
    /// Tricks won so far by each player.
    pub tricks_won: BTreeMap<SessionId, u8>,
    /// Cards played into the trick currently on the table.
    pub current_trick: Vec<(SessionId, Card)>,
    /// Suit of the first card in the current trick.
    pub lead_suit: Option<Suit>,
    /// Number of completed tricks.
    pub tricks_played: u8,
}

impl Round {
    /// Deals a fresh round of `cards_per_player` cards to the given seating,
    /// rotating from the seat left of the dealer.
    pub fn deal(
        seating: &[SessionId],
        cards_per_player: u8,
        dealer_index: usize,
        rng: &mut impl Rng,
    ) -> Round {
        let players = seating.len();
        let deck = Deck::shuffled(rng);
        let (dealt, remainder) = deck.deal(players, cards_per_player as usize);

        let mut hands = BTreeMap::new();

        for (rotation, hand) in dealt.into_iter().enumerate() {
            let seat = (dealer_index + 1 + rotation) % players;
            let sorted = hand
                .into_iter()
                .sorted_by_key(|card| (card.suit, card.rank))
                .collect();

            hands.insert(seating[seat].clone(), sorted);
        }

        Round {
            cards_per_player,
            dealer_index,
            first_bidder_index: (dealer_index + 1) % players,
            trump_suit: remainder.first().map(|card| card.suit),
            hands,
            bids: BTreeMap::new(),
            tricks_won: seating.iter().map(|id| (id.clone(), 0)).collect(),
            current_trick: Vec::with_capacity(players),
            lead_suit: None,
            tricks_played: 0,
        }
    }

    /// Sum of the bids placed so far.
    pub fn bid_total(&self) -> u8 {
        self.bids.values().sum()
    }
}

/// Per-player outcome of a completed round.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerRoundResult {
    /// The player's bid.
    pub bid: u8,
    /// Tricks the player actually won.
    pub tricks_won: u8,
    /// Score applied to the player's total.
    pub score_delta: i32,
}

/// Outcome of a completed round, kept in the game history.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoundResult {
    /// The round this result belongs to.
    pub round_number: u32,
    /// Each player's bid, tricks and score delta.
    pub players: BTreeMap<SessionId, PlayerRoundResult>,
}
