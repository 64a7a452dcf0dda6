use std::cmp::Ordering;

use crate::{Card, Suit};

/// Compares two cards within a trick, given the lead suit and an optional
/// trump suit.
///
/// A trump beats any non-trump; a lead-suit card beats any card that is
/// neither trump nor of the lead suit; within a suit, higher rank wins. Two
/// cards that are neither trump nor of the lead suit cannot win the trick, so
/// their relative order never decides a winner.
pub fn compare_in_trick(a: Card, b: Card, lead_suit: Suit, trump_suit: Option<Suit>) -> Ordering {
    let class = |card: Card| {
        if trump_suit == Some(card.suit) {
            2
        } else if card.suit == lead_suit {
            1
        } else {
            0
        }
    };

    class(a).cmp(&class(b)).then(a.rank.cmp(&b.rank))
}

/// Resolves a completed trick to its winning player.
///
/// Every card is unique, so the maximum under [`compare_in_trick`] is
/// unambiguous as long as at least one card follows the lead suit, which the
/// lead card itself always does.
pub fn trick_winner<P: Clone>(
    plays: &[(P, Card)],
    lead_suit: Suit,
    trump_suit: Option<Suit>,
) -> P {
    let (winner, _) = plays
        .iter()
        .max_by(|(_, a), (_, b)| compare_in_trick(*a, *b, lead_suit, trump_suit))
        .expect("a trick holds at least one card");

    winner.clone()
}

/// Scores a single player's round: `10 + bid²` for an exact bid, otherwise
/// the negated square of the miss.
pub fn score_round(bid: u8, tricks_won: u8) -> i32 {
    if bid == tricks_won {
        10 + (bid as i32) * (bid as i32)
    } else {
        let miss = tricks_won as i32 - bid as i32;
        -(miss * miss)
    }
}
