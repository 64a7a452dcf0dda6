use itertools::Itertools;
use rand::{seq::SliceRandom, Rng};

use crate::{Card, Rank, Suit};

/// A shuffled ordered sequence of all 52 cards, rebuilt once per round.
///
/// The shuffle is a uniform Fisher–Yates permutation driven by the caller's
/// RNG; the server passes a cryptographically-seeded generator, tests pass a
/// seeded one for reproducible deals.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    /// Builds a full deck and shuffles it with the given RNG.
    pub fn shuffled(rng: &mut impl Rng) -> Deck {
        let mut cards: Vec<Card> = Suit::ALL
            .iter()
            .cartesian_product(Rank::ALL.iter())
            .map(|(&suit, &rank)| Card::new(suit, rank))
            .collect();

        cards.shuffle(rng);

        Deck { cards }
    }

    /// Deals `cards_per_player` cards to each of `players` hands in rotation,
    /// returning the hands and the undealt remainder.
    ///
    /// Hand `0` receives the first card off the deck; the caller maps hand
    /// indices onto seats starting left of the dealer. The first card of the
    /// remainder determines the trump suit.
    pub fn deal(&self, players: usize, cards_per_player: usize) -> (Vec<Vec<Card>>, &[Card]) {
        let dealt = players * cards_per_player;
        assert!(dealt <= self.cards.len(), "cannot deal more cards than the deck holds");

        let mut hands = vec![Vec::with_capacity(cards_per_player); players];

        for (index, &card) in self.cards[..dealt].iter().enumerate() {
            hands[index % players].push(card);
        }

        (hands, &self.cards[dealt..])
    }

    /// The number of cards remaining in the deck.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the deck is empty.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
