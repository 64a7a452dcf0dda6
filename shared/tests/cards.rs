use std::cmp::Ordering;
use std::collections::HashSet;

use rand_chacha::{rand_core::SeedableRng, ChaCha8Rng};
use shared::{compare_in_trick, score_round, trick_winner, Card, Deck, Rank, Suit};

#[test]
fn deck_holds_every_card_once() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let deck = Deck::shuffled(&mut rng);

    let (hands, remainder) = deck.deal(4, 13);

    assert!(remainder.is_empty());

    let unique: HashSet<Card> = hands.iter().flatten().copied().collect();

    assert_eq!(unique.len(), 52);
}

#[test]
fn deal_rotates_and_leaves_a_remainder() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let deck = Deck::shuffled(&mut rng);

    let (hands, remainder) = deck.deal(3, 17);

    assert_eq!(hands.len(), 3);
    assert!(hands.iter().all(|hand| hand.len() == 17));
    assert_eq!(remainder.len(), 1);
}

#[test]
fn same_seed_same_shuffle() {
    let mut first = ChaCha8Rng::seed_from_u64(99);
    let mut second = ChaCha8Rng::seed_from_u64(99);

    let (hands_a, _) = Deck::shuffled(&mut first).deal(4, 13);
    let (hands_b, _) = Deck::shuffled(&mut second).deal(4, 13);

    assert_eq!(hands_a, hands_b);
}

#[test]
fn trump_beats_lead_and_rank() {
    // Trump Diamonds, lead Hearts: the two of diamonds takes the trick over
    // both hearts and a side ace.
    let plays = [
        ("p1", Card::new(Suit::Hearts, Rank::King)),
        ("p2", Card::new(Suit::Hearts, Rank::Ace)),
        ("p3", Card::new(Suit::Diamonds, Rank::Two)),
        ("p4", Card::new(Suit::Clubs, Rank::Ace)),
    ];

    assert_eq!(
        trick_winner(&plays, Suit::Hearts, Some(Suit::Diamonds)),
        "p3"
    );
}

#[test]
fn lead_suit_beats_offsuit() {
    let plays = [
        ("p1", Card::new(Suit::Spades, Rank::Three)),
        ("p2", Card::new(Suit::Clubs, Rank::Ace)),
        ("p3", Card::new(Suit::Hearts, Rank::King)),
    ];

    assert_eq!(trick_winner(&plays, Suit::Spades, None), "p1");
}

#[test]
fn highest_of_lead_wins_without_trump() {
    let plays = [
        ("p1", Card::new(Suit::Hearts, Rank::Five)),
        ("p2", Card::new(Suit::Hearts, Rank::Jack)),
        ("p3", Card::new(Suit::Hearts, Rank::Seven)),
        ("p4", Card::new(Suit::Hearts, Rank::Ace)),
    ];

    assert_eq!(trick_winner(&plays, Suit::Hearts, Some(Suit::Spades)), "p4");
}

#[test]
fn highest_trump_wins_among_trumps() {
    let plays = [
        ("p1", Card::new(Suit::Hearts, Rank::Ace)),
        ("p2", Card::new(Suit::Spades, Rank::Two)),
        ("p3", Card::new(Suit::Spades, Rank::Nine)),
    ];

    assert_eq!(trick_winner(&plays, Suit::Hearts, Some(Suit::Spades)), "p3");
}

#[test]
fn comparison_orders_by_class_then_rank() {
    const CASES: [(Card, Card, Ordering); 4] = [
        (
            Card {
                suit: Suit::Diamonds,
                rank: Rank::Two,
            },
            Card {
                suit: Suit::Hearts,
                rank: Rank::Ace,
            },
            Ordering::Greater,
        ),
        (
            Card {
                suit: Suit::Hearts,
                rank: Rank::Queen,
            },
            Card {
                suit: Suit::Clubs,
                rank: Rank::Ace,
            },
            Ordering::Greater,
        ),
        (
            Card {
                suit: Suit::Hearts,
                rank: Rank::Four,
            },
            Card {
                suit: Suit::Hearts,
                rank: Rank::Ten,
            },
            Ordering::Less,
        ),
        (
            Card {
                suit: Suit::Diamonds,
                rank: Rank::King,
            },
            Card {
                suit: Suit::Diamonds,
                rank: Rank::Six,
            },
            Ordering::Greater,
        ),
    ];

    for (a, b, expected) in CASES {
        assert_eq!(
            compare_in_trick(a, b, Suit::Hearts, Some(Suit::Diamonds)),
            expected,
            "{a} vs {b}"
        );
    }
}

#[test]
fn scoring_rewards_exact_bids_and_squares_misses() {
    const CASES: [(u8, u8, i32); 8] = [
        (0, 0, 10),
        (1, 1, 11),
        (2, 2, 14),
        (3, 3, 19),
        (5, 5, 35),
        (1, 0, -1),
        (0, 2, -4),
        (4, 1, -9),
    ];

    for (bid, won, expected) in CASES {
        assert_eq!(score_round(bid, won), expected, "bid {bid}, won {won}");
    }
}
