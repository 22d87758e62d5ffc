//! Surprise (chance) deck: a shuffled sequence drawn one card at a time and reshuffled
//! once exhausted.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::board::Money;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChanceEffect {
    /// Positive amounts are paid by the bank, negative ones are owed to it.
    Money { amount: Money },
    /// Relative move; the landing tile is resolved as if the player had rolled there.
    Move { delta: i32 },
    GoToJail,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChanceCard {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub effect: ChanceEffect,
}

impl ChanceCard {
    fn new(id: &str, text: &str, effect: ChanceEffect) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            effect,
        }
    }
}

/// The seven base cards.
pub fn base_cards() -> Vec<ChanceCard> {
    vec![
        ChanceCard::new(
            "gain50",
            "Side hustle paid off. Collect $50.",
            ChanceEffect::Money { amount: 50 },
        ),
        ChanceCard::new(
            "gain150",
            "Angel investor backs you. Collect $150.",
            ChanceEffect::Money { amount: 150 },
        ),
        ChanceCard::new(
            "lose50",
            "Unexpected bill. Pay $50.",
            ChanceEffect::Money { amount: -50 },
        ),
        ChanceCard::new(
            "lose150",
            "Luxury vacation ran long. Pay $150.",
            ChanceEffect::Money { amount: -150 },
        ),
        ChanceCard::new(
            "fwd3",
            "Fast-track success. Move forward 3 tiles.",
            ChanceEffect::Move { delta: 3 },
        ),
        ChanceCard::new(
            "back3",
            "Market correction. Move back 3 tiles.",
            ChanceEffect::Move { delta: -3 },
        ),
        ChanceCard::new(
            "gotoJail",
            "Audit hits. Go directly to Jail.",
            ChanceEffect::GoToJail,
        ),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChanceDeck {
    cards: Vec<ChanceCard>,
    cursor: usize,
}

impl ChanceDeck {
    pub fn shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_cards(base_cards(), rng)
    }

    pub fn from_cards<R: Rng + ?Sized>(mut cards: Vec<ChanceCard>, rng: &mut R) -> Self {
        cards.shuffle(rng);
        Self { cards, cursor: 0 }
    }

    /// Deck with a fixed order, drawn front to back. Reshuffles still randomize.
    pub fn ordered(cards: Vec<ChanceCard>) -> Self {
        Self { cards, cursor: 0 }
    }

    /// Draw the next card, reshuffling first when the deck has been used up.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<ChanceCard> {
        if self.cards.is_empty() {
            return None;
        }
        if self.cursor >= self.cards.len() {
            self.cards.shuffle(rng);
            self.cursor = 0;
        }
        let card = self.cards.get(self.cursor).cloned();
        self.cursor += 1;
        card
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.cursor)
    }
}
