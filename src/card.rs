use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Character {
    Duke,
    Assassin,
    Captain,
    Ambassador,
    Contessa,
}

pub static CHARACTER_VARIANTS: [Character; 5] = [
    Character::Duke,
    Character::Assassin,
    Character::Captain,
    Character::Ambassador,
    Character::Contessa,
];

/// Copies of each character in the court deck.
pub const COPIES_PER_CHARACTER: usize = 5;

impl std::fmt::Display for Character {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Character::Duke => "Duke",
            Character::Assassin => "Assassin",
            Character::Captain => "Captain",
            Character::Ambassador => "Ambassador",
            Character::Contessa => "Contessa",
        };
        f.write_str(name)
    }
}

/// The court deck: an ordered stack, top at index 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck(Vec<Character>);

impl Deck {
    /// Builds the full supply and shuffles it.
    pub fn standard<R: Rng + Sized>(rng: &mut R) -> Self {
        let mut cards: Vec<Character> = CHARACTER_VARIANTS
            .iter()
            .flat_map(|&card| std::iter::repeat(card).take(COPIES_PER_CHARACTER))
            .collect();
        cards.shuffle(rng);
        Deck(cards)
    }

    pub fn from_cards(cards: Vec<Character>) -> Self {
        Deck(cards)
    }

    /// Removes and returns the top card.
    pub fn draw(&mut self) -> Result<Character> {
        if self.0.is_empty() {
            return Err(EngineError::EmptyDeck);
        }
        Ok(self.0.remove(0))
    }

    /// Shuffles a card back into the court deck.
    pub fn return_and_reshuffle<R: Rng + Sized>(&mut self, card: Character, rng: &mut R) {
        self.0.push(card);
        self.0.shuffle(rng);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cards(&self) -> &[Character] {
        &self.0
    }
}
