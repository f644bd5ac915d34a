//! The game snapshot and its phase bookkeeping. Every engine operation takes
//! a snapshot and returns a new one; nothing here mutates caller state.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::action::{Action, Claim, ResponseKind};
use crate::card::{Character, Deck};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfluenceCard {
    pub character: Character,
    pub revealed: bool,
}

impl InfluenceCard {
    pub fn hidden(character: Character) -> Self {
        InfluenceCard {
            character,
            revealed: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: usize,
    pub name: String,
    pub is_ai: bool,
    pub money: u32,
    pub influence: Vec<InfluenceCard>,
}

impl Player {
    /// A player is out of the game once every influence card is face up.
    /// Eliminated players keep their seat and their revealed cards.
    pub fn is_out(&self) -> bool {
        self.influence.iter().all(|card| card.revealed)
    }

    pub fn unrevealed(&self) -> impl Iterator<Item = &InfluenceCard> {
        self.influence.iter().filter(|card| !card.revealed)
    }

    pub fn unrevealed_count(&self) -> usize {
        self.unrevealed().count()
    }

    pub fn holds(&self, character: Character) -> bool {
        self.unrevealed().any(|card| card.character == character)
    }

    /// Index of the first unrevealed card matching `preferred`, else the
    /// first unrevealed card in hand order.
    pub fn reveal_candidate(&self, preferred: Option<Character>) -> Option<usize> {
        if let Some(character) = preferred {
            if let Some(idx) = self
                .influence
                .iter()
                .position(|card| !card.revealed && card.character == character)
            {
                return Some(idx);
            }
        }
        self.influence.iter().position(|card| !card.revealed)
    }
}

/// The three responder stages of a live claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// The claim may be challenged, and blocked where the action admits a
    /// direct block.
    ChallengeAction,
    /// Only the designated target may block or allow.
    BlockDecision,
    /// The previously-silent responders may challenge the block claim.
    ChallengeBlock,
}

/// A block declared while the response window is still open. It only takes
/// effect once every responder has answered and nobody challenged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedBlock {
    pub blocker: usize,
    pub character: Character,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengePhase {
    pub stage: Stage,
    pub claimant: usize,
    pub claim: Claim,
    /// Eligible responders who have not yet answered, in seating order from
    /// the claimant's left.
    pub awaiting: Vec<usize>,
    /// Whitelist for the current stage; anything else is rejected.
    pub valid: Vec<ResponseKind>,
    /// The first block declared this stage, held until collection closes; a
    /// challenge arriving later still outranks it.
    pub block: Option<RecordedBlock>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeDecisionState {
    pub challenged: usize,
    pub challenger: usize,
    pub claim: Claim,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeState {
    pub player: usize,
    /// Drawn cards plus the player's former unrevealed cards. The hand holds
    /// only revealed cards until the selection lands.
    pub pool: Vec<Character>,
    /// How many cards must be kept; equals the unrevealed count before the
    /// exchange began.
    pub keep: usize,
}

/// Continuation applied once an interrupting reveal has resolved. Each
/// variant carries only what its resumption needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resumption {
    /// The claim survived; the original action picks back up.
    ActionProceeds { actor: usize, action: Action },
    /// The block was proven; the original action is cancelled.
    BlockSucceeds,
    /// The block was disproven; the original action resumes with no further
    /// solicitation.
    BlockFailsActionProceeds { actor: usize, action: Action },
    /// The claim failed outright; the turn moves on.
    ActionFailsTurnAdvances,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealState {
    pub player: usize,
    /// `None` means nothing follows the reveal but the turn advancing.
    pub resume: Option<Resumption>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssassinationConfirmationState {
    pub assassin: usize,
    pub blocker: usize,
    pub target: usize,
}

/// The single pending phase. Being an enum, at most one phase can ever be
/// live in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pending {
    ChallengeOrBlock(ChallengePhase),
    ChallengeDecision(ChallengeDecisionState),
    AssassinationConfirmation(AssassinationConfirmationState),
    Exchange(ExchangeState),
    Reveal(RevealState),
}

/// Provenance record for the action whose resolution is in flight. May
/// coexist with the pending phase it spawned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionClaim {
    pub actor: usize,
    pub action: Action,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub players: Vec<Player>,
    pub deck: Deck,
    pub treasury: u32,
    pub current_player_idx: usize,
    pub action_log: VecDeque<String>,
    pub log_capacity: usize,
    pub winner: Option<usize>,
    /// Set when the next move belongs to an AI seat; the host observes this
    /// and calls `handle_ai_action`. The engine never runs AI turns on its
    /// own.
    pub needs_human_trigger_for_ai: bool,
    pub current_action: Option<ActionClaim>,
    pub pending: Option<Pending>,
}

impl GameState {
    pub fn push_log(&mut self, entry: impl Into<String>) {
        if self.action_log.len() >= self.log_capacity {
            self.action_log.pop_front();
        }
        self.action_log.push_back(entry.into());
    }

    pub fn player(&self, idx: usize) -> Option<&Player> {
        self.players.get(idx)
    }

    pub fn player_name(&self, idx: usize) -> &str {
        self.players.get(idx).map(|p| p.name.as_str()).unwrap_or("?")
    }

    /// Living opponents of `exclude_idx`, in seating order from their left.
    pub fn other_living_players(&self, exclude_idx: usize) -> Vec<usize> {
        (1..self.players.len())
            .map(|n| (exclude_idx + n) % self.players.len())
            .filter(|&idx| !self.players[idx].is_out())
            .collect()
    }

    pub fn living_count(&self) -> usize {
        self.players.iter().filter(|p| !p.is_out()).count()
    }

    /// The sole player with unrevealed influence, if the game is down to one.
    pub fn sole_survivor(&self) -> Option<usize> {
        let mut living = self
            .players
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_out());
        match (living.next(), living.next()) {
            (Some((idx, _)), None) => Some(idx),
            _ => None,
        }
    }

    /// Cards currently outside both hands and deck (a live exchange pool).
    pub fn pooled_card_count(&self) -> usize {
        match &self.pending {
            Some(Pending::Exchange(exchange)) => exchange.pool.len(),
            _ => 0,
        }
    }

    /// Everything an outside observer may see, used as the oracle's textual
    /// snapshot.
    pub fn public_view(&self) -> PublicState {
        PublicState {
            players: self
                .players
                .iter()
                .map(|p| PublicPlayer {
                    id: p.id,
                    name: p.name.clone(),
                    is_ai: p.is_ai,
                    money: p.money,
                    unrevealed: p.unrevealed_count(),
                    revealed: p
                        .influence
                        .iter()
                        .filter(|c| c.revealed)
                        .map(|c| c.character)
                        .collect(),
                })
                .collect(),
            deck_size: self.deck.len(),
            treasury: self.treasury,
            current_player_idx: self.current_player_idx,
            winner: self.winner,
            recent_log: self.action_log.iter().rev().take(10).rev().cloned().collect(),
        }
    }

    pub fn summary_json(&self) -> String {
        serde_json::to_string_pretty(&self.public_view()).unwrap_or_else(|_| String::from("{}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub id: usize,
    pub name: String,
    pub is_ai: bool,
    pub money: u32,
    pub unrevealed: usize,
    pub revealed: Vec<Character>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicState {
    pub players: Vec<PublicPlayer>,
    pub deck_size: usize,
    pub treasury: u32,
    pub current_player_idx: usize,
    pub winner: Option<usize>,
    pub recent_log: Vec<String>,
}
