use serde::{Deserialize, Serialize};

use crate::card::Character;

/// The seven base actions. Targeted variants carry the target's seat index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Income,
    ForeignAid,
    Coup(usize),
    Tax,
    Assassinate(usize),
    Steal(usize),
    Exchange,
}

impl Action {
    pub fn target(&self) -> Option<usize> {
        match self {
            Action::Coup(target) | Action::Assassinate(target) | Action::Steal(target) => {
                Some(*target)
            }
            _ => None,
        }
    }

    /// Coins paid up front, before any challenge is resolved.
    pub fn cost(&self) -> u32 {
        match self {
            Action::Coup(_) => 7,
            Action::Assassinate(_) => 3,
            _ => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Income => "Income",
            Action::ForeignAid => "Foreign Aid",
            Action::Coup(_) => "Coup",
            Action::Tax => "Tax",
            Action::Assassinate(_) => "Assassinate",
            Action::Steal(_) => "Steal",
            Action::Exchange => "Exchange",
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Coup(target) => write!(f, "Coup on player {target}"),
            Action::Assassinate(target) => write!(f, "Assassinate player {target}"),
            Action::Steal(target) => write!(f, "Steal from player {target}"),
            other => f.write_str(other.name()),
        }
    }
}

/// A live assertion that a player holds a particular card, made either by
/// taking an action or by declaring a block against one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Claim {
    Action(Action),
    /// `character` is what the blocker says they hold; `action` is what the
    /// block would cancel.
    Block { character: Character, action: Action },
}

impl Claim {
    pub fn is_block(&self) -> bool {
        matches!(self, Claim::Block { .. })
    }
}

/// What a responder may say about a live claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Allow,
    Challenge,
    Block(Character),
}

/// Coarse response categories used for per-stage whitelists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    Allow,
    Challenge,
    Block,
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Allow => ResponseKind::Allow,
            Response::Challenge => ResponseKind::Challenge,
            Response::Block(_) => ResponseKind::Block,
        }
    }
}

/// Choice offered to a challenged claimant: prove the claim by revealing the
/// card, or back down without showing anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeDecision {
    Proceed,
    Retreat,
}

/// Choice offered to an assassin whose target claims Contessa.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssassinationConfirmation {
    ChallengeContessa,
    AcceptBlock,
}
