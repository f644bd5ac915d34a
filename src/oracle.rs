//! The decision oracle contract. The engine is agnostic about what sits
//! behind it: an LLM, a scripted heuristic, or a test stub. Oracle failures
//! never propagate; the engine substitutes a conservative default.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{Action, Claim, ResponseKind};
use crate::card::Character;
use crate::rules;
use crate::state::PublicPlayer;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle backend failed: {0}")]
    Backend(String),

    #[error("oracle returned no usable decision")]
    NoDecision,
}

/// Everything an oracle sees when choosing an action for its turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionContext {
    pub player: usize,
    /// The acting player's own unrevealed cards.
    pub hand: Vec<Character>,
    pub money: u32,
    pub opponents: Vec<PublicPlayer>,
    pub legal_actions: Vec<Action>,
    /// JSON rendering of the public game state.
    pub summary: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionChoice {
    pub action: Action,
    pub reasoning: String,
}

/// Everything an oracle sees when deciding how to respond to a live claim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseContext {
    pub responder: usize,
    pub hand: Vec<Character>,
    pub money: u32,
    pub claimant: usize,
    pub claim: Claim,
    pub valid: Vec<ResponseKind>,
    pub opponents: Vec<PublicPlayer>,
    pub summary: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeAdvice {
    pub should_challenge: bool,
    pub reasoning: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockAdvice {
    pub should_block: bool,
    pub reasoning: String,
}

/// External decision maker for AI seats. Each call must resolve within the
/// engine's configured timeout or it is treated as failed.
#[allow(async_fn_in_trait)]
pub trait Oracle {
    async fn select_action(&self, ctx: &ActionContext) -> Result<ActionChoice, OracleError>;

    async fn challenge_reasoning(
        &self,
        ctx: &ResponseContext,
    ) -> Result<ChallengeAdvice, OracleError>;

    async fn block_reasoning(&self, ctx: &ResponseContext) -> Result<BlockAdvice, OracleError>;
}

/// Deterministic rule-of-thumb player. Good enough to drive demo games to a
/// finish; not meant to play well.
#[derive(Debug, Default)]
pub struct HeuristicOracle;

impl HeuristicOracle {
    fn blocked_action(claim: &Claim) -> Option<&Action> {
        match claim {
            Claim::Action(action) => Some(action),
            Claim::Block { .. } => None,
        }
    }
}

impl Oracle for HeuristicOracle {
    async fn select_action(&self, ctx: &ActionContext) -> Result<ActionChoice, OracleError> {
        // take the kill when it cannot be contested
        if let Some(coup) = ctx
            .legal_actions
            .iter()
            .find(|a| matches!(a, Action::Coup(_)))
        {
            return Ok(ActionChoice {
                action: *coup,
                reasoning: String::from("coup is uncontestable"),
            });
        }

        // an assassination that gets blocked burns three coins, so only
        // spend when a follow-up coup stays within reach
        if ctx.hand.contains(&Character::Assassin) && ctx.money >= 6 {
            if let Some(hit) = ctx
                .legal_actions
                .iter()
                .find(|a| matches!(a, Action::Assassinate(_)))
            {
                return Ok(ActionChoice {
                    action: *hit,
                    reasoning: String::from("holding the assassin"),
                });
            }
        }

        if ctx.hand.contains(&Character::Duke) && ctx.legal_actions.contains(&Action::Tax) {
            return Ok(ActionChoice {
                action: Action::Tax,
                reasoning: String::from("holding the duke"),
            });
        }

        if ctx.legal_actions.contains(&Action::ForeignAid) {
            return Ok(ActionChoice {
                action: Action::ForeignAid,
                reasoning: String::from("building toward a coup"),
            });
        }

        ctx.legal_actions
            .first()
            .map(|&action| ActionChoice {
                action,
                reasoning: String::from("nothing better on offer"),
            })
            .ok_or(OracleError::NoDecision)
    }

    async fn challenge_reasoning(
        &self,
        ctx: &ResponseContext,
    ) -> Result<ChallengeAdvice, OracleError> {
        // holding two copies of the claimed card makes the claim a long shot
        let claimed = rules::required_card_for(&ctx.claim);
        let should_challenge = claimed
            .map(|c| ctx.hand.iter().filter(|&&h| h == c).count() >= 2)
            .unwrap_or(false);
        Ok(ChallengeAdvice {
            should_challenge,
            reasoning: if should_challenge {
                String::from("holding most copies of the claimed card")
            } else {
                String::from("no evidence against the claim")
            },
        })
    }

    async fn block_reasoning(&self, ctx: &ResponseContext) -> Result<BlockAdvice, OracleError> {
        // only block honestly
        let should_block = Self::blocked_action(&ctx.claim)
            .map(|action| {
                rules::block_characters_for(action)
                    .iter()
                    .any(|c| ctx.hand.contains(c))
            })
            .unwrap_or(false);
        Ok(BlockAdvice {
            should_block,
            reasoning: if should_block {
                String::from("holding a blocking card")
            } else {
                String::from("cannot block honestly")
            },
        })
    }
}

/// Queue-backed stub for tests and harnesses: answers are consumed in FIFO
/// order, and an empty queue falls back to the conservative default.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    actions: RefCell<VecDeque<Action>>,
    challenges: RefCell<VecDeque<bool>>,
    blocks: RefCell<VecDeque<bool>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_action(&self, action: Action) {
        self.actions.borrow_mut().push_back(action);
    }

    pub fn queue_challenge(&self, should_challenge: bool) {
        self.challenges.borrow_mut().push_back(should_challenge);
    }

    pub fn queue_block(&self, should_block: bool) {
        self.blocks.borrow_mut().push_back(should_block);
    }
}

impl Oracle for ScriptedOracle {
    async fn select_action(&self, _ctx: &ActionContext) -> Result<ActionChoice, OracleError> {
        let action = self
            .actions
            .borrow_mut()
            .pop_front()
            .unwrap_or(Action::Income);
        Ok(ActionChoice {
            action,
            reasoning: String::from("scripted"),
        })
    }

    async fn challenge_reasoning(
        &self,
        _ctx: &ResponseContext,
    ) -> Result<ChallengeAdvice, OracleError> {
        let should_challenge = self.challenges.borrow_mut().pop_front().unwrap_or(false);
        Ok(ChallengeAdvice {
            should_challenge,
            reasoning: String::from("scripted"),
        })
    }

    async fn block_reasoning(&self, _ctx: &ResponseContext) -> Result<BlockAdvice, OracleError> {
        let should_block = self.blocks.borrow_mut().pop_front().unwrap_or(false);
        Ok(BlockAdvice {
            should_block,
            reasoning: String::from("scripted"),
        })
    }
}
