//! AI orchestration: while a phase holds decisions that belong to AI seats,
//! query the decision oracle for exactly one of them at a time, in seating
//! order, and push each answer through the same transitions a human answer
//! takes. A failed or late oracle degrades to the safe default, so the state
//! machine can never stall on it.

use tokio::time::timeout;

use crate::action::{
    Action, AssassinationConfirmation, ChallengeDecision, Claim, Response, ResponseKind,
};
use crate::card::Character;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::logger::GameEvent;
use crate::oracle::{ActionContext, Oracle, ResponseContext};
use crate::rules;
use crate::state::{
    AssassinationConfirmationState, ChallengeDecisionState, ChallengePhase, ExchangeState,
    GameState, Pending, PublicPlayer,
};

/// Hold-order preference when an AI must pick cards to keep or to give up.
/// Stronger claims come first.
const KEEP_PRIORITY: [Character; 5] = [
    Character::Duke,
    Character::Contessa,
    Character::Captain,
    Character::Assassin,
    Character::Ambassador,
];

fn keep_rank(character: Character) -> usize {
    KEEP_PRIORITY
        .iter()
        .position(|&c| c == character)
        .unwrap_or(KEEP_PRIORITY.len())
}

/// Pool indices an AI keeps during an exchange: the strongest cards, ties
/// broken by pool order.
pub(crate) fn exchange_keep_indices(pool: &[Character], keep: usize) -> Vec<usize> {
    let mut ranked: Vec<usize> = (0..pool.len()).collect();
    ranked.sort_by_key(|&i| (keep_rank(pool[i]), i));
    let mut kept: Vec<usize> = ranked.into_iter().take(keep).collect();
    kept.sort_unstable();
    kept
}

/// The card an AI prefers to lose: the weakest one still face down.
pub(crate) fn reveal_preference(hand: &[Character]) -> Option<Character> {
    hand.iter().copied().max_by_key(|&c| keep_rank(c))
}

fn opponent_views(state: &GameState, player: usize) -> Vec<PublicPlayer> {
    state
        .public_view()
        .players
        .into_iter()
        .filter(|p| p.id != player)
        .collect()
}

/// One AI-owned decision lifted out of the pending phase.
enum AiStep {
    Respond(usize, ChallengePhase),
    Decide(ChallengeDecisionState),
    Confirm(AssassinationConfirmationState),
    Exchange(ExchangeState),
    Reveal(usize),
}

impl<O: Oracle> Engine<O> {
    /// Runs one full AI turn. The host calls this after observing
    /// `needs_human_trigger_for_ai`; the engine never chains AI turns on its
    /// own, so the host stays in control of pacing.
    pub async fn handle_ai_action(&mut self, state: &GameState) -> GameState {
        match self.try_handle_ai_action(state).await {
            Ok(next) => next,
            Err(err) => self.recover(state, err),
        }
    }

    async fn try_handle_ai_action(&mut self, state: &GameState) -> Result<GameState> {
        let mut next = state.clone();
        let current = next.current_player_idx;
        if next.winner.is_some() {
            return Ok(self.reject(next, current, "the game is over"));
        }
        if next.pending.is_some() {
            // an open phase may still hold AI-owned decisions; finish those
            return self.drive_ai(next).await;
        }
        if !next.players[current].is_ai {
            return Ok(self.reject(next, current, "the current player is not AI-controlled"));
        }
        next.needs_human_trigger_for_ai = false;

        let legal = self.legal_actions(&next, current);
        let ctx = self.action_context(&next, current);
        let choice = match timeout(self.config.oracle_timeout, self.oracle.select_action(&ctx)).await
        {
            Ok(Ok(choice)) => Some(choice),
            Ok(Err(err)) => {
                self.logger.emit(GameEvent::OracleFailed {
                    player: current,
                    reason: err.to_string(),
                });
                None
            }
            Err(_) => {
                self.logger.emit(GameEvent::OracleFailed {
                    player: current,
                    reason: String::from("timed out"),
                });
                None
            }
        };

        let action = match choice {
            Some(choice) if legal.contains(&choice.action) => {
                if !choice.reasoning.is_empty() {
                    let name = next.player_name(current).to_string();
                    next.push_log(format!("{name} reasons: {}", choice.reasoning));
                }
                choice.action
            }
            Some(choice) => {
                self.logger.emit(GameEvent::ValidationRejected {
                    player: current,
                    reason: format!(
                        "the oracle chose the illegal {:?}; falling back",
                        choice.action
                    ),
                });
                self.fallback_action(&legal)?
            }
            None => self.fallback_action(&legal)?,
        };
        self.try_perform_action(&next, current, action).await
    }

    /// Income unless the forced coup rules it out.
    fn fallback_action(&self, legal: &[Action]) -> Result<Action> {
        if legal.contains(&Action::Income) {
            return Ok(Action::Income);
        }
        legal
            .first()
            .copied()
            .ok_or_else(|| EngineError::CorruptPhase("no legal action for the AI seat".into()))
    }

    /// Settles every AI-owned decision in the open phase, one at a time,
    /// until the snapshot waits on a human or on the turn handoff.
    pub(crate) async fn drive_ai(&mut self, mut state: GameState) -> Result<GameState> {
        loop {
            if state.winner.is_some() {
                return Ok(state);
            }
            let step: Option<AiStep> = match &state.pending {
                Some(Pending::ChallengeOrBlock(phase)) => phase
                    .awaiting
                    .iter()
                    .copied()
                    .find(|&p| state.players[p].is_ai)
                    .map(|responder| AiStep::Respond(responder, phase.clone())),
                Some(Pending::ChallengeDecision(cd)) if state.players[cd.challenged].is_ai => {
                    Some(AiStep::Decide(cd.clone()))
                }
                Some(Pending::AssassinationConfirmation(ac))
                    if state.players[ac.assassin].is_ai =>
                {
                    Some(AiStep::Confirm(*ac))
                }
                Some(Pending::Exchange(ex)) if state.players[ex.player].is_ai => {
                    Some(AiStep::Exchange(ex.clone()))
                }
                Some(Pending::Reveal(rv)) if state.players[rv.player].is_ai => {
                    Some(AiStep::Reveal(rv.player))
                }
                _ => None,
            };
            let Some(step) = step else {
                return Ok(state);
            };

            state = match step {
                AiStep::Respond(responder, phase) => {
                    let response = self.ai_response(&state, responder, &phase).await;
                    self.apply_response(state, responder, response)?
                }
                AiStep::Decide(cd) => {
                    // prove what can be proven, retreat from what cannot
                    let decision = match rules::required_card_for(&cd.claim) {
                        Some(card) if state.players[cd.challenged].holds(card) => {
                            ChallengeDecision::Proceed
                        }
                        _ => ChallengeDecision::Retreat,
                    };
                    self.apply_challenge_decision(state, decision)?
                }
                AiStep::Confirm(ac) => {
                    let confirmation = self.ai_confirmation(&state, ac).await;
                    self.apply_assassination_confirmation(state, confirmation)?
                }
                AiStep::Exchange(ex) => {
                    let kept = exchange_keep_indices(&ex.pool, ex.keep);
                    self.apply_exchange_selection(state, &kept)?
                }
                AiStep::Reveal(player) => {
                    let hand: Vec<Character> = state.players[player]
                        .unrevealed()
                        .map(|c| c.character)
                        .collect();
                    let (next, _) = self.apply_force_reveal(state, reveal_preference(&hand))?;
                    next
                }
            };
        }
    }

    /// Combines the oracle's two independent recommendations with fixed
    /// priority Challenge > Block > Allow, discarding anything the stage's
    /// whitelist or the block entitlement rules out.
    async fn ai_response(
        &self,
        state: &GameState,
        responder: usize,
        phase: &ChallengePhase,
    ) -> Response {
        let ctx =
            self.claim_response_context(state, responder, phase.claimant, &phase.claim, &phase.valid);

        if phase.valid.contains(&ResponseKind::Challenge) {
            match timeout(
                self.config.oracle_timeout,
                self.oracle.challenge_reasoning(&ctx),
            )
            .await
            {
                Ok(Ok(advice)) if advice.should_challenge => return Response::Challenge,
                Ok(Ok(_)) => {}
                Ok(Err(err)) => self.logger.emit(GameEvent::OracleFailed {
                    player: responder,
                    reason: err.to_string(),
                }),
                Err(_) => self.logger.emit(GameEvent::OracleFailed {
                    player: responder,
                    reason: String::from("timed out"),
                }),
            }
        }

        if phase.valid.contains(&ResponseKind::Block) {
            if let Claim::Action(action) = &phase.claim {
                if rules::may_block(action, responder) {
                    match timeout(self.config.oracle_timeout, self.oracle.block_reasoning(&ctx))
                        .await
                    {
                        Ok(Ok(advice)) if advice.should_block => {
                            // claim a card actually held when possible
                            let options = rules::block_characters_for(action);
                            let held = options
                                .iter()
                                .copied()
                                .find(|&c| state.players[responder].holds(c));
                            if let Some(character) = held.or_else(|| options.first().copied()) {
                                return Response::Block(character);
                            }
                        }
                        Ok(Ok(_)) => {}
                        Ok(Err(err)) => self.logger.emit(GameEvent::OracleFailed {
                            player: responder,
                            reason: err.to_string(),
                        }),
                        Err(_) => self.logger.emit(GameEvent::OracleFailed {
                            player: responder,
                            reason: String::from("timed out"),
                        }),
                    }
                }
            }
        }

        Response::Allow
    }

    /// Whether an AI assassin doubts the Contessa. Failure accepts the
    /// block, the cheaper mistake.
    async fn ai_confirmation(
        &self,
        state: &GameState,
        ac: AssassinationConfirmationState,
    ) -> AssassinationConfirmation {
        let claim = Claim::Block {
            character: Character::Contessa,
            action: Action::Assassinate(ac.target),
        };
        let valid = [ResponseKind::Allow, ResponseKind::Challenge];
        let ctx = self.claim_response_context(state, ac.assassin, ac.blocker, &claim, &valid);
        match timeout(
            self.config.oracle_timeout,
            self.oracle.challenge_reasoning(&ctx),
        )
        .await
        {
            Ok(Ok(advice)) if advice.should_challenge => {
                AssassinationConfirmation::ChallengeContessa
            }
            Ok(Ok(_)) => AssassinationConfirmation::AcceptBlock,
            Ok(Err(err)) => {
                self.logger.emit(GameEvent::OracleFailed {
                    player: ac.assassin,
                    reason: err.to_string(),
                });
                AssassinationConfirmation::AcceptBlock
            }
            Err(_) => {
                self.logger.emit(GameEvent::OracleFailed {
                    player: ac.assassin,
                    reason: String::from("timed out"),
                });
                AssassinationConfirmation::AcceptBlock
            }
        }
    }

    fn action_context(&self, state: &GameState, player: usize) -> ActionContext {
        ActionContext {
            player,
            hand: state.players[player]
                .unrevealed()
                .map(|c| c.character)
                .collect(),
            money: state.players[player].money,
            opponents: opponent_views(state, player),
            legal_actions: self.legal_actions(state, player),
            summary: state.summary_json(),
        }
    }

    fn claim_response_context(
        &self,
        state: &GameState,
        responder: usize,
        claimant: usize,
        claim: &Claim,
        valid: &[ResponseKind],
    ) -> ResponseContext {
        ResponseContext {
            responder,
            hand: state.players[responder]
                .unrevealed()
                .map(|c| c.character)
                .collect(),
            money: state.players[responder].money,
            claimant,
            claim: claim.clone(),
            valid: valid.to_vec(),
            opponents: opponent_views(state, responder),
            summary: state.summary_json(),
        }
    }
}
