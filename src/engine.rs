//! The rules engine: action dispatch, the challenge/block state machine,
//! reveal and exchange resolution, and turn advancement.
//!
//! Every public entry point takes a state snapshot and returns the next one;
//! the input is never mutated. Suspension happens only at oracle calls, and
//! an internal failure never escapes: the facade degrades to a recovered
//! snapshot built from the last known-good one.

use std::collections::VecDeque;
use std::time::Duration;

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use crate::action::{
    Action, AssassinationConfirmation, ChallengeDecision, Claim, Response, ResponseKind,
};
use crate::card::{Character, Deck};
use crate::error::{EngineError, Result};
use crate::logger::{GameEvent, GameLogger, VerbosityLevel};
use crate::oracle::Oracle;
use crate::rules;
use crate::state::{
    ActionClaim, AssassinationConfirmationState, ChallengeDecisionState, ChallengePhase,
    ExchangeState, GameState, InfluenceCard, Pending, Player, RecordedBlock, Resumption,
    RevealState, Stage,
};

fn claim_name(claim: &Claim) -> &'static str {
    match claim {
        Claim::Action(action) => action.name(),
        Claim::Block { .. } => "block",
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// How long an oracle call may run before it is treated as failed.
    pub oracle_timeout: Duration,
    pub log_capacity: usize,
    pub starting_money: u32,
    pub treasury: u32,
    /// At this many coins a player may only Coup.
    pub must_coup_threshold: u32,
    pub max_players: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            oracle_timeout: Duration::from_secs(10),
            log_capacity: 100,
            starting_money: 2,
            treasury: 50,
            must_coup_threshold: 10,
            max_players: 6,
        }
    }
}

/// The engine owns the decision oracle, the RNG, and the event logger; game
/// state lives entirely in the snapshots it is handed.
pub struct Engine<O> {
    pub(crate) oracle: O,
    pub(crate) rng: Pcg64Mcg,
    pub(crate) config: EngineConfig,
    pub(crate) logger: GameLogger,
}

impl<O: Oracle> Engine<O> {
    pub fn new(oracle: O) -> Self {
        Self::with_config(oracle, EngineConfig::default())
    }

    pub fn with_config(oracle: O, config: EngineConfig) -> Self {
        Engine {
            oracle,
            rng: Pcg64Mcg::from_entropy(),
            config,
            logger: GameLogger::new(),
        }
    }

    /// Injects a seeded RNG so a whole match can be reproduced.
    pub fn with_rng(oracle: O, rng: Pcg64Mcg) -> Self {
        Engine {
            oracle,
            rng,
            config: EngineConfig::default(),
            logger: GameLogger::new(),
        }
    }

    pub fn logger(&self) -> &GameLogger {
        &self.logger
    }

    pub fn set_verbosity(&mut self, verbosity: VerbosityLevel) {
        self.logger.set_verbosity(verbosity);
    }

    // ------------------------------------------------------------------
    // public facade
    // ------------------------------------------------------------------

    /// Deals a fresh game. Human seats come first, AI seats after. The seat
    /// count is clamped to a playable 2..=max range rather than failing.
    pub async fn initialize_game(&mut self, player_names: &[&str], ai_count: usize) -> GameState {
        let mut names: Vec<(String, bool)> = player_names
            .iter()
            .map(|&n| (n.to_string(), false))
            .collect();
        for n in 0..ai_count {
            names.push((format!("AI {}", n + 1), true));
        }

        let mut clamped = false;
        while names.len() < 2 {
            names.push((format!("AI {}", names.len()), true));
            clamped = true;
        }
        if names.len() > self.config.max_players {
            names.truncate(self.config.max_players);
            clamped = true;
        }

        let mut deck = Deck::standard(&mut self.rng);
        let players: Vec<Player> = names
            .into_iter()
            .enumerate()
            .map(|(id, (name, is_ai))| Player {
                id,
                name,
                is_ai,
                money: self.config.starting_money,
                influence: vec![
                    InfluenceCard::hidden(deck.draw().expect("fresh deck covers every seat")),
                    InfluenceCard::hidden(deck.draw().expect("fresh deck covers every seat")),
                ],
            })
            .collect();

        let treasury = self
            .config
            .treasury
            .saturating_sub(self.config.starting_money * players.len() as u32);
        let first_is_ai = players[0].is_ai;
        let mut state = GameState {
            players,
            deck,
            treasury,
            current_player_idx: 0,
            action_log: VecDeque::new(),
            log_capacity: self.config.log_capacity,
            winner: None,
            needs_human_trigger_for_ai: first_is_ai,
            current_action: None,
            pending: None,
        };
        state.push_log(format!(
            "A new game begins with {} players",
            state.players.len()
        ));
        if clamped {
            state.push_log("The requested seat count was adjusted to a playable range");
        }
        state
    }

    pub async fn perform_action(
        &mut self,
        state: &GameState,
        player: usize,
        action: Action,
    ) -> GameState {
        match self.try_perform_action(state, player, action).await {
            Ok(next) => next,
            Err(err) => self.recover(state, err),
        }
    }

    pub async fn handle_player_response(
        &mut self,
        state: &GameState,
        player: usize,
        response: Response,
    ) -> GameState {
        match self.try_handle_response(state, player, response).await {
            Ok(next) => next,
            Err(err) => self.recover(state, err),
        }
    }

    pub async fn handle_challenge_decision(
        &mut self,
        state: &GameState,
        player: usize,
        decision: ChallengeDecision,
    ) -> GameState {
        match self.try_handle_challenge_decision(state, player, decision).await {
            Ok(next) => next,
            Err(err) => self.recover(state, err),
        }
    }

    pub async fn handle_assassination_confirmation(
        &mut self,
        state: &GameState,
        player: usize,
        confirmation: AssassinationConfirmation,
    ) -> GameState {
        match self
            .try_handle_assassination_confirmation(state, player, confirmation)
            .await
        {
            Ok(next) => next,
            Err(err) => self.recover(state, err),
        }
    }

    pub async fn handle_exchange_selection(
        &mut self,
        state: &GameState,
        player: usize,
        kept_indices: &[usize],
    ) -> GameState {
        match self
            .try_handle_exchange_selection(state, player, kept_indices)
            .await
        {
            Ok(next) => next,
            Err(err) => self.recover(state, err),
        }
    }

    /// Resolves the outstanding forced reveal for `player`, preferring a card
    /// of `card_type` when they hold one. Returns the revealed character
    /// alongside the next snapshot.
    pub async fn handle_force_reveal(
        &mut self,
        state: &GameState,
        player: usize,
        card_type: Option<Character>,
    ) -> (GameState, Option<Character>) {
        match self.try_handle_force_reveal(state, player, card_type).await {
            Ok(result) => result,
            Err(err) => (self.recover(state, err), None),
        }
    }

    // ------------------------------------------------------------------
    // action dispatch
    // ------------------------------------------------------------------

    pub(crate) async fn try_perform_action(
        &mut self,
        state: &GameState,
        player: usize,
        action: Action,
    ) -> Result<GameState> {
        let mut next = state.clone();

        if next.winner.is_some() {
            return Ok(self.reject(next, player, "the game is over"));
        }
        if next.player(player).is_none() {
            return Ok(self.reject(next, player, "unknown player"));
        }
        if player != next.current_player_idx {
            return Ok(self.reject(next, player, "it is not your turn"));
        }
        if next.pending.is_some() {
            return Ok(self.reject(next, player, "another decision is still pending"));
        }
        if next.players[player].is_out() {
            return Ok(self.reject(next, player, "eliminated players cannot act"));
        }

        let cost = action.cost();
        if next.players[player].money < cost {
            return Ok(self.reject(
                next,
                player,
                format!("{} costs {cost} coins", action.name()),
            ));
        }
        if next.players[player].money >= self.config.must_coup_threshold
            && !matches!(action, Action::Coup(_))
            && !next.other_living_players(player).is_empty()
        {
            return Ok(self.reject(
                next,
                player,
                format!(
                    "holding {} or more coins forces a Coup",
                    self.config.must_coup_threshold
                ),
            ));
        }
        if let Some(target) = action.target() {
            let target_ok = match next.player(target) {
                None => Some("no such target"),
                Some(_) if target == player => Some("you cannot target yourself"),
                Some(t) if t.is_out() => Some("the target is already eliminated"),
                Some(t) if matches!(action, Action::Steal(_)) && t.money == 0 => {
                    Some("the target has no coins to steal")
                }
                Some(_) => None,
            };
            if let Some(reason) = target_ok {
                return Ok(self.reject(next, player, reason));
            }
        }

        // costs are paid up front, before any challenge is heard
        next.players[player].money -= cost;
        next.treasury += cost;
        next.current_action = Some(ActionClaim {
            actor: player,
            action,
        });
        let actor_name = next.player_name(player).to_string();
        match action.target() {
            Some(target) => {
                let target_name = next.player_name(target).to_string();
                next.push_log(format!(
                    "{actor_name} declares {} against {target_name}",
                    action.name()
                ));
            }
            None => next.push_log(format!("{actor_name} declares {}", action.name())),
        }
        self.logger.emit(GameEvent::ActionTaken {
            actor: player,
            action,
        });

        let next = match action {
            // uncontestable; a coup victim still picks which card falls
            Action::Income | Action::Coup(_) => self.execute_action(next, player, action)?,
            _ => {
                let responders = next.other_living_players(player);
                if responders.is_empty() {
                    self.execute_action(next, player, action)?
                } else {
                    let claim = Claim::Action(action);
                    let mut valid = vec![ResponseKind::Allow];
                    if rules::is_challengeable(&claim) {
                        valid.push(ResponseKind::Challenge);
                    }
                    if rules::is_blockable(&action) {
                        valid.push(ResponseKind::Block);
                    }
                    next.pending = Some(Pending::ChallengeOrBlock(ChallengePhase {
                        stage: Stage::ChallengeAction,
                        claimant: player,
                        claim,
                        awaiting: responders,
                        valid,
                        block: None,
                    }));
                    next
                }
            }
        };

        self.drive_ai(next).await
    }

    /// The effect of an action once every objection has been cleared.
    pub(crate) fn execute_action(
        &mut self,
        mut next: GameState,
        actor: usize,
        action: Action,
    ) -> Result<GameState> {
        let actor_name = next.player_name(actor).to_string();
        match action {
            Action::Income => {
                let gain = next.treasury.min(1);
                next.treasury -= gain;
                next.players[actor].money += gain;
                self.advance_turn(next)
            }
            Action::ForeignAid => {
                let gain = next.treasury.min(2);
                next.treasury -= gain;
                next.players[actor].money += gain;
                next.push_log(format!("{actor_name} collects {gain} coins of foreign aid"));
                self.advance_turn(next)
            }
            Action::Tax => {
                let gain = next.treasury.min(3);
                next.treasury -= gain;
                next.players[actor].money += gain;
                next.push_log(format!("{actor_name} collects {gain} coins of tax"));
                self.advance_turn(next)
            }
            Action::Steal(target) => {
                let loot = next
                    .players
                    .get(target)
                    .map(|t| t.money.min(2))
                    .ok_or(EngineError::MissingPlayer(target))?;
                next.players[target].money -= loot;
                next.players[actor].money += loot;
                let target_name = next.player_name(target).to_string();
                next.push_log(format!(
                    "{actor_name} steals {loot} coins from {target_name}"
                ));
                self.advance_turn(next)
            }
            Action::Assassinate(target) => {
                if next
                    .players
                    .get(target)
                    .ok_or(EngineError::MissingPlayer(target))?
                    .is_out()
                {
                    // the target already fell earlier in this chain
                    next.push_log(format!("{actor_name}'s assassination finds nobody left"));
                    next.current_action = None;
                    self.advance_turn(next)
                } else {
                    let target_name = next.player_name(target).to_string();
                    next.push_log(format!(
                        "The assassination succeeds; {target_name} must reveal an influence"
                    ));
                    next.pending = Some(Pending::Reveal(RevealState {
                        player: target,
                        resume: None,
                    }));
                    Ok(next)
                }
            }
            Action::Coup(target) => {
                next.pending = Some(Pending::Reveal(RevealState {
                    player: target,
                    resume: None,
                }));
                Ok(next)
            }
            Action::Exchange => {
                let mut pool = Vec::with_capacity(4);
                for _ in 0..2 {
                    match next.deck.draw() {
                        Ok(card) => pool.push(card),
                        Err(EngineError::EmptyDeck) => {
                            next.push_log("The court deck ran short during the exchange");
                            break;
                        }
                        Err(err) => return Err(err),
                    }
                }
                // the hand keeps only revealed cards while the choice is open
                let player = &mut next.players[actor];
                let keep = player.unrevealed_count();
                let mut face_up = Vec::with_capacity(player.influence.len());
                for card in player.influence.drain(..) {
                    if card.revealed {
                        face_up.push(card);
                    } else {
                        pool.push(card.character);
                    }
                }
                player.influence = face_up;
                next.push_log(format!(
                    "{actor_name} draws from the court deck and considers {} cards",
                    pool.len()
                ));
                next.pending = Some(Pending::Exchange(ExchangeState {
                    player: actor,
                    pool,
                    keep,
                }));
                Ok(next)
            }
        }
    }

    // ------------------------------------------------------------------
    // challenge / block phase transitions
    // ------------------------------------------------------------------

    async fn try_handle_response(
        &mut self,
        state: &GameState,
        player: usize,
        response: Response,
    ) -> Result<GameState> {
        let next = state.clone();

        let phase = match &next.pending {
            Some(Pending::ChallengeOrBlock(phase)) => Some(phase.clone()),
            _ => None,
        };
        let Some(phase) = phase else {
            return Ok(self.reject(next, player, "no claim is awaiting responses"));
        };
        if next.player(player).is_none() {
            return Ok(self.reject(next, player, "unknown player"));
        }
        if !phase.awaiting.contains(&player) {
            return Ok(self.reject(
                next,
                player,
                "you are not eligible to respond, or already have",
            ));
        }
        if !phase.valid.contains(&response.kind()) {
            return Ok(self.reject(next, player, "that response is not valid at this stage"));
        }
        if let Response::Block(character) = response {
            let Claim::Action(action) = &phase.claim else {
                return Ok(self.reject(next, player, "a block cannot itself be blocked"));
            };
            if !rules::block_characters_for(action).contains(&character) {
                return Ok(self.reject(
                    next,
                    player,
                    format!("{character} does not block {}", action.name()),
                ));
            }
            if !rules::may_block(action, player) {
                return Ok(self.reject(next, player, "only the target may block this action"));
            }
        }

        let next = self.apply_response(next, player, response)?;
        self.drive_ai(next).await
    }

    /// Applies one validated response to the open phase. AI answers flow
    /// through here exactly like human ones.
    pub(crate) fn apply_response(
        &mut self,
        mut next: GameState,
        player: usize,
        response: Response,
    ) -> Result<GameState> {
        let Some(Pending::ChallengeOrBlock(mut phase)) = next.pending.take() else {
            return Err(EngineError::CorruptPhase(
                "response applied with no open claim".into(),
            ));
        };
        self.logger
            .emit(GameEvent::ResponseRecorded { player, response });
        let responder_name = next.player_name(player).to_string();
        let claimant_name = next.player_name(phase.claimant).to_string();

        match response {
            Response::Challenge => {
                // the first challenge ends collection and outranks any block
                // already on the table; nobody else gets one
                next.push_log(format!(
                    "{responder_name} challenges {claimant_name}'s claim"
                ));
                next.pending = Some(Pending::ChallengeDecision(ChallengeDecisionState {
                    challenged: phase.claimant,
                    challenger: player,
                    claim: phase.claim,
                }));
                Ok(next)
            }
            Response::Block(character) => {
                if phase.claim.is_block() {
                    return Err(EngineError::CorruptPhase(
                        "block raised against a block".into(),
                    ));
                }
                // recorded, but the window stays open: a later challenge of
                // the original claim still takes precedence
                if phase.block.is_none() {
                    next.push_log(format!(
                        "{responder_name} claims {character} to block the {}",
                        claim_name(&phase.claim)
                    ));
                    phase.block = Some(RecordedBlock {
                        blocker: player,
                        character,
                    });
                } else {
                    next.push_log(format!(
                        "{responder_name} would also block, but a block is already declared"
                    ));
                }
                phase.awaiting.retain(|&p| p != player);
                if phase.awaiting.is_empty() {
                    self.collection_complete(next, phase)
                } else {
                    next.pending = Some(Pending::ChallengeOrBlock(phase));
                    Ok(next)
                }
            }
            Response::Allow => {
                phase.awaiting.retain(|&p| p != player);
                if phase.awaiting.is_empty() {
                    self.collection_complete(next, phase)
                } else {
                    next.pending = Some(Pending::ChallengeOrBlock(phase));
                    Ok(next)
                }
            }
        }
    }

    /// Every eligible responder has answered and nobody challenged. A
    /// recorded block now becomes the live claim; otherwise the claim
    /// succeeds outright.
    fn collection_complete(
        &mut self,
        mut next: GameState,
        phase: ChallengePhase,
    ) -> Result<GameState> {
        if let Some(RecordedBlock { blocker, character }) = phase.block {
            let Claim::Action(action) = phase.claim else {
                return Err(EngineError::CorruptPhase(
                    "block recorded against a block".into(),
                ));
            };
            if let Action::Assassinate(target) = action {
                // the assassin alone decides whether to believe the Contessa
                next.pending = Some(Pending::AssassinationConfirmation(
                    AssassinationConfirmationState {
                        assassin: phase.claimant,
                        blocker,
                        target,
                    },
                ));
            } else {
                // the block becomes the live claim for everyone else
                next.pending = Some(Pending::ChallengeOrBlock(ChallengePhase {
                    stage: Stage::ChallengeBlock,
                    claimant: blocker,
                    claim: Claim::Block { character, action },
                    awaiting: next.other_living_players(blocker),
                    valid: vec![ResponseKind::Allow, ResponseKind::Challenge],
                    block: None,
                }));
            }
            return Ok(next);
        }
        self.claim_succeeds(next, phase)
    }

    /// Every eligible responder has allowed the claim (or none existed).
    fn claim_succeeds(&mut self, mut next: GameState, phase: ChallengePhase) -> Result<GameState> {
        match phase.claim {
            Claim::Action(action) => match (phase.stage, action) {
                (Stage::ChallengeAction, Action::Assassinate(target))
                | (Stage::ChallengeAction, Action::Steal(target)) => {
                    // the target alone now decides whether to block
                    next.pending = Some(Pending::ChallengeOrBlock(ChallengePhase {
                        stage: Stage::BlockDecision,
                        claimant: phase.claimant,
                        claim: Claim::Action(action),
                        awaiting: vec![target],
                        valid: vec![ResponseKind::Allow, ResponseKind::Block],
                        block: None,
                    }));
                    Ok(next)
                }
                _ => self.execute_action(next, phase.claimant, action),
            },
            Claim::Block { action, .. } => {
                next.push_log(format!(
                    "The block stands; the {} is cancelled",
                    action.name()
                ));
                next.current_action = None;
                self.advance_turn(next)
            }
        }
    }

    async fn try_handle_challenge_decision(
        &mut self,
        state: &GameState,
        player: usize,
        decision: ChallengeDecision,
    ) -> Result<GameState> {
        let next = state.clone();
        let valid = matches!(
            &next.pending,
            Some(Pending::ChallengeDecision(cd)) if cd.challenged == player
        );
        if !valid {
            return Ok(self.reject(next, player, "no challenge is awaiting your decision"));
        }
        let next = self.apply_challenge_decision(next, decision)?;
        self.drive_ai(next).await
    }

    pub(crate) fn apply_challenge_decision(
        &mut self,
        mut next: GameState,
        decision: ChallengeDecision,
    ) -> Result<GameState> {
        let Some(Pending::ChallengeDecision(cd)) = next.pending.take() else {
            return Err(EngineError::CorruptPhase(
                "challenge decision applied with none pending".into(),
            ));
        };
        let challenged_name = next.player_name(cd.challenged).to_string();

        match decision {
            ChallengeDecision::Proceed => {
                let required = rules::required_card_for(&cd.claim).ok_or_else(|| {
                    EngineError::CorruptPhase("an unchallengeable claim was challenged".into())
                })?;
                if next.players[cd.challenged].holds(required) {
                    // bluff disproved: show the card, shuffle it back, draw anew
                    self.swap_proven_card(&mut next, cd.challenged, required)?;
                    next.push_log(format!(
                        "{challenged_name} reveals the {required}, shuffles it back and draws a replacement; the challenge fails"
                    ));
                    self.logger.emit(GameEvent::ChallengeResolved {
                        challenged: cd.challenged,
                        challenger: cd.challenger,
                        proved: true,
                    });
                    let resume = match cd.claim {
                        Claim::Action(action) => Resumption::ActionProceeds {
                            actor: cd.challenged,
                            action,
                        },
                        Claim::Block { .. } => Resumption::BlockSucceeds,
                    };
                    next.pending = Some(Pending::Reveal(RevealState {
                        player: cd.challenger,
                        resume: Some(resume),
                    }));
                    Ok(next)
                } else {
                    next.push_log(format!(
                        "{challenged_name} cannot show the {required}; the challenge is upheld"
                    ));
                    self.logger.emit(GameEvent::ChallengeResolved {
                        challenged: cd.challenged,
                        challenger: cd.challenger,
                        proved: false,
                    });
                    let resume = self.claim_fails_resumption(&next, &cd.claim);
                    next.pending = Some(Pending::Reveal(RevealState {
                        player: cd.challenged,
                        resume: Some(resume),
                    }));
                    Ok(next)
                }
            }
            ChallengeDecision::Retreat => {
                // backing down costs nothing further, but any coins already
                // paid for the action stay spent
                next.push_log(format!("{challenged_name} retreats and withdraws the claim"));
                self.logger.emit(GameEvent::ChallengeResolved {
                    challenged: cd.challenged,
                    challenger: cd.challenger,
                    proved: false,
                });
                let resume = self.claim_fails_resumption(&next, &cd.claim);
                self.resume(next, resume)
            }
        }
    }

    fn claim_fails_resumption(&self, state: &GameState, claim: &Claim) -> Resumption {
        match claim {
            Claim::Action(_) => Resumption::ActionFailsTurnAdvances,
            Claim::Block { action, .. } => {
                let actor = state
                    .current_action
                    .map(|c| c.actor)
                    .unwrap_or(state.current_player_idx);
                Resumption::BlockFailsActionProceeds {
                    actor,
                    action: *action,
                }
            }
        }
    }

    /// Pulls the proven card out of the hand, shuffles it into the deck and
    /// deals a replacement into the same slot.
    fn swap_proven_card(
        &mut self,
        next: &mut GameState,
        player: usize,
        character: Character,
    ) -> Result<()> {
        let idx = next
            .players
            .get(player)
            .ok_or(EngineError::MissingPlayer(player))?
            .influence
            .iter()
            .position(|card| !card.revealed && card.character == character)
            .ok_or_else(|| {
                EngineError::CorruptPhase("proven card missing from the claimant's hand".into())
            })?;
        let card = next.players[player].influence.remove(idx);
        next.deck.return_and_reshuffle(card.character, &mut self.rng);
        let replacement = next.deck.draw()?;
        next.players[player]
            .influence
            .insert(idx, InfluenceCard::hidden(replacement));
        Ok(())
    }

    async fn try_handle_assassination_confirmation(
        &mut self,
        state: &GameState,
        player: usize,
        confirmation: AssassinationConfirmation,
    ) -> Result<GameState> {
        let next = state.clone();
        let valid = matches!(
            &next.pending,
            Some(Pending::AssassinationConfirmation(ac)) if ac.assassin == player
        );
        if !valid {
            return Ok(self.reject(next, player, "no block is awaiting your confirmation"));
        }
        let next = self.apply_assassination_confirmation(next, confirmation)?;
        self.drive_ai(next).await
    }

    pub(crate) fn apply_assassination_confirmation(
        &mut self,
        mut next: GameState,
        confirmation: AssassinationConfirmation,
    ) -> Result<GameState> {
        let Some(Pending::AssassinationConfirmation(ac)) = next.pending.take() else {
            return Err(EngineError::CorruptPhase(
                "assassination confirmation applied with none pending".into(),
            ));
        };
        let assassin_name = next.player_name(ac.assassin).to_string();
        match confirmation {
            AssassinationConfirmation::AcceptBlock => {
                next.push_log(format!(
                    "{assassin_name} accepts the block; the assassination is cancelled"
                ));
                next.current_action = None;
                self.advance_turn(next)
            }
            AssassinationConfirmation::ChallengeContessa => {
                next.push_log(format!("{assassin_name} challenges the Contessa"));
                next.pending = Some(Pending::ChallengeDecision(ChallengeDecisionState {
                    challenged: ac.blocker,
                    challenger: ac.assassin,
                    claim: Claim::Block {
                        character: Character::Contessa,
                        action: Action::Assassinate(ac.target),
                    },
                }));
                Ok(next)
            }
        }
    }

    // ------------------------------------------------------------------
    // exchange resolution
    // ------------------------------------------------------------------

    async fn try_handle_exchange_selection(
        &mut self,
        state: &GameState,
        player: usize,
        kept_indices: &[usize],
    ) -> Result<GameState> {
        let next = state.clone();
        let valid = matches!(
            &next.pending,
            Some(Pending::Exchange(ex)) if ex.player == player
        );
        if !valid {
            return Ok(self.reject(next, player, "no exchange is awaiting a selection"));
        }
        let next = self.apply_exchange_selection(next, kept_indices)?;
        self.drive_ai(next).await
    }

    pub(crate) fn apply_exchange_selection(
        &mut self,
        mut next: GameState,
        kept_indices: &[usize],
    ) -> Result<GameState> {
        let Some(Pending::Exchange(exchange)) = next.pending.take() else {
            return Err(EngineError::CorruptPhase(
                "exchange selection applied with none pending".into(),
            ));
        };

        let mut sorted = kept_indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let valid = kept_indices.len() == exchange.keep
            && sorted.len() == kept_indices.len()
            && sorted.iter().all(|&i| i < exchange.pool.len());
        if !valid {
            // leave the selection open for another try
            let player = exchange.player;
            let reason = format!(
                "the exchange selection must name {} distinct cards from the pool",
                exchange.keep
            );
            next.pending = Some(Pending::Exchange(exchange));
            return Ok(self.reject(next, player, reason));
        }

        let player = exchange.player;
        let mut hand: Vec<InfluenceCard> = kept_indices
            .iter()
            .map(|&i| InfluenceCard::hidden(exchange.pool[i]))
            .collect();
        hand.extend(next.players[player].influence.drain(..));
        next.players[player].influence = hand;
        for (idx, &character) in exchange.pool.iter().enumerate() {
            if !kept_indices.contains(&idx) {
                next.deck.return_and_reshuffle(character, &mut self.rng);
            }
        }
        let name = next.player_name(player).to_string();
        next.push_log(format!(
            "{name} finishes the exchange and returns the rest to the court deck"
        ));
        self.logger.emit(GameEvent::ExchangeCompleted {
            player,
            kept: exchange.keep,
        });
        next.current_action = None;
        self.advance_turn(next)
    }

    // ------------------------------------------------------------------
    // reveal resolution
    // ------------------------------------------------------------------

    async fn try_handle_force_reveal(
        &mut self,
        state: &GameState,
        player: usize,
        card_type: Option<Character>,
    ) -> Result<(GameState, Option<Character>)> {
        let next = state.clone();
        let valid = matches!(
            &next.pending,
            Some(Pending::Reveal(reveal)) if reveal.player == player
        );
        if !valid {
            return Ok((
                self.reject(next, player, "you have no influence reveal outstanding"),
                None,
            ));
        }
        let (next, revealed) = self.apply_force_reveal(next, card_type)?;
        let next = self.drive_ai(next).await?;
        Ok((next, revealed))
    }

    pub(crate) fn apply_force_reveal(
        &mut self,
        mut next: GameState,
        preferred: Option<Character>,
    ) -> Result<(GameState, Option<Character>)> {
        let Some(Pending::Reveal(reveal)) = next.pending.take() else {
            return Err(EngineError::CorruptPhase(
                "forced reveal applied with none pending".into(),
            ));
        };
        let (next, revealed) = self.reveal_influence(next, reveal.player, preferred)?;
        if next.winner.is_some() {
            return Ok((next, revealed));
        }
        let next = match reveal.resume {
            Some(resumption) => self.resume(next, resumption)?,
            None => {
                let mut next = next;
                next.current_action = None;
                self.advance_turn(next)?
            }
        };
        Ok((next, revealed))
    }

    /// Flips one unrevealed card face up, logging elimination and checking
    /// for a winner before anything else continues. Tolerates a player with
    /// nothing left to reveal.
    pub(crate) fn reveal_influence(
        &mut self,
        mut next: GameState,
        player: usize,
        preferred: Option<Character>,
    ) -> Result<(GameState, Option<Character>)> {
        if next.player(player).is_none() {
            return Err(EngineError::MissingPlayer(player));
        }
        let name = next.player_name(player).to_string();
        let Some(idx) = next.players[player].reveal_candidate(preferred) else {
            next.push_log(format!("{name} has no influence left to reveal"));
            self.logger.emit(GameEvent::InvariantViolation {
                detail: format!("reveal requested from player {player} with no unrevealed cards"),
            });
            return Ok((next, None));
        };

        next.players[player].influence[idx].revealed = true;
        let character = next.players[player].influence[idx].character;
        next.push_log(format!("{name} reveals a {character}"));
        self.logger.emit(GameEvent::CardRevealed { player, character });

        if next.players[player].is_out() {
            next.push_log(format!(
                "{name} has no influence left and is out of the game"
            ));
            self.logger.emit(GameEvent::PlayerEliminated { player });
        }

        // the winner check runs after every single reveal; a finished game
        // cuts the rest of the chain off
        if let Some(winner) = next.sole_survivor() {
            self.declare_winner(&mut next, winner);
        }
        Ok((next, Some(character)))
    }

    fn declare_winner(&self, next: &mut GameState, winner: usize) {
        next.winner = Some(winner);
        next.pending = None;
        next.current_action = None;
        next.needs_human_trigger_for_ai = false;
        let name = next.player_name(winner).to_string();
        next.push_log(format!("{name} wins the game"));
        self.logger.emit(GameEvent::GameOver { winner });
    }

    // ------------------------------------------------------------------
    // continuations and turn advancement
    // ------------------------------------------------------------------

    /// Picks a resolution chain back up after an interrupting reveal.
    pub(crate) fn resume(
        &mut self,
        mut next: GameState,
        resumption: Resumption,
    ) -> Result<GameState> {
        if next.winner.is_some() {
            return Ok(next);
        }
        match resumption {
            Resumption::ActionProceeds { actor, action } => match action {
                Action::Assassinate(target) | Action::Steal(target) => {
                    if next.players.get(target).map(|t| t.is_out()).unwrap_or(true) {
                        // the target fell while the challenge played out
                        next.push_log("The target is already out; nothing further happens");
                        next.current_action = None;
                        self.advance_turn(next)
                    } else {
                        next.pending = Some(Pending::ChallengeOrBlock(ChallengePhase {
                            stage: Stage::BlockDecision,
                            claimant: actor,
                            claim: Claim::Action(action),
                            awaiting: vec![target],
                            valid: vec![ResponseKind::Allow, ResponseKind::Block],
                            block: None,
                        }));
                        Ok(next)
                    }
                }
                _ => self.execute_action(next, actor, action),
            },
            Resumption::BlockSucceeds => {
                next.push_log("The block stands; the action is cancelled");
                next.current_action = None;
                self.advance_turn(next)
            }
            Resumption::BlockFailsActionProceeds { actor, action } => {
                // no re-solicitation: the original action just happens
                self.execute_action(next, actor, action)
            }
            Resumption::ActionFailsTurnAdvances => {
                next.current_action = None;
                self.advance_turn(next)
            }
        }
    }

    /// Moves play to the next seat with unrevealed influence. A pending
    /// reveal blocks advancement; a finished game short-circuits it.
    pub(crate) fn advance_turn(&mut self, mut next: GameState) -> Result<GameState> {
        if matches!(next.pending, Some(Pending::Reveal(_))) {
            return Ok(next);
        }
        if next.winner.is_some() {
            return Ok(next);
        }
        if let Some(winner) = next.sole_survivor() {
            self.declare_winner(&mut next, winner);
            return Ok(next);
        }

        next.pending = None;
        next.current_action = None;

        let mut idx = next.current_player_idx;
        let mut guard = 0usize;
        loop {
            idx = (idx + 1) % next.players.len();
            guard += 1;
            if guard > next.players.len() {
                return Err(EngineError::NoLivingPlayer);
            }
            if !next.players[idx].is_out() {
                break;
            }
        }
        next.current_player_idx = idx;
        next.needs_human_trigger_for_ai = next.players[idx].is_ai;
        Ok(next)
    }

    /// Legal moves for the seat whose turn it is, with the forced-Coup rule
    /// applied.
    pub fn legal_actions(&self, state: &GameState, player: usize) -> Vec<Action> {
        let mut actions = Vec::new();
        let Some(p) = state.player(player) else {
            return actions;
        };
        if state.winner.is_some() || p.is_out() {
            return actions;
        }
        let opponents = state.other_living_players(player);
        if p.money >= self.config.must_coup_threshold && !opponents.is_empty() {
            for &target in &opponents {
                actions.push(Action::Coup(target));
            }
            return actions;
        }
        actions.push(Action::Income);
        actions.push(Action::ForeignAid);
        actions.push(Action::Tax);
        actions.push(Action::Exchange);
        for &target in &opponents {
            if p.money >= 7 {
                actions.push(Action::Coup(target));
            }
            if p.money >= 3 {
                actions.push(Action::Assassinate(target));
            }
            if state.players[target].money > 0 {
                actions.push(Action::Steal(target));
            }
        }
        actions
    }

    // ------------------------------------------------------------------
    // failure tiers
    // ------------------------------------------------------------------

    /// A user-level rejection: the snapshot comes back unchanged apart from
    /// a log entry.
    pub(crate) fn reject(
        &self,
        mut next: GameState,
        player: usize,
        reason: impl Into<String>,
    ) -> GameState {
        let reason = reason.into();
        let name = next.player_name(player).to_string();
        next.push_log(format!("Rejected input from {name}: {reason}"));
        self.logger
            .emit(GameEvent::ValidationRejected { player, reason });
        next
    }

    /// An invariant violation: rebuild a playable snapshot from the last
    /// known-good one with every transient phase cleared.
    pub(crate) fn recover(&self, last_good: &GameState, err: EngineError) -> GameState {
        let mut next = last_good.clone();
        next.pending = None;
        next.current_action = None;
        next.needs_human_trigger_for_ai = false;
        next.push_log(format!("Engine error: {err}; pending phases were cleared"));
        self.logger.emit(GameEvent::InvariantViolation {
            detail: err.to_string(),
        });
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Character::{Ambassador, Assassin, Captain, Contessa, Duke};
    use crate::card::{CHARACTER_VARIANTS, COPIES_PER_CHARACTER};
    use crate::logger::GameEvent;
    use crate::oracle::{
        ActionChoice, ActionContext, BlockAdvice, ChallengeAdvice, OracleError, ResponseContext,
        ScriptedOracle,
    };
    use pretty_assertions::assert_eq;

    async fn setup(humans: usize) -> (Engine<ScriptedOracle>, GameState) {
        let mut engine = Engine::with_rng(ScriptedOracle::new(), Pcg64Mcg::seed_from_u64(42));
        let names: Vec<String> = (0..humans).map(|n| format!("P{n}")).collect();
        let refs: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        let state = engine.initialize_game(&refs, 0).await;
        (engine, state)
    }

    /// Puts exact characters into a player's hand, returning the old ones to
    /// the deck so the supply stays intact.
    fn stack_hand(state: &mut GameState, player: usize, characters: &[Character]) {
        let old: Vec<Character> = state.players[player]
            .influence
            .drain(..)
            .map(|c| c.character)
            .collect();
        let mut deck: Vec<Character> = state.deck.cards().to_vec();
        deck.extend(old);
        for &wanted in characters {
            let idx = deck
                .iter()
                .position(|&c| c == wanted)
                .expect("supply holds every character");
            deck.remove(idx);
            state.players[player]
                .influence
                .push(InfluenceCard::hidden(wanted));
        }
        state.deck = Deck::from_cards(deck);
    }

    fn total_cards(state: &GameState) -> usize {
        state
            .players
            .iter()
            .map(|p| p.influence.len())
            .sum::<usize>()
            + state.deck.len()
            + state.pooled_card_count()
    }

    const SUPPLY: usize = CHARACTER_VARIANTS.len() * COPIES_PER_CHARACTER;

    #[tokio::test]
    async fn scenario_a_income_advances_the_turn() {
        let (mut engine, state) = setup(2).await;
        assert_eq!(state.players[0].money, 2);

        let state = engine.perform_action(&state, 0, Action::Income).await;
        assert_eq!(state.players[0].money, 3);
        assert_eq!(state.current_player_idx, 1);
        assert_eq!(state.pending, None);
        assert_eq!(total_cards(&state), SUPPLY);
    }

    #[tokio::test]
    async fn scenario_b_proven_tax_costs_the_challenger() {
        let (mut engine, mut state) = setup(2).await;
        stack_hand(&mut state, 0, &[Duke, Contessa]);

        let state = engine.perform_action(&state, 0, Action::Tax).await;
        assert!(matches!(state.pending, Some(Pending::ChallengeOrBlock(_))));

        let state = engine
            .handle_player_response(&state, 1, Response::Challenge)
            .await;
        assert!(matches!(state.pending, Some(Pending::ChallengeDecision(_))));

        let state = engine
            .handle_challenge_decision(&state, 0, ChallengeDecision::Proceed)
            .await;
        // the proof replaced the duke without shrinking the hand
        assert_eq!(state.players[0].unrevealed_count(), 2);
        assert!(matches!(
            state.pending,
            Some(Pending::Reveal(RevealState { player: 1, .. }))
        ));

        let (state, revealed) = engine.handle_force_reveal(&state, 1, None).await;
        assert!(revealed.is_some());
        assert_eq!(state.players[1].unrevealed_count(), 1);
        // the tax then completed and play moved on
        assert_eq!(state.players[0].money, 5);
        assert_eq!(state.current_player_idx, 1);
        assert_eq!(total_cards(&state), SUPPLY);
        assert!(engine
            .logger()
            .events()
            .contains(&GameEvent::ChallengeResolved {
                challenged: 0,
                challenger: 1,
                proved: true,
            }));
    }

    #[tokio::test]
    async fn scenario_c_failed_contessa_bluff_loses_two_cards() {
        let (mut engine, mut state) = setup(3).await;
        stack_hand(&mut state, 0, &[Assassin, Duke]);
        stack_hand(&mut state, 1, &[Duke, Duke]);
        state.players[0].money = 3;

        let state = engine
            .perform_action(&state, 0, Action::Assassinate(1))
            .await;
        // the three coins are spent before anyone answers
        assert_eq!(state.players[0].money, 0);

        let state = engine
            .handle_player_response(&state, 2, Response::Allow)
            .await;
        let state = engine
            .handle_player_response(&state, 1, Response::Block(Contessa))
            .await;
        assert!(matches!(
            state.pending,
            Some(Pending::AssassinationConfirmation(_))
        ));

        let state = engine
            .handle_assassination_confirmation(
                &state,
                0,
                AssassinationConfirmation::ChallengeContessa,
            )
            .await;
        let state = engine
            .handle_challenge_decision(&state, 1, ChallengeDecision::Proceed)
            .await;
        // no contessa to show: the bluff fails and a card falls
        let (state, _) = engine.handle_force_reveal(&state, 1, None).await;
        assert_eq!(state.players[1].unrevealed_count(), 1);
        // the validated assassination now lands the second blow
        assert!(matches!(
            state.pending,
            Some(Pending::Reveal(RevealState { player: 1, .. }))
        ));
        let (state, _) = engine.handle_force_reveal(&state, 1, None).await;
        assert!(state.players[1].is_out());
        assert_eq!(state.winner, None);
        assert_eq!(state.current_player_idx, 2);
        assert_eq!(state.players[0].money, 0);
        assert_eq!(total_cards(&state), SUPPLY);
    }

    #[tokio::test]
    async fn scenario_d_exchange_keeps_selected_indices() {
        let (mut engine, mut state) = setup(2).await;
        stack_hand(&mut state, 0, &[Ambassador, Contessa]);
        // force the draw order so the pool reads Duke, Captain, own cards
        let mut deck: Vec<Character> = state.deck.cards().to_vec();
        let duke = deck.iter().position(|&c| c == Duke).unwrap();
        deck.remove(duke);
        let captain = deck.iter().position(|&c| c == Captain).unwrap();
        deck.remove(captain);
        let mut stacked = vec![Duke, Captain];
        stacked.extend(deck);
        state.deck = Deck::from_cards(stacked);
        let deck_before = state.deck.len();

        let state = engine.perform_action(&state, 0, Action::Exchange).await;
        let state = engine
            .handle_player_response(&state, 1, Response::Allow)
            .await;
        match &state.pending {
            Some(Pending::Exchange(exchange)) => {
                assert_eq!(exchange.pool, vec![Duke, Captain, Ambassador, Contessa]);
                assert_eq!(exchange.keep, 2);
            }
            other => panic!("expected a pending exchange, got {other:?}"),
        }
        assert_eq!(total_cards(&state), SUPPLY);

        let state = engine.handle_exchange_selection(&state, 0, &[0, 3]).await;
        let kept: Vec<Character> = state.players[0]
            .unrevealed()
            .map(|c| c.character)
            .collect();
        assert_eq!(kept, vec![Duke, Contessa]);
        assert_eq!(state.deck.len(), deck_before);
        assert_eq!(state.current_player_idx, 1);
        assert_eq!(total_cards(&state), SUPPLY);
    }

    #[tokio::test]
    async fn exchange_rejects_bad_selections_and_stays_open() {
        let (mut engine, state) = setup(2).await;
        let state = engine.perform_action(&state, 0, Action::Exchange).await;
        let state = engine
            .handle_player_response(&state, 1, Response::Allow)
            .await;
        assert!(matches!(state.pending, Some(Pending::Exchange(_))));

        // wrong count, duplicate index, out of range
        let state = engine.handle_exchange_selection(&state, 0, &[0]).await;
        assert!(matches!(state.pending, Some(Pending::Exchange(_))));
        let state = engine.handle_exchange_selection(&state, 0, &[1, 1]).await;
        assert!(matches!(state.pending, Some(Pending::Exchange(_))));
        let state = engine.handle_exchange_selection(&state, 0, &[0, 9]).await;
        assert!(matches!(state.pending, Some(Pending::Exchange(_))));
        assert_eq!(total_cards(&state), SUPPLY);

        let state = engine.handle_exchange_selection(&state, 0, &[1, 2]).await;
        assert_eq!(state.pending, None);
        assert_eq!(state.current_player_idx, 1);
        assert_eq!(total_cards(&state), SUPPLY);
    }

    #[tokio::test]
    async fn exchange_survives_an_empty_deck() {
        let (mut engine, mut state) = setup(2).await;
        // strand every undealt card outside the deck
        state.deck = Deck::from_cards(vec![]);

        let state = engine.perform_action(&state, 0, Action::Exchange).await;
        let state = engine
            .handle_player_response(&state, 1, Response::Allow)
            .await;
        match &state.pending {
            Some(Pending::Exchange(exchange)) => {
                assert_eq!(exchange.pool.len(), 2);
                assert_eq!(exchange.keep, 2);
            }
            other => panic!("expected a pending exchange, got {other:?}"),
        }
        let state = engine.handle_exchange_selection(&state, 0, &[0, 1]).await;
        assert_eq!(state.pending, None);
        assert_eq!(state.players[0].unrevealed_count(), 2);
    }

    #[tokio::test]
    async fn must_coup_at_ten_coins() {
        let (mut engine, mut state) = setup(2).await;
        state.players[0].money = 10;

        let rejected = engine.perform_action(&state, 0, Action::Tax).await;
        assert_eq!(rejected.players[0].money, 10);
        assert_eq!(rejected.pending, None);
        assert!(rejected
            .action_log
            .back()
            .unwrap()
            .contains("forces a Coup"));

        let state = engine.perform_action(&state, 0, Action::Coup(1)).await;
        assert_eq!(state.players[0].money, 3);
        assert!(matches!(
            state.pending,
            Some(Pending::Reveal(RevealState { player: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn coup_to_victory() {
        let (mut engine, mut state) = setup(2).await;
        state.players[0].money = 7;
        state.players[1].influence[1].revealed = true;

        let state = engine.perform_action(&state, 0, Action::Coup(1)).await;
        let (state, revealed) = engine.handle_force_reveal(&state, 1, None).await;
        assert!(revealed.is_some());
        assert!(state.players[1].is_out());
        assert_eq!(state.winner, Some(0));
        assert_eq!(state.pending, None);
        assert!(engine
            .logger()
            .events()
            .contains(&GameEvent::GameOver { winner: 0 }));

        // nothing moves once the game is over
        let after = engine.perform_action(&state, 0, Action::Income).await;
        assert_eq!(after.players[0].money, state.players[0].money);
    }

    #[tokio::test]
    async fn retreat_forfeits_the_assassination_cost() {
        let (mut engine, mut state) = setup(2).await;
        stack_hand(&mut state, 0, &[Duke, Duke]);
        state.players[0].money = 3;

        let state = engine
            .perform_action(&state, 0, Action::Assassinate(1))
            .await;
        assert_eq!(state.players[0].money, 0);
        let state = engine
            .handle_player_response(&state, 1, Response::Challenge)
            .await;
        let state = engine
            .handle_challenge_decision(&state, 0, ChallengeDecision::Retreat)
            .await;
        // house ruling: a withdrawn assassination does not refund its coins
        assert_eq!(state.players[0].money, 0);
        assert_eq!(state.players[1].unrevealed_count(), 2);
        assert_eq!(state.players[0].unrevealed_count(), 2);
        assert_eq!(state.pending, None);
        assert_eq!(state.current_player_idx, 1);
    }

    #[tokio::test]
    async fn only_the_first_challenge_counts() {
        let (mut engine, mut state) = setup(3).await;
        stack_hand(&mut state, 0, &[Duke, Contessa]);

        let state = engine.perform_action(&state, 0, Action::Tax).await;
        let state = engine
            .handle_player_response(&state, 1, Response::Challenge)
            .await;
        assert!(matches!(state.pending, Some(Pending::ChallengeDecision(_))));

        // the collection is closed; a second challenge bounces
        let state = engine
            .handle_player_response(&state, 2, Response::Challenge)
            .await;
        assert!(matches!(state.pending, Some(Pending::ChallengeDecision(_))));
        assert!(state.action_log.back().unwrap().contains("Rejected input"));
    }

    #[tokio::test]
    async fn a_late_challenge_outranks_an_earlier_block() {
        let (mut engine, state) = setup(3).await;
        let state = engine.perform_action(&state, 0, Action::Steal(2)).await;

        // the target blocks first, but the response window stays open
        let state = engine
            .handle_player_response(&state, 2, Response::Block(Captain))
            .await;
        match &state.pending {
            Some(Pending::ChallengeOrBlock(phase)) => {
                assert!(phase.block.is_some());
                assert_eq!(phase.awaiting, vec![1]);
            }
            other => panic!("expected the claim to stay open, got {other:?}"),
        }

        // the remaining responder challenges the steal itself and wins the
        // table: the recorded block is discarded
        let state = engine
            .handle_player_response(&state, 1, Response::Challenge)
            .await;
        match &state.pending {
            Some(Pending::ChallengeDecision(cd)) => {
                assert_eq!(cd.challenged, 0);
                assert_eq!(cd.challenger, 1);
                assert_eq!(cd.claim, Claim::Action(Action::Steal(2)));
            }
            other => panic!("expected the steal claim to be challenged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_aid_block_collapses_when_unproven() {
        let (mut engine, mut state) = setup(2).await;
        stack_hand(&mut state, 1, &[Captain, Captain]);

        let state = engine.perform_action(&state, 0, Action::ForeignAid).await;
        let state = engine
            .handle_player_response(&state, 1, Response::Block(Duke))
            .await;
        // the block is now the live claim and the original actor may answer
        match &state.pending {
            Some(Pending::ChallengeOrBlock(phase)) => {
                assert_eq!(phase.stage, Stage::ChallengeBlock);
                assert_eq!(phase.claimant, 1);
                assert_eq!(phase.awaiting, vec![0]);
            }
            other => panic!("expected a challenge-block stage, got {other:?}"),
        }

        let state = engine
            .handle_player_response(&state, 0, Response::Challenge)
            .await;
        let state = engine
            .handle_challenge_decision(&state, 1, ChallengeDecision::Proceed)
            .await;
        let (state, _) = engine.handle_force_reveal(&state, 1, None).await;
        // the failed block resumed the foreign aid without asking again
        assert_eq!(state.players[0].money, 4);
        assert_eq!(state.players[1].unrevealed_count(), 1);
        assert_eq!(state.current_player_idx, 1);
        assert_eq!(total_cards(&state), SUPPLY);
    }

    #[tokio::test]
    async fn allowed_foreign_aid_block_cancels_the_action() {
        let (mut engine, state) = setup(2).await;
        let state = engine.perform_action(&state, 0, Action::ForeignAid).await;
        let state = engine
            .handle_player_response(&state, 1, Response::Block(Duke))
            .await;
        let state = engine
            .handle_player_response(&state, 0, Response::Allow)
            .await;
        assert_eq!(state.players[0].money, 2);
        assert_eq!(state.pending, None);
        assert_eq!(state.current_player_idx, 1);
    }

    #[tokio::test]
    async fn steal_takes_at_most_what_the_target_has() {
        let (mut engine, mut state) = setup(2).await;
        state.players[1].money = 1;

        let state = engine.perform_action(&state, 0, Action::Steal(1)).await;
        let state = engine
            .handle_player_response(&state, 1, Response::Allow)
            .await;
        // the target's dedicated block decision comes next
        match &state.pending {
            Some(Pending::ChallengeOrBlock(phase)) => {
                assert_eq!(phase.stage, Stage::BlockDecision);
                assert_eq!(phase.awaiting, vec![1]);
            }
            other => panic!("expected a block decision, got {other:?}"),
        }
        let state = engine
            .handle_player_response(&state, 1, Response::Allow)
            .await;
        assert_eq!(state.players[0].money, 3);
        assert_eq!(state.players[1].money, 0);
        assert_eq!(state.current_player_idx, 1);
    }

    #[tokio::test]
    async fn validation_rejections_leave_state_unchanged() {
        let (mut engine, state) = setup(3).await;

        // out of turn
        let next = engine.perform_action(&state, 1, Action::Income).await;
        assert_eq!(next.players, state.players);
        // a coup without the coins
        let next = engine.perform_action(&state, 0, Action::Coup(1)).await;
        assert_eq!(next.players, state.players);
        // self-targeting
        let next = engine.perform_action(&state, 0, Action::Steal(0)).await;
        assert_eq!(next.players, state.players);
        // stealing from an empty purse
        let mut broke = state.clone();
        broke.players[1].money = 0;
        let next = engine.perform_action(&broke, 0, Action::Steal(1)).await;
        assert_eq!(next.players, broke.players);
        // responding with no claim open
        let next = engine
            .handle_player_response(&state, 1, Response::Allow)
            .await;
        assert_eq!(next.players, state.players);
        // a reveal nobody asked for
        let (next, revealed) = engine.handle_force_reveal(&state, 1, None).await;
        assert_eq!(next.players, state.players);
        assert_eq!(revealed, None);
    }

    #[tokio::test]
    async fn preferred_card_type_guides_the_reveal() {
        let (mut engine, mut state) = setup(2).await;
        stack_hand(&mut state, 1, &[Duke, Captain]);
        state.players[0].money = 7;

        let state = engine.perform_action(&state, 0, Action::Coup(1)).await;
        let (state, revealed) = engine.handle_force_reveal(&state, 1, Some(Captain)).await;
        assert_eq!(revealed, Some(Captain));
        assert!(state.players[1].holds(Duke));
        assert_eq!(state.current_player_idx, 1);
    }

    #[tokio::test]
    async fn tax_with_no_responders_resolves_and_ends_the_game() {
        let (mut engine, mut state) = setup(3).await;
        // both opponents are already out, so no responder exists
        for player in 1..=2 {
            for card in state.players[player].influence.iter_mut() {
                card.revealed = true;
            }
        }
        let state = engine.perform_action(&state, 0, Action::Tax).await;
        assert_eq!(state.players[0].money, 5);
        assert_eq!(state.winner, Some(0));
    }

    /// Oracle that always fails; the engine must degrade, never stall.
    struct BrokenOracle;

    impl Oracle for BrokenOracle {
        async fn select_action(
            &self,
            _ctx: &ActionContext,
        ) -> std::result::Result<ActionChoice, OracleError> {
            Err(OracleError::Backend("no backend".into()))
        }

        async fn challenge_reasoning(
            &self,
            _ctx: &ResponseContext,
        ) -> std::result::Result<ChallengeAdvice, OracleError> {
            Err(OracleError::Backend("no backend".into()))
        }

        async fn block_reasoning(
            &self,
            _ctx: &ResponseContext,
        ) -> std::result::Result<BlockAdvice, OracleError> {
            Err(OracleError::Backend("no backend".into()))
        }
    }

    #[tokio::test]
    async fn broken_oracle_degrades_to_allow_and_income() {
        let mut engine = Engine::with_rng(BrokenOracle, Pcg64Mcg::seed_from_u64(9));
        let state = engine.initialize_game(&["P0"], 1).await;

        // the AI responder silently allows the tax
        let state = engine.perform_action(&state, 0, Action::Tax).await;
        assert_eq!(state.pending, None);
        assert_eq!(state.players[0].money, 5);
        assert!(state.needs_human_trigger_for_ai);

        // and its own turn falls back to income
        let state = engine.handle_ai_action(&state).await;
        assert_eq!(state.players[1].money, 3);
        assert_eq!(state.current_player_idx, 0);
        assert!(engine
            .logger()
            .events()
            .iter()
            .any(|e| matches!(e, GameEvent::OracleFailed { .. })));
    }

    #[tokio::test]
    async fn pending_phase_is_exclusive_after_every_call() {
        let (mut engine, mut state) = setup(2).await;
        stack_hand(&mut state, 0, &[Duke, Contessa]);

        let state = engine.perform_action(&state, 0, Action::Tax).await;
        assert!(matches!(state.pending, Some(Pending::ChallengeOrBlock(_))));
        let state = engine
            .handle_player_response(&state, 1, Response::Challenge)
            .await;
        assert!(matches!(state.pending, Some(Pending::ChallengeDecision(_))));
        let state = engine
            .handle_challenge_decision(&state, 0, ChallengeDecision::Proceed)
            .await;
        assert!(matches!(state.pending, Some(Pending::Reveal(_))));
        let (state, _) = engine.handle_force_reveal(&state, 1, None).await;
        assert_eq!(state.pending, None);
        // the provenance record is gone once the chain settles
        assert_eq!(state.current_action, None);
    }

    #[tokio::test]
    async fn legal_actions_respect_funds_and_the_forced_coup() {
        let (engine, mut state) = setup(3).await;

        let actions = engine.legal_actions(&state, 0);
        assert!(actions.contains(&Action::Income));
        assert!(!actions.iter().any(|a| matches!(a, Action::Coup(_))));
        assert!(!actions.iter().any(|a| matches!(a, Action::Assassinate(_))));

        state.players[0].money = 10;
        let actions = engine.legal_actions(&state, 0);
        assert_eq!(actions, vec![Action::Coup(1), Action::Coup(2)]);
    }
}
