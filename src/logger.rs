//! Structured event logger. The engine emits typed events here so tests can
//! assert on behavior without string-matching the in-state action log.

use std::cell::{Ref, RefCell};

use serde::{Deserialize, Serialize};

use crate::action::{Action, Response};
use crate::card::Character;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum VerbosityLevel {
    /// No output during play.
    Silent = 0,
    /// Only game outcome and errors.
    Minimal = 1,
    /// Turns and key resolutions (default).
    #[default]
    Normal = 2,
    /// Every response and oracle fallback.
    Verbose = 3,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    ActionTaken { actor: usize, action: Action },
    ResponseRecorded { player: usize, response: Response },
    ChallengeResolved { challenged: usize, challenger: usize, proved: bool },
    CardRevealed { player: usize, character: Character },
    PlayerEliminated { player: usize },
    ExchangeCompleted { player: usize, kept: usize },
    OracleFailed { player: usize, reason: String },
    ValidationRejected { player: usize, reason: String },
    InvariantViolation { detail: String },
    GameOver { winner: usize },
}

impl GameEvent {
    fn level(&self) -> VerbosityLevel {
        match self {
            GameEvent::GameOver { .. } | GameEvent::InvariantViolation { .. } => {
                VerbosityLevel::Minimal
            }
            GameEvent::ResponseRecorded { .. }
            | GameEvent::OracleFailed { .. }
            | GameEvent::ValidationRejected { .. } => VerbosityLevel::Verbose,
            _ => VerbosityLevel::Normal,
        }
    }
}

impl std::fmt::Display for GameEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameEvent::ActionTaken { actor, action } => {
                write!(f, "player {actor} takes {action:?}")
            }
            GameEvent::ResponseRecorded { player, response } => {
                write!(f, "player {player} responds {response:?}")
            }
            GameEvent::ChallengeResolved {
                challenged,
                challenger,
                proved,
            } => write!(
                f,
                "challenge by {challenger} against {challenged}: {}",
                if *proved { "disproven" } else { "upheld" }
            ),
            GameEvent::CardRevealed { player, character } => {
                write!(f, "player {player} reveals {character}")
            }
            GameEvent::PlayerEliminated { player } => write!(f, "player {player} is eliminated"),
            GameEvent::ExchangeCompleted { player, kept } => {
                write!(f, "player {player} completes an exchange keeping {kept}")
            }
            GameEvent::OracleFailed { player, reason } => {
                write!(f, "oracle failed for player {player}: {reason}")
            }
            GameEvent::ValidationRejected { player, reason } => {
                write!(f, "rejected input from player {player}: {reason}")
            }
            GameEvent::InvariantViolation { detail } => write!(f, "invariant violation: {detail}"),
            GameEvent::GameOver { winner } => write!(f, "game over, winner is player {winner}"),
        }
    }
}

/// In-memory event buffer with optional stdout mirroring. Capture is always
/// on; stdout output is gated by verbosity.
pub struct GameLogger {
    verbosity: VerbosityLevel,
    events: RefCell<Vec<GameEvent>>,
}

impl GameLogger {
    pub fn new() -> Self {
        Self::with_verbosity(VerbosityLevel::Silent)
    }

    pub fn with_verbosity(verbosity: VerbosityLevel) -> Self {
        GameLogger {
            verbosity,
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    pub fn set_verbosity(&mut self, verbosity: VerbosityLevel) {
        self.verbosity = verbosity;
    }

    pub fn emit(&self, event: GameEvent) {
        if event.level() <= self.verbosity {
            println!("{event}");
        }
        self.events.borrow_mut().push(event);
    }

    /// Read-only access to every event emitted so far.
    pub fn events(&self) -> Ref<'_, Vec<GameEvent>> {
        self.events.borrow()
    }

    pub fn clear(&mut self) {
        self.events.borrow_mut().clear();
    }
}

impl Default for GameLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GameLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameLogger")
            .field("verbosity", &self.verbosity)
            .field("event_count", &self.events.borrow().len())
            .finish()
    }
}
