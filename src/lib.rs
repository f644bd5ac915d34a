//! A turn-based rules engine for the card game Coup.
//!
//! The engine is a snapshot-in/snapshot-out reducer: `Engine` holds the
//! decision oracle, RNG and event logger, while the whole game lives in
//! [`GameState`] values that every call consumes by reference and returns
//! anew. Human seats act through the public facade; AI seats act through the
//! same transitions, driven by an [`oracle::Oracle`] the host supplies.

pub mod action;
pub mod ai;
pub mod card;
pub mod engine;
pub mod error;
pub mod logger;
pub mod oracle;
pub mod rules;
pub mod state;

pub use action::{Action, AssassinationConfirmation, ChallengeDecision, Claim, Response};
pub use card::{Character, Deck};
pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use logger::{GameEvent, GameLogger, VerbosityLevel};
pub use oracle::{HeuristicOracle, Oracle, ScriptedOracle};
pub use state::{GameState, InfluenceCard, Pending, Player};
