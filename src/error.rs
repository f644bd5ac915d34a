use thiserror::Error;

/// Internal engine failures. None of these cross the public API: the facade
/// catches them and degrades to a recovered snapshot instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("player {0} does not exist")]
    MissingPlayer(usize),

    #[error("the court deck is empty")]
    EmptyDeck,

    #[error("corrupted phase state: {0}")]
    CorruptPhase(String),

    #[error("no living player found while advancing the turn")]
    NoLivingPlayer,
}

pub type Result<T> = std::result::Result<T, EngineError>;
