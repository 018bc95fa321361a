//! Error kinds surfaced by match actions.

use crate::vault::VaultError;
use rpsls_ledger::ledger::{Address, LedgerError};
use std::fmt;
use thiserror::Error;

/// Why a match action failed
#[derive(Debug, Error)]
pub enum GameError {
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("Invalid stake amount: {0}")]
    InvalidStake(String),

    #[error("Invalid opponent address: {0}")]
    InvalidCounterpartyAddress(String),

    #[error("Cannot play against yourself")]
    SelfPlayRejected,

    #[error("Missing move or secret for {0} - cannot reveal")]
    MissingCommitment(Address),

    #[error("Game {0} already resolved")]
    GameAlreadyResolved(Address),

    #[error("Player 2 has not moved yet")]
    OpponentNotYetMoved,

    #[error("Only the invited opponent can join {0}")]
    NotParticipant(Address),

    #[error("Player 2 has already played in {0}")]
    AlreadyJoined(Address),

    #[error("No local record of match {0}")]
    UnknownMatch(Address),

    #[error("A {action} for {game} is still awaiting confirmation")]
    ActionInFlight { action: Action, game: Address },

    #[error("{0}")]
    LedgerRejected(String),

    #[error("Network error: {0}")]
    NetworkTransient(String),

    #[error("Secret vault error: {0}")]
    Vault(#[from] VaultError),
}

impl GameError {
    /// Only network failures may be retried, and only by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, GameError::NetworkTransient(_))
    }

    /// Errors that end the match's local lifecycle
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GameError::MissingCommitment(_) | GameError::GameAlreadyResolved(_)
        )
    }

    /// Errors raised before any ledger interaction
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GameError::InvalidMove(_)
                | GameError::InvalidStake(_)
                | GameError::InvalidCounterpartyAddress(_)
                | GameError::SelfPlayRejected
        )
    }
}

impl From<LedgerError> for GameError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Network(msg) => GameError::NetworkTransient(msg),
            other => GameError::LedgerRejected(other.to_string()),
        }
    }
}

/// User-facing match actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Commit,
    CreateGame,
    JoinGame,
    Reveal,
    ClaimTimeout,
    LoadGame,
    Monitor,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Commit => "Hash Generation",
            Action::CreateGame => "Game Creation",
            Action::JoinGame => "Game Joining",
            Action::Reveal => "Move Revelation",
            Action::ClaimTimeout => "Timeout Claim",
            Action::LoadGame => "Game Loading",
            Action::Monitor => "Game Monitoring",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed action together with the cause, ready for display
#[derive(Debug, Error)]
#[error("{action} failed: {error}")]
pub struct ActionError {
    pub action: Action,
    #[source]
    pub error: GameError,
}

impl ActionError {
    pub fn new(action: Action, error: impl Into<GameError>) -> Self {
        Self {
            action,
            error: error.into(),
        }
    }
}
