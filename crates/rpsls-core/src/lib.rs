//! RPSLS Core Library
//!
//! Client side of the commit-reveal stake game:
//! - Secret vault keeping the committed move until reveal
//! - Per-match state machine driven by ledger snapshots
//! - State poller with one cancellable loop per match
//! - GameManager actions reporting through presentation events

pub mod config;
pub mod error;
pub mod manager;
pub mod poller;
pub mod presentation;
pub mod protocol;
pub mod session;
pub mod validate;
pub mod vault;

pub use config::GameConfig;
pub use error::{Action, ActionError, GameError};
pub use manager::{GameManager, StakeInfo};
pub use poller::{MonitorHandle, PollStatus, StatePoller};
pub use presentation::{EventChannel, Presentation, PresentationEvent, Section, Severity};
pub use protocol::{Effect, GameSnapshot, GameStateMachine, MatchPhase, MatchRecord, Role};
pub use session::Session;
pub use vault::{FileVault, MemoryVault, SecretVault, VaultError, VaultKey};
