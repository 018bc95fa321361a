//! RPSLS Ledger Library
//!
//! Shared primitives for the Rock-Paper-Scissors-Spock-Lizard match protocol:
//! - Move codes, the win relation and outcome resolution
//! - Commitment and Secret for commit-reveal
//! - LedgerGateway trait, MockLedger and RpcLedgerGateway

pub mod crypto;
pub mod game;
pub mod ledger;

pub use crypto::{commit, Commitment, Secret};
pub use game::{resolve, Move, MoveError, Outcome, WIN_RELATION};
pub use ledger::{
    Address, LedgerError, LedgerGateway, MatchState, MockLedger, RpcLedgerGateway, TxReceipt, Wei,
};
