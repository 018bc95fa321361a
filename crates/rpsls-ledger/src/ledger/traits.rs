//! Ledger gateway trait definition.

use super::types::{Address, Wei};
use crate::crypto::{Commitment, Secret};
use crate::game::Move;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Match not found: {0}")]
    MatchNotFound(Address),

    #[error("Transaction rejected by user")]
    UserRejected,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Invalid input provided: {0}")]
    InvalidArgument(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl LedgerError {
    /// Failures worth retrying on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Network(_))
    }
}

/// Identifier of a confirmed ledger action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(Uuid);

impl TxId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

/// Receipt of a confirmed ledger action
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_id: TxId,
    /// Ledger timestamp of the block that included the action
    pub timestamp: u64,
}

/// Ledger-visible fields of a match contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    /// Player 1's commitment to its move
    pub commitment: Commitment,
    /// Counter-move played by player 2, `None` while the field is still zero
    pub player2_move: Option<Move>,
    /// Stake per player; zero once the match paid out
    pub stake: Wei,
    /// Timestamp of the last state-changing action
    pub last_action: u64,
    /// Seconds a party may stay idle before the other can claim
    pub timeout_secs: u64,
    pub player1: Address,
    pub player2: Address,
}

/// Trait for ledger operations
///
/// This trait abstracts the match contract operations needed by the game protocol.
/// Implementations can be:
/// - MockLedger for testing
/// - RpcLedgerGateway for a signing gateway reached over JSON-RPC
///
/// Write operations resolve once the action is confirmed.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Address of the signing account behind this gateway
    async fn account(&self) -> Result<Address, LedgerError>;

    /// Balance of any account
    async fn balance(&self, account: &Address) -> Result<Wei, LedgerError>;

    /// Current ledger time in seconds
    async fn timestamp(&self) -> Result<u64, LedgerError>;

    /// Deploy a match contract holding our commitment and stake
    async fn deploy_match(
        &self,
        commitment: &Commitment,
        opponent: &Address,
        stake: Wei,
    ) -> Result<Address, LedgerError>;

    /// Play the counter-move, paying exactly the posted stake
    async fn join_match(&self, game: &Address, mv: Move, stake: Wei)
        -> Result<TxReceipt, LedgerError>;

    /// Read the match contract fields
    async fn read_state(&self, game: &Address) -> Result<MatchState, LedgerError>;

    /// Open our commitment; the contract pays out on success
    async fn submit_reveal(
        &self,
        game: &Address,
        mv: Move,
        secret: &Secret,
        gas_limit: u64,
    ) -> Result<TxReceipt, LedgerError>;

    /// Claim the pot after the counterparty idled past the timeout
    async fn submit_timeout_claim(&self, game: &Address) -> Result<TxReceipt, LedgerError>;
}
