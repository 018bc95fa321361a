//! Ledger gateway abstraction.

mod mock;
mod rpc;
mod traits;
mod types;

pub use mock::{MockActionKind, MockLedger, MockSubmission, DEFAULT_TIMEOUT_SECS};
pub use rpc::RpcLedgerGateway;
pub use traits::{LedgerError, LedgerGateway, MatchState, TxId, TxReceipt};
pub use types::{format_ether, parse_ether, Address, ParseError, Wei, WEI_PER_ETHER};
