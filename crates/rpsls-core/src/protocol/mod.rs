//! Match lifecycle: phases, snapshots and the per-match state machine.

mod machine;
mod types;

pub use machine::{result_message, Effect, GameStateMachine};
pub use types::{ledger_time, GameSnapshot, MatchPhase, MatchRecord, Role};
