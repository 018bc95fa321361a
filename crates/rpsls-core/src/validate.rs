//! Input validation, run before any ledger interaction.

use crate::config::GameConfig;
use crate::error::GameError;
use rpsls_ledger::game::Move;
use rpsls_ledger::ledger::{format_ether, parse_ether, Address, Wei};

/// Parse a move code ("1".."5")
pub fn validate_move(input: &str) -> Result<Move, GameError> {
    input
        .parse()
        .map_err(|e: rpsls_ledger::MoveError| GameError::InvalidMove(e.to_string()))
}

/// Accept exactly the closed interval `[min_stake, max_stake]`
pub fn validate_stake(amount: Wei, config: &GameConfig) -> Result<Wei, GameError> {
    if amount < config.min_stake || amount > config.max_stake {
        return Err(GameError::InvalidStake(format!(
            "{} ETH is outside [{}, {}] ETH",
            format_ether(amount),
            format_ether(config.min_stake),
            format_ether(config.max_stake),
        )));
    }
    Ok(amount)
}

/// Parse and bound-check a decimal ether amount
pub fn validate_stake_input(input: &str, config: &GameConfig) -> Result<Wei, GameError> {
    let amount = parse_ether(input).map_err(|e| GameError::InvalidStake(e.to_string()))?;
    validate_stake(amount, config)
}

/// Parse a counterparty or match address
pub fn validate_address(input: &str) -> Result<Address, GameError> {
    input
        .parse()
        .map_err(|_| GameError::InvalidCounterpartyAddress(input.to_string()))
}
