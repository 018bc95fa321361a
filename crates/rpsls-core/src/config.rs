//! Protocol configuration and environment loading.

use rpsls_ledger::ledger::{parse_ether, Wei};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// 0.001 ether
pub const DEFAULT_MIN_STAKE: Wei = Wei(1_000_000_000_000_000);
/// 1 ether
pub const DEFAULT_MAX_STAKE: Wei = Wei(1_000_000_000_000_000_000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_REVEAL_GAS_LIMIT: u64 = 100_000;
pub const DEFAULT_VAULT_DIR: &str = ".rpsls-vault";

/// Configuration shared by every match a client plays.
#[derive(Clone, Debug)]
pub struct GameConfig {
    /// Smallest accepted stake, inclusive
    pub min_stake: Wei,
    /// Largest accepted stake, inclusive
    pub max_stake: Wei,
    /// Delay between two ledger samples of a monitored match
    pub poll_interval: Duration,
    /// Gas ceiling handed to the gateway with every reveal
    pub reveal_gas_limit: u64,
    /// Directory of the file-backed secret vault
    pub vault_dir: PathBuf,
    /// Upper bound, in ticks, on the wait after consecutive failed samples.
    /// 1 keeps the fixed interval.
    pub poll_backoff_cap: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            min_stake: DEFAULT_MIN_STAKE,
            max_stake: DEFAULT_MAX_STAKE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reveal_gas_limit: DEFAULT_REVEAL_GAS_LIMIT,
            vault_dir: PathBuf::from(DEFAULT_VAULT_DIR),
            poll_backoff_cap: 1,
        }
    }
}

impl GameConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `RPSLS_MIN_STAKE` - Minimum stake in ether (default: 0.001)
    /// - `RPSLS_MAX_STAKE` - Maximum stake in ether (default: 1)
    /// - `RPSLS_POLL_INTERVAL_MS` - Poll interval in milliseconds (default: 3000)
    /// - `RPSLS_REVEAL_GAS_LIMIT` - Gas ceiling for reveals (default: 100000)
    /// - `RPSLS_VAULT_DIR` - Vault directory (default: .rpsls-vault)
    /// - `RPSLS_POLL_BACKOFF_CAP` - Max ticks to wait after repeated failures (default: 1)
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(min) = read_ether("RPSLS_MIN_STAKE") {
            config.min_stake = min;
        }
        if let Some(max) = read_ether("RPSLS_MAX_STAKE") {
            config.max_stake = max;
        }
        if config.min_stake > config.max_stake {
            warn!(
                min = %config.min_stake,
                max = %config.max_stake,
                "stake bounds inverted, falling back to defaults"
            );
            config.min_stake = DEFAULT_MIN_STAKE;
            config.max_stake = DEFAULT_MAX_STAKE;
        }

        if let Some(ms) = read_env::<u64>("RPSLS_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(gas) = read_env::<u64>("RPSLS_REVEAL_GAS_LIMIT") {
            config.reveal_gas_limit = gas;
        }
        if let Ok(dir) = env::var("RPSLS_VAULT_DIR") {
            config.vault_dir = PathBuf::from(dir);
        }
        if let Some(cap) = read_env::<u32>("RPSLS_POLL_BACKOFF_CAP") {
            config.poll_backoff_cap = cap.max(1);
        }

        config
    }
}

fn read_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

fn read_ether(key: &str) -> Option<Wei> {
    let raw = env::var(key).ok()?;
    match parse_ether(raw.trim()) {
        Ok(amount) => Some(amount),
        Err(e) => {
            warn!(key, error = %e, "ignoring unparseable ether amount");
            None
        }
    }
}
