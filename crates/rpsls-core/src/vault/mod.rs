//! Secret vault: keeps the committed move and its secret until reveal.
//!
//! Records are sealed with a fresh per-record key that is stored next to
//! the ciphertext. This only keeps the secret out of plaintext at rest; anyone
//! who can read the vault can open it.

mod file;
mod memory;
mod sealed;

pub use file::FileVault;
pub use memory::MemoryVault;
pub use sealed::SealedRecord;

use rpsls_ledger::crypto::{Commitment, Secret};
use rpsls_ledger::game::Move;
use rpsls_ledger::ledger::Address;
use std::fmt;
use thiserror::Error;

/// Errors from vault operations
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("No stored secret for {0}")]
    NotFound(VaultKey),

    #[error("Corrupt vault record {key}: {reason}")]
    Corrupt { key: VaultKey, reason: String },

    #[error("Vault I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Vault encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Identifier of a vault record
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VaultKey(String);

impl VaultKey {
    /// Record of a deployed match
    pub fn for_match(game: &Address) -> Self {
        Self(format!("match-{game}"))
    }

    /// Record written before the match contract exists
    pub fn pending(commitment: &Commitment) -> Self {
        Self(format!("pending-{}", commitment.to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Address> for VaultKey {
    fn from(game: &Address) -> Self {
        Self::for_match(game)
    }
}

impl fmt::Display for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistent store of `(move, secret)` pairs keyed by match.
///
/// `purge` is idempotent: purging an absent record succeeds.
pub trait SecretVault: Send + Sync {
    fn store(&self, key: &VaultKey, mv: Move, secret: &Secret) -> Result<(), VaultError>;

    fn load(&self, key: &VaultKey) -> Result<(Move, Secret), VaultError>;

    fn purge(&self, key: &VaultKey) -> Result<(), VaultError>;

    /// Move a record to a new key, e.g. once the match address is known
    fn rekey(&self, from: &VaultKey, to: &VaultKey) -> Result<(), VaultError> {
        let (mv, secret) = self.load(from)?;
        self.store(to, mv, &secret)?;
        self.purge(from)
    }
}
