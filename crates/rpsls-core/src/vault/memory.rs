//! In-memory vault for tests and short-lived sessions.

use super::{SealedRecord, SecretVault, VaultError, VaultKey};
use rpsls_ledger::crypto::Secret;
use rpsls_ledger::game::Move;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Vault keeping sealed records in process memory
#[derive(Clone, Default)]
pub struct MemoryVault {
    records: Arc<Mutex<HashMap<VaultKey, SealedRecord>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records (for testing)
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SecretVault for MemoryVault {
    fn store(&self, key: &VaultKey, mv: Move, secret: &Secret) -> Result<(), VaultError> {
        let record = SealedRecord::seal(mv, secret);
        self.records.lock().unwrap().insert(key.clone(), record);
        Ok(())
    }

    fn load(&self, key: &VaultKey) -> Result<(Move, Secret), VaultError> {
        let records = self.records.lock().unwrap();
        let record = records
            .get(key)
            .ok_or_else(|| VaultError::NotFound(key.clone()))?;
        record.open(key)
    }

    fn purge(&self, key: &VaultKey) -> Result<(), VaultError> {
        self.records.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpsls_ledger::ledger::Address;

    #[test]
    fn test_roundtrip_and_purge() {
        let vault = MemoryVault::new();
        let key = VaultKey::for_match(&Address::random());
        let secret = Secret::random();

        vault.store(&key, Move::Spock, &secret).unwrap();
        let (mv, loaded) = vault.load(&key).unwrap();
        assert_eq!((mv, loaded), (Move::Spock, secret));

        vault.purge(&key).unwrap();
        assert!(matches!(vault.load(&key), Err(VaultError::NotFound(_))));
        vault.purge(&key).unwrap();
        assert!(vault.is_empty());
    }

    #[test]
    fn test_matches_do_not_collide() {
        let vault = MemoryVault::new();
        let a = VaultKey::for_match(&Address::random());
        let b = VaultKey::for_match(&Address::random());

        vault.store(&a, Move::Rock, &Secret::random()).unwrap();
        vault.store(&b, Move::Paper, &Secret::random()).unwrap();

        assert_eq!(vault.load(&a).unwrap().0, Move::Rock);
        assert_eq!(vault.load(&b).unwrap().0, Move::Paper);
        assert_eq!(vault.len(), 2);
    }
}
