//! File-backed vault: one JSON record per key, survives restarts.

use super::{SealedRecord, SecretVault, VaultError, VaultKey};
use rpsls_ledger::crypto::Secret;
use rpsls_ledger::game::Move;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Vault storing sealed records as files in a directory
pub struct FileVault {
    dir: PathBuf,
}

impl FileVault {
    /// Open (and create if needed) a vault directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &VaultKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

impl SecretVault for FileVault {
    fn store(&self, key: &VaultKey, mv: Move, secret: &Secret) -> Result<(), VaultError> {
        let record = SealedRecord::seal(mv, secret);
        let bytes = serde_json::to_vec_pretty(&record)?;

        // Write-then-rename so a crash never leaves a torn record
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(record = %key, "stored sealed record");
        Ok(())
    }

    fn load(&self, key: &VaultKey) -> Result<(Move, Secret), VaultError> {
        let bytes = match fs::read(self.path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(VaultError::NotFound(key.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let record: SealedRecord = serde_json::from_slice(&bytes)?;
        record.open(key)
    }

    fn purge(&self, key: &VaultKey) -> Result<(), VaultError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => {
                debug!(record = %key, "purged sealed record");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpsls_ledger::ledger::Address;

    fn temp_vault() -> FileVault {
        let dir = std::env::temp_dir().join(format!("rpsls-vault-{}", uuid::Uuid::new_v4()));
        FileVault::open(dir).unwrap()
    }

    #[test]
    fn test_store_load_roundtrip() {
        let vault = temp_vault();
        let key = VaultKey::for_match(&Address::random());
        let secret = Secret::random();

        vault.store(&key, Move::Spock, &secret).unwrap();
        let (mv, loaded) = vault.load(&key).unwrap();

        assert_eq!(mv, Move::Spock);
        assert_eq!(loaded, secret);
        fs::remove_dir_all(vault.dir()).unwrap();
    }

    #[test]
    fn test_survives_reopen() {
        let vault = temp_vault();
        let key = VaultKey::for_match(&Address::random());
        let secret = Secret::random();
        vault.store(&key, Move::Lizard, &secret).unwrap();

        let reopened = FileVault::open(vault.dir()).unwrap();
        let (mv, loaded) = reopened.load(&key).unwrap();
        assert_eq!(mv, Move::Lizard);
        assert_eq!(loaded, secret);
        fs::remove_dir_all(vault.dir()).unwrap();
    }

    #[test]
    fn test_purge_then_not_found() {
        let vault = temp_vault();
        let key = VaultKey::for_match(&Address::random());
        vault.store(&key, Move::Rock, &Secret::random()).unwrap();

        vault.purge(&key).unwrap();
        assert!(matches!(vault.load(&key), Err(VaultError::NotFound(_))));

        // Idempotent
        vault.purge(&key).unwrap();
        fs::remove_dir_all(vault.dir()).unwrap();
    }

    #[test]
    fn test_plaintext_not_on_disk() {
        let vault = temp_vault();
        let key = VaultKey::for_match(&Address::random());
        let secret = Secret::random();
        vault.store(&key, Move::Paper, &secret).unwrap();

        let raw = fs::read_to_string(vault.path(&key)).unwrap();
        assert!(!raw.contains(&secret.to_hex()));
        fs::remove_dir_all(vault.dir()).unwrap();
    }

    #[test]
    fn test_rekey_moves_record() {
        let vault = temp_vault();
        let (commitment, secret) = rpsls_ledger::commit(Move::Scissors);
        let pending = VaultKey::pending(&commitment);
        let settled = VaultKey::for_match(&Address::random());

        vault.store(&pending, Move::Scissors, &secret).unwrap();
        vault.rekey(&pending, &settled).unwrap();

        assert!(matches!(vault.load(&pending), Err(VaultError::NotFound(_))));
        assert_eq!(vault.load(&settled).unwrap().0, Move::Scissors);
        fs::remove_dir_all(vault.dir()).unwrap();
    }
}
