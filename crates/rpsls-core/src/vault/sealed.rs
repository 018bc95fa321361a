//! Sealed vault record: per-record key, SHA-256 keystream and integrity tag.
//!
//! ciphertext = (move || secret) XOR H(domain || key || nonce || counter)
//! tag        = H(tag_domain || key || nonce || ciphertext)

use super::{VaultError, VaultKey};
use rand::rngs::OsRng;
use rand::RngCore;
use rpsls_ledger::crypto::{Secret, SECRET_LEN};
use rpsls_ledger::game::Move;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const RECORD_VERSION: u8 = 1;
const KEYSTREAM_DOMAIN: &[u8] = b"rpsls/vault/keystream/v1";
const TAG_DOMAIN: &[u8] = b"rpsls/vault/tag/v1";
const PLAINTEXT_LEN: usize = 1 + SECRET_LEN;

/// Encrypted `(move, secret)` record as persisted
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedRecord {
    pub version: u8,
    /// Per-record key, stored beside the ciphertext
    pub key: String,
    pub nonce: String,
    pub ciphertext: String,
    pub tag: String,
}

impl SealedRecord {
    /// Seal a move and secret under a freshly generated key
    pub fn seal(mv: Move, secret: &Secret) -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut key[..]);
        OsRng.fill_bytes(&mut nonce);

        let mut data = Zeroizing::new(Vec::with_capacity(PLAINTEXT_LEN));
        data.push(mv.code());
        data.extend_from_slice(secret.as_bytes());
        apply_keystream(&key, &nonce, &mut data);

        Self {
            version: RECORD_VERSION,
            key: hex::encode(&key[..]),
            nonce: hex::encode(nonce),
            tag: hex::encode(tag(&key, &nonce, &data)),
            ciphertext: hex::encode(data.as_slice()),
        }
    }

    /// Check the tag and recover the move and secret
    pub fn open(&self, record: &VaultKey) -> Result<(Move, Secret), VaultError> {
        let corrupt = |reason: &str| VaultError::Corrupt {
            key: record.clone(),
            reason: reason.to_string(),
        };

        if self.version != RECORD_VERSION {
            return Err(corrupt("unsupported record version"));
        }
        let key: Zeroizing<[u8; 32]> = Zeroizing::new(
            decode_fixed(&self.key).ok_or_else(|| corrupt("bad key encoding"))?,
        );
        let nonce: [u8; 16] =
            decode_fixed(&self.nonce).ok_or_else(|| corrupt("bad nonce encoding"))?;
        let expected_tag: [u8; 32] =
            decode_fixed(&self.tag).ok_or_else(|| corrupt("bad tag encoding"))?;
        let mut data = Zeroizing::new(
            hex::decode(&self.ciphertext).map_err(|_| corrupt("bad ciphertext encoding"))?,
        );

        if data.len() != PLAINTEXT_LEN {
            return Err(corrupt("unexpected ciphertext length"));
        }
        if tag(&key, &nonce, &data) != expected_tag {
            return Err(corrupt("integrity tag mismatch"));
        }

        apply_keystream(&key, &nonce, &mut data);
        let mv = Move::try_from(data[0]).map_err(|_| corrupt("invalid move code"))?;
        let mut raw = Zeroizing::new([0u8; SECRET_LEN]);
        raw.copy_from_slice(&data[1..]);
        Ok((mv, Secret::from_bytes(*raw)))
    }
}

fn apply_keystream(key: &[u8; 32], nonce: &[u8; 16], data: &mut [u8]) {
    for (counter, chunk) in data.chunks_mut(32).enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(KEYSTREAM_DOMAIN);
        hasher.update(key);
        hasher.update(nonce);
        hasher.update((counter as u64).to_be_bytes());
        let block = Zeroizing::new(<[u8; 32]>::from(hasher.finalize()));
        for (byte, mask) in chunk.iter_mut().zip(block.iter()) {
            *byte ^= mask;
        }
    }
}

fn tag(key: &[u8; 32], nonce: &[u8; 16], ciphertext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(TAG_DOMAIN);
    hasher.update(key);
    hasher.update(nonce);
    hasher.update(ciphertext);
    hasher.finalize().into()
}

fn decode_fixed<const N: usize>(s: &str) -> Option<[u8; N]> {
    hex::decode(s).ok()?.try_into().ok()
}
