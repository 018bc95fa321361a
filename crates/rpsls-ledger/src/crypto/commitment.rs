//! Commitment and Secret for the commit-reveal scheme.

use crate::game::{Move, MoveError};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain tag mixed into every commitment digest
const COMMITMENT_DOMAIN: &[u8] = b"rpsls/commitment/v1";

/// Length of a secret in bytes
pub const SECRET_LEN: usize = 32;

/// 256-bit blinding secret, wiped on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_LEN]);

impl Secret {
    /// Draw a fresh secret from the operating system CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    /// Hex form, as submitted to the gateway at reveal time
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

/// Commitment = H(domain || move || secret)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(#[serde(with = "hex_bytes")] [u8; 32]);

impl Commitment {
    /// Create a commitment from a move and secret
    pub fn new(mv: Move, secret: &Secret) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update([mv.code()]);
        hasher.update(secret.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Verify that the given move and secret open this commitment
    pub fn verify(&self, mv: Move, secret: &Secret) -> bool {
        *self == Self::new(mv, secret)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Commit to a move with a freshly drawn secret.
///
/// Persisting the secret is the caller's job.
pub fn commit(mv: Move) -> (Commitment, Secret) {
    let secret = Secret::random();
    (Commitment::new(mv, &secret), secret)
}

/// Commit to a raw move code, rejecting anything outside 1-5
pub fn commit_code(code: u8) -> Result<(Commitment, Secret), MoveError> {
    Move::try_from(code).map(commit)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let hex_str = String::deserialize(d)?;
        let bytes = hex::decode(&hex_str).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}
