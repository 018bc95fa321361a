//! Cryptographic primitives for the commit-reveal protocol.

mod commitment;

pub use commitment::{commit, commit_code, Commitment, Secret, SECRET_LEN};
