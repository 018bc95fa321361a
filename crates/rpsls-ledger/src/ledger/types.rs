//! Ledger value types: account addresses and wei amounts.

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Wei per ether
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

const ETHER_DECIMALS: usize = 18;

/// Errors from parsing addresses and amounts
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid address format: {0:?}")]
    Address(String),

    #[error("Invalid ether amount: {0:?}")]
    Amount(String),
}

/// 20-byte account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Random address, used by the mock ledger for fresh contracts
    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

/// Accepts exactly `0x` followed by 40 hex digits, in any case.
impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .filter(|d| d.len() == 40 && d.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| ParseError::Address(s.to_string()))?;
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| ParseError::Address(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(s)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Amount in wei
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Wei) -> Option<Wei> {
        self.0.checked_add(other.0).map(Wei)
    }

    pub fn checked_sub(self, other: Wei) -> Option<Wei> {
        self.0.checked_sub(other.0).map(Wei)
    }

    /// Hex quantity as used in JSON-RPC (`0x` prefixed, no leading zeros)
    pub fn to_hex_quantity(&self) -> String {
        format!("0x{:x}", self.0)
    }

    pub fn from_hex_quantity(s: &str) -> Option<Wei> {
        let digits = s.strip_prefix("0x")?;
        u128::from_str_radix(digits, 16).ok().map(Wei)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ETH", format_ether(*self))
    }
}

/// Parse a decimal ether string ("0.01", "1", "1.5") into wei.
///
/// Signs, exponents, whitespace and more than 18 fractional digits are rejected.
pub fn parse_ether(input: &str) -> Result<Wei, ParseError> {
    let err = || ParseError::Amount(input.to_string());

    let (whole, frac) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(err());
    }
    if frac.len() > ETHER_DECIMALS
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(err());
    }

    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .ok()
            .and_then(|w| w.checked_mul(WEI_PER_ETHER))
            .ok_or_else(err)?
    };
    let frac_wei = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<width$}", width = ETHER_DECIMALS);
        padded.parse::<u128>().map_err(|_| err())?
    };

    whole_wei.checked_add(frac_wei).map(Wei).ok_or_else(err)
}

/// Format wei as a decimal ether string without trailing zeros
pub fn format_ether(amount: Wei) -> String {
    let whole = amount.0 / WEI_PER_ETHER;
    let frac = amount.0 % WEI_PER_ETHER;
    if frac == 0 {
        return format!("{whole}.0");
    }
    let frac = format!("{frac:0>width$}", width = ETHER_DECIMALS);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}
