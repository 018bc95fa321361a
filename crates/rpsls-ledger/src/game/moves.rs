//! Move codes and the win relation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing move input
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("Invalid move code: {0} (expected 1-5)")]
    InvalidCode(u8),

    #[error("Invalid move input: {0:?}")]
    InvalidInput(String),
}

/// Rock-Paper-Scissors-Spock-Lizard move.
///
/// The discriminants are the codes stored by the match contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Move {
    Rock = 1,
    Paper = 2,
    Scissors = 3,
    Spock = 4,
    Lizard = 5,
}

impl Move {
    /// All moves in code order
    pub const ALL: [Move; 5] = [
        Move::Rock,
        Move::Paper,
        Move::Scissors,
        Move::Spock,
        Move::Lizard,
    ];

    /// Numeric code (1-5)
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Convert an on-ledger counter-move field, where 0 means "not played yet"
    pub fn from_ledger_field(code: u8) -> Result<Option<Move>, MoveError> {
        match code {
            0 => Ok(None),
            c => Move::try_from(c).map(Some),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Move::Rock => "Rock",
            Move::Paper => "Paper",
            Move::Scissors => "Scissors",
            Move::Spock => "Spock",
            Move::Lizard => "Lizard",
        }
    }

    /// Check if this move beats the other
    pub fn beats(self, other: Move) -> bool {
        WIN_RELATION.beats(self, other)
    }
}

impl TryFrom<u8> for Move {
    type Error = MoveError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Move::Rock),
            2 => Ok(Move::Paper),
            3 => Ok(Move::Scissors),
            4 => Ok(Move::Spock),
            5 => Ok(Move::Lizard),
            other => Err(MoveError::InvalidCode(other)),
        }
    }
}

impl From<Move> for u8 {
    fn from(mv: Move) -> u8 {
        mv.code()
    }
}

/// Parses the decimal code only ("1".."5"); names and padded input are rejected.
impl FromStr for Move {
    type Err = MoveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 1 {
            return Err(MoveError::InvalidInput(s.to_string()));
        }
        let code: u8 = s
            .parse()
            .map_err(|_| MoveError::InvalidInput(s.to_string()))?;
        Move::try_from(code)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// Fixed beats-relation over the five moves.
///
/// Every move defeats exactly two others and loses to the remaining two.
pub struct WinRelation {
    wins: [[Move; 2]; 5],
}

/// The process-wide win relation
pub static WIN_RELATION: WinRelation = WinRelation {
    wins: [
        [Move::Scissors, Move::Lizard], // Rock
        [Move::Rock, Move::Spock],      // Paper
        [Move::Paper, Move::Lizard],    // Scissors
        [Move::Scissors, Move::Rock],   // Spock
        [Move::Spock, Move::Paper],     // Lizard
    ],
};

impl WinRelation {
    /// Moves defeated by `mv`
    pub fn defeated_by(&self, mv: Move) -> &[Move; 2] {
        &self.wins[usize::from(mv.code() - 1)]
    }

    pub fn beats(&self, a: Move, b: Move) -> bool {
        self.defeated_by(a).contains(&b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for mv in Move::ALL {
            assert_eq!(Move::try_from(mv.code()).unwrap(), mv);
        }
    }

    #[test]
    fn test_invalid_codes_rejected() {
        assert_eq!(Move::try_from(0), Err(MoveError::InvalidCode(0)));
        assert_eq!(Move::try_from(6), Err(MoveError::InvalidCode(6)));
        assert_eq!(Move::try_from(255), Err(MoveError::InvalidCode(255)));
    }

    #[test]
    fn test_from_str_is_strict() {
        assert_eq!("4".parse::<Move>().unwrap(), Move::Spock);
        assert!("0".parse::<Move>().is_err());
        assert!("6".parse::<Move>().is_err());
        assert!("04".parse::<Move>().is_err());
        assert!(" 1".parse::<Move>().is_err());
        assert!("Rock".parse::<Move>().is_err());
        assert!("".parse::<Move>().is_err());
    }

    #[test]
    fn test_ledger_field_zero_means_absent() {
        assert_eq!(Move::from_ledger_field(0).unwrap(), None);
        assert_eq!(Move::from_ledger_field(2).unwrap(), Some(Move::Paper));
        assert!(Move::from_ledger_field(9).is_err());
    }

    #[test]
    fn test_relation_is_total_and_asymmetric() {
        for a in Move::ALL {
            assert!(!a.beats(a), "{a} must not beat itself");
            for b in Move::ALL {
                if a != b {
                    assert!(
                        a.beats(b) ^ b.beats(a),
                        "exactly one of {a} and {b} must win"
                    );
                }
            }
        }
    }

    #[test]
    fn test_spock_beats_scissors_and_rock() {
        assert_eq!(
            WIN_RELATION.defeated_by(Move::Spock),
            &[Move::Scissors, Move::Rock]
        );
        assert!(Move::Lizard.beats(Move::Spock));
        assert!(Move::Paper.beats(Move::Spock));
    }

    #[test]
    fn test_serde_uses_codes() {
        assert_eq!(serde_json::to_string(&Move::Lizard).unwrap(), "5");
        assert_eq!(serde_json::from_str::<Move>("3").unwrap(), Move::Scissors);
        assert!(serde_json::from_str::<Move>("7").is_err());
    }
}
