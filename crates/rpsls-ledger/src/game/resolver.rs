//! Match outcome resolution.

use super::Move;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Match outcome, from the perspective of argument order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Draw,
    FirstWins,
    SecondWins,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Draw => "Draw",
            Outcome::FirstWins => "First wins",
            Outcome::SecondWins => "Second wins",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decide a match between two revealed moves.
///
/// Both the client and the mock contract settle through this function.
pub fn resolve(first: Move, second: Move) -> Outcome {
    if first == second {
        Outcome::Draw
    } else if first.beats(second) {
        Outcome::FirstWins
    } else {
        Outcome::SecondWins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spock_beats_rock() {
        assert_eq!(resolve(Move::Spock, Move::Rock), Outcome::FirstWins);
        assert_eq!(resolve(Move::Rock, Move::Spock), Outcome::SecondWins);
    }

    #[test]
    fn test_lizard_beats_paper() {
        assert_eq!(resolve(Move::Lizard, Move::Paper), Outcome::FirstWins);
        assert_eq!(resolve(Move::Paper, Move::Lizard), Outcome::SecondWins);
    }

    #[test]
    fn test_draws() {
        for mv in Move::ALL {
            assert_eq!(resolve(mv, mv), Outcome::Draw);
        }
    }

    #[test]
    fn test_all_outcomes() {
        let mut first = 0;
        let mut second = 0;
        let mut draws = 0;

        for a in Move::ALL {
            for b in Move::ALL {
                match resolve(a, b) {
                    Outcome::FirstWins => first += 1,
                    Outcome::SecondWins => second += 1,
                    Outcome::Draw => draws += 1,
                }
                if a != b {
                    // Swapping arguments must swap the winner
                    let swapped = resolve(b, a);
                    assert_ne!(swapped, Outcome::Draw);
                    assert_ne!(swapped, resolve(a, b));
                }
            }
        }

        assert_eq!(first, 10);
        assert_eq!(second, 10);
        assert_eq!(draws, 5);
    }
}
