//! Protocol types.

use chrono::{DateTime, Utc};
use rpsls_ledger::crypto::Commitment;
use rpsls_ledger::game::{Move, Outcome};
use rpsls_ledger::ledger::{Address, MatchState, Wei};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the match this client plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Deployed the match with a hidden move (player 1)
    Committer,
    /// Plays the counter-move in the clear (player 2)
    Joiner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Committer => write!(f, "committer"),
            Role::Joiner => write!(f, "joiner"),
        }
    }
}

/// Lifecycle phase of one match from this client's point of view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPhase {
    AwaitingCommitment,
    AwaitingOpponentMove,
    AwaitingOwnReveal,
    AwaitingResolution,
    /// Paid out; the outcome is known only when both moves are
    Resolved { outcome: Option<Outcome> },
    TimedOut,
    Abandoned,
}

impl MatchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MatchPhase::Resolved { .. } | MatchPhase::TimedOut | MatchPhase::Abandoned
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPhase::AwaitingCommitment => "awaiting commitment",
            MatchPhase::AwaitingOpponentMove => "awaiting opponent move",
            MatchPhase::AwaitingOwnReveal => "awaiting own reveal",
            MatchPhase::AwaitingResolution => "awaiting resolution",
            MatchPhase::Resolved { .. } => "resolved",
            MatchPhase::TimedOut => "timed out",
            MatchPhase::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One timestamped read of the ledger-visible match fields
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub match_id: Address,
    pub commitment: Commitment,
    pub player2_move: Option<Move>,
    pub stake: Wei,
    pub last_action: u64,
    pub timeout_secs: u64,
    pub player1: Address,
    pub player2: Address,
    /// Ledger time at which the fields were read
    pub taken_at: u64,
}

impl GameSnapshot {
    pub fn new(match_id: Address, state: MatchState, taken_at: u64) -> Self {
        Self {
            match_id,
            commitment: state.commitment,
            player2_move: state.player2_move,
            stake: state.stake,
            last_action: state.last_action,
            timeout_secs: state.timeout_secs,
            player1: state.player1,
            player2: state.player2,
            taken_at,
        }
    }

    /// Ledger time after which the idle party can be timed out
    pub fn deadline(&self) -> u64 {
        self.last_action.saturating_add(self.timeout_secs)
    }

    /// Mirrors the contract's `now > lastAction + timeout`
    pub fn timeout_elapsed(&self) -> bool {
        self.taken_at > self.deadline()
    }

    pub fn is_settled(&self) -> bool {
        self.stake.is_zero()
    }

    /// Role of `account` in this match, if it takes part at all
    pub fn role_of(&self, account: &Address) -> Option<Role> {
        if *account == self.player1 {
            Some(Role::Committer)
        } else if *account == self.player2 {
            Some(Role::Joiner)
        } else {
            None
        }
    }
}

/// Local aggregate of one match.
///
/// The secret never lives here; it stays sealed in the vault until reveal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: Address,
    pub role: Role,
    pub account: Address,
    pub opponent: Address,
    /// Our commitment; only the committer has one
    pub commitment: Option<Commitment>,
    pub stake: Wei,
    pub own_move: Option<Move>,
    /// Counter-move as seen on the ledger (committer role only)
    pub opponent_move: Option<Move>,
    pub created_at: DateTime<Utc>,
    pub last_action_at: DateTime<Utc>,
}

impl MatchRecord {
    /// Record for a match we just deployed
    pub fn committer(
        match_id: Address,
        account: Address,
        opponent: Address,
        commitment: Commitment,
        own_move: Move,
        stake: Wei,
    ) -> Self {
        let now = Utc::now();
        Self {
            match_id,
            role: Role::Committer,
            account,
            opponent,
            commitment: Some(commitment),
            stake,
            own_move: Some(own_move),
            opponent_move: None,
            created_at: now,
            last_action_at: now,
        }
    }

    /// Record for a match we were invited to
    pub fn joiner(match_id: Address, account: Address, opponent: Address, stake: Wei) -> Self {
        let now = Utc::now();
        Self {
            match_id,
            role: Role::Joiner,
            account,
            opponent,
            commitment: None,
            stake,
            own_move: None,
            opponent_move: None,
            created_at: now,
            last_action_at: now,
        }
    }

    /// Rebuild a record from the ledger after a restart
    pub fn from_snapshot(snapshot: &GameSnapshot, role: Role, own_move: Option<Move>) -> Self {
        let (account, opponent) = match role {
            Role::Committer => (snapshot.player1, snapshot.player2),
            Role::Joiner => (snapshot.player2, snapshot.player1),
        };
        let last_action_at = ledger_time(snapshot.last_action);
        Self {
            match_id: snapshot.match_id,
            role,
            account,
            opponent,
            commitment: match role {
                Role::Committer => Some(snapshot.commitment),
                Role::Joiner => None,
            },
            stake: snapshot.stake,
            own_move,
            opponent_move: match role {
                Role::Committer => snapshot.player2_move,
                Role::Joiner => None,
            },
            created_at: last_action_at,
            last_action_at,
        }
    }

    /// Both moves, ordered (player 1, player 2), when known
    pub fn moves(&self) -> Option<(Move, Move)> {
        match self.role {
            Role::Committer => Some((self.own_move?, self.opponent_move?)),
            Role::Joiner => None,
        }
    }
}

/// Convert ledger seconds to a wall-clock timestamp
pub fn ledger_time(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
