//! Per-match state machine.
//!
//! Pure and synchronous: callers feed it ledger snapshots and local action
//! results, and act on the effects it returns.

use super::types::{ledger_time, GameSnapshot, MatchPhase, MatchRecord, Role};
use crate::error::GameError;
use rpsls_ledger::game::{resolve, Move, Outcome};
use tracing::debug;

/// Something the owner of the machine must react to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// The counter-move arrived; the committer must reveal
    RevealDue,
    /// The opponent idled past the timeout; we may claim
    TimeoutClaimable,
    /// Our own reveal window lapsed; the opponent may claim
    RevealWindowExpired,
    /// The match paid out
    Resolved {
        outcome: Option<Outcome>,
        message: String,
    },
    /// The opponent claimed the pot after our timeout
    TimedOut,
}

/// Lifecycle of one match
#[derive(Clone, Debug)]
pub struct GameStateMachine {
    record: MatchRecord,
    phase: MatchPhase,
    /// `last_action` for which the timeout was already reported
    notified_for: Option<u64>,
    /// A reveal was sent and its confirmation is still outstanding
    reveal_pending: bool,
}

impl GameStateMachine {
    /// A fresh machine, before anything was committed or played
    pub fn new(record: MatchRecord) -> Self {
        Self {
            record,
            phase: MatchPhase::AwaitingCommitment,
            notified_for: None,
            reveal_pending: false,
        }
    }

    /// Machine for a match found on the ledger but absent locally
    pub fn resume(record: MatchRecord) -> Self {
        let phase = match record.role {
            Role::Committer => MatchPhase::AwaitingOpponentMove,
            Role::Joiner if record.own_move.is_some() => MatchPhase::AwaitingOpponentMove,
            Role::Joiner => MatchPhase::AwaitingCommitment,
        };
        Self {
            record,
            phase,
            notified_for: None,
            reveal_pending: false,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn record(&self) -> &MatchRecord {
        &self.record
    }

    pub fn role(&self) -> Role {
        self.record.role
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Our commitment is on the ledger
    pub fn record_commit(&mut self) -> Result<(), GameError> {
        self.expect_phase(Role::Committer, MatchPhase::AwaitingCommitment)?;
        self.transition(MatchPhase::AwaitingOpponentMove);
        Ok(())
    }

    /// Our counter-move is on the ledger; we now wait for the committer's reveal
    pub fn record_join(&mut self, mv: Move) -> Result<(), GameError> {
        self.expect_phase(Role::Joiner, MatchPhase::AwaitingCommitment)?;
        self.record.own_move = Some(mv);
        self.record.last_action_at = chrono::Utc::now();
        self.transition(MatchPhase::AwaitingOpponentMove);
        Ok(())
    }

    /// Whether a reveal may be submitted now
    pub fn check_can_reveal(&self) -> Result<(), GameError> {
        if self.record.role != Role::Committer {
            return Err(GameError::NotParticipant(self.record.match_id));
        }
        match self.phase {
            MatchPhase::AwaitingOwnReveal => Ok(()),
            MatchPhase::AwaitingCommitment | MatchPhase::AwaitingOpponentMove => {
                Err(GameError::OpponentNotYetMoved)
            }
            _ => Err(GameError::GameAlreadyResolved(self.record.match_id)),
        }
    }

    /// A reveal is about to be sent
    pub fn begin_reveal(&mut self) -> Result<(), GameError> {
        self.check_can_reveal()?;
        self.reveal_pending = true;
        Ok(())
    }

    /// The reveal never reached the ledger
    pub fn cancel_reveal(&mut self) {
        self.reveal_pending = false;
    }

    /// The reveal was confirmed; payout follows on the ledger
    pub fn record_reveal(&mut self) -> Result<(), GameError> {
        self.check_can_reveal()?;
        self.reveal_pending = false;
        self.record.last_action_at = chrono::Utc::now();
        self.transition(MatchPhase::AwaitingResolution);
        Ok(())
    }

    /// Our timeout claim was confirmed
    pub fn record_timeout_claim(&mut self) -> Result<(), GameError> {
        if self.is_terminal() {
            return Err(GameError::GameAlreadyResolved(self.record.match_id));
        }
        self.transition(MatchPhase::TimedOut);
        Ok(())
    }

    /// Give up on the match after an unrecoverable local error
    pub fn abandon(&mut self) {
        if !self.is_terminal() {
            self.transition(MatchPhase::Abandoned);
        }
    }

    /// Feed one ledger snapshot and collect the resulting effects
    pub fn observe(&mut self, snapshot: &GameSnapshot) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.is_terminal() {
            return effects;
        }

        self.record.last_action_at = ledger_time(snapshot.last_action);
        if self.record.role == Role::Committer && snapshot.player2_move.is_some() {
            self.record.opponent_move = snapshot.player2_move;
        }

        if snapshot.is_settled() {
            if self.forfeited(snapshot) {
                self.transition(MatchPhase::TimedOut);
                effects.push(Effect::TimedOut);
            } else {
                let outcome = self.record.moves().map(|(p1, p2)| resolve(p1, p2));
                self.transition(MatchPhase::Resolved { outcome });
                effects.push(Effect::Resolved {
                    outcome,
                    message: result_message(outcome, snapshot),
                });
            }
            return effects;
        }
        self.record.stake = snapshot.stake;

        if self.phase == MatchPhase::AwaitingOpponentMove
            && self.record.role == Role::Committer
            && snapshot.player2_move.is_some()
        {
            self.transition(MatchPhase::AwaitingOwnReveal);
            effects.push(Effect::RevealDue);
        }

        if snapshot.timeout_elapsed() && self.notified_for != Some(snapshot.last_action) {
            let effect = match self.phase {
                MatchPhase::AwaitingOpponentMove => Some(Effect::TimeoutClaimable),
                MatchPhase::AwaitingOwnReveal => Some(Effect::RevealWindowExpired),
                _ => None,
            };
            if let Some(effect) = effect {
                self.notified_for = Some(snapshot.last_action);
                effects.push(effect);
            }
        }

        effects
    }

    /// Settled while we owed a reveal and the deadline had passed: the joiner
    /// claimed the pot. Also holds when we were resumed after the fact.
    fn forfeited(&self, snapshot: &GameSnapshot) -> bool {
        self.record.role == Role::Committer
            && snapshot.player2_move.is_some()
            && self.phase != MatchPhase::AwaitingResolution
            && !self.reveal_pending
            && snapshot.timeout_elapsed()
    }

    fn expect_phase(&self, role: Role, phase: MatchPhase) -> Result<(), GameError> {
        if self.record.role != role {
            return Err(GameError::NotParticipant(self.record.match_id));
        }
        if self.is_terminal() {
            return Err(GameError::GameAlreadyResolved(self.record.match_id));
        }
        if self.phase != phase {
            return Err(GameError::AlreadyJoined(self.record.match_id));
        }
        Ok(())
    }

    fn transition(&mut self, next: MatchPhase) {
        debug!(
            match_id = %self.record.match_id,
            role = %self.record.role,
            from = %self.phase,
            to = %next,
            "match phase change"
        );
        self.phase = next;
    }
}

/// Human-readable result line
pub fn result_message(outcome: Option<Outcome>, snapshot: &GameSnapshot) -> String {
    match outcome {
        Some(Outcome::Draw) => "Draw!".to_string(),
        Some(Outcome::FirstWins) => format!("Winner: {}", snapshot.player1),
        Some(Outcome::SecondWins) => format!("Winner: {}", snapshot.player2),
        None => "Game resolved".to_string(),
    }
}
