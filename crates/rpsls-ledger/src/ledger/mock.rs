//! Mock ledger for testing.
//!
//! Mirrors the match contract in memory: deploy, play, solve and both
//! timeout claims, with a simulated clock and injectable failures.

use super::traits::{LedgerError, LedgerGateway, MatchState, TxId, TxReceipt};
use super::types::{Address, Wei};
use crate::crypto::{Commitment, Secret};
use crate::game::{resolve, Move, Outcome};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Idle window enforced by the mirrored contract (5 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Starting ledger time for a fresh mock chain
const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Kind of write action recorded by the mock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockActionKind {
    Deploy,
    Join,
    Reveal,
    TimeoutClaim,
}

/// A write action that reached the mock ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockSubmission {
    pub account: Address,
    pub kind: MockActionKind,
    pub accepted: bool,
}

/// Match contract storage
#[derive(Clone, Debug)]
struct MatchContract {
    player1: Address,
    player2: Address,
    commitment: Commitment,
    player2_move: Option<Move>,
    stake: Wei,
    last_action: u64,
    timeout_secs: u64,
}

/// Failure to inject into the next write action
#[derive(Clone, Debug)]
enum InjectedFailure {
    UserRejected,
    Reverted(String),
    Network(String),
    /// Applied on the ledger, but the confirmation never arrives
    LostConfirmation(String),
}

struct ChainState {
    now: u64,
    timeout_secs: u64,
    balances: HashMap<Address, Wei>,
    matches: HashMap<Address, MatchContract>,
    failing_reads: u32,
    next_write_failure: Option<InjectedFailure>,
    submissions: Vec<MockSubmission>,
}

impl ChainState {
    fn debit(&mut self, account: &Address, amount: Wei) -> Result<(), LedgerError> {
        let balance = self.balances.entry(*account).or_default();
        *balance = balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds)?;
        Ok(())
    }

    fn credit(&mut self, account: &Address, amount: Wei) {
        let balance = self.balances.entry(*account).or_default();
        *balance = balance.checked_add(amount).unwrap_or(Wei(u128::MAX));
    }

    fn receipt(&self) -> TxReceipt {
        TxReceipt {
            tx_id: TxId::new(),
            timestamp: self.now,
        }
    }
}

/// In-memory mock ledger for testing.
///
/// Clones and [`MockLedger::connect`] handles share one chain; each handle
/// signs as its own account.
#[derive(Clone)]
pub struct MockLedger {
    chain: Arc<Mutex<ChainState>>,
    account: Address,
}

impl MockLedger {
    /// Create a new chain with one funded account
    pub fn new(account: Address, initial_balance: Wei) -> Self {
        let mut balances = HashMap::new();
        balances.insert(account, initial_balance);
        Self {
            chain: Arc::new(Mutex::new(ChainState {
                now: GENESIS_TIMESTAMP,
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                balances,
                matches: HashMap::new(),
                failing_reads: 0,
                next_write_failure: None,
                submissions: Vec::new(),
            })),
            account,
        }
    }

    /// Handle on the same chain signing as another funded account
    pub fn connect(&self, account: Address, initial_balance: Wei) -> Self {
        self.chain
            .lock()
            .unwrap()
            .balances
            .insert(account, initial_balance);
        Self {
            chain: Arc::clone(&self.chain),
            account,
        }
    }

    /// Signing account of this handle
    pub fn address(&self) -> Address {
        self.account
    }

    /// Balance of an account
    pub fn balance_of(&self, account: &Address) -> Wei {
        self.chain
            .lock()
            .unwrap()
            .balances
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    /// Current simulated ledger time
    pub fn now(&self) -> u64 {
        self.chain.lock().unwrap().now
    }

    /// Advance simulated ledger time by seconds
    pub fn advance_time(&self, seconds: u64) {
        self.chain.lock().unwrap().now += seconds;
    }

    /// Timeout used by contracts deployed from now on
    pub fn set_timeout(&self, seconds: u64) {
        self.chain.lock().unwrap().timeout_secs = seconds;
    }

    /// Make the next `count` state reads fail with a network error
    pub fn fail_next_reads(&self, count: u32) {
        self.chain.lock().unwrap().failing_reads = count;
    }

    /// Make the next write action revert with the given reason
    pub fn revert_next_write(&self, reason: impl Into<String>) {
        self.chain.lock().unwrap().next_write_failure = Some(InjectedFailure::Reverted(reason.into()));
    }

    /// Make the next write action fail as if the user dismissed the signing prompt
    pub fn reject_next_signature(&self) {
        self.chain.lock().unwrap().next_write_failure = Some(InjectedFailure::UserRejected);
    }

    /// Make the next write action fail with a network error before reaching the ledger
    pub fn drop_next_write(&self) {
        self.chain.lock().unwrap().next_write_failure =
            Some(InjectedFailure::Network("connection reset".to_string()));
    }

    /// Apply the next write action but report a network error instead of its result
    pub fn lose_next_confirmation(&self) {
        self.chain.lock().unwrap().next_write_failure =
            Some(InjectedFailure::LostConfirmation("confirmation timed out".to_string()));
    }

    /// Addresses of every deployed match (for testing)
    pub fn match_ids(&self) -> Vec<Address> {
        self.chain.lock().unwrap().matches.keys().copied().collect()
    }

    /// All write actions seen so far (for testing)
    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.chain.lock().unwrap().submissions.clone()
    }

    /// Count accepted write actions of a kind (for testing)
    pub fn accepted(&self, kind: MockActionKind) -> usize {
        self.chain
            .lock()
            .unwrap()
            .submissions
            .iter()
            .filter(|s| s.kind == kind && s.accepted)
            .count()
    }

    /// Run a write action against the chain, recording it and applying any injected failure
    fn write<T>(
        &self,
        kind: MockActionKind,
        action: impl FnOnce(&mut ChainState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut chain = self.chain.lock().unwrap();
        let mut lost = None;
        let result = match chain.next_write_failure.take() {
            Some(InjectedFailure::UserRejected) => Err(LedgerError::UserRejected),
            Some(InjectedFailure::Reverted(reason)) => Err(LedgerError::Reverted(reason)),
            Some(InjectedFailure::Network(reason)) => return Err(LedgerError::Network(reason)),
            Some(InjectedFailure::LostConfirmation(reason)) => {
                lost = Some(reason);
                action(&mut *chain)
            }
            None => action(&mut *chain),
        };
        chain.submissions.push(MockSubmission {
            account: self.account,
            kind,
            accepted: result.is_ok(),
        });
        match lost {
            Some(reason) if result.is_ok() => Err(LedgerError::Network(reason)),
            _ => result,
        }
    }
}

fn contract_mut<'a>(
    chain: &'a mut ChainState,
    game: &Address,
) -> Result<&'a mut MatchContract, LedgerError> {
    chain
        .matches
        .get_mut(game)
        .ok_or(LedgerError::MatchNotFound(*game))
}

fn revert(reason: &str) -> LedgerError {
    LedgerError::Reverted(reason.to_string())
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn account(&self) -> Result<Address, LedgerError> {
        Ok(self.account)
    }

    async fn balance(&self, account: &Address) -> Result<Wei, LedgerError> {
        Ok(self.balance_of(account))
    }

    async fn timestamp(&self) -> Result<u64, LedgerError> {
        Ok(self.now())
    }

    async fn deploy_match(
        &self,
        commitment: &Commitment,
        opponent: &Address,
        stake: Wei,
    ) -> Result<Address, LedgerError> {
        let player1 = self.account;
        self.write(MockActionKind::Deploy, |chain| {
            if stake.is_zero() {
                return Err(revert("stake must be positive"));
            }
            chain.debit(&player1, stake)?;
            let game = Address::random();
            let contract = MatchContract {
                player1,
                player2: *opponent,
                commitment: *commitment,
                player2_move: None,
                stake,
                last_action: chain.now,
                timeout_secs: chain.timeout_secs,
            };
            chain.matches.insert(game, contract);
            Ok(game)
        })
    }

    async fn join_match(
        &self,
        game: &Address,
        mv: Move,
        stake: Wei,
    ) -> Result<TxReceipt, LedgerError> {
        let caller = self.account;
        self.write(MockActionKind::Join, |chain| {
            let now = chain.now;
            let contract = contract_mut(chain, game)?;
            if contract.player2 != caller {
                return Err(revert("only player 2 can play"));
            }
            if contract.player2_move.is_some() {
                return Err(revert("player 2 already played"));
            }
            if contract.stake.is_zero() {
                return Err(revert("match already settled"));
            }
            if contract.stake != stake {
                return Err(revert("stake must match"));
            }
            chain.debit(&caller, stake)?;
            let contract = contract_mut(chain, game)?;
            contract.player2_move = Some(mv);
            contract.last_action = now;
            Ok(chain.receipt())
        })
    }

    async fn read_state(&self, game: &Address) -> Result<MatchState, LedgerError> {
        let mut chain = self.chain.lock().unwrap();
        if chain.failing_reads > 0 {
            chain.failing_reads -= 1;
            return Err(LedgerError::Network("simulated read failure".to_string()));
        }
        let contract = chain
            .matches
            .get(game)
            .ok_or(LedgerError::MatchNotFound(*game))?;
        Ok(MatchState {
            commitment: contract.commitment,
            player2_move: contract.player2_move,
            stake: contract.stake,
            last_action: contract.last_action,
            timeout_secs: contract.timeout_secs,
            player1: contract.player1,
            player2: contract.player2,
        })
    }

    async fn submit_reveal(
        &self,
        game: &Address,
        mv: Move,
        secret: &Secret,
        gas_limit: u64,
    ) -> Result<TxReceipt, LedgerError> {
        let caller = self.account;
        self.write(MockActionKind::Reveal, |chain| {
            if gas_limit == 0 {
                return Err(revert("out of gas"));
            }
            let contract = contract_mut(chain, game)?;
            if contract.player1 != caller {
                return Err(revert("only player 1 can solve"));
            }
            let counter = contract
                .player2_move
                .ok_or_else(|| revert("player 2 has not played"))?;
            if contract.stake.is_zero() {
                return Err(revert("match already settled"));
            }
            if !contract.commitment.verify(mv, secret) {
                return Err(revert("commitment mismatch"));
            }

            let stake = contract.stake;
            let pot = stake
                .checked_add(stake)
                .ok_or_else(|| revert("pot overflow"))?;
            let (player1, player2) = (contract.player1, contract.player2);
            // Settling leaves last_action untouched
            contract.stake = Wei::ZERO;

            match resolve(mv, counter) {
                Outcome::FirstWins => chain.credit(&player1, pot),
                Outcome::SecondWins => chain.credit(&player2, pot),
                Outcome::Draw => {
                    chain.credit(&player1, stake);
                    chain.credit(&player2, stake);
                }
            }
            Ok(chain.receipt())
        })
    }

    async fn submit_timeout_claim(&self, game: &Address) -> Result<TxReceipt, LedgerError> {
        let caller = self.account;
        self.write(MockActionKind::TimeoutClaim, |chain| {
            let now = chain.now;
            let contract = contract_mut(chain, game)?;
            if contract.stake.is_zero() {
                return Err(revert("match already settled"));
            }
            if now <= contract.last_action + contract.timeout_secs {
                return Err(revert("timeout has not elapsed"));
            }

            let stake = contract.stake;
            let pot = stake
                .checked_add(stake)
                .ok_or_else(|| revert("pot overflow"))?;
            let payout = match (contract.player2_move, caller) {
                // Player 1 never revealed
                (Some(_), c) if c == contract.player2 => (contract.player2, pot),
                // Player 2 never played
                (None, c) if c == contract.player1 => (contract.player1, stake),
                _ => return Err(revert("caller cannot claim this timeout")),
            };
            contract.stake = Wei::ZERO;
            chain.credit(&payout.0, payout.1);
            Ok(chain.receipt())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::commit;
    use crate::ledger::types::WEI_PER_ETHER;

    const STAKE: Wei = Wei(WEI_PER_ETHER / 10);

    fn players() -> (MockLedger, MockLedger) {
        let alice = MockLedger::new(Address::random(), Wei(WEI_PER_ETHER));
        let bob = alice.connect(Address::random(), Wei(WEI_PER_ETHER));
        (alice, bob)
    }

    #[tokio::test]
    async fn test_deploy_locks_stake() {
        let (alice, bob) = players();
        let (commitment, _) = commit(Move::Rock);

        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();

        assert_eq!(alice.balance_of(&alice.address()), Wei(WEI_PER_ETHER - STAKE.0));
        let state = alice.read_state(&game).await.unwrap();
        assert_eq!(state.stake, STAKE);
        assert_eq!(state.player2_move, None);
        assert_eq!(state.player1, alice.address());
        assert_eq!(state.player2, bob.address());
    }

    #[tokio::test]
    async fn test_full_match_pays_winner() {
        let (alice, bob) = players();
        let (commitment, secret) = commit(Move::Spock);
        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();

        bob.join_match(&game, Move::Rock, STAKE).await.unwrap();
        alice
            .submit_reveal(&game, Move::Spock, &secret, 100_000)
            .await
            .unwrap();

        assert_eq!(alice.balance_of(&alice.address()), Wei(WEI_PER_ETHER + STAKE.0));
        assert_eq!(bob.balance_of(&bob.address()), Wei(WEI_PER_ETHER - STAKE.0));
        assert!(alice.read_state(&game).await.unwrap().stake.is_zero());
    }

    #[tokio::test]
    async fn test_draw_refunds_both() {
        let (alice, bob) = players();
        let (commitment, secret) = commit(Move::Paper);
        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();
        bob.join_match(&game, Move::Paper, STAKE).await.unwrap();
        alice
            .submit_reveal(&game, Move::Paper, &secret, 100_000)
            .await
            .unwrap();

        assert_eq!(alice.balance_of(&alice.address()), Wei(WEI_PER_ETHER));
        assert_eq!(bob.balance_of(&bob.address()), Wei(WEI_PER_ETHER));
    }

    #[tokio::test]
    async fn test_reveal_with_wrong_move_reverts() {
        let (alice, bob) = players();
        let (commitment, secret) = commit(Move::Rock);
        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();
        bob.join_match(&game, Move::Paper, STAKE).await.unwrap();

        let result = alice
            .submit_reveal(&game, Move::Scissors, &secret, 100_000)
            .await;
        assert!(matches!(result, Err(LedgerError::Reverted(_))));
        assert_eq!(alice.read_state(&game).await.unwrap().stake, STAKE);
    }

    #[tokio::test]
    async fn test_join_requires_exact_stake() {
        let (alice, bob) = players();
        let (commitment, _) = commit(Move::Rock);
        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();

        let result = bob.join_match(&game, Move::Paper, Wei(STAKE.0 - 1)).await;
        assert!(matches!(result, Err(LedgerError::Reverted(_))));
    }

    #[tokio::test]
    async fn test_only_invited_opponent_can_join() {
        let (alice, bob) = players();
        let mallory = alice.connect(Address::random(), Wei(WEI_PER_ETHER));
        let (commitment, _) = commit(Move::Rock);
        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();

        let result = mallory.join_match(&game, Move::Paper, STAKE).await;
        assert!(matches!(result, Err(LedgerError::Reverted(_))));
    }

    #[tokio::test]
    async fn test_timeout_claim_by_committer() {
        let (alice, bob) = players();
        let (commitment, _) = commit(Move::Rock);
        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();

        let early = alice.submit_timeout_claim(&game).await;
        assert!(matches!(early, Err(LedgerError::Reverted(_))));

        alice.advance_time(DEFAULT_TIMEOUT_SECS + 1);
        alice.submit_timeout_claim(&game).await.unwrap();

        assert_eq!(alice.balance_of(&alice.address()), Wei(WEI_PER_ETHER));
        assert!(alice.read_state(&game).await.unwrap().stake.is_zero());
    }

    #[tokio::test]
    async fn test_timeout_claim_by_joiner() {
        let (alice, bob) = players();
        let (commitment, _) = commit(Move::Rock);
        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();
        bob.join_match(&game, Move::Paper, STAKE).await.unwrap();

        bob.advance_time(DEFAULT_TIMEOUT_SECS + 1);
        bob.submit_timeout_claim(&game).await.unwrap();

        assert_eq!(bob.balance_of(&bob.address()), Wei(WEI_PER_ETHER + STAKE.0));
    }

    #[tokio::test]
    async fn test_pot_overflow_reverts_without_settling() {
        let huge = Wei(u128::MAX / 2 + 1);
        let alice = MockLedger::new(Address::random(), huge);
        let bob = alice.connect(Address::random(), huge);
        let (commitment, secret) = commit(Move::Rock);
        let game = alice
            .deploy_match(&commitment, &bob.address(), huge)
            .await
            .unwrap();
        bob.join_match(&game, Move::Scissors, huge).await.unwrap();

        let result = alice
            .submit_reveal(&game, Move::Rock, &secret, 100_000)
            .await;
        assert!(matches!(result, Err(LedgerError::Reverted(ref r)) if r == "pot overflow"));
        assert_eq!(alice.read_state(&game).await.unwrap().stake, huge);

        bob.advance_time(DEFAULT_TIMEOUT_SECS + 1);
        let result = bob.submit_timeout_claim(&game).await;
        assert!(matches!(result, Err(LedgerError::Reverted(ref r)) if r == "pot overflow"));
        assert_eq!(bob.read_state(&game).await.unwrap().stake, huge);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let (alice, bob) = players();
        let (commitment, _) = commit(Move::Rock);

        alice.reject_next_signature();
        let result = alice.deploy_match(&commitment, &bob.address(), STAKE).await;
        assert!(matches!(result, Err(LedgerError::UserRejected)));

        let game = alice
            .deploy_match(&commitment, &bob.address(), STAKE)
            .await
            .unwrap();

        alice.lose_next_confirmation();
        let result = alice.deploy_match(&commitment, &bob.address(), STAKE).await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(alice.match_ids().len(), 2);

        alice.fail_next_reads(2);
        assert!(alice.read_state(&game).await.unwrap_err().is_transient());
        assert!(alice.read_state(&game).await.is_err());
        assert!(alice.read_state(&game).await.is_ok());

        assert_eq!(alice.accepted(MockActionKind::Deploy), 2);
        assert_eq!(alice.submissions().len(), 3);
    }
}
