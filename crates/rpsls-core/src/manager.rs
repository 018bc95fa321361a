//! Match actions: create, join, reveal, claim timeout and monitoring.
//!
//! `GameManager` is cheap to clone; all clones share one set of matches.
//! Ledger writes are guarded by an in-flight flag per (match, action), and no
//! lock is held across an await.

use crate::config::GameConfig;
use crate::error::{Action, ActionError, GameError};
use crate::poller::{MonitorHandle, PollStatus, StatePoller};
use crate::presentation::{Presentation, Section, Severity};
use crate::protocol::{Effect, GameSnapshot, GameStateMachine, MatchPhase, MatchRecord, Role};
use crate::session::Session;
use crate::validate::{validate_address, validate_move, validate_stake, validate_stake_input};
use crate::vault::{SecretVault, VaultError, VaultKey};
use rpsls_ledger::crypto::commit;
use rpsls_ledger::game::Move;
use rpsls_ledger::ledger::{format_ether, Address, LedgerError, TxReceipt, Wei};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Local state kept per match
struct MatchEntry {
    machine: GameStateMachine,
    vault_key: VaultKey,
}

struct Inner {
    session: Session,
    vault: Arc<dyn SecretVault>,
    presentation: Arc<dyn Presentation>,
    config: GameConfig,
    poller: StatePoller,
    matches: Mutex<HashMap<Address, MatchEntry>>,
    in_flight: Mutex<HashSet<(Address, Action)>>,
}

/// Stake preview of a match, as shown before joining
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StakeInfo {
    pub match_id: Address,
    pub stake: Wei,
    pub player2_moved: bool,
    pub settled: bool,
}

impl StakeInfo {
    pub fn can_join(&self) -> bool {
        !self.player2_moved && !self.settled
    }
}

/// Entry point for every match action of one session
#[derive(Clone)]
pub struct GameManager {
    inner: Arc<Inner>,
}

impl GameManager {
    pub fn new(
        session: Session,
        vault: Arc<dyn SecretVault>,
        presentation: Arc<dyn Presentation>,
        config: GameConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                vault,
                presentation,
                config,
                poller: StatePoller::new(),
                matches: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn config(&self) -> &GameConfig {
        &self.inner.config
    }

    /// Current phase of a locally known match
    pub fn phase(&self, game: &Address) -> Option<MatchPhase> {
        let matches = self.inner.matches.lock().unwrap();
        matches.get(game).map(|entry| entry.machine.phase())
    }

    /// Copy of the local record of a match
    pub fn record(&self, game: &Address) -> Option<MatchRecord> {
        let matches = self.inner.matches.lock().unwrap();
        matches.get(game).map(|entry| entry.machine.record().clone())
    }

    /// Commit to a move and deploy a match against `opponent`.
    ///
    /// The secret is sealed in the vault before anything reaches the ledger.
    pub async fn create_game(
        &self,
        mv: &str,
        opponent: &str,
        stake: &str,
    ) -> Result<Address, ActionError> {
        self.report(Action::CreateGame, self.create_game_inner(mv, opponent, stake).await)
    }

    async fn create_game_inner(
        &self,
        mv: &str,
        opponent: &str,
        stake: &str,
    ) -> Result<Address, GameError> {
        let account = self.inner.session.account();
        let mv = validate_move(mv)?;
        let opponent = validate_address(opponent)?;
        if opponent == account {
            return Err(GameError::SelfPlayRejected);
        }
        let stake = validate_stake_input(stake, &self.inner.config)?;

        let (commitment, secret) = commit(mv);
        let pending = VaultKey::pending(&commitment);
        self.inner.vault.store(&pending, mv, &secret)?;
        drop(secret);

        let gateway = self.inner.session.gateway();
        let game = match gateway.deploy_match(&commitment, &opponent, stake).await {
            Ok(game) => game,
            Err(e @ LedgerError::Network(_)) => {
                // The deploy may still land; recovery finds the record by commitment
                warn!(record = %pending, error = %e, "deploy outcome unknown, keeping secret");
                return Err(e.into());
            }
            Err(e) => {
                self.purge_quietly(&pending);
                return Err(e.into());
            }
        };

        let settled = VaultKey::for_match(&game);
        let vault_key = match self.inner.vault.rekey(&pending, &settled) {
            Ok(()) => settled,
            Err(e) => {
                warn!(match_id = %game, error = %e, "could not rekey vault record, keeping pending key");
                pending
            }
        };

        let record = MatchRecord::committer(game, account, opponent, commitment, mv, stake);
        let mut machine = GameStateMachine::new(record);
        machine.record_commit()?;
        self.inner
            .matches
            .lock()
            .unwrap()
            .insert(game, MatchEntry { machine, vault_key });

        info!(match_id = %game, %opponent, %stake, "match created");
        self.inner.presentation.update_status(
            &format!("Game created at {game} with {} ETH at stake", format_ether(stake)),
            Severity::Success,
        );
        Ok(game)
    }

    /// Play the counter-move in a match we were invited to, paying the posted stake
    pub async fn join_game(&self, game: &str, mv: &str) -> Result<TxReceipt, ActionError> {
        self.report(Action::JoinGame, self.join_game_inner(game, mv).await)
    }

    async fn join_game_inner(&self, game: &str, mv: &str) -> Result<TxReceipt, GameError> {
        let account = self.inner.session.account();
        let mv = validate_move(mv)?;
        let game = validate_address(game)?;
        let _guard = self.begin(game, Action::JoinGame)?;

        let snapshot = self.inner.session.snapshot(&game).await?;
        if snapshot.is_settled() {
            return Err(GameError::GameAlreadyResolved(game));
        }
        let stake = validate_stake(snapshot.stake, &self.inner.config)?;
        if snapshot.player1 == account {
            return Err(GameError::SelfPlayRejected);
        }
        if snapshot.player2 != account {
            return Err(GameError::NotParticipant(game));
        }
        if snapshot.player2_move.is_some() {
            return Err(GameError::AlreadyJoined(game));
        }

        let receipt = self
            .inner
            .session
            .gateway()
            .join_match(&game, mv, stake)
            .await?;

        {
            let mut matches = self.inner.matches.lock().unwrap();
            let entry = matches.entry(game).or_insert_with(|| MatchEntry {
                machine: GameStateMachine::new(MatchRecord::joiner(
                    game,
                    account,
                    snapshot.player1,
                    stake,
                )),
                vault_key: VaultKey::for_match(&game),
            });
            entry.machine.record_join(mv)?;
        }

        info!(match_id = %game, %stake, "joined match");
        self.inner.presentation.toggle_section(Section::JoinGame, false);
        self.inner
            .presentation
            .update_status(&format!("Joined game {game} playing {mv}"), Severity::Success);
        Ok(receipt)
    }

    /// Open our commitment so the contract pays out
    pub async fn reveal(&self, game: &Address) -> Result<TxReceipt, ActionError> {
        self.report(Action::Reveal, self.reveal_inner(game).await)
    }

    async fn reveal_inner(&self, game: &Address) -> Result<TxReceipt, GameError> {
        let _guard = self.begin(*game, Action::Reveal)?;

        // Re-read the ledger right before revealing
        let snapshot = self.inner.session.snapshot(game).await?;
        self.ensure_entry(&snapshot, Some(Role::Committer))?;
        if self.apply(&snapshot)? == PollStatus::Finished {
            return Err(GameError::GameAlreadyResolved(*game));
        }
        let vault_key = {
            let matches = self.inner.matches.lock().unwrap();
            let entry = matches.get(game).ok_or(GameError::UnknownMatch(*game))?;
            entry.machine.check_can_reveal()?;
            entry.vault_key.clone()
        };

        let (mv, secret) = match self.inner.vault.load(&vault_key) {
            Ok(pair) => pair,
            Err(VaultError::NotFound(_)) => {
                error!(match_id = %game, "no stored secret, cannot reveal");
                self.abandon(game, &vault_key);
                return Err(GameError::MissingCommitment(*game));
            }
            Err(e) => return Err(e.into()),
        };
        self.with_machine(game, |machine| machine.begin_reveal())?;

        let result = self
            .inner
            .session
            .gateway()
            .submit_reveal(game, mv, &secret, self.inner.config.reveal_gas_limit)
            .await;
        drop(secret);

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e @ (LedgerError::UserRejected | LedgerError::Network(_))) => {
                warn!(match_id = %game, error = %e, "reveal not submitted");
                self.with_machine(game, |machine| {
                    machine.cancel_reveal();
                    Ok(())
                })?;
                return Err(e.into());
            }
            Err(e) => {
                error!(match_id = %game, error = %e, "reveal rejected, abandoning match");
                self.abandon(game, &vault_key);
                return Err(e.into());
            }
        };

        // The poller may have seen the payout while we waited for confirmation
        if let Some(entry) = self.inner.matches.lock().unwrap().get_mut(game) {
            if !entry.machine.is_terminal() {
                entry.machine.record_reveal()?;
            }
        }
        info!(match_id = %game, %mv, "move revealed");
        self.inner.presentation.toggle_section(Section::Reveal, false);
        self.inner
            .presentation
            .update_status(&format!("Revealed {mv}"), Severity::Success);

        // Payout is usually visible right away
        if let Err(e) = self.sample(game).await {
            warn!(match_id = %game, error = %e, "post-reveal sample failed");
        }
        Ok(receipt)
    }

    /// Collect the pot after the opponent idled past the timeout
    pub async fn claim_timeout(&self, game: &Address) -> Result<TxReceipt, ActionError> {
        self.report(Action::ClaimTimeout, self.claim_timeout_inner(game).await)
    }

    async fn claim_timeout_inner(&self, game: &Address) -> Result<TxReceipt, GameError> {
        let _guard = self.begin(*game, Action::ClaimTimeout)?;

        let snapshot = self.inner.session.snapshot(game).await?;
        self.ensure_entry(&snapshot, None)?;
        if self.apply(&snapshot)? == PollStatus::Finished {
            return Err(GameError::GameAlreadyResolved(*game));
        }

        let receipt = self
            .inner
            .session
            .gateway()
            .submit_timeout_claim(game)
            .await?;

        let (role, vault_key) = {
            let mut matches = self.inner.matches.lock().unwrap();
            let entry = matches.get_mut(game).ok_or(GameError::UnknownMatch(*game))?;
            if !entry.machine.is_terminal() {
                entry.machine.record_timeout_claim()?;
            }
            (entry.machine.role(), entry.vault_key.clone())
        };
        self.purge_quietly(&vault_key);

        info!(match_id = %game, %role, "timeout claimed");
        let status = match role {
            Role::Committer => "Timeout claimed, stake returned",
            Role::Joiner => "Timeout claimed, pot collected",
        };
        self.inner.presentation.toggle_section(Section::ClaimTimeout, false);
        self.inner.presentation.update_status(status, Severity::Success);
        Ok(receipt)
    }

    /// Read the stake a match requires and whether it can still be joined
    pub async fn stake_info(&self, game: &str) -> Result<StakeInfo, ActionError> {
        self.report(Action::LoadGame, self.stake_info_inner(game).await)
    }

    async fn stake_info_inner(&self, game: &str) -> Result<StakeInfo, GameError> {
        let game = validate_address(game)?;
        let snapshot = self.inner.session.snapshot(&game).await?;
        let info = StakeInfo {
            match_id: game,
            stake: snapshot.stake,
            player2_moved: snapshot.player2_move.is_some(),
            settled: snapshot.is_settled(),
        };

        let message = if info.settled {
            format!("Game {game} is already settled")
        } else if info.player2_moved {
            format!("Player 2 has already played in {game}")
        } else {
            format!("Required stake: {} ETH", format_ether(info.stake))
        };
        self.inner
            .presentation
            .toggle_section(Section::JoinGame, info.can_join());
        self.inner.presentation.update_status(&message, Severity::Success);
        Ok(info)
    }

    /// Poll a match until it reaches a terminal phase.
    ///
    /// Monitoring a match unknown to this process rebuilds its record from
    /// the ledger and the vault. Restarting replaces the previous loop.
    pub async fn start_monitoring(
        &self,
        game: &Address,
        role: Role,
    ) -> Result<MonitorHandle, ActionError> {
        self.report(Action::Monitor, self.start_monitoring_inner(game, role).await)
    }

    async fn start_monitoring_inner(
        &self,
        game: &Address,
        role: Role,
    ) -> Result<MonitorHandle, GameError> {
        let snapshot = self.inner.session.snapshot(game).await?;
        self.ensure_entry(&snapshot, Some(role))?;

        let manager = self.clone();
        let game = *game;
        let config = &self.inner.config;
        Ok(self.inner.poller.start(
            game,
            config.poll_interval,
            config.poll_backoff_cap,
            move || {
                let manager = manager.clone();
                async move { manager.sample(&game).await }
            },
        ))
    }

    pub fn stop_monitoring(&self, game: &Address) -> bool {
        self.inner.poller.stop(game)
    }

    pub fn is_monitoring(&self, game: &Address) -> bool {
        self.inner.poller.is_monitoring(game)
    }

    /// Stop every monitor loop of this session
    pub fn shutdown(&self) {
        self.inner.poller.stop_all();
        info!(account = %self.inner.session.account(), "manager shut down");
    }

    /// Take one snapshot and feed it to the match's state machine
    pub async fn sample(&self, game: &Address) -> Result<PollStatus, GameError> {
        let snapshot = self.inner.session.snapshot(game).await?;
        self.apply(&snapshot)
    }

    fn apply(&self, snapshot: &GameSnapshot) -> Result<PollStatus, GameError> {
        let game = snapshot.match_id;
        let (effects, became_terminal, terminal, vault_key) = {
            let mut matches = self.inner.matches.lock().unwrap();
            let entry = matches.get_mut(&game).ok_or(GameError::UnknownMatch(game))?;
            let was_terminal = entry.machine.is_terminal();
            let effects = entry.machine.observe(snapshot);
            let terminal = entry.machine.is_terminal();
            (
                effects,
                terminal && !was_terminal,
                terminal,
                entry.vault_key.clone(),
            )
        };

        self.publish(snapshot, &effects);
        if became_terminal {
            self.purge_quietly(&vault_key);
        }
        Ok(if terminal {
            PollStatus::Finished
        } else {
            PollStatus::Continue
        })
    }

    /// Make sure a local entry exists, rebuilding it from the ledger if needed
    fn ensure_entry(&self, snapshot: &GameSnapshot, role: Option<Role>) -> Result<(), GameError> {
        let game = snapshot.match_id;
        if self.inner.matches.lock().unwrap().contains_key(&game) {
            return Ok(());
        }

        let account = self.inner.session.account();
        let actual = snapshot
            .role_of(&account)
            .ok_or(GameError::NotParticipant(game))?;
        if role.is_some_and(|expected| expected != actual) {
            return Err(GameError::NotParticipant(game));
        }

        let (vault_key, own_move) = match actual {
            Role::Committer => self.recover_secret(snapshot)?,
            Role::Joiner => (VaultKey::for_match(&game), snapshot.player2_move),
        };

        let record = MatchRecord::from_snapshot(snapshot, actual, own_move);
        let machine = GameStateMachine::resume(record);
        info!(match_id = %game, role = %actual, phase = %machine.phase(), "recovered match from ledger");
        self.inner
            .matches
            .lock()
            .unwrap()
            .entry(game)
            .or_insert(MatchEntry { machine, vault_key });
        Ok(())
    }

    /// Find our stored move for a match, also under the key written before deploy
    fn recover_secret(&self, snapshot: &GameSnapshot) -> Result<(VaultKey, Option<Move>), GameError> {
        let game = snapshot.match_id;
        let settled = VaultKey::for_match(&game);
        match self.inner.vault.load(&settled) {
            Ok((mv, _secret)) => return Ok((settled, Some(mv))),
            Err(VaultError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let pending = VaultKey::pending(&snapshot.commitment);
        let mv = match self.inner.vault.load(&pending) {
            Ok((mv, _secret)) => mv,
            Err(VaultError::NotFound(_)) => {
                warn!(match_id = %game, "no stored secret for recovered match");
                return Ok((settled, None));
            }
            Err(e) => return Err(e.into()),
        };
        info!(match_id = %game, record = %pending, "recovered secret written before deploy");
        match self.inner.vault.rekey(&pending, &settled) {
            Ok(()) => Ok((settled, Some(mv))),
            Err(e) => {
                warn!(match_id = %game, error = %e, "could not rekey vault record, keeping pending key");
                Ok((pending, Some(mv)))
            }
        }
    }

    fn publish(&self, snapshot: &GameSnapshot, effects: &[Effect]) {
        let presentation = &self.inner.presentation;
        let game = snapshot.match_id;
        for effect in effects {
            match effect {
                Effect::RevealDue => {
                    info!(match_id = %game, "opponent moved, reveal due");
                    presentation.toggle_section(Section::Reveal, true);
                    presentation.update_status(
                        "Player 2 has made a move. Reveal yours now.",
                        Severity::Success,
                    );
                }
                Effect::TimeoutClaimable => {
                    info!(match_id = %game, deadline = snapshot.deadline(), "opponent timed out");
                    presentation.toggle_section(Section::ClaimTimeout, true);
                    presentation.update_status(
                        "Opponent did not act in time. You can claim the timeout.",
                        Severity::Success,
                    );
                }
                Effect::RevealWindowExpired => {
                    warn!(match_id = %game, deadline = snapshot.deadline(), "reveal window lapsed");
                    presentation.update_status(
                        "Reveal window has passed. The opponent may claim the timeout.",
                        Severity::Error,
                    );
                }
                Effect::Resolved { outcome, message } => {
                    info!(match_id = %game, ?outcome, "match resolved");
                    presentation.toggle_section(Section::Reveal, false);
                    presentation.toggle_section(Section::ClaimTimeout, false);
                    presentation.toggle_section(Section::Result, true);
                    presentation.update_status(message, Severity::Success);
                }
                Effect::TimedOut => {
                    warn!(match_id = %game, "opponent claimed the timeout");
                    presentation.toggle_section(Section::Reveal, false);
                    presentation.update_status(
                        "Match timed out. The opponent claimed the pot.",
                        Severity::Error,
                    );
                }
            }
        }
    }

    fn with_machine<T>(
        &self,
        game: &Address,
        f: impl FnOnce(&mut GameStateMachine) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let mut matches = self.inner.matches.lock().unwrap();
        let entry = matches.get_mut(game).ok_or(GameError::UnknownMatch(*game))?;
        f(&mut entry.machine)
    }

    fn abandon(&self, game: &Address, vault_key: &VaultKey) {
        if let Some(entry) = self.inner.matches.lock().unwrap().get_mut(game) {
            entry.machine.abandon();
        }
        self.purge_quietly(vault_key);
        self.inner.presentation.toggle_section(Section::Reveal, false);
    }

    /// Best-effort purge; failures are only logged
    fn purge_quietly(&self, key: &VaultKey) {
        if let Err(e) = self.inner.vault.purge(key) {
            warn!(record = %key, error = %e, "failed to purge vault record");
        }
    }

    /// Mark an action in flight; the guard clears it when dropped
    fn begin(&self, game: Address, action: Action) -> Result<InFlightGuard<'_>, GameError> {
        if !self.inner.in_flight.lock().unwrap().insert((game, action)) {
            return Err(GameError::ActionInFlight { action, game });
        }
        Ok(InFlightGuard {
            in_flight: &self.inner.in_flight,
            key: (game, action),
        })
    }

    /// Log and display a failed action with its context
    fn report<T>(&self, action: Action, result: Result<T, GameError>) -> Result<T, ActionError> {
        result.map_err(|e| {
            let err = ActionError::new(action, e);
            warn!(action = %action, error = %err.error, "action failed");
            self.inner
                .presentation
                .update_status(&err.to_string(), Severity::Error);
            err
        })
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<(Address, Action)>>,
    key: (Address, Action),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presentation::{EventChannel, PresentationEvent};
    use crate::vault::MemoryVault;
    use async_trait::async_trait;
    use rpsls_ledger::crypto::{Commitment, Secret};
    use rpsls_ledger::ledger::{
        LedgerGateway, MatchState, MockActionKind, MockLedger, DEFAULT_TIMEOUT_SECS, WEI_PER_ETHER,
    };
    use rpsls_ledger::Outcome;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    const FUNDS: Wei = Wei(10 * WEI_PER_ETHER);

    struct Player {
        manager: GameManager,
        vault: MemoryVault,
        events: UnboundedReceiver<PresentationEvent>,
    }

    impl Player {
        fn statuses(&mut self) -> Vec<(String, Severity)> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                if let PresentationEvent::Status { message, severity } = event {
                    out.push((message, severity));
                }
            }
            out
        }
    }

    /// Reveals land at once but their confirmation arrives `delay` later
    struct SlowRevealLedger {
        ledger: MockLedger,
        delay: Duration,
    }

    #[async_trait]
    impl LedgerGateway for SlowRevealLedger {
        async fn account(&self) -> Result<Address, LedgerError> {
            self.ledger.account().await
        }

        async fn balance(&self, account: &Address) -> Result<Wei, LedgerError> {
            self.ledger.balance(account).await
        }

        async fn timestamp(&self) -> Result<u64, LedgerError> {
            self.ledger.timestamp().await
        }

        async fn deploy_match(
            &self,
            commitment: &Commitment,
            opponent: &Address,
            stake: Wei,
        ) -> Result<Address, LedgerError> {
            self.ledger.deploy_match(commitment, opponent, stake).await
        }

        async fn join_match(
            &self,
            game: &Address,
            mv: Move,
            stake: Wei,
        ) -> Result<TxReceipt, LedgerError> {
            self.ledger.join_match(game, mv, stake).await
        }

        async fn read_state(&self, game: &Address) -> Result<MatchState, LedgerError> {
            self.ledger.read_state(game).await
        }

        async fn submit_reveal(
            &self,
            game: &Address,
            mv: Move,
            secret: &Secret,
            gas_limit: u64,
        ) -> Result<TxReceipt, LedgerError> {
            let receipt = self.ledger.submit_reveal(game, mv, secret, gas_limit).await;
            tokio::time::sleep(self.delay).await;
            receipt
        }

        async fn submit_timeout_claim(&self, game: &Address) -> Result<TxReceipt, LedgerError> {
            self.ledger.submit_timeout_claim(game).await
        }
    }

    async fn player(ledger: MockLedger) -> Player {
        player_on(Arc::new(ledger), MemoryVault::new()).await
    }

    async fn player_on(gateway: Arc<dyn LedgerGateway>, vault: MemoryVault) -> Player {
        let session = Session::connect(gateway).await.unwrap();
        let (channel, events) = EventChannel::new();
        let manager = GameManager::new(
            session,
            Arc::new(vault.clone()),
            Arc::new(channel),
            GameConfig::default(),
        );
        Player {
            manager,
            vault,
            events,
        }
    }

    async fn two_players() -> (MockLedger, Player, Player) {
        let alice = MockLedger::new(Address::random(), FUNDS);
        let bob = alice.connect(Address::random(), FUNDS);
        let p1 = player(alice.clone()).await;
        let p2 = player(bob).await;
        (alice, p1, p2)
    }

    #[tokio::test]
    async fn test_self_play_rejected_regardless_of_stake() {
        let (ledger, mut p1, _) = two_players().await;
        let me = p1.manager.session().account().to_string();

        for stake in ["0.01", "0", "1000"] {
            let err = p1.manager.create_game("1", &me, stake).await.unwrap_err();
            assert!(matches!(err.error, GameError::SelfPlayRejected));
        }
        assert!(ledger.submissions().is_empty());
        assert!(p1.vault.is_empty());

        let statuses = p1.statuses();
        assert_eq!(
            statuses[0],
            (
                "Game Creation failed: Cannot play against yourself".to_string(),
                Severity::Error
            )
        );
    }

    #[tokio::test]
    async fn test_create_stores_secret_under_match_key() {
        let (_, p1, p2) = two_players().await;
        let opponent = p2.manager.session().account().to_string();

        let game = p1.manager.create_game("4", &opponent, "0.1").await.unwrap();

        let (mv, _) = p1.vault.load(&VaultKey::for_match(&game)).unwrap();
        assert_eq!(mv.code(), 4);
        assert_eq!(p1.vault.len(), 1);
        assert_eq!(
            p1.manager.phase(&game),
            Some(MatchPhase::AwaitingOpponentMove)
        );
    }

    #[tokio::test]
    async fn test_failed_deploy_purges_pending_secret() {
        let (ledger, p1, p2) = two_players().await;
        let opponent = p2.manager.session().account().to_string();
        ledger.revert_next_write("out of gas");

        let err = p1
            .manager
            .create_game("2", &opponent, "0.1")
            .await
            .unwrap_err();
        assert!(matches!(err.error, GameError::LedgerRejected(_)));
        assert!(p1.vault.is_empty());
    }

    #[tokio::test]
    async fn test_unconfirmed_deploy_keeps_secret_for_recovery() {
        let (ledger, mut p1, p2) = two_players().await;
        let opponent = p2.manager.session().account().to_string();
        ledger.lose_next_confirmation();

        let err = p1
            .manager
            .create_game("4", &opponent, "0.1")
            .await
            .unwrap_err();
        assert!(err.error.is_retryable());
        assert_eq!(p1.vault.len(), 1);

        // The contract is live even though we never learned its address
        let game = ledger.match_ids()[0];
        p2.manager.join_game(&game.to_string(), "1").await.unwrap();

        p1.manager.reveal(&game).await.unwrap();
        assert_eq!(
            p1.manager.phase(&game),
            Some(MatchPhase::Resolved {
                outcome: Some(Outcome::FirstWins)
            })
        );
        assert!(p1.vault.is_empty());
        let winner = format!("Winner: {}", p1.manager.session().account());
        assert!(p1.statuses().iter().any(|(m, _)| *m == winner));
    }

    #[tokio::test]
    async fn test_join_checks() {
        let (ledger, p1, p2) = two_players().await;
        let bob = p2.manager.session().account().to_string();
        let game = p1.manager.create_game("1", &bob, "0.1").await.unwrap();
        let game_str = game.to_string();

        let outsider = player(ledger.connect(Address::random(), FUNDS)).await;
        let err = outsider
            .manager
            .join_game(&game_str, "3")
            .await
            .unwrap_err();
        assert!(matches!(err.error, GameError::NotParticipant(_)));

        // The committer cannot join its own match
        let err = p1.manager.join_game(&game_str, "2").await.unwrap_err();
        assert!(matches!(err.error, GameError::SelfPlayRejected));

        p2.manager.join_game(&game_str, "2").await.unwrap();
        let err = p2.manager.join_game(&game_str, "3").await.unwrap_err();
        assert!(matches!(err.error, GameError::AlreadyJoined(_)));
    }

    #[tokio::test]
    async fn test_reveal_before_opponent_moves() {
        let (_, p1, p2) = two_players().await;
        let bob = p2.manager.session().account().to_string();
        let game = p1.manager.create_game("3", &bob, "0.1").await.unwrap();

        let err = p1.manager.reveal(&game).await.unwrap_err();
        assert!(matches!(err.error, GameError::OpponentNotYetMoved));
        assert!(!err.error.is_fatal());
        assert_eq!(p1.vault.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_secret_abandons() {
        let (ledger, p1, p2) = two_players().await;
        let bob = p2.manager.session().account().to_string();
        let game = p1.manager.create_game("3", &bob, "0.1").await.unwrap();
        p2.manager.join_game(&game.to_string(), "1").await.unwrap();

        p1.vault.purge(&VaultKey::for_match(&game)).unwrap();
        let err = p1.manager.reveal(&game).await.unwrap_err();
        assert!(matches!(err.error, GameError::MissingCommitment(_)));
        assert_eq!(p1.manager.phase(&game), Some(MatchPhase::Abandoned));
        assert_eq!(ledger.accepted(MockActionKind::Reveal), 0);
    }

    #[tokio::test]
    async fn test_cancelled_signature_keeps_match_alive() {
        let (ledger, p1, p2) = two_players().await;
        let bob = p2.manager.session().account().to_string();
        let game = p1.manager.create_game("5", &bob, "0.1").await.unwrap();
        p2.manager.join_game(&game.to_string(), "4").await.unwrap();

        ledger.reject_next_signature();
        let err = p1.manager.reveal(&game).await.unwrap_err();
        assert!(
            matches!(err.error, GameError::LedgerRejected(ref m) if m == "Transaction rejected by user")
        );
        assert_eq!(p1.manager.phase(&game), Some(MatchPhase::AwaitingOwnReveal));

        // Manual retry succeeds; Lizard beats Spock
        p1.manager.reveal(&game).await.unwrap();
        assert!(matches!(
            p1.manager.phase(&game),
            Some(MatchPhase::Resolved { .. })
        ));
        assert!(p1.vault.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_payout_seen_before_reveal_confirmation() {
        let alice = MockLedger::new(Address::random(), FUNDS);
        let bob = alice.connect(Address::random(), FUNDS);
        let slow = SlowRevealLedger {
            ledger: alice.clone(),
            delay: Duration::from_secs(10),
        };
        let mut p1 = player_on(Arc::new(slow), MemoryVault::new()).await;
        let p2 = player(bob).await;
        let opponent = p2.manager.session().account().to_string();

        let game = p1.manager.create_game("4", &opponent, "0.1").await.unwrap();
        p2.manager.join_game(&game.to_string(), "1").await.unwrap();
        let monitor = p1
            .manager
            .start_monitoring(&game, Role::Committer)
            .await
            .unwrap();

        p1.manager.reveal(&game).await.unwrap();
        monitor.wait().await;

        assert_eq!(
            p1.manager.phase(&game),
            Some(MatchPhase::Resolved {
                outcome: Some(Outcome::FirstWins)
            })
        );
        let statuses = p1.statuses();
        assert!(statuses.iter().all(|(_, severity)| *severity == Severity::Success));
        assert!(statuses.iter().any(|(m, _)| m == "Revealed Spock(4)"));
        assert_eq!(alice.accepted(MockActionKind::Reveal), 1);
        assert_eq!(alice.balance_of(&alice.address()), Wei(FUNDS.0 + WEI_PER_ETHER / 10));
    }

    #[tokio::test]
    async fn test_restarted_committer_sees_forfeit() {
        let (ledger, p1, mut p2) = two_players().await;
        let bob = p2.manager.session().account().to_string();
        let game = p1.manager.create_game("4", &bob, "0.1").await.unwrap();
        p1.manager.shutdown();

        p2.manager.join_game(&game.to_string(), "1").await.unwrap();
        ledger.advance_time(DEFAULT_TIMEOUT_SECS + 1);
        p2.manager.claim_timeout(&game).await.unwrap();
        assert!(p2
            .statuses()
            .contains(&("Timeout claimed, pot collected".to_string(), Severity::Success)));

        // Same vault, fresh process
        let mut restarted = player_on(Arc::new(ledger.clone()), p1.vault.clone()).await;
        let err = restarted.manager.reveal(&game).await.unwrap_err();
        assert!(matches!(err.error, GameError::GameAlreadyResolved(_)));
        assert_eq!(restarted.manager.phase(&game), Some(MatchPhase::TimedOut));

        let statuses = restarted.statuses();
        assert!(statuses.contains(&(
            "Match timed out. The opponent claimed the pot.".to_string(),
            Severity::Error
        )));
        assert!(!statuses.iter().any(|(m, _)| m.starts_with("Winner")));
        assert!(restarted.vault.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_guard() {
        let (_, p1, _) = two_players().await;
        let game = Address::random();
        let guard = p1.manager.begin(game, Action::Reveal).unwrap();
        assert!(matches!(
            p1.manager.begin(game, Action::Reveal),
            Err(GameError::ActionInFlight { .. })
        ));
        // Other actions and other matches are independent
        assert!(p1.manager.begin(game, Action::ClaimTimeout).is_ok());
        assert!(p1.manager.begin(Address::random(), Action::Reveal).is_ok());

        drop(guard);
        assert!(p1.manager.begin(game, Action::Reveal).is_ok());
    }

    #[tokio::test]
    async fn test_stake_info_toggles_join_section() {
        let (_, p1, mut p2) = two_players().await;
        let bob = p2.manager.session().account().to_string();
        let game = p1.manager.create_game("1", &bob, "0.25").await.unwrap();

        let info = p2.manager.stake_info(&game.to_string()).await.unwrap();
        assert_eq!(info.stake, Wei(WEI_PER_ETHER / 4));
        assert!(info.can_join());

        let events: Vec<_> = std::iter::from_fn(|| p2.events.try_recv().ok()).collect();
        assert!(events.contains(&PresentationEvent::Section {
            section: Section::JoinGame,
            visible: true,
        }));
        assert!(events.contains(&PresentationEvent::Status {
            message: "Required stake: 0.25 ETH".to_string(),
            severity: Severity::Success,
        }));
    }
}
