//! Connected account and its ledger gateway.

use crate::error::GameError;
use crate::protocol::GameSnapshot;
use chrono::{DateTime, Utc};
use rpsls_ledger::ledger::{Address, LedgerGateway, Wei};
use std::sync::Arc;
use tracing::info;

/// One connection to the ledger.
///
/// Created on connect and consumed on disconnect; everything that needs the
/// current account gets it from here.
#[derive(Clone)]
pub struct Session {
    gateway: Arc<dyn LedgerGateway>,
    account: Address,
    connected_at: DateTime<Utc>,
}

impl Session {
    /// Connect through a gateway and learn which account it signs for
    pub async fn connect(gateway: Arc<dyn LedgerGateway>) -> Result<Self, GameError> {
        let account = gateway.account().await?;
        info!(%account, "session connected");
        Ok(Self {
            gateway,
            account,
            connected_at: Utc::now(),
        })
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        &self.gateway
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub async fn balance(&self) -> Result<Wei, GameError> {
        Ok(self.gateway.balance(&self.account).await?)
    }

    /// Read the match fields and the ledger clock concurrently
    pub async fn snapshot(&self, game: &Address) -> Result<GameSnapshot, GameError> {
        let (state, now) = tokio::join!(self.gateway.read_state(game), self.gateway.timestamp());
        Ok(GameSnapshot::new(*game, state?, now?))
    }

    pub fn disconnect(self) {
        info!(account = %self.account, "session disconnected");
    }
}
