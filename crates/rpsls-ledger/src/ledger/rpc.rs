//! JSON-RPC client for an external signing gateway.
//!
//! The gateway owns the wallet, encodes contract calls and waits for
//! confirmations. This client only maps the match operations onto its
//! `rps_*` methods.

use super::traits::{LedgerError, LedgerGateway, MatchState, TxId, TxReceipt};
use super::types::{Address, Wei};
use crate::crypto::{Commitment, Secret};
use crate::game::Move;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Error code wallets use when the user dismisses a signing prompt
const USER_REJECTED_CODE: i64 = 4001;

/// Raw match fields as returned by `rps_readState`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMatchState {
    c1_hash: String,
    c2: u8,
    stake: String,
    last_action: u64,
    timeout: u64,
    j1: Address,
    j2: Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    timestamp: u64,
}

/// RPC client for a ledger signing gateway
pub struct RpcLedgerGateway {
    /// HTTP client
    client: Client,
    /// Gateway RPC URL
    rpc_url: String,
}

impl RpcLedgerGateway {
    /// Create a new RPC client
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            rpc_url: rpc_url.into(),
        }
    }

    /// Make a JSON-RPC call
    /// Note: params are sent as an array containing a single object
    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [params],
        });

        debug!(method, "gateway request");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        let result: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        debug!(method, ok = result.get("error").is_none(), "gateway response");

        if let Some(error) = result.get("error") {
            return Err(map_rpc_error(error));
        }

        result
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::MalformedResponse("no result in response".to_string()))
    }

    async fn call_for_receipt(&self, method: &str, params: Value) -> Result<TxReceipt, LedgerError> {
        let result = self.call(method, params).await?;
        let raw: RawReceipt = parse(result)?;
        Ok(TxReceipt {
            tx_id: TxId::new(),
            timestamp: raw.timestamp,
        })
    }
}

fn parse<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, LedgerError> {
    serde_json::from_value(value).map_err(|e| LedgerError::MalformedResponse(e.to_string()))
}

fn parse_wei(s: &str) -> Result<Wei, LedgerError> {
    Wei::from_hex_quantity(s)
        .ok_or_else(|| LedgerError::MalformedResponse(format!("bad quantity {s:?}")))
}

fn parse_commitment(s: &str) -> Result<Commitment, LedgerError> {
    let malformed = || LedgerError::MalformedResponse(format!("bad commitment {s:?}"));
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|_| malformed())?;
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| malformed())?;
    Ok(Commitment::from_bytes(bytes))
}

/// Map a JSON-RPC error object onto a ledger error
fn map_rpc_error(error: &Value) -> LedgerError {
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown error")
        .to_string();

    match error.get("code") {
        Some(Value::Number(n)) if n.as_i64() == Some(USER_REJECTED_CODE) => {
            LedgerError::UserRejected
        }
        Some(Value::String(code)) if code == "INSUFFICIENT_FUNDS" => LedgerError::InsufficientFunds,
        Some(Value::String(code)) if code == "INVALID_ARGUMENT" => {
            LedgerError::InvalidArgument(message)
        }
        Some(Value::String(code)) if code == "NETWORK_ERROR" || code == "TIMEOUT" => {
            LedgerError::Network(message)
        }
        _ => LedgerError::Reverted(message),
    }
}

#[async_trait]
impl LedgerGateway for RpcLedgerGateway {
    async fn account(&self) -> Result<Address, LedgerError> {
        parse(self.call("rps_account", json!({})).await?)
    }

    async fn balance(&self, account: &Address) -> Result<Wei, LedgerError> {
        let result = self.call("rps_balance", json!({ "account": account })).await?;
        let quantity: String = parse(result)?;
        parse_wei(&quantity)
    }

    async fn timestamp(&self) -> Result<u64, LedgerError> {
        parse(self.call("rps_timestamp", json!({})).await?)
    }

    async fn deploy_match(
        &self,
        commitment: &Commitment,
        opponent: &Address,
        stake: Wei,
    ) -> Result<Address, LedgerError> {
        let params = json!({
            "c1Hash": format!("0x{}", commitment.to_hex()),
            "j2": opponent,
            "value": stake.to_hex_quantity(),
        });
        parse(self.call("rps_deployMatch", params).await?)
    }

    async fn join_match(
        &self,
        game: &Address,
        mv: Move,
        stake: Wei,
    ) -> Result<TxReceipt, LedgerError> {
        let params = json!({
            "game": game,
            "c2": mv.code(),
            "value": stake.to_hex_quantity(),
        });
        self.call_for_receipt("rps_joinMatch", params).await
    }

    async fn read_state(&self, game: &Address) -> Result<MatchState, LedgerError> {
        let raw: RawMatchState = parse(self.call("rps_readState", json!({ "game": game })).await?)?;
        let player2_move = Move::from_ledger_field(raw.c2)
            .map_err(|e| LedgerError::MalformedResponse(e.to_string()))?;
        Ok(MatchState {
            commitment: parse_commitment(&raw.c1_hash)?,
            player2_move,
            stake: parse_wei(&raw.stake)?,
            last_action: raw.last_action,
            timeout_secs: raw.timeout,
            player1: raw.j1,
            player2: raw.j2,
        })
    }

    async fn submit_reveal(
        &self,
        game: &Address,
        mv: Move,
        secret: &Secret,
        gas_limit: u64,
    ) -> Result<TxReceipt, LedgerError> {
        let params = json!({
            "game": game,
            "c1": mv.code(),
            "salt": format!("0x{}", secret.to_hex()),
            "gasLimit": format!("0x{gas_limit:x}"),
        });
        self.call_for_receipt("rps_solve", params).await
    }

    async fn submit_timeout_claim(&self, game: &Address) -> Result<TxReceipt, LedgerError> {
        self.call_for_receipt("rps_claimTimeout", json!({ "game": game }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejection_code() {
        let error = json!({ "code": 4001, "message": "User denied transaction signature" });
        assert!(matches!(map_rpc_error(&error), LedgerError::UserRejected));
    }

    #[test]
    fn test_named_error_codes() {
        let funds = json!({ "code": "INSUFFICIENT_FUNDS", "message": "insufficient funds" });
        assert!(matches!(map_rpc_error(&funds), LedgerError::InsufficientFunds));

        let network = json!({ "code": "NETWORK_ERROR", "message": "down" });
        assert!(map_rpc_error(&network).is_transient());

        let other = json!({ "code": -32000, "message": "execution reverted" });
        match map_rpc_error(&other) {
            LedgerError::Reverted(msg) => assert_eq!(msg, "execution reverted"),
            e => panic!("unexpected error: {e:?}"),
        }
    }

    #[test]
    fn test_raw_state_deserialization() {
        let raw: RawMatchState = serde_json::from_value(json!({
            "c1Hash": format!("0x{}", "ab".repeat(32)),
            "c2": 4,
            "stake": "0x2386f26fc10000",
            "lastAction": 1700000000u64,
            "timeout": 300,
            "j1": "0x1111111111111111111111111111111111111111",
            "j2": "0x2222222222222222222222222222222222222222",
        }))
        .unwrap();

        assert_eq!(Move::from_ledger_field(raw.c2).unwrap(), Some(Move::Spock));
        assert_eq!(parse_wei(&raw.stake).unwrap(), Wei(10_000_000_000_000_000));
        assert_eq!(
            parse_commitment(&raw.c1_hash).unwrap(),
            Commitment::from_bytes([0xab; 32])
        );
        assert!(parse_commitment("0xabcd").is_err());
    }

    #[test]
    fn test_out_of_range_move_is_malformed() {
        assert!(Move::from_ledger_field(7).is_err());
    }
}
