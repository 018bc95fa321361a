//! RPSLS Demo
//!
//! Plays one complete match between two local sessions. Player A commits and
//! reveals, player B joins with a counter-move, and every presentation event
//! is logged.
//!
//! Environment:
//! - `LEDGER_RPC_URL_A` / `LEDGER_RPC_URL_B` - signing gateways for both players
//!   (both required; otherwise an in-process mock chain is used)
//! - `DEMO_MOVE_A` / `DEMO_MOVE_B` - move codes 1-5 (default 4 and 1)
//! - `DEMO_STAKE` - stake in ether (default 0.01)
//! - `RPSLS_*` - see `GameConfig::from_env`

use rpsls_core::{
    EventChannel, FileVault, GameConfig, GameManager, MemoryVault, PresentationEvent, Role,
    Section, SecretVault, Session, Severity,
};
use rpsls_ledger::ledger::{format_ether, Address, LedgerGateway, MockLedger, RpcLedgerGateway, Wei};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// 10 ether for each mock account
const MOCK_FUNDS: Wei = Wei(10_000_000_000_000_000_000);

fn gateways() -> (Arc<dyn LedgerGateway>, Arc<dyn LedgerGateway>) {
    match (
        std::env::var("LEDGER_RPC_URL_A"),
        std::env::var("LEDGER_RPC_URL_B"),
    ) {
        (Ok(a), Ok(b)) => {
            info!("Player A using ledger RPC: {}", a);
            info!("Player B using ledger RPC: {}", b);
            (
                Arc::new(RpcLedgerGateway::new(a)),
                Arc::new(RpcLedgerGateway::new(b)),
            )
        }
        _ => {
            info!("Using MockLedger (set LEDGER_RPC_URL_A and LEDGER_RPC_URL_B to use real gateways)");
            let a = MockLedger::new(Address::random(), MOCK_FUNDS);
            let b = a.connect(Address::random(), MOCK_FUNDS);
            (Arc::new(a), Arc::new(b))
        }
    }
}

fn log_event(player: &str, event: &PresentationEvent) {
    match event {
        PresentationEvent::Status {
            message,
            severity: Severity::Success,
        } => info!("{}: {}", player, message),
        PresentationEvent::Status {
            message,
            severity: Severity::Error,
        } => warn!("{}: {}", player, message),
        PresentationEvent::Section { section, visible } => {
            info!("{}: {} {}", player, section, if *visible { "shown" } else { "hidden" })
        }
    }
}

async fn log_events(player: &'static str, mut events: UnboundedReceiver<PresentationEvent>) {
    while let Some(event) = events.recv().await {
        log_event(player, &event);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GameConfig::from_env();
    let move_a = std::env::var("DEMO_MOVE_A").unwrap_or_else(|_| "4".to_string());
    let move_b = std::env::var("DEMO_MOVE_B").unwrap_or_else(|_| "1".to_string());
    let stake = std::env::var("DEMO_STAKE").unwrap_or_else(|_| "0.01".to_string());

    let (gateway_a, gateway_b) = gateways();
    let session_a = Session::connect(gateway_a).await?;
    let session_b = Session::connect(gateway_b).await?;
    info!("Player A: {} (balance: {} ETH)", session_a.account(), format_ether(session_a.balance().await?));
    info!("Player B: {} (balance: {} ETH)", session_b.account(), format_ether(session_b.balance().await?));

    // Player A keeps its secret on disk so a restart can still reveal
    let vault_a: Arc<dyn SecretVault> = Arc::new(FileVault::open(config.vault_dir.join("player-a"))?);
    let vault_b: Arc<dyn SecretVault> = Arc::new(MemoryVault::new());

    let (channel_a, mut events_a) = EventChannel::new();
    let (channel_b, events_b) = EventChannel::new();
    let player_a = GameManager::new(session_a, vault_a, Arc::new(channel_a), config.clone());
    let player_b = GameManager::new(session_b, vault_b, Arc::new(channel_b), config);
    tokio::spawn(log_events("Player B", events_b));

    let opponent = player_b.session().account().to_string();
    let game = player_a.create_game(&move_a, &opponent, &stake).await?;
    let monitor_a = player_a.start_monitoring(&game, Role::Committer).await?;

    let info = player_b.stake_info(&game.to_string()).await?;
    info!("Player B: match {} asks for {} ETH", game, format_ether(info.stake));
    player_b.join_game(&game.to_string(), &move_b).await?;
    let monitor_b = player_b.start_monitoring(&game, Role::Joiner).await?;

    // React to A's events until the result is shown
    while let Some(event) = events_a.recv().await {
        log_event("Player A", &event);
        match event {
            PresentationEvent::Section {
                section: Section::Reveal,
                visible: true,
            } => {
                if let Err(e) = player_a.reveal(&game).await {
                    player_a.shutdown();
                    player_b.shutdown();
                    return Err(e.into());
                }
            }
            PresentationEvent::Section {
                section: Section::Result,
                visible: true,
            } => break,
            _ => {}
        }
    }

    monitor_a.wait().await;
    monitor_b.wait().await;

    info!("Player A final phase: {:?}", player_a.phase(&game));
    info!("Player B final phase: {:?}", player_b.phase(&game));
    info!("Player A balance: {} ETH", format_ether(player_a.session().balance().await?));
    info!("Player B balance: {} ETH", format_ether(player_b.session().balance().await?));

    player_a.shutdown();
    player_b.shutdown();
    Ok(())
}
