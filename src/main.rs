//! Affiliate Mint Server
//!
//! Serves one mint contract over WebSocket. Configured from the environment.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use affiliate_mint::{
    network::{AuthConfig, MintServer, ServerConfig},
    ContractSettings, MintContract, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Affiliate Mint Server v{}", VERSION);

    let settings = ContractSettings::from_env();
    let server_config = ServerConfig::from_env();
    let auth = AuthConfig::from_env();

    if settings.owner.is_zero() {
        warn!("MINT_OWNER not set: owner operations are disabled");
    }
    if !auth.is_configured() {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM: every client will fail authentication");
    }

    let config = &settings.config;
    info!("Owner: {}", settings.owner);
    info!("Unit price: {}", config.unit_price);
    info!("Caps: {} global, {} per wallet", config.global_supply_cap, config.per_wallet_cap);
    info!("Paused: {}", config.paused);
    match config.merkle_root {
        Some(root) => info!("Merkle root: 0x{} (depth {:?})", hex::encode(root), config.merkle_depth),
        None => warn!("No merkle root: affiliate mints will be rejected"),
    }

    let server = MintServer::new(server_config, auth, MintContract::from_settings(settings));

    tokio::select! {
        result = server.run() => result.context("server stopped")?,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("Shutting down");
            server.shutdown();
        }
    }

    Ok(())
}
