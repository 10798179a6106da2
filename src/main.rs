//! LTV Keeper
//!
//! Keeps a collateralized borrowing position inside a configured LTV band.
//! Every check period the keeper reads the borrow limit and loan amount; when
//! the LTV leaves the band it borrows and deposits (LTV too low) or redeems
//! and repays (LTV too high) in one transaction to bring it back to target.

use std::process::ExitCode;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keeper_chain::{
    create_gas_strategy, MarketAddresses, MarketReader, StepEncoder, TokenDecimals,
    TransactionSenderBuilder,
};
use keeper_core::{Controller, KeeperConfig, KeeperError};

const DEFAULT_LOG_FILTER: &str = "info,keeper_core=debug,keeper_chain=debug";

/// Environment variable names for values that never live in the config file.
mod env {
    pub const PRIVATE_KEY: &str = "LTV_KEEPER_PRIVATE_KEY";
    pub const OVERSEER: &str = "LTV_KEEPER_OVERSEER";
    pub const MARKET: &str = "LTV_KEEPER_MARKET";
    pub const YIELD_TOKEN: &str = "LTV_KEEPER_YIELD_TOKEN";
    pub const POSITION_ACCOUNT: &str = "LTV_KEEPER_POSITION_ACCOUNT";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

/// Process exit statuses.
mod exit {
    pub const CLEAN: u8 = 0;
    pub const SHUTDOWN_TIMEOUT: u8 = 1;
    pub const FAILURE: u8 = 2;
}

#[tokio::main]
async fn main() -> ExitCode {
    print_banner();

    dotenvy::dotenv().ok();
    init_tracing();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = ?e, "LTV keeper failed");
            ExitCode::from(exit::FAILURE)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var(env::LOG_FORMAT)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Secrets and contract addresses, read from the environment only.
struct Secrets {
    private_key: String,
    addresses: MarketAddresses,
}

fn load_secrets() -> Result<Secrets> {
    let get_env = |name: &str| -> Result<String> {
        std::env::var(name).map_err(|_| anyhow!("Missing env var: {}", name))
    };

    let get_address = |name: &str| -> Result<Address> {
        get_env(name)?
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid address for {}: {}", name, e))
    };

    let private_key = std::env::var(env::PRIVATE_KEY).unwrap_or_default();
    if private_key.trim().is_empty() {
        return Err(KeeperError::Config(format!("{} is not set", env::PRIVATE_KEY)).into());
    }

    Ok(Secrets {
        private_key,
        addresses: MarketAddresses {
            overseer: get_address(env::OVERSEER)?,
            market: get_address(env::MARKET)?,
            yield_token: get_address(env::YIELD_TOKEN)?,
            position_account: get_address(env::POSITION_ACCOUNT)?,
        },
    })
}

async fn run() -> Result<u8> {
    let config = KeeperConfig::load().context("loading configuration")?;
    config.log_config();

    let secrets = load_secrets()?;
    let addresses = secrets.addresses;

    info!(
        overseer = %addresses.overseer,
        market = %addresses.market,
        yield_token = %addresses.yield_token,
        position_account = %addresses.position_account,
        "Contracts"
    );

    let reader = MarketReader::new(
        &config.chain.rpc_url,
        config.http_timeout(),
        addresses,
        TokenDecimals {
            stable: config.tokens.stable_decimals,
            yield_token: config.tokens.yield_decimals,
        },
    )?;
    reader
        .health_check(config.chain.chain_id)
        .await
        .context("RPC health check")?;

    let gas_strategy = create_gas_strategy(
        config.gas.pricing.as_str(),
        config.gas.default_gas_price_gwei,
        config.gas.max_gas_price_gwei,
        config.gas.priority_fee_gwei,
    );
    let encoder = StepEncoder::new(
        addresses.market,
        config.tokens.stable_decimals,
        config.tokens.yield_decimals,
    );
    let sender = TransactionSenderBuilder::new(config.chain.rpc_url.clone(), config.chain.chain_id)
        .http_timeout(config.http_timeout())
        .confirmation_timeout(config.confirmation_timeout())
        .gas_limit_multiplier(config.gas.limit_multiplier)
        .gas_strategy(gas_strategy)
        .build(&secrets.private_key, encoder, addresses.position_account)
        .await?;
    drop(secrets);

    let controller = Controller::new(
        Arc::new(reader),
        Arc::new(sender),
        addresses.position_account,
        config.band,
        config.check_period(),
    );

    let shutdown = CancellationToken::new();
    let mut handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { controller.run(shutdown).await }
    });

    info!("All components initialized, press Ctrl+C to stop");

    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received, waiting for in-flight check");
        }
        res = &mut handle => {
            return match res {
                Ok(()) => Err(anyhow!("controller stopped unexpectedly")),
                Err(e) => Err(anyhow!("controller task failed: {e}")),
            };
        }
    }

    shutdown.cancel();
    match tokio::time::timeout(config.shutdown_timeout(), handle).await {
        Ok(Ok(())) => {
            info!("Shutdown complete");
            Ok(exit::CLEAN)
        }
        Ok(Err(e)) => Err(anyhow!("controller task failed: {e}")),
        Err(_) => {
            warn!(
                timeout_secs = config.shutdown_timeout().as_secs(),
                "Shutdown timed out"
            );
            Ok(exit::SHUTDOWN_TIMEOUT)
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╦  ╔╦╗╦  ╦  ╦╔═┌─┐┌─┐┌─┐┌─┐┬─┐
    ║   ║ ╚╗╔╝  ╠╩╗├┤ ├┤ ├─┘├┤ ├┬┘
    ╩═╝ ╩  ╚╝   ╩ ╩└─┘└─┘┴  └─┘┴└─
    LTV Keeper v0.1.0
    "#
    );
}
