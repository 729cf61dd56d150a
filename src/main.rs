mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use wallet_tracker::api::{self, AppState};
use wallet_tracker::config::Config;
use wallet_tracker::helius::HeliusClient;
use wallet_tracker::history::{HistoryRequest, HistoryService};
use wallet_tracker::normalize::Thresholds;
use wallet_tracker::price::{BirdeyeClient, CoinGeckoClient};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let state = build_state(&config)?;

    match cli.command {
        Commands::Serve { addr } => {
            let bind = addr.unwrap_or_else(|| config.http_bind_addr.clone());
            api::run_http_server(&bind, state).await?;
        }
        Commands::History {
            wallet,
            limit,
            cursor,
            min_sol_amount,
            min_token_amount,
        } => {
            let request = HistoryRequest {
                wallet,
                limit,
                cursor,
                thresholds: Thresholds {
                    min_native_amount: min_sol_amount,
                    min_token_amount,
                },
            };
            let page = state
                .history
                .fetch_page(&request)
                .await
                .with_context(|| format!("failed to fetch history for {}", request.wallet))?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Balances { wallet } => {
            let balances = state
                .balances
                .fetch_balances(&wallet)
                .await
                .with_context(|| format!("failed to fetch balances for {}", wallet))?;
            println!("{}", serde_json::to_string_pretty(&balances)?);
        }
    }

    Ok(())
}

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let helius = Arc::new(HeliusClient::new(
        &config.helius_api_url,
        &config.helius_rpc_url,
        &config.helius_api_key,
        config.rate_limit,
    )?);
    let prices = Arc::new(CoinGeckoClient::new(&config.price_api_url)?);
    if config.birdeye_api_key.is_none() {
        tracing::warn!("BIRDEYE_API_KEY not set; single-token prices are unavailable");
    }
    let token_prices = Arc::new(BirdeyeClient::new(
        &config.birdeye_api_url,
        config.birdeye_api_key.clone(),
    )?);

    let history = HistoryService::new(
        helius.clone(),
        helius.clone(),
        prices.clone(),
        config.history_batch_size,
    );

    Ok(AppState {
        history,
        balances: helius.clone(),
        metadata: helius,
        prices,
        token_prices,
    })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
