use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "wallet-tracker", version, about = "Wallet balances and transaction history")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Override bind address, e.g. 0.0.0.0:3001
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print one page of normalized transaction history as JSON
    History {
        #[arg(long)]
        wallet: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Signature returned as `cursor` by the previous page
        #[arg(long)]
        cursor: Option<String>,
        #[arg(long, default_value_t = 0.0001)]
        min_sol_amount: f64,
        #[arg(long, default_value_t = 0.001)]
        min_token_amount: f64,
    },
    /// Print native and token balances of a wallet
    Balances {
        #[arg(long)]
        wallet: String,
    },
}
