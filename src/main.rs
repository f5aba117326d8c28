//! txrun CLI
//!
//! Command-line host for submitting transactions through the pipeline.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use txrun::pipeline::{ConfirmationHooks, Decision, ExecutionResult, ReturnData};
use txrun::providers::NetworkInfo;
use txrun::transaction::{NormalizedTransaction, TransactionIntent};
use txrun::units::{calculate_fee, format_ether, format_gwei};
use txrun::{Config, Error, Result, TxRunner};

#[derive(Parser)]
#[command(name = "txrun")]
#[command(about = "Submit transactions to simulated, injected or remote EVM backends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Provider to use (simulated, injected, remote-node)
    #[arg(short, long, global = true)]
    provider: Option<String>,

    /// Approve every confirmation stage
    #[arg(short, long, global = true)]
    yes: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the provider's accounts
    Accounts,

    /// Show an account's balance in ether
    Balance { address: Address },

    /// Submit a state-changing transaction (contract creation without --to)
    Send {
        /// Destination address
        #[arg(long)]
        to: Option<Address>,

        /// Calldata or creation bytecode (hex)
        #[arg(long, default_value = "0x")]
        data: Bytes,

        /// Value in wei
        #[arg(long)]
        value: Option<String>,

        /// Sending account
        #[arg(long)]
        from: Option<Address>,

        #[arg(long)]
        gas_limit: Option<u64>,
    },

    /// Query a contract without changing state
    Call {
        #[arg(long)]
        to: Address,

        /// Calldata (hex)
        #[arg(long)]
        data: Bytes,

        #[arg(long)]
        from: Option<Address>,
    },

    /// Show the current gas price in gwei
    GasPrice,

    /// Show current configuration
    Config,
}

/// Confirmation hooks driven by the `--yes` flag
struct CliConfirm {
    approve: bool,
}

impl CliConfirm {
    fn decide(&self) -> Decision {
        if self.approve {
            Decision::Proceed
        } else {
            println!("Not confirmed. Re-run with --yes to submit.");
            Decision::Cancel
        }
    }
}

#[async_trait]
impl ConfirmationHooks for CliConfirm {
    async fn confirm_estimate(
        &self,
        network: &NetworkInfo,
        tx: &NormalizedTransaction,
        gas_estimate: u64,
        gas_price: u128,
    ) -> Decision {
        println!("Network:      {} ({})", network.name, network.id);
        println!("From:         {}", tx.from);
        println!("Gas estimate: {}", gas_estimate);
        println!("Gas price:    {} gwei", format_gwei(gas_price));
        println!(
            "Max fee:      {} ether",
            format_ether(calculate_fee(gas_estimate, gas_price))
        );
        self.decide()
    }

    async fn continue_on_error(&self, error: &Error) -> Decision {
        println!("Gas estimation failed: {}", error);
        self.decide()
    }

    async fn prompt(&self) -> Decision {
        if self.approve {
            Decision::Proceed
        } else {
            Decision::Cancel
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(provider) = &cli.provider {
        config.provider = provider.clone();
    }

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let runner = TxRunner::from_config(config)?;
    let audit = runner.start_audit_log();
    let hooks = CliConfirm { approve: cli.yes };

    let outcome = execute(&runner, cli.command, &hooks).await;

    // Closing the pipeline's event channel lets the audit task drain and exit
    drop(runner);
    if let Some(handle) = audit {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Audit log task failed");
        }
    }

    outcome
}

async fn execute(runner: &TxRunner, command: Commands, hooks: &CliConfirm) -> Result<()> {
    match command {
        Commands::Accounts => {
            for account in runner.pipeline().accounts().await? {
                println!("{}", account);
            }
        }
        Commands::Balance { address } => {
            let balance = runner.pipeline().balance_in_ether(address).await?;
            println!("{} ether", balance);
        }
        Commands::Send {
            to,
            data,
            value,
            from,
            gas_limit,
        } => {
            let mut intent = TransactionIntent {
                to,
                data,
                from,
                gas_limit,
                ..Default::default()
            };
            if let Some(value) = value {
                intent.value = Some(parse_wei(&value)?);
            }
            report(runner.send_transaction(intent, hooks).await)?;
        }
        Commands::Call { to, data, from } => {
            let mut intent = TransactionIntent::call(to, data);
            intent.from = from;
            report(runner.submit(intent, hooks).await)?;
        }
        Commands::GasPrice => {
            let price = runner.pipeline().determine_gas_price().await?;
            println!("{} gwei", price);
        }
        Commands::Config => {}
    }

    Ok(())
}

fn parse_wei(value: &str) -> Result<U256> {
    value
        .parse::<U256>()
        .map_err(|e| Error::Config(format!("Invalid value {}: {}", value, e)))
}

fn report(outcome: Result<ExecutionResult>) -> Result<()> {
    let result = match outcome {
        Err(err) if err.is_cancellation() => {
            println!("Cancelled");
            return Ok(());
        }
        other => other?,
    };

    if result.success {
        println!("Execution SUCCEEDED");
    } else {
        println!("Execution FAILED");
    }
    if let Some(hash) = result.raw.transaction_hash {
        println!("  Transaction: {}", hash);
    }
    if let Some(address) = result.created_address {
        println!("  Contract:    {}", address);
    }
    match result.return_data {
        Some(ReturnData::Value(data)) if !data.is_empty() => println!("  Return data: {}", data),
        Some(ReturnData::Receipt(receipt)) => {
            println!("  Gas used:    {}", receipt.gas_used);
            if let Some(block) = receipt.block_number {
                println!("  Block:       {}", block);
            }
        }
        _ => {}
    }
    Ok(())
}
