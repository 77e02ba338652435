use anyhow::Result;
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use fiatramp::cli::quote::{AmountInput, QuoteRequest};
use fiatramp::core::log::init_logging;
use fiatramp::core::provider::Direction;
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// List the assets providers support
    Assets {
        /// buy or sell, defaults to the configured direction
        #[arg(short, long)]
        direction: Option<Direction>,
    },
    /// Compare quotes for an amount and optionally submit the best one
    #[command(group(ArgGroup::new("amount").required(true).args(["fiat", "crypto", "max"])))]
    Quote {
        #[arg(short, long)]
        direction: Option<Direction>,
        /// Chain the asset lives on, e.g. bitcoin
        #[arg(long)]
        chain: String,
        /// Asset code, e.g. BTC
        #[arg(long)]
        asset: String,
        /// Amount entered in fiat
        #[arg(long)]
        fiat: Option<String>,
        /// Amount entered in crypto
        #[arg(long)]
        crypto: Option<String>,
        /// Quote the largest accepted amount
        #[arg(long)]
        max: bool,
        /// Spendable balance, required for sell --max
        #[arg(long, requires = "max")]
        balance: Option<Decimal>,
        /// Only ask this provider
        #[arg(short, long)]
        provider: Option<String>,
        /// Approve the selected quote
        #[arg(long)]
        submit: bool,
    },
    /// Delete the data a provider keeps between runs
    ClearStore {
        /// Provider id from the config
        provider_id: String,
    },
}

impl From<Commands> for fiatramp::AppCommand {
    fn from(cmd: Commands) -> fiatramp::AppCommand {
        match cmd {
            Commands::Assets { direction } => fiatramp::AppCommand::Assets { direction },
            Commands::Quote {
                direction,
                chain,
                asset,
                fiat,
                crypto,
                max: _,
                balance,
                provider,
                submit,
            } => {
                let amount = match (fiat, crypto) {
                    (Some(fiat), _) => AmountInput::Fiat(fiat),
                    (None, Some(crypto)) => AmountInput::Crypto(crypto),
                    (None, None) => AmountInput::Max { balance },
                };
                fiatramp::AppCommand::Quote {
                    direction,
                    provider,
                    request: QuoteRequest {
                        chain,
                        asset,
                        amount,
                        submit,
                    },
                }
            }
            Commands::ClearStore { provider_id } => fiatramp::AppCommand::ClearStore { provider_id },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => fiatramp::cli::setup::setup(),
        Some(cmd) => fiatramp::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
