use super::ui;
use crate::core::aggregator::{
    Conversion, EditOutcome, MaxOutcome, QuoteAggregator, QuoteFlow, SessionParams, SubmitOutcome,
};
use crate::core::provider::{AmountType, Quote, WalletContext};
use crate::core::selection::{format_amount, rate_text};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use comfy_table::Cell;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// What the user typed, and into which field.
#[derive(Debug, Clone, PartialEq)]
pub enum AmountInput {
    Fiat(String),
    Crypto(String),
    /// Largest amount providers accept; sells need the wallet balance.
    Max { balance: Option<Decimal> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub chain: String,
    pub asset: String,
    pub amount: AmountInput,
    pub submit: bool,
}

/// Wallet backed by configured receive addresses. Checkout links are printed.
pub struct CliWallet {
    addresses: HashMap<String, String>,
}

impl CliWallet {
    pub fn new(addresses: HashMap<String, String>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl WalletContext for CliWallet {
    async fn receive_address(&self, chain: &str, _asset: &str) -> Result<String> {
        self.addresses
            .get(chain)
            .cloned()
            .ok_or_else(|| anyhow!("No wallet address configured for chain {chain}"))
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        println!(
            "{} {}",
            ui::style_text("Continue in your browser:", ui::StyleType::Label),
            url
        );
        Ok(())
    }
}

fn display_quotes(quotes: &[Quote], selected: Option<&str>) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Provider"),
        ui::header_cell("Crypto"),
        ui::header_cell("Fiat"),
        ui::header_cell("Rate"),
        ui::header_cell("Expires"),
    ]);
    for quote in quotes {
        let is_selected = selected == Some(quote.provider_id.as_str());
        let mut name = quote.display_name.clone();
        if quote.is_estimate {
            name.push_str(" (estimate)");
        }
        let expires = quote
            .expiration
            .map(|at| at.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            ui::provider_cell(&name, is_selected),
            ui::amount_cell(&format!(
                "{} {}",
                format_amount(quote.crypto_amount, 6),
                quote.display_currency_code
            )),
            ui::amount_cell(&format_amount(quote.fiat_amount, 2)),
            Cell::new(rate_text(quote)),
            Cell::new(expires),
        ]);
    }
    table.to_string()
}

fn display_conversion(flow: &QuoteFlow, source: AmountType, requested: &str, conversion: &Conversion) -> String {
    let (from, to) = match source {
        AmountType::Fiat => (flow.fiat_code(), flow.asset()),
        AmountType::Crypto => (flow.asset(), flow.fiat_code()),
    };
    format!(
        "{requested} {from} = {} {to}\n{} via {}",
        ui::style_text(&conversion.value, ui::StyleType::Value),
        ui::style_status(&conversion.status),
        conversion.attribution.display_name
    )
}

async fn request(flow: &QuoteFlow, amount: &AmountInput) -> Result<bool> {
    let (source, raw) = match amount {
        AmountInput::Fiat(raw) => (AmountType::Fiat, raw),
        AmountInput::Crypto(raw) => (AmountType::Crypto, raw),
        AmountInput::Max { balance } => {
            return match flow.on_max(*balance).await {
                MaxOutcome::Filled {
                    fiat_value,
                    crypto_value,
                    conversion,
                } => {
                    println!(
                        "{} {fiat_value} {} = {} {}\n{} via {}",
                        ui::style_text("Maximum:", ui::StyleType::Label),
                        flow.fiat_code(),
                        ui::style_text(&crypto_value, ui::StyleType::Value),
                        flow.asset(),
                        ui::style_status(&conversion.status),
                        conversion.attribution.display_name
                    );
                    Ok(true)
                }
                MaxOutcome::Status(status) => {
                    println!("{}", ui::style_status(&status));
                    Ok(false)
                }
                MaxOutcome::Superseded => Ok(false),
            };
        }
    };

    match flow.on_amount_edit(source, raw).await {
        EditOutcome::Converted(conversion) => {
            println!("{}", display_conversion(flow, source, raw, &conversion));
            Ok(true)
        }
        EditOutcome::Status(status) => {
            println!("{}", ui::style_status(&status));
            Ok(false)
        }
        EditOutcome::Cleared => {
            println!("{}", ui::style_text("Enter a non-zero amount", ui::StyleType::Subtle));
            Ok(false)
        }
        EditOutcome::Superseded => Ok(false),
    }
}

pub async fn run(
    aggregator: &QuoteAggregator,
    params: SessionParams,
    quote_request: &QuoteRequest,
    wallet: &dyn WalletContext,
) -> Result<()> {
    let direction = params.direction;
    let spinner = ui::new_spinner("Fetching supported assets...");
    let session = aggregator.start_session(params).await;
    spinner.finish_and_clear();
    let session = session?;

    let flow = session
        .select_asset(&quote_request.chain, &quote_request.asset)
        .with_context(|| format!("Cannot {direction} {}", quote_request.asset))?;

    let spinner = ui::new_spinner("Requesting quotes...");
    let result = request(&flow, &quote_request.amount).await;
    spinner.finish_and_clear();
    if !result? {
        return Ok(());
    }

    let selected = flow.selected().await;
    println!(
        "\n{}\n{}",
        ui::style_text("Quotes", ui::StyleType::Title),
        display_quotes(
            &flow.quotes().await,
            selected.as_ref().map(|q| q.provider_id.as_str())
        )
    );

    let submitted = if quote_request.submit {
        Some(flow.on_submit(wallet).await)
    } else {
        None
    };
    // Released whether or not approval went through
    let closed = flow.close().await;

    match submitted.transpose()? {
        Some(SubmitOutcome::Approved(attribution)) => println!(
            "{}",
            ui::style_text(
                &format!("Submitted quote from {}", attribution.display_name),
                ui::StyleType::Value
            )
        ),
        Some(SubmitOutcome::Rejected(status)) => println!("{}", ui::style_status(&status)),
        Some(SubmitOutcome::NothingSelected) | None => {}
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::quote;

    #[test]
    fn test_display_quotes_marks_selection() {
        console::set_colors_enabled(false);
        let mut estimate = quote("beta", "0.0019", "100");
        estimate.is_estimate = true;
        let quotes = vec![quote("alpha", "0.002", "100"), estimate];

        let output = display_quotes(&quotes, Some("alpha"));
        assert!(output.contains("* ALPHA"));
        assert!(output.contains("BETA (estimate)"));
        assert!(output.contains("0.002 BTC"));
        assert!(output.contains("1 BTC = 50000.00 USD"));
    }

    #[tokio::test]
    async fn test_cli_wallet() {
        let wallet = CliWallet::new(HashMap::from([(
            "bitcoin".to_string(),
            "bc1qexample".to_string(),
        )]));
        assert_eq!(
            wallet.receive_address("bitcoin", "BTC").await.unwrap(),
            "bc1qexample"
        );
        assert!(wallet.receive_address("solana", "SOL").await.is_err());
    }
}
