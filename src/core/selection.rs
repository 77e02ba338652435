//! Best quote selection and quote formatting

use crate::core::priority::PriorityTiers;
use crate::core::provider::{Direction, Quote};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

/// Picks the best quote from the highest priority tier that has one.
///
/// Within a tier the quote with the largest exchange ratio wins: crypto per
/// fiat when buying, fiat per crypto when selling. Lower tiers are never
/// consulted once a tier produced a winner, and ties keep the first quote.
pub fn get_best_quote<'a>(
    direction: Direction,
    quotes: &'a [Quote],
    tiers: &PriorityTiers,
) -> Option<&'a Quote> {
    for tier in tiers.iter() {
        let mut best: Option<(&Quote, Decimal)> = None;
        for quote in quotes.iter().filter(|q| tier.contains(&q.provider_id)) {
            let Some(ratio) = exchange_ratio(direction, quote) else {
                warn!(
                    "Skipping quote from {} with a zero amount",
                    quote.provider_id
                );
                continue;
            };
            if best.is_none_or(|(_, best_ratio)| ratio > best_ratio) {
                best = Some((quote, ratio));
            }
        }
        if let Some((quote, _)) = best {
            return Some(quote);
        }
    }
    None
}

fn exchange_ratio(direction: Direction, quote: &Quote) -> Option<Decimal> {
    match direction {
        Direction::Buy => quote.crypto_amount.checked_div(quote.fiat_amount),
        Direction::Sell => quote.fiat_amount.checked_div(quote.crypto_amount),
    }
}

pub fn strip_iso_prefix(code: &str) -> &str {
    code.strip_prefix("iso:").unwrap_or(code)
}

/// Rounds to at most `decimals` places and drops trailing zeros.
pub fn format_amount(value: Decimal, decimals: u32) -> String {
    value
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

/// Human readable exchange rate, e.g. `1 BTC = 43210.55 USD`.
pub fn rate_text(quote: &Quote) -> String {
    let fiat_code = strip_iso_prefix(&quote.fiat_currency_code);
    match quote.fiat_amount.checked_div(quote.crypto_amount) {
        Some(rate) => {
            let mut rate = rate.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            rate.rescale(2);
            format!("1 {} = {} {}", quote.display_currency_code, rate, fiat_code)
        }
        None => format!("1 {} = ? {}", quote.display_currency_code, fiat_code),
    }
}
