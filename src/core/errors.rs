//! Reduces provider failures to one user-facing message

use crate::core::provider::{Direction, ProviderError, ProviderErrorKind};
use crate::core::selection::strip_iso_prefix;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestError {
    pub error: ProviderError,
    pub text: String,
}

/// Lower is more actionable for the user.
fn severity(kind: &ProviderErrorKind) -> u8 {
    match kind {
        ProviderErrorKind::UnderLimit { .. } => 0,
        ProviderErrorKind::OverLimit { .. } => 1,
        ProviderErrorKind::PaymentUnsupported => 2,
        ProviderErrorKind::RegionRestricted { .. } => 3,
        ProviderErrorKind::AssetUnsupported => 4,
    }
}

/// Whether `candidate` should replace `current` among errors of equal severity.
fn is_better_limit(candidate: &ProviderErrorKind, current: &ProviderErrorKind) -> bool {
    match (candidate, current) {
        (
            ProviderErrorKind::OverLimit { amount: Some(a), .. },
            ProviderErrorKind::OverLimit { amount: Some(b), .. },
        ) => a > b,
        (
            ProviderErrorKind::UnderLimit { amount: Some(a), .. },
            ProviderErrorKind::UnderLimit { amount: Some(b), .. },
        ) => a < b,
        (
            ProviderErrorKind::OverLimit { amount: Some(_), .. },
            ProviderErrorKind::OverLimit { amount: None, .. },
        )
        | (
            ProviderErrorKind::UnderLimit { amount: Some(_), .. },
            ProviderErrorKind::UnderLimit { amount: None, .. },
        ) => true,
        _ => false,
    }
}

/// Picks the most actionable error and renders it.
///
/// `requested_currency_code` is the code of the field the user typed into;
/// limit amounts are expressed in it.
pub fn get_best_error<'a, I>(
    errors: I,
    requested_currency_code: &str,
    direction: Direction,
) -> Option<BestError>
where
    I: IntoIterator<Item = &'a ProviderError>,
{
    let mut best: Option<&ProviderError> = None;
    for error in errors {
        best = match best {
            None => Some(error),
            Some(current) => {
                let (candidate_rank, current_rank) = (severity(&error.kind), severity(&current.kind));
                if candidate_rank < current_rank
                    || (candidate_rank == current_rank && is_better_limit(&error.kind, &current.kind))
                {
                    Some(error)
                } else {
                    Some(current)
                }
            }
        };
    }

    best.map(|error| BestError {
        error: error.clone(),
        text: error_text(&error.kind, requested_currency_code, direction),
    })
}

fn limit_text(amount: Decimal, code: &str) -> String {
    format!("{} {}", amount.normalize(), strip_iso_prefix(code))
}

fn error_text(kind: &ProviderErrorKind, requested_currency_code: &str, direction: Direction) -> String {
    match kind {
        ProviderErrorKind::UnderLimit { amount: Some(amount), .. } => format!(
            "Minimum {} amount is {}",
            direction,
            limit_text(*amount, requested_currency_code)
        ),
        ProviderErrorKind::UnderLimit { amount: None, .. } => {
            format!("Amount is below the minimum {direction} amount")
        }
        ProviderErrorKind::OverLimit { amount: Some(amount), .. } => format!(
            "Maximum {} amount is {}",
            direction,
            limit_text(*amount, requested_currency_code)
        ),
        ProviderErrorKind::OverLimit { amount: None, .. } => {
            format!("Amount is above the maximum {direction} amount")
        }
        ProviderErrorKind::PaymentUnsupported => "Payment method is not supported".to_string(),
        ProviderErrorKind::RegionRestricted {
            display_currency_code: Some(code),
        } => format!("{} is not available in your region", strip_iso_prefix(code)),
        ProviderErrorKind::RegionRestricted {
            display_currency_code: None,
        } => "Not available in your region".to_string(),
        ProviderErrorKind::AssetUnsupported => "Asset is not supported".to_string(),
    }
}

/// Fallback status when no provider explained its failure.
pub fn no_quote_text(direction: Direction) -> String {
    format!("No {direction} quote available")
}
