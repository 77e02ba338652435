use super::ui;
use crate::core::aggregator::{QuoteAggregator, SessionParams};
use crate::core::assets::AllowedAssets;
use crate::core::provider::Direction;
use anyhow::Result;
use comfy_table::Cell;

/// Renders the assets every eligible provider supports.
pub fn display_assets(direction: Direction, assets: &AllowedAssets, providers: &[&str]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Chain"), ui::header_cell("Assets")]);
    for (chain, codes) in &assets.crypto {
        let codes: Vec<&str> = codes.iter().map(String::as_str).collect();
        table.add_row(vec![Cell::new(chain), Cell::new(codes.join(", "))]);
    }

    let fiat: Vec<&str> = assets.fiat.iter().map(String::as_str).collect();
    let mut output = format!(
        "{}\n\n",
        ui::style_text(&format!("Assets available to {direction}"), ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{} {}",
        ui::style_text("Fiat:", ui::StyleType::Label),
        fiat.join(", ")
    ));
    output.push_str(&format!(
        "\n{} {}",
        ui::style_text("Providers:", ui::StyleType::Label),
        providers.join(", ")
    ));
    if let Some(amount_type) = assets.forced_amount_type() {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                &format!("Amounts must be entered in {amount_type}"),
                ui::StyleType::Warning
            )
        ));
    }
    output
}

pub async fn run(aggregator: &QuoteAggregator, params: SessionParams) -> Result<()> {
    let direction = params.direction;
    let spinner = ui::new_spinner("Fetching supported assets...");
    let session = aggregator.start_session(params).await;
    spinner.finish_and_clear();

    let session = session?;
    println!(
        "{}",
        display_assets(direction, session.allowed_assets(), &session.provider_ids())
    );
    Ok(())
}
