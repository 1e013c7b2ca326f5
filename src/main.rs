mod app;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use capital_tax::{Accountant, Broker, Config, Parser};

use crate::app::App;

fn main() -> Result<()> {
    let app = App::new();
    let config = Config::load(app.get_config_path(), app.is_config_explicit())?;

    let level = if app.is_verbose() { "debug" } else { config.log_level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let broker: Broker = app.get_broker().parse()?;
    let parser = Parser::new(broker, config.default_fx_rate);
    let mut trades = Vec::new();
    let mut skipped_rows = 0;
    for path in app.get_input_paths() {
        let statement = parser.parse_sheet(path)?;
        skipped_rows += statement.skipped.len();
        trades.extend(statement.trades);
    }
    if skipped_rows > 0 {
        warn!("{} statement rows could not be read, see warnings above", skipped_rows);
    }

    let outcome = Accountant::from_config(&config).analyze(&trades);
    if !outcome.diagnostics.is_empty() {
        warn!(
            "{} trades were left out of the statement, see warnings above",
            outcome.diagnostics.len()
        );
    }

    for (year, summary) in outcome.report.summaries() {
        info!(
            "{}: gains {} {currency}, losses {} {currency}, net {} {currency}",
            year,
            summary.total_gains.round_dp(2),
            summary.total_losses.round_dp(2),
            summary.net_position.round_dp(2),
            currency = config.reporting_currency
        );
    }

    outcome.report.write_summary(app.get_summary_path())?;
    outcome.report.write_details(app.get_details_path())?;
    Ok(())
}
