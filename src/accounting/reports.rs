use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::accounting::{Diagnostic, FinancialYear, SaleResult, TradeError};

/// Gains and losses accumulated for one financial year.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PeriodSummary {
    pub total_gains: Decimal,
    /// Magnitude of the losses, never negative.
    pub total_losses: Decimal,
    pub net_position: Decimal,
}

impl PeriodSummary {
    fn folded(&self, sale: &SaleResult) -> Option<PeriodSummary> {
        let total_gains = sale
            .discounted_gain
            .checked_add(sale.undiscounted_gain)
            .and_then(|gain| self.total_gains.checked_add(gain))?;
        let total_losses = self.total_losses.checked_add(sale.capital_loss.abs())?;
        Some(PeriodSummary {
            total_gains,
            total_losses,
            net_position: total_gains.checked_sub(total_losses)?,
        })
    }
}

/// Per financial year totals plus the sale by sale detail they were built from.
///
/// Every sale must be folded exactly once; there is no deduplication.
#[derive(Debug, Default)]
pub struct CapitalGainsReport {
    summaries: BTreeMap<FinancialYear, PeriodSummary>,
    details: Vec<SaleResult>,
}

impl CapitalGainsReport {
    pub fn new() -> CapitalGainsReport {
        CapitalGainsReport {
            summaries: BTreeMap::new(),
            details: Vec::new(),
        }
    }

    /// Adds a sale to its financial year. A sale that would overflow the
    /// year's totals is handed back as a diagnostic and the report is unchanged.
    pub fn fold(&mut self, sale: SaleResult) -> Result<(), Diagnostic> {
        let summary = self.summaries.entry(sale.financial_year).or_default();
        match summary.folded(&sale) {
            Some(updated) => *summary = updated,
            None => {
                let error = TradeError::overflow("financial year totals");
                return Err(Diagnostic::for_sale(&sale, error));
            }
        }
        self.details.push(sale);
        Ok(())
    }

    pub fn summaries(&self) -> &BTreeMap<FinancialYear, PeriodSummary> {
        &self.summaries
    }

    pub fn summary(&self, year: FinancialYear) -> Option<&PeriodSummary> {
        self.summaries.get(&year)
    }

    pub fn details(&self) -> &[SaleResult] {
        &self.details
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    pub fn write_summary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = Writer::from_path(path)
            .with_context(|| format!("Unable to create summary file {:?}", path))?;
        for (year, summary) in self.summaries.iter() {
            writer.serialize(SummaryRecord {
                financial_year: *year,
                total_gains: summary.total_gains.round_dp(2),
                total_losses: summary.total_losses.round_dp(2),
                net_position: summary.net_position.round_dp(2),
            })?;
        }
        writer.flush().context("Unable to write summary file")?;
        Ok(())
    }

    pub fn write_details<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = Writer::from_path(path)
            .with_context(|| format!("Unable to create details file {:?}", path))?;
        for sale in self.details.iter() {
            writer.serialize(DetailRecord::from(sale))?;
        }
        writer.flush().context("Unable to write details file")?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SummaryRecord {
    financial_year: FinancialYear,
    total_gains: Decimal,
    total_losses: Decimal,
    net_position: Decimal,
}

#[derive(Debug, Serialize)]
struct DetailRecord {
    financial_year: FinancialYear,
    symbol: String,
    buy_dates: String,
    sell_date: NaiveDate,
    units: Decimal,
    cost_base: Decimal,
    proceeds: Decimal,
    total_gain_loss: Decimal,
    discounted_gain: Decimal,
    undiscounted_gain: Decimal,
    capital_loss: Decimal,
    holding_periods: String,
}

impl From<&SaleResult> for DetailRecord {
    fn from(sale: &SaleResult) -> DetailRecord {
        let buy_dates: Vec<String> = sale.buy_dates().iter().map(|d| d.to_string()).collect();
        let holding_periods: Vec<String> = sale
            .holding_days()
            .into_iter()
            .map(format_holding_period)
            .collect();
        DetailRecord {
            financial_year: sale.financial_year,
            symbol: sale.symbol.clone(),
            buy_dates: buy_dates.join(";"),
            sell_date: sale.sell_date,
            units: sale.units,
            cost_base: sale.cost_base.round_dp(2),
            proceeds: sale.proceeds.round_dp(2),
            total_gain_loss: sale.total_gain_loss.round_dp(2),
            discounted_gain: sale.discounted_gain.round_dp(2),
            undiscounted_gain: sale.undiscounted_gain.round_dp(2),
            capital_loss: sale.capital_loss.round_dp(2),
            holding_periods: holding_periods.join(";"),
        }
    }
}

/// Renders a day count as `1y 2m 3d`, counting years as 365 days and months as 30.
pub fn format_holding_period(days: i64) -> String {
    let sign = if days < 0 { "-" } else { "" };
    let days = days.abs();
    let years = days / 365;
    let months = (days % 365) / 30;
    let remaining_days = (days % 365) % 30;

    let mut parts = Vec::new();
    if years > 0 {
        parts.push(format!("{}y", years));
    }
    if months > 0 {
        parts.push(format!("{}m", months));
    }
    if remaining_days > 0 || parts.is_empty() {
        parts.push(format!("{}d", remaining_days));
    }
    format!("{}{}", sign, parts.join(" "))
}
