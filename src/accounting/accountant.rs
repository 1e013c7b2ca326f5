use tracing::{info, warn};

use crate::accounting::reports::CapitalGainsReport;
use crate::accounting::{calculation, CalculationOutcome, DiscountRule, ShortfallPolicy, Trade};
use crate::config::Config;

/// Entry point to the engine: runs one self-contained batch of trades through
/// FIFO matching and folds the accepted sales into a report.
pub struct Accountant<'a> {
    discount: DiscountRule,
    shortfall_policy: ShortfallPolicy,
    reporting_currency: &'a str,
}

impl<'a> Accountant<'a> {
    pub fn new() -> Accountant<'a> {
        Accountant {
            discount: DiscountRule::default(),
            shortfall_policy: ShortfallPolicy::default(),
            reporting_currency: "AUD",
        }
    }

    pub fn from_config(config: &'a Config) -> Accountant<'a> {
        let mut accountant = Accountant::new();
        accountant
            .discount(config.discount_rule())
            .shortfall_policy(config.shortfall_policy)
            .reporting_currency(&config.reporting_currency);
        accountant
    }

    pub fn discount(&mut self, discount: DiscountRule) -> &mut Accountant<'a> {
        self.discount = discount;
        self
    }

    pub fn shortfall_policy(&mut self, policy: ShortfallPolicy) -> &mut Accountant<'a> {
        self.shortfall_policy = policy;
        self
    }

    pub fn reporting_currency(&mut self, currency: &'a str) -> &mut Accountant<'a> {
        self.reporting_currency = currency;
        self
    }

    pub fn analyze(&self, trades: &[Trade]) -> CalculationOutcome {
        let calculation = calculation::calculate_capital_gains(
            trades,
            self.discount,
            self.shortfall_policy,
            self.reporting_currency,
        );

        let mut diagnostics = calculation.diagnostics;
        let mut report = CapitalGainsReport::new();
        for sale in calculation.sales {
            if let Err(diagnostic) = report.fold(sale) {
                warn!("Skipping {}", diagnostic);
                diagnostics.push(diagnostic);
            }
        }

        info!(
            "Processed {} trades: {} sales reported, {} skipped",
            trades.len(),
            report.details().len(),
            diagnostics.len()
        );

        CalculationOutcome {
            report,
            diagnostics,
        }
    }
}

impl<'a> Default for Accountant<'a> {
    fn default() -> Self {
        Accountant::new()
    }
}
