pub mod inventory;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::accounting::calculation::inventory::{Lot, LotBook, LotTake};
use crate::accounting::{
    Diagnostic, DiscountRule, MatchedParcel, SaleResult, ShortfallPolicy, Side, Trade, TradeError,
};

pub struct Calculation {
    pub sales: Vec<SaleResult>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Matches every sale in the batch against earlier purchases using FIFO.
///
/// All purchases are loaded into the lot book before any sale is processed;
/// purchases and sales are each taken in ascending trade date order, keeping
/// the batch order for trades on the same day.
pub fn calculate_capital_gains(
    trades: &[Trade],
    discount: DiscountRule,
    shortfall_policy: ShortfallPolicy,
    reporting_currency: &str,
) -> Calculation {
    let mut calculation =
        CapitalGainsCalculation::new(discount, shortfall_policy, reporting_currency);

    let mut purchases = Vec::new();
    let mut sales = Vec::new();
    for (index, trade) in trades.iter().enumerate() {
        if let Err(error) = trade.validate() {
            calculation.reject(index, trade, error);
            continue;
        }
        match trade.side {
            Side::Buy => purchases.push((index, trade)),
            Side::Sell => sales.push((index, trade)),
        }
    }
    purchases.sort_by_key(|(_, trade)| trade.trade_date);
    sales.sort_by_key(|(_, trade)| trade.trade_date);

    info!(
        "Matching {} sales against {} purchases",
        sales.len(),
        purchases.len()
    );

    for (index, purchase) in purchases {
        calculation.process_purchase(index, purchase);
    }
    for (index, sale) in sales {
        calculation.process_sale(index, sale);
    }

    for symbol in calculation.lots.symbols() {
        debug!(
            "{} units of {} remain open",
            calculation.lots.open_units(symbol),
            symbol
        );
    }

    Calculation {
        sales: calculation.sales,
        diagnostics: calculation.diagnostics,
    }
}

struct CapitalGainsCalculation<'a> {
    lots: LotBook,
    discount: DiscountRule,
    reporting_currency: &'a str,
    sales: Vec<SaleResult>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> CapitalGainsCalculation<'a> {
    fn new(
        discount: DiscountRule,
        shortfall_policy: ShortfallPolicy,
        reporting_currency: &'a str,
    ) -> CapitalGainsCalculation<'a> {
        CapitalGainsCalculation {
            lots: LotBook::new(shortfall_policy),
            discount,
            reporting_currency,
            sales: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn reject(&mut self, index: usize, trade: &Trade, error: TradeError) {
        let diagnostic = Diagnostic::new(index, trade, error);
        warn!("Skipping {}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    fn process_purchase(&mut self, index: usize, purchase: &Trade) {
        let cost = match purchase.total_cost() {
            Ok(cost) => cost,
            Err(error) => {
                self.reject(index, purchase, error);
                return;
            }
        };
        let lot = Lot::new(purchase.trade_date, purchase.units, cost);
        debug!(
            "Added {} units of {} from {} costing {} {}",
            lot.units(),
            purchase.symbol,
            lot.acquired_date(),
            lot.total_cost(),
            self.reporting_currency
        );
        self.lots.add_lot(&purchase.symbol, lot);
    }

    fn process_sale(&mut self, index: usize, sale: &Trade) {
        debug!(
            "Processing sale of {} units of {} on {}",
            sale.units, sale.symbol, sale.trade_date
        );

        // proceeds are computed once for the sale and split across parcels by units
        let proceeds = match sale.net_proceeds() {
            Ok(proceeds) => proceeds,
            Err(error) => {
                self.reject(index, sale, error);
                return;
            }
        };

        let consumption = self.lots.consume(&sale.symbol, sale.units);
        if !consumption.is_complete() {
            self.reject(
                index,
                sale,
                TradeError::InsufficientLots {
                    symbol: sale.symbol.clone(),
                    date: sale.trade_date,
                    shortfall: consumption.shortfall,
                },
            );
            return;
        }

        // lots taken by a sale that fails here stay consumed
        let result = match self.match_parcels(index, sale, proceeds, consumption.takes) {
            Ok(result) => result,
            Err(error) => {
                self.reject(index, sale, error);
                return;
            }
        };

        debug!(
            "Sale of {} on {}: proceeds {} {}, cost base {}, gain/loss {} ({})",
            result.symbol,
            result.sell_date,
            result.proceeds,
            self.reporting_currency,
            result.cost_base,
            result.total_gain_loss,
            result.financial_year
        );
        self.sales.push(result);
    }

    fn match_parcels(
        &self,
        index: usize,
        sale: &Trade,
        proceeds: Decimal,
        takes: Vec<LotTake>,
    ) -> Result<SaleResult, TradeError> {
        let mut result = SaleResult::new(index, sale, proceeds);

        for take in takes {
            // units taken never exceed the units sold, so the share stays within proceeds
            let portion_of_proceeds = take.units / sale.units * proceeds;
            let gain_loss = portion_of_proceeds
                .checked_sub(take.cost)
                .ok_or_else(|| TradeError::overflow("parcel gain"))?;
            let holding_days = sale
                .trade_date
                .signed_duration_since(take.acquired_date)
                .num_days();
            if holding_days < 0 {
                warn!(
                    "Sale of {} on {} matched a parcel bought later on {}",
                    sale.symbol, sale.trade_date, take.acquired_date
                );
            }
            let (category, assessable_gain_loss) =
                self.discount.classify(gain_loss, holding_days)?;

            debug!(
                "Matched {} units from {}: proceeds {}, cost {}, gain/loss {}, held {} days, {:?}",
                take.units,
                take.acquired_date,
                portion_of_proceeds,
                take.cost,
                gain_loss,
                holding_days,
                category
            );

            result.add_parcel(MatchedParcel {
                symbol: sale.symbol.clone(),
                buy_date: take.acquired_date,
                sell_date: sale.trade_date,
                units: take.units,
                cost_base: take.cost,
                portion_of_proceeds,
                gain_loss,
                assessable_gain_loss,
                holding_days,
                category,
            })?;
        }

        Ok(result)
    }
}
