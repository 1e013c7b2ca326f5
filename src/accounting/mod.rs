pub mod accountant;
pub mod reports;
mod calculation;

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

pub use calculation::inventory::{Consumption, Lot, LotBook, LotTake};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl FromStr for Side {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Side, TradeError> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "b" => Ok(Side::Buy),
            "sell" | "s" => Ok(Side::Sell),
            other => Err(TradeError::MalformedTrade {
                reason: format!("unrecognized side \"{}\"", other),
            }),
        }
    }
}

/// A normalized trade record, independent of the broker statement it came from.
///
/// Money values are magnitudes in the trade currency; `fx_rate` converts them
/// into the reporting currency.
#[derive(Clone, Debug, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub trade_date: NaiveDate,
    pub units: Decimal,
    pub gross_value: Decimal,
    pub fees: Decimal,
    pub tax: Decimal,
    pub fx_rate: Decimal,
    /// Broker trade identifier, only used to identify the trade in diagnostics.
    pub reference: Option<String>,
}

impl Trade {
    pub fn new(
        symbol: &str,
        side: Side,
        trade_date: NaiveDate,
        units: Decimal,
        gross_value: Decimal,
    ) -> Trade {
        Trade {
            symbol: symbol.to_string(),
            side,
            trade_date,
            units,
            gross_value,
            fees: Decimal::ZERO,
            tax: Decimal::ZERO,
            fx_rate: Decimal::ONE,
            reference: None,
        }
    }

    pub fn with_fees(mut self, fees: Decimal) -> Trade {
        self.fees = fees;
        self
    }

    pub fn with_tax(mut self, tax: Decimal) -> Trade {
        self.tax = tax;
        self
    }

    pub fn with_fx_rate(mut self, fx_rate: Decimal) -> Trade {
        self.fx_rate = fx_rate;
        self
    }

    pub fn with_reference(mut self, reference: &str) -> Trade {
        self.reference = Some(reference.to_string());
        self
    }

    /// Acquisition cost in the reporting currency, fees and tax included.
    pub fn total_cost(&self) -> Result<Decimal, TradeError> {
        self.gross_value
            .checked_add(self.fees)
            .and_then(|v| v.checked_add(self.tax))
            .and_then(|v| v.checked_mul(self.fx_rate))
            .ok_or_else(|| TradeError::overflow("total cost"))
    }

    /// Disposal proceeds in the reporting currency, net of fees and tax.
    pub fn net_proceeds(&self) -> Result<Decimal, TradeError> {
        self.gross_value
            .checked_sub(self.fees)
            .and_then(|v| v.checked_sub(self.tax))
            .and_then(|v| v.checked_mul(self.fx_rate))
            .ok_or_else(|| TradeError::overflow("net proceeds"))
    }

    pub fn validate(&self) -> Result<(), TradeError> {
        let reason = if self.symbol.trim().is_empty() {
            "empty symbol".to_string()
        } else if self.units <= Decimal::ZERO {
            format!("units must be positive, got {}", self.units)
        } else if self.fx_rate <= Decimal::ZERO {
            format!("fx rate must be positive, got {}", self.fx_rate)
        } else if self.gross_value < Decimal::ZERO {
            format!("negative gross value {}", self.gross_value)
        } else if self.fees < Decimal::ZERO {
            format!("negative fees {}", self.fees)
        } else if self.tax < Decimal::ZERO {
            format!("negative tax {}", self.tax)
        } else {
            return match self.side {
                Side::Buy => self.total_cost().map(|_| ()),
                Side::Sell => self.net_proceeds().map(|_| ()),
            };
        };
        Err(TradeError::MalformedTrade { reason })
    }
}

/// Australian style financial year running from July to June, identified by the
/// calendar year it starts in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FinancialYear {
    start_year: i32,
}

impl FinancialYear {
    pub fn new(start_year: i32) -> FinancialYear {
        FinancialYear { start_year }
    }

    pub fn from_date(date: NaiveDate) -> FinancialYear {
        if date.month() >= 7 {
            FinancialYear::new(date.year())
        } else {
            FinancialYear::new(date.year() - 1)
        }
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.start_year + 1
    }
}

impl fmt::Display for FinancialYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FY{:02}_{:02}",
            self.start_year.rem_euclid(100),
            self.end_year().rem_euclid(100)
        )
    }
}

impl Serialize for FinancialYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ParcelCategory {
    Discounted,
    Undiscounted,
    Loss,
}

/// Holding period discount applied to gains on long-held parcels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DiscountRule {
    pub threshold_days: i64,
    pub rate: Decimal,
}

impl DiscountRule {
    /// Classifies a parcel and returns the amount it contributes to its sale's
    /// subtotals. Losses are never discounted.
    pub fn classify(
        &self,
        gain_loss: Decimal,
        holding_days: i64,
    ) -> Result<(ParcelCategory, Decimal), TradeError> {
        if gain_loss <= Decimal::ZERO {
            Ok((ParcelCategory::Loss, gain_loss))
        } else if holding_days >= self.threshold_days {
            let discounted = gain_loss
                .checked_mul(self.rate)
                .ok_or_else(|| TradeError::overflow("discounted gain"))?;
            Ok((ParcelCategory::Discounted, discounted))
        } else {
            Ok((ParcelCategory::Undiscounted, gain_loss))
        }
    }
}

impl Default for DiscountRule {
    fn default() -> Self {
        DiscountRule {
            threshold_days: 365,
            rate: Decimal::new(5, 1),
        }
    }
}

/// What happens to the lot book when a sale cannot be fully matched.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortfallPolicy {
    /// Nothing is consumed; the rejected sale leaves every lot untouched.
    #[default]
    Rollback,
    /// Lots drained before the shortfall was found stay consumed.
    Retain,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MatchedParcel {
    pub symbol: String,
    pub buy_date: NaiveDate,
    pub sell_date: NaiveDate,
    pub units: Decimal,
    pub cost_base: Decimal,
    pub portion_of_proceeds: Decimal,
    pub gain_loss: Decimal,
    /// Contribution to the sale subtotals: half the gain when discounted.
    pub assessable_gain_loss: Decimal,
    pub holding_days: i64,
    pub category: ParcelCategory,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SaleResult {
    /// Position of the sell trade in the batch.
    pub trade_index: usize,
    pub reference: Option<String>,
    pub symbol: String,
    pub sell_date: NaiveDate,
    pub units: Decimal,
    pub cost_base: Decimal,
    pub proceeds: Decimal,
    pub total_gain_loss: Decimal,
    pub discounted_gain: Decimal,
    pub undiscounted_gain: Decimal,
    pub capital_loss: Decimal,
    pub financial_year: FinancialYear,
    pub parcels: Vec<MatchedParcel>,
}

impl SaleResult {
    pub fn new(trade_index: usize, sale: &Trade, proceeds: Decimal) -> SaleResult {
        SaleResult {
            trade_index,
            reference: sale.reference.clone(),
            symbol: sale.symbol.clone(),
            sell_date: sale.trade_date,
            units: sale.units,
            cost_base: Decimal::ZERO,
            proceeds,
            total_gain_loss: Decimal::ZERO,
            discounted_gain: Decimal::ZERO,
            undiscounted_gain: Decimal::ZERO,
            capital_loss: Decimal::ZERO,
            financial_year: FinancialYear::from_date(sale.trade_date),
            parcels: Vec::new(),
        }
    }

    /// Adds a parcel to the sale's subtotals. On overflow the sale is left
    /// unchanged.
    pub fn add_parcel(&mut self, parcel: MatchedParcel) -> Result<(), TradeError> {
        let overflow = || TradeError::overflow("sale subtotal");
        let amount = parcel.assessable_gain_loss;
        let (mut discounted, mut undiscounted, mut loss) =
            (self.discounted_gain, self.undiscounted_gain, self.capital_loss);
        match parcel.category {
            ParcelCategory::Discounted => {
                discounted = discounted.checked_add(amount).ok_or_else(overflow)?
            }
            ParcelCategory::Undiscounted => {
                undiscounted = undiscounted.checked_add(amount).ok_or_else(overflow)?
            }
            ParcelCategory::Loss => loss = loss.checked_add(amount).ok_or_else(overflow)?,
        }
        let cost_base = self
            .cost_base
            .checked_add(parcel.cost_base)
            .ok_or_else(overflow)?;
        let total_gain_loss = discounted
            .checked_add(undiscounted)
            .and_then(|v| v.checked_add(loss))
            .ok_or_else(overflow)?;

        self.discounted_gain = discounted;
        self.undiscounted_gain = undiscounted;
        self.capital_loss = loss;
        self.cost_base = cost_base;
        self.total_gain_loss = total_gain_loss;
        self.parcels.push(parcel);
        Ok(())
    }

    pub fn buy_dates(&self) -> Vec<NaiveDate> {
        self.parcels.iter().map(|p| p.buy_date).collect()
    }

    pub fn holding_days(&self) -> Vec<i64> {
        self.parcels.iter().map(|p| p.holding_days).collect()
    }
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum TradeError {
    #[error("insufficient lots to sell {symbol} on {date}: {shortfall} units short")]
    InsufficientLots {
        symbol: String,
        date: NaiveDate,
        shortfall: Decimal,
    },

    #[error("malformed trade: {reason}")]
    MalformedTrade { reason: String },
}

impl TradeError {
    fn overflow(what: &str) -> TradeError {
        TradeError::MalformedTrade {
            reason: format!("amount overflow in {}", what),
        }
    }
}

/// A trade the calculation had to skip, with enough identity to report it.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub index: usize,
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub reference: Option<String>,
    pub error: TradeError,
}

impl Diagnostic {
    pub fn new(index: usize, trade: &Trade, error: TradeError) -> Diagnostic {
        Diagnostic {
            index,
            symbol: trade.symbol.clone(),
            trade_date: trade.trade_date,
            reference: trade.reference.clone(),
            error,
        }
    }

    pub fn for_sale(sale: &SaleResult, error: TradeError) -> Diagnostic {
        Diagnostic {
            index: sale.trade_index,
            symbol: sale.symbol.clone(),
            trade_date: sale.sell_date,
            reference: sale.reference.clone(),
            error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade #{} ({} on {}", self.index + 1, self.symbol, self.trade_date)?;
        if let Some(reference) = &self.reference {
            write!(f, ", ref {}", reference)?;
        }
        write!(f, "): {}", self.error)
    }
}

pub struct CalculationOutcome {
    pub report: reports::CapitalGainsReport,
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_financial_year_boundaries() {
        assert_eq!(FinancialYear::from_date(date(2023, 7, 1)).to_string(), "FY23_24");
        assert_eq!(FinancialYear::from_date(date(2024, 6, 30)).to_string(), "FY23_24");
        assert_eq!(FinancialYear::from_date(date(2024, 1, 15)).to_string(), "FY23_24");
        assert_eq!(FinancialYear::from_date(date(2005, 3, 1)).to_string(), "FY04_05");
        assert_eq!(FinancialYear::from_date(date(2099, 12, 1)).to_string(), "FY99_00");

        let year = FinancialYear::from_date(date(2024, 2, 1));
        assert_eq!(year.start_year(), 2023);
        assert_eq!(year.end_year(), 2024);
    }

    #[test]
    fn test_discount_boundary_is_inclusive() {
        let rule = DiscountRule::default();
        assert_eq!(
            rule.classify(dec!(100), 364).unwrap(),
            (ParcelCategory::Undiscounted, dec!(100))
        );
        assert_eq!(
            rule.classify(dec!(100), 365).unwrap(),
            (ParcelCategory::Discounted, dec!(50.0))
        );
    }

    #[test]
    fn test_discount_overflow_is_an_error() {
        let rule = DiscountRule {
            threshold_days: 365,
            rate: dec!(2),
        };
        assert!(matches!(
            rule.classify(Decimal::MAX, 400),
            Err(TradeError::MalformedTrade { .. })
        ));
        assert!(rule.classify(Decimal::MAX, 10).is_ok());
    }

    #[test]
    fn test_losses_are_never_discounted() {
        let rule = DiscountRule::default();
        assert_eq!(
            rule.classify(dec!(-40), 1000).unwrap(),
            (ParcelCategory::Loss, dec!(-40))
        );
        assert_eq!(
            rule.classify(dec!(-40), 10).unwrap(),
            (ParcelCategory::Loss, dec!(-40))
        );
        assert_eq!(
            rule.classify(Decimal::ZERO, 1000).unwrap(),
            (ParcelCategory::Loss, Decimal::ZERO)
        );
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("Buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::Sell);
        assert!(matches!(
            "transfer".parse::<Side>(),
            Err(TradeError::MalformedTrade { .. })
        ));
    }

    #[test]
    fn test_trade_cost_and_proceeds_convert_currency() {
        let trade = Trade::new("X", Side::Buy, date(2023, 1, 1), dec!(10), dec!(100))
            .with_fees(dec!(3))
            .with_tax(dec!(0.3))
            .with_fx_rate(dec!(1.5));
        assert_eq!(trade.total_cost().unwrap(), dec!(154.95));
        assert_eq!(trade.net_proceeds().unwrap(), dec!(145.05));
    }

    #[test]
    fn test_validate_rejects_amounts_that_overflow() {
        let huge_buy = Trade::new("BIG", Side::Buy, date(2023, 1, 1), dec!(1), Decimal::MAX)
            .with_fees(dec!(1));
        assert!(huge_buy.total_cost().is_err());
        match huge_buy.validate() {
            Err(TradeError::MalformedTrade { reason }) => assert!(reason.contains("overflow")),
            other => panic!("unexpected {:?}", other),
        }

        let huge_sell = Trade::new("BIG", Side::Sell, date(2023, 1, 1), dec!(1), Decimal::MAX)
            .with_fx_rate(dec!(2));
        assert!(huge_sell.validate().is_err());

        // fees only reduce proceeds, so a sale at the limit is still valid
        let limit_sell = Trade::new("BIG", Side::Sell, date(2023, 1, 1), dec!(1), Decimal::MAX)
            .with_fees(dec!(1));
        assert!(limit_sell.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_trades() {
        let good = Trade::new("X", Side::Buy, date(2023, 1, 1), dec!(10), dec!(100));
        assert!(good.validate().is_ok());

        let zero_units = Trade { units: Decimal::ZERO, ..good.clone() };
        assert!(zero_units.validate().is_err());

        let no_rate = good.clone().with_fx_rate(Decimal::ZERO);
        assert!(no_rate.validate().is_err());

        let no_symbol = Trade { symbol: " ".to_string(), ..good.clone() };
        assert!(no_symbol.validate().is_err());

        let negative_gross = Trade { gross_value: dec!(-100), ..good.clone() };
        assert!(negative_gross.validate().is_err());

        let negative_tax = good.clone().with_tax(dec!(-0.5));
        assert!(negative_tax.validate().is_err());

        let negative_fees = good.with_fees(dec!(-1));
        assert!(negative_fees.validate().is_err());
    }

    #[test]
    fn test_diagnostic_identifies_trade() {
        let trade = Trade::new("ABC", Side::Sell, date(2023, 2, 1), dec!(5), dec!(50))
            .with_reference("T-9");
        let diagnostic = Diagnostic::new(
            2,
            &trade,
            TradeError::InsufficientLots {
                symbol: "ABC".to_string(),
                date: trade.trade_date,
                shortfall: dec!(5),
            },
        );
        assert_eq!(
            diagnostic.to_string(),
            "trade #3 (ABC on 2023-02-01, ref T-9): \
             insufficient lots to sell ABC on 2023-02-01: 5 units short"
        );
    }
}
