//! Capital gains statements from equity trade histories.
//!
//! Purchases become lots in a per-symbol FIFO lot book, sales consume those
//! lots oldest first, and every matched parcel is classified for the holding
//! period discount before being totalled per financial year.

pub mod accounting;
pub mod config;
pub mod parser;

pub use accounting::accountant::Accountant;
pub use accounting::reports::{CapitalGainsReport, PeriodSummary};
pub use accounting::{
    CalculationOutcome, Diagnostic, DiscountRule, FinancialYear, MatchedParcel, ParcelCategory,
    SaleResult, ShortfallPolicy, Side, Trade, TradeError,
};
pub use config::Config;
pub use parser::{Broker, Parser, SkippedRow, Statement};
