//! Broker statement ingestion.
//!
//! Turns the CSV statements exported by supported brokers into normalized
//! [`Trade`]s. Rows that cannot be understood are skipped and reported in the
//! returned [`Statement`]; only an unreadable file or a statement with missing
//! columns is an error.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::accounting::{Side, Trade};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Broker {
    Stake,
    Webull,
}

impl Broker {
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Broker::Stake => &[
                "Trade Date",
                "Settlement Date",
                "Symbol",
                "Side",
                "Trade Identifier",
                "Units",
                "Avg. Price",
                "Value",
                "Fees",
                "GST",
                "Total Value",
                "Currency",
                "AUD/USD rate",
            ],
            Broker::Webull => &[
                "Symbol&Name",
                "Trade Date",
                "Settlement Date",
                "Buy/Sell",
                "Quantity",
                "Trade Price",
                "Gross Amount",
                "Net Amount",
                "Comm/Fee/Tax",
                "GST",
            ],
        }
    }

    fn encoding(&self) -> &'static Encoding {
        match self {
            Broker::Stake => UTF_8,
            Broker::Webull => WINDOWS_1252,
        }
    }

    fn date_format(&self) -> &'static str {
        match self {
            Broker::Stake => "%Y-%m-%d",
            Broker::Webull => "%d/%m/%Y",
        }
    }
}

impl FromStr for Broker {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Broker> {
        match s.trim().to_lowercase().as_str() {
            "stake" => Ok(Broker::Stake),
            "webull" => Ok(Broker::Webull),
            other => Err(anyhow!("Unsupported broker \"{}\"", other)),
        }
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Broker::Stake => write!(f, "stake"),
            Broker::Webull => write!(f, "webull"),
        }
    }
}

/// A statement row left out of the trades.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedRow {
    /// One-based line in the statement, the header being line 1.
    pub row: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct Statement {
    pub trades: Vec<Trade>,
    pub skipped: Vec<SkippedRow>,
}

pub struct Parser {
    broker: Broker,
    default_fx_rate: Decimal,
}

impl Parser {
    pub fn new(broker: Broker, default_fx_rate: Decimal) -> Parser {
        Parser {
            broker,
            default_fx_rate,
        }
    }

    pub fn parse_sheet<P: AsRef<Path>>(&self, path: P) -> Result<Statement> {
        let path = path.as_ref();
        info!("Parsing {} statement {:?}", self.broker, path);
        let bytes = std::fs::read(path)
            .with_context(|| format!("Unable to read statement {:?}", path))?;
        self.parse_bytes(&bytes)
            .with_context(|| format!("Invalid {} statement {:?}", self.broker, path))
    }

    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Statement> {
        let encoding = self.broker.encoding();
        let (content, _, had_errors) = encoding.decode(bytes);
        if had_errors {
            warn!("Statement contains characters invalid in {}", encoding.name());
        }
        if content.trim().is_empty() {
            warn!("Statement is empty");
            return Ok(Statement::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader.headers().context("Unable to read headers")?.clone();
        let missing: Vec<&str> = self
            .broker
            .required_columns()
            .iter()
            .copied()
            .filter(|column| !headers.iter().any(|h| h == *column))
            .collect();
        if !missing.is_empty() {
            bail!("Missing required columns: {}", missing.join(", "));
        }
        debug!("Statement headers: {:?}", headers);

        let mut statement = Statement::default();
        for (i, record) in reader.records().enumerate() {
            // header is row 1
            let row = i + 2;
            let parsed = record
                .map_err(anyhow::Error::from)
                .and_then(|record| self.parse_row(&record, &headers, row));
            match parsed {
                Ok(trade) => statement.trades.push(trade),
                Err(e) => {
                    warn!("Skipping row {}: {:#}", row, e);
                    statement.skipped.push(SkippedRow {
                        row,
                        reason: format!("{:#}", e),
                    });
                }
            }
        }

        info!(
            "Parsed {} trades, skipped {} rows",
            statement.trades.len(),
            statement.skipped.len()
        );
        Ok(statement)
    }

    fn parse_row(
        &self,
        record: &csv::StringRecord,
        headers: &csv::StringRecord,
        row: usize,
    ) -> Result<Trade> {
        match self.broker {
            Broker::Stake => {
                let record: StakeRecord = record.deserialize(Some(headers))?;
                Ok(Trade {
                    symbol: record.symbol,
                    side: record.side.parse()?,
                    trade_date: parse_date(&record.trade_date, self.broker.date_format())?,
                    units: parse_amount(&record.units)?,
                    gross_value: parse_amount(&record.value)?,
                    fees: parse_optional_amount(record.fees.as_deref())?,
                    tax: parse_optional_amount(record.gst.as_deref())?,
                    fx_rate: parse_amount(&record.fx_rate)?,
                    reference: record
                        .trade_identifier
                        .or_else(|| Some(format!("row {}", row))),
                })
            }
            Broker::Webull => {
                let record: WebullRecord = record.deserialize(Some(headers))?;
                let fx_rate = match record.fx_rate.as_deref() {
                    Some(rate) => parse_amount(rate)?,
                    None => self.default_fx_rate,
                };
                Ok(Trade {
                    symbol: record.symbol,
                    side: record.side.parse()?,
                    trade_date: parse_date(&record.trade_date, self.broker.date_format())?,
                    units: parse_amount(&record.quantity)?,
                    gross_value: parse_amount(&record.gross_amount)?,
                    fees: parse_optional_amount(record.fees.as_deref())?,
                    tax: parse_optional_amount(record.gst.as_deref())?,
                    fx_rate,
                    reference: Some(format!("row {}", row)),
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StakeRecord {
    #[serde(rename = "Trade Date")]
    trade_date: String,
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(rename = "Side")]
    side: String,
    #[serde(rename = "Trade Identifier")]
    trade_identifier: Option<String>,
    #[serde(rename = "Units")]
    units: String,
    #[serde(rename = "Value")]
    value: String,
    #[serde(rename = "Fees")]
    fees: Option<String>,
    #[serde(rename = "GST")]
    gst: Option<String>,
    #[serde(rename = "AUD/USD rate")]
    fx_rate: String,
}

#[derive(Debug, Deserialize)]
struct WebullRecord {
    #[serde(rename = "Symbol&Name")]
    symbol: String,
    #[serde(rename = "Trade Date")]
    trade_date: String,
    #[serde(rename = "Buy/Sell")]
    side: String,
    #[serde(rename = "Quantity")]
    quantity: String,
    #[serde(rename = "Gross Amount")]
    gross_amount: String,
    #[serde(rename = "Comm/Fee/Tax")]
    fees: Option<String>,
    #[serde(rename = "GST")]
    gst: Option<String>,
    #[serde(rename = "AUD/USD rate", default)]
    fx_rate: Option<String>,
}

fn parse_date(text: &str, format: &str) -> Result<NaiveDate> {
    // some exports append a time to the date
    let date = text.split_whitespace().next().unwrap_or("");
    NaiveDate::parse_from_str(date, format)
        .with_context(|| format!("Could not parse date \"{}\"", text))
}

/// Parses a statement amount as a magnitude, ignoring currency symbols,
/// thousands separators and sign.
fn parse_amount(text: &str) -> Result<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let cleaned = cleaned.trim_start_matches('(').trim_end_matches(')');
    Decimal::from_str(cleaned)
        .map(|d| d.abs())
        .with_context(|| format!("Could not parse amount \"{}\"", text))
}

fn parse_optional_amount(text: Option<&str>) -> Result<Decimal> {
    match text {
        Some(text) if !text.trim().is_empty() => parse_amount(text),
        _ => Ok(Decimal::ZERO),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const STAKE_HEADER: &str = "Trade Date,Settlement Date,Symbol,Side,Trade Identifier,\
                                Units,Avg. Price,Value,Fees,GST,Total Value,Currency,AUD/USD rate";
    const WEBULL_HEADER: &str = "Symbol&Name,Trade Date,Settlement Date,Buy/Sell,Quantity,\
                                 Trade Price,Gross Amount,Net Amount,Comm/Fee/Tax,GST";

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.50").unwrap(), dec!(1234.50));
        assert_eq!(parse_amount("-12.5").unwrap(), dec!(12.5));
        assert_eq!(parse_amount(" $1.5432 ").unwrap(), dec!(1.5432));
        assert!(parse_amount("n/a").is_err());
    }

    #[test]
    fn test_parse_stake_statement() {
        let content = format!(
            "{}\n\
             2023-01-05,2023-01-07,AAPL,Buy,T1,10,150.00,\"1,500.00\",3.00,0.30,\
             1503.30,USD,$1.4567\n\
             2023-08-05,2023-08-07,AAPL,Sell,T2,-4,180.00,720.00,3.00,0.30,716.70,USD,$1.5000\n",
            STAKE_HEADER
        );
        let statement = Parser::new(Broker::Stake, dec!(1.55))
            .parse_bytes(content.as_bytes())
            .unwrap();
        let trades = &statement.trades;

        assert!(statement.skipped.is_empty());
        assert_eq!(trades.len(), 2);
        let buy = &trades[0];
        assert_eq!(buy.symbol, "AAPL");
        assert_eq!(buy.side, Side::Buy);
        assert_eq!(buy.trade_date, NaiveDate::from_ymd_opt(2023, 1, 5).unwrap());
        assert_eq!(buy.gross_value, dec!(1500.00));
        assert_eq!(buy.tax, dec!(0.30));
        assert_eq!(buy.fx_rate, dec!(1.4567));
        assert_eq!(buy.reference.as_deref(), Some("T1"));

        let sell = &trades[1];
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(sell.units, dec!(4));
    }

    #[test]
    fn test_parse_webull_statement_uses_default_rate() {
        let mut content = format!("{}\n", WEBULL_HEADER).into_bytes();
        // windows-1252 encoded e-acute in the symbol name
        content.extend_from_slice(
            b"CAF\xc9,15/03/2023,17/03/2023,BUY,5,10.00,50.00,51.00,1.00,\n",
        );
        content.extend_from_slice(
            b"CAF\xc9,20/04/2023,22/04/2023,SELL,5,12.00,60.00,59.00,1.00,0.10\n",
        );

        let trades = Parser::new(Broker::Webull, dec!(1.55))
            .parse_bytes(&content)
            .unwrap()
            .trades;

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].symbol, "CAF\u{c9}");
        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[0].trade_date, NaiveDate::from_ymd_opt(2023, 3, 15).unwrap());
        assert_eq!(trades[0].tax, Decimal::ZERO);
        assert_eq!(trades[0].fx_rate, dec!(1.55));
        assert_eq!(trades[1].side, Side::Sell);
        assert_eq!(trades[1].tax, dec!(0.10));
        assert_eq!(trades[1].reference.as_deref(), Some("row 3"));
    }

    #[test]
    fn test_bad_rows_are_skipped() {
        let content = format!(
            "{}\n2023-01-05,2023-01-07,AAPL,Buy,T1,10,150,1500,0,0,1500,USD,1.5\n\
             not-a-date,2023-01-07,AAPL,Buy,T2,10,150,1500,0,0,1500,USD,1.5\n\
             2023-01-06,2023-01-08,AAPL,Transfer,T3,10,150,1500,0,0,1500,USD,1.5\n",
            STAKE_HEADER
        );
        let statement = Parser::new(Broker::Stake, dec!(1.55))
            .parse_bytes(content.as_bytes())
            .unwrap();
        assert_eq!(statement.trades.len(), 1);
        assert_eq!(statement.trades[0].reference.as_deref(), Some("T1"));

        let rows: Vec<usize> = statement.skipped.iter().map(|s| s.row).collect();
        assert_eq!(rows, vec![3, 4]);
        assert!(statement.skipped[0].reason.contains("not-a-date"));
        assert!(statement.skipped[1].reason.contains("transfer"));
    }

    #[test]
    fn test_missing_columns_is_an_error() {
        let content = "Trade Date,Symbol,Side\n2023-01-05,AAPL,Buy\n";
        let err = Parser::new(Broker::Stake, dec!(1.55))
            .parse_bytes(content.as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("Units"));
    }

    #[test]
    fn test_empty_statement_has_no_trades() {
        let statement = Parser::new(Broker::Stake, dec!(1.55)).parse_bytes(b"").unwrap();
        assert!(statement.trades.is_empty());
        assert!(statement.skipped.is_empty());

        let statement = Parser::new(Broker::Stake, dec!(1.55))
            .parse_bytes(STAKE_HEADER.as_bytes())
            .unwrap();
        assert!(statement.trades.is_empty());
    }

    #[test]
    fn test_broker_from_str() {
        assert_eq!("Stake".parse::<Broker>().unwrap(), Broker::Stake);
        assert_eq!("webull".parse::<Broker>().unwrap(), Broker::Webull);
        assert!("commsec".parse::<Broker>().is_err());
    }
}
