use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::accounting::{DiscountRule, ShortfallPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reporting_currency: String,
    pub discount_days: i64,
    pub discount_rate: Decimal,
    pub shortfall_policy: ShortfallPolicy,
    /// Rate applied to statements that do not carry their own exchange rate.
    pub default_fx_rate: Decimal,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let discount = DiscountRule::default();
        Config {
            reporting_currency: "AUD".to_string(),
            discount_days: discount.threshold_days,
            discount_rate: discount.rate,
            shortfall_policy: ShortfallPolicy::default(),
            default_fx_rate: Decimal::new(155, 2),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Config> {
        let config_path = config_path.as_ref();
        let file = std::fs::File::open(config_path)
            .with_context(|| format!("Unable to read config file {:?}", config_path))?;
        let config: Config = serde_yaml::from_reader(file)
            .with_context(|| format!("Invalid config file {:?}", config_path))?;
        Ok(config)
    }

    /// Loads the config, falling back to defaults when the file is absent and
    /// was not explicitly requested.
    pub fn load<P: AsRef<Path>>(config_path: P, explicit: bool) -> Result<Config> {
        if !explicit && !config_path.as_ref().exists() {
            return Ok(Config::default());
        }
        Config::new(config_path)
    }

    pub fn discount_rule(&self) -> DiscountRule {
        DiscountRule {
            threshold_days: self.discount_days,
            rate: self.discount_rate,
        }
    }
}
