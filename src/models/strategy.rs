//! Strategy configuration: one rebalancing rule for one coin.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TradeError;

/// Default number of trades per day before approval is required.
pub const DEFAULT_DAILY_TRADE_LIMIT: u32 = 5;

/// Configuration of a single rebalancing strategy.
///
/// Built through [`StrategyConfig::new`] or deserialized and then checked with
/// [`StrategyConfig::validate`]; only `is_active` changes after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Unique strategy name
    pub name: String,

    /// Value the position should be held at, in quote currency
    pub target_investment: Decimal,

    /// How far net investment may exceed the target before buys stop
    pub max_position_add_on: Decimal,

    /// Position value at which everything is sold and the strategy stops
    pub take_profit_value: Decimal,

    /// Deviation from target (0-100) tolerated before trading
    pub auto_trade_deviation_percent: Decimal,

    /// Coin symbol, e.g. "BTC"
    pub coin: String,

    /// Trades per local day before every further trade needs approval
    pub daily_trade_limit: u32,

    /// Trade amount at or above which approval is needed (0 = disabled)
    pub confirm_amount_threshold: Decimal,

    /// Whether the strategy takes part in execution rounds
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
}

impl StrategyConfig {
    /// Create a validated config with the default daily limit, no amount
    /// threshold, and the strategy active.
    pub fn new(
        name: impl Into<String>,
        coin: impl Into<String>,
        target_investment: Decimal,
        max_position_add_on: Decimal,
        take_profit_value: Decimal,
        auto_trade_deviation_percent: Decimal,
    ) -> Result<Self, TradeError> {
        let config = Self {
            name: name.into(),
            target_investment,
            max_position_add_on,
            take_profit_value,
            auto_trade_deviation_percent,
            coin: coin.into(),
            daily_trade_limit: DEFAULT_DAILY_TRADE_LIMIT,
            confirm_amount_threshold: Decimal::ZERO,
            is_active: true,
            created_at: Utc::now(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_daily_trade_limit(mut self, limit: u32) -> Self {
        self.daily_trade_limit = limit;
        self
    }

    pub fn with_confirm_amount_threshold(mut self, threshold: Decimal) -> Result<Self, TradeError> {
        self.confirm_amount_threshold = threshold;
        self.validate()?;
        Ok(self)
    }

    /// Check numeric ranges and names.
    pub fn validate(&self) -> Result<(), TradeError> {
        let invalid = |msg: String| Err(TradeError::InvalidConfig(msg));

        if self.name.trim().is_empty() {
            return invalid("strategy name must not be empty".to_string());
        }
        if self.name.contains(['/', '\\']) || self.name.starts_with('.') {
            return invalid(format!("strategy name '{}' is not a valid file name", self.name));
        }
        if self.coin.is_empty() || !self.coin.chars().all(|c| c.is_ascii_alphanumeric()) {
            return invalid(format!("coin '{}' must be a non-empty alphanumeric symbol", self.coin));
        }
        if self.target_investment <= Decimal::ZERO {
            return invalid("target investment must be positive".to_string());
        }
        if self.max_position_add_on < Decimal::ZERO {
            return invalid("max position add-on must not be negative".to_string());
        }
        if self.take_profit_value <= Decimal::ZERO {
            return invalid("take-profit value must be positive".to_string());
        }
        if self.auto_trade_deviation_percent < Decimal::ZERO
            || self.auto_trade_deviation_percent > Decimal::ONE_HUNDRED
        {
            return invalid("auto-trade deviation must be between 0 and 100".to_string());
        }
        if self.confirm_amount_threshold < Decimal::ZERO {
            return invalid("confirmation threshold must not be negative".to_string());
        }

        Ok(())
    }

    /// Exchange market symbol, e.g. "btctwd".
    pub fn market(&self, quote_currency: &str) -> String {
        format!("{}{}", self.coin.to_lowercase(), quote_currency.to_lowercase())
    }

    /// Net investment at which further buys are refused.
    pub fn position_cap(&self) -> Decimal {
        self.target_investment + self.max_position_add_on
    }
}
