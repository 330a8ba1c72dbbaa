//! Reporting figures for strategies: live overview and trade statistics.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::StrategyConfig;

/// Live view of one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyOverview {
    pub config: StrategyConfig,

    /// Coin held according to the ledger
    pub current_balance: Decimal,

    /// Latest exchange price (zero if it could not be fetched)
    pub current_price: Decimal,

    /// current_balance * current_price
    pub current_value: Decimal,

    pub trade_count: usize,
    pub today_trade_count: usize,

    /// Realized sell-minus-buy cash flow plus current position value
    pub net_profit: Decimal,

    /// Price below which the next round buys
    pub buy_trigger_price: Decimal,

    /// Price above which the next round sells
    pub sell_trigger_price: Decimal,
}

impl StrategyOverview {
    /// Overview with only the config filled in, used when the exchange is unreachable.
    pub fn unavailable(config: StrategyConfig) -> Self {
        Self {
            config,
            current_balance: Decimal::ZERO,
            current_price: Decimal::ZERO,
            current_value: Decimal::ZERO,
            trade_count: 0,
            today_trade_count: 0,
            net_profit: Decimal::ZERO,
            buy_trigger_price: Decimal::ZERO,
            sell_trigger_price: Decimal::ZERO,
        }
    }
}

/// Aggregate statistics over a set of trade records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradingStats {
    pub total_trades: usize,

    /// Sum of all trade amounts, buys and sells alike
    pub total_amount: Decimal,

    pub avg_amount: Decimal,

    /// Population standard deviation of trade amounts
    pub amount_std_dev: f64,

    /// Sell amounts minus buy amounts
    pub realized_profit: Decimal,

    pub current_position_value: Decimal,

    /// realized_profit + current_position_value
    pub net_profit: Decimal,
}

impl std::fmt::Display for TradingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total Trades:     {}", self.total_trades)?;
        writeln!(f, "Total Amount:     {:.2}", self.total_amount)?;
        writeln!(f, "Average Amount:   {:.2}", self.avg_amount)?;
        writeln!(f, "Amount Std Dev:   {:.2}", self.amount_std_dev)?;
        writeln!(f, "Realized Profit:  {:.2}", self.realized_profit)?;
        writeln!(f, "Position Value:   {:.2}", self.current_position_value)?;
        write!(f, "Net Profit:       {:.2}", self.net_profit)
    }
}
