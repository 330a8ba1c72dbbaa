//! Calculator for strategy reporting: trade statistics and trigger prices.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::models::{StrategyConfig, TradeAction, TradeRecord, TradingStats};

/// Calculator for computing strategy performance figures.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Aggregate statistics over `records`.
    ///
    /// `current_position_value` is the market value of the coins still held,
    /// summed over the strategies the records belong to.
    pub fn trading_stats(records: &[TradeRecord], current_position_value: Decimal) -> TradingStats {
        let mut stats = TradingStats {
            current_position_value,
            net_profit: current_position_value,
            ..TradingStats::default()
        };

        if records.is_empty() {
            return stats;
        }

        stats.total_trades = records.len();
        stats.total_amount = records.iter().map(|r| r.amount).sum();
        stats.avg_amount = stats.total_amount / Decimal::from(records.len() as u64);

        let amounts: Vec<f64> = records
            .iter()
            .map(|r| r.amount.to_f64().unwrap_or(0.0))
            .collect();
        stats.amount_std_dev = amounts.iter().population_std_dev();

        // Sell proceeds minus buy cost
        stats.realized_profit = records
            .iter()
            .map(|r| match r.action {
                TradeAction::Sell => r.amount,
                TradeAction::Buy => -r.amount,
            })
            .sum();
        stats.net_profit = stats.realized_profit + current_position_value;

        stats
    }

    /// Prices at which the next round would buy and sell.
    ///
    /// With a position these are the prices where its value leaves the
    /// tolerance band around the target; without one the band is applied to
    /// the current price.
    pub fn trigger_prices(config: &StrategyConfig, balance: Decimal, price: Decimal) -> (Decimal, Decimal) {
        let band = config.auto_trade_deviation_percent / Decimal::ONE_HUNDRED;
        let lower = Decimal::ONE - band;
        let upper = Decimal::ONE + band;

        if balance > Decimal::ZERO {
            (
                config.target_investment * lower / balance,
                config.target_investment * upper / balance,
            )
        } else {
            (price * lower, price * upper)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use rust_decimal_macros::dec;

    fn record(price: Decimal, volume: Decimal, action: TradeAction) -> TradeRecord {
        TradeRecord::new("btc".to_string(), Local::now(), price, volume, action, false)
    }

    #[test]
    fn test_empty_stats() {
        let stats = MetricsCalculator::trading_stats(&[], dec!(0));
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.avg_amount, Decimal::ZERO);
        assert_eq!(stats.amount_std_dev, 0.0);
    }

    #[test]
    fn test_stats() {
        let records = vec![
            record(dec!(100), dec!(1), TradeAction::Buy),
            record(dec!(100), dec!(2), TradeAction::Buy),
            record(dec!(150), dec!(2), TradeAction::Sell),
        ];

        // Holding 1 coin worth 150
        let stats = MetricsCalculator::trading_stats(&records, dec!(150));

        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.total_amount, dec!(600));
        assert_eq!(stats.avg_amount, dec!(200));
        // amounts 100, 200, 300
        assert!((stats.amount_std_dev - 81.6496580927726).abs() < 1e-9);
        assert_eq!(stats.realized_profit, dec!(0));
        assert_eq!(stats.net_profit, dec!(150));
    }

    #[test]
    fn test_trigger_prices_with_position() {
        let config = StrategyConfig::new("btc", "BTC", dec!(10000), dec!(0), dec!(20000), dec!(5)).unwrap();

        let (buy, sell) = MetricsCalculator::trigger_prices(&config, dec!(0.02), dec!(500000));

        assert_eq!(buy, dec!(475000));
        assert_eq!(sell, dec!(525000));
    }

    #[test]
    fn test_trigger_prices_without_position() {
        let config = StrategyConfig::new("btc", "BTC", dec!(10000), dec!(0), dec!(20000), dec!(10)).unwrap();

        let (buy, sell) = MetricsCalculator::trigger_prices(&config, dec!(0), dec!(200));

        assert_eq!(buy, dec!(180));
        assert_eq!(sell, dec!(220));
    }
}
