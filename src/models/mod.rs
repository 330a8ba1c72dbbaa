//! Data models for strategies, trade records, approvals, and reporting.

mod confirmation;
mod metrics;
mod strategy;
mod trade;

pub use confirmation::{ConfirmationState, PendingConfirmation, TradeInfo};
pub use metrics::{StrategyOverview, TradingStats};
pub use strategy::{StrategyConfig, DEFAULT_DAILY_TRADE_LIMIT};
pub use trade::{TradeAction, TradeRecord};
