//! Trading logic: ledger, confirmation gate, decision engine, orchestrator.

mod config;
mod confirmation;
mod ledger;
mod manager;
mod strategy;

pub use config::TradingConfig;
pub use confirmation::ConfirmationRegistry;
pub use ledger::TradeLedger;
pub use manager::{HistoryEntry, RoundAction, RoundResult, StrategyManager};
pub use strategy::{AutoTradeStrategy, TradeExecution, TradingContext};
