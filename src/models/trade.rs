//! Trade records kept in a strategy's ledger.

use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
        }
    }

    /// Sign applied to volume and amount when folding the ledger.
    pub fn sign(&self) -> Decimal {
        match self {
            TradeAction::Buy => Decimal::ONE,
            TradeAction::Sell => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One executed trade, as persisted in the ledger file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Owning strategy
    pub strategy_name: String,

    /// When the order was placed (local time, ISO-8601 with offset)
    pub trade_time: DateTime<Local>,

    /// Price per coin in quote currency
    pub price: Decimal,

    /// Coin volume traded
    pub volume: Decimal,

    /// Buy or sell
    pub action: TradeAction,

    /// Whether the trade went through operator approval
    #[serde(default)]
    pub confirmed: bool,

    /// price * volume, kept for audit
    pub amount: Decimal,
}

impl TradeRecord {
    pub fn new(
        strategy_name: String,
        trade_time: DateTime<Local>,
        price: Decimal,
        volume: Decimal,
        action: TradeAction,
        confirmed: bool,
    ) -> Self {
        Self {
            strategy_name,
            trade_time,
            price,
            volume,
            action,
            confirmed,
            amount: price * volume,
        }
    }

    /// Volume with the sign of the action (buy positive).
    pub fn signed_volume(&self) -> Decimal {
        self.volume * self.action.sign()
    }

    /// Amount with the sign of the action (buy positive).
    pub fn signed_amount(&self) -> Decimal {
        self.amount * self.action.sign()
    }
}
