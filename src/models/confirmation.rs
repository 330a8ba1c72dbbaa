//! Pending approval requests and their outcomes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TradeAction;

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeInfo {
    pub strategy_name: String,
    pub action: TradeAction,
    pub volume: Decimal,
    pub coin: String,
    pub price: Decimal,
    pub total_amount: Decimal,
    /// Why approval is needed, if a rule triggered it
    pub reason: Option<String>,
}

/// Lifecycle of an approval request. Every state but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationState {
    Pending,
    Confirmed,
    Cancelled,
    TimedOut,
}

/// A trade waiting for the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub trade_id: String,
    pub strategy_name: String,
    pub trade_info: TradeInfo,
    pub state: ConfirmationState,
    pub created_at: DateTime<Utc>,
}
