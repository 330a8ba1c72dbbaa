//! Error types for the trading core.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors from reading or writing a strategy's ledger file.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the confirmation registry.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfirmationError {
    /// Unknown id, or the request already left the pending state.
    #[error("no pending confirmation with id {trade_id}")]
    NotFound { trade_id: String },
}

/// Per-strategy failures. None of these abort an execution round.
#[derive(Error, Debug)]
pub enum TradeError {
    /// Price, balance, or order call to the exchange failed.
    #[error("exchange error: {0:#}")]
    Gateway(anyhow::Error),

    #[error("insufficient funds: need {required:.2}, available {available:.2}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("position cap reached: net investment {net_investment:.2} >= cap {cap:.2}")]
    PositionCapReached { net_investment: Decimal, cap: Decimal },

    #[error("confirmation timed out for trade {trade_id}")]
    ConfirmationTimeout { trade_id: String },

    #[error("trade {trade_id} cancelled by operator")]
    ConfirmationCancelled { trade_id: String },

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("strategy {0} already exists")]
    DuplicateStrategy(String),

    #[error("strategy {0} does not exist")]
    UnknownStrategy(String),

    #[error("invalid strategy config: {0}")]
    InvalidConfig(String),

    #[error("strategy store error: {0:#}")]
    Store(anyhow::Error),
}

impl TradeError {
    pub fn gateway(err: anyhow::Error) -> Self {
        Self::Gateway(err)
    }

    pub fn store(err: anyhow::Error) -> Self {
        Self::Store(err)
    }
}
