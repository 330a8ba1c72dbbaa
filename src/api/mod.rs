//! External collaborators: the exchange gateway and the notification channel.

mod dry_run;
mod max_client;
mod telegram;
mod types;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::models::{TradeAction, TradeInfo};

pub use dry_run::DryRunGateway;
pub use max_client::MaxClient;
pub use telegram::{TelegramApprovalListener, TelegramNotifier};
pub use types::*;

/// Decimal places an order volume is sent with.
pub const ORDER_VOLUME_DECIMALS: u32 = 16;

/// Exchange operations the trading core relies on. Any error is treated as a
/// recoverable failure of the current attempt.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Latest traded price of `market`.
    async fn current_price(&self, market: &str) -> Result<Decimal>;

    /// Available balance of `currency` in the spot wallet.
    async fn account_balance(&self, currency: &str) -> Result<Decimal>;

    /// Place a market order and return the exchange order id.
    async fn place_market_order(&self, market: &str, side: TradeAction, volume: Decimal) -> Result<String>;

    /// Cheap authenticated-or-public call used to verify connectivity.
    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}

/// Outbound messages to the operator. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask the operator to approve `info`, tagged with `trade_id`.
    async fn request_confirmation(&self, trade_id: &str, info: &TradeInfo) -> Result<()>;

    /// Tell the operator how an attempt ended.
    async fn report_result(&self, strategy_name: &str, success: bool, message: &str) -> Result<()>;
}

/// Notifier that only writes to the log. Used when no chat is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn request_confirmation(&self, trade_id: &str, info: &TradeInfo) -> Result<()> {
        info!(
            trade_id = %trade_id,
            strategy = %info.strategy_name,
            action = %info.action,
            volume = %info.volume,
            coin = %info.coin,
            price = %info.price,
            "Confirmation requested"
        );
        Ok(())
    }

    async fn report_result(&self, strategy_name: &str, success: bool, message: &str) -> Result<()> {
        info!(strategy = %strategy_name, success, message = %message, "Trade result");
        Ok(())
    }
}
