//! Gateway wrapper that reads real market data but never places orders.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::models::TradeAction;

use super::ExchangeGateway;

/// Passes price and balance reads through; orders are only logged.
pub struct DryRunGateway {
    inner: Arc<dyn ExchangeGateway>,
}

impl DryRunGateway {
    pub fn new(inner: Arc<dyn ExchangeGateway>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ExchangeGateway for DryRunGateway {
    async fn current_price(&self, market: &str) -> Result<Decimal> {
        self.inner.current_price(market).await
    }

    async fn account_balance(&self, currency: &str) -> Result<Decimal> {
        self.inner.account_balance(currency).await
    }

    async fn place_market_order(&self, market: &str, side: TradeAction, volume: Decimal) -> Result<String> {
        let order_id = format!("dry-run-{}", uuid::Uuid::new_v4());
        info!(
            order_id = %order_id,
            market = %market,
            side = %side,
            volume = %volume,
            "[DRY RUN] Would place market order"
        );
        Ok(order_id)
    }

    async fn check_connection(&self) -> Result<()> {
        self.inner.check_connection().await
    }
}
