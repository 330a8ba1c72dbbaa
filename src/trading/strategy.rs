//! Rebalancing decision engine for a single strategy.
//!
//! Each round the engine:
//! - Sells the whole position once its value reaches the take-profit value
//! - Otherwise compares the position value with the target and buys or sells
//!   the difference when the deviation exceeds the configured percentage
//! - Routes risky trades (first position, daily limit, large amount) through
//!   operator approval before placing the order

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::api::{ExchangeGateway, Notifier, ORDER_VOLUME_DECIMALS};
use crate::error::TradeError;
use crate::models::{ConfirmationState, StrategyConfig, TradeAction, TradeInfo};

use super::{ConfirmationRegistry, TradeLedger, TradingConfig};

/// Services shared by every strategy instance.
#[derive(Clone)]
pub struct TradingContext {
    pub gateway: Arc<dyn ExchangeGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub registry: Arc<ConfirmationRegistry>,
    pub config: TradingConfig,
}

/// What the deviation check wants to do.
#[derive(Debug, Clone, PartialEq)]
pub enum RebalanceDecision {
    /// Deviation within tolerance
    Hold { deviation_percent: Decimal },
    /// Buy up to the target; the first position always needs approval
    Buy { volume: Decimal, first_position: bool },
    /// Sell down to the target
    Sell { volume: Decimal },
    /// Below target, but net investment already hit the add-on cap
    CapReached { net_investment: Decimal, cap: Decimal },
}

/// Relative gap between position value and target, in percent.
/// An empty position counts as 100% off.
pub fn deviation_percent(balance: Decimal, current_value: Decimal, target: Decimal) -> Decimal {
    if balance.is_zero() {
        return Decimal::ONE_HUNDRED;
    }
    ((current_value - target) / target * Decimal::ONE_HUNDRED).abs()
}

/// Decide the rebalancing trade for a position of `balance` coins at `price`.
pub fn evaluate_rebalance(
    config: &StrategyConfig,
    balance: Decimal,
    net_investment: Decimal,
    price: Decimal,
) -> RebalanceDecision {
    let target = config.target_investment;
    let current_value = balance * price;
    let deviation = deviation_percent(balance, current_value, target);

    if deviation <= config.auto_trade_deviation_percent {
        return RebalanceDecision::Hold {
            deviation_percent: deviation,
        };
    }

    if current_value < target {
        if balance.is_zero() {
            return RebalanceDecision::Buy {
                volume: (target - current_value) / price,
                first_position: true,
            };
        }

        let cap = config.position_cap();
        if net_investment >= cap {
            return RebalanceDecision::CapReached { net_investment, cap };
        }

        RebalanceDecision::Buy {
            volume: (target - current_value) / price,
            first_position: false,
        }
    } else {
        RebalanceDecision::Sell {
            volume: (current_value - target) / price,
        }
    }
}

/// Whether the position should be liquidated for take-profit.
pub fn take_profit_due(config: &StrategyConfig, balance: Decimal, price: Decimal) -> bool {
    balance > Decimal::ZERO && balance * price >= config.take_profit_value
}

/// A filled order and its ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeExecution {
    pub order_id: String,
    pub action: TradeAction,
    pub volume: Decimal,
    pub price: Decimal,
    pub amount: Decimal,
    pub confirmed: bool,
}

/// One strategy: config, ledger, and the decision logic tying them to the
/// exchange.
pub struct AutoTradeStrategy {
    config: StrategyConfig,
    active: AtomicBool,
    ledger: RwLock<TradeLedger>,
    ctx: TradingContext,
}

impl AutoTradeStrategy {
    pub fn new(config: StrategyConfig, ledger: TradeLedger, ctx: TradingContext) -> Self {
        let active = AtomicBool::new(config.is_active);
        Self {
            config,
            active,
            ledger: RwLock::new(ledger),
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Config with the current active flag.
    pub fn config(&self) -> StrategyConfig {
        let mut config = self.config.clone();
        config.is_active = self.is_active();
        config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn ledger(&self) -> &RwLock<TradeLedger> {
        &self.ledger
    }

    pub fn market(&self) -> String {
        self.config.market(&self.ctx.config.quote_currency)
    }

    /// Current price from the exchange.
    pub async fn current_price(&self) -> Result<Decimal, TradeError> {
        let price = self
            .ctx
            .gateway
            .current_price(&self.market())
            .await
            .map_err(TradeError::gateway)?;

        if price <= Decimal::ZERO {
            return Err(TradeError::gateway(anyhow::anyhow!(
                "exchange returned non-positive price {} for {}",
                price,
                self.market()
            )));
        }
        Ok(price)
    }

    pub async fn coin_balance(&self) -> Decimal {
        self.ledger.read().await.current_balance()
    }

    /// Sell everything if the take-profit value is reached.
    ///
    /// `Ok(None)` means the condition does not hold. Disabling the strategy
    /// after a successful liquidation is left to the caller.
    pub async fn check_take_profit(&self) -> Result<Option<TradeExecution>, TradeError> {
        let price = self.current_price().await?;
        let balance = self.coin_balance().await;

        if !take_profit_due(&self.config, balance, price) {
            return Ok(None);
        }

        info!(
            strategy = %self.name(),
            balance = %balance,
            value = %(balance * price),
            take_profit = %self.config.take_profit_value,
            "Take-profit reached, selling entire position"
        );

        self.execute_trade(TradeAction::Sell, balance, price, false)
            .await
            .map(Some)
    }

    /// Rebalance towards the target if the deviation is too large.
    pub async fn check_and_trade(&self) -> Result<Option<TradeExecution>, TradeError> {
        let price = self.current_price().await?;
        let (balance, net_investment) = {
            let ledger = self.ledger.read().await;
            (ledger.current_balance(), ledger.net_investment())
        };

        match evaluate_rebalance(&self.config, balance, net_investment, price) {
            RebalanceDecision::Hold { deviation_percent } => {
                debug!(
                    strategy = %self.name(),
                    deviation = %deviation_percent.round_dp(2),
                    "Deviation within tolerance"
                );
                Ok(None)
            }
            RebalanceDecision::Buy {
                volume,
                first_position,
            } => {
                if first_position {
                    info!(strategy = %self.name(), "Opening first position, approval required");
                }
                self.execute_trade(TradeAction::Buy, volume, price, first_position)
                    .await
                    .map(Some)
            }
            RebalanceDecision::Sell { volume } => self
                .execute_trade(TradeAction::Sell, volume, price, false)
                .await
                .map(Some),
            RebalanceDecision::CapReached { net_investment, cap } => {
                Err(TradeError::PositionCapReached { net_investment, cap })
            }
        }
    }

    /// Place one order, going through approval when required.
    ///
    /// Failures are reported through the notifier before being returned.
    /// Nothing is written to the ledger unless the order was placed.
    pub async fn execute_trade(
        &self,
        action: TradeAction,
        volume: Decimal,
        price: Decimal,
        force_confirm: bool,
    ) -> Result<TradeExecution, TradeError> {
        match self.try_execute_trade(action, volume, price, force_confirm).await {
            Ok(execution) => {
                let message = format!(
                    "Executed {}: {} {} @ {}",
                    action,
                    execution.volume.round_dp(8).normalize(),
                    self.config.coin,
                    price
                );
                info!(
                    strategy = %self.name(),
                    order_id = %execution.order_id,
                    confirmed = execution.confirmed,
                    "{}",
                    message
                );
                self.report(true, &message).await;
                Ok(execution)
            }
            Err(e) => {
                match &e {
                    TradeError::ConfirmationCancelled { .. } => info!(strategy = %self.name(), "{}", e),
                    TradeError::ConfirmationTimeout { .. } => warn!(strategy = %self.name(), "{}", e),
                    _ => error!(strategy = %self.name(), error = %e, "Trade failed"),
                }
                self.report(false, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn try_execute_trade(
        &self,
        action: TradeAction,
        volume: Decimal,
        price: Decimal,
        force_confirm: bool,
    ) -> Result<TradeExecution, TradeError> {
        // Ledger, approval and order all carry the volume the exchange receives
        let volume = volume.round_dp(ORDER_VOLUME_DECIMALS).normalize();
        let amount = volume * price;

        if action == TradeAction::Buy {
            let available = self
                .ctx
                .gateway
                .account_balance(&self.ctx.config.quote_currency)
                .await
                .map_err(TradeError::gateway)?;
            if available < amount {
                return Err(TradeError::InsufficientFunds {
                    required: amount,
                    available,
                });
            }
        }

        let (rule_hit, reason) = self.ledger.read().await.check_trade_conditions(
            amount,
            self.config.daily_trade_limit,
            self.config.confirm_amount_threshold,
        );
        let needs_confirmation = rule_hit || force_confirm;

        if needs_confirmation {
            let reason = if rule_hit {
                Some(reason)
            } else {
                Some("first position".to_string())
            };
            let info = TradeInfo {
                strategy_name: self.name().to_string(),
                action,
                volume,
                coin: self.config.coin.clone(),
                price,
                total_amount: amount,
                reason,
            };
            self.await_approval(info).await?;
        }

        let order_id = self
            .ctx
            .gateway
            .place_market_order(&self.market(), action, volume)
            .await
            .map_err(TradeError::gateway)?;

        let record = {
            let mut ledger = self.ledger.write().await;
            ledger
                .add_trade_record(Local::now(), price, volume, action, needs_confirmation)?
                .clone()
        };

        Ok(TradeExecution {
            order_id,
            action,
            volume: record.volume,
            price: record.price,
            amount: record.amount,
            confirmed: record.confirmed,
        })
    }

    async fn await_approval(&self, info: TradeInfo) -> Result<(), TradeError> {
        let registry = &self.ctx.registry;
        let trade_id = registry.register(self.name(), info.clone()).await;

        if let Err(e) = self.ctx.notifier.request_confirmation(&trade_id, &info).await {
            warn!(
                strategy = %self.name(),
                trade_id = %trade_id,
                error = %e,
                "Failed to send confirmation request"
            );
        }
        info!(strategy = %self.name(), trade_id = %trade_id, "Waiting for trade confirmation");

        match registry
            .await_resolution(&trade_id, self.ctx.config.confirmation_timeout())
            .await?
        {
            ConfirmationState::Confirmed => Ok(()),
            ConfirmationState::Cancelled => Err(TradeError::ConfirmationCancelled { trade_id }),
            ConfirmationState::TimedOut | ConfirmationState::Pending => {
                Err(TradeError::ConfirmationTimeout { trade_id })
            }
        }
    }

    async fn report(&self, success: bool, message: &str) {
        if let Err(e) = self.ctx.notifier.report_result(self.name(), success, message).await {
            warn!(strategy = %self.name(), error = %e, "Failed to send trade result");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MockGateway, MockNotifier};
    use super::*;
    use crate::models::DEFAULT_DAILY_TRADE_LIMIT;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn config() -> StrategyConfig {
        StrategyConfig::new("btc", "BTC", dec!(10000), dec!(20000), dec!(12000), dec!(5)).unwrap()
    }

    struct Harness {
        _dir: TempDir,
        gateway: Arc<MockGateway>,
        notifier: Arc<MockNotifier>,
        strategy: AutoTradeStrategy,
    }

    fn harness(config: StrategyConfig, price: Decimal, approve: Option<bool>) -> Harness {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ConfirmationRegistry::new());
        let gateway = MockGateway::new(price, dec!(1000000));
        let notifier = match approve {
            Some(approved) => MockNotifier::answering(registry.clone(), approved),
            None => MockNotifier::silent(),
        };
        let ctx = TradingContext {
            gateway: gateway.clone(),
            notifier: notifier.clone(),
            registry,
            config: TradingConfig::with_data_dir(dir.path()),
        };
        let ledger = TradeLedger::open(&ctx.config.records_dir, &config.name).unwrap();
        let strategy = AutoTradeStrategy::new(config, ledger, ctx);

        Harness {
            _dir: dir,
            gateway,
            notifier,
            strategy,
        }
    }

    async fn seed(strategy: &AutoTradeStrategy, price: Decimal, volume: Decimal, action: TradeAction) {
        strategy
            .ledger()
            .write()
            .await
            .add_trade_record(Local::now() - chrono::Duration::days(1), price, volume, action, false)
            .unwrap();
    }

    #[test]
    fn test_deviation_percent() {
        assert_eq!(deviation_percent(dec!(0), dec!(0), dec!(10000)), dec!(100));
        assert_eq!(deviation_percent(dec!(1), dec!(9000), dec!(10000)), dec!(10));
        assert_eq!(deviation_percent(dec!(1), dec!(10500), dec!(10000)), dec!(5));
    }

    #[test]
    fn test_first_position_bootstrap() {
        let decision = evaluate_rebalance(&config(), dec!(0), dec!(0), dec!(500000));
        assert_eq!(
            decision,
            RebalanceDecision::Buy {
                volume: dec!(0.02),
                first_position: true
            }
        );
    }

    #[test]
    fn test_hold_within_tolerance() {
        // 0.02 * 520000 = 10400, 4% off
        let decision = evaluate_rebalance(&config(), dec!(0.02), dec!(10000), dec!(520000));
        assert!(matches!(decision, RebalanceDecision::Hold { .. }));

        // Exactly at tolerance still holds
        let decision = evaluate_rebalance(&config(), dec!(0.02), dec!(10000), dec!(525000));
        assert!(matches!(decision, RebalanceDecision::Hold { .. }));
    }

    #[test]
    fn test_buy_and_sell_volumes() {
        // Value 9000: buy 1000 worth
        let decision = evaluate_rebalance(&config(), dec!(0.02), dec!(10000), dec!(450000));
        assert_eq!(
            decision,
            RebalanceDecision::Buy {
                volume: dec!(1000) / dec!(450000),
                first_position: false
            }
        );

        // Value 11000: sell 1000 worth
        let decision = evaluate_rebalance(&config(), dec!(0.02), dec!(10000), dec!(550000));
        assert_eq!(
            decision,
            RebalanceDecision::Sell {
                volume: dec!(1000) / dec!(550000)
            }
        );
    }

    #[test]
    fn test_position_cap() {
        let decision = evaluate_rebalance(&config(), dec!(0.02), dec!(30000), dec!(100000));
        assert_eq!(
            decision,
            RebalanceDecision::CapReached {
                net_investment: dec!(30000),
                cap: dec!(30000)
            }
        );
    }

    #[test]
    fn test_take_profit_due() {
        assert!(take_profit_due(&config(), dec!(1.0), dec!(12000)));
        assert!(!take_profit_due(&config(), dec!(1.0), dec!(11999)));
        assert!(!take_profit_due(&config(), dec!(0), dec!(1000000)));
    }

    #[tokio::test]
    async fn test_first_buy_forces_confirmation() {
        // Threshold far above the trade amount: approval is still required
        let config = config().with_confirm_amount_threshold(dec!(1000000)).unwrap();
        let h = harness(config, dec!(500000), Some(true));

        let execution = h.strategy.check_and_trade().await.unwrap().unwrap();

        assert_eq!(execution.action, TradeAction::Buy);
        assert_eq!(execution.volume, dec!(0.02));
        assert!(execution.confirmed);
        assert_eq!(h.notifier.requests().len(), 1);
        assert_eq!(h.notifier.requests()[0].1.reason.as_deref(), Some("first position"));
        assert_eq!(h.gateway.orders(), vec![("btctwd".to_string(), TradeAction::Buy, dec!(0.02))]);
        assert_eq!(h.strategy.coin_balance().await, dec!(0.02));
    }

    #[tokio::test]
    async fn test_cancelled_trade_writes_nothing() {
        let h = harness(config(), dec!(500000), Some(false));

        let err = h.strategy.check_and_trade().await.unwrap_err();

        assert!(matches!(err, TradeError::ConfirmationCancelled { .. }));
        assert!(h.gateway.orders().is_empty());
        assert_eq!(h.strategy.ledger().read().await.trade_count(), 0);
        let results = h.notifier.results();
        assert_eq!(results.len(), 1);
        assert!(!results[0].1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_aborts() {
        let h = harness(config(), dec!(500000), None);

        let err = h.strategy.check_and_trade().await.unwrap_err();

        assert!(matches!(err, TradeError::ConfirmationTimeout { .. }));
        assert!(h.gateway.orders().is_empty());
        assert_eq!(h.strategy.ledger().read().await.trade_count(), 0);
        assert!(h.strategy.ctx.registry.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_rebalance_without_confirmation() {
        let h = harness(config(), dec!(450000), None);
        seed(&h.strategy, dec!(500000), dec!(0.02), TradeAction::Buy).await;

        let execution = h.strategy.check_and_trade().await.unwrap().unwrap();

        assert_eq!(execution.action, TradeAction::Buy);
        assert!(!execution.confirmed);
        assert!(h.notifier.requests().is_empty());
        assert_eq!(h.strategy.ledger().read().await.trade_count(), 2);
    }

    #[tokio::test]
    async fn test_recorded_volume_matches_order() {
        // 1000 / 450000 has more decimals than an order carries
        let h = harness(config(), dec!(450000), None);
        seed(&h.strategy, dec!(500000), dec!(0.02), TradeAction::Buy).await;

        let execution = h.strategy.check_and_trade().await.unwrap().unwrap();

        let sent = h.gateway.orders()[0].2;
        assert_eq!(sent, (dec!(1000) / dec!(450000)).round_dp(16));
        assert!(sent.scale() <= 16);
        assert_eq!(execution.volume, sent);
        assert_eq!(execution.amount, sent * dec!(450000));
        let ledger = h.strategy.ledger().read().await;
        assert_eq!(ledger.records()[1].volume, sent);
        assert_eq!(ledger.current_balance(), dec!(0.02) + sent);
    }

    #[tokio::test]
    async fn test_daily_limit_requires_confirmation() {
        let h = harness(config(), dec!(450000), Some(true));
        for _ in 0..DEFAULT_DAILY_TRADE_LIMIT {
            h.strategy
                .ledger()
                .write()
                .await
                .add_trade_record(Local::now(), dec!(500000), dec!(0.004), TradeAction::Buy, false)
                .unwrap();
        }

        let execution = h.strategy.check_and_trade().await.unwrap().unwrap();

        assert_eq!(execution.action, TradeAction::Buy);
        assert!(execution.confirmed);
        let requests = h.notifier.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].1.reason.as_deref().unwrap().contains("daily trade limit"));
        assert_eq!(h.gateway.orders().len(), 1);
        let ledger = h.strategy.ledger().read().await;
        assert!(ledger.records().last().unwrap().confirmed);
        assert_eq!(ledger.today_trade_count(), DEFAULT_DAILY_TRADE_LIMIT as usize + 1);
    }

    #[tokio::test]
    async fn test_amount_threshold_requires_confirmation() {
        let config = config().with_confirm_amount_threshold(dec!(500)).unwrap();
        let h = harness(config, dec!(550000), Some(true));
        seed(&h.strategy, dec!(500000), dec!(0.02), TradeAction::Buy).await;

        let execution = h.strategy.check_and_trade().await.unwrap().unwrap();

        assert_eq!(execution.action, TradeAction::Sell);
        assert!(execution.confirmed);
        let reason = h.notifier.requests()[0].1.reason.clone().unwrap();
        assert!(reason.contains("threshold"));
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let h = harness(config(), dec!(450000), None);
        seed(&h.strategy, dec!(500000), dec!(0.02), TradeAction::Buy).await;
        *h.gateway.quote_balance.lock().unwrap() = dec!(10);

        let err = h.strategy.check_and_trade().await.unwrap_err();

        assert!(matches!(err, TradeError::InsufficientFunds { .. }));
        assert!(h.gateway.orders().is_empty());
        assert_eq!(h.strategy.ledger().read().await.trade_count(), 1);
    }

    #[tokio::test]
    async fn test_position_cap_refuses_buy() {
        let h = harness(config(), dec!(100000), None);
        // Net investment 30000 = target + add-on
        seed(&h.strategy, dec!(1500000), dec!(0.02), TradeAction::Buy).await;

        let err = h.strategy.check_and_trade().await.unwrap_err();

        assert!(matches!(err, TradeError::PositionCapReached { .. }));
        assert!(h.gateway.orders().is_empty());
        assert!(h.notifier.results().is_empty());
    }

    #[tokio::test]
    async fn test_order_failure_writes_nothing() {
        let h = harness(config(), dec!(550000), None);
        seed(&h.strategy, dec!(500000), dec!(0.02), TradeAction::Buy).await;
        h.gateway.fail_orders.store(true, Ordering::SeqCst);

        let err = h.strategy.check_and_trade().await.unwrap_err();

        assert!(matches!(err, TradeError::Gateway(_)));
        assert_eq!(h.strategy.ledger().read().await.trade_count(), 1);
        assert!(!h.notifier.results()[0].1);
    }

    #[tokio::test]
    async fn test_take_profit_sells_everything() {
        let h = harness(config(), dec!(12000), None);
        seed(&h.strategy, dec!(10000), dec!(1.0), TradeAction::Buy).await;

        let execution = h.strategy.check_take_profit().await.unwrap().unwrap();

        assert_eq!(execution.action, TradeAction::Sell);
        assert_eq!(execution.volume, dec!(1.0));
        assert_eq!(h.strategy.coin_balance().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_take_profit_not_reached() {
        let h = harness(config(), dec!(11000), None);
        seed(&h.strategy, dec!(10000), dec!(1.0), TradeAction::Buy).await;

        assert!(h.strategy.check_take_profit().await.unwrap().is_none());
        assert!(h.gateway.orders().is_empty());
    }
}
