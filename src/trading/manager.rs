//! Strategy orchestrator: owns every strategy and runs execution rounds.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::TradeError;
use crate::metrics::MetricsCalculator;
use crate::models::{StrategyConfig, StrategyOverview, TradeRecord, TradingStats};

use super::{AutoTradeStrategy, ConfirmationRegistry, TradeExecution, TradeLedger, TradingContext};

/// What a strategy did in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundAction {
    /// Position liquidated and strategy disabled
    TakeProfit,
    /// Rebalancing order placed
    Trade,
    /// The attempt failed or was cancelled
    Failed,
}

/// One entry of an execution round's outcome.
#[derive(Debug, Clone, Serialize)]
pub struct RoundResult {
    pub strategy_name: String,
    pub action: RoundAction,
    pub message: String,
}

/// A ledger record tagged with the strategy's coin.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub coin: String,
    #[serde(flatten)]
    pub record: TradeRecord,
}

/// Holds all strategies, keyed by name in a stable order.
pub struct StrategyManager {
    strategies: RwLock<BTreeMap<String, Arc<AutoTradeStrategy>>>,
    round_lock: Mutex<()>,
    db: Database,
    ctx: TradingContext,
}

impl StrategyManager {
    /// Load every stored strategy and open its ledger.
    pub async fn load(db: Database, ctx: TradingContext) -> Result<Self, TradeError> {
        let configs = db.load_strategies().await.map_err(TradeError::store)?;

        let mut strategies = BTreeMap::new();
        for config in configs {
            let strategy = Self::build(config, &ctx)?;
            strategies.insert(strategy.name().to_string(), Arc::new(strategy));
        }

        info!(count = strategies.len(), "Strategies loaded");
        Ok(Self {
            strategies: RwLock::new(strategies),
            round_lock: Mutex::new(()),
            db,
            ctx,
        })
    }

    fn build(config: StrategyConfig, ctx: &TradingContext) -> Result<AutoTradeStrategy, TradeError> {
        let ledger = TradeLedger::open(&ctx.config.records_dir, &config.name)?;
        Ok(AutoTradeStrategy::new(config, ledger, ctx.clone()))
    }

    pub fn registry(&self) -> Arc<ConfirmationRegistry> {
        self.ctx.registry.clone()
    }

    // ==================== Execution ====================

    /// Run one round over all active strategies.
    ///
    /// Returns immediately with no results if another round is in flight.
    /// Strategies and ledgers are re-read from storage first, so changes made
    /// by another process apply from the next round on. A failing strategy is
    /// recorded and the round moves on.
    pub async fn execute_all(&self) -> Vec<RoundResult> {
        let Ok(_round) = self.round_lock.try_lock() else {
            info!("Execution round already in progress, skipping");
            return Vec::new();
        };

        if let Err(e) = self.sync_with_store().await {
            error!(error = %e, "Failed to sync strategies with the store, skipping round");
            return Vec::new();
        }

        let strategies: Vec<Arc<AutoTradeStrategy>> =
            self.strategies.read().await.values().cloned().collect();

        let mut results = Vec::new();
        for strategy in strategies {
            if !strategy.is_active() {
                continue;
            }
            if let Some(result) = self.run_strategy(&strategy).await {
                results.push(result);
            }
        }

        info!(results = results.len(), "Execution round finished");
        results
    }

    /// Apply stored strategies to the running set: drop deleted ones, build
    /// new or changed ones, take over the active flag and reload ledgers.
    async fn sync_with_store(&self) -> Result<(), TradeError> {
        let configs = self.db.load_strategies().await.map_err(TradeError::store)?;
        let stored: HashSet<String> = configs.iter().map(|c| c.name.clone()).collect();

        let mut strategies = self.strategies.write().await;
        strategies.retain(|name, _| {
            let keep = stored.contains(name);
            if !keep {
                info!(strategy = %name, "Strategy removed from store, dropping");
            }
            keep
        });

        for config in configs {
            let name = config.name.clone();

            if let Some(existing) = strategies.get(&name) {
                if same_parameters(&existing.config(), &config) {
                    if existing.is_active() != config.is_active {
                        info!(strategy = %name, active = config.is_active, "Active flag changed in store");
                        existing.set_active(config.is_active);
                    }
                    if let Err(e) = existing.ledger().write().await.refresh() {
                        warn!(strategy = %name, error = %e, "Failed to reload trade ledger");
                    }
                    continue;
                }
            }

            match Self::build(config, &self.ctx) {
                Ok(strategy) => {
                    debug!(strategy = %name, "Strategy (re)built from store");
                    strategies.insert(name, Arc::new(strategy));
                }
                Err(e) => {
                    // A stale instance must not keep trading on old parameters
                    warn!(strategy = %name, error = %e, "Failed to build strategy from store, dropping");
                    strategies.remove(&name);
                }
            }
        }

        Ok(())
    }

    async fn run_strategy(&self, strategy: &AutoTradeStrategy) -> Option<RoundResult> {
        let name = strategy.name().to_string();
        let result = |action, message: String| {
            Some(RoundResult {
                strategy_name: name.clone(),
                action,
                message,
            })
        };

        // Take-profit short-circuits the deviation check, successful or not
        match strategy.check_take_profit().await {
            Ok(None) => {}
            Ok(Some(execution)) => return self.finish_take_profit(strategy, &execution).await,
            Err(e) => return result(RoundAction::Failed, e.to_string()),
        }

        match strategy.check_and_trade().await {
            Ok(None) => None,
            Ok(Some(execution)) => result(RoundAction::Trade, describe(strategy, &execution)),
            Err(TradeError::PositionCapReached { net_investment, cap }) => {
                info!(
                    strategy = %name,
                    net_investment = %net_investment,
                    cap = %cap,
                    "Position cap reached, not buying"
                );
                None
            }
            Err(e) => result(RoundAction::Failed, e.to_string()),
        }
    }

    async fn finish_take_profit(
        &self,
        strategy: &AutoTradeStrategy,
        execution: &TradeExecution,
    ) -> Option<RoundResult> {
        let name = strategy.name().to_string();

        if let Err(e) = self.disable_strategy(&name).await {
            error!(strategy = %name, error = %e, "Failed to disable strategy after take-profit");
            return Some(RoundResult {
                strategy_name: name,
                action: RoundAction::Failed,
                message: format!("take-profit sold but strategy could not be disabled: {}", e),
            });
        }

        let message = format!(
            "Take-profit reached, sold {}; strategy disabled",
            describe(strategy, execution)
        );
        if let Err(e) = self.ctx.notifier.report_result(&name, true, &message).await {
            warn!(strategy = %name, error = %e, "Failed to send take-profit notice");
        }

        Some(RoundResult {
            strategy_name: name,
            action: RoundAction::TakeProfit,
            message,
        })
    }

    // ==================== Administration ====================

    pub async fn create_strategy(&self, config: StrategyConfig) -> Result<(), TradeError> {
        config.validate()?;

        let mut strategies = self.strategies.write().await;
        if strategies.contains_key(&config.name) {
            return Err(TradeError::DuplicateStrategy(config.name));
        }

        let strategy = Self::build(config, &self.ctx)?;
        self.db
            .insert_strategy(&strategy.config())
            .await
            .map_err(TradeError::store)?;

        info!(strategy = %strategy.name(), coin = %strategy.config().coin, "Strategy created");
        strategies.insert(strategy.name().to_string(), Arc::new(strategy));
        Ok(())
    }

    /// Replace a strategy's parameters, keeping its creation time and ledger.
    pub async fn update_strategy(&self, mut config: StrategyConfig) -> Result<(), TradeError> {
        config.validate()?;

        let mut strategies = self.strategies.write().await;
        let existing = strategies
            .get(&config.name)
            .ok_or_else(|| TradeError::UnknownStrategy(config.name.clone()))?;
        config.created_at = existing.config().created_at;

        self.db.save_strategy(&config).await.map_err(TradeError::store)?;

        let strategy = Self::build(config, &self.ctx)?;
        info!(strategy = %strategy.name(), "Strategy updated");
        strategies.insert(strategy.name().to_string(), Arc::new(strategy));
        Ok(())
    }

    /// Remove a strategy and move its ledger to the backup directory.
    pub async fn delete_strategy(&self, name: &str) -> Result<(), TradeError> {
        let mut strategies = self.strategies.write().await;
        let strategy = strategies
            .get(name)
            .cloned()
            .ok_or_else(|| TradeError::UnknownStrategy(name.to_string()))?;

        self.db.delete_strategy(name).await.map_err(TradeError::store)?;
        strategies.remove(name);

        strategy
            .ledger()
            .read()
            .await
            .archive(&self.ctx.config.backup_dir)?;

        info!(strategy = %name, "Strategy deleted");
        Ok(())
    }

    pub async fn enable_strategy(&self, name: &str) -> Result<(), TradeError> {
        self.set_active(name, true).await
    }

    pub async fn disable_strategy(&self, name: &str) -> Result<(), TradeError> {
        self.set_active(name, false).await
    }

    /// Persist the flag, then flip the running instance.
    async fn set_active(&self, name: &str, active: bool) -> Result<(), TradeError> {
        let strategy = self
            .strategies
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| TradeError::UnknownStrategy(name.to_string()))?;

        let found = self
            .db
            .set_strategy_active(name, active)
            .await
            .map_err(TradeError::store)?;
        if !found {
            return Err(TradeError::UnknownStrategy(name.to_string()));
        }

        strategy.set_active(active);
        info!(strategy = %name, active, "Strategy active flag changed");
        Ok(())
    }

    pub async fn get_strategy(&self, name: &str) -> Option<StrategyConfig> {
        self.strategies.read().await.get(name).map(|s| s.config())
    }

    pub async fn strategy_configs(&self) -> Vec<StrategyConfig> {
        self.strategies.read().await.values().map(|s| s.config()).collect()
    }

    // ==================== Reporting ====================

    /// Live figures for every strategy. Price failures zero the figures.
    pub async fn strategy_overviews(&self) -> Vec<StrategyOverview> {
        let strategies = self.snapshot(None).await.unwrap_or_default();

        let mut overviews = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            overviews.push(Self::overview(&strategy).await);
        }
        overviews
    }

    async fn overview(strategy: &AutoTradeStrategy) -> StrategyOverview {
        let config = strategy.config();
        let price = match strategy.current_price().await {
            Ok(price) => price,
            Err(e) => {
                warn!(strategy = %config.name, error = %e, "Price unavailable for overview");
                return StrategyOverview::unavailable(config);
            }
        };

        let ledger = strategy.ledger().read().await;
        let balance = ledger.current_balance();
        let current_value = ledger.current_market_value(price);
        let (buy_trigger_price, sell_trigger_price) =
            MetricsCalculator::trigger_prices(&config, balance, price);

        StrategyOverview {
            current_balance: balance,
            current_price: price,
            current_value,
            trade_count: ledger.trade_count(),
            today_trade_count: ledger.today_trade_count(),
            net_profit: ledger.realized_profit() + current_value,
            buy_trigger_price,
            sell_trigger_price,
            config,
        }
    }

    /// Trade records of one strategy or all of them, newest first.
    pub async fn trading_history(&self, name: Option<&str>) -> Result<Vec<HistoryEntry>, TradeError> {
        let strategies = self.snapshot(name).await?;

        let mut entries = Vec::new();
        for strategy in strategies {
            let coin = strategy.config().coin;
            let ledger = strategy.ledger().read().await;
            entries.extend(ledger.records().iter().map(|record| HistoryEntry {
                coin: coin.clone(),
                record: record.clone(),
            }));
        }

        entries.sort_by(|a, b| b.record.trade_time.cmp(&a.record.trade_time));
        Ok(entries)
    }

    /// Statistics over one strategy or all of them.
    ///
    /// Position value uses live prices; a strategy whose price cannot be
    /// fetched contributes no position value.
    pub async fn trading_stats(&self, name: Option<&str>) -> Result<TradingStats, TradeError> {
        let strategies = self.snapshot(name).await?;

        let mut records = Vec::new();
        let mut position_value = Decimal::ZERO;
        for strategy in strategies {
            let balance = {
                let ledger = strategy.ledger().read().await;
                records.extend_from_slice(ledger.records());
                ledger.current_balance()
            };
            if balance.is_zero() {
                continue;
            }

            match strategy.current_price().await {
                Ok(price) => position_value += balance * price,
                Err(e) => warn!(strategy = %strategy.name(), error = %e, "Price unavailable for stats"),
            }
        }

        Ok(MetricsCalculator::trading_stats(&records, position_value))
    }

    async fn snapshot(&self, name: Option<&str>) -> Result<Vec<Arc<AutoTradeStrategy>>, TradeError> {
        let strategies = self.strategies.read().await;
        match name {
            Some(name) => strategies
                .get(name)
                .cloned()
                .map(|s| vec![s])
                .ok_or_else(|| TradeError::UnknownStrategy(name.to_string())),
            None => Ok(strategies.values().cloned().collect()),
        }
    }
}

/// Equal apart from the active flag and creation time.
fn same_parameters(running: &StrategyConfig, stored: &StrategyConfig) -> bool {
    let mut running = running.clone();
    running.is_active = stored.is_active;
    running.created_at = stored.created_at;
    running == *stored
}

fn describe(strategy: &AutoTradeStrategy, execution: &TradeExecution) -> String {
    format!(
        "{} {} {} @ {} ({:.2})",
        execution.action,
        execution.volume.round_dp(8).normalize(),
        strategy.config().coin,
        execution.price,
        execution.amount
    )
}

#[cfg(test)]
mod tests {
    use super::super::strategy::testing::{MockGateway, MockNotifier};
    use super::super::TradingConfig;
    use super::*;
    use crate::api::DryRunGateway;
    use crate::models::TradeAction;
    use chrono::Local;
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        gateway: Arc<MockGateway>,
        notifier: Arc<MockNotifier>,
        manager: StrategyManager,
    }

    async fn harness(price: Decimal, approve: Option<bool>) -> Harness {
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
        let db = Database::in_memory().await.unwrap();
        let manager = StrategyManager::load(db, ctx).await.unwrap();

        Harness {
            dir,
            gateway,
            notifier,
            manager,
        }
    }

    fn config(name: &str) -> StrategyConfig {
        StrategyConfig::new(name, "BTC", dec!(10000), dec!(20000), dec!(12000), dec!(5)).unwrap()
    }

    async fn seed(manager: &StrategyManager, name: &str, price: Decimal, volume: Decimal) {
        let strategy = manager.strategies.read().await.get(name).cloned().unwrap();
        strategy
            .ledger()
            .write()
            .await
            .add_trade_record(Local::now(), price, volume, TradeAction::Buy, false)
            .unwrap();
    }

    #[tokio::test]
    async fn test_round_skipped_while_locked() {
        let h = harness(dec!(500000), Some(true)).await;
        h.manager.create_strategy(config("btc")).await.unwrap();

        let _held = h.manager.round_lock.lock().await;
        let results = h.manager.execute_all().await;

        assert!(results.is_empty());
        assert_eq!(*h.gateway.price_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_round_opens_first_position() {
        let h = harness(dec!(500000), Some(true)).await;
        h.manager.create_strategy(config("btc")).await.unwrap();

        let results = h.manager.execute_all().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, RoundAction::Trade);
        assert_eq!(h.gateway.orders().len(), 1);
        // Lock released after the round
        assert!(h.manager.round_lock.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_inactive_strategies_skipped() {
        let h = harness(dec!(500000), Some(true)).await;
        h.manager.create_strategy(config("btc")).await.unwrap();
        h.manager.disable_strategy("btc").await.unwrap();

        assert!(h.manager.execute_all().await.is_empty());
        assert!(h.gateway.orders().is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_round() {
        let h = harness(dec!(500000), Some(false)).await;
        h.manager.create_strategy(config("eth")).await.unwrap();
        h.manager.create_strategy(config("btc")).await.unwrap();

        let results = h.manager.execute_all().await;

        let names: Vec<_> = results.iter().map(|r| r.strategy_name.as_str()).collect();
        assert_eq!(names, vec!["btc", "eth"]);
        assert!(results.iter().all(|r| r.action == RoundAction::Failed));
        assert!(h.gateway.orders().is_empty());
    }

    #[tokio::test]
    async fn test_take_profit_disables_strategy() {
        let h = harness(dec!(12000), None).await;
        h.manager.create_strategy(config("btc")).await.unwrap();
        seed(&h.manager, "btc", dec!(10000), dec!(1.0)).await;

        let results = h.manager.execute_all().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, RoundAction::TakeProfit);
        assert_eq!(h.gateway.orders()[0].1, TradeAction::Sell);
        assert!(!h.manager.get_strategy("btc").await.unwrap().is_active);
        assert!(!h.manager.db.get_strategy("btc").await.unwrap().unwrap().is_active);
        assert!(h.notifier.results().iter().any(|(_, _, m)| m.contains("Take-profit")));

        // Next round leaves it alone
        assert!(h.manager.execute_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_take_profit_skips_rebalance() {
        let h = harness(dec!(12000), None).await;
        h.manager.create_strategy(config("btc")).await.unwrap();
        seed(&h.manager, "btc", dec!(10000), dec!(1.0)).await;
        h.gateway.fail_orders.store(true, Ordering::SeqCst);

        let results = h.manager.execute_all().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, RoundAction::Failed);
        assert!(h.manager.get_strategy("btc").await.unwrap().is_active);
        // Only the take-profit attempt reported
        assert_eq!(h.notifier.results().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let h = harness(dec!(500000), None).await;
        h.manager.create_strategy(config("btc")).await.unwrap();

        let err = h.manager.create_strategy(config("btc")).await.unwrap_err();
        assert!(matches!(err, TradeError::DuplicateStrategy(_)));

        let err = h.manager.update_strategy(config("eth")).await.unwrap_err();
        assert!(matches!(err, TradeError::UnknownStrategy(_)));

        let mut updated = config("btc");
        updated.target_investment = dec!(20000);
        h.manager.update_strategy(updated).await.unwrap();
        let stored = h.manager.db.get_strategy("btc").await.unwrap().unwrap();
        assert_eq!(stored.target_investment, dec!(20000));

        assert!(h.manager.enable_strategy("eth").await.is_err());
    }

    #[tokio::test]
    async fn test_update_keeps_ledger() {
        let h = harness(dec!(500000), None).await;
        h.manager.create_strategy(config("btc")).await.unwrap();
        seed(&h.manager, "btc", dec!(500000), dec!(0.02)).await;

        h.manager.update_strategy(config("btc")).await.unwrap();

        let history = h.manager.trading_history(Some("btc")).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].coin, "BTC");
    }

    #[tokio::test]
    async fn test_delete_archives_ledger() {
        let h = harness(dec!(500000), None).await;
        h.manager.create_strategy(config("btc")).await.unwrap();
        seed(&h.manager, "btc", dec!(500000), dec!(0.02)).await;

        h.manager.delete_strategy("btc").await.unwrap();

        assert!(h.manager.get_strategy("btc").await.is_none());
        assert!(h.manager.db.get_strategy("btc").await.unwrap().is_none());
        let backups: Vec<_> = std::fs::read_dir(h.dir.path().join("records_backup"))
            .unwrap()
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(matches!(
            h.manager.delete_strategy("btc").await,
            Err(TradeError::UnknownStrategy(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_restores_strategies() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("bot.db").display());
        let ctx = TradingContext {
            gateway: MockGateway::new(dec!(500000), dec!(0)),
            notifier: MockNotifier::silent(),
            registry: Arc::new(ConfirmationRegistry::new()),
            config: TradingConfig::with_data_dir(dir.path()),
        };

        {
            let manager = StrategyManager::load(Database::new(&url).await.unwrap(), ctx.clone())
                .await
                .unwrap();
            manager.create_strategy(config("btc")).await.unwrap();
            manager.disable_strategy("btc").await.unwrap();
            seed(&manager, "btc", dec!(500000), dec!(0.02)).await;
        }

        let manager = StrategyManager::load(Database::new(&url).await.unwrap(), ctx)
            .await
            .unwrap();
        let config = manager.get_strategy("btc").await.unwrap();
        assert!(!config.is_active);
        assert_eq!(manager.trading_history(None).await.unwrap().len(), 1);
    }

    /// A manager on the SQLite file and ledgers under `dir`, as a second
    /// process would open them.
    async fn open_shared(dir: &TempDir, gateway: Arc<MockGateway>) -> StrategyManager {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("bot.db").display());
        let registry = Arc::new(ConfirmationRegistry::new());
        let ctx = TradingContext {
            gateway,
            notifier: MockNotifier::answering(registry.clone(), true),
            registry,
            config: TradingConfig::with_data_dir(dir.path()),
        };
        StrategyManager::load(Database::new(&url).await.unwrap(), ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_round_follows_changes_from_another_process() {
        let dir = TempDir::new().unwrap();
        let admin = open_shared(&dir, MockGateway::new(dec!(500000), dec!(0))).await;
        admin.create_strategy(config("btc")).await.unwrap();

        let gateway = MockGateway::new(dec!(500000), dec!(1000000));
        let running = open_shared(&dir, gateway.clone()).await;

        // Ledger written elsewhere: position already at target, so hold
        seed(&admin, "btc", dec!(500000), dec!(0.02)).await;
        assert!(running.execute_all().await.is_empty());
        assert!(gateway.orders().is_empty());

        // Disabled and created elsewhere
        admin.disable_strategy("btc").await.unwrap();
        admin.create_strategy(config("eth")).await.unwrap();
        gateway.set_price(dec!(400000));

        let results = running.execute_all().await;

        let names: Vec<_> = results.iter().map(|r| r.strategy_name.as_str()).collect();
        assert_eq!(names, vec!["eth"]);
        assert_eq!(gateway.orders().len(), 1);
        assert!(!running.get_strategy("btc").await.unwrap().is_active);

        // Parameters changed elsewhere
        let mut updated = config("eth");
        updated.target_investment = dec!(20000);
        admin.update_strategy(updated).await.unwrap();
        assert_eq!(
            running.get_strategy("eth").await.unwrap().target_investment,
            dec!(10000)
        );

        let results = running.execute_all().await;

        assert_eq!(results.len(), 1);
        assert_eq!(
            running.get_strategy("eth").await.unwrap().target_investment,
            dec!(20000)
        );
        let order = &gateway.orders()[1];
        assert_eq!((order.1, order.2), (TradeAction::Buy, dec!(0.025)));
    }

    #[tokio::test]
    async fn test_deleted_elsewhere_is_not_written_back() {
        let dir = TempDir::new().unwrap();
        let gateway = MockGateway::new(dec!(400000), dec!(1000000));
        let running = open_shared(&dir, gateway.clone()).await;
        running.create_strategy(config("btc")).await.unwrap();
        seed(&running, "btc", dec!(500000), dec!(0.02)).await;

        let admin = open_shared(&dir, MockGateway::new(dec!(400000), dec!(0))).await;
        admin.delete_strategy("btc").await.unwrap();

        assert!(running.execute_all().await.is_empty());
        assert!(gateway.orders().is_empty());
        assert!(running.get_strategy("btc").await.is_none());
        let records = TradeLedger::file_path(&dir.path().join("records"), "btc");
        assert!(!records.exists());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_live_ledger_untouched() {
        let dir = TempDir::new().unwrap();
        let live = TradingConfig::with_data_dir(dir.path());
        let registry = Arc::new(ConfirmationRegistry::new());
        let exchange = MockGateway::new(dec!(500000), dec!(1000000));
        let ctx = TradingContext {
            gateway: Arc::new(DryRunGateway::new(exchange.clone())),
            notifier: MockNotifier::answering(registry.clone(), true),
            registry,
            config: live.for_dry_run(),
        };
        let db = Database::in_memory().await.unwrap();
        let manager = StrategyManager::load(db, ctx).await.unwrap();
        manager.create_strategy(config("btc")).await.unwrap();

        let results = manager.execute_all().await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action, RoundAction::Trade);
        assert!(exchange.orders().is_empty());
        assert!(TradeLedger::file_path(&live.for_dry_run().records_dir, "btc").exists());
        assert!(!TradeLedger::file_path(&live.records_dir, "btc").exists());

        let live_ledger = TradeLedger::open(&live.records_dir, "btc").unwrap();
        assert_eq!(live_ledger.current_balance(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_overviews() {
        let h = harness(dec!(500000), None).await;
        h.manager.create_strategy(config("btc")).await.unwrap();
        seed(&h.manager, "btc", dec!(400000), dec!(0.02)).await;

        let overviews = h.manager.strategy_overviews().await;
        assert_eq!(overviews.len(), 1);
        let overview = &overviews[0];
        assert_eq!(overview.current_balance, dec!(0.02));
        assert_eq!(overview.current_value, dec!(10000));
        assert_eq!(overview.net_profit, dec!(2000));
        assert_eq!(overview.buy_trigger_price, dec!(475000));
        assert_eq!(overview.sell_trigger_price, dec!(525000));

        h.gateway.fail_prices.store(true, Ordering::SeqCst);
        let overviews = h.manager.strategy_overviews().await;
        assert_eq!(overviews[0].current_price, Decimal::ZERO);
        assert_eq!(overviews[0].net_profit, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_history_and_stats() {
        let h = harness(dec!(500000), None).await;
        h.manager.create_strategy(config("btc")).await.unwrap();
        h.manager.create_strategy(config("eth")).await.unwrap();
        seed(&h.manager, "btc", dec!(400000), dec!(0.02)).await;
        seed(&h.manager, "eth", dec!(400000), dec!(0.01)).await;

        let history = h.manager.trading_history(None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].record.trade_time >= history[1].record.trade_time);

        let stats = h.manager.trading_stats(Some("btc")).await.unwrap();
        assert_eq!(stats.total_trades, 1);
        assert_eq!(stats.realized_profit, dec!(-8000));
        assert_eq!(stats.current_position_value, dec!(10000));
        assert_eq!(stats.net_profit, dec!(2000));

        assert!(matches!(
            h.manager.trading_stats(Some("doge")).await,
            Err(TradeError::UnknownStrategy(_))
        ));
    }
}
