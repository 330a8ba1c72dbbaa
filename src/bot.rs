//! Bot runner: wires exchange, notifications and strategies together and
//! drives execution rounds on a timer.
//!
//! Handles:
//! - Building the exchange gateway (live or dry-run)
//! - Choosing Telegram or log-only notifications
//! - Running the approval listener alongside the round loop
//! - Stopping cleanly on Ctrl+C

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::{
    DryRunGateway, ExchangeGateway, LogNotifier, MaxClient, Notifier, TelegramApprovalListener,
    TelegramNotifier,
};
use crate::db::Database;
use crate::trading::{
    ConfirmationRegistry, RoundAction, RoundResult, StrategyManager, TradingConfig, TradingContext,
};

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Seconds between execution rounds
    pub poll_interval_secs: u64,

    /// Whether to actually place orders or just log them
    pub dry_run: bool,

    /// Trading configuration (quote currency, timeout, ledger directories)
    pub trading_config: TradingConfig,

    /// Database URL
    pub database_url: String,
}

impl BotConfig {
    /// Trading config for the selected mode. Dry runs keep their own
    /// ledgers so simulated fills never reach the live ones.
    pub fn effective_trading_config(&self) -> TradingConfig {
        if self.dry_run {
            self.trading_config.for_dry_run()
        } else {
            self.trading_config.clone()
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            dry_run: true,
            trading_config: TradingConfig::default(),
            database_url: "sqlite:rebalance.db?mode=rwc".to_string(),
        }
    }
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    manager: Arc<StrategyManager>,
    gateway: Arc<dyn ExchangeGateway>,
    telegram: Option<TelegramNotifier>,

    // Shutdown signal: the flag is polled by the listener, the notify
    // wakes the round loop
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl Bot {
    /// Create a new bot instance and load stored strategies.
    pub async fn new(mut config: BotConfig) -> Result<Self> {
        let db = Database::new(&config.database_url).await?;

        let client = match MaxClient::from_env() {
            Ok(client) => client,
            Err(e) => {
                warn!("MAX credentials not configured: {}. Running in dry-run mode.", e);
                config.dry_run = true;
                MaxClient::new("", "")?
            }
        };
        let trading_config = config.effective_trading_config();
        if config.dry_run {
            info!(records_dir = %trading_config.records_dir.display(), "Dry run: using separate trade ledgers");
        }

        let client: Arc<dyn ExchangeGateway> = Arc::new(client);
        let gateway: Arc<dyn ExchangeGateway> = if config.dry_run {
            Arc::new(DryRunGateway::new(client))
        } else {
            client
        };

        let quote = config.trading_config.quote_currency.clone();
        let telegram = match TelegramNotifier::from_env(&quote) {
            Ok(bot) => Some(bot),
            Err(e) => {
                warn!("Telegram not configured: {}. Confirmations will time out.", e);
                None
            }
        };
        let notifier: Arc<dyn Notifier> = match &telegram {
            Some(bot) => Arc::new(bot.clone()),
            None => Arc::new(LogNotifier),
        };

        let ctx = TradingContext {
            gateway: gateway.clone(),
            notifier,
            registry: Arc::new(ConfirmationRegistry::new()),
            config: trading_config,
        };
        let manager = StrategyManager::load(db, ctx)
            .await
            .context("Failed to load strategies")?;

        Ok(Self {
            config,
            manager: Arc::new(manager),
            gateway,
            telegram,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        })
    }

    pub fn manager(&self) -> Arc<StrategyManager> {
        self.manager.clone()
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Verify the exchange is reachable.
    pub async fn check_connection(&self) -> Result<()> {
        self.gateway.check_connection().await
    }

    /// Main run loop.
    pub async fn run(&self) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            "Starting bot run loop"
        );

        let listener = self.spawn_listener();

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        let shutdown_notify = self.shutdown_notify.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
            // Stores a permit if the loop is mid-round
            shutdown_notify.notify_one();
        });

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.shutdown.load(Ordering::SeqCst) {
            if !next_round(&mut poll_interval, &self.shutdown_notify).await {
                break;
            }

            let results = self.manager.execute_all().await;
            log_results(&results);
        }

        self.stop_listener(listener);
        info!("Bot stopped");
        Ok(())
    }

    /// Run a single round with the approval listener active.
    pub async fn run_once(&self) -> Vec<RoundResult> {
        let listener = self.spawn_listener();
        let results = self.manager.execute_all().await;
        log_results(&results);
        self.stop_listener(listener);
        results
    }

    fn spawn_listener(&self) -> Option<JoinHandle<()>> {
        let listener: TelegramApprovalListener =
            self.telegram.as_ref()?.approval_listener(self.manager.registry());
        Some(tokio::spawn(listener.run(self.shutdown.clone())))
    }

    fn stop_listener(&self, listener: Option<JoinHandle<()>>) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = listener {
            // Pending long-poll would otherwise hold shutdown for up to 30s
            handle.abort();
        }
    }
}

/// Wait for the next tick. Returns `false` once shutdown is requested.
async fn next_round(ticks: &mut Interval, shutdown: &Notify) -> bool {
    tokio::select! {
        _ = ticks.tick() => true,
        _ = shutdown.notified() => false,
    }
}

fn log_results(results: &[RoundResult]) {
    for result in results {
        match result.action {
            RoundAction::Failed => error!(
                strategy = %result.strategy_name,
                message = %result.message,
                "Strategy round failed"
            ),
            action => info!(
                strategy = %result.strategy_name,
                action = ?action,
                message = %result.message,
                "Strategy round result"
            ),
        }
    }
}
