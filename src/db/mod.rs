//! Database persistence for strategy configurations.
//!
//! Stores everything needed to rebuild the strategy set after a restart:
//! - Strategy parameters and approval rules
//! - Active flag, written before the running instance flips it
//!
//! Trade history lives in the per-strategy ledger files, not here.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::models::StrategyConfig;

/// Database connection pool for the strategy store.
pub struct Database {
    pool: SqlitePool,
}

/// Stored strategy row. Decimal columns are kept as text to stay exact.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredStrategy {
    pub name: String,
    pub coin: String,
    pub target_investment: String,
    pub max_position_add_on: String,
    pub take_profit_value: String,
    pub auto_trade_deviation_percent: String,
    pub daily_trade_limit: i64,
    pub confirm_amount_threshold: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StoredStrategy> for StrategyConfig {
    type Error = anyhow::Error;

    fn try_from(row: StoredStrategy) -> Result<Self> {
        let decimal = |column: &str, value: &str| {
            Decimal::from_str(value)
                .with_context(|| format!("Invalid {} '{}' for strategy {}", column, value, row.name))
        };

        let config = StrategyConfig {
            target_investment: decimal("target_investment", &row.target_investment)?,
            max_position_add_on: decimal("max_position_add_on", &row.max_position_add_on)?,
            take_profit_value: decimal("take_profit_value", &row.take_profit_value)?,
            auto_trade_deviation_percent: decimal(
                "auto_trade_deviation_percent",
                &row.auto_trade_deviation_percent,
            )?,
            confirm_amount_threshold: decimal("confirm_amount_threshold", &row.confirm_amount_threshold)?,
            daily_trade_limit: u32::try_from(row.daily_trade_limit)
                .with_context(|| format!("Invalid daily_trade_limit for strategy {}", row.name))?,
            coin: row.coin,
            is_active: row.is_active,
            created_at: row.created_at,
            name: row.name,
        };
        config.validate()?;

        Ok(config)
    }
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategies (
                name TEXT PRIMARY KEY,
                coin TEXT NOT NULL,
                target_investment TEXT NOT NULL,
                max_position_add_on TEXT NOT NULL,
                take_profit_value TEXT NOT NULL,
                auto_trade_deviation_percent TEXT NOT NULL,
                daily_trade_limit INTEGER NOT NULL DEFAULT 5,
                confirm_amount_threshold TEXT NOT NULL DEFAULT '0',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_strategies_active ON strategies(is_active)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Strategies ====================

    /// Insert a new strategy; fails if the name is taken.
    pub async fn insert_strategy(&self, config: &StrategyConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strategies (
                name, coin, target_investment, max_position_add_on, take_profit_value,
                auto_trade_deviation_percent, daily_trade_limit, confirm_amount_threshold,
                is_active, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&config.name)
        .bind(&config.coin)
        .bind(config.target_investment.to_string())
        .bind(config.max_position_add_on.to_string())
        .bind(config.take_profit_value.to_string())
        .bind(config.auto_trade_deviation_percent.to_string())
        .bind(i64::from(config.daily_trade_limit))
        .bind(config.confirm_amount_threshold.to_string())
        .bind(config.is_active)
        .bind(config.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert strategy {}", config.name))?;

        Ok(())
    }

    /// Save or update a strategy.
    pub async fn save_strategy(&self, config: &StrategyConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strategies (
                name, coin, target_investment, max_position_add_on, take_profit_value,
                auto_trade_deviation_percent, daily_trade_limit, confirm_amount_threshold,
                is_active, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                coin = excluded.coin,
                target_investment = excluded.target_investment,
                max_position_add_on = excluded.max_position_add_on,
                take_profit_value = excluded.take_profit_value,
                auto_trade_deviation_percent = excluded.auto_trade_deviation_percent,
                daily_trade_limit = excluded.daily_trade_limit,
                confirm_amount_threshold = excluded.confirm_amount_threshold,
                is_active = excluded.is_active,
                updated_at = datetime('now')
            "#,
        )
        .bind(&config.name)
        .bind(&config.coin)
        .bind(config.target_investment.to_string())
        .bind(config.max_position_add_on.to_string())
        .bind(config.take_profit_value.to_string())
        .bind(config.auto_trade_deviation_percent.to_string())
        .bind(i64::from(config.daily_trade_limit))
        .bind(config.confirm_amount_threshold.to_string())
        .bind(config.is_active)
        .bind(config.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save strategy {}", config.name))?;

        Ok(())
    }

    /// Remove a strategy. Returns whether a row was deleted.
    pub async fn delete_strategy(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM strategies WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist the active flag. Returns whether the strategy exists.
    pub async fn set_strategy_active(&self, name: &str, active: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE strategies SET is_active = ?, updated_at = datetime('now') WHERE name = ?",
        )
        .bind(active)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get one strategy by name.
    pub async fn get_strategy(&self, name: &str) -> Result<Option<StrategyConfig>> {
        let row = sqlx::query_as::<_, StoredStrategy>(
            r#"
            SELECT name, coin, target_investment, max_position_add_on, take_profit_value,
                   auto_trade_deviation_percent, daily_trade_limit, confirm_amount_threshold,
                   is_active, created_at
            FROM strategies WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StrategyConfig::try_from).transpose()
    }

    /// Load every stored strategy, ordered by name.
    pub async fn load_strategies(&self) -> Result<Vec<StrategyConfig>> {
        let rows = sqlx::query_as::<_, StoredStrategy>(
            r#"
            SELECT name, coin, target_investment, max_position_add_on, take_profit_value,
                   auto_trade_deviation_percent, daily_trade_limit, confirm_amount_threshold,
                   is_active, created_at
            FROM strategies ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch strategies")?;

        rows.into_iter().map(StrategyConfig::try_from).collect()
    }
}

#[cfg(test)]
impl Database {
    /// Private in-memory database on a single kept-alive connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }
}
