//! Append-only trade ledger for one strategy, persisted as a JSON file.
//!
//! Every figure the decision engine needs (coin balance, net investment,
//! today's trade count) is folded from the record list on demand. Records are
//! never edited or removed; corrections are counter-trades.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LedgerError;
use crate::models::{TradeAction, TradeRecord};

/// On-disk layout of a ledger file.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    strategy_name: String,
    creation_time: DateTime<Local>,
    #[serde(default)]
    trade_records: Vec<TradeRecord>,
}

/// Trade history of a single strategy.
#[derive(Debug)]
pub struct TradeLedger {
    strategy_name: String,
    creation_time: DateTime<Local>,
    records: Vec<TradeRecord>,
    path: PathBuf,
}

impl TradeLedger {
    /// Path of the ledger file for a strategy inside `records_dir`.
    pub fn file_path(records_dir: &Path, strategy_name: &str) -> PathBuf {
        records_dir.join(format!("trading_records_{}.json", strategy_name))
    }

    /// Open the ledger for a strategy, loading existing records.
    ///
    /// A missing file yields an empty ledger; the file is only written on the
    /// first appended record.
    pub fn open(records_dir: &Path, strategy_name: &str) -> Result<Self, LedgerError> {
        fs::create_dir_all(records_dir)?;

        let mut ledger = Self {
            strategy_name: strategy_name.to_string(),
            creation_time: Local::now(),
            records: Vec::new(),
            path: Self::file_path(records_dir, strategy_name),
        };
        ledger.refresh()?;

        Ok(ledger)
    }

    /// Reload records from disk.
    pub fn refresh(&mut self) -> Result<(), LedgerError> {
        if !self.path.exists() {
            self.records.clear();
            return Ok(());
        }

        let file = File::open(&self.path)?;
        let stored: LedgerFile = serde_json::from_reader(BufReader::new(file))?;
        self.creation_time = stored.creation_time;
        self.records = stored.trade_records;

        debug!(
            strategy = %self.strategy_name,
            records = self.records.len(),
            "Loaded trade ledger"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn trade_count(&self) -> usize {
        self.records.len()
    }

    /// Append a record and write the ledger to disk before returning.
    ///
    /// If the write fails the record stays in memory, so the next successful
    /// write still carries it.
    pub fn add_trade_record(
        &mut self,
        trade_time: DateTime<Local>,
        price: Decimal,
        volume: Decimal,
        action: TradeAction,
        confirmed: bool,
    ) -> Result<&TradeRecord, LedgerError> {
        let record = TradeRecord::new(
            self.strategy_name.clone(),
            trade_time,
            price,
            volume,
            action,
            confirmed,
        );
        self.records.push(record);
        self.save()?;

        Ok(&self.records[self.records.len() - 1])
    }

    /// Coin held: buy volume minus sell volume.
    pub fn current_balance(&self) -> Decimal {
        self.records.iter().map(TradeRecord::signed_volume).sum()
    }

    /// Cash put in: buy amounts minus sell amounts.
    pub fn net_investment(&self) -> Decimal {
        self.records.iter().map(TradeRecord::signed_amount).sum()
    }

    /// Sell proceeds minus buy cost.
    pub fn realized_profit(&self) -> Decimal {
        -self.net_investment()
    }

    pub fn current_market_value(&self, price: Decimal) -> Decimal {
        self.current_balance() * price
    }

    /// Number of trades placed on the current local date.
    pub fn today_trade_count(&self) -> usize {
        self.trade_count_on(Local::now().date_naive())
    }

    pub fn trade_count_on(&self, date: NaiveDate) -> usize {
        self.records
            .iter()
            .filter(|r| r.trade_time.with_timezone(&Local).date_naive() == date)
            .count()
    }

    /// Decide whether a trade of `amount` needs operator approval.
    ///
    /// Approval is needed once today's trades reach `daily_limit`, or when a
    /// positive `amount_threshold` is met. The daily limit is reported first
    /// when both apply.
    pub fn check_trade_conditions(
        &self,
        amount: Decimal,
        daily_limit: u32,
        amount_threshold: Decimal,
    ) -> (bool, String) {
        trade_conditions(self.today_trade_count(), amount, daily_limit, amount_threshold)
    }

    /// Move the ledger file into `backup_dir` under a timestamped name.
    ///
    /// Returns the backup path, or `None` when the strategy never traded.
    pub fn archive(&self, backup_dir: &Path) -> Result<Option<PathBuf>, LedgerError> {
        if !self.path.exists() {
            return Ok(None);
        }

        fs::create_dir_all(backup_dir)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let backup = backup_dir.join(format!(
            "trading_records_{}_{}.json",
            self.strategy_name, stamp
        ));
        fs::rename(&self.path, &backup)?;

        info!(
            strategy = %self.strategy_name,
            backup = %backup.display(),
            "Trade ledger archived"
        );
        Ok(Some(backup))
    }

    fn save(&self) -> Result<(), LedgerError> {
        let stored = LedgerFile {
            strategy_name: self.strategy_name.clone(),
            creation_time: self.creation_time,
            trade_records: self.records.clone(),
        };

        let tmp = self.path.with_extension("json.tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(writer, &stored)?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(
            strategy = %self.strategy_name,
            records = self.records.len(),
            "Trade ledger saved"
        );
        Ok(())
    }
}

fn trade_conditions(
    today_count: usize,
    amount: Decimal,
    daily_limit: u32,
    amount_threshold: Decimal,
) -> (bool, String) {
    if today_count >= daily_limit as usize {
        return (
            true,
            format!("daily trade limit reached ({}/{})", today_count, daily_limit),
        );
    }

    if amount_threshold > Decimal::ZERO && amount >= amount_threshold {
        return (
            true,
            format!(
                "trade amount {:.2} at or above threshold {:.2}",
                amount, amount_threshold
            ),
        );
    }

    (false, String::new())
}
