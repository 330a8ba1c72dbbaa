//! Reporting calculations over trade ledgers.

mod calculator;

pub use calculator::MetricsCalculator;
