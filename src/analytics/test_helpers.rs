//! Shared fixtures for analytics tests.

use chrono::NaiveDate;

use crate::models::{Outcome, Trade, TradeType};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Minimal trade with every optional field empty. Override with struct update syntax.
pub fn trade(day: &str, pair: &str, pnl: f64) -> Trade {
    Trade {
        id: format!("{}-{}-{}", day, pair, pnl),
        user_id: "user-1".to_string(),
        date: date(day),
        pair: pair.to_string(),
        trade_type: TradeType::Long,
        entry: None,
        exit: None,
        pnl,
        outcome: Outcome::from_pnl(pnl),
        setup: None,
        session: None,
        mistake: None,
        notes: None,
        learnings: None,
        tags: Vec::new(),
        screenshot_url: None,
        created_at: 0,
        updated_at: 0,
    }
}

/// The two-trade EUR/USD journal used across scenarios.
pub fn eurusd_pair() -> Vec<Trade> {
    vec![
        trade("2024-01-02", "EUR/USD", 100.0),
        trade("2024-01-03", "EUR/USD", -40.0),
    ]
}
