use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Trade;

/// Account balance after one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub balance: f64,
    pub pnl: f64,
    /// Absent on the placeholder point emitted for an empty journal
    pub trade_id: Option<String>,
}

/// Account balance at the end of a trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEquityPoint {
    pub date: NaiveDate,
    pub daily_pnl: f64,
    pub trade_count: usize,
    pub cumulative_pnl: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    pub amount: f64,
    /// Percentage of the peak balance; 0 when the peak is not positive
    pub percent: f64,
    pub peak_date: Option<NaiveDate>,
    pub trough_date: Option<NaiveDate>,
}

/// Trades oldest first. Same-day trades keep creation order, then input order.
pub fn chronological(trades: &[Trade]) -> Vec<&Trade> {
    let mut ordered: Vec<&Trade> = trades.iter().collect();
    ordered.sort_by_key(|t| (t.date, t.created_at));
    ordered
}

pub fn compute_equity_curve(trades: &[Trade], starting_balance: f64) -> Vec<EquityPoint> {
    compute_equity_curve_as_of(trades, starting_balance, Utc::now().date_naive())
}

/// Running balance per trade. An empty journal yields one point at the
/// starting balance dated `today` so charts have something to draw.
pub fn compute_equity_curve_as_of(trades: &[Trade], starting_balance: f64, today: NaiveDate) -> Vec<EquityPoint> {
    if trades.is_empty() {
        return vec![EquityPoint {
            date: today,
            balance: starting_balance,
            pnl: 0.0,
            trade_id: None,
        }];
    }

    let mut balance = starting_balance;
    chronological(trades)
        .into_iter()
        .map(|trade| {
            balance += trade.pnl;
            EquityPoint {
                date: trade.date,
                balance,
                pnl: trade.pnl,
                trade_id: Some(trade.id.clone()),
            }
        })
        .collect()
}

pub fn compute_daily_equity_curve(trades: &[Trade], starting_balance: f64) -> Vec<DailyEquityPoint> {
    let mut daily: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for trade in trades {
        let entry = daily.entry(trade.date).or_insert((0.0, 0));
        entry.0 += trade.pnl;
        entry.1 += 1;
    }

    let mut cumulative_pnl = 0.0;
    daily
        .into_iter()
        .map(|(date, (daily_pnl, trade_count))| {
            cumulative_pnl += daily_pnl;
            DailyEquityPoint {
                date,
                daily_pnl,
                trade_count,
                cumulative_pnl,
                balance: starting_balance + cumulative_pnl,
            }
        })
        .collect()
}

/// Largest peak-to-trough drop along the curve. The starting balance counts as the first peak.
pub fn max_drawdown(curve: &[EquityPoint], starting_balance: f64) -> Drawdown {
    let mut peak = starting_balance;
    let mut peak_date: Option<NaiveDate> = None;
    let mut worst = Drawdown {
        amount: 0.0,
        percent: 0.0,
        peak_date: None,
        trough_date: None,
    };

    for point in curve.iter().filter(|p| p.trade_id.is_some()) {
        if point.balance > peak {
            peak = point.balance;
            peak_date = Some(point.date);
            continue;
        }

        let drop = peak - point.balance;
        if drop > worst.amount {
            worst = Drawdown {
                amount: drop,
                percent: if peak > 0.0 { drop / peak * 100.0 } else { 0.0 },
                peak_date,
                trough_date: Some(point.date),
            };
        }
    }

    worst
}
