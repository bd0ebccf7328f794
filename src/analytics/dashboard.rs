use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    CalendarBuckets, DailyEquityPoint, Drawdown, EquityPoint, Kpis, MistakeAnalytics, PairAnalytics,
    TimeAndStrategyAnalytics, chronological, compute_calendar_buckets, compute_daily_equity_curve,
    compute_equity_curve_as_of, compute_kpis, compute_mistake_analytics, compute_pair_analytics,
    compute_time_and_strategy_analytics, max_drawdown,
};
use crate::models::Trade;

const RECENT_TRADES: usize = 5;

/// Everything the dashboard views render, computed from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub starting_balance: f64,
    pub current_balance: f64,
    pub kpis: Kpis,
    pub equity_curve: Vec<EquityPoint>,
    pub daily_equity: Vec<DailyEquityPoint>,
    pub max_drawdown: Drawdown,
    pub calendar: CalendarBuckets,
    pub pairs: PairAnalytics,
    pub time_and_strategy: TimeAndStrategyAnalytics,
    pub mistakes: MistakeAnalytics,
    /// Newest first
    pub recent_trades: Vec<Trade>,
}

impl Dashboard {
    pub fn compute(trades: &[Trade], starting_balance: f64, today: NaiveDate) -> Self {
        let kpis = compute_kpis(trades, starting_balance);
        let equity_curve = compute_equity_curve_as_of(trades, starting_balance, today);
        let max_drawdown = max_drawdown(&equity_curve, starting_balance);

        let recent_trades = chronological(trades)
            .into_iter()
            .rev()
            .take(RECENT_TRADES)
            .cloned()
            .collect();

        Dashboard {
            starting_balance,
            current_balance: starting_balance + kpis.total_pnl,
            daily_equity: compute_daily_equity_curve(trades, starting_balance),
            calendar: compute_calendar_buckets(trades),
            pairs: compute_pair_analytics(trades),
            time_and_strategy: compute_time_and_strategy_analytics(trades),
            mistakes: compute_mistake_analytics(trades),
            kpis,
            equity_curve,
            max_drawdown,
            recent_trades,
        }
    }
}
