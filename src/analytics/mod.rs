//! Pure performance analytics over a snapshot of trades.
//!
//! Every function here is deterministic, does no I/O and accepts an empty
//! slice. Wins, losses and breakevens are decided by the sign of pnl
//! (`> 0`, `< 0`, `== 0`) everywhere.

pub mod breakdown;
pub mod calendar;
pub mod dashboard;
pub mod equity;
pub mod kpis;
pub mod mistakes;
pub mod pairs;
pub mod range;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use breakdown::{BucketStat, TimeAndStrategyAnalytics, compute_time_and_strategy_analytics};
pub use calendar::{CalendarBuckets, CalendarCell, DayBucket, DayTone, MonthGrid, compute_calendar_buckets};
pub use dashboard::Dashboard;
pub use equity::{
    DailyEquityPoint, Drawdown, EquityPoint, chronological, compute_daily_equity_curve, compute_equity_curve,
    compute_equity_curve_as_of, max_drawdown,
};
pub use kpis::{FALLBACK_BALANCE, Kpis, compute_kpis};
pub use mistakes::{MistakeAnalytics, MistakeStat, compute_mistake_analytics};
pub use pairs::{PairAnalytics, PairStat, compute_pair_analytics};
pub use range::DateRange;
